use super::*;
use crate::ticket::Priority;
use crate::{TenantId, ToolType};
use std::time::Duration;

fn metadata(ticket_id: &str) -> TicketMetadata {
    let event_at = Timestamp::from_epoch_millis(1_709_287_200_000).unwrap();
    TicketMetadata::new(
        TenantId::new("tenant-abc").unwrap(),
        ticket_id,
        "Printer on fire",
        None,
        Priority::High,
        event_at,
        event_at,
        ToolType::HelpDesk,
    )
    .unwrap()
}

#[test]
fn test_dedup_key_combines_tenant_ticket_and_event_time() {
    let job = DispatchedJob::new(metadata("4711"));
    assert_eq!(job.dedup_key(), "tenant-abc/4711/1709287200000");

    let replayed = DispatchedJob::new(metadata("4711"));
    assert_ne!(job.job_id, replayed.job_id);
    assert_eq!(job.dedup_key(), replayed.dedup_key());
}

#[tokio::test]
async fn test_enqueued_job_reaches_receiver() {
    let (dispatcher, mut receiver) = ChannelDispatcher::new(4);

    let job_id = dispatcher.enqueue(metadata("1")).await.unwrap();
    let job = receiver.recv().await.unwrap();

    assert_eq!(job.job_id, job_id);
    assert_eq!(job.metadata.ticket_id(), "1");
}

#[tokio::test]
async fn test_full_queue_is_reported_as_transient() {
    let (dispatcher, _receiver) = ChannelDispatcher::new(1);
    dispatcher.enqueue(metadata("1")).await.unwrap();

    let err = dispatcher.enqueue(metadata("2")).await.unwrap_err();
    assert_eq!(err, DispatchError::QueueFull { capacity: 1 });
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_closed_dispatcher_rejects_new_jobs_but_drains_queued_ones() {
    let (dispatcher, mut receiver) = ChannelDispatcher::new(4);
    dispatcher.enqueue(metadata("1")).await.unwrap();
    dispatcher.enqueue(metadata("2")).await.unwrap();

    dispatcher.close();
    dispatcher.close();

    assert!(!dispatcher.is_open());
    assert_eq!(
        dispatcher.enqueue(metadata("3")).await.unwrap_err(),
        DispatchError::Closed
    );

    assert_eq!(receiver.recv().await.unwrap().metadata.ticket_id(), "1");
    assert_eq!(receiver.recv().await.unwrap().metadata.ticket_id(), "2");
    assert!(receiver.recv().await.is_none());
}

#[tokio::test]
async fn test_waiting_receiver_wakes_on_close() {
    let (dispatcher, mut receiver) = ChannelDispatcher::new(4);
    let waiter = tokio::spawn(async move { receiver.recv().await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    dispatcher.close();

    let result = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_dropped_receiver_closes_dispatcher() {
    let (dispatcher, receiver) = ChannelDispatcher::new(4);
    drop(receiver);

    assert!(!dispatcher.is_open());
    assert_eq!(
        dispatcher.enqueue(metadata("1")).await.unwrap_err(),
        DispatchError::Closed
    );
}
