//! # Ticket Gateway Service
//!
//! Binary entry point for the ticket gateway.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes structured logging
//! - Builds the tenant store, tool plugins, job queue and worker
//! - Serves webhooks until SIGINT/SIGTERM, then drains the queue

mod enhancer;

use anyhow::Context;
use enhancer::HttpTicketEnhancer;
use std::sync::Arc;
use std::time::Duration;
use ticket_gateway_api::{start_server, AppState, LoggingConfig, ServiceConfig, ServiceError};
use ticket_gateway_core::{
    ChannelDispatcher, HelpDeskPlugin, InMemoryTenantSource, IssueTrackerPlugin, JobReceiver,
    PlaintextSecretDecryptor, PluginManager, PluginRegistryBuilder, TenantCredentialStore,
    TicketWorker, ToolApiClient, ToolType, WebhookGateway,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    let loaded = load_config();

    match &loaded {
        Ok(config) => init_logging(&config.logging),
        Err(_) => init_logging(&LoggingConfig::default()),
    }

    info!("Starting Ticket Gateway Service");

    let service_config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Could not load service configuration; aborting");
            std::process::exit(3);
        }
    };

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    let runtime = match Runtime::build(&service_config) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = ?e, "Failed to initialize service; aborting");
            std::process::exit(4);
        }
    };

    let Runtime {
        plugins,
        gateway,
        dispatcher,
        receiver,
        worker,
    } = runtime;

    let worker_task = tokio::spawn(async move { worker.run(receiver).await });

    let shutdown_timeout = Duration::from_secs(service_config.server.shutdown_timeout_seconds);
    let state = AppState::new(service_config, gateway, dispatcher.clone());

    let served = start_server(state).await;

    // Stop intake, let the worker finish what is queued, then release pools.
    dispatcher.close();
    match tokio::time::timeout(shutdown_timeout, worker_task).await {
        Ok(Ok(processed)) => info!(processed = processed, "Worker drained"),
        Ok(Err(e)) => error!(error = %e, "Worker task failed"),
        Err(_) => warn!(
            timeout_seconds = shutdown_timeout.as_secs(),
            "Worker did not drain before shutdown timeout"
        ),
    }
    plugins.close_all();

    if let Err(e) = served {
        error!("Server stopped with error: {}", e);

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };

        std::process::exit(exit_code);
    }

    info!("Ticket Gateway Service stopped");
}

// ============================================================================
// Configuration and logging
// ============================================================================

/// Load configuration
///
/// Sources, later ones override earlier ones:
///  1. /etc/ticket-gateway/service.yaml
///  2. ./config/service.yaml
///  3. the file named by TG_CONFIG_FILE, which must exist when set
///  4. environment variables prefixed TG, e.g. TG__SERVER__PORT=9090
fn load_config() -> Result<ServiceConfig, config::ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/ticket-gateway/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Ok(explicit_path) = std::env::var("TG_CONFIG_FILE") {
        if !explicit_path.is_empty() {
            builder = builder.add_source(
                config::File::with_name(&explicit_path)
                    .required(true)
                    .format(config::FileFormat::Yaml),
            );
        }
    }

    builder
        .add_source(config::Environment::with_prefix("TG").separator("__"))
        .build()?
        .try_deserialize()
}

fn init_logging(logging: &LoggingConfig) {
    let level = &logging.level;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "ticket_gateway={level},ticket_gateway_api={level},ticket_gateway_core={level},audit={level},tower_http=info"
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Long-lived components shared between the server and the worker
struct Runtime {
    plugins: Arc<PluginManager>,
    gateway: Arc<WebhookGateway>,
    dispatcher: Arc<ChannelDispatcher>,
    receiver: JobReceiver,
    worker: TicketWorker,
}

impl Runtime {
    fn build(config: &ServiceConfig) -> anyhow::Result<Self> {
        let source = InMemoryTenantSource::from_yaml_file(&config.tenants.directory_path)
            .with_context(|| {
                format!(
                    "loading tenant directory {}",
                    config.tenants.directory_path.display()
                )
            })?;
        if source.is_empty() {
            warn!("Tenant directory is empty; every webhook will be rejected");
        }

        // Secrets in the directory are base64 only. Replace the decryptor
        // before storing real ciphertext.
        let store = TenantCredentialStore::new(
            Arc::new(source),
            Arc::new(PlaintextSecretDecryptor::new()),
        );

        let mut builder = PluginRegistryBuilder::new();
        for tool_type in ToolType::ALL {
            // One pool per tool keeps a slow tool from starving the others.
            let client = ToolApiClient::new(tool_type.as_str(), config.tool_client.clone())
                .with_context(|| format!("building API client for {}", tool_type))?;

            let plugin: Arc<dyn ticket_gateway_core::TicketingToolPlugin> = match tool_type {
                ToolType::HelpDesk => Arc::new(HelpDeskPlugin::new(store.clone(), client)),
                ToolType::IssueTracker => Arc::new(IssueTrackerPlugin::new(store.clone(), client)?),
            };
            builder.register(tool_type, plugin)?;
        }
        let plugins = Arc::new(builder.build());
        info!(tool_types = ?plugins.tool_types(), "Plugins registered");

        let (dispatcher, receiver) = ChannelDispatcher::new(config.gateway.queue_capacity);
        let dispatcher = Arc::new(dispatcher);

        let gateway = Arc::new(WebhookGateway::new(
            plugins.clone(),
            store,
            dispatcher.clone(),
            config.gateway.replay_window(),
        ));

        let enhancer = HttpTicketEnhancer::new(
            &config.enhancer.endpoint,
            Duration::from_millis(config.enhancer.timeout_ms),
        )?;
        let worker = TicketWorker::new(plugins.clone(), Arc::new(enhancer));

        Ok(Self {
            plugins,
            gateway,
            dispatcher,
            receiver,
            worker,
        })
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
