//! Webhook signature validation.
//!
//! Tools sign the raw request body with HMAC-SHA256 using the tenant's signing
//! secret and send the result as `<algorithm>=<hex-digest>`. Digests are
//! compared with [`subtle::ConstantTimeEq`] so the comparison time does not
//! depend on where two digests first differ.

use crate::Timestamp;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// The only digest algorithm accepted in signature headers
pub const SUPPORTED_ALGORITHM: &str = "sha256";

/// Errors raised for malformed signature input
///
/// A well-formed signature that does not match is not an error; it is
/// reported as `Ok(false)` by [`verify_signature`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Signature header '{header}' is missing")]
    MissingHeader { header: String },

    #[error("Signature header is malformed: {message}")]
    Malformed { message: String },

    #[error("Unsupported signature algorithm '{algorithm}'")]
    UnsupportedAlgorithm { algorithm: String },

    #[error("Signing secret is empty")]
    EmptySecret,
}

/// Signature header split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature<'a> {
    pub algorithm: &'a str,
    pub digest: &'a str,
}

/// Split a `<algorithm>=<hex-digest>` header value
///
/// The algorithm must be [`SUPPORTED_ALGORITHM`]. The digest is not decoded
/// here.
pub fn parse_signature_header(value: &str) -> Result<ParsedSignature<'_>, SignatureError> {
    let (algorithm, digest) = value
        .trim()
        .split_once('=')
        .ok_or_else(|| SignatureError::Malformed {
            message: "expected '<algorithm>=<hex-digest>'".to_string(),
        })?;

    if algorithm.is_empty() || digest.is_empty() {
        return Err(SignatureError::Malformed {
            message: "algorithm and digest must both be present".to_string(),
        });
    }

    if algorithm != SUPPORTED_ALGORITHM {
        return Err(SignatureError::UnsupportedAlgorithm {
            algorithm: algorithm.to_string(),
        });
    }

    Ok(ParsedSignature { algorithm, digest })
}

/// Compute the raw HMAC-SHA256 digest of `body`
pub fn compute_signature(secret: &[u8], body: &[u8]) -> Result<Vec<u8>, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::EmptySecret);
    }

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::EmptySecret)?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Produce a header value (`sha256=<hex>`) for `body`
pub fn sign_payload(secret: &[u8], body: &[u8]) -> Result<String, SignatureError> {
    let digest = compute_signature(secret, body)?;
    Ok(format!("{}={}", SUPPORTED_ALGORITHM, hex::encode(digest)))
}

/// Verify a signature header against the exact raw body
///
/// # Returns
///
/// - `Ok(true)` when the digest matches
/// - `Ok(false)` when the header is well-formed but the digest does not match,
///   including a digest that is not lower-case hex or has the wrong length
/// - `Err(..)` when the header is absent, malformed or names another algorithm
pub fn verify_signature(
    secret: &[u8],
    body: &[u8],
    header: Option<&str>,
    header_name: &str,
) -> Result<bool, SignatureError> {
    let header = header.ok_or_else(|| SignatureError::MissingHeader {
        header: header_name.to_string(),
    })?;

    let parsed = parse_signature_header(header)?;
    let expected = compute_signature(secret, body)?;

    // Digests travel as lower-case hex. Comparing the encoded text keeps every
    // byte of the header significant, including letter case.
    let expected = hex::encode(expected);
    let provided = parsed.digest.as_bytes();
    if provided.len() != expected.len() {
        debug!("Signature digest has the wrong length");
        return Ok(false);
    }

    Ok(bool::from(expected.as_bytes().ct_eq(provided)))
}

// ============================================================================
// Replay protection
// ============================================================================

/// Acceptance window for event timestamps
///
/// An authenticated event older than `tolerance` or more than
/// `max_future_skew` ahead of the local clock is rejected. A zero tolerance
/// disables the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayWindow {
    pub tolerance: Duration,
    pub max_future_skew: Duration,
}

impl ReplayWindow {
    /// Default acceptance window: five minutes
    pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

    /// Default allowance for sender clocks running ahead
    pub const DEFAULT_FUTURE_SKEW: Duration = Duration::from_secs(60);

    pub fn new(tolerance: Duration, max_future_skew: Duration) -> Self {
        Self {
            tolerance,
            max_future_skew,
        }
    }

    /// Window that accepts any timestamp
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        !self.tolerance.is_zero()
    }

    /// Check an event timestamp against the window at `now`
    pub fn check(&self, event_at: Timestamp, now: Timestamp) -> Result<(), ReplayRejection> {
        if !self.is_enabled() {
            return Ok(());
        }

        let age = event_at.age_at(now);
        let age_secs = age.num_seconds();

        if age_secs < 0 && age_secs.unsigned_abs() > self.max_future_skew.as_secs() {
            return Err(ReplayRejection::InFuture {
                ahead_seconds: age_secs.unsigned_abs(),
            });
        }

        if age_secs > 0 && age_secs.unsigned_abs() > self.tolerance.as_secs() {
            return Err(ReplayRejection::TooOld {
                age_seconds: age_secs.unsigned_abs(),
                tolerance_seconds: self.tolerance.as_secs(),
            });
        }

        Ok(())
    }
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TOLERANCE, Self::DEFAULT_FUTURE_SKEW)
    }
}

/// Reason an event fell outside the replay window
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayRejection {
    #[error("Event is {age_seconds}s old, tolerance is {tolerance_seconds}s")]
    TooOld {
        age_seconds: u64,
        tolerance_seconds: u64,
    },

    #[error("Event timestamp is {ahead_seconds}s in the future")]
    InFuture { ahead_seconds: u64 },
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
