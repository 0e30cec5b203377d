//! Structured logging setup for the end-to-end encryption module.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | WARN  | Rejected ciphertext, unreadable key store |
//! | INFO  | Key generation, rotation, store writes |
//! | DEBUG | Per-message seal/open, store lookups |
//!
//! ## Field names
//!
//! `subsystem` (always [`SUBSYSTEM`]), `op`, `user_id`, `generation`,
//! `fingerprint`, `store_backend`, `error`.
//!
//! Private key material, derived keys and plaintext are never logged.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Value of the `subsystem` field on every event from this crate.
pub const SUBSYSTEM: &str = "e2e";

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "malaka_e2e=info";

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT` ("json" or "text", default text).
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG` and falls back to [`DEFAULT_FILTER`]. Events go to
/// stderr so command output on stdout stays machine-readable.
pub fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}
