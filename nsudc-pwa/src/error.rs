//! Crate-wide error type.
//!
//! Each module keeps its own error enum; [`PwaError`] wraps them for
//! callers that want one type, such as the command-line tool.

use std::process::ExitCode;

use crate::background_sync::SyncError;
use crate::cache_storage::CacheError;
use crate::config::ConfigError;
use crate::form::ValidationError;
use crate::motion::MotionError;
use crate::network::{DeliveryError, NetworkError};
use crate::service_worker::FetchError;
use crate::web_storage::StorageError;

/// Variants are split into two categories:
/// - **Infrastructure errors** (exit code 2): configuration, storage, corrupt data
/// - **Operational errors** (exit code 1): failures the user can retry or fix
#[derive(thiserror::Error, Debug)]
pub enum PwaError {
    // ── Infrastructure errors (exit code 2) ──────────────────────────
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Operational errors (exit code 1) ─────────────────────────────
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("background sync: {0}")]
    Sync(#[from] SyncError),

    #[error("motion generation: {0}")]
    Motion(#[from] MotionError),

    #[error("{0} queued submission(s) could not be delivered")]
    Undelivered(usize),
}

impl PwaError {
    /// Process exit code: `2` for infrastructure, `1` for operational.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) | Self::Storage(_) | Self::Cache(_) | Self::Io(_) | Self::Json(_) => {
                ExitCode::from(2)
            }

            Self::Validation(_)
            | Self::Network(_)
            | Self::Delivery(_)
            | Self::Fetch(_)
            | Self::Sync(_)
            | Self::Motion(_)
            | Self::Undelivered(_) => ExitCode::from(1),
        }
    }
}
