use std::process::ExitCode;

use sstdms_offline::error::{CacheError, ConfigError, NetworkError};

/// All errors produced by sstdms-sw.
///
/// Variants are split into two categories:
/// - **Infrastructure errors** (exit code 2): bad config, unreadable or unwritable cache
/// - **Operational errors** (exit code 1): runtime outcomes the user can act on
#[derive(thiserror::Error, Debug)]
pub enum SwError {
    // ── Infrastructure errors (exit code 2) ──────────────────────────

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("engine error: {0}")]
    Engine(sstdms_offline::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Operational errors (exit code 1) ─────────────────────────────

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("worker not installed for {version}; run `sstdms-sw install` first")]
    NotInstalled { version: String },

    #[error("worker not active for {version}; run `sstdms-sw activate` first")]
    NotActive { version: String },

    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl From<sstdms_offline::Error> for SwError {
    fn from(e: sstdms_offline::Error) -> Self {
        match e {
            sstdms_offline::Error::Config(e) => Self::Config(e),
            sstdms_offline::Error::Cache(e) => Self::Cache(e),
            sstdms_offline::Error::Network(e) => Self::Network(e),
            other => Self::Engine(other),
        }
    }
}

impl SwError {
    /// Map each error variant to its process exit code.
    ///
    /// - `2`: infrastructure error (bad config, storage, I/O)
    /// - `1`: operational failure
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// The raw numeric exit code.
    pub fn code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Cache(_) | Self::Engine(_) | Self::Json(_) => 2,

            Self::InvalidUrl { .. }
            | Self::UnknownMethod(_)
            | Self::NotInstalled { .. }
            | Self::NotActive { .. }
            | Self::Network(_) => 1,
        }
    }
}
