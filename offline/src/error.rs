//! Error types for the offline engine.
//!
//! Only the install/activate/sync entry points and the storage layer surface
//! these to callers. The fetch path converts every failure into a response
//! (see [`crate::offline`]).

use std::path::PathBuf;

use crate::client::{Role, Screen};
use crate::http::Method;
use crate::lifecycle::WorkerState;

/// Cache storage errors.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// Only retrieval requests may be stored.
    #[error("refusing to cache a {method} request")]
    UnsafeMethod { method: Method },

    /// Partition names end up as directory names on disk.
    #[error("invalid cache name: {name:?}")]
    InvalidName { name: String },

    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache metadata error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Network layer errors.
///
/// A non-ok HTTP status is *not* a network error; strategies decide what a
/// non-ok response means for them.
#[derive(thiserror::Error, Debug, Clone)]
pub enum NetworkError {
    #[error("network unreachable for {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Configuration loading errors.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid origin {origin:?}: {reason}")]
    InvalidOrigin { origin: String, reason: String },
}

/// Errors decoding or reaching the REST API, as seen by the page.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The worker answered with its offline envelope.
    #[error("offline: {message}")]
    Offline { message: String },

    /// The server answered `success: false` or a non-2xx status.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed API response: {0}")]
    Malformed(String),

    /// The request never reached a server.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A write was queued for the next background sync.
    #[error("request deferred for background sync as {id}")]
    Deferred { id: String },
}

/// Refused screen transitions.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavError {
    #[error("sign in to open {0:?}")]
    NotSignedIn(Screen),

    #[error("{role:?} may not open {screen:?}")]
    Forbidden { screen: Screen, role: Role },
}

/// Top-level engine error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid worker state transition {from:?} -> {to:?}")]
    InvalidTransition { from: WorkerState, to: WorkerState },

    /// Installed, but pages outside this worker's control are still open
    /// and nobody asked to skip waiting.
    #[error("waiting for {clients} uncontrolled client(s) to close")]
    Waiting { clients: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
