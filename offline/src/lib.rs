//! SSTDMS offline engine
//!
//! The caching proxy behind the SSTDMS mobile shell. Every request the page
//! makes goes through [`ServiceWorker::fetch`], which classifies it, applies
//! the matching fetch strategy against the versioned cache partitions, and
//! always resolves to a response, synthesizing an offline answer when
//! neither the network nor the cache can serve it.
//!
//! Platform events map onto [`ServiceWorker`] methods:
//!
//! - install: precache the static manifest
//! - activate: delete superseded partitions, claim open pages
//! - fetch: route and answer a request
//! - push / notification click
//! - sync: replay the outbox of deferred writes
//! - message: `SKIP_WAITING`, `GET_VERSION`

pub mod background_sync;
pub mod cache_storage;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod message;
pub mod network;
pub mod offline;
pub mod push;
pub mod router;
pub mod strategy;
pub mod worker;

pub use cache_storage::CacheStorage;
pub use config::{CacheNames, WorkerConfig};
pub use error::{Error, Result};
pub use http::{Method, Request, Response};
pub use network::{Disconnected, HttpNetwork, Network};
pub use strategy::{FetchSource, Handled};
pub use worker::{FetchOutcome, ServiceWorker};
