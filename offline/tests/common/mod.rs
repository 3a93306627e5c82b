//! Shared fixtures for the property tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sstdms_offline::error::NetworkError;
use sstdms_offline::{CacheStorage, Request, Response, ServiceWorker, WorkerConfig};

pub const ORIGIN: &str = "http://localhost:8080";

pub fn url(path: &str) -> String {
    format!("{ORIGIN}{path}")
}

/// In-memory network with scripted answers.
///
/// Unknown URLs answer `404`. URLs marked failing, or every URL while
/// offline, fail in transport.
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Response>>,
    failing: Mutex<HashSet<String>>,
    offline: AtomicBool,
    seen: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, url: &str, response: Response) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// URLs requested so far, in order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    /// Answer every manifest entry with `200` and its own path as body.
    pub fn route_manifest(&self, config: &WorkerConfig) {
        let origin = config.origin_url().unwrap();
        for entry in &config.static_files {
            let resolved = origin.join(entry).unwrap();
            self.route(resolved.as_str(), Response::text(200, resolved.path()));
        }
    }
}

#[async_trait]
impl sstdms_offline::Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let url = request.url.to_string();
        self.seen.lock().unwrap().push(url.clone());
        if self.offline.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&url) {
            return Err(NetworkError::Unreachable {
                url,
                reason: "scripted failure".to_string(),
            });
        }
        Ok(self
            .routes
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .unwrap_or_else(|| Response::new(404)))
    }
}

pub fn worker_with(
    config: WorkerConfig,
    storage: Arc<CacheStorage>,
    network: Arc<ScriptedNetwork>,
) -> ServiceWorker {
    ServiceWorker::new(config, storage, network).unwrap()
}

/// A worker over in-memory storage that has completed install and
/// activate against `network`.
pub async fn active_worker(network: Arc<ScriptedNetwork>) -> ServiceWorker {
    let config = WorkerConfig::default();
    network.route_manifest(&config);
    let sw = worker_with(config, Arc::new(CacheStorage::in_memory()), network);
    sw.install().await.unwrap();
    sw.activate().await.unwrap();
    sw
}

pub fn current_thread() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}
