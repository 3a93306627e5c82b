//! Fetch Strategies
//!
//! One policy per [`RequestKind`]:
//!
//! | Kind            | Policy                                         |
//! |-----------------|------------------------------------------------|
//! | static file     | cache first, refresh in the background         |
//! | API call        | network first, dynamic cache, offline envelope |
//! | page navigation | network first, cached shell, offline page      |
//! | other           | network only                                   |
//!
//! A strategy returns `Err` only when it has no fallback of its own; the
//! caller then hands the request to the offline responder.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, warn};
use serde::Serialize;
use tokio::task::JoinHandle;
use url::Url;

use crate::cache_storage::CacheStorage;
use crate::config::{CacheNames, WorkerConfig};
use crate::error::NetworkError;
use crate::http::{Request, Response};
use crate::network::Network;
use crate::offline::{offline_envelope, shell_or_offline_page, SERVED_FROM_HEADER};
use crate::router::{is_cacheable_api, RequestKind};

// ── Types ───────────────────────────────────────────────────

/// Indicates where a fetch response originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchSource {
    Network,
    Cache,
    /// Built by the worker itself.
    Synthetic,
}

/// A response together with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Handled {
    pub response: Response,
    pub source: FetchSource,
}

impl Handled {
    pub fn new(response: Response, source: FetchSource) -> Self {
        Self { response, source }
    }
}

// ── Background tasks ────────────────────────────────────────

/// Detached tasks (cache refreshes) that nothing awaits on the request path.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    handles: spin::Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` on the current runtime. Outside a runtime the task is
    /// dropped.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime, background task dropped");
            return false;
        };
        let handle = runtime.spawn(task);
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        true
    }

    /// Tasks spawned and not yet finished.
    pub fn pending(&self) -> usize {
        self.handles.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait for every task spawned so far.
    pub async fn settle(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!("background task failed: {e}");
            }
        }
    }
}

// ── Strategies ──────────────────────────────────────────────

/// The per-kind fetch policies, sharing one cache and one network.
pub struct Strategies {
    config: Arc<WorkerConfig>,
    names: CacheNames,
    origin: Url,
    storage: Arc<CacheStorage>,
    network: Arc<dyn Network>,
    tasks: Arc<BackgroundTasks>,
}

impl Strategies {
    pub fn new(
        config: Arc<WorkerConfig>,
        origin: Url,
        storage: Arc<CacheStorage>,
        network: Arc<dyn Network>,
        tasks: Arc<BackgroundTasks>,
    ) -> Self {
        let names = config.names();
        Self {
            config,
            names,
            origin,
            storage,
            network,
            tasks,
        }
    }

    /// Dispatch to the strategy for `kind`.
    pub async fn handle(&self, kind: RequestKind, request: &Request) -> Result<Handled, NetworkError> {
        match kind {
            RequestKind::StaticFile => self.static_asset(request).await,
            RequestKind::ApiCall => Ok(self.api(request).await),
            RequestKind::PageNavigation => Ok(self.navigation(request).await),
            RequestKind::Other => self.passthrough(request).await,
        }
    }

    /// Cache first. A hit is returned immediately while a detached task
    /// refreshes the entry; a miss goes to the network and a successful
    /// answer is stored.
    pub async fn static_asset(&self, request: &Request) -> Result<Handled, NetworkError> {
        let partition = self.names.static_name();
        if let Some(cached) = self.storage.match_in(partition, request) {
            self.refresh_in_background(request.clone());
            return Ok(Handled::new(cached, FetchSource::Cache));
        }

        let response = self.network.fetch(request).await?;
        if response.ok() {
            if let Err(e) = self.storage.put(partition, request, &response) {
                warn!("failed to cache {}: {e}", request.url);
            }
        }
        Ok(Handled::new(response, FetchSource::Network))
    }

    /// Network first. A non-ok status counts as a failure; failures are
    /// answered from the dynamic partition (marked with `X-Served-From`)
    /// or with the offline envelope.
    pub async fn api(&self, request: &Request) -> Handled {
        let partition = self.names.dynamic_name();
        match self.network.fetch(request).await {
            Ok(response) if response.ok() => {
                if is_cacheable_api(request.url.as_str(), &self.config) {
                    if let Err(e) = self.storage.put(partition, request, &response) {
                        warn!("failed to cache {}: {e}", request.url);
                    }
                }
                return Handled::new(response, FetchSource::Network);
            }
            Ok(response) => debug!("API {} answered HTTP {}", request.url, response.status),
            Err(e) => debug!("API {} failed: {e}", request.url),
        }

        match self.storage.match_in(partition, request) {
            Some(cached) => Handled::new(
                cached.with_header(SERVED_FROM_HEADER, "cache"),
                FetchSource::Cache,
            ),
            None => Handled::new(offline_envelope(), FetchSource::Synthetic),
        }
    }

    /// Network first, then the cached shell, then the offline page.
    pub async fn navigation(&self, request: &Request) -> Handled {
        match self.network.fetch(request).await {
            Ok(response) if response.ok() => return Handled::new(response, FetchSource::Network),
            Ok(response) => debug!("page {} answered HTTP {}", request.url, response.status),
            Err(e) => debug!("page {} failed: {e}", request.url),
        }
        shell_or_offline_page(&self.storage, &self.config, &self.origin)
    }

    /// Straight to the network, no caching.
    pub async fn passthrough(&self, request: &Request) -> Result<Handled, NetworkError> {
        let response = self.network.fetch(request).await?;
        Ok(Handled::new(response, FetchSource::Network))
    }

    fn refresh_in_background(&self, request: Request) {
        let storage = Arc::clone(&self.storage);
        let network = Arc::clone(&self.network);
        let partition = self.names.static_name().to_string();
        self.tasks.spawn(async move {
            match network.fetch(&request).await {
                Ok(response) if response.ok() => match storage.put(&partition, &request, &response) {
                    Ok(()) => debug!("refreshed {}", request.url),
                    Err(e) => warn!("background refresh of {} not stored: {e}", request.url),
                },
                Ok(response) => debug!("background refresh of {}: HTTP {}", request.url, response.status),
                Err(e) => debug!("background refresh of {} failed: {e}", request.url),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Serves fixed responses by URL; anything else is unreachable.
    #[derive(Default)]
    struct FixedNetwork {
        routes: HashMap<String, Response>,
        calls: spin::Mutex<usize>,
    }

    impl FixedNetwork {
        fn with(mut self, url: &str, response: Response) -> Self {
            self.routes.insert(url.to_string(), response);
            self
        }
    }

    #[async_trait]
    impl Network for FixedNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
            *self.calls.lock() += 1;
            self.routes
                .get(request.url.as_str())
                .cloned()
                .ok_or_else(|| NetworkError::Unreachable {
                    url: request.url.to_string(),
                    reason: "no route".to_string(),
                })
        }
    }

    fn strategies(network: FixedNetwork) -> (Strategies, Arc<CacheStorage>, Arc<BackgroundTasks>) {
        let config = Arc::new(WorkerConfig::default());
        let origin = config.origin_url().unwrap();
        let storage = Arc::new(CacheStorage::in_memory());
        let tasks = Arc::new(BackgroundTasks::new());
        let s = Strategies::new(config, origin, Arc::clone(&storage), Arc::new(network), Arc::clone(&tasks));
        (s, storage, tasks)
    }

    const CSS: &str = "http://localhost:8080/styles/mobile.css";
    const STATS: &str = "http://localhost:8080/api/dashboard/stats";

    #[tokio::test]
    async fn test_static_miss_then_hit() {
        let network = FixedNetwork::default().with(CSS, Response::text(200, "v1"));
        let (s, storage, _) = strategies(network);
        let request = Request::get(CSS).unwrap();

        let first = s.static_asset(&request).await.unwrap();
        assert_eq!(first.source, FetchSource::Network);
        assert!(storage.match_in("sstdms-static-v1.0.0", &request).is_some());

        let second = s.static_asset(&request).await.unwrap();
        assert_eq!(second.source, FetchSource::Cache);
        assert_eq!(second.response.body, b"v1");
    }

    #[tokio::test]
    async fn test_static_refresh_updates_entry() {
        let network = FixedNetwork::default().with(CSS, Response::text(200, "fresh"));
        let (s, storage, tasks) = strategies(network);
        let request = Request::get(CSS).unwrap();
        storage
            .put("sstdms-static-v1.0.0", &request, &Response::text(200, "stale"))
            .unwrap();

        let hit = s.static_asset(&request).await.unwrap();
        assert_eq!(hit.response.body, b"stale");
        tasks.settle().await;
        let refreshed = storage.match_in("sstdms-static-v1.0.0", &request).unwrap();
        assert_eq!(refreshed.body, b"fresh");
    }

    #[tokio::test]
    async fn test_static_non_ok_not_cached() {
        let network = FixedNetwork::default().with(CSS, Response::new(404));
        let (s, storage, _) = strategies(network);
        let request = Request::get(CSS).unwrap();
        let handled = s.static_asset(&request).await.unwrap();
        assert_eq!(handled.response.status, 404);
        assert!(storage.match_in("sstdms-static-v1.0.0", &request).is_none());
    }

    #[tokio::test]
    async fn test_static_miss_offline_is_error() {
        let (s, _, _) = strategies(FixedNetwork::default());
        let request = Request::get(CSS).unwrap();
        assert!(s.static_asset(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_api_non_ok_falls_back_to_cache() {
        let network = FixedNetwork::default().with(STATS, Response::new(500));
        let (s, storage, _) = strategies(network);
        let request = Request::get(STATS).unwrap();
        storage
            .put("sstdms-dynamic-v1.0.0", &request, &Response::text(200, "{\"success\":true}"))
            .unwrap();

        let handled = s.api(&request).await;
        assert_eq!(handled.source, FetchSource::Cache);
        assert_eq!(handled.response.header("x-served-from"), Some("cache"));
    }

    #[tokio::test]
    async fn test_api_outside_allow_list_not_cached() {
        let url = "http://localhost:8080/api/auth/verify";
        let network = FixedNetwork::default().with(url, Response::text(200, "ok"));
        let (s, storage, _) = strategies(network);
        let request = Request::get(url).unwrap();
        let handled = s.api(&request).await;
        assert_eq!(handled.source, FetchSource::Network);
        assert_eq!(storage.entry_count("sstdms-dynamic-v1.0.0"), None);
    }

    #[tokio::test]
    async fn test_navigation_non_ok_uses_offline_page() {
        let url = "http://localhost:8080/projects";
        let network = FixedNetwork::default().with(url, Response::new(502));
        let (s, _, _) = strategies(network);
        let request = Request::get(url).unwrap().with_header("Accept", "text/html");
        let handled = s.navigation(&request).await;
        assert_eq!(handled.source, FetchSource::Synthetic);
        assert_eq!(handled.response.status, 200);
    }

    #[tokio::test]
    async fn test_passthrough_never_caches() {
        let url = "http://localhost:8080/manifest.json";
        let network = FixedNetwork::default().with(url, Response::text(200, "{}"));
        let (s, storage, _) = strategies(network);
        let request = Request::get(url).unwrap();
        let handled = s.passthrough(&request).await.unwrap();
        assert_eq!(handled.source, FetchSource::Network);
        assert!(storage.keys().is_empty());
    }

    #[test]
    fn test_spawn_without_runtime_is_dropped() {
        let tasks = BackgroundTasks::new();
        assert!(!tasks.spawn(async {}));
        assert_eq!(tasks.pending(), 0);
    }
}
