//! The service worker.
//!
//! Owns the cache, the network, the lifecycle and the outbox, and exposes
//! one method per platform event: install, activate, fetch, push,
//! notification click, sync and message.

use std::sync::Arc;

use log::{debug, error, info, warn};
use url::Url;

use crate::background_sync::{SyncQueue, SyncReport};
use crate::cache_storage::CacheStorage;
use crate::config::{CacheNames, WorkerConfig};
use crate::error::{Error, Result};
use crate::http::Request;
use crate::lifecycle::{self, ActivateReport, Clients, InstallReport, Lifecycle, WorkerState};
use crate::message::{ClientMessage, MessageReply, ReplyPort};
use crate::network::Network;
use crate::offline::OfflineResponder;
use crate::push::{self, ClickOutcome, LogSink, Notification, NotificationSink, PushPayload};
use crate::router::{classify, Route};
use crate::strategy::{BackgroundTasks, Handled, Strategies};

/// Result of a fetch event.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Not intercepted; the caller should use the network directly.
    Bypass,
    /// The worker answered.
    Respond(Handled),
}

impl FetchOutcome {
    pub fn handled(self) -> Option<Handled> {
        match self {
            Self::Bypass => None,
            Self::Respond(handled) => Some(handled),
        }
    }
}

/// A service worker instance for one version of the app.
pub struct ServiceWorker {
    config: Arc<WorkerConfig>,
    names: CacheNames,
    origin: Url,
    storage: Arc<CacheStorage>,
    network: Arc<dyn Network>,
    lifecycle: spin::Mutex<Lifecycle>,
    clients: Clients,
    outbox: Arc<SyncQueue>,
    notifications: Arc<dyn NotificationSink>,
    tasks: Arc<BackgroundTasks>,
    strategies: Strategies,
}

impl ServiceWorker {
    pub fn new(config: WorkerConfig, storage: Arc<CacheStorage>, network: Arc<dyn Network>) -> Result<Self> {
        let origin = config.origin_url()?;
        let names = config.names();
        if let Some(max_age) = config.max_age() {
            storage.set_max_age(Some(max_age));
        }
        let config = Arc::new(config);
        let tasks = Arc::new(BackgroundTasks::new());
        let strategies = Strategies::new(
            Arc::clone(&config),
            origin.clone(),
            Arc::clone(&storage),
            Arc::clone(&network),
            Arc::clone(&tasks),
        );
        Ok(Self {
            config,
            names,
            origin,
            storage,
            network,
            lifecycle: spin::Mutex::new(Lifecycle::new()),
            clients: Clients::new(),
            outbox: Arc::new(SyncQueue::in_memory()),
            notifications: Arc::new(LogSink),
            tasks,
            strategies,
        })
    }

    pub fn with_outbox(mut self, outbox: Arc<SyncQueue>) -> Self {
        self.outbox = outbox;
        self
    }

    pub fn with_notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = sink;
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn names(&self) -> &CacheNames {
        &self.names
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn network(&self) -> &dyn Network {
        self.network.as_ref()
    }

    pub fn clients(&self) -> &Clients {
        &self.clients
    }

    pub fn outbox(&self) -> &SyncQueue {
        &self.outbox
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.lock().state()
    }

    /// The label reported to `GET_VERSION`.
    pub fn version(&self) -> &str {
        self.names.version_label()
    }

    // ── Lifecycle events ────────────────────────────────────

    /// Install event: precache the static manifest, then ask to skip
    /// waiting.
    pub async fn install(&self) -> Result<InstallReport> {
        self.lifecycle.lock().transition(WorkerState::Installing)?;

        let outcome = lifecycle::precache(
            &self.storage,
            self.network.as_ref(),
            &self.origin,
            &self.names,
            &self.config.static_files,
        )
        .await;

        let mut lifecycle = self.lifecycle.lock();
        match outcome {
            Ok(report) => {
                lifecycle.transition(WorkerState::Installed)?;
                lifecycle.request_skip_waiting();
                Ok(report)
            }
            Err(e) => {
                lifecycle.transition(WorkerState::Redundant)?;
                Err(e)
            }
        }
    }

    /// Activate event: drop superseded partitions, then claim every client.
    ///
    /// A waiting worker with open uncontrolled pages stays installed until
    /// skip-waiting is requested.
    pub async fn activate(&self) -> Result<ActivateReport> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state() == WorkerState::Installed && !lifecycle.skip_waiting_requested() {
                let clients = self.clients.uncontrolled();
                if clients > 0 {
                    info!("{} waiting on {clients} open client(s)", self.version());
                    return Err(Error::Waiting { clients });
                }
            }
            lifecycle.transition(WorkerState::Activating)?;
        }
        let outcome = lifecycle::purge_and_claim(&self.storage, &self.names, &self.clients);
        let mut lifecycle = self.lifecycle.lock();
        match outcome {
            Ok(report) => {
                lifecycle.transition(WorkerState::Activated)?;
                Ok(report)
            }
            Err(e) => {
                lifecycle.transition(WorkerState::Redundant)?;
                Err(e)
            }
        }
    }

    /// Resume a version installed by an earlier process. Returns whether the
    /// worker is now active.
    ///
    /// Both live partitions mark a completed activation; the purge is rerun
    /// so nothing superseded survives a restart. A static partition alone
    /// means the install finished but activation never did, so the worker
    /// comes back waiting.
    pub fn resume(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.state() {
            WorkerState::Activated => return true,
            WorkerState::Parsed => {}
            _ => return false,
        }
        if !self.storage.has(self.names.static_name()) {
            return false;
        }
        if !self.storage.has(self.names.dynamic_name()) {
            if lifecycle.restore(WorkerState::Installed).is_ok() {
                info!("resumed {} as installed", self.version());
            }
            return false;
        }
        if let Err(e) = lifecycle.restore(WorkerState::Activated) {
            warn!("cannot resume {}: {e}", self.version());
            return false;
        }
        drop(lifecycle);

        match lifecycle::purge_and_claim(&self.storage, &self.names, &self.clients) {
            Ok(report) => info!(
                "resumed {} ({} stale partitions deleted)",
                self.version(),
                report.deleted.len()
            ),
            Err(e) => warn!("resumed {} without purging: {e}", self.version()),
        }
        true
    }

    /// Activate now if installed and waiting. Returns the activation report
    /// when one ran.
    pub async fn skip_waiting(&self) -> Result<Option<ActivateReport>> {
        let waiting = {
            let mut lifecycle = self.lifecycle.lock();
            lifecycle.request_skip_waiting();
            lifecycle.state() == WorkerState::Installed
        };
        if !waiting {
            return Ok(None);
        }
        Ok(Some(self.activate().await?))
    }

    // ── Fetch ───────────────────────────────────────────────

    /// Fetch event. Every intercepted request resolves to a response; a
    /// strategy failure falls through to the offline responder.
    pub async fn fetch(&self, request: Request) -> FetchOutcome {
        if self.state() != WorkerState::Activated {
            debug!("not active, bypassing {}", request.url);
            return FetchOutcome::Bypass;
        }

        let kind = match classify(&request, &self.config) {
            Route::Bypass => {
                debug!("bypass {} {}", request.method, request.url);
                return FetchOutcome::Bypass;
            }
            Route::Handle(kind) => kind,
        };
        debug!("{kind:?} {}", request.url);

        let handled = match self.strategies.handle(kind, &request).await {
            Ok(handled) => handled,
            Err(e) => {
                error!("fetch failed for {}: {e}", request.url);
                OfflineResponder::new(&self.storage, &self.config, &self.names, &self.origin)
                    .respond(&request)
            }
        };
        FetchOutcome::Respond(handled)
    }

    /// Wait for background refreshes started so far.
    pub async fn settle(&self) {
        self.tasks.settle().await;
    }

    // ── Peripheral events ───────────────────────────────────

    /// Push event: display a notification built from the payload.
    pub fn push(&self, data: Option<&[u8]>) -> Notification {
        let payload = PushPayload::parse(data);
        let notification = Notification::from_payload(&payload, &self.config.push);
        self.notifications.show(&notification);
        notification
    }

    /// Notification click event.
    pub fn notification_click(&self, action: Option<&str>) -> ClickOutcome {
        let outcome = push::handle_click(action, &self.clients, &self.origin);
        debug!("notification click {action:?}: {outcome:?}");
        outcome
    }

    /// Sync event. Only the configured tag drains the outbox.
    pub async fn sync(&self, tag: &str) -> Option<SyncReport> {
        if tag != self.config.sync_tag {
            debug!("ignoring sync tag {tag}");
            return None;
        }
        Some(self.outbox.drain(self.network.as_ref()).await)
    }

    /// Message event.
    pub async fn message(&self, message: ClientMessage, port: Option<ReplyPort>) -> Result<()> {
        match message {
            ClientMessage::SkipWaiting => {
                self.skip_waiting().await?;
            }
            ClientMessage::GetVersion => {
                let reply = MessageReply::Version {
                    version: self.version().to_string(),
                };
                match port {
                    Some(port) => {
                        if port.send(reply).is_err() {
                            debug!("version reply dropped, port closed");
                        }
                    }
                    None => warn!("GET_VERSION without a reply port"),
                }
            }
            ClientMessage::Unknown => debug!("ignoring unknown message"),
        }
        Ok(())
    }
}
