//! Worker Lifecycle Management
//!
//! State transitions, the client registry, and the two lifecycle events:
//! install (precache the static manifest) and activate (purge superseded
//! partitions, then claim every open client).

use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use url::Url;

use crate::cache_storage::CacheStorage;
use crate::config::CacheNames;
use crate::error::{Error, Result};
use crate::http::{Method, Request, RequestMode};
use crate::network::Network;

// ── State machine ───────────────────────────────────────────

/// Worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Loaded, no lifecycle event run yet
    Parsed,
    /// Install event in progress
    Installing,
    /// Installed, waiting to activate
    Installed,
    /// Activate event in progress
    Activating,
    /// Controls its clients
    Activated,
    /// Replaced or failed
    Redundant,
}

/// Check if state transition is valid
pub fn is_valid_transition(from: WorkerState, to: WorkerState) -> bool {
    use WorkerState::*;
    matches!(
        (from, to),
        (Parsed, Installing)
            | (Installing, Installed)
            | (Installing, Redundant)
            | (Installed, Activating)
            | (Activating, Activated)
            | (Activating, Redundant)
            | (Activated, Redundant)
    )
}

/// Tracks the worker's state and its pending skip-waiting request.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: WorkerState,
    skip_waiting: bool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: WorkerState::Parsed,
            skip_waiting: false,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Move to `to`, rejecting transitions the state machine forbids.
    pub fn transition(&mut self, to: WorkerState) -> Result<()> {
        if !is_valid_transition(self.state, to) {
            return Err(Error::InvalidTransition {
                from: self.state,
                to,
            });
        }
        debug!("worker state {:?} -> {:?}", self.state, to);
        self.state = to;
        Ok(())
    }

    /// Ask for activation without waiting for old clients to close.
    pub fn request_skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting
    }

    /// Adopt `state` for a version installed by an earlier process. Only
    /// a fresh lifecycle can be restored, and only to a settled state.
    pub fn restore(&mut self, state: WorkerState) -> Result<()> {
        if self.state != WorkerState::Parsed
            || !matches!(state, WorkerState::Installed | WorkerState::Activated)
        {
            return Err(Error::InvalidTransition {
                from: self.state,
                to: state,
            });
        }
        debug!("worker state restored as {state:?}");
        self.state = state;
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

// ── Clients ─────────────────────────────────────────────────

/// Client identifier
pub type ClientId = u64;

/// A window client in the worker's scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    pub id: ClientId,
    pub url: String,
    pub focused: bool,
    /// Whether this worker controls the client.
    pub controlled: bool,
}

#[derive(Debug, Default)]
struct ClientList {
    clients: Vec<Client>,
    next_id: ClientId,
}

/// Clients interface
#[derive(Debug, Default)]
pub struct Clients {
    inner: spin::Mutex<ClientList>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open page. New pages start uncontrolled.
    pub fn add(&self, url: &str) -> ClientId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.clients.push(Client {
            id,
            url: url.to_string(),
            focused: false,
            controlled: false,
        });
        id
    }

    pub fn remove(&self, id: ClientId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.clients.len();
        inner.clients.retain(|c| c.id != id);
        inner.clients.len() != before
    }

    /// Get all clients
    pub fn match_all(&self) -> Vec<Client> {
        self.inner.lock().clients.clone()
    }

    pub fn get(&self, id: ClientId) -> Option<Client> {
        self.inner.lock().clients.iter().find(|c| c.id == id).cloned()
    }

    /// Clients not yet under this worker's control.
    pub fn uncontrolled(&self) -> usize {
        self.inner.lock().clients.iter().filter(|c| !c.controlled).count()
    }

    /// Take control of every client. Returns how many changed hands.
    pub fn claim(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut claimed = 0;
        for client in inner.clients.iter_mut().filter(|c| !c.controlled) {
            client.controlled = true;
            claimed += 1;
        }
        claimed
    }

    /// Focus a client, unfocusing the rest.
    pub fn focus(&self, id: ClientId) -> bool {
        let mut inner = self.inner.lock();
        if !inner.clients.iter().any(|c| c.id == id) {
            return false;
        }
        for client in inner.clients.iter_mut() {
            client.focused = client.id == id;
        }
        true
    }

    /// Open a new focused, controlled window.
    pub fn open_window(&self, url: &str) -> ClientId {
        let id = self.add(url);
        self.focus(id);
        let mut inner = self.inner.lock();
        if let Some(client) = inner.clients.iter_mut().find(|c| c.id == id) {
            client.controlled = true;
        }
        id
    }
}

// ── Install / Activate ──────────────────────────────────────

/// Outcome of precaching the static manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// Manifest entries stored, as resolved URLs.
    pub cached: Vec<String>,
    /// Manifest entries that could not be fetched or stored.
    pub skipped: Vec<String>,
}

/// Outcome of activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivateReport {
    /// Superseded partitions removed.
    pub deleted: Vec<String>,
    /// Clients newly taken under control.
    pub claimed: usize,
}

/// Populate the static partition from `manifest`.
///
/// Same-origin and cross-origin entries are fetched as two concurrent groups;
/// cross-origin entries use CORS mode. A failing entry is logged and
/// skipped, never failing the install. Only opening the partition can fail.
pub async fn precache(
    storage: &CacheStorage,
    network: &dyn Network,
    origin: &Url,
    names: &CacheNames,
    manifest: &[String],
) -> Result<InstallReport> {
    storage.open(names.static_name())?;

    let mut report = InstallReport::default();
    let mut same_origin = Vec::new();
    let mut cross_origin = Vec::new();
    for entry in manifest {
        match origin.join(entry) {
            Ok(url) if url.origin() == origin.origin() => same_origin.push(url),
            Ok(url) => cross_origin.push(url),
            Err(e) => {
                warn!("skipping manifest entry {entry:?}: {e}");
                report.skipped.push(entry.clone());
            }
        }
    }

    let fetch_group = |urls: Vec<Url>, mode: RequestMode| {
        join_all(urls.into_iter().map(move |url| async move {
            let request = Request::new(Method::Get, url).with_mode(mode);
            let result = network.fetch(&request).await;
            (request, result)
        }))
    };
    let (local, remote) = futures::join!(
        fetch_group(same_origin, RequestMode::SameOrigin),
        fetch_group(cross_origin, RequestMode::Cors),
    );

    for (request, result) in local.into_iter().chain(remote) {
        let url = request.url.to_string();
        match result {
            Ok(response) if response.ok() => {
                match storage.put(names.static_name(), &request, &response) {
                    Ok(()) => report.cached.push(url),
                    Err(e) => {
                        warn!("failed to store {url}: {e}");
                        report.skipped.push(url);
                    }
                }
            }
            Ok(response) => {
                warn!("precache skipped {url}: HTTP {}", response.status);
                report.skipped.push(url);
            }
            Err(e) => {
                warn!("precache skipped {url}: {e}");
                report.skipped.push(url);
            }
        }
    }

    info!(
        "install complete: {} cached, {} skipped",
        report.cached.len(),
        report.skipped.len()
    );
    Ok(report)
}

/// Delete every partition carrying this worker's prefix that is not one of
/// the two live partitions, then claim all clients. Both live partitions
/// exist afterwards.
pub fn purge_and_claim(
    storage: &CacheStorage,
    names: &CacheNames,
    clients: &Clients,
) -> Result<ActivateReport> {
    storage.open(names.static_name())?;
    storage.open(names.dynamic_name())?;

    let mut report = ActivateReport::default();
    for name in storage.keys() {
        if names.is_stale(&name) && storage.delete(&name)? {
            report.deleted.push(name);
        }
    }
    report.claimed = clients.claim();
    info!(
        "activate complete: {} partitions deleted, {} clients claimed",
        report.deleted.len(),
        report.claimed
    );
    Ok(report)
}
