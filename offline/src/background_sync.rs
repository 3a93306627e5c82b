//! Background Sync
//!
//! An outbox of deferred writes, replayed one entry at a time when a sync
//! event fires. Entries that reach the server are removed, entries whose
//! replay fails in transport stay for the next sync, and entries whose URL
//! no longer parses are dropped.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, NetworkError, Result};
use crate::http::{Headers, Method, Request};
use crate::network::Network;

// ── Types ───────────────────────────────────────────────────

/// One deferred request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: String,
    pub url: String,
    pub method: Method,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl OutboxEntry {
    pub fn new(id: impl Into<String>, method: Method, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            method,
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The request to replay, verbatim.
    pub fn to_request(&self) -> std::result::Result<Request, NetworkError> {
        let url = Url::parse(&self.url)
            .map_err(|e| NetworkError::InvalidRequest(format!("{}: {e}", self.url)))?;
        let mut request = Request::new(self.method, url);
        request.headers = self.headers.clone();
        request.body = self.body.as_ref().map(|b| b.clone().into_bytes());
        Ok(request)
    }
}

/// Outcome of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Entries replayed and removed.
    pub replayed: Vec<String>,
    /// Entries left for the next sync.
    pub retained: Vec<String>,
    /// Entries discarded because they can never be replayed.
    pub dropped: Vec<String>,
    /// Set when the outbox file could not be rewritten after a removal.
    /// Removed entries stay removed in memory and may replay again after a
    /// restart.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_error: Option<String>,
}

// ── SyncQueue ───────────────────────────────────────────────

/// The outbox, in memory or backed by a JSON file.
#[derive(Debug)]
pub struct SyncQueue {
    path: Option<PathBuf>,
    entries: spin::Mutex<Vec<OutboxEntry>>,
    seq: AtomicU64,
}

impl SyncQueue {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: spin::Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Open the outbox stored at `path`; a missing file is an empty outbox.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let bytes = fs::read(&path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_slice(&bytes)?
        } else {
            Vec::new()
        };
        Ok(Self {
            path: Some(path),
            entries: spin::Mutex::new(entries),
            seq: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append an entry.
    pub fn enqueue(&self, entry: OutboxEntry) -> Result<()> {
        debug!("queued {} {} as {}", entry.method, entry.url, entry.id);
        self.entries.lock().push(entry);
        self.save()
    }

    /// Append `request` under a fresh id. Returns the id.
    pub fn enqueue_request(&self, request: &Request) -> Result<String> {
        let id = self.next_id();
        let entry = OutboxEntry {
            id: id.clone(),
            url: request.url.to_string(),
            method: request.method,
            headers: request.headers.clone(),
            body: request
                .body
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).into_owned()),
        };
        self.enqueue(entry)?;
        Ok(id)
    }

    fn next_id(&self) -> String {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", Utc::now().timestamp_millis())
    }

    pub fn entries(&self) -> Vec<OutboxEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove the entry with `id`.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let removed = self.forget(id);
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    fn forget(&self, id: &str) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Replay every queued entry in order. A server response of any status
    /// removes the entry; a transport failure keeps it and moves on. Every
    /// entry is attempted even when the outbox file cannot be rewritten.
    pub async fn drain(&self, network: &dyn Network) -> SyncReport {
        let mut report = SyncReport::default();
        for entry in self.entries() {
            let request = match entry.to_request() {
                Ok(request) => request,
                Err(e) => {
                    warn!("dropping sync {}: {e}", entry.id);
                    self.forget(&entry.id);
                    report.dropped.push(entry.id);
                    self.save_into(&mut report);
                    continue;
                }
            };
            match network.fetch(&request).await {
                Ok(response) => {
                    if !response.ok() {
                        warn!("sync {} replayed with HTTP {}", entry.id, response.status);
                    }
                    self.forget(&entry.id);
                    report.replayed.push(entry.id);
                    self.save_into(&mut report);
                }
                Err(e) => {
                    warn!("sync {} failed, keeping it: {e}", entry.id);
                    report.retained.push(entry.id);
                }
            }
        }
        info!(
            "background sync complete: {} replayed, {} retained, {} dropped",
            report.replayed.len(),
            report.retained.len(),
            report.dropped.len()
        );
        report
    }

    /// Persist after a removal, keeping the first failure in `report`.
    fn save_into(&self, report: &mut SyncReport) {
        if let Err(e) = self.save() {
            warn!("outbox not saved: {e}");
            report.save_error.get_or_insert_with(|| e.to_string());
        }
    }

    /// Write the outbox via a temp file and rename.
    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&*self.entries.lock())?;
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| Error::Io { path, source }
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(io_err(&tmp))?;
        fs::rename(&tmp, path).map_err(io_err(path))?;
        Ok(())
    }
}

impl Default for SyncQueue {
    fn default() -> Self {
        Self::in_memory()
    }
}
