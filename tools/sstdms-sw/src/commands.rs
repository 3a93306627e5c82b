//! Subcommand handlers.
//!
//! Each handler opens the worker over the on-disk cache, runs one event,
//! and returns a JSON value for [`crate::output::emit`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use serde_json::{json, Value};
use sstdms_offline::background_sync::SyncQueue;
use sstdms_offline::lifecycle::WorkerState;
use sstdms_offline::message::{ClientMessage, MessageReply};
use sstdms_offline::{
    CacheStorage, Disconnected, FetchOutcome, FetchSource, HttpNetwork, Method, Network, Request,
    ServiceWorker, WorkerConfig,
};
use tokio::sync::oneshot;

use crate::cli::{EnqueueArgs, FetchArgs, PushArgs, SyncArgs};
use crate::error::SwError;

/// Looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG: &str = "sstdms-sw.toml";

const OUTBOX_FILE: &str = "outbox.json";

// ── Setup ────────────────────────────────────────────────────────────

/// Load `path`, else `sstdms-sw.toml` if present, else the defaults.
pub fn load_config(path: Option<&Path>) -> Result<WorkerConfig, SwError> {
    match path {
        Some(path) => Ok(WorkerConfig::load(path)?),
        None if Path::new(DEFAULT_CONFIG).is_file() => Ok(WorkerConfig::load(Path::new(DEFAULT_CONFIG))?),
        None => Ok(WorkerConfig::default()),
    }
}

pub fn outbox_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(OUTBOX_FILE)
}

/// The live network, or one that is always down.
pub fn network(offline: bool) -> Result<Arc<dyn Network>, SwError> {
    if offline {
        Ok(Arc::new(Disconnected))
    } else {
        Ok(Arc::new(HttpNetwork::new()?))
    }
}

/// A worker over the partitions and outbox stored in `cache_dir`.
pub fn open_worker(
    config: WorkerConfig,
    cache_dir: &Path,
    network: Arc<dyn Network>,
) -> Result<ServiceWorker, SwError> {
    let storage = CacheStorage::open_dir(cache_dir)?;
    let outbox = SyncQueue::open(outbox_path(cache_dir))?;
    debug!("opened {} ({} queued)", cache_dir.display(), outbox.len());
    Ok(ServiceWorker::new(config, Arc::new(storage), network)?.with_outbox(Arc::new(outbox)))
}

/// Resolve `target` against the configured origin; absolute URLs pass
/// through.
fn resolve(worker: &ServiceWorker, target: &str) -> Result<String, SwError> {
    worker
        .origin()
        .join(target)
        .map(|url| url.to_string())
        .map_err(|e| SwError::InvalidUrl {
            url: target.to_string(),
            reason: e.to_string(),
        })
}

fn parse_method(method: &str) -> Result<Method, SwError> {
    method.parse().map_err(SwError::UnknownMethod)
}

/// Restore an activated worker from disk.
fn require_active(worker: &ServiceWorker) -> Result<(), SwError> {
    if worker.resume() {
        return Ok(());
    }
    let version = worker.version().to_string();
    match worker.state() {
        WorkerState::Installed => Err(SwError::NotActive { version }),
        _ => Err(SwError::NotInstalled { version }),
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────

pub async fn install(worker: &ServiceWorker) -> Result<Value, SwError> {
    let report = worker.install().await?;
    Ok(json!({
        "version": worker.version(),
        "state": worker.state(),
        "partition": worker.names().static_name(),
        "cached": report.cached.len(),
        "skipped": report.skipped,
    }))
}

/// Activation for a version installed by an earlier invocation.
pub async fn activate(worker: &ServiceWorker) -> Result<Value, SwError> {
    let deleted = if worker.resume() {
        debug!("{} already active", worker.version());
        Vec::new()
    } else if worker.state() == WorkerState::Installed {
        worker.activate().await?.deleted
    } else {
        return Err(SwError::NotInstalled {
            version: worker.version().to_string(),
        });
    };
    Ok(json!({
        "version": worker.version(),
        "state": worker.state(),
        "deleted": deleted,
    }))
}

// ── Fetch ────────────────────────────────────────────────────────────

pub async fn fetch(worker: &ServiceWorker, args: &FetchArgs) -> Result<Value, SwError> {
    require_active(worker)?;

    let url = resolve(worker, &args.url)?;
    let mut request = Request::get(&url).map_err(|e| SwError::InvalidUrl {
        url: url.clone(),
        reason: e.to_string(),
    })?;
    request.method = parse_method(&args.method)?;
    if let Some(accept) = &args.accept {
        request = request.with_header("Accept", accept.as_str());
    }

    let (response, source) = match worker.fetch(request.clone()).await {
        FetchOutcome::Respond(handled) => (handled.response, Some(handled.source)),
        FetchOutcome::Bypass => (worker.network().fetch(&request).await?, None),
    };
    worker.settle().await;

    Ok(json!({
        "url": url,
        "method": request.method,
        "status": response.status,
        "status_text": response.status_text,
        "source": source.map_or(json!("bypass"), |s: FetchSource| json!(s)),
        "served_from": response.header("x-served-from"),
        "content_type": response.header("content-type"),
        "body": response.body_text(),
    }))
}

// ── Inspection ───────────────────────────────────────────────────────

pub fn caches(worker: &ServiceWorker) -> Result<Value, SwError> {
    let storage = worker.storage();
    let names = worker.names();
    let partitions: Vec<Value> = storage
        .keys()
        .into_iter()
        .map(|name| {
            json!({
                "current": names.is_current(&name),
                "stale": names.is_stale(&name),
                "entries": storage.entry_count(&name).unwrap_or(0),
                "name": name,
            })
        })
        .collect();
    Ok(json!({
        "root": storage.root().map(|p| p.display().to_string()),
        "partitions": partitions,
    }))
}

/// Ask the worker for its version over a message port.
pub async fn version(worker: &ServiceWorker) -> Result<Value, SwError> {
    let (tx, rx) = oneshot::channel();
    worker.message(ClientMessage::GetVersion, Some(tx)).await?;
    let version = match rx.await {
        Ok(MessageReply::Version { version }) => version,
        Err(_) => worker.version().to_string(),
    };
    Ok(json!({ "version": version }))
}

// ── Background sync ──────────────────────────────────────────────────

pub fn enqueue(worker: &ServiceWorker, args: &EnqueueArgs) -> Result<Value, SwError> {
    let url = resolve(worker, &args.url)?;
    let mut request = Request::get(&url).map_err(|e| SwError::InvalidUrl {
        url: url.clone(),
        reason: e.to_string(),
    })?;
    request.method = parse_method(&args.method)?;
    if let Some(body) = &args.body {
        request = request
            .with_header("Content-Type", "application/json")
            .with_body(body.as_bytes());
    }
    let id = worker.outbox().enqueue_request(&request)?;
    Ok(json!({
        "id": id,
        "queued": worker.outbox().len(),
    }))
}

pub async fn sync(worker: &ServiceWorker, args: &SyncArgs) -> Result<Value, SwError> {
    let tag = args.tag.as_deref().unwrap_or(&worker.config().sync_tag).to_string();
    match worker.sync(&tag).await {
        Some(report) => Ok(json!({
            "tag": tag,
            "replayed": report.replayed,
            "retained": report.retained,
            "dropped": report.dropped,
            "save_error": report.save_error,
        })),
        None => Ok(json!({ "tag": tag, "ignored": true })),
    }
}

// ── Push ─────────────────────────────────────────────────────────────

pub fn push(worker: &ServiceWorker, args: &PushArgs) -> Result<Value, SwError> {
    let notification = worker.push(args.payload.as_deref().map(str::as_bytes));
    Ok(serde_json::to_value(&notification)?)
}
