//! Cache Storage
//!
//! Named cache partitions holding request → response snapshots. Storage is
//! in memory, optionally mirrored to a directory so partitions outlive the
//! process:
//!
//!   - `{root}/{partition}/_meta.json`: key → entry metadata
//!   - `{root}/{partition}/{hash}.body`: response body bytes
//!
//! Entries are keyed by method + full URL. Only retrieval methods can be
//! stored or looked up.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use spin::RwLock;

use crate::error::CacheError;
use crate::http::{Headers, Method, Request, Response};

const META_FILE: &str = "_meta.json";

// ── Types ───────────────────────────────────────────────────

/// Cache entry key: `METHOD:url`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for `request`, refusing mutating methods.
    pub fn for_request(request: &Request) -> Result<Self, CacheError> {
        if !request.method.is_retrieval() {
            return Err(CacheError::UnsafeMethod {
                method: request.method,
            });
        }
        Ok(Self(format!("{}:{}", request.method, request.url)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A stored response snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub url: String,
    pub method: Method,
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    /// Loaded from the body file, never written to metadata.
    #[serde(skip)]
    pub body: Vec<u8>,
    /// Insertion time, milliseconds since the Unix epoch.
    pub cached_at: i64,
    pub size: usize,
    /// Body file name within the partition directory.
    pub body_file: String,
}

impl CachedResponse {
    /// Rebuild a response from the snapshot.
    pub fn to_response(&self) -> Response {
        Response {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    fn is_expired(&self, max_age: Option<Duration>, now_ms: i64) -> bool {
        match max_age {
            Some(max_age) => {
                let age = now_ms.saturating_sub(self.cached_at);
                age < 0 || age as u128 > max_age.as_millis()
            }
            None => false,
        }
    }
}

/// One named partition.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    name: String,
    entries: BTreeMap<CacheKey, CachedResponse>,
    total_size: usize,
}

/// On-disk form of a partition's metadata.
#[derive(Serialize, Deserialize)]
struct PartitionMeta {
    name: String,
    entries: BTreeMap<String, CachedResponse>,
}

// ── Cache Implementation ────────────────────────────────────

impl Cache {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store an entry, replacing any previous one under the same key.
    /// Returns the entry's body file name.
    fn insert(&mut self, key: CacheKey, mut entry: CachedResponse) -> String {
        entry.body_file = match self.entries.get(&key) {
            Some(old) => old.body_file.clone(),
            None => self.free_body_file(&key),
        };
        if let Some(old) = self.entries.remove(&key) {
            self.total_size = self.total_size.saturating_sub(old.size);
        }
        self.total_size += entry.size;
        let body_file = entry.body_file.clone();
        self.entries.insert(key, entry);
        body_file
    }

    /// A body file name derived from the key hash, probing past names
    /// already taken by other keys.
    fn free_body_file(&self, key: &CacheKey) -> String {
        let base = format!("{:016x}", simple_hash(key.as_str()));
        let taken = |candidate: &str| self.entries.values().any(|e| e.body_file == candidate);
        let mut candidate = format!("{base}.body");
        let mut n = 1;
        while taken(&candidate) {
            candidate = format!("{base}-{n}.body");
            n += 1;
        }
        candidate
    }

    pub fn get(&self, key: &CacheKey) -> Option<&CachedResponse> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(CacheKey::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total body bytes held.
    pub fn size(&self) -> usize {
        self.total_size
    }
}

// ── CacheStorage ────────────────────────────────────────────

/// All partitions of one worker.
pub struct CacheStorage {
    root: Option<PathBuf>,
    caches: RwLock<BTreeMap<String, Cache>>,
    /// Serialises disk writes. Never held together with `caches`'s write lock.
    persist: Mutex<()>,
    max_age: RwLock<Option<Duration>>,
}

impl CacheStorage {
    /// Storage that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            root: None,
            caches: RwLock::new(BTreeMap::new()),
            persist: Mutex::new(()),
            max_age: RwLock::new(None),
        }
    }

    /// Storage mirrored under `root`, loading any partitions already there.
    pub fn open_dir(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| io_error(&root, source))?;

        let mut caches = BTreeMap::new();
        let listing = fs::read_dir(&root).map_err(|source| io_error(&root, source))?;
        for dirent in listing {
            let dirent = dirent.map_err(|source| io_error(&root, source))?;
            let dir = dirent.path();
            if !dir.join(META_FILE).is_file() {
                continue;
            }
            let cache = load_partition(&dir)?;
            debug!("loaded partition {} ({} entries)", cache.name, cache.len());
            caches.insert(cache.name.clone(), cache);
        }

        Ok(Self {
            root: Some(root),
            caches: RwLock::new(caches),
            persist: Mutex::new(()),
            max_age: RwLock::new(None),
        })
    }

    /// Treat entries older than `max_age` as misses.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        *self.max_age.get_mut() = max_age;
        self
    }

    /// Change the expiry on shared storage.
    pub fn set_max_age(&self, max_age: Option<Duration>) {
        *self.max_age.write() = max_age;
    }

    pub fn max_age(&self) -> Option<Duration> {
        *self.max_age.read()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Open (or create) a named partition.
    pub fn open(&self, name: &str) -> Result<(), CacheError> {
        validate_name(name)?;
        let created = {
            let mut caches = self.caches.write();
            if caches.contains_key(name) {
                false
            } else {
                caches.insert(name.to_string(), Cache::new(name));
                true
            }
        };
        if created {
            debug!("created partition {name}");
            self.persist(name, None)?;
        }
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.caches.read().contains_key(name)
    }

    /// Delete a partition and its directory. Returns whether it existed.
    pub fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let removed = self.caches.write().remove(name).is_some();
        if let Some(root) = &self.root {
            if validate_name(name).is_ok() {
                let _guard = self.persist_guard();
                let dir = root.join(name);
                if dir.exists() {
                    fs::remove_dir_all(&dir).map_err(|source| io_error(&dir, source))?;
                }
            }
        }
        if removed {
            info!("deleted partition {name}");
        }
        Ok(removed)
    }

    /// All partition names, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }

    /// Number of entries in a partition, if it exists.
    pub fn entry_count(&self, name: &str) -> Option<usize> {
        self.caches.read().get(name).map(Cache::len)
    }

    /// Store `response` for `request` in partition `name`, creating the
    /// partition if needed.
    pub fn put(&self, name: &str, request: &Request, response: &Response) -> Result<(), CacheError> {
        let key = CacheKey::for_request(request)?;
        validate_name(name)?;

        let entry = CachedResponse {
            url: request.url.to_string(),
            method: request.method,
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: response.body.clone(),
            cached_at: Utc::now().timestamp_millis(),
            size: response.body.len(),
            body_file: String::new(),
        };

        let body_file = {
            let mut caches = self.caches.write();
            caches
                .entry(name.to_string())
                .or_insert_with(|| Cache::new(name))
                .insert(key.clone(), entry)
        };
        debug!("cached {} in {name} ({body_file})", key.as_str());

        self.persist(name, Some(&key))
    }

    /// Look up `request` in one partition.
    pub fn match_in(&self, name: &str, request: &Request) -> Option<Response> {
        let key = CacheKey::for_request(request).ok()?;
        let caches = self.caches.read();
        let entry = caches.get(name)?.get(&key)?;
        if entry.is_expired(self.max_age(), Utc::now().timestamp_millis()) {
            debug!("expired entry {} in {name}", key.as_str());
            return None;
        }
        Some(entry.to_response())
    }

    /// Look up `request` in each partition of `order`, returning the first
    /// hit and the partition it came from.
    pub fn match_any<'a>(&self, request: &Request, order: &[&'a str]) -> Option<(&'a str, Response)> {
        order
            .iter()
            .find_map(|name| self.match_in(name, request).map(|resp| (*name, resp)))
    }

    // ── Persistence ─────────────────────────────────────────

    fn persist_guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.persist.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mirror partition `name` to disk. The snapshot is taken after the
    /// persistence lock is acquired, so the last writer leaves the latest
    /// in-memory state on disk.
    fn persist(&self, name: &str, written: Option<&CacheKey>) -> Result<(), CacheError> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        let _guard = self.persist_guard();

        let Some(snapshot) = self.caches.read().get(name).cloned() else {
            // Deleted concurrently.
            return Ok(());
        };

        let dir = root.join(name);
        fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;

        for (key, entry) in &snapshot.entries {
            let path = dir.join(&entry.body_file);
            if Some(key) == written || !path.exists() {
                write_atomic(&path, &entry.body)?;
            }
        }

        let meta = PartitionMeta {
            name: snapshot.name.clone(),
            entries: snapshot
                .entries
                .iter()
                .map(|(key, entry)| (key.as_str().to_string(), entry.clone()))
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&meta)?;
        write_atomic(&dir.join(META_FILE), &json)?;

        remove_orphan_bodies(&dir, &snapshot);
        Ok(())
    }
}

impl Default for CacheStorage {
    fn default() -> Self {
        Self::in_memory()
    }
}

// ── Helpers ─────────────────────────────────────────────────

fn load_partition(dir: &Path) -> Result<Cache, CacheError> {
    let meta_path = dir.join(META_FILE);
    let bytes = fs::read(&meta_path).map_err(|source| io_error(&meta_path, source))?;
    let meta: PartitionMeta = serde_json::from_slice(&bytes)?;

    let mut cache = Cache::new(&meta.name);
    for (key, mut entry) in meta.entries {
        let body_path = dir.join(&entry.body_file);
        match fs::read(&body_path) {
            Ok(body) => {
                entry.size = body.len();
                entry.body = body;
                cache.total_size += entry.size;
                cache.entries.insert(CacheKey(key), entry);
            }
            Err(e) => warn!("dropping {key} from {}: {e}", meta.name),
        }
    }
    Ok(cache)
}

fn remove_orphan_bodies(dir: &Path, snapshot: &Cache) {
    let Ok(listing) = fs::read_dir(dir) else {
        return;
    };
    for dirent in listing.flatten() {
        let file_name = dirent.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if file_name.ends_with(".body")
            && !snapshot.entries.values().any(|e| e.body_file == file_name)
        {
            let _ = fs::remove_file(dirent.path());
        }
    }
}

/// Write to a sibling temp file, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).map_err(|source| io_error(&tmp, source))?;
    fs::rename(&tmp, path).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: io::Error) -> CacheError {
    CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Partition names become directory names.
fn validate_name(name: &str) -> Result<(), CacheError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
    if bad {
        return Err(CacheError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// djb2 string hash.
fn simple_hash(s: &str) -> u64 {
    let mut h: u64 = 5381;
    for b in s.bytes() {
        h = h.wrapping_mul(33).wrapping_add(b as u64);
    }
    h
}

// ── Tests ───────────────────────────────────────────────────
