//! Worker configuration.
//!
//! Every field defaults to the constants the mobile shell ships with, so an
//! empty TOML document is a complete configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Static manifest precached on install.
const DEFAULT_STATIC_FILES: &[&str] = &[
    "/",
    "/src/index.html",
    "/styles/mobile.css",
    "/styles/components.css",
    "/js/app.js",
    "/js/auth.js",
    "/js/api.js",
    "/js/notifications.js",
    "/js/offline.js",
    "/js/touch-handler.js",
    "/manifest.json",
    "https://fonts.googleapis.com/css2?family=Noto+Sans+KR:wght@300;400;500;700&display=swap",
    "/icons/icon-192x192.png",
    "/icons/icon-512x512.png",
];

const DEFAULT_STATIC_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2",
];

/// API paths whose successful responses are kept for offline use.
const DEFAULT_CACHEABLE_ENDPOINTS: &[&str] = &[
    "/api/dashboard/stats",
    "/api/projects",
    "/api/documents",
    "/api/user/profile",
];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ── WorkerConfig ────────────────────────────────────────────

/// Top-level worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Scope origin; relative manifest entries and shell paths resolve
    /// against it.
    pub origin: String,
    /// Prefix carried by every partition this worker owns.
    pub cache_prefix: String,
    /// Version token appended to partition names.
    pub version: String,
    pub static_files: Vec<String>,
    pub static_extensions: Vec<String>,
    pub api_prefix: String,
    pub cacheable_endpoints: Vec<String>,
    /// Application shell candidates, tried in order.
    pub shell_paths: Vec<String>,
    pub sync_tag: String,
    /// Entries older than this are treated as misses. `None` keeps entries
    /// until their partition is deleted.
    pub max_age_secs: Option<u64>,
    pub push: PushDefaults,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            cache_prefix: "sstdms-".to_string(),
            version: "v1.0.0".to_string(),
            static_files: strings(DEFAULT_STATIC_FILES),
            static_extensions: strings(DEFAULT_STATIC_EXTENSIONS),
            api_prefix: "/api/".to_string(),
            cacheable_endpoints: strings(DEFAULT_CACHEABLE_ENDPOINTS),
            shell_paths: strings(&["/src/index.html", "/"]),
            sync_tag: "background-sync".to_string(),
            max_age_secs: None,
            push: PushDefaults::default(),
        }
    }
}

impl WorkerConfig {
    /// Load a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.origin_url()?;
        Ok(config)
    }

    /// The parsed scope origin.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin).map_err(|e| ConfigError::InvalidOrigin {
            origin: self.origin.clone(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::InvalidOrigin {
                origin: self.origin.clone(),
                reason: format!("unsupported scheme {other}"),
            }),
        }
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }

    pub fn names(&self) -> CacheNames {
        CacheNames::new(&self.cache_prefix, &self.version)
    }
}

// ── Push defaults ───────────────────────────────────────────

/// A notification action button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionConfig {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl ActionConfig {
    fn new(action: &str, title: &str, icon: &str) -> Self {
        Self {
            action: action.to_string(),
            title: title.to_string(),
            icon: Some(icon.to_string()),
        }
    }
}

/// Fallback notification content used when a push payload omits a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushDefaults {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub actions: Vec<ActionConfig>,
}

impl Default for PushDefaults {
    fn default() -> Self {
        Self {
            title: "SSTDMS".to_string(),
            body: "새로운 알림이 있습니다".to_string(),
            icon: "/icons/icon-192x192.png".to_string(),
            badge: "/icons/badge-72x72.png".to_string(),
            vibrate: vec![100, 50, 100],
            actions: vec![
                ActionConfig::new("explore", "확인", "/icons/checkmark.png"),
                ActionConfig::new("close", "닫기", "/icons/xmark.png"),
            ],
        }
    }
}

// ── CacheNames ──────────────────────────────────────────────

/// Partition names derived from a prefix and a version token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    prefix: String,
    static_name: String,
    dynamic_name: String,
    version_label: String,
}

impl CacheNames {
    pub fn new(prefix: &str, version: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            static_name: format!("{prefix}static-{version}"),
            dynamic_name: format!("{prefix}dynamic-{version}"),
            version_label: format!("{prefix}mobile-{version}"),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn static_name(&self) -> &str {
        &self.static_name
    }

    pub fn dynamic_name(&self) -> &str {
        &self.dynamic_name
    }

    /// The string reported to `GET_VERSION`.
    pub fn version_label(&self) -> &str {
        &self.version_label
    }

    /// Whether `name` is one of the two live partitions.
    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_name || name == self.dynamic_name
    }

    /// Whether `name` belongs to this worker but is not live.
    pub fn is_stale(&self, name: &str) -> bool {
        name.starts_with(&self.prefix) && !self.is_current(name)
    }

    /// Lookup order used by the offline responder.
    pub fn search_order(&self) -> [&str; 2] {
        [&self.static_name, &self.dynamic_name]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = WorkerConfig::from_toml("").unwrap();
        assert_eq!(config, WorkerConfig::default());
        assert_eq!(config.static_files.len(), 14);
        assert_eq!(config.max_age(), None);
    }

    #[test]
    fn test_sample_file_matches_defaults() {
        let config = WorkerConfig::from_toml(include_str!("../../sstdms-sw.toml")).unwrap();
        assert_eq!(config, WorkerConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = WorkerConfig::from_toml(
            r#"
            version = "v2.0.0"
            max_age_secs = 60

            [push]
            title = "Yard"
            "#,
        )
        .unwrap();
        assert_eq!(config.names().static_name(), "sstdms-static-v2.0.0");
        assert_eq!(config.max_age(), Some(Duration::from_secs(60)));
        assert_eq!(config.push.title, "Yard");
        assert_eq!(config.push.body, "새로운 알림이 있습니다");
        assert_eq!(config.api_prefix, "/api/");
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let err = WorkerConfig::from_toml(r#"origin = "ftp://files.local""#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOrigin { .. }));
        let err = WorkerConfig::from_toml(r#"origin = "not a url""#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOrigin { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = WorkerConfig::load(Path::new("/nonexistent/sstdms-sw.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_cache_names() {
        let names = CacheNames::new("sstdms-", "v1.0.0");
        assert_eq!(names.static_name(), "sstdms-static-v1.0.0");
        assert_eq!(names.dynamic_name(), "sstdms-dynamic-v1.0.0");
        assert_eq!(names.version_label(), "sstdms-mobile-v1.0.0");
        assert!(names.is_stale("sstdms-static-v0.9.0"));
        assert!(!names.is_stale("sstdms-dynamic-v1.0.0"));
        assert!(!names.is_stale("other-app-v1"));
    }
}
