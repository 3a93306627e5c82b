//! Offline Responder
//!
//! The last resort when a strategy fails outright, plus the synthetic
//! responses every fallback path shares. Nothing here touches the network.

use log::debug;
use url::Url;

use crate::cache_storage::CacheStorage;
use crate::config::{CacheNames, WorkerConfig};
use crate::http::{Method, Request, Response};
use crate::strategy::{FetchSource, Handled};

/// Message carried by every synthetic offline response.
pub const OFFLINE_MESSAGE: &str = "오프라인 상태입니다";

/// Header marking an API response that was served from the dynamic cache.
pub const SERVED_FROM_HEADER: &str = "X-Served-From";

const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <title>SSTDMS - 오프라인</title>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>
      body {
        font-family: -apple-system, BlinkMacSystemFont, sans-serif;
        display: flex;
        align-items: center;
        justify-content: center;
        height: 100vh;
        margin: 0;
        background: linear-gradient(135deg, #1e3a8a 0%, #3b82f6 100%);
        color: white;
        text-align: center;
      }
      .container { max-width: 400px; padding: 2rem; }
      h1 { font-size: 2rem; margin-bottom: 1rem; }
      p { opacity: 0.9; line-height: 1.6; }
      .retry-btn {
        background: rgba(255,255,255,0.2);
        border: 1px solid rgba(255,255,255,0.3);
        color: white;
        padding: 0.75rem 1.5rem;
        border-radius: 8px;
        cursor: pointer;
        margin-top: 1rem;
      }
    </style>
  </head>
  <body>
    <div class="container">
      <h1>🌐 오프라인 상태</h1>
      <p>인터넷 연결을 확인하고 다시 시도해주세요.</p>
      <button class="retry-btn" onclick="window.location.reload()">다시 시도</button>
    </div>
  </body>
</html>
"#;

// ── Synthetic responses ─────────────────────────────────────

/// `503` JSON envelope returned for an uncached API call.
pub fn offline_envelope() -> Response {
    let body = serde_json::json!({
        "success": false,
        "message": OFFLINE_MESSAGE,
        "offline": true,
    });
    Response::new(503)
        .with_header("Content-Type", "application/json")
        .with_body(body.to_string())
}

/// Self-contained offline page with a reload button. Served as `200` so the
/// browser renders it.
pub fn offline_page() -> Response {
    Response::html(200, OFFLINE_PAGE)
}

/// Plain-text `503` for everything else.
pub fn offline_text() -> Response {
    Response::text(503, OFFLINE_MESSAGE)
}

/// The cached application shell, or the offline page when no shell
/// candidate is cached.
pub fn shell_or_offline_page(storage: &CacheStorage, config: &WorkerConfig, origin: &Url) -> Handled {
    let names = config.names();
    for path in &config.shell_paths {
        let Ok(url) = origin.join(path) else {
            continue;
        };
        let request = Request::new(Method::Get, url);
        if let Some(response) = storage.match_in(names.static_name(), &request) {
            debug!("serving cached shell {path}");
            return Handled::new(response, FetchSource::Cache);
        }
    }
    Handled::new(offline_page(), FetchSource::Synthetic)
}

// ── OfflineResponder ────────────────────────────────────────

/// Answers a request from cache alone.
pub struct OfflineResponder<'a> {
    storage: &'a CacheStorage,
    config: &'a WorkerConfig,
    names: &'a CacheNames,
    origin: &'a Url,
}

impl<'a> OfflineResponder<'a> {
    pub fn new(
        storage: &'a CacheStorage,
        config: &'a WorkerConfig,
        names: &'a CacheNames,
        origin: &'a Url,
    ) -> Self {
        Self {
            storage,
            config,
            names,
            origin,
        }
    }

    /// Exact match in the static then dynamic partition; failing that the
    /// shell (or offline page) for HTML requests and a plain-text `503`
    /// otherwise.
    pub fn respond(&self, request: &Request) -> Handled {
        if let Some((partition, response)) = self.storage.match_any(request, &self.names.search_order()) {
            debug!("offline hit for {} in {partition}", request.url);
            return Handled::new(response, FetchSource::Cache);
        }
        if request.accepts_html() {
            return shell_or_offline_page(self.storage, self.config, self.origin);
        }
        Handled::new(offline_text(), FetchSource::Synthetic)
    }
}
