//! Request classification.
//!
//! `classify` is a pure function of method, URL and `Accept` header. It
//! decides whether the worker intercepts a request and, if so, which
//! strategy handles it.

use serde::Serialize;

use crate::config::WorkerConfig;
use crate::http::Request;

/// Strategy selector for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    /// Cache-first with background refresh.
    StaticFile,
    /// Network-first with cache fallback.
    ApiCall,
    /// Network-first with shell fallback.
    PageNavigation,
    /// Straight to the network.
    Other,
}

/// Routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted; the page talks to the network itself.
    Bypass,
    Handle(RequestKind),
}

/// Classify `request`.
pub fn classify(request: &Request, config: &WorkerConfig) -> Route {
    if !matches!(request.url.scheme(), "http" | "https") || !request.method.is_retrieval() {
        return Route::Bypass;
    }

    let path = request.path();
    let kind = if is_static_path(path, &config.static_extensions) {
        RequestKind::StaticFile
    } else if path.starts_with(&config.api_prefix) {
        RequestKind::ApiCall
    } else if request.accepts_html() {
        RequestKind::PageNavigation
    } else {
        RequestKind::Other
    };
    Route::Handle(kind)
}

fn is_static_path(path: &str, extensions: &[String]) -> bool {
    path == "/" || path.ends_with(".html") || extensions.iter().any(|ext| path.ends_with(ext.as_str()))
}

/// Whether a successful API response for `url` may be stored.
pub fn is_cacheable_api(url: &str, config: &WorkerConfig) -> bool {
    config
        .cacheable_endpoints
        .iter()
        .any(|endpoint| url.contains(endpoint.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    fn route(url: &str, accept: Option<&str>) -> Route {
        let mut request = Request::get(url).unwrap();
        if let Some(accept) = accept {
            request = request.with_header("Accept", accept);
        }
        classify(&request, &WorkerConfig::default())
    }

    #[test]
    fn test_static_files() {
        let statik = Route::Handle(RequestKind::StaticFile);
        assert_eq!(route("http://localhost:8080/", None), statik);
        assert_eq!(route("http://localhost:8080/styles/mobile.css", None), statik);
        assert_eq!(route("http://localhost:8080/src/index.html", Some("text/html")), statik);
        assert_eq!(route("https://fonts.gstatic.com/s/a.woff2", None), statik);
        // Extension wins over the API prefix.
        assert_eq!(route("http://localhost:8080/api/export.js", None), statik);
    }

    #[test]
    fn test_api_navigation_other() {
        assert_eq!(
            route("http://localhost:8080/api/projects?page=2", Some("text/html")),
            Route::Handle(RequestKind::ApiCall)
        );
        assert_eq!(
            route("http://localhost:8080/projects/12", Some("text/html,*/*")),
            Route::Handle(RequestKind::PageNavigation)
        );
        assert_eq!(
            route("http://localhost:8080/manifest.json", Some("application/json")),
            Route::Handle(RequestKind::Other)
        );
        // "/apis/" does not carry the "/api/" prefix.
        assert_eq!(
            route("http://localhost:8080/apis/x", None),
            Route::Handle(RequestKind::Other)
        );
    }

    #[test]
    fn test_bypass() {
        assert_eq!(route("chrome-extension://abc/script.js", None), Route::Bypass);
        assert_eq!(route("data:text/plain,hello", None), Route::Bypass);

        let post = Request::get("http://localhost:8080/api/projects").unwrap();
        let post = Request { method: Method::Post, ..post };
        assert_eq!(classify(&post, &WorkerConfig::default()), Route::Bypass);
    }

    #[test]
    fn test_cacheable_api() {
        let config = WorkerConfig::default();
        assert!(is_cacheable_api("http://localhost:8080/api/dashboard/stats", &config));
        assert!(is_cacheable_api("http://localhost:8080/api/projects/7/folders", &config));
        assert!(!is_cacheable_api("http://localhost:8080/api/auth/login", &config));
    }
}
