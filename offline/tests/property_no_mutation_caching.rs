//! Property 2: No mutation caching
//!
//! For any request with a mutating method, the worker neither intercepts
//! it nor stores or reads any cache partition, whatever its path.

mod common;

use std::sync::Arc;

use proptest::prelude::*;
use sstdms_offline::error::CacheError;
use sstdms_offline::router::{classify, Route};
use sstdms_offline::{CacheStorage, FetchOutcome, Method, Request, Response, WorkerConfig};

fn mutating_method() -> impl Strategy<Value = Method> {
    prop_oneof![
        Just(Method::Post),
        Just(Method::Put),
        Just(Method::Delete),
        Just(Method::Patch),
        Just(Method::Options),
    ]
}

fn any_path() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("/".to_string()),
        "/api/(dashboard/stats|projects|documents|user/profile)(/[0-9]{1,4})?",
        "/[a-z]{1,10}\\.(css|js|png|woff2|html)",
        "/[a-z]{1,10}(/[a-z]{1,10})?",
    ]
}

proptest! {
    #[test]
    fn mutating_requests_are_bypassed(method in mutating_method(), path in any_path()) {
        let config = WorkerConfig::default();
        let url = url::Url::parse(&common::url(&path)).unwrap();
        let request = Request::new(method, url).with_header("Accept", "text/html");
        prop_assert_eq!(classify(&request, &config), Route::Bypass);

        let rt = common::current_thread();
        rt.block_on(async {
            let network = common::ScriptedNetwork::new();
            network.route(request.url.as_str(), Response::text(200, "mutated"));
            let sw = common::active_worker(Arc::clone(&network)).await;
            let before: Vec<_> = sw.storage().keys().iter()
                .map(|name| (name.clone(), sw.storage().entry_count(name)))
                .collect();
            let seen_before = network.seen().len();

            prop_assert_eq!(sw.fetch(request.clone()).await, FetchOutcome::Bypass);

            let after: Vec<_> = sw.storage().keys().iter()
                .map(|name| (name.clone(), sw.storage().entry_count(name)))
                .collect();
            prop_assert_eq!(before, after);
            prop_assert_eq!(network.seen().len(), seen_before);
            Ok(())
        })?;
    }

    #[test]
    fn storage_refuses_mutating_methods(method in mutating_method(), path in any_path()) {
        let storage = CacheStorage::in_memory();
        let url = url::Url::parse(&common::url(&path)).unwrap();
        let request = Request::new(method, url);

        let err = storage.put("sstdms-dynamic-v1.0.0", &request, &Response::new(200)).unwrap_err();
        let refused = matches!(err, CacheError::UnsafeMethod { .. });
        prop_assert!(refused);
        prop_assert!(storage.keys().is_empty());
        prop_assert!(storage.match_in("sstdms-dynamic-v1.0.0", &request).is_none());
    }
}

#[test]
fn get_of_same_url_is_still_served() {
    let rt = common::current_thread();
    rt.block_on(async {
        let network = common::ScriptedNetwork::new();
        let stats = common::url("/api/dashboard/stats");
        network.route(&stats, Response::text(200, r#"{"success":true}"#));
        let sw = common::active_worker(Arc::clone(&network)).await;
        let handled = sw.fetch(Request::get(&stats).unwrap()).await.handled().unwrap();
        assert_eq!(handled.response.status, 200);
        assert_eq!(sw.storage().entry_count("sstdms-dynamic-v1.0.0"), Some(1));
    });
}
