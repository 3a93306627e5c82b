//! Property 4: Static strategy correctness
//!
//! A cached static asset is served with the network unreachable. An
//! uncached asset fetched online is both returned and stored, so the next
//! offline request for it succeeds from cache.

mod common;

use std::sync::Arc;

use sstdms_offline::{CacheStorage, FetchSource, Request, Response, WorkerConfig};

#[tokio::test]
async fn cached_asset_served_offline() {
    let network = common::ScriptedNetwork::new();
    let sw = common::active_worker(Arc::clone(&network)).await;
    network.set_offline(true);

    let handled = sw
        .fetch(Request::get(&common::url("/styles/mobile.css")).unwrap())
        .await
        .handled()
        .unwrap();
    assert_eq!(handled.source, FetchSource::Cache);
    assert_eq!(handled.response.body, b"/styles/mobile.css");

    // The background refresh fails quietly.
    sw.settle().await;
}

#[tokio::test]
async fn uncached_asset_is_stored_then_served_offline() {
    let network = common::ScriptedNetwork::new();
    let sw = common::active_worker(Arc::clone(&network)).await;
    let logo = common::url("/images/hull-logo.svg");
    network.route(&logo, Response::new(200).with_header("Content-Type", "image/svg+xml").with_body("<svg/>"));

    let first = sw.fetch(Request::get(&logo).unwrap()).await.handled().unwrap();
    assert_eq!(first.source, FetchSource::Network);
    assert_eq!(first.response.body, b"<svg/>");

    network.set_offline(true);
    let second = sw.fetch(Request::get(&logo).unwrap()).await.handled().unwrap();
    assert_eq!(second.source, FetchSource::Cache);
    assert_eq!(second.response.body, b"<svg/>");
    assert_eq!(second.response.header("content-type"), Some("image/svg+xml"));
    sw.settle().await;
}

#[tokio::test]
async fn uncached_asset_offline_falls_through_to_responder() {
    let network = common::ScriptedNetwork::new();
    let sw = common::active_worker(Arc::clone(&network)).await;
    network.set_offline(true);

    let handled = sw
        .fetch(Request::get(&common::url("/js/missing.js")).unwrap())
        .await
        .handled()
        .unwrap();
    assert_eq!(handled.source, FetchSource::Synthetic);
    assert_eq!(handled.response.status, 503);
}

#[tokio::test]
async fn background_refresh_replaces_cached_copy() {
    let network = common::ScriptedNetwork::new();
    let sw = common::active_worker(Arc::clone(&network)).await;
    let app_js = common::url("/js/app.js");
    network.route(&app_js, Response::text(200, "console.log('v2')"));

    let stale = sw.fetch(Request::get(&app_js).unwrap()).await.handled().unwrap();
    assert_eq!(stale.response.body, b"/js/app.js");
    sw.settle().await;

    network.set_offline(true);
    let fresh = sw.fetch(Request::get(&app_js).unwrap()).await.handled().unwrap();
    assert_eq!(fresh.response.body_text(), "console.log('v2')");
    sw.settle().await;
}

#[tokio::test]
async fn cache_outlives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let network = common::ScriptedNetwork::new();
    let config = WorkerConfig::default();
    network.route_manifest(&config);
    {
        let storage = Arc::new(CacheStorage::open_dir(dir.path()).unwrap());
        let sw = common::worker_with(config.clone(), storage, Arc::clone(&network));
        sw.install().await.unwrap();
        sw.activate().await.unwrap();
    }

    network.set_offline(true);
    let storage = Arc::new(CacheStorage::open_dir(dir.path()).unwrap());
    let sw = common::worker_with(config, storage, Arc::clone(&network));
    assert!(sw.resume());
    let handled = sw
        .fetch(Request::get(&common::url("/js/auth.js")).unwrap())
        .await
        .handled()
        .unwrap();
    assert_eq!(handled.source, FetchSource::Cache);
    assert_eq!(handled.response.body, b"/js/auth.js");
    sw.settle().await;
}

#[tokio::test]
async fn configured_max_age_expires_cached_assets() {
    let network = common::ScriptedNetwork::new();
    let config = WorkerConfig {
        max_age_secs: Some(0),
        ..WorkerConfig::default()
    };
    network.route_manifest(&config);
    let sw = common::worker_with(config, Arc::new(CacheStorage::in_memory()), Arc::clone(&network));
    assert_eq!(sw.storage().max_age(), Some(std::time::Duration::ZERO));
    sw.install().await.unwrap();
    sw.activate().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    network.set_offline(true);
    let handled = sw
        .fetch(Request::get(&common::url("/js/app.js")).unwrap())
        .await
        .handled()
        .unwrap();
    assert_eq!(handled.source, FetchSource::Synthetic);
    assert_eq!(handled.response.status, 503);
}
