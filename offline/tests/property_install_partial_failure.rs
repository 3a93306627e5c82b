//! Property 9: Install partial failure
//!
//! A cross-origin manifest entry that 404s, or any entry whose fetch fails,
//! does not stop the other entries from being cached, and install still
//! completes.

mod common;

use std::sync::Arc;

use sstdms_offline::lifecycle::WorkerState;
use sstdms_offline::{CacheStorage, Request, Response, WorkerConfig};

const FONT: &str = "https://fonts.googleapis.com/css2?family=Noto+Sans+KR:wght@300;400;500;700&display=swap";

#[tokio::test]
async fn cross_origin_404_is_skipped() {
    let network = common::ScriptedNetwork::new();
    let config = WorkerConfig::default();
    network.route_manifest(&config);
    network.route(FONT, Response::new(404));
    let storage = Arc::new(CacheStorage::in_memory());
    let sw = common::worker_with(config.clone(), Arc::clone(&storage), Arc::clone(&network));

    let report = sw.install().await.unwrap();
    assert_eq!(sw.state(), WorkerState::Installed);
    assert_eq!(report.skipped, vec![FONT.to_string()]);
    assert_eq!(report.cached.len(), config.static_files.len() - 1);
    assert_eq!(
        storage.entry_count("sstdms-static-v1.0.0"),
        Some(config.static_files.len() - 1)
    );
    assert!(storage
        .match_in("sstdms-static-v1.0.0", &Request::get(FONT).unwrap())
        .is_none());
    assert!(storage
        .match_in("sstdms-static-v1.0.0", &Request::get(&common::url("/manifest.json")).unwrap())
        .is_some());
}

#[tokio::test]
async fn failing_entries_of_both_origins_are_skipped() {
    let network = common::ScriptedNetwork::new();
    let config = WorkerConfig::default();
    network.route_manifest(&config);
    network.fail(FONT);
    network.fail(&common::url("/icons/icon-512x512.png"));
    let storage = Arc::new(CacheStorage::in_memory());
    let sw = common::worker_with(config.clone(), Arc::clone(&storage), Arc::clone(&network));

    let report = sw.install().await.unwrap();
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(report.cached.len(), config.static_files.len() - 2);

    // Install finished normally, so activation proceeds.
    sw.activate().await.unwrap();
    assert_eq!(sw.state(), WorkerState::Activated);
}

#[tokio::test]
async fn everything_unreachable_still_installs() {
    let network = common::ScriptedNetwork::new();
    network.set_offline(true);
    let storage = Arc::new(CacheStorage::in_memory());
    let sw = common::worker_with(WorkerConfig::default(), Arc::clone(&storage), Arc::clone(&network));

    let report = sw.install().await.unwrap();
    assert!(report.cached.is_empty());
    assert_eq!(report.skipped.len(), WorkerConfig::default().static_files.len());
    assert!(storage.has("sstdms-static-v1.0.0"));
}
