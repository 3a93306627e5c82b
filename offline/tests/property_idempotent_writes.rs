//! Property 1: Idempotent cache writes
//!
//! Writing the same request/response pair to a partition twice leaves the
//! partition's observable state identical to writing it once, in memory and
//! on disk.

mod common;

use proptest::prelude::*;
use sstdms_offline::{CacheStorage, Request, Response};

const PARTITION: &str = "sstdms-static-v1.0.0";

fn observe(storage: &CacheStorage, request: &Request) -> (Vec<String>, Option<usize>, Option<Response>) {
    (
        storage.keys(),
        storage.entry_count(PARTITION),
        storage.match_in(PARTITION, request),
    )
}

proptest! {
    #[test]
    fn double_write_equals_single_write(
        path in "/[a-z]{1,12}(/[a-z0-9]{1,8}){0,3}\\.(css|js|png|html)",
        status in 200u16..300,
        body in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let request = Request::get(&common::url(&path)).unwrap();
        let response = Response::new(status)
            .with_header("Content-Type", "application/octet-stream")
            .with_body(body);

        let once = CacheStorage::in_memory();
        once.put(PARTITION, &request, &response).unwrap();

        let twice = CacheStorage::in_memory();
        twice.put(PARTITION, &request, &response).unwrap();
        twice.put(PARTITION, &request, &response).unwrap();

        prop_assert_eq!(observe(&once, &request), observe(&twice, &request));
    }

    #[test]
    fn double_write_on_disk_reloads_identically(
        name in "[a-z]{1,10}",
        body in "[ -~]{0,128}",
    ) {
        let request = Request::get(&common::url(&format!("/js/{name}.js"))).unwrap();
        let response = Response::text(200, body);

        let once_dir = tempfile::tempdir().unwrap();
        CacheStorage::open_dir(once_dir.path()).unwrap()
            .put(PARTITION, &request, &response).unwrap();

        let twice_dir = tempfile::tempdir().unwrap();
        {
            let storage = CacheStorage::open_dir(twice_dir.path()).unwrap();
            storage.put(PARTITION, &request, &response).unwrap();
            storage.put(PARTITION, &request, &response).unwrap();
        }

        let once = CacheStorage::open_dir(once_dir.path()).unwrap();
        let twice = CacheStorage::open_dir(twice_dir.path()).unwrap();
        prop_assert_eq!(observe(&once, &request), observe(&twice, &request));

        let bodies = |dir: &std::path::Path| {
            std::fs::read_dir(dir.join(PARTITION)).unwrap()
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().map_or(false, |x| x == "body"))
                .count()
        };
        prop_assert_eq!(bodies(once_dir.path()), 1);
        prop_assert_eq!(bodies(twice_dir.path()), 1);
    }
}

#[test]
fn overwrite_with_new_response_keeps_one_entry() {
    let storage = CacheStorage::in_memory();
    let request = Request::get(&common::url("/styles/components.css")).unwrap();
    storage.put(PARTITION, &request, &Response::text(200, "a")).unwrap();
    storage.put(PARTITION, &request, &Response::text(200, "b")).unwrap();
    assert_eq!(storage.entry_count(PARTITION), Some(1));
    assert_eq!(storage.match_in(PARTITION, &request).unwrap().body, b"b");
}
