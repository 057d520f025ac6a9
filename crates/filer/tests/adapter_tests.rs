//! End-to-end behaviour of a volume: index plus physical stores.

mod common;

use bytes::Bytes;
use common::*;
use filer::FilerError;
use filer_core::{StrategyOptions, Visibility};
use filer_metadata::MetadataRepository;
use filer_storage::{MemoryBackend, ObjectStore};
use futures::TryStreamExt;
use std::sync::Arc;

fn memory() -> Arc<MemoryBackend> {
    Arc::new(MemoryBackend::new())
}

fn physical_key(metadata: &filer_core::Metadata, disk: &str) -> String {
    metadata.backing_data.get_disk(disk).unwrap().path.clone()
}

#[tokio::test]
async fn never_written_paths_are_not_found() {
    let volume = TestVolume::new().await;
    let adapter = &volume.adapter;

    assert!(matches!(adapter.read("nope.txt").await, Err(FilerError::NotFound(p)) if p == "nope.txt"));
    assert!(adapter.read_stream("nope.txt").await.is_err());
    assert!(adapter.path_metadata("nope.txt").await.unwrap_err().is_not_found());
    assert!(adapter.get_size("nope.txt").await.unwrap_err().is_not_found());
    assert!(adapter.get_mimetype("nope.txt").await.unwrap_err().is_not_found());
    assert!(adapter.get_visibility("nope.txt").await.unwrap_err().is_not_found());
    assert!(adapter.get_last_modified("nope.txt").await.unwrap_err().is_not_found());
    assert!(adapter.attributes("nope.txt").await.unwrap_err().is_not_found());
    assert!(adapter.delete("nope.txt").await.unwrap_err().is_not_found());
    assert!(!adapter.exists("nope.txt").await.unwrap());
}

#[tokio::test]
async fn round_trips_small_and_large_files() {
    let volume = TestVolume::new().await;
    let adapter = &volume.adapter;

    let large: Vec<u8> = (0..200 * 1024).map(|i| (i % 251) as u8).collect();
    let cases: [(&str, Bytes); 3] = [
        ("empty.bin", Bytes::new()),
        ("one.bin", Bytes::from_static(b"x")),
        ("dir/large.bin", Bytes::from(large)),
    ];

    for (path, content) in &cases {
        let metadata = adapter.write(path, content.clone()).await.unwrap();
        assert_eq!(metadata.size, content.len() as u64);
        assert_eq!(&adapter.read(path).await.unwrap(), content);

        let chunks: Vec<Bytes> = adapter
            .read_stream(path)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), content.to_vec());
    }

    let large = adapter.path_metadata("dir/large.bin").await.unwrap();
    let key = physical_key(&large, "local");
    assert_eq!(volume.store.get(&key).await.unwrap().len(), 200 * 1024);
    assert!(!volume.store.exists("dir/large.bin").await.unwrap());
}

#[tokio::test]
async fn write_records_backing_data_for_accepting_store_only() {
    let healthy = memory();
    let adapter = adapter(
        vec![named("b1", Arc::new(FailingBackend)), named("b2", healthy.clone())],
        vec![],
    );

    let metadata = adapter
        .write("a.txt", Bytes::from_static(b"hello"))
        .await
        .unwrap();

    assert_eq!(metadata.backing_data.disks().collect::<Vec<_>>(), vec!["b2"]);
    let indexed = adapter.path_metadata("a.txt").await.unwrap();
    assert_eq!(indexed.backing_data, metadata.backing_data);
    assert_eq!(adapter.read("a.txt").await.unwrap(), "hello");
}

#[tokio::test]
async fn failed_write_records_nothing() {
    let adapter = adapter(vec![named("b1", Arc::new(FailingBackend))], vec![]);

    let err = adapter
        .write("a.txt", Bytes::from_static(b"a"))
        .await
        .unwrap_err();

    assert!(matches!(err, FilerError::WriteFailed { .. }));
    assert!(!adapter.exists("a.txt").await.unwrap());
}

#[tokio::test]
async fn attributes_derive_from_content() {
    let volume = TestVolume::new().await;
    let adapter = &volume.adapter;

    let written = adapter
        .write("notes/today.txt", Bytes::from_static(b"plain words"))
        .await
        .unwrap();

    assert_eq!(adapter.get_size("notes/today.txt").await.unwrap(), 11);
    assert_eq!(adapter.get_mimetype("notes/today.txt").await.unwrap(), "text/plain");
    assert_eq!(
        adapter.get_visibility("notes/today.txt").await.unwrap(),
        Visibility::Private
    );
    assert_eq!(
        adapter.get_last_modified("notes/today.txt").await.unwrap(),
        written.timestamp
    );
    assert_eq!(
        written.etag.as_deref(),
        Some(filer_core::hash::etag(b"plain words").as_str())
    );

    let attributes = adapter.attributes("notes/today.txt").await.unwrap();
    assert_eq!(attributes.size, 11);
    assert_eq!(attributes.mimetype, "text/plain");
    assert_eq!(attributes.visibility, Visibility::Private);
    assert_eq!(attributes.last_modified, written.timestamp);
}

#[tokio::test]
async fn rewrite_replaces_bytes_and_keeps_identity() {
    let volume = TestVolume::new().await;
    let adapter = &volume.adapter;

    let first = adapter.write("a.txt", Bytes::from_static(b"one")).await.unwrap();
    let second = adapter.write("a.txt", Bytes::from_static(b"three")).await.unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.size, 5);
    assert_eq!(adapter.read("a.txt").await.unwrap(), "three");
}

#[tokio::test]
async fn rewrite_removes_previous_bytes_and_keeps_visibility() {
    let store = memory();
    let adapter = adapter(vec![named("local", store.clone())], vec![]);
    let first = adapter.write("a.txt", Bytes::from_static(b"one")).await.unwrap();
    adapter.set_visibility("a.txt", Visibility::Public).await.unwrap();

    let second = adapter.write("a.txt", Bytes::from_static(b"two")).await.unwrap();

    assert_ne!(physical_key(&first, "local"), physical_key(&second, "local"));
    assert!(!store.exists(&physical_key(&first, "local")).await.unwrap());
    assert_eq!(store.len().await, 1);
    assert_eq!(second.visibility, Visibility::Public);
}

#[tokio::test]
async fn failed_rewrite_keeps_previous_file() {
    let store = Arc::new(SwitchableBackend::default());
    let adapter = adapter(vec![named("local", store.clone())], vec![]);
    let first = adapter.write("a.txt", Bytes::from_static(b"kept")).await.unwrap();

    store.set_writable(false);
    let err = adapter
        .write("a.txt", Bytes::from_static(b"lost?"))
        .await
        .unwrap_err();

    assert!(matches!(err, FilerError::WriteFailed { .. }));
    assert_eq!(adapter.read("a.txt").await.unwrap(), "kept");
    assert_eq!(adapter.path_metadata("a.txt").await.unwrap(), first);
}

#[tokio::test]
async fn rewrite_survives_undeletable_previous_bytes() {
    let sticky = Arc::new(DeleteFailingBackend::default());
    let adapter = adapter(vec![named("sticky", sticky.clone())], vec![]);
    adapter.write("a.txt", Bytes::from_static(b"old")).await.unwrap();

    adapter.write("a.txt", Bytes::from_static(b"new")).await.unwrap();

    assert_eq!(adapter.read("a.txt").await.unwrap(), "new");
}

#[tokio::test]
async fn double_delete_reports_not_found() {
    let volume = TestVolume::new().await;
    let adapter = &volume.adapter;
    let written = adapter.write("a.txt", Bytes::from_static(b"a")).await.unwrap();

    adapter.delete("a.txt").await.unwrap();
    assert!(!volume.store.exists(&physical_key(&written, "local")).await.unwrap());
    assert!(!adapter.exists("a.txt").await.unwrap());

    assert!(adapter.delete("a.txt").await.unwrap_err().is_not_found());
    assert!(adapter.list_contents("", true).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_failure_keeps_index_entry() {
    let sticky = Arc::new(DeleteFailingBackend::default());
    let adapter = adapter(vec![named("sticky", sticky.clone())], vec![]);
    adapter.write("a.txt", Bytes::from_static(b"a")).await.unwrap();

    let err = adapter.delete("a.txt").await.unwrap_err();

    assert!(matches!(err, FilerError::DeleteFailed { ref backend, .. } if backend == "sticky"));
    assert!(adapter.exists("a.txt").await.unwrap());
    assert_eq!(adapter.read("a.txt").await.unwrap(), "a");
}

#[tokio::test]
async fn rename_preserves_content() {
    let volume = TestVolume::new().await;
    let adapter = &volume.adapter;
    let original = adapter
        .write("old/name.txt", Bytes::from_static(b"payload"))
        .await
        .unwrap();

    adapter.rename("old/name.txt", "new/name.txt").await.unwrap();

    assert!(!adapter.exists("old/name.txt").await.unwrap());
    assert_eq!(adapter.read("new/name.txt").await.unwrap(), "payload");
    let moved = adapter.path_metadata("new/name.txt").await.unwrap();
    assert_eq!(moved.id, original.id);
    // Bytes stay under the key they were written with.
    assert_eq!(moved.backing_data, original.backing_data);

    assert!(
        adapter
            .move_file("old/name.txt", "elsewhere.txt")
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn rename_over_existing_destination_removes_its_bytes() {
    let volume = TestVolume::new().await;
    let adapter = &volume.adapter;
    adapter.write("a.txt", Bytes::from_static(b"source")).await.unwrap();
    let target = adapter.write("b.txt", Bytes::from_static(b"target")).await.unwrap();

    adapter.rename("a.txt", "b.txt").await.unwrap();

    assert_eq!(adapter.read("b.txt").await.unwrap(), "source");
    assert!(!volume.store.exists(&physical_key(&target, "local")).await.unwrap());
    let paths: Vec<String> = adapter
        .list_contents("", true)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.path)
        .collect();
    assert_eq!(paths, vec!["b.txt"]);
}

#[tokio::test]
async fn moved_from_path_accepts_new_content() {
    let adapter = adapter(vec![named("local", memory())], vec![]);
    adapter.write("p.txt", Bytes::from_static(b"first")).await.unwrap();
    adapter.rename("p.txt", "q.txt").await.unwrap();
    assert!(!adapter.exists("p.txt").await.unwrap());

    adapter.write("p.txt", Bytes::from_static(b"second")).await.unwrap();

    assert_eq!(adapter.read("p.txt").await.unwrap(), "second");
    assert_eq!(adapter.read("q.txt").await.unwrap(), "first");
}

#[tokio::test]
async fn copy_onto_moved_from_path() {
    let adapter = adapter(vec![named("local", memory())], vec![]);
    adapter.write("p.txt", Bytes::from_static(b"payload")).await.unwrap();
    adapter.move_file("p.txt", "q.txt").await.unwrap();

    adapter.copy("q.txt", "p.txt").await.unwrap();

    assert_eq!(adapter.read("p.txt").await.unwrap(), "payload");
    adapter.delete("q.txt").await.unwrap();
    assert_eq!(adapter.read("p.txt").await.unwrap(), "payload");
}

#[tokio::test]
async fn copy_is_isolated_from_source() {
    let volume = TestVolume::new().await;
    let adapter = &volume.adapter;
    let source = adapter.write("src.txt", Bytes::from_static(b"shared")).await.unwrap();

    let copy = adapter.copy("src.txt", "dst.txt").await.unwrap();
    assert_ne!(copy.id, source.id);
    assert_eq!(copy.etag, source.etag);
    assert_eq!(adapter.read("dst.txt").await.unwrap(), "shared");

    adapter.write("src.txt", Bytes::from_static(b"changed")).await.unwrap();
    assert_eq!(adapter.read("dst.txt").await.unwrap(), "shared");

    adapter.delete("src.txt").await.unwrap();
    assert_eq!(adapter.read("dst.txt").await.unwrap(), "shared");
}

#[tokio::test]
async fn copy_over_existing_destination_replaces_it() {
    let volume = TestVolume::new().await;
    let adapter = &volume.adapter;
    adapter.write("src.txt", Bytes::from_static(b"new")).await.unwrap();
    adapter.write("dst.txt", Bytes::from_static(b"old")).await.unwrap();

    adapter.copy("src.txt", "dst.txt").await.unwrap();

    assert_eq!(adapter.read("dst.txt").await.unwrap(), "new");
    assert_eq!(adapter.read("src.txt").await.unwrap(), "new");
}

#[tokio::test]
async fn listing_semantics() {
    let volume = TestVolume::new().await;
    let adapter = &volume.adapter;
    for path in ["a.txt", "x/b.txt", "x/c.txt", "x/y/d.txt"] {
        adapter
            .write(path, Bytes::copy_from_slice(path.as_bytes()))
            .await
            .unwrap();
    }

    let paths = |records: Vec<filer_core::Metadata>| -> Vec<String> {
        records.into_iter().map(|m| m.path).collect()
    };

    assert_eq!(paths(adapter.list_contents("", false).await.unwrap()), vec!["a.txt"]);
    assert_eq!(
        paths(adapter.list_contents("x", false).await.unwrap()),
        vec!["x/b.txt", "x/c.txt"]
    );
    assert_eq!(
        paths(adapter.list_contents("x/", true).await.unwrap()),
        vec!["x/b.txt", "x/c.txt", "x/y/d.txt"]
    );
    assert_eq!(
        paths(adapter.list_contents("", true).await.unwrap()),
        vec!["a.txt", "x/b.txt", "x/c.txt", "x/y/d.txt"]
    );

    assert!(adapter.directory_exists("x").await.unwrap());
    assert!(adapter.directory_exists("x/y").await.unwrap());
    assert!(!adapter.directory_exists("a.txt").await.unwrap());
    assert!(!adapter.directory_exists("z").await.unwrap());
}

#[tokio::test]
async fn set_visibility_is_index_only() {
    let volume = TestVolume::new().await;
    let adapter = &volume.adapter;
    adapter.write("a.txt", Bytes::from_static(b"a")).await.unwrap();

    adapter.set_visibility("a.txt", Visibility::Public).await.unwrap();
    assert_eq!(adapter.get_visibility("a.txt").await.unwrap(), Visibility::Public);

    assert!(
        adapter
            .set_visibility("missing.txt", Visibility::Public)
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn legacy_file_is_migrated_once() {
    let legacy_inner = memory();
    legacy_inner
        .put("old/report.csv", Bytes::from_static(b"a,b\n1,2\n"))
        .await
        .unwrap();
    let legacy = Arc::new(CountingBackend::new(legacy_inner));
    let adapter = adapter(
        vec![named("local", memory())],
        vec![named("legacy", legacy.clone())],
    );

    assert!(adapter.exists("old/report.csv").await.unwrap());
    assert_eq!(legacy.heads(), 0);
    assert!(adapter.repository().get_metadata("old/report.csv").await.unwrap().is_none());

    assert_eq!(adapter.read("old/report.csv").await.unwrap(), "a,b\n1,2\n");
    assert_eq!(adapter.read("old/report.csv").await.unwrap(), "a,b\n1,2\n");
    assert_eq!(legacy.heads(), 1);

    let metadata = adapter.path_metadata("old/report.csv").await.unwrap();
    assert_eq!(metadata.size, 8);
    assert_eq!(metadata.mimetype, "text/csv");
    assert_eq!(metadata.backing_data.disks().collect::<Vec<_>>(), vec!["legacy"]);
    assert_eq!(adapter.get_size("old/report.csv").await.unwrap(), 8);
}

#[tokio::test]
async fn concurrent_first_reads_migrate_once() {
    let legacy_inner = memory();
    legacy_inner
        .put("shared.txt", Bytes::from_static(b"legacy"))
        .await
        .unwrap();
    let legacy = Arc::new(CountingBackend::new(legacy_inner));
    let adapter = Arc::new(adapter(
        vec![named("local", memory())],
        vec![named("legacy", legacy.clone())],
    ));

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move { adapter.read("shared.txt").await })
        })
        .collect();
    for reader in readers {
        assert_eq!(reader.await.unwrap().unwrap(), "legacy");
    }

    assert_eq!(legacy.heads(), 1);
}

#[tokio::test]
async fn migrated_file_can_be_deleted_everywhere() {
    let first = memory();
    let second = memory();
    for store in [&first, &second] {
        store.put("old.txt", Bytes::from_static(b"old")).await.unwrap();
    }
    let adapter = adapter(
        vec![named("local", memory())],
        vec![named("first", first.clone()), named("second", second.clone())],
    );

    adapter.delete("old.txt").await.unwrap();

    assert!(!first.exists("old.txt").await.unwrap());
    assert!(!second.exists("old.txt").await.unwrap());
    assert!(!adapter.exists("old.txt").await.unwrap());
}

#[tokio::test]
async fn new_files_may_land_on_original_stores_when_allowed() {
    let legacy = memory();
    let adapter = adapter_with(
        vec![named("broken", Arc::new(FailingBackend))],
        vec![named("legacy", legacy.clone())],
        StrategyOptions {
            allow_new_files_on_original_stores: true,
        },
    );

    let metadata = adapter.write("a.txt", Bytes::from_static(b"a")).await.unwrap();

    assert_eq!(metadata.backing_data.disks().collect::<Vec<_>>(), vec!["legacy"]);
    assert!(legacy.exists(&physical_key(&metadata, "legacy")).await.unwrap());
}

#[tokio::test]
async fn concurrent_writes_to_one_path_leave_one_file() {
    let store = memory();
    let adapter = Arc::new(adapter(vec![named("local", store.clone())], vec![]));

    let writers: Vec<_> = (0..8u8)
        .map(|i| {
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move { adapter.write("hot.txt", Bytes::from(vec![i; 4])).await })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap().unwrap();
    }

    assert_eq!(store.len().await, 1);
    let indexed = adapter.path_metadata("hot.txt").await.unwrap();
    assert_eq!(adapter.read("hot.txt").await.unwrap().len(), 4);
    assert_eq!(indexed.size, 4);
}
