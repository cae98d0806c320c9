mod common;

use anyhow::anyhow;
use std::sync::{Arc, Mutex};

use common::{book, document, highlights, RecordingSource};
use readwise_sync::state::{Resource, SyncManagerState};
use readwise_sync::{AsyncSyncManager, SyncError, SyncManager, SyncResult};

fn source() -> RecordingSource {
    RecordingSource::new(
        highlights(2),
        vec![book(1, "B1")],
        vec![document("doc-1")],
    )
}

#[test]
fn full_sync_collects_everything() {
    let source = source();
    let mut manager = SyncManager::new(&source);

    let result = manager.full_sync().unwrap();

    assert_eq!(result.highlights.len(), 2);
    assert_eq!(result.books.len(), 1);
    assert_eq!(result.documents.len(), 1);
    assert_eq!(result.total(), 4);
    assert_eq!(manager.state().total_syncs, 1);
    assert_eq!(manager.state().last_sync_time, Some(result.synced_at));
    assert!(source.calls().iter().all(|(_, since)| since.is_none()));
}

#[test]
fn incremental_sync_uses_cursors_from_last_run() {
    let source = source();
    let mut manager = SyncManager::new(&source);

    let first = manager.incremental_sync().unwrap();
    let second = manager.incremental_sync().unwrap();
    manager.full_sync().unwrap();

    assert_eq!(
        source.calls_for(Resource::Highlights),
        vec![None, Some(first.synced_at), None]
    );
    assert_eq!(
        source.calls_for(Resource::Documents),
        vec![None, Some(first.synced_at), None]
    );
    assert!(second.synced_at >= first.synced_at);
    assert_eq!(manager.state().total_syncs, 3);
}

#[test]
fn partial_syncs_touch_only_their_resource() {
    let source = source();
    let mut manager = SyncManager::new(&source);

    let result = manager.sync_highlights_only().unwrap();
    assert_eq!(result.highlights.len(), 2);
    assert!(result.books.is_empty());
    assert!(result.documents.is_empty());

    let result = manager.sync_documents_only().unwrap();
    assert_eq!(result.documents.len(), 1);
    assert!(result.highlights.is_empty());

    let state = manager.state();
    assert!(state.cursors.get(Resource::Highlights).is_some());
    assert!(state.cursors.get(Resource::Documents).is_some());
    assert_eq!(state.cursors.get(Resource::Books), None);
    assert_eq!(
        source.calls().iter().map(|(r, _)| *r).collect::<Vec<_>>(),
        vec![Resource::Highlights, Resource::Documents]
    );
}

#[test]
fn handlers_run_in_order_and_survive_failures() {
    let source = source();
    let mut manager = SyncManager::new(&source);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = seen.clone();
    manager.on_sync(move |result: &SyncResult| {
        log.lock().unwrap().push(format!("first:{}", result.total()));
        Ok(())
    });
    manager.on_sync(|_: &SyncResult| Err(anyhow!("handler exploded")));
    let log = seen.clone();
    manager.on_sync(move |result: &SyncResult| {
        log.lock().unwrap().push(format!("third:{}", result.highlights.len()));
        Ok(())
    });

    manager.full_sync().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["first:4", "third:2"]);
}

#[test]
fn fetch_failure_leaves_state_untouched() {
    let source = source().failing(Resource::Books, 0);
    let mut manager = SyncManager::new(&source);
    let notified = Arc::new(Mutex::new(0));
    let count = notified.clone();
    manager.on_sync(move |_: &SyncResult| {
        *count.lock().unwrap() += 1;
        Ok(())
    });

    let err = manager.incremental_sync().unwrap_err();

    assert!(matches!(err, SyncError::Api(_)));
    assert_eq!(manager.state(), &SyncManagerState::default());
    assert_eq!(*notified.lock().unwrap(), 0);
}

#[test]
fn state_file_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manager.json");
    let source = source();

    let synced_at = {
        let mut manager = SyncManager::with_state_file(&source, &path);
        manager.incremental_sync().unwrap();
        manager.incremental_sync().unwrap().synced_at
    };

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["total_syncs"], 2);

    let mut manager = SyncManager::with_state_file(&source, &path);
    assert_eq!(manager.state().total_syncs, 2);
    assert_eq!(manager.state().cursors.get(Resource::Books), Some(synced_at));

    manager.incremental_sync().unwrap();
    assert_eq!(
        source.calls_for(Resource::Books).last().copied().flatten(),
        Some(synced_at)
    );

    manager.reset_state().unwrap();
    assert_eq!(SyncManagerState::load(&path), SyncManagerState::default());
}

#[tokio::test]
async fn async_manager_matches_blocking_behaviour() {
    let source = source();
    let mut manager = AsyncSyncManager::new(&source);
    let totals = Arc::new(Mutex::new(Vec::new()));
    let sink = totals.clone();
    manager.on_sync(move |result: &SyncResult| -> anyhow::Result<()> {
        sink.lock().unwrap().push(result.total());
        Ok(())
    });

    let first = manager.incremental_sync().await.unwrap();
    assert_eq!(first.total(), 4);
    manager.sync_highlights_only().await.unwrap();

    assert_eq!(
        source.calls_for(Resource::Highlights),
        vec![None, Some(first.synced_at)]
    );
    assert_eq!(*totals.lock().unwrap(), vec![4, 2]);
    assert_eq!(manager.state().total_syncs, 2);
}

#[tokio::test]
async fn async_manager_propagates_fetch_errors() {
    let source = source().failing(Resource::Documents, 0);
    let mut manager = AsyncSyncManager::new(&source);

    assert!(manager.full_sync().await.is_err());
    assert_eq!(manager.state().total_syncs, 0);
}
