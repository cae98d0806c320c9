mod common;

use anyhow::anyhow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::{document, highlights, RecordingSource};
use readwise_sync::state::{PollerState, Resource};
use readwise_sync::{BackgroundPoller, PollerConfig, SyncError, SyncResult};

fn quick_config() -> PollerConfig {
    PollerConfig {
        poll_interval: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
        ..Default::default()
    }
}

fn source() -> RecordingSource {
    RecordingSource::new(highlights(3), vec![], vec![document("d1")])
}

#[test]
fn poll_once_fetches_and_advances_cursors() {
    let source = source();
    let mut poller = BackgroundPoller::new(source.clone(), quick_config());

    let first = poller.poll_once().unwrap();
    assert_eq!(first.highlights.len(), 3);
    assert_eq!(first.documents.len(), 1);
    assert!(first.books.is_empty());
    assert_eq!(poller.state().poll_count, 1);
    assert_eq!(poller.state().last_poll_time, Some(first.synced_at));

    poller.poll_once().unwrap();
    assert_eq!(poller.state().poll_count, 2);
    assert_eq!(
        source.calls_for(Resource::Highlights),
        vec![None, Some(first.synced_at)]
    );
    assert_eq!(
        source.calls_for(Resource::Documents),
        vec![None, Some(first.synced_at)]
    );
    assert!(source.calls_for(Resource::Books).is_empty());
}

#[test]
fn documents_can_be_skipped() {
    let source = source();
    let config = PollerConfig {
        include_documents: false,
        ..quick_config()
    };
    let mut poller = BackgroundPoller::new(source.clone(), config);

    let result = poller.poll_once().unwrap();

    assert!(result.documents.is_empty());
    assert!(source.calls_for(Resource::Documents).is_empty());
    assert_eq!(poller.state().cursors.get(Resource::Documents), None);
}

#[test]
fn failures_grow_backoff_until_success_resets_it() {
    let source = source().failing(Resource::Highlights, 0);
    let mut poller = BackgroundPoller::new(source.clone(), quick_config());
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    poller.on_error(move |err: &SyncError| {
        sink.lock().unwrap().push(err.to_string());
        Ok(())
    });

    assert!(poller.poll_once().is_err());
    assert_eq!(poller.consecutive_errors(), 1);
    assert_eq!(poller.current_backoff(), Duration::from_millis(20));
    assert!(poller.state().last_error.is_some());

    assert!(poller.poll_once().is_err());
    assert!(poller.poll_once().is_err());
    assert_eq!(poller.consecutive_errors(), 3);
    assert_eq!(poller.current_backoff(), Duration::from_millis(40));
    assert_eq!(poller.state().error_count, 3);
    assert_eq!(poller.state().poll_count, 0);
    assert_eq!(errors.lock().unwrap().len(), 3);

    source.recover();
    poller.poll_once().unwrap();
    assert_eq!(poller.consecutive_errors(), 0);
    assert_eq!(poller.current_backoff(), Duration::from_millis(10));
    assert_eq!(poller.state().error_count, 3);
}

#[test]
fn reset_errors_clears_streak() {
    let source = source().failing(Resource::Documents, 0);
    let mut poller = BackgroundPoller::new(source, quick_config());

    assert!(poller.poll_once().is_err());
    poller.reset_errors();

    assert_eq!(poller.consecutive_errors(), 0);
    assert_eq!(poller.current_backoff(), Duration::from_millis(10));
    assert_eq!(poller.state().last_error, None);
    assert_eq!(poller.state().error_count, 1);
}

#[test]
fn failing_sync_handler_does_not_block_the_next() {
    let mut poller = BackgroundPoller::new(source(), quick_config());
    let reached = Arc::new(AtomicUsize::new(0));
    poller.on_sync(|_: &SyncResult| Err(anyhow!("bad handler")));
    poller.on_sync(|_: &SyncResult| panic!("panicking handler"));
    let counter = reached.clone();
    poller.on_sync(move |_: &SyncResult| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    assert!(poller.poll_once().is_ok());
    assert_eq!(reached.load(Ordering::SeqCst), 1);
}

#[test]
fn loop_stops_after_max_consecutive_errors() {
    let source = source().failing(Resource::Highlights, 0);
    let config = PollerConfig {
        poll_interval: Duration::ZERO,
        max_backoff: Duration::ZERO,
        max_consecutive_errors: 3,
        ..Default::default()
    };
    let mut poller = BackgroundPoller::new(source.clone(), config);

    poller.start();

    assert!(!poller.is_running());
    assert_eq!(poller.consecutive_errors(), 3);
    assert_eq!(poller.state().error_count, 3);
    assert_eq!(source.calls_for(Resource::Highlights).len(), 3);
}

#[test]
fn tripped_signal_prevents_polling() {
    let source = source();
    let mut poller = BackgroundPoller::new(source.clone(), quick_config());
    poller.stop_signal().stop();

    poller.start();

    assert!(source.calls().is_empty());
    assert!(!poller.is_running());
}

#[test]
fn spawned_poller_runs_until_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("poller.json");
    let config = PollerConfig {
        state_file: Some(path.clone()),
        ..quick_config()
    };
    let mut poller = BackgroundPoller::new(source(), config);
    let cycles = Arc::new(AtomicUsize::new(0));
    let counter = cycles.clone();
    poller.on_sync(move |_: &SyncResult| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let handle = poller.spawn().unwrap();
    assert!(handle.is_running());
    let deadline = Instant::now() + Duration::from_secs(5);
    while cycles.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    let poller = handle.stop(Duration::from_secs(5)).unwrap();
    assert!(!poller.is_running());
    assert!(poller.state().poll_count >= 2);

    let saved = PollerState::load(&path);
    assert_eq!(saved.poll_count, poller.state().poll_count);
    assert!(!saved.is_running);
    assert!(saved.cursors.last_highlight_sync.is_some());

    // Stop flag is cleared so the poller can be started again.
    let mut poller = poller;
    assert!(poller.poll_once().is_ok());
}

#[test]
fn state_file_is_resumed_and_corruption_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("poller.json");
    let config = PollerConfig {
        state_file: Some(path.clone()),
        ..quick_config()
    };

    let synced_at = {
        let mut poller = BackgroundPoller::new(source(), config.clone());
        poller.poll_once().unwrap().synced_at
    };

    let source = source();
    let mut poller = BackgroundPoller::new(source.clone(), config.clone());
    assert_eq!(poller.state().poll_count, 1);
    poller.poll_once().unwrap();
    assert_eq!(source.calls_for(Resource::Highlights), vec![Some(synced_at)]);

    std::fs::write(&path, "{ not json").unwrap();
    let poller = BackgroundPoller::new(source, config);
    assert_eq!(poller.state(), &PollerState::default());
}

#[test]
fn failed_state_write_counts_only_as_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();
    let config = PollerConfig {
        state_file: Some(blocker.join("poller.json")),
        ..quick_config()
    };
    let mut poller = BackgroundPoller::new(source(), config);
    let synced = Arc::new(AtomicUsize::new(0));
    let count = synced.clone();
    poller.on_sync(move |_: &SyncResult| {
        count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let err = poller.poll_once().unwrap_err();

    assert!(matches!(err, SyncError::State(_)));
    assert_eq!(poller.state().poll_count, 0);
    assert_eq!(poller.state().error_count, 1);
    assert_eq!(poller.state().last_poll_time, None);
    assert_eq!(poller.state().cursors.get(Resource::Highlights), None);
    assert_eq!(poller.consecutive_errors(), 1);
    assert_eq!(synced.load(Ordering::SeqCst), 0);
}
