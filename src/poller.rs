//! Repeated incremental sync on a timer.
//!
//! The poll loop is blocking. Run it on the current thread with
//! [`BackgroundPoller::start`] or move it to a worker thread with
//! [`BackgroundPoller::spawn`]. The only value shared across threads is the
//! [`StopSignal`].
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

use crate::error::{Result as ApiResult, SyncError};
use crate::handlers::Handlers;
use crate::manager::SyncResult;
use crate::state::{PollerState, Resource, StateError};
use crate::sync::ResourceSource;

/// Granularity at which a sleeping poller notices a stop request.
const STOP_CHECK: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub include_documents: bool,
    pub state_file: Option<PathBuf>,
    pub max_consecutive_errors: u32,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            include_documents: true,
            state_file: None,
            max_consecutive_errors: 5,
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(3600),
        }
    }
}

/// Cooperative stop flag, cheap to clone and safe to trip from any thread.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Trip this signal on the first Ctrl-C. The listener runs on its own
    /// thread with a small runtime, so callers need no async context.
    pub fn trip_on_ctrl_c(&self) -> std::io::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let signal = self.clone();
        thread::Builder::new()
            .name("ctrl-c".into())
            .spawn(move || match runtime.block_on(tokio::signal::ctrl_c()) {
                Ok(()) => {
                    info!("interrupt received, stopping");
                    signal.stop();
                }
                Err(err) => warn!(error = %err, "cannot listen for ctrl-c"),
            })?;
        Ok(())
    }
}

pub struct BackgroundPoller<S> {
    source: S,
    config: PollerConfig,
    state: PollerState,
    consecutive_errors: u32,
    current_backoff: Duration,
    stop: StopSignal,
    on_sync: Handlers<SyncResult>,
    on_error: Handlers<SyncError>,
}

impl<S: ResourceSource> BackgroundPoller<S> {
    pub fn new(source: S, config: PollerConfig) -> Self {
        let state = config
            .state_file
            .as_deref()
            .map(PollerState::load)
            .unwrap_or_default();
        Self {
            source,
            current_backoff: config.poll_interval,
            config,
            state,
            consecutive_errors: 0,
            stop: StopSignal::new(),
            on_sync: Handlers::new("on_sync"),
            on_error: Handlers::new("on_error"),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn state(&self) -> &PollerState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Delay before the next cycle.
    pub fn current_backoff(&self) -> Duration {
        self.current_backoff
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn on_sync(&mut self, handler: impl FnMut(&SyncResult) -> anyhow::Result<()> + Send + 'static) {
        self.on_sync.push(handler);
    }

    pub fn on_error(&mut self, handler: impl FnMut(&SyncError) -> anyhow::Result<()> + Send + 'static) {
        self.on_error.push(handler);
    }

    pub fn reset_errors(&mut self) {
        self.consecutive_errors = 0;
        self.current_backoff = self.config.poll_interval;
        self.state.last_error = None;
    }

    /// Run one cycle. Failures are recorded and reported to the `on_error`
    /// handlers before being returned.
    #[instrument(skip_all)]
    pub fn poll_once(&mut self) -> Result<SyncResult, SyncError> {
        match self.cycle() {
            Ok(result) => {
                self.on_sync.notify(&result);
                Ok(result)
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn cycle(&mut self) -> Result<SyncResult, SyncError> {
        let mut result = SyncResult {
            synced_at: Utc::now(),
            ..Default::default()
        };
        let since = self.state.cursors.get(Resource::Highlights);
        result.highlights = self
            .source
            .list_highlights(since)
            .collect::<ApiResult<_>>()?;
        if self.config.include_documents {
            let since = self.state.cursors.get(Resource::Documents);
            result.documents = self
                .source
                .list_documents(since)
                .collect::<ApiResult<_>>()?;
        }

        // Nothing counts as polled until the new state is on disk.
        let mut next = self.state.clone();
        next.cursors.set(Resource::Highlights, result.synced_at);
        if self.config.include_documents {
            next.cursors.set(Resource::Documents, result.synced_at);
        }
        next.last_poll_time = Some(result.synced_at);
        next.poll_count += 1;
        self.save(&next)?;
        self.state = next;
        self.consecutive_errors = 0;
        self.current_backoff = self.config.poll_interval;

        info!(
            highlights = result.highlights.len(),
            documents = result.documents.len(),
            poll_count = self.state.poll_count,
            "poll complete"
        );
        Ok(result)
    }

    fn fail(&mut self, err: &SyncError) {
        self.state.error_count += 1;
        self.state.last_error = Some(err.to_string());
        self.consecutive_errors += 1;
        self.current_backoff = next_backoff(self.current_backoff, &self.config);
        warn!(
            error = %err,
            consecutive = self.consecutive_errors,
            backoff_secs = self.current_backoff.as_secs_f64(),
            "poll failed"
        );
        self.on_error.notify(err);
        if let Err(err) = self.persist() {
            warn!(error = %err, "failed to persist poller state");
        }
    }

    fn persist(&self) -> Result<(), StateError> {
        self.save(&self.state)
    }

    fn save(&self, state: &PollerState) -> Result<(), StateError> {
        match &self.config.state_file {
            Some(path) => state.save(path),
            None => Ok(()),
        }
    }

    fn set_running(&mut self, running: bool) {
        self.state.is_running = running;
        if let Err(err) = self.persist() {
            warn!(error = %err, "failed to persist poller state");
        }
    }

    /// Run the poll loop on the calling thread until stopped or until
    /// `max_consecutive_errors` cycles fail in a row.
    pub fn start(&mut self) {
        self.set_running(true);
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            include_documents = self.config.include_documents,
            "poller started"
        );
        while !self.stop.is_stopped() {
            if self.poll_once().is_err()
                && self.consecutive_errors >= self.config.max_consecutive_errors
            {
                error!(
                    consecutive = self.consecutive_errors,
                    "too many consecutive errors, stopping poller"
                );
                break;
            }
            self.wait(self.current_backoff);
        }
        self.set_running(false);
        info!(poll_count = self.state.poll_count, "poller stopped");
    }

    fn wait(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.stop.is_stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(STOP_CHECK));
        }
    }
}

impl<S: ResourceSource + Send + 'static> BackgroundPoller<S> {
    /// Move the poller onto a worker thread and start the loop there.
    pub fn spawn(mut self) -> std::io::Result<PollerHandle<S>> {
        let stop = self.stop.clone();
        // Reported as running as soon as the handle exists.
        self.state.is_running = true;
        let thread = thread::Builder::new()
            .name("readwise-poller".into())
            .spawn(move || {
                self.start();
                self
            })?;
        Ok(PollerHandle { stop, thread })
    }
}

fn next_backoff(current: Duration, config: &PollerConfig) -> Duration {
    Duration::try_from_secs_f64(current.as_secs_f64() * config.backoff_multiplier)
        .unwrap_or(config.max_backoff)
        .min(config.max_backoff)
}

/// A poller running on a worker thread.
pub struct PollerHandle<S> {
    stop: StopSignal,
    thread: JoinHandle<BackgroundPoller<S>>,
}

impl<S> PollerHandle<S> {
    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Request a stop and wait up to `timeout` for the loop to exit. Gives
    /// the handle back if the worker is still busy when the timeout expires.
    pub fn stop(self, timeout: Duration) -> Result<BackgroundPoller<S>, Self> {
        self.stop.stop();
        let deadline = Instant::now() + timeout;
        while !self.thread.is_finished() {
            if Instant::now() >= deadline {
                return Err(self);
            }
            thread::sleep(Duration::from_millis(10));
        }
        match self.thread.join() {
            Ok(poller) => {
                poller.stop.clear();
                Ok(poller)
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Wait for the loop to exit on its own.
    pub fn join(self) -> BackgroundPoller<S> {
        match self.thread.join() {
            Ok(poller) => poller,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl<S> std::fmt::Debug for PollerHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollerHandle")
            .field("running", &self.is_running())
            .field("stop_requested", &self.stop.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PollerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(300));
        assert!(config.include_documents);
        assert_eq!(config.max_consecutive_errors, 5);
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.max_backoff, Duration::from_secs(3600));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let config = PollerConfig {
            poll_interval: Duration::from_secs(300),
            max_backoff: Duration::from_secs(1000),
            ..Default::default()
        };
        let first = next_backoff(config.poll_interval, &config);
        assert_eq!(first, Duration::from_secs(600));
        assert_eq!(next_backoff(first, &config), Duration::from_secs(1000));
    }

    #[test]
    fn stop_signal_is_shared() {
        let signal = StopSignal::new();
        let other = signal.clone();
        assert!(!other.is_stopped());
        signal.stop();
        assert!(other.is_stopped());
        other.clear();
        assert!(!signal.is_stopped());
    }
}
