//! Batch-oriented resource sync over paged listings.
//!
//! [`BatchSync`] drives a blocking [`ResourceSource`]; [`AsyncBatchSync`]
//! drives an [`AsyncResourceSource`]. Both share the accounting in
//! [`Tally`] and the persisted [`SyncState`].
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::StreamExt;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

use crate::client::{self, BookQuery, DocumentQuery, HighlightQuery, ItemStream};
use crate::error::{ApiError, Result as ApiResult};
use crate::model::{Book, Document, Highlight};
use crate::state::{Resource, StateError, SyncState, SyncStats};

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Blocking source of the three syncable listings.
pub trait ResourceSource {
    fn list_highlights(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Box<dyn Iterator<Item = ApiResult<Highlight>> + '_>;

    fn list_books(&self, since: Option<DateTime<Utc>>) -> Box<dyn Iterator<Item = ApiResult<Book>> + '_>;

    fn list_documents(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Box<dyn Iterator<Item = ApiResult<Document>> + '_>;
}

/// Async source of the three syncable listings.
pub trait AsyncResourceSource: Send + Sync {
    fn list_highlights(&self, since: Option<DateTime<Utc>>) -> ItemStream<Highlight>;

    fn list_books(&self, since: Option<DateTime<Utc>>) -> ItemStream<Book>;

    fn list_documents(&self, since: Option<DateTime<Utc>>) -> ItemStream<Document>;
}

impl<S: ResourceSource + ?Sized> ResourceSource for &S {
    fn list_highlights(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Box<dyn Iterator<Item = ApiResult<Highlight>> + '_> {
        (**self).list_highlights(since)
    }

    fn list_books(&self, since: Option<DateTime<Utc>>) -> Box<dyn Iterator<Item = ApiResult<Book>> + '_> {
        (**self).list_books(since)
    }

    fn list_documents(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Box<dyn Iterator<Item = ApiResult<Document>> + '_> {
        (**self).list_documents(since)
    }
}

impl<S: AsyncResourceSource + ?Sized> AsyncResourceSource for &S {
    fn list_highlights(&self, since: Option<DateTime<Utc>>) -> ItemStream<Highlight> {
        (**self).list_highlights(since)
    }

    fn list_books(&self, since: Option<DateTime<Utc>>) -> ItemStream<Book> {
        (**self).list_books(since)
    }

    fn list_documents(&self, since: Option<DateTime<Utc>>) -> ItemStream<Document> {
        (**self).list_documents(since)
    }
}

impl ResourceSource for client::blocking::ReadwiseClient {
    fn list_highlights(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Box<dyn Iterator<Item = ApiResult<Highlight>> + '_> {
        Box::new(client::blocking::ReadwiseClient::list_highlights(
            self,
            HighlightQuery::updated_since(since),
        ))
    }

    fn list_books(&self, since: Option<DateTime<Utc>>) -> Box<dyn Iterator<Item = ApiResult<Book>> + '_> {
        Box::new(client::blocking::ReadwiseClient::list_books(
            self,
            BookQuery::updated_since(since),
        ))
    }

    fn list_documents(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Box<dyn Iterator<Item = ApiResult<Document>> + '_> {
        Box::new(client::blocking::ReadwiseClient::list_documents(
            self,
            DocumentQuery::updated_since(since),
        ))
    }
}

impl AsyncResourceSource for client::ReadwiseClient {
    fn list_highlights(&self, since: Option<DateTime<Utc>>) -> ItemStream<Highlight> {
        client::ReadwiseClient::list_highlights(self, HighlightQuery::updated_since(since))
    }

    fn list_books(&self, since: Option<DateTime<Utc>>) -> ItemStream<Book> {
        client::ReadwiseClient::list_books(self, BookQuery::updated_since(since))
    }

    fn list_documents(&self, since: Option<DateTime<Utc>>) -> ItemStream<Document> {
        client::ReadwiseClient::list_documents(self, DocumentQuery::updated_since(since))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSyncConfig {
    pub batch_size: usize,
    pub state_file: Option<PathBuf>,
    pub continue_on_error: bool,
}

impl Default for BatchSyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            state_file: None,
            continue_on_error: true,
        }
    }
}

/// Outcome of one resource sync call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSyncResult {
    pub success: bool,
    pub new_items: u64,
    /// Reserved: the listings do not distinguish new from changed records.
    pub updated_items: u64,
    pub failed_items: u64,
    pub errors: Vec<String>,
}

pub type ItemCallback<'a, T> = Box<dyn FnMut(&T) -> anyhow::Result<()> + Send + 'a>;
pub type BatchCallback<'a, T> = Box<dyn FnMut(&[T]) -> anyhow::Result<()> + Send + 'a>;
pub type AsyncItemCallback<'a, T> =
    Box<dyn FnMut(T) -> BoxFuture<'a, anyhow::Result<()>> + Send + 'a>;
pub type AsyncBatchCallback<'a, T> =
    Box<dyn FnMut(Vec<T>) -> BoxFuture<'a, anyhow::Result<()>> + Send + 'a>;

/// Per-call options for [`BatchSync`].
pub struct SyncOptions<'a, T> {
    pub full_sync: bool,
    pub on_item: Option<ItemCallback<'a, T>>,
    pub on_batch: Option<BatchCallback<'a, T>>,
}

impl<'a, T> Default for SyncOptions<'a, T> {
    fn default() -> Self {
        Self {
            full_sync: false,
            on_item: None,
            on_batch: None,
        }
    }
}

impl<'a, T> SyncOptions<'a, T> {
    pub fn full() -> Self {
        Self {
            full_sync: true,
            ..Default::default()
        }
    }

    pub fn full_sync(mut self, full_sync: bool) -> Self {
        self.full_sync = full_sync;
        self
    }

    pub fn on_item(mut self, f: impl FnMut(&T) -> anyhow::Result<()> + Send + 'a) -> Self {
        self.on_item = Some(Box::new(f));
        self
    }

    pub fn on_batch(mut self, f: impl FnMut(&[T]) -> anyhow::Result<()> + Send + 'a) -> Self {
        self.on_batch = Some(Box::new(f));
        self
    }
}

/// Item handler for [`AsyncBatchSync`]: plain or future-returning.
pub enum AsyncItemHandler<'a, T> {
    Sync(ItemCallback<'a, T>),
    Async(AsyncItemCallback<'a, T>),
}

/// Batch handler for [`AsyncBatchSync`]: plain or future-returning.
pub enum AsyncBatchHandler<'a, T> {
    Sync(BatchCallback<'a, T>),
    Async(AsyncBatchCallback<'a, T>),
}

impl<T> AsyncBatchHandler<'_, T> {
    async fn call(&mut self, batch: Vec<T>) -> anyhow::Result<()> {
        match self {
            AsyncBatchHandler::Sync(on_batch) => on_batch(&batch),
            AsyncBatchHandler::Async(on_batch) => on_batch(batch).await,
        }
    }
}

/// Per-call options for [`AsyncBatchSync`].
pub struct AsyncSyncOptions<'a, T> {
    pub full_sync: bool,
    pub on_item: Option<AsyncItemHandler<'a, T>>,
    pub on_batch: Option<AsyncBatchHandler<'a, T>>,
}

impl<'a, T> Default for AsyncSyncOptions<'a, T> {
    fn default() -> Self {
        Self {
            full_sync: false,
            on_item: None,
            on_batch: None,
        }
    }
}

impl<'a, T> AsyncSyncOptions<'a, T> {
    pub fn full() -> Self {
        Self {
            full_sync: true,
            ..Default::default()
        }
    }

    pub fn full_sync(mut self, full_sync: bool) -> Self {
        self.full_sync = full_sync;
        self
    }

    pub fn on_item(mut self, f: impl FnMut(&T) -> anyhow::Result<()> + Send + 'a) -> Self {
        self.on_item = Some(AsyncItemHandler::Sync(Box::new(f)));
        self
    }

    pub fn on_item_async<F>(mut self, f: F) -> Self
    where
        F: FnMut(T) -> BoxFuture<'a, anyhow::Result<()>> + Send + 'a,
    {
        self.on_item = Some(AsyncItemHandler::Async(Box::new(f)));
        self
    }

    pub fn on_batch(mut self, f: impl FnMut(&[T]) -> anyhow::Result<()> + Send + 'a) -> Self {
        self.on_batch = Some(AsyncBatchHandler::Sync(Box::new(f)));
        self
    }

    pub fn on_batch_async<F>(mut self, f: F) -> Self
    where
        F: FnMut(Vec<T>) -> BoxFuture<'a, anyhow::Result<()>> + Send + 'a,
    {
        self.on_batch = Some(AsyncBatchHandler::Async(Box::new(f)));
        self
    }
}

/// Running counts for one sync call.
struct Tally<T> {
    resource: Resource,
    batch_size: usize,
    continue_on_error: bool,
    result: BatchSyncResult,
    batch: Vec<T>,
    stopped: bool,
    fetch_failed: bool,
}

impl<T> Tally<T> {
    fn new(resource: Resource, config: &BatchSyncConfig) -> Self {
        let batch_size = config.batch_size.max(1);
        Self {
            resource,
            batch_size,
            continue_on_error: config.continue_on_error,
            result: BatchSyncResult {
                success: true,
                ..Default::default()
            },
            batch: Vec::with_capacity(batch_size),
            stopped: false,
            fetch_failed: false,
        }
    }

    /// Record a delivered item; returns a full batch when one is ready.
    fn delivered(&mut self, item: T) -> Option<Vec<T>> {
        self.result.new_items += 1;
        self.batch.push(item);
        if self.batch.len() >= self.batch_size {
            Some(std::mem::replace(
                &mut self.batch,
                Vec::with_capacity(self.batch_size),
            ))
        } else {
            None
        }
    }

    fn callback_failed(&mut self, what: &str, err: anyhow::Error) {
        let message = format!("{} {what} callback failed: {err:#}", self.resource);
        warn!(resource = %self.resource, error = %err, "sync callback failed");
        self.result.errors.push(message);
        if !self.continue_on_error {
            self.result.success = false;
            self.stopped = true;
        }
    }

    fn item_failed(&mut self, err: anyhow::Error) {
        self.result.failed_items += 1;
        self.callback_failed("item", err);
    }

    fn batch_result(&mut self, outcome: anyhow::Result<()>) {
        if let Err(err) = outcome {
            self.callback_failed("batch", err);
        }
    }

    fn fetch_error(&mut self, err: ApiError) {
        warn!(resource = %self.resource, error = %err, "fetch failed");
        self.result
            .errors
            .push(format!("failed to fetch {}: {err}", self.resource));
        self.result.success = false;
        self.stopped = true;
        self.fetch_failed = true;
    }

    /// Remaining partial batch, if any.
    fn take_rest(&mut self) -> Option<Vec<T>> {
        if self.batch.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.batch))
        }
    }
}

/// Owns the config and state shared by both sync drivers.
#[derive(Debug)]
struct Tracker {
    config: BatchSyncConfig,
    state: SyncState,
}

impl Tracker {
    fn new(config: BatchSyncConfig) -> Self {
        let state = match &config.state_file {
            Some(path) => SyncState::load(path),
            None => SyncState::default(),
        };
        Self { config, state }
    }

    fn since(&self, resource: Resource, full_sync: bool) -> Option<DateTime<Utc>> {
        if full_sync {
            None
        } else {
            self.state.last_sync(resource)
        }
    }

    fn finish<T>(
        &mut self,
        tally: Tally<T>,
        started_at: DateTime<Utc>,
    ) -> Result<BatchSyncResult, StateError> {
        let resource = tally.resource;
        if !tally.fetch_failed {
            self.state.add(resource, tally.result.new_items);
            self.state.mark_synced(resource, started_at);
        }
        for message in &tally.result.errors {
            self.state.record_error(message.clone());
        }
        self.persist()?;
        info!(
            resource = %resource,
            success = tally.result.success,
            new_items = tally.result.new_items,
            failed_items = tally.result.failed_items,
            "sync finished"
        );
        Ok(tally.result)
    }

    fn persist(&self) -> Result<(), StateError> {
        match &self.config.state_file {
            Some(path) => self.state.save(path),
            None => Ok(()),
        }
    }

    fn reset(&mut self) -> Result<(), StateError> {
        self.state = SyncState::default();
        self.persist()
    }
}

/// Blocking batch sync.
pub struct BatchSync<S> {
    source: S,
    tracker: Tracker,
}

impl<S: ResourceSource> BatchSync<S> {
    pub fn new(source: S, config: BatchSyncConfig) -> Self {
        Self {
            source,
            tracker: Tracker::new(config),
        }
    }

    pub fn config(&self) -> &BatchSyncConfig {
        &self.tracker.config
    }

    pub fn state(&self) -> &SyncState {
        &self.tracker.state
    }

    pub fn stats(&self) -> SyncStats {
        self.tracker.state.stats()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Forget every cursor and counter and persist the empty state.
    pub fn reset_state(&mut self) -> Result<(), StateError> {
        self.tracker.reset()
    }

    #[instrument(skip_all)]
    pub fn sync_highlights(
        &mut self,
        opts: SyncOptions<'_, Highlight>,
    ) -> Result<BatchSyncResult, StateError> {
        let since = self.tracker.since(Resource::Highlights, opts.full_sync);
        let started_at = Utc::now();
        let tally = drive(
            self.source.list_highlights(since),
            Tally::new(Resource::Highlights, &self.tracker.config),
            opts,
        );
        self.tracker.finish(tally, started_at)
    }

    #[instrument(skip_all)]
    pub fn sync_books(&mut self, opts: SyncOptions<'_, Book>) -> Result<BatchSyncResult, StateError> {
        let since = self.tracker.since(Resource::Books, opts.full_sync);
        let started_at = Utc::now();
        let tally = drive(
            self.source.list_books(since),
            Tally::new(Resource::Books, &self.tracker.config),
            opts,
        );
        self.tracker.finish(tally, started_at)
    }

    #[instrument(skip_all)]
    pub fn sync_documents(
        &mut self,
        opts: SyncOptions<'_, Document>,
    ) -> Result<BatchSyncResult, StateError> {
        let since = self.tracker.since(Resource::Documents, opts.full_sync);
        let started_at = Utc::now();
        let tally = drive(
            self.source.list_documents(since),
            Tally::new(Resource::Documents, &self.tracker.config),
            opts,
        );
        self.tracker.finish(tally, started_at)
    }

    /// Sync highlights, books and documents independently.
    pub fn sync_all(
        &mut self,
        full_sync: bool,
    ) -> Result<(BatchSyncResult, BatchSyncResult, BatchSyncResult), StateError> {
        let highlights = self.sync_highlights(SyncOptions::default().full_sync(full_sync))?;
        let books = self.sync_books(SyncOptions::default().full_sync(full_sync))?;
        let documents = self.sync_documents(SyncOptions::default().full_sync(full_sync))?;
        Ok((highlights, books, documents))
    }
}

fn drive<T, I>(items: I, mut tally: Tally<T>, mut opts: SyncOptions<'_, T>) -> Tally<T>
where
    I: Iterator<Item = ApiResult<T>>,
{
    for item in items {
        let item = match item {
            Ok(item) => item,
            Err(err) => {
                tally.fetch_error(err);
                break;
            }
        };
        let outcome = match opts.on_item.as_mut() {
            Some(on_item) => on_item(&item),
            None => Ok(()),
        };
        match outcome {
            Ok(()) => {
                if let Some(batch) = tally.delivered(item) {
                    if let Some(on_batch) = opts.on_batch.as_mut() {
                        tally.batch_result(on_batch(&batch));
                    }
                }
            }
            Err(err) => tally.item_failed(err),
        }
        if tally.stopped {
            break;
        }
    }
    if let Some(rest) = tally.take_rest() {
        if let Some(on_batch) = opts.on_batch.as_mut() {
            tally.batch_result(on_batch(&rest));
        }
    }
    tally
}

/// Async batch sync. One logical consumer per call; suspension happens at
/// each page fetch and each async item callback.
pub struct AsyncBatchSync<S> {
    source: S,
    tracker: Tracker,
}

impl<S: AsyncResourceSource> AsyncBatchSync<S> {
    pub fn new(source: S, config: BatchSyncConfig) -> Self {
        Self {
            source,
            tracker: Tracker::new(config),
        }
    }

    pub fn config(&self) -> &BatchSyncConfig {
        &self.tracker.config
    }

    pub fn state(&self) -> &SyncState {
        &self.tracker.state
    }

    pub fn stats(&self) -> SyncStats {
        self.tracker.state.stats()
    }

    pub fn reset_state(&mut self) -> Result<(), StateError> {
        self.tracker.reset()
    }

    #[instrument(skip_all)]
    pub async fn sync_highlights(
        &mut self,
        opts: AsyncSyncOptions<'_, Highlight>,
    ) -> Result<BatchSyncResult, StateError> {
        let since = self.tracker.since(Resource::Highlights, opts.full_sync);
        let started_at = Utc::now();
        let tally = drive_stream(
            self.source.list_highlights(since),
            Tally::new(Resource::Highlights, &self.tracker.config),
            opts,
        )
        .await;
        self.tracker.finish(tally, started_at)
    }

    #[instrument(skip_all)]
    pub async fn sync_books(
        &mut self,
        opts: AsyncSyncOptions<'_, Book>,
    ) -> Result<BatchSyncResult, StateError> {
        let since = self.tracker.since(Resource::Books, opts.full_sync);
        let started_at = Utc::now();
        let tally = drive_stream(
            self.source.list_books(since),
            Tally::new(Resource::Books, &self.tracker.config),
            opts,
        )
        .await;
        self.tracker.finish(tally, started_at)
    }

    #[instrument(skip_all)]
    pub async fn sync_documents(
        &mut self,
        opts: AsyncSyncOptions<'_, Document>,
    ) -> Result<BatchSyncResult, StateError> {
        let since = self.tracker.since(Resource::Documents, opts.full_sync);
        let started_at = Utc::now();
        let tally = drive_stream(
            self.source.list_documents(since),
            Tally::new(Resource::Documents, &self.tracker.config),
            opts,
        )
        .await;
        self.tracker.finish(tally, started_at)
    }

    pub async fn sync_all(
        &mut self,
        full_sync: bool,
    ) -> Result<(BatchSyncResult, BatchSyncResult, BatchSyncResult), StateError> {
        let highlights = self
            .sync_highlights(AsyncSyncOptions::default().full_sync(full_sync))
            .await?;
        let books = self
            .sync_books(AsyncSyncOptions::default().full_sync(full_sync))
            .await?;
        let documents = self
            .sync_documents(AsyncSyncOptions::default().full_sync(full_sync))
            .await?;
        Ok((highlights, books, documents))
    }
}

async fn drive_stream<T: Clone>(
    mut items: ItemStream<T>,
    mut tally: Tally<T>,
    mut opts: AsyncSyncOptions<'_, T>,
) -> Tally<T> {
    while let Some(item) = items.next().await {
        let item = match item {
            Ok(item) => item,
            Err(err) => {
                tally.fetch_error(err);
                break;
            }
        };
        let outcome = match opts.on_item.as_mut() {
            Some(AsyncItemHandler::Sync(on_item)) => on_item(&item),
            Some(AsyncItemHandler::Async(on_item)) => on_item(item.clone()).await,
            None => Ok(()),
        };
        match outcome {
            Ok(()) => {
                if let Some(batch) = tally.delivered(item) {
                    if let Some(on_batch) = opts.on_batch.as_mut() {
                        tally.batch_result(on_batch.call(batch).await);
                    }
                }
            }
            Err(err) => tally.item_failed(err),
        }
        if tally.stopped {
            break;
        }
    }
    if let Some(rest) = tally.take_rest() {
        if let Some(on_batch) = opts.on_batch.as_mut() {
            tally.batch_result(on_batch.call(rest).await);
        }
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = BatchSyncConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.state_file, None);
        assert!(config.continue_on_error);
    }

    #[test]
    fn tally_emits_full_batches_then_rest() {
        let config = BatchSyncConfig {
            batch_size: 2,
            ..Default::default()
        };
        let mut tally: Tally<u32> = Tally::new(Resource::Highlights, &config);
        assert_eq!(tally.delivered(1), None);
        assert_eq!(tally.delivered(2), Some(vec![1, 2]));
        assert_eq!(tally.delivered(3), None);
        assert_eq!(tally.take_rest(), Some(vec![3]));
        assert_eq!(tally.take_rest(), None);
        assert_eq!(tally.result.new_items, 3);
    }

    #[test]
    fn tally_stops_on_first_failure_without_continue() {
        let config = BatchSyncConfig {
            continue_on_error: false,
            ..Default::default()
        };
        let mut tally: Tally<u32> = Tally::new(Resource::Books, &config);
        tally.item_failed(anyhow::anyhow!("bad item"));
        assert!(tally.stopped);
        assert!(!tally.result.success);
        assert_eq!(tally.result.failed_items, 1);
        assert!(tally.result.errors[0].contains("bad item"));
    }

    #[test]
    fn zero_batch_size_is_treated_as_one() {
        let config = BatchSyncConfig {
            batch_size: 0,
            ..Default::default()
        };
        let mut tally: Tally<u32> = Tally::new(Resource::Documents, &config);
        assert_eq!(tally.delivered(9), Some(vec![9]));
    }
}
