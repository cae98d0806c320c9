//! Whole-account sync that hands the changed records to registered handlers.
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::error::{Result as ApiResult, SyncError};
use crate::handlers::{AsyncHandler, AsyncHandlers, Handlers};
use crate::model::{Book, Document, Highlight};
use crate::state::{Resource, StateError, SyncManagerState};
use crate::sync::{AsyncResourceSource, ResourceSource};

const ALL: &[Resource] = &[Resource::Highlights, Resource::Books, Resource::Documents];

/// Records collected by one sync or poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncResult {
    pub highlights: Vec<Highlight>,
    pub books: Vec<Book>,
    pub documents: Vec<Document>,
    pub synced_at: DateTime<Utc>,
}

impl SyncResult {
    pub fn is_empty(&self) -> bool {
        self.highlights.is_empty() && self.books.is_empty() && self.documents.is_empty()
    }

    pub fn total(&self) -> usize {
        self.highlights.len() + self.books.len() + self.documents.len()
    }
}

/// Cursor, counters and state file shared by both managers.
#[derive(Debug, Default)]
struct Ledger {
    state: SyncManagerState,
    state_file: Option<PathBuf>,
}

impl Ledger {
    fn open(state_file: Option<PathBuf>) -> Self {
        let state = state_file
            .as_deref()
            .map(SyncManagerState::load)
            .unwrap_or_default();
        Self { state, state_file }
    }

    fn since(&self, resource: Resource, full: bool) -> Option<DateTime<Utc>> {
        if full {
            None
        } else {
            self.state.cursors.get(resource)
        }
    }

    fn commit(&mut self, resources: &[Resource], result: &SyncResult) -> Result<(), StateError> {
        for &resource in resources {
            self.state.cursors.set(resource, result.synced_at);
        }
        self.state.total_syncs += 1;
        self.state.last_sync_time = Some(result.synced_at);
        self.persist()?;
        info!(
            highlights = result.highlights.len(),
            books = result.books.len(),
            documents = result.documents.len(),
            total_syncs = self.state.total_syncs,
            "sync complete"
        );
        Ok(())
    }

    fn persist(&self) -> Result<(), StateError> {
        match &self.state_file {
            Some(path) => self.state.save(path),
            None => Ok(()),
        }
    }

    fn reset(&mut self) -> Result<(), StateError> {
        self.state = SyncManagerState::default();
        self.persist()
    }
}

pub struct SyncManager<S> {
    source: S,
    ledger: Ledger,
    handlers: Handlers<SyncResult>,
}

impl<S: ResourceSource> SyncManager<S> {
    pub fn new(source: S) -> Self {
        Self::open(source, None)
    }

    pub fn with_state_file(source: S, path: impl AsRef<Path>) -> Self {
        Self::open(source, Some(path.as_ref().to_path_buf()))
    }

    fn open(source: S, state_file: Option<PathBuf>) -> Self {
        Self {
            source,
            ledger: Ledger::open(state_file),
            handlers: Handlers::new("sync"),
        }
    }

    pub fn state(&self) -> &SyncManagerState {
        &self.ledger.state
    }

    pub fn reset_state(&mut self) -> Result<(), StateError> {
        self.ledger.reset()
    }

    pub fn on_sync(&mut self, handler: impl FnMut(&SyncResult) -> anyhow::Result<()> + Send + 'static) {
        self.handlers.push(handler);
    }

    pub fn full_sync(&mut self) -> Result<SyncResult, SyncError> {
        self.run(ALL, true)
    }

    pub fn incremental_sync(&mut self) -> Result<SyncResult, SyncError> {
        self.run(ALL, false)
    }

    pub fn sync_highlights_only(&mut self) -> Result<SyncResult, SyncError> {
        self.run(&[Resource::Highlights], false)
    }

    pub fn sync_documents_only(&mut self) -> Result<SyncResult, SyncError> {
        self.run(&[Resource::Documents], false)
    }

    #[instrument(skip_all, fields(full))]
    fn run(&mut self, resources: &[Resource], full: bool) -> Result<SyncResult, SyncError> {
        let mut result = SyncResult {
            synced_at: Utc::now(),
            ..Default::default()
        };
        for &resource in resources {
            let since = self.ledger.since(resource, full);
            match resource {
                Resource::Highlights => {
                    result.highlights = self
                        .source
                        .list_highlights(since)
                        .collect::<ApiResult<_>>()?
                }
                Resource::Books => {
                    result.books = self.source.list_books(since).collect::<ApiResult<_>>()?
                }
                Resource::Documents => {
                    result.documents = self
                        .source
                        .list_documents(since)
                        .collect::<ApiResult<_>>()?
                }
            }
        }
        self.ledger.commit(resources, &result)?;
        self.handlers.notify(&result);
        Ok(result)
    }
}

pub struct AsyncSyncManager<S> {
    source: S,
    ledger: Ledger,
    handlers: AsyncHandlers<SyncResult>,
}

impl<S: AsyncResourceSource> AsyncSyncManager<S> {
    pub fn new(source: S) -> Self {
        Self::open(source, None)
    }

    pub fn with_state_file(source: S, path: impl AsRef<Path>) -> Self {
        Self::open(source, Some(path.as_ref().to_path_buf()))
    }

    fn open(source: S, state_file: Option<PathBuf>) -> Self {
        Self {
            source,
            ledger: Ledger::open(state_file),
            handlers: AsyncHandlers::new("sync"),
        }
    }

    pub fn state(&self) -> &SyncManagerState {
        &self.ledger.state
    }

    pub fn reset_state(&mut self) -> Result<(), StateError> {
        self.ledger.reset()
    }

    pub fn on_sync(&mut self, handler: impl AsyncHandler<SyncResult> + 'static) {
        self.handlers.push(handler);
    }

    pub async fn full_sync(&mut self) -> Result<SyncResult, SyncError> {
        self.run(ALL, true).await
    }

    pub async fn incremental_sync(&mut self) -> Result<SyncResult, SyncError> {
        self.run(ALL, false).await
    }

    pub async fn sync_highlights_only(&mut self) -> Result<SyncResult, SyncError> {
        self.run(&[Resource::Highlights], false).await
    }

    pub async fn sync_documents_only(&mut self) -> Result<SyncResult, SyncError> {
        self.run(&[Resource::Documents], false).await
    }

    #[instrument(skip_all, fields(full))]
    async fn run(&mut self, resources: &[Resource], full: bool) -> Result<SyncResult, SyncError> {
        let mut result = SyncResult {
            synced_at: Utc::now(),
            ..Default::default()
        };
        for &resource in resources {
            let since = self.ledger.since(resource, full);
            match resource {
                Resource::Highlights => {
                    result.highlights = self.source.list_highlights(since).try_collect().await?
                }
                Resource::Books => result.books = self.source.list_books(since).try_collect().await?,
                Resource::Documents => {
                    result.documents = self.source.list_documents(since).try_collect().await?
                }
            }
        }
        self.ledger.commit(resources, &result)?;
        self.handlers.notify(&result).await;
        Ok(result)
    }
}
