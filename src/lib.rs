//! Readwise and Reader API client with incremental sync, a background
//! poller and reading workflows.
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod manager;
pub mod managers;
pub mod model;
pub mod page;
pub mod poller;
pub mod since;
pub mod state;
pub mod sync;
pub mod workflows;

pub use client::{ClientOptions, ReadwiseClient};
pub use error::{ApiError, Result, SyncError};
pub use manager::{AsyncSyncManager, SyncManager, SyncResult};
pub use managers::{
    AsyncBookManager, AsyncDocumentManager, AsyncHighlightManager, BookManager, DocumentManager,
    HighlightManager,
};
pub use poller::{BackgroundPoller, PollerConfig, PollerHandle, StopSignal};
pub use since::Since;
pub use state::{PollerState, SyncState};
pub use sync::{AsyncBatchSync, BatchSync, BatchSyncConfig, BatchSyncResult};
