//! Progress records persisted as flat JSON files.
//!
//! Loading never fails: a missing file, unreadable JSON or a field of the
//! wrong type all fall back to that field's default. Saving overwrites the
//! whole file and reports I/O failures to the caller.
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Most recent sync errors kept in memory and written to disk.
pub const MAX_PERSISTED_ERRORS: usize = 100;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error writing state: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The three syncable resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Highlights,
    Books,
    Documents,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Highlights => "highlights",
            Resource::Books => "books",
            Resource::Documents => "documents",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-resource "last synced" timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncCursors {
    pub last_highlight_sync: Option<DateTime<Utc>>,
    pub last_book_sync: Option<DateTime<Utc>>,
    pub last_document_sync: Option<DateTime<Utc>>,
}

impl SyncCursors {
    pub fn get(&self, resource: Resource) -> Option<DateTime<Utc>> {
        match resource {
            Resource::Highlights => self.last_highlight_sync,
            Resource::Books => self.last_book_sync,
            Resource::Documents => self.last_document_sync,
        }
    }

    pub fn set(&mut self, resource: Resource, at: DateTime<Utc>) {
        let slot = match resource {
            Resource::Highlights => &mut self.last_highlight_sync,
            Resource::Books => &mut self.last_book_sync,
            Resource::Documents => &mut self.last_document_sync,
        };
        *slot = Some(at);
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            last_highlight_sync: field(obj, "last_highlight_sync"),
            last_book_sync: field(obj, "last_book_sync"),
            last_document_sync: field(obj, "last_document_sync"),
        }
    }
}

/// Progress of a [`crate::sync::BatchSync`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncState {
    #[serde(flatten)]
    cursors: SyncCursors,
    total_highlights_synced: u64,
    total_books_synced: u64,
    total_documents_synced: u64,
    last_sync_time: Option<DateTime<Utc>>,
    #[serde(serialize_with = "serialize_recent_errors")]
    errors: Vec<String>,
}

/// Snapshot returned by `stats()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub total_highlights_synced: u64,
    pub total_books_synced: u64,
    pub total_documents_synced: u64,
    pub last_highlight_sync: Option<DateTime<Utc>>,
    pub last_book_sync: Option<DateTime<Utc>>,
    pub last_document_sync: Option<DateTime<Utc>>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub error_count: usize,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Self {
        read_object(path)
            .map(|obj| Self::from_object(&obj))
            .unwrap_or_default()
    }

    pub fn from_json(value: &Value) -> Self {
        value
            .as_object()
            .map(Self::from_object)
            .unwrap_or_default()
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        let mut errors: Vec<String> = field(obj, "errors");
        prune_errors(&mut errors);
        Self {
            cursors: SyncCursors::from_object(obj),
            total_highlights_synced: field(obj, "total_highlights_synced"),
            total_books_synced: field(obj, "total_books_synced"),
            total_documents_synced: field(obj, "total_documents_synced"),
            last_sync_time: field(obj, "last_sync_time"),
            errors,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        write_json(path, self)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn cursors(&self) -> &SyncCursors {
        &self.cursors
    }

    pub fn last_sync(&self, resource: Resource) -> Option<DateTime<Utc>> {
        self.cursors.get(resource)
    }

    pub fn last_highlight_sync(&self) -> Option<DateTime<Utc>> {
        self.cursors.last_highlight_sync
    }

    pub fn last_book_sync(&self) -> Option<DateTime<Utc>> {
        self.cursors.last_book_sync
    }

    pub fn last_document_sync(&self) -> Option<DateTime<Utc>> {
        self.cursors.last_document_sync
    }

    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.last_sync_time
    }

    pub fn total_highlights_synced(&self) -> u64 {
        self.total_highlights_synced
    }

    pub fn total_books_synced(&self) -> u64 {
        self.total_books_synced
    }

    pub fn total_documents_synced(&self) -> u64 {
        self.total_documents_synced
    }

    pub fn total_synced(&self, resource: Resource) -> u64 {
        match resource {
            Resource::Highlights => self.total_highlights_synced,
            Resource::Books => self.total_books_synced,
            Resource::Documents => self.total_documents_synced,
        }
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn add_highlights(&mut self, n: u64) {
        self.total_highlights_synced = self.total_highlights_synced.saturating_add(n);
    }

    pub fn add_books(&mut self, n: u64) {
        self.total_books_synced = self.total_books_synced.saturating_add(n);
    }

    pub fn add_documents(&mut self, n: u64) {
        self.total_documents_synced = self.total_documents_synced.saturating_add(n);
    }

    pub fn add(&mut self, resource: Resource, n: u64) {
        match resource {
            Resource::Highlights => self.add_highlights(n),
            Resource::Books => self.add_books(n),
            Resource::Documents => self.add_documents(n),
        }
    }

    /// Advance the cursor of `resource` and the overall sync time.
    pub fn mark_synced(&mut self, resource: Resource, at: DateTime<Utc>) {
        self.cursors.set(resource, at);
        self.last_sync_time = Some(at);
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        prune_errors(&mut self.errors);
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            total_highlights_synced: self.total_highlights_synced,
            total_books_synced: self.total_books_synced,
            total_documents_synced: self.total_documents_synced,
            last_highlight_sync: self.cursors.last_highlight_sync,
            last_book_sync: self.cursors.last_book_sync,
            last_document_sync: self.cursors.last_document_sync,
            last_sync_time: self.last_sync_time,
            error_count: self.errors.len(),
        }
    }
}

/// Persistent record of a [`crate::poller::BackgroundPoller`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollerState {
    pub last_poll_time: Option<DateTime<Utc>>,
    pub poll_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub is_running: bool,
    #[serde(flatten)]
    pub cursors: SyncCursors,
}

impl PollerState {
    pub fn load(path: &Path) -> Self {
        read_object(path)
            .map(|obj| Self::from_object(&obj))
            .unwrap_or_default()
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            last_poll_time: field(obj, "last_poll_time"),
            poll_count: field(obj, "poll_count"),
            error_count: field(obj, "error_count"),
            last_error: field(obj, "last_error"),
            is_running: field(obj, "is_running"),
            cursors: SyncCursors::from_object(obj),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        write_json(path, self)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Persistent record of a [`crate::manager::SyncManager`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncManagerState {
    #[serde(flatten)]
    pub cursors: SyncCursors,
    pub total_syncs: u64,
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl SyncManagerState {
    pub fn load(path: &Path) -> Self {
        read_object(path)
            .map(|obj| Self {
                cursors: SyncCursors::from_object(&obj),
                total_syncs: field(&obj, "total_syncs"),
                last_sync_time: field(&obj, "last_sync_time"),
            })
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        write_json(path, self)
    }
}

fn field<T: DeserializeOwned + Default>(obj: &Map<String, Value>, key: &str) -> T {
    match obj.get(key) {
        None | Some(Value::Null) => T::default(),
        Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|err| {
            debug!(key, %err, "ignoring malformed state field");
            T::default()
        }),
    }
}

fn read_object(path: &Path) -> Option<Map<String, Value>> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(obj)) => Some(obj),
        Ok(_) => {
            warn!(path = %path.display(), "state file is not a JSON object; starting fresh");
            None
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "state file is corrupt; starting fresh");
            None
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body)?;
    Ok(())
}

fn prune_errors(errors: &mut Vec<String>) {
    if errors.len() > MAX_PERSISTED_ERRORS {
        let excess = errors.len() - MAX_PERSISTED_ERRORS;
        errors.drain(..excess);
    }
}

fn serialize_recent_errors<S: Serializer>(errors: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    let start = errors.len().saturating_sub(MAX_PERSISTED_ERRORS);
    errors[start..].serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn empty_state_has_defaults() {
        let state = SyncState::new();
        assert_eq!(state.last_highlight_sync(), None);
        assert_eq!(state.total_highlights_synced(), 0);
        assert!(state.errors().is_empty());
    }

    #[test]
    fn serializes_flat_iso_timestamps() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let mut state = SyncState::new();
        state.mark_synced(Resource::Highlights, now);
        state.mark_synced(Resource::Books, now);
        state.add_highlights(100);
        state.add_books(50);
        state.record_error("error1");
        state.record_error("error2");

        let data = state.to_json();
        assert_eq!(data["last_highlight_sync"], json!("2024-01-15T10:00:00Z"));
        assert_eq!(data["last_book_sync"], json!("2024-01-15T10:00:00Z"));
        assert_eq!(data["last_document_sync"], Value::Null);
        assert_eq!(data["total_highlights_synced"], 100);
        assert_eq!(data["total_books_synced"], 50);
        assert_eq!(data["errors"], json!(["error1", "error2"]));
    }

    #[test]
    fn errors_keep_most_recent_hundred() {
        let mut state = SyncState::new();
        for i in 0..150 {
            state.record_error(format!("error{i}"));
        }
        assert_eq!(state.errors().len(), MAX_PERSISTED_ERRORS);
        assert_eq!(state.errors()[0], "error50");
        let data = state.to_json();
        assert_eq!(data["errors"].as_array().unwrap().len(), 100);
        assert_eq!(data["errors"][99], "error149");
    }

    #[test]
    fn oversized_error_list_on_disk_is_capped() {
        let errors: Vec<String> = (0..120).map(|i| format!("e{i}")).collect();
        let state = SyncState::from_json(&json!({ "errors": errors }));
        assert_eq!(state.errors().len(), 100);
        assert_eq!(state.errors()[0], "e20");
    }

    #[test]
    fn lenient_field_decoding() {
        let state = SyncState::from_json(&json!({
            "last_highlight_sync": "2024-01-15T10:00:00+00:00",
            "last_book_sync": "yesterday",
            "total_highlights_synced": 100,
            "total_books_synced": "fifty",
            "errors": ["error1"]
        }));
        assert!(state.last_highlight_sync().is_some());
        assert_eq!(state.last_book_sync(), None);
        assert_eq!(state.total_highlights_synced(), 100);
        assert_eq!(state.total_books_synced(), 0);
        assert_eq!(state.errors(), &["error1".to_string()]);
    }

    #[test]
    fn corrupt_or_missing_file_yields_default() {
        let td = tempdir().unwrap();
        let p = td.path().join("sync_state.json");
        assert_eq!(SyncState::load(&p), SyncState::default());

        fs::write(&p, "not valid json {{{}}").unwrap();
        assert_eq!(SyncState::load(&p), SyncState::default());
        assert_eq!(PollerState::load(&p), PollerState::default());

        fs::write(&p, "[1, 2, 3]").unwrap();
        assert_eq!(SyncState::load(&p), SyncState::default());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let td = tempdir().unwrap();
        let p = td.path().join("nested").join("state.json");
        let mut state = SyncState::new();
        state.add_highlights(42);
        state.add_books(10);
        state.mark_synced(Resource::Documents, Utc::now());
        state.save(&p).unwrap();

        let restored = SyncState::load(&p);
        assert_eq!(restored.total_highlights_synced(), 42);
        assert_eq!(restored.total_books_synced(), 10);
        assert!(restored.last_document_sync().is_some());
    }

    #[test]
    fn save_into_missing_directory_reports_error() {
        let td = tempdir().unwrap();
        let blocker = td.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let p = blocker.join("state.json");
        let err = SyncState::new().save(&p).unwrap_err();
        assert!(matches!(err, StateError::Io(_)));
    }

    #[test]
    fn poller_state_roundtrip() {
        let td = tempdir().unwrap();
        let p = td.path().join("poller.json");
        let state = PollerState {
            poll_count: 3,
            error_count: 1,
            last_error: Some("boom".into()),
            is_running: true,
            ..Default::default()
        };
        state.save(&p).unwrap();
        let raw: Value = serde_json::from_str(&fs::read_to_string(&p).unwrap()).unwrap();
        assert_eq!(raw["poll_count"], 3);
        assert_eq!(raw["last_highlight_sync"], Value::Null);
        assert_eq!(PollerState::load(&p), state);
    }

    #[test]
    fn stats_report_counts() {
        let mut state = SyncState::new();
        state.add(Resource::Highlights, 5);
        state.add(Resource::Books, 3);
        state.add(Resource::Documents, 4);
        let stats = state.stats();
        assert_eq!(stats.total_highlights_synced, 5);
        assert_eq!(stats.total_books_synced, 3);
        assert_eq!(stats.total_documents_synced, 4);
        assert_eq!(stats.error_count, 0);
    }
}
