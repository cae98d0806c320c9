//! Push highlights from other tools into Readwise, truncating fields that
//! exceed the API limits.
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::client::blocking::ReadwiseClient;
use crate::error::Result;
use crate::model::{BookCategory, Highlight, HighlightCreate, HighlightUpdate};

pub const MAX_TEXT_LENGTH: usize = 8191;
pub const MAX_TITLE_LENGTH: usize = 511;
pub const MAX_AUTHOR_LENGTH: usize = 1024;
pub const MAX_NOTE_LENGTH: usize = 8191;

const ELLIPSIS: &str = "...";

/// Cut `value` to at most `max` chars, ending in `...` when shortened.
pub fn truncate_str(value: &str, max: usize) -> (String, bool) {
    if value.chars().count() <= max {
        return (value.to_string(), false);
    }
    if max < ELLIPSIS.len() {
        return (value.chars().take(max).collect(), true);
    }
    let mut out: String = value.chars().take(max - ELLIPSIS.len()).collect();
    out.push_str(ELLIPSIS);
    (out, true)
}

pub fn truncate_field(value: Option<&str>, max: usize) -> (Option<String>, bool) {
    match value {
        Some(value) => {
            let (out, truncated) = truncate_str(value, max);
            (Some(out), truncated)
        }
        None => (None, false),
    }
}

/// Highlight to push, with the book it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimpleHighlight {
    pub text: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub source_url: Option<String>,
    pub source_type: Option<String>,
    pub category: Option<BookCategory>,
    pub note: Option<String>,
    pub location: Option<i64>,
    pub location_type: Option<String>,
    pub highlighted_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

impl SimpleHighlight {
    pub fn new(text: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldTruncation {
    pub field_name: &'static str,
    pub original_length: usize,
    pub truncated_length: usize,
}

impl FieldTruncation {
    pub fn chars_removed(&self) -> usize {
        self.original_length.saturating_sub(self.truncated_length)
    }
}

/// Fields shortened before sending, in the order text, note, title, author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TruncationInfo {
    pub fields: Vec<FieldTruncation>,
}

impl TruncationInfo {
    pub fn truncated_field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.field_name).collect()
    }

    fn into_option(self) -> Option<Self> {
        (!self.fields.is_empty()).then_some(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushResult {
    pub success: bool,
    pub highlight_id: Option<u64>,
    pub book_id: Option<u64>,
    pub error: Option<String>,
    pub truncation_info: Option<TruncationInfo>,
    pub original: SimpleHighlight,
}

impl PushResult {
    pub fn was_truncated(&self) -> bool {
        self.truncation_info.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateResult {
    pub success: bool,
    pub highlight_id: u64,
    pub highlight: Option<Highlight>,
    pub error: Option<String>,
    pub truncation_info: Option<TruncationInfo>,
}

impl UpdateResult {
    pub fn was_truncated(&self) -> bool {
        self.truncation_info.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteResult {
    pub success: bool,
    pub highlight_id: u64,
    pub error: Option<String>,
}

pub struct HighlightPusher<'a> {
    client: &'a ReadwiseClient,
    auto_truncate: bool,
}

impl<'a> HighlightPusher<'a> {
    /// Truncation is on by default.
    pub fn new(client: &'a ReadwiseClient) -> Self {
        Self {
            client,
            auto_truncate: true,
        }
    }

    pub fn with_auto_truncate(mut self, enabled: bool) -> Self {
        self.auto_truncate = enabled;
        self
    }

    pub fn validate_token(&self) -> Result<bool> {
        self.client.validate_token()
    }

    fn fit(
        &self,
        field_name: &'static str,
        value: Option<&str>,
        max: usize,
        info: &mut TruncationInfo,
    ) -> Option<String> {
        if !self.auto_truncate {
            return value.map(str::to_string);
        }
        let (out, truncated) = truncate_field(value, max);
        if let (true, Some(original), Some(short)) = (truncated, value, out.as_deref()) {
            info.fields.push(FieldTruncation {
                field_name,
                original_length: original.chars().count(),
                truncated_length: short.chars().count(),
            });
        }
        out
    }

    fn prepare(&self, highlight: &SimpleHighlight) -> (HighlightCreate, Option<TruncationInfo>) {
        let mut info = TruncationInfo::default();
        let text = self
            .fit("text", Some(&highlight.text), MAX_TEXT_LENGTH, &mut info)
            .unwrap_or_default();
        let note = self.fit("note", highlight.note.as_deref(), MAX_NOTE_LENGTH, &mut info);
        let title = self.fit("title", highlight.title.as_deref(), MAX_TITLE_LENGTH, &mut info);
        let author = self.fit("author", highlight.author.as_deref(), MAX_AUTHOR_LENGTH, &mut info);
        let create = HighlightCreate {
            text,
            title,
            author,
            source_url: highlight.source_url.clone(),
            source_type: highlight.source_type.clone(),
            category: highlight.category,
            note,
            location: highlight.location,
            location_type: highlight.location_type.clone(),
            highlighted_at: highlight.highlighted_at,
            ..Default::default()
        };
        (create, info.into_option())
    }

    pub fn push(&self, highlight: SimpleHighlight) -> PushResult {
        self.push_batch(vec![highlight])
            .pop()
            .unwrap_or_else(|| PushResult {
                success: false,
                highlight_id: None,
                book_id: None,
                error: Some("No API result returned".into()),
                truncation_info: None,
                original: SimpleHighlight::default(),
            })
    }

    /// Push all highlights in one request. Results line up with the input;
    /// when the API reports fewer highlights than were sent, the rest fail.
    pub fn push_batch(&self, highlights: Vec<SimpleHighlight>) -> Vec<PushResult> {
        if highlights.is_empty() {
            return Vec::new();
        }
        let (payload, truncations): (Vec<_>, Vec<_>) =
            highlights.iter().map(|h| self.prepare(h)).unzip();

        let created = match self.client.create_highlights(&payload) {
            Ok(created) => created,
            Err(err) => {
                warn!(count = highlights.len(), error = %err, "highlight push failed");
                let error = err.to_string();
                return highlights
                    .into_iter()
                    .zip(truncations)
                    .map(|(original, truncation_info)| PushResult {
                        success: false,
                        highlight_id: None,
                        book_id: None,
                        error: Some(error.clone()),
                        truncation_info,
                        original,
                    })
                    .collect();
            }
        };

        highlights
            .into_iter()
            .zip(truncations)
            .enumerate()
            .map(|(index, (original, truncation_info))| match created.get(index) {
                Some(done) => {
                    self.attach_tags(done.id, &original.tags);
                    PushResult {
                        success: true,
                        highlight_id: Some(done.id),
                        book_id: done.book_id,
                        error: None,
                        truncation_info,
                        original,
                    }
                }
                None => PushResult {
                    success: false,
                    highlight_id: None,
                    book_id: None,
                    error: Some("No API result returned".into()),
                    truncation_info,
                    original,
                },
            })
            .collect()
    }

    fn attach_tags(&self, highlight_id: u64, tags: &[String]) {
        for tag in tags {
            if let Err(err) = self.client.create_highlight_tag(highlight_id, tag) {
                warn!(highlight = highlight_id, tag = %tag, error = %err, "tag create failed");
            }
        }
    }

    /// Apply `update`, truncating its text and note when enabled.
    pub fn update(&self, highlight_id: u64, update: HighlightUpdate) -> UpdateResult {
        let mut info = TruncationInfo::default();
        let update = HighlightUpdate {
            text: self.fit("text", update.text.as_deref(), MAX_TEXT_LENGTH, &mut info),
            note: self.fit("note", update.note.as_deref(), MAX_NOTE_LENGTH, &mut info),
            ..update
        };
        let truncation_info = info.into_option();
        match self.client.update_highlight(highlight_id, &update) {
            Ok(highlight) => UpdateResult {
                success: true,
                highlight_id,
                highlight: Some(highlight),
                error: None,
                truncation_info,
            },
            Err(err) => {
                debug!(highlight = highlight_id, error = %err, "highlight update failed");
                UpdateResult {
                    success: false,
                    highlight_id,
                    highlight: None,
                    error: Some(err.to_string()),
                    truncation_info,
                }
            }
        }
    }

    /// One request per highlight; a failure only affects its own entry.
    pub fn update_batch(&self, updates: Vec<(u64, HighlightUpdate)>) -> Vec<UpdateResult> {
        updates
            .into_iter()
            .map(|(id, update)| self.update(id, update))
            .collect()
    }

    pub fn delete(&self, highlight_id: u64) -> DeleteResult {
        match self.client.delete_highlight(highlight_id) {
            Ok(()) => DeleteResult {
                success: true,
                highlight_id,
                error: None,
            },
            Err(err) => DeleteResult {
                success: false,
                highlight_id,
                error: Some(err.to_string()),
            },
        }
    }

    pub fn delete_batch(&self, ids: &[u64]) -> Vec<DeleteResult> {
        ids.iter().map(|id| self.delete(*id)).collect()
    }
}
