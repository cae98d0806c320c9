//! Filters for the list endpoints, serialized to query parameters.
use chrono::{DateTime, SecondsFormat, Utc};

use crate::model::{BookCategory, DocumentCategory, DocumentLocation};

type Params = Vec<(String, String)>;

fn push(params: &mut Params, key: &str, value: impl ToString) {
    params.push((key.to_string(), value.to_string()));
}

fn push_time(params: &mut Params, key: &str, value: Option<DateTime<Utc>>) {
    if let Some(ts) = value {
        push(params, key, ts.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
}

/// `GET /highlights/`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightQuery {
    pub page_size: Option<u32>,
    pub book_id: Option<u64>,
    pub updated_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
    pub highlighted_after: Option<DateTime<Utc>>,
    pub highlighted_before: Option<DateTime<Utc>>,
}

impl HighlightQuery {
    pub fn updated_since(since: Option<DateTime<Utc>>) -> Self {
        Self {
            updated_after: since,
            ..Default::default()
        }
    }

    pub fn for_book(book_id: u64) -> Self {
        Self {
            book_id: Some(book_id),
            ..Default::default()
        }
    }

    pub(crate) fn to_params(&self) -> Params {
        let mut params = Params::new();
        if let Some(size) = self.page_size {
            push(&mut params, "page_size", size);
        }
        if let Some(id) = self.book_id {
            push(&mut params, "book_id", id);
        }
        push_time(&mut params, "updated__gt", self.updated_after);
        push_time(&mut params, "updated__lt", self.updated_before);
        push_time(&mut params, "highlighted_at__gt", self.highlighted_after);
        push_time(&mut params, "highlighted_at__lt", self.highlighted_before);
        params
    }
}

/// `GET /books/`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookQuery {
    pub page_size: Option<u32>,
    pub category: Option<BookCategory>,
    pub source: Option<String>,
    pub updated_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
    pub last_highlight_after: Option<DateTime<Utc>>,
    pub last_highlight_before: Option<DateTime<Utc>>,
}

impl BookQuery {
    pub fn updated_since(since: Option<DateTime<Utc>>) -> Self {
        Self {
            updated_after: since,
            ..Default::default()
        }
    }

    pub(crate) fn to_params(&self) -> Params {
        let mut params = Params::new();
        if let Some(size) = self.page_size {
            push(&mut params, "page_size", size);
        }
        if let Some(category) = self.category {
            push(&mut params, "category", category);
        }
        if let Some(source) = &self.source {
            push(&mut params, "source", source);
        }
        push_time(&mut params, "updated__gt", self.updated_after);
        push_time(&mut params, "updated__lt", self.updated_before);
        push_time(&mut params, "last_highlight_at__gt", self.last_highlight_after);
        push_time(&mut params, "last_highlight_at__lt", self.last_highlight_before);
        params
    }
}

/// `GET /export/`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportQuery {
    pub updated_after: Option<DateTime<Utc>>,
    pub ids: Vec<u64>,
    pub include_deleted: bool,
}

impl ExportQuery {
    pub(crate) fn to_params(&self) -> Params {
        let mut params = Params::new();
        push_time(&mut params, "updatedAfter", self.updated_after);
        if !self.ids.is_empty() {
            let ids: Vec<String> = self.ids.iter().map(u64::to_string).collect();
            push(&mut params, "ids", ids.join(","));
        }
        if self.include_deleted {
            push(&mut params, "includeDeleted", "true");
        }
        params
    }
}

/// `GET /list/` on the Reader API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentQuery {
    pub id: Option<String>,
    pub location: Option<DocumentLocation>,
    pub category: Option<DocumentCategory>,
    pub tags: Vec<String>,
    pub updated_after: Option<DateTime<Utc>>,
    pub with_html_content: bool,
}

impl DocumentQuery {
    pub fn updated_since(since: Option<DateTime<Utc>>) -> Self {
        Self {
            updated_after: since,
            ..Default::default()
        }
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn in_location(location: DocumentLocation) -> Self {
        Self {
            location: Some(location),
            ..Default::default()
        }
    }

    pub fn inbox() -> Self {
        Self::in_location(DocumentLocation::New)
    }

    pub fn reading_list() -> Self {
        Self::in_location(DocumentLocation::Later)
    }

    pub fn archive() -> Self {
        Self::in_location(DocumentLocation::Archive)
    }

    pub fn articles() -> Self {
        Self {
            category: Some(DocumentCategory::Article),
            ..Default::default()
        }
    }

    pub(crate) fn to_params(&self) -> Params {
        let mut params = Params::new();
        if let Some(id) = &self.id {
            push(&mut params, "id", id);
        }
        if let Some(location) = self.location {
            push(&mut params, "location", location);
        }
        if let Some(category) = self.category {
            push(&mut params, "category", category);
        }
        for tag in &self.tags {
            push(&mut params, "tag", tag);
        }
        push_time(&mut params, "updatedAfter", self.updated_after);
        if self.with_html_content {
            push(&mut params, "withHtmlContent", "true");
        }
        params
    }
}
