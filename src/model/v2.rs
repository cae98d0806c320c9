use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::null_as_default;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub location: Option<i64>,
    #[serde(default)]
    pub location_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub highlighted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub book_id: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<Tag>,
}

impl Highlight {
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }

    pub fn has_note(&self) -> bool {
        self.note.as_deref().is_some_and(|n| !n.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookCategory {
    Books,
    Articles,
    Tweets,
    Supplementals,
    Podcasts,
    #[serde(other)]
    Other,
}

impl BookCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookCategory::Books => "books",
            BookCategory::Articles => "articles",
            BookCategory::Tweets => "tweets",
            BookCategory::Supplementals => "supplementals",
            BookCategory::Podcasts => "podcasts",
            BookCategory::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "books" => Some(BookCategory::Books),
            "articles" => Some(BookCategory::Articles),
            "tweets" => Some(BookCategory::Tweets),
            "supplementals" => Some(BookCategory::Supplementals),
            "podcasts" => Some(BookCategory::Podcasts),
            _ => None,
        }
    }
}

impl fmt::Display for BookCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<BookCategory>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub num_highlights: u64,
    #[serde(default)]
    pub last_highlight_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub highlights_url: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<Tag>,
}

/// Payload for `POST /highlights/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HighlightCreate {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<BookCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlighted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_url: Option<String>,
}

/// One highlight reported back by `POST /highlights/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedHighlight {
    pub id: u64,
    pub book_id: Option<u64>,
}

/// Payload for `PATCH /highlights/{id}/`. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HighlightUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl HighlightUpdate {
    pub fn is_empty(&self) -> bool {
        self == &HighlightUpdate::default()
    }
}

/// Book entry returned by `GET /export/`, with its highlights inlined.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExportBook {
    pub user_book_id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub readable_title: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub unique_url: Option<String>,
    #[serde(default)]
    pub category: Option<BookCategory>,
    #[serde(default)]
    pub document_note: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub book_tags: Vec<Tag>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub highlights: Vec<Highlight>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DailyReview {
    pub review_id: u64,
    #[serde(default)]
    pub review_url: Option<String>,
    #[serde(default)]
    pub review_completed: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub highlights: Vec<Highlight>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn highlight_tolerates_nulls_and_missing_fields() {
        let h: Highlight = serde_json::from_value(json!({
            "id": 7,
            "text": "hello",
            "note": null,
            "location": null,
            "tags": null,
            "highlighted_at": "2024-01-15T10:00:00+00:00"
        }))
        .unwrap();
        assert_eq!(h.id, 7);
        assert!(h.tags.is_empty());
        assert!(!h.has_note());
        assert!(h.highlighted_at.is_some());
        assert!(h.book_id.is_none());
    }

    #[test]
    fn unknown_book_category_maps_to_other() {
        let b: Book = serde_json::from_value(json!({
            "id": 1,
            "title": "T",
            "category": "magazines"
        }))
        .unwrap();
        assert_eq!(b.category, Some(BookCategory::Other));
        assert_eq!(BookCategory::parse("Articles"), Some(BookCategory::Articles));
        assert_eq!(BookCategory::parse("not_a_category"), None);
    }

    #[test]
    fn update_payload_skips_unset_fields() {
        let update = HighlightUpdate {
            note: Some("n".into()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({ "note": "n" }));
        assert!(HighlightUpdate::default().is_empty());
    }
}
