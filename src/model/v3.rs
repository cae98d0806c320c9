use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::null_as_default;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentCategory {
    Article,
    Email,
    Rss,
    Highlight,
    Note,
    Pdf,
    Epub,
    Tweet,
    Video,
    #[serde(other)]
    Other,
}

impl DocumentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::Article => "article",
            DocumentCategory::Email => "email",
            DocumentCategory::Rss => "rss",
            DocumentCategory::Highlight => "highlight",
            DocumentCategory::Note => "note",
            DocumentCategory::Pdf => "pdf",
            DocumentCategory::Epub => "epub",
            DocumentCategory::Tweet => "tweet",
            DocumentCategory::Video => "video",
            DocumentCategory::Other => "other",
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentLocation {
    New,
    Later,
    Shortlist,
    Archive,
    Feed,
}

impl DocumentLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentLocation::New => "new",
            DocumentLocation::Later => "later",
            DocumentLocation::Shortlist => "shortlist",
            DocumentLocation::Archive => "archive",
            DocumentLocation::Feed => "feed",
        }
    }
}

impl fmt::Display for DocumentLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag attached to a Reader document, keyed by its tag key in [`Document::tags`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentTag {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<DocumentCategory>,
    #[serde(default)]
    pub location: Option<DocumentLocation>,
    #[serde(default, deserialize_with = "deserialize_document_tags")]
    pub tags: BTreeMap<String, DocumentTag>,
    #[serde(default)]
    pub site_name: Option<String>,
    #[serde(default)]
    pub word_count: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_date: Option<Value>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub reading_progress: Option<f64>,
    #[serde(default)]
    pub html_content: Option<String>,
}

impl Document {
    /// Display names of the attached tags, falling back to the tag key.
    pub fn tag_names(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|(key, tag)| tag.name.clone().unwrap_or_else(|| key.clone()))
            .collect()
    }

    /// Lowercased host of the document URL, if it parses.
    pub fn host(&self) -> Option<String> {
        let url = reqwest::Url::parse(&self.url).ok()?;
        url.host_str().map(|h| h.to_ascii_lowercase())
    }
}

/// Reader returns document tags as an object keyed by tag key, but older
/// payloads use `null` or a plain list of names.
fn deserialize_document_tags<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, DocumentTag>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let mut tags = BTreeMap::new();
    match raw {
        Some(Value::Object(map)) => {
            for (key, value) in map {
                let tag = serde_json::from_value(value).unwrap_or_default();
                tags.insert(key, tag);
            }
        }
        Some(Value::Array(items)) => {
            for item in items {
                if let Value::String(name) = item {
                    tags.insert(
                        name.clone(),
                        DocumentTag {
                            name: Some(name),
                            kind: None,
                        },
                    );
                }
            }
        }
        _ => {}
    }
    Ok(tags)
}

/// Payload for `POST /save/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentCreate {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_clean_html: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<DocumentLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<DocumentCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_using: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl DocumentCreate {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Payload for `PATCH /update/{id}/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<DocumentLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<DocumentCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl DocumentUpdate {
    pub fn move_to(location: DocumentLocation) -> Self {
        Self {
            location: Some(location),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SaveResult {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReaderTag {
    pub key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_tags_accept_object_list_and_null() {
        let doc: Document = serde_json::from_value(json!({
            "id": "d1",
            "url": "https://example.com",
            "tags": { "python": { "name": "Python", "type": "manual" } }
        }))
        .unwrap();
        assert_eq!(doc.tag_names(), vec!["Python".to_string()]);

        let doc: Document = serde_json::from_value(json!({
            "id": "d2",
            "url": "https://example.com",
            "tags": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(doc.tag_names(), vec!["a".to_string(), "b".to_string()]);

        let doc: Document = serde_json::from_value(json!({
            "id": "d3",
            "url": "https://example.com",
            "tags": null
        }))
        .unwrap();
        assert!(doc.tags.is_empty());
    }

    #[test]
    fn document_host_is_lowercased() {
        let doc = Document {
            id: "1".into(),
            url: "https://Twitter.com/user/status/1".into(),
            ..Default::default()
        };
        assert_eq!(doc.host().as_deref(), Some("twitter.com"));
    }

    #[test]
    fn update_serializes_location_lowercase() {
        let update = DocumentUpdate::move_to(DocumentLocation::Archive);
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({ "location": "archive" })
        );
    }
}
