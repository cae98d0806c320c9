use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use super::{contains_ignore_case, cutoff};
use crate::client::blocking;
use crate::client::{DocumentQuery, ReadwiseClient};
use crate::error::Result;
use crate::model::{Document, DocumentCategory, DocumentUpdate, SaveResult};

/// Queue sizes across inbox, reading list and archive. The oldest and
/// newest entries consider inbox documents with a creation time only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InboxStats {
    pub inbox_count: usize,
    pub reading_list_count: usize,
    pub archive_count: usize,
    pub total_count: usize,
    pub by_category: BTreeMap<String, usize>,
    pub oldest_inbox_item: Option<Document>,
    pub newest_inbox_item: Option<Document>,
}

impl InboxStats {
    fn from_queues(inbox: Vec<Document>, later: Vec<Document>, archive: Vec<Document>) -> Self {
        let mut stats = InboxStats {
            inbox_count: inbox.len(),
            reading_list_count: later.len(),
            archive_count: archive.len(),
            total_count: inbox.len() + later.len() + archive.len(),
            ..Default::default()
        };
        for doc in inbox.iter().chain(&later).chain(&archive) {
            let category = doc.category.map_or("unknown", |c| c.as_str());
            *stats.by_category.entry(category.to_string()).or_default() += 1;
        }
        let dated = || inbox.iter().filter(|d| d.created_at.is_some());
        stats.oldest_inbox_item = dated().min_by_key(|d| d.created_at).cloned();
        stats.newest_inbox_item = dated().max_by_key(|d| d.created_at).cloned();
        stats
    }
}

fn by_category(category: DocumentCategory) -> DocumentQuery {
    DocumentQuery {
        category: Some(category),
        ..Default::default()
    }
}

fn title_or_summary_matches(doc: &Document, needle: &str) -> bool {
    contains_ignore_case(doc.title.as_deref(), needle)
        || contains_ignore_case(doc.summary.as_deref(), needle)
}

/// Replaces the document's tag set.
fn retag(tags: &[&str]) -> DocumentUpdate {
    DocumentUpdate {
        tags: Some(tags.iter().map(|t| t.to_string()).collect()),
        ..Default::default()
    }
}

fn outcome(id: &str, result: Result<SaveResult>, what: &str) -> bool {
    match result {
        Ok(_) => true,
        Err(err) => {
            warn!(document = %id, error = %err, "{what} failed");
            false
        }
    }
}

pub struct DocumentManager<'a> {
    client: &'a blocking::ReadwiseClient,
}

impl<'a> DocumentManager<'a> {
    pub fn new(client: &'a blocking::ReadwiseClient) -> Self {
        Self { client }
    }

    fn list(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        self.client.list_documents(query).collect()
    }

    pub fn get_all_documents(&self) -> Result<Vec<Document>> {
        self.list(DocumentQuery::default())
    }

    pub fn get_inbox(&self) -> Result<Vec<Document>> {
        self.list(DocumentQuery::inbox())
    }

    pub fn get_reading_list(&self) -> Result<Vec<Document>> {
        self.list(DocumentQuery::reading_list())
    }

    pub fn get_archive(&self) -> Result<Vec<Document>> {
        self.list(DocumentQuery::archive())
    }

    pub fn get_documents_by_category(&self, category: DocumentCategory) -> Result<Vec<Document>> {
        self.list(by_category(category))
    }

    /// Documents updated within the window; days win over hours, hours
    /// over `at`. At least one must be given.
    pub fn get_documents_since(
        &self,
        days: Option<u32>,
        hours: Option<u32>,
        at: Option<DateTime<Utc>>,
    ) -> Result<Vec<Document>> {
        let since = cutoff(days, hours, at)?;
        self.list(DocumentQuery::updated_since(Some(since)))
    }

    /// Case-insensitive search over title and summary.
    pub fn search_documents(&self, query: &str) -> Result<Vec<Document>> {
        let needle = query.to_lowercase();
        self.filter_documents(|d| title_or_summary_matches(d, &needle))
    }

    pub fn filter_documents(&self, predicate: impl Fn(&Document) -> bool) -> Result<Vec<Document>> {
        self.client
            .list_documents(DocumentQuery::default())
            .filter(|item| item.as_ref().map_or(true, &predicate))
            .collect()
    }

    pub fn archive(&self, id: &str) -> Result<SaveResult> {
        self.client.archive(id)
    }

    pub fn move_to_later(&self, id: &str) -> Result<SaveResult> {
        self.client.later(id)
    }

    pub fn move_to_inbox(&self, id: &str) -> Result<SaveResult> {
        self.client.inbox(id)
    }

    pub fn bulk_archive(&self, ids: &[&str]) -> BTreeMap<String, bool> {
        ids.iter()
            .map(|id| (id.to_string(), outcome(id, self.client.archive(id), "archive")))
            .collect()
    }

    /// Set `tags` as the tag list of every document.
    pub fn bulk_tag_documents(&self, ids: &[&str], tags: &[&str]) -> BTreeMap<String, bool> {
        let update = retag(tags);
        ids.iter()
            .map(|id| {
                let result = self.client.update_document(id, &update);
                (id.to_string(), outcome(id, result, "tag"))
            })
            .collect()
    }

    pub fn get_inbox_stats(&self) -> Result<InboxStats> {
        Ok(InboxStats::from_queues(
            self.get_inbox()?,
            self.get_reading_list()?,
            self.get_archive()?,
        ))
    }

    /// Inbox plus reading list.
    pub fn get_unread_count(&self) -> Result<usize> {
        Ok(self.get_inbox()?.len() + self.get_reading_list()?.len())
    }
}

pub struct AsyncDocumentManager<'a> {
    client: &'a ReadwiseClient,
}

impl<'a> AsyncDocumentManager<'a> {
    pub fn new(client: &'a ReadwiseClient) -> Self {
        Self { client }
    }

    async fn list(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        self.client.list_documents(query).try_collect().await
    }

    pub async fn get_all_documents(&self) -> Result<Vec<Document>> {
        self.list(DocumentQuery::default()).await
    }

    pub async fn get_inbox(&self) -> Result<Vec<Document>> {
        self.list(DocumentQuery::inbox()).await
    }

    pub async fn get_reading_list(&self) -> Result<Vec<Document>> {
        self.list(DocumentQuery::reading_list()).await
    }

    pub async fn get_archive(&self) -> Result<Vec<Document>> {
        self.list(DocumentQuery::archive()).await
    }

    pub async fn get_documents_by_category(
        &self,
        category: DocumentCategory,
    ) -> Result<Vec<Document>> {
        self.list(by_category(category)).await
    }

    pub async fn get_documents_since(
        &self,
        days: Option<u32>,
        hours: Option<u32>,
        at: Option<DateTime<Utc>>,
    ) -> Result<Vec<Document>> {
        let since = cutoff(days, hours, at)?;
        self.list(DocumentQuery::updated_since(Some(since))).await
    }

    pub async fn search_documents(&self, query: &str) -> Result<Vec<Document>> {
        let needle = query.to_lowercase();
        self.filter_documents(|d| title_or_summary_matches(d, &needle))
            .await
    }

    pub async fn filter_documents(
        &self,
        predicate: impl Fn(&Document) -> bool,
    ) -> Result<Vec<Document>> {
        let mut all = self.get_all_documents().await?;
        all.retain(|d| predicate(d));
        Ok(all)
    }

    pub async fn archive(&self, id: &str) -> Result<SaveResult> {
        self.client.archive(id).await
    }

    pub async fn move_to_later(&self, id: &str) -> Result<SaveResult> {
        self.client.later(id).await
    }

    pub async fn move_to_inbox(&self, id: &str) -> Result<SaveResult> {
        self.client.inbox(id).await
    }

    pub async fn bulk_archive(&self, ids: &[&str]) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for id in ids {
            let result = self.client.archive(id).await;
            results.insert(id.to_string(), outcome(id, result, "archive"));
        }
        results
    }

    pub async fn bulk_tag_documents(&self, ids: &[&str], tags: &[&str]) -> BTreeMap<String, bool> {
        let update = retag(tags);
        let mut results = BTreeMap::new();
        for id in ids {
            let result = self.client.update_document(id, &update).await;
            results.insert(id.to_string(), outcome(id, result, "tag"));
        }
        results
    }

    pub async fn get_inbox_stats(&self) -> Result<InboxStats> {
        let inbox = self.get_inbox().await?;
        let later = self.get_reading_list().await?;
        let archive = self.get_archive().await?;
        Ok(InboxStats::from_queues(inbox, later, archive))
    }

    pub async fn get_unread_count(&self) -> Result<usize> {
        Ok(self.get_inbox().await?.len() + self.get_reading_list().await?.len())
    }
}
