use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{contains_ignore_case, cutoff};
use crate::client::blocking;
use crate::client::{HighlightQuery, ReadwiseClient};
use crate::error::{ApiError, Result};
use crate::model::{CreatedHighlight, Highlight, HighlightCreate, Tag};

fn create_payload(text: &str, title: Option<&str>, author: Option<&str>) -> HighlightCreate {
    HighlightCreate {
        text: text.to_string(),
        title: title.map(str::to_string),
        author: author.map(str::to_string),
        ..Default::default()
    }
}

fn first_created(created: Vec<CreatedHighlight>) -> Result<u64> {
    created
        .first()
        .map(|h| h.id)
        .ok_or_else(|| ApiError::Validation("no highlight was created".into()))
}

fn text_matches(highlight: &Highlight, needle: &str) -> bool {
    contains_ignore_case(Some(highlight.text.as_str()), needle)
}

fn tag_outcome(id: u64, tag: &str, outcome: Result<()>, what: &str) -> bool {
    match outcome {
        Ok(()) => true,
        Err(err) => {
            warn!(highlight = id, tag, error = %err, "{what} failed");
            false
        }
    }
}

fn tag_named<'t>(tags: &'t [Tag], name: &str) -> Option<&'t Tag> {
    tags.iter().find(|t| t.name == name)
}

pub struct HighlightManager<'a> {
    client: &'a blocking::ReadwiseClient,
}

impl<'a> HighlightManager<'a> {
    pub fn new(client: &'a blocking::ReadwiseClient) -> Self {
        Self { client }
    }

    fn list(&self, query: HighlightQuery) -> Result<Vec<Highlight>> {
        self.client.list_highlights(query).collect()
    }

    pub fn get_all_highlights(&self) -> Result<Vec<Highlight>> {
        self.list(HighlightQuery::default())
    }

    /// Highlights updated within the window; days win over hours, hours
    /// over `at`. At least one must be given.
    pub fn get_highlights_since(
        &self,
        days: Option<u32>,
        hours: Option<u32>,
        at: Option<DateTime<Utc>>,
    ) -> Result<Vec<Highlight>> {
        let since = cutoff(days, hours, at)?;
        self.list(HighlightQuery::updated_since(Some(since)))
    }

    pub fn get_highlights_by_book(&self, book_id: u64) -> Result<Vec<Highlight>> {
        self.list(HighlightQuery::for_book(book_id))
    }

    pub fn get_highlights_with_notes(&self) -> Result<Vec<Highlight>> {
        self.filter_highlights(Highlight::has_note)
    }

    /// Case-insensitive substring search over highlight text.
    pub fn search_highlights(&self, query: &str) -> Result<Vec<Highlight>> {
        let needle = query.to_lowercase();
        self.filter_highlights(|h| text_matches(h, &needle))
    }

    pub fn filter_highlights(
        &self,
        predicate: impl Fn(&Highlight) -> bool,
    ) -> Result<Vec<Highlight>> {
        self.client
            .list_highlights(HighlightQuery::default())
            .filter(|item| item.as_ref().map_or(true, &predicate))
            .collect()
    }

    pub fn get_highlight_count(&self) -> Result<usize> {
        let mut count = 0;
        for item in self.client.list_highlights(HighlightQuery::default()) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Create one highlight and return its id.
    pub fn create_highlight(
        &self,
        text: &str,
        title: Option<&str>,
        author: Option<&str>,
    ) -> Result<u64> {
        let created = self
            .client
            .create_highlights(&[create_payload(text, title, author)])?;
        first_created(created)
    }

    pub fn bulk_tag(&self, ids: &[u64], tag: &str) -> BTreeMap<u64, bool> {
        ids.iter()
            .map(|&id| {
                let outcome = self.client.create_highlight_tag(id, tag).map(|_| ());
                (id, tag_outcome(id, tag, outcome, "tag"))
            })
            .collect()
    }

    /// Remove `tag` from each highlight. A highlight without the tag counts
    /// as done.
    pub fn bulk_untag(&self, ids: &[u64], tag: &str) -> BTreeMap<u64, bool> {
        ids.iter()
            .map(|&id| (id, tag_outcome(id, tag, self.untag(id, tag), "untag")))
            .collect()
    }

    fn untag(&self, id: u64, tag: &str) -> Result<()> {
        let tags: Vec<Tag> = self.client.list_highlight_tags(id).collect::<Result<_>>()?;
        match tag_named(&tags, tag) {
            Some(found) => self.client.delete_highlight_tag(id, found.id),
            None => {
                debug!(highlight = id, tag, "tag not present");
                Ok(())
            }
        }
    }
}

pub struct AsyncHighlightManager<'a> {
    client: &'a ReadwiseClient,
}

impl<'a> AsyncHighlightManager<'a> {
    pub fn new(client: &'a ReadwiseClient) -> Self {
        Self { client }
    }

    async fn list(&self, query: HighlightQuery) -> Result<Vec<Highlight>> {
        self.client.list_highlights(query).try_collect().await
    }

    pub async fn get_all_highlights(&self) -> Result<Vec<Highlight>> {
        self.list(HighlightQuery::default()).await
    }

    pub async fn get_highlights_since(
        &self,
        days: Option<u32>,
        hours: Option<u32>,
        at: Option<DateTime<Utc>>,
    ) -> Result<Vec<Highlight>> {
        let since = cutoff(days, hours, at)?;
        self.list(HighlightQuery::updated_since(Some(since))).await
    }

    pub async fn get_highlights_by_book(&self, book_id: u64) -> Result<Vec<Highlight>> {
        self.list(HighlightQuery::for_book(book_id)).await
    }

    pub async fn get_highlights_with_notes(&self) -> Result<Vec<Highlight>> {
        self.filter_highlights(Highlight::has_note).await
    }

    pub async fn search_highlights(&self, query: &str) -> Result<Vec<Highlight>> {
        let needle = query.to_lowercase();
        self.filter_highlights(|h| text_matches(h, &needle)).await
    }

    pub async fn filter_highlights(
        &self,
        predicate: impl Fn(&Highlight) -> bool,
    ) -> Result<Vec<Highlight>> {
        let mut all = self.get_all_highlights().await?;
        all.retain(|h| predicate(h));
        Ok(all)
    }

    pub async fn get_highlight_count(&self) -> Result<usize> {
        self.client
            .list_highlights(HighlightQuery::default())
            .try_fold(0, |count, _| async move { Ok::<_, ApiError>(count + 1) })
            .await
    }

    pub async fn create_highlight(
        &self,
        text: &str,
        title: Option<&str>,
        author: Option<&str>,
    ) -> Result<u64> {
        let created = self
            .client
            .create_highlights(&[create_payload(text, title, author)])
            .await?;
        first_created(created)
    }

    pub async fn bulk_tag(&self, ids: &[u64], tag: &str) -> BTreeMap<u64, bool> {
        let mut results = BTreeMap::new();
        for &id in ids {
            let outcome = self.client.create_highlight_tag(id, tag).await.map(|_| ());
            results.insert(id, tag_outcome(id, tag, outcome, "tag"));
        }
        results
    }

    pub async fn bulk_untag(&self, ids: &[u64], tag: &str) -> BTreeMap<u64, bool> {
        let mut results = BTreeMap::new();
        for &id in ids {
            let outcome = self.untag(id, tag).await;
            results.insert(id, tag_outcome(id, tag, outcome, "untag"));
        }
        results
    }

    async fn untag(&self, id: u64, tag: &str) -> Result<()> {
        let tags: Vec<Tag> = self.client.list_highlight_tags(id).try_collect().await?;
        match tag_named(&tags, tag) {
            Some(found) => self.client.delete_highlight_tag(id, found.id).await,
            None => {
                debug!(highlight = id, tag, "tag not present");
                Ok(())
            }
        }
    }
}
