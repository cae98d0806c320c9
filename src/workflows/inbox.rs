//! Reader inbox triage: archive rules, queue statistics and cleanup.
use chrono::{DateTime, Duration, Utc};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::client::blocking::ReadwiseClient;
use crate::client::DocumentQuery;
use crate::error::Result;
use crate::model::{Document, DocumentCategory, DocumentLocation};
use crate::since::Since;

type Predicate = Box<dyn Fn(&Document) -> bool + Send + Sync>;

/// Named condition that marks an inbox document for archiving.
pub struct ArchiveRule {
    name: String,
    predicate: Predicate,
    enabled: bool,
}

impl ArchiveRule {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&Document) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Evaluate the condition; ignores `enabled`.
    pub fn matches(&self, document: &Document) -> bool {
        (self.predicate)(document)
    }

    /// Documents created more than `days` ago. Undated documents never match.
    pub fn older_than(days: u32) -> Self {
        Self::new(format!("older_than_{days}_days"), move |doc: &Document| {
            is_older_than(doc, days_ago(days))
        })
    }

    pub fn category(category: DocumentCategory) -> Self {
        Self::new(format!("category_{category}"), move |doc: &Document| {
            doc.category == Some(category)
        })
    }

    /// Case-insensitive regex over the title. Untitled documents never match.
    pub fn title_pattern(pattern: &str, name: impl Into<String>) -> std::result::Result<Self, regex::Error> {
        let re: Regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self::new(name, move |doc: &Document| {
            doc.title.as_deref().is_some_and(|title| re.is_match(title))
        }))
    }

    /// Documents hosted on `domain` or one of its subdomains.
    pub fn domain(domain: &str) -> Self {
        let domain = domain.to_ascii_lowercase();
        let suffix = format!(".{domain}");
        Self::new(format!("domain_{domain}"), move |doc: &Document| {
            doc.host()
                .is_some_and(|host| host == domain || host.ends_with(&suffix))
        })
    }
}

impl std::fmt::Debug for ArchiveRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveRule")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

fn days_ago(days: u32) -> DateTime<Utc> {
    Since::Days(days).resolve(Utc::now())
}

fn is_older_than(doc: &Document, cutoff: DateTime<Utc>) -> bool {
    doc.created_at.is_some_and(|created| created < cutoff)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub inbox_count: usize,
    pub reading_list_count: usize,
    pub total_unread: usize,
    pub items_older_than_7_days: usize,
    pub items_older_than_30_days: usize,
    pub by_category: BTreeMap<String, usize>,
}

/// A move planned (or performed) by a triage routine.
///
/// Dry runs always report `success`; a rejected move carries the API error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboxAction {
    pub document_id: String,
    pub title: Option<String>,
    pub action: DocumentLocation,
    pub reason: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ReadingInbox<'a> {
    client: &'a ReadwiseClient,
    rules: Vec<ArchiveRule>,
}

impl<'a> ReadingInbox<'a> {
    pub fn new(client: &'a ReadwiseClient) -> Self {
        Self {
            client,
            rules: Vec::new(),
        }
    }

    pub fn add_archive_rule(&mut self, rule: ArchiveRule) {
        self.rules.push(rule);
    }

    /// Remove every rule called `name`; true when one was removed.
    pub fn remove_archive_rule(&mut self, name: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|rule| rule.name != name);
        self.rules.len() != before
    }

    pub fn archive_rules(&self) -> &[ArchiveRule] {
        &self.rules
    }

    fn list(&self, location: DocumentLocation) -> Result<Vec<Document>> {
        self.client
            .list_documents(DocumentQuery::in_location(location))
            .collect()
    }

    pub fn inbox(&self) -> Result<Vec<Document>> {
        self.list(DocumentLocation::New)
    }

    pub fn reading_list(&self) -> Result<Vec<Document>> {
        self.list(DocumentLocation::Later)
    }

    pub fn get_queue_stats(&self) -> Result<QueueStats> {
        let inbox = self.inbox()?;
        let later = self.reading_list()?;
        let now = Utc::now();
        let week = now - Duration::days(7);
        let month = now - Duration::days(30);

        let mut stats = QueueStats {
            inbox_count: inbox.len(),
            reading_list_count: later.len(),
            total_unread: inbox.len() + later.len(),
            ..Default::default()
        };
        for doc in inbox.iter().chain(&later) {
            if is_older_than(doc, week) {
                stats.items_older_than_7_days += 1;
            }
            if is_older_than(doc, month) {
                stats.items_older_than_30_days += 1;
            }
            let category = doc.category.map_or("unknown", |c| c.as_str());
            *stats.by_category.entry(category.to_string()).or_default() += 1;
        }
        Ok(stats)
    }

    /// Apply the first enabled matching rule to each inbox document.
    pub fn smart_archive(&self, dry_run: bool) -> Result<Vec<InboxAction>> {
        let mut actions = Vec::new();
        for doc in self.inbox()? {
            let Some(rule) = self
                .rules
                .iter()
                .find(|rule| rule.enabled && rule.matches(&doc))
            else {
                continue;
            };
            actions.push(self.archive_one(&doc, format!("Matched rule: {}", rule.name), dry_run));
        }
        let failed = actions.iter().filter(|a| !a.success).count();
        info!(count = actions.len(), failed, dry_run, "smart archive");
        Ok(actions)
    }

    /// Inbox documents created more than `days` ago.
    pub fn get_stale_items(&self, days: u32) -> Result<Vec<Document>> {
        let cutoff = days_ago(days);
        Ok(self
            .inbox()?
            .into_iter()
            .filter(|doc| is_older_than(doc, cutoff))
            .collect())
    }

    /// Archive stale documents from the inbox, then from the reading list.
    pub fn batch_archive_stale(&self, days: u32, dry_run: bool) -> Result<Vec<InboxAction>> {
        let cutoff = days_ago(days);
        let mut actions = Vec::new();
        for location in [DocumentLocation::New, DocumentLocation::Later] {
            for doc in self.list(location)? {
                if is_older_than(&doc, cutoff) {
                    actions.push(self.archive_one(&doc, format!("Older than {days} days"), dry_run));
                }
            }
        }
        Ok(actions)
    }

    fn archive_one(&self, doc: &Document, reason: String, dry_run: bool) -> InboxAction {
        let error = if dry_run {
            None
        } else {
            self.client.archive(&doc.id).err().map(|err| {
                warn!(document = %doc.id, error = %err, "archive failed");
                err.to_string()
            })
        };
        InboxAction {
            document_id: doc.id.clone(),
            title: doc.title.clone(),
            action: DocumentLocation::Archive,
            reason,
            success: error.is_none(),
            error,
        }
    }

    /// Inbox documents whose title, author or summary contains `query`.
    pub fn search_inbox(&self, query: &str) -> Result<Vec<Document>> {
        let needle = query.to_lowercase();
        let hit = |field: &Option<String>| {
            field
                .as_deref()
                .is_some_and(|value| value.to_lowercase().contains(&needle))
        };
        Ok(self
            .inbox()?
            .into_iter()
            .filter(|doc| hit(&doc.title) || hit(&doc.author) || hit(&doc.summary))
            .collect())
    }

    /// Articles first, newest first within each group.
    pub fn get_inbox_by_priority(&self) -> Result<Vec<Document>> {
        let mut docs = self.inbox()?;
        docs.sort_by(|a, b| {
            let rank = |d: &Document| d.category != Some(DocumentCategory::Article);
            rank(a)
                .cmp(&rank(b))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(docs)
    }

    /// Inbox documents grouped by category; uncategorized ones go under `Other`.
    pub fn get_inbox_categories(&self) -> Result<BTreeMap<DocumentCategory, Vec<Document>>> {
        let mut groups: BTreeMap<DocumentCategory, Vec<Document>> = BTreeMap::new();
        for doc in self.inbox()? {
            let category = doc.category.unwrap_or(DocumentCategory::Other);
            groups.entry(category).or_default().push(doc);
        }
        Ok(groups)
    }

    /// Move each document to the reading list, reporting success per id.
    pub fn move_to_reading_list(&self, ids: &[&str]) -> BTreeMap<String, bool> {
        ids.iter()
            .map(|id| {
                let moved = match self.client.later(id) {
                    Ok(_) => true,
                    Err(err) => {
                        warn!(document = %id, error = %err, "move to reading list failed");
                        false
                    }
                };
                (id.to_string(), moved)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, url: &str) -> Document {
        Document {
            id: id.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    #[test]
    fn older_than_rule() {
        let rule = ArchiveRule::older_than(30);
        assert_eq!(rule.name(), "older_than_30_days");

        let mut old = doc("1", "https://example.com");
        old.created_at = Some(Utc::now() - Duration::days(60));
        let mut fresh = doc("2", "https://example.com");
        fresh.created_at = Some(Utc::now() - Duration::days(10));

        assert!(rule.matches(&old));
        assert!(!rule.matches(&fresh));
        assert!(!rule.matches(&doc("3", "https://example.com")));
    }

    #[test]
    fn category_rule() {
        let rule = ArchiveRule::category(DocumentCategory::Tweet);
        assert_eq!(rule.name(), "category_tweet");

        let mut tweet = doc("1", "https://twitter.com/test");
        tweet.category = Some(DocumentCategory::Tweet);
        let mut article = doc("2", "https://example.com");
        article.category = Some(DocumentCategory::Article);
        assert!(rule.matches(&tweet));
        assert!(!rule.matches(&article));
    }

    #[test]
    fn title_pattern_rule_ignores_case() {
        let rule = ArchiveRule::title_pattern("newsletter", "newsletters").unwrap();
        assert_eq!(rule.name(), "newsletters");

        let mut letter = doc("1", "https://example.com");
        letter.title = Some("Weekly Newsletter: Tech Updates".into());
        let mut other = doc("2", "https://example.com");
        other.title = Some("How to Code Better".into());
        assert!(rule.matches(&letter));
        assert!(!rule.matches(&other));
        assert!(!rule.matches(&doc("3", "https://example.com")));

        assert!(ArchiveRule::title_pattern("(", "broken").is_err());
    }

    #[test]
    fn domain_rule_matches_subdomains() {
        let rule = ArchiveRule::domain("twitter.com");
        assert_eq!(rule.name(), "domain_twitter.com");
        assert!(rule.matches(&doc("1", "https://twitter.com/user/status/123")));
        assert!(rule.matches(&doc("2", "https://mobile.twitter.com/x")));
        assert!(!rule.matches(&doc("3", "https://nottwitter.com/x")));
        assert!(!rule.matches(&doc("4", "https://placeholder.com")));
        assert!(!rule.matches(&doc("5", "")));
    }

    #[test]
    fn disabled_rule_keeps_its_condition() {
        let rule = ArchiveRule::new("everything", |_: &Document| true).disabled();
        assert!(!rule.is_enabled());
        assert!(rule.matches(&doc("1", "https://example.com")));
    }
}
