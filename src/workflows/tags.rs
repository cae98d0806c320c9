//! Highlight tag maintenance: pattern tagging, usage report, bulk edits.
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use crate::client::blocking::ReadwiseClient;
use crate::client::HighlightQuery;
use crate::error::Result;
use crate::model::Highlight;

/// Regex that assigns `tag` to highlights whose text or note matches.
#[derive(Debug, Clone)]
pub struct TagPattern {
    regex: Regex,
    pub tag: String,
    pub match_in_text: bool,
    pub match_in_note: bool,
}

impl TagPattern {
    /// Case-insensitive pattern searched in both text and note.
    pub fn new(pattern: &str, tag: impl Into<String>) -> std::result::Result<Self, regex::Error> {
        Self::build(pattern, tag.into(), false)
    }

    pub fn case_sensitive(
        pattern: &str,
        tag: impl Into<String>,
    ) -> std::result::Result<Self, regex::Error> {
        Self::build(pattern, tag.into(), true)
    }

    fn build(pattern: &str, tag: String, case_sensitive: bool) -> std::result::Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()?;
        Ok(Self {
            regex,
            tag,
            match_in_text: true,
            match_in_note: true,
        })
    }

    pub fn in_text(mut self, enabled: bool) -> Self {
        self.match_in_text = enabled;
        self
    }

    pub fn in_note(mut self, enabled: bool) -> Self {
        self.match_in_note = enabled;
        self
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn matches(&self, highlight: &Highlight) -> bool {
        (self.match_in_text && self.regex.is_match(&highlight.text))
            || (self.match_in_note
                && highlight
                    .note
                    .as_deref()
                    .is_some_and(|note| self.regex.is_match(note)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagUsage {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagReport {
    pub total_tags: usize,
    pub total_usages: usize,
    /// Most used first; ties by name.
    pub tags_by_usage: Vec<TagUsage>,
    /// Groups of distinct names that normalize to the same key.
    pub duplicate_candidates: Vec<Vec<String>>,
}

/// Lowercase and drop `-`, `_` and whitespace, so `Machine-Learning`,
/// `machine_learning` and `MachineLearning` compare equal.
pub fn normalize_tag_name(name: &str) -> String {
    static SEPARATORS: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[-_\s]+").expect("valid separator regex"));
    SEPARATORS.replace_all(&name.to_lowercase(), "").into_owned()
}

pub struct TagWorkflow<'a> {
    client: &'a ReadwiseClient,
}

impl<'a> TagWorkflow<'a> {
    pub fn new(client: &'a ReadwiseClient) -> Self {
        Self { client }
    }

    fn highlights(&self) -> Result<Vec<Highlight>> {
        self.client
            .list_highlights(HighlightQuery::default())
            .collect()
    }

    /// Tags each pattern would add, keyed by highlight id. Tags the
    /// highlight already carries are skipped. Unless `dry_run`, the tags are
    /// created and only the successful ones are reported.
    pub fn auto_tag_highlights(
        &self,
        patterns: &[TagPattern],
        dry_run: bool,
    ) -> Result<BTreeMap<u64, Vec<String>>> {
        let mut planned = BTreeMap::new();
        for highlight in self.highlights()? {
            let existing: BTreeSet<String> =
                highlight.tags.iter().map(|t| t.name.to_lowercase()).collect();
            let mut tags: Vec<String> = Vec::new();
            for pattern in patterns {
                let key = pattern.tag.to_lowercase();
                if existing.contains(&key) || tags.iter().any(|t| t.to_lowercase() == key) {
                    continue;
                }
                if pattern.matches(&highlight) {
                    tags.push(pattern.tag.clone());
                }
            }
            if !dry_run {
                tags.retain(|tag| match self.client.create_highlight_tag(highlight.id, tag) {
                    Ok(_) => true,
                    Err(err) => {
                        warn!(highlight = highlight.id, tag = %tag, error = %err, "tag create failed");
                        false
                    }
                });
            }
            if !tags.is_empty() {
                planned.insert(highlight.id, tags);
            }
        }
        info!(highlights = planned.len(), dry_run, "auto tag");
        Ok(planned)
    }

    pub fn get_tag_report(&self) -> Result<TagReport> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for highlight in self.highlights()? {
            for tag in &highlight.tags {
                *counts.entry(tag.name.clone()).or_default() += 1;
            }
        }

        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in counts.keys() {
            groups
                .entry(normalize_tag_name(name))
                .or_default()
                .push(name.clone());
        }

        let mut tags_by_usage: Vec<TagUsage> = counts
            .iter()
            .map(|(name, count)| TagUsage {
                name: name.clone(),
                count: *count,
            })
            .collect();
        tags_by_usage.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

        Ok(TagReport {
            total_tags: counts.len(),
            total_usages: counts.values().sum(),
            tags_by_usage,
            duplicate_candidates: groups.into_values().filter(|g| g.len() > 1).collect(),
        })
    }

    pub fn get_highlights_by_tag(&self, name: &str) -> Result<Vec<Highlight>> {
        Ok(self
            .highlights()?
            .into_iter()
            .filter(|h| h.has_tag(name))
            .collect())
    }

    pub fn get_untagged_highlights(&self) -> Result<Vec<Highlight>> {
        Ok(self
            .highlights()?
            .into_iter()
            .filter(|h| h.tags.is_empty())
            .collect())
    }

    /// Distinct tag names containing `query`, ignoring case.
    pub fn search_tags(&self, query: &str) -> Result<Vec<String>> {
        let needle = query.to_lowercase();
        let names: BTreeSet<String> = self
            .highlights()?
            .into_iter()
            .flat_map(|h| h.tags)
            .map(|t| t.name)
            .filter(|name| name.to_lowercase().contains(&needle))
            .collect();
        Ok(names.into_iter().collect())
    }

    /// Rename `old` to `new` on every highlight; returns the affected ids.
    pub fn rename_tag(&self, old: &str, new: &str, dry_run: bool) -> Result<Vec<u64>> {
        let mut affected = Vec::new();
        for highlight in self.highlights()? {
            let Some(tag) = highlight.tags.iter().find(|t| t.name == old) else {
                continue;
            };
            if !dry_run {
                self.client.update_highlight_tag(highlight.id, tag.id, new)?;
            }
            affected.push(highlight.id);
        }
        info!(old, new, count = affected.len(), dry_run, "rename tag");
        Ok(affected)
    }

    /// Replace every tag in `sources` with `target`; returns the affected ids.
    pub fn merge_tags(&self, sources: &[&str], target: &str, dry_run: bool) -> Result<Vec<u64>> {
        let mut affected = Vec::new();
        for highlight in self.highlights()? {
            let merged: Vec<_> = highlight
                .tags
                .iter()
                .filter(|t| sources.contains(&t.name.as_str()))
                .collect();
            if merged.is_empty() {
                continue;
            }
            if !dry_run {
                if !highlight.has_tag(target) {
                    self.client.create_highlight_tag(highlight.id, target)?;
                }
                for tag in merged.iter().filter(|t| t.name != target) {
                    self.client.delete_highlight_tag(highlight.id, tag.id)?;
                }
            }
            affected.push(highlight.id);
        }
        info!(target, count = affected.len(), dry_run, "merge tags");
        Ok(affected)
    }

    /// Remove `name` from every highlight; returns the affected ids.
    pub fn delete_tag(&self, name: &str, dry_run: bool) -> Result<Vec<u64>> {
        let mut affected = Vec::new();
        for highlight in self.highlights()? {
            let Some(tag) = highlight.tags.iter().find(|t| t.name == name) else {
                continue;
            };
            if !dry_run {
                self.client.delete_highlight_tag(highlight.id, tag.id)?;
            }
            affected.push(highlight.id);
        }
        info!(name, count = affected.len(), dry_run, "delete tag");
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn highlight(text: &str, note: Option<&str>) -> Highlight {
        Highlight {
            id: 1,
            text: text.into(),
            note: note.map(Into::into),
            ..Default::default()
        }
    }

    #[test]
    fn pattern_matches_text_and_note() {
        let python = TagPattern::new("python", "programming").unwrap();
        assert!(python.matches(&highlight("I love Python programming", None)));

        let rust = TagPattern::new("rust", "programming").unwrap();
        assert!(!rust.matches(&highlight("I love Python programming", None)));

        let important = TagPattern::new("important", "review").unwrap().in_text(false);
        assert!(important.matches(&highlight("Some text", Some("This is important!"))));
        assert!(!important.matches(&highlight("important text", None)));
    }

    #[test]
    fn case_sensitive_pattern() {
        let pattern = TagPattern::case_sensitive("Python", "python").unwrap();
        assert!(pattern.matches(&highlight("I love Python", None)));
        assert!(!pattern.matches(&highlight("I love python", None)));
        assert_eq!(pattern.pattern(), "Python");
    }

    #[test]
    fn normalizes_separators_and_case() {
        assert_eq!(normalize_tag_name("Machine-Learning"), "machinelearning");
        assert_eq!(normalize_tag_name("machine_learning"), "machinelearning");
        assert_eq!(normalize_tag_name("Machine Learning"), "machinelearning");
        assert_eq!(normalize_tag_name("MachineLearning"), "machinelearning");
    }
}
