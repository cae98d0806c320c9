//! Highlight digests rendered as markdown, plain text, JSON or CSV.
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::str::FromStr;

use crate::client::blocking::ReadwiseClient;
use crate::client::HighlightQuery;
use crate::error::{ApiError, Result};
use crate::model::Highlight;
use crate::since::Since;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DigestFormat {
    #[default]
    Markdown,
    Text,
    Json,
    Csv,
}

impl DigestFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestFormat::Markdown => "markdown",
            DigestFormat::Text => "text",
            DigestFormat::Json => "json",
            DigestFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for DigestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(DigestFormat::Markdown),
            "text" | "txt" => Ok(DigestFormat::Text),
            "json" => Ok(DigestFormat::Json),
            "csv" => Ok(DigestFormat::Csv),
            other => Err(format!("unknown digest format: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DigestGrouping {
    None,
    #[default]
    Book,
    Date,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DigestOptions {
    pub title: String,
    pub since: Option<Since>,
    pub book_id: Option<u64>,
    pub grouping: DigestGrouping,
    pub format: DigestFormat,
}

impl Default for DigestOptions {
    fn default() -> Self {
        Self {
            title: "Custom Digest".into(),
            since: None,
            book_id: None,
            grouping: DigestGrouping::default(),
            format: DigestFormat::default(),
        }
    }
}

pub struct DigestBuilder<'a> {
    client: &'a ReadwiseClient,
}

impl<'a> DigestBuilder<'a> {
    pub fn new(client: &'a ReadwiseClient) -> Self {
        Self { client }
    }

    pub fn create_daily_digest(&self, format: DigestFormat) -> Result<String> {
        self.create_custom_digest(&DigestOptions {
            title: "Daily Digest".into(),
            since: Some(Since::Days(1)),
            format,
            ..Default::default()
        })
    }

    pub fn create_weekly_digest(&self, format: DigestFormat) -> Result<String> {
        self.create_custom_digest(&DigestOptions {
            title: "Weekly Digest".into(),
            since: Some(Since::Days(7)),
            format,
            ..Default::default()
        })
    }

    /// All highlights of one book, titled after the book.
    pub fn create_book_digest(&self, book_id: u64, format: DigestFormat) -> Result<String> {
        let book = self.client.get_book(book_id)?;
        let highlights: Vec<Highlight> = self
            .client
            .list_highlights(HighlightQuery::for_book(book_id))
            .collect::<Result<_>>()?;
        render(
            &book.title,
            &highlights,
            vec![Section::plain(&highlights)],
            format,
            Utc::now(),
        )
    }

    pub fn create_custom_digest(&self, options: &DigestOptions) -> Result<String> {
        let now = Utc::now();
        let query = HighlightQuery {
            book_id: options.book_id,
            updated_after: options.since.as_ref().map(|s| s.resolve(now)),
            ..Default::default()
        };
        let highlights: Vec<Highlight> = self.client.list_highlights(query).collect::<Result<_>>()?;
        let sections = match options.grouping {
            DigestGrouping::None => vec![Section::plain(&highlights)],
            DigestGrouping::Date => by_date(&highlights),
            DigestGrouping::Book => by_book(&highlights, |id| self.book_title(id)),
        };
        render(&options.title, &highlights, sections, options.format, now)
    }

    fn book_title(&self, book_id: u64) -> String {
        match self.client.get_book(book_id) {
            Ok(book) if !book.title.is_empty() => book.title,
            _ => format!("Book {book_id}"),
        }
    }
}

struct Section<'h> {
    heading: Option<String>,
    highlights: Vec<&'h Highlight>,
}

impl<'h> Section<'h> {
    fn plain(highlights: &'h [Highlight]) -> Self {
        Self {
            heading: None,
            highlights: highlights.iter().collect(),
        }
    }
}

/// Newest day first; undated highlights last under "Unknown Date".
fn by_date(highlights: &[Highlight]) -> Vec<Section<'_>> {
    let mut days: BTreeMap<String, Vec<&Highlight>> = BTreeMap::new();
    let mut undated = Vec::new();
    for h in highlights {
        match h.highlighted_at {
            Some(at) => days.entry(at.format("%Y-%m-%d").to_string()).or_default().push(h),
            None => undated.push(h),
        }
    }
    let mut sections: Vec<Section<'_>> = days
        .into_iter()
        .rev()
        .map(|(day, highlights)| Section {
            heading: Some(day),
            highlights,
        })
        .collect();
    if !undated.is_empty() {
        sections.push(Section {
            heading: Some("Unknown Date".into()),
            highlights: undated,
        });
    }
    sections
}

/// One section per book in order of first appearance.
fn by_book(highlights: &[Highlight], mut title: impl FnMut(u64) -> String) -> Vec<Section<'_>> {
    let mut order: Vec<Option<u64>> = Vec::new();
    let mut groups: BTreeMap<Option<u64>, Vec<&Highlight>> = BTreeMap::new();
    for h in highlights {
        if !groups.contains_key(&h.book_id) {
            order.push(h.book_id);
        }
        groups.entry(h.book_id).or_default().push(h);
    }
    order
        .into_iter()
        .map(|book_id| Section {
            heading: Some(book_id.map_or_else(|| "Unknown Book".to_string(), &mut title)),
            highlights: groups.remove(&book_id).unwrap_or_default(),
        })
        .collect()
}

fn render(
    title: &str,
    highlights: &[Highlight],
    sections: Vec<Section<'_>>,
    format: DigestFormat,
    generated_at: DateTime<Utc>,
) -> Result<String> {
    Ok(match format {
        DigestFormat::Markdown => markdown(title, highlights.len(), &sections),
        DigestFormat::Text => text(title, highlights.len(), &sections),
        DigestFormat::Json => serde_json::to_string_pretty(&json!({
            "title": title,
            "generated_at": generated_at,
            "count": highlights.len(),
            "highlights": highlights,
        }))
        .map_err(ApiError::from)?,
        DigestFormat::Csv => csv(highlights),
    })
}

fn markdown(title: &str, count: usize, sections: &[Section<'_>]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {title}\n");
    let _ = writeln!(out, "*{count} highlights*\n");
    for section in sections {
        if let Some(heading) = &section.heading {
            let _ = writeln!(out, "## {heading}\n");
        }
        for h in &section.highlights {
            for line in h.text.lines() {
                let _ = writeln!(out, "> {line}");
            }
            out.push('\n');
            let mut meta = Vec::new();
            if let Some(location) = h.location {
                meta.push(format!("Location: {location}"));
            }
            if let Some(note) = h.note.as_deref().filter(|n| !n.is_empty()) {
                meta.push(format!("Note: {note}"));
            }
            if !h.tags.is_empty() {
                meta.push(format!("Tags: {}", tag_list(h)));
            }
            if let Some(book_id) = h.book_id {
                meta.push(format!("Book ID: {book_id}"));
            }
            for item in &meta {
                let _ = writeln!(out, "- {item}");
            }
            if !meta.is_empty() {
                out.push('\n');
            }
            out.push_str("---\n\n");
        }
    }
    out
}

fn text(title: &str, count: usize, sections: &[Section<'_>]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{}", "=".repeat(title.chars().count()));
    let _ = writeln!(out, "{count} highlights\n");
    for section in sections {
        if let Some(heading) = &section.heading {
            let _ = writeln!(out, "{heading}");
            let _ = writeln!(out, "{}", "-".repeat(heading.chars().count()));
        }
        for h in &section.highlights {
            let _ = writeln!(out, "* {}", h.text);
            if let Some(note) = h.note.as_deref().filter(|n| !n.is_empty()) {
                let _ = writeln!(out, "  Note: {note}");
            }
            out.push('\n');
        }
    }
    out
}

fn csv(highlights: &[Highlight]) -> String {
    let mut out = String::from("id,text,note,book_id,highlighted_at,tags\n");
    for h in highlights {
        let row = [
            h.id.to_string(),
            h.text.clone(),
            h.note.clone().unwrap_or_default(),
            h.book_id.map(|id| id.to_string()).unwrap_or_default(),
            h.highlighted_at.map(|at| at.to_rfc3339()).unwrap_or_default(),
            tag_list(h),
        ];
        let quoted: Vec<String> = row.iter().map(|field| csv_field(field)).collect();
        let _ = writeln!(out, "{}", quoted.join(","));
    }
    out
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn tag_list(h: &Highlight) -> String {
    h.tags
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tag;
    use chrono::{Duration, TimeZone};

    fn highlight(id: u64, text: &str) -> Highlight {
        Highlight {
            id,
            text: text.into(),
            ..Default::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_formats() {
        assert_eq!("MD".parse::<DigestFormat>(), Ok(DigestFormat::Markdown));
        assert_eq!("csv".parse::<DigestFormat>(), Ok(DigestFormat::Csv));
        assert!("xml".parse::<DigestFormat>().is_err());
    }

    #[test]
    fn markdown_lists_metadata() {
        let mut h = highlight(1, "Highlight with metadata");
        h.location = Some(42);
        h.note = Some("Important note".into());
        h.book_id = Some(100);
        h.tags = vec![
            Tag { id: 1, name: "science".into() },
            Tag { id: 2, name: "review".into() },
        ];
        let items = vec![h];
        let out = render("Custom Digest", &items, vec![Section::plain(&items)], DigestFormat::Markdown, now())
            .unwrap();
        assert!(out.starts_with("# Custom Digest"));
        assert!(out.contains("*1 highlights*"));
        assert!(out.contains("> Highlight with metadata"));
        assert!(out.contains("Location: 42"));
        assert!(out.contains("Note: Important note"));
        assert!(out.contains("Tags: science, review"));
        assert!(out.contains("Book ID: 100"));
    }

    #[test]
    fn empty_digest_reports_zero() {
        let out = render("Daily Digest", &[], vec![], DigestFormat::Markdown, now()).unwrap();
        assert!(out.contains("0 highlights"));
    }

    #[test]
    fn date_groups_newest_first_with_unknown_last() {
        let mut today = highlight(1, "today");
        today.highlighted_at = Some(now());
        let mut yesterday = highlight(2, "yesterday");
        yesterday.highlighted_at = Some(now() - Duration::days(1));
        let undated = highlight(3, "undated");
        let items = vec![yesterday, undated, today];

        let headings: Vec<_> = by_date(&items)
            .into_iter()
            .map(|s| s.heading.unwrap())
            .collect();
        assert_eq!(headings, vec!["2024-01-15", "2024-01-14", "Unknown Date"]);
    }

    #[test]
    fn book_groups_keep_first_appearance_order() {
        let mut a = highlight(1, "a");
        a.book_id = Some(20);
        let mut b = highlight(2, "b");
        b.book_id = Some(10);
        let mut c = highlight(3, "c");
        c.book_id = Some(20);
        let items = vec![a, b, c];

        let sections = by_book(&items, |id| format!("Title {id}"));
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].heading.as_deref(), Some("Title 20"));
        assert_eq!(sections[0].highlights.len(), 2);
        assert_eq!(sections[1].heading.as_deref(), Some("Title 10"));
    }

    #[test]
    fn text_format_underlines_title_and_shows_notes() {
        let mut h = highlight(1, "Ungrouped highlight one");
        h.note = Some("My note".into());
        let items = vec![h];
        let out = render("Custom Digest", &items, vec![Section::plain(&items)], DigestFormat::Text, now())
            .unwrap();
        assert!(out.starts_with("Custom Digest\n=============\n"));
        assert!(out.contains("Note: My note"));
    }

    #[test]
    fn json_and_csv_formats() {
        let mut h = highlight(1, "say \"hi\"");
        h.note = Some("Note".into());
        let items = vec![h];

        let out = render("Daily Digest", &items, vec![], DigestFormat::Json, now()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["title"], "Daily Digest");
        assert_eq!(value["count"], 1);
        assert_eq!(value["highlights"][0]["text"], "say \"hi\"");

        let out = render("Daily Digest", &items, vec![], DigestFormat::Csv, now()).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("id,text,note,book_id,highlighted_at,tags"));
        assert_eq!(lines.next(), Some("\"1\",\"say \"\"hi\"\"\",\"Note\",\"\",\"\",\"\""));
    }
}
