use chrono::Utc;
use futures::TryStreamExt;
use serde::Serialize;
use std::collections::BTreeMap;

use super::contains_ignore_case;
use crate::client::blocking;
use crate::client::{BookQuery, HighlightQuery, ReadwiseClient};
use crate::error::Result;
use crate::model::{Book, BookCategory, Highlight};
use crate::since::Since;

/// How many books [`ReadingStats::most_highlighted_books`] keeps.
pub const MOST_HIGHLIGHTED_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookWithHighlights {
    pub book: Book,
    pub highlights: Vec<Highlight>,
}

/// Library totals. Books without a category or source are counted under
/// `unknown`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadingStats {
    pub total_books: usize,
    pub total_highlights: u64,
    pub books_by_category: BTreeMap<String, usize>,
    pub highlights_by_source: BTreeMap<String, u64>,
    pub most_highlighted_books: Vec<Book>,
}

impl ReadingStats {
    fn from_books(books: Vec<Book>) -> Self {
        let mut stats = ReadingStats {
            total_books: books.len(),
            ..Default::default()
        };
        for book in &books {
            stats.total_highlights += book.num_highlights;
            let category = book.category.map_or("unknown", |c| c.as_str());
            *stats.books_by_category.entry(category.to_string()).or_default() += 1;
            let source = book.source.as_deref().unwrap_or("unknown");
            *stats.highlights_by_source.entry(source.to_string()).or_default() +=
                book.num_highlights;
        }
        let mut ranked = books;
        ranked.sort_by(|a, b| b.num_highlights.cmp(&a.num_highlights));
        ranked.truncate(MOST_HIGHLIGHTED_LIMIT);
        stats.most_highlighted_books = ranked;
        stats
    }
}

fn by_category(category: BookCategory) -> BookQuery {
    BookQuery {
        category: Some(category),
        ..Default::default()
    }
}

fn by_source(source: &str) -> BookQuery {
    BookQuery {
        source: Some(source.to_string()),
        ..Default::default()
    }
}

fn highlighted_within(days: u32) -> BookQuery {
    BookQuery {
        last_highlight_after: Some(Since::Days(days).resolve(Utc::now())),
        ..Default::default()
    }
}

/// Newest highlight activity first; books never highlighted go last.
fn most_recent(mut books: Vec<Book>, limit: usize) -> Vec<Book> {
    books.sort_by(|a, b| b.last_highlight_at.cmp(&a.last_highlight_at));
    books.truncate(limit);
    books
}

fn title_or_author_matches(book: &Book, needle: &str) -> bool {
    contains_ignore_case(Some(book.title.as_str()), needle)
        || contains_ignore_case(book.author.as_deref(), needle)
}

pub struct BookManager<'a> {
    client: &'a blocking::ReadwiseClient,
}

impl<'a> BookManager<'a> {
    pub fn new(client: &'a blocking::ReadwiseClient) -> Self {
        Self { client }
    }

    fn list(&self, query: BookQuery) -> Result<Vec<Book>> {
        self.client.list_books(query).collect()
    }

    pub fn get_all_books(&self) -> Result<Vec<Book>> {
        self.list(BookQuery::default())
    }

    pub fn get_books_by_category(&self, category: BookCategory) -> Result<Vec<Book>> {
        self.list(by_category(category))
    }

    pub fn get_books_by_source(&self, source: &str) -> Result<Vec<Book>> {
        self.list(by_source(source))
    }

    /// Up to `limit` books highlighted in the last `days` days, newest first.
    pub fn get_recent_books(&self, days: u32, limit: usize) -> Result<Vec<Book>> {
        Ok(most_recent(self.list(highlighted_within(days))?, limit))
    }

    pub fn get_book_with_highlights(&self, book_id: u64) -> Result<BookWithHighlights> {
        let book = self.client.get_book(book_id)?;
        let highlights = self
            .client
            .list_highlights(HighlightQuery::for_book(book_id))
            .collect::<Result<_>>()?;
        Ok(BookWithHighlights { book, highlights })
    }

    pub fn get_reading_stats(&self) -> Result<ReadingStats> {
        Ok(ReadingStats::from_books(self.get_all_books()?))
    }

    pub fn get_book_count(&self) -> Result<usize> {
        Ok(self.get_all_books()?.len())
    }

    /// Case-insensitive search over title and author.
    pub fn search_books(&self, query: &str) -> Result<Vec<Book>> {
        let needle = query.to_lowercase();
        let mut books = self.get_all_books()?;
        books.retain(|b| title_or_author_matches(b, &needle));
        Ok(books)
    }
}

pub struct AsyncBookManager<'a> {
    client: &'a ReadwiseClient,
}

impl<'a> AsyncBookManager<'a> {
    pub fn new(client: &'a ReadwiseClient) -> Self {
        Self { client }
    }

    async fn list(&self, query: BookQuery) -> Result<Vec<Book>> {
        self.client.list_books(query).try_collect().await
    }

    pub async fn get_all_books(&self) -> Result<Vec<Book>> {
        self.list(BookQuery::default()).await
    }

    pub async fn get_books_by_category(&self, category: BookCategory) -> Result<Vec<Book>> {
        self.list(by_category(category)).await
    }

    pub async fn get_books_by_source(&self, source: &str) -> Result<Vec<Book>> {
        self.list(by_source(source)).await
    }

    pub async fn get_recent_books(&self, days: u32, limit: usize) -> Result<Vec<Book>> {
        Ok(most_recent(self.list(highlighted_within(days)).await?, limit))
    }

    pub async fn get_book_with_highlights(&self, book_id: u64) -> Result<BookWithHighlights> {
        let book = self.client.get_book(book_id).await?;
        let highlights = self
            .client
            .list_highlights(HighlightQuery::for_book(book_id))
            .try_collect()
            .await?;
        Ok(BookWithHighlights { book, highlights })
    }

    pub async fn get_reading_stats(&self) -> Result<ReadingStats> {
        Ok(ReadingStats::from_books(self.get_all_books().await?))
    }

    pub async fn get_book_count(&self) -> Result<usize> {
        Ok(self.get_all_books().await?.len())
    }

    pub async fn search_books(&self, query: &str) -> Result<Vec<Book>> {
        let needle = query.to_lowercase();
        let mut books = self.get_all_books().await?;
        books.retain(|b| title_or_author_matches(b, &needle));
        Ok(books)
    }
}
