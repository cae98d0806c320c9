//! Readwise v2: highlights, books, tags, export and daily review.
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use super::{Api, ItemStream, ReadwiseClient};
use super::{BookQuery, ExportQuery, HighlightQuery};
use crate::error::{ApiError, Result};
use crate::model::{
    Book, CreatedHighlight, DailyReview, ExportBook, Highlight, HighlightCreate, HighlightUpdate,
    Tag,
};
use crate::page::{V2Page, V3Page};

#[derive(Deserialize)]
struct ModifiedBook {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    modified_highlights: Vec<u64>,
}

impl ReadwiseClient {
    /// `GET /auth/`. An auth failure means `false`; other failures are errors.
    pub async fn validate_token(&self) -> Result<bool> {
        let url = self.url(Api::V2, "auth/")?;
        match self.send(Method::GET, url, &[], None).await {
            Ok(_) => Ok(true),
            Err(ApiError::Auth { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn list_highlights(&self, query: HighlightQuery) -> ItemStream<Highlight> {
        self.stream_pages::<Highlight, V2Page<Highlight>>(
            Api::V2,
            "highlights/".into(),
            query.to_params(),
        )
    }

    pub async fn get_highlight(&self, id: u64) -> Result<Highlight> {
        self.get_json(Api::V2, &format!("highlights/{id}/"), &[]).await
    }

    /// Create highlights in one request; returns every created or modified
    /// highlight in response order, with the book it landed in.
    pub async fn create_highlights(
        &self,
        highlights: &[HighlightCreate],
    ) -> Result<Vec<CreatedHighlight>> {
        if highlights.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url(Api::V2, "highlights/")?;
        let body = json!({ "highlights": highlights });
        let books: Vec<ModifiedBook> = self.send_json(Method::POST, url, &[], Some(&body)).await?;
        Ok(books
            .into_iter()
            .flat_map(|b| {
                b.modified_highlights.into_iter().map(move |id| CreatedHighlight {
                    id,
                    book_id: b.id,
                })
            })
            .collect())
    }

    pub async fn update_highlight(&self, id: u64, update: &HighlightUpdate) -> Result<Highlight> {
        let url = self.url(Api::V2, &format!("highlights/{id}/"))?;
        let body = serde_json::to_value(update)?;
        self.send_json(Method::PATCH, url, &[], Some(&body)).await
    }

    pub async fn delete_highlight(&self, id: u64) -> Result<()> {
        let url = self.url(Api::V2, &format!("highlights/{id}/"))?;
        self.send(Method::DELETE, url, &[], None).await?;
        Ok(())
    }

    pub fn list_highlight_tags(&self, highlight_id: u64) -> ItemStream<Tag> {
        self.stream_pages::<Tag, V2Page<Tag>>(
            Api::V2,
            format!("highlights/{highlight_id}/tags/"),
            Vec::new(),
        )
    }

    pub async fn create_highlight_tag(&self, highlight_id: u64, name: &str) -> Result<Tag> {
        let url = self.url(Api::V2, &format!("highlights/{highlight_id}/tags/"))?;
        let body = json!({ "name": name });
        self.send_json(Method::POST, url, &[], Some(&body)).await
    }

    pub async fn update_highlight_tag(
        &self,
        highlight_id: u64,
        tag_id: u64,
        name: &str,
    ) -> Result<Tag> {
        let url = self.url(Api::V2, &format!("highlights/{highlight_id}/tags/{tag_id}/"))?;
        let body = json!({ "name": name });
        self.send_json(Method::PATCH, url, &[], Some(&body)).await
    }

    pub async fn delete_highlight_tag(&self, highlight_id: u64, tag_id: u64) -> Result<()> {
        let url = self.url(Api::V2, &format!("highlights/{highlight_id}/tags/{tag_id}/"))?;
        self.send(Method::DELETE, url, &[], None).await?;
        Ok(())
    }

    pub fn list_books(&self, query: BookQuery) -> ItemStream<Book> {
        self.stream_pages::<Book, V2Page<Book>>(Api::V2, "books/".into(), query.to_params())
    }

    pub async fn get_book(&self, id: u64) -> Result<Book> {
        self.get_json(Api::V2, &format!("books/{id}/"), &[]).await
    }

    pub fn list_book_tags(&self, book_id: u64) -> ItemStream<Tag> {
        self.stream_pages::<Tag, V2Page<Tag>>(Api::V2, format!("books/{book_id}/tags/"), Vec::new())
    }

    pub async fn create_book_tag(&self, book_id: u64, name: &str) -> Result<Tag> {
        let url = self.url(Api::V2, &format!("books/{book_id}/tags/"))?;
        let body = json!({ "name": name });
        self.send_json(Method::POST, url, &[], Some(&body)).await
    }

    pub async fn update_book_tag(&self, book_id: u64, tag_id: u64, name: &str) -> Result<Tag> {
        let url = self.url(Api::V2, &format!("books/{book_id}/tags/{tag_id}/"))?;
        let body = json!({ "name": name });
        self.send_json(Method::PATCH, url, &[], Some(&body)).await
    }

    pub async fn delete_book_tag(&self, book_id: u64, tag_id: u64) -> Result<()> {
        let url = self.url(Api::V2, &format!("books/{book_id}/tags/{tag_id}/"))?;
        self.send(Method::DELETE, url, &[], None).await?;
        Ok(())
    }

    /// `GET /export/`, which pages with `nextPageCursor` like the Reader API.
    pub fn export_highlights(&self, query: ExportQuery) -> ItemStream<ExportBook> {
        self.stream_pages::<ExportBook, V3Page<ExportBook>>(
            Api::V2,
            "export/".into(),
            query.to_params(),
        )
    }

    pub async fn get_daily_review(&self) -> Result<DailyReview> {
        self.get_json(Api::V2, "review/", &[]).await
    }
}
