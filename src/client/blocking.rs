//! Blocking facade over the async [`super::ReadwiseClient`].
//!
//! Each client owns a current-thread tokio runtime and drives every request
//! to completion on the calling thread. Do not call it from inside an async
//! context; use the async client there.
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

use super::{Api, BookQuery, ClientOptions, DocumentQuery, ExportQuery, HighlightQuery};
use crate::error::Result;
use crate::model::{
    Book, CreatedHighlight, DailyReview, Document, DocumentCreate, DocumentLocation,
    DocumentUpdate, ExportBook, Highlight, HighlightCreate, HighlightUpdate, ReaderTag,
    SaveResult, Tag,
};
use crate::page::{Page, PageCursor, Pager, V2Page, V3Page};
use serde::de::DeserializeOwned;

#[derive(Clone)]
pub struct ReadwiseClient {
    inner: super::ReadwiseClient,
    runtime: Arc<Runtime>,
}

impl std::fmt::Debug for ReadwiseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("blocking::ReadwiseClient")
            .field(&self.inner)
            .finish()
    }
}

impl ReadwiseClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_options(ClientOptions::new(token))
    }

    pub fn with_options(options: ClientOptions) -> Result<Self> {
        let inner = super::ReadwiseClient::with_options(options)?;
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            inner,
            runtime: Arc::new(runtime),
        })
    }

    /// The async client this one drives.
    pub fn async_client(&self) -> &super::ReadwiseClient {
        &self.inner
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    fn pager<T, E>(
        &self,
        api: Api,
        path: String,
        query: Vec<(String, String)>,
    ) -> Pager<T, impl FnMut(Option<&PageCursor>) -> Result<Page<T>> + '_>
    where
        E: DeserializeOwned + Into<Page<T>> + Send,
    {
        Pager::new(move |cursor: Option<&PageCursor>| {
            self.block_on(
                self.inner
                    .fetch_page::<T, E>(api, &path, &query, cursor.cloned()),
            )
        })
    }

    pub fn validate_token(&self) -> Result<bool> {
        self.block_on(self.inner.validate_token())
    }

    pub fn list_highlights(
        &self,
        query: HighlightQuery,
    ) -> impl Iterator<Item = Result<Highlight>> + '_ {
        self.pager::<Highlight, V2Page<Highlight>>(Api::V2, "highlights/".into(), query.to_params())
    }

    pub fn get_highlight(&self, id: u64) -> Result<Highlight> {
        self.block_on(self.inner.get_highlight(id))
    }

    pub fn create_highlights(
        &self,
        highlights: &[HighlightCreate],
    ) -> Result<Vec<CreatedHighlight>> {
        self.block_on(self.inner.create_highlights(highlights))
    }

    pub fn update_highlight(&self, id: u64, update: &HighlightUpdate) -> Result<Highlight> {
        self.block_on(self.inner.update_highlight(id, update))
    }

    pub fn delete_highlight(&self, id: u64) -> Result<()> {
        self.block_on(self.inner.delete_highlight(id))
    }

    pub fn list_highlight_tags(&self, highlight_id: u64) -> impl Iterator<Item = Result<Tag>> + '_ {
        self.pager::<Tag, V2Page<Tag>>(
            Api::V2,
            format!("highlights/{highlight_id}/tags/"),
            Vec::new(),
        )
    }

    pub fn create_highlight_tag(&self, highlight_id: u64, name: &str) -> Result<Tag> {
        self.block_on(self.inner.create_highlight_tag(highlight_id, name))
    }

    pub fn update_highlight_tag(&self, highlight_id: u64, tag_id: u64, name: &str) -> Result<Tag> {
        self.block_on(self.inner.update_highlight_tag(highlight_id, tag_id, name))
    }

    pub fn delete_highlight_tag(&self, highlight_id: u64, tag_id: u64) -> Result<()> {
        self.block_on(self.inner.delete_highlight_tag(highlight_id, tag_id))
    }

    pub fn list_books(&self, query: BookQuery) -> impl Iterator<Item = Result<Book>> + '_ {
        self.pager::<Book, V2Page<Book>>(Api::V2, "books/".into(), query.to_params())
    }

    pub fn get_book(&self, id: u64) -> Result<Book> {
        self.block_on(self.inner.get_book(id))
    }

    pub fn list_book_tags(&self, book_id: u64) -> impl Iterator<Item = Result<Tag>> + '_ {
        self.pager::<Tag, V2Page<Tag>>(Api::V2, format!("books/{book_id}/tags/"), Vec::new())
    }

    pub fn create_book_tag(&self, book_id: u64, name: &str) -> Result<Tag> {
        self.block_on(self.inner.create_book_tag(book_id, name))
    }

    pub fn update_book_tag(&self, book_id: u64, tag_id: u64, name: &str) -> Result<Tag> {
        self.block_on(self.inner.update_book_tag(book_id, tag_id, name))
    }

    pub fn delete_book_tag(&self, book_id: u64, tag_id: u64) -> Result<()> {
        self.block_on(self.inner.delete_book_tag(book_id, tag_id))
    }

    pub fn export_highlights(
        &self,
        query: ExportQuery,
    ) -> impl Iterator<Item = Result<ExportBook>> + '_ {
        self.pager::<ExportBook, V3Page<ExportBook>>(Api::V2, "export/".into(), query.to_params())
    }

    pub fn get_daily_review(&self) -> Result<DailyReview> {
        self.block_on(self.inner.get_daily_review())
    }

    pub fn list_documents(&self, query: DocumentQuery) -> impl Iterator<Item = Result<Document>> + '_ {
        self.pager::<Document, V3Page<Document>>(Api::V3, "list/".into(), query.to_params())
    }

    pub fn get_document(&self, id: &str) -> Result<Option<Document>> {
        self.block_on(self.inner.get_document(id))
    }

    pub fn save_document(&self, document: &DocumentCreate) -> Result<SaveResult> {
        self.block_on(self.inner.save_document(document))
    }

    pub fn save_url(&self, url: &str) -> Result<SaveResult> {
        self.block_on(self.inner.save_url(url))
    }

    pub fn update_document(&self, id: &str, update: &DocumentUpdate) -> Result<SaveResult> {
        self.block_on(self.inner.update_document(id, update))
    }

    pub fn delete_document(&self, id: &str) -> Result<()> {
        self.block_on(self.inner.delete_document(id))
    }

    pub fn move_document(&self, id: &str, location: DocumentLocation) -> Result<SaveResult> {
        self.block_on(self.inner.move_document(id, location))
    }

    pub fn archive(&self, id: &str) -> Result<SaveResult> {
        self.block_on(self.inner.archive(id))
    }

    pub fn later(&self, id: &str) -> Result<SaveResult> {
        self.block_on(self.inner.later(id))
    }

    pub fn inbox(&self, id: &str) -> Result<SaveResult> {
        self.block_on(self.inner.inbox(id))
    }

    pub fn list_tags(&self) -> impl Iterator<Item = Result<ReaderTag>> + '_ {
        self.pager::<ReaderTag, V3Page<ReaderTag>>(Api::V3, "tags/".into(), Vec::new())
    }

    pub fn add_tag(&self, id: &str, tag: &str) -> Result<SaveResult> {
        self.block_on(self.inner.add_tag(id, tag))
    }

    pub fn remove_tag(&self, id: &str, tag: &str) -> Result<SaveResult> {
        self.block_on(self.inner.remove_tag(id, tag))
    }
}
