#![allow(dead_code)]

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::{Arc, Mutex};

use readwise_sync::client::ItemStream;
use readwise_sync::model::{Book, Document, Highlight};
use readwise_sync::state::Resource;
use readwise_sync::sync::{AsyncResourceSource, ResourceSource};
use readwise_sync::ApiError;

pub fn highlight(id: u64, text: &str) -> Highlight {
    Highlight {
        id,
        text: text.into(),
        ..Default::default()
    }
}

pub fn highlights(n: u64) -> Vec<Highlight> {
    (1..=n).map(|id| highlight(id, &format!("highlight {id}"))).collect()
}

pub fn book(id: u64, title: &str) -> Book {
    Book {
        id,
        title: title.into(),
        ..Default::default()
    }
}

pub fn document(id: &str) -> Document {
    Document {
        id: id.into(),
        url: format!("https://example.com/{id}"),
        ..Default::default()
    }
}

/// In-memory source that records the `since` of every listing call.
#[derive(Clone, Default)]
pub struct RecordingSource {
    pub highlights: Vec<Highlight>,
    pub books: Vec<Book>,
    pub documents: Vec<Document>,
    /// Fail each listing of this resource after yielding this many items.
    failure: Arc<Mutex<Option<(Resource, usize)>>>,
    calls: Arc<Mutex<Vec<(Resource, Option<DateTime<Utc>>)>>>,
}

impl RecordingSource {
    pub fn new(highlights: Vec<Highlight>, books: Vec<Book>, documents: Vec<Document>) -> Self {
        Self {
            highlights,
            books,
            documents,
            ..Default::default()
        }
    }

    pub fn failing(self, resource: Resource, after: usize) -> Self {
        *self.failure.lock().unwrap() = Some((resource, after));
        self
    }

    /// Stop failing; shared by every clone.
    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<(Resource, Option<DateTime<Utc>>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, resource: Resource) -> Vec<Option<DateTime<Utc>>> {
        self.calls()
            .into_iter()
            .filter(|(r, _)| *r == resource)
            .map(|(_, since)| since)
            .collect()
    }

    fn listing<T: Clone>(
        &self,
        resource: Resource,
        items: &[T],
        since: Option<DateTime<Utc>>,
    ) -> Vec<readwise_sync::Result<T>> {
        self.calls.lock().unwrap().push((resource, since));
        let mut out: Vec<_> = items.iter().cloned().map(Ok).collect();
        if let Some((failing, after)) = *self.failure.lock().unwrap() {
            if failing == resource {
                out.truncate(after);
                out.push(Err(ApiError::Validation(format!("{resource} listing failed"))));
            }
        }
        out
    }
}

impl ResourceSource for RecordingSource {
    fn list_highlights(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Box<dyn Iterator<Item = readwise_sync::Result<Highlight>> + '_> {
        Box::new(self.listing(Resource::Highlights, &self.highlights, since).into_iter())
    }

    fn list_books(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Box<dyn Iterator<Item = readwise_sync::Result<Book>> + '_> {
        Box::new(self.listing(Resource::Books, &self.books, since).into_iter())
    }

    fn list_documents(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Box<dyn Iterator<Item = readwise_sync::Result<Document>> + '_> {
        Box::new(self.listing(Resource::Documents, &self.documents, since).into_iter())
    }
}

impl AsyncResourceSource for RecordingSource {
    fn list_highlights(&self, since: Option<DateTime<Utc>>) -> ItemStream<Highlight> {
        stream::iter(self.listing(Resource::Highlights, &self.highlights, since)).boxed()
    }

    fn list_books(&self, since: Option<DateTime<Utc>>) -> ItemStream<Book> {
        stream::iter(self.listing(Resource::Books, &self.books, since)).boxed()
    }

    fn list_documents(&self, since: Option<DateTime<Utc>>) -> ItemStream<Document> {
        stream::iter(self.listing(Resource::Documents, &self.documents, since)).boxed()
    }
}

/// Client options pointed at a mock server, with retries off.
pub fn mock_options(server: &wiremock::MockServer) -> readwise_sync::ClientOptions {
    let uri = server.uri();
    readwise_sync::ClientOptions::new("test-token")
        .with_base_urls(&format!("{uri}/api/v2"), &format!("{uri}/api/v3"))
        .unwrap()
        .with_max_retries(0)
}

/// Mock server on its own multi-threaded runtime, for blocking-client tests.
pub fn blocking_server() -> (tokio::runtime::Runtime, wiremock::MockServer) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = rt.block_on(wiremock::MockServer::start());
    (rt, server)
}
