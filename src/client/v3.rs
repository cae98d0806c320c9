//! Reader v3: documents and document tags.
use reqwest::Method;

use super::{Api, DocumentQuery, ItemStream, ReadwiseClient};
use crate::error::{ApiError, Result};
use crate::model::{
    Document, DocumentCreate, DocumentLocation, DocumentUpdate, ReaderTag, SaveResult,
};
use crate::page::V3Page;

impl ReadwiseClient {
    pub fn list_documents(&self, query: DocumentQuery) -> ItemStream<Document> {
        self.stream_pages::<Document, V3Page<Document>>(Api::V3, "list/".into(), query.to_params())
    }

    /// Look a document up by id through `/list/`; `None` when it does not exist.
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let params = DocumentQuery::by_id(id).to_params();
        let page: V3Page<Document> = self.get_json(Api::V3, "list/", &params).await?;
        Ok(page.results.into_iter().next())
    }

    pub async fn save_document(&self, document: &DocumentCreate) -> Result<SaveResult> {
        let url = self.url(Api::V3, "save/")?;
        let body = serde_json::to_value(document)?;
        self.send_json(Method::POST, url, &[], Some(&body)).await
    }

    pub async fn save_url(&self, url: &str) -> Result<SaveResult> {
        self.save_document(&DocumentCreate::from_url(url)).await
    }

    pub async fn update_document(&self, id: &str, update: &DocumentUpdate) -> Result<SaveResult> {
        let url = self.url(Api::V3, &format!("update/{id}/"))?;
        let body = serde_json::to_value(update)?;
        self.send_json(Method::PATCH, url, &[], Some(&body)).await
    }

    pub async fn delete_document(&self, id: &str) -> Result<()> {
        let url = self.url(Api::V3, &format!("delete/{id}/"))?;
        self.send(Method::DELETE, url, &[], None).await?;
        Ok(())
    }

    pub async fn move_document(&self, id: &str, location: DocumentLocation) -> Result<SaveResult> {
        self.update_document(id, &DocumentUpdate::move_to(location))
            .await
    }

    pub async fn archive(&self, id: &str) -> Result<SaveResult> {
        self.move_document(id, DocumentLocation::Archive).await
    }

    pub async fn later(&self, id: &str) -> Result<SaveResult> {
        self.move_document(id, DocumentLocation::Later).await
    }

    pub async fn inbox(&self, id: &str) -> Result<SaveResult> {
        self.move_document(id, DocumentLocation::New).await
    }

    pub fn list_tags(&self) -> ItemStream<ReaderTag> {
        self.stream_pages::<ReaderTag, V3Page<ReaderTag>>(Api::V3, "tags/".into(), Vec::new())
    }

    pub async fn add_tag(&self, id: &str, tag: &str) -> Result<SaveResult> {
        let mut tags = self.document_tags(id).await?;
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
        self.set_tags(id, tags).await
    }

    pub async fn remove_tag(&self, id: &str, tag: &str) -> Result<SaveResult> {
        let mut tags = self.document_tags(id).await?;
        tags.retain(|t| t != tag);
        self.set_tags(id, tags).await
    }

    async fn document_tags(&self, id: &str) -> Result<Vec<String>> {
        let document = self
            .get_document(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("document {id}")))?;
        Ok(document.tag_names())
    }

    async fn set_tags(&self, id: &str, tags: Vec<String>) -> Result<SaveResult> {
        let update = DocumentUpdate {
            tags: Some(tags),
            ..Default::default()
        };
        self.update_document(id, &update).await
    }
}
