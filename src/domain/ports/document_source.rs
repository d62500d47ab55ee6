use async_trait::async_trait;

use crate::domain::{
    errors::DomainError, Document, DocumentId, DocumentUpdate, EntityId, IdMap, NewEntity,
};

/// The remote document-management service.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Documents carrying every one of `tags`, at most `page_limit` of them.
    async fn fetch_by_tags(
        &self,
        tags: &[String],
        page_limit: usize,
    ) -> Result<Vec<Document>, DomainError>;
    async fn get_document(&self, id: DocumentId) -> Result<Document, DomainError>;
    async fn list_tags(&self) -> Result<IdMap, DomainError>;
    async fn list_correspondents(&self) -> Result<IdMap, DomainError>;
    async fn list_document_types(&self) -> Result<IdMap, DomainError>;
    async fn list_custom_fields(&self) -> Result<IdMap, DomainError>;
    async fn create_correspondent(&self, entity: &NewEntity) -> Result<EntityId, DomainError>;
    async fn create_document_type(&self, entity: &NewEntity) -> Result<EntityId, DomainError>;
    async fn update_document(
        &self,
        id: DocumentId,
        update: &DocumentUpdate,
    ) -> Result<(), DomainError>;
    async fn download_original(&self, id: DocumentId) -> Result<Vec<u8>, DomainError>;
}
