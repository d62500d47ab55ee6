use async_trait::async_trait;

use crate::domain::{errors::DomainError, DocumentId};

#[async_trait]
pub trait OcrService: Send + Sync {
    async fn extract_text(
        &self,
        file: &[u8],
        document_id: DocumentId,
    ) -> Result<String, DomainError>;
}
