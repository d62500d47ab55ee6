use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::application::services::ResponseCache;
use crate::domain::{ports::OcrService, DocumentId, DomainError};

/// Remembers extracted text per document so a retried pass does not pay
/// for a second OCR job.
pub struct CachedOcr {
    inner: Arc<dyn OcrService>,
    cache: ResponseCache<DocumentId, String>,
}

impl CachedOcr {
    pub fn new(inner: Arc<dyn OcrService>, capacity: usize) -> Self {
        Self {
            inner,
            cache: ResponseCache::new(capacity),
        }
    }
}

#[async_trait]
impl OcrService for CachedOcr {
    async fn extract_text(&self, file: &[u8], document_id: DocumentId) -> Result<String, DomainError> {
        if let Some(text) = self.cache.get(&document_id) {
            debug!(document_id, "OCR cache hit");
            return Ok(text);
        }

        let text = self.inner.extract_text(file, document_id).await?;
        self.cache.put(document_id, text.clone());
        Ok(text)
    }
}
