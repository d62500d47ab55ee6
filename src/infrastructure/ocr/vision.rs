use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::{
    ports::{OcrService, PromptRenderer, VisionService},
    DocumentId, DomainError, MediaKind, PromptData, PromptTemplate,
};

/// OCR through a vision-capable language model: the original file goes to
/// the model together with the rendered `ocr` prompt.
pub struct VisionOcr {
    model: Arc<dyn VisionService>,
    prompts: Arc<dyn PromptRenderer>,
    language: String,
}

impl VisionOcr {
    pub fn new(
        model: Arc<dyn VisionService>,
        prompts: Arc<dyn PromptRenderer>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            model,
            prompts,
            language: language.into(),
        }
    }
}

#[async_trait]
impl OcrService for VisionOcr {
    #[instrument(skip(self, file), fields(bytes = file.len()))]
    async fn extract_text(&self, file: &[u8], document_id: DocumentId) -> Result<String, DomainError> {
        let kind = MediaKind::sniff(file).ok_or_else(|| {
            DomainError::validation(format!(
                "document {document_id}: original is neither a PDF nor a supported image"
            ))
        })?;

        let data = PromptData {
            language: &self.language,
            ..PromptData::default()
        };
        let prompt = self.prompts.render(PromptTemplate::Ocr, &data)?;

        let text = self.model.read_file(&prompt, kind, file).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(DomainError::malformed(format!(
                "document {document_id}: vision model returned no text"
            )));
        }

        info!(document_id, media = kind.mime(), chars = text.chars().count(), "OCR completed");
        Ok(text.to_string())
    }
}
