use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::batch::{BatchProcessor, Suggester};
use super::reconcile::{ProcessedMarker, Reconciler};
use super::scheduler::PollingJob;
use super::suggestion::{LlmSuggester, SuggestionGenerator};
use crate::domain::{
    ports::{DocumentSource, OcrService},
    Document, DocumentSuggestion, DomainError, PromptMode, SuggestionFlags,
};

/// Tag names that move documents between pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineTags {
    pub auto_tag: String,
    pub ocr_tag: String,
}

impl PipelineTags {
    pub fn all(&self) -> Vec<String> {
        vec![self.auto_tag.clone(), self.ocr_tag.clone()]
    }

    fn is_pipeline_tag(&self, tag: &str) -> bool {
        tag == self.auto_tag || tag == self.ocr_tag
    }
}

/// Suggests metadata for documents carrying the auto tag.
pub struct AutoTagJob {
    source: Arc<dyn DocumentSource>,
    generator: Arc<SuggestionGenerator>,
    processor: BatchProcessor,
    reconciler: Arc<Reconciler>,
    tags: PipelineTags,
    page_size: usize,
    mode: PromptMode,
    marker_field: Option<String>,
}

impl AutoTagJob {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        generator: Arc<SuggestionGenerator>,
        processor: BatchProcessor,
        reconciler: Arc<Reconciler>,
        tags: PipelineTags,
        page_size: usize,
    ) -> Self {
        Self {
            source,
            generator,
            processor,
            reconciler,
            tags,
            page_size: page_size.max(1),
            mode: PromptMode::Combined,
            marker_field: None,
        }
    }

    pub fn with_mode(mut self, mode: PromptMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_marker_field(mut self, field: Option<String>) -> Self {
        self.marker_field = field;
        self
    }

    /// Keeps the document's own tags next to the suggested ones and drops
    /// the pipeline tags so the document leaves the queue.
    fn finalize(&self, mut suggestion: DocumentSuggestion) -> DocumentSuggestion {
        let existing = suggestion.original_document.tags.clone();
        let tags = suggestion.tags_mut();
        for tag in existing {
            if !self.tags.is_pipeline_tag(&tag) && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags.retain(|t| !self.tags.is_pipeline_tag(t));
        suggestion
    }
}

#[async_trait]
impl PollingJob for AutoTagJob {
    fn name(&self) -> &str {
        "auto-tag"
    }

    #[instrument(skip_all, fields(tag = %self.tags.auto_tag))]
    async fn run_pass(&self, shutdown: watch::Receiver<bool>) -> Result<usize, DomainError> {
        let mut documents = self
            .source
            .fetch_by_tags(&[self.tags.auto_tag.clone()], self.page_size)
            .await?;

        documents.retain(|doc| {
            let waiting = doc.has_tag(&self.tags.ocr_tag);
            if waiting {
                debug!(document_id = doc.id, "waiting for OCR, skipping");
            }
            !waiting
        });
        if documents.is_empty() {
            return Ok(0);
        }

        info!(count = documents.len(), "auto-tagging documents");
        let catalog = self.generator.load_catalog(self.source.as_ref()).await?;
        let suggester = Arc::new(LlmSuggester::new(
            self.generator.clone(),
            catalog,
            SuggestionFlags::all(),
            self.mode,
        ));

        let suggestions: Vec<_> = self
            .processor
            .run(suggester, documents, shutdown)
            .await
            .into_all_or_nothing()?
            .into_iter()
            .map(|s| self.finalize(s))
            .collect();

        let marker = self.marker_field.as_deref().map(ProcessedMarker::today);
        let summary = self.reconciler.reconcile(&suggestions, marker.as_ref()).await?;
        Ok(summary.updated.len())
    }
}

/// Replaces the content of a document with text extracted from its original
/// file and hands the document over to the auto tag.
pub struct OcrSuggester {
    source: Arc<dyn DocumentSource>,
    ocr: Arc<dyn OcrService>,
    tags: PipelineTags,
}

impl OcrSuggester {
    pub fn new(source: Arc<dyn DocumentSource>, ocr: Arc<dyn OcrService>, tags: PipelineTags) -> Self {
        Self { source, ocr, tags }
    }
}

#[async_trait]
impl Suggester for OcrSuggester {
    async fn suggest(&self, document: &Document) -> Result<DocumentSuggestion, DomainError> {
        let file = self.source.download_original(document.id).await?;
        let text = self.ocr.extract_text(&file, document.id).await?;
        if text.trim().is_empty() {
            warn!(document_id = document.id, "OCR produced no text");
        }

        let mut suggestion = DocumentSuggestion::for_document(document);
        suggestion.content = Some(text);
        let tags = suggestion.tags_mut();
        tags.extend(
            document
                .tags
                .iter()
                .filter(|t| **t != self.tags.ocr_tag)
                .cloned(),
        );
        if !tags.contains(&self.tags.auto_tag) {
            tags.push(self.tags.auto_tag.clone());
        }
        Ok(suggestion)
    }
}

/// Runs OCR for documents carrying the OCR tag.
pub struct OcrJob {
    source: Arc<dyn DocumentSource>,
    suggester: Arc<OcrSuggester>,
    processor: BatchProcessor,
    reconciler: Arc<Reconciler>,
    tags: PipelineTags,
    page_size: usize,
    marker_field: Option<String>,
}

impl OcrJob {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        ocr: Arc<dyn OcrService>,
        processor: BatchProcessor,
        reconciler: Arc<Reconciler>,
        tags: PipelineTags,
        page_size: usize,
    ) -> Self {
        Self {
            suggester: Arc::new(OcrSuggester::new(source.clone(), ocr, tags.clone())),
            source,
            processor,
            reconciler,
            tags,
            page_size: page_size.max(1),
            marker_field: None,
        }
    }

    pub fn with_marker_field(mut self, field: Option<String>) -> Self {
        self.marker_field = field;
        self
    }
}

#[async_trait]
impl PollingJob for OcrJob {
    fn name(&self) -> &str {
        "ocr"
    }

    #[instrument(skip_all, fields(tag = %self.tags.ocr_tag))]
    async fn run_pass(&self, shutdown: watch::Receiver<bool>) -> Result<usize, DomainError> {
        let documents = self
            .source
            .fetch_by_tags(&[self.tags.ocr_tag.clone()], self.page_size)
            .await?;
        if documents.is_empty() {
            return Ok(0);
        }

        info!(count = documents.len(), "running OCR");
        let suggestions = self
            .processor
            .run(self.suggester.clone(), documents, shutdown)
            .await
            .into_all_or_nothing()?;

        let marker = self.marker_field.as_deref().map(ProcessedMarker::today);
        let summary = self.reconciler.reconcile(&suggestions, marker.as_ref()).await?;
        Ok(summary.updated.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::{ResponseCache, SuggestionSettings};
    use crate::infrastructure::InMemoryDocumentSource;
    use crate::testing::{EchoRenderer, FixedOcr, ScriptedLlm};

    const AUTO: &str = "paperless-gpt-auto";
    const OCR: &str = "paperless-gpt-ocr";

    fn tags() -> PipelineTags {
        PipelineTags {
            auto_tag: AUTO.into(),
            ocr_tag: OCR.into(),
        }
    }

    fn idle_shutdown() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    fn source() -> Arc<InMemoryDocumentSource> {
        Arc::new(
            InMemoryDocumentSource::new()
                .with_tags(&[(AUTO, 1), (OCR, 2), ("Finance", 3), ("Insurance", 4)])
                .with_correspondents(&[("Acme", 10)])
                .with_custom_fields(&[("auto_tagged", 30)]),
        )
    }

    fn auto_job(source: Arc<InMemoryDocumentSource>, llm: Arc<ScriptedLlm>) -> AutoTagJob {
        let generator = Arc::new(SuggestionGenerator::new(
            llm,
            Arc::new(EchoRenderer),
            Arc::new(ResponseCache::new(10)),
            SuggestionSettings {
                language: "English".into(),
                pipeline_tags: tags().all(),
                ..SuggestionSettings::default()
            },
        ));
        AutoTagJob::new(
            source.clone(),
            generator,
            BatchProcessor::new(2),
            Arc::new(Reconciler::new(source)),
            tags(),
            4,
        )
    }

    #[tokio::test]
    async fn test_auto_pass_updates_and_releases_document() {
        let source = source();
        source.insert_document(Document::new(1, "scan").with_tags([AUTO, "Insurance"]));
        let llm = Arc::new(ScriptedLlm::always(
            r#"{"title":"Invoice","tags":["Finance"],"correspondent":"Acme"}"#,
        ));

        let processed = auto_job(source.clone(), llm)
            .with_marker_field(Some("auto_tagged".into()))
            .run_pass(idle_shutdown())
            .await
            .unwrap();

        assert_eq!(processed, 1);
        let doc = source.document(1).unwrap();
        assert_eq!(doc.title, "Invoice");
        assert_eq!(doc.tags, vec!["Finance", "Insurance"]);

        let (_, update) = source.updates().pop().unwrap();
        assert_eq!(update.correspondent, Some(10));
        assert_eq!(update.custom_fields.map(|f| f[0].field), Some(30));
    }

    #[tokio::test]
    async fn test_auto_pass_skips_documents_waiting_for_ocr() {
        let source = source();
        source.insert_document(Document::new(2, "scan").with_tags([AUTO, OCR]));
        let llm = Arc::new(ScriptedLlm::always(r#"{"title":"x"}"#));

        let processed = auto_job(source.clone(), llm.clone())
            .run_pass(idle_shutdown())
            .await
            .unwrap();

        assert_eq!(processed, 0);
        assert_eq!(llm.calls(), 0);
        assert!(source.updates().is_empty());
    }

    #[tokio::test]
    async fn test_auto_pass_failure_updates_nothing() {
        let source = source();
        source.insert_document(Document::new(1, "a").with_tags([AUTO]));
        source.insert_document(Document::new(2, "b").with_tags([AUTO]));

        let err = auto_job(source.clone(), Arc::new(ScriptedLlm::failing()))
            .run_pass(idle_shutdown())
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert!(source.updates().is_empty());
        assert!(source.document(1).unwrap().has_tag(AUTO));
    }

    #[tokio::test]
    async fn test_auto_pass_idle_when_queue_empty() {
        let processed = auto_job(source(), Arc::new(ScriptedLlm::failing()))
            .run_pass(idle_shutdown())
            .await
            .unwrap();
        assert_eq!(processed, 0);
    }

    #[tokio::test]
    async fn test_ocr_pass_replaces_content_and_hands_over() {
        let source = source();
        source.insert_document(Document::new(3, "scan").with_content("old").with_tags([OCR, "Finance"]));
        source.insert_file(3, b"%PDF".to_vec());
        let ocr = Arc::new(FixedOcr::new("extracted text"));

        let job = OcrJob::new(
            source.clone(),
            ocr.clone(),
            BatchProcessor::new(1),
            Arc::new(Reconciler::new(source.clone())),
            tags(),
            4,
        );
        let processed = job.run_pass(idle_shutdown()).await.unwrap();

        assert_eq!(processed, 1);
        assert_eq!(ocr.calls(), 1);
        let doc = source.document(3).unwrap();
        assert_eq!(doc.content, "extracted text");
        assert_eq!(doc.tags, vec!["Finance", AUTO]);
    }

    #[tokio::test]
    async fn test_ocr_failure_keeps_document_queued() {
        let source = source();
        source.insert_document(Document::new(3, "scan").with_tags([OCR]));
        source.insert_file(3, b"%PDF".to_vec());

        let job = OcrJob::new(
            source.clone(),
            Arc::new(FixedOcr::failing()),
            BatchProcessor::new(1),
            Arc::new(Reconciler::new(source.clone())),
            tags(),
            4,
        );

        assert!(job.run_pass(idle_shutdown()).await.is_err());
        assert!(source.document(3).unwrap().has_tag(OCR));
    }
}
