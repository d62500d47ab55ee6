use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::application::services::{
    AutoTagJob, BatchProcessor, OcrJob, PipelineTags, PollingJob, Reconciler, ResponseCache,
    SchedulerConfig, SuggestionGenerator, SuggestionSettings,
};
use crate::domain::{
    ports::{DocumentSource, LlmService, OcrService, PromptRenderer, VisionService},
    DomainError,
};
use crate::infrastructure::{
    AppConfig, CachedOcr, HandlebarsPrompts, PaperlessClient, RigLlm, VisionOcr,
};

/// Application services wired from one [`AppConfig`], shared by both
/// binaries.
#[derive(Clone)]
pub struct Services {
    pub source: Arc<dyn DocumentSource>,
    pub prompts: Arc<dyn PromptRenderer>,
    pub generator: Arc<SuggestionGenerator>,
    pub processor: BatchProcessor,
    pub reconciler: Arc<Reconciler>,
    pub tags: PipelineTags,
    pub scheduler: SchedulerConfig,
}

impl Services {
    pub fn build(config: &AppConfig) -> Result<Self, DomainError> {
        let source: Arc<dyn DocumentSource> = Arc::new(PaperlessClient::new(
            &config.paperless.base_url,
            config.paperless.api_token.clone(),
            Duration::from_secs(config.paperless.timeout_seconds),
        )?);
        let llm: Arc<dyn LlmService> = Arc::new(RigLlm::from_config(&config.llm)?);
        let prompts: Arc<dyn PromptRenderer> =
            Arc::new(HandlebarsPrompts::load(config.prompts_dir.as_deref())?);

        Ok(Self::assemble(config, source, llm, prompts))
    }

    /// Wires the services around already-built adapters.
    pub fn assemble(
        config: &AppConfig,
        source: Arc<dyn DocumentSource>,
        llm: Arc<dyn LlmService>,
        prompts: Arc<dyn PromptRenderer>,
    ) -> Self {
        let tags = PipelineTags {
            auto_tag: config.pipeline.auto_tag.clone(),
            ocr_tag: config.pipeline.ocr_tag.clone(),
        };
        let scheduler = SchedulerConfig {
            idle_interval: Duration::from_secs(config.pipeline.poll_interval_seconds),
            backoff_floor: Duration::from_secs(config.pipeline.backoff_min_seconds),
            backoff_ceiling: Duration::from_secs(config.pipeline.backoff_max_seconds),
        };
        let settings = SuggestionSettings {
            language: config.llm.language.clone(),
            correspondent_blacklist: config.pipeline.correspondent_blacklist.clone(),
            tag_blacklist: config.pipeline.tag_blacklist.clone(),
            pipeline_tags: tags.all(),
        };
        let generator = Arc::new(SuggestionGenerator::new(
            llm,
            prompts.clone(),
            Arc::new(ResponseCache::new(config.pipeline.cache_capacity)),
            settings,
        ));

        Self {
            reconciler: Arc::new(Reconciler::new(source.clone())),
            processor: BatchProcessor::new(config.pipeline.concurrency),
            generator,
            source,
            prompts,
            tags,
            scheduler,
        }
    }

    /// The OCR engine selected by `OCR_ENGINE`, or `None` when OCR is off.
    pub fn ocr_engine(&self, config: &AppConfig) -> Result<Option<Arc<dyn OcrService>>, DomainError> {
        let Some(provider) = config.vision_provider() else {
            return Ok(None);
        };
        let model = config
            .ocr
            .vision_model
            .as_deref()
            .ok_or_else(|| DomainError::validation("OCR_ENGINE=llm needs VISION_LLM_MODEL"))?;
        let vision = RigLlm::new(provider, model, &config.llm.ollama_host)?
            .with_timeout(Duration::from_secs(config.llm.timeout_seconds));

        info!(provider = ?provider, model, "vision model OCR enabled");
        Ok(Some(self.vision_ocr(config, Arc::new(vision))))
    }

    pub fn vision_ocr(&self, config: &AppConfig, model: Arc<dyn VisionService>) -> Arc<dyn OcrService> {
        Arc::new(VisionOcr::new(model, self.prompts.clone(), config.llm.language.clone()))
    }

    /// The polling jobs the worker runs. The OCR pipeline only runs when an
    /// OCR engine is supplied; its results are cached per document.
    pub fn polling_jobs(
        &self,
        config: &AppConfig,
        ocr: Option<Arc<dyn OcrService>>,
    ) -> Vec<Arc<dyn PollingJob>> {
        let tags = self.tags.clone();
        let page_size = config.pipeline.page_size;
        let auto_tag = AutoTagJob::new(
            self.source.clone(),
            self.generator.clone(),
            self.processor.clone(),
            self.reconciler.clone(),
            tags.clone(),
            page_size,
        )
        .with_marker_field(config.pipeline.auto_tagged_field.clone());
        let mut jobs: Vec<Arc<dyn PollingJob>> = vec![Arc::new(auto_tag)];

        match ocr {
            Some(engine) => {
                let cached = Arc::new(CachedOcr::new(engine, config.pipeline.cache_capacity));
                let ocr_job = OcrJob::new(
                    self.source.clone(),
                    cached,
                    self.processor.clone(),
                    self.reconciler.clone(),
                    tags,
                    page_size,
                )
                .with_marker_field(config.pipeline.ocr_field.clone());
                jobs.push(Arc::new(ocr_job));
            }
            None => info!(tag = %tags.ocr_tag, "no OCR engine configured, OCR pipeline disabled"),
        }

        jobs
    }
}
