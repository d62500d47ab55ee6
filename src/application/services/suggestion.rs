use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::batch::Suggester;
use super::cache::ResponseCache;
use crate::domain::{
    ports::{DocumentSource, LlmService, PromptRenderer},
    remove_tag, truncate_chars, CatalogNames, Document, DocumentSuggestion, DomainError,
    PromptData, PromptMode, PromptTemplate, SuggestionFlags, MAX_PROMPT_CONTENT_CHARS,
};

/// Prompt inputs that stay fixed for the lifetime of the process.
#[derive(Debug, Clone, Default)]
pub struct SuggestionSettings {
    pub language: String,
    pub correspondent_blacklist: Vec<String>,
    pub tag_blacklist: Vec<String>,
    /// Workflow tags that are never offered to, or kept from, the model.
    pub pipeline_tags: Vec<String>,
}

pub struct SuggestionGenerator {
    llm: Arc<dyn LlmService>,
    prompts: Arc<dyn PromptRenderer>,
    cache: Arc<ResponseCache<String, String>>,
    settings: SuggestionSettings,
}

impl SuggestionGenerator {
    pub fn new(
        llm: Arc<dyn LlmService>,
        prompts: Arc<dyn PromptRenderer>,
        cache: Arc<ResponseCache<String, String>>,
        settings: SuggestionSettings,
    ) -> Self {
        Self {
            llm,
            prompts,
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &SuggestionSettings {
        &self.settings
    }

    pub fn cache(&self) -> &ResponseCache<String, String> {
        &self.cache
    }

    /// Candidate names for the next batch, sorted and without pipeline tags.
    pub async fn load_catalog(&self, source: &dyn DocumentSource) -> Result<CatalogNames, DomainError> {
        let (tags, correspondents, document_types) = tokio::try_join!(
            source.list_tags(),
            source.list_correspondents(),
            source.list_document_types(),
        )?;

        let hidden: Vec<&str> = self.settings.pipeline_tags.iter().map(String::as_str).collect();
        Ok(CatalogNames::from_maps(
            &tags,
            &correspondents,
            &document_types,
            &hidden,
        ))
    }

    /// Completion for `prompt`, served from the cache when the exact prompt
    /// was seen before. Misses store the trimmed reply before returning it.
    pub async fn completion(&self, prompt: &str) -> Result<String, DomainError> {
        if let Some(cached) = self.cache.get(prompt) {
            debug!("prompt cache hit");
            return Ok(cached);
        }

        let reply = self.llm.complete(prompt).await?;
        let reply = reply.trim().to_string();
        self.cache.put(prompt.to_string(), reply.clone());
        Ok(reply)
    }

    /// Runs one rendered JSON prompt for `document` and decodes the reply.
    pub async fn generate_from_prompt(
        &self,
        prompt: &str,
        document: &Document,
    ) -> Result<DocumentSuggestion, DomainError> {
        let reply = self.completion(prompt).await?;
        debug!(document_id = document.id, reply = %reply, "json suggestion");
        parse_suggestion(&reply, document)
    }

    #[instrument(skip(self, document, catalog), fields(document_id = document.id))]
    pub async fn suggest_combined(
        &self,
        document: &Document,
        catalog: &CatalogNames,
        flags: SuggestionFlags,
    ) -> Result<DocumentSuggestion, DomainError> {
        let content = prompt_content(document);
        let data = PromptData {
            content,
            title: &document.title,
            correspondent_blacklist: &self.settings.correspondent_blacklist,
            tag_blacklist: &self.settings.tag_blacklist,
            ..PromptData::new(&self.settings.language, catalog)
        };
        let prompt = self.prompts.render(PromptTemplate::Json, &data)?;

        let suggestion = self.generate_from_prompt(&prompt, document).await?;
        Ok(self.apply_flags(suggestion, document, flags))
    }

    #[instrument(skip(self, document, catalog), fields(document_id = document.id))]
    pub async fn suggest_per_field(
        &self,
        document: &Document,
        catalog: &CatalogNames,
        flags: SuggestionFlags,
    ) -> Result<DocumentSuggestion, DomainError> {
        let mut suggestion = DocumentSuggestion::for_document(document);

        let title = if flags.generate_titles {
            Some(self.suggest_title(document).await?)
        } else {
            None
        };
        let title_hint = title.as_deref().unwrap_or(&document.title);

        if flags.generate_tags {
            suggestion.tags = Some(self.suggest_tags(document, title_hint, catalog).await?);
        }
        if flags.generate_correspondents {
            suggestion.correspondent = self
                .suggest_correspondent(document, title_hint, catalog)
                .await?;
        }
        if flags.generate_document_types {
            suggestion.document_type = self
                .suggest_document_type(document, title_hint, catalog)
                .await?;
        }
        suggestion.title = title;

        Ok(self.apply_flags(suggestion, document, flags))
    }

    pub async fn suggest_title(&self, document: &Document) -> Result<String, DomainError> {
        let data = PromptData {
            language: &self.settings.language,
            content: prompt_content(document),
            ..PromptData::default()
        };
        let prompt = self.prompts.render(PromptTemplate::Title, &data)?;
        let reply = self.completion(&prompt).await?;
        Ok(reply.trim_matches('"').trim().to_string())
    }

    /// Comma separated reply, kept only where it names a known tag.
    pub async fn suggest_tags(
        &self,
        document: &Document,
        title: &str,
        catalog: &CatalogNames,
    ) -> Result<Vec<String>, DomainError> {
        let data = PromptData {
            content: prompt_content(document),
            title,
            tag_blacklist: &self.settings.tag_blacklist,
            ..PromptData::new(&self.settings.language, catalog)
        };
        let prompt = self.prompts.render(PromptTemplate::Tags, &data)?;
        let reply = self.completion(&prompt).await?;

        let mut tags: Vec<String> = Vec::new();
        for candidate in reply.split(',').map(str::trim) {
            if let Some(known) = catalog
                .tags
                .iter()
                .find(|t| t.eq_ignore_ascii_case(candidate))
            {
                if !tags.contains(known) {
                    tags.push(known.clone());
                }
            }
        }
        Ok(tags)
    }

    pub async fn suggest_correspondent(
        &self,
        document: &Document,
        title: &str,
        catalog: &CatalogNames,
    ) -> Result<Option<String>, DomainError> {
        let data = PromptData {
            content: prompt_content(document),
            title,
            correspondent_blacklist: &self.settings.correspondent_blacklist,
            ..PromptData::new(&self.settings.language, catalog)
        };
        let prompt = self.prompts.render(PromptTemplate::Correspondent, &data)?;
        let reply = self.completion(&prompt).await?;
        Ok(non_empty(reply))
    }

    pub async fn suggest_document_type(
        &self,
        document: &Document,
        title: &str,
        catalog: &CatalogNames,
    ) -> Result<Option<String>, DomainError> {
        let data = PromptData {
            content: prompt_content(document),
            title,
            ..PromptData::new(&self.settings.language, catalog)
        };
        let prompt = self.prompts.render(PromptTemplate::DocumentType, &data)?;
        let reply = self.completion(&prompt).await?;
        Ok(non_empty(reply))
    }

    /// Drops dimensions that were not requested. Tags fall back to the
    /// document's current tags so an unrequested tag pass never clears them.
    fn apply_flags(
        &self,
        mut suggestion: DocumentSuggestion,
        document: &Document,
        flags: SuggestionFlags,
    ) -> DocumentSuggestion {
        if !flags.generate_titles {
            suggestion.title = None;
        }
        if !flags.generate_tags {
            let mut tags = document.tags.clone();
            for pipeline_tag in &self.settings.pipeline_tags {
                tags = remove_tag(&tags, pipeline_tag);
            }
            suggestion.tags = Some(tags);
        }
        if !flags.generate_correspondents {
            suggestion.correspondent = None;
        }
        if !flags.generate_document_types {
            suggestion.document_type = None;
        }
        if !flags.generate_dates {
            suggestion.date = None;
        }
        suggestion.tags_mut();
        suggestion
    }
}

/// Decodes a model reply into a suggestion for `document`.
///
/// Text around the outermost `{ ... }` span (markdown fences, commentary) is
/// discarded before strict decoding.
pub fn parse_suggestion(raw: &str, document: &Document) -> Result<DocumentSuggestion, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::malformed(format!(
            "empty response for document {}",
            document.id
        )));
    }

    let json = extract_json_object(trimmed);
    let mut suggestion: DocumentSuggestion = serde_json::from_str(json).map_err(|e| {
        DomainError::malformed(format!("document {}: {e}", document.id))
    })?;

    suggestion.document_id = document.id;
    suggestion.original_document = document.clone();
    suggestion.tags_mut();
    Ok(suggestion)
}

fn extract_json_object(text: &str) -> &str {
    let start = text.find('{').unwrap_or(0);
    let text = &text[start..];
    match text.rfind('}') {
        Some(end) => &text[..=end],
        None => text,
    }
}

fn prompt_content(document: &Document) -> &str {
    truncate_chars(&document.content, MAX_PROMPT_CONTENT_CHARS)
}

fn non_empty(reply: String) -> Option<String> {
    let reply = reply.trim().trim_matches('"').trim();
    (!reply.is_empty()).then(|| reply.to_string())
}

/// Language-model suggester for one batch: the catalog snapshot and flags
/// are fixed when the batch starts.
pub struct LlmSuggester {
    generator: Arc<SuggestionGenerator>,
    catalog: CatalogNames,
    flags: SuggestionFlags,
    mode: PromptMode,
}

impl LlmSuggester {
    pub fn new(
        generator: Arc<SuggestionGenerator>,
        catalog: CatalogNames,
        flags: SuggestionFlags,
        mode: PromptMode,
    ) -> Self {
        Self {
            generator,
            catalog,
            flags,
            mode,
        }
    }
}

#[async_trait]
impl Suggester for LlmSuggester {
    async fn suggest(&self, document: &Document) -> Result<DocumentSuggestion, DomainError> {
        match self.mode {
            PromptMode::Combined => {
                self.generator
                    .suggest_combined(document, &self.catalog, self.flags)
                    .await
            }
            PromptMode::PerField => {
                self.generator
                    .suggest_per_field(document, &self.catalog, self.flags)
                    .await
            }
        }
    }
}
