//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::domain::{
    ports::{LlmService, OcrService, PromptRenderer},
    DocumentId, DomainError, PromptData, PromptTemplate,
};

/// Language model returning canned replies.
pub struct ScriptedLlm {
    reply: Option<String>,
    by_template: HashMap<String, String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn always(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            by_template: HashMap::new(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            by_template: HashMap::new(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::default(),
        }
    }

    /// Replies keyed on the first prompt line, which [`EchoRenderer`] sets
    /// to the template name.
    pub fn by_template(replies: &[(&str, &str)]) -> Self {
        Self {
            reply: None,
            by_template: replies
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let template = prompt.lines().next().unwrap_or_default();
        self.by_template
            .get(template)
            .or(self.reply.as_ref())
            .cloned()
            .ok_or_else(|| DomainError::upstream("llm unavailable"))
    }
}

/// Deterministic renderer: template name on the first line, then the inputs.
pub struct EchoRenderer;

impl PromptRenderer for EchoRenderer {
    fn render(&self, template: PromptTemplate, data: &PromptData<'_>) -> Result<String, DomainError> {
        Ok(format!(
            "{}\nlanguage: {}\ntitle: {}\ntags: {}\ncorrespondents: {}\ntypes: {}\n{}",
            template.name(),
            data.language,
            data.title,
            data.available_tags.join(","),
            data.available_correspondents.join(","),
            data.available_document_types.join(","),
            data.content,
        ))
    }
}

/// OCR engine that returns a fixed text and counts its calls.
pub struct FixedOcr {
    text: Option<String>,
    calls: AtomicUsize,
}

impl FixedOcr {
    pub fn new(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            text: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrService for FixedOcr {
    async fn extract_text(&self, _file: &[u8], _document_id: DocumentId) -> Result<String, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.text
            .clone()
            .ok_or_else(|| DomainError::upstream("ocr unavailable"))
    }
}
