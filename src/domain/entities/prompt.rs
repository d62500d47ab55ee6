use serde::Serialize;

use super::catalog::CatalogNames;

/// Maximum number of content characters rendered into a prompt.
pub const MAX_PROMPT_CONTENT_CHARS: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptTemplate {
    Json,
    Title,
    Tags,
    Correspondent,
    DocumentType,
    /// Transcription instructions sent with a file to a vision model.
    Ocr,
}

impl PromptTemplate {
    pub const ALL: [PromptTemplate; 6] = [
        Self::Json,
        Self::Title,
        Self::Tags,
        Self::Correspondent,
        Self::DocumentType,
        Self::Ocr,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Title => "title",
            Self::Tags => "tag",
            Self::Correspondent => "correspondent",
            Self::DocumentType => "document_type",
            Self::Ocr => "ocr",
        }
    }
}

/// Values available to every prompt template.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptData<'a> {
    pub language: &'a str,
    pub content: &'a str,
    pub title: &'a str,
    pub available_tags: &'a [String],
    pub available_correspondents: &'a [String],
    pub available_document_types: &'a [String],
    pub correspondent_blacklist: &'a [String],
    pub tag_blacklist: &'a [String],
}

impl<'a> PromptData<'a> {
    pub fn new(language: &'a str, catalog: &'a CatalogNames) -> Self {
        Self {
            language,
            available_tags: &catalog.tags,
            available_correspondents: &catalog.correspondents,
            available_document_types: &catalog.document_types,
            ..Self::default()
        }
    }
}
