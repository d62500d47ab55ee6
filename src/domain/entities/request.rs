use serde::{Deserialize, Serialize};

use super::document::Document;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    /// One prompt returning every field as a JSON object.
    #[default]
    Combined,
    /// One plain-text prompt per requested field.
    PerField,
}

/// Which suggestion dimensions to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionFlags {
    #[serde(default)]
    pub generate_titles: bool,
    #[serde(default)]
    pub generate_tags: bool,
    #[serde(default)]
    pub generate_correspondents: bool,
    #[serde(default)]
    pub generate_document_types: bool,
    #[serde(default)]
    pub generate_dates: bool,
}

impl SuggestionFlags {
    pub fn all() -> Self {
        Self {
            generate_titles: true,
            generate_tags: true,
            generate_correspondents: true,
            generate_document_types: true,
            generate_dates: true,
        }
    }

    pub fn any(&self) -> bool {
        self.generate_titles
            || self.generate_tags
            || self.generate_correspondents
            || self.generate_document_types
            || self.generate_dates
    }
}

impl Default for SuggestionFlags {
    fn default() -> Self {
        Self::all()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionRequest {
    pub documents: Vec<Document>,
    #[serde(flatten)]
    pub flags: SuggestionFlags,
    #[serde(default)]
    pub mode: PromptMode,
}

impl SuggestionRequest {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            flags: SuggestionFlags::all(),
            mode: PromptMode::Combined,
        }
    }

    pub fn with_flags(mut self, flags: SuggestionFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_mode(mut self, mode: PromptMode) -> Self {
        self.mode = mode;
        self
    }
}
