mod catalog;
mod document;
mod media;
mod prompt;
mod request;

pub use catalog::{CatalogNames, IdMap, NewEntity};
pub use document::{
    remove_tag, truncate_chars, CustomField, Document, DocumentId, DocumentSuggestion,
    DocumentUpdate, EntityId, MAX_TITLE_CHARS,
};
pub use media::MediaKind;
pub use prompt::{PromptData, PromptTemplate, MAX_PROMPT_CONTENT_CHARS};
pub use request::{PromptMode, SuggestionFlags, SuggestionRequest};
