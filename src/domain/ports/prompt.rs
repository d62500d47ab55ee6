use crate::domain::{errors::DomainError, PromptData, PromptTemplate};

/// Renders prompt text. The output is used verbatim as the cache key, so
/// identical inputs must produce identical text.
pub trait PromptRenderer: Send + Sync {
    fn render(&self, template: PromptTemplate, data: &PromptData<'_>) -> Result<String, DomainError>;
}
