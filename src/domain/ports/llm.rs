use crate::domain::{errors::DomainError, MediaKind};
use async_trait::async_trait;

#[async_trait]
pub trait LlmService: Send + Sync {
    /// Sends `prompt` as a single user message and returns the raw reply.
    async fn complete(&self, prompt: &str) -> Result<String, DomainError>;
}

/// Multimodal model that reads one attached file.
#[async_trait]
pub trait VisionService: Send + Sync {
    /// Sends `file` followed by `prompt` in one user message.
    async fn read_file(&self, prompt: &str, kind: MediaKind, file: &[u8]) -> Result<String, DomainError>;
}
