pub mod config;
pub mod document_source;
pub mod llm;
pub mod logging;
pub mod ocr;
pub mod prompts;
pub mod services;

pub use config::{AppConfig, ConfigError, LlmProvider, OcrEngine};
pub use document_source::{InMemoryDocumentSource, PaperlessClient};
pub use llm::RigLlm;
pub use ocr::{CachedOcr, JobOcr, OcrJobBackend, VisionOcr};
pub use prompts::HandlebarsPrompts;
pub use services::Services;
