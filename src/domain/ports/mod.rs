mod document_source;
mod llm;
mod ocr;
mod prompt;

pub use document_source::DocumentSource;
pub use llm::{LlmService, VisionService};
pub use ocr::OcrService;
pub use prompt::PromptRenderer;
