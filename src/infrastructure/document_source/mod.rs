mod in_memory;
mod paperless;

pub use in_memory::InMemoryDocumentSource;
pub use paperless::PaperlessClient;
