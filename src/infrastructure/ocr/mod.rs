mod cached;
mod job;
mod vision;

pub use cached::CachedOcr;
pub use job::{BlockKind, JobOcr, JobStatus, OcrJobBackend, TextBlock};
pub use vision::VisionOcr;
