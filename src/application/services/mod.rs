mod batch;
mod cache;
mod pipeline;
mod reconcile;
mod scheduler;
mod suggestion;

pub use batch::{BatchProcessor, BatchReport, Suggester, SuggestionOutcome};
pub use cache::{ResponseCache, DEFAULT_CACHE_CAPACITY};
pub use pipeline::{AutoTagJob, OcrJob, OcrSuggester, PipelineTags};
pub use reconcile::{CatalogSnapshot, ProcessedMarker, ReconcileSummary, Reconciler};
pub use scheduler::{Backoff, PollingJob, PollingScheduler, SchedulerConfig};
pub use suggestion::{parse_suggestion, LlmSuggester, SuggestionGenerator, SuggestionSettings};
