//! Application layer - the enrichment pipeline.
//!
//! Services here depend on domain ports (traits) rather than concrete
//! adapters: suggestion generation, batch fan-out, reconciliation and the
//! polling loop that ties them together.

pub mod services;

pub use services::{
    AutoTagJob, BatchProcessor, OcrJob, PollingScheduler, Reconciler, ResponseCache,
    SuggestionGenerator,
};
