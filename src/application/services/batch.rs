use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::domain::{Document, DocumentId, DocumentSuggestion, DomainError};

/// Produces one suggestion for one document.
#[async_trait]
pub trait Suggester: Send + Sync {
    async fn suggest(&self, document: &Document) -> Result<DocumentSuggestion, DomainError>;
}

#[derive(Debug, Clone)]
pub enum SuggestionOutcome {
    Success(DocumentSuggestion),
    Failure {
        document_id: DocumentId,
        error: DomainError,
    },
}

impl SuggestionOutcome {
    pub fn document_id(&self) -> DocumentId {
        match self {
            Self::Success(s) => s.document_id,
            Self::Failure { document_id, .. } => *document_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Per-document results of one batch, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    outcomes: Vec<SuggestionOutcome>,
    /// Index of the failure that completed first.
    first_failure: Option<usize>,
}

impl BatchReport {
    pub fn outcomes(&self) -> &[SuggestionOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }

    /// The first error recorded while the batch ran.
    pub fn first_error(&self) -> Option<&DomainError> {
        match self.first_failure.map(|i| &self.outcomes[i]) {
            Some(SuggestionOutcome::Failure { error, .. }) => Some(error),
            _ => None,
        }
    }

    /// Every successful suggestion, dropping failures.
    pub fn successes(self) -> Vec<DocumentSuggestion> {
        self.outcomes
            .into_iter()
            .filter_map(|o| match o {
                SuggestionOutcome::Success(s) => Some(s),
                SuggestionOutcome::Failure { .. } => None,
            })
            .collect()
    }

    /// All suggestions, or the first recorded error if any document failed.
    /// Completed siblings are discarded in the error case.
    pub fn into_all_or_nothing(self) -> Result<Vec<DocumentSuggestion>, DomainError> {
        if let Some(error) = self.first_error() {
            return Err(error.clone());
        }
        Ok(self.successes())
    }
}

/// Fans a batch of documents out to a [`Suggester`] with bounded concurrency.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    concurrency: usize,
}

impl BatchProcessor {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs every document and waits for all tasks before returning.
    /// Once `shutdown` flips to `true`, unfinished documents fail with
    /// [`DomainError::Cancelled`].
    #[instrument(skip_all, fields(documents = documents.len(), concurrency = self.concurrency))]
    pub async fn run(
        &self,
        suggester: Arc<dyn Suggester>,
        documents: Vec<Document>,
        shutdown: watch::Receiver<bool>,
    ) -> BatchReport {
        let ids: Vec<DocumentId> = documents.iter().map(|d| d.id).collect();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, document) in documents.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let suggester = suggester.clone();
            let mut shutdown = shutdown.clone();

            tasks.spawn(async move {
                let result = tokio::select! {
                    biased;
                    _ = shutdown_requested(&mut shutdown) => Err(DomainError::Cancelled),
                    result = async {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .map_err(|_| DomainError::Cancelled)?;
                        info!(document_id = document.id, "processing document");
                        suggester.suggest(&document).await
                    } => result,
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<SuggestionOutcome>> = ids.iter().map(|_| None).collect();
        let mut first_failure = None;

        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(error = ?e, "suggestion task panicked");
                    continue;
                }
            };

            slots[index] = Some(match result {
                Ok(suggestion) => {
                    info!(document_id = ids[index], "document processed");
                    SuggestionOutcome::Success(suggestion)
                }
                Err(error) => {
                    warn!(document_id = ids[index], error = %error, "document failed");
                    first_failure.get_or_insert(index);
                    SuggestionOutcome::Failure {
                        document_id: ids[index],
                        error,
                    }
                }
            });
        }

        // Panicked tasks leave their slot empty.
        let outcomes = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    first_failure.get_or_insert(index);
                    SuggestionOutcome::Failure {
                        document_id: ids[index],
                        error: DomainError::internal("suggestion task aborted"),
                    }
                })
            })
            .collect();

        BatchReport {
            outcomes,
            first_failure,
        }
    }
}

/// Resolves once shutdown is requested. A dropped sender never resolves.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let requested = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FailOn {
        failing: DocumentId,
    }

    #[async_trait]
    impl Suggester for FailOn {
        async fn suggest(&self, document: &Document) -> Result<DocumentSuggestion, DomainError> {
            if document.id == self.failing {
                return Err(DomainError::malformed("empty response"));
            }
            let mut suggestion = DocumentSuggestion::for_document(document);
            suggestion.title = Some(format!("title-{}", document.id));
            Ok(suggestion)
        }
    }

    struct Tracking {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Suggester for Tracking {
        async fn suggest(&self, document: &Document) -> Result<DocumentSuggestion, DomainError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(DocumentSuggestion::for_document(document))
        }
    }

    struct Never;

    #[async_trait]
    impl Suggester for Never {
        async fn suggest(&self, _document: &Document) -> Result<DocumentSuggestion, DomainError> {
            std::future::pending().await
        }
    }

    fn docs(n: i64) -> Vec<Document> {
        (1..=n).map(|id| Document::new(id, format!("doc {id}"))).collect()
    }

    fn idle_shutdown() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn test_all_or_nothing_discards_successes() {
        let processor = BatchProcessor::new(4);
        let report = processor
            .run(Arc::new(FailOn { failing: 2 }), docs(3), idle_shutdown())
            .await;

        assert_eq!(report.len(), 3);
        assert_eq!(report.failure_count(), 1);

        let err = report.into_all_or_nothing().unwrap_err();
        assert!(matches!(err, DomainError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_partial_results_keep_input_order() {
        let processor = BatchProcessor::new(2);
        let report = processor
            .run(Arc::new(FailOn { failing: 2 }), docs(3), idle_shutdown())
            .await;

        let ids: Vec<_> = report.outcomes().iter().map(|o| o.document_id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let successes = report.successes();
        assert_eq!(successes.len(), 2);
        assert_eq!(successes[0].title.as_deref(), Some("title-1"));
        assert_eq!(successes[1].title.as_deref(), Some("title-3"));
    }

    #[tokio::test]
    async fn test_all_success() {
        let processor = BatchProcessor::new(3);
        let report = processor
            .run(Arc::new(FailOn { failing: 99 }), docs(3), idle_shutdown())
            .await;

        assert!(report.first_error().is_none());
        assert_eq!(report.into_all_or_nothing().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let suggester = Arc::new(Tracking {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let processor = BatchProcessor::new(2);

        let report = processor
            .run(suggester.clone(), docs(6), idle_shutdown())
            .await;

        assert_eq!(report.failure_count(), 0);
        assert!(suggester.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_documents() {
        let (tx, rx) = watch::channel(false);
        let processor = BatchProcessor::new(2);

        let run = tokio::spawn(async move { processor.run(Arc::new(Never), docs(3), rx).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        let report = tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("batch did not stop")
            .unwrap();

        assert_eq!(report.failure_count(), 3);
        assert!(matches!(report.first_error(), Some(DomainError::Cancelled)));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let report = BatchProcessor::new(1)
            .run(Arc::new(Never), Vec::new(), idle_shutdown())
            .await;
        assert!(report.is_empty());
        assert!(report.into_all_or_nothing().unwrap().is_empty());
    }
}
