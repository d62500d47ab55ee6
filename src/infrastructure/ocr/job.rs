use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{ports::OcrService, DocumentId, DomainError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Page,
    Line,
    Word,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub kind: BlockKind,
    pub text: String,
}

impl TextBlock {
    pub fn line(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Line,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    InProgress,
    Succeeded(Vec<TextBlock>),
    Failed(String),
}

/// Asynchronous text-detection service working on uploaded objects.
#[async_trait]
pub trait OcrJobBackend: Send + Sync {
    async fn upload(&self, key: &str, file: &[u8]) -> Result<(), DomainError>;
    /// Starts detection on an uploaded object and returns the job id.
    async fn start(&self, key: &str) -> Result<String, DomainError>;
    async fn poll(&self, job_id: &str) -> Result<JobStatus, DomainError>;
    async fn delete(&self, key: &str) -> Result<(), DomainError>;
}

/// Upload, start, poll and clean up. The uploaded object is deleted whether
/// or not detection succeeded.
pub struct JobOcr {
    backend: Arc<dyn OcrJobBackend>,
    poll_interval: Duration,
    deadline: Duration,
}

impl JobOcr {
    pub fn new(backend: Arc<dyn OcrJobBackend>) -> Self {
        Self {
            backend,
            poll_interval: Duration::from_secs(3),
            deadline: Duration::from_secs(600),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    async fn detect(&self, key: &str) -> Result<String, DomainError> {
        let job_id = self.backend.start(key).await?;
        debug!(job_id = %job_id, "text detection started");

        let blocks = tokio::time::timeout(self.deadline, self.wait_for(&job_id))
            .await
            .map_err(|_| DomainError::timeout(format!("OCR job {job_id}")))??;

        Ok(join_lines(&blocks))
    }

    async fn wait_for(&self, job_id: &str) -> Result<Vec<TextBlock>, DomainError> {
        loop {
            match self.backend.poll(job_id).await? {
                JobStatus::InProgress => tokio::time::sleep(self.poll_interval).await,
                JobStatus::Succeeded(blocks) => return Ok(blocks),
                JobStatus::Failed(reason) => {
                    return Err(DomainError::upstream(format!(
                        "OCR job {job_id} failed: {reason}"
                    )))
                }
            }
        }
    }
}

fn join_lines(blocks: &[TextBlock]) -> String {
    blocks
        .iter()
        .filter(|b| b.kind == BlockKind::Line)
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn object_key(document_id: DocumentId) -> String {
    format!(
        "documents/{}/{document_id}-{}.pdf",
        chrono::Utc::now().format("%Y%m%d"),
        Uuid::new_v4()
    )
}

#[async_trait]
impl OcrService for JobOcr {
    #[instrument(skip(self, file), fields(bytes = file.len()))]
    async fn extract_text(&self, file: &[u8], document_id: DocumentId) -> Result<String, DomainError> {
        let key = object_key(document_id);
        self.backend.upload(&key, file).await?;

        let result = self.detect(&key).await;

        if let Err(e) = self.backend.delete(&key).await {
            warn!(key = %key, error = %e, "failed to delete uploaded document");
        }
        if result.is_ok() {
            info!(document_id, "OCR completed");
        }
        result
    }
}
