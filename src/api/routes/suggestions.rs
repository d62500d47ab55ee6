use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::api::{error::ApiError, state::AppState};
use crate::application::services::{
    LlmSuggester, ProcessedMarker, ReconcileSummary, SuggestionOutcome,
};
use crate::domain::{DocumentId, DocumentSuggestion, DomainError, SuggestionRequest};

#[derive(Debug, Deserialize)]
pub struct GenerateSuggestionsRequest {
    #[serde(flatten)]
    pub request: SuggestionRequest,
    /// Return the successful suggestions even when some documents failed.
    #[serde(default)]
    pub partial: bool,
}

#[derive(Debug, Serialize)]
pub struct DocumentFailure {
    pub document_id: DocumentId,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct PartialSuggestionsResponse {
    pub suggestions: Vec<DocumentSuggestion>,
    pub errors: Vec<DocumentFailure>,
}

pub async fn generate_suggestions(
    State(state): State<AppState>,
    Json(body): Json<GenerateSuggestionsRequest>,
) -> Result<Response, ApiError> {
    let GenerateSuggestionsRequest { request, partial } = body;
    if !request.flags.any() {
        return Err(DomainError::validation("no suggestion fields requested").into());
    }
    info!(documents = request.documents.len(), partial, "generating suggestions");

    let services = &state.services;
    let catalog = services.generator.load_catalog(services.source.as_ref()).await?;
    let suggester = Arc::new(LlmSuggester::new(
        services.generator.clone(),
        catalog,
        request.flags,
        request.mode,
    ));
    let report = services
        .processor
        .run(suggester, request.documents, state.shutdown.clone())
        .await;

    if !partial {
        return Ok(Json(report.into_all_or_nothing()?).into_response());
    }

    let mut response = PartialSuggestionsResponse {
        suggestions: Vec::new(),
        errors: Vec::new(),
    };
    for outcome in report.outcomes() {
        match outcome {
            SuggestionOutcome::Success(s) => response.suggestions.push(s.clone()),
            SuggestionOutcome::Failure { document_id, error } => {
                response.errors.push(DocumentFailure {
                    document_id: *document_id,
                    error: error.to_string(),
                })
            }
        }
    }
    Ok(Json(response).into_response())
}

/// Applies reviewed suggestions. Pipeline tags are removed so the documents
/// leave the queue.
pub async fn update_documents(
    State(state): State<AppState>,
    Json(mut suggestions): Json<Vec<DocumentSuggestion>>,
) -> Result<Json<ReconcileSummary>, ApiError> {
    let tags = &state.services.tags;
    for suggestion in &mut suggestions {
        if suggestion.tags.is_none() {
            suggestion.tags = Some(suggestion.original_document.tags.clone());
        }
        suggestion
            .tags_mut()
            .retain(|t| *t != tags.auto_tag && *t != tags.ocr_tag);
    }

    let marker = state
        .config
        .pipeline
        .auto_tagged_field
        .as_deref()
        .map(ProcessedMarker::today);
    let summary = state
        .services
        .reconciler
        .reconcile(&suggestions, marker.as_ref())
        .await?;

    info!(updated = summary.updated.len(), "documents updated");
    Ok(Json(summary))
}
