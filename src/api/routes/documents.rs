use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::{error::ApiError, state::AppState};
use crate::domain::Document;

const DEFAULT_LIST_LIMIT: usize = 25;

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct FilterTagResponse {
    pub tag: String,
}

/// Documents waiting for enrichment.
pub async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
    let documents = state
        .services
        .source
        .fetch_by_tags(&[state.config.pipeline.auto_tag.clone()], limit)
        .await?;
    Ok(Json(documents))
}

pub async fn filter_tag(State(state): State<AppState>) -> Json<FilterTagResponse> {
    Json(FilterTagResponse {
        tag: state.config.pipeline.auto_tag.clone(),
    })
}
