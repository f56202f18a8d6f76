use crate::error::ApiError;
use crate::service::RetrievalService;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use query::{BaitListing, SearchResults};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct ModeParams {
    pub mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub mode: Option<String>,
    pub confidence: Option<String>,
}

pub fn router(service: Arc<RetrievalService>) -> Router {
    Router::new()
        .route("/baits", get(list_baits))
        .route("/structure/:id/pae", get(contact_artifact))
        .route("/interactions/:term", get(search_interactions))
        .with_state(service)
}

async fn list_baits(
    State(service): State<Arc<RetrievalService>>,
    Query(params): Query<ModeParams>,
) -> Result<Json<BaitListing>, ApiError> {
    service.baits(params.mode).await.map(Json)
}

async fn search_interactions(
    State(service): State<Arc<RetrievalService>>,
    Path(term): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResults>, ApiError> {
    service
        .search(&term, params.mode.as_deref(), params.confidence.as_deref())
        .await
        .map(Json)
}

async fn contact_artifact(
    State(service): State<Arc<RetrievalService>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let artifact = service.contact_artifact(&id).await?;
    Ok((artifact.headers(), artifact.body).into_response())
}
