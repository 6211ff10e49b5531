use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use super::errors::ApiError;
use super::AppState;
use crate::download::artifact_response;
use crate::extractors::AudioExtractor;
use crate::DownloadError;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub url: Option<String>,
}

/// Component versions reported by `/version`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub app: String,
    pub yt_dlp: String,
    pub platform: String,
}

impl VersionInfo {
    /// Collect versions once at startup
    pub async fn detect(extractor: &dyn AudioExtractor) -> Self {
        Self {
            app: env!("CARGO_PKG_VERSION").to_string(),
            yt_dlp: extractor
                .version()
                .await
                .unwrap_or_else(|| "unknown".to_string()),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

pub async fn download(
    State(state): State<AppState>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|rejection| {
        tracing::warn!(error = %rejection, "Malformed download query");
        ApiError::from(DownloadError::InvalidUrl(String::new()))
    })?;
    tracing::info!(url = query.url.as_deref().unwrap_or_default(), "Received download request");

    let prepared = state
        .downloads
        .prepare(query.url.as_deref())
        .await
        .map_err(log_failure)?;

    artifact_response(prepared).await.map_err(log_failure)
}

fn log_failure(error: DownloadError) -> ApiError {
    match &error {
        DownloadError::InvalidUrl(url) => tracing::warn!(%url, "Invalid URL provided"),
        other => tracing::error!(error = %other, "Download process error"),
    }
    ApiError::from(error)
}

pub async fn health() -> &'static str {
    tracing::debug!("Health check requested");
    "Server is healthy"
}

pub async fn version(State(state): State<AppState>) -> Json<VersionInfo> {
    Json(state.versions.as_ref().clone())
}

/// Unknown paths: the front-end's 404 page if it has one
pub async fn not_found(State(state): State<AppState>) -> Response {
    match tokio::fs::read_to_string(state.public_dir.join("404.html")).await {
        Ok(page) => (StatusCode::NOT_FOUND, Html(page)).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}
