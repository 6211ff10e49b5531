use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::time::Duration;

use crate::DownloadError;

/// Plain-text error responses. Messages are fixed strings; internal detail
/// only goes to the log.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    Forbidden(&'static str),
    NotFound(&'static str),
    TooManyRequests(Duration),
    Internal(&'static str),
    GatewayTimeout(&'static str),
}

impl From<&DownloadError> for ApiError {
    fn from(error: &DownloadError) -> Self {
        match error {
            DownloadError::InvalidUrl(_) => ApiError::BadRequest("Invalid or missing YouTube URL"),
            DownloadError::CopyrightBlocked(_) => ApiError::Forbidden(
                "This video cannot be downloaded due to copyright restrictions.",
            ),
            DownloadError::VideoUnavailable(_) => {
                ApiError::NotFound("This video is unavailable or private.")
            }
            DownloadError::Timeout(_) => {
                ApiError::GatewayTimeout("Download took too long. Try a shorter video.")
            }
            DownloadError::StreamError(_) => ApiError::Internal("Error streaming audio file"),
            DownloadError::EmptyArtifact | DownloadError::Unknown(_) | DownloadError::Io(_) => {
                ApiError::Internal("Error processing request. Please try again later.")
            }
        }
    }
}

impl From<DownloadError> for ApiError {
    fn from(error: DownloadError) -> Self {
        ApiError::from(&error)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );

        let message = match self {
            ApiError::TooManyRequests(retry_after) => {
                let secs = retry_after.as_secs().max(1);
                headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
                "Too many requests from this IP, please try again later."
            }
            ApiError::BadRequest(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Internal(msg)
            | ApiError::GatewayTimeout(msg) => msg,
        };

        (status, headers, message).into_response()
    }
}
