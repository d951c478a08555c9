//! HTTP error responses
//!
//! Every failed tile request answers with a JSON body carrying the message
//! and the HTTP status, so clients never have to parse text.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::planner::TileError;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable error code such as `InvalidPropertyName`
    pub kind: &'static str,
    pub code: u16,
}

impl From<&TileError> for ErrorResponse {
    fn from(err: &TileError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.code(),
            code: err.status_code(),
        }
    }
}

impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(ErrorResponse::from(&self))).into_response();
        if self.is_retryable() {
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, axum::http::HeaderValue::from_static("1"));
        }
        response
    }
}
