//! HTTP error responses for web adapter.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::error;

use crate::domain::error::SentinelError;

use super::templates::{ErrorTemplate, Page};

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

pub fn status_from_error(err: &SentinelError) -> StatusCode {
    match err {
        SentinelError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        SentinelError::NotFound { .. } => StatusCode::NOT_FOUND,
        SentinelError::Unauthorized => StatusCode::UNAUTHORIZED,
        SentinelError::MarketData { .. } => StatusCode::BAD_GATEWAY,
        SentinelError::ConfigParse { .. }
        | SentinelError::ConfigMissing { .. }
        | SentinelError::ConfigInvalid { .. }
        | SentinelError::Database { .. }
        | SentinelError::DatabaseQuery { .. }
        | SentinelError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<SentinelError> for WebError {
    fn from(err: SentinelError) -> Self {
        let status = status_from_error(&err);
        if status.is_server_error() {
            // Storage details stay in the log.
            error!(error = %err, "request failed");
            return Self::internal("Something went wrong. Please try again.");
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let template = ErrorTemplate {
            page: Page::public("Error", false),
            message: &self.message,
            status: self.status.as_u16(),
        };
        match template.render() {
            Ok(html) => (self.status, Html(html)).into_response(),
            Err(_) => (self.status, self.message).into_response(),
        }
    }
}
