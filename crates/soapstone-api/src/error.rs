//! Error types for the HTTP layer.

use soapstone_entities::{RequestError, TemplateError};
use thiserror::Error;

/// Errors that can occur when configuring or talking to the server.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Client configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A URL could not be parsed.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// An endpoint template could not be built.
    #[error("invalid endpoint: {0}")]
    Template(#[from] TemplateError),
}

impl From<ApiError> for RequestError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Http(e) if e.is_decode() => RequestError::Decode(e.to_string()),
            ApiError::Http(e) => RequestError::Transport(e.to_string()),
            ApiError::Json(e) => RequestError::Decode(e.to_string()),
            ApiError::Config(msg) => RequestError::Invalid(msg),
            ApiError::Url(e) => RequestError::Invalid(e.to_string()),
            ApiError::Template(e) => RequestError::Invalid(e.to_string()),
        }
    }
}
