//! Error types for the entity store and its hooks.

use thiserror::Error;

use crate::EntityType;

/// Errors reported by a [`RequestExecutor`](crate::RequestExecutor).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    /// Server answered with a non-success status.
    #[error("request failed with status {status}")]
    Status {
        status: u16,
        /// Raw response body, when one could be read.
        body: Option<String>,
    },

    /// Connection, timeout or other transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body could not be decoded.
    #[error("invalid response body: {0}")]
    Decode(String),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl RequestError {
    /// HTTP-like status code, when the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the server refused the request for lack of credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}

/// A payload failed schema validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {entity_type} payload: {message}")]
pub struct ValidationError {
    pub entity_type: EntityType,
    pub message: String,
}

impl ValidationError {
    pub fn new(entity_type: EntityType, message: impl Into<String>) -> Self {
        Self {
            entity_type,
            message: message.into(),
        }
    }
}

/// Errors building a URL from a [`UrlTemplate`](crate::UrlTemplate).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// Template does not start with `/`.
    #[error("URL template must start with '/': {0}")]
    NotAbsolute(String),

    /// A `:` segment without a name.
    #[error("empty parameter name in URL template: {0}")]
    EmptyParam(String),

    /// Rendering was missing a named parameter.
    #[error("missing parameter '{name}' for URL template {template}")]
    MissingParam { template: String, name: String },

    /// The base URL cannot carry a path.
    #[error("base URL cannot carry a path: {0}")]
    CannotBeABase(String),

    /// URL parsing failed.
    #[error("invalid URL: {0}")]
    Url(String),
}

/// Failure of a create, update, delete or dismiss mutation.
///
/// By the time a caller sees this error, the store has already been
/// rolled back to its pre-mutation state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Another mutation already targets the same entity.
    #[error("a mutation for {entity_type}/{id} is already in flight")]
    InFlight { entity_type: EntityType, id: String },

    /// The detached settlement task did not finish.
    #[error("mutation task aborted: {0}")]
    Aborted(String),
}

impl MutationError {
    /// Status code of the underlying request failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            MutationError::Request(e) => e.status(),
            _ => None,
        }
    }
}

/// Failure of an entity or list fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error(transparent)]
    Request(RequestError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Server answered 401 or 403.
    #[error("not authorized (status {status})")]
    Unauthorized { status: u16 },

    /// The detached refetch task did not finish.
    #[error("fetch task aborted: {0}")]
    Aborted(String),
}

impl From<RequestError> for QueryError {
    fn from(err: RequestError) -> Self {
        match err.status() {
            Some(status @ (401 | 403)) => QueryError::Unauthorized { status },
            _ => QueryError::Request(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_status() {
        let err = RequestError::Status {
            status: 500,
            body: None,
        };
        assert_eq!(err.status(), Some(500));
        assert!(!err.is_unauthorized());
        assert_eq!(RequestError::Transport("reset".into()).status(), None);
    }

    #[test]
    fn test_unauthorized_maps_to_query_error() {
        let err: QueryError = RequestError::Status {
            status: 401,
            body: None,
        }
        .into();
        assert_eq!(err, QueryError::Unauthorized { status: 401 });

        let err: QueryError = RequestError::Status {
            status: 404,
            body: None,
        }
        .into();
        assert!(matches!(err, QueryError::Request(_)));
    }

    #[test]
    fn test_mutation_error_display_is_transparent() {
        let err = MutationError::from(RequestError::Status {
            status: 500,
            body: Some("boom".into()),
        });
        assert_eq!(err.to_string(), "request failed with status 500");
        assert_eq!(err.status(), Some(500));
    }
}
