use std::error::Error as StdError;

use http::StatusCode;

/// Coarse classification of a failed call against a Google Cloud API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorKind {
    /// The request was rejected by validation, e.g. a malformed principal.
    InvalidArgument,
    /// The etag sent with a write no longer matches the stored document.
    Conflict,
    PermissionDenied,
    NotFound,
    Unauthenticated,
    /// Transport failures, unexpected payloads and everything else.
    Other,
}

impl ApiErrorKind {
    /// Classify by the canonical `status` of a Google error payload, falling
    /// back to the HTTP status code.
    #[must_use]
    pub fn classify(status: Option<&str>, code: StatusCode) -> Self {
        match status {
            Some("INVALID_ARGUMENT") => ApiErrorKind::InvalidArgument,
            Some("ABORTED" | "FAILED_PRECONDITION") => ApiErrorKind::Conflict,
            Some("PERMISSION_DENIED") => ApiErrorKind::PermissionDenied,
            Some("NOT_FOUND") => ApiErrorKind::NotFound,
            Some("UNAUTHENTICATED") => ApiErrorKind::Unauthenticated,
            _ => match code {
                StatusCode::BAD_REQUEST => ApiErrorKind::InvalidArgument,
                StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => ApiErrorKind::Conflict,
                StatusCode::FORBIDDEN => ApiErrorKind::PermissionDenied,
                StatusCode::NOT_FOUND => ApiErrorKind::NotFound,
                StatusCode::UNAUTHORIZED => ApiErrorKind::Unauthenticated,
                _ => ApiErrorKind::Other,
            },
        }
    }
}

/// A failed call against the project policy, dataset or enumeration APIs.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed ({kind}): {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub operation: String,
    pub message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl ApiError {
    #[must_use]
    pub fn new(kind: ApiErrorKind, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// A failure below the HTTP status layer: connection, TLS, token or body decoding.
    #[must_use]
    pub fn transport<E>(operation: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            kind: ApiErrorKind::Other,
            operation: operation.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// No access token could be obtained for the call.
    #[must_use]
    pub fn unauthenticated(
        operation: impl Into<String>,
        source: Box<dyn StdError + Send + Sync + 'static>,
    ) -> Self {
        Self {
            kind: ApiErrorKind::Unauthenticated,
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        self.kind == ApiErrorKind::InvalidArgument
    }
}
