use crate::ApiError;

use super::Reconciled;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The current policy or access list could not be read.
    #[error("Failed to fetch the access state of {resource}")]
    Fetch {
        resource: String,
        #[source]
        source: ApiError,
    },
    /// The store rejected the corrective write.
    #[error("Failed to {change} on {resource}")]
    Submit {
        resource: String,
        change: String,
        #[source]
        source: ApiError,
    },
}

impl ReconcileError {
    #[must_use]
    pub fn api_error(&self) -> &ApiError {
        match self {
            ReconcileError::Fetch { source, .. } | ReconcileError::Submit { source, .. } => source,
        }
    }

    /// Whether the store rejected a write because the principal is malformed
    /// for its qualified kind.
    #[must_use]
    pub fn is_rejected_principal(&self) -> bool {
        matches!(self, ReconcileError::Submit { source, .. } if source.is_invalid_argument())
    }
}

/// A batch stopped at its first failure. Steps completed before it stay applied.
#[derive(Debug, thiserror::Error)]
#[error("Stopped after {} completed step(s)", .applied.len())]
pub struct BatchError {
    pub applied: Vec<Reconciled>,
    #[source]
    pub source: ReconcileError,
}
