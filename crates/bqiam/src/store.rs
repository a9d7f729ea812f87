//! Seams between the reconciliation/caching logic and the authoritative stores.
//!
//! [`crate::gcp::GcpClient`] implements all three traits against the Google Cloud
//! REST APIs.

use async_trait::async_trait;

use crate::{
    ApiError,
    policy::{BindingChange, DatasetAccess, ProjectPolicy},
};

/// Project-wide IAM policy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProjectPolicyStore: Send + Sync + std::fmt::Debug {
    /// Current policy of `project`, including its etag.
    async fn get_policy(&self, project: &str) -> Result<ProjectPolicy, ApiError>;

    /// Apply one member change on top of `base`. The write is conditioned on the
    /// etag of `base` and fails with [`crate::ApiErrorKind::Conflict`] if the
    /// policy changed since it was read, or with
    /// [`crate::ApiErrorKind::InvalidArgument`] if the member is malformed.
    async fn modify_binding(
        &self,
        project: &str,
        base: &ProjectPolicy,
        change: &BindingChange,
    ) -> Result<(), ApiError>;
}

/// Access control lists of datasets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatasetAccessStore: Send + Sync + std::fmt::Debug {
    async fn get_access(&self, project: &str, dataset: &str) -> Result<DatasetAccess, ApiError>;

    /// Replace the whole access list, conditioned on `access.etag`.
    async fn update_access(
        &self,
        project: &str,
        dataset: &str,
        access: &DatasetAccess,
    ) -> Result<DatasetAccess, ApiError>;
}

/// Listing of projects and datasets visible to the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceEnumerator: Send + Sync + std::fmt::Debug {
    /// All project ids, following pagination until exhaustion.
    async fn list_projects(&self) -> Result<Vec<String>, ApiError>;

    /// All dataset ids of `project`, following pagination until exhaustion.
    async fn list_datasets(&self, project: &str) -> Result<Vec<String>, ApiError>;
}
