//! Idempotent grant and revoke of project IAM bindings and dataset access entries.
//!
//! Every call reads the authoritative document, returns early if the intent is
//! already satisfied, and otherwise submits exactly one write conditioned on the
//! etag it read. Conflicts and other write failures are surfaced, never retried.
//! The only retry is the group fallback: a write the store rejects as an invalid
//! user or service account is repeated once with the entity qualified as a group.

use std::future::Future;

use crate::{
    principal::Principal,
    store::{DatasetAccessStore, ProjectPolicyStore},
};

mod batch;
mod confirm;
mod dataset;
mod error;
mod project;

pub use batch::{BatchOutcome, DatasetBatch, ProjectBatch};
pub use confirm::{AssumeYes, Confirm, Prompt};
pub use error::{BatchError, ReconcileError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Intent {
    Grant,
    Revoke,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Project(String),
    Dataset { project: String, dataset: String },
}

impl Resource {
    /// Project id or dataset id, as shown to operators.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Resource::Project(project) => project,
            Resource::Dataset { dataset, .. } => dataset,
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Project(project) => write!(f, "project {project}"),
            Resource::Dataset { project, dataset } => write!(f, "dataset {project}:{dataset}"),
        }
    }
}

/// A role for an entity on a resource. The entity is an unqualified email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub resource: Resource,
    pub role: String,
    pub entity: String,
}

impl AccessGrant {
    #[must_use]
    pub fn project(project: &str, role: &str, entity: &str) -> Self {
        Self {
            resource: Resource::Project(project.to_string()),
            role: role.to_string(),
            entity: entity.to_string(),
        }
    }

    #[must_use]
    pub fn dataset(project: &str, dataset: &str, role: &str, entity: &str) -> Self {
        Self {
            resource: Resource::Dataset {
                project: project.to_string(),
                dataset: dataset.to_string(),
            },
            role: role.to_string(),
            entity: entity.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A write was submitted for this principal.
    Applied(Principal),
    /// The document already matched the intent; nothing was written.
    Unchanged(Principal),
}

impl Outcome {
    #[must_use]
    pub fn principal(&self) -> &Principal {
        match self {
            Outcome::Applied(principal) | Outcome::Unchanged(principal) => principal,
        }
    }

    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }
}

/// One completed step of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub intent: Intent,
    pub grant: AccessGrant,
    pub outcome: Outcome,
}

impl std::fmt::Display for Reconciled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let AccessGrant {
            resource,
            role,
            entity,
        } = &self.grant;
        match self.intent {
            Intent::Grant => write!(f, "Permit {entity} to {} access as {role}", resource.id()),
            Intent::Revoke => write!(
                f,
                "Revoked {entity}'s permission of {} access as {role}",
                resource.id()
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler<P, D> {
    projects: P,
    datasets: D,
}

impl<P, D> Reconciler<P, D>
where
    P: ProjectPolicyStore,
    D: DatasetAccessStore,
{
    pub fn new(projects: P, datasets: D) -> Self {
        Self { projects, datasets }
    }

    /// Bring `grant` into the state `intent` asks for.
    #[tracing::instrument(skip(self, grant), fields(resource = %grant.resource, role = %grant.role, entity = %grant.entity))]
    pub async fn reconcile(
        &self,
        intent: Intent,
        grant: &AccessGrant,
    ) -> Result<Outcome, ReconcileError> {
        let AccessGrant {
            resource,
            role,
            entity,
        } = grant;
        match (resource, intent) {
            (Resource::Project(project), Intent::Grant) => {
                with_group_fallback(entity, |principal| {
                    self.grant_project_role(project, role, principal)
                })
                .await
            }
            (Resource::Project(project), Intent::Revoke) => {
                self.revoke_project_role(project, role, entity).await
            }
            (Resource::Dataset { project, dataset }, intent) => {
                with_group_fallback(entity, |principal| {
                    self.reconcile_dataset_entry(intent, project, dataset, role, principal)
                })
                .await
            }
        }
    }
}

/// Run `attempt` for the qualified entity and, if the store rejects that
/// principal, once more for its group form.
async fn with_group_fallback<F, Fut>(entity: &str, mut attempt: F) -> Result<Outcome, ReconcileError>
where
    F: FnMut(Principal) -> Fut,
    Fut: Future<Output = Result<Outcome, ReconcileError>>,
{
    let principal = Principal::qualify(entity);
    let fallback = principal.fallback();
    match attempt(principal).await {
        Err(e) if e.is_rejected_principal() => {
            let Some(group) = fallback else {
                return Err(e);
            };
            tracing::warn!("{e}: {}. Retrying as {group}", e.api_error().message);
            attempt(group).await
        }
        result => result,
    }
}
