use crate::{
    policy::{AccessEntry, DatasetAccess},
    principal::Principal,
    store::{DatasetAccessStore, ProjectPolicyStore},
};

use super::{Intent, Outcome, ReconcileError, Reconciler};

fn access_entry(role: &str, principal: &Principal) -> AccessEntry {
    AccessEntry::new(role, principal.dataset_entity_type(), principal.email())
}

impl<P, D> Reconciler<P, D>
where
    P: ProjectPolicyStore,
    D: DatasetAccessStore,
{
    /// Add or remove the access entry of `principal` on one dataset.
    ///
    /// A revoke also removes the entry if the entity was added as a group.
    pub(super) async fn reconcile_dataset_entry(
        &self,
        intent: Intent,
        project: &str,
        dataset: &str,
        role: &str,
        principal: Principal,
    ) -> Result<Outcome, ReconcileError> {
        let resource = format!("dataset {project}:{dataset}");
        let access = self.fetch_access(project, dataset).await?;

        let (updated, principal, change) = match intent {
            Intent::Grant => {
                let entry = access_entry(role, &principal);
                if access.contains(&entry) {
                    tracing::info!("{principal} already has {role} on {resource}, skipped");
                    return Ok(Outcome::Unchanged(principal));
                }
                (access.with_entry(entry), principal, "add")
            }
            Intent::Revoke => {
                let candidates = std::iter::once(principal.clone()).chain(principal.fallback());
                let Some((entry, bound)) = candidates
                    .map(|p| (access_entry(role, &p), p))
                    .find(|(entry, _)| access.contains(entry))
                else {
                    tracing::info!("{principal} does not have {role} on {resource}, skipped");
                    return Ok(Outcome::Unchanged(principal));
                };
                (access.without_entry(&entry), bound, "remove")
            }
        };

        self.datasets
            .update_access(project, dataset, &updated)
            .await
            .map_err(|source| ReconcileError::Submit {
                resource: resource.clone(),
                change: format!("{change} {role} for {principal}"),
                source,
            })?;
        tracing::info!("Updated {role} of {principal} on {resource}");
        Ok(Outcome::Applied(principal))
    }

    async fn fetch_access(
        &self,
        project: &str,
        dataset: &str,
    ) -> Result<DatasetAccess, ReconcileError> {
        self.datasets
            .get_access(project, dataset)
            .await
            .map_err(|source| ReconcileError::Fetch {
                resource: format!("dataset {project}:{dataset}"),
                source,
            })
    }
}
