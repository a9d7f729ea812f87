use crate::{
    policy::{BindingChange, ProjectPolicy},
    principal::Principal,
    role::DATASET_PREREQUISITE_ROLES,
    store::{DatasetAccessStore, ProjectPolicyStore},
};

use super::{Outcome, ReconcileError, Reconciler, with_group_fallback};

impl<P, D> Reconciler<P, D>
where
    P: ProjectPolicyStore,
    D: DatasetAccessStore,
{
    async fn fetch_policy(&self, project: &str) -> Result<ProjectPolicy, ReconcileError> {
        self.projects
            .get_policy(project)
            .await
            .map_err(|source| ReconcileError::Fetch {
                resource: format!("project {project}"),
                source,
            })
    }

    async fn submit_change(
        &self,
        project: &str,
        policy: &ProjectPolicy,
        change: &BindingChange,
    ) -> Result<(), ReconcileError> {
        self.projects
            .modify_binding(project, policy, change)
            .await
            .map_err(|source| ReconcileError::Submit {
                resource: format!("project {project}"),
                change: change.to_string(),
                source,
            })
    }

    pub(super) async fn grant_project_role(
        &self,
        project: &str,
        role: &str,
        principal: Principal,
    ) -> Result<Outcome, ReconcileError> {
        let policy = self.fetch_policy(project).await?;
        let member = principal.member();
        if policy.has_member(role, &member) {
            tracing::info!("{member} already has {role} on project {project}, skipped");
            return Ok(Outcome::Unchanged(principal));
        }

        self.submit_change(project, &policy, &BindingChange::add(role, member))
            .await?;
        tracing::info!("Granted {role} on project {project} to {principal}");
        Ok(Outcome::Applied(principal))
    }

    /// Remove the binding of `entity` to `role`, whichever kind it is bound as.
    pub(super) async fn revoke_project_role(
        &self,
        project: &str,
        role: &str,
        entity: &str,
    ) -> Result<Outcome, ReconcileError> {
        let policy = self.fetch_policy(project).await?;
        let Some(member) = policy.find_member(role, entity) else {
            tracing::info!("{entity} does not have {role} on project {project}, skipped");
            return Ok(Outcome::Unchanged(Principal::qualify(entity)));
        };
        let principal = Principal::from_member(member).unwrap_or_else(|| Principal::qualify(entity));

        self.submit_change(
            project,
            &policy,
            &BindingChange::remove(role, member.to_string()),
        )
        .await?;
        tracing::info!("Revoked {role} on project {project} from {principal}");
        Ok(Outcome::Applied(principal))
    }

    /// Grant the project roles needed to query a dataset at all.
    pub(super) async fn grant_prerequisite_roles(
        &self,
        project: &str,
        entity: &str,
    ) -> Result<(), ReconcileError> {
        for role in DATASET_PREREQUISITE_ROLES {
            with_group_fallback(entity, |principal| {
                self.grant_project_role(project, role, principal)
            })
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ApiError, ApiErrorKind,
        role::{BIGQUERY_JOB_USER, BIGQUERY_USER},
        store::{MockDatasetAccessStore, MockProjectPolicyStore},
        tests::FakeCloud,
    };

    #[tokio::test]
    async fn test_prerequisite_roles_are_granted_once() {
        let cloud = FakeCloud::new()
            .with_project("p1")
            .with_member("p1", BIGQUERY_USER, "user:alice@example.com");
        let reconciler = Reconciler::new(cloud.clone(), cloud.clone());

        reconciler
            .grant_prerequisite_roles("p1", "alice@example.com")
            .await
            .unwrap();
        reconciler
            .grant_prerequisite_roles("p1", "alice@example.com")
            .await
            .unwrap();

        assert_eq!(cloud.policy_writes(), 1);
        assert_eq!(
            cloud.members("p1", BIGQUERY_JOB_USER),
            vec!["user:alice@example.com".to_string()]
        );
    }

    #[tokio::test]
    async fn test_conflict_is_surfaced_without_retry() {
        let mut projects = MockProjectPolicyStore::new();
        projects
            .expect_get_policy()
            .times(1)
            .returning(|_| Ok(ProjectPolicy::default()));
        projects
            .expect_modify_binding()
            .times(1)
            .returning(|_, _, _| {
                Err(ApiError::new(
                    ApiErrorKind::Conflict,
                    "setIamPolicy",
                    "There were concurrent policy changes.",
                ))
            });
        let reconciler = Reconciler::new(projects, MockDatasetAccessStore::new());

        let err = reconciler
            .grant_project_role("p1", "roles/viewer", Principal::qualify("alice@example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Submit { .. }));
        assert_eq!(err.api_error().kind, ApiErrorKind::Conflict);
        assert!(!err.is_rejected_principal());
    }

    #[tokio::test]
    async fn test_rejected_group_is_not_retried() {
        let mut projects = MockProjectPolicyStore::new();
        projects
            .expect_get_policy()
            .times(2)
            .returning(|_| Ok(ProjectPolicy::default()));
        projects
            .expect_modify_binding()
            .times(2)
            .returning(|_, _, _| {
                Err(ApiError::new(
                    ApiErrorKind::InvalidArgument,
                    "setIamPolicy",
                    "Principal does not exist.",
                ))
            });
        let reconciler = Reconciler::new(projects, MockDatasetAccessStore::new());

        let err = with_group_fallback("nobody@example.com", |principal| {
            reconciler.grant_project_role("p1", "roles/viewer", principal)
        })
        .await
        .unwrap_err();

        assert!(err.is_rejected_principal());
    }
}
