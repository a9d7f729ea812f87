use std::fmt::Write as _;

use itertools::Itertools as _;
use typed_builder::TypedBuilder;

use crate::{
    role::{DatasetRole, ProjectRole},
    store::{DatasetAccessStore, ProjectPolicyStore},
};

use super::{AccessGrant, BatchError, Confirm, Intent, Reconciled, Reconciler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The operator declined; nothing was read or written.
    Aborted,
    Completed(Vec<Reconciled>),
}

/// Users by datasets of one project, all with the same role.
#[derive(Debug, Clone, TypedBuilder)]
pub struct DatasetBatch {
    #[builder(setter(into))]
    pub project: String,
    pub role: DatasetRole,
    pub datasets: Vec<String>,
    pub users: Vec<String>,
}

impl DatasetBatch {
    #[must_use]
    pub fn summary(&self, intent: Intent) -> String {
        let verb = match intent {
            Intent::Grant => "PERMIT",
            Intent::Revoke => "REVOKE",
        };
        let mut summary = String::new();
        let _ = writeln!(summary, "{verb} following roles");
        let _ = writeln!(summary, "project_id: {}", self.project);
        let _ = writeln!(summary, "role:       {}", self.role);
        let _ = writeln!(summary, "datasets:   [{}]", self.datasets.join(" "));
        let _ = writeln!(summary, "users:      [{}]", self.users.join(" "));
        summary
    }

    fn grants(&self) -> impl Iterator<Item = AccessGrant> + '_ {
        self.datasets
            .iter()
            .cartesian_product(self.users.iter())
            .map(|(dataset, user)| {
                AccessGrant::dataset(&self.project, dataset, self.role.as_ref(), user)
            })
    }
}

/// Users of one project, all with the same project-wide role.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ProjectBatch {
    #[builder(setter(into))]
    pub project: String,
    pub role: ProjectRole,
    pub users: Vec<String>,
}

impl ProjectBatch {
    #[must_use]
    pub fn summary(&self, intent: Intent) -> String {
        let effect = match intent {
            Intent::Grant => "added",
            Intent::Revoke => "removed",
        };
        let mut summary = String::new();
        let _ = writeln!(summary, "project_id: {}", self.project);
        let _ = writeln!(
            summary,
            "role:       {} ({})",
            self.role,
            self.role.iam_role()
        );
        let _ = writeln!(summary, "users:      [{}]", self.users.join(" "));
        let _ = writeln!(
            summary,
            "If you proceed, PROJECT-WIDE permission will be {effect}."
        );
        summary
    }

    fn grants(&self) -> impl Iterator<Item = AccessGrant> + '_ {
        self.users
            .iter()
            .map(|user| AccessGrant::project(&self.project, self.role.iam_role(), user))
    }
}

impl<P, D> Reconciler<P, D>
where
    P: ProjectPolicyStore,
    D: DatasetAccessStore,
{
    /// Grant `batch.role` on every dataset to every user, after making sure each
    /// user can run jobs in the project.
    pub async fn permit_datasets(
        &self,
        batch: &DatasetBatch,
        confirm: &mut dyn Confirm,
    ) -> Result<BatchOutcome, BatchError> {
        if !confirm.confirm(&batch.summary(Intent::Grant)) {
            return Ok(BatchOutcome::Aborted);
        }

        for user in batch.users.iter().unique() {
            self.grant_prerequisite_roles(&batch.project, user)
                .await
                .map_err(|source| BatchError {
                    applied: vec![],
                    source,
                })?;
        }

        self.run(Intent::Grant, batch.grants()).await
    }

    pub async fn revoke_datasets(
        &self,
        batch: &DatasetBatch,
        confirm: &mut dyn Confirm,
    ) -> Result<BatchOutcome, BatchError> {
        if !confirm.confirm(&batch.summary(Intent::Revoke)) {
            return Ok(BatchOutcome::Aborted);
        }
        self.run(Intent::Revoke, batch.grants()).await
    }

    pub async fn permit_project(
        &self,
        batch: &ProjectBatch,
        confirm: &mut dyn Confirm,
    ) -> Result<BatchOutcome, BatchError> {
        if !confirm.confirm(&batch.summary(Intent::Grant)) {
            return Ok(BatchOutcome::Aborted);
        }
        self.run(Intent::Grant, batch.grants()).await
    }

    pub async fn revoke_project(
        &self,
        batch: &ProjectBatch,
        confirm: &mut dyn Confirm,
    ) -> Result<BatchOutcome, BatchError> {
        if !confirm.confirm(&batch.summary(Intent::Revoke)) {
            return Ok(BatchOutcome::Aborted);
        }
        self.run(Intent::Revoke, batch.grants()).await
    }

    /// Reconcile `grants` in order, stopping at the first failure.
    async fn run(
        &self,
        intent: Intent,
        grants: impl Iterator<Item = AccessGrant>,
    ) -> Result<BatchOutcome, BatchError> {
        let mut applied = vec![];
        for grant in grants {
            match self.reconcile(intent, &grant).await {
                Ok(outcome) => applied.push(Reconciled {
                    intent,
                    grant,
                    outcome,
                }),
                Err(source) => return Err(BatchError { applied, source }),
            }
        }
        Ok(BatchOutcome::Completed(applied))
    }
}
