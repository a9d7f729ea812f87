//! In-memory stand-in for the project policy, dataset access and enumeration APIs.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    ApiError, ApiErrorKind,
    policy::{AccessEntry, Binding, BindingChange, DatasetAccess, EntityType, ProjectPolicy},
    principal::{EntityKind, parse_member},
    store::{DatasetAccessStore, ProjectPolicyStore, ResourceEnumerator},
};

#[derive(Debug, Default)]
struct State {
    projects: Vec<String>,
    policies: HashMap<String, ProjectPolicy>,
    datasets: HashMap<String, Vec<String>>,
    access: HashMap<(String, String), DatasetAccess>,
    groups: HashSet<String>,
    failing_datasets: HashSet<(String, String)>,
    failing_listings: HashSet<String>,
    slow_datasets: HashMap<(String, String), Duration>,
    stale_after_read: HashSet<(String, String)>,
    etag_counter: u64,
    policy_writes: usize,
    access_writes: usize,
    access_reads: usize,
    rejected_writes: usize,
}

impl State {
    fn next_etag(&mut self) -> String {
        self.etag_counter += 1;
        format!("etag-{}", self.etag_counter)
    }
}

/// Fake cloud whose clones share state.
///
/// Writes with a stale etag fail with [`ApiErrorKind::Conflict`]. Entities
/// registered with [`FakeCloud::with_group`] are rejected with
/// [`ApiErrorKind::InvalidArgument`] unless bound as a group.
#[derive(Debug, Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<State>>,
}

fn key(project: &str, dataset: &str) -> (String, String) {
    (project.to_string(), dataset.to_string())
}

#[allow(clippy::missing_panics_doc)]
impl FakeCloud {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn ensure_project(state: &mut State, project: &str) {
        if !state.projects.iter().any(|p| p == project) {
            state.projects.push(project.to_string());
        }
        if !state.policies.contains_key(project) {
            let etag = state.next_etag();
            state.policies.insert(
                project.to_string(),
                ProjectPolicy {
                    etag: Some(etag),
                    version: 1,
                    ..Default::default()
                },
            );
        }
    }

    #[must_use]
    pub fn with_project(self, project: &str) -> Self {
        Self::ensure_project(&mut self.state(), project);
        self
    }

    #[must_use]
    pub fn with_member(self, project: &str, role: &str, member: &str) -> Self {
        {
            let mut state = self.state();
            Self::ensure_project(&mut state, project);
            if let Some(policy) = state.policies.get_mut(project) {
                *policy = policy.apply(&BindingChange::add(role, member.to_string()));
            }
        }
        self
    }

    #[must_use]
    pub fn with_group(self, email: &str) -> Self {
        self.state().groups.insert(email.to_string());
        self
    }

    #[must_use]
    pub fn with_dataset(self, project: &str, dataset: &str, entries: Vec<AccessEntry>) -> Self {
        {
            let mut state = self.state();
            Self::ensure_project(&mut state, project);
            state
                .datasets
                .entry(project.to_string())
                .or_default()
                .push(dataset.to_string());
            let etag = state.next_etag();
            state.access.insert(
                key(project, dataset),
                DatasetAccess {
                    entries,
                    etag: Some(etag),
                },
            );
        }
        self
    }

    /// Reads of this dataset fail with a permission error.
    #[must_use]
    pub fn failing_dataset(self, project: &str, dataset: &str) -> Self {
        self.state().failing_datasets.insert(key(project, dataset));
        self
    }

    /// Listing the datasets of this project fails.
    #[must_use]
    pub fn failing_listing(self, project: &str) -> Self {
        self.state().failing_listings.insert(project.to_string());
        self
    }

    /// Reads of this dataset take `delay` before answering.
    #[must_use]
    pub fn slow_dataset(self, project: &str, dataset: &str, delay: Duration) -> Self {
        self.state().slow_datasets.insert(key(project, dataset), delay);
        self
    }

    /// The next read of this dataset is followed by a concurrent write.
    pub fn bump_etag_after_read(&self, project: &str, dataset: &str) {
        self.state().stale_after_read.insert(key(project, dataset));
    }

    #[must_use]
    pub fn policy(&self, project: &str) -> ProjectPolicy {
        self.state().policies.get(project).cloned().unwrap_or_default()
    }

    /// Members of the unconditional binding of `role`.
    #[must_use]
    pub fn members(&self, project: &str, role: &str) -> Vec<String> {
        self.policy(project)
            .bindings
            .into_iter()
            .filter(|b| b.role == role && b.condition.is_none())
            .flat_map(|b: Binding| b.members)
            .collect()
    }

    #[must_use]
    pub fn access(&self, project: &str, dataset: &str) -> DatasetAccess {
        self.state()
            .access
            .get(&key(project, dataset))
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn policy_writes(&self) -> usize {
        self.state().policy_writes
    }

    #[must_use]
    pub fn access_writes(&self) -> usize {
        self.state().access_writes
    }

    /// Dataset reads that completed.
    #[must_use]
    pub fn access_reads(&self) -> usize {
        self.state().access_reads
    }

    /// Writes rejected because a group was bound as a user or service account.
    #[must_use]
    pub fn rejected_writes(&self) -> usize {
        self.state().rejected_writes
    }
}

fn rejected(operation: &str, email: &str) -> ApiError {
    ApiError::new(
        ApiErrorKind::InvalidArgument,
        operation,
        format!("User {email} does not exist."),
    )
}

fn conflict(operation: &str) -> ApiError {
    ApiError::new(
        ApiErrorKind::Conflict,
        operation,
        "Precondition check failed.",
    )
}

#[async_trait]
impl ProjectPolicyStore for FakeCloud {
    async fn get_policy(&self, project: &str) -> Result<ProjectPolicy, ApiError> {
        self.state().policies.get(project).cloned().ok_or_else(|| {
            ApiError::new(
                ApiErrorKind::NotFound,
                "getIamPolicy",
                format!("Project {project} not found."),
            )
        })
    }

    async fn modify_binding(
        &self,
        project: &str,
        base: &ProjectPolicy,
        change: &BindingChange,
    ) -> Result<(), ApiError> {
        let mut state = self.state();
        if let Some((kind, email)) = parse_member(&change.member) {
            if kind != EntityKind::Group && state.groups.contains(email) {
                state.rejected_writes += 1;
                return Err(rejected("setIamPolicy", email));
            }
        }
        let current = state.policies.get(project).and_then(|p| p.etag.clone());
        if current != base.etag {
            return Err(conflict("setIamPolicy"));
        }
        let mut updated = base.apply(change);
        updated.etag = Some(state.next_etag());
        state.policies.insert(project.to_string(), updated);
        state.policy_writes += 1;
        Ok(())
    }
}

#[async_trait]
impl DatasetAccessStore for FakeCloud {
    async fn get_access(&self, project: &str, dataset: &str) -> Result<DatasetAccess, ApiError> {
        let delay = self.state().slow_datasets.get(&key(project, dataset)).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.failing_datasets.contains(&key(project, dataset)) {
            return Err(ApiError::new(
                ApiErrorKind::PermissionDenied,
                "datasets.get",
                format!("Access Denied: Dataset {project}:{dataset}"),
            ));
        }
        let access = state.access.get(&key(project, dataset)).cloned().ok_or_else(|| {
            ApiError::new(
                ApiErrorKind::NotFound,
                "datasets.get",
                format!("Not found: Dataset {project}:{dataset}"),
            )
        })?;
        state.access_reads += 1;

        if state.stale_after_read.remove(&key(project, dataset)) {
            let etag = state.next_etag();
            if let Some(stored) = state.access.get_mut(&key(project, dataset)) {
                stored.etag = Some(etag);
            }
        }
        Ok(access)
    }

    async fn update_access(
        &self,
        project: &str,
        dataset: &str,
        access: &DatasetAccess,
    ) -> Result<DatasetAccess, ApiError> {
        let mut state = self.state();
        let rejected_entity = access
            .entries
            .iter()
            .find(|e| e.entity_type == EntityType::UserByEmail && state.groups.contains(&e.entity))
            .map(|e| e.entity.clone());
        if let Some(email) = rejected_entity {
            state.rejected_writes += 1;
            return Err(rejected("datasets.patch", &email));
        }

        let current = state
            .access
            .get(&key(project, dataset))
            .and_then(|a| a.etag.clone());
        if current != access.etag {
            return Err(conflict("datasets.patch"));
        }
        let updated = DatasetAccess {
            entries: access.entries.clone(),
            etag: Some(state.next_etag()),
        };
        state.access.insert(key(project, dataset), updated.clone());
        state.access_writes += 1;
        Ok(updated)
    }
}

#[async_trait]
impl ResourceEnumerator for FakeCloud {
    async fn list_projects(&self) -> Result<Vec<String>, ApiError> {
        Ok(self.state().projects.clone())
    }

    async fn list_datasets(&self, project: &str) -> Result<Vec<String>, ApiError> {
        let state = self.state();
        if state.failing_listings.contains(project) {
            return Err(ApiError::new(
                ApiErrorKind::PermissionDenied,
                "datasets.list",
                format!("Access Denied: Project {project}"),
            ));
        }
        Ok(state.datasets.get(project).cloned().unwrap_or_default())
    }
}
