use async_trait::async_trait;
use http::{Method, header::IF_MATCH};
use serde::{Deserialize, Serialize};

use super::GcpClient;
use crate::{
    ApiError, ApiErrorKind,
    policy::{AccessEntry, DatasetAccess, EntityType},
    store::{DatasetAccessStore, ResourceEnumerator},
};

const PAGE_SIZE: &str = "1000";

/// Access entry as serialized by the BigQuery v2 API. Exactly one grantee field is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessEntryWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_by_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_by_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    special_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iam_member: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    view: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    routine: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dataset: Option<serde_json::Value>,
    /// `condition` and any field added to the API later. The access list is
    /// replaced wholesale on write, so these must survive the round trip.
    #[serde(flatten)]
    other: serde_json::Map<String, serde_json::Value>,
}

impl TryFrom<AccessEntryWire> for AccessEntry {
    type Error = ApiError;

    fn try_from(wire: AccessEntryWire) -> Result<Self, Self::Error> {
        let role = wire.role.unwrap_or_default();
        let (entity_type, entity) = if let Some(email) = wire.user_by_email {
            (EntityType::UserByEmail, email)
        } else if let Some(email) = wire.group_by_email {
            (EntityType::GroupByEmail, email)
        } else if let Some(domain) = wire.domain {
            (EntityType::Domain, domain)
        } else if let Some(group) = wire.special_group {
            (EntityType::SpecialGroup, group)
        } else if let Some(member) = wire.iam_member {
            (EntityType::IamMember, member)
        } else if let Some(view) = wire.view {
            (EntityType::View, view.to_string())
        } else if let Some(routine) = wire.routine {
            (EntityType::Routine, routine.to_string())
        } else if let Some(dataset) = wire.dataset {
            (EntityType::Dataset, dataset.to_string())
        } else {
            return Err(ApiError::new(
                ApiErrorKind::Other,
                "datasets.get",
                format!("access entry with role `{role}` has no grantee"),
            ));
        };
        Ok(AccessEntry {
            role,
            entity_type,
            entity,
            other: wire.other,
        })
    }
}

impl TryFrom<&AccessEntry> for AccessEntryWire {
    type Error = ApiError;

    fn try_from(entry: &AccessEntry) -> Result<Self, Self::Error> {
        let reference = || {
            serde_json::from_str::<serde_json::Value>(&entry.entity)
                .map_err(|e| ApiError::transport("datasets.patch", e))
        };
        let mut wire = AccessEntryWire {
            role: (!entry.role.is_empty()).then(|| entry.role.clone()),
            other: entry.other.clone(),
            ..Default::default()
        };
        match entry.entity_type {
            EntityType::UserByEmail => wire.user_by_email = Some(entry.entity.clone()),
            EntityType::GroupByEmail => wire.group_by_email = Some(entry.entity.clone()),
            EntityType::Domain => wire.domain = Some(entry.entity.clone()),
            EntityType::SpecialGroup => wire.special_group = Some(entry.entity.clone()),
            EntityType::IamMember => wire.iam_member = Some(entry.entity.clone()),
            EntityType::View => wire.view = Some(reference()?),
            EntityType::Routine => wire.routine = Some(reference()?),
            EntityType::Dataset => wire.dataset = Some(reference()?),
        }
        Ok(wire)
    }
}

#[derive(Debug, Deserialize)]
struct DatasetResource {
    #[serde(default)]
    access: Vec<AccessEntryWire>,
    etag: Option<String>,
}

impl TryFrom<DatasetResource> for DatasetAccess {
    type Error = ApiError;

    fn try_from(resource: DatasetResource) -> Result<Self, Self::Error> {
        Ok(DatasetAccess {
            entries: resource
                .access
                .into_iter()
                .map(AccessEntry::try_from)
                .collect::<Result<_, _>>()?,
            etag: resource.etag,
        })
    }
}

#[derive(Debug, Serialize)]
struct DatasetAccessPatch {
    access: Vec<AccessEntryWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectReference {
    project_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectListItem {
    project_reference: ProjectReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectList {
    #[serde(default)]
    projects: Vec<ProjectListItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    dataset_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetListItem {
    dataset_reference: DatasetReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetList {
    #[serde(default)]
    datasets: Vec<DatasetListItem>,
    next_page_token: Option<String>,
}

#[async_trait]
impl DatasetAccessStore for GcpClient {
    #[tracing::instrument(skip(self))]
    async fn get_access(&self, project: &str, dataset: &str) -> Result<DatasetAccess, ApiError> {
        let url = self.bigquery_url(&["projects", project, "datasets", dataset])?;
        let resource: DatasetResource = self
            .execute("datasets.get", self.request(Method::GET, url))
            .await?;
        resource.try_into()
    }

    #[tracing::instrument(skip(self, access), fields(entries = access.entries.len()))]
    async fn update_access(
        &self,
        project: &str,
        dataset: &str,
        access: &DatasetAccess,
    ) -> Result<DatasetAccess, ApiError> {
        let url = self.bigquery_url(&["projects", project, "datasets", dataset])?;
        let patch = DatasetAccessPatch {
            access: access
                .entries
                .iter()
                .map(AccessEntryWire::try_from)
                .collect::<Result<_, _>>()?,
        };
        let mut request = self.request(Method::PATCH, url).json(&patch);
        if let Some(etag) = &access.etag {
            request = request.header(IF_MATCH, etag);
        }
        let resource: DatasetResource = self.execute("datasets.patch", request).await?;
        resource.try_into()
    }
}

#[async_trait]
impl ResourceEnumerator for GcpClient {
    #[tracing::instrument(skip(self))]
    async fn list_projects(&self) -> Result<Vec<String>, ApiError> {
        let url = self.bigquery_url(&["projects"])?;
        let mut projects = vec![];
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .request(Method::GET, url.clone())
                .query(&[("maxResults", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let page: ProjectList = self.execute("projects.list", request).await?;
            projects.extend(
                page.projects
                    .into_iter()
                    .map(|p| p.project_reference.project_id),
            );
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        tracing::debug!("Listed {} projects", projects.len());
        Ok(projects)
    }

    #[tracing::instrument(skip(self))]
    async fn list_datasets(&self, project: &str) -> Result<Vec<String>, ApiError> {
        let url = self.bigquery_url(&["projects", project, "datasets"])?;
        let mut datasets = vec![];
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .request(Method::GET, url.clone())
                .query(&[("maxResults", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let page: DatasetList = self.execute("datasets.list", request).await?;
            datasets.extend(
                page.datasets
                    .into_iter()
                    .map(|d| d.dataset_reference.dataset_id),
            );
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(datasets)
    }
}
