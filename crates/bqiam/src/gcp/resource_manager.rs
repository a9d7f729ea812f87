use async_trait::async_trait;
use http::Method;
use serde::Serialize;

use super::GcpClient;
use crate::{
    ApiError,
    policy::{BindingChange, ProjectPolicy},
    store::ProjectPolicyStore,
};

/// Highest policy version; requesting it makes conditional bindings visible.
const REQUESTED_POLICY_VERSION: i32 = 3;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GetPolicyOptions {
    requested_policy_version: i32,
}

#[derive(Debug, Serialize)]
struct GetIamPolicyRequest {
    options: GetPolicyOptions,
}

#[derive(Debug, Serialize)]
struct SetIamPolicyRequest<'a> {
    policy: &'a ProjectPolicy,
}

#[async_trait]
impl ProjectPolicyStore for GcpClient {
    #[tracing::instrument(skip(self))]
    async fn get_policy(&self, project: &str) -> Result<ProjectPolicy, ApiError> {
        let url = self.resource_manager_url(&format!(
            "projects/{}:getIamPolicy",
            urlencoding::encode(project)
        ))?;
        let body = GetIamPolicyRequest {
            options: GetPolicyOptions {
                requested_policy_version: REQUESTED_POLICY_VERSION,
            },
        };
        self.execute("getIamPolicy", self.request(Method::POST, url).json(&body))
            .await
    }

    #[tracing::instrument(skip(self, base), fields(change = %change))]
    async fn modify_binding(
        &self,
        project: &str,
        base: &ProjectPolicy,
        change: &BindingChange,
    ) -> Result<(), ApiError> {
        let url = self.resource_manager_url(&format!(
            "projects/{}:setIamPolicy",
            urlencoding::encode(project)
        ))?;
        let mut policy = base.apply(change);
        // Conditional bindings are rejected unless the write declares version 3.
        if policy.bindings.iter().any(|b| b.condition.is_some()) {
            policy.version = REQUESTED_POLICY_VERSION;
        }
        let _: ProjectPolicy = self
            .execute(
                "setIamPolicy",
                self.request(Method::POST, url)
                    .json(&SetIamPolicyRequest { policy: &policy }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;
    use crate::{ApiErrorKind, gcp::test::client_for};

    #[tokio::test]
    async fn test_get_policy_requests_version_3() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/projects/p1:getIamPolicy")
            .match_body(Matcher::Json(
                serde_json::json!({"options": {"requestedPolicyVersion": 3}}),
            ))
            .with_status(200)
            .with_body(
                r#"{"version": 1, "etag": "BwX1", "bindings": [{"role": "roles/viewer", "members": ["user:alice@example.com"]}]}"#,
            )
            .create_async()
            .await;

        let policy = client_for(&server).get_policy("p1").await.unwrap();
        mock.assert_async().await;
        assert_eq!(policy.etag.as_deref(), Some("BwX1"));
        assert!(policy.has_member("roles/viewer", "user:alice@example.com"));
    }

    #[tokio::test]
    async fn test_modify_binding_writes_changed_policy_with_etag() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/projects/p1:setIamPolicy")
            .match_body(Matcher::Json(serde_json::json!({
                "policy": {
                    "version": 1,
                    "etag": "BwX1",
                    "bindings": [
                        {"role": "roles/viewer", "members": ["user:alice@example.com", "user:bob@example.com"]}
                    ]
                }
            })))
            .with_status(200)
            .with_body(r#"{"version": 1, "etag": "BwX2"}"#)
            .create_async()
            .await;

        let base: ProjectPolicy = serde_json::from_value(serde_json::json!({
            "version": 1,
            "etag": "BwX1",
            "bindings": [{"role": "roles/viewer", "members": ["user:alice@example.com"]}]
        }))
        .unwrap();
        client_for(&server)
            .modify_binding(
                "p1",
                &base,
                &BindingChange::add("roles/viewer", "user:bob@example.com".to_string()),
            )
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_member_is_invalid_argument() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/projects/p1:setIamPolicy")
            .with_status(400)
            .with_body(
                r#"{"error": {"code": 400, "message": "User team@example.com does not exist.", "status": "INVALID_ARGUMENT"}}"#,
            )
            .create_async()
            .await;

        let err = client_for(&server)
            .modify_binding(
                "p1",
                &ProjectPolicy::default(),
                &BindingChange::add("roles/viewer", "user:team@example.com".to_string()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::InvalidArgument);
        assert_eq!(err.operation, "setIamPolicy");
    }
}
