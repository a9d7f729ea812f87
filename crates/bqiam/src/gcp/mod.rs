//! Native REST clients for the Cloud Resource Manager and BigQuery APIs.

use std::sync::{Arc, LazyLock};

use google_cloud_auth::{project::Config as AuthConfig, token::DefaultTokenSourceProvider};
use google_cloud_token::{TokenSource, TokenSourceProvider as _};
use http::{StatusCode, header::AUTHORIZATION};
use serde::{Deserialize, de::DeserializeOwned};
use url::Url;

use crate::{ApiError, ApiErrorKind};

mod bigquery;
mod resource_manager;

const SCOPES: [&str; 1] = ["https://www.googleapis.com/auth/cloud-platform"];

static BIGQUERY_ENDPOINT: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://bigquery.googleapis.com/bigquery/v2/")
        .expect("BigQuery endpoint is a valid URL")
});
static RESOURCE_MANAGER_ENDPOINT: LazyLock<Url> = LazyLock::new(|| {
    Url::parse("https://cloudresourcemanager.googleapis.com/v1/")
        .expect("Resource Manager endpoint is a valid URL")
});

/// Base URLs of the APIs. Both must end with a slash.
#[derive(Debug, Clone, PartialEq, Eq, typed_builder::TypedBuilder)]
pub struct Endpoints {
    #[builder(default = BIGQUERY_ENDPOINT.clone())]
    pub bigquery: Url,
    #[builder(default = RESOURCE_MANAGER_ENDPOINT.clone())]
    pub resource_manager: Url,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Client for project IAM policies, dataset access lists and enumeration.
///
/// Cheap to clone; clones share the HTTP connection pool and token source.
#[derive(Debug, Clone)]
pub struct GcpClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    endpoints: Endpoints,
}

impl GcpClient {
    #[must_use]
    pub fn new(http: reqwest::Client, tokens: Arc<dyn TokenSource>, endpoints: Endpoints) -> Self {
        Self {
            http,
            tokens,
            endpoints,
        }
    }

    /// Build a client from application default credentials.
    pub async fn from_default_credentials() -> Result<Self, ApiError> {
        let provider =
            DefaultTokenSourceProvider::new(AuthConfig::default().with_scopes(&SCOPES))
                .await
                .map_err(|e| ApiError::transport("load application default credentials", e))?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("bqiam/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::transport("build HTTP client", e))?;
        tracing::debug!("Created GCP client from application default credentials");
        Ok(Self::new(http, provider.token_source(), Endpoints::default()))
    }

    pub(crate) fn bigquery_url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        join_segments(&self.endpoints.bigquery, segments)
    }

    pub(crate) fn resource_manager_url(&self, path: &str) -> Result<Url, ApiError> {
        self.endpoints
            .resource_manager
            .join(path)
            .map_err(|e| ApiError::transport("build Resource Manager URL", e))
    }

    pub(crate) fn request(&self, method: http::Method, url: Url) -> reqwest::RequestBuilder {
        self.http.request(method, url)
    }

    /// Authorize and send `request`, decoding a JSON body on success and a Google
    /// error payload otherwise.
    pub(crate) async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let token = self
            .tokens
            .token()
            .await
            .map_err(|e| ApiError::unauthenticated(operation, e))?;
        let authorization = if token.starts_with("Bearer ") {
            token
        } else {
            format!("Bearer {token}")
        };

        let response = request
            .header(AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| ApiError::transport(operation, e))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ApiError::transport(operation, e));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::transport(operation, e))?;
        let err = decode_error(operation, status, &body);
        tracing::debug!(%status, kind = %err.kind, "{operation} failed: {}", err.message);
        Err(err)
    }
}

fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, ApiError> {
    let path = segments
        .iter()
        .map(|s| urlencoding::encode(s))
        .collect::<Vec<_>>()
        .join("/");
    base.join(&path)
        .map_err(|e| ApiError::transport("build BigQuery URL", e))
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

fn decode_error(operation: &str, status: StatusCode, body: &str) -> ApiError {
    match serde_json::from_str::<GoogleErrorResponse>(body) {
        Ok(GoogleErrorResponse { error }) => ApiError::new(
            ApiErrorKind::classify(error.status.as_deref(), status),
            operation,
            error.message,
        ),
        Err(_) => ApiError::new(
            ApiErrorKind::classify(None, status),
            operation,
            format!("HTTP {status}: {}", body.trim()),
        ),
    }
}
