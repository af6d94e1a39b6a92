//! HTTP client for the batch service REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use batchlet_core::{BatchTask, JobHandle, JobId, JobSpec, PoolHandle, PoolSpec, TaskId, TaskSpec};

use crate::error::ClientError;
use crate::{BatchClient, TaskPage};

/// REST API version sent with every request.
pub const DEFAULT_API_VERSION: &str = "2024-07-01.20.0";

/// Content type the service expects on request bodies.
const ODATA_JSON: &str = "application/json; odata=minimalmetadata";

/// Error body returned by the service.
#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: Option<ServiceErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorMessage {
    #[serde(default)]
    value: String,
}

/// Body of a task listing response.
#[derive(Debug, Deserialize)]
struct TaskListResponse {
    #[serde(default)]
    value: Vec<BatchTask>,
    #[serde(rename = "odata.nextLink", default)]
    next_link: Option<String>,
}

/// HTTP client for the batch service data plane.
///
/// Authentication uses a bearer token obtained by the caller; acquiring
/// and refreshing it is outside this client.
pub struct RestBatchClient {
    inner: reqwest::Client,
    base_url: String,
    access_token: String,
    api_version: String,
}

impl RestBatchClient {
    /// Create a new client for an account endpoint such as
    /// `https://myaccount.westeurope.batch.azure.com`.
    ///
    /// `timeout` bounds each individual request; `None` leaves requests
    /// unbounded so the caller's own deadline governs them.
    pub fn new(
        base_url: &str,
        access_token: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            inner: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
        })
    }

    /// Builder method to pin a different REST API version.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}?api-version={}", self.base_url, path, self.api_version)
    }

    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Response, ClientError> {
        let response = request.bearer_auth(&self.access_token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        Err(classify_failure(status, &body, resource))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, resource: &str) -> Result<T, ClientError> {
        debug!(url = %url, "GET request");
        let response = self.send(self.inner.get(url), resource).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()))
    }

    async fn post_json<T: Serialize>(&self, path: &str, body: &T, resource: &str) -> Result<(), ClientError> {
        let url = self.url(path);
        debug!(url = %url, "POST request");
        let body = serde_json::to_vec(body).map_err(|e| ClientError::Serialization(e.to_string()))?;
        let request = self
            .inner
            .post(&url)
            .header(CONTENT_TYPE, ODATA_JSON)
            .body(body);
        self.send(request, resource).await?;
        Ok(())
    }
}

/// Map a non-success response to a client error.
fn classify_failure(status: StatusCode, body: &[u8], resource: &str) -> ClientError {
    match status {
        StatusCode::NOT_FOUND => ClientError::not_found(resource),
        StatusCode::CONFLICT => ClientError::conflict(resource),
        _ => {
            let (code, message) = match serde_json::from_slice::<ServiceError>(body) {
                Ok(err) => (
                    err.code,
                    err.message.map(|m| m.value).unwrap_or_default(),
                ),
                Err(_) => (
                    status.canonical_reason().unwrap_or("Unknown").to_string(),
                    String::from_utf8_lossy(body).into_owned(),
                ),
            };
            ClientError::Api {
                status: status.as_u16(),
                code,
                message,
            }
        }
    }
}

#[async_trait]
impl BatchClient for RestBatchClient {
    async fn create_or_get_pool(&self, spec: &PoolSpec) -> Result<PoolHandle, ClientError> {
        let resource = format!("pool {}", spec.id);
        let url = self.url(&format!("/pools/{}", spec.id));

        match self.get_json::<PoolHandle>(&url, &resource).await {
            Ok(pool) => return Ok(pool),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        match self.post_json("/pools", spec, &resource).await {
            Ok(()) => Ok(PoolHandle {
                id: spec.id.clone(),
                created: true,
            }),
            // Someone else created it between our GET and POST.
            Err(e) if e.is_conflict() => self.get_json(&url, &resource).await,
            Err(e) => Err(e),
        }
    }

    async fn create_or_get_job(&self, spec: &JobSpec) -> Result<JobHandle, ClientError> {
        let resource = format!("job {}", spec.id);
        let url = self.url(&format!("/jobs/{}", spec.id));

        match self.get_json::<JobHandle>(&url, &resource).await {
            Ok(job) => return Ok(job),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        match self.post_json("/jobs", spec, &resource).await {
            Ok(()) => Ok(JobHandle {
                id: spec.id.clone(),
                pool_info: spec.pool_info.clone(),
                created: true,
            }),
            Err(e) if e.is_conflict() => self.get_json(&url, &resource).await,
            Err(e) => Err(e),
        }
    }

    async fn add_task(&self, job_id: &JobId, spec: &TaskSpec) -> Result<(), ClientError> {
        let resource = format!("task {} in job {}", spec.id, job_id);
        self.post_json(&format!("/jobs/{}/tasks", job_id), spec, &resource)
            .await
    }

    async fn get_task(&self, job_id: &JobId, task_id: &TaskId) -> Result<BatchTask, ClientError> {
        let resource = format!("task {} in job {}", task_id, job_id);
        let url = self.url(&format!("/jobs/{}/tasks/{}", job_id, task_id));
        self.get_json(&url, &resource).await
    }

    async fn delete_task(&self, job_id: &JobId, task_id: &TaskId) -> Result<(), ClientError> {
        let resource = format!("task {} in job {}", task_id, job_id);
        let url = self.url(&format!("/jobs/{}/tasks/{}", job_id, task_id));
        debug!(url = %url, "DELETE request");
        self.send(self.inner.delete(&url), &resource).await?;
        Ok(())
    }

    async fn list_tasks(
        &self,
        job_id: &JobId,
        continuation: Option<&str>,
    ) -> Result<TaskPage, ClientError> {
        let resource = format!("tasks of job {}", job_id);
        // The continuation is the service's absolute next link.
        let url = match continuation {
            Some(next_link) => next_link.to_string(),
            None => self.url(&format!("/jobs/{}/tasks", job_id)),
        };

        let page: TaskListResponse = self.get_json(&url, &resource).await?;
        Ok(TaskPage {
            tasks: page.value,
            next: page.next_link.filter(|link| !link.is_empty()),
        })
    }

    async fn read_task_file(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        path: &str,
    ) -> Result<Vec<u8>, ClientError> {
        let resource = format!("file {} of task {} in job {}", path, task_id, job_id);
        let url = self.url(&format!(
            "/jobs/{}/tasks/{}/files/{}",
            job_id,
            task_id,
            path.trim_start_matches('/')
        ));
        debug!(url = %url, "GET file");

        let response = self.send(self.inner.get(&url), &resource).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
