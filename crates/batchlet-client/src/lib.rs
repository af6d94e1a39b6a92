//! Batch service client library for batchlet.
//!
//! [`BatchClient`] is the capability set the provider needs from the remote
//! pool/job/task/file service. [`RestBatchClient`] talks to the real service
//! over HTTP; [`MemoryBatchClient`] keeps everything in process and is what
//! the provider's tests run against.

pub mod error;
pub mod http;
pub mod memory;

use async_trait::async_trait;

use batchlet_core::{BatchTask, JobHandle, JobId, JobSpec, PoolHandle, PoolSpec, TaskId, TaskSpec};

pub use error::ClientError;
pub use http::RestBatchClient;
pub use memory::{MemoryBatchClient, Operation};

/// One page of a task listing.
#[derive(Debug, Clone, Default)]
pub struct TaskPage {
    /// Tasks on this page, in service listing order.
    pub tasks: Vec<BatchTask>,

    /// Continuation token for the next page; `None` on the last page.
    pub next: Option<String>,
}

/// Operations the provider performs against the batch service.
///
/// Every call is a single round trip. Implementations do not retry; a
/// failure is returned to the caller as-is. Absent resources are reported
/// as [`ClientError::NotFound`] and duplicate creations as
/// [`ClientError::Conflict`].
#[async_trait]
pub trait BatchClient: Send + Sync {
    /// Return the pool if it exists, otherwise create it from `spec`.
    async fn create_or_get_pool(&self, spec: &PoolSpec) -> Result<PoolHandle, ClientError>;

    /// Return the job if it exists, otherwise create it from `spec`.
    async fn create_or_get_job(&self, spec: &JobSpec) -> Result<JobHandle, ClientError>;

    /// Add a task to a job. Fails with `Conflict` if the id is taken.
    async fn add_task(&self, job_id: &JobId, spec: &TaskSpec) -> Result<(), ClientError>;

    /// Fetch a single task.
    async fn get_task(&self, job_id: &JobId, task_id: &TaskId) -> Result<BatchTask, ClientError>;

    /// Delete a task.
    async fn delete_task(&self, job_id: &JobId, task_id: &TaskId) -> Result<(), ClientError>;

    /// Fetch one page of the job's tasks. Pass the previous page's `next`
    /// token to continue; `None` starts from the beginning.
    async fn list_tasks(
        &self,
        job_id: &JobId,
        continuation: Option<&str>,
    ) -> Result<TaskPage, ClientError>;

    /// Read a file from the task's directory on its node, e.g. `stdout.txt`
    /// or `wd/<name>`.
    async fn read_task_file(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        path: &str,
    ) -> Result<Vec<u8>, ClientError>;
}
