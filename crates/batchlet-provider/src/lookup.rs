//! Task lookup and enumeration.

use std::sync::Arc;

use tracing::debug;

use batchlet_client::{BatchClient, ClientError};
use batchlet_core::{BatchTask, JobId, TaskId};

use crate::error::ProviderError;

/// Reads tasks of the configured job.
pub struct TaskLookup {
    client: Arc<dyn BatchClient>,
    job_id: JobId,
}

impl TaskLookup {
    /// Create a new TaskLookup.
    pub fn new(client: Arc<dyn BatchClient>, job_id: JobId) -> Self {
        Self { client, job_id }
    }

    /// Fetch a task by id. An absent task is `Ok(None)`, not an error.
    pub async fn get_by_id(&self, task_id: &TaskId) -> Result<Option<BatchTask>, ClientError> {
        match self.client.get_task(&self.job_id, task_id).await {
            Ok(task) => Ok(Some(task)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch every task in the job, following continuation tokens until the
    /// last page.
    ///
    /// Tasks come back in service listing order. A failure on any page fails
    /// the whole call; a partial listing is never returned.
    pub async fn list_all(&self) -> Result<Vec<BatchTask>, ProviderError> {
        let mut tasks = Vec::new();
        let mut continuation: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .client
                .list_tasks(&self.job_id, continuation.as_deref())
                .await
                .map_err(|source| ProviderError::List {
                    job_id: self.job_id.clone(),
                    source,
                })?;

            pages += 1;
            tasks.extend(page.tasks);

            match page.next {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        debug!(job_id = %self.job_id, pages, tasks = tasks.len(), "Listed tasks");
        Ok(tasks)
    }
}
