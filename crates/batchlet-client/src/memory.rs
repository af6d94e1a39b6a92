//! In-process batch service.
//!
//! Behaves like the remote service as far as the provider can observe:
//! create-or-get semantics for pools and jobs, `Conflict` on duplicate task
//! ids, `NotFound` for absent tasks and files, and paginated listings in
//! insertion order. Tests drive task state transitions and node-side files
//! through the helper methods, and can make chosen operations fail.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use batchlet_core::{
    BatchTask, ExecutionInfo, JobHandle, JobId, JobSpec, PoolHandle, PoolId, PoolSpec, TaskId,
    TaskSpec, TaskState,
};

use crate::error::ClientError;
use crate::{BatchClient, TaskPage};

/// Default number of tasks returned per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Service operations, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateOrGetPool,
    CreateOrGetJob,
    AddTask,
    GetTask,
    DeleteTask,
    ListTasks,
    ReadTaskFile,
}

/// A pending injected failure.
#[derive(Debug)]
struct InjectedFailure {
    operation: Operation,
    /// Calls of `operation` that still succeed before this one fails.
    skip: usize,
}

#[derive(Debug, Default)]
struct JobEntry {
    spec: Option<JobSpec>,
    tasks: Vec<BatchTask>,
    files: HashMap<(TaskId, String), Vec<u8>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    pools: HashMap<PoolId, PoolSpec>,
    jobs: HashMap<JobId, JobEntry>,
    failures: Vec<InjectedFailure>,
    calls: HashMap<Operation, usize>,
}

impl MemoryState {
    /// Record a call and decide whether it should fail.
    fn enter(&mut self, operation: Operation) -> Result<(), ClientError> {
        *self.calls.entry(operation).or_default() += 1;

        let Some(pos) = self.failures.iter().position(|f| f.operation == operation) else {
            return Ok(());
        };

        if self.failures[pos].skip > 0 {
            self.failures[pos].skip -= 1;
            return Ok(());
        }

        self.failures.remove(pos);
        debug!(?operation, "Injected failure");
        Err(ClientError::Api {
            status: 503,
            code: "ServerBusy".to_string(),
            message: format!("injected failure for {operation:?}"),
        })
    }

    fn job(&self, job_id: &JobId) -> Result<&JobEntry, ClientError> {
        self.jobs
            .get(job_id)
            .filter(|j| j.spec.is_some())
            .ok_or_else(|| ClientError::not_found(format!("job {}", job_id)))
    }

    fn job_mut(&mut self, job_id: &JobId) -> Result<&mut JobEntry, ClientError> {
        self.jobs
            .get_mut(job_id)
            .filter(|j| j.spec.is_some())
            .ok_or_else(|| ClientError::not_found(format!("job {}", job_id)))
    }

    fn task_mut(&mut self, job_id: &JobId, task_id: &TaskId) -> Result<&mut BatchTask, ClientError> {
        self.job_mut(job_id)?
            .tasks
            .iter_mut()
            .find(|t| &t.id == task_id)
            .ok_or_else(|| ClientError::not_found(format!("task {} in job {}", task_id, job_id)))
    }
}

/// In-memory [`BatchClient`].
pub struct MemoryBatchClient {
    state: Mutex<MemoryState>,
    page_size: usize,
}

impl MemoryBatchClient {
    /// Create an empty service.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Builder method to set the listing page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make a later call of `operation` fail with a transient service error.
    ///
    /// The first `skip` calls of that operation still succeed; the one after
    /// fails, and the failure is then consumed.
    pub async fn fail_after(&self, operation: Operation, skip: usize) {
        self.state
            .lock()
            .await
            .failures
            .push(InjectedFailure { operation, skip });
    }

    /// Make the next call of `operation` fail.
    pub async fn fail_next(&self, operation: Operation) {
        self.fail_after(operation, 0).await;
    }

    /// Number of times `operation` has been called.
    pub async fn call_count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .await
            .calls
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    /// Number of tasks currently in a job.
    pub async fn task_count(&self, job_id: &JobId) -> usize {
        self.state
            .lock()
            .await
            .jobs
            .get(job_id)
            .map(|j| j.tasks.len())
            .unwrap_or(0)
    }

    /// Insert a task as-is, bypassing `add_task`. Creates the job if needed.
    pub async fn insert_task(&self, job_id: &JobId, task: BatchTask) {
        let mut state = self.state.lock().await;
        let job = state.jobs.entry(job_id.clone()).or_default();
        if job.spec.is_none() {
            job.spec = Some(JobSpec::new(job_id.clone(), PoolId::new("unknown")));
        }
        job.tasks.push(task);
    }

    /// Move a task to `Preparing`.
    pub async fn prepare_task(&self, job_id: &JobId, task_id: &TaskId) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        let task = state.task_mut(job_id, task_id)?;
        task.state = TaskState::Preparing;
        task.state_transition_time = Some(Utc::now());
        Ok(())
    }

    /// Move a task to `Running`, recording its start time.
    pub async fn start_task(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        started_at: DateTime<Utc>,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        let task = state.task_mut(job_id, task_id)?;
        task.state = TaskState::Running;
        task.state_transition_time = Some(started_at);
        task.execution_info = Some(ExecutionInfo {
            start_time: Some(started_at),
            ..Default::default()
        });
        Ok(())
    }

    /// Move a task to `Completed` with the given exit code.
    pub async fn complete_task(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        exit_code: i32,
        finished_at: DateTime<Utc>,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        let task = state.task_mut(job_id, task_id)?;
        task.state = TaskState::Completed;
        task.state_transition_time = Some(finished_at);
        let info = task.execution_info.get_or_insert_with(ExecutionInfo::default);
        info.end_time = Some(finished_at);
        info.exit_code = Some(exit_code);
        Ok(())
    }

    /// Place a file in a task's directory, as the node would.
    pub async fn put_task_file(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        path: &str,
        content: impl Into<Vec<u8>>,
    ) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        state.task_mut(job_id, task_id)?;
        state
            .job_mut(job_id)?
            .files
            .insert((task_id.clone(), path.to_string()), content.into());
        Ok(())
    }
}

impl Default for MemoryBatchClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BatchClient for MemoryBatchClient {
    async fn create_or_get_pool(&self, spec: &PoolSpec) -> Result<PoolHandle, ClientError> {
        let mut state = self.state.lock().await;
        state.enter(Operation::CreateOrGetPool)?;

        let created = !state.pools.contains_key(&spec.id);
        if created {
            state.pools.insert(spec.id.clone(), spec.clone());
        }

        Ok(PoolHandle {
            id: spec.id.clone(),
            created,
        })
    }

    async fn create_or_get_job(&self, spec: &JobSpec) -> Result<JobHandle, ClientError> {
        let mut state = self.state.lock().await;
        state.enter(Operation::CreateOrGetJob)?;

        let entry = state.jobs.entry(spec.id.clone()).or_default();
        let created = entry.spec.is_none();
        let existing = entry.spec.get_or_insert_with(|| spec.clone());

        Ok(JobHandle {
            id: existing.id.clone(),
            pool_info: existing.pool_info.clone(),
            created,
        })
    }

    async fn add_task(&self, job_id: &JobId, spec: &TaskSpec) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        state.enter(Operation::AddTask)?;

        let job = state.job_mut(job_id)?;
        if job.tasks.iter().any(|t| t.id == spec.id) {
            return Err(ClientError::conflict(format!(
                "task {} in job {}",
                spec.id, job_id
            )));
        }

        job.tasks.push(BatchTask::from_spec(spec.clone(), Utc::now()));
        Ok(())
    }

    async fn get_task(&self, job_id: &JobId, task_id: &TaskId) -> Result<BatchTask, ClientError> {
        let mut state = self.state.lock().await;
        state.enter(Operation::GetTask)?;

        state
            .job(job_id)?
            .tasks
            .iter()
            .find(|t| &t.id == task_id)
            .cloned()
            .ok_or_else(|| ClientError::not_found(format!("task {} in job {}", task_id, job_id)))
    }

    async fn delete_task(&self, job_id: &JobId, task_id: &TaskId) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        state.enter(Operation::DeleteTask)?;

        let job = state.job_mut(job_id)?;
        let pos = job
            .tasks
            .iter()
            .position(|t| &t.id == task_id)
            .ok_or_else(|| ClientError::not_found(format!("task {} in job {}", task_id, job_id)))?;

        job.tasks.remove(pos);
        job.files.retain(|(owner, _), _| owner != task_id);
        Ok(())
    }

    async fn list_tasks(
        &self,
        job_id: &JobId,
        continuation: Option<&str>,
    ) -> Result<TaskPage, ClientError> {
        let mut state = self.state.lock().await;
        state.enter(Operation::ListTasks)?;

        let start = match continuation {
            Some(token) => token.parse::<usize>().map_err(|_| ClientError::Api {
                status: 400,
                code: "InvalidContinuationToken".to_string(),
                message: format!("bad continuation token: {token}"),
            })?,
            None => 0,
        };

        let tasks = &state.job(job_id)?.tasks;
        let end = (start + self.page_size).min(tasks.len());
        let page = tasks.get(start..end).map(<[BatchTask]>::to_vec).unwrap_or_default();
        let next = (end < tasks.len()).then(|| end.to_string());

        Ok(TaskPage { tasks: page, next })
    }

    async fn read_task_file(
        &self,
        job_id: &JobId,
        task_id: &TaskId,
        path: &str,
    ) -> Result<Vec<u8>, ClientError> {
        let mut state = self.state.lock().await;
        state.enter(Operation::ReadTaskFile)?;

        let job = state.job(job_id)?;
        if !job.tasks.iter().any(|t| &t.id == task_id) {
            return Err(ClientError::not_found(format!(
                "task {} in job {}",
                task_id, job_id
            )));
        }

        job.files
            .get(&(task_id.clone(), path.to_string()))
            .cloned()
            .ok_or_else(|| {
                ClientError::not_found(format!("file {} of task {} in job {}", path, task_id, job_id))
            })
    }
}
