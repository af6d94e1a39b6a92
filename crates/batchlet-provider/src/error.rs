//! Provider errors.

use thiserror::Error;

use batchlet_client::ClientError;
use batchlet_core::{CoreError, JobId, TaskId};

use crate::command::CommandError;
use crate::pod::PodKey;

/// Errors surfaced by provider operations.
///
/// Every variant that concerns a single pod carries the pod key and the
/// operation, so a failure can be traced back without extra logging.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The task (or the requested file of the task) does not exist.
    #[error("{operation} {pod}: not found ({source})")]
    NotFound {
        operation: &'static str,
        pod: PodKey,
        #[source]
        source: ClientError,
    },

    /// A task with the pod's identifier already exists.
    #[error("{operation} {pod}: task already exists")]
    Conflict {
        operation: &'static str,
        pod: PodKey,
        #[source]
        source: ClientError,
    },

    /// Transport, auth or throttling failure from the batch service.
    #[error("{operation} {pod}: {source}")]
    Remote {
        operation: &'static str,
        pod: PodKey,
        #[source]
        source: ClientError,
    },

    /// Listing the job's tasks failed part way.
    #[error("listing tasks of job {job_id}: {source}")]
    List {
        job_id: JobId,
        #[source]
        source: ClientError,
    },

    /// A listed task could not be turned back into a pod.
    #[error("task {task_id}: cannot reconstruct pod: {source}")]
    Translation {
        task_id: TaskId,
        #[source]
        source: CoreError,
    },

    /// The task of a known pod could not be turned back into the pod.
    #[error("{operation} {pod}: task {task_id}: cannot reconstruct pod: {source}")]
    PodTranslation {
        operation: &'static str,
        pod: PodKey,
        task_id: TaskId,
        #[source]
        source: CoreError,
    },

    /// The pod could not be embedded into a task.
    #[error("pod {pod}: cannot serialize: {source}")]
    Payload {
        pod: PodKey,
        #[source]
        source: CoreError,
    },

    /// No command line could be generated for the pod.
    #[error("pod {pod}: {source}")]
    Command {
        pod: PodKey,
        #[source]
        source: CommandError,
    },

    /// The pod is missing fields the provider needs.
    #[error("invalid pod: {0}")]
    InvalidPod(String),

    /// The pool or job could not be ensured at startup.
    #[error("failed to ensure {resource}: {source}")]
    Bootstrap {
        resource: String,
        #[source]
        source: ClientError,
    },
}

impl ProviderError {
    /// Classify a client failure for a single-pod operation.
    pub(crate) fn from_client(operation: &'static str, pod: &PodKey, source: ClientError) -> Self {
        let pod = pod.clone();
        match source {
            ClientError::NotFound { .. } => Self::NotFound {
                operation,
                pod,
                source,
            },
            ClientError::Conflict { .. } => Self::Conflict {
                operation,
                pod,
                source,
            },
            _ => Self::Remote {
                operation,
                pod,
                source,
            },
        }
    }

    /// Returns true if the pod's task or file is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if a task could not be reconstructed into a pod.
    pub fn is_translation(&self) -> bool {
        matches!(self, Self::Translation { .. } | Self::PodTranslation { .. })
    }

    /// Returns true if the task identifier was already taken.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
