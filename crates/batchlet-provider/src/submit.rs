//! Task submission.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use tracing::info;

use batchlet_client::BatchClient;
use batchlet_core::{JobId, PodPayload, TaskId, TaskSpec, UserIdentity};

use crate::command::{wrap_for_shell, CommandGenerator};
use crate::error::ProviderError;
use crate::pod::PodKey;

/// Builds task specifications from pods and adds them to the job.
pub struct TaskSubmitter {
    client: Arc<dyn BatchClient>,
    job_id: JobId,
    generator: Arc<dyn CommandGenerator>,
}

impl TaskSubmitter {
    /// Create a new TaskSubmitter.
    pub fn new(
        client: Arc<dyn BatchClient>,
        job_id: JobId,
        generator: Arc<dyn CommandGenerator>,
    ) -> Self {
        Self {
            client,
            job_id,
            generator,
        }
    }

    /// Build the task specification for a pod without submitting it.
    ///
    /// The display name is the pod UID (the pod key when the UID is unset),
    /// the command runs under bash as the pool-wide admin auto-user, and the
    /// full pod is embedded as the payload environment setting. A pod without
    /// a namespace is stored under the default one, so it reads back under
    /// the key it was created with.
    pub fn build_task_spec(&self, pod: &Pod) -> Result<TaskSpec, ProviderError> {
        let key = PodKey::from_pod(pod)?;
        let mut pod = pod.clone();
        pod.metadata.namespace = Some(key.namespace.clone());

        let script = self
            .generator
            .generate(&pod)
            .map_err(|source| ProviderError::Command {
                pod: key.clone(),
                source,
            })?;

        let payload = PodPayload::new(pod.clone())
            .to_environment_setting()
            .map_err(|source| ProviderError::Payload {
                pod: key.clone(),
                source,
            })?;

        let display_name = pod
            .metadata
            .uid
            .clone()
            .filter(|uid| !uid.is_empty())
            .unwrap_or_else(|| key.to_string());

        Ok(TaskSpec {
            id: key.task_id(),
            display_name,
            command_line: wrap_for_shell(&script),
            user_identity: UserIdentity::pool_admin(),
            environment_settings: vec![payload],
        })
    }

    /// Submit a pod as a new task.
    ///
    /// A task with the same derived identifier must not already exist; the
    /// service's conflict is returned as [`ProviderError::Conflict`] and
    /// nothing is overwritten.
    pub async fn submit(&self, pod: &Pod) -> Result<TaskId, ProviderError> {
        let key = PodKey::from_pod(pod)?;
        let spec = self.build_task_spec(pod)?;

        self.client
            .add_task(&self.job_id, &spec)
            .await
            .map_err(|e| ProviderError::from_client("create", &key, e))?;

        info!(
            task_id = %spec.id,
            namespace = %key.namespace,
            name = %key.name,
            job_id = %self.job_id,
            "Submitted pod task"
        );

        Ok(spec.id)
    }
}
