//! Pod lifecycle on top of the batch service.
//!
//! [`BatchProvider`] is the surface the orchestration layer calls. It holds
//! no pod state of its own: every read goes to the service, and a pod
//! exists exactly when its task exists.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{Pod, PodStatus};
use tracing::{info, warn};

use batchlet_client::BatchClient;
use batchlet_core::{JobHandle, PoolHandle, TaskId};

use crate::bootstrap::{ensure_job, ensure_pool};
use crate::command::{container_log_path, CommandGenerator, DockerCommandGenerator};
use crate::config::Config;
use crate::error::ProviderError;
use crate::lookup::TaskLookup;
use crate::node::NodeInfo;
use crate::pod::PodKey;
use crate::submit::TaskSubmitter;
use crate::translate::pod_from_task;

/// Task-level output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl LogStream {
    /// File name of the stream in the task directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout.txt",
            Self::Stderr => "stderr.txt",
        }
    }
}

/// A task that could not be turned into a pod during a listing.
#[derive(Debug)]
pub struct ListFailure {
    pub task_id: TaskId,
    pub error: ProviderError,
}

/// Result of listing pods: every pod that could be rebuilt, plus the tasks
/// that could not.
#[derive(Debug, Default)]
pub struct PodList {
    pub pods: Vec<Pod>,
    pub failures: Vec<ListFailure>,
}

/// Runs pods as tasks in one job on one pool.
pub struct BatchProvider {
    client: Arc<dyn BatchClient>,
    pool: PoolHandle,
    job: JobHandle,
    submitter: TaskSubmitter,
    lookup: TaskLookup,
    node: NodeInfo,
}

impl BatchProvider {
    /// Create the provider, making sure its pool and job exist.
    ///
    /// Failing to ensure either is fatal: no task operation can work
    /// without them.
    pub async fn new(config: Config, client: Arc<dyn BatchClient>) -> Result<Self, ProviderError> {
        let pool = ensure_pool(client.as_ref(), &config).await?;
        let job = ensure_job(client.as_ref(), &config).await?;

        let submitter = TaskSubmitter::new(
            client.clone(),
            job.id.clone(),
            Arc::new(DockerCommandGenerator::new()),
        );
        let lookup = TaskLookup::new(client.clone(), job.id.clone());

        info!(pool_id = %pool.id, job_id = %job.id, node = %config.node.node_name, "Provider ready");

        Ok(Self {
            client,
            pool,
            job,
            submitter,
            lookup,
            node: NodeInfo::new(config.node),
        })
    }

    /// Builder method to replace the command generator.
    pub fn with_command_generator(mut self, generator: Arc<dyn CommandGenerator>) -> Self {
        self.submitter = TaskSubmitter::new(self.client.clone(), self.job.id.clone(), generator);
        self
    }

    /// Pool the provider's tasks run on.
    pub fn pool(&self) -> &PoolHandle {
        &self.pool
    }

    /// Job the provider's tasks are added to.
    pub fn job(&self) -> &JobHandle {
        &self.job
    }

    /// Virtual node information.
    pub fn node(&self) -> &NodeInfo {
        &self.node
    }

    /// Create a pod.
    ///
    /// The provider does not deduplicate: creating a pod whose task already
    /// exists fails with [`ProviderError::Conflict`].
    pub async fn create_pod(&self, pod: &Pod) -> Result<(), ProviderError> {
        let key = PodKey::from_pod(pod)?;
        info!(namespace = %key.namespace, name = %key.name, "Creating pod");

        self.submitter.submit(pod).await?;
        Ok(())
    }

    /// Replace a pod by deleting its task and submitting a new one.
    ///
    /// This is not atomic. Between the delete and the create there is no
    /// task, and a concurrent read reports the pod as absent. If the create
    /// fails the pod stays absent; the old task is not restored.
    pub async fn update_pod(&self, pod: &Pod) -> Result<(), ProviderError> {
        let key = PodKey::from_pod(pod)?;
        info!(namespace = %key.namespace, name = %key.name, "Updating pod");

        self.delete_by_key(&key).await?;
        self.submitter.submit(pod).await?;
        Ok(())
    }

    /// Delete a pod's task.
    ///
    /// Deleting a pod that has no task is reported as
    /// [`ProviderError::NotFound`], not treated as success.
    pub async fn delete_pod(&self, pod: &Pod) -> Result<(), ProviderError> {
        let key = PodKey::from_pod(pod)?;
        self.delete_by_key(&key).await
    }

    /// Delete a pod's task by namespace and name.
    pub async fn delete_pod_by_name(&self, namespace: &str, name: &str) -> Result<(), ProviderError> {
        self.delete_by_key(&PodKey::new(namespace, name)).await
    }

    async fn delete_by_key(&self, key: &PodKey) -> Result<(), ProviderError> {
        let task_id = key.task_id();

        self.client
            .delete_task(&self.job.id, &task_id)
            .await
            .map_err(|e| {
                warn!(task_id = %task_id, pod = %key, error = %e, "Failed to delete task");
                ProviderError::from_client("delete", key, e)
            })?;

        info!(task_id = %task_id, namespace = %key.namespace, name = %key.name, "Deleted task");
        Ok(())
    }

    /// Get a pod with its current status. An absent task is `Ok(None)`.
    ///
    /// An empty namespace means [`crate::pod::DEFAULT_NAMESPACE`], as on create.
    pub async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ProviderError> {
        self.fetch_pod("get", &PodKey::new(namespace, name)).await
    }

    /// Get just the status of a pod. An absent task is `Ok(None)`.
    pub async fn get_pod_status(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PodStatus>, ProviderError> {
        Ok(self
            .fetch_pod("status", &PodKey::new(namespace, name))
            .await?
            .and_then(|pod| pod.status))
    }

    async fn fetch_pod(
        &self,
        operation: &'static str,
        key: &PodKey,
    ) -> Result<Option<Pod>, ProviderError> {
        let task_id = key.task_id();

        let task = self
            .lookup
            .get_by_id(&task_id)
            .await
            .map_err(|e| ProviderError::from_client(operation, key, e))?;

        let Some(task) = task else {
            return Ok(None);
        };

        pod_from_task(&task, Some(self.node.internal_ip()))
            .map(Some)
            .map_err(|source| ProviderError::PodTranslation {
                operation,
                pod: key.clone(),
                task_id,
                source,
            })
    }

    /// List every pod in the job.
    ///
    /// A task that cannot be rebuilt into a pod is reported in
    /// [`PodList::failures`] and the listing continues. A service failure
    /// while paging fails the whole call.
    pub async fn get_pods(&self) -> Result<PodList, ProviderError> {
        let tasks = self.lookup.list_all().await?;
        let mut list = PodList::default();

        for task in tasks {
            match pod_from_task(&task, Some(self.node.internal_ip())) {
                Ok(pod) => list.pods.push(pod),
                Err(source) => {
                    warn!(task_id = %task.id, error = %source, "Skipping task that is not a pod");
                    list.failures.push(ListFailure {
                        error: ProviderError::Translation {
                            task_id: task.id.clone(),
                            source,
                        },
                        task_id: task.id,
                    });
                }
            }
        }

        info!(
            job_id = %self.job.id,
            pods = list.pods.len(),
            failures = list.failures.len(),
            "Listed pods"
        );
        Ok(list)
    }

    /// Read the captured output of one container.
    ///
    /// Returns the file content unmodified. With `tail = Some(n)` and `n > 0`
    /// only the last `n` lines are returned. A missing task or file is
    /// [`ProviderError::NotFound`].
    pub async fn get_container_logs(
        &self,
        namespace: &str,
        pod_name: &str,
        container_name: &str,
        tail: Option<usize>,
    ) -> Result<Vec<u8>, ProviderError> {
        let content = self
            .read_file(
                &PodKey::new(namespace, pod_name),
                &container_log_path(container_name),
            )
            .await?;

        Ok(match tail {
            Some(n) => tail_lines(&content, n).to_vec(),
            None => content,
        })
    }

    /// Read the task-level stdout or stderr of a pod.
    pub async fn get_task_output(
        &self,
        namespace: &str,
        name: &str,
        stream: LogStream,
    ) -> Result<Vec<u8>, ProviderError> {
        self.read_file(&PodKey::new(namespace, name), stream.file_name())
            .await
    }

    async fn read_file(&self, key: &PodKey, path: &str) -> Result<Vec<u8>, ProviderError> {
        self.client
            .read_task_file(&self.job.id, &key.task_id(), path)
            .await
            .map_err(|e| ProviderError::from_client("logs", key, e))
    }
}

/// The last `n` lines of `content`; all of it when `n` is 0 or exceeds the
/// line count.
fn tail_lines(content: &[u8], n: usize) -> &[u8] {
    if n == 0 {
        return content;
    }

    let body = content.strip_suffix(b"\n").unwrap_or(content);
    let mut seen = 0;
    for (i, byte) in body.iter().enumerate().rev() {
        if *byte == b'\n' {
            seen += 1;
            if seen == n {
                return &content[i + 1..];
            }
        }
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchlet_client::{MemoryBatchClient, Operation};
    use batchlet_core::{EnvironmentSetting, JobId, TaskSpec, UserIdentity, POD_PAYLOAD_KEY};
    use chrono::Utc;
    use k8s_openapi::api::core::v1::{Container, PodSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod(namespace: &str, name: &str, image: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                uid: Some(format!("uid-{name}")),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "main".to_string(),
                    image: Some(image.to_string()),
                    args: Some(vec!["--serve".to_string()]),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    async fn provider_with(client: Arc<MemoryBatchClient>) -> BatchProvider {
        BatchProvider::new(Config::default(), client).await.unwrap()
    }

    async fn provider() -> (BatchProvider, Arc<MemoryBatchClient>) {
        let client = Arc::new(MemoryBatchClient::new());
        (provider_with(client.clone()).await, client)
    }

    fn job() -> JobId {
        Config::default().job_id
    }

    #[tokio::test]
    async fn test_new_bootstraps_pool_and_job() {
        let (provider, client) = provider().await;
        assert!(provider.pool().created);
        assert!(provider.job().created);
        assert_eq!(client.call_count(Operation::CreateOrGetPool).await, 1);
        assert_eq!(client.call_count(Operation::CreateOrGetJob).await, 1);

        // A second provider reuses the same infrastructure.
        let again = provider_with(client).await;
        assert!(!again.pool().created);
        assert!(!again.job().created);
    }

    #[tokio::test]
    async fn test_new_fails_without_job() {
        let client = Arc::new(MemoryBatchClient::new());
        client.fail_next(Operation::CreateOrGetJob).await;

        let result = BatchProvider::new(Config::default(), client).await;
        assert!(matches!(result, Err(ProviderError::Bootstrap { .. })));
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let (provider, _client) = provider().await;
        let original = pod("default", "web", "nginx");

        provider.create_pod(&original).await.unwrap();
        let fetched = provider.get_pod("default", "web").await.unwrap().unwrap();

        assert_eq!(fetched.metadata.name, original.metadata.name);
        assert_eq!(fetched.metadata.namespace, original.metadata.namespace);
        assert_eq!(fetched.metadata.uid, original.metadata.uid);
        assert_eq!(fetched.spec, original.spec);

        let status = fetched.status.unwrap();
        assert_eq!(status.phase.as_deref(), Some("Pending"));
        assert_eq!(status.host_ip.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_create_existing_conflicts() {
        let (provider, client) = provider().await;
        let p = pod("default", "web", "nginx");

        provider.create_pod(&p).await.unwrap();
        let err = provider.create_pod(&p).await.unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(client.task_count(&job()).await, 1);
    }

    #[tokio::test]
    async fn test_same_name_in_different_namespaces() {
        let (provider, _client) = provider().await;

        provider.create_pod(&pod("team-a", "web", "nginx")).await.unwrap();
        provider.create_pod(&pod("team-b", "web", "httpd")).await.unwrap();

        let a = provider.get_pod("team-a", "web").await.unwrap().unwrap();
        let b = provider.get_pod("team-b", "web").await.unwrap().unwrap();
        assert_eq!(a.spec.unwrap().containers[0].image.as_deref(), Some("nginx"));
        assert_eq!(b.spec.unwrap().containers[0].image.as_deref(), Some("httpd"));
    }

    #[tokio::test]
    async fn test_delete_then_get_is_absent() {
        let (provider, _client) = provider().await;
        let p = pod("default", "web", "nginx");

        provider.create_pod(&p).await.unwrap();
        provider.delete_pod(&p).await.unwrap();

        assert!(provider.get_pod("default", "web").await.unwrap().is_none());
        assert!(provider
            .get_pod_status("default", "web")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (provider, _client) = provider().await;

        let err = provider
            .delete_pod(&pod("default", "ghost", "nginx"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("default/ghost"));

        let err = provider
            .delete_pod_by_name("default", "ghost")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_propagates_remote_failure() {
        let (provider, client) = provider().await;
        client.fail_next(Operation::GetTask).await;

        let err = provider.get_pod("default", "web").await.unwrap_err();
        assert!(matches!(err, ProviderError::Remote { operation: "get", .. }));
    }

    #[tokio::test]
    async fn test_status_follows_task() {
        let (provider, client) = provider().await;
        provider.create_pod(&pod("default", "job", "alpine")).await.unwrap();
        let task_id = TaskId::for_pod("default", "job");

        let phase = |status: Option<PodStatus>| status.unwrap().phase.unwrap();

        client.prepare_task(&job(), &task_id).await.unwrap();
        assert_eq!(phase(provider.get_pod_status("default", "job").await.unwrap()), "Pending");

        client.start_task(&job(), &task_id, Utc::now()).await.unwrap();
        assert_eq!(phase(provider.get_pod_status("default", "job").await.unwrap()), "Running");

        client
            .complete_task(&job(), &task_id, 0, Utc::now())
            .await
            .unwrap();
        assert_eq!(
            phase(provider.get_pod_status("default", "job").await.unwrap()),
            "Succeeded"
        );
    }

    #[tokio::test]
    async fn test_failed_exit_code() {
        let (provider, client) = provider().await;
        provider.create_pod(&pod("default", "job", "alpine")).await.unwrap();
        let task_id = TaskId::for_pod("default", "job");

        client
            .complete_task(&job(), &task_id, 255, Utc::now())
            .await
            .unwrap();

        let status = provider
            .get_pod_status("default", "job")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.phase.as_deref(), Some("Failed"));
    }

    #[tokio::test]
    async fn test_update_replaces_task() {
        let (provider, client) = provider().await;
        provider.create_pod(&pod("default", "web", "nginx:1")).await.unwrap();

        provider.update_pod(&pod("default", "web", "nginx:2")).await.unwrap();

        let fetched = provider.get_pod("default", "web").await.unwrap().unwrap();
        assert_eq!(
            fetched.spec.unwrap().containers[0].image.as_deref(),
            Some("nginx:2")
        );
        assert_eq!(client.task_count(&job()).await, 1);
    }

    #[tokio::test]
    async fn test_update_is_delete_then_create() {
        let (provider, client) = provider().await;
        provider.create_pod(&pod("default", "web", "nginx:1")).await.unwrap();

        // The delete goes through, the create does not.
        client.fail_next(Operation::AddTask).await;
        let err = provider
            .update_pod(&pod("default", "web", "nginx:2"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Remote { .. }));

        // The gap is visible as absence, not as the old pod.
        assert!(provider.get_pod("default", "web").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_pod_is_not_found() {
        let (provider, client) = provider().await;

        let err = provider
            .update_pod(&pod("default", "web", "nginx"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(client.task_count(&job()).await, 0);
    }

    #[tokio::test]
    async fn test_list_spans_pages() {
        let client = Arc::new(MemoryBatchClient::new().with_page_size(4));
        let provider = provider_with(client.clone()).await;

        for i in 0..10 {
            provider
                .create_pod(&pod("default", &format!("pod-{i}"), "alpine"))
                .await
                .unwrap();
        }

        let list = provider.get_pods().await.unwrap();
        assert_eq!(list.pods.len(), 10);
        assert!(list.failures.is_empty());
        assert_eq!(client.call_count(Operation::ListTasks).await, 3);
        assert!(list.pods.iter().all(|p| p.status.is_some()));
    }

    #[tokio::test]
    async fn test_list_reports_foreign_tasks() {
        let (provider, client) = provider().await;
        provider.create_pod(&pod("default", "web", "nginx")).await.unwrap();

        let foreign = TaskSpec {
            id: TaskId::new("hand-made"),
            display_name: "not a pod".to_string(),
            command_line: "echo hi".to_string(),
            user_identity: UserIdentity::default(),
            environment_settings: vec![EnvironmentSetting::new("OTHER", "x")],
        };
        client
            .insert_task(&job(), batchlet_core::BatchTask::from_spec(foreign, Utc::now()))
            .await;

        let list = provider.get_pods().await.unwrap();
        assert_eq!(list.pods.len(), 1);
        assert_eq!(list.failures.len(), 1);
        assert_eq!(list.failures[0].task_id.as_str(), "hand-made");
        assert!(list.failures[0].error.is_translation());
    }

    #[tokio::test]
    async fn test_get_reports_missing_payload() {
        let (provider, client) = provider().await;
        let spec = TaskSpec {
            id: TaskId::for_pod("team-a", "broken"),
            display_name: String::new(),
            command_line: "true".to_string(),
            user_identity: UserIdentity::default(),
            environment_settings: Vec::new(),
        };
        client
            .insert_task(&job(), batchlet_core::BatchTask::from_spec(spec, Utc::now()))
            .await;

        let err = provider.get_pod("team-a", "broken").await.unwrap_err();
        assert!(err.is_translation());
        let message = err.to_string();
        assert!(message.starts_with("get team-a/broken:"), "{message}");
        assert!(message.contains(POD_PAYLOAD_KEY), "{message}");

        let err = provider
            .get_pod_status("team-a", "broken")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::PodTranslation { operation: "status", .. }
        ));
        assert!(err.to_string().contains("team-a/broken"));
    }

    #[tokio::test]
    async fn test_pod_without_namespace_reads_back() {
        let (provider, _client) = provider().await;
        let mut p = pod("default", "web", "nginx");
        p.metadata.namespace = None;

        provider.create_pod(&p).await.unwrap();

        let by_default = provider.get_pod("default", "web").await.unwrap().unwrap();
        assert_eq!(by_default.metadata.namespace.as_deref(), Some("default"));

        let by_empty = provider.get_pod("", "web").await.unwrap().unwrap();
        assert_eq!(by_empty.metadata, by_default.metadata);
        assert!(provider.get_pod_status("", "web").await.unwrap().is_some());

        provider.delete_pod_by_name("", "web").await.unwrap();
        assert!(provider.get_pod("default", "web").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_aborts_on_page_failure() {
        let client = Arc::new(MemoryBatchClient::new().with_page_size(2));
        let provider = provider_with(client.clone()).await;
        for i in 0..5 {
            provider
                .create_pod(&pod("default", &format!("pod-{i}"), "alpine"))
                .await
                .unwrap();
        }

        client.fail_after(Operation::ListTasks, 1).await;
        assert!(matches!(
            provider.get_pods().await,
            Err(ProviderError::List { .. })
        ));
    }

    #[tokio::test]
    async fn test_container_logs() {
        let (provider, client) = provider().await;
        provider.create_pod(&pod("default", "web", "nginx")).await.unwrap();
        let task_id = TaskId::for_pod("default", "web");
        let content = b"line one\n\x00binary\xff\nline three\n".to_vec();
        client
            .put_task_file(&job(), &task_id, "wd/main", content.clone())
            .await
            .unwrap();

        let logs = provider
            .get_container_logs("default", "web", "main", None)
            .await
            .unwrap();
        assert_eq!(logs, content);

        let tail = provider
            .get_container_logs("default", "web", "main", Some(1))
            .await
            .unwrap();
        assert_eq!(tail, b"line three\n");
    }

    #[tokio::test]
    async fn test_container_logs_not_found() {
        let (provider, _client) = provider().await;

        let err = provider
            .get_container_logs("default", "missing", "main", None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        provider.create_pod(&pod("default", "web", "nginx")).await.unwrap();
        let err = provider
            .get_container_logs("default", "web", "no-such-container", None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_task_output() {
        let (provider, client) = provider().await;
        provider.create_pod(&pod("default", "web", "nginx")).await.unwrap();
        client
            .put_task_file(&job(), &TaskId::for_pod("default", "web"), "stderr.txt", "boom")
            .await
            .unwrap();

        let stderr = provider
            .get_task_output("default", "web", LogStream::Stderr)
            .await
            .unwrap();
        assert_eq!(stderr, b"boom");

        let err = provider
            .get_task_output("default", "web", LogStream::Stdout)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines(b"a\nb\nc\n", 2), b"b\nc\n");
        assert_eq!(tail_lines(b"a\nb\nc", 2), b"b\nc");
        assert_eq!(tail_lines(b"a\nb\nc\n", 0), b"a\nb\nc\n");
        assert_eq!(tail_lines(b"a\nb\nc\n", 10), b"a\nb\nc\n");
        assert_eq!(tail_lines(b"", 3), b"");
    }
}
