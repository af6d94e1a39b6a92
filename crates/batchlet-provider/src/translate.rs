//! Task to pod translation.
//!
//! A task has four states and one exit code; a pod has phases, conditions
//! and a status per container. The mapping is:
//!
//! | Task state                 | Pod phase   |
//! |----------------------------|-------------|
//! | Active, Preparing          | Pending     |
//! | Running                    | Running     |
//! | Completed, exit code 0     | Succeeded   |
//! | Completed, exit code != 0  | Failed      |
//! | Completed, no exit code    | Failed (-1) |
//!
//! The service keeps no per-container state, so every container declared in
//! the pod is reported with the same state, derived from the task. This is an
//! approximation: a pod whose second container failed looks exactly like one
//! whose first container failed.

use std::fmt;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateRunning, ContainerStateTerminated, ContainerStateWaiting,
    ContainerStatus, Pod, PodCondition, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use batchlet_core::{BatchTask, CoreError, PodPayload, TaskState};

/// Exit code reported for a completed task the service recorded none for.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Kubernetes pod phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl PodPhase {
    /// Phase of the pod backed by a task in `state` with `exit_code`.
    pub fn from_task_state(state: TaskState, exit_code: Option<i32>) -> Self {
        match state {
            TaskState::Active | TaskState::Preparing => Self::Pending,
            TaskState::Running => Self::Running,
            TaskState::Completed => match exit_code {
                Some(0) => Self::Succeeded,
                _ => Self::Failed,
            },
        }
    }

    /// Name used in `PodStatus.phase`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }

}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn time(t: Option<DateTime<Utc>>) -> Option<Time> {
    t.map(Time)
}

fn condition(type_: &str, status: bool, task: &BatchTask) -> PodCondition {
    PodCondition {
        type_: type_.to_string(),
        status: if status { "True" } else { "False" }.to_string(),
        last_transition_time: time(task.state_transition_time),
        ..Default::default()
    }
}

fn container_state(task: &BatchTask) -> ContainerState {
    match task.state {
        TaskState::Active | TaskState::Preparing => ContainerState {
            waiting: Some(ContainerStateWaiting {
                reason: Some(
                    if task.state == TaskState::Active {
                        "Queued"
                    } else {
                        "Preparing"
                    }
                    .to_string(),
                ),
                message: None,
            }),
            ..Default::default()
        },
        TaskState::Running => ContainerState {
            running: Some(ContainerStateRunning {
                started_at: time(task.start_time()),
            }),
            ..Default::default()
        },
        TaskState::Completed => {
            let exit_code = task.exit_code().unwrap_or(UNKNOWN_EXIT_CODE);
            ContainerState {
                terminated: Some(ContainerStateTerminated {
                    exit_code,
                    reason: Some(if exit_code == 0 { "Completed" } else { "Error" }.to_string()),
                    started_at: time(task.start_time()),
                    finished_at: time(task.end_time()),
                    ..Default::default()
                }),
                ..Default::default()
            }
        }
    }
}

/// Compute the status of `pod` from the task that backs it.
///
/// `host_ip` is the address reported as the pod's host. The status is
/// recomputed on every call and never cached.
pub fn to_pod_status(task: &BatchTask, pod: &Pod, host_ip: Option<&str>) -> PodStatus {
    let phase = PodPhase::from_task_state(task.state, task.exit_code());
    let running = phase == PodPhase::Running;
    let state = container_state(task);
    let restart_count = task
        .execution_info
        .as_ref()
        .map(|e| e.retry_count + e.requeue_count)
        .unwrap_or(0);

    let container_statuses = pod
        .spec
        .as_ref()
        .map(|spec| {
            spec.containers
                .iter()
                .map(|c| ContainerStatus {
                    name: c.name.clone(),
                    image: c.image.clone().unwrap_or_default(),
                    ready: running,
                    started: Some(running),
                    restart_count,
                    state: Some(state.clone()),
                    ..Default::default()
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    PodStatus {
        phase: Some(phase.to_string()),
        host_ip: host_ip.map(str::to_string),
        start_time: time(task.start_time()),
        conditions: Some(vec![
            condition("PodScheduled", task.state.is_scheduled(), task),
            condition("Initialized", task.state.is_scheduled(), task),
            condition("Ready", running, task),
        ]),
        container_statuses: Some(container_statuses),
        ..Default::default()
    }
}

/// Rebuild the pod embedded in `task`, with a fresh status attached.
///
/// A task without a readable payload is an error, never an empty pod.
pub fn pod_from_task(task: &BatchTask, host_ip: Option<&str>) -> Result<Pod, CoreError> {
    let payload = PodPayload::from_task(task)?;

    let mut pod = payload.pod;
    pod.status = Some(to_pod_status(task, &pod, host_ip));
    Ok(pod)
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchlet_core::{EnvironmentSetting, ExecutionInfo, TaskId, TaskSpec, UserIdentity};
    use chrono::TimeZone;
    use k8s_openapi::api::core::v1::{Container, PodSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod() -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![
                    Container {
                        name: "app".to_string(),
                        image: Some("nginx".to_string()),
                        ..Default::default()
                    },
                    Container {
                        name: "sidecar".to_string(),
                        image: Some("envoy".to_string()),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn task(settings: Vec<EnvironmentSetting>) -> BatchTask {
        BatchTask::from_spec(
            TaskSpec {
                id: TaskId::new("pod-1"),
                display_name: "uid".to_string(),
                command_line: "true".to_string(),
                user_identity: UserIdentity::pool_admin(),
                environment_settings: settings,
            },
            Utc::now(),
        )
    }

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_phase_table() {
        let cases = [
            (TaskState::Active, None, PodPhase::Pending),
            (TaskState::Preparing, None, PodPhase::Pending),
            (TaskState::Running, None, PodPhase::Running),
            (TaskState::Completed, Some(0), PodPhase::Succeeded),
            (TaskState::Completed, Some(1), PodPhase::Failed),
            (TaskState::Completed, Some(-1), PodPhase::Failed),
            (TaskState::Completed, Some(255), PodPhase::Failed),
            (TaskState::Completed, None, PodPhase::Failed),
        ];

        for (state, exit_code, expected) in cases {
            assert_eq!(
                PodPhase::from_task_state(state, exit_code),
                expected,
                "{state} / {exit_code:?}"
            );
        }
    }

    #[test]
    fn test_exit_code_ignored_before_completion() {
        // A stale exit code on a non-completed task must not decide the phase.
        assert_eq!(
            PodPhase::from_task_state(TaskState::Running, Some(1)),
            PodPhase::Running
        );
        assert_eq!(
            PodPhase::from_task_state(TaskState::Active, Some(0)),
            PodPhase::Pending
        );
    }

    #[test]
    fn test_pending_status() {
        let status = to_pod_status(&task(vec![]), &pod(), Some("10.0.0.4"));

        assert_eq!(status.phase.as_deref(), Some("Pending"));
        assert_eq!(status.host_ip.as_deref(), Some("10.0.0.4"));
        assert!(status.start_time.is_none());

        let containers = status.container_statuses.unwrap();
        assert_eq!(containers.len(), 2);
        for c in &containers {
            assert!(!c.ready);
            let waiting = c.state.as_ref().unwrap().waiting.as_ref().unwrap();
            assert_eq!(waiting.reason.as_deref(), Some("Queued"));
        }

        let conditions = status.conditions.unwrap();
        assert!(conditions.iter().all(|c| c.status == "False"));
    }

    #[test]
    fn test_running_status() {
        let t = task(vec![])
            .with_state(TaskState::Running)
            .with_execution_info(ExecutionInfo {
                start_time: Some(ts(10)),
                ..Default::default()
            });

        let status = to_pod_status(&t, &pod(), None);
        assert_eq!(status.phase.as_deref(), Some("Running"));
        assert_eq!(status.start_time, Some(Time(ts(10))));

        for c in status.container_statuses.unwrap() {
            assert!(c.ready);
            assert_eq!(
                c.state.unwrap().running.unwrap().started_at,
                Some(Time(ts(10)))
            );
        }

        let ready = status
            .conditions
            .unwrap()
            .into_iter()
            .find(|c| c.type_ == "Ready")
            .unwrap();
        assert_eq!(ready.status, "True");
    }

    #[test]
    fn test_completed_status_carries_times() {
        let t = task(vec![])
            .with_state(TaskState::Completed)
            .with_execution_info(ExecutionInfo {
                start_time: Some(ts(10)),
                end_time: Some(ts(11)),
                exit_code: Some(137),
                ..Default::default()
            });

        let status = to_pod_status(&t, &pod(), None);
        assert_eq!(status.phase.as_deref(), Some("Failed"));

        for c in status.container_statuses.unwrap() {
            assert!(!c.ready);
            let terminated = c.state.unwrap().terminated.unwrap();
            assert_eq!(terminated.exit_code, 137);
            assert_eq!(terminated.reason.as_deref(), Some("Error"));
            assert_eq!(terminated.started_at, Some(Time(ts(10))));
            assert_eq!(terminated.finished_at, Some(Time(ts(11))));
        }
    }

    #[test]
    fn test_completed_without_exit_code() {
        let t = task(vec![]).with_state(TaskState::Completed);
        let status = to_pod_status(&t, &pod(), None);

        assert_eq!(status.phase.as_deref(), Some("Failed"));
        let first = &status.container_statuses.unwrap()[0];
        let terminated = first.state.as_ref().unwrap().terminated.as_ref().unwrap();
        assert_eq!(terminated.exit_code, UNKNOWN_EXIT_CODE);
    }

    #[test]
    fn test_pod_from_task() {
        let setting = PodPayload::new(pod()).to_environment_setting().unwrap();
        let rebuilt = pod_from_task(&task(vec![setting]), None).unwrap();

        assert_eq!(rebuilt.metadata, pod().metadata);
        assert_eq!(rebuilt.spec, pod().spec);
        assert_eq!(
            rebuilt.status.unwrap().phase.as_deref(),
            Some(PodPhase::Pending.as_str())
        );
    }

    #[test]
    fn test_pod_from_task_without_payload() {
        let err = pod_from_task(&task(vec![]), None).unwrap_err();
        assert!(matches!(err, CoreError::MissingPayload { .. }));
    }
}
