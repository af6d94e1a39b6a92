//! Embedded pod payload.
//!
//! A task has no notion of labels, containers or pod metadata, so the full
//! pod is serialized into one of the task's environment settings when the
//! task is submitted and read back whenever the pod is reconstructed.
//!
//! The setting is named [`POD_PAYLOAD_KEY`] and holds a JSON envelope:
//!
//! ```json
//! {"version": 1, "pod": { ...core/v1 Pod... }}
//! ```
//!
//! A bare Pod object without the envelope is accepted on read so that tasks
//! written before the envelope existed still resolve.

use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{BatchTask, CoreError, EnvironmentSetting};

/// Environment setting that carries the serialized pod.
pub const POD_PAYLOAD_KEY: &str = "BATCHLET_POD";

/// Schema version written by this build.
pub const POD_PAYLOAD_VERSION: u32 = 1;

/// Versioned envelope around the serialized pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodPayload {
    pub version: u32,
    pub pod: Pod,
}

impl PodPayload {
    /// Wrap a pod in the current payload version.
    pub fn new(pod: Pod) -> Self {
        Self {
            version: POD_PAYLOAD_VERSION,
            pod,
        }
    }

    /// Serialize into the environment setting attached to the task.
    pub fn to_environment_setting(&self) -> Result<EnvironmentSetting, CoreError> {
        let value = serde_json::to_string(self)?;
        Ok(EnvironmentSetting::new(POD_PAYLOAD_KEY, value))
    }

    /// Parse a payload string.
    pub fn decode(raw: &str) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_str(raw)?;

        let payload = match value.get("version") {
            Some(version) => {
                let version = version
                    .as_u64()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| {
                        CoreError::InvalidInput(format!("payload version is not a number: {version}"))
                    })?;
                if version != POD_PAYLOAD_VERSION {
                    return Err(CoreError::UnsupportedPayloadVersion(version));
                }
                serde_json::from_value::<PodPayload>(value)?
            }
            None => Self::new(serde_json::from_value::<Pod>(value)?),
        };

        let has_name = payload
            .pod
            .metadata
            .name
            .as_deref()
            .is_some_and(|n| !n.is_empty());
        if !has_name {
            return Err(CoreError::InvalidInput(
                "embedded pod has no metadata.name".to_string(),
            ));
        }

        Ok(payload)
    }

    /// Extract the payload embedded in a task.
    pub fn from_task(task: &BatchTask) -> Result<Self, CoreError> {
        let raw = task
            .environment_value(POD_PAYLOAD_KEY)
            .ok_or_else(|| CoreError::MissingPayload {
                key: POD_PAYLOAD_KEY.to_string(),
            })?;
        Self::decode(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TaskId, TaskSpec, UserIdentity};
    use chrono::Utc;
    use k8s_openapi::api::core::v1::{Container, PodSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod(name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                uid: Some("uid-1".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "main".to_string(),
                    image: Some("busybox".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn task_with(settings: Vec<EnvironmentSetting>) -> BatchTask {
        BatchTask::from_spec(
            TaskSpec {
                id: TaskId::new("pod-x"),
                display_name: "x".to_string(),
                command_line: "true".to_string(),
                user_identity: UserIdentity::default(),
                environment_settings: settings,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_payload_survives_task_embedding() {
        let setting = PodPayload::new(pod("web")).to_environment_setting().unwrap();
        assert_eq!(setting.name, POD_PAYLOAD_KEY);

        let decoded = PodPayload::from_task(&task_with(vec![setting])).unwrap();
        assert_eq!(decoded.version, POD_PAYLOAD_VERSION);
        assert_eq!(decoded.pod, pod("web"));
    }

    #[test]
    fn test_missing_payload() {
        let err = PodPayload::from_task(&task_with(vec![EnvironmentSetting::new("OTHER", "1")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingPayload { .. }));
    }

    #[test]
    fn test_garbage_payload() {
        let err = PodPayload::decode("not json").unwrap_err();
        assert!(matches!(err, CoreError::Serialization(_)));
    }

    #[test]
    fn test_empty_object_is_not_a_pod() {
        let err = PodPayload::decode("{}").unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let raw = serde_json::json!({"version": 7, "pod": pod("web")}).to_string();
        let err = PodPayload::decode(&raw).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedPayloadVersion(7)));
    }

    #[test]
    fn test_bare_pod_accepted() {
        let raw = serde_json::to_string(&pod("legacy")).unwrap();
        let decoded = PodPayload::decode(&raw).unwrap();
        assert_eq!(decoded.pod.metadata.name.as_deref(), Some("legacy"));
    }
}
