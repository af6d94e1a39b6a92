//! Pod identity.

use std::fmt;

use k8s_openapi::api::core::v1::Pod;

use batchlet_core::TaskId;

use crate::error::ProviderError;

/// Namespace used when a pod does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// The `(namespace, name)` pair a pod is addressed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PodKey {
    pub namespace: String,
    pub name: String,
}

impl PodKey {
    /// Create a new PodKey. An empty namespace becomes [`DEFAULT_NAMESPACE`].
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            namespace: if namespace.is_empty() {
                DEFAULT_NAMESPACE.to_string()
            } else {
                namespace
            },
            name: name.into(),
        }
    }

    /// Read the key from a pod's metadata.
    pub fn from_pod(pod: &Pod) -> Result<Self, ProviderError> {
        let name = pod
            .metadata
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ProviderError::InvalidPod("metadata.name is required".to_string()))?;

        let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();

        Ok(Self::new(namespace, name))
    }

    /// Task identifier this pod maps to.
    pub fn task_id(&self) -> TaskId {
        TaskId::for_pod(&self.namespace, &self.name)
    }
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
