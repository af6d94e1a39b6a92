//! Pool and Job types.
//!
//! Pools and jobs are shared infrastructure: one pool and one job are
//! created (or found) at startup and every pod task lives inside that job.

use crate::{JobId, PoolId};
use serde::{Deserialize, Serialize};

/// Marketplace image the pool nodes boot from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

impl Default for ImageReference {
    fn default() -> Self {
        // Ubuntu image with a container runtime preinstalled.
        Self {
            publisher: "microsoft-azure-batch".to_string(),
            offer: "ubuntu-server-container".to_string(),
            sku: "20-04-lts".to_string(),
            version: "latest".to_string(),
        }
    }
}

/// Virtual machine settings of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineConfiguration {
    pub image_reference: ImageReference,
    #[serde(rename = "nodeAgentSKUId")]
    pub node_agent_sku_id: String,
}

impl Default for VirtualMachineConfiguration {
    fn default() -> Self {
        Self {
            image_reference: ImageReference::default(),
            node_agent_sku_id: "batch.node.ubuntu 20.04".to_string(),
        }
    }
}

/// Parameters used when the pool has to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpec {
    pub id: PoolId,
    pub vm_size: String,
    pub virtual_machine_configuration: VirtualMachineConfiguration,
    pub target_dedicated_nodes: u32,
}

impl PoolSpec {
    /// Create a pool spec with default sizing.
    pub fn new(id: PoolId) -> Self {
        Self {
            id,
            vm_size: "STANDARD_A1_V2".to_string(),
            virtual_machine_configuration: VirtualMachineConfiguration::default(),
            target_dedicated_nodes: 1,
        }
    }

    /// Builder method to set the VM size.
    pub fn with_vm_size(mut self, vm_size: impl Into<String>) -> Self {
        self.vm_size = vm_size.into();
        self
    }

    /// Builder method to set the dedicated node count.
    pub fn with_target_dedicated_nodes(mut self, nodes: u32) -> Self {
        self.target_dedicated_nodes = nodes;
        self
    }
}

/// Pool the job is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolInformation {
    pub pool_id: PoolId,
}

/// Parameters used when the job has to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub id: JobId,
    pub pool_info: PoolInformation,
}

impl JobSpec {
    /// Create a job spec bound to a pool.
    pub fn new(id: JobId, pool_id: PoolId) -> Self {
        Self {
            id,
            pool_info: PoolInformation { pool_id },
        }
    }
}

/// Handle to a pool that is known to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolHandle {
    pub id: PoolId,
    /// Whether this process created the pool (false if it already existed).
    #[serde(skip)]
    pub created: bool,
}

/// Handle to a job that is known to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub id: JobId,
    pub pool_info: PoolInformation,
    /// Whether this process created the job (false if it already existed).
    #[serde(skip)]
    pub created: bool,
}
