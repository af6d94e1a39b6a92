//! Virtual node reporting.
//!
//! The pool's real nodes are not exposed individually; the provider
//! presents one virtual node whose capacity comes from configuration.

use std::collections::BTreeMap;

use chrono::Utc;
use k8s_openapi::api::core::v1::{
    DaemonEndpoint, NodeAddress, NodeCondition, NodeDaemonEndpoints,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use crate::config::NodeConfig;

/// Static information about the virtual node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    config: NodeConfig,
}

impl NodeInfo {
    /// Create a new NodeInfo.
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    /// Name the node registers under.
    pub fn name(&self) -> &str {
        &self.config.node_name
    }

    /// Resource capacity of the node.
    pub fn capacity(&self) -> BTreeMap<String, Quantity> {
        BTreeMap::from([
            ("cpu".to_string(), Quantity(self.config.cpu.clone())),
            ("memory".to_string(), Quantity(self.config.memory.clone())),
            ("pods".to_string(), Quantity(self.config.pods.clone())),
        ])
    }

    /// Node conditions; the node always reports itself healthy.
    pub fn conditions(&self) -> Vec<NodeCondition> {
        let now = Time(Utc::now());
        let condition = |type_: &str, status: &str, reason: &str, message: &str| NodeCondition {
            type_: type_.to_string(),
            status: status.to_string(),
            last_heartbeat_time: Some(now.clone()),
            last_transition_time: Some(now.clone()),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            ..Default::default()
        };

        vec![
            condition("Ready", "True", "KubeletReady", "kubelet is ready."),
            condition(
                "OutOfDisk",
                "False",
                "KubeletHasSufficientDisk",
                "kubelet has sufficient disk space available",
            ),
            condition(
                "MemoryPressure",
                "False",
                "KubeletHasSufficientMemory",
                "kubelet has sufficient memory available",
            ),
            condition(
                "DiskPressure",
                "False",
                "KubeletHasNoDiskPressure",
                "kubelet has no disk pressure",
            ),
            condition(
                "NetworkUnavailable",
                "False",
                "RouteCreated",
                "RouteController created a route",
            ),
        ]
    }

    /// Addresses of the node.
    pub fn addresses(&self) -> Vec<NodeAddress> {
        vec![NodeAddress {
            type_: "InternalIP".to_string(),
            address: self.config.internal_ip.clone(),
        }]
    }

    /// Daemon endpoints of the node.
    pub fn daemon_endpoints(&self) -> NodeDaemonEndpoints {
        NodeDaemonEndpoints {
            kubelet_endpoint: Some(DaemonEndpoint {
                port: self.config.daemon_endpoint_port,
            }),
        }
    }

    /// Operating system of the node.
    pub fn operating_system(&self) -> &str {
        &self.config.operating_system
    }

    /// Address pods report as their host.
    pub fn internal_ip(&self) -> &str {
        &self.config.internal_ip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_from_config() {
        let node = NodeInfo::new(NodeConfig {
            cpu: "8".to_string(),
            ..Default::default()
        });

        let capacity = node.capacity();
        assert_eq!(capacity["cpu"], Quantity("8".to_string()));
        assert_eq!(capacity["memory"], Quantity("100Gi".to_string()));
        assert_eq!(capacity["pods"], Quantity("20".to_string()));
    }

    #[test]
    fn test_conditions_report_healthy() {
        let conditions = NodeInfo::new(NodeConfig::default()).conditions();
        assert_eq!(conditions.len(), 5);

        for c in conditions {
            let expected = if c.type_ == "Ready" { "True" } else { "False" };
            assert_eq!(c.status, expected, "{}", c.type_);
            assert!(c.last_heartbeat_time.is_some());
        }
    }

    #[test]
    fn test_addresses_and_endpoints() {
        let node = NodeInfo::new(NodeConfig {
            internal_ip: "10.1.2.3".to_string(),
            daemon_endpoint_port: 10255,
            ..Default::default()
        });

        assert_eq!(node.addresses()[0].address, "10.1.2.3");
        assert_eq!(node.addresses()[0].type_, "InternalIP");
        assert_eq!(node.daemon_endpoints().kubelet_endpoint.unwrap().port, 10255);
        assert_eq!(node.operating_system(), "Linux");
    }
}
