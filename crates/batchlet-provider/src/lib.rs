//! batchlet provider library
//!
//! Runs Kubernetes pods as tasks inside a single job on a batch pool. Each
//! pod becomes one task whose id is derived from the pod's namespace and
//! name; the pod itself travels inside the task so it can be rebuilt later,
//! and the pod's status is recomputed from the task state on every read.
//!
//! The remote service is only reached through
//! [`batchlet_client::BatchClient`], so the whole lifecycle can run against
//! [`batchlet_client::MemoryBatchClient`] in tests.

pub mod bootstrap;
pub mod command;
pub mod config;
pub mod error;
pub mod lookup;
pub mod node;
pub mod pod;
pub mod provider;
pub mod submit;
pub mod translate;

pub use command::{CommandGenerator, DockerCommandGenerator};
pub use config::{Config, ConfigError, NodeConfig};
pub use error::ProviderError;
pub use node::NodeInfo;
pub use pod::{PodKey, DEFAULT_NAMESPACE};
pub use provider::{BatchProvider, ListFailure, LogStream, PodList};
pub use translate::PodPhase;
