//! batchlet Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Runtime specifics
//!
//! It describes the remote batch model (pools, jobs, tasks), the
//! deterministic mapping from pods to task identifiers, and the contract
//! for embedding a serialized pod inside a task.

pub mod error;
pub mod ids;
pub mod infra;
pub mod payload;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{JobId, PoolId, TaskId};
pub use infra::{JobHandle, JobSpec, PoolHandle, PoolSpec};
pub use payload::{PodPayload, POD_PAYLOAD_KEY, POD_PAYLOAD_VERSION};
pub use status::TaskState;
pub use task::{
    AutoUserScope, BatchTask, ElevationLevel, EnvironmentSetting, ExecutionInfo, TaskSpec,
    UserIdentity,
};
