//! Task types: what we submit and what the batch service reports back.

use crate::{TaskId, TaskState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Elevation level of the identity a task runs as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElevationLevel {
    /// Regular user.
    #[default]
    NonAdmin,
    /// Administrative (root) access on the node.
    Admin,
}

/// Scope of an auto-user account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoUserScope {
    /// A fresh account per task.
    #[default]
    Task,
    /// One account shared by every task on the pool.
    Pool,
}

/// Auto-user account settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoUserSpecification {
    pub scope: AutoUserScope,
    pub elevation_level: ElevationLevel,
}

/// Identity under which a task's command line runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_user: Option<AutoUserSpecification>,
}

impl UserIdentity {
    /// Administrative auto-user shared across the pool.
    pub fn pool_admin() -> Self {
        Self {
            auto_user: Some(AutoUserSpecification {
                scope: AutoUserScope::Pool,
                elevation_level: ElevationLevel::Admin,
            }),
        }
    }
}

/// A single environment variable set on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSetting {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl EnvironmentSetting {
    /// Create a new EnvironmentSetting.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Specification submitted to add a task to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub id: TaskId,
    pub display_name: String,
    pub command_line: String,
    pub user_identity: UserIdentity,
    #[serde(default)]
    pub environment_settings: Vec<EnvironmentSetting>,
}

/// Execution details the service records once a node picks the task up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInfo {
    /// When the command line started executing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// When the task completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Exit code of the command line, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    #[serde(default)]
    pub retry_count: i32,

    #[serde(default)]
    pub requeue_count: i32,
}

/// A task as reported by the batch service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTask {
    pub id: TaskId,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub command_line: String,

    #[serde(default)]
    pub state: TaskState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_transition_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub environment_settings: Vec<EnvironmentSetting>,

    #[serde(default)]
    pub user_identity: UserIdentity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_info: Option<ExecutionInfo>,
}

impl BatchTask {
    /// Build the freshly queued task the service creates from a spec.
    pub fn from_spec(spec: TaskSpec, created_at: DateTime<Utc>) -> Self {
        Self {
            id: spec.id,
            display_name: spec.display_name,
            command_line: spec.command_line,
            state: TaskState::Active,
            creation_time: Some(created_at),
            state_transition_time: Some(created_at),
            environment_settings: spec.environment_settings,
            user_identity: spec.user_identity,
            execution_info: None,
        }
    }

    /// Look up an environment setting by name.
    pub fn environment_value(&self, name: &str) -> Option<&str> {
        self.environment_settings
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.value.as_str())
    }

    /// Exit code, if the service recorded one.
    pub fn exit_code(&self) -> Option<i32> {
        self.execution_info.as_ref().and_then(|e| e.exit_code)
    }

    /// When the command line started executing.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.execution_info.as_ref().and_then(|e| e.start_time)
    }

    /// When the task completed.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.execution_info.as_ref().and_then(|e| e.end_time)
    }

    /// Builder method to move the task to a new state.
    pub fn with_state(mut self, state: TaskState) -> Self {
        self.state = state;
        self
    }

    /// Builder method to attach execution details.
    pub fn with_execution_info(mut self, info: ExecutionInfo) -> Self {
        self.execution_info = Some(info);
        self
    }
}
