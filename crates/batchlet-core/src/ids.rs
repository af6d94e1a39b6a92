//! Newtype wrappers for identifiers to ensure type safety.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Prefix of every task identifier derived from a pod.
pub const POD_TASK_ID_PREFIX: &str = "pod-";

/// Number of digest bytes kept in a derived task identifier.
const POD_TASK_ID_DIGEST_BYTES: usize = 24;

/// Unique identifier for a Task within a Job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new TaskId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the task identifier for a pod.
    ///
    /// The result depends only on `(namespace, name)`: the same pair always
    /// yields the same identifier, which is what makes lookup, delete and
    /// update idempotent. The identifier is `pod-` followed by 48 lowercase
    /// hex characters taken from `SHA-256(namespace NUL name)`, so it stays
    /// inside the remote charset (`[a-z0-9-]`) and its 64 character limit.
    ///
    /// The mapping is one-way. Going back from a task to its pod uses the
    /// payload embedded in the task, see [`crate::payload`].
    pub fn for_pod(namespace: &str, name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(namespace.as_bytes());
        // NUL cannot appear in either component, so ("a", "bc") and ("ab", "c")
        // hash different pre-images.
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
        let digest = hasher.finalize();

        Self(format!(
            "{}{}",
            POD_TASK_ID_PREFIX,
            hex::encode(&digest[..POD_TASK_ID_DIGEST_BYTES])
        ))
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of the compute Pool tasks run on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolId(String);

impl PoolId {
    /// Create a new PoolId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PoolId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of the Job every pod task is added to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Create a new JobId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
