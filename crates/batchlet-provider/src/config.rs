//! Provider configuration.

use std::time::Duration;

use thiserror::Error;

use batchlet_core::{JobId, JobSpec, PoolId, PoolSpec};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings describing the virtual node the provider presents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Name the node registers under.
    pub node_name: String,

    /// Operating system reported for the node.
    pub operating_system: String,

    /// CPU capacity (Kubernetes quantity).
    pub cpu: String,

    /// Memory capacity (Kubernetes quantity).
    pub memory: String,

    /// Maximum number of pods.
    pub pods: String,

    /// Address reported as the node's InternalIP and as the pods' host IP.
    pub internal_ip: String,

    /// Port the kubelet endpoint listens on.
    pub daemon_endpoint_port: i32,
}

impl NodeConfig {
    /// Load node settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load node settings from an arbitrary key lookup. Needs no account
    /// settings.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut node = Self::default();

        if let Some(v) = get("BATCHLET_NODE_NAME") {
            node.node_name = v;
        }
        if let Some(v) = get("BATCHLET_OPERATING_SYSTEM") {
            node.operating_system = v;
        }
        if let Some(raw) = get("BATCHLET_CPU") {
            node.cpu = quantity("BATCHLET_CPU", raw)?;
        }
        if let Some(raw) = get("BATCHLET_MEMORY") {
            node.memory = quantity("BATCHLET_MEMORY", raw)?;
        }
        if let Some(raw) = get("BATCHLET_PODS") {
            node.pods = parse::<u32>("BATCHLET_PODS", raw)?.to_string();
        }
        if let Some(v) = get("BATCHLET_INTERNAL_IP") {
            node.internal_ip = v;
        }
        if let Some(raw) = get("BATCHLET_DAEMON_PORT") {
            node.daemon_endpoint_port = parse("BATCHLET_DAEMON_PORT", raw)?;
        }

        Ok(node)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_name: "batchlet".to_string(),
            operating_system: "Linux".to_string(),
            cpu: "20".to_string(),
            memory: "100Gi".to_string(),
            pods: "20".to_string(),
            internal_ip: "127.0.0.1".to_string(),
            daemon_endpoint_port: 10250,
        }
    }
}

/// Provider configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Batch account name.
    pub account_name: String,

    /// Batch account region, e.g. `westeurope`.
    pub account_location: String,

    /// Explicit account endpoint; derived from name and location when unset.
    pub batch_url: Option<String>,

    /// Bearer token for the batch service.
    pub access_token: Option<String>,

    /// Pool every task runs on.
    pub pool_id: PoolId,

    /// Job every pod task is added to.
    pub job_id: JobId,

    /// VM size used if the pool has to be created.
    pub pool_vm_size: String,

    /// Dedicated node count used if the pool has to be created.
    pub pool_node_count: u32,

    /// Per-request timeout for remote calls. `None` means no local timeout.
    pub request_timeout_secs: Option<u64>,

    /// Virtual node settings.
    pub node: NodeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account_name: String::new(),
            account_location: String::new(),
            batch_url: None,
            access_token: None,
            pool_id: PoolId::new("batchlet-pool"),
            job_id: JobId::new("batchlet-job"),
            pool_vm_size: "STANDARD_A1_V2".to_string(),
            pool_node_count: 1,
            request_timeout_secs: None,
            node: NodeConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.batch_url = get("AZURE_BATCH_URL");
        config.access_token = get("AZURE_BATCH_ACCESS_TOKEN");

        match (get("AZURE_BATCH_ACCOUNT_NAME"), get("AZURE_BATCH_ACCOUNT_LOCATION")) {
            (Some(name), Some(location)) => {
                config.account_name = name;
                config.account_location = location;
            }
            // An explicit endpoint makes the account coordinates optional.
            (name, location) if config.batch_url.is_some() => {
                config.account_name = name.unwrap_or_default();
                config.account_location = location.unwrap_or_default();
            }
            (None, _) => return Err(ConfigError::Missing("AZURE_BATCH_ACCOUNT_NAME")),
            (_, None) => return Err(ConfigError::Missing("AZURE_BATCH_ACCOUNT_LOCATION")),
        }

        if let Some(pool_id) = get("AZURE_BATCH_POOL_ID") {
            config.pool_id = PoolId::new(pool_id);
        }
        if let Some(job_id) = get("AZURE_BATCH_JOB_ID") {
            config.job_id = JobId::new(job_id);
        }
        if let Some(vm_size) = get("AZURE_BATCH_POOL_VM_SIZE") {
            config.pool_vm_size = vm_size;
        }
        if let Some(raw) = get("AZURE_BATCH_POOL_NODE_COUNT") {
            config.pool_node_count = parse("AZURE_BATCH_POOL_NODE_COUNT", raw)?;
        }
        if let Some(raw) = get("BATCHLET_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = Some(parse("BATCHLET_REQUEST_TIMEOUT_SECS", raw)?);
        }

        config.node = NodeConfig::from_lookup(&lookup)?;

        Ok(config)
    }

    /// Account endpoint the REST client talks to.
    pub fn batch_url(&self) -> String {
        match &self.batch_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!(
                "https://{}.{}.batch.azure.com",
                self.account_name, self.account_location
            ),
        }
    }

    /// Bearer token, required by the REST client.
    pub fn access_token(&self) -> Result<&str, ConfigError> {
        self.access_token
            .as_deref()
            .ok_or(ConfigError::Missing("AZURE_BATCH_ACCESS_TOKEN"))
    }

    /// Per-request timeout, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Pool parameters used by the bootstrapper.
    pub fn pool_spec(&self) -> PoolSpec {
        PoolSpec::new(self.pool_id.clone())
            .with_vm_size(&self.pool_vm_size)
            .with_target_dedicated_nodes(self.pool_node_count)
    }

    /// Job parameters used by the bootstrapper.
    pub fn job_spec(&self) -> JobSpec {
        JobSpec::new(self.job_id.clone(), self.pool_id.clone())
    }
}

fn parse<T>(key: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let parsed = raw.trim().parse::<T>();
    parsed.map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value: raw,
    })
}

/// Accept a Kubernetes resource quantity: a non-negative decimal followed by
/// an optional binary suffix, SI suffix or decimal exponent (`250m`, `1.5Gi`,
/// `2e3`).
fn quantity(key: &'static str, raw: String) -> Result<String, ConfigError> {
    let value = raw.trim();
    let digits_end = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(digits_end);

    let number_ok = !number.is_empty()
        && number != "."
        && number.matches('.').count() <= 1;
    let suffix_ok = match suffix {
        "" | "Ki" | "Mi" | "Gi" | "Ti" | "Pi" | "Ei" => true,
        "n" | "u" | "m" | "k" | "M" | "G" | "T" | "P" | "E" => true,
        _ => suffix
            .strip_prefix(['e', 'E'])
            .map(|exp| exp.strip_prefix(['+', '-']).unwrap_or(exp))
            .is_some_and(|exp| !exp.is_empty() && exp.chars().all(|c| c.is_ascii_digit())),
    };

    if number_ok && suffix_ok {
        Ok(value.to_string())
    } else {
        Err(ConfigError::Invalid {
            key,
            reason: "not a resource quantity".to_string(),
            value: raw,
        })
    }
}
