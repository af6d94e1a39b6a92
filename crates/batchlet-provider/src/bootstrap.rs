//! Pool and job bootstrap.
//!
//! Both calls are create-or-get: an existing pool or job is used unchanged,
//! a missing one is created from the configured parameters. Creating a pool
//! provisions (billable) nodes.

use tracing::{info, warn};

use batchlet_client::BatchClient;
use batchlet_core::{JobHandle, PoolHandle};

use crate::config::Config;
use crate::error::ProviderError;

/// Make sure the configured pool exists.
pub async fn ensure_pool(
    client: &dyn BatchClient,
    config: &Config,
) -> Result<PoolHandle, ProviderError> {
    let spec = config.pool_spec();
    let pool = client
        .create_or_get_pool(&spec)
        .await
        .map_err(|source| ProviderError::Bootstrap {
            resource: format!("pool {}", spec.id),
            source,
        })?;

    if pool.created {
        info!(
            pool_id = %pool.id,
            vm_size = %spec.vm_size,
            nodes = spec.target_dedicated_nodes,
            "Created pool"
        );
    } else {
        info!(pool_id = %pool.id, "Using existing pool");
    }

    Ok(pool)
}

/// Make sure the configured job exists.
pub async fn ensure_job(
    client: &dyn BatchClient,
    config: &Config,
) -> Result<JobHandle, ProviderError> {
    let spec = config.job_spec();
    let job = client
        .create_or_get_job(&spec)
        .await
        .map_err(|source| ProviderError::Bootstrap {
            resource: format!("job {}", spec.id),
            source,
        })?;

    if job.created {
        info!(job_id = %job.id, pool_id = %job.pool_info.pool_id, "Created job");
    } else {
        info!(job_id = %job.id, "Using existing job");
    }

    if job.pool_info.pool_id != config.pool_id {
        warn!(
            job_id = %job.id,
            job_pool = %job.pool_info.pool_id,
            configured_pool = %config.pool_id,
            "Existing job is bound to a different pool; tasks will run there"
        );
    }

    Ok(job)
}
