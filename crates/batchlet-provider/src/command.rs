//! Command line generation.
//!
//! A task runs exactly one command line, so every container of a pod is
//! folded into a single shell script. The provider treats the script as
//! opaque text; [`CommandGenerator`] is the seam for swapping the strategy.

use k8s_openapi::api::core::v1::{Container, Pod, Volume};
use thiserror::Error;
use tracing::warn;

/// Directory, relative to the task directory, that the task's working
/// directory is exposed under by the file API.
pub const WORKING_DIR: &str = "wd";

/// Variable holding the task working directory on the node.
const WORKING_DIR_VAR: &str = "$AZ_BATCH_TASK_WORKING_DIR";

/// Reasons a pod cannot be turned into a command line.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("pod has no containers")]
    NoContainers,

    #[error("container '{0}' has no image")]
    MissingImage(String),

    #[error("container '{container}' mounts undeclared volume '{volume}'")]
    UnknownVolume { container: String, volume: String },

    #[error("volume '{0}' has an unsupported source (only hostPath and emptyDir are supported)")]
    UnsupportedVolume(String),
}

/// Produces the shell command a pod's task runs.
pub trait CommandGenerator: Send + Sync {
    /// Build the script for every container in `pod`.
    fn generate(&self, pod: &Pod) -> Result<String, CommandError>;
}

/// Path, as the file API sees it, of the captured output of a container.
pub fn container_log_path(container: &str) -> String {
    format!("{}/{}", WORKING_DIR, container)
}

/// Quote a string as a single shell word.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Shell word for the node-side directory backing an emptyDir volume.
fn scratch_dir(volume: &str) -> String {
    format!("\"{}/volumes\"/{}", WORKING_DIR_VAR, shell_quote(volume))
}

/// Wrap a script so the task runs it under bash.
pub fn wrap_for_shell(script: &str) -> String {
    format!("/bin/bash -c {}", shell_quote(script))
}

/// Runs each container with `docker run`, one after the other.
///
/// Each container's combined stdout/stderr is written to a file named after
/// the container in the task working directory. Every container runs even
/// when an earlier one fails; the script exits with the first non-zero
/// container exit code.
#[derive(Debug, Clone, Default)]
pub struct DockerCommandGenerator;

impl DockerCommandGenerator {
    /// Create a new DockerCommandGenerator.
    pub fn new() -> Self {
        Self
    }

    fn volume_source(volume: &Volume) -> Result<String, CommandError> {
        if let Some(host_path) = &volume.host_path {
            return Ok(shell_quote(&host_path.path));
        }
        if volume.empty_dir.is_some() {
            return Ok(scratch_dir(&volume.name));
        }
        Err(CommandError::UnsupportedVolume(volume.name.clone()))
    }

    fn container_command(
        pod_prefix: &str,
        container: &Container,
        volumes: &[Volume],
    ) -> Result<String, CommandError> {
        let image = container
            .image
            .as_deref()
            .filter(|i| !i.is_empty())
            .ok_or_else(|| CommandError::MissingImage(container.name.clone()))?;

        let mut words = vec![
            "docker".to_string(),
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            shell_quote(&format!("{}_{}", pod_prefix, container.name)),
        ];

        for var in container.env.iter().flatten() {
            match &var.value {
                Some(value) => {
                    words.push("-e".to_string());
                    words.push(shell_quote(&format!("{}={}", var.name, value)));
                }
                None if var.value_from.is_some() => {
                    warn!(
                        container = %container.name,
                        env = %var.name,
                        "valueFrom environment variables are not supported; skipping"
                    );
                }
                None => {
                    words.push("-e".to_string());
                    words.push(shell_quote(&format!("{}=", var.name)));
                }
            }
        }

        for mount in container.volume_mounts.iter().flatten() {
            let volume = volumes.iter().find(|v| v.name == mount.name).ok_or_else(|| {
                CommandError::UnknownVolume {
                    container: container.name.clone(),
                    volume: mount.name.clone(),
                }
            })?;
            let mode = if mount.read_only.unwrap_or(false) {
                ":ro"
            } else {
                ""
            };
            words.push("-v".to_string());
            words.push(format!(
                "{}:{}",
                Self::volume_source(volume)?,
                shell_quote(&format!("{}{}", mount.mount_path, mode))
            ));
        }

        if let Some(dir) = container.working_dir.as_deref().filter(|d| !d.is_empty()) {
            words.push("-w".to_string());
            words.push(shell_quote(dir));
        }

        // Kubernetes `command` replaces the entrypoint; docker only accepts the
        // executable there, so the rest goes after the image.
        let command = container.command.as_deref().unwrap_or_default();
        if let Some((entrypoint, rest)) = command.split_first() {
            words.push("--entrypoint".to_string());
            words.push(shell_quote(entrypoint));
            words.push(shell_quote(image));
            words.extend(rest.iter().map(|w| shell_quote(w)));
        } else {
            words.push(shell_quote(image));
        }
        words.extend(container.args.iter().flatten().map(|w| shell_quote(w)));

        Ok(format!(
            "{} > \"{}\"/{} 2>&1",
            words.join(" "),
            WORKING_DIR_VAR,
            shell_quote(&container.name)
        ))
    }
}

impl CommandGenerator for DockerCommandGenerator {
    fn generate(&self, pod: &Pod) -> Result<String, CommandError> {
        let spec = pod.spec.as_ref().ok_or(CommandError::NoContainers)?;
        if spec.containers.is_empty() {
            return Err(CommandError::NoContainers);
        }

        let volumes = spec.volumes.as_deref().unwrap_or_default();
        let pod_prefix = format!(
            "{}_{}",
            pod.metadata.namespace.as_deref().unwrap_or("default"),
            pod.metadata.name.as_deref().unwrap_or("pod")
        );

        let mut lines = Vec::new();
        for volume in volumes.iter().filter(|v| v.empty_dir.is_some()) {
            lines.push(format!("mkdir -p {}", scratch_dir(&volume.name)));
        }

        lines.push("rc=0".to_string());
        for container in &spec.containers {
            lines.push(Self::container_command(&pod_prefix, container, volumes)?);
            lines.push("s=$?; [ \"$rc\" -eq 0 ] && rc=$s".to_string());
        }
        lines.push("exit $rc".to_string());

        Ok(lines.join("\n"))
    }
}
