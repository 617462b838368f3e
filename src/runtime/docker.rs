//! Docker-backed runtime provisioner.
//!
//! One `docker run --rm -i` container per session, with the interactive
//! interpreter's stderr merged into stdout so tracebacks and prompts arrive
//! on the session transport in emission order.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::RuntimeSpec;
use crate::transport::{ProcessTransport, Transport};

use super::{
    bind_child_lifetime, graceful_kill, runtime_id, ProvisionError, RuntimeHandle,
    RuntimeProvisioner,
};

/// How long to wait for `docker rm -f` / the client process on stop.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Bound on the image pre-flight check.
const INSPECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Provisions one disposable container per session.
#[derive(Debug, Default)]
pub struct DockerProvisioner;

impl DockerProvisioner {
    pub fn new() -> Self {
        Self
    }

    /// Verify the image exists locally before paying for a container start.
    async fn check_image(&self, image: &str) -> Result<(), ProvisionError> {
        let mut cmd = Command::new("docker");
        cmd.args(["image", "inspect", "--format", "ok", image])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let status = tokio::time::timeout(INSPECT_TIMEOUT, cmd.status())
            .await
            .map_err(|_| ProvisionError::BackendUnavailable("docker daemon not responding".into()))?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ProvisionError::BackendUnavailable("docker binary not found".into())
                }
                _ => ProvisionError::Io(e),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(ProvisionError::ImageMissing(image.to_string()))
        }
    }

    fn run_args(&self, name: &str, spec: &RuntimeSpec) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "--rm".into(),
            "-i".into(),
            "--name".into(),
            name.into(),
        ];

        if !spec.network {
            args.push("--network".into());
            args.push("none".into());
        }
        if let Some(memory) = &spec.limits.memory {
            args.push("--memory".into());
            args.push(memory.clone());
        }
        if let Some(cpus) = spec.limits.cpus {
            args.push("--cpus".into());
            args.push(cpus.to_string());
        }
        if let Some(pids) = spec.limits.pids {
            args.push("--pids-limit".into());
            args.push(pids.to_string());
        }
        if let Some(workspace) = &spec.workspace {
            args.push("-v".into());
            args.push(format!("{}:/workspace", workspace.display()));
            args.push("-w".into());
            args.push("/workspace".into());
        }

        args.push(spec.image.clone());
        args.push("sh".into());
        args.push("-c".into());
        args.push(format!("exec {} 2>&1", spec.interpreter));
        args
    }
}

#[async_trait]
impl RuntimeProvisioner for DockerProvisioner {
    async fn start(
        &self,
        spec: &RuntimeSpec,
    ) -> Result<(RuntimeHandle, Box<dyn Transport>), ProvisionError> {
        self.check_image(&spec.image).await?;

        let name = runtime_id("replbox");
        let args = self.run_args(&name, spec);

        let mut cmd = Command::new("docker");
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        bind_child_lifetime(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ProvisionError::BackendUnavailable("docker binary not found".into())
            }
            _ => ProvisionError::SpawnFailed(e.to_string()),
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProvisionError::SpawnFailed("child stdin missing".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProvisionError::SpawnFailed("child stdout missing".into()))?;

        debug!(container = %name, image = %spec.image, "started container runtime");

        let handle = RuntimeHandle::new(name.clone(), Some(name), child);
        Ok((handle, Box::new(ProcessTransport::new(stdin, stdout))))
    }

    async fn stop(&self, handle: &mut RuntimeHandle) -> Result<(), ProvisionError> {
        if handle.stopped {
            return Ok(());
        }
        handle.stopped = true;

        // Remove the container first: killing only the `docker run` client
        // would leave the container behind.
        if let Some(container) = &handle.container {
            let mut cmd = Command::new("docker");
            cmd.args(["rm", "-f", container])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());

            match tokio::time::timeout(STOP_GRACE, cmd.status()).await {
                Ok(Ok(status)) if !status.success() => {
                    debug!(container = %container, "docker rm reported failure (already gone?)");
                }
                Ok(Err(e)) => warn!(container = %container, error = %e, "docker rm failed"),
                Err(_) => warn!(container = %container, "docker rm timed out"),
                _ => {}
            }
        }

        if let Some(mut child) = handle.child.take() {
            graceful_kill(&mut child, STOP_GRACE).await;
        }

        debug!(runtime = %handle.id, "container runtime stopped");
        Ok(())
    }

    async fn is_alive(&self, handle: &mut RuntimeHandle) -> bool {
        !handle.stopped && handle.child_alive()
    }
}
