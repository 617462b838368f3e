//! Host-process runtime provisioner.
//!
//! No isolation — the interpreter runs directly in the host environment.
//! Useful for tests and for trusted local use; resource limits are not
//! enforceable here and are ignored with a warning.

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

const STOP_GRACE: Duration = Duration::from_secs(5);

/// Runs the interpreter directly on the host.
#[derive(Debug, Default)]
pub struct LocalProvisioner;

impl LocalProvisioner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RuntimeProvisioner for LocalProvisioner {
    async fn start(
        &self,
        spec: &RuntimeSpec,
    ) -> Result<(RuntimeHandle, Box<dyn Transport>), ProvisionError> {
        if spec.limits.memory.is_some() || spec.limits.cpus.is_some() || spec.limits.pids.is_some()
        {
            warn!("resource limits are ignored by the local runtime");
        }

        let id = runtime_id("replbox-local");

        let mut cmd = Command::new("sh");
        cmd.args(["-c", &format!("exec {} 2>&1", spec.interpreter)])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(workspace) = &spec.workspace {
            cmd.current_dir(workspace);
        }
        bind_child_lifetime(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ProvisionError::BackendUnavailable("sh not found".into())
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

        debug!(runtime = %id, interpreter = %spec.interpreter, "started local runtime");

        let handle = RuntimeHandle::new(id, None, child);
        Ok((handle, Box::new(ProcessTransport::new(stdin, stdout))))
    }

    async fn stop(&self, handle: &mut RuntimeHandle) -> Result<(), ProvisionError> {
        if handle.stopped {
            return Ok(());
        }
        handle.stopped = true;

        if let Some(mut child) = handle.child.take() {
            graceful_kill(&mut child, STOP_GRACE).await;
        }

        debug!(runtime = %handle.id, "local runtime stopped");
        Ok(())
    }

    async fn is_alive(&self, handle: &mut RuntimeHandle) -> bool {
        !handle.stopped && handle.child_alive()
    }
}
