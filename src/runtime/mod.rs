//! Disposable interpreter runtimes.
//!
//! A provisioner creates one isolated execution environment per session and
//! tears it down again. Handles are exclusively owned by the session that
//! started them; the provisioner itself is a stateless factory and may be
//! shared.

mod docker;
mod local;

pub use docker::DockerProvisioner;
pub use local::LocalProvisioner;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::process::Child;
use tracing::debug;

use crate::config::RuntimeSpec;
use crate::transport::Transport;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("runtime backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("image not found: {0}")]
    ImageMissing(String),

    #[error("failed to spawn runtime: {0}")]
    SpawnFailed(String),

    #[error("interpreter did not become ready within {waited:?}")]
    NotReady { waited: Duration },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Creates and destroys disposable interpreter environments.
#[async_trait]
pub trait RuntimeProvisioner: Send + Sync {
    /// Start a fresh environment running an interactive interpreter.
    ///
    /// Returns the handle and the exclusive transport attached to the
    /// interpreter's control terminal.
    async fn start(
        &self,
        spec: &RuntimeSpec,
    ) -> Result<(RuntimeHandle, Box<dyn Transport>), ProvisionError>;

    /// Terminate and remove the environment.
    ///
    /// Idempotent: stopping an already-stopped handle is a no-op. Removal is
    /// always attempted even when termination signaling fails.
    async fn stop(&self, handle: &mut RuntimeHandle) -> Result<(), ProvisionError>;

    /// Report liveness without blocking.
    async fn is_alive(&self, handle: &mut RuntimeHandle) -> bool;
}

// ============================================================================
// RuntimeHandle
// ============================================================================

/// Handle to one running environment.
pub struct RuntimeHandle {
    pub id: String,
    pub spawned_at: DateTime<Utc>,
    /// Container name, when the runtime is containerized.
    pub(crate) container: Option<String>,
    pub(crate) child: Option<Child>,
    pub(crate) stopped: bool,
}

impl RuntimeHandle {
    pub(crate) fn new(id: String, container: Option<String>, child: Child) -> Self {
        Self {
            id,
            spawned_at: Utc::now(),
            container,
            child: Some(child),
            stopped: false,
        }
    }

    /// Handle for a runtime not backed by a child process owned here.
    ///
    /// For provisioner implementations that track liveness themselves (fakes,
    /// remote backends); pair with [`RuntimeHandle::mark_stopped`].
    pub fn detached(id: String) -> Self {
        Self {
            id,
            spawned_at: Utc::now(),
            container: None,
            child: None,
            stopped: false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn mark_stopped(&mut self) {
        self.stopped = true;
    }

    /// Non-blocking liveness probe of the backing child process.
    pub(crate) fn child_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("id", &self.id)
            .field("container", &self.container)
            .field("stopped", &self.stopped)
            .finish()
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// SIGTERM, bounded wait, SIGKILL.
pub(crate) async fn graceful_kill(child: &mut Child, wait: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: libc::kill with a valid pid from Child::id() is safe. The
        // pid comes from the kernel and remains valid while the Child handle
        // exists.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }

        match tokio::time::timeout(wait, child.wait()).await {
            Ok(_) => return,
            Err(_) => {
                debug!(pid, "runtime did not exit after SIGTERM, sending SIGKILL");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = wait;

    let _ = child.kill().await;
    let _ = child.wait().await;
}

/// Configure the child to die with us (Linux only).
pub(crate) fn bind_child_lifetime(cmd: &mut tokio::process::Command) {
    // SAFETY: pre_exec runs in the forked child before exec. PR_SET_PDEATHSIG
    // configures the child to receive SIGTERM when the parent dies. This is
    // safe because the pre-exec callback touches no shared mutable state.
    #[cfg(target_os = "linux")]
    unsafe {
        cmd.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
    #[cfg(not(target_os = "linux"))]
    let _ = cmd;
}

/// Short unique suffix for runtime names.
pub(crate) fn runtime_id(prefix: &str) -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &token[..8])
}
