use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

// ============================================================================
// SessionConfig
// ============================================================================

/// Timeouts and policies for one interpreter session.
///
/// All timeout fields are in seconds so the struct can be deserialized from
/// plain config files; the `Duration` accessors are what the session uses.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Seconds to wait for the interpreter's initial ready marker.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_seconds: u64,

    /// Seconds each `execute` call may take before the session is torn down.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,

    /// Seconds to wait for the runtime to terminate on close.
    #[serde(default = "default_close_timeout")]
    pub close_timeout_seconds: u64,

    /// What to do when `execute` is called while another call is in flight.
    #[serde(default)]
    pub busy: BusyPolicy,

    /// Captured output beyond this many bytes is truncated with a marker.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            startup_timeout_seconds: default_startup_timeout(),
            call_timeout_seconds: default_call_timeout(),
            close_timeout_seconds: default_close_timeout(),
            busy: BusyPolicy::default(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl SessionConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_seconds)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_seconds)
    }
}

/// Policy for a call arriving while another is `Executing`.
///
/// Either way, bytes from two calls never interleave on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// Wait for the in-flight call to finish (FIFO).
    #[default]
    Queue,
    /// Fail fast with `SessionError::Busy`.
    Reject,
}

// ============================================================================
// RuntimeSpec
// ============================================================================

/// Description of the disposable environment a provisioner should create.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSpec {
    /// Container image with the interpreter installed.
    #[serde(default = "default_image")]
    pub image: String,

    /// Interactive interpreter command line, run with stderr merged into
    /// stdout so tracebacks arrive on the same stream in emission order.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    #[serde(default)]
    pub limits: ResourceLimits,

    /// Whether the container gets network access. Off by default.
    #[serde(default)]
    pub network: bool,

    /// Host directory bind-mounted read-write at /workspace.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
}

impl Default for RuntimeSpec {
    fn default() -> Self {
        Self {
            image: default_image(),
            interpreter: default_interpreter(),
            limits: ResourceLimits::default(),
            network: false,
            workspace: None,
        }
    }
}

/// Host-level resource limits for the runtime.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceLimits {
    /// Memory limit in Docker syntax, e.g. "512m".
    #[serde(default)]
    pub memory: Option<String>,

    /// CPU quota, e.g. 1.5.
    #[serde(default)]
    pub cpus: Option<f64>,

    /// Maximum number of processes inside the runtime.
    #[serde(default)]
    pub pids: Option<u32>,
}

// ============================================================================
// Private Helpers (Serde Defaults)
// ============================================================================

fn default_startup_timeout() -> u64 {
    30
}

fn default_call_timeout() -> u64 {
    60
}

fn default_close_timeout() -> u64 {
    5
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

fn default_image() -> String {
    "python:3.12-slim".to_string()
}

fn default_interpreter() -> String {
    "python3 -i -q -u".to_string()
}
