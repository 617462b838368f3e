//! Interpreter session lifecycle.
//!
//! A session owns one runtime and one transport, serializes calls against
//! the interpreter, and guarantees teardown of the runtime on every exit
//! path: explicit close, fatal transport failure, call timeout,
//! cancellation, and drop.

mod controller;

pub use controller::Session;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::framing::FramingError;
use crate::runtime::ProvisionError;

// ============================================================================
// SessionState
// ============================================================================

/// Lifecycle state of a session.
///
/// `Closed` and `Errored` are terminal; no further calls are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Ready,
    Executing,
    Closing,
    Closed,
    Errored,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Errored)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Starting => write!(f, "starting"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Executing => write!(f, "executing"),
            SessionState::Closing => write!(f, "closing"),
            SessionState::Closed => write!(f, "closed"),
            SessionState::Errored => write!(f, "errored"),
        }
    }
}

// ============================================================================
// CallResult
// ============================================================================

/// Outcome of one successful `execute` call.
///
/// Errors raised by the executed fragment itself are not failures: the
/// round-trip completed, and the interpreter's error text is part of
/// `output`.
#[derive(Debug, Clone, Serialize)]
pub struct CallResult {
    /// Everything the call wrote to the interpreter's stdout, in emission
    /// order, cleaned of protocol framing.
    pub output: String,

    /// Textual representation of the trailing expression's value. Absent
    /// when the fragment had no trailing expression; a trailing expression
    /// evaluating to `None` yields `Some("None")` — the two outcomes are
    /// distinct.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    pub duration_ms: u64,
}

// ============================================================================
// SessionError
// ============================================================================

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("another call is in flight")]
    Busy,

    #[error("execution timed out after {0:?}")]
    ExecutionTimeout(Duration),

    #[error("runtime died mid-call")]
    RuntimeCrashed,

    #[error("session is {0}, no further calls accepted")]
    Unavailable(SessionState),

    #[error("framing protocol violated: {0}")]
    Protocol(#[from] FramingError),
}
