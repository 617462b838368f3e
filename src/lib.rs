//! Persistent, sandboxed interactive interpreter sessions.
//!
//! A [`Session`] drives one disposable interpreter runtime over a textual
//! control channel: submit a code fragment, get back everything it printed
//! plus the value of its trailing expression, while interpreter state
//! accumulates across calls.
//!
//! ```no_run
//! use std::sync::Arc;
//! use replbox::{DockerProvisioner, RuntimeSpec, Session, SessionConfig};
//!
//! # async fn demo() -> Result<(), replbox::SessionError> {
//! let session = Session::start(
//!     SessionConfig::default(),
//!     RuntimeSpec::default(),
//!     Arc::new(DockerProvisioner::new()),
//! )
//! .await?;
//!
//! session.execute("x = 10").await?;
//! let result = session.execute("x + 5").await?;
//! assert_eq!(result.value.as_deref(), Some("15"));
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod framing;
pub mod runtime;
pub mod sanitize;
pub mod session;
pub mod splitter;
pub mod transport;

pub use config::{BusyPolicy, ResourceLimits, RuntimeSpec, SessionConfig};
pub use runtime::{
    DockerProvisioner, LocalProvisioner, ProvisionError, RuntimeHandle, RuntimeProvisioner,
};
pub use session::{CallResult, Session, SessionError, SessionState};
pub use transport::{Transport, TransportError};
