//! Byte-stream channel to an interactive interpreter.
//!
//! The transport is exclusively owned by one session; nothing else may read
//! or write it. `read_until` is the only place the crate blocks on
//! interpreter output, so timeout and stream-end handling live here.

mod process;

pub use process::ProcessTransport;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timed out after {0:?} waiting for pattern")]
    Timeout(Duration),

    #[error("stream closed before pattern appeared")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Duplex text channel attached to an interpreter's control terminal.
#[async_trait]
pub trait Transport: Send {
    /// Write raw bytes to the interpreter. No implicit newline.
    async fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Block until `pattern` appears in the stream or `timeout` elapses.
    ///
    /// Returns everything observed before the match and consumes through the
    /// end of the match. Fails with `Timeout` or, when the interpreter exits
    /// before the pattern appears, with `Closed`.
    async fn read_until(
        &mut self,
        pattern: &str,
        timeout: Duration,
    ) -> Result<String, TransportError>;

    /// Release the stream.
    async fn close(&mut self) -> Result<(), TransportError>;
}
