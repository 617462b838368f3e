//! Transport over a child process's piped stdin/stdout.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::time::Instant;
use tracing::trace;

use super::{Transport, TransportError};

const READ_CHUNK: usize = 8 * 1024;

/// Channel to an interpreter spawned with piped stdio.
///
/// Bytes already read but not yet consumed by a `read_until` match stay in
/// the internal buffer, so output that straddles two reads is never lost.
pub struct ProcessTransport {
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
    buf: Vec<u8>,
}

impl ProcessTransport {
    pub fn new(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            stdin: Some(stdin),
            stdout,
            buf: Vec::new(),
        }
    }

    /// Position one past the end of the first `pattern` match, if any.
    fn find_match(&self, pattern: &[u8]) -> Option<usize> {
        if pattern.is_empty() || self.buf.len() < pattern.len() {
            return None;
        }
        self.buf
            .windows(pattern.len())
            .position(|w| w == pattern)
            .map(|start| start + pattern.len())
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn send(&mut self, text: &str) -> Result<(), TransportError> {
        let stdin = self.stdin.as_mut().ok_or(TransportError::Closed)?;
        stdin.write_all(text.as_bytes()).await?;
        stdin.flush().await?;
        trace!(bytes = text.len(), "sent to interpreter");
        Ok(())
    }

    async fn read_until(
        &mut self,
        pattern: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        let deadline = Instant::now() + timeout;
        let pattern_bytes = pattern.as_bytes();

        loop {
            if let Some(end) = self.find_match(pattern_bytes) {
                let matched: Vec<u8> = self.buf.drain(..end).collect();
                let before = &matched[..matched.len() - pattern_bytes.len()];
                return Ok(String::from_utf8_lossy(before).into_owned());
            }

            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(TransportError::Timeout(timeout))?;

            let mut chunk = [0u8; READ_CHUNK];
            let n = tokio::time::timeout(remaining, self.stdout.read(&mut chunk))
                .await
                .map_err(|_| TransportError::Timeout(timeout))??;

            if n == 0 {
                return Err(TransportError::Closed);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // Dropping stdin sends EOF; many interpreters exit on it.
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }
        Ok(())
    }
}
