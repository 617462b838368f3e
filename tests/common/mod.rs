//! Common test utilities: a scripted in-memory transport and a fake
//! provisioner, so framing, sanitization, and lifecycle logic can be
//! exercised without any real isolated runtime.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use replbox::runtime::RuntimeHandle;
use replbox::{ProvisionError, RuntimeProvisioner, RuntimeSpec, Transport, TransportError};

/// Record of every payload written to a scripted transport.
pub type SentLog = Arc<Mutex<Vec<String>>>;

/// Behavior of one `execute` round-trip against the scripted transport.
pub enum ScriptedCall {
    /// Respond like an interpreter: emit `output`, then the marker region.
    Reply {
        output: &'static str,
        value: Option<&'static str>,
        delay: Duration,
    },
    /// Emit a marker with a corrupted region.
    Corrupt,
    /// Never produce the terminator (the call must time out).
    Hang,
    /// Stream ends before the terminator (the interpreter died).
    Die,
}

impl ScriptedCall {
    pub fn reply(output: &'static str, value: Option<&'static str>) -> Self {
        Self::Reply {
            output,
            value,
            delay: Duration::ZERO,
        }
    }

    pub fn slow_reply(output: &'static str, value: Option<&'static str>, delay_ms: u64) -> Self {
        Self::Reply {
            output,
            value,
            delay: Duration::from_millis(delay_ms),
        }
    }
}

/// In-memory transport that answers the framing protocol from a script.
///
/// The startup handshake (terminator without the leading `:`) is always
/// answered; each subsequent `read_until` consumes one script entry.
pub struct ScriptedTransport {
    script: VecDeque<ScriptedCall>,
    sent: SentLog,
    closed: bool,
}

impl ScriptedTransport {
    pub fn new(script: Vec<ScriptedCall>) -> (Self, SentLog) {
        let sent: SentLog = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                script: script.into(),
                sent: sent.clone(),
                closed: false,
            },
            sent,
        )
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, text: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn read_until(
        &mut self,
        pattern: &str,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        // Startup handshake: the ready terminator is `<sentinel>\n`, while
        // call terminators are `:<sentinel>\n`.
        if !pattern.starts_with(':') {
            return Ok(">>> ".to_string());
        }
        let sentinel = pattern
            .strip_prefix(':')
            .and_then(|p| p.strip_suffix('\n'))
            .expect("call terminator shape");

        match self.script.pop_front() {
            Some(ScriptedCall::Reply {
                output,
                value,
                delay,
            }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let region = match value {
                    Some(v) => format!("V{v}"),
                    None => "N".to_string(),
                };
                Ok(format!("{output}\n{sentinel}:{region}"))
            }
            Some(ScriptedCall::Corrupt) => Ok(format!("{sentinel}:Zgarbage")),
            Some(ScriptedCall::Hang) => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::Timeout(timeout))
            }
            Some(ScriptedCall::Die) => {
                self.closed = true;
                Err(TransportError::Closed)
            }
            None => panic!("scripted transport exhausted"),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}

/// Provisioner handing out pre-scripted transports.
pub struct FakeProvisioner {
    transports: Mutex<VecDeque<ScriptedTransport>>,
    stops: AtomicUsize,
}

impl FakeProvisioner {
    /// Provisioner for a single session with the given call script.
    pub fn single(script: Vec<ScriptedCall>) -> (Arc<Self>, SentLog) {
        let (transport, sent) = ScriptedTransport::new(script);
        let provisioner = Arc::new(Self {
            transports: Mutex::new(VecDeque::from([transport])),
            stops: AtomicUsize::new(0),
        });
        (provisioner, sent)
    }

    /// How many runtimes have actually been stopped.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuntimeProvisioner for FakeProvisioner {
    async fn start(
        &self,
        _spec: &RuntimeSpec,
    ) -> Result<(RuntimeHandle, Box<dyn Transport>), ProvisionError> {
        let transport = self
            .transports
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProvisionError::BackendUnavailable("script exhausted".into()))?;
        let handle = RuntimeHandle::detached(format!("fake-{}", self.stop_count()));
        Ok((handle, Box::new(transport)))
    }

    async fn stop(&self, handle: &mut RuntimeHandle) -> Result<(), ProvisionError> {
        if !handle.is_stopped() {
            handle.mark_stopped();
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn is_alive(&self, handle: &mut RuntimeHandle) -> bool {
        !handle.is_stopped()
    }
}
