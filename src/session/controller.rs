//! The session controller: serialization gate, call round-trips, teardown.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{BusyPolicy, SessionConfig};
use crate::framing::CallFrame;
use crate::runtime::{ProvisionError, RuntimeHandle, RuntimeProvisioner};
use crate::sanitize;
use crate::splitter;
use crate::transport::{Transport, TransportError};

use super::{CallResult, SessionError, SessionState};

/// One interpreter session: a runtime, its transport, and accumulated
/// interpreter state.
///
/// The session enforces internal serialization: however many callers share
/// it, at most one call is on the transport at a time. An interactive
/// interpreter fed interleaved input from two callers produces corrupted
/// output, so this gate is the load-bearing invariant of the whole design.
pub struct Session {
    id: String,
    config: SessionConfig,
    provisioner: Arc<dyn RuntimeProvisioner>,
    /// The execution gate. Holding this lock is holding the transport.
    inner: Mutex<Inner>,
    state: Arc<watch::Sender<SessionState>>,
}

struct Inner {
    transport: Option<Box<dyn Transport>>,
    runtime: Option<RuntimeHandle>,
}

impl Session {
    /// Provision a runtime and block until its interpreter is ready.
    ///
    /// The startup handshake silences the interactive prompts and waits for
    /// a ready marker, bounded by the configured startup timeout. On any
    /// failure the runtime is torn down before the error is returned.
    pub async fn start(
        config: SessionConfig,
        spec: crate::config::RuntimeSpec,
        provisioner: Arc<dyn RuntimeProvisioner>,
    ) -> Result<Self, SessionError> {
        let token = Uuid::new_v4().simple().to_string();
        let id = format!("session-{}", &token[..8]);
        let (state, _) = watch::channel(SessionState::Starting);
        info!(session = %id, image = %spec.image, "starting session");

        let (mut runtime, mut transport) = provisioner.start(&spec).await?;

        let frame = CallFrame::for_startup();
        let startup_timeout = config.startup_timeout();
        let primed = async {
            transport.send(frame.payload()).await?;
            transport
                .read_until(frame.terminator(), startup_timeout)
                .await
        }
        .await;

        match primed {
            Ok(_banner) => {}
            Err(e) => {
                warn!(session = %id, error = %e, "interpreter failed to become ready");
                let _ = transport.close().await;
                let _ = provisioner.stop(&mut runtime).await;
                return Err(match e {
                    TransportError::Timeout(_) => ProvisionError::NotReady {
                        waited: startup_timeout,
                    }
                    .into(),
                    _ => ProvisionError::SpawnFailed(
                        "interpreter exited during startup".to_string(),
                    )
                    .into(),
                });
            }
        }

        state.send_replace(SessionState::Ready);
        info!(session = %id, runtime = %runtime.id, "session ready");

        Ok(Self {
            id,
            config,
            provisioner,
            inner: Mutex::new(Inner {
                transport: Some(transport),
                runtime: Some(runtime),
            }),
            state: Arc::new(state),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state, observable while a call is in flight.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Whether the underlying runtime still reports alive.
    pub async fn runtime_alive(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.runtime.as_mut() {
            Some(runtime) => self.provisioner.is_alive(runtime).await,
            None => false,
        }
    }

    /// Execute one fragment against the accumulated interpreter state.
    ///
    /// Calls are serialized: with `BusyPolicy::Queue` a concurrent call
    /// waits FIFO for the gate; with `BusyPolicy::Reject` it fails fast with
    /// `SessionError::Busy`. A timeout or runtime death marks the session
    /// `Errored` and tears the runtime down — partial output from the failed
    /// call is discarded, since the interpreter's state after it cannot be
    /// trusted. Cancelling the returned future mid-call has the same effect.
    pub async fn execute(&self, fragment: &str) -> Result<CallResult, SessionError> {
        let mut inner = match self.config.busy {
            BusyPolicy::Queue => self.inner.lock().await,
            BusyPolicy::Reject => self.inner.try_lock().map_err(|_| SessionError::Busy)?,
        };

        let state = self.state();
        if state != SessionState::Ready {
            return Err(SessionError::Unavailable(state));
        }

        let (Some(transport), Some(runtime)) = (inner.transport.take(), inner.runtime.take())
        else {
            return Err(SessionError::Unavailable(SessionState::Errored));
        };

        self.state.send_replace(SessionState::Executing);
        let started = Instant::now();

        // The guard owns the transport and runtime for the duration of the
        // call. If this future is dropped mid-call, the guard's Drop marks
        // the session errored and tears the runtime down in a background
        // task — an interrupted interactive exchange cannot be resumed.
        let mut guard = CallGuard {
            transport: Some(transport),
            runtime: Some(runtime),
            provisioner: self.provisioner.clone(),
            state: self.state.clone(),
            session: self.id.clone(),
        };

        let outcome = self.run_call(&mut guard, fragment).await;

        match outcome {
            Ok((output, value)) => {
                inner.transport = guard.transport.take();
                inner.runtime = guard.runtime.take();
                self.state.send_replace(SessionState::Ready);
                Ok(CallResult {
                    output,
                    value,
                    duration_ms: started.elapsed().as_millis() as u64,
                })
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "fatal call failure, tearing session down");
                self.state.send_replace(SessionState::Errored);
                guard.teardown().await;
                Err(e)
            }
        }
    }

    /// Close the session and tear down its runtime.
    ///
    /// Sends a best-effort exit instruction, then unconditionally stops the
    /// runtime. `Closed` is reached even if the interpreter never
    /// acknowledges. Closing an already-closed or errored session is a
    /// no-op.
    pub async fn close(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;

        if self.state().is_terminal() {
            return Ok(());
        }
        self.state.send_replace(SessionState::Closing);

        if let Some(mut transport) = inner.transport.take() {
            let farewell = async {
                let _ = transport.send("exit()\n").await;
                let _ = transport.close().await;
            };
            let _ = tokio::time::timeout(self.config.close_timeout(), farewell).await;
        }

        if let Some(mut runtime) = inner.runtime.take() {
            if let Err(e) = self.provisioner.stop(&mut runtime).await {
                warn!(session = %self.id, error = %e, "runtime stop failed during close");
            }
        }

        self.state.send_replace(SessionState::Closed);
        info!(session = %self.id, "session closed");
        Ok(())
    }

    /// One framed round-trip: split, frame, send, await the sentinel, clean.
    async fn run_call(
        &self,
        guard: &mut CallGuard,
        fragment: &str,
    ) -> Result<(String, Option<String>), SessionError> {
        let split = splitter::split(fragment);
        let frame = CallFrame::for_fragment(&split);

        let Some(transport) = guard.transport.as_mut() else {
            return Err(SessionError::Unavailable(SessionState::Errored));
        };

        transport
            .send(frame.payload())
            .await
            .map_err(|_| SessionError::RuntimeCrashed)?;

        let captured = transport
            .read_until(frame.terminator(), self.config.call_timeout())
            .await
            .map_err(|e| match e {
                TransportError::Timeout(elapsed) => SessionError::ExecutionTimeout(elapsed),
                TransportError::Closed | TransportError::Io(_) => SessionError::RuntimeCrashed,
            })?;

        let (raw, value) = frame.parse_capture(&captured)?;
        let output = sanitize::truncate(
            sanitize::clean(&raw, frame.sent_lines()),
            self.config.max_output_bytes,
        );

        debug!(
            session = %self.id,
            output_bytes = output.len(),
            has_value = value.is_some(),
            "call completed"
        );
        Ok((output, value))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state().is_terminal() {
            return;
        }
        let inner = self.inner.get_mut();
        let transport = inner.transport.take();
        let runtime = inner.runtime.take();
        if transport.is_none() && runtime.is_none() {
            return;
        }

        warn!(session = %self.id, "session dropped without close, reclaiming runtime");
        self.state.send_replace(SessionState::Closed);
        spawn_teardown(self.provisioner.clone(), transport, runtime);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// CallGuard
// ============================================================================

/// Owns the transport and runtime while a call is in flight.
struct CallGuard {
    transport: Option<Box<dyn Transport>>,
    runtime: Option<RuntimeHandle>,
    provisioner: Arc<dyn RuntimeProvisioner>,
    state: Arc<watch::Sender<SessionState>>,
    session: String,
}

impl CallGuard {
    /// Tear down in place (fatal-error path).
    async fn teardown(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.close().await;
        }
        if let Some(mut runtime) = self.runtime.take() {
            if let Err(e) = self.provisioner.stop(&mut runtime).await {
                warn!(session = %self.session, error = %e, "runtime stop failed during teardown");
            }
        }
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if self.transport.is_none() && self.runtime.is_none() {
            return;
        }
        // Reached only when the execute future was cancelled mid-call.
        warn!(session = %self.session, "call cancelled mid-flight, tearing session down");
        self.state.send_replace(SessionState::Errored);
        spawn_teardown(
            self.provisioner.clone(),
            self.transport.take(),
            self.runtime.take(),
        );
    }
}

/// Best-effort asynchronous teardown from a non-async context.
fn spawn_teardown(
    provisioner: Arc<dyn RuntimeProvisioner>,
    transport: Option<Box<dyn Transport>>,
    runtime: Option<RuntimeHandle>,
) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            if let Some(mut transport) = transport {
                let _ = transport.close().await;
            }
            if let Some(mut runtime) = runtime {
                let _ = provisioner.stop(&mut runtime).await;
            }
        });
    }
    // Without a reactor the child processes are reclaimed by kill_on_drop
    // when the handles fall out of scope here.
}
