// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::channel::MessagePort;
use crate::config::consts::{
    DEFAULT_APP_NAME, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_STARTUP_TIMEOUT_MS,
    DEFAULT_STOP_GRACE_MS, MAX_TIMEOUT_MS,
};
use crate::errors::{UpmError, UpmResult};
use crate::observability::messages::process::ProcessSpawning;
use crate::observability::messages::StructuredLog;
use crate::process::actor::{ExecuteCommand, HandleActor, HandleCommand};
use crate::process::state::{Lifecycle, ProcessState};
use crate::protocol::Payload;
use crate::traits::{EntryPoint, ProcessLauncher};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Per-handle timing and identity settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleSettings {
    /// Exported to the worker as `APP_NAME`
    pub app_name: String,
    /// Budget for a request when the caller gives none
    pub request_timeout: Duration,
    /// Time the worker has to report ready
    pub startup_timeout: Duration,
    /// Time between the terminate signal and a forced kill on stop
    pub stop_grace: Duration,
}

impl Default for HandleSettings {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            startup_timeout: Duration::from_millis(DEFAULT_STARTUP_TIMEOUT_MS),
            stop_grace: Duration::from_millis(DEFAULT_STOP_GRACE_MS),
        }
    }
}

impl HandleSettings {
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}

/// Options for a single request.
///
/// A timeout above `consts::MAX_TIMEOUT_MS` is rejected with `InvalidTimeout`.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Overrides the handle's default request timeout
    pub timeout: Option<Duration>,
    /// Cancelling this token rejects the request with `Cancelled`
    pub cancel_token: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}

/// Point-in-time view of a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleSnapshot {
    pub service_id: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    /// Outstanding request ids, ascending
    pub pending_requests: Vec<u64>,
    /// Clients with an open channel, sorted
    pub client_channels: Vec<String>,
}

/// Cloneable handle to one supervised worker process.
///
/// All clones share the same actor. When the last clone is dropped the actor
/// tears the worker down on its own.
#[derive(Clone)]
pub struct ProcessHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    service_id: String,
    entry_point: EntryPoint,
    settings: HandleSettings,
    launcher: Arc<dyn ProcessLauncher>,
    lifecycle: Arc<Lifecycle>,
    commands: mpsc::UnboundedSender<HandleCommand>,
    // Taken by `spawn`, or by `stop` on a handle that was never spawned.
    unspawned: Mutex<Option<mpsc::UnboundedReceiver<HandleCommand>>>,
    next_request_id: AtomicU64,
    stopped: OnceCell<()>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("service_id", &self.inner.service_id)
            .field("entry_point", &self.inner.entry_point)
            .field("state", &self.inner.lifecycle.current())
            .finish()
    }
}

impl ProcessHandle {
    /// Construct a handle in the `Created` state. Nothing is launched until
    /// [`spawn`](Self::spawn).
    pub fn new(
        service_id: &str,
        entry_point: EntryPoint,
        settings: HandleSettings,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(HandleInner {
                service_id: service_id.to_string(),
                entry_point,
                settings,
                launcher,
                lifecycle: Arc::new(Lifecycle::new(service_id)),
                commands,
                unspawned: Mutex::new(Some(receiver)),
                next_request_id: AtomicU64::new(1),
                stopped: OnceCell::new(),
            }),
        }
    }

    pub fn service_id(&self) -> &str {
        &self.inner.service_id
    }

    pub fn entry_point(&self) -> &EntryPoint {
        &self.inner.entry_point
    }

    pub fn settings(&self) -> &HandleSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> ProcessState {
        self.inner.lifecycle.current()
    }

    /// Whether two handles refer to the same worker.
    pub fn same_handle(&self, other: &ProcessHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Launch the worker and move to `Spawning`.
    ///
    /// Returns immediately; use [`when_ready`](Self::when_ready) to wait for
    /// the outcome. Fails with `NotRunning` if the handle was already spawned
    /// or stopped.
    pub fn spawn(&self) -> UpmResult<()> {
        let receiver = self
            .inner
            .unspawned
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or_else(|| UpmError::not_running(&self.inner.service_id))?;

        self.inner.lifecycle.transition(ProcessState::Spawning);

        let entry_point = self.inner.entry_point.to_string();
        let span = ProcessSpawning {
            service_id: &self.inner.service_id,
            entry_point: &entry_point,
        }
        .span("handle");

        let actor = HandleActor::new(
            &self.inner.service_id,
            self.inner.entry_point.clone(),
            self.inner.settings.clone(),
            self.inner.launcher.clone(),
            self.inner.lifecycle.clone(),
            receiver,
        );
        tokio::spawn(actor.run().instrument(span));
        Ok(())
    }

    /// Resolve once the worker reports ready.
    ///
    /// Fails with `SpawnFailure` if it exits (or times out) first, and with
    /// `NotRunning` once the handle is stopping or stopped. On a handle that
    /// has not been spawned yet this waits for `spawn` or `stop`.
    pub async fn when_ready(&self) -> UpmResult<()> {
        match self.inner.lifecycle.settled().await {
            ProcessState::Ready => Ok(()),
            ProcessState::Failed { reason } => {
                Err(UpmError::spawn_failure(&self.inner.service_id, reason))
            }
            _ => Err(UpmError::not_running(&self.inner.service_id)),
        }
    }

    /// Like `when_ready`, but a handle nobody has spawned is not waited on.
    async fn ready_to_serve(&self) -> UpmResult<()> {
        if self.state() == ProcessState::Created {
            return Err(UpmError::not_running(&self.inner.service_id));
        }
        self.when_ready().await
    }

    /// Send a request and wait for its correlated response, using the
    /// handle's default timeout when `timeout` is `None`.
    ///
    /// Fails with `NotRunning` right away on a handle that was never spawned.
    pub async fn execute_request(
        &self,
        kind: &str,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> UpmResult<Payload> {
        let options = RequestOptions {
            timeout,
            cancel_token: None,
        };
        self.execute_request_with(kind, payload, options).await
    }

    pub async fn execute_request_with(
        &self,
        kind: &str,
        payload: Payload,
        options: RequestOptions,
    ) -> UpmResult<Payload> {
        let timeout = options.timeout.unwrap_or(self.inner.settings.request_timeout);
        let max = Duration::from_millis(MAX_TIMEOUT_MS);
        if timeout > max {
            return Err(UpmError::InvalidTimeout {
                kind: kind.to_string(),
                timeout,
                max,
            });
        }
        self.ready_to_serve().await?;

        let id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (reply, outcome) = oneshot::channel();

        self.inner
            .commands
            .send(HandleCommand::Execute(ExecuteCommand {
                id,
                kind: kind.to_string(),
                payload,
                timeout,
                reply,
            }))
            .map_err(|_| UpmError::not_running(&self.inner.service_id))?;

        let outcome = match options.cancel_token {
            Some(token) => {
                tokio::select! {
                    outcome = outcome => outcome,
                    _ = token.cancelled() => {
                        let _ = self.inner.commands.send(HandleCommand::Cancel { id });
                        return Err(UpmError::cancelled("request cancelled by caller"));
                    }
                }
            }
            None => outcome.await,
        };

        // The actor drops the sink only when it shuts down underneath us.
        outcome.unwrap_or_else(|_| Err(UpmError::cancelled("handle shut down")))
    }

    /// Typed convenience over [`execute_request`](Self::execute_request).
    pub async fn execute_typed<Req, Resp>(&self, kind: &str, request: &Req) -> UpmResult<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_value(request).map_err(|e| UpmError::InvalidPayload {
            kind: kind.to_string(),
            reason: e.to_string(),
        })?;
        let response = self.execute_request(kind, payload, None).await?;
        serde_json::from_value(response).map_err(|e| UpmError::InvalidPayload {
            kind: kind.to_string(),
            reason: e.to_string(),
        })
    }

    /// Post a message that expects no response.
    pub fn send_event(&self, kind: &str, payload: Payload) -> UpmResult<()> {
        if self.state() != ProcessState::Ready {
            return Err(UpmError::not_running(&self.inner.service_id));
        }
        self.inner
            .commands
            .send(HandleCommand::Event {
                kind: kind.to_string(),
                payload,
            })
            .map_err(|_| UpmError::not_running(&self.inner.service_id))
    }

    /// Open a bulk channel between `client_id` and the worker.
    ///
    /// Returns the caller's endpoint. An existing channel for the same client
    /// is closed and replaced.
    pub async fn create_message_channel(&self, client_id: &str) -> UpmResult<MessagePort> {
        self.ready_to_serve().await?;

        let (reply, port) = oneshot::channel();
        self.inner
            .commands
            .send(HandleCommand::OpenChannel {
                client_id: client_id.to_string(),
                reply,
            })
            .map_err(|_| UpmError::not_running(&self.inner.service_id))?;

        port.await
            .unwrap_or_else(|_| Err(UpmError::not_running(&self.inner.service_id)))
    }

    /// Stop the worker. Idempotent: concurrent and repeated callers all wait
    /// on the same teardown, and the worker is terminated once.
    pub async fn stop(&self) {
        self.inner
            .stopped
            .get_or_init(|| async {
                let never_spawned = self
                    .inner
                    .unspawned
                    .lock()
                    .ok()
                    .and_then(|mut slot| slot.take())
                    .is_some();
                if never_spawned {
                    self.inner.lifecycle.transition(ProcessState::Stopped);
                    return;
                }

                let (reply, done) = oneshot::channel();
                if self.inner.commands.send(HandleCommand::Stop { reply }).is_ok() {
                    // Err means the actor already finished; nothing left to stop.
                    let _ = done.await;
                }
            })
            .await;
    }

    pub async fn snapshot(&self) -> HandleSnapshot {
        // No actor answers until the handle has been spawned.
        if self.state() != ProcessState::Created {
            let (reply, snapshot) = oneshot::channel();
            if self.inner.commands.send(HandleCommand::Inspect { reply }).is_ok() {
                if let Ok(snapshot) = snapshot.await {
                    return snapshot;
                }
            }
        }

        HandleSnapshot {
            service_id: self.inner.service_id.clone(),
            state: self.state(),
            pid: None,
            pending_requests: Vec::new(),
            client_channels: Vec::new(),
        }
    }
}
