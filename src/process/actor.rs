// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::channel::{message_channel, ChannelRegistry, MessagePort};
use crate::errors::{UpmError, UpmResult};
use crate::observability::messages::channel::{
    ChannelTransferFailed, ClientChannelClosed, ClientChannelOpened, ClientChannelReplaced,
};
use crate::observability::messages::process::{
    MessageBeforeReady, ProcessExited, ProcessReady, ProcessSpawnFailed, ProcessSpawning,
    ProcessStopped, ProcessStopping,
};
use crate::observability::messages::request::{
    EventRelayed, PendingRequestsCancelled, RequestCompleted, RequestDispatched, RequestFailed,
    ResponseDropped, ResponseKindMismatch,
};
use crate::observability::messages::StructuredLog;
use crate::process::handle::{HandleSettings, HandleSnapshot};
use crate::process::pending::{PendingRequest, PendingRequestTable, ResultSink};
use crate::process::state::{Lifecycle, ProcessState};
use crate::protocol::{Envelope, Payload, ENV_APP_NAME, ENV_IN_CHILD_PROCESS, ENV_SERVICE_ID};
use crate::traits::{ChildLink, EntryPoint, LaunchSpec, PortTransfer, ProcessLauncher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Reported when the launcher drops the exit notifier without a code.
const UNKNOWN_EXIT_CODE: i32 = -1;

pub(crate) struct ExecuteCommand {
    pub id: u64,
    pub kind: String,
    pub payload: Payload,
    pub timeout: Duration,
    pub reply: ResultSink,
}

/// Requests from handle clones to the actor.
pub(crate) enum HandleCommand {
    Execute(ExecuteCommand),
    Cancel {
        id: u64,
    },
    Event {
        kind: String,
        payload: Payload,
    },
    OpenChannel {
        client_id: String,
        reply: oneshot::Sender<UpmResult<MessagePort>>,
    },
    Inspect {
        reply: oneshot::Sender<HandleSnapshot>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

enum Startup {
    Ready,
    Failed(String),
    Stopped,
}

/// Owns one worker for its whole life.
///
/// The pending-request table, the channel registry and the child link are only
/// ever touched from [`run`](Self::run), so each request is resolved exactly
/// once without any locking.
pub(crate) struct HandleActor {
    service_id: String,
    entry_point: EntryPoint,
    settings: HandleSettings,
    launcher: Arc<dyn ProcessLauncher>,
    lifecycle: Arc<Lifecycle>,
    commands: mpsc::UnboundedReceiver<HandleCommand>,
    pending: PendingRequestTable,
    channels: ChannelRegistry,
    channel_closed_tx: mpsc::UnboundedSender<(String, u64)>,
    channel_closed_rx: mpsc::UnboundedReceiver<(String, u64)>,
    pid: Option<u32>,
    terminate: Option<CancellationToken>,
}

impl HandleActor {
    pub fn new(
        service_id: &str,
        entry_point: EntryPoint,
        settings: HandleSettings,
        launcher: Arc<dyn ProcessLauncher>,
        lifecycle: Arc<Lifecycle>,
        commands: mpsc::UnboundedReceiver<HandleCommand>,
    ) -> Self {
        let (channel_closed_tx, channel_closed_rx) = mpsc::unbounded_channel();
        Self {
            service_id: service_id.to_string(),
            entry_point,
            settings,
            launcher,
            lifecycle,
            commands,
            pending: PendingRequestTable::new(),
            channels: ChannelRegistry::new(),
            channel_closed_tx,
            channel_closed_rx,
            pid: None,
            terminate: None,
        }
    }

    pub async fn run(mut self) {
        let started = Instant::now();
        let entry_point = self.entry_point.to_string();
        ProcessSpawning {
            service_id: &self.service_id,
            entry_point: &entry_point,
        }
        .log();

        let spec = LaunchSpec {
            service_id: self.service_id.clone(),
            entry_point: self.entry_point.clone(),
            env: self.child_env(),
            stop_grace: self.settings.stop_grace,
        };
        let mut link = match self.launcher.launch(spec).await {
            Ok(link) => link,
            Err(UpmError::SpawnFailure { reason, .. }) => return self.fail(&reason),
            Err(other) => return self.fail(&other.to_string()),
        };
        self.pid = link.pid;
        self.terminate = Some(link.terminate.clone());

        match self.await_ready(&mut link).await {
            Startup::Ready => {
                self.lifecycle.transition(ProcessState::Ready);
                ProcessReady {
                    service_id: &self.service_id,
                    pid: self.pid,
                    startup: started.elapsed(),
                }
                .log();
                self.serve(link).await;
            }
            Startup::Failed(reason) => self.fail(&reason),
            Startup::Stopped => {}
        }
    }

    fn child_env(&self) -> Vec<(String, String)> {
        vec![
            (ENV_IN_CHILD_PROCESS.to_string(), "true".to_string()),
            (ENV_APP_NAME.to_string(), self.settings.app_name.clone()),
            (ENV_SERVICE_ID.to_string(), self.service_id.clone()),
        ]
    }

    fn fail(&mut self, reason: &str) {
        ProcessSpawnFailed {
            service_id: &self.service_id,
            reason,
        }
        .log();
        self.lifecycle.transition(ProcessState::Failed {
            reason: reason.to_string(),
        });
    }

    /// Race the readiness signal against exit, the startup deadline and stop.
    async fn await_ready(&mut self, link: &mut ChildLink) -> Startup {
        let deadline = tokio::time::sleep(self.settings.startup_timeout);
        tokio::pin!(deadline);
        let mut inbound_open = true;

        loop {
            tokio::select! {
                message = link.inbound.recv(), if inbound_open => match message {
                    Some(envelope) if envelope.is_ready() => return Startup::Ready,
                    Some(envelope) => MessageBeforeReady {
                        service_id: &self.service_id,
                        kind: &envelope.kind,
                        request_id: envelope.request_id,
                    }
                    .log(),
                    None => inbound_open = false,
                },
                code = &mut link.exited => {
                    let code = code.unwrap_or(UNKNOWN_EXIT_CODE);
                    self.log_exit(code, false);
                    return Startup::Failed(format!(
                        "process exited with code {} before signalling ready",
                        code
                    ));
                }
                _ = &mut deadline => {
                    let code = terminate(link).await;
                    self.log_exit(code, true);
                    return Startup::Failed(format!(
                        "no ready signal within {:?}",
                        self.settings.startup_timeout
                    ));
                }
                command = self.commands.recv() => match command {
                    Some(HandleCommand::Stop { reply }) => {
                        self.abort_startup(link).await;
                        let _ = reply.send(());
                        return Startup::Stopped;
                    }
                    None => {
                        self.abort_startup(link).await;
                        return Startup::Stopped;
                    }
                    Some(HandleCommand::Inspect { reply }) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(other) => self.reject(other),
                },
            }
        }
    }

    async fn abort_startup(&mut self, link: &mut ChildLink) {
        let code = terminate(link).await;
        self.log_exit(code, true);
        self.lifecycle.transition(ProcessState::Failed {
            reason: "stopped before ready".to_string(),
        });
    }

    async fn serve(&mut self, link: ChildLink) {
        let ChildLink {
            outbound,
            mut inbound,
            mut exited,
            terminate,
            ports,
            ..
        } = link;
        let mut inbound_open = true;

        loop {
            tokio::select! {
                biased;

                message = inbound.recv(), if inbound_open => match message {
                    Some(envelope) => self.on_message(envelope),
                    None => inbound_open = false,
                },
                Some(expired) = self.pending.next_expired(), if !self.pending.is_empty() => {
                    self.on_timeout(expired);
                }
                Some((client_id, serial)) = self.channel_closed_rx.recv() => {
                    self.on_channel_closed(&client_id, serial);
                }
                command = self.commands.recv() => match command {
                    Some(HandleCommand::Stop { reply }) => {
                        self.shutdown(&terminate, &mut exited).await;
                        let _ = reply.send(());
                        return;
                    }
                    // Every handle clone is gone.
                    None => {
                        self.shutdown(&terminate, &mut exited).await;
                        return;
                    }
                    Some(command) => self.on_command(command, &outbound, ports.as_ref()).await,
                },
                code = &mut exited => {
                    self.on_exit(code.unwrap_or(UNKNOWN_EXIT_CODE));
                    return;
                }
            }
        }
    }

    async fn on_command(
        &mut self,
        command: HandleCommand,
        outbound: &mpsc::UnboundedSender<Envelope>,
        ports: &dyn PortTransfer,
    ) {
        match command {
            HandleCommand::Execute(command) => self.dispatch(command, outbound),
            HandleCommand::Cancel { id } => {
                if let Some(request) = self.pending.take(id) {
                    self.finish(request, Err(UpmError::cancelled("request cancelled by caller")));
                }
            }
            HandleCommand::Event { kind, payload } => {
                if outbound.send(Envelope::event(kind.as_str(), payload)).is_ok() {
                    EventRelayed {
                        service_id: &self.service_id,
                        kind: &kind,
                        inbound: false,
                    }
                    .log();
                }
            }
            HandleCommand::OpenChannel { client_id, reply } => {
                let port = self.open_channel(&client_id, outbound, ports).await;
                let _ = reply.send(port);
            }
            HandleCommand::Inspect { reply } => {
                let _ = reply.send(self.snapshot());
            }
            // Intercepted by `serve`.
            HandleCommand::Stop { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn dispatch(&mut self, command: ExecuteCommand, outbound: &mpsc::UnboundedSender<Envelope>) {
        let ExecuteCommand {
            id,
            kind,
            payload,
            timeout,
            reply,
        } = command;

        self.pending.insert(id, &kind, timeout, reply);
        if outbound.send(Envelope::request(kind.as_str(), id, payload)).is_err() {
            if let Some(request) = self.pending.take(id) {
                self.finish(request, Err(UpmError::not_running(&self.service_id)));
            }
            return;
        }

        RequestDispatched {
            service_id: &self.service_id,
            request_id: id,
            kind: &kind,
            timeout,
        }
        .log();
    }

    fn on_message(&mut self, envelope: Envelope) {
        if !envelope.expects_reply() {
            EventRelayed {
                service_id: &self.service_id,
                kind: &envelope.kind,
                inbound: true,
            }
            .log();
            return;
        }

        let Some(request) = self.pending.take(envelope.request_id) else {
            ResponseDropped {
                service_id: &self.service_id,
                request_id: envelope.request_id,
                kind: &envelope.kind,
            }
            .log();
            return;
        };

        if request.kind != envelope.kind {
            ResponseKindMismatch {
                service_id: &self.service_id,
                request_id: request.id,
                expected: &request.kind,
                actual: &envelope.kind,
            }
            .log();
        }
        self.finish(request, envelope.into_outcome());
    }

    fn on_timeout(&mut self, request: PendingRequest) {
        let error = UpmError::RequestTimeout {
            request_id: request.id,
            kind: request.kind.clone(),
            timeout: request.timeout,
        };
        self.finish(request, Err(error));
    }

    fn finish(&self, request: PendingRequest, outcome: UpmResult<Payload>) {
        match &outcome {
            Ok(_) => RequestCompleted {
                service_id: &self.service_id,
                request_id: request.id,
                kind: &request.kind,
                duration: request.dispatched_at.elapsed(),
            }
            .log(),
            Err(error) => RequestFailed {
                service_id: &self.service_id,
                request_id: request.id,
                kind: &request.kind,
                error,
            }
            .log(),
        }
        request.resolve(outcome);
    }

    fn cancel_pending(&mut self, reason: &str) {
        let drained = self.pending.drain();
        if drained.is_empty() {
            return;
        }
        PendingRequestsCancelled {
            service_id: &self.service_id,
            count: drained.len(),
            reason,
        }
        .log();
        for request in drained {
            request.resolve(Err(UpmError::cancelled(reason)));
        }
    }

    async fn open_channel(
        &mut self,
        client_id: &str,
        outbound: &mpsc::UnboundedSender<Envelope>,
        ports: &dyn PortTransfer,
    ) -> UpmResult<MessagePort> {
        let (kept, transferred) = message_channel();

        // The endpoint is waiting for the worker before it hears about it.
        if let Err(err) = ports.transfer(client_id, transferred).await {
            kept.close();
            let reason = match err {
                UpmError::ChannelCreationFailure { reason, .. } => reason,
                other => other.to_string(),
            };
            return Err(self.channel_failure(client_id, &reason));
        }
        if outbound.send(Envelope::client_port(client_id)).is_err() {
            kept.close();
            return Err(self.channel_failure(client_id, "control channel closed"));
        }

        let (serial, replaced) = self.channels.register(client_id, kept.close_signal());
        if replaced.is_some() {
            ClientChannelReplaced {
                service_id: &self.service_id,
                client_id,
            }
            .log();
        }

        let signal = kept.close_signal();
        let closed_tx = self.channel_closed_tx.clone();
        let client = client_id.to_string();
        tokio::spawn(async move {
            signal.closed().await;
            let _ = closed_tx.send((client, serial));
        });

        ClientChannelOpened {
            service_id: &self.service_id,
            client_id,
        }
        .log();
        Ok(kept)
    }

    fn channel_failure(&self, client_id: &str, reason: &str) -> UpmError {
        ChannelTransferFailed {
            service_id: &self.service_id,
            client_id,
            reason,
        }
        .log();
        UpmError::ChannelCreationFailure {
            client_id: client_id.to_string(),
            reason: reason.to_string(),
        }
    }

    fn on_channel_closed(&mut self, client_id: &str, serial: u64) {
        if self.channels.remove_if_current(client_id, serial).is_some() {
            ClientChannelClosed {
                service_id: &self.service_id,
                client_id,
            }
            .log();
        }
    }

    /// Requested teardown of a ready worker.
    async fn shutdown(
        &mut self,
        terminate: &CancellationToken,
        exited: &mut oneshot::Receiver<i32>,
    ) {
        let started = Instant::now();
        self.lifecycle.transition(ProcessState::Stopping);
        ProcessStopping {
            service_id: &self.service_id,
            pending_requests: self.pending.len(),
            client_channels: self.channels.len(),
        }
        .log();

        self.cancel_pending("handle stopped");
        self.channels.close_all();

        terminate.cancel();
        let code = exited.await.unwrap_or(UNKNOWN_EXIT_CODE);
        self.log_exit(code, true);

        self.lifecycle.transition(ProcessState::Stopped);
        ProcessStopped {
            service_id: &self.service_id,
            duration: started.elapsed(),
        }
        .log();
    }

    /// The worker died on its own after becoming ready.
    fn on_exit(&mut self, code: i32) {
        self.log_exit(code, false);
        self.lifecycle.transition(ProcessState::Stopping);
        self.cancel_pending(&format!("process exited with code {}", code));
        self.channels.close_all();
        self.lifecycle.transition(ProcessState::Stopped);
    }

    fn log_exit(&self, code: i32, requested: bool) {
        ProcessExited {
            service_id: &self.service_id,
            code,
            requested,
        }
        .log();
    }

    /// Answer a command that cannot be served before the worker is ready.
    fn reject(&self, command: HandleCommand) {
        match command {
            HandleCommand::Execute(command) => {
                let _ = command.reply.send(Err(UpmError::not_running(&self.service_id)));
            }
            HandleCommand::OpenChannel { reply, .. } => {
                let _ = reply.send(Err(UpmError::not_running(&self.service_id)));
            }
            HandleCommand::Inspect { reply } => {
                let _ = reply.send(self.snapshot());
            }
            HandleCommand::Stop { reply } => {
                let _ = reply.send(());
            }
            HandleCommand::Cancel { .. } | HandleCommand::Event { .. } => {}
        }
    }

    fn snapshot(&self) -> HandleSnapshot {
        HandleSnapshot {
            service_id: self.service_id.clone(),
            state: self.lifecycle.current(),
            pid: self.pid,
            pending_requests: self.pending.ids(),
            client_channels: self.channels.client_ids(),
        }
    }
}

impl Drop for HandleActor {
    /// Runs however `run` ends, including a panic inside the task: the worker
    /// is terminated and the lifecycle reaches a terminal state.
    fn drop(&mut self) {
        if let Some(terminate) = &self.terminate {
            terminate.cancel();
        }
        self.channels.close_all();

        match self.lifecycle.current() {
            ProcessState::Spawning => {
                self.lifecycle.transition(ProcessState::Failed {
                    reason: "handle task ended before ready".to_string(),
                });
            }
            ProcessState::Ready => {
                self.lifecycle.transition(ProcessState::Stopping);
                self.lifecycle.transition(ProcessState::Stopped);
            }
            ProcessState::Stopping => {
                self.lifecycle.transition(ProcessState::Stopped);
            }
            _ => {}
        }
    }
}

async fn terminate(link: &mut ChildLink) -> i32 {
    link.terminate.cancel();
    (&mut link.exited).await.unwrap_or(UNKNOWN_EXIT_CODE)
}
