// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! In-memory worker backend for tests.
//!
//! Workers run as tokio tasks speaking the same envelope protocol as a real
//! child, answering requests through [`handle_request`]. Start-up behaviour is
//! scriptable and every launch, termination and exit is counted.

use crate::backends::echo::{handle_request, EchoAction};
use crate::channel::MessagePort;
use crate::errors::{UpmError, UpmResult};
use crate::protocol::Envelope;
use crate::traits::{ChildLink, LaunchSpec, PortTransfer, ProcessLauncher};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Exit code of a worker that was killed (SIGKILL).
pub const KILLED_EXIT_CODE: i32 = 137;

/// How a stub worker behaves right after launch.
#[derive(Debug, Clone)]
pub enum StubStartup {
    Ready,
    ReadyAfter(Duration),
    ExitBeforeReady(i32),
    NeverReady,
}

#[derive(Debug, Default)]
pub struct StubCounters {
    launches: AtomicUsize,
    terminations: AtomicUsize,
    exits: AtomicUsize,
    ports: AtomicUsize,
}

impl StubCounters {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Workers stopped through their terminate token
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub fn exits(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }

    /// Client channel endpoints handed to workers
    pub fn ports(&self) -> usize {
        self.ports.load(Ordering::SeqCst)
    }
}

pub struct StubLauncher {
    startup: StubStartup,
    launch_error: Option<String>,
    counters: Arc<StubCounters>,
    crash: CancellationToken,
}

impl StubLauncher {
    pub fn new() -> Self {
        Self::with_startup(StubStartup::Ready)
    }

    pub fn with_startup(startup: StubStartup) -> Self {
        Self {
            startup,
            launch_error: None,
            counters: Arc::new(StubCounters::default()),
            crash: CancellationToken::new(),
        }
    }

    /// A launcher whose every launch fails.
    pub fn failing(reason: &str) -> Self {
        Self {
            launch_error: Some(reason.to_string()),
            ..Self::new()
        }
    }

    pub fn counters(&self) -> Arc<StubCounters> {
        self.counters.clone()
    }

    /// Kill every worker launched so far, as if by SIGKILL.
    pub fn crash(&self) {
        self.crash.cancel();
    }
}

impl Default for StubLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessLauncher for StubLauncher {
    async fn launch(&self, spec: LaunchSpec) -> UpmResult<ChildLink> {
        if let Some(reason) = &self.launch_error {
            return Err(UpmError::spawn_failure(&spec.service_id, reason.as_str()));
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);

        let (outbound, requests) = mpsc::unbounded_channel();
        let (responses, inbound) = mpsc::unbounded_channel();
        let (exit_tx, exited) = oneshot::channel();
        let (port_tx, port_rx) = mpsc::unbounded_channel();
        let terminate = CancellationToken::new();

        let worker = StubWorker {
            env: spec.env,
            startup: self.startup.clone(),
            requests,
            responses,
            ports: port_rx,
            terminate: terminate.clone(),
            crash: self.crash.child_token(),
            counters: self.counters.clone(),
        };
        tokio::spawn(async move {
            let code = worker.run().await;
            let _ = exit_tx.send(code);
        });

        Ok(ChildLink {
            pid: None,
            outbound,
            inbound,
            exited,
            terminate,
            ports: Box::new(StubPorts {
                tx: port_tx,
                counters: self.counters.clone(),
            }),
        })
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

struct StubPorts {
    tx: mpsc::UnboundedSender<(String, MessagePort)>,
    counters: Arc<StubCounters>,
}

#[async_trait]
impl PortTransfer for StubPorts {
    async fn transfer(&self, client_id: &str, port: MessagePort) -> UpmResult<()> {
        self.tx
            .send((client_id.to_string(), port))
            .map_err(|_| UpmError::ChannelCreationFailure {
                client_id: client_id.to_string(),
                reason: "worker is gone".to_string(),
            })?;
        self.counters.ports.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct StubWorker {
    env: Vec<(String, String)>,
    startup: StubStartup,
    requests: mpsc::UnboundedReceiver<Envelope>,
    responses: mpsc::UnboundedSender<Envelope>,
    ports: mpsc::UnboundedReceiver<(String, MessagePort)>,
    terminate: CancellationToken,
    crash: CancellationToken,
    counters: Arc<StubCounters>,
}

impl StubWorker {
    /// Runs until the worker exits; returns its exit code.
    async fn run(mut self) -> i32 {
        let code = self.serve().await;
        self.counters.exits.fetch_add(1, Ordering::SeqCst);
        code
    }

    async fn serve(&mut self) -> i32 {
        match self.startup.clone() {
            StubStartup::Ready => {
                let _ = self.responses.send(Envelope::ready());
            }
            StubStartup::ReadyAfter(delay) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        let _ = self.responses.send(Envelope::ready());
                    }
                    _ = self.terminate.cancelled() => return self.terminated(),
                    _ = self.crash.cancelled() => return KILLED_EXIT_CODE,
                }
            }
            StubStartup::ExitBeforeReady(code) => return code,
            StubStartup::NeverReady => {}
        }

        loop {
            tokio::select! {
                _ = self.terminate.cancelled() => return self.terminated(),
                _ = self.crash.cancelled() => return KILLED_EXIT_CODE,
                request = self.requests.recv() => match request {
                    Some(envelope) => {
                        if let Some(code) = self.on_request(envelope) {
                            return code;
                        }
                    }
                    // Control input closed: exit cleanly.
                    None => return 0,
                },
                Some((_client_id, port)) = self.ports.recv() => {
                    tokio::spawn(echo_port(port));
                }
            }
        }
    }

    fn terminated(&self) -> i32 {
        self.counters.terminations.fetch_add(1, Ordering::SeqCst);
        KILLED_EXIT_CODE
    }

    fn on_request(&self, envelope: Envelope) -> Option<i32> {
        match handle_request(envelope, &self.env) {
            EchoAction::Reply(reply) => {
                let _ = self.responses.send(reply);
            }
            EchoAction::ReplyTwice(reply) => {
                let _ = self.responses.send(reply.clone());
                let _ = self.responses.send(reply);
            }
            EchoAction::ReplyAfter(delay, reply) => {
                let responses = self.responses.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = responses.send(reply);
                });
            }
            EchoAction::Exit(code) => return Some(code),
            EchoAction::Ignore => {}
        }
        None
    }
}

async fn echo_port(mut port: MessagePort) {
    while let Some(message) = port.recv().await {
        if port.post(message).is_err() {
            break;
        }
    }
}
