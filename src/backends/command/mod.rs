// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! OS process backend.
//!
//! Workers are real child processes. The control channel is newline-delimited
//! JSON on the child's stdin/stdout; stderr is inherited so worker logs land
//! next to ours. Client channels travel over a per-worker Unix socket, see
//! [`PortBridge`].

mod bridge;

pub use bridge::PortBridge;

use crate::errors::{UpmError, UpmResult};
use crate::protocol::{Envelope, ENV_PORT_SOCKET};
use crate::traits::{ChildLink, LaunchSpec, ProcessLauncher};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Longest control line accepted from a worker (1 MiB).
const MAX_CONTROL_LINE: usize = 1024 * 1024;

/// Launches workers with [`tokio::process::Command`].
#[derive(Debug, Clone, Default)]
pub struct CommandLauncher {
    socket_dir: Option<PathBuf>,
}

impl CommandLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory for client-channel sockets (defaults to the system temp dir).
    pub fn with_socket_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            socket_dir: Some(dir.into()),
        }
    }

    fn socket_dir(&self) -> PathBuf {
        self.socket_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[async_trait]
impl ProcessLauncher for CommandLauncher {
    async fn launch(&self, spec: LaunchSpec) -> UpmResult<ChildLink> {
        let program = &spec.entry_point.program;
        if program.as_os_str().is_empty() || !program.is_file() {
            return Err(UpmError::spawn_failure(
                &spec.service_id,
                format!("entry file must be provided ({})", program.display()),
            ));
        }

        let bridge = PortBridge::bind(&spec.service_id, &self.socket_dir()).map_err(|e| {
            UpmError::spawn_failure(&spec.service_id, format!("unable to open port socket: {}", e))
        })?;

        let mut command = Command::new(program);
        command
            .args(&spec.entry_point.args)
            .envs(spec.env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .env(ENV_PORT_SOCKET, bridge.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            UpmError::spawn_failure(
                &spec.service_id,
                format!("unable to launch {}: {}", program.display(), e),
            )
        })?;

        let pid = child.id();
        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.start_kill();
                return Err(UpmError::spawn_failure(
                    &spec.service_id,
                    "child stdio was not captured",
                ));
            }
        };

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (exit_tx, exited) = oneshot::channel();
        let terminate = CancellationToken::new();

        tokio::spawn(write_control(stdin, outbound_rx, spec.service_id.clone()));
        tokio::spawn(read_control(stdout, inbound_tx, spec.service_id.clone()));
        tokio::spawn(watch_child(child, terminate.clone(), spec.stop_grace, exit_tx));

        Ok(ChildLink {
            pid,
            outbound,
            inbound,
            exited,
            terminate,
            ports: Box::new(bridge),
        })
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

async fn write_control(
    stdin: ChildStdin,
    mut envelopes: mpsc::UnboundedReceiver<Envelope>,
    service_id: String,
) {
    let mut sink = FramedWrite::new(stdin, LinesCodec::new());
    while let Some(envelope) = envelopes.recv().await {
        let line = match serde_json::to_string(&envelope) {
            Ok(line) => line,
            Err(e) => {
                warn!(service_id = %service_id, error = %e, "unable to encode control message");
                continue;
            }
        };
        if let Err(e) = sink.send(line).await {
            debug!(service_id = %service_id, error = %e, "control input closed");
            break;
        }
    }
}

async fn read_control(
    stdout: ChildStdout,
    envelopes: mpsc::UnboundedSender<Envelope>,
    service_id: String,
) {
    let mut lines = FramedRead::new(stdout, LinesCodec::new_with_max_length(MAX_CONTROL_LINE));
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!(service_id = %service_id, "control line exceeds {} bytes, skipping", MAX_CONTROL_LINE);
                continue;
            }
            Err(LinesCodecError::Io(e)) => {
                debug!(service_id = %service_id, error = %e, "control output closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Envelope>(&line) {
            Ok(envelope) => {
                if envelopes.send(envelope).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(service_id = %service_id, error = %e, "malformed control message, skipping");
            }
        }
    }
}

async fn watch_child(
    mut child: Child,
    terminate: CancellationToken,
    grace: Duration,
    exited: oneshot::Sender<i32>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = terminate.cancelled() => {
            if send_sigterm(&child) {
                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(status) => status,
                    Err(_) => {
                        debug!(pid = ?child.id(), ?grace, "child ignored SIGTERM, killing");
                        force_kill(&mut child).await
                    }
                }
            } else {
                force_kill(&mut child).await
            }
        }
    };

    let code = match status {
        Ok(status) => exit_code(status),
        Err(e) => {
            warn!(error = %e, "unable to collect child exit status");
            -1
        }
    };
    let _ = exited.send(code);
}

/// Ask the child to exit. Returns `false` if no signal could be delivered.
fn send_sigterm(child: &Child) -> bool {
    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return false;
    };
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            debug!(pid, error = %e, "SIGTERM failed");
            false
        }
    }
}

async fn force_kill(child: &mut Child) -> std::io::Result<ExitStatus> {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "kill failed, child already exited");
    }
    child.wait().await
}

/// Exit code, or `128 + n` for a child killed by signal `n`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|signal| 128 + signal).unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::EntryPoint;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn test_exit_code_maps_signals() {
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        // Raw wait status 9 is "terminated by SIGKILL".
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
        assert_eq!(exit_code(ExitStatus::from_raw(15)), 143);
    }

    #[tokio::test]
    async fn test_missing_entry_point_is_a_spawn_failure() {
        let launcher = CommandLauncher::new();
        let spec = LaunchSpec {
            service_id: "svc".to_string(),
            entry_point: EntryPoint::new("/definitely/not/here"),
            env: Vec::new(),
            stop_grace: Duration::from_millis(100),
        };

        let err = launcher.launch(spec).await.unwrap_err();
        assert_eq!(
            err,
            UpmError::SpawnFailure {
                service_id: "svc".to_string(),
                reason: "entry file must be provided (/definitely/not/here)".to_string(),
            }
        );
    }
}
