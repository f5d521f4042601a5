// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::channel::MessagePort;
use crate::errors::UpmResult;
use crate::protocol::Envelope;

/// Program (and arguments) a worker process is started from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl EntryPoint {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append arguments passed to the program
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

impl From<&str> for EntryPoint {
    fn from(program: &str) -> Self {
        Self::new(program)
    }
}

impl From<String> for EntryPoint {
    fn from(program: String) -> Self {
        Self::new(program)
    }
}

impl From<PathBuf> for EntryPoint {
    fn from(program: PathBuf) -> Self {
        Self::new(program)
    }
}

impl From<&Path> for EntryPoint {
    fn from(program: &Path) -> Self {
        Self::new(program)
    }
}

/// Everything a launcher needs to start one worker.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub service_id: String,
    pub entry_point: EntryPoint,
    /// Added on top of the inherited environment
    pub env: Vec<(String, String)>,
    /// How long a terminated worker may take to exit before it is killed
    pub stop_grace: Duration,
}

/// The supervisor side of a launched worker.
///
/// The handle's actor owns the link for the worker's whole life. Dropping the
/// outbound sender closes the worker's control input.
pub struct ChildLink {
    pub pid: Option<u32>,
    /// Envelopes to the worker
    pub outbound: mpsc::UnboundedSender<Envelope>,
    /// Envelopes from the worker
    pub inbound: mpsc::UnboundedReceiver<Envelope>,
    /// Fires once with the exit code (`128 + n` when killed by signal `n`)
    pub exited: oneshot::Receiver<i32>,
    /// Cancel to terminate the worker, gracefully where the backend can
    pub terminate: CancellationToken,
    /// Delivers transferred client-channel endpoints to the worker
    pub ports: Box<dyn PortTransfer>,
}

impl fmt::Debug for ChildLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildLink")
            .field("pid", &self.pid)
            .field("terminated", &self.terminate.is_cancelled())
            .finish()
    }
}

/// Hands the worker its end of a client channel.
///
/// Called before the `upm:client-port` announcement is posted, so a worker
/// reacting to the announcement always finds its endpoint waiting.
#[async_trait]
pub trait PortTransfer: Send + Sync {
    async fn transfer(&self, client_id: &str, port: MessagePort) -> UpmResult<()>;
}

/// Starts worker processes.
///
/// Launch failures are reported as `UpmError::SpawnFailure`; a worker that
/// starts and then dies is reported through `ChildLink::exited` instead.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, spec: LaunchSpec) -> UpmResult<ChildLink>;

    /// Short backend name used in logs
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_point_display_includes_args() {
        let entry = EntryPoint::new("/opt/worker").with_args(["--fail-start", "3"]);
        assert_eq!(entry.to_string(), "/opt/worker --fail-start 3");
    }

    #[test]
    fn test_entry_point_conversions() {
        let from_str: EntryPoint = "./worker".into();
        let from_path: EntryPoint = PathBuf::from("./worker").into();
        assert_eq!(from_str, from_path);
        assert!(from_str.args.is_empty());
    }
}
