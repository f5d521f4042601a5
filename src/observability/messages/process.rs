// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for process handle lifecycle events.
//!
//! This module contains message types for logging events related to:
//! * Launching a worker and waiting for its readiness signal
//! * Startup failures and illegal state transitions
//! * Worker exits, expected or not
//! * Handle teardown

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Worker launch requested.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use upm_runtime::observability::messages::process::ProcessSpawning;
///
/// let msg = ProcessSpawning {
///     service_id: "session-data",
///     entry_point: "./worker",
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ProcessSpawning<'a> {
    pub service_id: &'a str,
    pub entry_point: &'a str,
}

impl Display for ProcessSpawning<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Spawning utility process '{}' from {}",
            self.service_id, self.entry_point
        )
    }
}

impl StructuredLog for ProcessSpawning<'_> {
    fn log(&self) {
        tracing::info!(
            service_id = self.service_id,
            entry_point = self.entry_point,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "process",
            span_name = name,
            service_id = self.service_id,
        )
    }
}

/// Worker reported ready.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ProcessReady<'a> {
    pub service_id: &'a str,
    pub pid: Option<u32>,
    pub startup: Duration,
}

impl Display for ProcessReady<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.pid {
            Some(pid) => write!(
                f,
                "Utility process '{}' (pid={}) ready after {:?}",
                self.service_id, pid, self.startup
            ),
            None => write!(
                f,
                "Utility process '{}' ready after {:?}",
                self.service_id, self.startup
            ),
        }
    }
}

impl StructuredLog for ProcessReady<'_> {
    fn log(&self) {
        tracing::info!(
            service_id = self.service_id,
            pid = self.pid,
            startup_ms = self.startup.as_millis() as u64,
            "{}", self
        );
    }
}

/// Worker could not be launched or died before reporting ready.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ProcessSpawnFailed<'a> {
    pub service_id: &'a str,
    pub reason: &'a str,
}

impl Display for ProcessSpawnFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to init utility process '{}': {}",
            self.service_id, self.reason
        )
    }
}

impl StructuredLog for ProcessSpawnFailed<'_> {
    fn log(&self) {
        tracing::error!(
            service_id = self.service_id,
            reason = self.reason,
            "{}", self
        );
    }
}

/// Worker process exited.
///
/// # Log Level
/// `info!` for code 0 or an exit we asked for, `error!` otherwise
pub struct ProcessExited<'a> {
    pub service_id: &'a str,
    pub code: i32,
    /// The handle requested the exit (stop in progress).
    pub requested: bool,
}

impl ProcessExited<'_> {
    pub fn is_unexpected(&self) -> bool {
        self.code != 0 && !self.requested
    }
}

impl Display for ProcessExited<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.requested {
            write!(
                f,
                "Utility process '{}' exited with code {} upon stopping",
                self.service_id, self.code
            )
        } else {
            write!(
                f,
                "Utility process '{}' exited with code {}",
                self.service_id, self.code
            )
        }
    }
}

impl StructuredLog for ProcessExited<'_> {
    fn log(&self) {
        if self.is_unexpected() {
            tracing::error!(
                service_id = self.service_id,
                code = self.code,
                requested = self.requested,
                "{}", self
            );
        } else {
            tracing::info!(
                service_id = self.service_id,
                code = self.code,
                requested = self.requested,
                "{}", self
            );
        }
    }
}

/// Teardown started.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ProcessStopping<'a> {
    pub service_id: &'a str,
    pub pending_requests: usize,
    pub client_channels: usize,
}

impl Display for ProcessStopping<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stopping utility process '{}': cancelling {} pending requests, closing {} channels",
            self.service_id, self.pending_requests, self.client_channels
        )
    }
}

impl StructuredLog for ProcessStopping<'_> {
    fn log(&self) {
        tracing::info!(
            service_id = self.service_id,
            pending_requests = self.pending_requests,
            client_channels = self.client_channels,
            "{}", self
        );
    }
}

/// Teardown finished.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ProcessStopped<'a> {
    pub service_id: &'a str,
    pub duration: Duration,
}

impl Display for ProcessStopped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Utility process '{}' stopped in {:?}",
            self.service_id, self.duration
        )
    }
}

impl StructuredLog for ProcessStopped<'_> {
    fn log(&self) {
        tracing::info!(
            service_id = self.service_id,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }
}

/// A lifecycle transition that would move backwards or skip a state.
///
/// # Log Level
/// `warn!` - Unexpected but recoverable
pub struct StateTransitionRejected<'a> {
    pub service_id: &'a str,
    pub from: &'a str,
    pub to: &'a str,
}

impl Display for StateTransitionRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Ignoring state transition {} -> {} for '{}'",
            self.from, self.to, self.service_id
        )
    }
}

impl StructuredLog for StateTransitionRejected<'_> {
    fn log(&self) {
        tracing::warn!(
            service_id = self.service_id,
            from = self.from,
            to = self.to,
            "{}", self
        );
    }
}

/// Control message received before the worker reported ready.
///
/// # Log Level
/// `warn!` - Unexpected but recoverable
pub struct MessageBeforeReady<'a> {
    pub service_id: &'a str,
    pub kind: &'a str,
    pub request_id: u64,
}

impl Display for MessageBeforeReady<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dropping '{}' message (requestId={}) from '{}' received before ready",
            self.kind, self.request_id, self.service_id
        )
    }
}

impl StructuredLog for MessageBeforeReady<'_> {
    fn log(&self) {
        tracing::warn!(
            service_id = self.service_id,
            kind = self.kind,
            request_id = self.request_id,
            "{}", self
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_is_unexpected_only_when_nonzero_and_unrequested() {
        let clean = ProcessExited { service_id: "svc", code: 0, requested: false };
        let crash = ProcessExited { service_id: "svc", code: 3, requested: false };
        let killed = ProcessExited { service_id: "svc", code: 137, requested: true };

        assert!(!clean.is_unexpected());
        assert!(crash.is_unexpected());
        assert!(!killed.is_unexpected());
        assert_eq!(
            killed.to_string(),
            "Utility process 'svc' exited with code 137 upon stopping"
        );
    }

    #[test]
    fn test_ready_message_with_and_without_pid() {
        let with_pid = ProcessReady {
            service_id: "svc",
            pid: Some(12),
            startup: Duration::from_millis(5),
        };
        let without = ProcessReady {
            service_id: "svc",
            pid: None,
            startup: Duration::from_millis(5),
        };
        assert_eq!(with_pid.to_string(), "Utility process 'svc' (pid=12) ready after 5ms");
        assert_eq!(without.to_string(), "Utility process 'svc' ready after 5ms");
    }
}
