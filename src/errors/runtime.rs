// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error type for supervisor, handle and channel operations.
//!
//! Every failure is delivered to the caller whose future it affects. There is no
//! global error channel: a `RequestTimeout` only ever reaches the request that
//! timed out, while `Cancelled` reaches every request that was outstanding when
//! the handle stopped or its process died.

use std::time::Duration;
use thiserror::Error;

/// Runtime errors surfaced by [`ProcessSupervisor`](crate::supervisor::ProcessSupervisor)
/// and [`ProcessHandle`](crate::process::ProcessHandle).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpmError {
    /// A handle is already registered for this service id.
    #[error("utility process with id ({service_id}) is already registered")]
    DuplicateRegistration { service_id: String },

    /// The process died (or could not be launched) before signalling ready.
    #[error("service ({service_id}) failed to start: {reason}")]
    SpawnFailure { service_id: String, reason: String },

    /// No correlated response arrived within the request budget.
    #[error("request {request_id} ({kind}) timed out after {timeout:?}")]
    RequestTimeout {
        request_id: u64,
        kind: String,
        timeout: Duration,
    },

    /// The worker answered with an `error` field.
    #[error("remote error: {message}")]
    RemoteError { message: String },

    /// The handle stopped, the process died, or the caller cancelled.
    #[error("request cancelled: {reason}")]
    Cancelled { reason: String },

    /// A client channel could not be handed to the worker.
    #[error("unable to create channel id={client_id}: {reason}")]
    ChannelCreationFailure { client_id: String, reason: String },

    /// The service is unknown or its handle is no longer running.
    #[error("service ({service_id}) is not running")]
    NotRunning { service_id: String },

    /// A message was posted to an endpoint whose channel has closed.
    #[error("message channel is closed")]
    ChannelClosed,

    /// The requested budget exceeds what the timer wheel can schedule.
    #[error("timeout {timeout:?} for ({kind}) exceeds the maximum of {max:?}")]
    InvalidTimeout {
        kind: String,
        timeout: Duration,
        max: Duration,
    },

    /// A typed request or response could not be converted to or from JSON.
    #[error("invalid payload for ({kind}): {reason}")]
    InvalidPayload { kind: String, reason: String },
}

impl UpmError {
    pub(crate) fn cancelled(reason: impl Into<String>) -> Self {
        UpmError::Cancelled {
            reason: reason.into(),
        }
    }

    pub(crate) fn spawn_failure(service_id: &str, reason: impl Into<String>) -> Self {
        UpmError::SpawnFailure {
            service_id: service_id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_running(service_id: &str) -> Self {
        UpmError::NotRunning {
            service_id: service_id.to_string(),
        }
    }
}

/// Result alias for runtime operations.
pub type UpmResult<T> = Result<T, UpmError>;
