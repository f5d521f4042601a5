// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for request correlation on the control channel.
//!
//! This module contains message types for logging events related to:
//! * Request dispatch and completion
//! * Timeouts and cancellation
//! * Responses that match no pending request

use crate::errors::UpmError;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Request posted to the worker.
///
/// # Log Level
/// `debug!` - Per-request detail
pub struct RequestDispatched<'a> {
    pub service_id: &'a str,
    pub request_id: u64,
    pub kind: &'a str,
    pub timeout: Duration,
}

impl Display for RequestDispatched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Sent utility request '{}' (requestId={}) to '{}', timeout={:?}",
            self.kind, self.request_id, self.service_id, self.timeout
        )
    }
}

impl StructuredLog for RequestDispatched<'_> {
    fn log(&self) {
        tracing::debug!(
            service_id = self.service_id,
            request_id = self.request_id,
            kind = self.kind,
            timeout_ms = self.timeout.as_millis() as u64,
            "{}", self
        );
    }
}

/// Request resolved with a payload.
///
/// # Log Level
/// `debug!` - Per-request detail
pub struct RequestCompleted<'a> {
    pub service_id: &'a str,
    pub request_id: u64,
    pub kind: &'a str,
    pub duration: Duration,
}

impl Display for RequestCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Completed utility request '{}' (requestId={}) in {:?}",
            self.kind, self.request_id, self.duration
        )
    }
}

impl StructuredLog for RequestCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            service_id = self.service_id,
            request_id = self.request_id,
            kind = self.kind,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }
}

/// Request rejected: remote error, timeout or cancellation.
///
/// # Log Level
/// `error!` for remote errors, `warn!` for timeouts and cancellations
pub struct RequestFailed<'a> {
    pub service_id: &'a str,
    pub request_id: u64,
    pub kind: &'a str,
    pub error: &'a UpmError,
}

impl Display for RequestFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed utility request '{}' (requestId={}): {}",
            self.kind, self.request_id, self.error
        )
    }
}

impl StructuredLog for RequestFailed<'_> {
    fn log(&self) {
        match self.error {
            UpmError::RemoteError { .. } => tracing::error!(
                service_id = self.service_id,
                request_id = self.request_id,
                kind = self.kind,
                "{}", self
            ),
            _ => tracing::warn!(
                service_id = self.service_id,
                request_id = self.request_id,
                kind = self.kind,
                "{}", self
            ),
        }
    }
}

/// A response arrived for an id that is not pending (duplicate, stale, or unknown).
///
/// # Log Level
/// `warn!` - Dropped, never resolved twice
///
/// # Example
/// ```
/// use upm_runtime::observability::messages::request::ResponseDropped;
///
/// let msg = ResponseDropped {
///     service_id: "session-data",
///     request_id: 17,
///     kind: "echo",
/// };
///
/// assert_eq!(
///     msg.to_string(),
///     "Unable to find pending record 17 ('echo') for 'session-data', dropping response"
/// );
/// ```
pub struct ResponseDropped<'a> {
    pub service_id: &'a str,
    pub request_id: u64,
    pub kind: &'a str,
}

impl Display for ResponseDropped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Unable to find pending record {} ('{}') for '{}', dropping response",
            self.request_id, self.kind, self.service_id
        )
    }
}

impl StructuredLog for ResponseDropped<'_> {
    fn log(&self) {
        tracing::warn!(
            service_id = self.service_id,
            request_id = self.request_id,
            kind = self.kind,
            "{}", self
        );
    }
}

/// Response kind differs from the kind of the pending request.
///
/// # Log Level
/// `warn!` - The response is still applied by id
pub struct ResponseKindMismatch<'a> {
    pub service_id: &'a str,
    pub request_id: u64,
    pub expected: &'a str,
    pub actual: &'a str,
}

impl Display for ResponseKindMismatch<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Response for requestId={} from '{}' has kind '{}', expected '{}'",
            self.request_id, self.service_id, self.actual, self.expected
        )
    }
}

impl StructuredLog for ResponseKindMismatch<'_> {
    fn log(&self) {
        tracing::warn!(
            service_id = self.service_id,
            request_id = self.request_id,
            expected = self.expected,
            actual = self.actual,
            "{}", self
        );
    }
}

/// Outstanding requests drained on stop or process death.
///
/// # Log Level
/// `warn!` when anything was drained, `debug!` otherwise
pub struct PendingRequestsCancelled<'a> {
    pub service_id: &'a str,
    pub count: usize,
    pub reason: &'a str,
}

impl Display for PendingRequestsCancelled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Cancelled {} pending requests for '{}': {}",
            self.count, self.service_id, self.reason
        )
    }
}

impl StructuredLog for PendingRequestsCancelled<'_> {
    fn log(&self) {
        if self.count > 0 {
            tracing::warn!(
                service_id = self.service_id,
                count = self.count,
                reason = self.reason,
                "{}", self
            );
        } else {
            tracing::debug!(service_id = self.service_id, reason = self.reason, "{}", self);
        }
    }
}

/// No-reply message exchanged with the worker (event in either direction).
///
/// # Log Level
/// `debug!` - Per-message detail
pub struct EventRelayed<'a> {
    pub service_id: &'a str,
    pub kind: &'a str,
    pub inbound: bool,
}

impl Display for EventRelayed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let direction = if self.inbound { "from" } else { "to" };
        write!(f, "Event '{}' {} '{}'", self.kind, direction, self.service_id)
    }
}

impl StructuredLog for EventRelayed<'_> {
    fn log(&self) {
        tracing::debug!(
            service_id = self.service_id,
            kind = self.kind,
            inbound = self.inbound,
            "{}", self
        );
    }
}
