// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the supervisor registry and global shutdown.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Handle stored under its service id.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ServiceRegistered<'a> {
    pub service_id: &'a str,
}

impl Display for ServiceRegistered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Registered utility process '{}'", self.service_id)
    }
}

impl StructuredLog for ServiceRegistered<'_> {
    fn log(&self) {
        tracing::info!(service_id = self.service_id, "{}", self);
    }
}

/// `create_process` called for an id that is already registered.
///
/// # Log Level
/// `error!` - Caller bug
pub struct DuplicateServiceRejected<'a> {
    pub service_id: &'a str,
}

impl Display for DuplicateServiceRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "utility process with id ({}) is already registered",
            self.service_id
        )
    }
}

impl StructuredLog for DuplicateServiceRejected<'_> {
    fn log(&self) {
        tracing::error!(service_id = self.service_id, "{}", self);
    }
}

/// Handle forgotten by the supervisor.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ServiceRemoved<'a> {
    pub service_id: &'a str,
    pub reason: &'a str,
}

impl Display for ServiceRemoved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Removed utility process '{}' ({})",
            self.service_id, self.reason
        )
    }
}

impl StructuredLog for ServiceRemoved<'_> {
    fn log(&self) {
        tracing::info!(service_id = self.service_id, reason = self.reason, "{}", self);
    }
}

/// Channel provisioning for an external client failed.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ChannelProvisionFailed<'a> {
    pub service_id: &'a str,
    pub client_id: &'a str,
    pub reason: &'a str,
}

impl Display for ChannelProvisionFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "failed to register new client (service={},clientId={}): {}",
            self.service_id, self.client_id, self.reason
        )
    }
}

impl StructuredLog for ChannelProvisionFailed<'_> {
    fn log(&self) {
        tracing::error!(
            service_id = self.service_id,
            client_id = self.client_id,
            reason = self.reason,
            "{}", self
        );
    }
}

/// Global shutdown started.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ShutdownStarted {
    pub service_count: usize,
}

impl Display for ShutdownStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Shutting down {} utility processes", self.service_count)
    }
}

impl StructuredLog for ShutdownStarted {
    fn log(&self) {
        tracing::info!(service_count = self.service_count, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "shutdown",
            span_name = name,
            service_count = self.service_count,
        )
    }
}

/// Global shutdown finished.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ShutdownCompleted {
    pub service_count: usize,
    pub failures: usize,
    pub duration: Duration,
}

impl Display for ShutdownCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Shut down {} utility processes in {:?} ({} failures)",
            self.service_count, self.duration, self.failures
        )
    }
}

impl StructuredLog for ShutdownCompleted {
    fn log(&self) {
        tracing::info!(
            service_count = self.service_count,
            failures = self.failures,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }
}

/// One stop task of the shutdown sweep failed (panicked or was aborted).
///
/// # Log Level
/// `error!` - The sweep continues
pub struct ShutdownTaskFailed<'a> {
    pub service_id: &'a str,
    pub reason: &'a str,
}

impl Display for ShutdownTaskFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stopping '{}' failed during shutdown: {}",
            self.service_id, self.reason
        )
    }
}

impl StructuredLog for ShutdownTaskFailed<'_> {
    fn log(&self) {
        tracing::error!(service_id = self.service_id, reason = self.reason, "{}", self);
    }
}
