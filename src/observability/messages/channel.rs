// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for client channel provisioning and teardown.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};

/// Client channel handed to the worker.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ClientChannelOpened<'a> {
    pub service_id: &'a str,
    pub client_id: &'a str,
}

impl Display for ClientChannelOpened<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Created client port for proc (id={},clientId={})",
            self.service_id, self.client_id
        )
    }
}

impl StructuredLog for ClientChannelOpened<'_> {
    fn log(&self) {
        tracing::info!(
            service_id = self.service_id,
            client_id = self.client_id,
            "{}", self
        );
    }
}

/// A channel closed and left the registry.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ClientChannelClosed<'a> {
    pub service_id: &'a str,
    pub client_id: &'a str,
}

impl Display for ClientChannelClosed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Message channel (id={}) of '{}' closed",
            self.client_id, self.service_id
        )
    }
}

impl StructuredLog for ClientChannelClosed<'_> {
    fn log(&self) {
        tracing::info!(
            service_id = self.service_id,
            client_id = self.client_id,
            "{}", self
        );
    }
}

/// A new channel displaced an open one for the same client.
///
/// # Log Level
/// `warn!` - Unexpected but recoverable
pub struct ClientChannelReplaced<'a> {
    pub service_id: &'a str,
    pub client_id: &'a str,
}

impl Display for ClientChannelReplaced<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Replacing open message channel (id={}) of '{}'",
            self.client_id, self.service_id
        )
    }
}

impl StructuredLog for ClientChannelReplaced<'_> {
    fn log(&self) {
        tracing::warn!(
            service_id = self.service_id,
            client_id = self.client_id,
            "{}", self
        );
    }
}

/// Handing the worker its endpoint failed.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ChannelTransferFailed<'a> {
    pub service_id: &'a str,
    pub client_id: &'a str,
    pub reason: &'a str,
}

impl Display for ChannelTransferFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Unable to create channel id={} for '{}': {}",
            self.client_id, self.service_id, self.reason
        )
    }
}

impl StructuredLog for ChannelTransferFailed<'_> {
    fn log(&self) {
        tracing::error!(
            service_id = self.service_id,
            client_id = self.client_id,
            reason = self.reason,
            "{}", self
        );
    }
}

/// A worker connected to the port bridge with a tag nobody is waiting for.
///
/// # Log Level
/// `warn!` - Connection dropped
pub struct BridgeConnectionRejected<'a> {
    pub service_id: &'a str,
    pub reason: &'a str,
}

impl Display for BridgeConnectionRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Rejected client port connection from '{}': {}",
            self.service_id, self.reason
        )
    }
}

impl StructuredLog for BridgeConnectionRejected<'_> {
    fn log(&self) {
        tracing::warn!(
            service_id = self.service_id,
            reason = self.reason,
            "{}", self
        );
    }
}
