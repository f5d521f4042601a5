// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Messages are organized by subsystem:
//!
//! * `process` - handle lifecycle: spawn, readiness, exit, stop
//! * `request` - request correlation: dispatch, completion, timeout, drops
//! * `channel` - client channel provisioning and teardown
//! * `supervisor` - registry and shutdown events
//!
//! # Usage Pattern
//!
//! ```rust
//! use upm_runtime::observability::messages::process::ProcessSpawning;
//!
//! let msg = ProcessSpawning {
//!     service_id: "session-data",
//!     entry_point: "/usr/libexec/session-worker",
//! };
//!
//! tracing::info!("{}", msg);
//! ```

pub mod channel;
pub mod process;
pub mod request;
pub mod supervisor;

use std::fmt::Display;
use tracing::Span;

/// A log message that knows its own level and structured fields.
pub trait StructuredLog: Display {
    /// Emit the event at the message's documented level.
    fn log(&self);

    /// Build a span carrying the message's fields.
    fn span(&self, name: &str) -> Span {
        tracing::info_span!("upm", span_name = name)
    }
}
