// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! All diagnostic output of the runtime goes through `tracing`. Message texts
//! are not scattered through the code as format strings; each event is a small
//! struct in [`messages`] implementing `Display` (the human-readable line) and
//! [`messages::StructuredLog`] (the level and structured fields).
//!
//! # Usage
//!
//! ```rust
//! use upm_runtime::observability::messages::StructuredLog;
//! use upm_runtime::observability::messages::request::ResponseDropped;
//!
//! ResponseDropped {
//!     service_id: "session-data",
//!     request_id: 42,
//!     kind: "echo",
//! }
//! .log();
//! ```
//!
//! Binaries install a `tracing-subscriber` with an `EnvFilter`; see
//! [`init_tracing`].

pub mod messages;

use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber.
///
/// `RUST_LOG` wins when set, otherwise `default_directive` is used. Logs are
/// written to stderr so that binaries speaking a protocol on stdout stay clean.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (e.g. from tests) is not an error worth surfacing.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
