// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Control-channel wire types shared by the supervisor and worker processes.
//!
//! The control channel carries one JSON [`Envelope`] per line. Request ids are
//! allocated by the supervisor side and echoed back by the worker on the
//! response. Id `0` is reserved for messages that never get a response:
//! readiness, client-port announcements and fire-and-forget events.

mod envelope;

pub use envelope::{ClientPortTag, Envelope, Payload};

/// Request id used by messages that expect no response.
pub const NO_REPLY_ID: u64 = 0;

/// Kind sent by a worker once it is ready to take requests.
pub const READY_KIND: &str = "upm:ready";

/// Kind announcing a newly transferred client channel to the worker.
pub const CLIENT_PORT_KIND: &str = "upm:client-port";

/// Environment variable marking a process as a supervised child.
pub const ENV_IN_CHILD_PROCESS: &str = "IN_CHILD_PROCESS";

/// Environment variable carrying the owning application's name.
pub const ENV_APP_NAME: &str = "APP_NAME";

/// Environment variable carrying the service id of the child.
pub const ENV_SERVICE_ID: &str = "UPM_SERVICE_ID";

/// Environment variable carrying the client-port socket path (OS backend only).
pub const ENV_PORT_SOCKET: &str = "UPM_PORT_SOCKET";
