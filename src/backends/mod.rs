// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Worker launcher backends for the utility process manager.
//!
//! Each backend implements the [`ProcessLauncher`](crate::traits::ProcessLauncher)
//! trait and hands the process handle a [`ChildLink`](crate::traits::ChildLink):
//! control envelopes in and out, an exit notification, a terminate token and a
//! way to deliver client-channel endpoints.
//!
//! # Available Backends
//!
//! ## Command Backend
//! Real OS processes started with `tokio::process::Command`:
//! - **Control channel**: one JSON envelope per line on stdin/stdout
//! - **Client channels**: length-delimited frames over a per-worker Unix socket
//! - **Teardown**: SIGTERM, then SIGKILL after the stop grace period; `kill_on_drop` covers the rest
//!
//! ## Stub Backend (Test-Only)
//! In-memory workers running as tokio tasks:
//! - **Scripted start-up**: ready, ready after a delay, exit early, never ready
//! - **Counters**: launches, terminations, exits and delivered ports
//! - **Note**: NOT available in production builds
//!
//! Both backends answer requests through [`echo::handle_request`], which is
//! also what the `upm-echo-worker` binary runs.
//!
//! # Architecture
//!
//! ```text
//! ProcessHandle → ProcessLauncher::launch → ChildLink → handle actor
//! ```

#[cfg(unix)]
pub mod command;
pub mod echo;
#[cfg(test)]
pub mod stub;
