// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Process handles: one supervised worker each.
//!
//! A [`ProcessHandle`] is a cheap, cloneable front for an actor task that owns
//! the worker's control channel, its pending-request table and its client
//! channels. Every mutation of that state happens on the actor, so there are
//! no locks around it.

mod actor;
mod handle;
mod pending;
mod state;

#[cfg(test)]
mod integration_tests;

pub use handle::{HandleSettings, HandleSnapshot, ProcessHandle, RequestOptions};
pub use state::ProcessState;
