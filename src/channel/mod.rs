// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Point-to-point client channels.
//!
//! A client channel is a pair of entangled [`MessagePort`]s. One port is handed
//! to the worker process, the other to the caller (typically a UI window).
//! Traffic on these ports never touches the request correlator. Closing or
//! dropping either port closes the pair, which is what the handle's
//! [`ChannelRegistry`] watches for cleanup.

mod port;
mod registry;

pub use port::{message_channel, MessagePort, PortCloseSignal};
pub use registry::{ChannelRegistry, ClientChannel};
