// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;   // worker launchers
pub mod channel;    // client message channels
pub mod config;     // config + runtime builder
pub mod errors;     // error handling
pub mod observability;
pub mod process;    // process handles and request correlation
pub mod protocol;   // control envelopes and reserved names
pub mod supervisor; // service registry
pub mod traits;     // launcher abstractions
