// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod launcher;

pub use launcher::{ChildLink, EntryPoint, LaunchSpec, PortTransfer, ProcessLauncher};
