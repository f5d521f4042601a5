// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::channel::PortCloseSignal;
use std::collections::HashMap;
use std::time::Instant;

/// A registered client channel.
///
/// The handle keeps only the close signal; both ports belong to the worker and
/// the caller.
#[derive(Debug)]
pub struct ClientChannel {
    pub client_id: String,
    /// Distinguishes a channel from a later one opened for the same client.
    pub serial: u64,
    pub opened_at: Instant,
    signal: PortCloseSignal,
}

impl ClientChannel {
    pub fn is_open(&self) -> bool {
        !self.signal.is_closed()
    }

    pub fn close(&self) {
        self.signal.close();
    }
}

/// Client id → open channel, at most one entry per client.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, ClientChannel>,
    next_serial: u64,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel for `client_id`.
    ///
    /// Returns the serial of the new entry and the entry it displaced, if any.
    /// The displaced channel is closed before it is returned.
    pub fn register(
        &mut self,
        client_id: &str,
        signal: PortCloseSignal,
    ) -> (u64, Option<ClientChannel>) {
        self.next_serial += 1;
        let serial = self.next_serial;
        let entry = ClientChannel {
            client_id: client_id.to_string(),
            serial,
            opened_at: Instant::now(),
            signal,
        };
        let replaced = self.channels.insert(client_id.to_string(), entry);
        if let Some(old) = &replaced {
            old.close();
        }
        (serial, replaced)
    }

    /// Remove the entry for `client_id` only if it is still the channel with `serial`.
    pub fn remove_if_current(&mut self, client_id: &str, serial: u64) -> Option<ClientChannel> {
        match self.channels.get(client_id) {
            Some(entry) if entry.serial == serial => self.channels.remove(client_id),
            _ => None,
        }
    }

    /// Close and forget every channel. Returns how many were open.
    pub fn close_all(&mut self) -> usize {
        let count = self.channels.len();
        for (_, channel) in self.channels.drain() {
            channel.close();
        }
        count
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.channels.contains_key(client_id)
    }

    pub fn client_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.channels.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
