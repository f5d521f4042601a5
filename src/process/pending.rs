// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::UpmResult;
use crate::protocol::Payload;
use std::collections::HashMap;
use std::future::poll_fn;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_util::time::{delay_queue, DelayQueue};

/// Where a request's outcome is delivered.
pub(crate) type ResultSink = oneshot::Sender<UpmResult<Payload>>;

/// An outstanding request awaiting its correlated response.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub id: u64,
    pub kind: String,
    pub timeout: Duration,
    pub dispatched_at: Instant,
    sink: ResultSink,
    timer: delay_queue::Key,
}

impl PendingRequest {
    /// Deliver the outcome. Returns `false` when the caller has stopped listening.
    pub fn resolve(self, outcome: UpmResult<Payload>) -> bool {
        self.sink.send(outcome).is_ok()
    }
}

/// Request id → outstanding request, plus one timer per entry.
///
/// Every entry leaves the table exactly once: through [`take`](Self::take)
/// when its response arrives or it is cancelled, through
/// [`next_expired`](Self::next_expired) when its timer fires, or through
/// [`drain`](Self::drain) on teardown. Removing an entry always clears its timer.
#[derive(Debug, Default)]
pub(crate) struct PendingRequestTable {
    entries: HashMap<u64, PendingRequest>,
    timers: DelayQueue<u64>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u64, kind: &str, timeout: Duration, sink: ResultSink) {
        let timer = self.timers.insert(id, timeout);
        let request = PendingRequest {
            id,
            kind: kind.to_string(),
            timeout,
            dispatched_at: Instant::now(),
            sink,
            timer,
        };
        if let Some(previous) = self.entries.insert(id, request) {
            // Ids are never reused, but keep the timer queue consistent regardless.
            self.timers.remove(&previous.timer);
        }
    }

    pub fn take(&mut self, id: u64) -> Option<PendingRequest> {
        let request = self.entries.remove(&id)?;
        self.timers.remove(&request.timer);
        Some(request)
    }

    /// Wait for the next request whose timer fires and remove it.
    ///
    /// Resolves to `None` immediately when the table is empty.
    pub async fn next_expired(&mut self) -> Option<PendingRequest> {
        loop {
            let expired = poll_fn(|cx| self.timers.poll_expired(cx)).await?;
            if let Some(request) = self.entries.remove(expired.get_ref()) {
                return Some(request);
            }
        }
    }

    /// Remove every entry, clearing all timers.
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        self.timers.clear();
        let mut drained: Vec<PendingRequest> = self.entries.drain().map(|(_, r)| r).collect();
        drained.sort_by_key(|r| r.id);
        drained
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
