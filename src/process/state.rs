// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::observability::messages::process::StateTransitionRejected;
use crate::observability::messages::StructuredLog;
use std::fmt;
use tokio::sync::watch;

/// Lifecycle of a process handle.
///
/// ```text
/// Created ──► Spawning ──► Ready ──► Stopping ──► Stopped
///    │            │
///    │            └──► Failed
///    └──► Stopped (stopped before it was ever spawned)
/// ```
///
/// Transitions only move forward and no state is entered twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    Created,
    Spawning,
    Ready,
    Failed { reason: String },
    Stopping,
    Stopped,
}

impl ProcessState {
    pub fn name(&self) -> &'static str {
        match self {
            ProcessState::Created => "created",
            ProcessState::Spawning => "spawning",
            ProcessState::Ready => "ready",
            ProcessState::Failed { .. } => "failed",
            ProcessState::Stopping => "stopping",
            ProcessState::Stopped => "stopped",
        }
    }

    pub fn can_transition_to(&self, next: &ProcessState) -> bool {
        matches!(
            (self, next),
            (ProcessState::Created, ProcessState::Spawning)
                | (ProcessState::Created, ProcessState::Stopped)
                | (ProcessState::Spawning, ProcessState::Ready)
                | (ProcessState::Spawning, ProcessState::Failed { .. })
                | (ProcessState::Ready, ProcessState::Stopping)
                | (ProcessState::Stopping, ProcessState::Stopped)
        )
    }

    /// Readiness has been decided one way or the other.
    pub fn is_settled(&self) -> bool {
        !matches!(self, ProcessState::Created | ProcessState::Spawning)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Failed { .. } | ProcessState::Stopped)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Failed { reason } => write!(f, "failed ({})", reason),
            other => f.write_str(other.name()),
        }
    }
}

/// Shared, observable lifecycle state of one handle.
///
/// Written by the handle's actor; read and awaited by every handle clone.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    service_id: String,
    state: watch::Sender<ProcessState>,
}

impl Lifecycle {
    pub fn new(service_id: &str) -> Self {
        let (state, _) = watch::channel(ProcessState::Created);
        Self {
            service_id: service_id.to_string(),
            state,
        }
    }

    pub fn current(&self) -> ProcessState {
        self.state.borrow().clone()
    }

    /// Apply `next` if it is a legal successor of the current state.
    pub fn transition(&self, next: ProcessState) -> bool {
        let mut rejected_from = None;
        let applied = self.state.send_if_modified(|state| {
            if state.can_transition_to(&next) {
                *state = next.clone();
                true
            } else {
                rejected_from = Some(state.name());
                false
            }
        });

        if let Some(from) = rejected_from {
            StateTransitionRejected {
                service_id: &self.service_id,
                from,
                to: next.name(),
            }
            .log();
        }
        applied
    }

    /// Wait until the state is settled and return it.
    pub async fn settled(&self) -> ProcessState {
        let mut rx = self.state.subscribe();
        let settled = rx.wait_for(ProcessState::is_settled).await.map(|state| state.clone());
        // The sender lives in `self`, so the wait cannot observe a closed channel.
        settled.unwrap_or_else(|_| self.current())
    }
}
