// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::{UpmError, UpmResult};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Create a pair of entangled ports.
///
/// Messages posted on one port are received on the other. Closing either side
/// closes both.
pub fn message_channel() -> (MessagePort, MessagePort) {
    let closed = CancellationToken::new();
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();

    let a = MessagePort {
        tx: b_tx,
        rx: a_rx,
        closed: closed.clone(),
    };
    let b = MessagePort {
        tx: a_tx,
        rx: b_rx,
        closed,
    };
    (a, b)
}

/// One end of a client channel carrying opaque byte messages.
#[derive(Debug)]
pub struct MessagePort {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    closed: CancellationToken,
}

impl MessagePort {
    /// Post a message to the peer port.
    pub fn post(&self, data: impl Into<Vec<u8>>) -> UpmResult<()> {
        if self.closed.is_cancelled() {
            return Err(UpmError::ChannelClosed);
        }
        self.tx.send(data.into()).map_err(|_| UpmError::ChannelClosed)
    }

    /// Receive the next message, or `None` once the channel has closed.
    ///
    /// Messages already queued when the channel closes are still delivered.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        tokio::select! {
            biased;
            message = self.rx.recv() => message,
            _ = self.closed.cancelled() => self.rx.try_recv().ok(),
        }
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once either side of the channel has closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// A handle that observes (and can force) closure without owning the port.
    pub fn close_signal(&self) -> PortCloseSignal {
        PortCloseSignal(self.closed.clone())
    }
}

impl Drop for MessagePort {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// Close observer for a channel whose ports are owned elsewhere.
#[derive(Debug, Clone)]
pub struct PortCloseSignal(CancellationToken);

impl PortCloseSignal {
    pub fn is_closed(&self) -> bool {
        self.0.is_cancelled()
    }

    pub fn close(&self) {
        self.0.cancel();
    }

    pub async fn closed(&self) {
        self.0.cancelled().await
    }
}
