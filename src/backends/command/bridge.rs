// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::channel::MessagePort;
use crate::errors::UpmResult;
use crate::observability::messages::channel::BridgeConnectionRejected;
use crate::observability::messages::StructuredLog;
use crate::protocol::ClientPortTag;
use crate::traits::PortTransfer;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, warn};

static NEXT_SOCKET: AtomicU64 = AtomicU64::new(1);

type WaitingPorts = Arc<Mutex<HashMap<String, MessagePort>>>;

/// Delivers client-channel endpoints to a child process over a Unix socket.
///
/// Transferred endpoints wait in a table keyed by client id. The child connects
/// to the socket named by `UPM_PORT_SOCKET`, writes a JSON
/// [`ClientPortTag`] as its first length-delimited frame, and from then on every
/// frame is a message on that client's channel, in both directions. Closing
/// either the connection or the endpoint ends the pairing.
pub struct PortBridge {
    service_id: String,
    path: PathBuf,
    waiting: WaitingPorts,
    accept_task: JoinHandle<()>,
}

impl PortBridge {
    /// Bind a fresh socket in `dir`. Must be called from within a tokio runtime.
    pub fn bind(service_id: &str, dir: &Path) -> io::Result<Self> {
        let path = dir.join(socket_name(service_id));
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path)?;

        let waiting: WaitingPorts = Arc::new(Mutex::new(HashMap::new()));
        let accept_task = tokio::spawn(accept_loop(
            listener,
            waiting.clone(),
            service_id.to_string(),
        ));

        Ok(Self {
            service_id: service_id.to_string(),
            path,
            waiting,
            accept_task,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Client ids whose endpoint has not been claimed yet.
    pub async fn waiting_clients(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.waiting.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Drop for PortBridge {
    fn drop(&mut self) {
        self.accept_task.abort();
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(service_id = %self.service_id, error = %e, "port socket already removed");
        }
    }
}

#[async_trait]
impl PortTransfer for PortBridge {
    async fn transfer(&self, client_id: &str, port: MessagePort) -> UpmResult<()> {
        let signal = port.close_signal();
        self.waiting.lock().await.insert(client_id.to_string(), port);

        // Drop the entry if the channel closes before the child claims it.
        let waiting = Arc::downgrade(&self.waiting);
        let client_id = client_id.to_string();
        tokio::spawn(async move {
            signal.closed().await;
            forget_closed(&waiting, &client_id).await;
        });
        Ok(())
    }
}

async fn forget_closed(waiting: &Weak<Mutex<HashMap<String, MessagePort>>>, client_id: &str) {
    let Some(waiting) = waiting.upgrade() else {
        return;
    };
    let mut waiting = waiting.lock().await;
    // A replacement endpoint for the same client may already be waiting.
    if waiting.get(client_id).is_some_and(MessagePort::is_closed) {
        waiting.remove(client_id);
    }
}

/// Socket file name; kept short since Unix socket paths are length-limited.
fn socket_name(service_id: &str) -> String {
    let tag: String = service_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(24)
        .collect();
    format!(
        "upm-{}-{}-{}.sock",
        std::process::id(),
        NEXT_SOCKET.fetch_add(1, Ordering::Relaxed),
        tag
    )
}

async fn accept_loop(listener: UnixListener, waiting: WaitingPorts, service_id: String) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(serve_connection(stream, waiting.clone(), service_id.clone()));
            }
            Err(e) => {
                warn!(service_id = %service_id, error = %e, "port socket accept failed");
                break;
            }
        }
    }
}

async fn serve_connection(stream: UnixStream, waiting: WaitingPorts, service_id: String) {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

    let tag = match framed.next().await {
        Some(Ok(frame)) => match serde_json::from_slice::<ClientPortTag>(&frame) {
            Ok(tag) => tag,
            Err(e) => {
                let reason = format!("invalid client tag: {}", e);
                return reject(&service_id, &reason);
            }
        },
        Some(Err(e)) => return reject(&service_id, &e.to_string()),
        None => return reject(&service_id, "connection closed before client tag"),
    };

    let port = waiting.lock().await.remove(&tag.client_id);
    let Some(mut port) = port else {
        let reason = format!("no channel waiting for client '{}'", tag.client_id);
        return reject(&service_id, &reason);
    };

    loop {
        tokio::select! {
            frame = framed.next() => match frame {
                Some(Ok(frame)) => {
                    if port.post(frame.to_vec()).is_err() {
                        break;
                    }
                }
                _ => break,
            },
            message = port.recv() => match message {
                Some(message) => {
                    if framed.send(Bytes::from(message)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
    port.close();
}

fn reject(service_id: &str, reason: &str) {
    BridgeConnectionRejected { service_id, reason }.log();
}
