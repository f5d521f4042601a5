// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::UpmError;
use crate::protocol::{CLIENT_PORT_KIND, NO_REPLY_ID, READY_KIND};
use serde::{Deserialize, Serialize};

/// Opaque request/response payload.
///
/// Decoding into an application type is left to the caller.
pub type Payload = serde_json::Value;

/// A message on the control channel.
///
/// Serialized as `{ "kind", "requestId", "payload", "error"? }`. A present
/// `error` means the request failed and `payload` is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub kind: String,
    pub request_id: u64,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn request(kind: impl Into<String>, request_id: u64, payload: Payload) -> Self {
        Self {
            kind: kind.into(),
            request_id,
            payload,
            error: None,
        }
    }

    pub fn response(kind: impl Into<String>, request_id: u64, payload: Payload) -> Self {
        Self::request(kind, request_id, payload)
    }

    pub fn failure(kind: impl Into<String>, request_id: u64, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            request_id,
            payload: Payload::Null,
            error: Some(message.into()),
        }
    }

    /// A fire-and-forget message; the worker must not answer it.
    pub fn event(kind: impl Into<String>, payload: Payload) -> Self {
        Self::request(kind, NO_REPLY_ID, payload)
    }

    pub fn ready() -> Self {
        Self::event(READY_KIND, Payload::Null)
    }

    pub fn client_port(client_id: &str) -> Self {
        Self::event(
            CLIENT_PORT_KIND,
            serde_json::json!({ "clientId": client_id }),
        )
    }

    pub fn is_ready(&self) -> bool {
        self.request_id == NO_REPLY_ID && self.kind == READY_KIND
    }

    pub fn expects_reply(&self) -> bool {
        self.request_id != NO_REPLY_ID
    }

    /// Collapse a response into its outcome: `error` wins over `payload`.
    pub fn into_outcome(self) -> Result<Payload, UpmError> {
        match self.error {
            Some(message) => Err(UpmError::RemoteError { message }),
            None => Ok(self.payload),
        }
    }
}

/// First frame a worker writes on a client-channel connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPortTag {
    pub client_id: String,
}
