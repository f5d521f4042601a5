// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Request handling shared by the in-memory stub worker and the
//! `upm-echo-worker` binary.
//!
//! | kind        | behaviour                                       |
//! |-------------|-------------------------------------------------|
//! | `echo`      | replies with the request payload                |
//! | `delay`     | replies with `value` after `ms` milliseconds    |
//! | `fail`      | replies with an error (payload string as text)  |
//! | `silent`    | never replies                                   |
//! | `duplicate` | replies twice with the same id                  |
//! | `exit`      | exits with `code`                               |
//! | `env`       | replies with the service-identifying variables  |

use crate::protocol::{Envelope, Payload, ENV_APP_NAME, ENV_IN_CHILD_PROCESS, ENV_SERVICE_ID};
use serde_json::{Map, Value};
use std::time::Duration;

/// What the worker should do with one control envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum EchoAction {
    Reply(Envelope),
    ReplyTwice(Envelope),
    ReplyAfter(Duration, Envelope),
    Exit(i32),
    Ignore,
}

/// Decide how to answer `envelope`. `env` is the worker's environment.
pub fn handle_request(envelope: Envelope, env: &[(String, String)]) -> EchoAction {
    if !envelope.expects_reply() {
        return EchoAction::Ignore;
    }

    let Envelope {
        kind,
        request_id,
        payload,
        ..
    } = envelope;

    match kind.as_str() {
        "echo" => EchoAction::Reply(Envelope::response(kind, request_id, payload)),
        "delay" => {
            let ms = payload.get("ms").and_then(Value::as_u64).unwrap_or(0);
            let value = payload.get("value").cloned().unwrap_or(Payload::Null);
            EchoAction::ReplyAfter(
                Duration::from_millis(ms),
                Envelope::response(kind, request_id, value),
            )
        }
        "fail" => {
            let message = payload
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| "request failed".to_string());
            EchoAction::Reply(Envelope::failure(kind, request_id, message))
        }
        "silent" => EchoAction::Ignore,
        "duplicate" => EchoAction::ReplyTwice(Envelope::response(kind, request_id, payload)),
        "exit" => {
            let code = payload.get("code").and_then(Value::as_i64).unwrap_or(0);
            EchoAction::Exit(code as i32)
        }
        "env" => {
            let mut vars = Map::new();
            for (key, value) in env {
                if [ENV_IN_CHILD_PROCESS, ENV_APP_NAME, ENV_SERVICE_ID].contains(&key.as_str()) {
                    vars.insert(key.clone(), Value::String(value.clone()));
                }
            }
            EchoAction::Reply(Envelope::response(kind, request_id, Value::Object(vars)))
        }
        _ => {
            let message = format!("Unknown request handler ({})", kind);
            EchoAction::Reply(Envelope::failure(kind, request_id, message))
        }
    }
}
