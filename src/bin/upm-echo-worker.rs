// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Scriptable worker speaking the control protocol on stdio.
//!
//! Used by the real-process tests and handy for trying the `upm` CLI.
//! Logs go to stderr; stdout carries only control envelopes.

#[cfg(unix)]
mod worker {
    use anyhow::{anyhow, Context};
    use futures::{SinkExt, StreamExt};
    use tokio::net::UnixStream;
    use tokio::sync::mpsc;
    use tokio_util::bytes::Bytes;
    use tokio_util::codec::{Framed, FramedRead, FramedWrite, LengthDelimitedCodec, LinesCodec};
    use tracing::{debug, warn};
    use upm_runtime::backends::echo::{handle_request, EchoAction};
    use upm_runtime::protocol::{ClientPortTag, Envelope, CLIENT_PORT_KIND, ENV_PORT_SOCKET};

    #[derive(Debug, Default)]
    pub struct WorkerOptions {
        /// Exit with this code instead of reporting ready
        pub fail_start: Option<i32>,
        /// Never report ready
        pub no_ready: bool,
    }

    impl WorkerOptions {
        pub fn parse(args: &[String]) -> anyhow::Result<Self> {
            let mut options = Self::default();
            let mut args = args.iter();
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--fail-start" => {
                        let code = args
                            .next()
                            .ok_or_else(|| anyhow!("--fail-start needs an exit code"))?;
                        options.fail_start =
                            Some(code.parse().context("--fail-start code must be an integer")?);
                    }
                    "--no-ready" => options.no_ready = true,
                    other => return Err(anyhow!("unknown argument '{}'", other)),
                }
            }
            Ok(options)
        }
    }

    pub async fn run(options: WorkerOptions) -> anyhow::Result<()> {
        let env: Vec<(String, String)> = std::env::vars().collect();
        let port_socket = std::env::var(ENV_PORT_SOCKET).ok();

        let (replies, mut outgoing) = mpsc::unbounded_channel::<Envelope>();
        tokio::spawn(async move {
            let mut stdout = FramedWrite::new(tokio::io::stdout(), LinesCodec::new());
            while let Some(envelope) = outgoing.recv().await {
                let line = match serde_json::to_string(&envelope) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "unable to encode reply");
                        continue;
                    }
                };
                if stdout.send(line).await.is_err() {
                    break;
                }
            }
        });

        if !options.no_ready {
            replies.send(Envelope::ready())?;
        }

        let mut stdin = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
        while let Some(line) = stdin.next().await {
            let line = line?;
            let envelope: Envelope = match serde_json::from_str(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "malformed control message, skipping");
                    continue;
                }
            };

            if envelope.kind == CLIENT_PORT_KIND && !envelope.expects_reply() {
                accept_client_port(envelope, port_socket.as_deref());
                continue;
            }

            match handle_request(envelope, &env) {
                EchoAction::Reply(reply) => replies.send(reply)?,
                EchoAction::ReplyTwice(reply) => {
                    replies.send(reply.clone())?;
                    replies.send(reply)?;
                }
                EchoAction::ReplyAfter(delay, reply) => {
                    let replies = replies.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = replies.send(reply);
                    });
                }
                EchoAction::Exit(code) => std::process::exit(code),
                EchoAction::Ignore => {}
            }
        }

        debug!("control input closed, exiting");
        Ok(())
    }

    fn accept_client_port(envelope: Envelope, port_socket: Option<&str>) {
        let tag: ClientPortTag = match serde_json::from_value(envelope.payload) {
            Ok(tag) => tag,
            Err(e) => {
                warn!(error = %e, "client port announcement without a client id");
                return;
            }
        };
        let Some(path) = port_socket else {
            warn!(client_id = %tag.client_id, "{} is not set, ignoring client port", ENV_PORT_SOCKET);
            return;
        };

        let path = path.to_string();
        tokio::spawn(async move {
            let client_id = tag.client_id.clone();
            if let Err(e) = echo_client(&path, tag).await {
                warn!(client_id = %client_id, error = %e, "client channel ended with error");
            }
        });
    }

    /// Claim the client's endpoint and echo every frame back.
    async fn echo_client(path: &str, tag: ClientPortTag) -> anyhow::Result<()> {
        let stream = UnixStream::connect(path)
            .await
            .with_context(|| format!("connecting to {}", path))?;
        let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
        framed.send(Bytes::from(serde_json::to_vec(&tag)?)).await?;

        while let Some(frame) = framed.next().await {
            framed.send(frame?.freeze()).await?;
        }
        Ok(())
    }
}

#[cfg(unix)]
#[tokio::main]
async fn main() {
    upm_runtime::observability::init_tracing("warn");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match worker::WorkerOptions::parse(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("upm-echo-worker: {}", e);
            std::process::exit(2);
        }
    };

    if let Some(code) = options.fail_start {
        std::process::exit(code);
    }

    if let Err(e) = worker::run(options).await {
        tracing::error!(error = %e, "worker failed");
        std::process::exit(1);
    }
}

#[cfg(not(unix))]
fn main() {
    eprintln!("upm-echo-worker requires a Unix platform");
    std::process::exit(1);
}
