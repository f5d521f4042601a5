// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

#[cfg(unix)]
use anyhow::{anyhow, Context};
#[cfg(unix)]
use upm_runtime::config::{load_and_validate_config, RuntimeBuilder};
#[cfg(unix)]
use upm_runtime::observability::init_tracing;
#[cfg(unix)]
use upm_runtime::protocol::Payload;

#[cfg(unix)]
#[tokio::main]
async fn main() {
    init_tracing("info");

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 || args.len() > 5 {
        eprintln!("Usage: {} <config.yaml> <service-id> <kind> [json-payload]", args[0]);
        eprintln!("Example: {} configs/upm.yaml session-data echo '{{\"hello\":\"world\"}}'", args[0]);
        std::process::exit(1);
    }

    let payload = args.get(4).map(String::as_str);
    if let Err(e) = run(&args[1], &args[2], &args[3], payload).await {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

/// Start every configured service, send one request and shut down.
#[cfg(unix)]
async fn run(
    config_path: &str,
    service_id: &str,
    kind: &str,
    payload: Option<&str>,
) -> anyhow::Result<()> {
    let config = load_and_validate_config(config_path)
        .with_context(|| format!("loading {}", config_path))?;
    if config.service(service_id).is_none() {
        return Err(anyhow!("service '{}' is not configured", service_id));
    }

    let payload: Payload = match payload {
        Some(text) => serde_json::from_str(text).context("payload is not valid JSON")?,
        None => Payload::Null,
    };

    let supervisor = RuntimeBuilder::from_config(&config);
    let outcome = async {
        RuntimeBuilder::start_services(&supervisor, &config).await?;
        let handle = supervisor
            .get_process(service_id)
            .await
            .ok_or_else(|| anyhow!("service '{}' is not running", service_id))?;
        let reply = handle.execute_request(kind, payload, None).await?;
        anyhow::Ok(reply)
    }
    .await;

    supervisor.shutdown().await;

    let reply = outcome?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("upm requires a Unix platform");
    std::process::exit(1);
}
