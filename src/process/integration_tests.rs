// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::backends::stub::{StubLauncher, StubStartup, KILLED_EXIT_CODE};
use crate::errors::UpmError;
use crate::process::{HandleSettings, ProcessHandle, ProcessState, RequestOptions};
use crate::protocol::Payload;
use crate::traits::EntryPoint;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn settings() -> HandleSettings {
    HandleSettings::default().with_app_name("vrkit")
}

fn handle_for(launcher: &Arc<StubLauncher>, settings: HandleSettings) -> ProcessHandle {
    ProcessHandle::new("svc", EntryPoint::new("./worker"), settings, launcher.clone())
}

async fn ready_handle(launcher: &Arc<StubLauncher>) -> ProcessHandle {
    let handle = handle_for(launcher, settings());
    handle.spawn().unwrap();
    handle.when_ready().await.unwrap();
    handle
}

async fn wait_for_pending(handle: &ProcessHandle, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while handle.snapshot().await.pending_requests.len() != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pending request count never reached");
}

async fn wait_for_channels(handle: &ProcessHandle, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while handle.snapshot().await.client_channels.len() != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("client channel count never reached");
}

/// Concurrent requests each get their own response back
#[tokio::test]
async fn test_concurrent_requests_do_not_cross_talk() {
    let launcher = Arc::new(StubLauncher::new());
    let handle = ready_handle(&launcher).await;

    let requests = (0..50).map(|i| {
        let handle = handle.clone();
        async move {
            let reply = handle
                .execute_request("echo", json!({ "n": i }), None)
                .await
                .unwrap();
            (i, reply)
        }
    });

    for (i, reply) in join_all(requests).await {
        assert_eq!(reply, json!({ "n": i }));
    }
    assert!(handle.snapshot().await.pending_requests.is_empty());
}

/// A silent worker times the request out and evicts it
#[tokio::test]
async fn test_timeout_evicts_pending_request() {
    let launcher = Arc::new(StubLauncher::new());
    let handle = ready_handle(&launcher).await;

    let started = Instant::now();
    let err = handle
        .execute_request("silent", Payload::Null, Some(Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(
        err,
        UpmError::RequestTimeout {
            request_id: 1,
            kind: "silent".to_string(),
            timeout: Duration::from_millis(50),
        }
    );
    assert!(handle.snapshot().await.pending_requests.is_empty());
}

/// A response arriving after its request timed out is dropped
#[tokio::test]
async fn test_late_response_is_dropped() {
    let launcher = Arc::new(StubLauncher::new());
    let handle = ready_handle(&launcher).await;

    let err = handle
        .execute_request(
            "delay",
            json!({ "ms": 120, "value": "late" }),
            Some(Duration::from_millis(30)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, UpmError::RequestTimeout { request_id: 1, .. }));

    tokio::time::sleep(Duration::from_millis(150)).await;

    let reply = handle
        .execute_request("echo", json!("fresh"), None)
        .await
        .unwrap();
    assert_eq!(reply, json!("fresh"));
    assert!(handle.snapshot().await.pending_requests.is_empty());
}

/// The second of two responses with the same id is dropped
#[tokio::test]
async fn test_duplicate_response_resolves_once() {
    let launcher = Arc::new(StubLauncher::new());
    let handle = ready_handle(&launcher).await;

    let reply = handle
        .execute_request("duplicate", json!("twice"), None)
        .await
        .unwrap();
    assert_eq!(reply, json!("twice"));

    let reply = handle
        .execute_request("echo", json!("next"), None)
        .await
        .unwrap();
    assert_eq!(reply, json!("next"));
    assert_eq!(handle.state(), ProcessState::Ready);
}

#[tokio::test]
async fn test_remote_error_is_surfaced() {
    let launcher = Arc::new(StubLauncher::new());
    let handle = ready_handle(&launcher).await;

    let err = handle
        .execute_request("fail", json!("disk full"), None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        UpmError::RemoteError {
            message: "disk full".to_string()
        }
    );
}

#[tokio::test]
async fn test_request_ids_are_never_reused() {
    let launcher = Arc::new(StubLauncher::new());
    let handle = ready_handle(&launcher).await;
    let short = Some(Duration::from_millis(10));

    let mut ids = Vec::new();
    for _ in 0..3 {
        match handle.execute_request("silent", Payload::Null, short).await {
            Err(UpmError::RequestTimeout { request_id, .. }) => ids.push(request_id),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    assert_eq!(ids, vec![1, 2, 3]);
}

/// Two concurrent stops both resolve and the worker exits once
#[tokio::test]
async fn test_concurrent_stop_is_idempotent() {
    let launcher = Arc::new(StubLauncher::new());
    let counters = launcher.counters();
    let handle = ready_handle(&launcher).await;

    let other = handle.clone();
    tokio::join!(handle.stop(), other.stop());
    handle.stop().await;

    assert_eq!(handle.state(), ProcessState::Stopped);
    assert_eq!(counters.terminations(), 1);
    assert_eq!(counters.exits(), 1);
}

#[tokio::test]
async fn test_stop_cancels_pending_requests() {
    let launcher = Arc::new(StubLauncher::new());
    let handle = ready_handle(&launcher).await;

    let waiter = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.execute_request("silent", Payload::Null, None).await })
    };
    wait_for_pending(&handle, 1).await;

    handle.stop().await;
    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, UpmError::Cancelled { .. }));

    let err = handle
        .execute_request("echo", Payload::Null, None)
        .await
        .unwrap_err();
    assert_eq!(err, UpmError::not_running("svc"));
}

/// Every pending request is cancelled promptly when the worker is killed
#[tokio::test]
async fn test_process_death_cancels_all_pending_requests() {
    let launcher = Arc::new(StubLauncher::new());
    let handle = ready_handle(&launcher).await;

    let waiters: Vec<_> = (0..10)
        .map(|_| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.execute_request("silent", Payload::Null, None).await })
        })
        .collect();
    wait_for_pending(&handle, 10).await;

    let killed_at = Instant::now();
    launcher.crash();

    for waiter in waiters {
        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            UpmError::cancelled(format!("process exited with code {}", KILLED_EXIT_CODE))
        );
    }
    assert!(killed_at.elapsed() < Duration::from_millis(100));
    assert_eq!(handle.state(), ProcessState::Stopped);
}

#[tokio::test]
async fn test_voluntary_exit_after_ready_stops_handle() {
    let launcher = Arc::new(StubLauncher::new());
    let handle = ready_handle(&launcher).await;

    let err = handle
        .execute_request("exit", json!({ "code": 2 }), None)
        .await
        .unwrap_err();
    assert_eq!(err, UpmError::cancelled("process exited with code 2"));
    assert_eq!(handle.state(), ProcessState::Stopped);

    // Readiness is not failed retroactively, the handle is simply gone.
    assert_eq!(handle.when_ready().await, Err(UpmError::not_running("svc")));
    handle.stop().await;
}

/// Closing the caller endpoint removes the channel from the registry
#[tokio::test]
async fn test_closed_channel_is_removed_and_stop_completes() {
    let launcher = Arc::new(StubLauncher::new());
    let counters = launcher.counters();
    let handle = ready_handle(&launcher).await;

    let mut port = handle.create_message_channel("window").await.unwrap();
    assert_eq!(counters.ports(), 1);
    assert_eq!(handle.snapshot().await.client_channels, vec!["window".to_string()]);

    port.post(b"bulk".to_vec()).unwrap();
    assert_eq!(port.recv().await.unwrap(), b"bulk".to_vec());

    port.close();
    wait_for_channels(&handle, 0).await;

    tokio::time::timeout(Duration::from_secs(1), handle.stop())
        .await
        .expect("stop should complete");
    assert_eq!(handle.state(), ProcessState::Stopped);
}

#[tokio::test]
async fn test_reopening_channel_closes_previous_one() {
    let launcher = Arc::new(StubLauncher::new());
    let handle = ready_handle(&launcher).await;

    let first = handle.create_message_channel("window").await.unwrap();
    let mut second = handle.create_message_channel("window").await.unwrap();

    assert!(first.is_closed());
    assert!(!second.is_closed());
    assert_eq!(handle.snapshot().await.client_channels, vec!["window".to_string()]);

    second.post(b"still open".to_vec()).unwrap();
    assert_eq!(second.recv().await.unwrap(), b"still open".to_vec());
}

#[tokio::test]
async fn test_stop_closes_client_channels() {
    let launcher = Arc::new(StubLauncher::new());
    let handle = ready_handle(&launcher).await;
    let port = handle.create_message_channel("window").await.unwrap();

    handle.stop().await;

    assert!(port.is_closed());
    assert_eq!(port.post(b"late".to_vec()), Err(UpmError::ChannelClosed));
}

#[tokio::test]
async fn test_cancel_token_rejects_request() {
    let launcher = Arc::new(StubLauncher::new());
    let handle = ready_handle(&launcher).await;
    let token = CancellationToken::new();

    let waiter = {
        let handle = handle.clone();
        let options = RequestOptions::new().with_cancel_token(token.clone());
        tokio::spawn(async move {
            handle
                .execute_request_with("silent", Payload::Null, options)
                .await
        })
    };
    wait_for_pending(&handle, 1).await;

    token.cancel();
    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, UpmError::Cancelled { .. }));
    wait_for_pending(&handle, 0).await;
}

#[tokio::test]
async fn test_events_do_not_register_pending_requests() {
    let launcher = Arc::new(StubLauncher::new());
    let handle = ready_handle(&launcher).await;

    handle.send_event("config-changed", json!({ "theme": "dark" })).unwrap();
    let snapshot = handle.snapshot().await;
    assert!(snapshot.pending_requests.is_empty());

    // The event did not consume a request id.
    let err = handle
        .execute_request("silent", Payload::Null, Some(Duration::from_millis(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, UpmError::RequestTimeout { request_id: 1, .. }));
}

#[tokio::test]
async fn test_worker_receives_service_environment() {
    let launcher = Arc::new(StubLauncher::new());
    let handle = ready_handle(&launcher).await;

    let env = handle.execute_request("env", Payload::Null, None).await.unwrap();
    assert_eq!(
        env,
        json!({
            "IN_CHILD_PROCESS": "true",
            "APP_NAME": "vrkit",
            "UPM_SERVICE_ID": "svc",
        })
    );
}

#[tokio::test]
async fn test_execute_typed_round_trips_structs() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Session {
        user: String,
        visits: u32,
    }

    let launcher = Arc::new(StubLauncher::new());
    let handle = ready_handle(&launcher).await;
    let session = Session {
        user: "ada".to_string(),
        visits: 3,
    };

    let echoed: Session = handle.execute_typed("echo", &session).await.unwrap();
    assert_eq!(echoed, session);

    let err = handle
        .execute_typed::<_, Session>("echo", "not a session")
        .await
        .unwrap_err();
    assert!(matches!(err, UpmError::InvalidPayload { .. }));
}

#[tokio::test]
async fn test_exit_before_ready_fails_readiness() {
    let launcher = Arc::new(StubLauncher::with_startup(StubStartup::ExitBeforeReady(0)));
    let handle = handle_for(&launcher, settings());
    handle.spawn().unwrap();

    let err = handle.when_ready().await.unwrap_err();
    assert!(matches!(err, UpmError::SpawnFailure { .. }));
    assert!(matches!(handle.state(), ProcessState::Failed { .. }));

    // Stopping a failed handle has nothing left to do.
    tokio::time::timeout(Duration::from_secs(1), handle.stop())
        .await
        .expect("stop should complete");
}

#[tokio::test]
async fn test_startup_timeout_kills_silent_worker() {
    let launcher = Arc::new(StubLauncher::with_startup(StubStartup::NeverReady));
    let counters = launcher.counters();
    let handle = handle_for(
        &launcher,
        settings().with_startup_timeout(Duration::from_millis(50)),
    );
    handle.spawn().unwrap();

    match handle.when_ready().await {
        Err(UpmError::SpawnFailure { reason, .. }) => {
            assert!(reason.starts_with("no ready signal"), "reason was {}", reason)
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(counters.terminations(), 1);
}

#[tokio::test]
async fn test_stop_during_startup() {
    let launcher = Arc::new(StubLauncher::with_startup(StubStartup::ReadyAfter(
        Duration::from_secs(30),
    )));
    let counters = launcher.counters();
    let handle = handle_for(&launcher, settings());
    handle.spawn().unwrap();

    tokio::time::timeout(Duration::from_secs(1), handle.stop())
        .await
        .expect("stop should not wait for readiness");

    assert_eq!(
        handle.when_ready().await,
        Err(UpmError::spawn_failure("svc", "stopped before ready"))
    );
    assert_eq!(counters.exits(), 1);
}

#[tokio::test]
async fn test_stop_before_spawn_is_a_no_op() {
    let launcher = Arc::new(StubLauncher::new());
    let counters = launcher.counters();
    let handle = handle_for(&launcher, settings());

    handle.stop().await;

    assert_eq!(handle.state(), ProcessState::Stopped);
    assert_eq!(handle.spawn(), Err(UpmError::not_running("svc")));
    assert_eq!(counters.launches(), 0);
}

#[tokio::test]
async fn test_dropping_last_handle_tears_worker_down() {
    let launcher = Arc::new(StubLauncher::new());
    let counters = launcher.counters();
    let handle = ready_handle(&launcher).await;

    drop(handle);

    tokio::time::timeout(Duration::from_secs(1), async {
        while counters.exits() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("worker should exit once the handle is gone");
    assert_eq!(counters.terminations(), 1);
}

/// A budget beyond the timer limit is refused without disturbing the handle
#[tokio::test]
async fn test_oversized_timeout_is_rejected_and_handle_keeps_serving() {
    let launcher = Arc::new(StubLauncher::new());
    let counters = launcher.counters();
    let handle = ready_handle(&launcher).await;
    let three_years = Duration::from_secs(3 * 365 * 24 * 60 * 60);

    let err = handle
        .execute_request("echo", json!("x"), Some(three_years))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UpmError::InvalidTimeout { ref kind, timeout, .. } if kind == "echo" && timeout == three_years
    ));
    assert!(handle.snapshot().await.pending_requests.is_empty());

    let reply = handle.execute_request("echo", json!("y"), None).await.unwrap();
    assert_eq!(reply, json!("y"));
    assert_eq!(handle.state(), ProcessState::Ready);

    handle.stop().await;
    assert_eq!(handle.state(), ProcessState::Stopped);
    assert_eq!(counters.terminations(), 1);
}

#[tokio::test]
async fn test_oversized_default_timeout_is_rejected() {
    let launcher = Arc::new(StubLauncher::new());
    let handle = handle_for(&launcher, settings().with_request_timeout(Duration::MAX));
    handle.spawn().unwrap();
    handle.when_ready().await.unwrap();

    let err = handle.execute_request("echo", json!("x"), None).await.unwrap_err();
    assert!(matches!(err, UpmError::InvalidTimeout { .. }));
    assert_eq!(handle.state(), ProcessState::Ready);
    handle.stop().await;
}

/// Calls on a handle nobody spawned fail instead of waiting forever
#[tokio::test]
async fn test_unspawned_handle_rejects_calls_immediately() {
    let launcher = Arc::new(StubLauncher::new());
    let handle = handle_for(&launcher, settings());

    let outcome = tokio::time::timeout(Duration::from_secs(1), async {
        let request = handle.execute_request("echo", json!("x"), None).await;
        let channel = handle.create_message_channel("client").await.map(|_| ());
        (request, channel)
    })
    .await
    .expect("calls on an unspawned handle should not wait");

    assert_eq!(outcome.0, Err(UpmError::not_running("svc")));
    assert_eq!(outcome.1, Err(UpmError::not_running("svc")));
    assert_eq!(handle.state(), ProcessState::Created);
}
