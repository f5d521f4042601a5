// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Registry of process handles, one per service id.

use crate::channel::MessagePort;
use crate::errors::{UpmError, UpmResult};
use crate::observability::messages::supervisor::{
    ChannelProvisionFailed, DuplicateServiceRejected, ServiceRegistered, ServiceRemoved,
    ShutdownCompleted, ShutdownStarted, ShutdownTaskFailed,
};
use crate::observability::messages::StructuredLog;
use crate::process::{HandleSettings, ProcessHandle};
use crate::traits::{EntryPoint, ProcessLauncher};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::Instrument;

/// Owns every process handle of an application.
///
/// The supervisor is constructed explicitly and passed to whatever needs it;
/// there is no global instance.
///
/// # Example
/// ```rust,no_run
/// # #[cfg(unix)]
/// # async fn run() -> Result<(), upm_runtime::errors::UpmError> {
/// use std::sync::Arc;
/// use upm_runtime::backends::command::CommandLauncher;
/// use upm_runtime::process::HandleSettings;
/// use upm_runtime::supervisor::ProcessSupervisor;
///
/// let supervisor = ProcessSupervisor::new(Arc::new(CommandLauncher::new()), HandleSettings::default());
/// let handle = supervisor.create_process("session-data", "./session-worker").await?;
/// let reply = handle.execute_request("echo", serde_json::json!("hi"), None).await?;
/// println!("{}", reply);
/// supervisor.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct ProcessSupervisor {
    launcher: Arc<dyn ProcessLauncher>,
    settings: HandleSettings,
    handles: Mutex<HashMap<String, ProcessHandle>>,
}

impl ProcessSupervisor {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, settings: HandleSettings) -> Self {
        Self {
            launcher,
            settings,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Default settings applied to new handles
    pub fn settings(&self) -> &HandleSettings {
        &self.settings
    }

    pub fn launcher_name(&self) -> &'static str {
        self.launcher.name()
    }

    /// Register, spawn and await readiness of a worker for `service_id`.
    pub async fn create_process(
        &self,
        service_id: &str,
        entry_point: impl Into<EntryPoint>,
    ) -> UpmResult<ProcessHandle> {
        self.create_process_with(service_id, entry_point, self.settings.clone())
            .await
    }

    /// Like [`create_process`](Self::create_process) with per-service settings.
    ///
    /// Fails with `DuplicateRegistration` (without launching anything) when the
    /// id is taken. If the worker fails to start, the registration is removed
    /// before the error is returned.
    pub async fn create_process_with(
        &self,
        service_id: &str,
        entry_point: impl Into<EntryPoint>,
        settings: HandleSettings,
    ) -> UpmResult<ProcessHandle> {
        let handle = {
            let mut handles = self.handles.lock().await;
            if handles.contains_key(service_id) {
                DuplicateServiceRejected { service_id }.log();
                return Err(UpmError::DuplicateRegistration {
                    service_id: service_id.to_string(),
                });
            }

            let handle = ProcessHandle::new(
                service_id,
                entry_point.into(),
                settings,
                self.launcher.clone(),
            );
            handles.insert(service_id.to_string(), handle.clone());
            ServiceRegistered { service_id }.log();
            handle
        };

        let ready = match handle.spawn() {
            Ok(()) => handle.when_ready().await,
            Err(err) => Err(err),
        };

        match ready {
            Ok(()) => Ok(handle),
            Err(err) => {
                self.forget(service_id, &handle, "failed to start").await;
                handle.stop().await;
                Err(err)
            }
        }
    }

    pub async fn get_process(&self, service_id: &str) -> Option<ProcessHandle> {
        self.handles.lock().await.get(service_id).cloned()
    }

    /// Registered service ids, sorted
    pub async fn service_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handles.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Open a client channel to a registered service.
    pub async fn provision_client_channel(
        &self,
        service_id: &str,
        client_id: &str,
    ) -> UpmResult<MessagePort> {
        let result = match self.get_process(service_id).await {
            Some(handle) => handle.create_message_channel(client_id).await,
            None => Err(UpmError::not_running(service_id)),
        };

        if let Err(err) = &result {
            let reason = err.to_string();
            ChannelProvisionFailed {
                service_id,
                client_id,
                reason: &reason,
            }
            .log();
        }
        result
    }

    /// Stop and forget a service. Unknown ids are ignored.
    pub async fn stop_process(&self, service_id: &str) {
        let handle = self.handles.lock().await.remove(service_id);
        if let Some(handle) = handle {
            handle.stop().await;
            ServiceRemoved {
                service_id,
                reason: "stopped",
            }
            .log();
        }
    }

    /// Stop every registered service concurrently and wait for all of them.
    ///
    /// A stop that panics is logged and does not interrupt the others.
    pub async fn shutdown(&self) {
        let handles: Vec<(String, ProcessHandle)> = self.handles.lock().await.drain().collect();
        let started = Instant::now();
        let service_count = handles.len();

        let message = ShutdownStarted { service_count };
        let span = message.span("shutdown");
        message.log();

        async {
            let mut tasks = Vec::with_capacity(service_count);
            for (service_id, handle) in handles {
                let task = tokio::spawn(async move { handle.stop().await });
                tasks.push((service_id, task));
            }

            let mut failures = 0;
            for (service_id, task) in tasks {
                match task.await {
                    Ok(()) => ServiceRemoved {
                        service_id: &service_id,
                        reason: "shutdown",
                    }
                    .log(),
                    Err(e) => {
                        failures += 1;
                        let reason = e.to_string();
                        ShutdownTaskFailed {
                            service_id: &service_id,
                            reason: &reason,
                        }
                        .log();
                    }
                }
            }

            ShutdownCompleted {
                service_count,
                failures,
                duration: started.elapsed(),
            }
            .log();
        }
        .instrument(span)
        .await
    }

    /// Remove `service_id` only if it still maps to `handle`.
    async fn forget(&self, service_id: &str, handle: &ProcessHandle, reason: &str) {
        let mut handles = self.handles.lock().await;
        if handles
            .get(service_id)
            .is_some_and(|current| current.same_handle(handle))
        {
            handles.remove(service_id);
            ServiceRemoved { service_id, reason }.log();
        }
    }
}
