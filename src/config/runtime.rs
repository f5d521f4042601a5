// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::backends::command::CommandLauncher;
use crate::config::Config;
use crate::errors::UpmResult;
use crate::process::ProcessHandle;
use crate::supervisor::ProcessSupervisor;
use std::sync::Arc;

/// Supervisor builder - wires configuration to the OS process backend.
///
/// # Examples
///
/// ```
/// use upm_runtime::config::{Config, RuntimeBuilder, SupervisorOptions};
///
/// let config = Config {
///     app_name: "vrkit".to_string(),
///     supervisor: SupervisorOptions {
///         request_timeout_ms: Some(5_000),
///         startup_timeout_ms: None,
///         stop_grace_ms: None,
///     },
///     services: vec![],
/// };
///
/// let supervisor = RuntimeBuilder::from_config(&config);
/// assert_eq!(supervisor.settings().app_name, "vrkit");
/// assert_eq!(supervisor.launcher_name(), "command");
/// ```
pub struct RuntimeBuilder;

impl RuntimeBuilder {
    /// Build a supervisor over [`CommandLauncher`] using the config's defaults.
    pub fn from_config(cfg: &Config) -> ProcessSupervisor {
        ProcessSupervisor::new(Arc::new(CommandLauncher::new()), cfg.handle_settings())
    }

    /// Start every configured service, in order.
    ///
    /// Stops at the first service that fails to start; services started before
    /// it stay registered with `supervisor`.
    pub async fn start_services(
        supervisor: &ProcessSupervisor,
        cfg: &Config,
    ) -> UpmResult<Vec<ProcessHandle>> {
        let mut handles = Vec::with_capacity(cfg.services.len());
        for service in &cfg.services {
            let handle = supervisor
                .create_process_with(&service.id, service.entry_point(), cfg.settings_for(service))
                .await?;
            handles.push(handle);
        }
        Ok(handles)
    }
}
