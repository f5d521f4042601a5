// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_APP_NAME, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_STARTUP_TIMEOUT_MS,
    DEFAULT_STOP_GRACE_MS,
};
use crate::errors::ConfigError;
use crate::process::HandleSettings;
use crate::traits::EntryPoint;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for a supervised application.
///
/// # Fields
/// * `app_name` - Exported to every worker as `APP_NAME` (defaults to `upm`)
/// * `supervisor` - Timing defaults shared by all services
/// * `services` - Workers to start, one per service id
///
/// # Example
/// ```yaml
/// app_name: vrkit
/// supervisor:
///   request_timeout_ms: 120000
///   startup_timeout_ms: 30000
///   stop_grace_ms: 5000
/// services:
///   - id: session-data
///     entry_point: ./target/debug/upm-echo-worker
///     args: []
///     request_timeout_ms: 5000
/// ```
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default)]
    pub supervisor: SupervisorOptions,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

/// Supervisor-wide timing options. Unset values fall back to `config::consts`.
#[derive(Debug, Default, Deserialize)]
pub struct SupervisorOptions {
    pub request_timeout_ms: Option<u64>,
    pub startup_timeout_ms: Option<u64>,
    /// Time between SIGTERM and SIGKILL when a worker is stopped
    pub stop_grace_ms: Option<u64>,
}

impl SupervisorOptions {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS))
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms.unwrap_or(DEFAULT_STARTUP_TIMEOUT_MS))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms.unwrap_or(DEFAULT_STOP_GRACE_MS))
    }
}

/// One worker definition.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub id: String,
    pub entry_point: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Overrides `supervisor.request_timeout_ms` for this service
    pub request_timeout_ms: Option<u64>,
    /// Overrides `supervisor.startup_timeout_ms` for this service
    pub startup_timeout_ms: Option<u64>,
    /// Overrides `supervisor.stop_grace_ms` for this service
    pub stop_grace_ms: Option<u64>,
}

impl ServiceConfig {
    pub fn entry_point(&self) -> EntryPoint {
        EntryPoint::new(&self.entry_point).with_args(self.args.iter().cloned())
    }
}

impl Config {
    /// Handle settings every service starts from.
    pub fn handle_settings(&self) -> HandleSettings {
        HandleSettings::default()
            .with_app_name(self.app_name.clone())
            .with_request_timeout(self.supervisor.request_timeout())
            .with_startup_timeout(self.supervisor.startup_timeout())
            .with_stop_grace(self.supervisor.stop_grace())
    }

    /// Handle settings for one service, with its overrides applied.
    pub fn settings_for(&self, service: &ServiceConfig) -> HandleSettings {
        let mut settings = self.handle_settings();
        if let Some(ms) = service.request_timeout_ms {
            settings = settings.with_request_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = service.startup_timeout_ms {
            settings = settings.with_startup_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = service.stop_grace_ms {
            settings = settings.with_stop_grace(Duration::from_millis(ms));
        }
        settings
    }

    pub fn service(&self, service_id: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.id == service_id)
    }
}

/// Load a config from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    Ok(cfg)
}

/// Load and validate a config from a YAML file
///
/// Every validation problem is reported at once, not just the first.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let cfg = load_config(path)?;
    crate::config::validate_config(&cfg).map_err(ConfigError::Invalid)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parse_basic_config() {
        let yaml = r#"
app_name: vrkit
supervisor:
  request_timeout_ms: 5000
services:
  - id: session-data
    entry_point: ./worker
    args: ["--verbose"]
  - id: thumbnails
    entry_point: ./thumbs
    request_timeout_ms: 250
"#;

        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.app_name, "vrkit");
        assert_eq!(cfg.services.len(), 2);
        assert_eq!(cfg.services[0].args, vec!["--verbose"]);
        assert_eq!(
            cfg.services[0].entry_point().to_string(),
            "./worker --verbose"
        );
        assert_eq!(cfg.supervisor.request_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_defaults_apply_when_omitted() {
        let cfg: Config = serde_yaml::from_str("services: []").unwrap();
        assert_eq!(cfg.app_name, DEFAULT_APP_NAME);

        let settings = cfg.handle_settings();
        assert_eq!(
            settings.request_timeout,
            Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)
        );
        assert_eq!(
            settings.startup_timeout,
            Duration::from_millis(DEFAULT_STARTUP_TIMEOUT_MS)
        );
        assert_eq!(settings.stop_grace, Duration::from_millis(DEFAULT_STOP_GRACE_MS));
    }

    #[test]
    fn test_service_overrides_win() {
        let yaml = r#"
supervisor:
  request_timeout_ms: 5000
  startup_timeout_ms: 1000
  stop_grace_ms: 2000
services:
  - id: fast
    entry_point: ./worker
    request_timeout_ms: 250
    stop_grace_ms: 0
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        let service = cfg.service("fast").unwrap();
        let settings = cfg.settings_for(service);

        assert_eq!(settings.request_timeout, Duration::from_millis(250));
        assert_eq!(settings.startup_timeout, Duration::from_millis(1000));
        assert_eq!(settings.stop_grace, Duration::ZERO);
        assert_eq!(cfg.handle_settings().stop_grace, Duration::from_millis(2000));
        assert!(cfg.service("slow").is_none());
    }

    #[test]
    fn test_load_config_reports_missing_file() {
        let err = load_config("/no/such/config.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/no/such/config.yaml"));
    }

    #[test]
    fn test_load_config_reports_parse_errors() {
        let file = write_config("services: [this is: not valid");
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_and_validate_valid_config() {
        let worker = NamedTempFile::new().unwrap();
        let yaml = format!(
            "services:\n  - id: svc\n    entry_point: {}\n",
            worker.path().display()
        );
        let file = write_config(&yaml);

        let cfg = load_and_validate_config(file.path()).unwrap();
        assert_eq!(cfg.services[0].id, "svc");
    }

    #[test]
    fn test_load_and_validate_collects_all_errors() {
        let yaml = r#"
supervisor:
  request_timeout_ms: 0
services:
  - id: svc
    entry_point: /no/such/worker
  - id: svc
    entry_point: /no/such/worker
"#;
        let file = write_config(yaml);

        match load_and_validate_config(file.path()).unwrap_err() {
            ConfigError::Invalid(errors) => assert_eq!(errors.len(), 4),
            other => panic!("unexpected error {}", other),
        }
    }
}
