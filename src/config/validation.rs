// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Configuration validation for supervised services.
//!
//! Checks run over every service and all problems are collected:
//!
//! 1. **Identity**: ids are non-empty and unique
//! 2. **Entry points**: the configured program exists on disk
//! 3. **Timeouts**: no timeout, global or per service, is zero or above
//!    `consts::MAX_TIMEOUT_MS`; the stop grace period may be zero
//!
//! # Examples
//!
//! ```rust
//! use upm_runtime::config::{validate_config, Config, SupervisorOptions};
//!
//! let config = Config {
//!     app_name: "vrkit".to_string(),
//!     supervisor: SupervisorOptions::default(),
//!     services: vec![],
//! };
//! assert!(validate_config(&config).is_ok());
//! ```

use crate::config::consts::MAX_TIMEOUT_MS;
use crate::config::Config;
use crate::errors::ValidationError;
use std::collections::HashSet;

pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_timeout(&mut errors, None, "request_timeout_ms", config.supervisor.request_timeout_ms);
    check_timeout(&mut errors, None, "startup_timeout_ms", config.supervisor.startup_timeout_ms);
    check_upper_bound(&mut errors, None, "stop_grace_ms", config.supervisor.stop_grace_ms);

    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for (index, service) in config.services.iter().enumerate() {
        if service.id.trim().is_empty() {
            errors.push(ValidationError::EmptyServiceId { index });
            continue;
        }

        if !seen.insert(service.id.as_str()) && reported.insert(service.id.as_str()) {
            errors.push(ValidationError::DuplicateServiceId {
                service_id: service.id.clone(),
            });
        }

        if !service.entry_point.is_file() {
            errors.push(ValidationError::EntryPointNotFound {
                service_id: service.id.clone(),
                path: service.entry_point.clone(),
            });
        }

        let id = Some(service.id.as_str());
        check_timeout(&mut errors, id, "request_timeout_ms", service.request_timeout_ms);
        check_timeout(&mut errors, id, "startup_timeout_ms", service.startup_timeout_ms);
        check_upper_bound(&mut errors, id, "stop_grace_ms", service.stop_grace_ms);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_timeout(
    errors: &mut Vec<ValidationError>,
    service_id: Option<&str>,
    field: &'static str,
    value: Option<u64>,
) {
    if value == Some(0) {
        errors.push(ValidationError::ZeroTimeout {
            service_id: service_id.map(str::to_string),
            field,
        });
    }
    check_upper_bound(errors, service_id, field, value);
}

fn check_upper_bound(
    errors: &mut Vec<ValidationError>,
    service_id: Option<&str>,
    field: &'static str,
    value: Option<u64>,
) {
    if matches!(value, Some(ms) if ms > MAX_TIMEOUT_MS) {
        errors.push(ValidationError::TimeoutTooLarge {
            service_id: service_id.map(str::to_string),
            field,
            max_ms: MAX_TIMEOUT_MS,
        });
    }
}
