// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors found while validating a supervisor configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A service entry has an empty id
    EmptyServiceId {
        /// Position of the offending entry in `services`
        index: usize,
    },
    /// Two service entries share the same id
    DuplicateServiceId {
        /// The duplicated service id
        service_id: String,
    },
    /// The configured entry point does not exist on disk
    EntryPointNotFound {
        /// The service that references the entry point
        service_id: String,
        /// The path that could not be found
        path: PathBuf,
    },
    /// A timeout was configured as zero
    ZeroTimeout {
        /// The service id, or `None` for supervisor-wide settings
        service_id: Option<String>,
        /// The name of the offending field
        field: &'static str,
    },
    /// A timeout exceeds the largest supported budget
    TimeoutTooLarge {
        /// The service id, or `None` for supervisor-wide settings
        service_id: Option<String>,
        /// The name of the offending field
        field: &'static str,
        /// The largest accepted value in milliseconds
        max_ms: u64,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyServiceId { index } => {
                write!(f, "Service at index {} has an empty id", index)
            }
            ValidationError::DuplicateServiceId { service_id } => {
                write!(f, "Duplicate service ID: '{}'", service_id)
            }
            ValidationError::EntryPointNotFound { service_id, path } => {
                write!(
                    f,
                    "Service '{}' entry point '{}' does not exist",
                    service_id,
                    path.display()
                )
            }
            ValidationError::ZeroTimeout { service_id, field } => match service_id {
                Some(id) => write!(f, "Service '{}' sets '{}' to zero", id, field),
                None => write!(f, "Supervisor setting '{}' must be greater than zero", field),
            },
            ValidationError::TimeoutTooLarge {
                service_id,
                field,
                max_ms,
            } => match service_id {
                Some(id) => write!(f, "Service '{}' sets '{}' above {} ms", id, field, max_ms),
                None => write!(f, "Supervisor setting '{}' must not exceed {} ms", field, max_ms),
            },
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors raised while loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("configuration validation failed:\n{}", format_validation_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
