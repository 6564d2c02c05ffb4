// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors raised while loading a bridge configuration.
//!
//! Loading runs read, placeholder substitution, parse, environment overrides
//! and validation in that order; each stage has its own variant.

use std::path::PathBuf;
use thiserror::Error;
use uabridge_opcua::ConfigurationError;

/// Errors raised while loading a bridge configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file does not exist.
    #[error("Bridge configuration not found: {path}")]
    FileNotFound {
        /// Requested path.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("Cannot read bridge configuration '{path}': {source}")]
    Io {
        /// Requested path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file extension names no known format.
    #[error("Unsupported configuration format '{format}' (expected yaml, yml, toml or json)")]
    UnsupportedFormat {
        /// The extension found.
        format: String,
    },

    /// Content without a path failed to deserialize.
    #[error("Configuration syntax error: {message}")]
    Syntax {
        /// Deserializer message.
        message: String,
    },

    /// A file failed to deserialize.
    #[error("Cannot parse bridge configuration '{path}': {message}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Deserializer message.
        message: String,
    },

    /// A `UABRIDGE_*` override holds an unusable value.
    #[error("Environment override {name} is invalid: {message}")]
    InvalidEnvVar {
        /// Variable name.
        name: String,
        /// What is wrong with it.
        message: String,
    },

    /// A field holds a value the bridge cannot use.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// Dotted path of the field, e.g. `calls.PLC2.Reset`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The connector rejected an option or a data source.
    #[error("Invalid connector configuration: {0}")]
    Connector(#[from] ConfigurationError),
}

impl ConfigError {
    /// Creates a file-not-found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates a read error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an unsupported-format error from a file extension.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Creates a syntax error for content without a path.
    pub fn syntax(message: impl ToString) -> Self {
        Self::Syntax {
            message: message.to_string(),
        }
    }

    /// Creates a parse error for `path`.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid-override error.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error for the field at `field`.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Attaches `path` to a syntax error; other errors pass through.
    pub fn at_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Self::Syntax { message } => Self::parse(path, message),
            other => other,
        }
    }

    /// Returns `true` if the file could not be found or read.
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::FileNotFound { .. })
    }

    /// Returns the loading stage that failed, for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::FileNotFound { .. } | Self::Io { .. } => "read",
            Self::UnsupportedFormat { .. } | Self::Syntax { .. } | Self::Parse { .. } => "parse",
            Self::InvalidEnvVar { .. } => "environment",
            Self::Validation { .. } | Self::Connector(_) => "validation",
        }
    }
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_field() {
        let error = ConfigError::validation("connector.endpoint_url", "cannot be empty");
        assert_eq!(error.category(), "validation");
        assert_eq!(
            error.to_string(),
            "Validation failed for 'connector.endpoint_url': cannot be empty"
        );
    }

    #[test]
    fn test_connector_error_conversion() {
        let error: ConfigError = ConfigurationError::UnknownDataType {
            name: "Decimal".into(),
        }
        .into();
        assert_eq!(error.category(), "validation");
        assert!(error.to_string().contains("Unknown OPC UA data type 'Decimal'"));
    }

    #[test]
    fn test_syntax_error_gains_path() {
        let error = ConfigError::syntax("expected a mapping").at_path("plant.yaml");
        assert!(matches!(error, ConfigError::Parse { .. }));
        assert_eq!(
            error.to_string(),
            "Cannot parse bridge configuration 'plant.yaml': expected a mapping"
        );

        let untouched = ConfigError::file_not_found("plant.yaml").at_path("other.yaml");
        assert_eq!(untouched.to_string(), "Bridge configuration not found: plant.yaml");
    }

    #[test]
    fn test_is_io_error() {
        let error = ConfigError::io(
            "bridge.yaml",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(error.is_io_error());
        assert_eq!(error.category(), "read");
        assert!(ConfigError::file_not_found("bridge.yaml").is_io_error());
        assert!(!ConfigError::validation("calls", "empty").is_io_error());
    }
}
