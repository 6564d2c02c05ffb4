// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading and processing for uabridge.
//!
//! # Loading Pipeline
//!
//! 1. Read the file; the format follows the extension
//! 2. Resolve `${VAR}` / `${VAR:default}` placeholders
//! 3. Parse YAML, TOML or JSON into [`BridgeConfig`]
//! 4. Apply environment variable overrides
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! UABRIDGE_ENDPOINT_URL=opc.tcp://plc-7:4840
//! UABRIDGE_LOG_LEVEL=debug
//! ```

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{BridgeConfig, LogLevel};
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Default prefix of override variables.
pub const DEFAULT_ENV_PREFIX: &str = "UABRIDGE";

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader for uabridge.
///
/// # Examples
///
/// ```no_run
/// use uabridge_config::loader::ConfigLoader;
///
/// let loader = ConfigLoader::new();
/// let config = loader.load("bridge.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve placeholders and apply overrides.
    resolve_env_vars: bool,
}

impl ConfigLoader {
    /// Creates a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
        }
    }

    /// Creates a builder for configuring the loader.
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder::new()
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Loads configuration from a file.
    ///
    /// The file format is determined by the file extension:
    /// - `.yaml` or `.yml` - YAML format
    /// - `.toml` - TOML format
    /// - `.json` - JSON format
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<BridgeConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = self.read_file(path)?;
        let format = ConfigFormat::from_path(path)?;
        let mut config = self.parse_content(&content, format, path)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }

        config.validate()?;

        info!("Configuration loaded successfully");
        debug!(
            data_sources = config.connector.data_sources.len(),
            calls = config.call_count(),
            sources = config.sources.len(),
            actors = config.actors.len(),
            "Configuration summary"
        );

        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<BridgeConfig> {
        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(content)
        } else {
            content.to_string()
        };
        let mut config = parse_str(&content, format)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }

        config.validate()?;

        Ok(config)
    }

    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
    }

    fn parse_content(
        &self,
        content: &str,
        format: ConfigFormat,
        path: &Path,
    ) -> ConfigResult<BridgeConfig> {
        // Placeholders are resolved in the raw text before parsing
        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(content)
        } else {
            content.to_string()
        };

        parse_str(&content, format).map_err(|e| e.at_path(path))
    }

    /// Resolves environment variable placeholders in content.
    ///
    /// Supports `${VAR_NAME}` and `${VAR_NAME:default}`. Unset variables
    /// without a default are kept verbatim.
    pub fn resolve_env_placeholders(&self, content: &str) -> String {
        let mut result = String::with_capacity(content.len());
        let mut chars = content.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_content = String::new();
                let mut found_close = false;

                for c in chars.by_ref() {
                    if c == '}' {
                        found_close = true;
                        break;
                    }
                    var_content.push(c);
                }

                if !found_close {
                    result.push_str("${");
                    result.push_str(&var_content);
                    continue;
                }

                let (var_name, default_value) = match var_content.split_once(':') {
                    Some((name, default)) => (name, Some(default)),
                    None => (var_content.as_str(), None),
                };

                match env::var(var_name) {
                    Ok(value) => result.push_str(&value),
                    Err(_) => match default_value {
                        Some(default) => result.push_str(default),
                        None => {
                            warn!("Environment variable '{}' not found", var_name);
                            result.push_str(&format!("${{{}}}", var_name));
                        }
                    },
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    fn apply_env_overrides(&self, config: &mut BridgeConfig) -> ConfigResult<()> {
        let endpoint_var = format!("{}_ENDPOINT_URL", self.env_prefix);
        if let Ok(value) = env::var(&endpoint_var) {
            debug!(variable = %endpoint_var, "Endpoint URL overridden");
            config.connector.endpoint_url = value;
        }

        let level_var = format!("{}_LOG_LEVEL", self.env_prefix);
        if let Ok(value) = env::var(&level_var) {
            config.logging.level = value.parse::<LogLevel>().map_err(|_| {
                ConfigError::invalid_env_var(
                    &level_var,
                    "expected one of trace, debug, info, warn, error",
                )
            })?;
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigLoaderBuilder
// =============================================================================

/// Builder for ConfigLoader.
#[derive(Debug, Default)]
pub struct ConfigLoaderBuilder {
    env_prefix: Option<String>,
    resolve_env_vars: Option<bool>,
}

impl ConfigLoaderBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the environment prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn resolve_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = Some(enabled);
        self
    }

    /// Builds the ConfigLoader.
    pub fn build(self) -> ConfigLoader {
        let mut loader = ConfigLoader::new();

        if let Some(prefix) = self.env_prefix {
            loader.env_prefix = prefix;
        }
        if let Some(resolve_env_vars) = self.resolve_env_vars {
            loader.resolve_env_vars = resolve_env_vars;
        }

        loader
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_str<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> ConfigResult<T> {
    match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(ConfigError::syntax),
        ConfigFormat::Toml => toml::from_str(content).map_err(ConfigError::syntax),
        ConfigFormat::Json => serde_json::from_str(content).map_err(ConfigError::syntax),
    }
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
///
/// ```no_run
/// use uabridge_config::loader::load_config;
///
/// let config = load_config("bridge.yaml").unwrap();
/// ```
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<BridgeConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<BridgeConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CoerceSpec, LogFormat, OutputSpec};
    use uabridge_core::Value;
    use uabridge_opcua::SourcePayload;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
connector:
  endpoint_url: opc.tcp://localhost:4840
  connection:
    session_timeout: 30s
  data_sources:
    PLC2:
      node_id:
        namespace_uri: urn:plant
        identifier: s=PLC2
    Alert:
      browse_path:
        root_node: ObjectsFolder
        relative_path: /[urn:plant]:PLC2/[urn:plant]:Alert
    Memory:
      node_id:
        namespace_uri: urn:plant
        identifier: s=Memory
      monitor: true
      data_type: UInt64
      coerce:
        linear:
          factor: 1048576

calls:
  PLC2:
    Alert:
      operation: plant.alert
      input_arguments:
        - parameter: 0
          data_type: Int32
          validate:
            min: 0
            max: 3
      output: array

sources:
  Memory: plant/memory

logging:
  level: debug
  format: json
"#;

    const TOML: &str = r#"
[connector]
endpoint_url = "opc.tcp://localhost:4840"

[connector.identity]
type = "username"
user = "operator"
password = "secret"

[connector.data_sources.Temp]
monitor = true
sampling_interval = 500.0

[connector.data_sources.Temp.node_id]
namespace_uri = "urn:plant"
identifier = "s=Temp"
"#;

    fn write_temp(content: &str, suffix: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(suffix).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn isolated_loader() -> ConfigLoader {
        ConfigLoader::new().with_env_prefix("UABRIDGE_LOADER_TEST_UNSET")
    }

    #[test]
    fn test_load_yaml() {
        let file = write_temp(YAML, ".yaml");
        let config = isolated_loader().load(file.path()).unwrap();

        assert_eq!(config.connector.endpoint_url, "opc.tcp://localhost:4840");
        assert_eq!(config.connector.data_sources.len(), 3);
        assert_eq!(config.calls["PLC2"]["Alert"].output, OutputSpec::Array);
        assert_eq!(config.sources["Memory"], "plant/memory");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.connector.connection.session_timeout,
            std::time::Duration::from_secs(30)
        );
    }

    #[test]
    fn test_yaml_linear_coercion_map_form() {
        let yaml = YAML.replace(
            "            max: 3\n",
            "            max: 3\n          coerce:\n            linear:\n              factor: 10\n              offset: 1\n",
        );
        let config = isolated_loader()
            .load_from_str(&yaml, ConfigFormat::Yaml)
            .unwrap();

        let memory = &config.connector.data_sources["Memory"];
        assert_eq!(memory.coerce, Some(CoerceSpec::linear(1_048_576.0, 0.0)));
        let input = &config.calls["PLC2"]["Alert"].input_arguments[0];
        assert_eq!(input.coerce, Some(CoerceSpec::linear(10.0, 1.0)));

        let sources = config.data_sources().unwrap();
        let (_, memory) = sources.iter().find(|(id, _)| id == "Memory").unwrap();
        let read = memory
            .coercion
            .as_ref()
            .unwrap()
            .apply(Value::UInt64(10_485_760), None, true)
            .unwrap();
        assert_eq!(read, Value::Double(10.0));

        let mappings = config.call_mappings().unwrap();
        let written = mappings[0].input_arguments[0]
            .coerce
            .as_ref()
            .unwrap()
            .apply(Value::Int64(2), None, false)
            .unwrap();
        assert_eq!(written, Value::Double(21.0));
    }

    #[test]
    fn test_json_source_payload() {
        let yaml = YAML.replace("\nsources:\n", "\nsource_payload: json\nsources:\n");
        let config = isolated_loader()
            .load_from_str(&yaml, ConfigFormat::Yaml)
            .unwrap();
        assert_eq!(config.source_payload, SourcePayload::Json);

        let yaml = YAML.replace("\nsources:\n", "\nsource_payload: text\nsources:\n");
        assert!(isolated_loader().load_from_str(&yaml, ConfigFormat::Yaml).is_err());
    }

    #[test]
    fn test_load_toml() {
        let file = write_temp(TOML, ".toml");
        let config = isolated_loader().load(file.path()).unwrap();

        let sources = config.data_sources().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].0, "Temp");
        assert_eq!(sources[0].1.sampling_interval, Some(500.0));
        assert_eq!(
            config.connector.identity,
            uabridge_opcua::UserIdentity::user_name("operator", "secret")
        );
    }

    #[test]
    fn test_load_json() {
        let json = r#"{"connector": {"endpoint_url": "opc.tcp://localhost:4840"}}"#;
        let file = write_temp(json, ".json");
        let config = isolated_loader().load(file.path()).unwrap();
        assert!(config.connector.data_sources.is_empty());
        assert!(config.calls.is_empty());
    }

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("bridge.yaml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("bridge.YML")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("bridge.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("bridge.json")).unwrap(),
            ConfigFormat::Json
        );
        assert!(ConfigFormat::from_path(Path::new("bridge.ini")).is_err());
        assert!(ConfigFormat::from_path(Path::new("bridge")).is_err());
    }

    #[test]
    fn test_env_placeholder_with_default() {
        let loader = ConfigLoader::new();
        let result =
            loader.resolve_env_placeholders("url: ${UABRIDGE_LOADER_TEST_NONEXISTENT:opc.tcp://x:4840}");
        assert_eq!(result, "url: opc.tcp://x:4840");
    }

    #[test]
    fn test_env_placeholder_set() {
        env::set_var("UABRIDGE_LOADER_TEST_HOST", "plc-7");
        let loader = ConfigLoader::new();
        let result = loader.resolve_env_placeholders("opc.tcp://${UABRIDGE_LOADER_TEST_HOST:localhost}:4840");
        assert_eq!(result, "opc.tcp://plc-7:4840");
    }

    #[test]
    fn test_env_placeholder_missing_is_kept() {
        let loader = ConfigLoader::new();
        assert_eq!(
            loader.resolve_env_placeholders("a ${UABRIDGE_LOADER_TEST_MISSING} b"),
            "a ${UABRIDGE_LOADER_TEST_MISSING} b"
        );
        assert_eq!(loader.resolve_env_placeholders("tail ${open"), "tail ${open");
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("UABRIDGE_LOADER_TEST_OVR_ENDPOINT_URL", "opc.tcp://override:4840");
        env::set_var("UABRIDGE_LOADER_TEST_OVR_LOG_LEVEL", "warn");

        let loader = ConfigLoader::new().with_env_prefix("UABRIDGE_LOADER_TEST_OVR");
        let config = loader.load_from_str(YAML, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.connector.endpoint_url, "opc.tcp://override:4840");
        assert_eq!(config.logging.level, LogLevel::Warn);
    }

    #[test]
    fn test_invalid_log_level_override() {
        env::set_var("UABRIDGE_LOADER_TEST_BAD_LOG_LEVEL", "loud");
        let loader = ConfigLoader::new().with_env_prefix("UABRIDGE_LOADER_TEST_BAD");
        let result = loader.load_from_str(YAML, ConfigFormat::Yaml);
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar { .. })));
    }

    #[test]
    fn test_loader_builder() {
        let loader = ConfigLoader::builder()
            .env_prefix("MYAPP")
            .resolve_env_vars(false)
            .build();

        assert_eq!(loader.env_prefix, "MYAPP");
        assert!(!loader.resolve_env_vars);
    }

    #[test]
    fn test_load_from_str_validates() {
        let yaml = YAML.replace("opc.tcp://localhost:4840", "tcp://localhost:4840");
        let result = isolated_loader().load_from_str(&yaml, ConfigFormat::Yaml);
        assert!(matches!(result, Err(ConfigError::Connector(_))));
    }

    #[test]
    fn test_parse_error_names_file() {
        let file = write_temp("connector: [unclosed", ".yaml");
        let error = isolated_loader().load(file.path()).unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }));
        assert!(error.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = format!("{}\nbuffer:\n  path: ./data\n", YAML);
        assert!(isolated_loader().load_from_str(&yaml, ConfigFormat::Yaml).is_err());
    }

    #[test]
    fn test_file_not_found() {
        let result = ConfigLoader::new().load("/nonexistent/path/bridge.yaml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }
}
