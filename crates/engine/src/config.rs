//! Interceptor configuration via `stratagraph.toml`
//!
//! A default file is written on first use; edit it and restart to change
//! settings.

use serde::{Deserialize, Serialize};
use std::path::Path;
use stratagraph_core::{StrataError, StrataResult};

/// Config file name placed next to the store data.
pub const CONFIG_FILE_NAME: &str = "stratagraph.toml";

fn default_true() -> bool {
    true
}

/// Change interceptor configuration loaded from `stratagraph.toml`.
///
/// # Example
///
/// ```toml
/// strict_rehydration = true
/// trace_events = false
/// dispatch_rollback = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterceptorConfig {
    /// Veto the commit when a touched node or relationship cannot be
    /// rehydrated; when false it is logged and skipped.
    #[serde(default = "default_true")]
    pub strict_rehydration: bool,
    /// Emit a trace line for every dispatched event.
    #[serde(default)]
    pub trace_events: bool,
    /// Deliver the rollback event to listeners.
    #[serde(default = "default_true")]
    pub dispatch_rollback: bool,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            strict_rehydration: true,
            trace_events: false,
            dispatch_rollback: true,
        }
    }
}

impl InterceptorConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# stratagraph change interceptor configuration
#
# Veto the commit when a created or modified node cannot be turned into a
# typed entity (default: true). When false the node is logged and skipped.
strict_rehydration = true

# Log every dispatched domain event at trace level (default: false)
trace_events = false

# Deliver the rollback event to listeners after a rollback (default: true)
dispatch_rollback = true
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns `StrataError::Config` if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> StrataResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StrataError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            StrataError::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> StrataResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                StrataError::config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> StrataResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StrataError::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            StrataError::config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_toml_matches_default() {
        let config: InterceptorConfig = toml::from_str(InterceptorConfig::default_toml()).unwrap();
        assert_eq!(config, InterceptorConfig::default());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: InterceptorConfig = toml::from_str("").unwrap();
        assert!(config.strict_rehydration);
        assert!(!config.trace_events);
        assert!(config.dispatch_rollback);
    }

    #[test]
    fn write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        InterceptorConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());
        assert_eq!(
            InterceptorConfig::from_file(&path).unwrap(),
            InterceptorConfig::default()
        );
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "strict_rehydration = false\n").unwrap();

        InterceptorConfig::write_default_if_missing(&path).unwrap();

        let config = InterceptorConfig::from_file(&path).unwrap();
        assert!(!config.strict_rehydration);
    }

    #[test]
    fn write_to_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = InterceptorConfig {
            strict_rehydration: false,
            trace_events: true,
            dispatch_rollback: false,
        };

        config.write_to_file(&path).unwrap();
        assert_eq!(InterceptorConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "strict_rehydration = \"yes\"\n").unwrap();

        assert!(matches!(
            InterceptorConfig::from_file(&path),
            Err(StrataError::Config(_))
        ));
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert!(toml::from_str::<InterceptorConfig>("turbo = true").is_err());
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            InterceptorConfig::from_file(&dir.path().join("absent.toml")),
            Err(StrataError::Config(_))
        ));
    }
}
