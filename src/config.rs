//! Configuration for the kson command-line tool
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (kson.toml)
//! - Environment variables (KSON_*)
//!
//! ## Example config file (kson.toml):
//! ```toml
//! [output]
//! format = "pretty"
//!
//! [schemas]
//! preload = ["schemas/movies.kson"]
//!
//! [inference]
//! id_prefix = "movies"
//! ```
//!
//! The core engine takes no ambient configuration; these settings only
//! supply defaults for the CLI.

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the kson tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KsonConfig {
    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Schema file settings
    #[serde(default)]
    pub schemas: SchemaFilesConfig,

    /// Inference settings
    #[serde(default)]
    pub inference: InferenceConfig,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    /// Output format (compact or pretty)
    #[serde(default)]
    pub format: OutputFormat,
}

/// Output format for encoded text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Compact,
    Pretty,
}

/// Schema files to register before any conversion
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaFilesConfig {
    /// Schema batch files (KSON or JSON) loaded at startup
    #[serde(default)]
    pub preload: Vec<PathBuf>,
}

/// Inference configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InferenceConfig {
    /// Id prefix for inferred schemas (random when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_prefix: Option<String>,
}

impl KsonConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for location in ["kson.toml", ".kson.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("KSON")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KsonConfig::default();
        assert_eq!(config.output.format, OutputFormat::Compact);
        assert!(config.schemas.preload.is_empty());
        assert!(config.inference.id_prefix.is_none());
    }

    #[test]
    fn test_serialize_config() {
        let config = KsonConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[output]"));
        assert!(toml_str.contains("[schemas]"));
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kson.toml");
        std::fs::write(
            &path,
            "[output]\nformat = \"pretty\"\n\n[inference]\nid_prefix = \"movies\"\n",
        )
        .unwrap();

        let config = KsonConfig::load_from(path.to_str()).unwrap();
        assert_eq!(config.output.format, OutputFormat::Pretty);
        assert_eq!(config.inference.id_prefix.as_deref(), Some("movies"));
    }
}
