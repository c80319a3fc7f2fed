//! Template configuration via `recmap.toml`
//!
//! Every key is optional. A missing file can be materialized with
//! [`TemplateConfig::write_default_if_missing`], which writes the commented
//! defaults below.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use recmap_core::PreconditionError;
use recmap_mapping::{MappingSettings, DEFAULT_NAMESPACE, DEFAULT_TYPE_KEY, DEFAULT_USER_KEY_BIN};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "recmap.toml";

/// Failure to load or store a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("config file '{path}': {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File content is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// Configuration could not be serialized
    #[error("failed to serialize config: {0}")]
    Serialize(String),

    /// Parsed values are unusable
    #[error(transparent)]
    Invalid(#[from] PreconditionError),
}

/// Template configuration loaded from `recmap.toml`
///
/// # Example
///
/// ```toml
/// namespace = "app"
/// type_key = "@_class"
/// user_key_bin = "@user_key"
/// store_user_key = true
///
/// [sets]
/// person = "people"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Namespace of every key
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Bin holding the top-level type discriminator
    #[serde(default = "default_type_key")]
    pub type_key: String,
    /// Bin holding the explicitly stored identifier
    #[serde(default = "default_user_key_bin")]
    pub user_key_bin: String,
    /// Whether the identifier is also written as a bin
    #[serde(default = "default_store_user_key")]
    pub store_user_key: bool,
    /// Set-name overrides, keyed by type alias
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sets: BTreeMap<String, String>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_type_key() -> String {
    DEFAULT_TYPE_KEY.to_string()
}

fn default_user_key_bin() -> String {
    DEFAULT_USER_KEY_BIN.to_string()
}

fn default_store_user_key() -> bool {
    true
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            type_key: default_type_key(),
            user_key_bin: default_user_key_bin(),
            store_user_key: default_store_user_key(),
            sets: BTreeMap::new(),
        }
    }
}

impl TemplateConfig {
    /// Config with a namespace and defaults for everything else
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# recmap template configuration
#
# Namespace part of every record key
namespace = "test"

# Bin holding the type discriminator of top-level records
type_key = "@_class"

# Bin holding the identifier as stored by the application.
# Reads prefer it over the identifier carried by the key.
user_key_bin = "@user_key"

# Write the identifier bin on every save (default: true)
store_user_key = true

# Per-type set names, keyed by type alias.
# [sets]
# person = "people"
"#
    }

    /// Check that names are usable as namespace and bin names
    pub fn validate(&self) -> Result<(), PreconditionError> {
        let named = [
            ("namespace", &self.namespace),
            ("type_key", &self.type_key),
            ("user_key_bin", &self.user_key_bin),
        ];
        for (what, value) in named {
            if value.trim().is_empty() {
                return Err(PreconditionError::InvalidArgument(format!("{} must not be empty", what)));
            }
        }
        if self.type_key == self.user_key_bin {
            return Err(PreconditionError::InvalidArgument(format!(
                "type_key and user_key_bin must differ, both are '{}'",
                self.type_key
            )));
        }
        if let Some((alias, _)) = self.sets.iter().find(|(_, set)| set.trim().is_empty()) {
            return Err(PreconditionError::InvalidArgument(format!(
                "set name for '{}' must not be empty",
                alias
            )));
        }
        Ok(())
    }

    /// Converter settings described by this config
    pub fn to_settings(&self) -> MappingSettings {
        MappingSettings {
            namespace: self.namespace.clone(),
            type_key: self.type_key.clone(),
            user_key_bin: self.user_key_bin.clone(),
            store_user_key: self.store_user_key,
            set_names: self.sets.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    /// Read, parse and validate config from a file path.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl FromStr for TemplateConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: TemplateConfig = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_toml_parses_to_default() {
        let config: TemplateConfig = TemplateConfig::default_toml().parse().unwrap();
        assert_eq!(config, TemplateConfig::default());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: TemplateConfig = "".parse().unwrap();
        assert_eq!(config.namespace, "test");
        assert_eq!(config.type_key, "@_class");
        assert!(config.store_user_key);
    }

    #[test]
    fn sets_table_becomes_set_names() {
        let config: TemplateConfig = r#"
namespace = "app"
store_user_key = false

[sets]
person = "people"
"#
        .parse()
        .unwrap();
        let settings = config.to_settings();
        assert_eq!(settings.namespace, "app");
        assert!(!settings.store_user_key);
        assert_eq!(settings.set_names.get("person").map(String::as_str), Some("people"));
    }

    #[test]
    fn empty_names_rejected() {
        for content in ["namespace = \"\"", "type_key = \" \"", "user_key_bin = \"\""] {
            let err = content.parse::<TemplateConfig>().unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(PreconditionError::InvalidArgument(_))), "{}", content);
        }
    }

    #[test]
    fn clashing_bins_rejected() {
        let err = "type_key = \"meta\"\nuser_key_bin = \"meta\"".parse::<TemplateConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = "namespace = ".parse::<TemplateConfig>().unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        TemplateConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());
        assert_eq!(TemplateConfig::from_file(&path).unwrap(), TemplateConfig::default());
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "namespace = \"custom\"\n").unwrap();

        TemplateConfig::write_default_if_missing(&path).unwrap();
        assert_eq!(TemplateConfig::from_file(&path).unwrap().namespace, "custom");
    }

    #[test]
    fn write_to_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = TemplateConfig::with_namespace("prod");
        config.sets.insert("order".to_string(), "orders".to_string());

        config.write_to_file(&path).unwrap();
        assert_eq!(TemplateConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = TemplateConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
