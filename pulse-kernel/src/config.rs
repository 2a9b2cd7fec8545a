//! Host configuration for a kernel
//!
//! Loaded from TOML; the property-policy option names are the ones
//! accepted in property-file driven deployments.

use std::path::{Path, PathBuf};

use pulse_core::PriorityClass;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};

/// Serializable priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    Hard,
    Soft,
    #[default]
    NonRealTime,
}

impl From<Priority> for PriorityClass {
    fn from(p: Priority) -> Self {
        match p {
            Priority::Hard => PriorityClass::Hard,
            Priority::Soft => PriorityClass::Soft,
            Priority::NonRealTime => PriorityClass::NonRealTime,
        }
    }
}

/// Property-file handling options of the property extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyPolicy {
    /// Configure a component when it is loaded; otherwise at kernel start.
    #[serde(rename = "configureOnLoad", default = "default_true")]
    pub configure_on_load: bool,

    /// Treat an absent property file as an empty bag instead of failing
    /// the load.
    #[serde(rename = "ignoreMissingFiles", default)]
    pub ignore_missing_files: bool,

    /// Write final property values back at kernel stop.
    #[serde(rename = "save_props", default)]
    pub save_props: bool,

    /// Prefix for snapshot file names.
    #[serde(rename = "saveFilePrefix", default)]
    pub save_file_prefix: String,

    /// Extension (including the dot) for property files.
    #[serde(rename = "saveFileExtension", default = "default_extension")]
    pub save_file_extension: String,

    /// Directory holding the per-component property files.
    #[serde(default)]
    pub directory: PathBuf,
}

impl Default for PropertyPolicy {
    fn default() -> Self {
        Self {
            configure_on_load: true,
            ignore_missing_files: false,
            save_props: false,
            save_file_prefix: String::new(),
            save_file_extension: default_extension(),
            directory: PathBuf::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_extension() -> String {
    ".xml".to_string()
}

fn default_period() -> f64 {
    0.001
}

/// Top-level kernel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    pub name: String,

    /// Pipeline period in seconds.
    #[serde(default = "default_period")]
    pub period_secs: f64,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub properties: PropertyPolicy,
}

impl KernelConfig {
    pub fn from_toml_str(text: &str) -> KernelResult<Self> {
        toml::from_str(text).map_err(|e| KernelError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> KernelResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| KernelError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config = KernelConfig::from_toml_str("name = \"cell\"").unwrap();
        assert_eq!(config.name, "cell");
        assert_eq!(config.period_secs, 0.001);
        assert_eq!(config.priority, Priority::NonRealTime);
        assert!(config.properties.configure_on_load);
        assert!(!config.properties.save_props);
        assert_eq!(config.properties.save_file_extension, ".xml");
    }

    #[test]
    fn test_full_config() {
        let text = r#"
            name = "arm"
            period_secs = 0.005
            priority = "hard"

            [properties]
            configureOnLoad = false
            ignoreMissingFiles = true
            save_props = true
            saveFilePrefix = "saved_"
            saveFileExtension = ".cpf"
            directory = "/etc/arm"
        "#;
        let config = KernelConfig::from_toml_str(text).unwrap();
        assert_eq!(config.period_secs, 0.005);
        assert_eq!(config.priority, Priority::Hard);
        assert!(!config.properties.configure_on_load);
        assert!(config.properties.ignore_missing_files);
        assert!(config.properties.save_props);
        assert_eq!(config.properties.save_file_prefix, "saved_");
        assert_eq!(config.properties.save_file_extension, ".cpf");
        assert_eq!(config.properties.directory, PathBuf::from("/etc/arm"));
    }

    #[test]
    fn test_bad_config_is_reported() {
        assert!(matches!(
            KernelConfig::from_toml_str("period_secs = \"fast\""),
            Err(KernelError::Config(_))
        ));
    }
}
