//! ---
//! mbus_section: "01-core-functionality"
//! mbus_subsection: "module"
//! mbus_type: "source"
//! mbus_scope: "code"
//! mbus_description: "Shared primitives and utilities for the bus runtime."
//! mbus_version: "v0.0.0-prealpha"
//! mbus_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::logging::LogFormat;

fn default_module_enabled() -> bool {
    true
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for a module host process.
///
/// Module entries keep their file order; the host registers them with the
/// bus in exactly that order, which in turn fixes publish fan-out order.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HostConfig {
    #[serde(default)]
    pub modules: IndexMap<String, ModuleConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where a [`HostConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedHostConfig {
    pub config: HostConfig,
    pub source: PathBuf,
}

impl HostConfig {
    pub const ENV_CONFIG_PATH: &str = "R_MBUS_CONFIG";

    /// Load configuration from disk, respecting the `R_MBUS_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedHostConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedHostConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedHostConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<HostConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Retrieve a module configuration by name.
    pub fn module(&self, name: &str) -> Option<&ModuleConfig> {
        self.modules.get(name)
    }

    /// Names of the modules the host should actually start, in file order.
    pub fn enabled_modules(&self) -> impl Iterator<Item = (&String, &ModuleConfig)> {
        self.modules.iter().filter(|(_, module)| module.enabled)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.modules.is_empty() {
            return Err(anyhow!("configuration must declare at least one module"));
        }
        for (name, module) in &self.modules {
            module.validate(name)?;
        }
        if !self.modules.values().any(|module| module.enabled) {
            return Err(anyhow!("configuration must enable at least one module"));
        }
        Ok(())
    }
}

impl std::str::FromStr for HostConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: HostConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// One hosted module: which factory builds it and what it receives at
/// creation time. `params` is handed to the module opaquely; the host never
/// interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub kind: String,
    #[serde(default = "default_module_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub params: JsonValue,
}

impl ModuleConfig {
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.kind.trim().is_empty() {
            return Err(anyhow!("module '{}' must declare a non-empty kind", name));
        }
        Ok(())
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            kind: String::new(),
            enabled: default_module_enabled(),
            params: JsonValue::Null,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [modules.printer]
        kind = "stdout-printer"

        [modules.filter]
        kind = "keyword-filter"
        enabled = false
        params = { keyword = "alert" }
    "#;

    #[test]
    fn parses_modules_in_file_order() {
        let config: HostConfig = SAMPLE.parse().expect("parse sample config");
        let names: Vec<&String> = config.modules.keys().collect();
        assert_eq!(names, ["printer", "filter"]);
        assert!(config.module("printer").expect("printer entry").enabled);
        assert!(!config.module("filter").expect("filter entry").enabled);
    }

    #[test]
    fn enabled_modules_skips_disabled_entries() {
        let config: HostConfig = SAMPLE.parse().expect("parse sample config");
        let enabled: Vec<&String> = config.enabled_modules().map(|(name, _)| name).collect();
        assert_eq!(enabled, ["printer"]);
    }

    #[test]
    fn params_survive_as_opaque_json() {
        let config: HostConfig = SAMPLE.parse().expect("parse sample config");
        let filter = config.module("filter").expect("filter entry");
        assert_eq!(filter.params["keyword"], "alert");
    }

    #[test]
    fn empty_module_table_is_rejected() {
        let err = "".parse::<HostConfig>().expect_err("empty config");
        assert!(err.to_string().contains("at least one module"));
    }

    #[test]
    fn blank_kind_is_rejected() {
        let err = r#"
            [modules.broken]
            kind = ""
        "#
        .parse::<HostConfig>()
        .expect_err("blank kind");
        assert!(err.to_string().contains("non-empty kind"));
    }

    #[test]
    fn all_disabled_is_rejected() {
        let err = r#"
            [modules.idle]
            kind = "stdout-printer"
            enabled = false
        "#
        .parse::<HostConfig>()
        .expect_err("all disabled");
        assert!(err.to_string().contains("enable at least one module"));
    }
}
