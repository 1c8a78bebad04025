use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::OutputFormat;

/// Settings read from `config.toml`; every key is optional.
#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    loaded: bool,
    data: RawConfig,
}

impl CliConfig {
    /// Loads `explicit`, or the platform default path. A missing file yields
    /// the defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit.or_else(default_config_path);
        let (data, loaded) = match path.as_ref() {
            Some(config_path) if config_path.exists() => (read_file(config_path)?, true),
            _ => (RawConfig::default(), false),
        };
        if let Some(format) = data.output.format.as_deref() {
            parse_format(format)?;
        }
        Ok(Self { path, loaded, data })
    }

    /// Path that was consulted, whether or not it existed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// True when the file at [`CliConfig::path`] was read.
    pub fn loaded(&self) -> bool {
        self.loaded
    }

    pub fn log_filter(&self) -> Option<&str> {
        self.data.logging.filter.as_deref()
    }

    pub fn format(&self) -> Option<OutputFormat> {
        self.data
            .output
            .format
            .as_deref()
            .and_then(|value| parse_format(value).ok())
    }

    pub fn incremental_delivery(&self) -> bool {
        self.data.environment.incremental_delivery.unwrap_or(true)
    }

    pub fn id_field(&self) -> &str {
        self.data.environment.id_field.as_deref().unwrap_or("id")
    }
}

fn parse_format(value: &str) -> Result<OutputFormat, ConfigError> {
    match value {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        other => Err(ConfigError::InvalidFormat {
            value: other.to_string(),
        }),
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default)]
    logging: LoggingSection,
    #[serde(default)]
    output: OutputSection,
    #[serde(default)]
    environment: EnvironmentSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct LoggingSection {
    filter: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct OutputSection {
    format: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct EnvironmentSection {
    incremental_delivery: Option<bool>,
    id_field: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read CLI config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse CLI config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("output format '{value}' is invalid; expected 'text' or 'json'")]
    InvalidFormat { value: String },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("graphcache").join("config.toml"))
}
