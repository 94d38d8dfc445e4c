//! TOML configuration for the translator and the CLI.
//!
//! ```toml
//! [translator]
//! flavor = "cosmosdb"
//!
//! [output]
//! format = "bytecode"
//! ```

#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::codegen::TargetFormat;
use crate::flavor::FlavorName;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "CYPHER_TRAVERSE_CONFIG";

/// Resolved translator settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TranslatorConfig {
    /// Target flavor.
    pub flavor: FlavorName,
    /// Output format.
    pub format: TargetFormat,
}

impl TranslatorConfig {
    /// Loads `explicit`, else `$CYPHER_TRAVERSE_CONFIG`, else the default path.
    ///
    /// A missing file at the default path yields defaults; a missing explicit
    /// file is an error.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let explicit = explicit.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        match explicit {
            Some(path) => TranslatorConfig::from_file(&path),
            None => match default_config_path() {
                Some(path) if path.exists() => TranslatorConfig::from_file(&path),
                _ => Ok(TranslatorConfig::default()),
            },
        }
    }

    /// Reads and parses one file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let config = raw.resolve()?;
        debug!(path = %path.display(), flavor = %config.flavor, format = %config.format, "loaded config");
        Ok(config)
    }

    /// Parses TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        raw.resolve()
    }

    /// TOML text that [`TranslatorConfig::from_toml`] reads back unchanged.
    pub fn to_toml(&self) -> String {
        format!(
            "[translator]\nflavor = \"{}\"\n\n[output]\nformat = \"{}\"\n",
            self.flavor, self.format
        )
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawConfig {
    #[serde(default)]
    translator: TranslatorSection,
    #[serde(default)]
    output: OutputSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct TranslatorSection {
    flavor: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct OutputSection {
    format: Option<String>,
}

impl RawConfig {
    fn resolve(self) -> Result<TranslatorConfig, ConfigError> {
        let flavor = match self.translator.flavor.as_deref() {
            Some(name) => name.parse()?,
            None => FlavorName::default(),
        };
        let format = match self.output.format.as_deref() {
            Some(name) => name.parse()?,
            None => TargetFormat::default(),
        };
        Ok(TranslatorConfig { flavor, format })
    }
}

/// Configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// Flavor name is not one of the built-in flavors.
    #[error("unknown flavor '{name}' (expected one of: gremlin, cosmosdb, neptune, empty)")]
    UnknownFlavor {
        /// Name as given.
        name: String,
    },
    /// Output format is not `groovy` or `bytecode`.
    #[error("unknown output format '{name}' (expected groovy or bytecode)")]
    UnknownFormat {
        /// Name as given.
        name: String,
    },
}

impl ConfigError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "ConfigRead",
            ConfigError::Parse { .. } => "ConfigParse",
            ConfigError::UnknownFlavor { .. } => "UnknownFlavor",
            ConfigError::UnknownFormat { .. } => "UnknownFormat",
        }
    }
}

/// `<config dir>/cypher-traverse/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("cypher-traverse").join("config.toml"))
}
