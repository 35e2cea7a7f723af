//! Versioning configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use verso_error::{Result, VersoError};

use crate::state::ReadingMode;

fn default_reading_mode() -> String {
    "Stage.Live".to_owned()
}

fn default_true() -> bool {
    true
}

/// Knobs for reading, caching and extension handling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionedConfig {
    /// Reading mode a fresh session starts in, as a mode token.
    #[serde(default = "default_reading_mode")]
    pub default_reading_mode: String,
    /// Attach the latest-version sub-select as a correlated condition rather
    /// than an inner join, for every query instead of only single-row ones.
    #[serde(default)]
    pub use_conditions_over_inner_joins: bool,
    /// When false, bulk pre-population of the version-number cache is a no-op.
    #[serde(default = "default_true")]
    pub prepopulate_versionnumber_cache: bool,
    /// Extension name to the table suffixes it versions.
    #[serde(default)]
    pub versionable_extensions: BTreeMap<String, Vec<String>>,
}

impl Default for VersionedConfig {
    fn default() -> Self {
        Self {
            default_reading_mode: default_reading_mode(),
            use_conditions_over_inner_joins: false,
            prepopulate_versionnumber_cache: true,
            versionable_extensions: BTreeMap::new(),
        }
    }
}

impl VersionedConfig {
    /// Decode and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|error| VersoError::configuration(format!("config decode error: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, decode and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|error| {
            VersoError::configuration(format!("cannot read {}: {error}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.default_mode()?;
        for (extension, suffixes) in &self.versionable_extensions {
            if suffixes.is_empty() {
                return Err(VersoError::configuration(format!(
                    "versionable extension {extension} lists no table suffixes"
                )));
            }
            if let Some(bad) = suffixes.iter().find(|s| !is_table_suffix(s)) {
                return Err(VersoError::configuration(format!(
                    "versionable extension {extension} has invalid suffix {bad:?}"
                )));
            }
        }
        Ok(())
    }

    /// The parsed default reading mode.
    pub fn default_mode(&self) -> Result<ReadingMode> {
        ReadingMode::parse(&self.default_reading_mode)
    }
}

fn is_table_suffix(suffix: &str) -> bool {
    suffix.len() > 1
        && suffix.starts_with('_')
        && suffix.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
