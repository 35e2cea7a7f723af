//! Augmentation modes a read query can be rewritten for.

use std::collections::BTreeMap;

use verso_error::{Result, VersoError};
use verso_types::{validate_stage, RecordId, Stage, Timestamp, Version};

pub const MODE_KEY: &str = "Versioned.mode";
pub const STAGE_KEY: &str = "Versioned.stage";
pub const DATE_KEY: &str = "Versioned.date";
pub const ID_KEY: &str = "Versioned.id";
pub const VERSION_KEY: &str = "Versioned.version";

/// What a read sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionedMode {
    /// Rows of one stage table.
    Stage(Stage),
    /// Rows of one stage that have no counterpart on the other stage.
    StageUnique(Stage),
    /// Latest history rows as of `date`, restricted to versions that were
    /// on `stage`.
    Archive { date: Timestamp, stage: Stage },
    /// The newest history row of one record, tombstones excluded.
    LatestSingle(RecordId),
    /// The newest non-deleted history row of every record.
    LatestVersions,
    /// One specific history version.
    SpecificVersion(Version),
    /// Every non-deleted history row, oldest first.
    AllVersions,
}

impl VersionedMode {
    /// Mode name as carried in data-query parameters.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Stage(_) => "stage",
            Self::StageUnique(_) => "stage_unique",
            Self::Archive { .. } => "archive",
            Self::LatestSingle(_) => "latest_version_single",
            Self::LatestVersions => "latest_versions",
            Self::SpecificVersion(_) => "version",
            Self::AllVersions => "all_versions",
        }
    }

    /// Whether the mode reads history tables rather than stage tables.
    pub const fn reads_history(&self) -> bool {
        !matches!(self, Self::Stage(_) | Self::StageUnique(_))
    }

    pub fn to_query_params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert(MODE_KEY.to_owned(), self.name().to_owned());
        match self {
            Self::Stage(stage) | Self::StageUnique(stage) => {
                params.insert(STAGE_KEY.to_owned(), stage.to_string());
            }
            Self::Archive { date, stage } => {
                params.insert(DATE_KEY.to_owned(), date.to_string());
                params.insert(STAGE_KEY.to_owned(), stage.to_string());
            }
            Self::LatestSingle(id) => {
                params.insert(ID_KEY.to_owned(), id.to_string());
            }
            Self::SpecificVersion(version) => {
                params.insert(VERSION_KEY.to_owned(), version.to_string());
            }
            Self::LatestVersions | Self::AllVersions => {}
        }
        params
    }

    /// Decode a mode from data-query parameters. `None` when no mode key is
    /// present. Archive modes without a stage read Draft.
    pub fn from_query_params(params: &BTreeMap<String, String>) -> Result<Option<Self>> {
        let Some(name) = params.get(MODE_KEY) else {
            return Ok(None);
        };
        let get = |key: &str| params.get(key).map(String::as_str);
        let stage = || -> Result<Stage> {
            get(STAGE_KEY).map_or_else(
                || Err(VersoError::invalid_stage("")),
                validate_stage,
            )
        };
        let mode = match name.as_str() {
            "stage" => Self::Stage(stage()?),
            "stage_unique" => Self::StageUnique(stage()?),
            "archive" => Self::Archive {
                date: Timestamp::parse(get(DATE_KEY).unwrap_or(""))?,
                stage: get(STAGE_KEY).map_or(Ok(Stage::Draft), validate_stage)?,
            },
            "latest_version_single" => Self::LatestSingle(
                get(ID_KEY)
                    .ok_or_else(|| VersoError::InvalidRecordId {
                        value: String::new(),
                    })?
                    .parse()?,
            ),
            "latest_versions" => Self::LatestVersions,
            "version" => Self::SpecificVersion(
                get(VERSION_KEY)
                    .ok_or_else(|| VersoError::invalid_version(""))?
                    .parse()?,
            ),
            "all_versions" => Self::AllVersions,
            other => return Err(VersoError::invalid_mode(other)),
        };
        Ok(Some(mode))
    }
}
