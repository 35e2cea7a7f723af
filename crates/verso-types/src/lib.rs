//! Core value types for verso.
//!
//! Everything here is plain data shared by the query layer, the write
//! pipeline and the storage backend: column values, record and version
//! identifiers, stage names, fetched rows and timestamps.

pub mod record;
pub mod row;
pub mod time;
pub mod value;

use std::fmt;
use std::str::FromStr;

use verso_error::{Result, VersoError};

pub use record::Record;
pub use row::Row;
pub use time::{Clock, SystemClock, Timestamp};
pub use value::SqlValue;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identity of a logical record within its base-class tree.
///
/// The same id is shared by every stage row and is stored as `RecordID` in
/// every history row of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    /// Wrap a raw id. Ids are positive; zero and negatives are rejected.
    pub fn new(raw: i64) -> Result<Self> {
        if raw > 0 {
            Ok(Self(raw))
        } else {
            Err(VersoError::InvalidRecordId {
                value: raw.to_string(),
            })
        }
    }

    /// The raw integer id.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl FromStr for RecordId {
    type Err = VersoError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim().parse::<i64>().map_err(|_| VersoError::InvalidRecordId {
            value: s.to_owned(),
        })?;
        Self::new(raw)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<RecordId> for SqlValue {
    fn from(id: RecordId) -> Self {
        Self::Integer(id.0)
    }
}

/// A version number. Versions start at 1 and strictly increase per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// The first version a record ever receives.
    pub const FIRST: Self = Self(1);

    /// Wrap a raw version number; must be positive.
    pub fn new(raw: i64) -> Result<Self> {
        if raw > 0 {
            Ok(Self(raw))
        } else {
            Err(VersoError::invalid_version(raw.to_string()))
        }
    }

    /// The raw version number.
    pub const fn get(self) -> i64 {
        self.0
    }

    /// The version that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl FromStr for Version {
    type Err = VersoError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s
            .trim()
            .parse::<i64>()
            .map_err(|_| VersoError::invalid_version(s))?;
        Self::new(raw)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Version> for SqlValue {
    fn from(v: Version) -> Self {
        Self::Integer(v.0)
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// A named current-state table set.
///
/// Draft is the default stage and lives in the unsuffixed table; Live lives
/// in `<table>_Live`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum Stage {
    #[default]
    Draft,
    Live,
}

impl Stage {
    /// Both configured stages, default first.
    pub const ALL: [Self; 2] = [Self::Draft, Self::Live];

    /// The stage name as it appears in mode tokens and table suffixes.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Live => "Live",
        }
    }

    /// The other configured stage.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Draft => Self::Live,
            Self::Live => Self::Draft,
        }
    }

    /// Whether this stage is the default (unsuffixed) one.
    pub const fn is_default(self) -> bool {
        matches!(self, Self::Draft)
    }

    /// Column of a history row flagging that the write touched this stage.
    pub const fn history_flag(self) -> &'static str {
        match self {
            Self::Draft => "WasDraft",
            Self::Live => "WasPublished",
        }
    }
}

/// Validate a stage name. Anything other than the two configured stage names
/// is rejected; there is no fallback.
pub fn validate_stage(name: &str) -> Result<Stage> {
    name.parse()
}

impl FromStr for Stage {
    type Err = VersoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Draft" => Ok(Self::Draft),
            "Live" => Ok(Self::Live),
            other => Err(VersoError::invalid_stage(other)),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
