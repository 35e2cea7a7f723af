//! Reading-mode state machine.
//!
//! A session reads either a stage (`Stage.<Stage>`) or a point in time
//! (`Archive.<date>.<Stage>`). The mode is encoded as a single token, and is
//! projected onto data-query parameters and request query strings.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;
use tracing::debug;
use verso_error::{Result, VersoError};
use verso_types::{validate_stage, Stage, Timestamp};

use crate::mode::VersionedMode;

const STAGE_PREFIX: &str = "Stage.";
const ARCHIVE_PREFIX: &str = "Archive.";

/// Query-string key selecting a stage.
pub const QUERY_STAGE: &str = "stage";
/// Query-string key selecting an archive date.
pub const QUERY_ARCHIVE_DATE: &str = "archiveDate";

/// The mode reads are resolved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadingMode {
    Stage(Stage),
    /// Latest state of `stage` as of `date`.
    Archive { date: Timestamp, stage: Stage },
}

impl Default for ReadingMode {
    fn default() -> Self {
        Self::Stage(Stage::Live)
    }
}

impl ReadingMode {
    /// Parse a mode token: `Stage.Live`, `Archive.2024-01-01 10:00:00.Live`.
    /// An archive token without a stage reads Draft.
    pub fn parse(token: &str) -> Result<Self> {
        if let Some(stage) = token.strip_prefix(STAGE_PREFIX) {
            return Ok(Self::Stage(validate_stage(stage)?));
        }
        if let Some(rest) = token.strip_prefix(ARCHIVE_PREFIX) {
            let (date, stage) = match rest.rsplit_once('.') {
                Some((date, stage)) => (date, validate_stage(stage)?),
                None => (rest, Stage::Draft),
            };
            return Ok(Self::Archive {
                date: Timestamp::parse(date)?,
                stage,
            });
        }
        Err(VersoError::invalid_mode(token))
    }

    /// The stage this mode reads.
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Stage(stage) | Self::Archive { stage, .. } => *stage,
        }
    }

    pub const fn archive_date(&self) -> Option<Timestamp> {
        match self {
            Self::Stage(_) => None,
            Self::Archive { date, .. } => Some(*date),
        }
    }

    /// Stage a write performed under this mode targets. Only an explicit
    /// Live stage mode writes Live; archive modes write Draft.
    pub const fn write_stage(&self) -> Stage {
        match self {
            Self::Stage(stage) => *stage,
            Self::Archive { .. } => Stage::Draft,
        }
    }

    /// The augmentation mode reads under this reading mode use.
    pub const fn to_versioned_mode(&self) -> VersionedMode {
        match self {
            Self::Stage(stage) => VersionedMode::Stage(*stage),
            Self::Archive { date, stage } => VersionedMode::Archive {
                date: *date,
                stage: *stage,
            },
        }
    }

    /// Projection onto data-query parameters.
    pub fn to_data_query_params(&self) -> BTreeMap<String, String> {
        self.to_versioned_mode().to_query_params()
    }

    /// Inverse of [`ReadingMode::to_data_query_params`]. `None` when the
    /// parameters carry no mode; an error for modes other than stage/archive.
    pub fn from_data_query_params(params: &BTreeMap<String, String>) -> Result<Option<Self>> {
        match VersionedMode::from_query_params(params)? {
            None => Ok(None),
            Some(VersionedMode::Stage(stage)) => Ok(Some(Self::Stage(stage))),
            Some(VersionedMode::Archive { date, stage }) => Ok(Some(Self::Archive { date, stage })),
            Some(other) => Err(VersoError::invalid_mode(other.name())),
        }
    }

    /// Request query string selecting this mode.
    pub fn to_query_string(&self) -> String {
        match self {
            Self::Stage(stage) => format!("{QUERY_STAGE}={stage}"),
            Self::Archive { date, stage } => format!(
                "{QUERY_ARCHIVE_DATE}={}&{QUERY_STAGE}={stage}",
                date.to_query_value()
            ),
        }
    }

    /// Parse a request query string. Unrelated keys are ignored; `None` when
    /// neither `stage` nor `archiveDate` is present.
    pub fn from_query_string(query: &str) -> Result<Option<Self>> {
        let mut stage = None;
        let mut date = None;
        for pair in query.trim_start_matches('?').split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                QUERY_STAGE => stage = Some(validate_stage(value)?),
                QUERY_ARCHIVE_DATE => date = Some(Timestamp::parse(&value.replace('+', " "))?),
                _ => {}
            }
        }
        Ok(match (date, stage) {
            (Some(date), stage) => Some(Self::Archive {
                date,
                stage: stage.unwrap_or(Stage::Draft),
            }),
            (None, Some(stage)) => Some(Self::Stage(stage)),
            (None, None) => None,
        })
    }
}

impl fmt::Display for ReadingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(stage) => write!(f, "{STAGE_PREFIX}{stage}"),
            Self::Archive { date, stage } => write!(f, "{ARCHIVE_PREFIX}{date}.{stage}"),
        }
    }
}

// ─── Session state ───────────────────────────────────────────────────────

/// The current reading mode of a session.
#[derive(Debug)]
pub struct ReadingState {
    current: Mutex<ReadingMode>,
    default: ReadingMode,
}

impl ReadingState {
    pub fn new(default: ReadingMode) -> Self {
        Self {
            current: Mutex::new(default),
            default,
        }
    }

    pub fn reading_mode(&self) -> ReadingMode {
        *self.current.lock()
    }

    pub fn default_mode(&self) -> ReadingMode {
        self.default
    }

    pub fn set_reading_mode(&self, mode: ReadingMode) {
        let mut current = self.current.lock();
        if *current != mode {
            debug!(target: "verso.state", from = %*current, to = %mode, "reading mode changed");
        }
        *current = mode;
    }

    /// Set the mode from a token, rejecting anything unparseable.
    pub fn set_reading_mode_token(&self, token: &str) -> Result<()> {
        self.set_reading_mode(ReadingMode::parse(token)?);
        Ok(())
    }

    pub fn set_stage(&self, stage: Stage) {
        self.set_reading_mode(ReadingMode::Stage(stage));
    }

    /// Read `stage` as of `date`.
    pub fn set_reading_archived_date(&self, date: &str, stage: Stage) -> Result<()> {
        let date = Timestamp::parse(date)?;
        self.set_reading_mode(ReadingMode::Archive { date, stage });
        Ok(())
    }

    /// Back to the default mode.
    pub fn reset(&self) {
        self.set_reading_mode(self.default);
    }

    /// Save the current mode; it is restored when the guard drops.
    pub fn scoped(&self) -> ModeGuard<'_> {
        ModeGuard {
            state: self,
            saved: self.reading_mode(),
        }
    }

    /// Run `f`, then restore whatever mode was active before, on every exit
    /// path including unwinding.
    pub fn with_versioned_mode<T>(&self, f: impl FnOnce(&Self) -> T) -> T {
        let _guard = self.scoped();
        f(self)
    }
}

impl Default for ReadingState {
    fn default() -> Self {
        Self::new(ReadingMode::default())
    }
}

/// Restores a saved reading mode on drop.
#[must_use = "the saved mode is restored when the guard drops"]
pub struct ModeGuard<'a> {
    state: &'a ReadingState,
    saved: ReadingMode,
}

impl ModeGuard<'_> {
    pub const fn saved(&self) -> ReadingMode {
        self.saved
    }
}

impl Drop for ModeGuard<'_> {
    fn drop(&mut self) {
        self.state.set_reading_mode(self.saved);
    }
}
