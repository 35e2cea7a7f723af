use thiserror::Error;

/// Boxed error produced by a storage collaborator.
pub type StorageSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Primary error type for verso operations.
///
/// Variants are grouped by how the caller is expected to react: validation
/// and identity errors are fatal at the call boundary, configuration errors
/// are fatal when the schema is built, storage errors are passed through
/// unmodified from the storage collaborator.
#[derive(Error, Debug)]
pub enum VersoError {
    // === Validation Errors ===
    /// A stage name other than the configured Draft/Live stages.
    #[error("invalid stage name \"{stage}\"")]
    InvalidStage { stage: String },

    /// A version identifier that is not a positive integer.
    #[error("invalid version identifier \"{value}\"")]
    InvalidVersion { value: String },

    /// A record identifier that is not a positive integer.
    #[error("invalid record identifier \"{value}\"")]
    InvalidRecordId { value: String },

    /// An archive reading mode was requested without a date.
    #[error("archive reading mode requires a date")]
    MissingArchiveDate,

    /// An archive date that does not parse as an ISO 8601 date or datetime.
    #[error("invalid archive date \"{value}\"")]
    InvalidArchiveDate { value: String },

    /// A reading-mode token or query-parameter set that names no known mode.
    #[error("invalid reading mode \"{mode}\"")]
    InvalidReadingMode { mode: String },

    // === Identity Errors ===
    /// A write mutation for a table carried no primary key.
    #[error("couldn't find ID in write to table {table}")]
    MissingRecordId { table: String },

    /// A record could not be found at the requested stage or version.
    #[error("can't find {class}#{id} in {location}")]
    RecordNotFound {
        class: String,
        id: i64,
        location: String,
    },

    // === Configuration Errors ===
    /// A class name absent from the schema.
    #[error("unknown class {class}")]
    UnknownClass { class: String },

    /// A versionable extension was configured but never registered.
    #[error("versionable extension {extension} is not registered")]
    UnknownExtension { extension: String },

    /// A configured extension does not expose the versionable-table capability.
    #[error("extension {extension} does not implement versionable tables")]
    ExtensionNotVersionable { extension: String },

    /// Any other invalid configuration or schema description.
    #[error("configuration error: {detail}")]
    Configuration { detail: String },

    // === Storage Errors ===
    /// Error raised by the storage collaborator, passed through unmodified.
    #[error("storage error: {detail}")]
    Storage {
        detail: String,
        #[source]
        source: Option<StorageSource>,
    },

    // === Internal Errors ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`VersoError`], matching the error taxonomy
/// callers program against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid stage, version, id, archive date or reading mode.
    Validation,
    /// A write without identity, or a lookup that found no record.
    MissingRecord,
    /// Schema or extension misconfiguration.
    Configuration,
    /// Failure reported by the storage collaborator.
    Storage,
    /// Broken internal invariant.
    Internal,
}

impl VersoError {
    /// Map this error to its taxonomy kind.
    #[allow(clippy::match_same_arms)]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidStage { .. }
            | Self::InvalidVersion { .. }
            | Self::InvalidRecordId { .. }
            | Self::MissingArchiveDate
            | Self::InvalidArchiveDate { .. }
            | Self::InvalidReadingMode { .. } => ErrorKind::Validation,
            Self::MissingRecordId { .. } | Self::RecordNotFound { .. } => ErrorKind::MissingRecord,
            Self::UnknownClass { .. }
            | Self::UnknownExtension { .. }
            | Self::ExtensionNotVersionable { .. }
            | Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the error must abort the operation rather than be retried.
    ///
    /// Storage errors are the only ones a caller may retry; this crate
    /// itself never retries.
    pub const fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Storage)
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidStage { .. } => Some("Use one of the configured stages: Draft or Live"),
            Self::InvalidArchiveDate { .. } | Self::MissingArchiveDate => {
                Some("Pass a date formatted as YYYY-MM-DD or YYYY-MM-DD HH:MM:SS")
            }
            Self::MissingRecordId { .. } => Some("Write the base record first so it has an ID"),
            Self::UnknownExtension { .. } | Self::ExtensionNotVersionable { .. } => {
                Some("Register an extension that exposes as_versionable() for the configured suffix")
            }
            _ => None,
        }
    }

    /// Create a stage validation error.
    pub fn invalid_stage(stage: impl Into<String>) -> Self {
        Self::InvalidStage {
            stage: stage.into(),
        }
    }

    /// Create a version validation error.
    pub fn invalid_version(value: impl Into<String>) -> Self {
        Self::InvalidVersion {
            value: value.into(),
        }
    }

    /// Create a reading-mode validation error.
    pub fn invalid_mode(mode: impl Into<String>) -> Self {
        Self::InvalidReadingMode { mode: mode.into() }
    }

    /// Create a missing-identity error for a write to `table`.
    pub fn missing_record_id(table: impl Into<String>) -> Self {
        Self::MissingRecordId {
            table: table.into(),
        }
    }

    /// Create an unknown-class error.
    pub fn unknown_class(class: impl Into<String>) -> Self {
        Self::UnknownClass {
            class: class.into(),
        }
    }

    /// Create a generic configuration error.
    pub fn configuration(detail: impl Into<String>) -> Self {
        Self::Configuration {
            detail: detail.into(),
        }
    }

    /// Wrap an error raised by the storage collaborator.
    pub fn storage<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            detail: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    /// Create a storage error that has no underlying source.
    pub fn storage_msg(detail: impl Into<String>) -> Self {
        Self::Storage {
            detail: detail.into(),
            source: None,
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using `VersoError`.
pub type Result<T> = std::result::Result<T, VersoError>;
