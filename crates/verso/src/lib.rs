//! Versioned records over SQLite.
//!
//! A [`Versioned`] session gives every record of a configured class tree a
//! Draft and a Live stage plus an append-only history. Reads are ordinary
//! queries over the class's main tables, rewritten for the session's reading
//! mode; writes are forked into stage rows and a new history version.
//!
//! ```ignore
//! use verso::{ClassSpec, Record, Schema, SchemaSpec, SqliteStorage, Stage, Versioned, VersionedConfig};
//!
//! let schema = Schema::new(&SchemaSpec {
//!     classes: vec![ClassSpec::base("Page", &["Title"])],
//! })?;
//! let session = Versioned::new(schema, VersionedConfig::default(), SqliteStorage::open("site.db")?)?;
//! let mut page = Record::new("Page").with("Title", "Home");
//! session.write_to_stage(&mut page, Stage::Draft)?;
//! session.publish_single("Page", page.id.unwrap())?;
//! ```

pub mod session;
pub mod sqlite;
pub mod workflow;

pub use session::{Tombstone, Versioned};
pub use sqlite::SqliteStorage;
pub use workflow::VersionSource;

pub use verso_core::{
    ClassSpec, Extension, ReadingMode, Schema, SchemaSpec, Storage, VersionCache,
    VersionableExtension, VersionedConfig, VersionedMode,
};
pub use verso_error::{ErrorKind, Result, VersoError};
pub use verso_types::{Clock, Record, RecordId, Row, SqlValue, Stage, SystemClock, Timestamp, Version};
