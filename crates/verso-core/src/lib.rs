//! Versioning core: reading modes, query augmentation, write forking and the
//! version-number cache.
//!
//! Reads flow `ReadingMode -> VersionedMode -> augment()`: an ordinary query
//! over a class's main tables is rewritten to target the stage tables, the
//! `_Versions` history tables, or a latest-version-per-record projection of
//! them. Writes flow `Manipulation -> augment_write()`: each per-table write
//! is forked into stage-table writes plus an append-only history insert
//! stamped with the next version number of the record.
//!
//! Storage is a collaborator behind the [`storage::Storage`] trait; nothing in
//! this crate talks to a database directly.

pub mod augment;
pub mod cache;
pub mod config;
pub mod lookup;
pub mod mode;
pub mod schema;
pub mod state;
pub mod storage;
pub mod topology;
pub mod write;

#[cfg(test)]
pub(crate) mod testing;

pub use augment::{augment, AugmentContext, Augmentor};
pub use cache::VersionCache;
pub use config::VersionedConfig;
pub use lookup::VersionLookup;
pub use mode::VersionedMode;
pub use schema::{ClassSpec, Extension, Schema, SchemaSpec, VersionableExtension};
pub use state::{ModeGuard, ReadingMode, ReadingState};
pub use storage::{apply_manipulation, Storage};
pub use topology::{history_table, Topology};
pub use write::{augment_write, ForkedWrite, WriteContext};

/// Column names with fixed meaning in stage and history tables.
pub mod columns {
    pub const ID: &str = "ID";
    pub const CLASS_NAME: &str = "ClassName";
    pub const CREATED: &str = "Created";
    pub const LAST_EDITED: &str = "LastEdited";
    pub const VERSION: &str = "Version";
    pub const RECORD_ID: &str = "RecordID";
    pub const WAS_PUBLISHED: &str = "WasPublished";
    pub const WAS_DRAFT: &str = "WasDraft";
    pub const WAS_DELETED: &str = "WasDeleted";
    pub const AUTHOR_ID: &str = "AuthorID";
    pub const PUBLISHER_ID: &str = "PublisherID";
    /// Output name of the max-version aggregate.
    pub const LATEST_VERSION: &str = "LatestVersion";

    /// Columns every base-class history table carries in addition to the
    /// class's own fields.
    pub const VERSIONS_TABLE_COLUMNS: [&str; 7] = [
        RECORD_ID,
        VERSION,
        WAS_PUBLISHED,
        WAS_DELETED,
        WAS_DRAFT,
        AUTHOR_ID,
        PUBLISHER_ID,
    ];

    /// Columns implicitly owned by every base class.
    pub const BASE_FIELDS: [&str; 3] = [CLASS_NAME, CREATED, LAST_EDITED];
}
