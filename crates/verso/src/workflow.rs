//! Publishing workflow: copying versions between stages, archiving,
//! rolling back, and the status checks built on stage version numbers.

use std::fmt;

use tracing::{info, warn};
use verso_ast::{Expr, Statement, UpdateQuery};
use verso_core::columns;
use verso_core::storage::Storage;
use verso_core::write::{build_tombstone, cleanup_orphaned_versions};
use verso_core::{apply_manipulation, Topology};
use verso_error::{Result, VersoError};
use verso_types::{Record, RecordId, Stage, Version};

use crate::session::{Tombstone, Versioned};

/// Where a copy reads the record from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    /// The current row of a stage.
    Stage(Stage),
    /// A historic snapshot.
    Version(Version),
}

impl fmt::Display for VersionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage(stage) => write!(f, "stage {stage}"),
            Self::Version(version) => write!(f, "version {version}"),
        }
    }
}

impl<S: Storage> Versioned<S> {
    fn read_source(&self, class: &str, id: RecordId, from: VersionSource) -> Result<Record> {
        let found = match from {
            VersionSource::Stage(stage) => self.get_one_by_stage(class, stage, id)?,
            VersionSource::Version(version) => self.get_version(class, id, version)?,
        };
        found.ok_or_else(|| VersoError::RecordNotFound {
            class: class.to_owned(),
            id: id.get(),
            location: from.to_string(),
        })
    }

    /// Write the record as found at `from` onto stage `to`.
    ///
    /// With `create_new_version` the copy is a new history version. Without,
    /// no history is written and the target stage row points at the source
    /// version. Returns the version the target stage now shows.
    pub fn copy_version_to_stage(
        &self,
        class: &str,
        id: RecordId,
        from: VersionSource,
        to: Stage,
        create_new_version: bool,
    ) -> Result<Version> {
        let mut record = self.read_source(class, id, from)?;
        let source_version = record
            .version
            .ok_or_else(|| VersoError::internal(format!("{class}#{id} read without a version")))?;

        let version = if create_new_version {
            self.write_to_stage(&mut record, to)?
                .ok_or_else(|| VersoError::internal("versioned write assigned no version"))?
        } else {
            self.storage().atomic(|storage| {
                self.write_record(&mut record, to, true)?;
                let table = Topology::new(self.schema())
                    .stage_table(self.schema().base_table(&record.class)?, to);
                storage.execute(&Statement::Update(UpdateQuery {
                    table,
                    assignments: vec![(columns::VERSION.to_owned(), source_version.into())],
                    where_clause: vec![Expr::bare(columns::ID).equals(id)],
                }))?;
                Ok(())
            })?;
            let base_class = self.schema().base_data_class(class)?;
            self.cache().set(base_class, to, id, Some(source_version));
            source_version
        };
        info!(target: "verso.workflow", class, %id, %from, %to, %version, "version copied to stage");
        Ok(version)
    }

    /// Copy the Draft row to Live as a new version.
    pub fn publish_single(&self, class: &str, id: RecordId) -> Result<Version> {
        let version =
            self.copy_version_to_stage(class, id, VersionSource::Stage(Stage::Draft), Stage::Live, true)?;
        info!(target: "verso.workflow", class, %id, %version, "published");
        Ok(version)
    }

    /// Remove the record from Live. Returns false when it was not published.
    pub fn unpublish(&self, class: &str, id: RecordId) -> Result<bool> {
        if !self.schema().is_staged(class)? {
            return Ok(false);
        }
        let Some(record) = self.get_one_by_stage(class, Stage::Live, id)? else {
            return Ok(false);
        };
        self.delete_from_stage(&record, Stage::Live)?;
        info!(target: "verso.workflow", class, %id, "unpublished");
        Ok(true)
    }

    /// Remove the record from every stage, leaving one tombstone flagged
    /// for all of them. Returns false when the record is on no stage.
    pub fn archive(&self, class: &str, id: RecordId) -> Result<bool> {
        let staged = self.schema().is_staged(class)?;
        let record = match self.get_one_by_stage(class, Stage::Draft, id)? {
            Some(record) => record,
            None if staged => match self.get_one_by_stage(class, Stage::Live, id)? {
                Some(record) => record,
                None => return Ok(false),
            },
            None => return Ok(false),
        };
        let stages: Vec<Stage> = if staged {
            vec![Stage::Draft, Stage::Live]
        } else {
            vec![Stage::Draft]
        };
        let now = self.now();
        let actor = self.actor();

        let archived = self.storage().atomic(|storage| {
            for stage in &stages {
                self.delete_from_stage_with(&record, *stage, Tombstone::Defer)?;
            }
            let (tombstone, version) =
                build_tombstone(self.schema(), storage, &record, &stages, actor, now)?;
            apply_manipulation(storage, &tombstone)?;
            Ok(version)
        });
        match archived {
            Ok(version) => {
                info!(target: "verso.workflow", class, %id, %version, "archived");
                Ok(true)
            }
            Err(error) => {
                let base_class = self.schema().base_data_class(class)?;
                let mut cache = self.cache();
                for stage in &stages {
                    cache.invalidate(base_class, *stage, id);
                }
                Err(error)
            }
        }
    }

    /// Discard Draft changes: Draft takes the Live row and its version.
    pub fn revert_to_live(&self, class: &str, id: RecordId) -> Result<Version> {
        let version =
            self.copy_version_to_stage(class, id, VersionSource::Stage(Stage::Live), Stage::Draft, false)?;
        info!(target: "verso.workflow", class, %id, %version, "reverted to live");
        Ok(version)
    }

    /// Restore a historic version onto Draft as a new version.
    pub fn rollback_single(&self, class: &str, id: RecordId, version: Version) -> Result<Version> {
        let new_version =
            self.copy_version_to_stage(class, id, VersionSource::Version(version), Stage::Draft, true)?;
        info!(target: "verso.workflow", class, %id, from = %version, to = %new_version, "rolled back");
        Ok(new_version)
    }

    /// Run orphan cleanup over every subclass history table.
    pub fn cleanup_orphaned_versions(&self) -> Result<usize> {
        let removed = self
            .storage()
            .atomic(|storage| cleanup_orphaned_versions(self.schema(), storage))?;
        if removed > 0 {
            warn!(target: "verso.workflow", removed, "orphaned history rows removed");
        }
        Ok(removed)
    }

    // ─── Status ──────────────────────────────────────────────────────────

    /// Whether Draft and Live show different versions, or only one of them
    /// has the record. Always reads storage.
    pub fn stages_differ(&self, class: &str, id: RecordId) -> Result<bool> {
        let draft = self.version_number_by_stage(class, Stage::Draft, id, false)?;
        let live = self.version_number_by_stage(class, Stage::Live, id, false)?;
        Ok(draft != live)
    }

    pub fn is_on_draft(&self, class: &str, id: RecordId) -> Result<bool> {
        Ok(self
            .version_number_by_stage(class, Stage::Draft, id, true)?
            .is_some())
    }

    /// Whether the record is on Live. Records without stages count as
    /// published while they are on Draft.
    pub fn is_published(&self, class: &str, id: RecordId) -> Result<bool> {
        if !self.schema().is_staged(class)? {
            return self.is_on_draft(class, id);
        }
        Ok(self
            .version_number_by_stage(class, Stage::Live, id, true)?
            .is_some())
    }

    /// On no stage, but with history.
    pub fn is_archived(&self, class: &str, id: RecordId) -> Result<bool> {
        Ok(!self.is_on_draft(class, id)?
            && !self.is_published(class, id)?
            && self.has_history(class, id)?)
    }

    pub fn is_on_draft_only(&self, class: &str, id: RecordId) -> Result<bool> {
        Ok(self.is_on_draft(class, id)? && !self.is_published(class, id)?)
    }

    pub fn is_on_live_only(&self, class: &str, id: RecordId) -> Result<bool> {
        Ok(self.is_published(class, id)? && !self.is_on_draft(class, id)?)
    }

    /// On Draft with a version Live does not show.
    pub fn is_modified_on_draft(&self, class: &str, id: RecordId) -> Result<bool> {
        Ok(self.is_on_draft(class, id)? && self.stages_differ(class, id)?)
    }

    /// Whether `record` holds the newest non-deleted version of its id.
    pub fn is_latest_version(&self, record: &Record) -> Result<bool> {
        let Some(id) = record.id else {
            return Ok(false);
        };
        let latest = self.get_latest_version(&record.class, id)?;
        Ok(latest.is_some_and(|latest| latest.version == record.version))
    }

    /// Whether Live shows the same version as Draft.
    pub fn latest_published(&self, class: &str, id: RecordId) -> Result<bool> {
        let draft = self.version_number_by_stage(class, Stage::Draft, id, false)?;
        let live = self.version_number_by_stage(class, Stage::Live, id, false)?;
        Ok(draft.is_some() && draft == live)
    }
}
