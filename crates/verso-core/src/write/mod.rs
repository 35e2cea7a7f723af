//! Write forking.
//!
//! [`augment_write`] turns the per-table writes of one logical save into
//! stage-table writes plus one append-only history insert per table, all
//! stamped with the record's next version number. The result is applied by
//! the caller inside a single [`Storage::atomic`](crate::Storage::atomic)
//! call so that no partial fork is ever visible.

pub mod delete;
pub mod orphan;

use std::collections::BTreeMap;

use tracing::{debug, debug_span, warn};
use verso_ast::manipulation::{Manipulation, TableWrite, WriteCommand};
use verso_ast::{Expr, SelectQuery};
use verso_error::{Result, VersoError};
use verso_types::{RecordId, SqlValue, Stage, Version};

use crate::columns;
use crate::schema::Schema;
use crate::storage::Storage;
use crate::topology::{history_table, Topology};

pub use delete::{build_tombstone, delete_statements};
pub use orphan::cleanup_orphaned_versions;

/// Version sentinel asking for a write without a new version.
pub const NO_VERSION: i64 = -1;

/// Who writes, and to which stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteContext {
    /// Member id recorded as author (and publisher for Live writes); 0 when
    /// nobody is logged in.
    pub actor: i64,
    /// Stage active for the write.
    pub stage: Stage,
    /// Skip history for this write.
    pub without_version: bool,
}

impl WriteContext {
    pub const fn new(actor: i64, stage: Stage) -> Self {
        Self {
            actor,
            stage,
            without_version: false,
        }
    }

    #[must_use]
    pub const fn without_version(mut self) -> Self {
        self.without_version = true;
        self
    }
}

/// The forked manipulation and the versions it assigns.
#[derive(Debug, Clone, Default)]
pub struct ForkedWrite {
    pub manipulation: Manipulation,
    pub versions: BTreeMap<RecordId, Version>,
    /// Stages the write lands on.
    pub stages: Vec<Stage>,
}

impl ForkedWrite {
    pub fn version_for(&self, id: RecordId) -> Option<Version> {
        self.versions.get(&id).copied()
    }
}

/// Stages a write lands on: Live writes also update Draft; trees without
/// stages only ever have Draft.
pub fn affected_stages(staged: bool, stage: Stage) -> Vec<Stage> {
    if staged && stage == Stage::Live {
        vec![Stage::Draft, Stage::Live]
    } else {
        vec![Stage::Draft]
    }
}

/// Next version of `id`: one past the highest version in the base history
/// table, or [`Version::FIRST`].
pub fn next_version<S: Storage>(
    schema: &Schema,
    storage: &S,
    class: &str,
    id: RecordId,
) -> Result<Version> {
    let base_versions = history_table(schema.base_table(class)?);
    let mut query = SelectQuery::from_table(&base_versions);
    query.select_field(Expr::max(Expr::bare(columns::VERSION)), Some(columns::VERSION));
    query.add_where(Expr::bare(columns::RECORD_ID).equals(id));
    let current = storage.select_one(&query)?.and_then(|row| row.version());
    Ok(current.map_or(Version::FIRST, Version::next))
}

fn is_no_version(write: &TableWrite) -> bool {
    matches!(write.field(columns::VERSION), Some(SqlValue::Integer(NO_VERSION)))
}

/// Fork every versionable write of `manipulation`.
///
/// Writes to tables that are neither a class's own main table nor one of its
/// versionable extension tables are dropped. Extension writes fork like
/// subclass writes.
/// Version numbers are read from storage, so call this inside the same
/// transaction that applies the result.
pub fn augment_write<S: Storage>(
    schema: &Schema,
    storage: &S,
    manipulation: Manipulation,
    ctx: &WriteContext,
) -> Result<ForkedWrite> {
    let topology = Topology::new(schema);
    let mut forked = ForkedWrite::default();

    for mut write in manipulation {
        if !schema.is_versionable_write(&write.table, &write.class) {
            warn!(target: "verso.write", table = %write.table, class = %write.class, "dropping write to unversionable table");
            continue;
        }
        let id = write
            .record_id()
            .ok_or_else(|| VersoError::missing_record_id(&write.table))?;
        write.id = Some(id);
        let span = debug_span!(target: "verso.write", "fork", table = %write.table, %id);
        let _enter = span.enter();

        let stages = affected_stages(schema.is_staged(&write.class)?, ctx.stage);
        for stage in &stages {
            if !forked.stages.contains(stage) {
                forked.stages.push(*stage);
            }
        }
        let is_main = schema.table_class(&write.table) == Some(write.class.as_str());
        let is_base = is_main && schema.is_base_class(&write.class)?;

        if ctx.without_version || is_no_version(&write) {
            debug!(target: "verso.write", "write without version");
            write.remove_field(columns::VERSION);
        } else {
            let version = match forked.versions.get(&id) {
                Some(version) => *version,
                None => {
                    let version = next_version(schema, storage, &write.class, id)?;
                    forked.versions.insert(id, version);
                    version
                }
            };
            let mut history = history_write(schema, storage, &write, id, version, is_main)?;
            if is_base {
                stamp_base_history(&mut history, &stages, ctx.actor, false);
            }
            if is_base {
                write.set_field(columns::VERSION, version);
            } else {
                write.remove_field(columns::VERSION);
            }
            forked.manipulation.push(history);
        }

        if stages.contains(&Stage::Live) {
            let live_table = topology.stage_table(&write.table, Stage::Live);
            if live_table != write.table {
                let mut live = write.retarget(live_table);
                live.command = WriteCommand::Update;
                forked.manipulation.push(live);
            }
        }
        forked.manipulation.push(write);
    }
    Ok(forked)
}

/// History insert for one stage write: the written fields, completed from
/// the current row so the history row is a full snapshot. Extension tables
/// declare no fields, so their snapshot takes every column of the row.
fn history_write<S: Storage>(
    schema: &Schema,
    storage: &S,
    write: &TableWrite,
    id: RecordId,
    version: Version,
    is_main: bool,
) -> Result<TableWrite> {
    let mut history = TableWrite::new(history_table(&write.table), &write.class, WriteCommand::Insert);
    for (column, value) in &write.fields {
        if column != columns::ID && column != columns::VERSION {
            history.set_field(column.clone(), value.clone());
        }
    }

    let missing: Vec<String> = if is_main {
        schema
            .database_fields(&write.class)?
            .into_iter()
            .filter(|column| !write.fields.contains_key(column))
            .collect()
    } else {
        Vec::new()
    };
    if !is_main || !missing.is_empty() {
        let mut current = SelectQuery::from_table(&write.table);
        for column in &missing {
            current.select_field(Expr::bare(column.as_str()), None);
        }
        current.add_where(Expr::bare(columns::ID).equals(id));
        if let Some(row) = storage.select_one(&current)? {
            for (column, value) in row.into_map() {
                if column != columns::ID && column != columns::VERSION {
                    history.fields.entry(column).or_insert(value);
                }
            }
        }
    }

    history.set_field(columns::RECORD_ID, id);
    history.set_field(columns::VERSION, version);
    Ok(history)
}

/// Author, publisher and stage flags carried only by base history rows.
pub(crate) fn stamp_base_history(history: &mut TableWrite, stages: &[Stage], actor: i64, deleted: bool) {
    let live = stages.contains(&Stage::Live);
    history.set_field(columns::AUTHOR_ID, actor);
    history.set_field(columns::PUBLISHER_ID, if live { actor } else { 0 });
    history.set_field(columns::WAS_PUBLISHED, live);
    history.set_field(columns::WAS_DRAFT, stages.contains(&Stage::Draft));
    history.set_field(columns::WAS_DELETED, deleted);
}
