//! Deletion: stage rows go, history gains a tombstone.

use tracing::debug;
use verso_ast::manipulation::{Manipulation, TableWrite, WriteCommand};
use verso_ast::Statement;
use verso_error::{Result, VersoError};
use verso_types::{Record, RecordId, Stage, Timestamp, Version};

use super::{next_version, stamp_base_history};
use crate::columns;
use crate::schema::Schema;
use crate::storage::{delete_by_id, Storage};
use crate::topology::{history_table, Topology};

/// Statements removing `id` from every table of `class` on `stage`,
/// subclass tables first.
pub fn delete_statements(
    schema: &Schema,
    class: &str,
    id: RecordId,
    stage: Stage,
) -> Result<Vec<Statement>> {
    let topology = Topology::new(schema);
    let mut statements = Vec::new();
    for owner in schema.ancestry(class)?.into_iter().rev() {
        if !schema.has_table(owner) {
            continue;
        }
        let table = topology.stage_table(schema.table_name(owner)?, stage);
        statements.push(delete_by_id(&table, id));
    }
    Ok(statements)
}

/// History rows marking `record` deleted from `stages`.
///
/// Field values come from the in-memory record, since the stage rows are
/// about to disappear. Returns the manipulation and the tombstone's version.
pub fn build_tombstone<S: Storage>(
    schema: &Schema,
    storage: &S,
    record: &Record,
    stages: &[Stage],
    actor: i64,
    now: Timestamp,
) -> Result<(Manipulation, Version)> {
    let base_table = schema.base_table(&record.class)?;
    let id = record
        .id
        .ok_or_else(|| VersoError::missing_record_id(base_table))?;
    let version = next_version(schema, storage, &record.class, id)?;

    let mut manipulation = Manipulation::new();
    for owner in schema.ancestry(&record.class)? {
        if !schema.has_table(owner) {
            continue;
        }
        let mut row = TableWrite::new(
            history_table(schema.table_name(owner)?),
            owner,
            WriteCommand::Insert,
        );
        for column in schema.database_fields(owner)? {
            if let Some(value) = record.get(&column) {
                row.set_field(column, value.clone());
            }
        }
        row.set_field(columns::RECORD_ID, id);
        row.set_field(columns::VERSION, version);
        if schema.is_base_class(owner)? {
            row.set_field(columns::LAST_EDITED, now);
            stamp_base_history(&mut row, stages, actor, true);
        }
        manipulation.push(row);
    }
    debug!(target: "verso.write", class = %record.class, %id, %version, "tombstone built");
    Ok((manipulation, version))
}
