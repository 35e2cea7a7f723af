//! Orphaned subclass history.
//!
//! A subclass history row belongs to the base history row with the same
//! `(RecordID, Version)`. Rows without one are left behind by schema
//! changes and are removed during schema synchronization.

use tracing::{debug, warn};
use verso_ast::{DeleteQuery, Expr, SelectQuery, Statement, TableSource};
use verso_error::Result;

use crate::columns;
use crate::schema::Schema;
use crate::storage::Storage;
use crate::topology::history_table;

const ORPHAN_ALIAS: &str = "Orphan";
const OWNER_ALIAS: &str = "Owner";

/// `DELETE` removing orphaned rows of `sub_versions`.
pub fn orphan_cleanup_statement(sub_versions: &str, base_versions: &str) -> Statement {
    let mut orphans = SelectQuery::from_aliased(sub_versions, ORPHAN_ALIAS);
    orphans.select_field(Expr::column(ORPHAN_ALIAS, columns::ID), None);
    orphans.add_left_join(
        TableSource::Table(base_versions.to_owned()),
        Some(OWNER_ALIAS),
        Expr::column(OWNER_ALIAS, columns::RECORD_ID)
            .equals(Expr::column(ORPHAN_ALIAS, columns::RECORD_ID))
            .and(
                Expr::column(OWNER_ALIAS, columns::VERSION)
                    .equals(Expr::column(ORPHAN_ALIAS, columns::VERSION)),
            ),
    );
    orphans.add_where(Expr::column(OWNER_ALIAS, columns::ID).is_null());

    Statement::Delete(DeleteQuery {
        table: sub_versions.to_owned(),
        where_clause: vec![Expr::bare(columns::ID).in_subquery(orphans)],
    })
}

/// Remove orphaned rows from every subclass history table. Returns the
/// number of rows deleted.
pub fn cleanup_orphaned_versions<S: Storage>(schema: &Schema, storage: &S) -> Result<usize> {
    let mut removed = 0;
    for class in schema.classes() {
        if schema.is_base_class(class)? || !schema.has_table(class) {
            continue;
        }
        let sub_versions = history_table(schema.table_name(class)?);
        let base_versions = history_table(schema.base_table(class)?);
        let count = storage.execute(&orphan_cleanup_statement(&sub_versions, &base_versions))?;
        if count > 0 {
            warn!(target: "verso.write", table = %sub_versions, count, "removed orphaned history rows");
        } else {
            debug!(target: "verso.write", table = %sub_versions, "no orphaned history rows");
        }
        removed += count;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture_schema, ScriptedStorage};

    #[test]
    fn statement_shape() {
        assert_eq!(
            orphan_cleanup_statement("BlogPost_Versions", "Page_Versions").to_string(),
            r#"DELETE FROM "BlogPost_Versions" WHERE "ID" IN (SELECT "Orphan"."ID" FROM "BlogPost_Versions" AS "Orphan" LEFT JOIN "Page_Versions" AS "Owner" ON "Owner"."RecordID" = "Orphan"."RecordID" AND "Owner"."Version" = "Orphan"."Version" WHERE "Owner"."ID" IS NULL)"#
        );
    }

    #[test]
    fn only_subclass_tables_are_cleaned() {
        let schema = fixture_schema();
        let storage = ScriptedStorage::new().with_affected(|_| 2);
        let removed = cleanup_orphaned_versions(&schema, &storage).unwrap();
        assert_eq!(removed, 2);
        let statements = storage.statements();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].table(), "BlogPost_Versions");
    }
}
