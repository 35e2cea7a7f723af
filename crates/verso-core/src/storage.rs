//! Storage seam.
//!
//! The versioning layer builds structured queries and statements; a backend
//! renders and runs them. Multi-statement operations run inside
//! [`Storage::atomic`] so that a failure leaves no partial history.

use tracing::trace;
use verso_ast::manipulation::{Manipulation, TableWrite, WriteCommand};
use verso_ast::{DeleteQuery, Expr, InsertQuery, SelectQuery, Statement, UpdateQuery};
use verso_error::{Result, VersoError};
use verso_types::{RecordId, Row, SqlValue};

use crate::columns;

/// A relational backend.
pub trait Storage {
    /// Run a read query.
    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>>;

    /// Run a data-modifying statement, returning the number of rows it
    /// affected.
    fn execute(&self, statement: &Statement) -> Result<usize>;

    /// Id assigned by the most recent insert on this connection.
    fn last_insert_id(&self) -> Result<RecordId>;

    /// Run `f` in a transaction: committed when `f` succeeds, rolled back
    /// when it fails. Nested calls join the enclosing transaction and roll
    /// back only their own work on failure.
    fn atomic<T, F>(&self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<T>;

    /// First row of a read query.
    fn select_one(&self, query: &SelectQuery) -> Result<Option<Row>> {
        Ok(self.select(query)?.into_iter().next())
    }
}

/// `INSERT` of `values` into `table`.
pub fn insert(table: &str, values: impl IntoIterator<Item = (String, SqlValue)>) -> Statement {
    Statement::Insert(InsertQuery {
        table: table.to_owned(),
        values: values.into_iter().collect(),
    })
}

/// `DELETE FROM table WHERE ID = id`.
pub fn delete_by_id(table: &str, id: RecordId) -> Statement {
    Statement::Delete(DeleteQuery {
        table: table.to_owned(),
        where_clause: vec![Expr::bare(columns::ID).equals(id)],
    })
}

/// Apply every write of a manipulation, in order.
///
/// Updates address rows by id; an update that matches no row becomes an
/// insert carrying the id, so stage rows come into existence on first
/// publish.
pub fn apply_manipulation<S: Storage>(storage: &S, manipulation: &Manipulation) -> Result<()> {
    for write in manipulation {
        apply_write(storage, write)?;
    }
    Ok(())
}

fn apply_write<S: Storage>(storage: &S, write: &TableWrite) -> Result<()> {
    let id = write.record_id();
    match write.command {
        WriteCommand::Insert => {
            storage.execute(&insert(&write.table, with_id(write, id)))?;
        }
        WriteCommand::Update => {
            let id = id.ok_or_else(|| VersoError::missing_record_id(&write.table))?;
            if write.fields.is_empty() {
                let mut exists = SelectQuery::from_table(&write.table);
                exists.select_field(Expr::bare(columns::ID), None);
                exists.add_where(Expr::bare(columns::ID).equals(id));
                if storage.select_one(&exists)?.is_none() {
                    storage.execute(&insert(&write.table, with_id(write, Some(id))))?;
                }
                return Ok(());
            }
            let update = Statement::Update(UpdateQuery {
                table: write.table.clone(),
                assignments: without_id(write),
                where_clause: vec![Expr::bare(columns::ID).equals(id)],
            });
            let affected = storage.execute(&update)?;
            if affected == 0 {
                trace!(target: "verso.write", table = %write.table, %id, "update matched nothing, inserting");
                storage.execute(&insert(&write.table, with_id(write, Some(id))))?;
            }
        }
    }
    Ok(())
}

fn without_id(write: &TableWrite) -> Vec<(String, SqlValue)> {
    write
        .fields
        .iter()
        .filter(|(column, _)| column.as_str() != columns::ID)
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect()
}

fn with_id(write: &TableWrite, id: Option<RecordId>) -> Vec<(String, SqlValue)> {
    let mut values = Vec::with_capacity(write.fields.len() + 1);
    if let Some(id) = id {
        values.push((columns::ID.to_owned(), SqlValue::from(id)));
    }
    values.extend(without_id(write));
    values
}
