//! SQLite storage over `rusqlite`.
//!
//! One connection per [`SqliteStorage`]. [`Storage::atomic`] opens the
//! outermost transaction with `BEGIN IMMEDIATE`, so the write lock is taken
//! before the next version number is read; nested calls use savepoints.

use std::cell::Cell;
use std::path::Path;
use std::time::Duration;

use parking_lot::ReentrantMutex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, trace, warn};
use verso_ast::{SelectQuery, Statement};
use verso_core::Storage;
use verso_error::{Result, VersoError};
use verso_types::{RecordId, Row, SqlValue};

/// Busy timeout applied to every new connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

struct Inner {
    conn: Connection,
    /// Open transaction levels: 0 outside a transaction, 1 inside the
    /// outermost one, one more per savepoint.
    depth: Cell<usize>,
}

/// [`Storage`] backed by a single SQLite connection.
///
/// The connection sits behind a re-entrant lock held for the whole of an
/// [`atomic`](Storage::atomic) call, so other threads sharing the storage
/// wait for the transaction instead of interleaving with it.
pub struct SqliteStorage {
    inner: ReentrantMutex<Inner>,
}

impl SqliteStorage {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(target: "verso.sqlite", path = %path.display(), "opening database");
        Self::from_connection(Connection::open(path).map_err(VersoError::storage)?)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory().map_err(VersoError::storage)?)
    }

    /// Wrap an existing connection, applying [`DEFAULT_BUSY_TIMEOUT`].
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)
            .map_err(VersoError::storage)?;
        Ok(Self {
            inner: ReentrantMutex::new(Inner {
                conn,
                depth: Cell::new(0),
            }),
        })
    }

    /// How long a statement waits for another connection's lock before
    /// failing with a busy error.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.inner
            .lock()
            .conn
            .busy_timeout(timeout)
            .map_err(VersoError::storage)
    }

    /// Run raw SQL, typically DDL.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        trace!(target: "verso.sqlite", sql, "execute batch");
        self.inner
            .lock()
            .conn
            .execute_batch(sql)
            .map_err(VersoError::storage)
    }

    /// Whether an [`atomic`](Storage::atomic) call is in progress on this
    /// thread's view of the connection.
    pub fn in_transaction(&self) -> bool {
        self.inner.lock().depth.get() > 0
    }
}

impl Storage for SqliteStorage {
    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        let (sql, params) = query.sql();
        trace!(target: "verso.sqlite", %sql, params = params.len(), "select");
        let inner = self.inner.lock();
        let mut stmt = inner
            .conn
            .prepare_cached(&sql)
            .map_err(VersoError::storage)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
        let rows = stmt
            .query_map(params_from_iter(params.iter().map(to_sqlite)), |row| {
                let mut out = Row::new();
                for (i, name) in names.iter().enumerate() {
                    out.insert(name.clone(), from_sqlite(row.get::<_, Value>(i)?));
                }
                Ok(out)
            })
            .map_err(VersoError::storage)?;
        let rows = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(VersoError::storage)?;
        Ok(rows)
    }

    fn execute(&self, statement: &Statement) -> Result<usize> {
        let (sql, params) = statement.sql();
        trace!(target: "verso.sqlite", %sql, params = params.len(), "execute");
        let inner = self.inner.lock();
        let mut stmt = inner
            .conn
            .prepare_cached(&sql)
            .map_err(VersoError::storage)?;
        stmt.execute(params_from_iter(params.iter().map(to_sqlite)))
            .map_err(VersoError::storage)
    }

    fn last_insert_id(&self) -> Result<RecordId> {
        let raw = self.inner.lock().conn.last_insert_rowid();
        RecordId::new(raw)
            .map_err(|_| VersoError::storage_msg(format!("no row id after insert (got {raw})")))
    }

    fn atomic<T, F>(&self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<T>,
    {
        let inner = self.inner.lock();
        let tx = Transaction::begin(&inner)?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }
}

// ─── Transactions ────────────────────────────────────────────────────────

/// RAII transaction level. Rolled back on drop unless committed.
struct Transaction<'a> {
    inner: &'a Inner,
    depth: usize,
    committed: bool,
}

impl<'a> Transaction<'a> {
    fn begin(inner: &'a Inner) -> Result<Self> {
        let depth = inner.depth.get();
        let sql = if depth == 0 {
            "BEGIN IMMEDIATE".to_owned()
        } else {
            format!("SAVEPOINT {}", savepoint_name(depth))
        };
        inner.conn.execute_batch(&sql).map_err(VersoError::storage)?;
        inner.depth.set(depth + 1);
        debug!(target: "verso.sqlite", depth, "transaction opened");
        Ok(Self {
            inner,
            depth,
            committed: false,
        })
    }

    fn commit(mut self) -> Result<()> {
        let sql = if self.depth == 0 {
            "COMMIT".to_owned()
        } else {
            format!("RELEASE SAVEPOINT {}", savepoint_name(self.depth))
        };
        self.inner
            .conn
            .execute_batch(&sql)
            .map_err(VersoError::storage)?;
        self.committed = true;
        debug!(target: "verso.sqlite", depth = self.depth, "transaction committed");
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let sql = if self.depth == 0 {
                "ROLLBACK".to_owned()
            } else {
                let name = savepoint_name(self.depth);
                format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}")
            };
            match self.inner.conn.execute_batch(&sql) {
                Ok(()) => debug!(target: "verso.sqlite", depth = self.depth, "transaction rolled back"),
                Err(error) => {
                    warn!(target: "verso.sqlite", depth = self.depth, %error, "rollback failed");
                }
            }
        }
        self.inner.depth.set(self.depth);
    }
}

fn savepoint_name(depth: usize) -> String {
    format!("verso_{depth}")
}

// ─── Value mapping ───────────────────────────────────────────────────────

fn to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(*i),
        SqlValue::Float(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Blob(b) => Value::Blob(b.clone()),
    }
}

fn from_sqlite(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(i),
        Value::Real(f) => SqlValue::Float(f),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Blob(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verso_ast::Expr;
    use verso_core::storage::insert;

    fn storage() -> SqliteStorage {
        let storage = SqliteStorage::open_in_memory().expect("open in-memory database");
        storage
            .execute_batch("CREATE TABLE t (ID INTEGER PRIMARY KEY, Name TEXT, Score REAL, Data BLOB);")
            .expect("create table");
        storage
    }

    fn insert_named(storage: &SqliteStorage, name: &str) -> Result<usize> {
        storage.execute(&insert("t", [("Name".to_owned(), SqlValue::from(name))]))
    }

    fn names(storage: &SqliteStorage) -> Vec<String> {
        let mut query = SelectQuery::from_table("t");
        query.select_field(Expr::bare("Name"), None);
        storage
            .select(&query)
            .expect("select")
            .iter()
            .filter_map(|row| row.get_text("Name").map(str::to_owned))
            .collect()
    }

    #[test]
    fn values_round_trip_through_sqlite() {
        let storage = storage();
        storage
            .execute(&insert(
                "t",
                [
                    ("Name".to_owned(), SqlValue::from("a")),
                    ("Score".to_owned(), SqlValue::Float(1.5)),
                    ("Data".to_owned(), SqlValue::Blob(vec![1, 2])),
                ],
            ))
            .expect("insert");
        let id = storage.last_insert_id().expect("row id");
        assert_eq!(id.get(), 1);

        let mut query = SelectQuery::from_table("t");
        query.select_field(Expr::bare("ID"), None);
        query.select_field(Expr::bare("Score"), Some("S"));
        query.select_field(Expr::bare("Data"), None);
        query.add_where(Expr::bare("Name").equals("a"));
        let row = storage.select_one(&query).expect("select").expect("row");
        assert_eq!(row.record_id(), Some(id));
        assert_eq!(row.get("S"), Some(&SqlValue::Float(1.5)));
        assert_eq!(row.get("Data"), Some(&SqlValue::Blob(vec![1, 2])));
    }

    #[test]
    fn failed_atomic_rolls_back() {
        let storage = storage();
        let result: Result<()> = storage.atomic(|s| {
            insert_named(s, "lost")?;
            Err(VersoError::internal("boom"))
        });
        assert!(result.is_err());
        assert!(names(&storage).is_empty());
        assert!(!storage.in_transaction());
    }

    #[test]
    fn nested_failure_keeps_outer_work() {
        let storage = storage();
        storage
            .atomic(|s| {
                insert_named(s, "outer")?;
                let inner: Result<()> = s.atomic(|s| {
                    insert_named(s, "inner")?;
                    Err(VersoError::internal("inner failed"))
                });
                assert!(inner.is_err());
                assert!(s.in_transaction());
                Ok(())
            })
            .expect("outer commits");
        assert_eq!(names(&storage), vec!["outer".to_owned()]);
    }

    #[test]
    fn storage_errors_pass_through() {
        let storage = storage();
        let err = storage
            .select(&SelectQuery::from_table("missing"))
            .expect_err("no such table");
        assert!(matches!(err, VersoError::Storage { source: Some(_), .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn last_insert_id_without_insert_is_an_error() {
        let storage = storage();
        assert!(storage.last_insert_id().is_err());
    }
}
