//! Shared fixtures for unit tests.

use std::sync::Arc;

use parking_lot::Mutex;
use verso_ast::{SelectQuery, Statement};
use verso_error::Result;
use verso_types::{RecordId, Row};

use crate::config::VersionedConfig;
use crate::schema::{ClassSpec, Extension, Schema, SchemaSpec, VersionableExtension};
use crate::storage::Storage;

/// `Page` (staged base) with `BlogPost` (fields) and `RedirectPage` (no
/// table) below it, and an unstaged `Note` tree.
pub(crate) fn fixture_spec() -> SchemaSpec {
    SchemaSpec {
        classes: vec![
            ClassSpec::base("Page", &["Title", "Content"]),
            ClassSpec::subclass("BlogPost", "Page", &["Author", "Summary"]),
            ClassSpec::subclass("RedirectPage", "Page", &[]),
            ClassSpec::base("Note", &["Body"]).unstaged(),
        ],
    }
}

pub(crate) fn fixture_schema() -> Schema {
    Schema::new(&fixture_spec()).unwrap()
}

/// Extension owning `<Table>_Localised` tables.
pub(crate) struct Localised {
    pub(crate) versionable: bool,
}

impl VersionableExtension for Localised {
    fn is_versioned_table(&self, table: &str) -> bool {
        table.ends_with("_Localised")
    }
}

impl Extension for Localised {
    fn name(&self) -> &str {
        "Localised"
    }

    fn as_versionable(&self) -> Option<&dyn VersionableExtension> {
        self.versionable.then_some(self as &dyn VersionableExtension)
    }
}

pub(crate) fn localised_config() -> VersionedConfig {
    let mut config = VersionedConfig::default();
    config
        .versionable_extensions
        .insert("Localised".to_owned(), vec!["_Localised".to_owned()]);
    config
}

/// The fixture tree with `Page_Localised` versioned by [`Localised`].
pub(crate) fn localised_schema() -> Schema {
    let extension: Arc<dyn Extension> = Arc::new(Localised { versionable: true });
    Schema::build(&fixture_spec(), &localised_config(), &[extension]).unwrap()
}

type RowScript = Box<dyn Fn(&SelectQuery) -> Vec<Row> + Send + Sync>;
type AffectedScript = Box<dyn Fn(&str) -> usize + Send + Sync>;

/// In-memory storage that answers selects from a script and records every
/// statement it is asked to run.
pub(crate) struct ScriptedStorage {
    rows: RowScript,
    affected: AffectedScript,
    next_id: i64,
    selects: Mutex<Vec<String>>,
    executed: Mutex<Vec<Statement>>,
}

impl ScriptedStorage {
    pub(crate) fn new() -> Self {
        Self {
            rows: Box::new(|_| Vec::new()),
            affected: Box::new(|_| 1),
            next_id: 1,
            selects: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_rows(
        mut self,
        rows: impl Fn(&SelectQuery) -> Vec<Row> + Send + Sync + 'static,
    ) -> Self {
        self.rows = Box::new(rows);
        self
    }

    /// Affected-row count per statement, keyed on its parameterized SQL.
    pub(crate) fn with_affected(
        mut self,
        affected: impl Fn(&str) -> usize + Send + Sync + 'static,
    ) -> Self {
        self.affected = Box::new(affected);
        self
    }

    /// Parameterized SQL of every executed statement.
    pub(crate) fn executed(&self) -> Vec<String> {
        self.executed.lock().iter().map(|s| s.sql().0).collect()
    }

    pub(crate) fn statements(&self) -> Vec<Statement> {
        self.executed.lock().clone()
    }

    /// Inline SQL of every select, in order.
    pub(crate) fn selects(&self) -> Vec<String> {
        self.selects.lock().clone()
    }
}

impl Storage for ScriptedStorage {
    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        self.selects.lock().push(query.to_string());
        Ok((self.rows)(query))
    }

    fn execute(&self, statement: &Statement) -> Result<usize> {
        let sql = statement.sql().0;
        self.executed.lock().push(statement.clone());
        Ok((self.affected)(&sql))
    }

    fn last_insert_id(&self) -> Result<RecordId> {
        RecordId::new(self.next_id)
    }

    fn atomic<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        f(self)
    }
}
