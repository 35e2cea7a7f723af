//! Table topology: which physical table a class and stage resolve to.

use verso_error::Result;
use verso_types::Stage;

use crate::schema::Schema;

/// Suffix of a history table.
pub const VERSIONS_SUFFIX: &str = "_Versions";

/// History table companion of `table`.
pub fn history_table(table: &str) -> String {
    format!("{table}{VERSIONS_SUFFIX}")
}

/// Pure name resolution over schema metadata.
#[derive(Debug, Clone, Copy)]
pub struct Topology<'a> {
    schema: &'a Schema,
}

impl<'a> Topology<'a> {
    pub const fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Main table of the root class of `class`'s tree.
    pub fn base_table(&self, class: &str) -> Result<&'a str> {
        self.schema.base_table(class)
    }

    /// Class owning `table`: the class whose main table it is, or whose main
    /// table it extends through a versionable extension suffix.
    fn owning_class(&self, table: &str) -> Option<&'a str> {
        self.schema
            .table_class(table)
            .or_else(|| self.schema.extension_table_class(table))
    }

    /// Whether `table` is a main table (or versioned extension table) of a
    /// class in the same tree as `class`.
    ///
    /// Stage, history and unrelated join tables are never versioned tables.
    pub fn is_versioned_table(&self, table: &str, class: &str) -> bool {
        let Some(owner) = self.owning_class(table) else {
            return false;
        };
        match (
            self.schema.base_data_class(owner),
            self.schema.base_data_class(class),
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Table holding `stage` rows of `table`.
    ///
    /// Draft is the unsuffixed table. A tree without stages always resolves
    /// to the unsuffixed table.
    pub fn stage_table(&self, table: &str, stage: Stage) -> String {
        if stage.is_default() {
            return table.to_owned();
        }
        let staged = self
            .owning_class(table)
            .and_then(|class| self.schema.is_staged(class).ok())
            .unwrap_or(false);
        if staged {
            format!("{table}_{stage}")
        } else {
            table.to_owned()
        }
    }
}
