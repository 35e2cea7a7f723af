//! Multi-table mutation descriptor.
//!
//! A write to one logical record touches several physical tables (one per
//! class in the inheritance chain, plus the stage and history companions the
//! write pipeline adds). A [`Manipulation`] is the ordered list of those
//! per-table writes, with at most one entry per table.

use std::collections::BTreeMap;

use verso_types::{RecordId, SqlValue};

/// Kind of a per-table write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteCommand {
    Insert,
    /// Update by id; applied as an insert when no row exists yet.
    Update,
}

/// A write to a single physical table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableWrite {
    pub table: String,
    /// Class owning the table.
    pub class: String,
    pub command: WriteCommand,
    pub id: Option<RecordId>,
    pub fields: BTreeMap<String, SqlValue>,
}

impl TableWrite {
    pub fn new(table: impl Into<String>, class: impl Into<String>, command: WriteCommand) -> Self {
        Self {
            table: table.into(),
            class: class.into(),
            command,
            id: None,
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn with_field(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.fields.insert(column.into(), value.into());
        self
    }

    pub fn set_field(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        self.fields.insert(column.into(), value.into());
    }

    pub fn field(&self, column: &str) -> Option<&SqlValue> {
        self.fields.get(column)
    }

    pub fn remove_field(&mut self, column: &str) -> Option<SqlValue> {
        self.fields.remove(column)
    }

    /// The record id, from `id` or else from an `ID` field.
    pub fn record_id(&self) -> Option<RecordId> {
        self.id.or_else(|| {
            self.fields
                .get("ID")
                .and_then(|v| RecordId::new(v.to_integer()).ok())
        })
    }

    /// Copy of this write retargeted at another table.
    #[must_use]
    pub fn retarget(&self, table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..self.clone()
        }
    }
}

/// Ordered per-table writes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Manipulation {
    writes: Vec<TableWrite>,
}

impl Manipulation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a write. A write to a table already present replaces the existing
    /// entry in place.
    pub fn push(&mut self, write: TableWrite) {
        match self.writes.iter_mut().find(|w| w.table == write.table) {
            Some(existing) => *existing = write,
            None => self.writes.push(write),
        }
    }

    pub fn get(&self, table: &str) -> Option<&TableWrite> {
        self.writes.iter().find(|w| w.table == table)
    }

    pub fn get_mut(&mut self, table: &str) -> Option<&mut TableWrite> {
        self.writes.iter_mut().find(|w| w.table == table)
    }

    pub fn remove(&mut self, table: &str) -> Option<TableWrite> {
        let idx = self.writes.iter().position(|w| w.table == table)?;
        Some(self.writes.remove(idx))
    }

    pub fn contains(&self, table: &str) -> bool {
        self.get(table).is_some()
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.writes.iter().map(|w| w.table.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TableWrite> {
        self.writes.iter()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

impl IntoIterator for Manipulation {
    type Item = TableWrite;
    type IntoIter = std::vec::IntoIter<TableWrite>;

    fn into_iter(self) -> Self::IntoIter {
        self.writes.into_iter()
    }
}

impl<'a> IntoIterator for &'a Manipulation {
    type Item = &'a TableWrite;
    type IntoIter = std::slice::Iter<'a, TableWrite>;

    fn into_iter(self) -> Self::IntoIter {
        self.writes.iter()
    }
}

impl FromIterator<TableWrite> for Manipulation {
    fn from_iter<I: IntoIterator<Item = TableWrite>>(iter: I) -> Self {
        let mut m = Self::new();
        for write in iter {
            m.push(write);
        }
        m
    }
}
