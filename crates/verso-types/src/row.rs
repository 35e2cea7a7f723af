//! Rows fetched from storage.

use std::collections::BTreeMap;

use crate::{RecordId, SqlValue, Version};

/// One result row, keyed by output column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, SqlValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column; a later column with the same name replaces the earlier.
    pub fn insert(&mut self, column: impl Into<String>, value: SqlValue) {
        self.values.insert(column.into(), value);
    }

    /// Builder form of [`Row::insert`].
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values.get(column)
    }

    /// Integer value of a column, `None` for NULL or a missing column.
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.values.get(column)? {
            SqlValue::Null => None,
            other => Some(other.to_integer()),
        }
    }

    pub fn get_text(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(SqlValue::as_text)
    }

    /// The `ID` column as a record id.
    pub fn record_id(&self) -> Option<RecordId> {
        self.get_i64("ID").and_then(|raw| RecordId::new(raw).ok())
    }

    /// The `Version` column; zero and NULL mean "no version".
    pub fn version(&self) -> Option<Version> {
        self.get_i64("Version").and_then(|raw| Version::new(raw).ok())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<String, SqlValue> {
        self.values
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
