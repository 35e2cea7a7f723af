//! The in-memory form of a versioned record.

use std::collections::BTreeMap;

use crate::{RecordId, Row, SqlValue, Version};

/// A record as seen by callers: its class, identity, the version it was
/// read at or last written as, and its field values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub class: String,
    pub id: Option<RecordId>,
    pub version: Option<Version>,
    pub fields: BTreeMap<String, SqlValue>,
}

impl Record {
    /// A new, unsaved record of `class`.
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<SqlValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&SqlValue> {
        self.fields.get(field)
    }

    pub fn get_text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(SqlValue::as_text)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        match self.fields.get(field)? {
            SqlValue::Null => None,
            other => Some(other.to_integer()),
        }
    }

    /// Build a record from a fetched row.
    ///
    /// `ClassName` decides the class when present (a base-class query may
    /// return subclass rows); `fallback_class` is used otherwise.
    pub fn from_row(row: Row, fallback_class: &str) -> Self {
        let id = row.record_id();
        let version = row.version();
        let class = row
            .get_text("ClassName")
            .filter(|c| !c.is_empty())
            .unwrap_or(fallback_class)
            .to_owned();
        let mut fields = row.into_map();
        fields.remove("ID");
        fields.remove("Version");
        Self {
            class,
            id,
            version,
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_row_splits_identity_from_fields() {
        let row = Row::new()
            .with("ID", 3_i64)
            .with("Version", 2_i64)
            .with("ClassName", "BlogPost")
            .with("Title", "Hello");
        let record = Record::from_row(row, "Page");
        assert_eq!(record.class, "BlogPost");
        assert_eq!(record.id.map(RecordId::get), Some(3));
        assert_eq!(record.version.map(Version::get), Some(2));
        assert_eq!(record.get_text("Title"), Some("Hello"));
        assert!(record.get("ID").is_none());
        assert!(record.get("Version").is_none());
    }

    #[test]
    fn missing_class_name_uses_fallback() {
        let record = Record::from_row(Row::new().with("ID", 1_i64), "Note");
        assert_eq!(record.class, "Note");
    }
}
