//! Static schema metadata for versioned class trees.
//!
//! Classes form single-inheritance trees. Each tree has one base class whose
//! table holds the shared columns; every subclass with fields of its own has
//! a table keyed by the same `ID`. Subclasses without fields have no table.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use verso_error::{Result, VersoError};

use crate::columns;
use crate::config::VersionedConfig;

// ─── Serializable description ────────────────────────────────────────────

fn default_staged() -> bool {
    true
}

/// Description of one class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassSpec {
    pub name: String,
    /// Table name; defaults to the class name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Parent class; `None` for a base class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Columns owned by this class's table, excluding `ID`.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Whether the tree has Draft and Live stages. Only read on base classes;
    /// subclasses inherit it.
    #[serde(default = "default_staged")]
    pub staged: bool,
}

impl ClassSpec {
    pub fn base(name: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            table: None,
            parent: None,
            fields: fields.iter().map(|f| (*f).to_owned()).collect(),
            staged: true,
        }
    }

    pub fn subclass(name: impl Into<String>, parent: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            parent: Some(parent.into()),
            ..Self::base(name, fields)
        }
    }

    #[must_use]
    pub fn unstaged(mut self) -> Self {
        self.staged = false;
        self
    }

    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }
}

/// Description of every versioned class of a deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaSpec {
    pub classes: Vec<ClassSpec>,
}

impl SchemaSpec {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|error| VersoError::configuration(format!("schema decode error: {error}")))
    }
}

// ─── Extensions ──────────────────────────────────────────────────────────

/// A named add-on that may own extra tables of a class (for example
/// `Page_Localised`).
pub trait Extension: Send + Sync {
    fn name(&self) -> &str;

    /// The versionable-table capability, when the extension has one.
    fn as_versionable(&self) -> Option<&dyn VersionableExtension> {
        None
    }
}

/// Capability of an extension whose suffix tables are versioned alongside
/// the class's main tables.
pub trait VersionableExtension: Send + Sync {
    /// Whether `table` should be renamed to its stage and history companions.
    fn is_versioned_table(&self, table: &str) -> bool;
}

#[derive(Clone)]
struct SuffixBinding {
    suffix: String,
    extension: Arc<dyn Extension>,
}

impl fmt::Debug for SuffixBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuffixBinding")
            .field("suffix", &self.suffix)
            .field("extension", &self.extension.name())
            .finish()
    }
}

// ─── Resolved schema ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct ClassInfo {
    table: String,
    parent: Option<String>,
    base: String,
    fields: Vec<String>,
    staged: bool,
    order: usize,
}

/// Validated schema metadata.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    classes: BTreeMap<String, ClassInfo>,
    tables: BTreeMap<String, String>,
    suffixes: Vec<SuffixBinding>,
}

impl Schema {
    /// Build a schema with no extensions.
    pub fn new(spec: &SchemaSpec) -> Result<Self> {
        Self::build(spec, &VersionedConfig::default(), &[])
    }

    /// Build and validate a schema.
    ///
    /// Every extension named in `config.versionable_extensions` must be
    /// registered and must expose the versionable capability.
    pub fn build(
        spec: &SchemaSpec,
        config: &VersionedConfig,
        extensions: &[Arc<dyn Extension>],
    ) -> Result<Self> {
        let mut declared: BTreeMap<&str, &ClassSpec> = BTreeMap::new();
        for class in &spec.classes {
            if class.name.is_empty() {
                return Err(VersoError::configuration("class with empty name"));
            }
            if declared.insert(&class.name, class).is_some() {
                return Err(VersoError::configuration(format!(
                    "class {} declared twice",
                    class.name
                )));
            }
        }

        let mut classes = BTreeMap::new();
        for (order, class) in spec.classes.iter().enumerate() {
            let base = resolve_base(&declared, class)?;
            let staged = declared.get(base.as_str()).map_or(true, |b| b.staged);
            classes.insert(
                class.name.clone(),
                ClassInfo {
                    table: class.table.clone().unwrap_or_else(|| class.name.clone()),
                    parent: class.parent.clone(),
                    base,
                    fields: class.fields.clone(),
                    staged,
                    order,
                },
            );
        }

        let mut tables = BTreeMap::new();
        for (name, info) in &classes {
            let has_table = info.parent.is_none() || !info.fields.is_empty();
            if !has_table {
                continue;
            }
            if let Some(other) = tables.insert(info.table.clone(), name.clone()) {
                return Err(VersoError::configuration(format!(
                    "table {} is claimed by both {other} and {name}",
                    info.table
                )));
            }
        }

        let mut suffixes = Vec::new();
        for (name, table_suffixes) in &config.versionable_extensions {
            let extension = extensions
                .iter()
                .find(|e| e.name() == name.as_str())
                .ok_or_else(|| VersoError::UnknownExtension {
                    extension: name.clone(),
                })?;
            if extension.as_versionable().is_none() {
                return Err(VersoError::ExtensionNotVersionable {
                    extension: name.clone(),
                });
            }
            for suffix in table_suffixes {
                suffixes.push(SuffixBinding {
                    suffix: suffix.clone(),
                    extension: Arc::clone(extension),
                });
            }
        }

        Ok(Self {
            classes,
            tables,
            suffixes,
        })
    }

    fn info(&self, class: &str) -> Result<&ClassInfo> {
        self.classes
            .get(class)
            .ok_or_else(|| VersoError::unknown_class(class))
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    /// Table name of `class`, whether or not the table exists.
    pub fn table_name(&self, class: &str) -> Result<&str> {
        Ok(&self.info(class)?.table)
    }

    /// Root class of the tree `class` belongs to.
    pub fn base_data_class(&self, class: &str) -> Result<&str> {
        Ok(&self.info(class)?.base)
    }

    /// Table of the root class of the tree.
    pub fn base_table(&self, class: &str) -> Result<&str> {
        let base = self.base_data_class(class)?;
        self.table_name(base)
    }

    pub fn is_base_class(&self, class: &str) -> Result<bool> {
        Ok(self.info(class)?.parent.is_none())
    }

    /// Columns owned by the class's own table, excluding `ID`. Base classes
    /// also own `ClassName`, `Created` and `LastEdited`.
    pub fn database_fields(&self, class: &str) -> Result<Vec<String>> {
        let info = self.info(class)?;
        let mut fields = Vec::with_capacity(info.fields.len() + 3);
        if info.parent.is_none() {
            fields.extend(columns::BASE_FIELDS.iter().map(|f| (*f).to_owned()));
        }
        fields.extend(info.fields.iter().cloned());
        Ok(fields)
    }

    /// Whether the class has a table of its own.
    pub fn has_table(&self, class: &str) -> bool {
        self.classes
            .get(class)
            .is_some_and(|info| info.parent.is_none() || !info.fields.is_empty())
    }

    /// Whether the class's tree has Draft and Live stages.
    pub fn is_staged(&self, class: &str) -> Result<bool> {
        Ok(self.info(class)?.staged)
    }

    /// Class owning a main table.
    pub fn table_class(&self, table: &str) -> Option<&str> {
        self.tables.get(table).map(String::as_str)
    }

    /// Classes from the base down to `class`, inclusive.
    pub fn ancestry(&self, class: &str) -> Result<Vec<&str>> {
        let mut chain = Vec::new();
        let mut current = Some(class);
        while let Some(name) = current {
            let (key, info) = self
                .classes
                .get_key_value(name)
                .ok_or_else(|| VersoError::unknown_class(name))?;
            chain.push(key.as_str());
            current = info.parent.as_deref();
        }
        chain.reverse();
        Ok(chain)
    }

    /// Every descendant of `class`, in declaration order, excluding `class`.
    pub fn subclasses(&self, class: &str) -> Result<Vec<&str>> {
        self.info(class)?;
        let mut found: BTreeSet<&str> = BTreeSet::new();
        found.insert(class);
        let mut ordered: Vec<(&str, usize)> = Vec::new();
        let mut changed = true;
        while changed {
            changed = false;
            for (name, info) in &self.classes {
                if found.contains(name.as_str()) {
                    continue;
                }
                if info.parent.as_deref().is_some_and(|p| found.contains(p)) {
                    found.insert(name.as_str());
                    ordered.push((name.as_str(), info.order));
                    changed = true;
                }
            }
        }
        ordered.sort_by_key(|(_, order)| *order);
        Ok(ordered.into_iter().map(|(name, _)| name).collect())
    }

    /// Classes with a table that a query for `class` must touch: its
    /// ancestry followed by its descendants.
    pub fn query_classes(&self, class: &str) -> Result<Vec<&str>> {
        let mut out = self.ancestry(class)?;
        out.extend(self.subclasses(class)?);
        out.retain(|c| self.has_table(c));
        Ok(out)
    }

    /// Every class, in declaration order.
    pub fn classes(&self) -> Vec<&str> {
        let mut all: Vec<(&str, usize)> = self
            .classes
            .iter()
            .map(|(name, info)| (name.as_str(), info.order))
            .collect();
        all.sort_by_key(|(_, order)| *order);
        all.into_iter().map(|(name, _)| name).collect()
    }

    /// Whether a write to `table` on behalf of `class` can be versioned:
    /// `table` is the class's own main table or one of its versionable
    /// extension tables.
    pub fn is_versionable_write(&self, table: &str, class: &str) -> bool {
        self.has_table(class)
            && (self.table_class(table) == Some(class)
                || self.extension_table_class(table) == Some(class))
    }

    /// Resolve a table carrying a versionable extension suffix to the class
    /// owning the unsuffixed main table.
    pub(crate) fn extension_table_class(&self, table: &str) -> Option<&str> {
        self.suffixes.iter().find_map(|binding| {
            let main = table.strip_suffix(binding.suffix.as_str())?;
            let class = self.table_class(main)?;
            let versionable = binding.extension.as_versionable()?;
            versionable.is_versioned_table(table).then_some(class)
        })
    }
}

fn resolve_base(declared: &BTreeMap<&str, &ClassSpec>, class: &ClassSpec) -> Result<String> {
    let mut current = class;
    let mut seen = BTreeSet::new();
    while let Some(parent) = &current.parent {
        if !seen.insert(current.name.as_str()) {
            return Err(VersoError::configuration(format!(
                "inheritance cycle through {}",
                class.name
            )));
        }
        current = declared.get(parent.as_str()).ok_or_else(|| {
            VersoError::configuration(format!(
                "class {} extends unknown class {parent}",
                current.name
            ))
        })?;
    }
    Ok(current.name.clone())
}
