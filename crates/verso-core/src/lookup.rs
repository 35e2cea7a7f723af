//! Version-number lookups backed by the cache.

use tracing::debug;
use verso_ast::{Expr, SelectQuery};
use verso_error::Result;
use verso_types::{RecordId, Stage, Version};

use crate::cache::VersionCache;
use crate::columns;
use crate::config::VersionedConfig;
use crate::schema::Schema;
use crate::storage::Storage;
use crate::topology::Topology;

/// Resolves "which version does stage S show for record R".
pub struct VersionLookup<'a, S> {
    schema: &'a Schema,
    config: &'a VersionedConfig,
    storage: &'a S,
}

impl<'a, S: Storage> VersionLookup<'a, S> {
    pub const fn new(schema: &'a Schema, config: &'a VersionedConfig, storage: &'a S) -> Self {
        Self {
            schema,
            config,
            storage,
        }
    }

    fn stage_base_table(&self, class: &str, stage: Stage) -> Result<(String, String)> {
        let base_class = self.schema.base_data_class(class)?.to_owned();
        let topology = Topology::new(self.schema);
        let table = topology.stage_table(topology.base_table(class)?, stage);
        Ok((base_class, table))
    }

    /// Version shown by `stage` for `id`, `None` when the record is not on
    /// the stage.
    ///
    /// With `use_cache`, a cached answer (including a cached absence or a
    /// complete scope) is returned without touching storage. The looked-up
    /// value is always written back to the cache.
    pub fn version_number_by_stage(
        &self,
        cache: &mut VersionCache,
        class: &str,
        stage: Stage,
        id: RecordId,
        use_cache: bool,
    ) -> Result<Option<Version>> {
        let (base_class, table) = self.stage_base_table(class, stage)?;
        if use_cache && cache.has(&base_class, stage, id) {
            return Ok(cache.get(&base_class, stage, id));
        }
        let mut query = SelectQuery::from_table(&table);
        query.select_field(Expr::bare(columns::VERSION), None);
        query.add_where(Expr::bare(columns::ID).equals(id));
        let version = self
            .storage
            .select_one(&query)?
            .and_then(|row| row.version());
        cache.set(&base_class, stage, id, version);
        Ok(version)
    }

    /// Fill the cache for `stage` in one query.
    ///
    /// With `ids`, only those records are loaded and the ones not found are
    /// cached as absent. Without, every row is loaded and the scope is marked
    /// complete. A no-op when bulk pre-population is disabled or `ids` is
    /// empty.
    pub fn prepopulate(
        &self,
        cache: &mut VersionCache,
        class: &str,
        stage: Stage,
        ids: Option<&[RecordId]>,
    ) -> Result<()> {
        if !self.config.prepopulate_versionnumber_cache {
            return Ok(());
        }
        if ids.is_some_and(<[RecordId]>::is_empty) {
            return Ok(());
        }
        let (base_class, table) = self.stage_base_table(class, stage)?;
        let mut query = SelectQuery::from_table(&table);
        query.select_field(Expr::bare(columns::ID), None);
        query.select_field(Expr::bare(columns::VERSION), None);
        if let Some(ids) = ids {
            query.add_where(Expr::bare(columns::ID).in_list(ids.iter().copied()));
        }
        let rows = self.storage.select(&query)?;
        let mut found = 0_usize;
        for row in &rows {
            if let Some(id) = row.record_id() {
                cache.set(&base_class, stage, id, row.version());
                found += 1;
            }
        }
        match ids {
            Some(ids) => {
                for id in ids {
                    if !rows.iter().any(|row| row.record_id() == Some(*id)) {
                        cache.set(&base_class, stage, *id, None);
                    }
                }
            }
            None => cache.mark_complete(&base_class, stage),
        }
        debug!(target: "verso.cache", %base_class, %stage, found, "prepopulated version cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture_schema, ScriptedStorage};
    use verso_types::Row;

    fn id(raw: i64) -> RecordId {
        RecordId::new(raw).unwrap()
    }

    #[test]
    fn lookup_hits_storage_once_then_cache() {
        let schema = fixture_schema();
        let config = VersionedConfig::default();
        let storage = ScriptedStorage::new().with_rows(|_| vec![Row::new().with("Version", 4_i64)]);
        let lookup = VersionLookup::new(&schema, &config, &storage);
        let mut cache = VersionCache::new();

        let v = lookup
            .version_number_by_stage(&mut cache, "BlogPost", Stage::Live, id(1), true)
            .unwrap();
        assert_eq!(v, Some(Version::new(4).unwrap()));
        assert_eq!(
            storage.selects(),
            vec![r#"SELECT "Version" FROM "Page_Live" WHERE "ID" = 1"#.to_owned()]
        );

        lookup
            .version_number_by_stage(&mut cache, "Page", Stage::Live, id(1), true)
            .unwrap();
        assert_eq!(storage.selects().len(), 1);

        lookup
            .version_number_by_stage(&mut cache, "Page", Stage::Live, id(1), false)
            .unwrap();
        assert_eq!(storage.selects().len(), 2);
    }

    #[test]
    fn absent_record_is_cached_as_absent() {
        let schema = fixture_schema();
        let config = VersionedConfig::default();
        let storage = ScriptedStorage::new();
        let lookup = VersionLookup::new(&schema, &config, &storage);
        let mut cache = VersionCache::new();
        let v = lookup
            .version_number_by_stage(&mut cache, "Page", Stage::Draft, id(7), true)
            .unwrap();
        assert_eq!(v, None);
        assert!(cache.has("Page", Stage::Draft, id(7)));
    }

    #[test]
    fn prepopulate_all_marks_scope_complete() {
        let schema = fixture_schema();
        let config = VersionedConfig::default();
        let storage = ScriptedStorage::new().with_rows(|_| {
            vec![
                Row::new().with("ID", 1_i64).with("Version", 2_i64),
                Row::new().with("ID", 2_i64).with("Version", 5_i64),
            ]
        });
        let lookup = VersionLookup::new(&schema, &config, &storage);
        let mut cache = VersionCache::new();
        lookup.prepopulate(&mut cache, "Page", Stage::Live, None).unwrap();
        assert!(cache.is_complete("Page", Stage::Live));
        assert_eq!(cache.get("Page", Stage::Live, id(2)), Some(Version::new(5).unwrap()));

        let v = lookup
            .version_number_by_stage(&mut cache, "Page", Stage::Live, id(99), true)
            .unwrap();
        assert_eq!(v, None);
        assert_eq!(storage.selects().len(), 1);
    }

    #[test]
    fn prepopulate_ids_caches_missing_as_absent() {
        let schema = fixture_schema();
        let config = VersionedConfig::default();
        let storage = ScriptedStorage::new()
            .with_rows(|_| vec![Row::new().with("ID", 1_i64).with("Version", 3_i64)]);
        let lookup = VersionLookup::new(&schema, &config, &storage);
        let mut cache = VersionCache::new();
        lookup
            .prepopulate(&mut cache, "Page", Stage::Draft, Some(&[id(1), id(2)]))
            .unwrap();
        assert_eq!(
            storage.selects(),
            vec![r#"SELECT "ID", "Version" FROM "Page" WHERE "ID" IN (1, 2)"#.to_owned()]
        );
        assert!(cache.has("Page", Stage::Draft, id(2)));
        assert_eq!(cache.get("Page", Stage::Draft, id(2)), None);
        assert!(!cache.is_complete("Page", Stage::Draft));
    }

    #[test]
    fn prepopulate_is_a_no_op_when_disabled_or_empty() {
        let schema = fixture_schema();
        let config = VersionedConfig {
            prepopulate_versionnumber_cache: false,
            ..VersionedConfig::default()
        };
        let storage = ScriptedStorage::new();
        let mut cache = VersionCache::new();
        VersionLookup::new(&schema, &config, &storage)
            .prepopulate(&mut cache, "Page", Stage::Live, None)
            .unwrap();
        assert!(storage.selects().is_empty());

        let config = VersionedConfig::default();
        VersionLookup::new(&schema, &config, &storage)
            .prepopulate(&mut cache, "Page", Stage::Live, Some(&[]))
            .unwrap();
        assert!(storage.selects().is_empty());
        assert!(cache.is_empty());
    }
}
