//! The versioned session: reads through the augmentation engine, writes
//! through the fork pipeline.

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, debug_span};
use verso_ast::manipulation::{Manipulation, TableWrite, WriteCommand};
use verso_ast::{Expr, OrderingTerm, SelectQuery, TableSource};
use verso_core::columns;
use verso_core::storage::{insert, Storage};
use verso_core::write::{build_tombstone, delete_statements};
use verso_core::{
    apply_manipulation, augment, augment_write, history_table, AugmentContext, ReadingMode,
    ReadingState, Schema, VersionCache, VersionLookup, VersionedConfig, VersionedMode,
    WriteContext,
};
use verso_error::{Result, VersoError};
use verso_types::{Clock, Record, RecordId, SqlValue, Stage, SystemClock, Timestamp, Version};

/// Whether a stage deletion records a tombstone in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tombstone {
    #[default]
    Record,
    /// Leave history untouched; the caller writes one tombstone itself.
    Defer,
}

/// A versioned session over one storage.
///
/// Owns the reading mode, the version-number cache and the acting member
/// id.
pub struct Versioned<S> {
    schema: Schema,
    config: VersionedConfig,
    storage: S,
    state: ReadingState,
    cache: Mutex<VersionCache>,
    actor: AtomicI64,
    clock: Box<dyn Clock>,
}

impl<S: Storage> Versioned<S> {
    /// Session starting in the configured default reading mode.
    pub fn new(schema: Schema, config: VersionedConfig, storage: S) -> Result<Self> {
        config.validate()?;
        let default = config.default_mode()?;
        Ok(Self {
            schema,
            config,
            storage,
            state: ReadingState::new(default),
            cache: Mutex::new(VersionCache::new()),
            actor: AtomicI64::new(0),
            clock: Box::new(SystemClock),
        })
    }

    /// Replace the clock used for `Created`/`LastEdited`.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &VersionedConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Member id stamped as author and publisher; 0 when nobody acts.
    pub fn actor(&self) -> i64 {
        self.actor.load(Ordering::Relaxed)
    }

    pub fn set_actor(&self, actor: i64) {
        self.actor.store(actor, Ordering::Relaxed);
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ─── Reading mode ────────────────────────────────────────────────────

    pub fn reading_mode(&self) -> ReadingMode {
        self.state.reading_mode()
    }

    pub fn set_reading_mode(&self, token: &str) -> Result<()> {
        self.state.set_reading_mode_token(token)
    }

    pub fn set_stage(&self, stage: Stage) {
        self.state.set_stage(stage);
    }

    pub fn set_reading_archived_date(&self, date: &str, stage: Stage) -> Result<()> {
        self.state.set_reading_archived_date(date, stage)
    }

    pub fn reset_reading_mode(&self) {
        self.state.reset();
    }

    /// Run `f` and restore the reading mode afterwards, whatever `f` did to
    /// it and however it exits.
    pub fn with_versioned_mode<T>(&self, f: impl FnOnce(&Self) -> T) -> T {
        self.state.with_versioned_mode(|_| f(self))
    }

    // ─── Version numbers ─────────────────────────────────────────────────

    /// The version-number cache. Hold the guard briefly; reads and writes
    /// of this session lock it too.
    pub fn cache(&self) -> MutexGuard<'_, VersionCache> {
        self.cache.lock()
    }

    /// Version `stage` shows for `id`, `None` when the record is not there.
    pub fn version_number_by_stage(
        &self,
        class: &str,
        stage: Stage,
        id: RecordId,
        use_cache: bool,
    ) -> Result<Option<Version>> {
        let lookup = VersionLookup::new(&self.schema, &self.config, &self.storage);
        lookup.version_number_by_stage(&mut self.cache.lock(), class, stage, id, use_cache)
    }

    /// Load the versions `stage` shows for `ids` (or for every record of the
    /// tree) in one query.
    pub fn prepopulate_version_number_cache(
        &self,
        class: &str,
        stage: Stage,
        ids: Option<&[RecordId]>,
    ) -> Result<()> {
        let lookup = VersionLookup::new(&self.schema, &self.config, &self.storage);
        lookup.prepopulate(&mut self.cache.lock(), class, stage, ids)
    }

    // ─── Reads ───────────────────────────────────────────────────────────

    /// Plain query over the main tables of `class`: the base table with
    /// every other table of the class's ancestry and descendants left
    /// joined on `ID`. Subclass queries are restricted by `ClassName`.
    pub fn base_query(&self, class: &str) -> Result<SelectQuery> {
        let base = self.schema.base_table(class)?;
        let mut query = SelectQuery::from_table(base);
        query.select_field(Expr::column(base, columns::ID), None);
        query.select_field(Expr::column(base, columns::VERSION), None);

        for owner in self.schema.query_classes(class)? {
            let table = self.schema.table_name(owner)?;
            if table != base {
                query.add_left_join(
                    TableSource::Table(table.to_owned()),
                    None,
                    Expr::column(table, columns::ID).equals(Expr::column(base, columns::ID)),
                );
            }
            for field in self.schema.database_fields(owner)? {
                query.select_field(Expr::column(table, field.as_str()), None);
            }
        }

        if !self.schema.is_base_class(class)? {
            let mut names = vec![class.to_owned()];
            names.extend(self.schema.subclasses(class)?.into_iter().map(str::to_owned));
            query.add_where(Expr::column(base, columns::CLASS_NAME).in_list(names));
        }
        query.set_order_by(vec![OrderingTerm::asc(Expr::column(base, columns::ID))]);
        Ok(query)
    }

    /// Build the query for `class`, let `refine` add filters, ordering or
    /// limits against the main table names, then rewrite it for `mode`.
    pub fn build_query(
        &self,
        class: &str,
        mode: &VersionedMode,
        refine: impl FnOnce(&mut SelectQuery),
    ) -> Result<SelectQuery> {
        let mut query = self.base_query(class)?;
        refine(&mut query);
        augment(&AugmentContext::new(&self.schema, &self.config, class), &query, mode)
    }

    /// Records of `class` as seen by `mode`.
    pub fn query(
        &self,
        class: &str,
        mode: &VersionedMode,
        refine: impl FnOnce(&mut SelectQuery),
    ) -> Result<Vec<Record>> {
        let query = self.build_query(class, mode, refine)?;
        let rows = self.storage.select(&query)?;
        Ok(rows
            .into_iter()
            .map(|row| Record::from_row(row, class))
            .collect())
    }

    /// Records of `class` in the current reading mode.
    pub fn get(&self, class: &str, refine: impl FnOnce(&mut SelectQuery)) -> Result<Vec<Record>> {
        let mode = self.reading_mode().to_versioned_mode();
        self.query(class, &mode, refine)
    }

    pub fn get_by_stage(
        &self,
        class: &str,
        stage: Stage,
        refine: impl FnOnce(&mut SelectQuery),
    ) -> Result<Vec<Record>> {
        self.query(class, &VersionedMode::Stage(stage), refine)
    }

    pub fn get_one_by_stage(&self, class: &str, stage: Stage, id: RecordId) -> Result<Option<Record>> {
        let base = self.schema.base_table(class)?.to_owned();
        Ok(self
            .query(class, &VersionedMode::Stage(stage), |q| {
                q.add_where(Expr::column(&base, columns::ID).equals(id));
                q.set_limit(1, None);
            })?
            .into_iter()
            .next())
    }

    /// One historic snapshot of `id`.
    pub fn get_version(&self, class: &str, id: RecordId, version: Version) -> Result<Option<Record>> {
        let base = self.schema.base_table(class)?.to_owned();
        Ok(self
            .query(class, &VersionedMode::SpecificVersion(version), |q| {
                q.add_where(Expr::column(&base, columns::ID).equals(id));
            })?
            .into_iter()
            .next())
    }

    /// Newest snapshot of `id`, whether or not it is on a stage.
    pub fn get_latest_version(&self, class: &str, id: RecordId) -> Result<Option<Record>> {
        Ok(self
            .query(class, &VersionedMode::LatestSingle(id), |_| {})?
            .into_iter()
            .next())
    }

    /// Newest snapshot of every record, deleted records included.
    pub fn get_including_deleted(
        &self,
        class: &str,
        refine: impl FnOnce(&mut SelectQuery),
    ) -> Result<Vec<Record>> {
        self.query(class, &VersionedMode::LatestVersions, refine)
    }

    /// Every snapshot of `id`, oldest first.
    pub fn get_all_versions(&self, class: &str, id: RecordId) -> Result<Vec<Record>> {
        let base = self.schema.base_table(class)?.to_owned();
        self.query(class, &VersionedMode::AllVersions, |q| {
            q.add_where(Expr::column(&base, columns::ID).equals(id));
        })
    }

    /// What `stage` showed at `date`.
    pub fn get_archived_at(
        &self,
        class: &str,
        date: Timestamp,
        stage: Stage,
        refine: impl FnOnce(&mut SelectQuery),
    ) -> Result<Vec<Record>> {
        self.query(class, &VersionedMode::Archive { date, stage }, refine)
    }

    /// Records on `stage` that are absent from the other stage.
    pub fn get_stage_unique(
        &self,
        class: &str,
        stage: Stage,
        refine: impl FnOnce(&mut SelectQuery),
    ) -> Result<Vec<Record>> {
        self.query(class, &VersionedMode::StageUnique(stage), refine)
    }

    /// Number of rows `mode` yields for `class`.
    pub fn count(
        &self,
        class: &str,
        mode: &VersionedMode,
        refine: impl FnOnce(&mut SelectQuery),
    ) -> Result<usize> {
        let base = self.schema.base_table(class)?;
        let mut query = self.base_query(class)?;
        refine(&mut query);
        let count = query.count_query(Expr::column(base, columns::ID));
        let count = augment(&AugmentContext::new(&self.schema, &self.config, class), &count, mode)?;
        let total = self
            .storage
            .select_one(&count)?
            .and_then(|row| row.get_i64("Count"))
            .unwrap_or(0);
        usize::try_from(total).map_err(|_| VersoError::internal(format!("negative count {total}")))
    }

    // ─── Writes ──────────────────────────────────────────────────────────

    /// Save `record` to the stage the reading mode writes to, forking a new
    /// history version. Unsaved records get an id first.
    ///
    /// On success the record carries its id, new version and timestamps.
    pub fn write(&self, record: &mut Record) -> Result<Option<Version>> {
        self.write_record(record, self.reading_mode().write_stage(), false)
    }

    /// [`Versioned::write`] on an explicit stage. The reading mode is never
    /// consulted or changed, so other threads keep reading where they were.
    pub fn write_to_stage(&self, record: &mut Record, stage: Stage) -> Result<Option<Version>> {
        self.write_record(record, stage, false)
    }

    /// Save without adding history; the stage row keeps its version.
    pub fn write_without_version(&self, record: &mut Record) -> Result<()> {
        self.write_record(record, self.reading_mode().write_stage(), true)
            .map(|_| ())
    }

    pub(crate) fn write_record(
        &self,
        record: &mut Record,
        stage: Stage,
        without_version: bool,
    ) -> Result<Option<Version>> {
        let base_class = self.schema.base_data_class(&record.class)?.to_owned();
        let now = self.clock.now();
        // Saved records without a known Created keep the stored one.
        let created = match record.get(columns::CREATED) {
            Some(value) if !value.is_null() => Some(value.clone()),
            _ if record.id.is_none() => Some(SqlValue::from(now)),
            _ => None,
        };
        let mut ctx = WriteContext::new(self.actor(), stage);
        if without_version {
            ctx = ctx.without_version();
        }

        let span = debug_span!(target: "verso.write", "write", class = %record.class, %stage);
        let _enter = span.enter();

        let snapshot = &*record;
        let (id, forked) = self.storage.atomic(|storage| {
            let id = match snapshot.id {
                Some(id) => id,
                None => self.allocate_id(storage, snapshot, now)?,
            };
            let manipulation = self.record_manipulation(snapshot, id, now, created.as_ref())?;
            let forked = augment_write(&self.schema, storage, manipulation, &ctx)?;
            apply_manipulation(storage, &forked.manipulation)?;
            Ok((id, forked))
        })?;

        let version = forked.version_for(id);
        {
            let mut cache = self.cache.lock();
            for stage in &forked.stages {
                match version {
                    Some(version) => cache.set(&base_class, *stage, id, Some(version)),
                    None => cache.invalidate(&base_class, *stage, id),
                }
            }
        }
        record.id = Some(id);
        if version.is_some() {
            record.version = version;
        }
        if let Some(created) = created {
            record.set(columns::CREATED, created);
        }
        record.set(columns::LAST_EDITED, now);
        record.set(columns::CLASS_NAME, record.class.clone());
        debug!(target: "verso.write", %id, version = ?version, "record written");
        Ok(version)
    }

    /// Claim an id with a bare base-table row. No history is written for
    /// it; the write that follows creates version 1.
    fn allocate_id(&self, storage: &S, record: &Record, now: Timestamp) -> Result<RecordId> {
        let base = self.schema.base_table(&record.class)?;
        storage.execute(&insert(
            base,
            [
                (columns::CLASS_NAME.to_owned(), SqlValue::from(record.class.as_str())),
                (columns::CREATED.to_owned(), SqlValue::from(now)),
                (columns::LAST_EDITED.to_owned(), SqlValue::from(now)),
            ],
        ))?;
        let id = storage.last_insert_id()?;
        debug!(target: "verso.write", table = base, %id, "id allocated");
        Ok(id)
    }

    /// One update per table of the record's ancestry, carrying the fields
    /// that table owns.
    fn record_manipulation(
        &self,
        record: &Record,
        id: RecordId,
        now: Timestamp,
        created: Option<&SqlValue>,
    ) -> Result<Manipulation> {
        let mut manipulation = Manipulation::new();
        for owner in self.schema.ancestry(&record.class)? {
            if !self.schema.has_table(owner) {
                continue;
            }
            let mut write = TableWrite::new(self.schema.table_name(owner)?, owner, WriteCommand::Update)
                .with_id(id);
            for column in self.schema.database_fields(owner)? {
                if let Some(value) = record.get(&column) {
                    write.set_field(column, value.clone());
                }
            }
            if self.schema.is_base_class(owner)? {
                write.set_field(columns::CLASS_NAME, record.class.as_str());
                if let Some(created) = created {
                    write.set_field(columns::CREATED, created.clone());
                }
                write.set_field(columns::LAST_EDITED, now);
            }
            manipulation.push(write);
        }
        Ok(manipulation)
    }

    /// Remove `record` from `stage`, recording a tombstone in history.
    pub fn delete_from_stage(&self, record: &Record, stage: Stage) -> Result<()> {
        self.delete_from_stage_with(record, stage, Tombstone::Record)
    }

    /// Remove `record` from `stage`. With [`Tombstone::Defer`] history is
    /// left alone.
    ///
    /// Classes without stages only have Draft, so any stage deletes there.
    pub fn delete_from_stage_with(&self, record: &Record, stage: Stage, tombstone: Tombstone) -> Result<()> {
        let stage = if self.schema.is_staged(&record.class)? {
            stage
        } else {
            Stage::Draft
        };
        let base_class = self.schema.base_data_class(&record.class)?.to_owned();
        let base_table = self.schema.base_table(&record.class)?;
        let id = record
            .id
            .ok_or_else(|| VersoError::missing_record_id(base_table))?;
        let now = self.clock.now();
        let actor = self.actor();

        self.storage.atomic(|storage| {
            for statement in delete_statements(&self.schema, &record.class, id, stage)? {
                storage.execute(&statement)?;
            }
            if tombstone == Tombstone::Record {
                let (manipulation, _) =
                    build_tombstone(&self.schema, storage, record, &[stage], actor, now)?;
                apply_manipulation(storage, &manipulation)?;
            }
            Ok(())
        })?;

        self.cache.lock().set(&base_class, stage, id, None);
        debug!(target: "verso.write", class = %record.class, %id, %stage, ?tombstone, "deleted from stage");
        Ok(())
    }

    /// Whether any history row exists for `id`, tombstones included.
    pub(crate) fn has_history(&self, class: &str, id: RecordId) -> Result<bool> {
        let versions = history_table(self.schema.base_table(class)?);
        let mut query = SelectQuery::from_table(&versions);
        query.select_field(Expr::bare(columns::RECORD_ID), None);
        query.add_where(Expr::bare(columns::RECORD_ID).equals(id));
        query.set_limit(1, None);
        Ok(self.storage.select_one(&query)?.is_some())
    }
}
