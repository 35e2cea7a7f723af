//! Version-number cache.
//!
//! Maps (base class, stage, record id) to the version the stage row shows.
//! A cached 0 means "not on this stage". A scope marked complete answers
//! every miss with `None` without consulting storage.
//!
//! The cache is not synchronized; the session that owns it wraps it in a
//! lock.

use std::collections::HashMap;

use tracing::debug;
use verso_types::{RecordId, Stage, Version};

#[derive(Debug, Default)]
struct Scope {
    complete: bool,
    versions: HashMap<RecordId, i64>,
}

#[derive(Debug, Default)]
pub struct VersionCache {
    scopes: HashMap<String, HashMap<Stage, Scope>>,
}

impl VersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn scope(&self, base_class: &str, stage: Stage) -> Option<&Scope> {
        self.scopes.get(base_class)?.get(&stage)
    }

    fn scope_mut(&mut self, base_class: &str, stage: Stage) -> &mut Scope {
        self.scopes
            .entry(base_class.to_owned())
            .or_default()
            .entry(stage)
            .or_default()
    }

    /// Record the version shown by `stage` for `id`; `None` caches "absent".
    pub fn set(&mut self, base_class: &str, stage: Stage, id: RecordId, version: Option<Version>) {
        let raw = version.map_or(0, Version::get);
        self.scope_mut(base_class, stage).versions.insert(id, raw);
    }

    /// Cached version, or `None` when absent from the stage or not cached.
    ///
    /// Use [`VersionCache::has`] to tell the two apart.
    pub fn get(&self, base_class: &str, stage: Stage, id: RecordId) -> Option<Version> {
        let raw = *self.scope(base_class, stage)?.versions.get(&id)?;
        Version::new(raw).ok()
    }

    /// Whether [`VersionCache::get`] is authoritative for this key: either
    /// an entry exists or the scope is complete.
    pub fn has(&self, base_class: &str, stage: Stage, id: RecordId) -> bool {
        self.scope(base_class, stage).is_some_and(|scope| {
            let hit = scope.versions.contains_key(&id);
            if !hit && scope.complete {
                debug!(target: "verso.cache", base_class, %stage, %id, "miss answered by complete scope");
            }
            hit || scope.complete
        })
    }

    /// Mark every record of the scope as cached.
    pub fn mark_complete(&mut self, base_class: &str, stage: Stage) {
        self.scope_mut(base_class, stage).complete = true;
    }

    pub fn is_complete(&self, base_class: &str, stage: Stage) -> bool {
        self.scope(base_class, stage).is_some_and(|s| s.complete)
    }

    /// Drop one entry. The scope stops being complete, since the entry may
    /// now be stale in either direction.
    pub fn invalidate(&mut self, base_class: &str, stage: Stage, id: RecordId) {
        if let Some(scope) = self
            .scopes
            .get_mut(base_class)
            .and_then(|stages| stages.get_mut(&stage))
        {
            scope.versions.remove(&id);
            scope.complete = false;
        }
    }

    /// Forget everything.
    pub fn reset(&mut self) {
        self.scopes.clear();
    }

    /// Number of cached entries across all scopes.
    pub fn len(&self) -> usize {
        self.scopes
            .values()
            .flat_map(HashMap::values)
            .map(|scope| scope.versions.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
