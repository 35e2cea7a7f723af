//! Query augmentation.
//!
//! [`augment`] takes an ordinary query over a class's main tables and
//! rewrites it for a [`VersionedMode`]: stage modes rename tables to their
//! stage companions, every other mode reads the `_Versions` history tables.
//! Each mode has one [`Augmentor`]; the dispatcher is a single match.

mod history;
mod latest;
mod stage;

use tracing::{debug, debug_span};
use verso_ast::{FromItem, SelectQuery};
use verso_error::Result;

use crate::config::VersionedConfig;
use crate::mode::VersionedMode;
use crate::schema::Schema;
use crate::topology::Topology;

pub use history::{AllVersionsAugmentor, LatestSingleAugmentor, SpecificVersionAugmentor};
pub use latest::{ArchiveAugmentor, ArchivePoint, LatestVersionsAugmentor};
pub use stage::{StageAugmentor, StageUniqueAugmentor};

/// What an augmentation needs to know besides the query itself.
#[derive(Debug, Clone, Copy)]
pub struct AugmentContext<'a> {
    pub schema: &'a Schema,
    pub config: &'a VersionedConfig,
    /// Class the query was built for.
    pub class: &'a str,
}

impl<'a> AugmentContext<'a> {
    pub const fn new(schema: &'a Schema, config: &'a VersionedConfig, class: &'a str) -> Self {
        Self {
            schema,
            config,
            class,
        }
    }

    pub const fn topology(&self) -> Topology<'a> {
        Topology::new(self.schema)
    }

    pub fn base_table(&self) -> Result<&'a str> {
        self.topology().base_table(self.class)
    }

    pub fn is_staged(&self) -> Result<bool> {
        self.schema.is_staged(self.class)
    }

    /// Distinct FROM tables of the class's tree, in FROM order. Sub-selects
    /// and tables outside the tree are never rewritten.
    pub(crate) fn versioned_sources(&self, query: &SelectQuery) -> Vec<String> {
        let topology = self.topology();
        let mut tables: Vec<String> = Vec::new();
        for name in query.from().iter().filter_map(FromItem::table_name) {
            if topology.is_versioned_table(name, self.class) && !tables.iter().any(|t| t == name) {
                tables.push(name.to_owned());
            }
        }
        tables
    }
}

/// One rewrite strategy, parameterized by the mode's payload.
pub trait Augmentor {
    type Payload;

    fn augment(
        &self,
        ctx: &AugmentContext<'_>,
        query: &mut SelectQuery,
        payload: &Self::Payload,
    ) -> Result<()>;
}

/// Rewrite `query` for `mode`, leaving the input untouched.
pub fn augment(
    ctx: &AugmentContext<'_>,
    query: &SelectQuery,
    mode: &VersionedMode,
) -> Result<SelectQuery> {
    let span = debug_span!(target: "verso.augment", "augment", class = ctx.class, mode = mode.name());
    let _enter = span.enter();

    let mut out = query.clone();
    match *mode {
        VersionedMode::Stage(stage) => StageAugmentor.augment(ctx, &mut out, &stage)?,
        VersionedMode::StageUnique(stage) => StageUniqueAugmentor.augment(ctx, &mut out, &stage)?,
        VersionedMode::Archive { date, stage } => {
            ArchiveAugmentor.augment(ctx, &mut out, &ArchivePoint { date, stage })?;
        }
        VersionedMode::LatestSingle(id) => LatestSingleAugmentor.augment(ctx, &mut out, &id)?,
        VersionedMode::LatestVersions => LatestVersionsAugmentor.augment(ctx, &mut out, &())?,
        VersionedMode::SpecificVersion(version) => {
            SpecificVersionAugmentor.augment(ctx, &mut out, &version)?;
        }
        VersionedMode::AllVersions => AllVersionsAugmentor.augment(ctx, &mut out, &())?,
    }
    debug!(target: "verso.augment", sql = %out, "query augmented");
    Ok(out)
}
