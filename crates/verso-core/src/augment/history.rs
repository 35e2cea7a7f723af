//! History reads: the shared `_Versions` rewrite and the modes that need
//! nothing beyond it.

use verso_ast::{Expr, OrderingTerm, SelectQuery};
use verso_error::Result;
use verso_types::{RecordId, Version};

use super::{AugmentContext, Augmentor};
use crate::columns;
use crate::topology::history_table;

/// Point the query at the history tables.
///
/// Every versioned table `T` becomes `T_Versions`; joined subclass tables
/// are aligned on both `RecordID` and `Version` with the base history row.
/// The history columns are selected, `RecordID` is exposed as `ID`, and
/// tombstones are filtered out. Returns the base history table name.
pub(crate) fn versioned_core(ctx: &AugmentContext<'_>, query: &mut SelectQuery) -> Result<String> {
    let base = ctx.base_table()?;
    let base_versions = history_table(base);

    for table in ctx.versioned_sources(query) {
        let versions = history_table(&table);
        if table != base {
            let aligned = Expr::column(&versions, columns::RECORD_ID)
                .equals(Expr::column(&base_versions, columns::RECORD_ID))
                .and(
                    Expr::column(&versions, columns::VERSION)
                        .equals(Expr::column(&base_versions, columns::VERSION)),
                );
            query.set_join_filter(&table, aligned);
        }
        query.rename_table(&table, &versions);
    }

    for column in columns::VERSIONS_TABLE_COLUMNS {
        query.select_field(Expr::column(&base_versions, column), Some(column));
    }
    query.select_field(
        Expr::column(&base_versions, columns::RECORD_ID),
        Some(columns::ID),
    );
    // COUNT(DISTINCT ...) keeps counting history rows by their own ID.
    query.map_columns(true, &mut |column| {
        if column.is(&base_versions, columns::ID) {
            column.column = columns::RECORD_ID.to_owned();
        }
    });
    query.add_where(Expr::column(&base_versions, columns::WAS_DELETED).equals(0_i64));
    Ok(base_versions)
}

/// One specific version.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecificVersionAugmentor;

impl Augmentor for SpecificVersionAugmentor {
    type Payload = Version;

    fn augment(&self, ctx: &AugmentContext<'_>, query: &mut SelectQuery, version: &Version) -> Result<()> {
        let base_versions = versioned_core(ctx, query)?;
        query.add_where(Expr::column(&base_versions, columns::VERSION).equals(*version));
        Ok(())
    }
}

/// Newest surviving history row of one record.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestSingleAugmentor;

impl Augmentor for LatestSingleAugmentor {
    type Payload = RecordId;

    fn augment(&self, ctx: &AugmentContext<'_>, query: &mut SelectQuery, id: &RecordId) -> Result<()> {
        let base_versions = versioned_core(ctx, query)?;
        query.add_where(Expr::column(&base_versions, columns::RECORD_ID).equals(*id));
        query.set_order_by(vec![OrderingTerm::desc(Expr::column(
            &base_versions,
            columns::VERSION,
        ))]);
        query.set_limit(1, None);
        Ok(())
    }
}

/// Full history, oldest first.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllVersionsAugmentor;

impl Augmentor for AllVersionsAugmentor {
    type Payload = ();

    fn augment(&self, ctx: &AugmentContext<'_>, query: &mut SelectQuery, _: &()) -> Result<()> {
        let base_versions = versioned_core(ctx, query)?;
        query.set_order_by(vec![OrderingTerm::asc(Expr::column(
            &base_versions,
            columns::VERSION,
        ))]);
        Ok(())
    }
}
