//! Stage reads: point the query at one stage's tables.

use verso_ast::{Expr, SelectQuery};
use verso_error::Result;
use verso_types::Stage;

use super::{AugmentContext, Augmentor};
use crate::columns;

/// Renames every versioned table to its stage companion.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageAugmentor;

impl Augmentor for StageAugmentor {
    type Payload = Stage;

    fn augment(&self, ctx: &AugmentContext<'_>, query: &mut SelectQuery, stage: &Stage) -> Result<()> {
        if !ctx.is_staged()? {
            return Ok(());
        }
        let topology = ctx.topology();
        for table in ctx.versioned_sources(query) {
            let target = topology.stage_table(&table, *stage);
            if target != table {
                query.rename_table(&table, &target);
            }
        }
        Ok(())
    }
}

/// Stage read restricted to records absent from the other stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageUniqueAugmentor;

impl Augmentor for StageUniqueAugmentor {
    type Payload = Stage;

    fn augment(&self, ctx: &AugmentContext<'_>, query: &mut SelectQuery, stage: &Stage) -> Result<()> {
        StageAugmentor.augment(ctx, query, stage)?;
        if !ctx.is_staged()? {
            return Ok(());
        }
        let topology = ctx.topology();
        let base = ctx.base_table()?;
        let this = topology.stage_table(base, *stage);
        let other = topology.stage_table(base, stage.other());

        let mut elsewhere = SelectQuery::from_table(&other);
        elsewhere.select_field(Expr::column(&other, columns::ID), None);
        query.add_where(Expr::column(&this, columns::ID).not_in_subquery(elsewhere));
        Ok(())
    }
}
