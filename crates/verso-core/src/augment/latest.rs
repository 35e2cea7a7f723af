//! Latest-version-per-record reads.
//!
//! Both modes here pick, for every record, the highest `Version` among the
//! history rows passing some filter, using a `MAX(Version)` sub-select over
//! the base history table. The sub-select is attached either as an inner
//! join or as a correlated `Version = (SELECT MAX ...)` condition.

use tracing::debug;
use verso_ast::{Expr, SelectQuery, TableSource};
use verso_error::Result;
use verso_types::{Stage, Timestamp};

use super::history::versioned_core;
use super::{AugmentContext, Augmentor};
use crate::columns;

const LATEST_SUFFIX: &str = "_Latest";

/// Restrict `query` to the latest version of each record, considering only
/// history rows matching `filters` (written against `base_versions`).
fn restrict_to_latest(
    ctx: &AugmentContext<'_>,
    query: &mut SelectQuery,
    base_versions: &str,
    filters: Vec<Expr>,
) {
    let alias = format!("{base_versions}{LATEST_SUFFIX}");
    let record_id = |table: &str| Expr::column(table, columns::RECORD_ID);
    let version = |table: &str| Expr::column(table, columns::VERSION);

    let mut latest = SelectQuery::from_aliased(base_versions, &alias);
    for filter in filters {
        latest.add_where(filter.with_table_renamed(base_versions, &alias));
    }

    let single_row = query.limit().is_some_and(|limit| limit.limit == 1);
    if ctx.config.use_conditions_over_inner_joins || single_row {
        debug!(target: "verso.augment", single_row, "latest version as correlated condition");
        latest.select_field(Expr::max(version(&alias)), None);
        latest.add_where(record_id(&alias).equals(record_id(base_versions)));
        query.add_where(version(base_versions).equals(latest));
        return;
    }

    // Only a filter on the record id can move into the aggregate without
    // changing which row is the maximum.
    let promoted: Vec<Expr> = query
        .where_clause
        .iter()
        .filter(|term| filters_record_id_only(term, base_versions))
        .map(|term| term.with_table_renamed(base_versions, &alias))
        .collect();
    for term in promoted {
        latest.add_where(term);
    }
    latest.select_field(record_id(&alias), None);
    latest.select_field(Expr::max(version(&alias)), Some(columns::LATEST_VERSION));
    latest.add_group_by(record_id(&alias));

    query.add_inner_join(
        TableSource::Subquery(Box::new(latest)),
        Some(&alias),
        record_id(&alias)
            .equals(record_id(base_versions))
            .and(Expr::column(&alias, columns::LATEST_VERSION).equals(version(base_versions))),
    );
}

fn filters_record_id_only(term: &Expr, base_versions: &str) -> bool {
    if term.has_subquery() {
        return false;
    }
    let referenced = term.columns();
    !referenced.is_empty()
        && referenced
            .iter()
            .all(|column| column.is(base_versions, columns::RECORD_ID))
}

/// Moment and stage an archive read looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchivePoint {
    pub date: Timestamp,
    pub stage: Stage,
}

/// The version each record showed on a stage at a past moment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveAugmentor;

impl Augmentor for ArchiveAugmentor {
    type Payload = ArchivePoint;

    fn augment(&self, ctx: &AugmentContext<'_>, query: &mut SelectQuery, point: &ArchivePoint) -> Result<()> {
        let base_versions = versioned_core(ctx, query)?;
        let mut filters =
            vec![Expr::column(&base_versions, columns::LAST_EDITED).at_most(point.date)];
        if ctx.is_staged()? {
            filters.push(Expr::column(&base_versions, point.stage.history_flag()).equals(1_i64));
        }
        restrict_to_latest(ctx, query, &base_versions, filters);
        Ok(())
    }
}

/// The newest non-deleted version of every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestVersionsAugmentor;

impl Augmentor for LatestVersionsAugmentor {
    type Payload = ();

    fn augment(&self, ctx: &AugmentContext<'_>, query: &mut SelectQuery, _: &()) -> Result<()> {
        let base_versions = versioned_core(ctx, query)?;
        let not_deleted = Expr::column(&base_versions, columns::WAS_DELETED).equals(0_i64);
        restrict_to_latest(ctx, query, &base_versions, vec![not_deleted]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::augment;
    use crate::config::VersionedConfig;
    use crate::mode::VersionedMode;
    use crate::testing::fixture_schema;
    use verso_ast::FromItem;

    fn page_by_id(id: i64) -> SelectQuery {
        let mut q = SelectQuery::from_table("Page");
        q.select_field(Expr::column("Page", "Title"), None);
        q.add_where(Expr::column("Page", "ID").equals(id));
        q.add_where(Expr::column("Page", "Title").equals("Home"));
        q
    }

    fn latest_subselect(query: &SelectQuery) -> &SelectQuery {
        match query.from().last() {
            Some(FromItem {
                source: TableSource::Subquery(sub),
                ..
            }) => &**sub,
            other => panic!("expected a sub-select join, got {other:?}"),
        }
    }

    #[test]
    fn latest_versions_joins_max_per_record() {
        let schema = fixture_schema();
        let config = VersionedConfig::default();
        let ctx = AugmentContext::new(&schema, &config, "Page");
        let out = augment(&ctx, &page_by_id(5), &VersionedMode::LatestVersions).unwrap();

        assert_eq!(
            latest_subselect(&out).to_string(),
            r#"SELECT "Page_Versions_Latest"."RecordID", MAX("Page_Versions_Latest"."Version") AS "LatestVersion" FROM "Page_Versions" AS "Page_Versions_Latest" WHERE "Page_Versions_Latest"."WasDeleted" = 0 AND "Page_Versions_Latest"."RecordID" = 5 GROUP BY "Page_Versions_Latest"."RecordID""#
        );
        assert!(out.to_string().contains(
            r#"AS "Page_Versions_Latest" ON "Page_Versions_Latest"."RecordID" = "Page_Versions"."RecordID" AND "Page_Versions_Latest"."LatestVersion" = "Page_Versions"."Version""#
        ));
    }

    #[test]
    fn non_key_filters_are_not_promoted() {
        let schema = fixture_schema();
        let config = VersionedConfig::default();
        let ctx = AugmentContext::new(&schema, &config, "Page");
        let out = augment(&ctx, &page_by_id(5), &VersionedMode::LatestVersions).unwrap();
        let sub = latest_subselect(&out).to_string();
        assert!(!sub.contains("Title"));
        assert!(out.to_string().contains(r#""Page_Versions"."Title" = 'Home'"#));
    }

    #[test]
    fn archive_filters_date_and_stage_flag() {
        let schema = fixture_schema();
        let config = VersionedConfig::default();
        let ctx = AugmentContext::new(&schema, &config, "Page");
        let date = Timestamp::parse("2024-03-01 12:00:00").unwrap();
        let out = augment(
            &ctx,
            &SelectQuery::from_table("Page"),
            &VersionedMode::Archive {
                date,
                stage: Stage::Live,
            },
        )
        .unwrap();
        let sub = latest_subselect(&out).to_string();
        assert!(sub.contains(
            r#"WHERE "Page_Versions_Latest"."LastEdited" <= '2024-03-01 12:00:00' AND "Page_Versions_Latest"."WasPublished" = 1"#
        ));

        let notes = augment(
            &AugmentContext::new(&schema, &config, "Note"),
            &SelectQuery::from_table("Note"),
            &VersionedMode::Archive {
                date,
                stage: Stage::Live,
            },
        )
        .unwrap();
        assert!(!latest_subselect(&notes).to_string().contains("WasPublished"));
    }

    #[test]
    fn single_row_queries_use_the_condition_form() {
        let schema = fixture_schema();
        let config = VersionedConfig::default();
        let ctx = AugmentContext::new(&schema, &config, "Page");
        let mut query = page_by_id(5);
        query.set_limit(1, None);
        let out = augment(&ctx, &query, &VersionedMode::LatestVersions).unwrap();
        assert_eq!(out.from().len(), 1);
        assert!(out.to_string().contains(
            r#""Page_Versions"."Version" = (SELECT MAX("Page_Versions_Latest"."Version") FROM "Page_Versions" AS "Page_Versions_Latest" WHERE "Page_Versions_Latest"."WasDeleted" = 0 AND "Page_Versions_Latest"."RecordID" = "Page_Versions"."RecordID")"#
        ));
    }

    #[test]
    fn configured_condition_form_applies_everywhere() {
        let schema = fixture_schema();
        let config = VersionedConfig {
            use_conditions_over_inner_joins: true,
            ..VersionedConfig::default()
        };
        let ctx = AugmentContext::new(&schema, &config, "Page");
        let out = augment(&ctx, &page_by_id(5), &VersionedMode::LatestVersions).unwrap();
        assert_eq!(out.from().len(), 1);
        assert!(out.to_string().contains("= (SELECT MAX("));
    }
}
