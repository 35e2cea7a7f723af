//! Structural rewrites used by the versioning layer.

#[allow(clippy::wildcard_imports)]
use crate::*;

impl SelectQuery {
    /// Rename every use of table `old` to `new`.
    ///
    /// Renames table sources, aliases, `old.*` columns and every column
    /// reference qualified by `old`, recursing into sub-selects.
    pub fn rename_table(&mut self, old: &str, new: &str) {
        for item in &mut self.from {
            match &mut item.source {
                TableSource::Table(name) if name == old => *name = new.to_owned(),
                TableSource::Table(_) => {}
                TableSource::Subquery(q) => q.rename_table(old, new),
            }
            if item.alias.as_deref() == Some(old) {
                item.alias = Some(new.to_owned());
            }
            if let Some(join) = &mut item.join {
                for on in &mut join.on {
                    on.rename_table(old, new);
                }
            }
        }
        for column in &mut self.columns {
            match column {
                ResultColumn::TableStar(table) if table == old => *table = new.to_owned(),
                ResultColumn::Expr { expr, .. } => expr.rename_table(old, new),
                _ => {}
            }
        }
        for expr in self
            .where_clause
            .iter_mut()
            .chain(self.group_by.iter_mut())
            .chain(self.order_by.iter_mut().map(|t| &mut t.expr))
        {
            expr.rename_table(old, new);
        }
    }

    /// Apply `f` to every column reference of this query level.
    ///
    /// Sub-selects are left alone. With `skip_count_distinct`, the arguments
    /// of `COUNT(DISTINCT ...)` are left alone too. A selected column whose
    /// name changes keeps its original output name through an alias.
    pub fn map_columns(&mut self, skip_count_distinct: bool, f: &mut dyn FnMut(&mut ColumnRef)) {
        for column in &mut self.columns {
            if let ResultColumn::Expr { expr, alias } = column {
                match expr {
                    Expr::Column(c) if alias.is_none() => {
                        let original = c.column.clone();
                        f(c);
                        if c.column != original {
                            *alias = Some(original);
                        }
                    }
                    other => other.map_columns(skip_count_distinct, f),
                }
            }
        }
        for item in &mut self.from {
            if let Some(join) = &mut item.join {
                for on in &mut join.on {
                    on.map_columns(skip_count_distinct, f);
                }
            }
        }
        for expr in self
            .where_clause
            .iter_mut()
            .chain(self.group_by.iter_mut())
            .chain(self.order_by.iter_mut().map(|t| &mut t.expr))
        {
            expr.map_columns(skip_count_distinct, f);
        }
    }
}

impl Expr {
    /// Rename column qualifiers `old` to `new`, recursing into sub-selects.
    pub fn rename_table(&mut self, old: &str, new: &str) {
        match self {
            Self::Column(c) => {
                if c.table.as_deref() == Some(old) {
                    c.table = Some(new.to_owned());
                }
            }
            Self::Binary { left, right, .. } => {
                left.rename_table(old, new);
                right.rename_table(old, new);
            }
            Self::Not(e) | Self::IsNull { expr: e, .. } => e.rename_table(old, new),
            Self::In { expr, set, .. } => {
                expr.rename_table(old, new);
                match set {
                    InSet::List(items) => {
                        for item in items {
                            item.rename_table(old, new);
                        }
                    }
                    InSet::Subquery(q) => q.rename_table(old, new),
                }
            }
            Self::Function { args, .. } => {
                if let FunctionArgs::List(items) = args {
                    for item in items {
                        item.rename_table(old, new);
                    }
                }
            }
            Self::Subquery(q) => q.rename_table(old, new),
            Self::Value(_) => {}
        }
    }

    /// Apply `f` to every column reference outside sub-selects.
    pub fn map_columns(&mut self, skip_count_distinct: bool, f: &mut dyn FnMut(&mut ColumnRef)) {
        if skip_count_distinct && self.is_count_distinct() {
            return;
        }
        match self {
            Self::Column(c) => f(c),
            Self::Binary { left, right, .. } => {
                left.map_columns(skip_count_distinct, f);
                right.map_columns(skip_count_distinct, f);
            }
            Self::Not(e) | Self::IsNull { expr: e, .. } => e.map_columns(skip_count_distinct, f),
            Self::In { expr, set, .. } => {
                expr.map_columns(skip_count_distinct, f);
                if let InSet::List(items) = set {
                    for item in items {
                        item.map_columns(skip_count_distinct, f);
                    }
                }
            }
            Self::Function { args, .. } => {
                if let FunctionArgs::List(items) = args {
                    for item in items {
                        item.map_columns(skip_count_distinct, f);
                    }
                }
            }
            Self::Value(_) | Self::Subquery(_) => {}
        }
    }

    /// Copy of this expression with qualifier `old` replaced by `new`.
    #[must_use]
    pub fn with_table_renamed(&self, old: &str, new: &str) -> Self {
        let mut copy = self.clone();
        copy.rename_table(old, new);
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tree_query() -> SelectQuery {
        let mut q = SelectQuery::from_table("Page");
        q.add_select(ResultColumn::TableStar("Page".into()));
        q.select_field(Expr::column("BlogPost", "Author"), None);
        q.add_left_join(
            TableSource::Table("BlogPost".into()),
            None,
            Expr::column("BlogPost", "ID").equals(Expr::column("Page", "ID")),
        );
        q.add_where(Expr::column("Page", "ID").in_subquery({
            let mut s = SelectQuery::from_table("Page");
            s.select_field(Expr::column("Page", "ID"), None);
            s
        }));
        q.set_order_by(vec![OrderingTerm::asc(Expr::column("Page", "Title"))]);
        q
    }

    #[test]
    fn rename_is_structural_and_recursive() {
        let mut q = tree_query();
        q.rename_table("Page", "Page_Live");
        assert_eq!(
            q.to_string(),
            "SELECT \"Page_Live\".*, \"BlogPost\".\"Author\" FROM \"Page_Live\" \
             LEFT JOIN \"BlogPost\" ON \"BlogPost\".\"ID\" = \"Page_Live\".\"ID\" \
             WHERE \"Page_Live\".\"ID\" IN (SELECT \"Page_Live\".\"ID\" FROM \"Page_Live\") \
             ORDER BY \"Page_Live\".\"Title\" ASC"
        );
    }

    #[test]
    fn rename_does_not_touch_prefixed_names() {
        let mut q = SelectQuery::from_table("Page_Versions");
        q.add_where(Expr::column("Page_Versions", "Version").equals(2_i64));
        let before = q.clone();
        q.rename_table("Page", "Page_Live");
        assert_eq!(q, before);
    }

    #[test]
    fn map_columns_preserves_output_names() {
        let mut q = SelectQuery::from_table("Page_Versions");
        q.select_field(Expr::column("Page_Versions", "ID"), None);
        q.add_where(Expr::column("Page_Versions", "ID").equals(3_i64));
        let mut count = q.count_query(Expr::column("Page_Versions", "ID"));

        let mut to_record_id = |c: &mut ColumnRef| {
            if c.is("Page_Versions", "ID") {
                c.column = "RecordID".to_owned();
            }
        };
        q.map_columns(true, &mut to_record_id);
        count.map_columns(true, &mut to_record_id);

        assert_eq!(
            q.to_string(),
            "SELECT \"Page_Versions\".\"RecordID\" AS \"ID\" FROM \"Page_Versions\" \
             WHERE \"Page_Versions\".\"RecordID\" = 3"
        );
        assert_eq!(
            count.to_string(),
            "SELECT COUNT(DISTINCT \"Page_Versions\".\"ID\") AS \"Count\" FROM \"Page_Versions\" \
             WHERE \"Page_Versions\".\"RecordID\" = 3"
        );
    }

    proptest! {
        #[test]
        fn prop_renaming_absent_table_is_identity(name in "[A-Z][a-z]{2,8}") {
            prop_assume!(name != "Page" && name != "BlogPost");
            let mut q = tree_query();
            q.rename_table(&name, "Elsewhere");
            prop_assert_eq!(q, tree_query());
        }
    }
}
