//! Relational query and mutation abstraction for verso.
//!
//! This is the surface the versioning layer rewrites: a structured SELECT
//! whose source tables can be enumerated and renamed, whose WHERE/JOIN
//! clauses can be extended, and which renders to parameterized SQL. It also
//! carries the DML statements and the per-table mutation descriptor that the
//! write pipeline forks.
//!
//! It is deliberately not a general SQL grammar: only the shapes the
//! versioning rewrites and the storage backend need are representable.

mod display;
pub mod manipulation;
mod rewrite;

use verso_types::{RecordId, SqlValue, Timestamp, Version};

pub use manipulation::{Manipulation, TableWrite, WriteCommand};

// ---------------------------------------------------------------------------
// Column references
// ---------------------------------------------------------------------------

/// A possibly table-qualified column reference: `"Page"."Title"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
        }
    }

    pub fn bare(column: impl Into<String>) -> Self {
        Self {
            table: None,
            column: column.into(),
        }
    }

    /// Whether this reference is `table.column`.
    pub fn is(&self, table: &str, column: &str) -> bool {
        self.table.as_deref() == Some(table) && self.column == column
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    pub const fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

/// Right-hand side of an `IN` expression.
#[derive(Debug, Clone, PartialEq)]
pub enum InSet {
    List(Vec<Expr>),
    Subquery(Box<SelectQuery>),
}

/// Function call arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArgs {
    /// `count(*)`.
    Star,
    List(Vec<Expr>),
}

/// A scalar or boolean expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A bound value; rendered as a `?` placeholder.
    Value(SqlValue),
    Column(ColumnRef),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    In {
        expr: Box<Expr>,
        set: InSet,
        negated: bool,
    },
    Function {
        name: String,
        args: FunctionArgs,
        distinct: bool,
    },
    /// A scalar sub-select.
    Subquery(Box<SelectQuery>),
}

impl Expr {
    /// `"table"."column"`.
    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::Column(ColumnRef::qualified(table, column))
    }

    /// An unqualified `"column"`.
    pub fn bare(column: impl Into<String>) -> Self {
        Self::Column(ColumnRef::bare(column))
    }

    pub fn value(value: impl Into<SqlValue>) -> Self {
        Self::Value(value.into())
    }

    fn binary(self, op: BinaryOp, right: impl Into<Self>) -> Self {
        Self::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right.into()),
        }
    }

    #[must_use]
    pub fn equals(self, right: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Eq, right)
    }

    #[must_use]
    pub fn not_equals(self, right: impl Into<Self>) -> Self {
        self.binary(BinaryOp::NotEq, right)
    }

    #[must_use]
    pub fn less_than(self, right: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Lt, right)
    }

    #[must_use]
    pub fn at_most(self, right: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Le, right)
    }

    #[must_use]
    pub fn greater_than(self, right: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Gt, right)
    }

    #[must_use]
    pub fn at_least(self, right: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Ge, right)
    }

    #[must_use]
    pub fn and(self, right: impl Into<Self>) -> Self {
        self.binary(BinaryOp::And, right)
    }

    #[must_use]
    pub fn or(self, right: impl Into<Self>) -> Self {
        self.binary(BinaryOp::Or, right)
    }

    #[must_use]
    pub fn negated(self) -> Self {
        Self::Not(Box::new(self))
    }

    #[must_use]
    pub fn is_null(self) -> Self {
        Self::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    #[must_use]
    pub fn in_list<I, T>(self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Self>,
    {
        Self::In {
            expr: Box::new(self),
            set: InSet::List(values.into_iter().map(Into::into).collect()),
            negated: false,
        }
    }

    #[must_use]
    pub fn in_subquery(self, query: SelectQuery) -> Self {
        Self::In {
            expr: Box::new(self),
            set: InSet::Subquery(Box::new(query)),
            negated: false,
        }
    }

    #[must_use]
    pub fn not_in_subquery(self, query: SelectQuery) -> Self {
        Self::In {
            expr: Box::new(self),
            set: InSet::Subquery(Box::new(query)),
            negated: true,
        }
    }

    pub fn function(name: impl Into<String>, args: Vec<Self>) -> Self {
        Self::Function {
            name: name.into(),
            args: FunctionArgs::List(args),
            distinct: false,
        }
    }

    pub fn max(expr: Self) -> Self {
        Self::function("MAX", vec![expr])
    }

    pub fn count_star() -> Self {
        Self::Function {
            name: "COUNT".to_owned(),
            args: FunctionArgs::Star,
            distinct: false,
        }
    }

    pub fn count_distinct(expr: Self) -> Self {
        Self::Function {
            name: "COUNT".to_owned(),
            args: FunctionArgs::List(vec![expr]),
            distinct: true,
        }
    }

    /// Whether this is a `COUNT(DISTINCT ...)` call.
    pub fn is_count_distinct(&self) -> bool {
        matches!(self, Self::Function { name, distinct: true, .. } if name.eq_ignore_ascii_case("count"))
    }

    /// Split a conjunction into its terms.
    pub fn conjuncts(&self) -> Vec<&Self> {
        match self {
            Self::Binary {
                left,
                op: BinaryOp::And,
                right,
            } => {
                let mut terms = left.conjuncts();
                terms.extend(right.conjuncts());
                terms
            }
            other => vec![other],
        }
    }

    /// Every column referenced by this expression, excluding sub-selects.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Self::Column(c) => out.push(c),
            Self::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Self::Not(e) | Self::IsNull { expr: e, .. } => e.collect_columns(out),
            Self::In { expr, set, .. } => {
                expr.collect_columns(out);
                if let InSet::List(items) = set {
                    for item in items {
                        item.collect_columns(out);
                    }
                }
            }
            Self::Function {
                args: FunctionArgs::List(args),
                ..
            } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
            Self::Value(_) | Self::Function { .. } | Self::Subquery(_) => {}
        }
    }

    /// Whether this expression embeds a sub-select anywhere.
    pub fn has_subquery(&self) -> bool {
        match self {
            Self::Subquery(_)
            | Self::In {
                set: InSet::Subquery(_),
                ..
            } => true,
            Self::Binary { left, right, .. } => left.has_subquery() || right.has_subquery(),
            Self::Not(e) | Self::IsNull { expr: e, .. } => e.has_subquery(),
            Self::In { expr, set, .. } => {
                expr.has_subquery()
                    || matches!(set, InSet::List(items) if items.iter().any(Self::has_subquery))
            }
            Self::Function {
                args: FunctionArgs::List(args),
                ..
            } => args.iter().any(Self::has_subquery),
            Self::Value(_) | Self::Column(_) | Self::Function { .. } => false,
        }
    }
}

impl From<SqlValue> for Expr {
    fn from(v: SqlValue) -> Self {
        Self::Value(v)
    }
}

impl From<ColumnRef> for Expr {
    fn from(c: ColumnRef) -> Self {
        Self::Column(c)
    }
}

impl From<SelectQuery> for Expr {
    fn from(q: SelectQuery) -> Self {
        Self::Subquery(Box::new(q))
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Self::Value(SqlValue::Integer(v))
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Self::Value(SqlValue::from(v))
    }
}

impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        Self::Value(SqlValue::from(v))
    }
}

impl From<String> for Expr {
    fn from(v: String) -> Self {
        Self::Value(SqlValue::Text(v))
    }
}

impl From<RecordId> for Expr {
    fn from(v: RecordId) -> Self {
        Self::Value(v.into())
    }
}

impl From<Version> for Expr {
    fn from(v: Version) -> Self {
        Self::Value(v.into())
    }
}

impl From<Timestamp> for Expr {
    fn from(v: Timestamp) -> Self {
        Self::Value(v.into())
    }
}

// ---------------------------------------------------------------------------
// SELECT
// ---------------------------------------------------------------------------

/// A column in the SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultColumn {
    /// `*`: all columns from all tables.
    Star,
    /// `table.*`: all columns from a specific table.
    TableStar(String),
    /// `expr [AS alias]`.
    Expr { expr: Expr, alias: Option<String> },
}

impl ResultColumn {
    /// Name of the column in the result set, when it has one.
    pub fn output_name(&self) -> Option<&str> {
        match self {
            Self::Expr {
                alias: Some(alias), ..
            } => Some(alias),
            Self::Expr {
                expr: Expr::Column(c),
                alias: None,
            } => Some(&c.column),
            _ => None,
        }
    }
}

/// A FROM source.
#[derive(Debug, Clone, PartialEq)]
pub enum TableSource {
    Table(String),
    Subquery(Box<SelectQuery>),
}

/// Join operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
}

/// How a non-leading FROM item is joined; `on` terms are ANDed.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub on: Vec<Expr>,
}

/// One FROM item. The first item of a query is its base table and carries
/// no join.
#[derive(Debug, Clone, PartialEq)]
pub struct FromItem {
    pub source: TableSource,
    pub alias: Option<String>,
    pub join: Option<JoinSpec>,
}

impl FromItem {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            source: TableSource::Table(name.into()),
            alias: None,
            join: None,
        }
    }

    /// The physical table name, if the source is a table.
    pub fn table_name(&self) -> Option<&str> {
        match &self.source {
            TableSource::Table(name) => Some(name),
            TableSource::Subquery(_) => None,
        }
    }

    /// The name column references use for this item: its alias, else its
    /// table name.
    pub fn reference_name(&self) -> Option<&str> {
        self.alias.as_deref().or_else(|| self.table_name())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A single ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderingTerm {
    pub expr: Expr,
    pub direction: SortDirection,
}

impl OrderingTerm {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            direction: SortDirection::Desc,
        }
    }
}

/// `LIMIT n [OFFSET m]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LimitClause {
    pub limit: u64,
    pub offset: Option<u64>,
}

/// A structured SELECT.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub distinct: bool,
    pub columns: Vec<ResultColumn>,
    pub from: Vec<FromItem>,
    /// Conjunctive WHERE terms.
    pub where_clause: Vec<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderingTerm>,
    pub limit: Option<LimitClause>,
}

impl SelectQuery {
    /// `SELECT * FROM "table"`.
    pub fn from_table(table: impl Into<String>) -> Self {
        Self {
            from: vec![FromItem::table(table)],
            ..Self::default()
        }
    }

    /// `SELECT ... FROM "table" AS "alias"`.
    pub fn from_aliased(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            from: vec![FromItem {
                source: TableSource::Table(table.into()),
                alias: Some(alias.into()),
                join: None,
            }],
            ..Self::default()
        }
    }

    /// The FROM items in order; the first is the base table.
    pub fn from(&self) -> &[FromItem] {
        &self.from
    }

    /// Reference name of the base (first) FROM item.
    pub fn base_table(&self) -> Option<&str> {
        self.from.first().and_then(FromItem::reference_name)
    }

    /// Physical names of every table-backed FROM item, in order.
    pub fn query_tables(&self) -> Vec<String> {
        self.from
            .iter()
            .filter_map(FromItem::table_name)
            .map(str::to_owned)
            .collect()
    }

    /// Append a SELECT column.
    pub fn add_select(&mut self, column: ResultColumn) {
        self.columns.push(column);
    }

    /// Select `expr AS alias`, replacing any existing column with the same
    /// output name.
    pub fn select_field(&mut self, expr: Expr, alias: Option<&str>) {
        let column = ResultColumn::Expr {
            expr,
            alias: alias.map(str::to_owned),
        };
        let name = column.output_name().map(str::to_owned);
        if let Some(name) = name {
            if let Some(existing) = self
                .columns
                .iter_mut()
                .find(|c| c.output_name() == Some(name.as_str()))
            {
                *existing = column;
                return;
            }
        }
        self.columns.push(column);
    }

    /// AND a term onto the WHERE clause.
    pub fn add_where(&mut self, expr: Expr) {
        self.where_clause.push(expr);
    }

    pub fn add_inner_join(&mut self, source: TableSource, alias: Option<&str>, on: Expr) {
        self.add_join(JoinKind::Inner, source, alias, on);
    }

    pub fn add_left_join(&mut self, source: TableSource, alias: Option<&str>, on: Expr) {
        self.add_join(JoinKind::Left, source, alias, on);
    }

    fn add_join(&mut self, kind: JoinKind, source: TableSource, alias: Option<&str>, on: Expr) {
        self.from.push(FromItem {
            source,
            alias: alias.map(str::to_owned),
            join: Some(JoinSpec {
                kind,
                on: split_conjuncts(on),
            }),
        });
    }

    /// Replace the join condition of the item referenced as `reference`.
    /// A conjunction is stored term by term.
    ///
    /// Returns false when no joined item has that reference name.
    pub fn set_join_filter(&mut self, reference: &str, on: Expr) -> bool {
        match self
            .from
            .iter_mut()
            .find(|item| item.join.is_some() && item.reference_name() == Some(reference))
        {
            Some(FromItem {
                join: Some(join), ..
            }) => {
                join.on = split_conjuncts(on);
                true
            }
            _ => false,
        }
    }

    pub fn set_order_by(&mut self, terms: Vec<OrderingTerm>) {
        self.order_by = terms;
    }

    pub fn add_order_by(&mut self, term: OrderingTerm) {
        self.order_by.push(term);
    }

    pub fn add_group_by(&mut self, expr: Expr) {
        self.group_by.push(expr);
    }

    pub fn set_limit(&mut self, limit: u64, offset: Option<u64>) {
        self.limit = Some(LimitClause { limit, offset });
    }

    pub fn limit(&self) -> Option<LimitClause> {
        self.limit
    }

    /// Derive `SELECT COUNT(DISTINCT column)` over the same sources and
    /// filters. Ordering and limits are dropped.
    #[must_use]
    pub fn count_query(&self, column: Expr) -> Self {
        Self {
            distinct: false,
            columns: vec![ResultColumn::Expr {
                expr: Expr::count_distinct(column),
                alias: Some("Count".to_owned()),
            }],
            from: self.from.clone(),
            where_clause: self.where_clause.clone(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Render as parameterized SQL with `?` placeholders.
    pub fn sql(&self) -> (String, Vec<SqlValue>) {
        display::render_parameterized(|w| w.select(self))
    }
}

fn split_conjuncts(on: Expr) -> Vec<Expr> {
    on.conjuncts().into_iter().cloned().collect()
}

// ---------------------------------------------------------------------------
// DML
// ---------------------------------------------------------------------------

/// `INSERT INTO "table" (...) VALUES (...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    pub table: String,
    pub values: Vec<(String, SqlValue)>,
}

/// `UPDATE "table" SET ... WHERE ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    pub table: String,
    pub assignments: Vec<(String, SqlValue)>,
    pub where_clause: Vec<Expr>,
}

/// `DELETE FROM "table" WHERE ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    pub table: String,
    pub where_clause: Vec<Expr>,
}

/// A data-modifying statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Insert(InsertQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
}

impl Statement {
    /// The table the statement modifies.
    pub fn table(&self) -> &str {
        match self {
            Self::Insert(q) => &q.table,
            Self::Update(q) => &q.table,
            Self::Delete(q) => &q.table,
        }
    }

    /// Render as parameterized SQL with `?` placeholders.
    pub fn sql(&self) -> (String, Vec<SqlValue>) {
        display::render_parameterized(|w| w.statement(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_query() -> SelectQuery {
        let mut q = SelectQuery::from_table("Page");
        q.select_field(Expr::column("Page", "ID"), None);
        q.select_field(Expr::column("Page", "Title"), None);
        q.add_left_join(
            TableSource::Table("BlogPost".into()),
            None,
            Expr::column("BlogPost", "ID").equals(Expr::column("Page", "ID")),
        );
        q
    }

    #[test]
    fn select_field_replaces_same_output_name() {
        let mut q = page_query();
        q.select_field(Expr::column("Page", "RecordID"), Some("ID"));
        assert_eq!(q.columns.len(), 2);
        assert_eq!(q.columns[0].output_name(), Some("ID"));
        assert_eq!(
            q.columns[0],
            ResultColumn::Expr {
                expr: Expr::column("Page", "RecordID"),
                alias: Some("ID".into()),
            }
        );
    }

    #[test]
    fn set_join_filter_targets_joined_items_only() {
        let mut q = page_query();
        assert!(q.set_join_filter("BlogPost", Expr::value(1_i64)));
        assert_eq!(q.from[1].join.as_ref().unwrap().on, vec![Expr::value(1_i64)]);
        assert!(!q.set_join_filter("Page", Expr::value(1_i64)));
        assert!(!q.set_join_filter("Missing", Expr::value(1_i64)));

        let both = Expr::bare("a").equals(1_i64).and(Expr::bare("b").equals(2_i64));
        assert!(q.set_join_filter("BlogPost", both));
        assert_eq!(q.from[1].join.as_ref().unwrap().on.len(), 2);
        assert!(q.to_string().ends_with(r#"ON "a" = 1 AND "b" = 2"#));
    }

    #[test]
    fn query_tables_lists_physical_sources() {
        let mut q = page_query();
        q.add_inner_join(
            TableSource::Subquery(Box::new(SelectQuery::from_table("Other"))),
            Some("Sub"),
            Expr::value(true),
        );
        assert_eq!(q.query_tables(), vec!["Page".to_owned(), "BlogPost".to_owned()]);
        assert_eq!(q.base_table(), Some("Page"));
    }

    #[test]
    fn conjuncts_flatten_nested_and() {
        let e = Expr::bare("a")
            .equals(1_i64)
            .and(Expr::bare("b").equals(2_i64).and(Expr::bare("c").is_null()));
        assert_eq!(e.conjuncts().len(), 3);
        assert_eq!(e.columns().len(), 3);
        assert!(!e.has_subquery());
        let sub = Expr::bare("ID").in_subquery(SelectQuery::from_table("X"));
        assert!(Expr::bare("a").equals(1_i64).and(sub).has_subquery());
    }

    #[test]
    fn count_query_drops_ordering_and_limit() {
        let mut q = page_query();
        q.add_where(Expr::column("Page", "Title").equals("x"));
        q.set_order_by(vec![OrderingTerm::desc(Expr::column("Page", "ID"))]);
        q.set_limit(10, Some(5));
        let count = q.count_query(Expr::column("Page", "ID"));
        assert!(count.order_by.is_empty());
        assert!(count.limit().is_none());
        assert_eq!(count.where_clause.len(), 1);
        assert!(matches!(
            &count.columns[0],
            ResultColumn::Expr { expr, .. } if expr.is_count_distinct()
        ));
    }
}
