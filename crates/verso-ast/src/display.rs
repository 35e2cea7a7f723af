//! SQL rendering for queries and statements.
//!
//! A single writer produces both forms: parameterized SQL (values become `?`
//! and are collected in order) for execution, and inline SQL (values become
//! literals) for `Display`, which is what log lines and tests show.
//! Identifiers are always double-quoted.

#[allow(clippy::wildcard_imports)]
use crate::*;
use std::fmt;

pub(crate) struct SqlWriter {
    buf: String,
    params: Vec<SqlValue>,
    inline: bool,
}

/// Render with `?` placeholders, returning the SQL and its parameters.
pub(crate) fn render_parameterized(f: impl FnOnce(&mut SqlWriter)) -> (String, Vec<SqlValue>) {
    let mut w = SqlWriter {
        buf: String::new(),
        params: Vec::new(),
        inline: false,
    };
    f(&mut w);
    (w.buf, w.params)
}

fn render_inline(f: impl FnOnce(&mut SqlWriter)) -> String {
    let mut w = SqlWriter {
        buf: String::new(),
        params: Vec::new(),
        inline: true,
    };
    f(&mut w);
    w.buf
}

impl SqlWriter {
    fn push(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    fn ident(&mut self, name: &str) {
        self.buf.push('"');
        self.buf.push_str(&name.replace('"', "\"\""));
        self.buf.push('"');
    }

    fn value(&mut self, value: &SqlValue) {
        if self.inline {
            self.buf.push_str(&value.to_sql_literal());
        } else {
            self.buf.push('?');
            self.params.push(value.clone());
        }
    }

    fn comma_list<T>(&mut self, items: &[T], mut write_item: impl FnMut(&mut Self, &T)) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            write_item(self, item);
        }
    }

    fn conjunction(&mut self, terms: &[Expr]) {
        for (i, term) in terms.iter().enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            self.paren_if_logical(term);
        }
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn column_ref(&mut self, c: &ColumnRef) {
        if let Some(table) = &c.table {
            self.ident(table);
            self.push(".");
        }
        self.ident(&c.column);
    }

    fn paren_if_compound(&mut self, expr: &Expr) {
        if matches!(expr, Expr::Binary { .. } | Expr::Not(_) | Expr::In { .. }) {
            self.push("(");
            self.expr(expr);
            self.push(")");
        } else {
            self.expr(expr);
        }
    }

    fn paren_if_logical(&mut self, expr: &Expr) {
        if matches!(expr, Expr::Binary { op, .. } if op.is_logical()) {
            self.push("(");
            self.expr(expr);
            self.push(")");
        } else {
            self.expr(expr);
        }
    }

    pub(crate) fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Value(v) => self.value(v),
            Expr::Column(c) => self.column_ref(c),
            Expr::Binary { left, op, right } => {
                self.paren_if_compound(left);
                self.push(" ");
                self.push(op.as_str());
                self.push(" ");
                self.paren_if_compound(right);
            }
            Expr::Not(inner) => {
                self.push("NOT ");
                self.paren_if_compound(inner);
            }
            Expr::IsNull { expr, negated } => {
                self.paren_if_compound(expr);
                self.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Expr::In { expr, set, negated } => {
                self.paren_if_compound(expr);
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                match set {
                    InSet::List(items) => self.comma_list(items, Self::expr),
                    InSet::Subquery(q) => self.select(q),
                }
                self.push(")");
            }
            Expr::Function {
                name,
                args,
                distinct,
            } => {
                self.push(name);
                self.push("(");
                if *distinct {
                    self.push("DISTINCT ");
                }
                match args {
                    FunctionArgs::Star => self.push("*"),
                    FunctionArgs::List(items) => self.comma_list(items, Self::expr),
                }
                self.push(")");
            }
            Expr::Subquery(q) => {
                self.push("(");
                self.select(q);
                self.push(")");
            }
        }
    }

    // -----------------------------------------------------------------------
    // SELECT
    // -----------------------------------------------------------------------

    fn result_column(&mut self, column: &ResultColumn) {
        match column {
            ResultColumn::Star => self.push("*"),
            ResultColumn::TableStar(table) => {
                self.ident(table);
                self.push(".*");
            }
            ResultColumn::Expr { expr, alias } => {
                self.expr(expr);
                if let Some(alias) = alias {
                    self.push(" AS ");
                    self.ident(alias);
                }
            }
        }
    }

    fn from_item(&mut self, item: &FromItem, leading: bool) {
        match &item.join {
            Some(JoinSpec { kind, .. }) => self.push(match kind {
                JoinKind::Inner => " INNER JOIN ",
                JoinKind::Left => " LEFT JOIN ",
            }),
            None if !leading => self.push(", "),
            None => {}
        }
        match &item.source {
            TableSource::Table(name) => self.ident(name),
            TableSource::Subquery(q) => {
                self.push("(");
                self.select(q);
                self.push(")");
            }
        }
        if let Some(alias) = &item.alias {
            self.push(" AS ");
            self.ident(alias);
        }
        if let Some(join) = &item.join {
            self.push(" ON ");
            if join.on.is_empty() {
                self.push("1");
            } else {
                self.conjunction(&join.on);
            }
        }
    }

    pub(crate) fn select(&mut self, q: &SelectQuery) {
        self.push("SELECT ");
        if q.distinct {
            self.push("DISTINCT ");
        }
        if q.columns.is_empty() {
            self.push("*");
        } else {
            self.comma_list(&q.columns, Self::result_column);
        }
        if !q.from.is_empty() {
            self.push(" FROM ");
            for (i, item) in q.from.iter().enumerate() {
                self.from_item(item, i == 0);
            }
        }
        if !q.where_clause.is_empty() {
            self.push(" WHERE ");
            self.conjunction(&q.where_clause);
        }
        if !q.group_by.is_empty() {
            self.push(" GROUP BY ");
            self.comma_list(&q.group_by, Self::expr);
        }
        if !q.order_by.is_empty() {
            self.push(" ORDER BY ");
            self.comma_list(&q.order_by, |w, term| {
                w.expr(&term.expr);
                w.push(match term.direction {
                    SortDirection::Asc => " ASC",
                    SortDirection::Desc => " DESC",
                });
            });
        }
        if let Some(limit) = q.limit {
            self.push(&format!(" LIMIT {}", limit.limit));
            if let Some(offset) = limit.offset {
                self.push(&format!(" OFFSET {offset}"));
            }
        }
    }

    // -----------------------------------------------------------------------
    // DML
    // -----------------------------------------------------------------------

    fn where_suffix(&mut self, terms: &[Expr]) {
        if !terms.is_empty() {
            self.push(" WHERE ");
            self.conjunction(terms);
        }
    }

    pub(crate) fn statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Insert(q) => {
                self.push("INSERT INTO ");
                self.ident(&q.table);
                if q.values.is_empty() {
                    self.push(" DEFAULT VALUES");
                    return;
                }
                self.push(" (");
                self.comma_list(&q.values, |w, (column, _)| w.ident(column));
                self.push(") VALUES (");
                self.comma_list(&q.values, |w, (_, value)| w.value(value));
                self.push(")");
            }
            Statement::Update(q) => {
                self.push("UPDATE ");
                self.ident(&q.table);
                self.push(" SET ");
                self.comma_list(&q.assignments, |w, (column, value)| {
                    w.ident(column);
                    w.push(" = ");
                    w.value(value);
                });
                self.where_suffix(&q.where_clause);
            }
            Statement::Delete(q) => {
                self.push("DELETE FROM ");
                self.ident(&q.table);
                self.where_suffix(&q.where_clause);
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_inline(|w| w.expr(self)))
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_inline(|w| w.select(self)))
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_inline(|w| w.statement(self)))
    }
}
