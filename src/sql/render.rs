//! Rendering of the expression tree into PostgreSQL text
//!
//! Rendering is deterministic: the same tree always yields the same SQL and
//! the same parameter order.

use std::fmt::Write;

use super::expr::{Expr, SqlValue};
use super::query::{Projection, Query, Select, TableRef};

/// Rendered SQL with positional parameters (`$1`, `$2`, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// Renders a full query
    pub fn render(query: &Query) -> Self {
        let mut writer = Writer::default();
        writer.query(query);
        writer.finish()
    }

    /// Renders a single select
    pub fn select(select: &Select) -> Self {
        let mut writer = Writer::default();
        writer.select(select);
        writer.finish()
    }

    /// Renders `SELECT <projection> FROM (<query>) AS <alias>`
    pub fn wrap(projection: &[Projection], query: &Query, alias: &str) -> Self {
        let mut writer = Writer::default();
        writer.push("SELECT ");
        writer.projection(projection);
        writer.push(" FROM (");
        writer.query(query);
        writer.push(") AS ");
        writer.push(&quote_ident(alias));
        writer.finish()
    }
}

/// Double-quotes an identifier, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[derive(Default)]
struct Writer {
    sql: String,
    params: Vec<SqlValue>,
}

impl Writer {
    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn param(&mut self, value: &SqlValue) {
        self.params.push(value.clone());
        let _ = write!(self.sql, "${}", self.params.len());
    }

    fn query(&mut self, query: &Query) {
        match query {
            Query::Select(select) => self.select(select),
            Query::UnionAll { parts, limit } => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        self.push(" UNION ALL ");
                    }
                    self.push("(");
                    self.select(part);
                    self.push(")");
                }
                if let Some(limit) = limit {
                    let _ = write!(self.sql, " LIMIT {}", limit);
                }
            }
        }
    }

    fn select(&mut self, select: &Select) {
        self.push("SELECT ");
        self.projection(&select.projection);
        self.push(" FROM ");
        self.table(&select.from);

        if let Some(filter) = &select.filter {
            self.push(" WHERE ");
            self.expr(filter);
        }

        if !select.group_by.is_empty() {
            self.push(" GROUP BY ");
            self.list(&select.group_by);
        }

        if !select.order_by.is_empty() {
            self.push(" ORDER BY ");
            for (i, order) in select.order_by.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.expr(&order.expr);
                self.push(if order.descending { " DESC" } else { " ASC" });
            }
        }

        if let Some(limit) = select.limit {
            let _ = write!(self.sql, " LIMIT {}", limit);
        }
    }

    fn projection(&mut self, projection: &[Projection]) {
        if projection.is_empty() {
            self.push("*");
            return;
        }
        for (i, item) in projection.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(&item.expr);
            if let Some(alias) = &item.alias {
                self.push(" AS ");
                self.push(&quote_ident(alias));
            }
        }
    }

    fn table(&mut self, table: &TableRef) {
        let qualified = format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name));
        self.push(&qualified);
    }

    fn list(&mut self, exprs: &[Expr]) {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(expr);
        }
    }

    fn joined(&mut self, exprs: &[Expr], separator: &str, empty: &str) {
        if exprs.is_empty() {
            self.push(empty);
            return;
        }
        self.push("(");
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            self.expr(expr);
        }
        self.push(")");
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Column(name) => self.push(&quote_ident(name)),
            Expr::Row(alias) => {
                let row = format!("{}.*", quote_ident(alias));
                self.push(&row);
            }
            Expr::Bool(true) => self.push("TRUE"),
            Expr::Bool(false) => self.push("FALSE"),
            Expr::Int(value) => {
                let _ = write!(self.sql, "{}", value);
            }
            Expr::Str(text) => {
                let literal = format!("'{}'", text.replace('\'', "''"));
                self.push(&literal);
            }
            Expr::Value(value) => self.param(value),
            Expr::Cast(inner, ty) => {
                self.push("CAST(");
                self.expr(inner);
                self.push(" AS ");
                self.push(ty.as_sql());
                self.push(")");
            }
            Expr::Func(name, args) => {
                self.push(name);
                self.push("(");
                self.list(args);
                self.push(")");
            }
            Expr::Binary(lhs, op, rhs) => {
                self.push("(");
                self.expr(lhs);
                self.push(" ");
                self.push(op.as_sql());
                self.push(" ");
                self.expr(rhs);
                self.push(")");
            }
            Expr::And(clauses) => self.joined(clauses, " AND ", "TRUE"),
            Expr::Or(clauses) => self.joined(clauses, " OR ", "FALSE"),
            Expr::Not(inner) => {
                self.push("(NOT ");
                self.expr(inner);
                self.push(")");
            }
            Expr::IsNull { expr, negated } => {
                self.push("(");
                self.expr(expr);
                self.push(if *negated { " IS NOT NULL)" } else { " IS NULL)" });
            }
            Expr::InList { expr, list, negated } => {
                if list.is_empty() {
                    self.push(if *negated { "TRUE" } else { "FALSE" });
                    return;
                }
                self.push("(");
                self.expr(expr);
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                self.list(list);
                self.push("))");
            }
            Expr::Any(lhs, rhs) => {
                self.push("(");
                self.expr(lhs);
                self.push(" = ANY(");
                self.expr(rhs);
                self.push("))");
            }
            Expr::Subscript(inner, index) => {
                self.push("(");
                self.expr(inner);
                let _ = write!(self.sql, ")[{}]", index);
            }
        }
    }
}
