//! Declarative SQL builder
//!
//! Everything the service sends to PostgreSQL is assembled from these types
//! and rendered in one place. Values never appear in the SQL text: the
//! renderer turns each [`SqlValue`] into a positional `$n` parameter.
//!
//! # Pieces
//!
//! - [`Expr`]: column references, parameters, casts, function calls and
//!   boolean combinators
//! - [`Select`] / [`Query`]: one select, or several combined with `UNION ALL`
//! - [`Statement`]: rendered SQL text plus its bound parameters

mod expr;
mod query;
mod render;

pub use expr::{BinaryOp, Expr, SqlType, SqlValue};
pub use query::{OrderBy, Projection, Query, Select, TableRef};
pub use render::{quote_ident, Statement};
