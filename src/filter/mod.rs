//! Predicate Compiler
//!
//! Request filters (ids, bbox, datetime, property equality, CQL2-JSON
//! predicate tree, tile envelope, shard key) compiled into one conjunctive
//! SQL predicate, always scoped to the requested layer.
//!
//! Names in filters are the layer's exposed attribute names. A name that
//! does not resolve fails compilation; a filter is never silently dropped.

mod compiler;
mod errors;
mod expr;
mod spec;

pub use compiler::PredicateCompiler;
pub use errors::{FilterError, FilterResult};
pub use expr::{FilterNode, Literal, Operator};
pub use spec::{parse_bbox, DatetimeRange, FilterSpec};
