//! Tile plans
//!
//! A plan is a list of sub-selects, a merge mode and a final wrap into one
//! encoded tile. It is built per request and dropped after the response.

use std::fmt;

use serde::Serialize;

use crate::catalog::LayerId;
use crate::sql::{Expr, Projection, Query, Select, SqlValue, Statement};
use crate::tiles::Tile;

/// Column holding the encoded geometry in every sub-select
pub const GEOMETRY_ALIAS: &str = "geom";

/// Alias of the merged row set inside the wrap
const ROWS_ALIAS: &str = "t";

/// How rows are retrieved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    Raw,
    /// One representative row per spatial bucket
    Clustered { resolution: u8 },
    /// One sub-select per shard key intersecting the tile
    Sharded { keys: Vec<i64> },
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Raw => write!(f, "raw"),
            Strategy::Clustered { resolution } => write!(f, "clustered(resolution={})", resolution),
            Strategy::Sharded { keys } => write!(f, "sharded({} keys)", keys.len()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    Single,
    UnionAll,
}

/// Final `ST_AsMVT` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileWrap {
    pub layer_name: String,
    pub extent: u32,
}

impl TileWrap {
    fn projection(&self) -> Projection {
        Projection::new(Expr::func(
            "ST_AsMVT",
            vec![
                Expr::Row(ROWS_ALIAS.to_string()),
                Expr::value(SqlValue::text(self.layer_name.as_str())),
                Expr::Int(i64::from(self.extent)),
                Expr::Str(GEOMETRY_ALIAS),
            ],
        ))
    }
}

/// Query plan for one tile
#[derive(Debug, Clone, PartialEq)]
pub struct TilePlan {
    pub layer_id: LayerId,
    pub tile: Tile,
    pub strategy: Strategy,
    pub subqueries: Vec<Select>,
    pub merge: MergeMode,
    /// Effective row limit
    pub limit: i64,
    pub wrap: TileWrap,
}

impl TilePlan {
    /// True when no sub-select can produce rows (sharded layer with no key
    /// under the tile)
    pub fn is_empty(&self) -> bool {
        self.subqueries.is_empty()
    }

    /// Row set fed into the wrap
    pub fn merged(&self) -> Option<Query> {
        match (self.merge, self.subqueries.as_slice()) {
            (_, []) => None,
            (MergeMode::Single, [single]) => Some(Query::Select(single.clone())),
            _ => Some(Query::UnionAll {
                parts: self.subqueries.clone(),
                limit: Some(self.limit),
            }),
        }
    }

    /// The single statement producing the encoded tile
    pub fn to_statement(&self) -> Option<Statement> {
        let merged = self.merged()?;
        Some(Statement::wrap(&[self.wrap.projection()], &merged, ROWS_ALIAS))
    }
}
