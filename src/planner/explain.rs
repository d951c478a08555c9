//! Human-readable tile plans
//!
//! Output is deterministic for a given plan, which keeps it usable in logs
//! and in the `explain` query parameter of the tile route.

use std::fmt;

use serde::Serialize;

use super::errors::TileError;
use super::plan::TilePlan;

/// Explain output for a tile request
#[derive(Debug, Clone, Serialize)]
pub struct ExplainPlan {
    pub accepted: bool,
    pub layer: Option<String>,
    pub tile: Option<String>,
    pub strategy: Option<String>,
    pub merge: Option<String>,
    pub limit: Option<i64>,
    /// Rendered sub-selects
    pub subqueries: Vec<String>,
    /// Final statement, absent for an empty plan
    pub statement: Option<String>,
    pub rejection_code: Option<String>,
    pub rejection_reason: Option<String>,
}

impl ExplainPlan {
    pub fn from_plan(plan: &TilePlan) -> Self {
        Self {
            accepted: true,
            layer: Some(plan.layer_id.collection_id()),
            tile: Some(plan.tile.to_string()),
            strategy: Some(plan.strategy.to_string()),
            merge: Some(format!("{:?}", plan.merge)),
            limit: Some(plan.limit),
            subqueries: plan
                .subqueries
                .iter()
                .map(|s| crate::sql::Statement::select(s).sql)
                .collect(),
            statement: plan.to_statement().map(|s| s.sql),
            rejection_code: None,
            rejection_reason: None,
        }
    }

    pub fn from_error(err: &TileError) -> Self {
        Self {
            accepted: false,
            layer: None,
            tile: None,
            strategy: None,
            merge: None,
            limit: None,
            subqueries: Vec::new(),
            statement: None,
            rejection_code: Some(err.code().to_string()),
            rejection_reason: Some(err.to_string()),
        }
    }
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== TILE PLAN ===")?;

        if self.accepted {
            writeln!(f, "Status: ACCEPTED")?;
            if let Some(layer) = &self.layer {
                writeln!(f, "Layer: {}", layer)?;
            }
            if let Some(tile) = &self.tile {
                writeln!(f, "Tile: {}", tile)?;
            }
            if let Some(strategy) = &self.strategy {
                writeln!(f, "Strategy: {}", strategy)?;
            }
            if let Some(merge) = &self.merge {
                writeln!(f, "Merge: {}", merge)?;
            }
            if let Some(limit) = self.limit {
                writeln!(f, "Limit: {}", limit)?;
            }
            if self.subqueries.is_empty() {
                writeln!(f, "Subqueries: none (empty tile)")?;
            } else {
                writeln!(f, "Subqueries:")?;
                for sql in &self.subqueries {
                    writeln!(f, "  - {}", sql)?;
                }
            }
        } else {
            writeln!(f, "Status: REJECTED")?;
            if let Some(code) = &self.rejection_code {
                writeln!(f, "Error Code: {}", code)?;
            }
            if let Some(reason) = &self.rejection_reason {
                writeln!(f, "Reason: {}", reason)?;
            }
        }

        Ok(())
    }
}

impl TilePlan {
    pub fn explain(&self) -> ExplainPlan {
        ExplainPlan::from_plan(self)
    }
}
