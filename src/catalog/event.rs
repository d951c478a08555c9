//! # Catalog Events
//!
//! Layer lifecycle notifications, delivered as `"<OPERATION>:<layer_id>"`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::definition::LayerId;
use super::errors::{CatalogError, CatalogResult};

/// Kind of registry change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    /// Layer created
    Insert,
    /// Layer changed
    Update,
    /// Layer removed
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Insert => write!(f, "INSERT"),
            EventKind::Update => write!(f, "UPDATE"),
            EventKind::Delete => write!(f, "DELETE"),
        }
    }
}

impl FromStr for EventKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(EventKind::Insert),
            "UPDATE" => Ok(EventKind::Update),
            "DELETE" => Ok(EventKind::Delete),
            other => Err(CatalogError::UnknownOperation(other.to_string())),
        }
    }
}

/// One `{kind, key}` change to apply to the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEvent {
    pub kind: EventKind,
    pub layer_id: LayerId,
}

impl CatalogEvent {
    pub fn new(kind: EventKind, layer_id: LayerId) -> Self {
        Self { kind, layer_id }
    }

    /// Parses a notification payload
    pub fn parse(payload: &str) -> CatalogResult<Self> {
        let (operation, layer_id) = payload
            .split_once(':')
            .ok_or_else(|| CatalogError::MalformedEvent(payload.to_string()))?;

        Ok(Self {
            kind: operation.trim().parse()?,
            layer_id: layer_id.parse()?,
        })
    }
}

impl fmt::Display for CatalogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.layer_id)
    }
}
