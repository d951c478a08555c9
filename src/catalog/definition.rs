//! Layer definitions built from registry rows
//!
//! The attribute mapping is resolved here, once per layer, into an ordered
//! list of typed columns. Requests only ever look columns up in that list.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::errors::{CatalogError, CatalogResult};
use crate::config::StorageLayout;
use crate::sql::{SqlType, TableRef};

/// Collection ids exposed to clients are `user_data.<hex layer id>`
pub const COLLECTION_PREFIX: &str = "user_data.";

/// Extent used when a layer has none stored
pub const WORLD_EXTENT: [f64; 4] = [-180.0, -90.0, 180.0, 90.0];

/// Unique layer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(Uuid);

impl LayerId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Client-facing collection id
    pub fn collection_id(&self) -> String {
        format!("{}{}", COLLECTION_PREFIX, self)
    }
}

impl From<Uuid> for LayerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for LayerId {
    type Err = CatalogError;

    /// Accepts hyphenated or simple UUIDs, with or without the collection prefix
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let raw = trimmed.strip_prefix(COLLECTION_PREFIX).unwrap_or(trimmed);
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| CatalogError::InvalidLayerId(s.to_string()))
    }
}

/// Geometry type of a spatial layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryType {
    Point,
    Line,
    Polygon,
}

impl GeometryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryType::Point => "point",
            GeometryType::Line => "line",
            GeometryType::Polygon => "polygon",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "point" => Some(GeometryType::Point),
            "line" => Some(GeometryType::Line),
            "polygon" => Some(GeometryType::Polygon),
            _ => None,
        }
    }
}

/// Semantic type of a mapped attribute, taken from the physical column prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Integer,
    BigInt,
    Float,
    Text,
    Boolean,
    Timestamp,
    Jsonb,
    IntegerArray,
    FloatArray,
    TextArray,
}

impl AttributeType {
    /// Derives the type from a physical column such as `integer_attr3`
    pub fn from_column(column: &str) -> Option<Self> {
        let prefix = column.split('_').next().unwrap_or_default();
        match prefix {
            "integer" => Some(AttributeType::Integer),
            "bigint" => Some(AttributeType::BigInt),
            "float" => Some(AttributeType::Float),
            "text" => Some(AttributeType::Text),
            "boolean" => Some(AttributeType::Boolean),
            "timestamp" => Some(AttributeType::Timestamp),
            "jsonb" => Some(AttributeType::Jsonb),
            "arrint" => Some(AttributeType::IntegerArray),
            "arrfloat" => Some(AttributeType::FloatArray),
            "arrtext" => Some(AttributeType::TextArray),
            _ => None,
        }
    }

    pub fn sql_type(&self) -> SqlType {
        match self {
            AttributeType::Integer => SqlType::Integer,
            AttributeType::BigInt => SqlType::BigInt,
            AttributeType::Float => SqlType::DoublePrecision,
            AttributeType::Text => SqlType::Text,
            AttributeType::Boolean => SqlType::Boolean,
            AttributeType::Timestamp => SqlType::Timestamp,
            AttributeType::Jsonb => SqlType::Jsonb,
            AttributeType::IntegerArray => SqlType::IntegerArray,
            AttributeType::FloatArray => SqlType::DoublePrecisionArray,
            AttributeType::TextArray => SqlType::TextArray,
        }
    }

    pub fn is_datetime(&self) -> bool {
        matches!(self, AttributeType::Timestamp)
    }
}

/// One mapped attribute: physical column, exposed name, semantic type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub column: String,
    pub name: String,
    pub kind: AttributeType,
}

/// Raw registry row
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRecord {
    pub id: Uuid,
    pub owner: Uuid,
    pub name: String,
    /// `{ "<physical column>": "<exposed name>" }`
    pub attribute_mapping: Value,
    pub geometry_type: Option<String>,
    pub extent: Option<[f64; 4]>,
    pub sharded: bool,
}

/// Immutable layer metadata as served from the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDefinition {
    pub id: LayerId,
    pub owner: Uuid,
    pub name: String,
    pub geometry_type: Option<GeometryType>,
    pub extent: [f64; 4],
    /// Ordered by physical column name
    pub attributes: Vec<Attribute>,
    pub sharded: bool,
}

impl LayerDefinition {
    /// Builds a definition from a registry row.
    ///
    /// Fails on unknown geometry types, unknown column prefixes, non-string
    /// exposed names and duplicate exposed names.
    pub fn from_record(record: &LayerRecord) -> CatalogResult<Self> {
        let geometry_type = match record.geometry_type.as_deref() {
            None => None,
            Some(raw) => Some(GeometryType::parse(raw).ok_or_else(|| {
                CatalogError::malformed(record.id, format!("unknown geometry type '{}'", raw))
            })?),
        };

        let attributes = Self::resolve_attributes(record)?;

        Ok(Self {
            id: LayerId::new(record.id),
            owner: record.owner,
            name: record.name.clone(),
            geometry_type,
            extent: record.extent.unwrap_or(WORLD_EXTENT),
            attributes,
            sharded: record.sharded,
        })
    }

    fn resolve_attributes(record: &LayerRecord) -> CatalogResult<Vec<Attribute>> {
        let mapping = match &record.attribute_mapping {
            Value::Null => return Ok(Vec::new()),
            Value::Object(mapping) => mapping,
            _ => {
                return Err(CatalogError::malformed(
                    record.id,
                    "attribute_mapping must be an object",
                ))
            }
        };

        let mut attributes = Vec::with_capacity(mapping.len());
        let mut seen = HashSet::new();

        for (column, exposed) in mapping {
            let name = exposed.as_str().ok_or_else(|| {
                CatalogError::malformed(
                    record.id,
                    format!("exposed name of '{}' is not a string", column),
                )
            })?;

            let kind = AttributeType::from_column(column).ok_or_else(|| {
                CatalogError::malformed(record.id, format!("unknown column type of '{}'", column))
            })?;

            if !seen.insert(name.to_string()) {
                return Err(CatalogError::malformed(
                    record.id,
                    format!("duplicate exposed name '{}'", name),
                ));
            }

            attributes.push(Attribute {
                column: column.clone(),
                name: name.to_string(),
                kind,
            });
        }

        attributes.sort_by(|a, b| a.column.cmp(&b.column));
        Ok(attributes)
    }

    /// Storage table name: `<geometry type>_<owner>` or `no_geometry_<owner>`
    pub fn locator(&self) -> String {
        let owner = self.owner.simple();
        match self.geometry_type {
            Some(geometry_type) => format!("{}_{}", geometry_type.as_str(), owner),
            None => format!("no_geometry_{}", owner),
        }
    }

    /// Fully qualified storage table
    pub fn table(&self, layout: &StorageLayout) -> TableRef {
        TableRef::new(layout.data_schema.clone(), self.locator())
    }

    pub fn collection_id(&self) -> String {
        self.id.collection_id()
    }

    /// Looks up an attribute by exposed name
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn datetime_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|a| a.kind.is_datetime())
    }

    pub fn has_geometry(&self) -> bool {
        self.geometry_type.is_some()
    }

    pub fn is_point(&self) -> bool {
        self.geometry_type == Some(GeometryType::Point)
    }
}
