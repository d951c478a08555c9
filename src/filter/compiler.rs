//! Predicate compilation
//!
//! Turns a [`FilterSpec`] into one conjunctive [`Expr`] for a layer. The
//! result always starts with `TRUE` and the layer scoping clause, followed
//! by one clause per supplied criterion in a fixed order, so identical
//! inputs give identical SQL.

use serde_json::Value;

use super::errors::{FilterError, FilterResult};
use super::expr::{FilterNode, Literal, Operator};
use super::spec::{DatetimeRange, FilterSpec};
use crate::catalog::LayerDefinition;
use crate::config::StorageLayout;
use crate::sql::{BinaryOp, Expr, SqlType, SqlValue};
use crate::tiles::Tile;

/// Reference system of request coordinates (bbox, GeoJSON, tile envelopes)
const REQUEST_SRID: i32 = 4326;

/// Compiles filters against one layer
pub struct PredicateCompiler<'a> {
    layer: &'a LayerDefinition,
    layout: &'a StorageLayout,
}

impl<'a> PredicateCompiler<'a> {
    pub fn new(layer: &'a LayerDefinition, layout: &'a StorageLayout) -> Self {
        Self { layer, layout }
    }

    /// `layer_id = <layer uuid>`
    pub fn scope(&self) -> Expr {
        Expr::col(self.layout.scope_column.as_str())
            .eq(Expr::value(SqlValue::Uuid(self.layer.id.as_uuid())))
    }

    /// `ST_Intersects(<tile envelope in the column's SRID>, geom)`
    pub fn tile_clause(&self, tile: &Tile, geometry: &str) -> Expr {
        let bounds = tile.envelope();
        let segmentized = Expr::func(
            "ST_Segmentize",
            vec![Expr::envelope(bounds.to_array(), REQUEST_SRID), Expr::float(bounds.width())],
        );
        Expr::func(
            "ST_Intersects",
            vec![
                Expr::func(
                    "ST_Transform",
                    vec![segmentized, Expr::Int(i64::from(self.layout.srid))],
                ),
                Expr::col(geometry),
            ],
        )
    }

    /// Compiles every criterion of `spec`.
    ///
    /// `geometry` is the geometry column of this request; without one the
    /// bbox and tile criteria are skipped.
    pub fn compile(&self, spec: &FilterSpec, geometry: Option<&str>) -> FilterResult<Expr> {
        let mut clauses = vec![Expr::Bool(true), self.scope()];

        if let Some(ids) = spec.ids.as_deref().filter(|ids| !ids.is_empty()) {
            clauses.push(self.ids_clause(ids));
        }

        if !spec.properties.is_empty() {
            let mut equalities = Vec::with_capacity(spec.properties.len());
            for (name, value) in &spec.properties {
                equalities.push(self.property_clause(name, value)?);
            }
            clauses.push(Expr::and(equalities));
        }

        if let (Some(bbox), Some(geometry)) = (spec.bbox, geometry) {
            clauses.push(Expr::func(
                "ST_Intersects",
                vec![
                    self.to_native(Expr::envelope(bbox, REQUEST_SRID)),
                    Expr::col(geometry),
                ],
            ));
        }

        if let Some(range) = &spec.datetime {
            clauses.push(self.datetime_clause(range, spec.datetime_column.as_deref())?);
        }

        if let Some(node) = &spec.expression {
            clauses.push(self.node(node, geometry)?);
        }

        if let (Some(tile), Some(geometry)) = (&spec.tile, geometry) {
            clauses.push(self.tile_clause(tile, geometry));
        }

        if let Some(key) = spec.shard_key {
            clauses.push(
                Expr::col(self.layout.shard_key_column.as_str()).eq(Expr::value(SqlValue::Int(key))),
            );
        }

        Ok(Expr::And(clauses))
    }

    fn ids_clause(&self, ids: &[String]) -> Expr {
        let typed = |id: &String| {
            Expr::col(self.layout.id_column.as_str())
                .eq(Expr::value(SqlValue::text(id.as_str())).cast(SqlType::Integer))
        };
        Expr::or(ids.iter().map(typed).collect())
    }

    fn property_clause(&self, name: &str, value: &Value) -> FilterResult<Expr> {
        let attribute = self
            .layer
            .attribute(name)
            .ok_or_else(|| FilterError::InvalidPropertyName(name.to_string()))?;

        let column = Expr::col(attribute.column.as_str());
        let text = match value {
            Value::Null => return Ok(column.is_null()),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Ok(column.eq(Expr::value(SqlValue::Text(text)).cast(attribute.kind.sql_type())))
    }

    fn datetime_clause(&self, range: &DatetimeRange, requested: Option<&str>) -> FilterResult<Expr> {
        let mut candidates = self.layer.datetime_attributes().peekable();
        if candidates.peek().is_none() {
            return Err(FilterError::MissingDatetimeColumn);
        }

        let attribute = match requested {
            Some(name) => candidates
                .find(|a| a.name == name)
                .ok_or_else(|| FilterError::InvalidDatetimeColumnName(name.to_string()))?,
            None => candidates.next().ok_or(FilterError::MissingDatetimeColumn)?,
        };

        let column = || Expr::col(attribute.column.as_str());
        let instant = |t| Expr::value(SqlValue::Timestamp(t)).cast(SqlType::Timestamp);

        Ok(match *range {
            DatetimeRange::Instant(t) => column().eq(instant(t)),
            DatetimeRange::Interval { start, end } => {
                let mut bounds = Vec::with_capacity(2);
                if let Some(start) = start {
                    bounds.push(column().binary(BinaryOp::GtEq, instant(start)));
                }
                if let Some(end) = end {
                    bounds.push(column().binary(BinaryOp::LtEq, instant(end)));
                }
                Expr::and(bounds)
            }
        })
    }

    /// Resolves a property name to a physical column and its type.
    ///
    /// Exposed attribute names resolve through the attribute mapping; the id
    /// column resolves by its own name.
    fn resolve(&self, name: &str) -> FilterResult<(&'a str, SqlType)> {
        if let Some(attribute) = self.layer.attribute(name) {
            return Ok((attribute.column.as_str(), attribute.kind.sql_type()));
        }
        if name == self.layout.id_column {
            return Ok((self.layout.id_column.as_str(), SqlType::Integer));
        }
        Err(FilterError::InvalidPropertyName(name.to_string()))
    }

    fn node(&self, node: &FilterNode, geometry: Option<&str>) -> FilterResult<Expr> {
        match node {
            FilterNode::And(args) => Ok(Expr::And(self.nodes(args, geometry)?)),
            FilterNode::Or(args) => Ok(Expr::Or(self.nodes(args, geometry)?)),
            FilterNode::Not(inner) => Ok(self.node(inner, geometry)?.not()),
            FilterNode::Op { op, args } => self.operation(*op, args, geometry),
            FilterNode::Property(name) if geometry == Some(name.as_str()) => Ok(Expr::col(name.as_str())),
            FilterNode::Property(name) => Ok(Expr::col(self.resolve(name)?.0)),
            other => self.operand(other, None),
        }
    }

    fn nodes(&self, nodes: &[FilterNode], geometry: Option<&str>) -> FilterResult<Vec<Expr>> {
        nodes.iter().map(|n| self.node(n, geometry)).collect()
    }

    /// Compiles an operator; literals are cast to the type of the property
    /// they are compared with
    fn operation(&self, op: Operator, args: &[FilterNode], geometry: Option<&str>) -> FilterResult<Expr> {
        op.check_arity(args.len())?;

        // `x = null` never matches in SQL; compare against null with IS NULL
        if matches!(op, Operator::Eq | Operator::NotEq) {
            if let Some(other) = Self::compared_with_null(args) {
                let operand = self.node(other, geometry)?;
                return Ok(if op == Operator::Eq {
                    operand.is_null()
                } else {
                    operand.is_not_null()
                });
            }
        }

        let hint = args.iter().find_map(|arg| match arg {
            FilterNode::Property(name) => Some(self.property_type(name, geometry)),
            _ => None,
        });
        let hint = match hint {
            Some(kind) => kind?,
            None => None,
        };
        let hint = if matches!(op, Operator::Any | Operator::NotAny) {
            hint.map(|kind| kind.element())
        } else {
            hint
        };

        let mut compiled = Vec::with_capacity(args.len());
        for (position, arg) in args.iter().enumerate() {
            match arg {
                FilterNode::List(items) if op.is_membership() && position == 1 => {
                    for item in items {
                        compiled.push(self.operand(item, hint)?);
                    }
                }
                FilterNode::Property(_) | FilterNode::Op { .. } => {
                    compiled.push(self.node(arg, geometry)?)
                }
                FilterNode::And(_) | FilterNode::Or(_) | FilterNode::Not(_) => {
                    compiled.push(self.node(arg, geometry)?)
                }
                // third argument of relate / dwithin / beyond stays uncast
                literal if op.is_spatial() && position == 2 => compiled.push(self.operand(literal, None)?),
                literal => compiled.push(self.operand(literal, hint)?),
            }
        }

        if op.is_membership() && !matches!(args.get(1), Some(FilterNode::List(_))) {
            return Err(FilterError::invalid(format!("'{}' needs a list", op)));
        }

        Ok(op.build(compiled))
    }

    /// The other side of a binary comparison whose one side is a null literal
    fn compared_with_null(args: &[FilterNode]) -> Option<&FilterNode> {
        let is_null = |n: &FilterNode| matches!(n, FilterNode::Literal(Literal::Null));
        match args {
            [lhs, rhs] if is_null(rhs) && !is_null(lhs) => Some(lhs),
            [lhs, rhs] if is_null(lhs) && !is_null(rhs) => Some(rhs),
            _ => None,
        }
    }

    /// `None` for the geometry column
    fn property_type(&self, name: &str, geometry: Option<&str>) -> FilterResult<Option<SqlType>> {
        if geometry == Some(name) {
            return Ok(None);
        }
        self.resolve(name).map(|(_, kind)| Some(kind))
    }

    /// Compiles a literal operand
    fn operand(&self, node: &FilterNode, hint: Option<SqlType>) -> FilterResult<Expr> {
        match node {
            FilterNode::Literal(Literal::Null) => Err(FilterError::invalid(
                "null can only be compared with '=' or '<>'",
            )),
            FilterNode::Literal(literal) => {
                let text = literal.to_text().unwrap_or_default();
                Ok(match hint {
                    Some(kind) => Expr::value(SqlValue::Text(text)).cast(kind),
                    None => match literal {
                        Literal::Int(i) => Expr::value(SqlValue::Int(*i)),
                        Literal::Float(f) => Expr::float(*f),
                        Literal::Bool(b) => Expr::value(SqlValue::Bool(*b)),
                        _ => Expr::value(SqlValue::Text(text)),
                    },
                })
            }
            FilterNode::Timestamp(t) => {
                Ok(Expr::value(SqlValue::Timestamp(*t)).cast(SqlType::Timestamp))
            }
            FilterNode::Geometry(geojson) => {
                let geometry = Expr::func(
                    "ST_SetSRID",
                    vec![
                        Expr::func(
                            "ST_GeomFromGeoJSON",
                            vec![Expr::value(SqlValue::Text(geojson.to_string()))],
                        ),
                        Expr::Int(i64::from(REQUEST_SRID)),
                    ],
                );
                Ok(self.to_native(geometry))
            }
            FilterNode::Envelope(bbox) => Ok(self.to_native(Expr::envelope(*bbox, REQUEST_SRID))),
            FilterNode::List(_) => Err(FilterError::invalid("list outside of 'in'")),
            other => self.node(other, None),
        }
    }

    /// Reprojects request geometry to the storage SRID when they differ
    fn to_native(&self, geometry: Expr) -> Expr {
        if self.layout.srid == REQUEST_SRID {
            return geometry;
        }
        Expr::func(
            "ST_Transform",
            vec![geometry, Expr::Int(i64::from(self.layout.srid))],
        )
    }
}
