//! CQL2-JSON predicate tree
//!
//! The filter arrives as CQL2-JSON and is read into [`FilterNode`] before
//! compilation. Operators form a closed set; each knows its arity and how to
//! build its SQL from already compiled arguments.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

use super::errors::{FilterError, FilterResult};
use crate::sql::{BinaryOp, Expr};

/// Scalar literal
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Literal {
    /// Text form, cast to the column type in SQL
    pub fn to_text(&self) -> Option<String> {
        match self {
            Literal::Null => None,
            Literal::Bool(b) => Some(b.to_string()),
            Literal::Int(i) => Some(i.to_string()),
            Literal::Float(f) => Some(f.to_string()),
            Literal::Text(s) => Some(s.clone()),
        }
    }
}

/// Node of a parsed filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
    Op { op: Operator, args: Vec<FilterNode> },
    /// Exposed property name
    Property(String),
    Literal(Literal),
    /// GeoJSON geometry in EPSG:4326
    Geometry(Value),
    /// `{"bbox": [minx, miny, maxx, maxy]}`
    Envelope([f64; 4]),
    Timestamp(DateTime<Utc>),
    List(Vec<FilterNode>),
}

impl FilterNode {
    /// Reads a CQL2-JSON document
    pub fn parse(value: &Value) -> FilterResult<Self> {
        match value {
            Value::Null => Ok(FilterNode::Literal(Literal::Null)),
            Value::Bool(b) => Ok(FilterNode::Literal(Literal::Bool(*b))),
            Value::Number(n) => Ok(FilterNode::Literal(match n.as_i64() {
                Some(i) => Literal::Int(i),
                None => Literal::Float(n.as_f64().unwrap_or(f64::NAN)),
            })),
            Value::String(s) => Ok(FilterNode::Literal(Literal::Text(s.clone()))),
            Value::Array(items) => Ok(FilterNode::List(
                items.iter().map(FilterNode::parse).collect::<FilterResult<_>>()?,
            )),
            Value::Object(object) => Self::parse_object(object),
        }
    }

    /// Reads a CQL2-JSON document from text
    pub fn from_json(text: &str) -> FilterResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| FilterError::invalid(format!("not valid JSON: {}", e)))?;
        Self::parse(&value)
    }

    fn parse_object(object: &Map<String, Value>) -> FilterResult<Self> {
        if let Some(op) = object.get("op") {
            let op = op
                .as_str()
                .ok_or_else(|| FilterError::invalid("'op' must be a string"))?;
            let args = match object.get("args") {
                None => Vec::new(),
                Some(Value::Array(args)) => args
                    .iter()
                    .map(FilterNode::parse)
                    .collect::<FilterResult<Vec<_>>>()?,
                Some(_) => return Err(FilterError::invalid("'args' must be an array")),
            };
            return Self::logical_or_op(op, args);
        }

        if let Some(property) = object.get("property") {
            let name = property
                .as_str()
                .ok_or_else(|| FilterError::invalid("'property' must be a string"))?;
            return Ok(FilterNode::Property(name.to_string()));
        }

        if let Some(bbox) = object.get("bbox") {
            let coords = bbox
                .as_array()
                .map(|items| items.iter().filter_map(Value::as_f64).collect::<Vec<_>>())
                .unwrap_or_default();
            // 3D boxes keep their horizontal extent
            let envelope = match coords.as_slice() {
                [minx, miny, maxx, maxy] => [*minx, *miny, *maxx, *maxy],
                [minx, miny, _, maxx, maxy, _] => [*minx, *miny, *maxx, *maxy],
                _ => return Err(FilterError::invalid("bbox needs 4 or 6 numbers")),
            };
            return Ok(FilterNode::Envelope(envelope));
        }

        if let Some(timestamp) = object.get("timestamp") {
            let instant = timestamp
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .ok_or_else(|| FilterError::invalid("timestamp must be RFC 3339"))?;
            return Ok(FilterNode::Timestamp(instant.with_timezone(&Utc)));
        }

        if let Some(date) = object.get("date") {
            let instant = date
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .ok_or_else(|| FilterError::invalid("date must be YYYY-MM-DD"))?;
            return Ok(FilterNode::Timestamp(instant.and_utc()));
        }

        if object.contains_key("type")
            && (object.contains_key("coordinates") || object.contains_key("geometries"))
        {
            return Ok(FilterNode::Geometry(Value::Object(object.clone())));
        }

        Err(FilterError::invalid("unrecognized filter node"))
    }

    fn logical_or_op(op: &str, mut args: Vec<FilterNode>) -> FilterResult<Self> {
        match op.to_ascii_lowercase().as_str() {
            "and" | "or" if args.is_empty() => {
                Err(FilterError::invalid(format!("'{}' needs arguments", op)))
            }
            "and" => Ok(FilterNode::And(args)),
            "or" => Ok(FilterNode::Or(args)),
            "not" => {
                if args.len() != 1 {
                    return Err(FilterError::invalid("'not' takes exactly one argument"));
                }
                Ok(FilterNode::Not(Box::new(args.remove(0))))
            }
            _ => {
                let op: Operator = op.parse()?;
                op.check_arity(args.len())?;
                Ok(FilterNode::Op { op, args })
            }
        }
    }
}

/// Filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    IsNull,
    IsNotNull,
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    Like,
    ILike,
    NotILike,
    In,
    NotIn,
    /// Value contained in an array property
    Any,
    NotAny,
    Intersects,
    Disjoint,
    Contains,
    Within,
    Touches,
    Crosses,
    Overlaps,
    Equals,
    Relate,
    DWithin,
    Beyond,
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    pub fn arity(&self) -> usize {
        match self {
            Operator::IsNull | Operator::IsNotNull => 1,
            Operator::Relate | Operator::DWithin | Operator::Beyond => 3,
            _ => 2,
        }
    }

    pub fn check_arity(&self, given: usize) -> FilterResult<()> {
        if given != self.arity() {
            return Err(FilterError::invalid(format!(
                "'{}' takes {} argument(s), got {}",
                self,
                self.arity(),
                given
            )));
        }
        Ok(())
    }

    pub fn is_spatial(&self) -> bool {
        matches!(
            self,
            Operator::Intersects
                | Operator::Disjoint
                | Operator::Contains
                | Operator::Within
                | Operator::Touches
                | Operator::Crosses
                | Operator::Overlaps
                | Operator::Equals
                | Operator::Relate
                | Operator::DWithin
                | Operator::Beyond
        )
    }

    /// Takes a list as second argument
    pub fn is_membership(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    /// Builds the SQL for compiled arguments.
    ///
    /// For `In` / `NotIn` the arguments are the tested value followed by
    /// the list items.
    pub fn build(&self, mut args: Vec<Expr>) -> Expr {
        let spatial = |name: &'static str, args: Vec<Expr>| Expr::func(name, args);

        match self {
            Operator::IsNull => args.remove(0).is_null(),
            Operator::IsNotNull => args.remove(0).is_not_null(),
            Operator::In | Operator::NotIn => {
                let expr = args.remove(0);
                Expr::InList {
                    expr: Box::new(expr),
                    list: args,
                    negated: *self == Operator::NotIn,
                }
            }
            Operator::Any | Operator::NotAny => {
                let value = args.pop().unwrap_or(Expr::Bool(false));
                let array = args.remove(0);
                let any = Expr::Any(Box::new(value), Box::new(array));
                if *self == Operator::NotAny {
                    any.not()
                } else {
                    any
                }
            }
            Operator::NotILike => {
                let rhs = args.pop().unwrap_or(Expr::Bool(false));
                args.remove(0).binary(BinaryOp::ILike, rhs).not()
            }
            Operator::Intersects => spatial("ST_Intersects", args),
            Operator::Disjoint => spatial("ST_Disjoint", args),
            Operator::Contains => spatial("ST_Contains", args),
            Operator::Within => spatial("ST_Within", args),
            Operator::Touches => spatial("ST_Touches", args),
            Operator::Crosses => spatial("ST_Crosses", args),
            Operator::Overlaps => spatial("ST_Overlaps", args),
            Operator::Equals => spatial("ST_Equals", args),
            Operator::Relate => spatial("ST_Relate", args),
            Operator::DWithin => spatial("ST_DWithin", args),
            Operator::Beyond => spatial("ST_DWithin", args).not(),
            binary => {
                let rhs = args.pop().unwrap_or(Expr::Bool(false));
                let lhs = args.remove(0);
                lhs.binary(binary.binary_op(), rhs)
            }
        }
    }

    fn binary_op(&self) -> BinaryOp {
        match self {
            Operator::NotEq => BinaryOp::NotEq,
            Operator::Gt => BinaryOp::Gt,
            Operator::Lt => BinaryOp::Lt,
            Operator::GtEq => BinaryOp::GtEq,
            Operator::LtEq => BinaryOp::LtEq,
            Operator::Like => BinaryOp::Like,
            Operator::ILike => BinaryOp::ILike,
            Operator::Add => BinaryOp::Add,
            Operator::Sub => BinaryOp::Sub,
            Operator::Mul => BinaryOp::Mul,
            Operator::Div => BinaryOp::Div,
            _ => BinaryOp::Eq,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::IsNull => "isNull",
            Operator::IsNotNull => "isNotNull",
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::GtEq => ">=",
            Operator::LtEq => "<=",
            Operator::Like => "like",
            Operator::ILike => "ilike",
            Operator::NotILike => "not_ilike",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Any => "any",
            Operator::NotAny => "not_any",
            Operator::Intersects => "s_intersects",
            Operator::Disjoint => "s_disjoint",
            Operator::Contains => "s_contains",
            Operator::Within => "s_within",
            Operator::Touches => "s_touches",
            Operator::Crosses => "s_crosses",
            Operator::Overlaps => "s_overlaps",
            Operator::Equals => "s_equals",
            Operator::Relate => "relate",
            Operator::DWithin => "dwithin",
            Operator::Beyond => "beyond",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.to_ascii_lowercase();
        let name = name.strip_prefix("s_").unwrap_or(&name);

        Ok(match name {
            "isnull" | "is_null" => Operator::IsNull,
            "isnotnull" | "is_not_null" => Operator::IsNotNull,
            "=" | "==" | "eq" => Operator::Eq,
            "<>" | "!=" | "ne" => Operator::NotEq,
            ">" | "gt" => Operator::Gt,
            "<" | "lt" => Operator::Lt,
            ">=" | "ge" => Operator::GtEq,
            "<=" | "le" => Operator::LtEq,
            "like" => Operator::Like,
            "ilike" => Operator::ILike,
            "not_ilike" => Operator::NotILike,
            "in" => Operator::In,
            "not_in" => Operator::NotIn,
            "any" => Operator::Any,
            "not_any" => Operator::NotAny,
            "intersects" => Operator::Intersects,
            "disjoint" => Operator::Disjoint,
            "contains" => Operator::Contains,
            "within" => Operator::Within,
            "touches" => Operator::Touches,
            "crosses" => Operator::Crosses,
            "overlaps" => Operator::Overlaps,
            "equals" => Operator::Equals,
            "relate" => Operator::Relate,
            "dwithin" => Operator::DWithin,
            "beyond" => Operator::Beyond,
            "+" => Operator::Add,
            "-" => Operator::Sub,
            "*" => Operator::Mul,
            "/" => Operator::Div,
            _ => return Err(FilterError::invalid(format!("unsupported operator '{}'", s))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{Select, Statement, TableRef};
    use serde_json::json;

    fn sql(expr: Expr) -> String {
        let stmt = Statement::select(&Select::from_table(TableRef::new("s", "t")).filter(expr));
        stmt.sql.trim_start_matches("SELECT * FROM \"s\".\"t\" WHERE ").to_string()
    }

    #[test]
    fn test_parse_nested_tree() {
        let node = FilterNode::parse(&json!({
            "op": "and",
            "args": [
                {"op": "=", "args": [{"property": "name"}, "Main St"]},
                {"op": "not", "args": [{"op": "isNull", "args": [{"property": "lanes"}]}]},
                {"op": "s_intersects", "args": [{"property": "geom"}, {"bbox": [0, 0, 1, 1]}]}
            ]
        }))
        .unwrap();

        let FilterNode::And(args) = &node else {
            panic!("expected and, got {:?}", node);
        };
        assert_eq!(args.len(), 3);
        assert!(matches!(&args[2], FilterNode::Op { op: Operator::Intersects, .. }));
    }

    #[test]
    fn test_operator_aliases() {
        assert_eq!("==".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("ne".parse::<Operator>().unwrap(), Operator::NotEq);
        assert_eq!("INTERSECTS".parse::<Operator>().unwrap(), Operator::Intersects);
        assert_eq!("S_WITHIN".parse::<Operator>().unwrap(), Operator::Within);
        assert!("t_before".parse::<Operator>().is_err());
    }

    #[test]
    fn test_arity_checked_on_parse() {
        let err = FilterNode::parse(&json!({"op": "dwithin", "args": [{"property": "geom"}]}))
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidFilter(_)));

        assert!(FilterNode::parse(&json!({"op": "and", "args": []})).is_err());
        assert!(FilterNode::parse(&json!({"op": "not", "args": [true, false]})).is_err());
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(
            FilterNode::parse(&json!({"timestamp": "2020-01-01T00:00:00Z"})).unwrap(),
            FilterNode::Timestamp("2020-01-01T00:00:00Z".parse().unwrap())
        );
        assert!(matches!(
            FilterNode::parse(&json!({"type": "Point", "coordinates": [1, 2]})).unwrap(),
            FilterNode::Geometry(_)
        ));
        assert_eq!(
            FilterNode::parse(&json!([1, 2.5])).unwrap(),
            FilterNode::List(vec![
                FilterNode::Literal(Literal::Int(1)),
                FilterNode::Literal(Literal::Float(2.5)),
            ])
        );
        assert!(FilterNode::parse(&json!({"unexpected": 1})).is_err());
        assert!(FilterNode::from_json("{not json").is_err());
    }

    #[test]
    fn test_build_operators() {
        let a = || Expr::col("a");
        let b = || Expr::col("b");

        assert_eq!(sql(Operator::GtEq.build(vec![a(), b()])), "(\"a\" >= \"b\")");
        assert_eq!(sql(Operator::NotILike.build(vec![a(), b()])), "(NOT (\"a\" ILIKE \"b\"))");
        assert_eq!(sql(Operator::IsNull.build(vec![a()])), "(\"a\" IS NULL)");
        assert_eq!(sql(Operator::Any.build(vec![a(), b()])), "(\"b\" = ANY(\"a\"))");
        assert_eq!(
            sql(Operator::NotIn.build(vec![a(), Expr::Int(1), Expr::Int(2)])),
            "(\"a\" NOT IN (1, 2))"
        );
        assert_eq!(
            sql(Operator::Beyond.build(vec![a(), b(), Expr::Int(10)])),
            "(NOT ST_DWithin(\"a\", \"b\", 10))"
        );
        assert_eq!(sql(Operator::Mul.build(vec![a(), Expr::Int(2)])), "(\"a\" * 2)");
    }
}
