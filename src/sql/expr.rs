//! SQL expression tree

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A value bound as a statement parameter
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    /// Text form used when the value is cast to a column type in SQL
    pub fn text(value: impl Into<String>) -> Self {
        SqlValue::Text(value.into())
    }
}

/// Column types the service casts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Integer,
    BigInt,
    DoublePrecision,
    Text,
    Boolean,
    Timestamp,
    Jsonb,
    IntegerArray,
    DoublePrecisionArray,
    TextArray,
}

impl SqlType {
    /// Returns the SQL spelling of the type
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Integer => "integer",
            SqlType::BigInt => "bigint",
            SqlType::DoublePrecision => "double precision",
            SqlType::Text => "text",
            SqlType::Boolean => "boolean",
            SqlType::Timestamp => "timestamp",
            SqlType::Jsonb => "jsonb",
            SqlType::IntegerArray => "integer[]",
            SqlType::DoublePrecisionArray => "double precision[]",
            SqlType::TextArray => "text[]",
        }
    }

    /// Element type for array types, the type itself otherwise
    pub fn element(&self) -> SqlType {
        match self {
            SqlType::IntegerArray => SqlType::Integer,
            SqlType::DoublePrecisionArray => SqlType::DoublePrecision,
            SqlType::TextArray => SqlType::Text,
            other => *other,
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
    Like,
    ILike,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Gt => ">",
            BinaryOp::Lt => "<",
            BinaryOp::GtEq => ">=",
            BinaryOp::LtEq => "<=",
            BinaryOp::Like => "LIKE",
            BinaryOp::ILike => "ILIKE",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// SQL expression
///
/// Function names are `&'static str` so only code in this crate can name a
/// function; request data only ever reaches SQL as a [`SqlValue`] parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Unqualified column reference
    Column(String),
    /// Whole-row reference of a table alias (`"t".*`)
    Row(String),
    /// Inline boolean literal
    Bool(bool),
    /// Inline integer literal (limits, SRIDs, resolutions)
    Int(i64),
    /// Inline string literal from code, never from a request
    Str(&'static str),
    /// Bound parameter
    Value(SqlValue),
    Cast(Box<Expr>, SqlType),
    Func(&'static str, Vec<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull { expr: Box<Expr>, negated: bool },
    InList { expr: Box<Expr>, list: Vec<Expr>, negated: bool },
    /// `lhs = ANY(rhs)`
    Any(Box<Expr>, Box<Expr>),
    /// `(expr)[index]`
    Subscript(Box<Expr>, i64),
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn value(value: SqlValue) -> Self {
        Expr::Value(value)
    }

    pub fn float(value: f64) -> Self {
        Expr::Value(SqlValue::Float(value))
    }

    pub fn func(name: &'static str, args: Vec<Expr>) -> Self {
        Expr::Func(name, args)
    }

    pub fn cast(self, ty: SqlType) -> Self {
        Expr::Cast(Box::new(self), ty)
    }

    pub fn binary(self, op: BinaryOp, rhs: Expr) -> Self {
        Expr::Binary(Box::new(self), op, Box::new(rhs))
    }

    pub fn eq(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn subscript(self, index: i64) -> Self {
        Expr::Subscript(Box::new(self), index)
    }

    /// Conjunction; a single clause is returned unwrapped
    pub fn and(mut clauses: Vec<Expr>) -> Self {
        if clauses.len() == 1 {
            return clauses.remove(0);
        }
        Expr::And(clauses)
    }

    /// Disjunction; a single clause is returned unwrapped
    pub fn or(mut clauses: Vec<Expr>) -> Self {
        if clauses.len() == 1 {
            return clauses.remove(0);
        }
        Expr::Or(clauses)
    }

    /// `ST_MakeEnvelope(minx, miny, maxx, maxy, srid)`
    pub fn envelope(bounds: [f64; 4], srid: i32) -> Self {
        Expr::func(
            "ST_MakeEnvelope",
            vec![
                Expr::float(bounds[0]),
                Expr::float(bounds[1]),
                Expr::float(bounds[2]),
                Expr::float(bounds[3]),
                Expr::Int(i64::from(srid)),
            ],
        )
    }
}
