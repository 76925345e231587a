//! Filters for `Store::list`

use serde::{Deserialize, Serialize};

/// A value that can be compared against an indexed field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl IndexValue {
    /// Render as the text form stored in the index table
    pub fn as_text(&self) -> String {
        match self {
            IndexValue::String(s) => s.clone(),
            IndexValue::Integer(i) => i.to_string(),
            IndexValue::Float(f) => f.to_string(),
            IndexValue::Bool(b) => b.to_string(),
        }
    }

    /// Render as the numeric form stored in the index table, if any
    pub fn as_number(&self) -> Option<f64> {
        match self {
            IndexValue::Integer(i) => Some(*i as f64),
            IndexValue::Float(f) => Some(*f),
            IndexValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            IndexValue::String(_) => None,
        }
    }
}

/// Comparison operator for a `Filter`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// A single `field op value` constraint, ANDed with its siblings in `Store::list`
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: IndexValue) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value,
        }
    }
}
