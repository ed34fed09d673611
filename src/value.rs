//! Column types and operation values.

use crate::pure::Expr;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pure primitive types a source or derived column can have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    String,
    Boolean,
    Integer,
    Float,
    Decimal,
    Number,
    Date,
    StrictDate,
    DateTime,
}

/// Coarse grouping of data types used to gate operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataTypeKind {
    Text,
    Number,
    Date,
    Time,
    Boolean,
}

impl DataType {
    pub fn kind(&self) -> DataTypeKind {
        match self {
            DataType::String => DataTypeKind::Text,
            DataType::Boolean => DataTypeKind::Boolean,
            DataType::Integer | DataType::Float | DataType::Decimal | DataType::Number => {
                DataTypeKind::Number
            }
            DataType::Date | DataType::StrictDate => DataTypeKind::Date,
            DataType::DateTime => DataTypeKind::Time,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "String",
            DataType::Boolean => "Boolean",
            DataType::Integer => "Integer",
            DataType::Float => "Float",
            DataType::Decimal => "Decimal",
            DataType::Number => "Number",
            DataType::Date => "Date",
            DataType::StrictDate => "StrictDate",
            DataType::DateTime => "DateTime",
        }
    }
}

impl DataTypeKind {
    /// Kinds match when equal; Date and Time are interchangeable
    pub fn matches(&self, other: DataTypeKind) -> bool {
        *self == other || (self.is_temporal() && other.is_temporal())
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, DataTypeKind::Date | DataTypeKind::Time)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        // Accept fully qualified primitive paths, e.g. meta::pure::metamodel::type::Integer
        let name = s.rsplit("::").next().unwrap_or(s);
        Ok(match name {
            "String" => DataType::String,
            "Boolean" => DataType::Boolean,
            "Integer" => DataType::Integer,
            "Float" => DataType::Float,
            "Decimal" => DataType::Decimal,
            "Number" => DataType::Number,
            "Date" => DataType::Date,
            "StrictDate" => DataType::StrictDate,
            "DateTime" => DataType::DateTime,
            _ => bail!("Unknown data type: {}", s),
        })
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
        }
    }
}

impl FromStr for Column {
    type Err = anyhow::Error;

    /// Parse the `name:Type` form
    fn from_str(s: &str) -> Result<Self> {
        let Some((name, data_type)) = s.rsplit_once(':') else {
            bail!("Invalid column '{}': expected name:Type", s);
        };
        let name = name.trim();
        if name.is_empty() {
            bail!("Invalid column '{}': empty name", s);
        }
        Ok(Column::new(name, data_type.trim().parse()?))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.data_type)
    }
}

/// Literal payload of an operation value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

/// Right-hand side of a filter condition or an aggregate parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationValue {
    Literal {
        #[serde(rename = "type")]
        data_type: DataType,
        value: LiteralValue,
    },
    Column {
        column: String,
    },
}

impl OperationValue {
    pub fn string(value: &str) -> Self {
        OperationValue::Literal {
            data_type: DataType::String,
            value: LiteralValue::String(value.to_string()),
        }
    }

    pub fn column(name: &str) -> Self {
        OperationValue::Column {
            column: name.to_string(),
        }
    }

    /// Build a value from a literal expression; dates are classified by the
    /// presence of a time component
    pub fn from_literal(expr: &Expr) -> Option<Self> {
        let (data_type, value) = match expr {
            Expr::String(s) => (DataType::String, LiteralValue::String(s.clone())),
            Expr::Integer(i) => (DataType::Integer, LiteralValue::Integer(*i)),
            Expr::Float(f) => (DataType::Float, LiteralValue::Float(*f)),
            Expr::Boolean(b) => (DataType::Boolean, LiteralValue::Boolean(*b)),
            Expr::Date(d) => {
                let data_type = if d.contains('T') {
                    DataType::DateTime
                } else {
                    DataType::StrictDate
                };
                (data_type, LiteralValue::String(d.clone()))
            }
            _ => return None,
        };
        Some(OperationValue::Literal { data_type, value })
    }

    /// Render as an expression; column references become `$variable.column`
    pub fn to_expr(&self, variable: &str) -> Expr {
        match self {
            OperationValue::Literal { data_type, value } => match (data_type.kind(), value) {
                (DataTypeKind::Date | DataTypeKind::Time, LiteralValue::String(s)) => {
                    Expr::Date(s.clone())
                }
                (_, LiteralValue::String(s)) => Expr::String(s.clone()),
                (_, LiteralValue::Integer(i)) => Expr::Integer(*i),
                (_, LiteralValue::Float(f)) => Expr::Float(*f),
                (_, LiteralValue::Boolean(b)) => Expr::Boolean(*b),
            },
            OperationValue::Column { column } => Expr::property(variable, column),
        }
    }

    /// Kind of a literal value; column references have no intrinsic kind
    pub fn literal_kind(&self) -> Option<DataTypeKind> {
        match self {
            OperationValue::Literal { data_type, .. } => Some(data_type.kind()),
            OperationValue::Column { .. } => None,
        }
    }
}
