//! Display configuration carried by a query.
//!
//! The analyzer passes the configuration through untouched; grid
//! interaction derivation reads the per-column settings to decide which
//! columns are aggregated and how.

use crate::operation::AggregateOperator;
use crate::value::{Column, DataType, DataTypeKind, OperationValue};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Role of a column in grouped views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Dimension,
    Measure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnConfiguration {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub kind: ColumnKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_operator: Option<AggregateOperator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregation_parameters: Vec<OperationValue>,
}

impl ColumnConfiguration {
    /// Default configuration: numbers are measures, everything else a dimension
    pub fn for_column(column: &Column) -> Self {
        let kind = if column.data_type.kind() == DataTypeKind::Number {
            ColumnKind::Measure
        } else {
            ColumnKind::Dimension
        };
        Self {
            name: column.name.clone(),
            data_type: column.data_type,
            kind,
            aggregate_operator: None,
            aggregation_parameters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfiguration {
    #[serde(default)]
    pub columns: Vec<ColumnConfiguration>,

    /// Settings this crate does not interpret, preserved as-is
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DisplayConfiguration {
    /// Read a configuration from a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse configuration {}", path.display()))
    }

    /// Interpret a snapshot's opaque configuration value; `null` is empty
    pub fn from_value(value: &serde_json::Value) -> serde_json::Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
    }

    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnConfiguration> {
        self.columns.iter().find(|column| column.name == name)
    }
}
