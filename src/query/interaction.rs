//! Snapshot derivation from grid interactions.
//!
//! A grid reports its row grouping and sort model; the derived snapshot is a
//! copy of the base with its `group_by` and `sort_columns` replaced.

use crate::catalog::find_column;
use crate::config::{ColumnConfiguration, ColumnKind, DisplayConfiguration};
use crate::error::SnapshotError;
use crate::operation::AggregateOperator;
use crate::snapshot::{AggColumn, FinalizedSnapshot, GroupBy, SortColumn, SortDirection, Stage};
use crate::value::Column;
use log::debug;
use serde::{Deserialize, Serialize};

/// Identifier of the synthetic tree column shown when rows are grouped
pub const TREE_COLUMN_ID: &str = "ag-Grid-AutoColumn";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSortItem {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridInteraction {
    #[serde(default)]
    pub row_group_columns: Vec<String>,
    #[serde(default)]
    pub sort_model: Vec<GridSortItem>,
}

/// Derive a new snapshot from `base` reflecting the grid's grouping and sorting
pub fn derive_from_interaction(
    base: &FinalizedSnapshot,
    request: &GridInteraction,
) -> Result<FinalizedSnapshot, SnapshotError> {
    let configuration = DisplayConfiguration::from_value(&base.data().configuration)?;
    let mut draft = base.clone_draft();

    let group_columns = request
        .row_group_columns
        .iter()
        .map(|name| base.find_column(Stage::Aggregation, name).cloned())
        .collect::<Result<Vec<_>, _>>()?;

    draft.data.group_by = if group_columns.is_empty() {
        None
    } else {
        let agg_columns = base
            .stage_columns(Stage::Aggregation)
            .iter()
            .filter(|column| find_column(&group_columns, &column.name).is_none())
            .filter_map(|column| aggregate_column(base, &configuration, column))
            .collect();
        let sort_direction = request
            .sort_model
            .iter()
            .find(|item| item.column == TREE_COLUMN_ID)
            .map(|item| item.direction)
            .or_else(|| base.data().group_by.as_ref().map(|g| g.sort_direction))
            .unwrap_or(SortDirection::Ascending);
        Some(GroupBy {
            columns: group_columns,
            agg_columns,
            sort_direction,
        })
    };

    let sortable = draft.data.stage_columns(Stage::Sort);
    draft.data.sort_columns = request
        .sort_model
        .iter()
        .filter(|item| item.column != TREE_COLUMN_ID)
        .map(|item| {
            let column = find_column(&sortable, &item.column)
                .ok_or_else(|| SnapshotError::ColumnNotFound(item.column.clone()))?;
            Ok(SortColumn {
                name: column.name.clone(),
                data_type: column.data_type,
                direction: item.direction,
            })
        })
        .collect::<Result<_, SnapshotError>>()?;

    debug!(
        "Derived snapshot {} from {}: {} group column(s), {} sort column(s)",
        draft.uuid,
        base.uuid(),
        request.row_group_columns.len(),
        draft.data.sort_columns.len()
    );
    draft.finalize()
}

/// Aggregate for a measure column; dimensions are dropped from grouped views
fn aggregate_column(
    base: &FinalizedSnapshot,
    configuration: &DisplayConfiguration,
    column: &Column,
) -> Option<AggColumn> {
    let existing = base
        .data()
        .group_by
        .iter()
        .flat_map(|group_by| group_by.agg_columns.iter())
        .find(|agg| agg.name == column.name);
    if let Some(existing) = existing {
        return Some(existing.clone());
    }

    let settings = configuration
        .column(&column.name)
        .cloned()
        .unwrap_or_else(|| ColumnConfiguration::for_column(column));
    if settings.kind != ColumnKind::Measure {
        return None;
    }

    let (operator, parameters) = match settings.aggregate_operator {
        Some(operator)
            if operator.is_compatible_with_column(column)
                && operator.is_compatible_with_parameter_values(&settings.aggregation_parameters) =>
        {
            (operator, settings.aggregation_parameters)
        }
        _ => {
            let operator = AggregateOperator::default_for(column);
            (operator, operator.generate_default_parameter_values(column))
        }
    };

    Some(AggColumn {
        name: column.name.clone(),
        data_type: column.data_type,
        operator,
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BuiltinTypeResolver;
    use crate::pure::parse;
    use crate::query::{analyze, generate_code, BaseQuery};
    use crate::value::DataType;

    fn base(code: &str, configuration: serde_json::Value) -> FinalizedSnapshot {
        let columns = vec![
            Column::new("a", DataType::String),
            Column::new("b", DataType::Integer),
            Column::new("c", DataType::String),
            Column::new("d", DataType::Float),
        ];
        let base = BaseQuery {
            name: "grid".to_string(),
            configuration,
        };
        analyze(&parse(code).unwrap(), &columns, &base, &BuiltinTypeResolver).unwrap()
    }

    fn sort(column: &str, direction: SortDirection) -> GridSortItem {
        GridSortItem {
            column: column.to_string(),
            direction,
        }
    }

    #[test]
    fn test_derive_group_by() {
        let configuration = serde_json::json!({
            "columns": [
                {"name": "d", "type": "Float", "kind": "measure", "aggregate_operator": "AVERAGE"},
                {"name": "c", "type": "String", "kind": "measure", "aggregate_operator": "JOIN_STRINGS",
                 "aggregation_parameters": [{"kind": "literal", "type": "String", "value": ";"}]}
            ]
        });
        let base = base("select(~[a, b, c, d])", configuration);
        let request = GridInteraction {
            row_group_columns: vec!["a".to_string()],
            sort_model: vec![
                sort(TREE_COLUMN_ID, SortDirection::Descending),
                sort("b", SortDirection::Ascending),
            ],
        };

        let derived = derive_from_interaction(&base, &request).unwrap();
        assert_ne!(derived.uuid(), base.uuid());
        assert!(base.data().group_by.is_none());

        let group_by = derived.data().group_by.as_ref().unwrap();
        assert_eq!(group_by.sort_direction, SortDirection::Descending);
        let operators: Vec<_> = group_by.agg_columns.iter().map(|c| (c.name.as_str(), c.operator)).collect();
        assert_eq!(
            operators,
            vec![
                ("b", AggregateOperator::Sum),
                ("c", AggregateOperator::JoinStrings),
                ("d", AggregateOperator::Average),
            ]
        );
        assert_eq!(
            generate_code(&derived).unwrap(),
            "select(~[a, b, c, d])->groupBy(~[a], ~[b:x|$x.b:x|$x->sum(), c:x|$x.c:x|$x->joinStrings(';'), d:x|$x.d:x|$x->average()])->sort([~a->descending()])->sort([~b->ascending()])"
        );
    }

    #[test]
    fn test_derive_keeps_existing_aggregates() {
        let base = base(
            "select(~[a, b, c])->groupBy(~[a], ~[b:x|$x.b:x|$x->max()])->sort([~a->descending()])",
            serde_json::Value::Null,
        );
        let request = GridInteraction {
            row_group_columns: vec!["a".to_string()],
            sort_model: vec![],
        };
        let derived = derive_from_interaction(&base, &request).unwrap();
        let group_by = derived.data().group_by.as_ref().unwrap();
        assert_eq!(group_by.agg_columns.len(), 1);
        assert_eq!(group_by.agg_columns[0].operator, AggregateOperator::Max);
        assert_eq!(group_by.sort_direction, SortDirection::Descending);
    }

    #[test]
    fn test_derive_ungroup() {
        let base = base(
            "select(~[a, b])->groupBy(~[a], ~[b:x|$x.b:x|$x->sum()])->sort([~a->ascending()])",
            serde_json::Value::Null,
        );
        let derived = derive_from_interaction(&base, &GridInteraction::default()).unwrap();
        assert!(derived.data().group_by.is_none());
        assert!(derived.data().sort_columns.is_empty());
        assert_eq!(generate_code(&derived).unwrap(), "select(~[a, b])");
    }

    #[test]
    fn test_derive_unknown_columns() {
        let base = base("select(~[a, b])", serde_json::Value::Null);
        let request = GridInteraction {
            row_group_columns: vec!["z".to_string()],
            sort_model: vec![],
        };
        let err = derive_from_interaction(&base, &request).unwrap_err();
        assert_eq!(err.to_string(), "Can't find column 'z'");

        let request = GridInteraction {
            row_group_columns: vec![],
            sort_model: vec![sort("c", SortDirection::Ascending)],
        };
        assert!(derive_from_interaction(&base, &request).is_err());
    }
}
