//! Query snapshot data model.
//!
//! A [`QuerySnapshot`] is a mutable draft filled in by the analyzer. Once
//! [`QuerySnapshot::finalize`] succeeds it becomes a [`FinalizedSnapshot`],
//! which is immutable and can be shared across threads; edits go through
//! [`FinalizedSnapshot::clone_draft`].

use crate::catalog::{find_column, find_duplicate};
use crate::error::SnapshotError;
use crate::operation::aggregate::AggregateOperator;
use crate::operation::filter::FilterOperator;
use crate::pure::Lambda;
use crate::value::{Column, DataType, OperationValue};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Separator between pivot values and the aggregated column name in cast columns
pub const PIVOT_COLUMN_NAME_VALUE_SEPARATOR: &str = "__|__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Transformation captured verbatim from the query
    pub map_fn: Lambda,
}

impl ExtendColumn {
    pub fn column(&self) -> Column {
        Column::new(&self.name, self.data_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub operator: FilterOperator,
    pub value: Option<OperationValue>,
    pub not: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterGroupOperator {
    And,
    Or,
}

impl FilterGroupOperator {
    pub fn function_name(&self) -> &'static str {
        match self {
            FilterGroupOperator::And => "and",
            FilterGroupOperator::Or => "or",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub group_operator: FilterGroupOperator,
    pub conditions: Vec<FilterNode>,
    pub not: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum FilterNode {
    Group(FilterGroup),
    Condition(FilterCondition),
}

impl FilterNode {
    pub fn is_negated(&self) -> bool {
        match self {
            FilterNode::Group(group) => group.not,
            FilterNode::Condition(condition) => condition.not,
        }
    }

    /// Flip the `not` flag of the node
    pub fn negate(&mut self) {
        match self {
            FilterNode::Group(group) => group.not = !group.not,
            FilterNode::Condition(condition) => condition.not = !condition.not,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    #[serde(rename = "ASC")]
    Ascending,
    #[serde(rename = "DESC")]
    Descending,
}

impl SortDirection {
    pub fn function_name(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ascending",
            SortDirection::Descending => "descending",
        }
    }

    pub fn from_function_name(name: &str) -> Option<Self> {
        match name {
            "ascending" => Some(SortDirection::Ascending),
            "descending" => Some(SortDirection::Descending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub operator: AggregateOperator,
    pub parameters: Vec<OperationValue>,
}

impl AggColumn {
    pub fn column(&self) -> Column {
        Column::new(&self.name, self.data_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub columns: Vec<Column>,
    pub agg_columns: Vec<AggColumn>,
    pub cast_columns: Vec<Column>,
    pub sort_direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBy {
    pub columns: Vec<Column>,
    pub agg_columns: Vec<AggColumn>,
    pub sort_direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuerySnapshotData {
    pub name: String,
    pub configuration: serde_json::Value,
    pub source_columns: Vec<Column>,
    pub leaf_extended_columns: Vec<ExtendColumn>,
    pub filter: Option<FilterGroup>,
    pub select_columns: Vec<Column>,
    pub pivot: Option<Pivot>,
    pub group_by: Option<GroupBy>,
    pub group_extended_columns: Vec<ExtendColumn>,
    pub sort_columns: Vec<SortColumn>,
    pub limit: Option<u64>,
}

/// Pipeline stages whose input columns can be queried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Filter,
    Select,
    Pivot,
    Aggregation,
    GroupExtend,
    Sort,
}

impl QuerySnapshotData {
    /// Columns visible to the given stage
    pub fn stage_columns(&self, stage: Stage) -> Vec<Column> {
        match stage {
            Stage::Filter | Stage::Select => self
                .source_columns
                .iter()
                .cloned()
                .chain(self.leaf_extended_columns.iter().map(ExtendColumn::column))
                .collect(),
            Stage::Pivot => {
                if self.select_columns.is_empty() {
                    self.stage_columns(Stage::Filter)
                } else {
                    self.select_columns.clone()
                }
            }
            Stage::Aggregation => match &self.pivot {
                Some(pivot) => pivot.cast_columns.clone(),
                None => self.stage_columns(Stage::Pivot),
            },
            Stage::GroupExtend => match &self.group_by {
                Some(group_by) => group_by
                    .columns
                    .iter()
                    .cloned()
                    .chain(group_by.agg_columns.iter().map(AggColumn::column))
                    .collect(),
                None => self.stage_columns(Stage::Aggregation),
            },
            Stage::Sort => {
                let mut columns = self.stage_columns(Stage::GroupExtend);
                columns.extend(self.group_extended_columns.iter().map(ExtendColumn::column));
                columns
            }
        }
    }

    /// Check that no column list contains duplicate names
    fn validate(&self) -> Result<(), SnapshotError> {
        let names = |columns: &[Column]| -> Vec<String> {
            columns.iter().map(|c| c.name.clone()).collect()
        };
        let mut lists: Vec<(&'static str, Vec<String>)> = vec![
            ("source", names(&self.source_columns)),
            (
                "leaf-level extended",
                self.leaf_extended_columns.iter().map(|c| c.name.clone()).collect(),
            ),
            ("select", names(&self.select_columns)),
            (
                "group-level extended",
                self.group_extended_columns.iter().map(|c| c.name.clone()).collect(),
            ),
            ("sort", self.sort_columns.iter().map(|c| c.name.clone()).collect()),
        ];
        if let Some(pivot) = &self.pivot {
            lists.push(("pivot", names(&pivot.columns)));
            lists.push((
                "pivot aggregate",
                pivot.agg_columns.iter().map(|c| c.name.clone()).collect(),
            ));
            lists.push(("cast", names(&pivot.cast_columns)));
        }
        if let Some(group_by) = &self.group_by {
            lists.push(("group", names(&group_by.columns)));
            lists.push((
                "aggregate",
                group_by.agg_columns.iter().map(|c| c.name.clone()).collect(),
            ));
        }
        // Visible columns must also stay unique once extensions are appended
        lists.push(("leaf-level visible", names(&self.stage_columns(Stage::Filter))));
        lists.push(("group-level visible", names(&self.stage_columns(Stage::Sort))));

        for (list, names) in lists {
            if let Some(name) = find_duplicate(names.iter().map(String::as_str)) {
                return Err(SnapshotError::DuplicateColumns {
                    list,
                    name: name.to_string(),
                });
            }
        }
        if self.filter.as_ref().is_some_and(has_empty_group) {
            return Err(SnapshotError::EmptyFilterGroup);
        }
        Ok(())
    }
}

fn has_empty_group(group: &FilterGroup) -> bool {
    group.conditions.is_empty()
        || group.conditions.iter().any(|node| match node {
            FilterNode::Group(child) => has_empty_group(child),
            FilterNode::Condition(_) => false,
        })
}

/// Mutable snapshot draft
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    pub uuid: Uuid,
    pub data: QuerySnapshotData,
}

impl QuerySnapshot {
    pub fn new(name: &str, configuration: serde_json::Value, source_columns: Vec<Column>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            data: QuerySnapshotData {
                name: name.to_string(),
                configuration,
                source_columns,
                ..Default::default()
            },
        }
    }

    /// Validate the draft and freeze it
    pub fn finalize(self) -> Result<FinalizedSnapshot, SnapshotError> {
        self.data.validate()?;

        let bytes = serde_json::to_vec(&self.data)?;
        let hash_code = blake3::hash(&bytes).to_hex().to_string();

        let stage_columns = [
            Stage::Filter,
            Stage::Select,
            Stage::Pivot,
            Stage::Aggregation,
            Stage::GroupExtend,
            Stage::Sort,
        ]
        .into_iter()
        .map(|stage| (stage, self.data.stage_columns(stage)))
        .collect();

        debug!("Finalized snapshot {} ({})", self.uuid, hash_code);

        Ok(FinalizedSnapshot {
            uuid: self.uuid,
            hash_code,
            data: self.data,
            stage_columns,
        })
    }
}

/// Immutable, validated snapshot
#[derive(Debug, Clone, Serialize)]
pub struct FinalizedSnapshot {
    uuid: Uuid,
    hash_code: String,
    data: QuerySnapshotData,
    #[serde(skip)]
    stage_columns: HashMap<Stage, Vec<Column>>,
}

impl FinalizedSnapshot {
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// blake3 hex digest of the serialized snapshot data
    pub fn hash_code(&self) -> &str {
        &self.hash_code
    }

    pub fn data(&self) -> &QuerySnapshotData {
        &self.data
    }

    pub fn stage_columns(&self, stage: Stage) -> &[Column] {
        self.stage_columns
            .get(&stage)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn find_column(&self, stage: Stage, name: &str) -> Result<&Column, SnapshotError> {
        find_column(self.stage_columns(stage), name)
            .ok_or_else(|| SnapshotError::ColumnNotFound(name.to_string()))
    }

    /// Cast columns produced by the pivot (those carrying pivot values)
    pub fn pivot_result_columns(&self) -> Vec<&Column> {
        self.data
            .pivot
            .iter()
            .flat_map(|pivot| pivot.cast_columns.iter())
            .filter(|column| column.name.contains(PIVOT_COLUMN_NAME_VALUE_SEPARATOR))
            .collect()
    }

    /// Deep copy into a new draft with a fresh identity
    pub fn clone_draft(&self) -> QuerySnapshot {
        QuerySnapshot {
            uuid: Uuid::new_v4(),
            data: self.data.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pure::Expr;
    use std::sync::Arc;
    use std::thread;

    fn draft() -> QuerySnapshot {
        QuerySnapshot::new(
            "test",
            serde_json::Value::Null,
            vec![
                Column::new("a", DataType::String),
                Column::new("b", DataType::Integer),
            ],
        )
    }

    fn extend(name: &str) -> ExtendColumn {
        ExtendColumn {
            name: name.to_string(),
            data_type: DataType::Integer,
            map_fn: Lambda {
                parameters: vec!["x".to_string()],
                body: vec![Expr::Integer(1)],
            },
        }
    }

    #[test]
    fn test_stage_columns() {
        let mut snapshot = draft();
        snapshot.data.leaf_extended_columns.push(extend("c"));
        snapshot.data.select_columns = vec![
            Column::new("a", DataType::String),
            Column::new("c", DataType::Integer),
        ];
        snapshot.data.group_by = Some(GroupBy {
            columns: vec![Column::new("a", DataType::String)],
            agg_columns: vec![AggColumn {
                name: "c".to_string(),
                data_type: DataType::Integer,
                operator: AggregateOperator::Sum,
                parameters: vec![],
            }],
            sort_direction: SortDirection::Ascending,
        });
        snapshot.data.group_extended_columns.push(extend("d"));

        let finalized = snapshot.finalize().unwrap();
        let names = |stage| -> Vec<String> {
            finalized.stage_columns(stage).iter().map(|c| c.name.clone()).collect()
        };
        assert_eq!(names(Stage::Filter), vec!["a", "b", "c"]);
        assert_eq!(names(Stage::Pivot), vec!["a", "c"]);
        assert_eq!(names(Stage::Aggregation), vec!["a", "c"]);
        assert_eq!(names(Stage::GroupExtend), vec!["a", "c"]);
        assert_eq!(names(Stage::Sort), vec!["a", "c", "d"]);
        assert!(finalized.find_column(Stage::Sort, "d").is_ok());
        assert_eq!(
            finalized.find_column(Stage::GroupExtend, "d").unwrap_err().to_string(),
            "Can't find column 'd'"
        );
    }

    #[test]
    fn test_finalize_rejects_duplicates() {
        let mut snapshot = draft();
        snapshot.data.leaf_extended_columns.push(extend("a"));
        let err = snapshot.finalize().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can't finalize snapshot: found duplicate leaf-level visible columns 'a'"
        );

        let mut snapshot = draft();
        snapshot.data.sort_columns = vec![
            SortColumn {
                name: "a".to_string(),
                data_type: DataType::String,
                direction: SortDirection::Ascending,
            };
            2
        ];
        assert!(snapshot.finalize().is_err());
    }

    #[test]
    fn test_finalize_rejects_empty_filter_groups() {
        let empty = || FilterGroup {
            group_operator: FilterGroupOperator::And,
            conditions: vec![],
            not: false,
        };
        let mut snapshot = draft();
        snapshot.data.filter = Some(empty());
        assert_eq!(
            snapshot.finalize().unwrap_err().to_string(),
            "Can't finalize snapshot: found empty filter group"
        );

        let mut snapshot = draft();
        snapshot.data.filter = Some(FilterGroup {
            group_operator: FilterGroupOperator::Or,
            conditions: vec![
                FilterNode::Condition(FilterCondition {
                    name: "a".to_string(),
                    data_type: DataType::String,
                    operator: FilterOperator::IsNull,
                    value: None,
                    not: false,
                }),
                FilterNode::Group(empty()),
            ],
            not: false,
        });
        assert!(snapshot.finalize().is_err());
    }

    #[test]
    fn test_clone_draft_is_independent() {
        let finalized = draft().finalize().unwrap();
        let mut copy = finalized.clone_draft();
        assert_ne!(copy.uuid, finalized.uuid());
        copy.data.limit = Some(5);
        assert_eq!(finalized.data().limit, None);

        let refinalized = copy.finalize().unwrap();
        assert_ne!(refinalized.hash_code(), finalized.hash_code());
    }

    #[test]
    fn test_hash_code_is_content_based() {
        let first = draft().finalize().unwrap();
        let second = draft().finalize().unwrap();
        assert_ne!(first.uuid(), second.uuid());
        assert_eq!(first.hash_code(), second.hash_code());
        assert_eq!(first.hash_code().len(), 64);
    }

    #[test]
    fn test_pivot_result_columns() {
        let mut snapshot = draft();
        snapshot.data.pivot = Some(Pivot {
            columns: vec![Column::new("a", DataType::String)],
            agg_columns: vec![],
            cast_columns: vec![
                Column::new("x__|__b", DataType::Integer),
                Column::new("d", DataType::String),
            ],
            sort_direction: SortDirection::Ascending,
        });
        let finalized = snapshot.finalize().unwrap();
        let names: Vec<_> = finalized
            .pivot_result_columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["x__|__b"]);
    }

    #[test]
    fn test_share_across_threads() {
        let finalized = Arc::new(draft().finalize().unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let snapshot = Arc::clone(&finalized);
                thread::spawn(move || snapshot.stage_columns(Stage::Sort).len())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 2);
        }
    }

    #[test]
    fn test_to_json() {
        let finalized = draft().finalize().unwrap();
        let json: serde_json::Value = serde_json::from_str(&finalized.to_json().unwrap()).unwrap();
        assert_eq!(json["data"]["source_columns"][1]["type"], "Integer");
        assert_eq!(json["hash_code"], finalized.hash_code());
    }
}
