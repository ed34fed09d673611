//! Code generation from a finalized snapshot.
//!
//! Emits the pipeline in grammar order, one call per clause, each call
//! taking the previous one as its source. Re-analyzing the output yields
//! the same logical clauses.

use crate::operation::ROW_VARIABLE;
use crate::pure::{ColSpec, Expr, GenericType, RelationColumnType};
use crate::snapshot::{
    AggColumn, ExtendColumn, FilterGroup, FilterNode, FinalizedSnapshot, SortDirection,
};
use crate::value::Column;
use log::debug;

const RELATION_TYPE_PATH: &str = "meta::pure::metamodel::relation::Relation";

/// Arrow chain under construction
#[derive(Default)]
struct Chain {
    current: Option<Expr>,
}

impl Chain {
    fn push(&mut self, function: &str, arguments: Vec<Expr>) {
        let mut parameters = Vec::with_capacity(arguments.len() + 1);
        parameters.extend(self.current.take());
        parameters.extend(arguments);
        self.current = Some(Expr::call(function, parameters));
    }
}

/// Generate the query expression for `snapshot`; `None` when it has no clause
pub fn generate(snapshot: &FinalizedSnapshot) -> Option<Expr> {
    let data = snapshot.data();
    let mut chain = Chain::default();

    for column in &data.leaf_extended_columns {
        chain.push("extend", vec![extend_argument(column)]);
    }

    if let Some(filter) = &data.filter {
        chain.push("filter", vec![Expr::lambda(ROW_VARIABLE, group_expression(filter))]);
    }

    if !data.select_columns.is_empty() {
        chain.push("select", vec![colspec_array(&data.select_columns)]);
    }

    if let Some(pivot) = &data.pivot {
        chain.push("sort", vec![sort_argument(&pivot.columns, pivot.sort_direction)]);
        chain.push(
            "pivot",
            vec![colspec_array(&pivot.columns), agg_argument(&pivot.agg_columns)],
        );
        chain.push("cast", vec![relation_type(&pivot.cast_columns)]);
    }

    if let Some(group_by) = &data.group_by {
        chain.push(
            "groupBy",
            vec![colspec_array(&group_by.columns), agg_argument(&group_by.agg_columns)],
        );
        chain.push(
            "sort",
            vec![sort_argument(&group_by.columns, group_by.sort_direction)],
        );
    }

    for column in &data.group_extended_columns {
        chain.push("extend", vec![extend_argument(column)]);
    }

    if !data.sort_columns.is_empty() {
        let items = data
            .sort_columns
            .iter()
            .map(|column| sort_item(&column.name, column.direction))
            .collect();
        chain.push("sort", vec![Expr::Collection(items)]);
    }

    if let Some(limit) = data.limit {
        chain.push("limit", vec![Expr::Integer(limit as i64)]);
    }

    if chain.current.is_none() {
        debug!("Snapshot {} has no clause to generate", snapshot.uuid());
    }
    chain.current
}

/// Generate the query text for `snapshot`
pub fn generate_code(snapshot: &FinalizedSnapshot) -> Option<String> {
    generate(snapshot).map(|expr| expr.to_string())
}

/// Fold a filter group into binary `and`/`or` calls, left to right
pub fn group_expression(group: &FilterGroup) -> Expr {
    negate_if(group_body(group), group.not)
}

// Empty groups are refused at finalization
fn group_body(group: &FilterGroup) -> Expr {
    let function = group.group_operator.function_name();
    group
        .conditions
        .iter()
        .map(node_expression)
        .reduce(|left, right| Expr::call(function, vec![left, right]))
        .unwrap_or(Expr::Boolean(true))
}

fn node_expression(node: &FilterNode) -> Expr {
    let expr = match node {
        FilterNode::Group(group) => group_body(group),
        FilterNode::Condition(condition) => condition.operator.build_expression(condition),
    };
    negate_if(expr, node.is_negated())
}

fn negate_if(expr: Expr, not: bool) -> Expr {
    if not {
        Expr::not(expr)
    } else {
        expr
    }
}

fn extend_argument(column: &ExtendColumn) -> Expr {
    Expr::ColSpecArray(vec![ColSpec {
        name: column.name.clone(),
        function1: Some(column.map_fn.clone()),
        function2: None,
    }])
}

fn colspec(name: &str) -> ColSpec {
    ColSpec {
        name: name.to_string(),
        function1: None,
        function2: None,
    }
}

fn colspec_array(columns: &[Column]) -> Expr {
    Expr::ColSpecArray(columns.iter().map(|column| colspec(&column.name)).collect())
}

fn agg_argument(columns: &[AggColumn]) -> Expr {
    Expr::ColSpecArray(
        columns
            .iter()
            .map(|column| column.operator.build_agg_column_expression(column))
            .collect(),
    )
}

fn sort_item(name: &str, direction: SortDirection) -> Expr {
    Expr::call(direction.function_name(), vec![Expr::ColSpec(colspec(name))])
}

fn sort_argument(columns: &[Column], direction: SortDirection) -> Expr {
    Expr::Collection(
        columns
            .iter()
            .map(|column| sort_item(&column.name, direction))
            .collect(),
    )
}

fn relation_type(columns: &[Column]) -> Expr {
    Expr::GenericType(GenericType {
        path: RELATION_TYPE_PATH.to_string(),
        columns: Some(
            columns
                .iter()
                .map(|column| RelationColumnType {
                    name: column.name.clone(),
                    type_name: column.data_type.to_string(),
                })
                .collect(),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BuiltinTypeResolver;
    use crate::pure::parse;
    use crate::query::{analyze, BaseQuery};
    use crate::snapshot::QuerySnapshot;

    fn roundtrip(code: &str, source: &[&str]) -> String {
        let columns: Vec<Column> = source.iter().map(|s| s.parse().unwrap()).collect();
        let snapshot = analyze(
            &parse(code).unwrap(),
            &columns,
            &BaseQuery::default(),
            &BuiltinTypeResolver,
        )
        .unwrap();
        generate_code(&snapshot).unwrap()
    }

    #[test]
    fn test_generate_pipeline() {
        let code = "extend(~[a:x|1])->filter(x|$x.a == 1)->select(~[a, b])->groupBy(~[a], ~[b:x|$x.b:x|$x->sum()])->sort([~a->ascending()])->extend(~[c:x|2])->sort([~c->descending()])->limit(10)";
        assert_eq!(roundtrip(code, &["b:Integer"]), code);
    }

    #[test]
    fn test_generate_filter_groups() {
        let code = "filter(x|!(($x.Age != 27) && ($x.Name == 'Michael Phelps')) && ($x.Country->startsWith('united') || ($x.Country == 'test')))";
        assert_eq!(
            roundtrip(code, &["Age:Integer", "Name:String", "Country:String"]),
            code
        );
    }

    #[test]
    fn test_generate_pivot() {
        let code = "select(~[a, b, c])->sort([~a->descending()])->pivot(~[a], ~[b:x|$x.b:x|$x->sum(), c:x|$x.c:x|$x->joinStrings(',')])->cast(@meta::pure::metamodel::relation::Relation<(x:Integer, 'y__|__b':Integer)>)";
        assert_eq!(roundtrip(code, &["a:String", "b:Integer", "c:String"]), code);
    }

    #[test]
    fn test_generate_nothing() {
        let snapshot = QuerySnapshot::new("empty", serde_json::Value::Null, vec![])
            .finalize()
            .unwrap();
        assert_eq!(generate(&snapshot), None);
        assert_eq!(generate_code(&snapshot), None);
    }

    #[test]
    fn test_empty_sort_is_dropped() {
        assert_eq!(roundtrip("select(~[a])->sort([])", &["a:Integer"]), "select(~[a])");
    }
}
