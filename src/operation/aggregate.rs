//! Aggregate operator registry.
//!
//! Aggregate columns have the shape `~name:x|$x.name:x|$x->op(params...)`;
//! each operator recognizes its own `op` and rebuilds the column spec.

use super::{row_column, ROW_VARIABLE};
use crate::pure::{ColSpec, Expr, Lambda};
use crate::snapshot::AggColumn;
use crate::value::{Column, DataTypeKind, LiteralValue, OperationValue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateOperator {
    Sum,
    Average,
    Count,
    Min,
    Max,
    UniqueValueOnly,
    First,
    Last,
    VariancePopulation,
    VarianceSample,
    StdDevPopulation,
    StdDevSample,
    JoinStrings,
}

/// Registry order used when matching aggregate columns
pub const AGGREGATE_OPERATORS: [AggregateOperator; 13] = [
    AggregateOperator::Sum,
    AggregateOperator::Average,
    AggregateOperator::Count,
    AggregateOperator::Min,
    AggregateOperator::Max,
    AggregateOperator::UniqueValueOnly,
    AggregateOperator::First,
    AggregateOperator::Last,
    AggregateOperator::VariancePopulation,
    AggregateOperator::VarianceSample,
    AggregateOperator::StdDevPopulation,
    AggregateOperator::StdDevSample,
    AggregateOperator::JoinStrings,
];

impl AggregateOperator {
    /// Pure function applied to the grouped values
    pub fn function_name(&self) -> &'static str {
        match self {
            AggregateOperator::Sum => "sum",
            AggregateOperator::Average => "average",
            AggregateOperator::Count => "count",
            AggregateOperator::Min => "min",
            AggregateOperator::Max => "max",
            AggregateOperator::UniqueValueOnly => "uniqueValueOnly",
            AggregateOperator::First => "first",
            AggregateOperator::Last => "last",
            AggregateOperator::VariancePopulation => "variancePopulation",
            AggregateOperator::VarianceSample => "varianceSample",
            AggregateOperator::StdDevPopulation => "stdDevPopulation",
            AggregateOperator::StdDevSample => "stdDevSample",
            AggregateOperator::JoinStrings => "joinStrings",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AggregateOperator::Sum => "sum",
            AggregateOperator::Average => "avg",
            AggregateOperator::Count => "count",
            AggregateOperator::Min => "min",
            AggregateOperator::Max => "max",
            AggregateOperator::UniqueValueOnly => "unique",
            AggregateOperator::First => "first",
            AggregateOperator::Last => "last",
            AggregateOperator::VariancePopulation => "var",
            AggregateOperator::VarianceSample => "var (sample)",
            AggregateOperator::StdDevPopulation => "std",
            AggregateOperator::StdDevSample => "std (sample)",
            AggregateOperator::JoinStrings => "join",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AggregateOperator::Sum => "sum",
            AggregateOperator::Average => "average",
            AggregateOperator::Count => "count",
            AggregateOperator::Min => "minimum",
            AggregateOperator::Max => "maximum",
            AggregateOperator::UniqueValueOnly => "unique value only, empty otherwise",
            AggregateOperator::First => "first value",
            AggregateOperator::Last => "last value",
            AggregateOperator::VariancePopulation => "variance (population)",
            AggregateOperator::VarianceSample => "variance (sample)",
            AggregateOperator::StdDevPopulation => "standard deviation (population)",
            AggregateOperator::StdDevSample => "standard deviation (sample)",
            AggregateOperator::JoinStrings => "join strings with a delimiter",
        }
    }

    pub fn is_compatible_with_column(&self, column: &Column) -> bool {
        let kind = column.data_type.kind();
        match self {
            AggregateOperator::Sum
            | AggregateOperator::Average
            | AggregateOperator::Count
            | AggregateOperator::VariancePopulation
            | AggregateOperator::VarianceSample
            | AggregateOperator::StdDevPopulation
            | AggregateOperator::StdDevSample => kind == DataTypeKind::Number,
            AggregateOperator::Min | AggregateOperator::Max => {
                kind == DataTypeKind::Number || kind.is_temporal()
            }
            AggregateOperator::UniqueValueOnly
            | AggregateOperator::First
            | AggregateOperator::Last => true,
            AggregateOperator::JoinStrings => kind == DataTypeKind::Text,
        }
    }

    pub fn is_compatible_with_parameter_values(&self, values: &[OperationValue]) -> bool {
        match self {
            AggregateOperator::JoinStrings => matches!(
                values,
                [OperationValue::Literal {
                    value: LiteralValue::String(_),
                    ..
                }]
            ),
            _ => values.is_empty(),
        }
    }

    pub fn generate_default_parameter_values(&self, _column: &Column) -> Vec<OperationValue> {
        match self {
            AggregateOperator::JoinStrings => vec![OperationValue::string(",")],
            _ => Vec::new(),
        }
    }

    /// Default aggregation of a measure column
    pub fn default_for(column: &Column) -> Self {
        if column.data_type.kind() == DataTypeKind::Number {
            AggregateOperator::Sum
        } else {
            AggregateOperator::UniqueValueOnly
        }
    }

    /// Recognize `colspec` as an aggregate column of this operator
    pub fn build_agg_column(&self, colspec: &ColSpec, columns: &[Column]) -> Option<AggColumn> {
        let map_fn = row_lambda_body(colspec.function1.as_ref()?)?;
        let column = row_column(map_fn, columns)?;
        if column.name != colspec.name {
            return None;
        }

        let reduce_fn = row_lambda_body(colspec.function2.as_ref()?)?;
        let call = reduce_fn.as_call_named(self.function_name())?;
        let (receiver, rest) = call.parameters.split_first()?;
        if *receiver != Expr::variable(ROW_VARIABLE) {
            return None;
        }
        let parameters = rest
            .iter()
            .map(OperationValue::from_literal)
            .collect::<Option<Vec<_>>>()?;

        if !self.is_compatible_with_column(column)
            || !self.is_compatible_with_parameter_values(&parameters)
        {
            return None;
        }

        Some(AggColumn {
            name: column.name.clone(),
            data_type: column.data_type,
            operator: *self,
            parameters,
        })
    }

    /// Rebuild `~name:x|$x.name:x|$x->op(params...)`
    pub fn build_agg_column_expression(&self, column: &AggColumn) -> ColSpec {
        let mut parameters = vec![Expr::variable(ROW_VARIABLE)];
        parameters.extend(column.parameters.iter().map(|p| p.to_expr(ROW_VARIABLE)));

        ColSpec {
            name: column.name.clone(),
            function1: Some(row_lambda(Expr::property(ROW_VARIABLE, &column.name))),
            function2: Some(row_lambda(Expr::call(self.function_name(), parameters))),
        }
    }
}

/// Offer `colspec` to every operator in registry order
pub fn build_agg_column(colspec: &ColSpec, columns: &[Column]) -> Option<AggColumn> {
    AGGREGATE_OPERATORS
        .iter()
        .find_map(|operator| operator.build_agg_column(colspec, columns))
}

/// Body of a single-expression `x|...` lambda
fn row_lambda_body(lambda: &Lambda) -> Option<&Expr> {
    match (lambda.parameters.as_slice(), lambda.body.as_slice()) {
        ([parameter], [body]) if parameter == ROW_VARIABLE => Some(body),
        _ => None,
    }
}

fn row_lambda(body: Expr) -> Lambda {
    Lambda {
        parameters: vec![ROW_VARIABLE.to_string()],
        body: vec![body],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pure::parse;
    use crate::value::DataType;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("a", DataType::String),
            Column::new("b", DataType::Integer),
            Column::new("d", DataType::StrictDate),
        ]
    }

    fn colspec(code: &str) -> ColSpec {
        match parse(code).unwrap() {
            Expr::ColSpec(colspec) => colspec,
            other => panic!("Expected column specification, got {:?}", other),
        }
    }

    fn operator_of(code: &str) -> Option<AggregateOperator> {
        build_agg_column(&colspec(code), &columns()).map(|c| c.operator)
    }

    #[test]
    fn test_match_aggregates() {
        assert_eq!(operator_of("~b:x|$x.b:x|$x->sum()"), Some(AggregateOperator::Sum));
        assert_eq!(operator_of("~d:x|$x.d:x|$x->max()"), Some(AggregateOperator::Max));
        assert_eq!(
            operator_of("~a:x|$x.a:x|$x->uniqueValueOnly()"),
            Some(AggregateOperator::UniqueValueOnly)
        );
        assert_eq!(
            operator_of("~a:x|$x.a:x|$x->joinStrings(',')"),
            Some(AggregateOperator::JoinStrings)
        );
    }

    #[test]
    fn test_reject_malformed_aggregates() {
        assert_eq!(operator_of("~b:x|$x.a:x|$x->sum()"), None);
        assert_eq!(operator_of("~b:y|$y.b:y|$y->sum()"), None);
        assert_eq!(operator_of("~b:x|$x.b"), None);
        assert_eq!(operator_of("~b:x|$x.b:x|$x->sum(1)"), None);
        assert_eq!(operator_of("~b:x|$x.b:x|$x->unknown()"), None);
        assert_eq!(operator_of("~c:x|$x.c:x|$x->sum()"), None);
    }

    #[test]
    fn test_type_gates() {
        assert_eq!(operator_of("~a:x|$x.a:x|$x->sum()"), None);
        assert_eq!(operator_of("~a:x|$x.a:x|$x->count()"), None);
        assert_eq!(operator_of("~a:x|$x.a:x|$x->min()"), None);
        assert_eq!(operator_of("~b:x|$x.b:x|$x->joinStrings(',')"), None);
        assert_eq!(operator_of("~a:x|$x.a:x|$x->joinStrings(1)"), None);
        assert_eq!(operator_of("~a:x|$x.a:x|$x->joinStrings()"), None);
    }

    #[test]
    fn test_build_agg_column_expression() {
        for code in ["~b:x|$x.b:x|$x->stdDevSample()", "~a:x|$x.a:x|$x->joinStrings(', ')"] {
            let colspec = colspec(code);
            let column = build_agg_column(&colspec, &columns()).unwrap();
            assert_eq!(column.operator.build_agg_column_expression(&column), colspec);
        }
    }

    #[test]
    fn test_defaults() {
        let number = Column::new("b", DataType::Float);
        let text = Column::new("a", DataType::String);
        assert_eq!(AggregateOperator::default_for(&number), AggregateOperator::Sum);
        assert_eq!(AggregateOperator::default_for(&text), AggregateOperator::UniqueValueOnly);
        assert_eq!(
            AggregateOperator::JoinStrings.generate_default_parameter_values(&text),
            vec![OperationValue::string(",")]
        );
        assert!(AggregateOperator::Sum.generate_default_parameter_values(&number).is_empty());
        assert_eq!(
            serde_json::to_value(AggregateOperator::UniqueValueOnly).unwrap(),
            "UNIQUE_VALUE_ONLY"
        );
    }
}
