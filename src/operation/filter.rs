//! Filter operator registry.
//!
//! Each operator recognizes one condition shape in a filter lambda body and
//! can rebuild that shape from a snapshot condition. Operators are tried in
//! [`FILTER_OPERATORS`] order; the first match wins.

use super::{row_column, ROW_VARIABLE};
use crate::pure::Expr;
use crate::snapshot::FilterCondition;
use crate::value::{Column, DataType, DataTypeKind, LiteralValue, OperationValue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    LessThan,
    LessThanOrEqual,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThanColumn,
    LessThanOrEqualColumn,
    EqualColumn,
    NotEqualColumn,
    GreaterThanColumn,
    GreaterThanOrEqualColumn,
    EqualCaseInsensitive,
    NotEqualCaseInsensitive,
    EqualCaseInsensitiveColumn,
    NotEqualCaseInsensitiveColumn,
    Contain,
    ContainCaseInsensitive,
    NotContain,
    StartWith,
    StartWithCaseInsensitive,
    NotStartWith,
    EndWith,
    EndWithCaseInsensitive,
    NotEndWith,
    IsNull,
    IsNotNull,
}

/// Registry order used when matching conditions
pub const FILTER_OPERATORS: [FilterOperator; 27] = [
    FilterOperator::LessThan,
    FilterOperator::LessThanOrEqual,
    FilterOperator::Equal,
    FilterOperator::NotEqual,
    FilterOperator::GreaterThan,
    FilterOperator::GreaterThanOrEqual,
    FilterOperator::LessThanColumn,
    FilterOperator::LessThanOrEqualColumn,
    FilterOperator::EqualColumn,
    FilterOperator::NotEqualColumn,
    FilterOperator::GreaterThanColumn,
    FilterOperator::GreaterThanOrEqualColumn,
    FilterOperator::EqualCaseInsensitive,
    FilterOperator::NotEqualCaseInsensitive,
    FilterOperator::EqualCaseInsensitiveColumn,
    FilterOperator::NotEqualCaseInsensitiveColumn,
    FilterOperator::Contain,
    FilterOperator::ContainCaseInsensitive,
    FilterOperator::NotContain,
    FilterOperator::StartWith,
    FilterOperator::StartWithCaseInsensitive,
    FilterOperator::NotStartWith,
    FilterOperator::EndWith,
    FilterOperator::EndWithCaseInsensitive,
    FilterOperator::NotEndWith,
    FilterOperator::IsNull,
    FilterOperator::IsNotNull,
];

const EQUALITY_KINDS: &[DataTypeKind] = &[
    DataTypeKind::Text,
    DataTypeKind::Number,
    DataTypeKind::Date,
    DataTypeKind::Time,
];
const ORDERING_KINDS: &[DataTypeKind] = &[DataTypeKind::Number, DataTypeKind::Date, DataTypeKind::Time];
const TEXT_KINDS: &[DataTypeKind] = &[DataTypeKind::Text];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// `f($x.column, literal)`
    Value,
    /// `f($x.column, $x.other)`
    Column,
    /// `f($x.column)`
    Unary,
}

/// Structural description of an operator's condition expression
#[derive(Debug, Clone, Copy)]
struct Definition {
    function: &'static str,
    shape: Shape,
    case_insensitive: bool,
    negated: bool,
    /// Column kinds the operator applies to; `None` means any
    column_kinds: Option<&'static [DataTypeKind]>,
}

const fn def(
    function: &'static str,
    shape: Shape,
    case_insensitive: bool,
    negated: bool,
    column_kinds: Option<&'static [DataTypeKind]>,
) -> Definition {
    Definition {
        function,
        shape,
        case_insensitive,
        negated,
        column_kinds,
    }
}

impl FilterOperator {
    fn definition(&self) -> Definition {
        use FilterOperator::*;
        use Shape::{Column, Unary, Value};

        let equality = Some(EQUALITY_KINDS);
        let ordering = Some(ORDERING_KINDS);
        let text = Some(TEXT_KINDS);
        match self {
            LessThan => def("lessThan", Value, false, false, ordering),
            LessThanOrEqual => def("lessThanEqual", Value, false, false, ordering),
            Equal => def("equal", Value, false, false, equality),
            NotEqual => def("equal", Value, false, true, equality),
            GreaterThan => def("greaterThan", Value, false, false, ordering),
            GreaterThanOrEqual => def("greaterThanEqual", Value, false, false, ordering),
            LessThanColumn => def("lessThan", Column, false, false, ordering),
            LessThanOrEqualColumn => def("lessThanEqual", Column, false, false, ordering),
            EqualColumn => def("equal", Column, false, false, equality),
            NotEqualColumn => def("equal", Column, false, true, equality),
            GreaterThanColumn => def("greaterThan", Column, false, false, ordering),
            GreaterThanOrEqualColumn => def("greaterThanEqual", Column, false, false, ordering),
            EqualCaseInsensitive => def("equal", Value, true, false, text),
            NotEqualCaseInsensitive => def("equal", Value, true, true, text),
            EqualCaseInsensitiveColumn => def("equal", Column, true, false, text),
            NotEqualCaseInsensitiveColumn => def("equal", Column, true, true, text),
            Contain => def("contains", Value, false, false, text),
            ContainCaseInsensitive => def("contains", Value, true, false, text),
            NotContain => def("contains", Value, false, true, text),
            StartWith => def("startsWith", Value, false, false, text),
            StartWithCaseInsensitive => def("startsWith", Value, true, false, text),
            NotStartWith => def("startsWith", Value, false, true, text),
            EndWith => def("endsWith", Value, false, false, text),
            EndWithCaseInsensitive => def("endsWith", Value, true, false, text),
            NotEndWith => def("endsWith", Value, false, true, text),
            IsNull => def("isEmpty", Unary, false, false, None),
            IsNotNull => def("isEmpty", Unary, false, true, None),
        }
    }

    pub fn label(&self) -> &'static str {
        use FilterOperator::*;
        match self {
            LessThan => "<",
            LessThanOrEqual => "<=",
            Equal => "=",
            NotEqual => "!=",
            GreaterThan => ">",
            GreaterThanOrEqual => ">=",
            LessThanColumn => "< value in column",
            LessThanOrEqualColumn => "<= value in column",
            EqualColumn => "= value in column",
            NotEqualColumn => "!= value in column",
            GreaterThanColumn => "> value in column",
            GreaterThanOrEqualColumn => ">= value in column",
            EqualCaseInsensitive => "= (case-insensitive)",
            NotEqualCaseInsensitive => "!= (case-insensitive)",
            EqualCaseInsensitiveColumn => "= (case-insensitive) value in column",
            NotEqualCaseInsensitiveColumn => "!= (case-insensitive) value in column",
            Contain => "contains",
            ContainCaseInsensitive => "contains (case-insensitive)",
            NotContain => "does not contain",
            StartWith => "starts with",
            StartWithCaseInsensitive => "starts with (case-insensitive)",
            NotStartWith => "does not start with",
            EndWith => "ends with",
            EndWithCaseInsensitive => "ends with (case-insensitive)",
            NotEndWith => "does not end with",
            IsNull => "is null",
            IsNotNull => "is not null",
        }
    }

    pub fn description(&self) -> &'static str {
        use FilterOperator::*;
        match self {
            LessThan => "is less than",
            LessThanOrEqual => "is less than or equal to",
            Equal => "equals to",
            NotEqual => "does not equal",
            GreaterThan => "is greater than",
            GreaterThanOrEqual => "is greater than or equal to",
            LessThanColumn => "is less than value in column",
            LessThanOrEqualColumn => "is less than or equal to value in column",
            EqualColumn => "equals to value in column",
            NotEqualColumn => "does not equal value in column",
            GreaterThanColumn => "is greater than value in column",
            GreaterThanOrEqualColumn => "is greater than or equal to value in column",
            EqualCaseInsensitive => "equals to (case-insensitive)",
            NotEqualCaseInsensitive => "does not equal (case-insensitive)",
            EqualCaseInsensitiveColumn => "equals to (case-insensitive) value in column",
            NotEqualCaseInsensitiveColumn => "does not equal (case-insensitive) value in column",
            Contain => "contains",
            ContainCaseInsensitive => "contains (case-insensitive)",
            NotContain => "does not contain",
            StartWith => "starts with",
            StartWithCaseInsensitive => "starts with (case-insensitive)",
            NotStartWith => "does not start with",
            EndWith => "ends with",
            EndWithCaseInsensitive => "ends with (case-insensitive)",
            NotEndWith => "does not end with",
            IsNull => "is null",
            IsNotNull => "is not null",
        }
    }

    pub fn is_compatible_with_column(&self, column: &Column) -> bool {
        self.definition()
            .column_kinds
            .map_or(true, |kinds| kinds.contains(&column.data_type.kind()))
    }

    /// Whether `value` has the form this operator takes as its right-hand side
    pub fn is_compatible_with_value(&self, value: Option<&OperationValue>) -> bool {
        let definition = self.definition();
        match (definition.shape, value) {
            (Shape::Unary, None) => true,
            (Shape::Column, Some(OperationValue::Column { .. })) => true,
            (Shape::Value, Some(OperationValue::Literal { data_type, value })) => {
                let kind = data_type.kind();
                if definition.column_kinds == Some(TEXT_KINDS) {
                    kind == DataTypeKind::Text && matches!(value, LiteralValue::String(_))
                } else {
                    definition
                        .column_kinds
                        .map_or(true, |kinds| kinds.contains(&kind))
                }
            }
            _ => false,
        }
    }

    /// Value a new condition on `column` starts with
    pub fn generate_default_value(&self, column: &Column) -> Option<OperationValue> {
        match self.definition().shape {
            Shape::Value => Some(default_literal(column.data_type)),
            Shape::Column => Some(OperationValue::column(&column.name)),
            Shape::Unary => None,
        }
    }

    /// Recognize `expr` as a condition of this operator over `columns`
    pub fn build_condition(&self, expr: &Expr, columns: &[Column]) -> Option<FilterCondition> {
        let definition = self.definition();
        let expr = if definition.negated {
            expr.as_call()?.unary_parameter("not")?
        } else {
            expr
        };
        let call = expr.as_call()?;

        let (column, value) = match definition.shape {
            Shape::Unary => {
                let operand = call.unary_parameter(definition.function)?;
                (row_column(operand, columns)?, None)
            }
            Shape::Value | Shape::Column => {
                let (mut lhs, mut rhs) = call.binary_parameters(definition.function)?;
                if definition.case_insensitive {
                    lhs = unwrap_to_lower(lhs)?;
                    rhs = unwrap_to_lower(rhs)?;
                }
                let column = row_column(lhs, columns)?;
                let kind = column.data_type.kind();
                let value = if definition.shape == Shape::Column {
                    let other = row_column(rhs, columns)?;
                    if !other.data_type.kind().matches(kind) {
                        return None;
                    }
                    OperationValue::column(&other.name)
                } else {
                    let value = OperationValue::from_literal(rhs)?;
                    if !value.literal_kind()?.matches(kind) {
                        return None;
                    }
                    value
                };
                (column, Some(value))
            }
        };

        if !self.is_compatible_with_column(column) || !self.is_compatible_with_value(value.as_ref()) {
            return None;
        }

        Some(FilterCondition {
            name: column.name.clone(),
            data_type: column.data_type,
            operator: *self,
            value,
            not: false,
        })
    }

    /// Rebuild the condition expression (without the condition's own `not` flag)
    pub fn build_expression(&self, condition: &FilterCondition) -> Expr {
        let definition = self.definition();
        let column = Expr::property(ROW_VARIABLE, &condition.name);

        let expr = match definition.shape {
            Shape::Unary => Expr::call(definition.function, vec![column]),
            Shape::Value | Shape::Column => {
                let value = match &condition.value {
                    Some(value) => value.to_expr(ROW_VARIABLE),
                    None => default_literal(condition.data_type).to_expr(ROW_VARIABLE),
                };
                let (lhs, rhs) = if definition.case_insensitive {
                    (
                        Expr::call("toLower", vec![column]),
                        Expr::call("toLower", vec![value]),
                    )
                } else {
                    (column, value)
                };
                Expr::call(definition.function, vec![lhs, rhs])
            }
        };

        if definition.negated {
            Expr::not(expr)
        } else {
            expr
        }
    }
}

/// Offer `expr` to every operator in registry order
pub fn build_condition(expr: &Expr, columns: &[Column]) -> Option<FilterCondition> {
    FILTER_OPERATORS
        .iter()
        .find_map(|operator| operator.build_condition(expr, columns))
}

fn unwrap_to_lower(expr: &Expr) -> Option<&Expr> {
    expr.as_call()?.unary_parameter("toLower")
}

fn default_literal(data_type: DataType) -> OperationValue {
    let value = match data_type {
        DataType::String => LiteralValue::String(String::new()),
        DataType::Boolean => LiteralValue::Boolean(false),
        DataType::Integer => LiteralValue::Integer(0),
        DataType::Float | DataType::Decimal | DataType::Number => LiteralValue::Float(0.0),
        DataType::Date | DataType::StrictDate => LiteralValue::String("1970-01-01".to_string()),
        DataType::DateTime => LiteralValue::String("1970-01-01T00:00:00".to_string()),
    };
    OperationValue::Literal { data_type, value }
}
