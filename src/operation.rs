// Operation module - filter and aggregate operator registries

pub mod aggregate;
pub mod filter;

pub use aggregate::{AggregateOperator, AGGREGATE_OPERATORS};
pub use filter::{FilterOperator, FILTER_OPERATORS};

use crate::catalog::find_column;
use crate::pure::Expr;
use crate::value::Column;

/// Name of the row variable every filter and aggregate lambda must use
pub const ROW_VARIABLE: &str = "x";

/// Resolve `$x.name` against the visible columns
pub(crate) fn row_column<'a>(expr: &Expr, columns: &'a [Column]) -> Option<&'a Column> {
    match expr.as_variable_property() {
        Some((variable, name)) if variable == ROW_VARIABLE => find_column(columns, name),
        _ => None,
    }
}
