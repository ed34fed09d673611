// Query module - pipeline validation, snapshot building, code generation

pub mod builder;
pub mod composition;
pub mod generator;
pub mod interaction;

pub use builder::{build_filter_node, SnapshotBuilder};
pub use composition::{validate, PipelineStage, Step};
pub use generator::{generate, generate_code};
pub use interaction::{derive_from_interaction, GridInteraction, GridSortItem, TREE_COLUMN_ID};

use crate::catalog::TypeResolver;
use crate::error::AnalysisResult;
use crate::pure::{parse, Expr};
use crate::snapshot::FinalizedSnapshot;
use crate::value::Column;
use anyhow::{Context, Result};

/// Identity carried over into every snapshot built from a query
#[derive(Debug, Clone, Default)]
pub struct BaseQuery {
    pub name: String,
    pub configuration: serde_json::Value,
}

/// Analyze a query expression over `source_columns`
pub fn analyze(
    expr: &Expr,
    source_columns: &[Column],
    base: &BaseQuery,
    resolver: &dyn TypeResolver,
) -> AnalysisResult<FinalizedSnapshot> {
    SnapshotBuilder::new(source_columns, base, resolver).build(expr)
}

/// Parse and analyze query text
pub fn analyze_code(
    code: &str,
    source_columns: &[Column],
    base: &BaseQuery,
    resolver: &dyn TypeResolver,
) -> Result<FinalizedSnapshot> {
    let expr = parse(code).with_context(|| format!("Failed to parse query: {}", code))?;
    Ok(analyze(&expr, source_columns, base, resolver)?)
}
