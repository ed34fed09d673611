//! Clause builders.
//!
//! Walks the validated pipeline steps in order and fills a snapshot draft.
//! Each clause resolves its columns against the columns visible at its
//! stage of the draft built so far.

use super::composition::{self, PipelineStage, Step};
use super::BaseQuery;
use crate::catalog::{find_column, find_duplicate, get_column, TypeResolver};
use crate::error::{AnalysisResult, Clause, ClauseError, OperatorMatchError, TypeCheckError};
use crate::operation::{aggregate, filter, ROW_VARIABLE};
use crate::pure::{ColSpec, Expr, FunctionCall};
use crate::snapshot::{
    AggColumn, ExtendColumn, FilterGroup, FilterGroupOperator, FilterNode, FinalizedSnapshot,
    GroupBy, Pivot, QuerySnapshot, SortColumn, SortDirection, Stage,
};
use crate::value::{Column, DataType};
use log::{debug, trace};

/// Builds a snapshot from a query expression
pub struct SnapshotBuilder<'a> {
    snapshot: QuerySnapshot,
    resolver: &'a dyn TypeResolver,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(source_columns: &[Column], base: &BaseQuery, resolver: &'a dyn TypeResolver) -> Self {
        Self {
            snapshot: QuerySnapshot::new(
                &base.name,
                base.configuration.clone(),
                source_columns.to_vec(),
            ),
            resolver,
        }
    }

    /// Validate the composition of `expr`, build every clause and finalize
    pub fn build(mut self, expr: &Expr) -> AnalysisResult<FinalizedSnapshot> {
        let steps = composition::validate(expr)?;

        let source = &self.snapshot.data.source_columns;
        if let Some(name) = find_duplicate(source.iter().map(|c| c.name.as_str())) {
            return Err(ClauseError::Source(format!(
                "found duplicate source columns '{}'",
                name
            ))
            .into());
        }

        debug!(
            "Building snapshot from {} clause(s) over {} source column(s)",
            steps.len(),
            source.len()
        );

        let mut previous: Option<&Step> = None;
        for step in &steps {
            trace!("Processing {:?} step", step.stage);
            match (step.stage, previous) {
                (PipelineStage::LeafExtend, _) => self.process_extend(step, Stage::Filter)?,
                (PipelineStage::Filter, _) => self.process_filter(step)?,
                (PipelineStage::Select, _) => self.process_select(step)?,
                (PipelineStage::Pivot, Some(sort)) => self.process_pivot(step, sort)?,
                (PipelineStage::PivotCast, _) => self.process_cast(step)?,
                (PipelineStage::GroupBySort, Some(group_by)) => {
                    self.process_group_by(group_by, step)?
                }
                (PipelineStage::GroupExtend, _) => self.process_extend(step, Stage::Sort)?,
                (PipelineStage::Sort, _) => self.process_sort(step)?,
                (PipelineStage::Limit, _) => self.process_limit(step)?,
                // Bracketed sort and groupBy are handled together with their partner
                _ => {}
            }
            previous = Some(step);
        }

        let snapshot = self.snapshot.finalize()?;
        debug!("Built snapshot {}", snapshot.uuid());
        Ok(snapshot)
    }

    fn process_extend(&mut self, step: &Step, stage: Stage) -> AnalysisResult<()> {
        let clause = Clause::Extend;
        let specs = colspec_list(step, 0)?;
        if specs.len() != 1 {
            return Err(ClauseError::invalid(
                clause,
                format!("expected 1 column specification, got {}", specs.len()),
            )
            .into());
        }

        let spec = &specs[0];
        let map_fn = match (&spec.function1, &spec.function2) {
            (Some(map_fn), None) => map_fn,
            (Some(_), Some(_)) => {
                return Err(ClauseError::invalid(
                    clause,
                    format!("found unexpected aggregation function for column '{}'", spec.name),
                )
                .into())
            }
            (None, _) => {
                return Err(ClauseError::invalid(
                    clause,
                    format!(
                        "expected a transformation function expression for column '{}'",
                        spec.name
                    ),
                )
                .into())
            }
        };

        let columns = self.snapshot.data.stage_columns(stage);
        let resolved = self.resolver.resolve_extend(&columns, &spec.name, map_fn)?;
        let data_type = find_column(&resolved, &spec.name)
            .map(|column| column.data_type)
            .ok_or_else(|| TypeCheckError::PropertyNotFound(spec.name.clone()))?;

        let column = ExtendColumn {
            name: spec.name.clone(),
            data_type,
            map_fn: map_fn.clone(),
        };
        if stage == Stage::Filter {
            self.snapshot.data.leaf_extended_columns.push(column);
        } else {
            self.snapshot.data.group_extended_columns.push(column);
        }
        Ok(())
    }

    fn process_filter(&mut self, step: &Step) -> AnalysisResult<()> {
        let clause = Clause::Filter;
        let lambda = match step.arguments().first() {
            Some(Expr::Lambda(lambda)) => lambda,
            _ => {
                return Err(ClauseError::invalid(
                    clause,
                    "expected parameter at index 0 to be a lambda expression",
                )
                .into())
            }
        };
        let [body] = lambda.body.as_slice() else {
            return Err(ClauseError::invalid(
                clause,
                "expected lambda body to have exactly 1 expression",
            )
            .into());
        };
        match lambda.parameters.as_slice() {
            [variable] if variable == ROW_VARIABLE => {}
            parameters => {
                return Err(ClauseError::Variable {
                    name: parameters.first().cloned().unwrap_or_default(),
                    expected: ROW_VARIABLE.to_string(),
                }
                .into())
            }
        }

        let columns = self.snapshot.data.stage_columns(Stage::Filter);
        let root = match build_filter_node(body, &columns)? {
            FilterNode::Group(group) => group,
            condition => FilterGroup {
                group_operator: FilterGroupOperator::And,
                conditions: vec![condition],
                not: false,
            },
        };
        self.snapshot.data.filter = Some(root);
        Ok(())
    }

    fn process_select(&mut self, step: &Step) -> AnalysisResult<()> {
        let columns = self.snapshot.data.stage_columns(Stage::Select);
        let specs = colspec_list(step, 0)?;
        if specs.is_empty() {
            return Err(ClauseError::invalid(Clause::Select, "expected at least 1 column").into());
        }
        let selected = resolve_columns(specs, &columns)?;
        check_duplicates(Clause::Select, "select", selected.iter().map(|c| c.name.as_str()))?;
        self.snapshot.data.select_columns = selected;
        Ok(())
    }

    fn process_pivot(&mut self, step: &Step, sort: &Step) -> AnalysisResult<()> {
        let columns = self.snapshot.data.stage_columns(Stage::Pivot);
        let pivot_columns = resolve_columns(colspec_list(step, 0)?, &columns)?;
        let agg_columns = build_agg_columns(colspec_list(step, 1)?, &columns)?;
        let sort_direction =
            check_bracketed_sort(Clause::Pivot, "pivot", &pivot_columns, &agg_columns, sort)?;

        self.snapshot.data.pivot = Some(Pivot {
            columns: pivot_columns,
            agg_columns,
            cast_columns: Vec::new(),
            sort_direction,
        });
        Ok(())
    }

    fn process_cast(&mut self, step: &Step) -> AnalysisResult<()> {
        let clause = Clause::Cast;
        let relation_columns = match step.arguments().first() {
            Some(Expr::GenericType(generic)) => generic.columns.as_ref(),
            _ => None,
        }
        .ok_or_else(|| {
            ClauseError::invalid(clause, "expected parameter at index 0 to be a relation type")
        })?;

        let mut cast_columns = Vec::with_capacity(relation_columns.len());
        for column in relation_columns {
            let data_type: DataType = column.type_name.parse().map_err(|_| {
                ClauseError::invalid(
                    clause,
                    format!("found unsupported type '{}' for column '{}'", column.type_name, column.name),
                )
            })?;
            cast_columns.push(Column::new(&column.name, data_type));
        }

        let pivot = self.snapshot.data.pivot.as_mut().ok_or_else(|| {
            ClauseError::invalid(clause, "expected a preceding pivot() expression")
        })?;
        pivot.cast_columns = cast_columns;
        Ok(())
    }

    fn process_group_by(&mut self, step: &Step, sort: &Step) -> AnalysisResult<()> {
        let columns = self.snapshot.data.stage_columns(Stage::Aggregation);
        let group_columns = resolve_columns(colspec_list(step, 0)?, &columns)?;
        let agg_columns = build_agg_columns(colspec_list(step, 1)?, &columns)?;
        let sort_direction =
            check_bracketed_sort(Clause::GroupBy, "group", &group_columns, &agg_columns, sort)?;

        self.snapshot.data.group_by = Some(GroupBy {
            columns: group_columns,
            agg_columns,
            sort_direction,
        });
        Ok(())
    }

    fn process_sort(&mut self, step: &Step) -> AnalysisResult<()> {
        let columns = self.snapshot.data.stage_columns(Stage::Sort);
        let mut sort_columns = Vec::new();
        for (name, direction) in sort_items(step)? {
            let column = get_column(&columns, &name)?;
            sort_columns.push(SortColumn {
                name: column.name.clone(),
                data_type: column.data_type,
                direction,
            });
        }
        check_duplicates(Clause::Sort, "sort", sort_columns.iter().map(|c| c.name.as_str()))?;
        self.snapshot.data.sort_columns = sort_columns;
        Ok(())
    }

    fn process_limit(&mut self, step: &Step) -> AnalysisResult<()> {
        match step.arguments().first() {
            Some(Expr::Integer(limit)) if *limit >= 0 => {
                self.snapshot.data.limit = Some(*limit as u64);
                Ok(())
            }
            _ => Err(ClauseError::invalid(
                Clause::Limit,
                "expected limit to be a non-negative integer value",
            )
            .into()),
        }
    }
}

/// Build a filter tree node from a filter expression
///
/// `and`/`or` calls become groups; nested groups of the same kind that are
/// not negated are merged into their parent. Anything else is offered to the
/// filter operators, and a `not(...)` none of them accepts is built from its
/// operand with the `not` flag flipped.
pub fn build_filter_node(expr: &Expr, columns: &[Column]) -> Result<FilterNode, OperatorMatchError> {
    if let Some((group_operator, call)) = group_call(expr) {
        let mut conditions = Vec::with_capacity(call.parameters.len());
        for parameter in &call.parameters {
            match build_filter_node(parameter, columns)? {
                FilterNode::Group(child) if child.group_operator == group_operator && !child.not => {
                    conditions.extend(child.conditions)
                }
                node => conditions.push(node),
            }
        }
        return Ok(FilterNode::Group(FilterGroup {
            group_operator,
            conditions,
            not: false,
        }));
    }

    if let Some(condition) = filter::build_condition(expr, columns) {
        return Ok(FilterNode::Condition(condition));
    }

    match expr.as_call().and_then(|call| call.unary_parameter("not")) {
        Some(operand) => {
            let mut node = build_filter_node(operand, columns)?;
            node.negate();
            Ok(node)
        }
        None => Err(OperatorMatchError::FilterCondition),
    }
}

fn group_call(expr: &Expr) -> Option<(FilterGroupOperator, &FunctionCall)> {
    let call = expr.as_call()?;
    let group_operator = match call.function.as_str() {
        "and" => FilterGroupOperator::And,
        "or" => FilterGroupOperator::Or,
        _ => return None,
    };
    (call.parameters.len() == 2).then_some((group_operator, call))
}

/// Column specification list argument at `index`
fn colspec_list<'e>(step: &Step<'e>, index: usize) -> Result<&'e [ColSpec], ClauseError> {
    match step.arguments().get(index) {
        Some(Expr::ColSpecArray(specs)) => Ok(specs.as_slice()),
        _ => Err(ClauseError::invalid(
            step.clause(),
            format!(
                "expected parameter at index {} to be a column specification list",
                index
            ),
        )),
    }
}

fn resolve_columns(specs: &[ColSpec], columns: &[Column]) -> Result<Vec<Column>, ClauseError> {
    specs
        .iter()
        .map(|spec| get_column(columns, &spec.name).cloned())
        .collect()
}

fn build_agg_columns(specs: &[ColSpec], columns: &[Column]) -> Result<Vec<AggColumn>, OperatorMatchError> {
    specs
        .iter()
        .map(|spec| {
            aggregate::build_agg_column(spec, columns)
                .ok_or_else(|| OperatorMatchError::AggregateColumn(spec.name.clone()))
        })
        .collect()
}

fn check_duplicates<'n>(
    clause: Clause,
    list: &str,
    names: impl IntoIterator<Item = &'n str>,
) -> Result<(), ClauseError> {
    match find_duplicate(names) {
        Some(name) => Err(ClauseError::invalid(
            clause,
            format!("found duplicate {} columns '{}'", list, name),
        )),
        None => Ok(()),
    }
}

/// `(column, direction)` pairs of a `sort([~a->ascending(), ...])` call
fn sort_items(step: &Step) -> Result<Vec<(String, SortDirection)>, ClauseError> {
    let Some(Expr::Collection(items)) = step.arguments().first() else {
        return Err(ClauseError::invalid(
            Clause::Sort,
            "expected parameter at index 0 to be a collection",
        ));
    };

    let mut result = Vec::with_capacity(items.len());
    for item in items {
        let Some(call) = item.as_call() else {
            return Err(ClauseError::invalid(
                Clause::Sort,
                "expected collection item to be a sort column specification",
            ));
        };
        let Some(direction) = SortDirection::from_function_name(&call.function) else {
            return Err(ClauseError::Function {
                expected: vec![
                    SortDirection::Ascending.function_name().to_string(),
                    SortDirection::Descending.function_name().to_string(),
                ],
            });
        };
        let [Expr::ColSpec(spec)] = call.parameters.as_slice() else {
            return Err(ClauseError::invalid(
                Clause::Sort,
                "expected collection item to be a sort column specification",
            ));
        };
        result.push((spec.name.clone(), direction));
    }
    Ok(result)
}

/// Validate the sort bracketed with a pivot or groupBy and return its direction
///
/// The sort must cover exactly the pivot/group columns, all in one direction.
fn check_bracketed_sort(
    clause: Clause,
    label: &str,
    columns: &[Column],
    agg_columns: &[AggColumn],
    sort: &Step,
) -> Result<SortDirection, ClauseError> {
    check_duplicates(clause, label, columns.iter().map(|c| c.name.as_str()))?;
    check_duplicates(clause, "aggregate", agg_columns.iter().map(|c| c.name.as_str()))?;

    let items = sort_items(sort)?;
    check_duplicates(clause, "sort", items.iter().map(|(name, _)| name.as_str()))?;

    if let Some((name, _)) = items
        .iter()
        .find(|(name, _)| find_column(columns, name).is_none())
    {
        return Err(ClauseError::invalid(
            clause,
            format!("sort column '{}' must be a {} column", name, label),
        ));
    }

    let unsorted: Vec<String> = columns
        .iter()
        .filter(|column| !items.iter().any(|(name, _)| *name == column.name))
        .map(|column| format!("'{}'", column.name))
        .collect();
    if !unsorted.is_empty() {
        return Err(ClauseError::invalid(
            clause,
            format!("found unsorted {} column(s) ({})", label, unsorted.join(", ")),
        ));
    }

    let direction = items
        .first()
        .map(|(_, direction)| *direction)
        .unwrap_or(SortDirection::Ascending);
    if items.iter().any(|(_, d)| *d != direction) {
        return Err(ClauseError::invalid(
            clause,
            format!("all {} columns must be sorted in the same direction", label),
        ));
    }
    Ok(direction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BuiltinTypeResolver;
    use crate::operation::FilterOperator;
    use crate::pure::{parse, Lambda};

    struct RejectingResolver;

    impl TypeResolver for RejectingResolver {
        fn resolve_extend(
            &self,
            _columns: &[Column],
            _name: &str,
            _function: &Lambda,
        ) -> Result<Vec<Column>, TypeCheckError> {
            Err(TypeCheckError::Resolver("Compilation error at [1:20]".to_string()))
        }
    }

    fn columns(specs: &[&str]) -> Vec<Column> {
        specs.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn build(code: &str, source: &[&str]) -> AnalysisResult<FinalizedSnapshot> {
        let base = BaseQuery::default();
        SnapshotBuilder::new(&columns(source), &base, &BuiltinTypeResolver).build(&parse(code).unwrap())
    }

    fn error(code: &str, source: &[&str]) -> String {
        build(code, source).unwrap_err().to_string()
    }

    #[test]
    fn test_build_filter_tree() {
        let snapshot = build(
            "filter(x|!(($x.Age != 27) && ($x.Name == 'a')) && ($x.Name->startsWith('b') || ($x.Name == 'c')))",
            &["Age:Integer", "Name:String"],
        )
        .unwrap();
        let root = snapshot.data().filter.as_ref().unwrap();
        assert_eq!(root.group_operator, FilterGroupOperator::And);
        assert_eq!(root.conditions.len(), 2);
        match &root.conditions[0] {
            FilterNode::Group(group) => {
                assert!(group.not);
                assert_eq!(group.conditions.len(), 2);
            }
            other => panic!("Expected group, got {:?}", other),
        }
        match &root.conditions[1] {
            FilterNode::Group(group) => assert_eq!(group.group_operator, FilterGroupOperator::Or),
            other => panic!("Expected group, got {:?}", other),
        }
    }

    #[test]
    fn test_flatten_same_kind_groups() {
        let columns = columns(&["a:Integer"]);
        let expr = parse("$x.a == 1 && $x.a == 2 && $x.a == 3").unwrap();
        match build_filter_node(&expr, &columns).unwrap() {
            FilterNode::Group(group) => assert_eq!(group.conditions.len(), 3),
            other => panic!("Expected group, got {:?}", other),
        }
    }

    #[test]
    fn test_negated_conditions() {
        let columns = columns(&["Age:Integer", "Name:String"]);
        let node = |code: &str| build_filter_node(&parse(code).unwrap(), &columns).unwrap();

        match node("!($x.Age > 27)") {
            FilterNode::Condition(c) => {
                assert_eq!(c.operator, FilterOperator::GreaterThan);
                assert!(c.not);
            }
            other => panic!("Expected condition, got {:?}", other),
        }
        match node("!!$x.Name->contains('a')") {
            FilterNode::Condition(c) => {
                assert_eq!(c.operator, FilterOperator::NotContain);
                assert!(c.not);
            }
            other => panic!("Expected condition, got {:?}", other),
        }
        match node("!$x.Name->toLower()->contains(toLower('a'))") {
            FilterNode::Condition(c) => {
                assert_eq!(c.operator, FilterOperator::ContainCaseInsensitive);
                assert!(c.not);
            }
            other => panic!("Expected condition, got {:?}", other),
        }
    }

    #[test]
    fn test_stage_columns_follow_pipeline() {
        let snapshot = build(
            "extend(~[a:x|1])->select(~[a, b])->groupBy(~[a], ~[b:x|$x.b:x|$x->sum()])->sort([~a->descending()])->extend(~[c:x|$x.b * 2])",
            &["b:Integer"],
        )
        .unwrap();
        let data = snapshot.data();
        assert_eq!(data.leaf_extended_columns[0].data_type, DataType::Integer);
        assert_eq!(data.group_by.as_ref().unwrap().sort_direction, SortDirection::Descending);
        assert_eq!(data.group_extended_columns[0].name, "c");
        assert_eq!(snapshot.stage_columns(Stage::Sort).len(), 3);
    }

    #[test]
    fn test_bracketed_sort_errors() {
        let source = ["a:String", "b:Integer", "c:String"];
        assert_eq!(
            error(
                "select(~[a, b, c])->groupBy(~[a, c], ~[b:x|$x.b:x|$x->sum()])->sort([~a->descending(), ~c->ascending()])",
                &source
            ),
            "Can't process groupBy() expression: all group columns must be sorted in the same direction"
        );
        assert_eq!(
            error(
                "select(~[a, b, c])->sort([~a->ascending()])->pivot(~[a, c], ~[b:x|$x.b:x|$x->sum()])->cast(@meta::pure::metamodel::relation::Relation<(x:String)>)",
                &source
            ),
            "Can't process pivot() expression: found unsorted pivot column(s) ('c')"
        );
        assert_eq!(
            error(
                "select(~[a, b])->groupBy(~[a, a], ~[b:x|$x.b:y|$y->sum()])->sort([~a->ascending()])",
                &source
            ),
            "Can't process aggregate column 'b': no matching operator found"
        );
    }

    #[test]
    fn test_cast_errors() {
        let source = ["a:String", "b:Integer"];
        assert_eq!(
            error(
                "select(~[a, b])->sort([~a->ascending()])->pivot(~[a], ~[b:x|$x.b:x|$x->sum()])->cast(1)",
                &source
            ),
            "Can't process cast() expression: expected parameter at index 0 to be a relation type"
        );
        assert_eq!(
            error(
                "select(~[a, b])->sort([~a->ascending()])->pivot(~[a], ~[b:x|$x.b:x|$x->sum()])->cast(@meta::pure::metamodel::relation::Relation<(x:Blob)>)",
                &source
            ),
            "Can't process cast() expression: found unsupported type 'Blob' for column 'x'"
        );
    }

    #[test]
    fn test_clause_argument_errors() {
        assert_eq!(
            error("select('a')", &["a:Integer"]),
            "Can't process select() expression: expected parameter at index 0 to be a column specification list"
        );
        assert_eq!(
            error("extend(~[a:x|1:x|$x->sum()])", &[]),
            "Can't process extend() expression: found unexpected aggregation function for column 'a'"
        );
        assert_eq!(
            error("select(~[a])->sort([1])", &["a:Integer"]),
            "Can't process sort() expression: expected collection item to be a sort column specification"
        );
    }

    #[test]
    fn test_cast_without_pivot() {
        let expr = parse("cast(@meta::pure::metamodel::relation::Relation<(a:Integer)>)").unwrap();
        let step = Step {
            stage: PipelineStage::PivotCast,
            call: expr.as_call().unwrap(),
        };
        let base = BaseQuery::default();
        let mut builder = SnapshotBuilder::new(&columns(&["a:Integer"]), &base, &BuiltinTypeResolver);
        assert_eq!(
            builder.process_cast(&step).unwrap_err().to_string(),
            "Can't process cast() expression: expected a preceding pivot() expression"
        );
    }

    #[test]
    fn test_resolver_error_forwarded() {
        let base = BaseQuery::default();
        let err = SnapshotBuilder::new(&columns(&["a:Integer"]), &base, &RejectingResolver)
            .build(&parse("extend(~[b:x|$x.a + 1])").unwrap())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Can't process extend() expression: failed to retrieve type information for columns. Error: Compilation error at [1:20]"
        );
    }

    #[test]
    fn test_source_duplicates_after_composition() {
        assert_eq!(
            error("select(~[a, b])", &["a:Integer", "a:Integer", "b:Integer"]),
            "Can't process source: found duplicate source columns 'a'"
        );
        assert_eq!(
            error("2", &["a:Integer", "a:Integer"]),
            "Can't process expression: expected a function expression"
        );
    }
}
