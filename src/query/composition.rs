//! Pipeline grammar validation.
//!
//! Unwinds an arrow chain (`a()->b()->c()`, i.e. `c(b(a()))`) into the
//! ordered list of calls and matches it against
//!
//! ```text
//! extend()* -> filter()? -> select()? -> [sort()->pivot()->cast()]? ->
//! [groupBy()->sort()]? -> extend()* -> sort()? -> limit()?
//! ```

use crate::error::{Clause, CompositionError};
use crate::pure::{Expr, FunctionCall};

/// Position of a call within the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    LeafExtend,
    Filter,
    Select,
    PivotSort,
    Pivot,
    PivotCast,
    GroupBy,
    GroupBySort,
    GroupExtend,
    Sort,
    Limit,
}

/// A validated pipeline step
#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    pub stage: PipelineStage,
    pub call: &'a FunctionCall,
}

impl<'a> Step<'a> {
    /// Arguments of the call, without the source relation
    pub fn arguments(&self) -> &'a [Expr] {
        let call = self.call;
        match call.parameters.first() {
            Some(Expr::Call(_)) if call.parameters.len() == max_parameters(self.clause()) => {
                &call.parameters[1..]
            }
            _ => &call.parameters,
        }
    }

    pub fn clause(&self) -> Clause {
        match self.stage {
            PipelineStage::LeafExtend | PipelineStage::GroupExtend => Clause::Extend,
            PipelineStage::Filter => Clause::Filter,
            PipelineStage::Select => Clause::Select,
            PipelineStage::PivotSort | PipelineStage::GroupBySort | PipelineStage::Sort => {
                Clause::Sort
            }
            PipelineStage::Pivot => Clause::Pivot,
            PipelineStage::PivotCast => Clause::Cast,
            PipelineStage::GroupBy => Clause::GroupBy,
            PipelineStage::Limit => Clause::Limit,
        }
    }
}

/// Maximum parameter count of a clause, source relation included
pub fn max_parameters(clause: Clause) -> usize {
    match clause {
        Clause::Pivot | Clause::GroupBy => 3,
        _ => 2,
    }
}

fn clause_of(function: &str) -> Option<Clause> {
    Some(match function {
        "extend" => Clause::Extend,
        "filter" => Clause::Filter,
        "select" => Clause::Select,
        "sort" => Clause::Sort,
        "pivot" => Clause::Pivot,
        "cast" => Clause::Cast,
        "groupBy" => Clause::GroupBy,
        "limit" => Clause::Limit,
        _ => return None,
    })
}

/// Unwind the chain rooted at `expr`, innermost call first
fn extract_chain(expr: &Expr) -> Result<Vec<(Clause, &FunctionCall)>, CompositionError> {
    let mut chain = Vec::new();
    let mut current = expr.as_call().ok_or(CompositionError::NotAFunction)?;

    loop {
        let clause = clause_of(&current.function)
            .ok_or_else(|| CompositionError::UnsupportedFunction(current.function.clone()))?;
        let max = max_parameters(clause);
        if current.parameters.len() > max {
            return Err(CompositionError::TooManyParameters {
                function: current.function.clone(),
                max,
                actual: current.parameters.len(),
            });
        }
        chain.push((clause, current));

        if current.parameters.len() < max {
            break;
        }
        current = match current.parameters.first() {
            Some(Expr::Call(source)) => source,
            _ => return Err(CompositionError::NotASequence),
        };
    }

    chain.reverse();
    Ok(chain)
}

/// Validate the composition of `expr` and label each call with its stage
pub fn validate(expr: &Expr) -> Result<Vec<Step<'_>>, CompositionError> {
    let chain = extract_chain(expr)?;
    let clauses: Vec<Clause> = chain.iter().map(|(clause, _)| *clause).collect();

    let mut stages = Vec::with_capacity(chain.len());
    let mut i = 0;
    let at = |i: usize, expected: &[Clause]| clauses.get(i..i + expected.len()) == Some(expected);

    while at(i, &[Clause::Extend]) {
        stages.push(PipelineStage::LeafExtend);
        i += 1;
    }
    if at(i, &[Clause::Filter]) {
        stages.push(PipelineStage::Filter);
        i += 1;
    }
    if at(i, &[Clause::Select]) {
        stages.push(PipelineStage::Select);
        i += 1;
    }
    if at(i, &[Clause::Sort, Clause::Pivot, Clause::Cast]) {
        stages.extend([PipelineStage::PivotSort, PipelineStage::Pivot, PipelineStage::PivotCast]);
        i += 3;
    }
    if at(i, &[Clause::GroupBy, Clause::Sort]) {
        stages.extend([PipelineStage::GroupBy, PipelineStage::GroupBySort]);
        i += 2;
    }
    while at(i, &[Clause::Extend]) {
        stages.push(PipelineStage::GroupExtend);
        i += 1;
    }
    if at(i, &[Clause::Sort]) {
        stages.push(PipelineStage::Sort);
        i += 1;
    }
    if at(i, &[Clause::Limit]) {
        stages.push(PipelineStage::Limit);
        i += 1;
    }

    if i < clauses.len() {
        let sequence = clauses
            .iter()
            .map(Clause::to_string)
            .collect::<Vec<_>>()
            .join("->");
        return Err(CompositionError::UnsupportedComposition { sequence });
    }

    Ok(stages
        .into_iter()
        .zip(chain)
        .map(|(stage, (_, call))| Step { stage, call })
        .collect())
}
