//! Error taxonomy for query analysis.
//!
//! Message strings are user facing and stable; callers match on them.

use std::fmt;
use thiserror::Error;

/// The full supported composition, as reported in composition errors
pub const SUPPORTED_COMPOSITION: &str = "extend()->filter()->select()->[sort()->pivot()->cast()]->[groupBy()->sort()]->extend()->sort()->limit()";

/// Query clauses (one per supported function)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Clause {
    Extend,
    Filter,
    Select,
    Sort,
    Pivot,
    Cast,
    GroupBy,
    Limit,
}

impl Clause {
    pub fn function_name(&self) -> &'static str {
        match self {
            Clause::Extend => "extend",
            Clause::Filter => "filter",
            Clause::Select => "select",
            Clause::Sort => "sort",
            Clause::Pivot => "pivot",
            Clause::Cast => "cast",
            Clause::GroupBy => "groupBy",
            Clause::Limit => "limit",
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}()", self.function_name())
    }
}

/// The expression is not a chain that fits the pipeline grammar
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompositionError {
    #[error("Can't process expression: expected a function expression")]
    NotAFunction,

    #[error("Can't process expression: found unsupported function {0}()")]
    UnsupportedFunction(String),

    #[error("Can't process {function}() expression: expected at most {max} parameters provided, got {actual}")]
    TooManyParameters {
        function: String,
        max: usize,
        actual: usize,
    },

    #[error("Can't process expression: expected a sequence of function calls (e.g. x()->y()->z())")]
    NotASequence,

    #[error("Can't process expression: unsupported function composition {sequence} (supported composition: {})", SUPPORTED_COMPOSITION)]
    UnsupportedComposition { sequence: String },
}

/// A clause is malformed or references unknown columns
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClauseError {
    #[error("Can't process {clause} expression: {message}")]
    Invalid { clause: Clause, message: String },

    #[error("Can't process source: {0}")]
    Source(String),

    #[error("Can't find column '{0}'")]
    ColumnNotFound(String),

    #[error("Can't process variable '{name}': expected variable name to be '{expected}'")]
    Variable { name: String, expected: String },

    #[error("Can't process function: expected function to be one of [{}]", .expected.join(", "))]
    Function { expected: Vec<String> },
}

impl ClauseError {
    pub fn invalid(clause: Clause, message: impl Into<String>) -> Self {
        ClauseError::Invalid {
            clause,
            message: message.into(),
        }
    }
}

/// No registry operator accepts a filter condition or aggregate column
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OperatorMatchError {
    #[error("Can't process filter condition: no matching operator found")]
    FilterCondition,

    #[error("Can't process aggregate column '{0}': no matching operator found")]
    AggregateColumn(String),
}

/// Failures reported by a type resolver
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeCheckError {
    #[error("The relation contains duplicates: [{}]", .0.join(", "))]
    Duplicates(Vec<String>),

    #[error("Can't find a match for function '{function}(Any[{arity}])'")]
    NoMatchingFunction { function: String, arity: usize },

    #[error("Can't find property '{0}'")]
    PropertyNotFound(String),

    #[error("Can't find variable '{0}'")]
    VariableNotFound(String),

    #[error("Can't infer type of expression '{0}'")]
    Unsupported(String),

    /// Message reported verbatim by an external resolver
    #[error("{0}")]
    Resolver(String),
}

/// Snapshot invariant violations found at finalization or derivation
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Can't finalize snapshot: found duplicate {list} columns '{name}'")]
    DuplicateColumns { list: &'static str, name: String },

    #[error("Can't find column '{0}'")]
    ColumnNotFound(String),

    #[error("Can't finalize snapshot: found empty filter group")]
    EmptyFilterGroup,

    #[error("Can't serialize snapshot: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Top-level error returned by analysis
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Clause(#[from] ClauseError),

    #[error(transparent)]
    OperatorMatch(#[from] OperatorMatchError),

    #[error("Can't process extend() expression: failed to retrieve type information for columns. Error: {0}")]
    TypeCheck(#[from] TypeCheckError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composition_messages() {
        assert_eq!(
            CompositionError::UnsupportedFunction("something".to_string()).to_string(),
            "Can't process expression: found unsupported function something()"
        );
        assert_eq!(
            CompositionError::TooManyParameters {
                function: "select".to_string(),
                max: 2,
                actual: 3,
            }
            .to_string(),
            "Can't process select() expression: expected at most 2 parameters provided, got 3"
        );
        assert_eq!(
            CompositionError::UnsupportedComposition {
                sequence: "cast()".to_string()
            }
            .to_string(),
            "Can't process expression: unsupported function composition cast() (supported composition: extend()->filter()->select()->[sort()->pivot()->cast()]->[groupBy()->sort()]->extend()->sort()->limit())"
        );
    }

    #[test]
    fn test_clause_messages() {
        assert_eq!(
            ClauseError::invalid(Clause::GroupBy, "found duplicate group columns 'a'").to_string(),
            "Can't process groupBy() expression: found duplicate group columns 'a'"
        );
        assert_eq!(
            ClauseError::Function {
                expected: vec!["ascending".to_string(), "descending".to_string()]
            }
            .to_string(),
            "Can't process function: expected function to be one of [ascending, descending]"
        );
        assert_eq!(
            ClauseError::Variable {
                name: "y".to_string(),
                expected: "x".to_string()
            }
            .to_string(),
            "Can't process variable 'y': expected variable name to be 'x'"
        );
    }

    #[test]
    fn test_analysis_error_wrapping() {
        let err: AnalysisError = TypeCheckError::Duplicates(vec!["name".to_string()]).into();
        assert_eq!(
            err.to_string(),
            "Can't process extend() expression: failed to retrieve type information for columns. Error: The relation contains duplicates: [name]"
        );

        let err: AnalysisError = OperatorMatchError::AggregateColumn("b".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Can't process aggregate column 'b': no matching operator found"
        );

        let err: AnalysisError = ClauseError::ColumnNotFound("c".to_string()).into();
        assert_eq!(err.to_string(), "Can't find column 'c'");
    }
}
