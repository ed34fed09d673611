//! Type resolution for extended columns.

use crate::catalog::{find_column, find_duplicates};
use crate::error::TypeCheckError;
use crate::pure::{Expr, Lambda};
use crate::value::{Column, DataType, DataTypeKind};
use std::collections::HashMap;

/// Resolves the relation type produced by an `extend()` transformation.
///
/// Called once per extended column, synchronously, by the analyzer.
pub trait TypeResolver {
    /// Return the columns of `columns` extended with `name` computed by `function`
    fn resolve_extend(
        &self,
        columns: &[Column],
        name: &str,
        function: &Lambda,
    ) -> Result<Vec<Column>, TypeCheckError>;
}

/// Resolver backed by [`TypeChecker`], for the built-in function set
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTypeResolver;

impl TypeResolver for BuiltinTypeResolver {
    fn resolve_extend(
        &self,
        columns: &[Column],
        name: &str,
        function: &Lambda,
    ) -> Result<Vec<Column>, TypeCheckError> {
        let variable = function.parameters.first().map(String::as_str).unwrap_or("x");
        let data_type = TypeChecker::new(columns, variable).check_lambda(function)?;

        let mut result = columns.to_vec();
        result.push(Column::new(name, data_type));

        let duplicates = find_duplicates(result.iter().map(|c| c.name.as_str()));
        if !duplicates.is_empty() {
            return Err(TypeCheckError::Duplicates(duplicates));
        }
        Ok(result)
    }
}

/// Type checker for row-level expressions
pub struct TypeChecker<'a> {
    /// Columns reachable through the row variable
    columns: &'a [Column],
    /// Name of the row variable (the lambda parameter)
    variable: &'a str,
    locals: HashMap<String, DataType>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(columns: &'a [Column], variable: &'a str) -> Self {
        Self {
            columns,
            variable,
            locals: HashMap::new(),
        }
    }

    /// Type check a lambda body; `let` bindings are visible to later expressions
    pub fn check_lambda(&mut self, lambda: &Lambda) -> Result<DataType, TypeCheckError> {
        let mut last = None;
        for expr in &lambda.body {
            last = Some(self.check(expr)?);
        }
        last.ok_or_else(|| TypeCheckError::Unsupported(lambda.to_string()))
    }

    /// Type check an expression and return its output type
    pub fn check(&mut self, expr: &Expr) -> Result<DataType, TypeCheckError> {
        match expr {
            Expr::Integer(_) => Ok(DataType::Integer),
            Expr::Float(_) => Ok(DataType::Float),
            Expr::String(_) => Ok(DataType::String),
            Expr::Boolean(_) => Ok(DataType::Boolean),
            Expr::Date(d) => Ok(if d.contains('T') {
                DataType::DateTime
            } else {
                DataType::StrictDate
            }),

            Expr::Variable(name) => self
                .locals
                .get(name)
                .copied()
                .ok_or_else(|| TypeCheckError::VariableNotFound(name.clone())),

            Expr::Property { receiver, name } => match receiver.as_ref() {
                Expr::Variable(variable) if variable == self.variable => {
                    find_column(self.columns, name)
                        .map(|column| column.data_type)
                        .ok_or_else(|| TypeCheckError::PropertyNotFound(name.clone()))
                }
                _ => Err(TypeCheckError::PropertyNotFound(name.clone())),
            },

            Expr::Let { name, value } => {
                let data_type = self.check(value)?;
                self.locals.insert(name.clone(), data_type);
                Ok(data_type)
            }

            Expr::Call(call) => {
                let mut types = Vec::with_capacity(call.parameters.len());
                for parameter in &call.parameters {
                    types.push(self.check(parameter)?);
                }
                function_output_type(&call.function, &types).ok_or_else(|| {
                    TypeCheckError::NoMatchingFunction {
                        function: call.function.clone(),
                        arity: types.len(),
                    }
                })
            }

            other => Err(TypeCheckError::Unsupported(other.to_string())),
        }
    }
}

/// Output type of a built-in function applied to arguments of the given types
fn function_output_type(function: &str, args: &[DataType]) -> Option<DataType> {
    let kinds: Vec<DataTypeKind> = args.iter().map(DataType::kind).collect();
    match (function, args, kinds.as_slice()) {
        ("toOne", [t], _) => Some(*t),
        ("plus", [DataType::String, DataType::String], _) => Some(DataType::String),
        ("plus" | "minus" | "times", [l, r], [DataTypeKind::Number, DataTypeKind::Number]) => {
            Some(numeric_output_type(*l, *r))
        }
        ("minus" | "abs", [t], [DataTypeKind::Number]) => Some(*t),
        ("divide", [_, _], [DataTypeKind::Number, DataTypeKind::Number]) => Some(DataType::Float),
        ("round" | "floor" | "ceiling", [_], [DataTypeKind::Number]) => Some(DataType::Integer),
        ("equal", [_, _], [l, r]) if l.matches(*r) => Some(DataType::Boolean),
        (
            "lessThan" | "lessThanEqual" | "greaterThan" | "greaterThanEqual",
            [_, _],
            [l, r],
        ) if l.matches(*r) && *l != DataTypeKind::Boolean => Some(DataType::Boolean),
        ("and" | "or", [DataType::Boolean, DataType::Boolean], _) => Some(DataType::Boolean),
        ("not", [DataType::Boolean], _) => Some(DataType::Boolean),
        ("isEmpty", [_], _) => Some(DataType::Boolean),
        ("contains" | "startsWith" | "endsWith", [DataType::String, DataType::String], _) => {
            Some(DataType::Boolean)
        }
        ("toLower" | "toUpper" | "trim", [DataType::String], _) => Some(DataType::String),
        ("toString", [_], _) => Some(DataType::String),
        ("length", [DataType::String], _) => Some(DataType::Integer),
        _ => None,
    }
}

fn numeric_output_type(left: DataType, right: DataType) -> DataType {
    if left == right {
        left
    } else if left == DataType::Float || right == DataType::Float {
        DataType::Float
    } else {
        DataType::Number
    }
}
