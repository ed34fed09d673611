// Pure Abstract Syntax Tree (AST) definitions
//
// Infix operators are desugared by the parser into plain function calls
// (`a == b` becomes `equal(a, b)`), and the arrow form `a->f(b)` becomes
// `f(a, b)`. The printer is responsible for re-sugaring them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    /// Date literal body without the leading `%`
    Date(String),
    /// Variable reference without the leading `$`
    Variable(String),
    Property {
        receiver: Box<Expr>,
        name: String,
    },
    Call(FunctionCall),
    Collection(Vec<Expr>),
    Lambda(Lambda),
    ColSpec(ColSpec),
    ColSpecArray(Vec<ColSpec>),
    GenericType(GenericType),
    Let {
        name: String,
        value: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub function: String,
    pub parameters: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    pub parameters: Vec<String>,
    pub body: Vec<Expr>,
}

/// Column specification: `~name`, `~name:x|...` or `~name:x|...:y|...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColSpec {
    pub name: String,
    pub function1: Option<Lambda>,
    pub function2: Option<Lambda>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericType {
    /// Fully qualified path, e.g. `meta::pure::metamodel::relation::Relation`
    pub path: String,
    /// Relation column type arguments (`<(a:Integer, b:String)>`)
    pub columns: Option<Vec<RelationColumnType>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationColumnType {
    pub name: String,
    pub type_name: String,
}

impl Expr {
    pub fn call(function: &str, parameters: Vec<Expr>) -> Self {
        Expr::Call(FunctionCall {
            function: function.to_string(),
            parameters,
        })
    }

    pub fn variable(name: &str) -> Self {
        Expr::Variable(name.to_string())
    }

    /// `$variable.name`
    pub fn property(variable: &str, name: &str) -> Self {
        Expr::Property {
            receiver: Box::new(Expr::variable(variable)),
            name: name.to_string(),
        }
    }

    pub fn string(value: &str) -> Self {
        Expr::String(value.to_string())
    }

    pub fn not(expr: Expr) -> Self {
        Expr::call("not", vec![expr])
    }

    pub fn lambda(parameter: &str, body: Expr) -> Self {
        Expr::Lambda(Lambda {
            parameters: vec![parameter.to_string()],
            body: vec![body],
        })
    }

    pub fn as_call(&self) -> Option<&FunctionCall> {
        match self {
            Expr::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Return the call when it invokes `function`
    pub fn as_call_named(&self, function: &str) -> Option<&FunctionCall> {
        self.as_call().filter(|call| call.function == function)
    }

    /// Return `(variable, property)` for a `$variable.property` access
    pub fn as_variable_property(&self) -> Option<(&str, &str)> {
        match self {
            Expr::Property { receiver, name } => match receiver.as_ref() {
                Expr::Variable(variable) => Some((variable.as_str(), name.as_str())),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expr::Integer(_) | Expr::Float(_) | Expr::String(_) | Expr::Boolean(_) | Expr::Date(_)
        )
    }
}

impl FunctionCall {
    /// Return the single parameter of a one-argument call to `function`
    pub fn unary_parameter(&self, function: &str) -> Option<&Expr> {
        match self.parameters.as_slice() {
            [parameter] if self.function == function => Some(parameter),
            _ => None,
        }
    }

    /// Return both parameters of a two-argument call to `function`
    pub fn binary_parameters(&self, function: &str) -> Option<(&Expr, &Expr)> {
        match self.parameters.as_slice() {
            [left, right] if self.function == function => Some((left, right)),
            _ => None,
        }
    }
}
