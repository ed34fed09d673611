//! Canonical Pure text rendering.
//!
//! Function calls whose first parameter is a value-like expression print in
//! arrow form (`$x.a->toLower()`), everything else in direct form
//! (`select(~[a])`). Desugared infix operators print back as infix.

use super::ast::*;
use super::token::Token;
use std::fmt;

/// Render an expression as canonical Pure code
pub fn print(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&print(self))
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_lambda(&mut out, self);
        f.write_str(&out)
    }
}

fn infix_operator(call: &FunctionCall) -> Option<&'static str> {
    if call.parameters.len() != 2 {
        return None;
    }
    Some(match call.function.as_str() {
        "equal" => "==",
        "lessThan" => "<",
        "lessThanEqual" => "<=",
        "greaterThan" => ">",
        "greaterThanEqual" => ">=",
        "and" => "&&",
        "or" => "||",
        "plus" => "+",
        "minus" => "-",
        "times" => "*",
        "divide" => "/",
        _ => return None,
    })
}

/// `not(equal(a, b))` prints as `a != b`
fn not_equal_operands(call: &FunctionCall) -> Option<(&Expr, &Expr)> {
    call.unary_parameter("not")?
        .as_call()?
        .binary_parameters("equal")
}

fn is_infix(expr: &Expr) -> bool {
    match expr {
        Expr::Call(call) => infix_operator(call).is_some() || not_equal_operands(call).is_some(),
        _ => false,
    }
}

fn is_prefix(expr: &Expr) -> bool {
    match expr {
        Expr::Call(call) => {
            call.unary_parameter("not").is_some() || call.unary_parameter("minus").is_some()
        }
        _ => false,
    }
}

/// Whether a call with this first parameter prints in arrow form
fn is_arrow_receiver(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Variable(_) | Expr::Property { .. } | Expr::Call(_) | Expr::ColSpec(_)
    )
}

fn write_operand(out: &mut String, expr: &Expr) {
    if is_infix(expr) {
        out.push('(');
        write_expr(out, expr);
        out.push(')');
    } else {
        write_expr(out, expr);
    }
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Integer(i) => out.push_str(&i.to_string()),
        Expr::Float(f) => out.push_str(&format_float(*f)),
        Expr::String(s) => write_quoted(out, s),
        Expr::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Expr::Date(d) => {
            out.push('%');
            out.push_str(d);
        }
        Expr::Variable(name) => {
            out.push('$');
            out.push_str(name);
        }
        Expr::Property { receiver, name } => {
            if is_infix(receiver) || is_prefix(receiver) {
                out.push('(');
                write_expr(out, receiver);
                out.push(')');
            } else {
                write_expr(out, receiver);
            }
            out.push('.');
            write_name(out, name);
        }
        Expr::Call(call) => write_call(out, call),
        Expr::Collection(items) => {
            out.push('[');
            write_list(out, items);
            out.push(']');
        }
        Expr::Lambda(lambda) => write_lambda(out, lambda),
        Expr::ColSpec(spec) => {
            out.push('~');
            write_colspec(out, spec);
        }
        Expr::ColSpecArray(specs) => {
            out.push_str("~[");
            for (i, spec) in specs.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_colspec(out, spec);
            }
            out.push(']');
        }
        Expr::GenericType(generic) => write_generic_type(out, generic),
        Expr::Let { name, value } => {
            out.push_str("let ");
            out.push_str(name);
            out.push_str(" = ");
            write_expr(out, value);
        }
    }
}

fn write_call(out: &mut String, call: &FunctionCall) {
    if let Some((left, right)) = not_equal_operands(call) {
        write_operand(out, left);
        out.push_str(" != ");
        write_operand(out, right);
        return;
    }

    if let Some(operator) = infix_operator(call) {
        write_operand(out, &call.parameters[0]);
        out.push(' ');
        out.push_str(operator);
        out.push(' ');
        write_operand(out, &call.parameters[1]);
        return;
    }

    if let Some(operand) = call.unary_parameter("not") {
        out.push('!');
        write_operand(out, operand);
        return;
    }

    if let Some(operand) = call.unary_parameter("minus") {
        out.push('-');
        write_operand(out, operand);
        return;
    }

    match call.parameters.split_first() {
        Some((receiver, rest)) if is_arrow_receiver(receiver) => {
            if is_infix(receiver) || is_prefix(receiver) {
                out.push('(');
                write_expr(out, receiver);
                out.push(')');
            } else {
                write_expr(out, receiver);
            }
            out.push_str("->");
            out.push_str(&call.function);
            out.push('(');
            write_list(out, rest);
            out.push(')');
        }
        _ => {
            out.push_str(&call.function);
            out.push('(');
            write_list(out, &call.parameters);
            out.push(')');
        }
    }
}

fn write_list(out: &mut String, items: &[Expr]) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, item);
    }
}

fn write_lambda(out: &mut String, lambda: &Lambda) {
    match lambda.body.as_slice() {
        [body] if lambda.parameters.len() == 1 => {
            out.push_str(&lambda.parameters[0]);
            out.push('|');
            write_expr(out, body);
        }
        body => {
            out.push('{');
            out.push_str(&lambda.parameters.join(", "));
            out.push('|');
            for (i, expr) in body.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_expr(out, expr);
                out.push(';');
            }
            out.push('}');
        }
    }
}

fn write_colspec(out: &mut String, spec: &ColSpec) {
    write_name(out, &spec.name);
    if let Some(function1) = &spec.function1 {
        out.push(':');
        write_lambda(out, function1);
    }
    if let Some(function2) = &spec.function2 {
        out.push(':');
        write_lambda(out, function2);
    }
}

fn write_generic_type(out: &mut String, generic: &GenericType) {
    out.push('@');
    out.push_str(&generic.path);
    if let Some(columns) = &generic.columns {
        out.push_str("<(");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            write_name(out, &column.name);
            out.push(':');
            out.push_str(&column.type_name);
        }
        out.push_str(")>");
    }
}

/// Write a column or property name, quoting it when it is not a plain identifier
fn write_name(out: &mut String, name: &str) {
    if is_plain_identifier(name) {
        out.push_str(name);
    } else {
        write_quoted(out, name);
    }
}

pub(crate) fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    starts_well
        && chars.all(|c| c.is_alphanumeric() || c == '_')
        && Token::keyword_from_str(name).is_none()
}

fn write_quoted(out: &mut String, value: &str) {
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('\'');
}

fn format_float(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') && !text.contains('e') {
        format!("{}.0", text)
    } else {
        text
    }
}
