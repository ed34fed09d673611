// Pure module - query expression parsing, AST and canonical printing

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod token;

pub use ast::*;
pub use lexer::Lexer;
pub use parser::{parse, Parser};
pub use printer::print;
pub use token::Token;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_then_print() {
        let code = "select(~[a])->sort([~a->descending()])";
        assert_eq!(print(&parse(code).unwrap()), code);
        assert_eq!(parse(code).unwrap().to_string(), code);
    }
}
