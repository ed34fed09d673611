// Pure parser - converts tokens to AST

use super::ast::*;
use super::lexer::Lexer;
use super::token::Token;
use anyhow::{bail, Result};

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(code: &str) -> Self {
        let mut lexer = Lexer::new(code);
        let tokens = lexer.tokenize();
        Parser {
            tokens,
            position: 0,
        }
    }

    /// Parse a complete expression; trailing tokens are an error
    pub fn parse(&mut self) -> Result<Expr> {
        let expr = self.parse_expression()?;
        if !self.match_token(&Token::Eof) {
            bail!("Unexpected token: {:?}", self.current_token());
        }
        Ok(expr)
    }

    /// Parse an expression (handles operator precedence)
    fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    /// Parse OR expressions
    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;

        while self.match_token(&Token::OrOr) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::call("or", vec![left, right]);
        }

        Ok(left)
    }

    /// Parse AND expressions
    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_comparison()?;

        while self.match_token(&Token::AndAnd) {
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::call("and", vec![left, right]);
        }

        Ok(left)
    }

    /// Parse comparison expressions; `!=` desugars to `not(equal(..))`
    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;

        let function = match self.current_token() {
            Token::EqualEqual => "equal",
            Token::NotEqual => "notEqual",
            Token::Less => "lessThan",
            Token::LessEqual => "lessThanEqual",
            Token::Greater => "greaterThan",
            Token::GreaterEqual => "greaterThanEqual",
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;

        Ok(if function == "notEqual" {
            Expr::not(Expr::call("equal", vec![left, right]))
        } else {
            Expr::call(function, vec![left, right])
        })
    }

    /// Parse addition and subtraction
    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let function = match self.current_token() {
                Token::Plus => "plus",
                Token::Minus => "minus",
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::call(function, vec![left, right]);
        }

        Ok(left)
    }

    /// Parse multiplication and division
    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            let function = match self.current_token() {
                Token::Star => "times",
                Token::Slash => "divide",
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::call(function, vec![left, right]);
        }

        Ok(left)
    }

    /// Parse unary `!` and `-`; negation of a numeric literal folds into the literal
    fn parse_unary(&mut self) -> Result<Expr> {
        match self.current_token() {
            Token::Not => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::not(operand))
            }
            Token::Minus => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(match operand {
                    Expr::Integer(n) => Expr::Integer(-n),
                    Expr::Float(f) => Expr::Float(-f),
                    other => Expr::call("minus", vec![other]),
                })
            }
            _ => self.parse_postfix(),
        }
    }

    /// Parse property access (`.name`) and arrow calls (`->f(..)`)
    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.current_token() {
                Token::Dot => {
                    self.advance();
                    let name = self.expect_name()?;
                    expr = Expr::Property {
                        receiver: Box::new(expr),
                        name,
                    };
                }
                Token::Arrow => {
                    self.advance();
                    let function = self.expect_function_name()?;
                    self.expect_token(Token::LeftParen)?;
                    let mut parameters = vec![expr];
                    parameters.extend(self.parse_arguments(Token::RightParen)?);
                    expr = Expr::Call(FunctionCall {
                        function,
                        parameters,
                    });
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// Parse primary expressions
    fn parse_primary(&mut self) -> Result<Expr> {
        match self.current_token() {
            Token::Number(n) => {
                self.advance();
                if n.contains('.') {
                    match n.parse::<f64>() {
                        Ok(f) if f.is_finite() => Ok(Expr::Float(f)),
                        _ => bail!("Invalid number: {}", n),
                    }
                } else {
                    match n.parse::<i64>() {
                        Ok(i) => Ok(Expr::Integer(i)),
                        Err(_) => bail!("Invalid number: {}", n),
                    }
                }
            }
            Token::String(s) => {
                self.advance();
                Ok(Expr::String(s))
            }
            Token::Date(d) => {
                self.advance();
                Ok(Expr::Date(d))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Boolean(true))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Boolean(false))
            }
            Token::Variable(name) => {
                self.advance();
                Ok(Expr::Variable(name))
            }
            Token::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_token(Token::RightParen)?;
                Ok(expr)
            }
            Token::LeftBracket => {
                self.advance();
                Ok(Expr::Collection(self.parse_arguments(Token::RightBracket)?))
            }
            Token::LeftBrace => Ok(Expr::Lambda(self.parse_brace_lambda()?)),
            Token::Tilde => {
                self.advance();
                if self.match_token(&Token::LeftBracket) {
                    self.advance();
                    let mut specs = vec![];
                    if !self.match_token(&Token::RightBracket) {
                        loop {
                            specs.push(self.parse_colspec()?);
                            if !self.match_token(&Token::Comma) {
                                break;
                            }
                            self.advance();
                        }
                    }
                    self.expect_token(Token::RightBracket)?;
                    Ok(Expr::ColSpecArray(specs))
                } else {
                    Ok(Expr::ColSpec(self.parse_colspec()?))
                }
            }
            Token::At => {
                self.advance();
                Ok(Expr::GenericType(self.parse_generic_type()?))
            }
            Token::Let => {
                self.advance();
                let name = self.expect_identifier()?;
                self.expect_token(Token::Equal)?;
                let value = self.parse_expression()?;
                Ok(Expr::Let {
                    name,
                    value: Box::new(value),
                })
            }
            Token::Identifier(name) => {
                if self.peek_token() == Token::Pipe {
                    return Ok(Expr::Lambda(self.parse_simple_lambda()?));
                }
                let function = self.expect_function_name()?;
                if !self.match_token(&Token::LeftParen) {
                    bail!("Unexpected identifier: {}", name);
                }
                self.advance();
                let parameters = self.parse_arguments(Token::RightParen)?;
                Ok(Expr::Call(FunctionCall {
                    function,
                    parameters,
                }))
            }
            Token::Illegal(c) => bail!("Unexpected character: '{}'", c),
            _ => bail!("Unexpected token: {:?}", self.current_token()),
        }
    }

    /// Parse a comma separated list up to (and including) the closing token
    fn parse_arguments(&mut self, close: Token) -> Result<Vec<Expr>> {
        let mut arguments = vec![];

        if !self.match_token(&close) {
            loop {
                arguments.push(self.parse_expression()?);
                if !self.match_token(&Token::Comma) {
                    break;
                }
                self.advance();
            }
        }

        self.expect_token(close)?;
        Ok(arguments)
    }

    /// Parse `x|body`
    fn parse_simple_lambda(&mut self) -> Result<Lambda> {
        let parameter = self.expect_identifier()?;
        self.expect_token(Token::Pipe)?;
        let body = self.parse_expression()?;
        Ok(Lambda {
            parameters: vec![parameter],
            body: vec![body],
        })
    }

    /// Parse `{x, y|e1; e2;}`
    fn parse_brace_lambda(&mut self) -> Result<Lambda> {
        self.expect_token(Token::LeftBrace)?;

        let mut parameters = vec![];
        if let Token::Identifier(_) = self.current_token() {
            loop {
                parameters.push(self.expect_identifier()?);
                if !self.match_token(&Token::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect_token(Token::Pipe)?;

        let mut body = vec![];
        while !self.match_token(&Token::RightBrace) {
            body.push(self.parse_expression()?);
            if self.match_token(&Token::Semicolon) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect_token(Token::RightBrace)?;

        if body.is_empty() {
            bail!("Expected lambda body");
        }
        Ok(Lambda { parameters, body })
    }

    fn parse_lambda(&mut self) -> Result<Lambda> {
        match self.current_token() {
            Token::LeftBrace => self.parse_brace_lambda(),
            Token::Identifier(_) if self.peek_token() == Token::Pipe => self.parse_simple_lambda(),
            _ => bail!("Expected lambda, found {:?}", self.current_token()),
        }
    }

    /// Parse the body of a column specification (after `~`)
    fn parse_colspec(&mut self) -> Result<ColSpec> {
        let name = self.expect_name()?;

        let mut function1 = None;
        let mut function2 = None;
        if self.match_token(&Token::Colon) {
            self.advance();
            function1 = Some(self.parse_lambda()?);
            if self.match_token(&Token::Colon) {
                self.advance();
                function2 = Some(self.parse_lambda()?);
            }
        }

        Ok(ColSpec {
            name,
            function1,
            function2,
        })
    }

    /// Parse the body of a generic type (after `@`)
    fn parse_generic_type(&mut self) -> Result<GenericType> {
        let path = self.parse_path()?;

        let columns = if self.match_token(&Token::Less) {
            self.advance();
            self.expect_token(Token::LeftParen)?;
            let mut columns = vec![];
            if !self.match_token(&Token::RightParen) {
                loop {
                    let name = self.expect_name()?;
                    self.expect_token(Token::Colon)?;
                    let type_name = self.parse_path()?;
                    columns.push(RelationColumnType { name, type_name });
                    if !self.match_token(&Token::Comma) {
                        break;
                    }
                    self.advance();
                }
            }
            self.expect_token(Token::RightParen)?;
            self.expect_token(Token::Greater)?;
            Some(columns)
        } else {
            None
        };

        Ok(GenericType { path, columns })
    }

    /// Parse `a::b::c`
    fn parse_path(&mut self) -> Result<String> {
        let mut path = self.expect_identifier()?;
        while self.match_token(&Token::DoubleColon) {
            self.advance();
            path.push_str("::");
            path.push_str(&self.expect_identifier()?);
        }
        Ok(path)
    }

    fn expect_function_name(&mut self) -> Result<String> {
        self.parse_path()
    }

    // Helper methods

    fn current_token(&self) -> Token {
        self.tokens
            .get(self.position)
            .cloned()
            .unwrap_or(Token::Eof)
    }

    fn peek_token(&self) -> Token {
        self.tokens
            .get(self.position + 1)
            .cloned()
            .unwrap_or(Token::Eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn match_token(&self, token: &Token) -> bool {
        self.current_token() == *token
    }

    fn expect_token(&mut self, token: Token) -> Result<()> {
        if self.current_token() == token {
            self.advance();
            Ok(())
        } else {
            bail!("Expected {:?}, found {:?}", token, self.current_token())
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.current_token() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => bail!("Expected identifier, found {:?}", other),
        }
    }

    /// Expect a plain or quoted name (`name` or `'some name'`)
    fn expect_name(&mut self) -> Result<String> {
        match self.current_token() {
            Token::Identifier(name) | Token::String(name) => {
                self.advance();
                Ok(name)
            }
            other => bail!("Expected name, found {:?}", other),
        }
    }
}

/// Parse Pure code into an expression tree
pub fn parse(code: &str) -> Result<Expr> {
    Parser::new(code).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chain() {
        let expr = parse("select(~[a, b])->limit(10)").unwrap();
        let limit = expr.as_call_named("limit").unwrap();
        assert_eq!(limit.parameters.len(), 2);
        assert_eq!(limit.parameters[1], Expr::Integer(10));

        let select = limit.parameters[0].as_call_named("select").unwrap();
        match &select.parameters[0] {
            Expr::ColSpecArray(specs) => {
                let names: Vec<_> = specs.iter().map(|s| s.name.as_str()).collect();
                assert_eq!(names, vec!["a", "b"]);
            }
            other => panic!("Expected colspec array, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_float_out_of_range() {
        let code = format!("filter(x|$x.a > {}.5)", "9".repeat(400));
        let err = parse(&code).unwrap_err();
        assert!(err.to_string().starts_with("Invalid number"));
        assert_eq!(parse("1.5").unwrap(), Expr::Float(1.5));
    }

    #[test]
    fn test_parse_filter_lambda() {
        let expr = parse("filter(x|$x.Age != 27 && $x.Name->contains('a'))").unwrap();
        let filter = expr.as_call_named("filter").unwrap();
        let Expr::Lambda(lambda) = &filter.parameters[0] else {
            panic!("Expected lambda");
        };
        assert_eq!(lambda.parameters, vec!["x".to_string()]);

        let and = lambda.body[0].as_call_named("and").unwrap();
        let not = and.parameters[0].as_call_named("not").unwrap();
        assert!(not.parameters[0].as_call_named("equal").is_some());
        let contains = and.parameters[1].as_call_named("contains").unwrap();
        assert_eq!(contains.parameters[0], Expr::property("x", "Name"));
        assert_eq!(contains.parameters[1], Expr::string("a"));
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse("1 + 2 * 3 == 7 || false").unwrap();
        let or = expr.as_call_named("or").unwrap();
        let equal = or.parameters[0].as_call_named("equal").unwrap();
        let plus = equal.parameters[0].as_call_named("plus").unwrap();
        assert_eq!(plus.parameters[0], Expr::Integer(1));
        assert!(plus.parameters[1].as_call_named("times").is_some());
    }

    #[test]
    fn test_parse_negative_literal() {
        let expr = parse("limit(-10)").unwrap();
        let limit = expr.as_call_named("limit").unwrap();
        assert_eq!(limit.parameters[0], Expr::Integer(-10));
    }

    #[test]
    fn test_parse_aggregate_colspec() {
        let expr = parse("groupBy(~[a], ~['val1__|__b':x|$x.'val1__|__b':x|$x->sum()])").unwrap();
        let group_by = expr.as_call_named("groupBy").unwrap();
        let Expr::ColSpecArray(specs) = &group_by.parameters[1] else {
            panic!("Expected colspec array");
        };
        let spec = &specs[0];
        assert_eq!(spec.name, "val1__|__b");
        let function1 = spec.function1.as_ref().unwrap();
        assert_eq!(function1.body[0], Expr::property("x", "val1__|__b"));
        let function2 = spec.function2.as_ref().unwrap();
        assert!(function2.body[0].as_call_named("sum").is_some());
    }

    #[test]
    fn test_parse_generic_type() {
        let expr =
            parse("cast(@meta::pure::metamodel::relation::Relation<(a:String, 'x y':Integer)>)")
                .unwrap();
        let cast = expr.as_call_named("cast").unwrap();
        let Expr::GenericType(generic) = &cast.parameters[0] else {
            panic!("Expected generic type");
        };
        assert_eq!(generic.path, "meta::pure::metamodel::relation::Relation");
        let columns = generic.columns.as_ref().unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[1].name, "x y");
        assert_eq!(columns[1].type_name, "Integer");
    }

    #[test]
    fn test_parse_brace_lambda() {
        let expr = parse("filter({x|let a = 1; $x.Age == 24;})").unwrap();
        let filter = expr.as_call_named("filter").unwrap();
        let Expr::Lambda(lambda) = &filter.parameters[0] else {
            panic!("Expected lambda");
        };
        assert_eq!(lambda.body.len(), 2);
        assert!(matches!(lambda.body[0], Expr::Let { .. }));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("select(~[a]").is_err());
        assert!(parse("filter(x|$x.a ==)").is_err());
        assert!(parse("select(~[a]) extra").is_err());
        assert!(parse("'unterminated").is_err());
        assert!(parse("foo").is_err());
    }
}
