// Pure lexer - tokenizes query expressions

use super::token::Token;

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let input: Vec<char> = input.chars().collect();
        let current_char = input.first().copied();
        Lexer {
            input,
            position: 0,
            current_char,
        }
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let Some(ch) = self.current_char else {
            return Token::Eof;
        };

        match ch {
            '+' => self.single(Token::Plus),
            '*' => self.single(Token::Star),
            '/' => self.single(Token::Slash),
            '~' => self.single(Token::Tilde),
            '@' => self.single(Token::At),
            '(' => self.single(Token::LeftParen),
            ')' => self.single(Token::RightParen),
            '[' => self.single(Token::LeftBracket),
            ']' => self.single(Token::RightBracket),
            '{' => self.single(Token::LeftBrace),
            '}' => self.single(Token::RightBrace),
            ',' => self.single(Token::Comma),
            ';' => self.single(Token::Semicolon),
            '.' => self.single(Token::Dot),
            '-' => self.pair('>', Token::Arrow, Token::Minus),
            '=' => self.pair('=', Token::EqualEqual, Token::Equal),
            '!' => self.pair('=', Token::NotEqual, Token::Not),
            '<' => self.pair('=', Token::LessEqual, Token::Less),
            '>' => self.pair('=', Token::GreaterEqual, Token::Greater),
            '|' => self.pair('|', Token::OrOr, Token::Pipe),
            ':' => self.pair(':', Token::DoubleColon, Token::Colon),
            '&' => {
                self.advance();
                if self.current_char == Some('&') {
                    self.advance();
                    Token::AndAnd
                } else {
                    Token::Illegal('&')
                }
            }
            '$' => {
                self.advance();
                match self.current_char {
                    Some(c) if c.is_alphabetic() || c == '_' => Token::Variable(self.read_word()),
                    _ => Token::Illegal('$'),
                }
            }
            '%' => {
                self.advance();
                match self.current_char {
                    Some(c) if c.is_ascii_digit() => self.read_date(),
                    _ => Token::Illegal('%'),
                }
            }
            '\'' => self.read_string(),
            c if c.is_alphabetic() || c == '_' => self.read_identifier(),
            c if c.is_ascii_digit() => self.read_number(),
            c => {
                self.advance();
                Token::Illegal(c)
            }
        }
    }

    /// Advance to the next character
    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    /// Peek at the next character without advancing
    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    /// Emit `double` when the current character is followed by `next`, `single` otherwise
    fn pair(&mut self, next: char, double: Token, single: Token) -> Token {
        if self.peek() == Some(next) {
            self.advance();
            self.advance();
            double
        } else {
            self.advance();
            single
        }
    }

    /// Skip whitespace characters
    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        word
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        let identifier = self.read_word();
        Token::keyword_from_str(&identifier).unwrap_or(Token::Identifier(identifier))
    }

    /// Read a single-quoted string literal, honoring backslash escapes
    fn read_string(&mut self) -> Token {
        self.advance(); // Skip opening quote
        let mut string = String::new();

        while let Some(ch) = self.current_char {
            match ch {
                '\'' => {
                    self.advance();
                    return Token::String(string);
                }
                '\\' => {
                    self.advance();
                    match self.current_char {
                        Some('n') => string.push('\n'),
                        Some('t') => string.push('\t'),
                        Some('r') => string.push('\r'),
                        Some(other) => string.push(other),
                        None => break,
                    }
                    self.advance();
                }
                _ => {
                    string.push(ch);
                    self.advance();
                }
            }
        }

        // Unterminated string
        Token::Illegal('\'')
    }

    /// Read a number (integer or float)
    fn read_number(&mut self) -> Token {
        let mut number = String::new();
        let mut has_dot = false;

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else if ch == '.' && !has_dot && self.peek().is_some_and(|c| c.is_ascii_digit()) {
                has_dot = true;
                number.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        Token::Number(number)
    }

    /// Read a date literal body (after `%`), e.g. `2024-01-31` or `2024-01-31T10:00:00`
    fn read_date(&mut self) -> Token {
        let mut date = String::new();
        while let Some(ch) = self.current_char {
            if ch == '-' && self.peek() == Some('>') {
                break;
            }
            if ch.is_ascii_digit() || matches!(ch, '-' | 'T' | ':' | '.') {
                date.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        Token::Date(date)
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token();
            if token == Token::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }

        tokens
    }
}
