// Pure tokens for lexical analysis

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Identifier(String),
    Number(String),
    String(String),
    Date(String),
    Variable(String),

    // Keywords
    True,
    False,
    Let,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    EqualEqual,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Not,
    AndAnd,
    OrOr,
    Arrow,
    Pipe,
    Tilde,
    At,
    Equal,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Semicolon,
    Dot,
    Colon,
    DoubleColon,

    // Special
    Illegal(char),
    Eof,
}

impl Token {
    /// Convert a string to a keyword token if it matches.
    ///
    /// Pure keywords are case-sensitive.
    pub fn keyword_from_str(s: &str) -> Option<Token> {
        match s {
            "true" => Some(Token::True),
            "false" => Some(Token::False),
            "let" => Some(Token::Let),
            _ => None,
        }
    }
}
