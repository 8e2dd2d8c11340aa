//! Token kinds produced by the template lexer.

use std::fmt;

// ── TokenKind ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Colon,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Equal,
    EqualEqual,
    BangEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    And,
    Or,
    Coalesce,      // ??
    OptionalChain, // ?.
    Question,

    // Structural markers
    ActionOpen,  // @{{
    ActionClose, // }}

    // Literals
    Identifier,
    String,
    Number,
    Text,

    // Keywords
    True,
    False,
    Nil,

    // Sentinels
    Eof,
    Error,
}

impl TokenKind {
    /// Keyword lookup, applied only to identifier-shaped runs.
    pub fn keyword(ident: &str) -> Option<TokenKind> {
        match ident {
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "nil" => Some(TokenKind::Nil),
            "and" => Some(TokenKind::And),
            "or" => Some(TokenKind::Or),
            _ => None,
        }
    }
}

// ── Token ─────────────────────────────────────────────────────────────────────

/// A single lexical unit.
///
/// `position` is the 0-based byte offset of the first byte of the lexeme in
/// the source; `line` is 1-based. For [`TokenKind::Error`] the lexeme holds
/// the human-readable description of the lex failure instead of source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub lexeme: String,
    pub kind: TokenKind,
    pub position: usize,
    pub line: usize,
}

impl Token {
    pub fn new(lexeme: impl Into<String>, kind: TokenKind, position: usize, line: usize) -> Self {
        Token {
            lexeme: lexeme.into(),
            kind,
            position,
            line,
        }
    }

    /// How this token is named in "got ..." parse error messages.
    pub fn describe(&self) -> &str {
        match self.kind {
            TokenKind::Eof => "unclosed action",
            _ => &self.lexeme,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?} @{}", self.kind, self.lexeme, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords() {
        assert_eq!(TokenKind::keyword("true"), Some(TokenKind::True));
        assert_eq!(TokenKind::keyword("nil"), Some(TokenKind::Nil));
        assert_eq!(TokenKind::keyword("or"), Some(TokenKind::Or));
        assert_eq!(TokenKind::keyword("truthy"), None);
    }

    #[test]
    fn eof_describes_as_unclosed_action() {
        let t = Token::new("", TokenKind::Eof, 5, 1);
        assert_eq!(t.describe(), "unclosed action");
        let t = Token::new("}}", TokenKind::ActionClose, 7, 1);
        assert_eq!(t.describe(), "}}");
    }
}
