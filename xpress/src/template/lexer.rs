//! Delimiter-aware template scanner.
//!
//! Source text alternates between two modes:
//!
//! | Mode   | Entered by            | Produces                                    |
//! |--------|-----------------------|---------------------------------------------|
//! | text   | start / close marker  | one `Text` token per non-empty run          |
//! | action | open marker (`@{{`)   | expression tokens, then `ActionClose`       |
//!
//! Scanning is total: illegal input appends a single [`TokenKind::Error`]
//! token (its lexeme is the description) and stops. A successful scan always
//! ends with [`TokenKind::Eof`].

use aho_corasick::AhoCorasick;

use super::token::{Token, TokenKind};

// ── Delimiters ────────────────────────────────────────────────────────────────

/// The pair of markers that open and close an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    pub open: String,
    pub close: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Delimiters {
            open: "@{{".to_owned(),
            close: "}}".to_owned(),
        }
    }
}

impl Delimiters {
    /// Empty markers cannot be scanned for: if either one is empty, the
    /// whole pair falls back to `@{{` / `}}`. Compare against
    /// [`Delimiters::default`] to detect the substitution.
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        let (open, close) = (open.into(), close.into());
        if open.is_empty() || close.is_empty() {
            return Self::default();
        }
        Delimiters { open, close }
    }
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

pub struct Lexer<'a> {
    src: &'a str,
    delims: Delimiters,
    opener: AhoCorasick,
    tokens: Vec<Token>,
    /// Byte offset of the next unread character.
    pos: usize,
    /// Byte offset where the token being scanned starts.
    start: usize,
    line: usize,
    start_line: usize,
    /// Open parens/brackets/braces inside the current action.
    depth: usize,
    halted: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self::with_delimiters(src, Delimiters::default())
    }

    pub fn with_delimiters(src: &'a str, delims: Delimiters) -> Self {
        let delims = Delimiters::new(delims.open, delims.close);
        let opener = AhoCorasick::new([delims.open.as_str()]);
        Lexer {
            src,
            delims,
            opener,
            tokens: Vec::new(),
            pos: 0,
            start: 0,
            line: 1,
            start_line: 1,
            depth: 0,
            halted: false,
        }
    }

    /// Scan the whole source.
    pub fn scan(mut self) -> Vec<Token> {
        while !self.at_end() && !self.halted {
            self.scan_text();
            if self.at_end() || self.halted {
                break;
            }
            self.scan_action();
        }
        if !self.halted {
            self.tokens
                .push(Token::new("", TokenKind::Eof, self.src.len(), self.line));
        }
        self.tokens
    }

    // ── Cursor helpers ────────────────────────────────────────────────────────

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek2(&self) -> Option<char> {
        let mut it = self.rest().chars();
        it.next();
        it.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += ch.len_utf8();
            true
        } else {
            false
        }
    }

    fn mark(&mut self) {
        self.start = self.pos;
        self.start_line = self.line;
    }

    fn add(&mut self, kind: TokenKind) {
        let lexeme = &self.src[self.start..self.pos];
        self.tokens
            .push(Token::new(lexeme, kind, self.start, self.start_line));
    }

    fn error(&mut self, message: String) {
        self.tokens
            .push(Token::new(message, TokenKind::Error, self.start, self.start_line));
        self.halted = true;
    }

    // ── Text mode ─────────────────────────────────────────────────────────────

    /// Consume raw text up to (and including) the next open marker.
    fn scan_text(&mut self) {
        self.mark();
        let found = self.opener.find(self.rest()).map(|m| m.start());
        let text_end = match found {
            Some(offset) => self.pos + offset,
            None => self.src.len(),
        };
        if text_end > self.pos {
            let text = &self.src[self.pos..text_end];
            self.line += text.matches('\n').count();
            self.pos = text_end;
            self.add(TokenKind::Text);
        }
        if found.is_some() {
            self.mark();
            self.pos += self.delims.open.len();
            self.add(TokenKind::ActionOpen);
            self.depth = 0;
        }
    }

    // ── Action mode ───────────────────────────────────────────────────────────

    fn scan_action(&mut self) {
        loop {
            self.skip_ws();
            if self.at_end() || self.halted {
                return;
            }
            self.mark();
            if self.depth == 0 && self.rest().starts_with(self.delims.close.as_str()) {
                self.pos += self.delims.close.len();
                self.add(TokenKind::ActionClose);
                return;
            }
            self.scan_action_token();
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\r' | '\n')) {
            self.advance();
        }
    }

    fn scan_action_token(&mut self) {
        let Some(c) = self.advance() else { return };
        match c {
            '(' => self.open_nest(TokenKind::LeftParen),
            '[' => self.open_nest(TokenKind::LeftBracket),
            '{' => self.open_nest(TokenKind::LeftBrace),
            ')' => self.close_nest(TokenKind::RightParen),
            ']' => self.close_nest(TokenKind::RightBracket),
            '}' => self.close_nest(TokenKind::RightBrace),
            ',' => self.add(TokenKind::Comma),
            '.' => self.add(TokenKind::Dot),
            ':' => self.add(TokenKind::Colon),
            '+' => self.add(TokenKind::Plus),
            '-' => self.add(TokenKind::Minus),
            '*' => self.add(TokenKind::Star),
            '/' => self.add(TokenKind::Slash),
            '%' => self.add(TokenKind::Percent),
            '!' => {
                let kind = if self.eat('=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                };
                self.add(kind);
            }
            '=' => {
                let kind = if self.eat('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                self.add(kind);
            }
            '<' => {
                let kind = if self.eat('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                };
                self.add(kind);
            }
            '>' => {
                let kind = if self.eat('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                self.add(kind);
            }
            '&' => {
                if self.eat('&') {
                    self.add(TokenKind::And);
                } else {
                    self.error("unexpected character '&'".to_owned());
                }
            }
            '|' => {
                if self.eat('|') {
                    self.add(TokenKind::Or);
                } else {
                    self.error("unexpected character '|'".to_owned());
                }
            }
            '?' => {
                let kind = if self.eat('.') {
                    TokenKind::OptionalChain
                } else if self.eat('?') {
                    TokenKind::Coalesce
                } else {
                    TokenKind::Question
                };
                self.add(kind);
            }
            '"' | '\'' => self.read_string(c),
            '0'..='9' => self.read_number(c),
            c if c.is_alphabetic() || c == '_' => self.read_ident(),
            c => self.error(format!("unexpected character '{c}'")),
        }
    }

    fn open_nest(&mut self, kind: TokenKind) {
        self.depth += 1;
        self.add(kind);
    }

    fn close_nest(&mut self, kind: TokenKind) {
        self.depth = self.depth.saturating_sub(1);
        self.add(kind);
    }

    fn read_string(&mut self, quote: char) {
        loop {
            match self.advance() {
                None => return self.error("unterminated string".to_owned()),
                Some('\\') => {
                    if self.advance().is_none() {
                        return self.error("unterminated string".to_owned());
                    }
                }
                Some(c) if c == quote => break,
                Some(_) => {}
            }
        }
        self.add(TokenKind::String);
    }

    fn read_number(&mut self, first: char) {
        let radix = match (first, self.peek()) {
            ('0', Some('x' | 'X')) => Some(16),
            ('0', Some('o' | 'O')) => Some(8),
            ('0', Some('b' | 'B')) => Some(2),
            _ => None,
        };

        if let Some(radix) = radix {
            self.advance();
            let digits = self.pos;
            while matches!(self.peek(), Some(c) if c.is_digit(radix)) {
                self.advance();
            }
            if self.pos == digits {
                let text = self.src[self.start..self.pos].to_owned();
                return self.error(format!("malformed number '{text}'"));
            }
        } else {
            while matches!(self.peek(), Some('0'..='9')) {
                self.advance();
            }
            if self.peek() == Some('.') && matches!(self.peek2(), Some('0'..='9')) {
                self.advance();
                while matches!(self.peek(), Some('0'..='9')) {
                    self.advance();
                }
            }
        }

        if let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                let text = self.src[self.start..self.pos].to_owned();
                return self.error(format!("unexpected character '{c}' after number {text}"));
            }
        }
        self.add(TokenKind::Number);
    }

    fn read_ident(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        if !self.at_ident_terminator() {
            let text = self.src[self.start..self.pos].to_owned();
            let c = self.peek().unwrap_or_default();
            return self.error(format!("unexpected character '{c}' after identifier {text}"));
        }
        let kind =
            TokenKind::keyword(&self.src[self.start..self.pos]).unwrap_or(TokenKind::Identifier);
        self.add(kind);
    }

    /// An identifier must be followed by whitespace, an operator, a
    /// delimiter, the close marker, or the end of input.
    fn at_ident_terminator(&self) -> bool {
        if self.rest().starts_with(self.delims.close.as_str()) {
            return true;
        }
        match self.peek() {
            None => true,
            Some(' ' | '\t' | '\r' | '\n') => true,
            Some('+' | '-' | '*' | '/' | '%' | '=' | '<' | '>' | '&' | '|' | '?' | ':') => true,
            Some('.' | ',' | '(' | ')' | '[' | ']' | '{' | '}') => true,
            Some('!') => self.peek2() == Some('='),
            Some(_) => false,
        }
    }
}

/// Scan `src` with the default delimiters.
pub fn scan(src: &str) -> Vec<Token> {
    Lexer::new(src).scan()
}

/// Decode a raw `String` lexeme (quotes included) into its value.
///
/// Recognised escapes: `\n`, `\t`, `\r`, `\\`, `\'`, `\"`. Any other escaped
/// character keeps its backslash.
pub fn unescape(raw: &str) -> String {
    let inner = if raw.len() >= 2 { &raw[1..raw.len() - 1] } else { raw };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(e @ ('\\' | '\'' | '"')) => out.push(e),
            Some(e) => {
                out.push('\\');
                out.push(e);
            }
            None => out.push('\\'),
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
