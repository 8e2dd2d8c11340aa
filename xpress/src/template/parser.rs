//! Recursive-descent parser.
//!
//! Precedence (lowest → highest):
//!   ternary  →  coalesce (`??`)  →  or  →  and  →  equality/comparison  →
//!   additive  →  multiplicative  →  unary  →  postfix chain  →  primary
//!
//! [`Parser::parse`] is total: the first syntax error aborts the parse and is
//! returned as a lone [`Expr::ParseError`] root instead of a `Template`.

use super::ast::{BinOp, Expr, UnaryOp};
use super::lexer::{unescape, Delimiters, Lexer};
use super::token::{Token, TokenKind};

/// A syntax error, carried through the descent with `?`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub message: String,
    pub token: Token,
}

impl ParseFailure {
    pub fn into_expr(self) -> Expr {
        Expr::ParseError {
            message: self.message,
            token: self.token,
        }
    }
}

type ParseResult = Result<Expr, ParseFailure>;

/// Nesting budget for one action. Each parenthesis, unary operator, chained
/// binary operator and postfix access spends one level.
pub const MAX_NESTING: usize = 64;

// ── Parser ────────────────────────────────────────────────────────────────────

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Close marker spelling, for "Expect '}}'" messages.
    close: String,
    eof: Token,
    /// Depth of the node currently being built.
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::with_close_marker(tokens, Delimiters::default().close)
    }

    pub fn with_close_marker(tokens: Vec<Token>, close: impl Into<String>) -> Self {
        let end = tokens.last().map(|t| (t.position, t.line)).unwrap_or((0, 1));
        Parser {
            tokens,
            pos: 0,
            close: close.into(),
            eof: Token::new("", TokenKind::Eof, end.0, end.1),
            depth: 0,
        }
    }

    /// Parse the whole token stream into one root node.
    pub fn parse(mut self) -> Expr {
        match self.template() {
            Ok(expr) => expr,
            Err(failure) => failure.into_expr(),
        }
    }

    // ── Token helpers ─────────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn at_end(&self) -> bool {
        self.check(TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        if !self.at_end() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token, ParseFailure> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.failure(message))
        }
    }

    /// Go one level deeper, failing once the tree would exceed
    /// [`MAX_NESTING`].
    fn descend(&mut self) -> Result<(), ParseFailure> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.failure("Expression nested too deeply."));
        }
        Ok(())
    }

    fn nested(&mut self, rule: fn(&mut Self) -> ParseResult) -> ParseResult {
        self.descend()?;
        let expr = rule(self);
        self.depth -= 1;
        expr
    }

    /// A failure at the current token: `"<message> got <lexeme>"`.
    fn failure(&self, message: &str) -> ParseFailure {
        let token = self.peek().clone();
        ParseFailure {
            message: format!("{message} got {}", token.describe()),
            token,
        }
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    // template → ( action | TEXT )* ;
    fn template(&mut self) -> ParseResult {
        if let Some(err) = self.tokens.last().filter(|t| t.kind == TokenKind::Error) {
            return Err(ParseFailure {
                message: err.lexeme.clone(),
                token: err.clone(),
            });
        }

        let mut parts = Vec::new();
        while !self.at_end() {
            if self.eat(TokenKind::ActionOpen) {
                parts.push(self.action()?);
            } else if self.check(TokenKind::Text) {
                parts.push(Expr::Text(self.advance().lexeme));
            } else {
                return Err(self.failure("Expect text or action."));
            }
        }
        Ok(Expr::Template(parts))
    }

    // action → ACTION_OPEN expression ACTION_CLOSE ;
    fn action(&mut self) -> ParseResult {
        let expr = self.expression()?;
        let message = format!("Expect '{}' after expression.", self.close);
        self.expect(TokenKind::ActionClose, &message)?;
        Ok(expr)
    }

    fn expression(&mut self) -> ParseResult {
        self.nested(Self::ternary)
    }

    // ternary → coalesce ( '?' expression ':' expression )? ;
    fn ternary(&mut self) -> ParseResult {
        let cond = self.coalesce()?;
        if !self.eat(TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.expression()?;
        self.expect(TokenKind::Colon, "Expect ':' after true expression.")?;
        let otherwise = self.expression()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    // coalesce → logicalOr ( '??' logicalOr )* ;
    fn coalesce(&mut self) -> ParseResult {
        let start = self.depth;
        let mut lhs = self.logical_or()?;
        while self.eat(TokenKind::Coalesce) {
            self.descend()?;
            let rhs = self.logical_or()?;
            lhs = binary(lhs, BinOp::Coalesce, rhs);
        }
        self.depth = start;
        Ok(lhs)
    }

    fn logical_or(&mut self) -> ParseResult {
        let start = self.depth;
        let mut lhs = self.logical_and()?;
        while self.eat(TokenKind::Or) {
            self.descend()?;
            let rhs = self.logical_and()?;
            lhs = binary(lhs, BinOp::Or, rhs);
        }
        self.depth = start;
        Ok(lhs)
    }

    fn logical_and(&mut self) -> ParseResult {
        let start = self.depth;
        let mut lhs = self.equality()?;
        while self.eat(TokenKind::And) {
            self.descend()?;
            let rhs = self.equality()?;
            lhs = binary(lhs, BinOp::And, rhs);
        }
        self.depth = start;
        Ok(lhs)
    }

    // Equality and comparison share one left-associative level.
    fn equality(&mut self) -> ParseResult {
        let start = self.depth;
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqualEqual => BinOp::Eq,
                TokenKind::BangEqual => BinOp::Ne,
                TokenKind::Greater => BinOp::Gt,
                TokenKind::GreaterEqual => BinOp::Ge,
                TokenKind::Less => BinOp::Lt,
                TokenKind::LessEqual => BinOp::Le,
                _ => break,
            };
            self.pos += 1;
            self.descend()?;
            let rhs = self.term()?;
            lhs = binary(lhs, op, rhs);
        }
        self.depth = start;
        Ok(lhs)
    }

    fn term(&mut self) -> ParseResult {
        let start = self.depth;
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.descend()?;
            let rhs = self.factor()?;
            lhs = binary(lhs, op, rhs);
        }
        self.depth = start;
        Ok(lhs)
    }

    fn factor(&mut self) -> ParseResult {
        let start = self.depth;
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Rem,
                _ => break,
            };
            self.pos += 1;
            self.descend()?;
            let rhs = self.unary()?;
            lhs = binary(lhs, op, rhs);
        }
        self.depth = start;
        Ok(lhs)
    }

    fn unary(&mut self) -> ParseResult {
        let op = match self.peek().kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.call(),
        };
        self.pos += 1;
        Ok(Expr::Unary {
            op,
            operand: Box::new(self.nested(Self::unary)?),
        })
    }

    // call → primary ( '(' args? ')' | ('.' | '?.') IDENT | '?.'? '[' expr ']' | '?.(' args? ')' )* ;
    fn call(&mut self) -> ParseResult {
        let start = self.depth;
        let mut expr = self.primary()?;
        loop {
            let kind = self.peek().kind;
            if matches!(
                kind,
                TokenKind::LeftParen
                    | TokenKind::LeftBracket
                    | TokenKind::Dot
                    | TokenKind::OptionalChain
            ) {
                self.descend()?;
            }
            match kind {
                TokenKind::LeftParen => {
                    self.pos += 1;
                    expr = self.finish_call(expr, false)?;
                }
                TokenKind::LeftBracket => {
                    self.pos += 1;
                    expr = self.finish_index(expr, false)?;
                }
                TokenKind::Dot => {
                    self.pos += 1;
                    let name =
                        self.expect(TokenKind::Identifier, "Expect property name after '.'.")?;
                    expr = get(expr, name, false);
                }
                TokenKind::OptionalChain => {
                    self.pos += 1;
                    match self.peek().kind {
                        TokenKind::Identifier => {
                            let name = self.advance();
                            expr = get(expr, name, true);
                        }
                        TokenKind::LeftBracket => {
                            self.pos += 1;
                            expr = self.finish_index(expr, true)?;
                        }
                        TokenKind::LeftParen => {
                            self.pos += 1;
                            expr = self.finish_call(expr, true)?;
                        }
                        _ => {
                            return Err(self.failure("Expect property name, '[' or '(' after '?.'."))
                        }
                    }
                }
                _ => break,
            }
        }
        self.depth = start;
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr, optional: bool) -> ParseResult {
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            args.push(self.expression()?);
            while self.eat(TokenKind::Comma) {
                args.push(self.expression()?);
            }
        }
        self.expect(TokenKind::RightParen, "Expect ')' after arguments.")?;
        Ok(Expr::Call {
            callee: Box::new(callee),
            args,
            optional,
        })
    }

    fn finish_index(&mut self, object: Expr, optional: bool) -> ParseResult {
        let index = self.expression()?;
        self.expect(TokenKind::RightBracket, "Expect ']' after index expression.")?;
        Ok(Expr::Index {
            object: Box::new(object),
            index: Box::new(index),
            optional,
        })
    }

    // primary → "true" | "false" | "nil" | NUMBER | STRING | IDENTIFIER
    //         | '(' expression ')' | array | map ;
    fn primary(&mut self) -> ParseResult {
        match self.peek().kind {
            TokenKind::False => {
                self.pos += 1;
                Ok(Expr::Bool(false))
            }
            TokenKind::True => {
                self.pos += 1;
                Ok(Expr::Bool(true))
            }
            TokenKind::Nil => {
                self.pos += 1;
                Ok(Expr::Nil)
            }
            TokenKind::Number => {
                let Some(value) = parse_number(&self.peek().lexeme) else {
                    return Err(self.failure("Invalid number literal."));
                };
                let raw = self.advance().lexeme;
                Ok(Expr::Number { value, raw })
            }
            TokenKind::String => {
                let raw = self.advance().lexeme;
                Ok(Expr::Str {
                    value: unescape(&raw),
                    raw,
                })
            }
            TokenKind::Identifier => Ok(Expr::Variable(self.advance())),
            TokenKind::LeftParen => {
                self.pos += 1;
                let inner = self.expression()?;
                self.expect(TokenKind::RightParen, "Expect ')' after expression.")?;
                Ok(Expr::Grouping(Box::new(inner)))
            }
            TokenKind::LeftBracket => {
                self.pos += 1;
                self.array()
            }
            TokenKind::LeftBrace => {
                self.pos += 1;
                self.map()
            }
            _ => Err(self.failure("Expect expression.")),
        }
    }

    // array → '[' ( expression ( ',' expression )* )? ']' ;
    fn array(&mut self) -> ParseResult {
        let mut items = Vec::new();
        if !self.check(TokenKind::RightBracket) {
            items.push(self.expression()?);
            while self.eat(TokenKind::Comma) {
                items.push(self.expression()?);
            }
        }
        self.expect(TokenKind::RightBracket, "Expect ']' after array expression.")?;
        Ok(Expr::Array(items))
    }

    // map → '{' ( entry ( ',' entry )* )? '}' ;
    fn map(&mut self) -> ParseResult {
        let mut entries = Vec::new();
        if !self.check(TokenKind::RightBrace) {
            entries.push(self.map_entry()?);
            while self.eat(TokenKind::Comma) {
                entries.push(self.map_entry()?);
            }
        }
        self.expect(TokenKind::RightBrace, "Expect '}' after map entries.")?;
        Ok(Expr::Map(entries))
    }

    // entry → ( IDENTIFIER | STRING | '[' expression ']' ) ':' expression ;
    fn map_entry(&mut self) -> Result<(Expr, Expr), ParseFailure> {
        let key = match self.peek().kind {
            TokenKind::Identifier => {
                let name = self.advance().lexeme;
                Expr::Str {
                    value: name.clone(),
                    raw: name,
                }
            }
            TokenKind::String => {
                let raw = self.advance().lexeme;
                Expr::Str {
                    value: unescape(&raw),
                    raw,
                }
            }
            TokenKind::LeftBracket => {
                self.pos += 1;
                let key = self.expression()?;
                self.expect(TokenKind::RightBracket, "Expect ']' after computed key.")?;
                key
            }
            _ => return Err(self.failure("Expect map key.")),
        };
        self.expect(TokenKind::Colon, "Expect ':' after map key.")?;
        let value = self.expression()?;
        Ok((key, value))
    }
}

fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

fn get(object: Expr, name: Token, optional: bool) -> Expr {
    Expr::Get {
        object: Box::new(object),
        name,
        optional,
    }
}

/// Decimal or radix-prefixed literal, always widened to `f64`.
fn parse_number(raw: &str) -> Option<f64> {
    let radix = match raw.get(..2) {
        Some("0x" | "0X") => 16,
        Some("0o" | "0O") => 8,
        Some("0b" | "0B") => 2,
        _ => return raw.parse().ok(),
    };
    u64::from_str_radix(&raw[2..], radix).ok().map(|n| n as f64)
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Scan and parse `src` with the default delimiters.
pub fn parse(src: &str) -> Expr {
    Parser::new(Lexer::new(src).scan()).parse()
}

/// Scan and parse `src` with custom delimiters.
pub fn parse_with(src: &str, delims: &Delimiters) -> Expr {
    let delims = Delimiters::new(delims.open.as_str(), delims.close.as_str());
    let close = delims.close.clone();
    let tokens = Lexer::with_delimiters(src, delims).scan();
    Parser::with_close_marker(tokens, close).parse()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
