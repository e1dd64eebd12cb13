// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Syntactic analysis.
//!
//! A recursive-descent parser over a C-like precedence table, tightest first:
//!
//! ```text
//! primary → unary (! ~ + -) → * / % → + - → << >> → < <= > >= == != → & → ^ → | → && → ||
//!         → , (output stacking) → -> and <- (left-associative, -> tighter than <-)
//! ```
//!
//! `=` is a statement form, not an expression.  `[i]` selects output `i` of a node expression,
//! `a.b` is path selection, and `{ k: v, … }` is a bundle literal.  The parser recovers from
//! errors at statement boundaries (`;`) and closing braces, so one run surfaces several
//! diagnostics.

use crate::ast::*;
use crate::diagnostics::DiagnosticCode;
use crate::diagnostics::DiagnosticSink;
use crate::lex::Token;
use crate::lex::TokenKind;
use crate::span::Span;
use crate::types::Rate;
use crate::types::ScalarType;

/// Parses a token stream into a [`SourceProgram`][].  Returns `None` only when the `program`
/// header itself is missing or malformed; otherwise a partial tree is returned alongside whatever
/// diagnostics were collected.
///
/// [`SourceProgram`]: ../ast/struct.SourceProgram.html
pub fn parse(source: &str, tokens: &[Token], sink: &mut DiagnosticSink) -> Option<SourceProgram> {
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        sink,
    };
    parser.program()
}

struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Token],
    pos: usize,
    sink: &'a mut DiagnosticSink,
}

impl<'a> Parser<'a> {
    //---------------------------------------------------------------------------------------------
    // Token plumbing

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn peek_at(&self, ahead: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + ahead).map(|t| t.kind)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) {
            self.bump()
        } else {
            None
        }
    }

    /// The span to attach to an "unexpected end of input" diagnostic.
    fn eof_span(&self) -> Span {
        self.tokens
            .last()
            .map(|t| Span::point(t.span.end))
            .unwrap_or_else(|| Span::point(self.source.len()))
    }

    fn expect(&mut self, kind: TokenKind) -> Option<Token> {
        match self.peek() {
            Some(token) if token.kind == kind => self.bump(),
            Some(token) => {
                self.sink.error(
                    DiagnosticCode::UnexpectedToken,
                    token.span,
                    format!(
                        "expected {}, found {}",
                        kind.describe(),
                        token.kind.describe()
                    ),
                );
                None
            }
            None => {
                self.sink.error(
                    DiagnosticCode::UnexpectedEndOfInput,
                    self.eof_span(),
                    format!("expected {}, found end of input", kind.describe()),
                );
                None
            }
        }
    }

    fn expect_identifier(&mut self) -> Option<Ident> {
        let token = self.expect(TokenKind::Identifier)?;
        Some(Ident::new(token.text(self.source), token.span))
    }

    fn unexpected(&mut self, wanted: &str) {
        match self.peek() {
            Some(token) => self.sink.error(
                DiagnosticCode::UnexpectedToken,
                token.span,
                format!("expected {}, found {}", wanted, token.kind.describe()),
            ),
            None => self.sink.error(
                DiagnosticCode::UnexpectedEndOfInput,
                self.eof_span(),
                format!("expected {}, found end of input", wanted),
            ),
        }
    }

    /// Skips forward to just past the next `;`, or to a closing `}`, to resynchronize after a
    /// statement-level error.
    fn synchronize(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Semicolon if depth == 0 => {
                    self.bump();
                    return;
                }
                TokenKind::LBrace | TokenKind::LParen | TokenKind::LBracket => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::RBrace if depth == 0 => return,
                TokenKind::RBrace | TokenKind::RParen | TokenKind::RBracket => {
                    depth = depth.saturating_sub(1);
                    self.bump();
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    //---------------------------------------------------------------------------------------------
    // Top level

    fn program(&mut self) -> Option<SourceProgram> {
        self.expect(TokenKind::Program)?;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::Semicolon);

        let external = if self.at(TokenKind::External) {
            self.external_block()
        } else {
            self.unexpected("`external` block");
            ExternalBlock::default()
        };

        let mut stages = Vec::new();
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Stage => {
                    if let Some(stage) = self.stage() {
                        stages.push(stage);
                    }
                }
                _ => {
                    self.unexpected("`stage`");
                    self.bump();
                }
            }
        }
        if stages.is_empty() {
            self.sink.error(
                DiagnosticCode::UnexpectedEndOfInput,
                self.eof_span(),
                "a program must declare at least one stage",
            );
        }

        Some(SourceProgram {
            name,
            external,
            stages,
        })
    }

    fn stage(&mut self) -> Option<StageDecl> {
        let start = self.expect(TokenKind::Stage)?.span;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LParen)?;
        let mut outputs = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                if let Some(decl) = self.stage_output_decl() {
                    outputs.push(decl);
                }
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;

        let mut body = Vec::new();
        loop {
            match self.peek_kind() {
                None => {
                    self.sink.error(
                        DiagnosticCode::UnexpectedEndOfInput,
                        self.eof_span(),
                        "unclosed stage body",
                    );
                    break;
                }
                Some(TokenKind::RBrace) => {
                    self.bump();
                    break;
                }
                Some(_) => {
                    if let Some(stmt) = self.statement() {
                        body.push(stmt);
                    }
                }
            }
        }

        let end = body
            .last()
            .map(|_| self.tokens[self.pos.saturating_sub(1)].span)
            .unwrap_or(name.span);
        Some(StageDecl {
            span: start.to(end),
            name,
            outputs,
            body,
        })
    }

    fn stage_output_decl(&mut self) -> Option<StageOutputDecl> {
        let name = self.expect_identifier()?;
        self.expect(TokenKind::Equal)?;
        let shape = self.shape_annotation()?;
        Some(StageOutputDecl {
            span: name.span.to(shape.span),
            name,
            shape,
        })
    }

    /// `f32` or `f32(2)`.
    fn shape_annotation(&mut self) -> Option<ShapeAnnotation> {
        let token = self.expect(TokenKind::Identifier)?;
        let scalar = match ScalarType::from_name(token.text(self.source)) {
            Some(scalar) => scalar,
            None => {
                self.sink.error(
                    DiagnosticCode::UnexpectedToken,
                    token.span,
                    format!("expected a scalar type, found `{}`", token.text(self.source)),
                );
                return None;
            }
        };
        let mut span = token.span;
        let mut width = 1;
        if self.eat(TokenKind::LParen).is_some() {
            width = self.expect_small_int("channel count")?;
            if width == 0 {
                self.sink.error(
                    DiagnosticCode::InvalidLiteral,
                    span,
                    "a value carries at least one channel",
                );
                width = 1;
            }
            span = span.to(self.expect(TokenKind::RParen)?.span);
        }
        Some(ShapeAnnotation {
            scalar,
            width,
            span,
        })
    }

    fn expect_small_int(&mut self, what: &str) -> Option<u32> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Integer { value, suffix: None },
                span,
            }) => {
                self.bump();
                if value < 0 || value > u32::MAX as i128 {
                    self.sink.error(
                        DiagnosticCode::InvalidLiteral,
                        span,
                        format!("{} out of range", what),
                    );
                    return None;
                }
                Some(value as u32)
            }
            _ => {
                self.unexpected(&format!("{} (an integer literal)", what));
                None
            }
        }
    }

    //---------------------------------------------------------------------------------------------
    // Statements

    fn statement(&mut self) -> Option<Stmt> {
        let result = match self.peek_kind() {
            Some(TokenKind::Let) => self.let_statement(),
            Some(TokenKind::Cell) => self.cell_statement(),
            Some(TokenKind::Buffer) => self.buffer_statement(),
            Some(TokenKind::Identifier) if self.peek_at(1) == Some(TokenKind::Equal) => {
                self.assign_statement()
            }
            Some(_) => self.expr_statement(),
            None => None,
        };
        if result.is_none() {
            self.synchronize();
        }
        result
    }

    fn let_statement(&mut self) -> Option<Stmt> {
        let start = self.expect(TokenKind::Let)?.span;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::Equal)?;
        let value = self.expression()?;
        let end = self.expect(TokenKind::Semicolon)?.span;
        Some(Stmt::Let {
            name,
            value,
            span: start.to(end),
        })
    }

    fn assign_statement(&mut self) -> Option<Stmt> {
        let name = self.expect_identifier()?;
        self.expect(TokenKind::Equal)?;
        let value = self.expression()?;
        let end = self.expect(TokenKind::Semicolon)?.span;
        Some(Stmt::Assign {
            span: name.span.to(end),
            name,
            value,
        })
    }

    /// `cell (start, end): shape;` or `cell(k) (start, end): shape;` — the delay form is
    /// recognized by the integer literal directly after the opening parenthesis.
    fn cell_statement(&mut self) -> Option<Stmt> {
        let start = self.expect(TokenKind::Cell)?.span;
        let mut delay = None;
        if self.at(TokenKind::LParen)
            && matches!(self.peek_at(1), Some(TokenKind::Integer { .. }))
        {
            self.bump();
            let span = self.peek().map(|t| t.span).unwrap_or(start);
            let value = self.expect_small_int("cell delay")?;
            delay = Some(IntField { value, span });
            self.expect(TokenKind::RParen)?;
        }
        self.expect(TokenKind::LParen)?;
        let start_name = self.expect_identifier()?;
        self.expect(TokenKind::Comma)?;
        let end_name = self.expect_identifier()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Colon)?;
        let shape = self.shape_annotation()?;
        let end = self.expect(TokenKind::Semicolon)?.span;
        Some(Stmt::Cell {
            delay,
            start: start_name,
            end: end_name,
            shape,
            span: start.to(end),
        })
    }

    fn buffer_statement(&mut self) -> Option<Stmt> {
        let start = self.expect(TokenKind::Buffer)?.span;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LParen)?;
        let capacity = self.expression()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Colon)?;
        let shape = self.shape_annotation()?;
        let end = self.expect(TokenKind::Semicolon)?.span;
        Some(Stmt::Buffer {
            name,
            capacity,
            shape,
            span: start.to(end),
        })
    }

    fn expr_statement(&mut self) -> Option<Stmt> {
        let expr = self.expression()?;
        self.expect(TokenKind::Semicolon)?;
        Some(Stmt::Expr(expr))
    }

    //---------------------------------------------------------------------------------------------
    // Expressions

    fn expression(&mut self) -> Option<Expr> {
        self.route_expr()
    }

    /// `<-` — the loosest level.  `a <- b` is sugar for `b -> a`.
    fn route_expr(&mut self) -> Option<Expr> {
        let mut lhs = self.arrow_expr()?;
        while self.eat(TokenKind::LeftArrow).is_some() {
            let rhs = self.arrow_expr()?;
            let span = lhs.span.to(rhs.span);
            lhs = Expr {
                kind: ExprKind::Route {
                    source: Box::new(rhs),
                    dest: Box::new(lhs),
                },
                span,
            };
        }
        Some(lhs)
    }

    /// `->` — binds tighter than `<-`, left-associative.
    fn arrow_expr(&mut self) -> Option<Expr> {
        let mut lhs = self.stack_expr()?;
        while self.eat(TokenKind::Arrow).is_some() {
            let rhs = self.stack_expr()?;
            let span = lhs.span.to(rhs.span);
            lhs = Expr {
                kind: ExprKind::Route {
                    source: Box::new(lhs),
                    dest: Box::new(rhs),
                },
                span,
            };
        }
        Some(lhs)
    }

    /// `,` — output stacking.
    fn stack_expr(&mut self) -> Option<Expr> {
        let first = self.binary_expr(0)?;
        if !self.at(TokenKind::Comma) {
            return Some(first);
        }
        let mut items = vec![first];
        while self.eat(TokenKind::Comma).is_some() {
            items.push(self.binary_expr(0)?);
        }
        let span = items[0].span.to(items.last().unwrap().span);
        Some(Expr {
            kind: ExprKind::Stack { items },
            span,
        })
    }

    /// Precedence-climbing over the binary operator table.  Level 0 is the loosest (`||`).
    fn binary_expr(&mut self, min_level: u8) -> Option<Expr> {
        let mut lhs = self.unary_expr()?;
        loop {
            let (op, level) = match self.peek_kind() {
                Some(TokenKind::PipePipe) => (BinaryOp::LogicalOr, 0),
                Some(TokenKind::AmpersandAmpersand) => (BinaryOp::LogicalAnd, 1),
                Some(TokenKind::Pipe) => (BinaryOp::BitOr, 2),
                Some(TokenKind::Caret) => (BinaryOp::BitXor, 3),
                Some(TokenKind::Ampersand) => (BinaryOp::BitAnd, 4),
                Some(TokenKind::Less) => (BinaryOp::Less, 5),
                Some(TokenKind::LessEqual) => (BinaryOp::LessEqual, 5),
                Some(TokenKind::Greater) => (BinaryOp::Greater, 5),
                Some(TokenKind::GreaterEqual) => (BinaryOp::GreaterEqual, 5),
                Some(TokenKind::EqualEqual) => (BinaryOp::Equal, 5),
                Some(TokenKind::NotEqual) => (BinaryOp::NotEqual, 5),
                Some(TokenKind::ShiftLeft) => (BinaryOp::ShiftLeft, 6),
                Some(TokenKind::ShiftRight) => (BinaryOp::ShiftRight, 6),
                Some(TokenKind::Plus) => (BinaryOp::Add, 7),
                Some(TokenKind::Minus) => (BinaryOp::Sub, 7),
                Some(TokenKind::Star) => (BinaryOp::Mul, 8),
                Some(TokenKind::Slash) => (BinaryOp::Div, 8),
                Some(TokenKind::Percent) => (BinaryOp::Rem, 8),
                _ => break,
            };
            if level < min_level {
                break;
            }
            self.bump();
            let rhs = self.binary_expr(level + 1)?;
            let span = lhs.span.to(rhs.span);
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Some(lhs)
    }

    fn unary_expr(&mut self) -> Option<Expr> {
        let op = match self.peek_kind() {
            Some(TokenKind::Bang) => Some(UnaryOp::Not),
            Some(TokenKind::Tilde) => Some(UnaryOp::BitNot),
            Some(TokenKind::Plus) => Some(UnaryOp::Plus),
            Some(TokenKind::Minus) => Some(UnaryOp::Negate),
            _ => None,
        };
        match op {
            Some(op) => {
                let start = self.bump().unwrap().span;
                let operand = self.unary_expr()?;
                let span = start.to(operand.span);
                Some(Expr {
                    kind: ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    span,
                })
            }
            None => self.postfix_expr(),
        }
    }

    fn postfix_expr(&mut self) -> Option<Expr> {
        let mut expr = self.primary_expr()?;
        loop {
            match self.peek_kind() {
                Some(TokenKind::Dot) => {
                    self.bump();
                    let member = self.expect_identifier()?;
                    let span = expr.span.to(member.span);
                    expr = Expr {
                        kind: ExprKind::Member {
                            base: Box::new(expr),
                            member,
                        },
                        span,
                    };
                }
                Some(TokenKind::LBracket) => {
                    self.bump();
                    let index_span = self.peek().map(|t| t.span).unwrap_or(expr.span);
                    let index = self.expect_small_int("pin index")?;
                    let end = self.expect(TokenKind::RBracket)?.span;
                    let span = expr.span.to(end);
                    expr = Expr {
                        kind: ExprKind::Index {
                            base: Box::new(expr),
                            index,
                            index_span,
                        },
                        span,
                    };
                }
                Some(TokenKind::LParen) => {
                    self.bump();
                    let mut args = Vec::new();
                    if !self.at(TokenKind::RParen) {
                        loop {
                            args.push(self.binary_expr(0)?);
                            if self.eat(TokenKind::Comma).is_none() {
                                break;
                            }
                        }
                    }
                    let end = self.expect(TokenKind::RParen)?.span;
                    let span = expr.span.to(end);
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    };
                }
                _ => break,
            }
        }
        Some(expr)
    }

    fn primary_expr(&mut self) -> Option<Expr> {
        let token = match self.peek() {
            Some(token) => token,
            None => {
                self.unexpected("an expression");
                return None;
            }
        };
        match token.kind {
            TokenKind::Integer { value, suffix } => {
                self.bump();
                Some(Expr {
                    kind: ExprKind::Integer { value, suffix },
                    span: token.span,
                })
            }
            TokenKind::Float { value, suffix } => {
                self.bump();
                Some(Expr {
                    kind: ExprKind::Float { value, suffix },
                    span: token.span,
                })
            }
            TokenKind::True | TokenKind::False => {
                self.bump();
                Some(Expr {
                    kind: ExprKind::Bool(token.kind == TokenKind::True),
                    span: token.span,
                })
            }
            TokenKind::Identifier => {
                let name = self.expect_identifier()?;
                if self.eat(TokenKind::ColonColon).is_some() {
                    let member = self.expect_identifier()?;
                    let span = name.span.to(member.span);
                    Some(Expr {
                        kind: ExprKind::Name {
                            module: Some(name),
                            name: member,
                        },
                        span,
                    })
                } else {
                    Some(Expr {
                        span: name.span,
                        kind: ExprKind::Name { module: None, name },
                    })
                }
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.expression()?;
                self.expect(TokenKind::RParen)?;
                Some(inner)
            }
            TokenKind::LBrace => self.bundle_literal(),
            _ => {
                self.unexpected("an expression");
                None
            }
        }
    }

    /// `{ k: v, w, … }` — bare items are positional, `k: v` entries are named.
    fn bundle_literal(&mut self) -> Option<Expr> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let mut entries = Vec::new();
        if !self.at(TokenKind::RBrace) {
            loop {
                let name = if self.at(TokenKind::Identifier)
                    && self.peek_at(1) == Some(TokenKind::Colon)
                {
                    let name = self.expect_identifier()?;
                    self.bump();
                    Some(name)
                } else {
                    None
                };
                let value = self.binary_expr(0)?;
                entries.push(BundleEntry { name, value });
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        Some(Expr {
            kind: ExprKind::Bundle { entries },
            span: start.to(end),
        })
    }

    //---------------------------------------------------------------------------------------------
    // External block

    /// The external block is a JSON subset: quotes are optional on bare identifiers and
    /// single-word string values, and trailing commas are tolerated.
    fn external_block(&mut self) -> ExternalBlock {
        let mut block = ExternalBlock::default();
        let start = match self.expect(TokenKind::External) {
            Some(token) => token.span,
            None => return block,
        };
        if self.expect(TokenKind::LBrace).is_none() {
            return block;
        }

        loop {
            match self.peek_kind() {
                None => {
                    self.sink.error(
                        DiagnosticCode::MalformedExternal,
                        self.eof_span(),
                        "unclosed external block",
                    );
                    break;
                }
                Some(TokenKind::RBrace) => {
                    block.span = start.to(self.bump().unwrap().span);
                    break;
                }
                Some(_) => {
                    if !self.external_field(&mut block) {
                        self.synchronize_external();
                    }
                    self.eat(TokenKind::Comma);
                }
            }
        }
        block
    }

    /// Skips to the next `,` or `}` at the current nesting depth after a malformed field.
    fn synchronize_external(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Comma if depth == 0 => return,
                TokenKind::RBrace | TokenKind::RBracket if depth == 0 => return,
                TokenKind::LBrace | TokenKind::LBracket => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::RBrace | TokenKind::RBracket => {
                    depth -= 1;
                    self.bump();
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn external_field(&mut self, block: &mut ExternalBlock) -> bool {
        let key = match self.external_word() {
            Some(key) => key,
            None => {
                self.unexpected("an external field name");
                return false;
            }
        };
        if self.expect(TokenKind::Colon).is_none() {
            return false;
        }
        match key.name.as_str() {
            "sr" => match self.external_int(&key) {
                Some(field) => block.sr = Some(field),
                None => return false,
            },
            "block_size" => match self.external_int(&key) {
                Some(field) => block.block_size = Some(field),
                None => return false,
            },
            "inputs" => match self.port_array() {
                Some(ports) => block.inputs = ports,
                None => return false,
            },
            "outputs" => match self.port_array() {
                Some(ports) => block.outputs = ports,
                None => return false,
            },
            "properties" => match self.property_array() {
                Some(properties) => block.properties = properties,
                None => return false,
            },
            other => {
                self.sink.error(
                    DiagnosticCode::MalformedExternal,
                    key.span,
                    format!("unknown external field `{}`", other),
                );
                return false;
            }
        }
        true
    }

    /// An identifier or quoted single word, as the external grammar allows for keys and
    /// string-valued fields.
    fn external_word(&mut self) -> Option<Ident> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Identifier => {
                self.bump();
                Some(Ident::new(token.text(self.source), token.span))
            }
            Some(token) if token.kind == TokenKind::Str => {
                self.bump();
                Some(Ident::new(token.string_content(self.source), token.span))
            }
            _ => None,
        }
    }

    fn external_int(&mut self, key: &Ident) -> Option<IntField> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Integer { value, suffix: None },
                span,
            }) => {
                self.bump();
                if value <= 0 || value > u32::MAX as i128 {
                    self.sink.error(
                        DiagnosticCode::MalformedExternal,
                        span,
                        format!("`{}` must be a positive integer", key.name),
                    );
                    return None;
                }
                Some(IntField {
                    value: value as u32,
                    span,
                })
            }
            _ => {
                self.unexpected("an integer");
                None
            }
        }
    }

    fn port_array(&mut self) -> Option<Vec<PortDecl>> {
        self.expect(TokenKind::LBracket)?;
        let mut ports = Vec::new();
        while !self.at(TokenKind::RBracket) {
            let start = self.expect(TokenKind::LBrace)?.span;
            let mut name = None;
            let mut width = None;
            let mut end = start;
            while !self.at(TokenKind::RBrace) {
                let key = match self.external_word() {
                    Some(key) => key,
                    None => {
                        self.unexpected("a port field name");
                        return None;
                    }
                };
                self.expect(TokenKind::Colon)?;
                match key.name.as_str() {
                    "name" => name = self.external_word(),
                    "width" => width = self.external_int(&key).map(|f| f.value),
                    other => {
                        self.sink.error(
                            DiagnosticCode::MalformedExternal,
                            key.span,
                            format!("unknown port field `{}`", other),
                        );
                        return None;
                    }
                }
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
            end = end.to(self.expect(TokenKind::RBrace)?.span);
            match name {
                Some(name) => ports.push(PortDecl {
                    span: name.span,
                    name,
                    width: width.unwrap_or(1),
                }),
                None => {
                    self.sink.error(
                        DiagnosticCode::MalformedExternal,
                        start.to(end),
                        "port declaration is missing a `name`",
                    );
                }
            }
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RBracket)?;
        Some(ports)
    }

    fn property_array(&mut self) -> Option<Vec<PropertyDecl>> {
        self.expect(TokenKind::LBracket)?;
        let mut properties = Vec::new();
        while !self.at(TokenKind::RBracket) {
            let start = self.expect(TokenKind::LBrace)?.span;
            let mut name = None;
            let mut declared_type = None;
            let mut rate = None;
            while !self.at(TokenKind::RBrace) {
                let key = match self.external_word() {
                    Some(key) => key,
                    None => {
                        self.unexpected("a property field name");
                        return None;
                    }
                };
                self.expect(TokenKind::Colon)?;
                match key.name.as_str() {
                    "name" => name = self.external_word(),
                    "type" => {
                        let word = self.external_word()?;
                        match ScalarType::from_name(&word.name) {
                            Some(scalar) if scalar != ScalarType::Bool => {
                                declared_type = Some(scalar)
                            }
                            _ => {
                                self.sink.error(
                                    DiagnosticCode::MalformedExternal,
                                    word.span,
                                    format!(
                                        "property type must be one of f32, f64, i32, i64; \
                                         found `{}`",
                                        word.name
                                    ),
                                );
                                return None;
                            }
                        }
                    }
                    "rate" => {
                        let word = self.external_word()?;
                        rate = match word.name.as_str() {
                            "s" => Some(Rate::Sample),
                            "b" => Some(Rate::Block),
                            other => {
                                self.sink.error(
                                    DiagnosticCode::MalformedExternal,
                                    word.span,
                                    format!("property rate must be `s` or `b`; found `{}`", other),
                                );
                                return None;
                            }
                        };
                    }
                    other => {
                        self.sink.error(
                            DiagnosticCode::MalformedExternal,
                            key.span,
                            format!("unknown property field `{}`", other),
                        );
                        return None;
                    }
                }
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
            let end = self.expect(TokenKind::RBrace)?.span;
            match name {
                Some(name) => properties.push(PropertyDecl {
                    span: name.span,
                    name,
                    declared_type: declared_type.unwrap_or(ScalarType::F64),
                    rate: rate.unwrap_or(Rate::Block),
                }),
                None => {
                    self.sink.error(
                        DiagnosticCode::MalformedExternal,
                        start.to(end),
                        "property declaration is missing a `name`",
                    );
                }
            }
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RBracket)?;
        Some(properties)
    }
}
