// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! The syntactic tree produced by the parser.
//!
//! This tree is purely syntactic: names are still strings, shapes are still written-out type
//! annotations, and routing arrows are ordinary binary expressions.  The resolver and graph
//! builder consume it and produce the graph IR; nothing downstream of the builder looks at it
//! again.

use crate::span::Span;
use crate::types::Rate;
use crate::types::ScalarType;

//-------------------------------------------------------------------------------------------------
// Programs

/// A whole source file: `program` header, `external` block, one or more stages.
#[derive(Debug)]
pub struct SourceProgram {
    pub name: Ident,
    pub external: ExternalBlock,
    pub stages: Vec<StageDecl>,
}

/// An identifier with the span it was written at.
#[derive(Clone, Debug)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Ident {
        Ident {
            name: name.into(),
            span,
        }
    }
}

//-------------------------------------------------------------------------------------------------
// External block

/// The `external { … }` block: sample rate, block size, and the program's ports and properties.
#[derive(Debug, Default)]
pub struct ExternalBlock {
    pub span: Span,
    pub sr: Option<IntField>,
    pub block_size: Option<IntField>,
    pub inputs: Vec<PortDecl>,
    pub outputs: Vec<PortDecl>,
    pub properties: Vec<PropertyDecl>,
}

#[derive(Clone, Copy, Debug)]
pub struct IntField {
    pub value: u32,
    pub span: Span,
}

/// An external input or output array.  Ports are always `f32`.
#[derive(Debug)]
pub struct PortDecl {
    pub name: Ident,
    pub width: u32,
    pub span: Span,
}

#[derive(Debug)]
pub struct PropertyDecl {
    pub name: Ident,
    /// The declared type is recorded, but properties are treated as `f64` semantically in this
    /// version.
    pub declared_type: ScalarType,
    pub rate: Rate,
    pub span: Span,
}

//-------------------------------------------------------------------------------------------------
// Stages and statements

/// `stage name(out=f32(2), …) { stmts }`
#[derive(Debug)]
pub struct StageDecl {
    pub name: Ident,
    pub outputs: Vec<StageOutputDecl>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug)]
pub struct StageOutputDecl {
    pub name: Ident,
    pub shape: ShapeAnnotation,
    pub span: Span,
}

/// A written shape annotation: `f32` or `f32(2)`.
#[derive(Clone, Copy, Debug)]
pub struct ShapeAnnotation {
    pub scalar: ScalarType,
    pub width: u32,
    pub span: Span,
}

#[derive(Debug)]
pub enum Stmt {
    /// `let x = expr;`
    Let {
        name: Ident,
        value: Expr,
        span: Span,
    },
    /// `x = expr;` — only legal when `x` is a routable declaration of the same scope.
    Assign {
        name: Ident,
        value: Expr,
        span: Span,
    },
    /// `cell (start, end): shape;` or `cell(k) (start, end): shape;`
    Cell {
        delay: Option<IntField>,
        start: Ident,
        end: Ident,
        shape: ShapeAnnotation,
        span: Span,
    },
    /// `buffer name(capacity): shape;`
    Buffer {
        name: Ident,
        capacity: Expr,
        shape: ShapeAnnotation,
        span: Span,
    },
    /// A bare expression, evaluated for its routing side effects.
    Expr(Expr),
}

//-------------------------------------------------------------------------------------------------
// Expressions

#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum ExprKind {
    Integer {
        value: i128,
        suffix: Option<ScalarType>,
    },
    Float {
        value: f64,
        suffix: Option<ScalarType>,
    },
    Bool(bool),
    /// A bare name, possibly module-qualified: `x` or `biquad::lowpass`.
    Name {
        module: Option<Ident>,
        name: Ident,
    },
    /// Member selection: `stage.outputs`, `node.inputs.frequency`, `biquad.lowpass`.
    Member {
        base: Box<Expr>,
        member: Ident,
    },
    /// Output (or, in destination position, input) selection: `node[i]`.
    Index {
        base: Box<Expr>,
        index: u32,
        index_span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `{ k: v, w, … }` — named and positional entries may mix.
    Bundle {
        entries: Vec<BundleEntry>,
    },
    /// Output stacking: `a, b`.
    Stack {
        items: Vec<Expr>,
    },
    /// `source -> dest` (a `<-` is swapped into this form by the parser).
    Route {
        source: Box<Expr>,
        dest: Box<Expr>,
    },
}

#[derive(Debug)]
pub struct BundleEntry {
    pub name: Option<Ident>,
    pub value: Expr,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `~`
    BitNot,
    /// `+`
    Plus,
    /// `-`
    Negate,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    ShiftLeft,
    ShiftRight,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    BitAnd,
    BitXor,
    BitOr,
    /// `&&` — lowers to bitwise on bools; there is no short-circuit.
    LogicalAnd,
    /// `||` — lowers to bitwise on bools.
    LogicalOr,
}

