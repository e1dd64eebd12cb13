// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Compilation diagnostics.
//!
//! Errors are first-class values in this compiler: every pass pushes [`Diagnostic`][] values into
//! a shared [`DiagnosticSink`][] instead of returning early.  A diagnostic carries a severity, a
//! closed [`DiagnosticCode`][], a primary source span, and any number of secondary labeled spans.
//! Compilation fails iff any error-severity diagnostic was emitted.
//!
//! The sink also tracks which passes' output invariants are broken.  A pass that depends on a
//! broken invariant is skipped; passes that don't depend on it still run, so a single compilation
//! surfaces as many independent diagnostics as possible.
//!
//! [`Diagnostic`]: struct.Diagnostic.html
//! [`DiagnosticCode`]: enum.DiagnosticCode.html
//! [`DiagnosticSink`]: struct.DiagnosticSink.html

use std::fmt::Display;

use enumset::EnumSet;
use enumset::EnumSetType;

use crate::span::Span;

//-------------------------------------------------------------------------------------------------
// Severities and categories

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Severity {
    Error,
    Warning,
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// The error taxonomy.  Every diagnostic code belongs to exactly one category.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Category {
    Lexical,
    Syntactic,
    Name,
    Shape,
    Rate,
    Structural,
    Fold,
    External,
}

//-------------------------------------------------------------------------------------------------
// Diagnostic codes

/// The closed set of diagnostics this compiler can emit.  The string form of each code is stable
/// and is what drivers key their output on.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DiagnosticCode {
    // lexical
    UnterminatedLiteral,
    InvalidSuffix,
    StrayCharacter,
    // syntactic
    UnexpectedToken,
    UnexpectedEndOfInput,
    InvalidLiteral,
    // name resolution
    UndeclaredName,
    RedeclaredName,
    InvalidPath,
    NotAssignable,
    // shape
    WidthMismatch,
    ScalarMismatch,
    UnresolvedShape,
    BoolOperand,
    BroadcastNotWider,
    TruncateNotNarrower,
    SliceOutOfRange,
    // rate
    ConstantRequired,
    BlockRateRequired,
    // structural
    MissingRequiredPin,
    UnknownNamedPin,
    WrongArgumentCount,
    IllegalCycle,
    IllegalCrossStageEdge,
    BadBufferCapacity,
    BadCellDelay,
    DelayExceedsCapacity,
    SourceRequired,
    SinkRequired,
    // fold
    NotFoldable,
    DivisionByZero,
    // external
    MalformedExternal,
    DuplicateExternalName,
    // warnings
    BufferReadWriteOrder,
}

impl DiagnosticCode {
    pub fn category(self) -> Category {
        use DiagnosticCode::*;
        match self {
            UnterminatedLiteral | InvalidSuffix | StrayCharacter => Category::Lexical,
            UnexpectedToken | UnexpectedEndOfInput | InvalidLiteral => Category::Syntactic,
            UndeclaredName | RedeclaredName | InvalidPath | NotAssignable => Category::Name,
            WidthMismatch | ScalarMismatch | UnresolvedShape | BoolOperand | BroadcastNotWider
            | TruncateNotNarrower | SliceOutOfRange => Category::Shape,
            ConstantRequired | BlockRateRequired => Category::Rate,
            MissingRequiredPin | UnknownNamedPin | WrongArgumentCount | IllegalCycle
            | IllegalCrossStageEdge | BadBufferCapacity | BadCellDelay | DelayExceedsCapacity
            | SourceRequired | SinkRequired => Category::Structural,
            NotFoldable | DivisionByZero => Category::Fold,
            MalformedExternal | DuplicateExternalName => Category::External,
            BufferReadWriteOrder => Category::Structural,
        }
    }

    pub fn as_str(self) -> &'static str {
        use DiagnosticCode::*;
        match self {
            UnterminatedLiteral => "unterminated-literal",
            InvalidSuffix => "invalid-suffix",
            StrayCharacter => "stray-character",
            UnexpectedToken => "unexpected-token",
            UnexpectedEndOfInput => "unexpected-end-of-input",
            InvalidLiteral => "invalid-literal",
            UndeclaredName => "undeclared-name",
            RedeclaredName => "redeclared-name",
            InvalidPath => "invalid-path",
            NotAssignable => "not-assignable",
            WidthMismatch => "width-mismatch",
            ScalarMismatch => "scalar-mismatch",
            UnresolvedShape => "unresolved-shape",
            BoolOperand => "bool-operand",
            BroadcastNotWider => "broadcast-not-wider",
            TruncateNotNarrower => "truncate-not-narrower",
            SliceOutOfRange => "slice-out-of-range",
            ConstantRequired => "constant-required",
            BlockRateRequired => "block-rate-required",
            MissingRequiredPin => "missing-required-pin",
            UnknownNamedPin => "unknown-named-pin",
            WrongArgumentCount => "wrong-argument-count",
            IllegalCycle => "illegal-cycle",
            IllegalCrossStageEdge => "illegal-cross-stage-edge",
            BadBufferCapacity => "bad-buffer-capacity",
            BadCellDelay => "bad-cell-delay",
            DelayExceedsCapacity => "delay-exceeds-capacity",
            SourceRequired => "source-required",
            SinkRequired => "sink-required",
            NotFoldable => "not-foldable",
            DivisionByZero => "division-by-zero",
            MalformedExternal => "malformed-external",
            DuplicateExternalName => "duplicate-external-name",
            BufferReadWriteOrder => "buffer-read-write-order",
        }
    }
}

impl Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//-------------------------------------------------------------------------------------------------
// Diagnostics

/// A secondary span attached to a diagnostic, pointing at related source text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Note {
    pub span: Span,
    pub message: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub span: Span,
    pub message: String,
    pub notes: Vec<Note>,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, span: Span, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            severity: Severity::Error,
            code,
            span,
            message: message.into(),
            notes: Vec::new(),
        }
    }

    pub fn warning(code: DiagnosticCode, span: Span, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            severity: Severity::Warning,
            code,
            span,
            message: message.into(),
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, span: Span, message: impl Into<String>) -> Diagnostic {
        self.notes.push(Note {
            span,
            message: message.into(),
        });
        self
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)
    }
}

//-------------------------------------------------------------------------------------------------
// Passes and the sink

/// The compilation passes, in pipeline order.  Used by the sink to record whose output invariants
/// no longer hold.
#[derive(Debug, EnumSetType)]
pub enum Pass {
    Lex,
    Parse,
    Resolve,
    Build,
    Infer,
    Validate,
    Fold,
    Emit,
}

/// Collects diagnostics across all passes of one compilation.
#[derive(Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    broken: EnumSet<Pass>,
}

impl DiagnosticSink {
    pub fn new() -> DiagnosticSink {
        DiagnosticSink::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn error(&mut self, code: DiagnosticCode, span: Span, message: impl Into<String>) {
        self.push(Diagnostic::error(code, span, message));
    }

    pub fn warning(&mut self, code: DiagnosticCode, span: Span, message: impl Into<String>) {
        self.push(Diagnostic::warning(code, span, message));
    }

    /// Marks a pass's output invariants as broken.  Passes that depend on them will be skipped.
    pub fn mark_broken(&mut self, pass: Pass) {
        self.broken.insert(pass);
    }

    /// Returns whether any of the given prerequisite passes is broken.
    pub fn any_broken(&self, passes: impl IntoIterator<Item = Pass>) -> bool {
        passes.into_iter().any(|pass| self.broken.contains(pass))
    }

    pub fn broken_passes(&self) -> EnumSet<Pass> {
        self.broken
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Returns the number of error-severity diagnostics pushed so far.  Passes compare this
    /// before and after running to decide whether to mark themselves broken.
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}
