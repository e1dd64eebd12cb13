// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Waveling is a small domain-specific language for describing directed graphs of primitive
//! audio components — filters, delay lines, arithmetic nodes, RNGs.  A Waveling source file
//! compiles to a program that, when invoked, advances the described graph by one fixed-size
//! block of audio samples, reading any number of input buffers and properties and writing any
//! number of output buffers.
//!
//! This crate is the compiler front-end and middle-end.  [`compile`][] runs the whole pipeline:
//!
//! 1. [`lex`][] — source text to a token stream
//! 2. [`parse`][] — tokens to a syntactic tree
//! 3. [`resolve`][] — names and scopes; declaration collection makes program-scope resolution
//!    independent of declaration order
//! 4. [`build`][] — expressions and routing statements lowered into the graph IR
//! 5. [`infer`][] — shapes (scalar type × channel count) and rates (constant / block / sample),
//!    with implicit promotion adapters
//! 6. [`validate`][] — required pins, cross-stage edges, and the cycle check that admits only
//!    recursion cells and buffers as back-edges
//! 7. [`fold`][] — constant-rate subgraphs collapsed to literals
//! 8. [`ir`][] — the serialized, versioned backend contract
//!
//! Code generation is out of scope: backends consume the emitted [`ir::Program`][] and owe
//! nothing to the types in [`graph`][].
//!
//! Passes communicate through a shared [`WaveGraph`][] and collect problems into a
//! [`DiagnosticSink`][]; compilation fails iff any error-severity diagnostic was emitted.  A pass
//! whose prerequisites are broken is skipped, but independent passes still run, so one
//! compilation surfaces as much as it can.
//!
//! [`DiagnosticSink`]: diagnostics/struct.DiagnosticSink.html
//! [`WaveGraph`]: graph/struct.WaveGraph.html
//! [`build`]: build/index.html
//! [`compile`]: fn.compile.html
//! [`fold`]: fold/index.html
//! [`graph`]: graph/index.html
//! [`infer`]: infer/index.html
//! [`ir`]: ir/index.html
//! [`ir::Program`]: ir/struct.Program.html
//! [`lex`]: lex/index.html
//! [`parse`]: parse/index.html
//! [`resolve`]: resolve/index.html
//! [`validate`]: validate/index.html

pub mod arena;
pub mod ast;
pub mod build;
pub mod builtins;
#[macro_use]
mod debugging;
pub mod diagnostics;
pub mod fold;
pub mod graph;
pub mod infer;
pub mod ir;
pub mod lex;
pub mod parse;
pub mod resolve;
pub mod span;
pub mod types;
pub mod validate;

use diagnostics::Diagnostic;
use diagnostics::DiagnosticSink;
use diagnostics::Pass;
use diagnostics::Severity;
use graph::WaveGraph;
use resolve::ScopeStack;

/// The result of one compilation: the emitted IR when it succeeded, and every diagnostic either
/// way.
pub struct Compilation {
    pub ir: Option<ir::Program>,
    pub diagnostics: Vec<Diagnostic>,
    /// The passes whose output invariants did not hold, causing dependents to be skipped.
    pub broken_passes: enumset::EnumSet<Pass>,
}

impl Compilation {
    pub fn succeeded(&self) -> bool {
        self.ir.is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }
}

/// Compiles a Waveling source file down to the backend IR contract.
///
/// The phases run in strict order, each owning the shared graph exclusively while it runs; no
/// state persists across invocations.
pub fn compile(source: &str) -> Compilation {
    let mut sink = DiagnosticSink::new();
    let mut graph = WaveGraph::new();

    let mut checkpoint = 0usize;
    let mut pass_done = |sink: &mut DiagnosticSink, pass: Pass| {
        if sink.error_count() > checkpoint {
            sink.mark_broken(pass);
        }
        checkpoint = sink.error_count();
    };

    let tokens = lex::tokenize(source, &mut sink);
    pass_done(&mut sink, Pass::Lex);

    let program = parse::parse(source, &tokens, &mut sink);
    pass_done(&mut sink, Pass::Parse);

    if let Some(program) = program {
        // Name resolution and lowering still run over a partial tree; they surface their own
        // diagnostics for whatever did parse.
        let program_scope = resolve::collect_declarations(&mut graph, &program, &mut sink);
        pass_done(&mut sink, Pass::Resolve);

        let mut scopes = ScopeStack::new(program_scope);
        build::build(&mut graph, &program, &mut scopes, &mut sink);
        pass_done(&mut sink, Pass::Build);

        // Inference needs a fully wired graph; a parse or lowering error leaves holes that
        // would only echo as spurious shape errors.
        if !sink.any_broken([Pass::Parse, Pass::Resolve, Pass::Build]) {
            infer::infer(&mut graph, &mut sink);
            pass_done(&mut sink, Pass::Infer);

            validate::validate(&graph, &mut sink);
            pass_done(&mut sink, Pass::Validate);

            // Folding tolerates structural errors (it only touches literal-fed nodes), but not
            // unresolved shapes.
            if !sink.any_broken([Pass::Infer]) {
                fold::fold(&mut graph, &mut sink);
                pass_done(&mut sink, Pass::Fold);
            }
        }
    }

    let ir = if sink.has_errors() {
        None
    } else {
        Some(ir::Program::from_graph(&graph))
    };
    let broken_passes = sink.broken_passes();
    Compilation {
        ir,
        diagnostics: sink.into_diagnostics(),
        broken_passes,
    }
}
