// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Name and scope resolution.
//!
//! There are three scope tiers: built-ins, the program scope (external ports, properties, stage
//! names, buffer names), and one lexical scope per stage.  Lookup walks inner to outer, so a
//! stage-local `let` shadows a program-scope name, which in turn shadows a built-in of the same
//! name.
//!
//! Resolution of program-scope names is independent of declaration order: the
//! [`collect_declarations`][] pre-pass registers every external port, stage (with its declared
//! output nodes), and buffer before any stage body is lowered.  Buffer statements appear inside
//! stage bodies, but their names are hoisted here into program scope so any stage may read a
//! buffer another stage writes.
//!
//! [`collect_declarations`]: fn.collect_declarations.html

use fxhash::FxHashMap;

use crate::arena::Handle;
use crate::ast;
use crate::builtins;
use crate::builtins::Builtin;
use crate::diagnostics::DiagnosticCode;
use crate::diagnostics::DiagnosticSink;
use crate::graph::BufferDef;
use crate::graph::ExternalPort;
use crate::graph::Node;
use crate::graph::NodeKind;
use crate::graph::PropertyPort;
use crate::graph::Stage;
use crate::graph::StageOutputDef;
use crate::graph::Symbol;
use crate::graph::WaveGraph;
use crate::span::Span;
use crate::types::Shape;

//-------------------------------------------------------------------------------------------------
// Bindings

/// What a resolved name denotes.  Variables always bind to nodes — never to bundles or pins —
/// but a few declarations carry a side: a cell's `start` may only be read and its `end` may only
/// be written, and a stage-output parameter is write-only inside its own stage.
#[derive(Clone, Copy, Debug)]
pub enum Binding {
    /// A node usable on either side of a routing arrow.
    Node(Handle<Node>),
    /// A cell's `start` name: source position only.
    CellStart(Handle<Node>),
    /// A cell's `end` name: destination position only.
    CellEnd(Handle<Node>),
    /// A stage-output parameter inside its own stage: destination position only.
    StageOutputSink(Handle<Node>),
    Stage(Handle<Stage>),
    Buffer(Handle<BufferDef>),
    Builtin(Builtin),
}

//-------------------------------------------------------------------------------------------------
// Scopes

/// The scope tiers of one compilation.  The program tier is populated by the declaration
/// pre-pass; the stage tier is pushed and popped as the builder lowers each stage body.
pub struct ScopeStack {
    program: FxHashMap<Handle<Symbol>, Binding>,
    stage: FxHashMap<Handle<Symbol>, Binding>,
}

impl ScopeStack {
    pub fn new(program: FxHashMap<Handle<Symbol>, Binding>) -> ScopeStack {
        ScopeStack {
            program,
            stage: FxHashMap::default(),
        }
    }

    /// Clears the stage tier, ready for the next stage body.
    pub fn enter_stage(&mut self) {
        self.stage.clear();
    }

    /// Declares a name in the stage scope.  Returns false if the name is already declared in the
    /// same scope (shadowing an outer scope is fine; redeclaring is not).
    pub fn declare_in_stage(&mut self, name: Handle<Symbol>, binding: Binding) -> bool {
        use std::collections::hash_map::Entry;
        match self.stage.entry(name) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(binding);
                true
            }
        }
    }

    /// Resolves a name, walking inner to outer: stage scope, program scope, then built-ins.
    pub fn lookup(&self, graph: &WaveGraph, name: Handle<Symbol>) -> Option<Binding> {
        if let Some(binding) = self.stage.get(&name) {
            return Some(*binding);
        }
        if let Some(binding) = self.program.get(&name) {
            return Some(*binding);
        }
        builtins::lookup(&graph[name]).map(Binding::Builtin)
    }

    /// Resolves a name in the program scope only (used for module-qualified paths).
    pub fn lookup_program(&self, name: Handle<Symbol>) -> Option<Binding> {
        self.program.get(&name).copied()
    }
}

//-------------------------------------------------------------------------------------------------
// Declaration collection

/// The declaration pre-pass: fills in the graph's external surface, creates the program-level
/// port and property nodes, registers every stage with its declared output nodes, and hoists
/// buffer declarations into program scope.  Returns the program-scope bindings.
pub fn collect_declarations(
    graph: &mut WaveGraph,
    program: &ast::SourceProgram,
    sink: &mut DiagnosticSink,
) -> FxHashMap<Handle<Symbol>, Binding> {
    let mut scope: FxHashMap<Handle<Symbol>, Binding> = FxHashMap::default();
    graph.program_name = Some(graph.add_symbol(&program.name.name));

    let declare =
        |graph: &mut WaveGraph,
         scope: &mut FxHashMap<Handle<Symbol>, Binding>,
         sink: &mut DiagnosticSink,
         name: &str,
         span: Span,
         binding: Binding| {
            let symbol = graph.add_symbol(name);
            if scope.insert(symbol, binding).is_some() {
                sink.error(
                    DiagnosticCode::RedeclaredName,
                    span,
                    format!("the name `{}` is declared more than once in program scope", name),
                );
            }
        };

    // External surface first: ports and properties are nodes that stage bodies route to and
    // from, so their indices have to be stable before any lowering happens.
    let external = &program.external;
    match external.sr {
        Some(field) => graph.externals.sr = field.value,
        None => sink.error(
            DiagnosticCode::MalformedExternal,
            external.span,
            "external block is missing `sr`",
        ),
    }
    match external.block_size {
        Some(field) => graph.externals.block_size = field.value,
        None => sink.error(
            DiagnosticCode::MalformedExternal,
            external.span,
            "external block is missing `block_size`",
        ),
    }

    for decl in &external.inputs {
        let name = graph.add_symbol(&decl.name.name);
        graph.externals.inputs.push(ExternalPort {
            name,
            width: decl.width,
        });
    }
    for decl in &external.outputs {
        let name = graph.add_symbol(&decl.name.name);
        graph.externals.outputs.push(ExternalPort {
            name,
            width: decl.width,
        });
    }
    for decl in &external.properties {
        let name = graph.add_symbol(&decl.name.name);
        graph.externals.properties.push(PropertyPort {
            name,
            declared_type: decl.declared_type,
            rate: decl.rate,
        });
    }

    let declare_external =
        |graph: &mut WaveGraph,
         scope: &mut FxHashMap<Handle<Symbol>, Binding>,
         sink: &mut DiagnosticSink,
         name: &str,
         span: Span,
         node: Handle<Node>| {
            let symbol = graph.add_symbol(name);
            if scope.insert(symbol, Binding::Node(node)).is_some() {
                sink.error(
                    DiagnosticCode::DuplicateExternalName,
                    span,
                    format!("the external name `{}` is declared more than once", name),
                );
            }
        };

    for (index, decl) in external.inputs.iter().enumerate() {
        let node = builtins::instantiate(
            graph,
            NodeKind::ExternalInput(index as u32),
            None,
            decl.span,
        );
        declare_external(graph, &mut scope, sink, &decl.name.name, decl.span, node);
    }
    for (index, decl) in external.outputs.iter().enumerate() {
        let node = builtins::instantiate(
            graph,
            NodeKind::ExternalOutput(index as u32),
            None,
            decl.span,
        );
        declare_external(graph, &mut scope, sink, &decl.name.name, decl.span, node);
    }
    for (index, decl) in external.properties.iter().enumerate() {
        let node =
            builtins::instantiate(graph, NodeKind::Property(index as u32), None, decl.span);
        declare_external(graph, &mut scope, sink, &decl.name.name, decl.span, node);
    }

    // Stages, with their declared outputs materialized as nodes so that cross-stage references
    // resolve no matter which stage is lowered first.
    for decl in &program.stages {
        let name = graph.add_symbol(&decl.name.name);
        let stage = graph.add_stage(name, decl.span);
        for (index, output) in decl.outputs.iter().enumerate() {
            let output_name = graph.add_symbol(&output.name.name);
            let shape = Shape::new(output.shape.scalar, output.shape.width);
            let node = graph.add_node(
                NodeKind::StageOutput {
                    stage,
                    index: index as u32,
                },
                Some(stage),
                output.span,
            );
            graph.add_input_pin(node, None, Some(shape), true);
            graph.add_output_pin(node, None, Some(shape));
            graph.push_stage_output(
                stage,
                StageOutputDef {
                    name: output_name,
                    shape,
                    node,
                },
            );
        }
        declare(graph, &mut scope, sink, &decl.name.name, decl.name.span, Binding::Stage(stage));
    }

    // Buffer names are hoisted out of stage bodies into program scope.
    for stage_decl in &program.stages {
        for stmt in &stage_decl.body {
            if let ast::Stmt::Buffer { name, shape, span, .. } = stmt {
                let symbol = graph.add_symbol(&name.name);
                let buffer = graph.add_buffer(
                    symbol,
                    Shape::new(shape.scalar, shape.width),
                    *span,
                );
                declare(graph, &mut scope, sink, &name.name, name.span, Binding::Buffer(buffer));
            }
        }
    }

    scope
}
