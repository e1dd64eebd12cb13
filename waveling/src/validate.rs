// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Semantic validation of the typed graph.
//!
//! Runs after inference and enforces everything the type system alone cannot: required pins are
//! connected and no bundle carries a duplicate name; operand scalar kinds fit their operators;
//! cross-stage edges originate from declared stage outputs; buffer capacities are constant rate;
//! and — the heart of the pass — the dependency graph is acyclic once recursion-cell back-edges
//! are excised.
//!
//! A recursion cell's output carries the _previous_ sample's committed input, so consumers of
//! `start` do not depend on the producer of `end` within a sample.  The cycle check therefore
//! drops every edge whose source is a cell; any cycle that remains cannot be scheduled and is
//! rejected.  Buffers break cycles the same way structurally: a `delwrite` and a `delread` on the
//! same buffer are connected through the buffer's head cursor, not through an edge.

use either::Either;
use fxhash::FxHashMap;
use itertools::Itertools;

use crate::arena::Handle;
use crate::arena::HandleSet;
use crate::diagnostics::DiagnosticCode;
use crate::diagnostics::DiagnosticSink;
use crate::graph::BinaryKind;
use crate::graph::Direction;
use crate::graph::Node;
use crate::graph::NodeKind;
use crate::graph::PinRef;
use crate::graph::UnaryKind;
use crate::graph::WaveGraph;
use crate::types::Rate;
use crate::types::ScalarType;

/// Runs every structural check, pushing diagnostics into the sink.
pub fn validate(graph: &WaveGraph, sink: &mut DiagnosticSink) {
    check_required_pins(graph, sink);
    check_duplicate_pin_names(graph, sink);
    check_operand_kinds(graph, sink);
    check_cross_stage_edges(graph, sink);
    check_buffers(graph, sink);
    check_cells(graph, sink);
    check_cycles(graph, sink);
    check_buffer_read_write_order(graph, sink);
}

//-------------------------------------------------------------------------------------------------
// Pins

fn check_required_pins(graph: &WaveGraph, sink: &mut DiagnosticSink) {
    for node in graph.iter_nodes() {
        for (index, pin) in graph[node].inputs().iter().enumerate() {
            if !graph[pin].required {
                continue;
            }
            let sink_ref = PinRef::new(node, index as u32);
            if graph.edges_into(sink_ref).next().is_none() {
                let name = graph[pin]
                    .name
                    .map(|name| format!("`{}`", &graph[name]))
                    .unwrap_or_else(|| format!("{}", index));
                sink.error(
                    DiagnosticCode::MissingRequiredPin,
                    graph[node].span,
                    format!(
                        "input pin {} of this `{}` node is not connected",
                        name,
                        graph[node].kind.name()
                    ),
                );
            }
        }
    }
}

fn check_duplicate_pin_names(graph: &WaveGraph, sink: &mut DiagnosticSink) {
    for node in graph.iter_nodes() {
        for bundle in [graph[node].inputs(), graph[node].outputs()] {
            let duplicates = bundle
                .iter()
                .filter_map(|pin| graph[pin].name)
                .duplicates()
                .collect::<Vec<_>>();
            for name in duplicates {
                sink.error(
                    DiagnosticCode::UnknownNamedPin,
                    graph[node].span,
                    format!("bundle declares the pin name `{}` twice", &graph[name]),
                );
            }
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Operand kinds

/// Scalar-kind restrictions the promotion lattice cannot express: shifts and bitwise operators
/// want integers (or bools), ordering comparisons and negation want numbers, transcendentals and
/// filters want floats, delays want integers.
fn check_operand_kinds(graph: &WaveGraph, sink: &mut DiagnosticSink) {
    for node in graph.iter_nodes() {
        let scalar_of = |pin_ref: PinRef, direction: Direction| -> Option<ScalarType> {
            let pin = graph.input_or_output(pin_ref, direction);
            graph[pin].shape.map(|shape| shape.scalar)
        };
        let span = graph[node].span;
        match &graph[node].kind {
            NodeKind::Binary(op) if op.is_shift() => {
                for (index, side) in [(0u32, "left"), (1u32, "right")] {
                    if let Some(scalar) = scalar_of(PinRef::new(node, index), Direction::Input) {
                        if !scalar.is_integral() {
                            sink.error(
                                DiagnosticCode::ScalarMismatch,
                                span,
                                format!(
                                    "the {} operand of a shift must be integral, found {}",
                                    side, scalar
                                ),
                            );
                        }
                    }
                }
            }
            NodeKind::Binary(BinaryKind::BitXor) | NodeKind::Binary(BinaryKind::BitOr) => {
                for index in 0..2u32 {
                    if let Some(scalar) = scalar_of(PinRef::new(node, index), Direction::Input) {
                        if scalar.is_float() {
                            sink.error(
                                DiagnosticCode::ScalarMismatch,
                                span,
                                format!(
                                    "bitwise operators take integral or bool operands, found {}",
                                    scalar
                                ),
                            );
                        }
                    }
                }
            }
            NodeKind::Unary(UnaryKind::BitNot) => {
                if let Some(scalar) = scalar_of(PinRef::new(node, 0), Direction::Input) {
                    if scalar.is_float() {
                        sink.error(
                            DiagnosticCode::ScalarMismatch,
                            span,
                            format!("`~` takes an integral or bool operand, found {}", scalar),
                        );
                    }
                }
            }
            NodeKind::Unary(UnaryKind::Negate) => {
                if scalar_of(PinRef::new(node, 0), Direction::Input) == Some(ScalarType::Bool) {
                    sink.error(
                        DiagnosticCode::BoolOperand,
                        span,
                        "cannot negate a bool value",
                    );
                }
            }
            NodeKind::Binary(op) if op.is_comparison() => {
                if matches!(op, BinaryKind::Less
                    | BinaryKind::LessEqual
                    | BinaryKind::Greater
                    | BinaryKind::GreaterEqual)
                    && scalar_of(PinRef::new(node, 0), Direction::Input)
                        == Some(ScalarType::Bool)
                {
                    sink.error(
                        DiagnosticCode::BoolOperand,
                        span,
                        "ordering comparisons take numeric operands",
                    );
                }
            }
            NodeKind::Unary(UnaryKind::Sin)
            | NodeKind::Unary(UnaryKind::Cos)
            | NodeKind::Unary(UnaryKind::Tan) => {
                if let Some(scalar) = scalar_of(PinRef::new(node, 0), Direction::Input) {
                    if !scalar.is_float() {
                        sink.error(
                            DiagnosticCode::ScalarMismatch,
                            span,
                            format!(
                                "transcendental functions take float operands, found {}",
                                scalar
                            ),
                        );
                    }
                }
            }
            NodeKind::Biquad(_) => {
                for index in 0..3u32 {
                    if let Some(scalar) = scalar_of(PinRef::new(node, index), Direction::Input) {
                        if !scalar.is_float() {
                            sink.error(
                                DiagnosticCode::ScalarMismatch,
                                span,
                                format!("filter parameters must be float, found {}", scalar),
                            );
                        }
                    }
                }
            }
            NodeKind::DelRead { .. } => {
                if let Some(scalar) = scalar_of(PinRef::new(node, 0), Direction::Input) {
                    if !scalar.is_integral() {
                        sink.error(
                            DiagnosticCode::ScalarMismatch,
                            span,
                            format!("a delay must have an integer scalar type, found {}", scalar),
                        );
                    }
                }
            }
            NodeKind::Select { .. } => {
                if let Some(scalar) = scalar_of(PinRef::new(node, 0), Direction::Input) {
                    if !scalar.is_integral() {
                        sink.error(
                            DiagnosticCode::ScalarMismatch,
                            span,
                            format!("a select index must be integral, found {}", scalar),
                        );
                    }
                }
            }
            _ => {}
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Stages

/// A cross-stage edge must originate from a declared output of the source stage.
fn check_cross_stage_edges(graph: &WaveGraph, sink: &mut DiagnosticSink) {
    for edge in graph.iter_edges() {
        let source_stage = graph[edge.source.node].stage.into_option();
        let sink_stage = graph[edge.sink.node].stage.into_option();
        let source_stage = match (source_stage, sink_stage) {
            (Some(a), Some(b)) if a != b => a,
            _ => continue,
        };
        if !matches!(graph[edge.source.node].kind, NodeKind::StageOutput { .. }) {
            let stage_name = graph[source_stage].name;
            sink.error(
                DiagnosticCode::IllegalCrossStageEdge,
                graph[edge.sink.node].span,
                format!(
                    "only declared outputs of stage `{}` may be read from another stage",
                    &graph[stage_name]
                ),
            );
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Buffers and cells

fn check_buffers(graph: &WaveGraph, sink: &mut DiagnosticSink) {
    for buffer in graph.iter_buffers() {
        let def = &graph[buffer];
        match def.capacity_node {
            Some(node) => {
                let rate = graph[node]
                    .outputs()
                    .iter()
                    .next()
                    .and_then(|pin| graph[pin].rate);
                if let Some(rate) = rate {
                    if rate != Rate::Constant {
                        sink.error(
                            DiagnosticCode::ConstantRequired,
                            def.span,
                            format!(
                                "a buffer capacity must be constant, but this one is {}-rate",
                                rate
                            ),
                        );
                    }
                }
            }
            None => {
                sink.error(
                    DiagnosticCode::BadBufferCapacity,
                    def.span,
                    "this buffer has no usable capacity expression",
                );
            }
        }
    }
}

fn check_cells(graph: &WaveGraph, sink: &mut DiagnosticSink) {
    for node in graph.iter_nodes() {
        if let NodeKind::Cell { delay } = graph[node].kind {
            if delay == 0 {
                sink.error(
                    DiagnosticCode::BadCellDelay,
                    graph[node].span,
                    "a cell's delay must be at least one sample",
                );
            }
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Cycles

/// Same-sample dependency successors of a node: everything its outputs feed, unless the node is
/// a recursion cell, whose outputs carry last sample's value.
fn successors<'a>(
    adjacency: &'a FxHashMap<Handle<Node>, Vec<Handle<Node>>>,
    graph: &WaveGraph,
    node: Handle<Node>,
) -> impl Iterator<Item = Handle<Node>> + 'a {
    if graph[node].kind.breaks_cycles() {
        Either::Left(std::iter::empty())
    } else {
        Either::Right(
            adjacency
                .get(&node)
                .map(|nodes| nodes.iter().copied())
                .into_iter()
                .flatten(),
        )
    }
}

/// Iterative tri-color depth-first search over the excised dependency graph.  Any back edge it
/// finds is a cycle that no evaluation order can satisfy.
fn check_cycles(graph: &WaveGraph, sink: &mut DiagnosticSink) {
    let mut adjacency: FxHashMap<Handle<Node>, Vec<Handle<Node>>> = FxHashMap::default();
    for edge in graph.iter_edges() {
        adjacency
            .entry(edge.source.node)
            .or_default()
            .push(edge.sink.node);
    }

    let mut finished: HandleSet<Node> = HandleSet::new();
    let mut on_stack: HandleSet<Node> = HandleSet::new();
    let mut reported = false;

    for root in graph.iter_nodes() {
        if finished.contains(root) {
            continue;
        }
        // An explicit (node, successors, cursor) stack; stage graphs can be deep.
        let mut stack: Vec<(Handle<Node>, Vec<Handle<Node>>, usize)> = Vec::new();
        let succ: Vec<_> = successors(&adjacency, graph, root).collect();
        on_stack.add(root);
        stack.push((root, succ, 0));

        while !stack.is_empty() {
            let next = {
                let top = stack.last_mut().unwrap();
                if top.2 < top.1.len() {
                    top.2 += 1;
                    Some(top.1[top.2 - 1])
                } else {
                    None
                }
            };
            match next {
                None => {
                    let (node, _, _) = stack.pop().unwrap();
                    on_stack.remove(node);
                    finished.add(node);
                }
                Some(next) => {
                    if on_stack.contains(next) {
                        if !reported {
                            sink.error(
                                DiagnosticCode::IllegalCycle,
                                graph[next].span,
                                "this value depends on itself within a single sample; \
                                 close the loop through a cell or a buffer",
                            );
                            reported = true;
                        }
                    } else if !finished.contains(next) {
                        let succ: Vec<_> = successors(&adjacency, graph, next).collect();
                        on_stack.add(next);
                        stack.push((next, succ, 0));
                    }
                }
            }
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Buffer ordering

/// A `delread(buf, 0)` only reads the value written this sample when the write precedes it in
/// the dependency graph; without that dependency the result is implementation-defined, which is
/// worth a warning rather than silence.
fn check_buffer_read_write_order(graph: &WaveGraph, sink: &mut DiagnosticSink) {
    let mut adjacency: FxHashMap<Handle<Node>, Vec<Handle<Node>>> = FxHashMap::default();
    for edge in graph.iter_edges() {
        adjacency
            .entry(edge.source.node)
            .or_default()
            .push(edge.sink.node);
    }

    for node in graph.iter_nodes() {
        let buffer = match graph[node].kind {
            NodeKind::DelRead { buffer } => buffer,
            _ => continue,
        };
        if !delay_is_zero_literal(graph, node) {
            continue;
        }
        let writes: Vec<Handle<Node>> = graph
            .iter_nodes()
            .filter(|candidate| {
                matches!(graph[*candidate].kind, NodeKind::DelWrite { buffer: b } if b == buffer)
            })
            .collect();
        let ordered = writes
            .iter()
            .any(|write| reaches(&adjacency, graph, *write, node));
        if !writes.is_empty() && !ordered {
            sink.warning(
                DiagnosticCode::BufferReadWriteOrder,
                graph[node].span,
                "this zero-delay read is not ordered after the buffer's write; \
                 the value it sees is implementation-defined",
            );
        }
    }
}

fn delay_is_zero_literal(graph: &WaveGraph, delread: Handle<Node>) -> bool {
    let delay_pin = PinRef::new(delread, 0);
    let mut edges = graph.edges_into(delay_pin);
    let edge = match edges.next() {
        Some(edge) => edge,
        None => return false,
    };
    match &graph[edge.source.node].kind {
        NodeKind::Literal(value) => value.as_index() == Some(0),
        _ => false,
    }
}

fn reaches(
    adjacency: &FxHashMap<Handle<Node>, Vec<Handle<Node>>>,
    graph: &WaveGraph,
    from: Handle<Node>,
    to: Handle<Node>,
) -> bool {
    let mut visited: HandleSet<Node> = HandleSet::new();
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        if node == to {
            return true;
        }
        if visited.contains(node) {
            continue;
        }
        visited.add(node);
        stack.extend(successors(adjacency, graph, node));
    }
    false
}
