// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

use waveling::diagnostics::DiagnosticCode;
use waveling::diagnostics::DiagnosticSink;
use waveling::diagnostics::Severity;
use waveling::graph::NodeKind;
use waveling::graph::PinRef;
use waveling::graph::WaveGraph;
use waveling::span::Span;
use waveling::types::Shape;
use waveling::types::ScalarType;
use waveling::validate::validate;

use crate::util::*;

// ----------------------------------------------------------------------------
// required pins

#[test]
fn unconnected_cell_end_is_a_missing_pin() {
    assert_error(
        &mono_program("cell (prev, nxt): f32(1); prev -> o;"),
        DiagnosticCode::MissingRequiredPin,
    );
}

#[test]
fn unconnected_external_output_is_a_missing_pin() {
    assert_error(&mono_program("let x = m * 0.5f32;"), DiagnosticCode::MissingRequiredPin);
}

// ----------------------------------------------------------------------------
// cycles

#[test]
fn cycles_through_cells_are_legal() {
    compile_ok(&mono_program(
        "cell (prev, nxt): f32(1);\n\
         nxt <- (m * 0.1f32) + (prev * 0.9f32);\n\
         prev -> o;",
    ));
}

#[test]
fn cycles_without_a_cell_are_rejected() {
    // Routing a node's own output back into one of its input pins closes a same-sample loop.
    assert_error(
        &mono_program("let a = m + 0.0f32; a -> a.inputs.rhs; a -> o;"),
        DiagnosticCode::IllegalCycle,
    );
}

#[test]
fn buffers_break_cycles() {
    // write -> read -> write again: legal, because the buffer holds a sample boundary.
    compile_ok(&mono_program(
        "buffer line(16): f32(1);\n\
         delwrite(line, delread(line, 1) * 0.5f32 + m);\n\
         delread(line, 1) -> o;",
    ));
}

// ----------------------------------------------------------------------------
// buffers

#[test]
fn sample_rate_capacity_is_a_rate_error() {
    assert_error(
        &mono_program("buffer buf(m): f32(1); delwrite(buf, m); delread(buf, 0) -> o;"),
        DiagnosticCode::ConstantRequired,
    );
}

#[test]
fn zero_delay_without_ordering_warns() {
    let source = mono_program(
        "buffer buf(4): f32(1);\n\
         delread(buf, 0) -> o;\n\
         delwrite(buf, m);",
    );
    let result = waveling::compile(&source);
    assert!(result.succeeded());
    assert!(result.diagnostics.iter().any(|d| {
        d.severity == Severity::Warning && d.code == DiagnosticCode::BufferReadWriteOrder
    }));
}

#[test]
fn nonzero_delay_does_not_warn() {
    let source = mono_program(
        "buffer buf(4): f32(1);\n\
         delwrite(buf, m);\n\
         delread(buf, 1) -> o;",
    );
    let result = waveling::compile(&source);
    assert!(result.succeeded());
    assert!(!result
        .diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::BufferReadWriteOrder));
}

// ----------------------------------------------------------------------------
// direct graph surgery

/// The language cannot express an illegal cross-stage edge (paths only reach declared outputs),
/// so this check is exercised against a hand-built graph.
#[test]
fn cross_stage_edge_must_come_from_a_declared_output() {
    let mut graph = WaveGraph::new();
    let producer_name = graph.add_symbol("producer");
    let consumer_name = graph.add_symbol("consumer");
    let producer = graph.add_stage(producer_name, Span::default());
    let consumer = graph.add_stage(consumer_name, Span::default());

    let shape = Shape::scalar(ScalarType::F32);
    let hidden = graph.add_node(
        NodeKind::Literal(waveling::graph::ConstValue::float(1.0, Some(ScalarType::F32))),
        Some(producer),
        Span::default(),
    );
    graph.add_output_pin(hidden, None, Some(shape));

    let negate = graph.add_node(
        NodeKind::Unary(waveling::graph::UnaryKind::Negate),
        Some(consumer),
        Span::default(),
    );
    graph.add_input_pin(negate, None, Some(shape), true);
    graph.add_output_pin(negate, None, Some(shape));

    graph.add_edge(PinRef::new(hidden, 0), PinRef::new(negate, 0));

    let mut sink = DiagnosticSink::new();
    validate(&graph, &mut sink);
    assert!(sink
        .iter()
        .any(|d| d.code == DiagnosticCode::IllegalCrossStageEdge));

    let rendered = format!("{}", hidden.display(&graph));
    assert!(rendered.contains("literal"));
}

#[test]
fn declared_stage_outputs_may_cross() {
    let mut graph = WaveGraph::new();
    let producer_name = graph.add_symbol("producer");
    let consumer_name = graph.add_symbol("consumer");
    let out_name = graph.add_symbol("out");
    let producer = graph.add_stage(producer_name, Span::default());
    let consumer = graph.add_stage(consumer_name, Span::default());

    let shape = Shape::scalar(ScalarType::F32);
    let output = graph.add_node(
        NodeKind::StageOutput {
            stage: producer,
            index: 0,
        },
        Some(producer),
        Span::default(),
    );
    graph.add_input_pin(output, None, Some(shape), true);
    graph.add_output_pin(output, None, Some(shape));
    graph.push_stage_output(
        producer,
        waveling::graph::StageOutputDef {
            name: out_name,
            shape,
            node: output,
        },
    );

    let feed = graph.add_node(
        NodeKind::Literal(waveling::graph::ConstValue::float(0.0, Some(ScalarType::F32))),
        Some(producer),
        Span::default(),
    );
    graph.add_output_pin(feed, None, Some(shape));
    graph.add_edge(PinRef::new(feed, 0), PinRef::new(output, 0));

    let negate = graph.add_node(
        NodeKind::Unary(waveling::graph::UnaryKind::Negate),
        Some(consumer),
        Span::default(),
    );
    graph.add_input_pin(negate, None, Some(shape), true);
    graph.add_output_pin(negate, None, Some(shape));
    graph.add_edge(PinRef::new(output, 0), PinRef::new(negate, 0));

    let mut sink = DiagnosticSink::new();
    validate(&graph, &mut sink);
    assert!(!sink
        .iter()
        .any(|d| d.code == DiagnosticCode::IllegalCrossStageEdge));
}
