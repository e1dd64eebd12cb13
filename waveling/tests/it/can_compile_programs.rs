// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! End-to-end compilation scenarios, plus the invariants every successful compilation must
//! uphold: edges connect equal shapes, required pins are connected, and the only cycles run
//! through cells or buffers.

use pretty_assertions::assert_eq;

use waveling::diagnostics::DiagnosticCode;
use waveling::ir;
use waveling::types::Rate;
use waveling::types::ScalarType;

use crate::util::*;

/// Checks the universal IR invariants on an emitted program.
fn check_invariants(program: &ir::Program) {
    // Every edge connects pins of equal shape.
    for edge in &program.edges {
        let source = output_pin(node_by_id(program, edge.source.node), edge.source.pin);
        let sink = input_pin(node_by_id(program, edge.sink.node), edge.sink.pin);
        assert_eq!(source.scalar, sink.scalar, "edge scalar mismatch");
        assert_eq!(source.width, sink.width, "edge width mismatch");
    }
    // Every input pin of every node has at least one incoming edge.
    for node in &program.nodes {
        let input_count = node
            .pins
            .iter()
            .filter(|pin| pin.direction == ir::PinDirection::In)
            .count();
        for pin in 0..input_count as u32 {
            assert!(
                program
                    .edges
                    .iter()
                    .any(|edge| edge.sink.node == node.id && edge.sink.pin == pin),
                "node {} input {} is unconnected",
                node.id,
                pin
            );
        }
    }
    // No cycle exists once edges out of cells are excised.
    let mut visiting = vec![0u8; program.nodes.len()];
    fn visit(program: &ir::Program, visiting: &mut Vec<u8>, node: u32) {
        match visiting[node as usize] {
            1 => panic!("cycle through node {}", node),
            2 => return,
            _ => {}
        }
        visiting[node as usize] = 1;
        if !matches!(node_by_id(program, node).kind, ir::Kind::Cell { .. }) {
            for edge in &program.edges {
                if edge.source.node == node {
                    visit(program, visiting, edge.sink.node);
                }
            }
        }
        visiting[node as usize] = 2;
    }
    for node in &program.nodes {
        visit(program, &mut visiting, node.id);
    }
}

// ----------------------------------------------------------------------------
// scenarios

#[test]
fn pointwise_mix() {
    let source = "program mix;\n\
         external {\n\
           sr: 48000, block_size: 64,\n\
           inputs: [ { name: a, width: 1 }, { name: b, width: 1 } ],\n\
           outputs: [ { name: o, width: 1 } ]\n\
         }\n\
         stage main() { a + b -> o; }\n";
    let program = compile_ok(source);
    check_invariants(&program);
    assert_eq!(
        kind_names(&program),
        vec!["binary", "external-input", "external-input", "external-output"]
    );
    for node in &program.nodes {
        for pin in &node.pins {
            assert_eq!(pin.scalar, ScalarType::F32);
            assert_eq!(pin.rate, Rate::Sample);
        }
    }
}

#[test]
fn stereo_broadcast() {
    let program = compile_ok(&stereo_program("broadcast(m) -> s; m -> o;"));
    check_invariants(&program);
    let broadcast = program
        .nodes
        .iter()
        .find(|n| matches!(n.kind, ir::Kind::Broadcast))
        .unwrap();
    assert_eq!(output_pin(broadcast, 0).width, 2);
}

#[test]
fn one_pole_feedback() {
    let source = "program onepole;\n\
         external {\n\
           sr: 48000, block_size: 64,\n\
           inputs: [ { name: input, width: 1 } ],\n\
           outputs: [ { name: output, width: 1 } ]\n\
         }\n\
         stage main() {\n\
           cell (prev, nxt): f32(1);\n\
           nxt <- (input[0] * 0.1f32) + (prev * 0.9f32);\n\
           prev -> output[0];\n\
         }\n";
    let program = compile_ok(source);
    check_invariants(&program);
    assert_eq!(count_kind(&program, "cell"), 1);
    // The cell participates in a cycle over the raw edge set.
    let cell = program
        .nodes
        .iter()
        .find(|n| matches!(n.kind, ir::Kind::Cell { .. }))
        .unwrap();
    assert!(program.edges.iter().any(|e| e.source.node == cell.id));
    assert!(program.edges.iter().any(|e| e.sink.node == cell.id));
}

#[test]
fn delay_line() {
    let source = "program delay;\n\
         external {\n\
           sr: 48000, block_size: 64,\n\
           inputs: [ { name: input, width: 1 } ],\n\
           outputs: [ { name: output, width: 1 } ]\n\
         }\n\
         stage main() {\n\
           buffer buf(128): f32(1);\n\
           delwrite(buf, input[0]);\n\
           delread(buf, 64) -> output[0];\n\
         }\n";
    let program = compile_ok(source);
    check_invariants(&program);
    assert_eq!(program.buffers.len(), 1);
    assert_eq!(program.buffers[0].capacity, 128);
    assert_eq!(count_kind(&program, "delwrite"), 1);
    assert_eq!(count_kind(&program, "delread"), 1);
}

#[test]
fn constant_folding_collapses_the_whole_subgraph() {
    let program = compile_ok(&mono_program("let k = (2 + 3) * 4 -> f32; k -> o; m -> o;"));
    check_invariants(&program);
    assert_eq!(count_kind(&program, "literal"), 1);
    assert_eq!(count_kind(&program, "binary"), 0);
}

#[test]
fn rate_violation_in_buffer_capacity() {
    assert_error(
        &mono_program("buffer buf(m): f32(1); delwrite(buf, m); delread(buf, 1) -> o;"),
        DiagnosticCode::ConstantRequired,
    );
}

// ----------------------------------------------------------------------------
// boundary cases

#[test]
fn literal_without_type_context_is_rejected() {
    assert_error(&mono_program("1;"), DiagnosticCode::UnresolvedShape);
}

#[test]
fn cell_with_zero_delay_is_rejected() {
    assert_error(
        &mono_program("cell(0) (p, n): f32(1); n <- m; p -> o;"),
        DiagnosticCode::BadCellDelay,
    );
}

#[test]
fn delay_equal_to_capacity_is_rejected() {
    assert_error(
        &mono_program("buffer b(1): f32(1); delwrite(b, m); delread(b, 1) -> o;"),
        DiagnosticCode::DelayExceedsCapacity,
    );
}

#[test]
fn multi_stage_programs_compile() {
    let source = "program chain;\n\
         external {\n\
           sr: 48000, block_size: 64,\n\
           inputs: [ { name: m, width: 1 } ],\n\
           outputs: [ { name: o, width: 1 } ]\n\
         }\n\
         stage gainstage(wet=f32(1)) {\n\
           wet = m * 0.5f32;\n\
         }\n\
         stage main() {\n\
           gainstage.outputs.wet -> o;\n\
         }\n";
    let program = compile_ok(source);
    check_invariants(&program);
    assert_eq!(program.stages.len(), 2);
    assert_eq!(program.stages[0].outputs.len(), 1);
    assert_eq!(count_kind(&program, "stage-output"), 1);
}

#[test]
fn every_stage_output_is_sample_rate() {
    let source = "program chain;\n\
         external {\n\
           sr: 48000, block_size: 64,\n\
           inputs: [ { name: m, width: 1 } ],\n\
           outputs: [ { name: o, width: 1 } ]\n\
         }\n\
         stage constants(level=f32(1)) {\n\
           level = 0.25f32 -> f32;\n\
         }\n\
         stage main() {\n\
           m * constants.outputs.level -> o;\n\
         }\n";
    let program = compile_ok(source);
    let stage_output = program
        .nodes
        .iter()
        .find(|n| matches!(n.kind, ir::Kind::StageOutput { .. }))
        .unwrap();
    assert_eq!(output_pin(stage_output, 0).rate, Rate::Sample);
}

#[test]
fn rng_nodes_get_dense_seed_slots() {
    let program = compile_ok(&mono_program(
        "f32(xoroshiro()) * 0.0f32 + m -> o; f32(xoroshiro(42)) * 0.0f32 -> o;",
    ));
    let mut slots: Vec<u32> = program
        .nodes
        .iter()
        .filter_map(|node| match node.kind {
            ir::Kind::Xoroshiro { seed_slot, .. } => Some(seed_slot),
            _ => None,
        })
        .collect();
    slots.sort_unstable();
    assert_eq!(slots, vec![0, 1]);
}
