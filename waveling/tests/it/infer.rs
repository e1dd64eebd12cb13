// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

use pretty_assertions::assert_eq;

use waveling::diagnostics::DiagnosticCode;
use waveling::ir;
use waveling::types::Rate;
use waveling::types::ScalarType;

use crate::util::*;

// ----------------------------------------------------------------------------
// scalars and promotion

#[test]
fn promotion_inserts_an_adapter_node() {
    // An i32 delay-line read meets an i64 literal: the edge gets an explicit convert node.
    let program = compile_ok(&mono_program(
        "buffer ints(8): i32(1);\n\
         delwrite(ints, i32(m));\n\
         let wide = delread(ints, 1) + 5i64;\n\
         f32(wide) -> o;",
    ));
    assert!(program.nodes.iter().any(|node| {
        matches!(node.kind, ir::Kind::Convert { to: ScalarType::I64 })
    }));
}

#[test]
fn edges_carry_equal_shapes_after_adapters() {
    let program = compile_ok(&mono_program(
        "buffer ints(8): i32(1);\n\
         delwrite(ints, i32(m));\n\
         f32(delread(ints, 1) + 5i64) -> o;",
    ));
    for edge in &program.edges {
        let source = output_pin(node_by_id(&program, edge.source.node), edge.source.pin);
        let sink = input_pin(node_by_id(&program, edge.sink.node), edge.sink.pin);
        assert_eq!(source.scalar, sink.scalar);
        assert_eq!(source.width, sink.width);
    }
}

#[test]
fn int_plus_float_requires_explicit_conversion() {
    assert_error(
        &mono_program("let x = delread(ints, 1) + m; buffer ints(8): i32(1); delwrite(ints, i32(m)); f32(x) -> o;"),
        DiagnosticCode::ScalarMismatch,
    );
}

#[test]
fn unsuffixed_literal_takes_type_from_context() {
    // `0.5` resolves to f32 through the multiply with the f32 input.
    let program = compile_ok(&mono_program("m * 0.5 -> o;"));
    let literal = program
        .nodes
        .iter()
        .find(|n| matches!(n.kind, ir::Kind::Literal { .. }))
        .unwrap();
    assert_eq!(output_pin(literal, 0).scalar, ScalarType::F32);
}

#[test]
fn unsuffixed_literal_without_context_is_rejected() {
    assert_error(&mono_program("1;"), DiagnosticCode::UnresolvedShape);
}

#[test]
fn conversion_resolves_its_unresolved_input() {
    // `1 + 1 -> f32` infers the sum as f32; nothing is left unresolved.
    compile_ok(&mono_program("1 + 1 -> f32 -> o;"));
}

#[test]
fn comparisons_produce_bool_of_matching_width() {
    let program = compile_ok(&mono_program(
        "let gate = m > 0.5f32; if(gate, m, m * 0.25f32) -> o;",
    ));
    let comparison = program
        .nodes
        .iter()
        .find(|n| matches!(n.kind, ir::Kind::Binary { op: ir::BinaryOp::Greater }))
        .unwrap();
    let out = output_pin(comparison, 0);
    assert_eq!(out.scalar, ScalarType::Bool);
    assert_eq!(out.width, 1);
}

#[test]
fn mask_and_accepts_value_and_bool() {
    // `(T, bool)` under `&` means "T or zero-of-T"; the result keeps T.
    let program = compile_ok(&mono_program("(m & (m > 0.0f32)) -> o;"));
    let and = program
        .nodes
        .iter()
        .find(|n| matches!(n.kind, ir::Kind::Binary { op: ir::BinaryOp::BitAnd }))
        .unwrap();
    assert_eq!(output_pin(and, 0).scalar, ScalarType::F32);
}

// ----------------------------------------------------------------------------
// widths

#[test]
fn width_mismatch_without_width_op_is_rejected() {
    assert_error(&stereo_program("m -> s;"), DiagnosticCode::WidthMismatch);
}

#[test]
fn broadcast_widens_to_the_destination() {
    let program = compile_ok(&stereo_program("broadcast(m) -> s; m -> o;"));
    let broadcast = program
        .nodes
        .iter()
        .find(|n| matches!(n.kind, ir::Kind::Broadcast))
        .unwrap();
    assert_eq!(input_pin(broadcast, 0).width, 1);
    assert_eq!(output_pin(broadcast, 0).width, 2);
}

#[test]
fn broadcast_must_strictly_widen() {
    assert_error(
        &mono_program("broadcast(m) -> o;"),
        DiagnosticCode::BroadcastNotWider,
    );
}

#[test]
fn truncate_must_strictly_narrow() {
    assert_error(
        &mono_program("truncate(m) -> o;"),
        DiagnosticCode::TruncateNotNarrower,
    );
}

#[test]
fn merge_output_width_is_the_sum_of_inputs() {
    let program = compile_ok(&stereo_program("merge(m, m) -> s; m -> o;"));
    let merge = program
        .nodes
        .iter()
        .find(|n| matches!(n.kind, ir::Kind::Merge { .. }))
        .unwrap();
    assert_eq!(output_pin(merge, 0).width, 2);
}

// ----------------------------------------------------------------------------
// rates

#[test]
fn external_inputs_are_sample_rate() {
    let program = compile_ok(&mono_program("m -> o;"));
    let input = program
        .nodes
        .iter()
        .find(|n| matches!(n.kind, ir::Kind::ExternalInput { .. }))
        .unwrap();
    assert_eq!(output_pin(input, 0).rate, Rate::Sample);
}

#[test]
fn properties_default_to_block_rate_and_propagate() {
    let source = "program p;\n\
         external {\n\
           sr: 48000, block_size: 64,\n\
           inputs: [ { name: m, width: 1 } ],\n\
           outputs: [ { name: o, width: 1 } ],\n\
           properties: [ { name: gain, type: f32 } ]\n\
         }\n\
         stage main() { m * f32(gain) -> o; }\n";
    let program = compile_ok(source);
    let property = program
        .nodes
        .iter()
        .find(|n| matches!(n.kind, ir::Kind::Property { .. }))
        .unwrap();
    assert_eq!(output_pin(property, 0).rate, Rate::Block);
    // B-rate property times S-rate input is S-rate.
    let mul = program
        .nodes
        .iter()
        .find(|n| matches!(n.kind, ir::Kind::Binary { op: ir::BinaryOp::Mul }))
        .unwrap();
    assert_eq!(output_pin(mul, 0).rate, Rate::Sample);
}

#[test]
fn cells_and_reads_are_sample_rate() {
    let program = compile_ok(&mono_program(
        "cell (prev, nxt): f32(1); nxt <- m; prev -> o;",
    ));
    let cell = program
        .nodes
        .iter()
        .find(|n| matches!(n.kind, ir::Kind::Cell { .. }))
        .unwrap();
    assert_eq!(output_pin(cell, 0).rate, Rate::Sample);
}
