// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

use pretty_assertions::assert_eq;

use waveling::diagnostics::DiagnosticCode;
use waveling::ir;

use crate::util::*;

fn literal_values(program: &ir::Program) -> Vec<Vec<ir::LaneValue>> {
    program
        .nodes
        .iter()
        .filter_map(|node| match &node.kind {
            ir::Kind::Literal { value } => Some(value.clone()),
            _ => None,
        })
        .collect()
}

// ----------------------------------------------------------------------------
// arithmetic

#[test]
fn constant_subgraph_folds_to_a_single_literal() {
    let program = compile_ok(&mono_program("let k = (2 + 3) * 4 -> f32; k -> o; m -> o;"));
    // No arithmetic nodes survive; one literal carries 20.0f32.
    assert_eq!(count_kind(&program, "binary"), 0);
    assert_eq!(count_kind(&program, "convert"), 0);
    assert_eq!(
        literal_values(&program),
        vec![vec![ir::LaneValue::Float(20.0)]]
    );
}

#[test]
fn sum_of_unsuffixed_literals_folds_at_target_type() {
    let program = compile_ok(&mono_program("1 + 1 -> f32 -> o; m -> o;"));
    assert_eq!(
        literal_values(&program),
        vec![vec![ir::LaneValue::Float(2.0)]]
    );
}

#[test]
fn integer_folding_wraps_at_declared_precision() {
    // 2147483647 + 1 wraps in i32 before the conversion to i64 happens.
    let program = compile_ok(&mono_program(
        "buffer ints(4): i64(1);\n\
         delwrite(ints, i64(2147483647i32 + 1i32));\n\
         delread(ints, 1) -> f32 -> o;\n\
         m -> o;",
    ));
    assert!(literal_values(&program)
        .iter()
        .any(|lanes| lanes == &vec![ir::LaneValue::Int(-2147483648)]));
}

#[test]
fn division_by_constant_zero_is_rejected() {
    assert_error(
        &mono_program("1 / 0 -> i32 -> f32 -> o;"),
        DiagnosticCode::DivisionByZero,
    );
}

#[test]
fn comparisons_fold_to_bools() {
    // The folded condition selects the `then` branch; the comparison itself disappears.
    let program = compile_ok(&mono_program("if(1.0f32 < 2.0f32, m, m * 0.5f32) -> o;"));
    assert_eq!(count_kind(&program, "binary"), 1); // only the m * 0.5f32 multiply remains
    assert!(literal_values(&program)
        .iter()
        .any(|lanes| lanes == &vec![ir::LaneValue::Bool(true)]));
}

// ----------------------------------------------------------------------------
// width ops

#[test]
fn broadcast_of_a_constant_zero_extends() {
    let program = compile_ok(&stereo_program("broadcast(0.25f32) -> s; m -> o;"));
    assert_eq!(count_kind(&program, "broadcast"), 0);
    assert!(literal_values(&program).iter().any(|lanes| {
        lanes == &vec![ir::LaneValue::Float(0.25), ir::LaneValue::Float(0.0)]
    }));
}

#[test]
fn merge_of_constants_folds_to_a_vector_literal() {
    let program = compile_ok(&stereo_program("merge(1.0f32, 2.0f32) -> s; m -> o;"));
    assert_eq!(count_kind(&program, "merge"), 0);
    assert!(literal_values(&program).iter().any(|lanes| {
        lanes == &vec![ir::LaneValue::Float(1.0), ir::LaneValue::Float(2.0)]
    }));
}

// ----------------------------------------------------------------------------
// buffers

#[test]
fn capacity_expressions_fold() {
    let program = compile_ok(&mono_program(
        "buffer line(32 * 4): f32(1); delwrite(line, m); delread(line, 64) -> o;",
    ));
    assert_eq!(program.buffers[0].capacity, 128);
}

#[test]
fn constant_delay_beyond_capacity_is_rejected() {
    assert_error(
        &mono_program("buffer b(1): f32(1); delwrite(b, m); delread(b, 1) -> o;"),
        DiagnosticCode::DelayExceedsCapacity,
    );
}

#[test]
fn zero_capacity_is_rejected() {
    assert_error(
        &mono_program("buffer b(0): f32(1); delwrite(b, m); delread(b, 0) -> o;"),
        DiagnosticCode::BadBufferCapacity,
    );
}
