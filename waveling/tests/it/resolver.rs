// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

use waveling::diagnostics::DiagnosticCode;

use crate::util::*;

// ----------------------------------------------------------------------------
// scope tiers

#[test]
fn undeclared_names_are_rejected() {
    assert_error(
        &mono_program("ghost -> o;"),
        DiagnosticCode::UndeclaredName,
    );
}

#[test]
fn let_names_cannot_be_redeclared_in_the_same_scope() {
    assert_error(
        &mono_program("let x = m; let x = m;"),
        DiagnosticCode::RedeclaredName,
    );
}

#[test]
fn stage_locals_shadow_program_scope() {
    // The stage-local `m` shadows the external input of the same name.
    compile_ok(&mono_program("let m = 0.5f32; m -> o;"));
}

#[test]
fn external_names_shadow_builtins() {
    // An external input named `sin` hides the built-in; using it as a plain node must work.
    let source = "program p;\n\
         external {\n\
           sr: 48000, block_size: 64,\n\
           inputs: [ { name: sin, width: 1 } ],\n\
           outputs: [ { name: o, width: 1 } ]\n\
         }\n\
         stage main() { sin -> o; }\n";
    compile_ok(source);
}

#[test]
fn duplicate_external_names_are_rejected() {
    let source = "program p;\n\
         external {\n\
           sr: 48000, block_size: 64,\n\
           inputs: [ { name: a, width: 1 }, { name: a, width: 1 } ],\n\
           outputs: [ { name: o, width: 1 } ]\n\
         }\n\
         stage main() { a -> o; }\n";
    assert_error(source, DiagnosticCode::DuplicateExternalName);
}

// ----------------------------------------------------------------------------
// declaration-order independence

#[test]
fn stage_references_are_order_independent() {
    // `early` reads `late.outputs.x` even though `late` is declared afterwards.
    let source = "program p;\n\
         external {\n\
           sr: 48000, block_size: 64,\n\
           inputs: [ { name: m, width: 1 } ],\n\
           outputs: [ { name: o, width: 1 } ]\n\
         }\n\
         stage early() { late.outputs.x -> o; }\n\
         stage late(x=f32(1)) { x = m; }\n";
    let program = compile_ok(source);
    assert_eq!(count_kind(&program, "stage-output"), 1);
}

#[test]
fn buffers_are_visible_across_stages() {
    // The buffer is declared in `writer` but read by `reader`, declared first.
    let source = "program p;\n\
         external {\n\
           sr: 48000, block_size: 64,\n\
           inputs: [ { name: m, width: 1 } ],\n\
           outputs: [ { name: o, width: 1 } ]\n\
         }\n\
         stage reader() { delread(line, 64) -> o; }\n\
         stage writer() { buffer line(128): f32(1); delwrite(line, m); }\n";
    let program = compile_ok(source);
    assert_eq!(program.buffers.len(), 1);
    assert_eq!(program.buffers[0].capacity, 128);
}

#[test]
fn unknown_stage_output_is_an_invalid_path() {
    let source = "program p;\n\
         external {\n\
           sr: 48000, block_size: 64,\n\
           inputs: [ { name: m, width: 1 } ],\n\
           outputs: [ { name: o, width: 1 } ]\n\
         }\n\
         stage early() { late.outputs.nope -> o; }\n\
         stage late(x=f32(1)) { x = m; }\n";
    assert_error(source, DiagnosticCode::InvalidPath);
}

#[test]
fn cell_end_cannot_be_read() {
    assert_error(
        &mono_program("cell (p, n): f32(1); n -> o; p -> o;"),
        DiagnosticCode::SourceRequired,
    );
}

#[test]
fn assignment_targets_must_be_declared_in_the_same_scope() {
    // `o` is program scope, not stage scope, so `o = …` is rejected.
    assert_error(&mono_program("o = m;"), DiagnosticCode::NotAssignable);
}

#[test]
fn let_bound_names_are_immutable() {
    assert_error(
        &mono_program("let x = m; x = m; x -> o;"),
        DiagnosticCode::NotAssignable,
    );
}
