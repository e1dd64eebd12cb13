// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

use waveling::compile;
use waveling::diagnostics::Diagnostic;
use waveling::diagnostics::DiagnosticCode;
use waveling::diagnostics::Severity;
use waveling::ir;

/// Wraps a stage body in a one-input (`m`, width 1), one-output (`o`, width 1) program.
pub fn mono_program(body: &str) -> String {
    format!(
        "program test;\n\
         external {{\n\
           sr: 48000,\n\
           block_size: 64,\n\
           inputs: [ {{ name: m, width: 1 }} ],\n\
           outputs: [ {{ name: o, width: 1 }} ],\n\
           properties: []\n\
         }}\n\
         stage main() {{\n{}\n}}\n",
        body
    )
}

/// Like [`mono_program`], but with a width-2 output `s` alongside `o`.
pub fn stereo_program(body: &str) -> String {
    format!(
        "program test;\n\
         external {{\n\
           sr: 48000,\n\
           block_size: 64,\n\
           inputs: [ {{ name: m, width: 1 }} ],\n\
           outputs: [ {{ name: o, width: 1 }}, {{ name: s, width: 2 }} ],\n\
           properties: []\n\
         }}\n\
         stage main() {{\n{}\n}}\n",
        body
    )
}

pub fn compile_ok(source: &str) -> ir::Program {
    let result = compile(source);
    if !result.succeeded() {
        let rendered: Vec<String> = result.diagnostics.iter().map(|d| d.to_string()).collect();
        panic!("compilation failed:\n{}", rendered.join("\n"));
    }
    result.ir.unwrap()
}

pub fn compile_err(source: &str) -> Vec<Diagnostic> {
    let result = compile(source);
    assert!(
        !result.succeeded(),
        "compilation unexpectedly succeeded; expected at least one error"
    );
    result.diagnostics
}

pub fn error_codes(diagnostics: &[Diagnostic]) -> Vec<DiagnosticCode> {
    diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.code)
        .collect()
}

/// Asserts that compiling the source fails with the given code somewhere in the output.
pub fn assert_error(source: &str, code: DiagnosticCode) {
    let diagnostics = compile_err(source);
    let codes = error_codes(&diagnostics);
    assert!(
        codes.contains(&code),
        "expected error `{}`, got {:?}",
        code,
        codes
    );
}

/// The node kinds present in an emitted program, as stable strings, sorted.
pub fn kind_names(program: &ir::Program) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = program
        .nodes
        .iter()
        .map(|node| match &node.kind {
            ir::Kind::Literal { .. } => "literal",
            ir::Kind::ExternalInput { .. } => "external-input",
            ir::Kind::ExternalOutput { .. } => "external-output",
            ir::Kind::Property { .. } => "property",
            ir::Kind::Unary { .. } => "unary",
            ir::Kind::Binary { .. } => "binary",
            ir::Kind::Sum { .. } => "sum",
            ir::Kind::Or { .. } => "or",
            ir::Kind::Convert { .. } => "convert",
            ir::Kind::Broadcast => "broadcast",
            ir::Kind::Truncate => "truncate",
            ir::Kind::Merge { .. } => "merge",
            ir::Kind::Split { .. } => "split",
            ir::Kind::Slice { .. } => "slice",
            ir::Kind::If => "if",
            ir::Kind::Select { .. } => "select",
            ir::Kind::Xoroshiro { .. } => "xoroshiro",
            ir::Kind::Cell { .. } => "cell",
            ir::Kind::DelWrite { .. } => "delwrite",
            ir::Kind::DelRead { .. } => "delread",
            ir::Kind::Biquad { .. } => "biquad",
            ir::Kind::StageOutput { .. } => "stage-output",
            ir::Kind::Discard => "discard",
        })
        .collect();
    names.sort_unstable();
    names
}

pub fn count_kind(program: &ir::Program, name: &str) -> usize {
    kind_names(program).iter().filter(|k| **k == name).count()
}

/// Looks up the pin list entry for an edge endpoint: input pins come first in the serialized
/// pin array, outputs after them.
pub fn output_pin(node: &ir::Node, index: u32) -> &ir::Pin {
    node.pins
        .iter()
        .filter(|pin| pin.direction == ir::PinDirection::Out)
        .nth(index as usize)
        .unwrap()
}

pub fn input_pin(node: &ir::Node, index: u32) -> &ir::Pin {
    node.pins
        .iter()
        .filter(|pin| pin.direction == ir::PinDirection::In)
        .nth(index as usize)
        .unwrap()
}

pub fn node_by_id(program: &ir::Program, id: u32) -> &ir::Node {
    program.nodes.iter().find(|node| node.id == id).unwrap()
}
