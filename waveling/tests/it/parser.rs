// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

use pretty_assertions::assert_eq;

use waveling::ast::BinaryOp;
use waveling::ast::Expr;
use waveling::ast::ExprKind;
use waveling::ast::SourceProgram;
use waveling::ast::Stmt;
use waveling::diagnostics::DiagnosticCode;
use waveling::diagnostics::DiagnosticSink;
use waveling::lex::tokenize;
use waveling::parse::parse;
use waveling::types::Rate;
use waveling::types::ScalarType;

fn parse_ok(source: &str) -> SourceProgram {
    let mut sink = DiagnosticSink::new();
    let tokens = tokenize(source, &mut sink);
    let program = parse(source, &tokens, &mut sink);
    if sink.has_errors() {
        let rendered: Vec<String> = sink.iter().map(|d| d.to_string()).collect();
        panic!("unexpected parse errors:\n{}", rendered.join("\n"));
    }
    program.unwrap()
}

fn parse_errors(source: &str) -> Vec<DiagnosticCode> {
    let mut sink = DiagnosticSink::new();
    let tokens = tokenize(source, &mut sink);
    let _ = parse(source, &tokens, &mut sink);
    sink.iter().map(|d| d.code).collect()
}

/// A tiny program with one statement in one stage; returns that statement's expression.
fn parse_expr(expr: &str) -> Expr {
    let source = format!(
        "program p; external {{ sr: 1, block_size: 1 }} stage main() {{ {}; }}",
        expr
    );
    let mut program = parse_ok(&source);
    match program.stages.remove(0).body.remove(0) {
        Stmt::Expr(expr) => expr,
        other => panic!("expected an expression statement, got {:?}", other),
    }
}

// ----------------------------------------------------------------------------
// structure

#[test]
fn parses_program_header_and_stages() {
    let program = parse_ok(
        "program mixer;\n\
         external { sr: 44100, block_size: 128 }\n\
         stage pre(out=f32(2)) { }\n\
         stage main() { }\n",
    );
    assert_eq!(program.name.name, "mixer");
    assert_eq!(program.external.sr.unwrap().value, 44100);
    assert_eq!(program.external.block_size.unwrap().value, 128);
    assert_eq!(program.stages.len(), 2);
    assert_eq!(program.stages[0].name.name, "pre");
    assert_eq!(program.stages[0].outputs.len(), 1);
    assert_eq!(program.stages[0].outputs[0].name.name, "out");
    assert_eq!(program.stages[0].outputs[0].shape.scalar, ScalarType::F32);
    assert_eq!(program.stages[0].outputs[0].shape.width, 2);
}

#[test]
fn parses_external_ports_and_properties() {
    let program = parse_ok(
        "program p;\n\
         external {\n\
           sr: 48000,\n\
           block_size: 64,\n\
           inputs: [ { name: a, width: 1 }, { name: b, width: 2 } ],\n\
           outputs: [ { name: o, width: 1 } ],\n\
           properties: [ { name: gain, type: f32, rate: s }, { name: mix, type: f64 } ],\n\
         }\n\
         stage main() { }\n",
    );
    assert_eq!(program.external.inputs.len(), 2);
    assert_eq!(program.external.inputs[1].width, 2);
    assert_eq!(program.external.outputs.len(), 1);
    assert_eq!(program.external.properties.len(), 2);
    assert_eq!(program.external.properties[0].rate, Rate::Sample);
    assert_eq!(program.external.properties[0].declared_type, ScalarType::F32);
    // rate defaults to block
    assert_eq!(program.external.properties[1].rate, Rate::Block);
}

#[test]
fn external_allows_quoted_words() {
    let program = parse_ok(
        "program p;\n\
         external { \"sr\": 48000, block_size: 64, inputs: [ { name: \"in\", width: 1 } ] }\n\
         stage main() { }\n",
    );
    assert_eq!(program.external.inputs[0].name.name, "in");
}

#[test]
fn parses_cell_and_buffer_statements() {
    let program = parse_ok(
        "program p; external { sr: 1, block_size: 1 }\n\
         stage main() {\n\
           cell (prev, nxt): f32(1);\n\
           cell(3) (a, b): f64;\n\
           buffer line(128): f32(2);\n\
         }\n",
    );
    let body = &program.stages[0].body;
    match &body[0] {
        Stmt::Cell { delay, start, end, shape, .. } => {
            assert!(delay.is_none());
            assert_eq!(start.name, "prev");
            assert_eq!(end.name, "nxt");
            assert_eq!(shape.width, 1);
        }
        other => panic!("expected a cell statement, got {:?}", other),
    }
    match &body[1] {
        Stmt::Cell { delay, shape, .. } => {
            assert_eq!(delay.unwrap().value, 3);
            assert_eq!(shape.scalar, ScalarType::F64);
        }
        other => panic!("expected a cell statement, got {:?}", other),
    }
    match &body[2] {
        Stmt::Buffer { name, shape, .. } => {
            assert_eq!(name.name, "line");
            assert_eq!(shape.width, 2);
        }
        other => panic!("expected a buffer statement, got {:?}", other),
    }
}

// ----------------------------------------------------------------------------
// precedence

#[test]
fn multiplication_binds_tighter_than_addition() {
    let expr = parse_expr("1 + 2 * 3");
    match expr.kind {
        ExprKind::Binary { op: BinaryOp::Add, rhs, .. } => match rhs.kind {
            ExprKind::Binary { op: BinaryOp::Mul, .. } => {}
            other => panic!("expected the product on the right, got {:?}", other),
        },
        other => panic!("expected a sum at the root, got {:?}", other),
    }
}

#[test]
fn comparison_binds_tighter_than_bitand() {
    let expr = parse_expr("a < b & c < d");
    match expr.kind {
        ExprKind::Binary { op: BinaryOp::BitAnd, lhs, rhs } => {
            assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Less, .. }));
            assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Less, .. }));
        }
        other => panic!("expected `&` at the root, got {:?}", other),
    }
}

#[test]
fn stacking_binds_tighter_than_arrows() {
    let expr = parse_expr("a, b -> x");
    match expr.kind {
        ExprKind::Route { source, .. } => {
            assert!(matches!(source.kind, ExprKind::Stack { .. }));
        }
        other => panic!("expected a route at the root, got {:?}", other),
    }
}

#[test]
fn arrow_chains_left_associatively() {
    let expr = parse_expr("a -> b -> c");
    match expr.kind {
        ExprKind::Route { source, .. } => {
            assert!(matches!(source.kind, ExprKind::Route { .. }));
        }
        other => panic!("expected a route at the root, got {:?}", other),
    }
}

#[test]
fn left_arrow_swaps_operands() {
    let expr = parse_expr("sink <- src");
    match expr.kind {
        ExprKind::Route { source, dest } => {
            match source.kind {
                ExprKind::Name { name, .. } => assert_eq!(name.name, "src"),
                other => panic!("expected a name, got {:?}", other),
            }
            match dest.kind {
                ExprKind::Name { name, .. } => assert_eq!(name.name, "sink"),
                other => panic!("expected a name, got {:?}", other),
            }
        }
        other => panic!("expected a route at the root, got {:?}", other),
    }
}

#[test]
fn arrow_binds_tighter_than_left_arrow() {
    // `x <- a -> b` is `(a -> b) -> x`: the right-hand side routes a into b first.
    let expr = parse_expr("x <- a -> b");
    match expr.kind {
        ExprKind::Route { source, dest } => {
            assert!(matches!(source.kind, ExprKind::Route { .. }));
            assert!(matches!(dest.kind, ExprKind::Name { .. }));
        }
        other => panic!("expected a route at the root, got {:?}", other),
    }
}

// ----------------------------------------------------------------------------
// postfix forms

#[test]
fn parses_index_member_and_call() {
    let expr = parse_expr("biquad.lowpass(m, f, q)[0].outputs");
    match expr.kind {
        ExprKind::Member { base, member } => {
            assert_eq!(member.name, "outputs");
            match base.kind {
                ExprKind::Index { base, index, .. } => {
                    assert_eq!(index, 0);
                    assert!(matches!(base.kind, ExprKind::Call { .. }));
                }
                other => panic!("expected an index, got {:?}", other),
            }
        }
        other => panic!("expected a member at the root, got {:?}", other),
    }
}

#[test]
fn parses_bundle_literals() {
    let expr = parse_expr("{ frequency: f, q: 1.0f64, m }");
    match expr.kind {
        ExprKind::Bundle { entries } => {
            assert_eq!(entries.len(), 3);
            assert_eq!(entries[0].name.as_ref().unwrap().name, "frequency");
            assert!(entries[2].name.is_none());
        }
        other => panic!("expected a bundle literal, got {:?}", other),
    }
}

#[test]
fn parses_module_qualified_names() {
    let expr = parse_expr("biquad::lowpass(m, f, q)");
    match expr.kind {
        ExprKind::Call { callee, .. } => match callee.kind {
            ExprKind::Name { module, name } => {
                assert_eq!(module.unwrap().name, "biquad");
                assert_eq!(name.name, "lowpass");
            }
            other => panic!("expected a qualified name, got {:?}", other),
        },
        other => panic!("expected a call, got {:?}", other),
    }
}

// ----------------------------------------------------------------------------
// errors

#[test]
fn reports_unexpected_token() {
    let codes = parse_errors("program p; external { sr: 1, block_size: 1 } stage main() { let = 1; }");
    assert!(codes.contains(&DiagnosticCode::UnexpectedToken));
}

#[test]
fn reports_missing_stage() {
    let codes = parse_errors("program p; external { sr: 1, block_size: 1 }");
    assert!(codes.contains(&DiagnosticCode::UnexpectedEndOfInput));
}

#[test]
fn reports_unknown_external_field() {
    let codes = parse_errors(
        "program p; external { sr: 1, block_size: 1, tempo: 120 } stage main() { }",
    );
    assert!(codes.contains(&DiagnosticCode::MalformedExternal));
}

#[test]
fn recovers_after_statement_errors() {
    // Both bad statements are reported; the parser resynchronizes on `;`.
    let codes = parse_errors(
        "program p; external { sr: 1, block_size: 1 } stage main() { let = 1; let = 2; }",
    );
    assert_eq!(
        codes
            .iter()
            .filter(|c| **c == DiagnosticCode::UnexpectedToken)
            .count(),
        2
    );
}
