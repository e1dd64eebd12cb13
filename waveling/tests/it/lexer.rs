// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

use pretty_assertions::assert_eq;

use waveling::diagnostics::DiagnosticCode;
use waveling::diagnostics::DiagnosticSink;
use waveling::lex::tokenize;
use waveling::lex::TokenKind;
use waveling::types::ScalarType;

fn kinds(source: &str) -> Vec<TokenKind> {
    let mut sink = DiagnosticSink::new();
    let tokens = tokenize(source, &mut sink);
    assert!(!sink.has_errors(), "unexpected lex errors in `{}`", source);
    tokens.into_iter().map(|t| t.kind).collect()
}

fn lex_error(source: &str) -> Vec<DiagnosticCode> {
    let mut sink = DiagnosticSink::new();
    tokenize(source, &mut sink);
    sink.iter().map(|d| d.code).collect()
}

// ----------------------------------------------------------------------------
// tokens

#[test]
fn lexes_identifiers_and_keywords() {
    assert_eq!(
        kinds("program p stage let cell buffer external foo _bar x9"),
        vec![
            TokenKind::Program,
            TokenKind::Identifier,
            TokenKind::Stage,
            TokenKind::Let,
            TokenKind::Cell,
            TokenKind::Buffer,
            TokenKind::External,
            TokenKind::Identifier,
            TokenKind::Identifier,
            TokenKind::Identifier,
        ]
    );
}

#[test]
fn lexes_unsuffixed_integer() {
    assert_eq!(
        kinds("42"),
        vec![TokenKind::Integer {
            value: 42,
            suffix: None
        }]
    );
}

#[test]
fn lexes_suffixed_literals() {
    assert_eq!(
        kinds("1f64 7i32 0xffi64"),
        vec![
            TokenKind::Float {
                value: 1.0,
                suffix: Some(ScalarType::F64)
            },
            TokenKind::Integer {
                value: 7,
                suffix: Some(ScalarType::I32)
            },
            TokenKind::Integer {
                value: 255,
                suffix: Some(ScalarType::I64)
            },
        ]
    );
}

#[test]
fn lexes_float_forms() {
    assert_eq!(
        kinds("2.5 1e3 0.5f32"),
        vec![
            TokenKind::Float {
                value: 2.5,
                suffix: None
            },
            TokenKind::Float {
                value: 1000.0,
                suffix: None
            },
            TokenKind::Float {
                value: 0.5,
                suffix: Some(ScalarType::F32)
            },
        ]
    );
}

#[test]
fn lexes_booleans() {
    assert_eq!(kinds("true false"), vec![TokenKind::True, TokenKind::False]);
}

#[test]
fn lexes_arrows_and_comparisons() {
    assert_eq!(
        kinds("-> <- << >> <= < =="),
        vec![
            TokenKind::Arrow,
            TokenKind::LeftArrow,
            TokenKind::ShiftLeft,
            TokenKind::ShiftRight,
            TokenKind::LessEqual,
            TokenKind::Less,
            TokenKind::EqualEqual,
        ]
    );
}

#[test]
fn skips_line_comments() {
    assert_eq!(
        kinds("a // the rest is gone -> ;\nb"),
        vec![TokenKind::Identifier, TokenKind::Identifier]
    );
}

#[test]
fn dot_does_not_start_a_fraction_after_an_identifierish_number() {
    // `1.outputs` must lex as an integer, a dot, and an identifier.
    assert_eq!(
        kinds("1.outputs"),
        vec![
            TokenKind::Integer {
                value: 1,
                suffix: None
            },
            TokenKind::Dot,
            TokenKind::Identifier,
        ]
    );
}

#[test]
fn token_text_recovers_source() {
    let mut sink = DiagnosticSink::new();
    let source = "alpha -> beta";
    let tokens = tokenize(source, &mut sink);
    assert_eq!(tokens[0].text(source), "alpha");
    assert_eq!(tokens[1].text(source), "->");
    assert_eq!(tokens[2].text(source), "beta");
}

#[test]
fn spans_map_to_line_and_column() {
    let mut sink = DiagnosticSink::new();
    let source = "alpha\n  beta\r\ngamma";
    let tokens = tokenize(source, &mut sink);
    let index = waveling::span::PositionIndex::new(source);

    assert!(tokens[0].span.contains(0));
    let beta = index.position(tokens[1].span.start);
    assert_eq!((beta.line, beta.column), (1, 2));
    let gamma = index.position(tokens[2].span.start);
    assert_eq!((gamma.line, gamma.column), (2, 0));
    assert_eq!(index.line_count(), 3);
}

// ----------------------------------------------------------------------------
// errors

#[test]
fn rejects_stray_characters() {
    assert_eq!(lex_error("a ?"), vec![DiagnosticCode::StrayCharacter]);
}

#[test]
fn rejects_invalid_suffix() {
    assert_eq!(lex_error("1u8"), vec![DiagnosticCode::InvalidSuffix]);
}

#[test]
fn float_suffix_letters_read_as_hex_digits() {
    // `f32` cannot suffix a hex literal: the `f` and the digits are hex digits themselves.
    assert_eq!(
        kinds("0xfff32"),
        vec![TokenKind::Integer {
            value: 0xfff32,
            suffix: None
        }]
    );
}

#[test]
fn rejects_unterminated_string() {
    assert_eq!(
        lex_error("\"no closing quote"),
        vec![DiagnosticCode::UnterminatedLiteral]
    );
}
