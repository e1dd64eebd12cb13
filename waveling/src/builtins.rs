// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! The built-in scope: the names every program can see without declaring them, and the pin
//! bundles of the node kinds they lower to.
//!
//! Kind metadata is the single source of truth for which input pins exist, which are required,
//! and which names alias which indices.  [`instantiate`][] turns a [`NodeKind`][] into a node
//! with its bundles fully attached, so the builder and the validator never disagree about a
//! kind's pin layout.
//!
//! [`instantiate`]: fn.instantiate.html
//! [`NodeKind`]: ../graph/enum.NodeKind.html

use crate::arena::Handle;
use crate::graph::BiquadMode;
use crate::graph::Node;
use crate::graph::NodeKind;
use crate::graph::Stage;
use crate::graph::UnaryKind;
use crate::graph::WaveGraph;
use crate::span::Span;
use crate::types::ScalarType;
use crate::types::Shape;

//-------------------------------------------------------------------------------------------------
// Built-in names

/// What a tier-1 name denotes.  Resolution falls through to this table only after the stage and
/// program scopes have been searched.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Builtin {
    /// `pi`, `tau`, `e` — f64 constants.
    MathConst(f64),
    /// `sin`, `cos`, `tan`.
    Unary(UnaryKind),
    If,
    Select,
    Broadcast,
    Truncate,
    Merge,
    Split,
    Slice,
    Xoroshiro,
    DelRead,
    DelWrite,
    /// The scalar type names double as explicit conversion nodes: `x -> f32`, `i64(x)`.
    Convert(ScalarType),
    /// The `biquad` module; its members are the filter designers.
    BiquadModule,
}

/// Looks a name up in the built-in scope.
pub fn lookup(name: &str) -> Option<Builtin> {
    let builtin = match name {
        "pi" => Builtin::MathConst(std::f64::consts::PI),
        "tau" => Builtin::MathConst(std::f64::consts::TAU),
        "e" => Builtin::MathConst(std::f64::consts::E),
        "sin" => Builtin::Unary(UnaryKind::Sin),
        "cos" => Builtin::Unary(UnaryKind::Cos),
        "tan" => Builtin::Unary(UnaryKind::Tan),
        "if" => Builtin::If,
        "select" => Builtin::Select,
        "broadcast" => Builtin::Broadcast,
        "truncate" => Builtin::Truncate,
        "merge" => Builtin::Merge,
        "split" => Builtin::Split,
        "slice" => Builtin::Slice,
        "xoroshiro" => Builtin::Xoroshiro,
        "delread" => Builtin::DelRead,
        "delwrite" => Builtin::DelWrite,
        "biquad" => Builtin::BiquadModule,
        _ => Builtin::Convert(ScalarType::from_name(name)?),
    };
    Some(builtin)
}

/// Looks up a member of the `biquad` module.
pub fn biquad_member(name: &str) -> Option<BiquadMode> {
    match name {
        "lowpass" => Some(BiquadMode::Lowpass),
        "highpass" => Some(BiquadMode::Highpass),
        "bandpass" => Some(BiquadMode::Bandpass),
        _ => None,
    }
}

//-------------------------------------------------------------------------------------------------
// Node instantiation

/// Adds a node of the given kind with its pin bundles attached per the kind's metadata.
///
/// Pins whose shapes are statically known (external ports, buffer accesses, cells, stage
/// outputs) are created with those shapes; the rest are left for inference to fill in.
pub fn instantiate(
    graph: &mut WaveGraph,
    kind: NodeKind,
    stage: Option<Handle<Stage>>,
    span: Span,
) -> Handle<Node> {
    use NodeKind::*;

    struct PinPlan {
        name: Option<&'static str>,
        shape: Option<Shape>,
    }

    impl PinPlan {
        fn unnamed() -> PinPlan {
            PinPlan {
                name: None,
                shape: None,
            }
        }

        fn named(name: &'static str) -> PinPlan {
            PinPlan {
                name: Some(name),
                shape: None,
            }
        }

        fn shaped(shape: Shape) -> PinPlan {
            PinPlan {
                name: None,
                shape: Some(shape),
            }
        }
    }

    let mut inputs: Vec<PinPlan> = Vec::new();
    let mut outputs: Vec<PinPlan> = Vec::new();

    match &kind {
        Literal(value) => {
            let shape = value.scalar.map(|scalar| Shape::new(scalar, value.width()));
            outputs.push(PinPlan {
                name: None,
                shape,
            });
        }
        ExternalInput(index) => {
            let width = graph.externals.inputs[*index as usize].width;
            outputs.push(PinPlan::shaped(Shape::new(ScalarType::F32, width)));
        }
        ExternalOutput(index) => {
            let width = graph.externals.outputs[*index as usize].width;
            inputs.push(PinPlan::shaped(Shape::new(ScalarType::F32, width)));
        }
        Property(_) => outputs.push(PinPlan::shaped(Shape::scalar(ScalarType::F64))),
        Unary(_) | Convert { .. } | Broadcast | Truncate => {
            inputs.push(PinPlan::named("input"));
            outputs.push(PinPlan::unnamed());
        }
        Binary(_) => {
            inputs.push(PinPlan::named("lhs"));
            inputs.push(PinPlan::named("rhs"));
            outputs.push(PinPlan::unnamed());
        }
        Sum { arity } | Or { arity } | Merge { arity } => {
            for _ in 0..*arity {
                inputs.push(PinPlan::unnamed());
            }
            outputs.push(PinPlan::unnamed());
        }
        Split { widths } => {
            inputs.push(PinPlan::named("input"));
            for _ in widths {
                outputs.push(PinPlan::unnamed());
            }
        }
        Slice { .. } => {
            inputs.push(PinPlan::named("input"));
            outputs.push(PinPlan::unnamed());
        }
        If => {
            inputs.push(PinPlan::named("condition"));
            inputs.push(PinPlan::named("then"));
            inputs.push(PinPlan::named("otherwise"));
            outputs.push(PinPlan::unnamed());
        }
        Select { arity } => {
            inputs.push(PinPlan::named("index"));
            for _ in 0..*arity {
                inputs.push(PinPlan::unnamed());
            }
            outputs.push(PinPlan::unnamed());
        }
        Xoroshiro { .. } => outputs.push(PinPlan::shaped(Shape::scalar(ScalarType::F64))),
        Cell { .. } => {
            // The builder fills in the declared shape on both pins.
            inputs.push(PinPlan::named("end"));
            outputs.push(PinPlan::named("start"));
        }
        DelWrite { buffer } => {
            let shape = graph[*buffer].shape;
            inputs.push(PinPlan {
                name: Some("value"),
                shape: Some(shape),
            });
            outputs.push(PinPlan::shaped(shape));
        }
        DelRead { buffer } => {
            let shape = graph[*buffer].shape;
            inputs.push(PinPlan::named("delay"));
            outputs.push(PinPlan::shaped(shape));
        }
        Biquad(_) => {
            inputs.push(PinPlan::named("input"));
            inputs.push(PinPlan::named("frequency"));
            inputs.push(PinPlan::named("q"));
            outputs.push(PinPlan::unnamed());
        }
        StageOutput { stage, index } => {
            let shape = graph[*stage].outputs()[*index as usize].shape;
            inputs.push(PinPlan::shaped(shape));
            outputs.push(PinPlan::shaped(shape));
        }
        Discard => inputs.push(PinPlan::unnamed()),
    }

    let node = graph.add_node(kind, stage, span);
    for plan in inputs {
        let name = plan.name.map(|n| graph.add_symbol(n));
        graph.add_input_pin(node, name, plan.shape, true);
    }
    for plan in outputs {
        let name = plan.name.map(|n| graph.add_symbol(n));
        graph.add_output_pin(node, name, plan.shape);
    }
    node
}
