// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Constant folding.
//!
//! Iteratively replaces constant-rate subgraphs with single literal nodes carrying the computed
//! value, until fixpoint.  Folding is pure and order-independent: a node folds exactly when every
//! input is already a literal, so the traversal order cannot change the result.
//!
//! Integer arithmetic is evaluated in `i128` and truncated to the declared type after every
//! operation; float arithmetic is evaluated in `f64` and rounded to `f32` where that is the
//! declared type.  That is "a precision sufficient to preserve the declared result type": the
//! folded value is bit-identical to what a runtime evaluating at declared precision would
//! produce.
//!
//! The arena never deletes, so replaced nodes are dead-marked and their edges pruned; the
//! emitter skips them.  The folder also resolves buffer capacities (which must fold to positive
//! integer constants) and rejects constant delays that cannot fit their buffer.

use smallvec::SmallVec;

use crate::arena::Handle;
use crate::arena::HandleSet;
use crate::builtins;
use crate::diagnostics::DiagnosticCode;
use crate::diagnostics::DiagnosticSink;
use crate::graph::BinaryKind;
use crate::graph::ConstValue;
use crate::graph::Lane;
use crate::graph::Node;
use crate::graph::NodeKind;
use crate::graph::PinRef;
use crate::graph::UnaryKind;
use crate::graph::WaveGraph;
use crate::types::Rate;
use crate::types::ScalarType;

/// Folds every constant-rate subgraph down to literals, then resolves buffer capacities and
/// constant-delay bounds.
pub fn fold(graph: &mut WaveGraph, sink: &mut DiagnosticSink) {
    let mut poisoned: HandleSet<Node> = HandleSet::new();
    let mut folded = 0usize;
    loop {
        let candidate = find_foldable(graph, &poisoned);
        let node = match candidate {
            Some(node) => node,
            None => break,
        };
        match evaluate(graph, node) {
            Ok(values) => {
                replace_with_literals(graph, node, values);
                folded += 1;
            }
            Err(error) => {
                sink.error(error.code, graph[node].span, error.message);
                poisoned.add(node);
            }
        }
    }
    pass_debugging!("fold: collapsed {} nodes", folded);

    resolve_capacities(graph, sink);
    check_constant_delays(graph, sink);
    sweep_dead(graph);
}

struct FoldError {
    code: DiagnosticCode,
    message: String,
}

impl FoldError {
    fn new(code: DiagnosticCode, message: impl Into<String>) -> FoldError {
        FoldError {
            code,
            message: message.into(),
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Candidate selection

fn is_foldable_kind(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Unary(_)
            | NodeKind::Binary(_)
            | NodeKind::Sum { .. }
            | NodeKind::Or { .. }
            | NodeKind::Convert { .. }
            | NodeKind::Broadcast
            | NodeKind::Truncate
            | NodeKind::Merge { .. }
            | NodeKind::Split { .. }
            | NodeKind::Slice { .. }
            | NodeKind::If
            | NodeKind::Select { .. }
    )
}

/// A node folds when its kind is pure and every input is wired directly to a live literal.
fn find_foldable(graph: &WaveGraph, poisoned: &HandleSet<Node>) -> Option<Handle<Node>> {
    graph.iter_live_nodes().find(|node| {
        if poisoned.contains(*node) || !is_foldable_kind(&graph[*node].kind) {
            return false;
        }
        let input_count = graph[*node].inputs().len();
        (0..input_count).all(|index| {
            let mut edges = graph.edges_into(PinRef::new(*node, index));
            match (edges.next(), edges.next()) {
                (Some(edge), None) => {
                    !graph.is_dead(edge.source.node)
                        && matches!(graph[edge.source.node].kind, NodeKind::Literal(_))
                }
                _ => false,
            }
        })
    })
}

//-------------------------------------------------------------------------------------------------
// Evaluation

/// Reads the constant on an input pin, coerced to the pin's resolved scalar.
fn input_value(graph: &WaveGraph, node: Handle<Node>, index: u32) -> (ConstValue, ScalarType) {
    let edge = graph.edges_into(PinRef::new(node, index)).next().unwrap();
    let value = match &graph[edge.source.node].kind {
        NodeKind::Literal(value) => value.clone(),
        _ => unreachable!("find_foldable only accepts literal inputs"),
    };
    let pin = graph.input_pin(PinRef::new(node, index)).unwrap();
    let scalar = graph[pin].shape.map(|s| s.scalar).unwrap_or(ScalarType::F64);
    let lanes = value
        .lanes
        .iter()
        .map(|lane| coerce_lane(*lane, scalar))
        .collect();
    (
        ConstValue {
            scalar: Some(scalar),
            lanes,
        },
        scalar,
    )
}

/// Normalizes a lane to a scalar type, truncating or rounding exactly as the declared type
/// would.
fn coerce_lane(lane: Lane, scalar: ScalarType) -> Lane {
    match scalar {
        ScalarType::I32 => Lane::Int(lane_to_int(lane) as i32 as i128),
        ScalarType::I64 => Lane::Int(lane_to_int(lane) as i64 as i128),
        ScalarType::F32 => Lane::Float(lane.as_f64() as f32 as f64),
        ScalarType::F64 => Lane::Float(lane.as_f64()),
        ScalarType::Bool => Lane::Bool(match lane {
            Lane::Bool(b) => b,
            Lane::Int(v) => v != 0,
            Lane::Float(v) => v != 0.0,
        }),
    }
}

fn lane_to_int(lane: Lane) -> i128 {
    match lane {
        Lane::Int(v) => v,
        Lane::Float(v) => v as i128,
        Lane::Bool(b) => b as i128,
    }
}

fn lane_truth(lane: Lane) -> bool {
    match lane {
        Lane::Bool(b) => b,
        Lane::Int(v) => v != 0,
        Lane::Float(v) => v != 0.0,
    }
}

/// Evaluates one node over its constant inputs, producing one value per output pin.
fn evaluate(graph: &WaveGraph, node: Handle<Node>) -> Result<Vec<ConstValue>, FoldError> {
    let inputs: Vec<(ConstValue, ScalarType)> = (0..graph[node].inputs().len())
        .map(|index| input_value(graph, node, index))
        .collect();
    let out_scalar = |index: u32| -> ScalarType {
        let pin = graph.output_pin(PinRef::new(node, index)).unwrap();
        graph[pin].shape.map(|s| s.scalar).unwrap_or(ScalarType::F64)
    };

    let kind = &graph[node].kind;
    let outputs = match kind {
        NodeKind::Unary(op) => {
            let (value, scalar) = &inputs[0];
            let lanes = value
                .lanes
                .iter()
                .map(|lane| unary_lane(*op, *lane, *scalar))
                .collect::<Result<_, _>>()?;
            vec![ConstValue {
                scalar: Some(out_scalar(0)),
                lanes,
            }]
        }
        NodeKind::Binary(op) => {
            let (lhs, lhs_scalar) = &inputs[0];
            let (rhs, rhs_scalar) = &inputs[1];
            let one_sided_mask = *op == BinaryKind::BitAnd
                && (*lhs_scalar == ScalarType::Bool) != (*rhs_scalar == ScalarType::Bool);
            let lanes: SmallVec<[Lane; 2]> = if op.is_shift() {
                let amount = lane_to_int(rhs.lanes[0]);
                lhs.lanes
                    .iter()
                    .map(|lane| shift_lane(*op, *lane, amount, *lhs_scalar))
                    .collect::<Result<SmallVec<_>, _>>()?
            } else if one_sided_mask {
                // `T & bool` is "T or zero-of-T".
                let (value, value_scalar, mask) = if *rhs_scalar == ScalarType::Bool {
                    (lhs, lhs_scalar, rhs)
                } else {
                    (rhs, rhs_scalar, lhs)
                };
                let zero = if value_scalar.is_float() {
                    Lane::Float(0.0)
                } else {
                    Lane::Int(0)
                };
                value
                    .lanes
                    .iter()
                    .zip(mask.lanes.iter())
                    .map(|(v, m)| if lane_truth(*m) { *v } else { zero })
                    .collect()
            } else {
                lhs.lanes
                    .iter()
                    .zip(rhs.lanes.iter())
                    .map(|(l, r)| binary_lane(*op, *l, *r, *lhs_scalar))
                    .collect::<Result<SmallVec<_>, _>>()?
            };
            vec![ConstValue {
                scalar: Some(out_scalar(0)),
                lanes: lanes
                    .into_iter()
                    .map(|lane| coerce_lane(lane, out_scalar(0)))
                    .collect(),
            }]
        }
        NodeKind::Sum { .. } => {
            let scalar = out_scalar(0);
            let width = inputs[0].0.lanes.len();
            let mut lanes: SmallVec<[Lane; 2]> = SmallVec::new();
            for channel in 0..width {
                let mut accumulated = inputs[0].0.lanes[channel];
                for (value, _) in &inputs[1..] {
                    accumulated =
                        binary_lane(BinaryKind::Add, accumulated, value.lanes[channel], scalar)?;
                }
                lanes.push(coerce_lane(accumulated, scalar));
            }
            vec![ConstValue {
                scalar: Some(scalar),
                lanes,
            }]
        }
        NodeKind::Or { .. } => {
            let width = inputs[0].0.lanes.len();
            let lanes = (0..width)
                .map(|channel| {
                    Lane::Bool(inputs.iter().any(|(value, _)| lane_truth(value.lanes[channel])))
                })
                .collect();
            vec![ConstValue {
                scalar: Some(ScalarType::Bool),
                lanes,
            }]
        }
        NodeKind::Convert { to } => {
            let (value, _) = &inputs[0];
            let lanes = value
                .lanes
                .iter()
                .map(|lane| coerce_lane(*lane, *to))
                .collect();
            vec![ConstValue {
                scalar: Some(*to),
                lanes,
            }]
        }
        NodeKind::Broadcast => {
            let (value, scalar) = &inputs[0];
            let target = {
                let pin = graph.output_pin(PinRef::new(node, 0)).unwrap();
                graph[pin].shape.map(|s| s.width).unwrap_or(value.width())
            };
            let zero = match scalar {
                s if s.is_float() => Lane::Float(0.0),
                ScalarType::Bool => Lane::Bool(false),
                _ => Lane::Int(0),
            };
            let mut lanes = value.lanes.clone();
            while (lanes.len() as u32) < target {
                lanes.push(zero);
            }
            vec![ConstValue {
                scalar: Some(*scalar),
                lanes,
            }]
        }
        NodeKind::Truncate => {
            let (value, scalar) = &inputs[0];
            let target = {
                let pin = graph.output_pin(PinRef::new(node, 0)).unwrap();
                graph[pin].shape.map(|s| s.width).unwrap_or(value.width())
            };
            let lanes = value.lanes.iter().copied().take(target as usize).collect();
            vec![ConstValue {
                scalar: Some(*scalar),
                lanes,
            }]
        }
        NodeKind::Merge { .. } => {
            let scalar = out_scalar(0);
            let lanes = inputs
                .iter()
                .flat_map(|(value, _)| value.lanes.iter().copied())
                .collect();
            vec![ConstValue {
                scalar: Some(scalar),
                lanes,
            }]
        }
        NodeKind::Split { widths } => {
            let (value, scalar) = &inputs[0];
            let mut outputs = Vec::with_capacity(widths.len());
            let mut cursor = 0usize;
            for width in widths {
                let lanes = value.lanes[cursor..cursor + *width as usize]
                    .iter()
                    .copied()
                    .collect();
                cursor += *width as usize;
                outputs.push(ConstValue {
                    scalar: Some(*scalar),
                    lanes,
                });
            }
            outputs
        }
        NodeKind::Slice { start, end } => {
            let (value, scalar) = &inputs[0];
            let end = end.unwrap_or(value.width());
            let lanes = value.lanes[*start as usize..end as usize]
                .iter()
                .copied()
                .collect();
            vec![ConstValue {
                scalar: Some(*scalar),
                lanes,
            }]
        }
        NodeKind::If => {
            let (condition, _) = &inputs[0];
            let (then, scalar) = &inputs[1];
            let (otherwise, _) = &inputs[2];
            let lanes = condition
                .lanes
                .iter()
                .enumerate()
                .map(|(channel, lane)| {
                    if lane_truth(*lane) {
                        then.lanes[channel]
                    } else {
                        otherwise.lanes[channel]
                    }
                })
                .collect();
            vec![ConstValue {
                scalar: Some(*scalar),
                lanes,
            }]
        }
        NodeKind::Select { arity } => {
            // A constant out-of-range index clamps to the nearest choice.
            let index = lane_to_int(inputs[0].0.lanes[0])
                .max(0)
                .min(*arity as i128 - 1) as usize;
            let (choice, scalar) = &inputs[1 + index];
            vec![ConstValue {
                scalar: Some(*scalar),
                lanes: choice.lanes.clone(),
            }]
        }
        _ => unreachable!("not a foldable kind"),
    };
    Ok(outputs)
}

fn unary_lane(op: UnaryKind, lane: Lane, scalar: ScalarType) -> Result<Lane, FoldError> {
    let lane = match op {
        UnaryKind::Negate => match lane {
            Lane::Int(v) => Lane::Int(-v),
            Lane::Float(v) => Lane::Float(-v),
            Lane::Bool(_) => lane,
        },
        UnaryKind::Not => Lane::Bool(!lane_truth(lane)),
        UnaryKind::BitNot => match lane {
            Lane::Int(v) => Lane::Int(!v),
            Lane::Bool(b) => Lane::Bool(!b),
            Lane::Float(_) => lane,
        },
        UnaryKind::Sin => Lane::Float(lane.as_f64().sin()),
        UnaryKind::Cos => Lane::Float(lane.as_f64().cos()),
        UnaryKind::Tan => Lane::Float(lane.as_f64().tan()),
    };
    Ok(coerce_lane(lane, scalar))
}

fn shift_lane(
    op: BinaryKind,
    lane: Lane,
    amount: i128,
    scalar: ScalarType,
) -> Result<Lane, FoldError> {
    let bits = match scalar {
        ScalarType::I32 => 32,
        _ => 64,
    };
    // Shift amounts wrap at the type width, as the hardware does.
    let amount = (amount.rem_euclid(bits)) as u32;
    let value = lane_to_int(lane);
    let shifted = match op {
        BinaryKind::ShiftLeft => value << amount,
        BinaryKind::ShiftRight => value >> amount,
        _ => unreachable!(),
    };
    Ok(coerce_lane(Lane::Int(shifted), scalar))
}

fn binary_lane(
    op: BinaryKind,
    lhs: Lane,
    rhs: Lane,
    scalar: ScalarType,
) -> Result<Lane, FoldError> {
    use BinaryKind::*;
    if op.is_comparison() {
        let result = if scalar.is_float() {
            let (l, r) = (lhs.as_f64(), rhs.as_f64());
            match op {
                Less => l < r,
                LessEqual => l <= r,
                Greater => l > r,
                GreaterEqual => l >= r,
                Equal => l == r,
                NotEqual => l != r,
                _ => unreachable!(),
            }
        } else {
            let (l, r) = (lane_to_int(lhs), lane_to_int(rhs));
            match op {
                Less => l < r,
                LessEqual => l <= r,
                Greater => l > r,
                GreaterEqual => l >= r,
                Equal => l == r,
                NotEqual => l != r,
                _ => unreachable!(),
            }
        };
        return Ok(Lane::Bool(result));
    }

    let lane = if scalar.is_float() {
        let (l, r) = (lhs.as_f64(), rhs.as_f64());
        let value = match op {
            Add => l + r,
            Sub => l - r,
            Mul => l * r,
            Div => l / r,
            Rem => l % r,
            _ => {
                return Err(FoldError::new(
                    DiagnosticCode::NotFoldable,
                    "bitwise operation on a float value",
                ))
            }
        };
        Lane::Float(value)
    } else if scalar == ScalarType::Bool {
        let (l, r) = (lane_truth(lhs), lane_truth(rhs));
        let value = match op {
            BitAnd => l && r,
            BitOr => l || r,
            BitXor => l != r,
            _ => {
                return Err(FoldError::new(
                    DiagnosticCode::NotFoldable,
                    "arithmetic on a bool value",
                ))
            }
        };
        Lane::Bool(value)
    } else {
        let (l, r) = (lane_to_int(lhs), lane_to_int(rhs));
        let value = match op {
            Add => l.wrapping_add(r),
            Sub => l.wrapping_sub(r),
            Mul => l.wrapping_mul(r),
            Div => {
                if r == 0 {
                    return Err(FoldError::new(
                        DiagnosticCode::DivisionByZero,
                        "constant division by zero",
                    ));
                }
                l.wrapping_div(r)
            }
            Rem => {
                if r == 0 {
                    return Err(FoldError::new(
                        DiagnosticCode::DivisionByZero,
                        "constant remainder by zero",
                    ));
                }
                l.wrapping_rem(r)
            }
            BitAnd => l & r,
            BitOr => l | r,
            BitXor => l ^ r,
            _ => unreachable!(),
        };
        Lane::Int(value)
    };
    Ok(coerce_lane(lane, scalar))
}

//-------------------------------------------------------------------------------------------------
// Replacement

/// Replaces a folded node with one literal per output, moving its outgoing edges over.  The
/// folded node keeps its incoming edges until the dead sweep prunes them.
fn replace_with_literals(graph: &mut WaveGraph, node: Handle<Node>, values: Vec<ConstValue>) {
    let stage = graph[node].stage.into_option();
    let span = graph[node].span;
    for (index, value) in values.into_iter().enumerate() {
        let literal = builtins::instantiate(graph, NodeKind::Literal(value), stage, span);
        let pin = graph.output_pin(PinRef::new(literal, 0)).unwrap();
        graph[pin].rate = Some(Rate::Constant);
        graph.redirect_sources(
            PinRef::new(node, index as u32),
            PinRef::new(literal, 0),
        );
        if index == 0 {
            for buffer in graph.iter_buffers().collect::<Vec<_>>() {
                if graph[buffer].capacity_node == Some(node) {
                    graph[buffer].capacity_node = Some(literal);
                }
            }
        }
    }
    graph.mark_dead(node);
}

//-------------------------------------------------------------------------------------------------
// Buffer capacities and constant delays

fn resolve_capacities(graph: &mut WaveGraph, sink: &mut DiagnosticSink) {
    let buffers: Vec<_> = graph.iter_buffers().collect();
    for buffer in buffers {
        let (capacity_node, span) = {
            let def = &graph[buffer];
            (def.capacity_node, def.span)
        };
        let node = match capacity_node {
            Some(node) => node,
            None => continue, // the validator already reported this
        };
        let capacity = match &graph[node].kind {
            NodeKind::Literal(value) => value.as_index(),
            _ => {
                // A sample- or block-rate capacity was already a rate error; only complain here
                // when the capacity was constant-rate but still did not fold.
                if !sink.has_errors() {
                    sink.error(
                        DiagnosticCode::NotFoldable,
                        span,
                        "a buffer capacity must fold to a constant",
                    );
                }
                continue;
            }
        };
        match capacity {
            Some(capacity) if capacity > 0 => {
                graph[buffer].capacity = Some(capacity);
            }
            _ => {
                sink.error(
                    DiagnosticCode::BadBufferCapacity,
                    span,
                    "a buffer capacity must be a positive integer",
                );
            }
        }
    }
}

/// Rejects `delread(buf, k)` at compile time when both `k` and the capacity are constants and
/// the read cannot fit.  Non-constant delays clamp at runtime instead.
fn check_constant_delays(graph: &WaveGraph, sink: &mut DiagnosticSink) {
    for node in graph.iter_live_nodes() {
        let buffer = match graph[node].kind {
            NodeKind::DelRead { buffer } => buffer,
            _ => continue,
        };
        let capacity = match graph[buffer].capacity {
            Some(capacity) => capacity,
            None => continue,
        };
        let delay_edge = match graph.edges_into(PinRef::new(node, 0)).next() {
            Some(edge) => edge,
            None => continue,
        };
        let delay = match &graph[delay_edge.source.node].kind {
            NodeKind::Literal(value) => match value.lanes.as_slice() {
                [Lane::Int(v)] => *v,
                _ => continue,
            },
            _ => continue,
        };
        if delay < 0 || delay >= capacity as i128 {
            sink.error(
                DiagnosticCode::DelayExceedsCapacity,
                graph[node].span,
                format!(
                    "constant delay {} does not fit a buffer of capacity {}",
                    delay, capacity
                ),
            );
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Dead sweep

/// Dead-marks pure nodes whose outputs nothing consumes any more: the interiors of folded
/// subgraphs, and literals that only fed a capacity or a folded consumer.  Runs to fixpoint,
/// then prunes every edge touching a dead node.
fn sweep_dead(graph: &mut WaveGraph) {
    loop {
        let mut marked = false;
        let candidates: Vec<Handle<Node>> = graph
            .iter_live_nodes()
            .filter(|node| {
                let kind = &graph[*node].kind;
                is_foldable_kind(kind) || matches!(kind, NodeKind::Literal(_))
            })
            .collect();
        for node in candidates {
            let output_count = graph[node].outputs().len();
            let consumed = (0..output_count).any(|index| {
                graph
                    .edges_out_of(PinRef::new(node, index))
                    .any(|edge| !graph.is_dead(edge.sink.node))
            });
            if !consumed {
                graph.mark_dead(node);
                marked = true;
            }
        }
        if !marked {
            break;
        }
    }
    graph.prune_dead_edges();
}
