// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Type and rate inference.
//!
//! Two-phase unification over the graph.  The first phase resolves every pin's _shape_
//! (scalar type and channel count): widths unify by equality along edges and across the pins of
//! width-preserving nodes, while scalars unify by promoting to the join of the lattice
//! `i32 ≤ i64`, `f32 ≤ f64` (integers never promote to floats implicitly).  Where an edge ends up
//! connecting two different scalars, an explicit [`Convert`][] adapter node is spliced in; the
//! adapters are ordinary nodes in the final IR.
//!
//! An unsuffixed literal starts as a type variable and must be resolved by context: a resolved
//! destination resolves an unresolved source through the edge, and a handful of pins carry a
//! context default of their own (a conversion's input resolves to its target, `select` indices
//! and `delread` delays to `i32`, transcendental and filter pins to `f64`).  A literal that is
//! still unresolved after the fixpoint is a shape error.
//!
//! The second phase propagates _rates_ bottom-up, taking the maximum (`C < B < S`) of dependency
//! rates except where a kind pins its output rate (external inputs, `delread`, RNGs, cells, stage
//! outputs are sample rate; literals are constant).
//!
//! Once shapes are known, fan-in is materialized: two or more edges into one numeric pin become
//! an n-ary [`Sum`][] node, two or more into one bool pin an n-ary [`Or`][] node.
//!
//! [`Convert`]: ../graph/enum.NodeKind.html
//! [`Sum`]: ../graph/enum.NodeKind.html
//! [`Or`]: ../graph/enum.NodeKind.html

use fxhash::FxHashMap;

use crate::arena::Handle;
use crate::arena::SupplementalArena;
use crate::diagnostics::DiagnosticCode;
use crate::diagnostics::DiagnosticSink;
use crate::graph::BinaryKind;
use crate::graph::Direction;
use crate::graph::Edge;
use crate::graph::Node;
use crate::graph::NodeKind;
use crate::graph::Pin;
use crate::graph::PinRef;
use crate::graph::UnaryKind;
use crate::graph::WaveGraph;
use crate::span::Span;
use crate::types::Rate;
use crate::types::ScalarType;
use crate::types::Shape;

/// Runs shape inference, adapter insertion, fan-in materialization, and rate inference.
pub fn infer(graph: &mut WaveGraph, sink: &mut DiagnosticSink) {
    let mut engine = Engine::new(graph);
    engine.constrain_widths(sink);
    engine.solve_widths(sink);
    engine.constrain_scalars(sink);
    engine.solve_scalars(sink);
    engine.check_width_ops(sink);
    engine.write_shapes(sink);
    let had_errors = sink.has_errors();
    drop(engine);
    if !had_errors {
        insert_adapters(graph);
        materialize_fan_in(graph);
    }
    infer_rates(graph);
}

//-------------------------------------------------------------------------------------------------
// Union-find

#[derive(Clone, Copy, Default)]
struct WidthClass {
    width: Option<u32>,
}

#[derive(Clone, Copy, Default)]
struct ScalarClass {
    scalar: Option<ScalarType>,
    /// A locked class is exact (a declaration or a kind's fixed type); joining a larger scalar
    /// into it is an error rather than a promotion.
    locked: bool,
}

struct UnionFind<C> {
    parent: Vec<u32>,
    classes: Vec<C>,
}

impl<C: Copy + Default> UnionFind<C> {
    fn new(len: usize) -> UnionFind<C> {
        UnionFind {
            parent: (0..len as u32).collect(),
            classes: vec![C::default(); len],
        }
    }

    fn find(&mut self, index: u32) -> u32 {
        let mut root = index;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        let mut cursor = index;
        while self.parent[cursor as usize] != root {
            let next = self.parent[cursor as usize];
            self.parent[cursor as usize] = root;
            cursor = next;
        }
        root
    }

    fn class(&mut self, index: u32) -> C {
        let root = self.find(index);
        self.classes[root as usize]
    }

    fn set_class(&mut self, index: u32, class: C) {
        let root = self.find(index);
        self.classes[root as usize] = class;
    }

    /// Merges the classes of `a` and `b`, combining their values with `merge`.
    fn union<E>(
        &mut self,
        a: u32,
        b: u32,
        merge: impl FnOnce(C, C) -> Result<C, E>,
    ) -> Result<(), E> {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return Ok(());
        }
        let merged = merge(self.classes[ra as usize], self.classes[rb as usize])?;
        self.parent[rb as usize] = ra;
        self.classes[ra as usize] = merged;
        Ok(())
    }
}

//-------------------------------------------------------------------------------------------------
// The inference engine

/// Pending constraints that cannot be expressed as plain unification.
enum Pending {
    /// `merge`: output width is the sum of the input widths.
    MergeWidth(Handle<Node>),
    /// `slice`: output width is `end.unwrap_or(input) - start`.
    SliceWidth(Handle<Node>),
    /// `&`: mask semantics — `(T, bool)` is accepted alongside `(T, T)`.
    BitAnd(Handle<Node>),
}

struct Engine<'a> {
    graph: &'a mut WaveGraph,
    widths: UnionFind<WidthClass>,
    scalars: UnionFind<ScalarClass>,
    pending: Vec<Pending>,
    /// Pin → owning node, for diagnostics.
    owner: SupplementalArena<Pin, Handle<Node>>,
}

impl<'a> Engine<'a> {
    fn new(graph: &'a mut WaveGraph) -> Engine<'a> {
        let pin_count = graph.pin_count();
        let mut owner = SupplementalArena::new();
        for node in graph.iter_nodes() {
            for pin in graph[node].inputs().iter().chain(graph[node].outputs().iter()) {
                owner.set(pin, node);
            }
        }
        Engine {
            graph,
            widths: UnionFind::new(pin_count),
            scalars: UnionFind::new(pin_count),
            pending: Vec::new(),
            owner,
        }
    }

    fn pin(&self, pin_ref: PinRef, direction: Direction) -> Handle<Pin> {
        match direction {
            Direction::Input => self.graph.input_pin(pin_ref).unwrap(),
            Direction::Output => self.graph.output_pin(pin_ref).unwrap(),
        }
    }

    fn span_of(&self, pin: Handle<Pin>) -> Span {
        self.owner
            .get(pin)
            .map(|node| self.graph[*node].span)
            .unwrap_or_default()
    }

    //---------------------------------------------------------------------------------------------
    // Widths

    fn lock_width(&mut self, pin: Handle<Pin>, width: u32, sink: &mut DiagnosticSink) {
        let index = pin.as_dense() as u32;
        let class = self.widths.class(index);
        match class.width {
            Some(existing) if existing != width => {
                let span = self.span_of(pin);
                sink.error(
                    DiagnosticCode::WidthMismatch,
                    span,
                    format!("channel count mismatch: {} vs {}", existing, width),
                );
            }
            _ => self.widths.set_class(index, WidthClass { width: Some(width) }),
        }
    }

    fn union_widths(&mut self, a: Handle<Pin>, b: Handle<Pin>, sink: &mut DiagnosticSink) {
        let span = self.span_of(b);
        let result = self.widths.union(
            a.as_dense() as u32,
            b.as_dense() as u32,
            |left, right| match (left.width, right.width) {
                (Some(l), Some(r)) if l != r => Err((l, r)),
                (l, r) => Ok(WidthClass { width: l.or(r) }),
            },
        );
        if let Err((l, r)) = result {
            sink.error(
                DiagnosticCode::WidthMismatch,
                span,
                format!(
                    "channel count mismatch: {} vs {} (use broadcast/truncate to adapt widths)",
                    l, r
                ),
            );
        }
    }

    fn constrain_widths(&mut self, sink: &mut DiagnosticSink) {
        // Declared shapes lock their width classes.
        for node in self.graph.iter_nodes() {
            let pins: Vec<Handle<Pin>> = self.graph[node]
                .inputs()
                .iter()
                .chain(self.graph[node].outputs().iter())
                .collect();
            for pin in &pins {
                if let Some(shape) = self.graph[*pin].shape {
                    self.lock_width(*pin, shape.width, sink);
                }
            }

            let inputs: Vec<Handle<Pin>> = self.graph[node].inputs().iter().collect();
            let outputs: Vec<Handle<Pin>> = self.graph[node].outputs().iter().collect();
            match self.graph[node].kind.clone() {
                NodeKind::Literal(value) => {
                    self.lock_width(outputs[0], value.width(), sink);
                }
                NodeKind::Unary(_) | NodeKind::Convert { .. } => {
                    self.union_widths(inputs[0], outputs[0], sink);
                }
                NodeKind::Binary(op) if op.is_shift() => {
                    // The shift amount is an integral scalar.
                    self.union_widths(inputs[0], outputs[0], sink);
                    self.lock_width(inputs[1], 1, sink);
                }
                NodeKind::Binary(_) => {
                    self.union_widths(inputs[0], inputs[1], sink);
                    self.union_widths(inputs[0], outputs[0], sink);
                }
                NodeKind::If => {
                    // Element-wise choice: the condition is as wide as the result.
                    self.union_widths(inputs[0], outputs[0], sink);
                    self.union_widths(inputs[1], inputs[2], sink);
                    self.union_widths(inputs[1], outputs[0], sink);
                }
                NodeKind::Select { .. } => {
                    self.lock_width(inputs[0], 1, sink);
                    for choice in inputs[1..].iter() {
                        self.union_widths(*choice, outputs[0], sink);
                    }
                }
                NodeKind::Merge { .. } => {
                    self.pending.push(Pending::MergeWidth(node));
                }
                NodeKind::Split { widths } => {
                    let total: u32 = widths.iter().sum();
                    self.lock_width(inputs[0], total, sink);
                    for (output, width) in outputs.iter().zip(widths.iter()) {
                        self.lock_width(*output, *width, sink);
                    }
                }
                NodeKind::Slice { .. } => {
                    self.pending.push(Pending::SliceWidth(node));
                }
                NodeKind::Biquad(_) => {
                    self.union_widths(inputs[0], outputs[0], sink);
                    self.lock_width(inputs[1], 1, sink);
                    self.lock_width(inputs[2], 1, sink);
                }
                NodeKind::DelRead { .. } => {
                    self.lock_width(inputs[0], 1, sink);
                }
                // Broadcast and Truncate deliberately leave input and output unrelated; the
                // strict inequality is checked once both sides are resolved.
                _ => {}
            }
        }

        // An edge carries one value: source and sink widths are equal.
        let edges: Vec<Edge> = self.graph.iter_edges().collect();
        for edge in edges {
            let source = self.pin(edge.source, Direction::Output);
            let sink_pin = self.pin(edge.sink, Direction::Input);
            self.union_widths(source, sink_pin, sink);
        }
    }

    /// Iterates the sum-shaped width constraints (merge, slice) to fixpoint.
    fn solve_widths(&mut self, sink: &mut DiagnosticSink) {
        loop {
            let mut progressed = false;
            for index in 0..self.pending.len() {
                match self.pending[index] {
                    Pending::MergeWidth(node) => {
                        let inputs: Vec<Handle<Pin>> = self.graph[node].inputs().iter().collect();
                        let output = self.graph[node].outputs().iter().next().unwrap();
                        if self.widths.class(output.as_dense() as u32).width.is_some() {
                            continue;
                        }
                        let known: Option<u32> = inputs
                            .iter()
                            .map(|pin| self.widths.class(pin.as_dense() as u32).width)
                            .sum();
                        if let Some(total) = known {
                            self.lock_width(output, total, sink);
                            progressed = true;
                        }
                    }
                    Pending::SliceWidth(node) => {
                        let input = self.graph[node].inputs().iter().next().unwrap();
                        let output = self.graph[node].outputs().iter().next().unwrap();
                        if self.widths.class(output.as_dense() as u32).width.is_some() {
                            continue;
                        }
                        let input_width =
                            match self.widths.class(input.as_dense() as u32).width {
                                Some(width) => width,
                                None => continue,
                            };
                        let (start, end) = match self.graph[node].kind {
                            NodeKind::Slice { start, end } => {
                                (start, end.unwrap_or(input_width))
                            }
                            _ => unreachable!(),
                        };
                        if start >= input_width || end > input_width || end <= start {
                            sink.error(
                                DiagnosticCode::SliceOutOfRange,
                                self.graph[node].span,
                                format!(
                                    "slice range [{}, {}) is out of range for {} channels",
                                    start, end, input_width
                                ),
                            );
                            // Pin the output anyway so one mistake doesn't cascade.
                            self.lock_width(output, 1, sink);
                        } else {
                            if let NodeKind::Slice { end: slot @ None, .. } =
                                &mut self.graph[node].kind
                            {
                                *slot = Some(end);
                            }
                            self.lock_width(output, end - start, sink);
                        }
                        progressed = true;
                    }
                    Pending::BitAnd(_) => {}
                }
            }
            if !progressed {
                break;
            }
        }
    }

    //---------------------------------------------------------------------------------------------
    // Scalars

    fn lock_scalar(&mut self, pin: Handle<Pin>, scalar: ScalarType, sink: &mut DiagnosticSink) {
        let index = pin.as_dense() as u32;
        let class = self.scalars.class(index);
        match class.scalar {
            Some(existing) if existing != scalar => {
                let span = self.span_of(pin);
                sink.error(
                    DiagnosticCode::ScalarMismatch,
                    span,
                    format!("scalar type mismatch: {} vs {}", existing, scalar),
                );
            }
            _ => self.scalars.set_class(
                index,
                ScalarClass {
                    scalar: Some(scalar),
                    locked: true,
                },
            ),
        }
    }

    fn union_scalars(&mut self, a: Handle<Pin>, b: Handle<Pin>, sink: &mut DiagnosticSink) {
        let span = self.span_of(b);
        let result = self.scalars.union(
            a.as_dense() as u32,
            b.as_dense() as u32,
            |left, right| {
                let scalar = match (left.scalar, right.scalar) {
                    (Some(l), Some(r)) => match l.join(r) {
                        Some(joined) => {
                            // Raising a locked class is not a promotion; it is a mismatch.
                            if (left.locked && joined != l) || (right.locked && joined != r) {
                                return Err((l, r));
                            }
                            Some(joined)
                        }
                        None => return Err((l, r)),
                    },
                    (l, r) => l.or(r),
                };
                Ok(ScalarClass {
                    scalar,
                    locked: left.locked || right.locked,
                })
            },
        );
        if let Err((l, r)) = result {
            sink.error(
                DiagnosticCode::ScalarMismatch,
                span,
                format!(
                    "scalar type mismatch: {} vs {} (insert an explicit conversion)",
                    l, r
                ),
            );
        }
    }

    fn constrain_scalars(&mut self, sink: &mut DiagnosticSink) {
        for node in self.graph.iter_nodes() {
            let pins: Vec<Handle<Pin>> = self.graph[node]
                .inputs()
                .iter()
                .chain(self.graph[node].outputs().iter())
                .collect();
            for pin in &pins {
                if let Some(shape) = self.graph[*pin].shape {
                    self.lock_scalar(*pin, shape.scalar, sink);
                }
            }

            let inputs: Vec<Handle<Pin>> = self.graph[node].inputs().iter().collect();
            let outputs: Vec<Handle<Pin>> = self.graph[node].outputs().iter().collect();
            match self.graph[node].kind.clone() {
                NodeKind::Literal(value) => {
                    if let Some(scalar) = value.scalar {
                        self.lock_scalar(outputs[0], scalar, sink);
                    }
                }
                NodeKind::Unary(UnaryKind::Not) => {
                    self.union_scalars(inputs[0], outputs[0], sink);
                    self.lock_scalar(outputs[0], ScalarType::Bool, sink);
                }
                NodeKind::Unary(UnaryKind::Sin)
                | NodeKind::Unary(UnaryKind::Cos)
                | NodeKind::Unary(UnaryKind::Tan) => {
                    self.union_scalars(inputs[0], outputs[0], sink);
                }
                NodeKind::Unary(_) => {
                    self.union_scalars(inputs[0], outputs[0], sink);
                }
                NodeKind::Binary(op) if op.is_comparison() => {
                    self.union_scalars(inputs[0], inputs[1], sink);
                    self.lock_scalar(outputs[0], ScalarType::Bool, sink);
                }
                NodeKind::Binary(op) if op.is_shift() => {
                    self.union_scalars(inputs[0], outputs[0], sink);
                }
                NodeKind::Binary(BinaryKind::BitAnd) => {
                    self.pending.push(Pending::BitAnd(node));
                }
                NodeKind::Binary(_) => {
                    self.union_scalars(inputs[0], inputs[1], sink);
                    self.union_scalars(inputs[0], outputs[0], sink);
                }
                NodeKind::Convert { to } => {
                    self.lock_scalar(outputs[0], to, sink);
                }
                NodeKind::Broadcast
                | NodeKind::Truncate
                | NodeKind::Slice { .. } => {
                    self.union_scalars(inputs[0], outputs[0], sink);
                }
                NodeKind::Merge { .. } => {
                    for input in &inputs {
                        self.union_scalars(*input, outputs[0], sink);
                    }
                }
                NodeKind::Split { .. } => {
                    for output in &outputs {
                        self.union_scalars(inputs[0], *output, sink);
                    }
                }
                NodeKind::If => {
                    self.lock_scalar(inputs[0], ScalarType::Bool, sink);
                    self.union_scalars(inputs[1], inputs[2], sink);
                    self.union_scalars(inputs[1], outputs[0], sink);
                }
                NodeKind::Select { .. } => {
                    for choice in inputs[1..].iter() {
                        self.union_scalars(*choice, outputs[0], sink);
                    }
                }
                NodeKind::Biquad(_) => {
                    self.union_scalars(inputs[0], outputs[0], sink);
                }
                _ => {}
            }
        }
    }

    /// Propagates scalars along edges to fixpoint, then applies context defaults and repeats
    /// until neither makes progress.
    fn solve_scalars(&mut self, sink: &mut DiagnosticSink) {
        let edges: Vec<Edge> = self.graph.iter_edges().collect();
        let mut poisoned: Vec<bool> = vec![false; edges.len()];
        loop {
            loop {
                let mut progressed = false;
                for (index, edge) in edges.iter().enumerate() {
                    if poisoned[index] {
                        continue;
                    }
                    let source = self.pin(edge.source, Direction::Output);
                    let sink_pin = self.pin(edge.sink, Direction::Input);
                    let src = self.scalars.class(source.as_dense() as u32);
                    let dst = self.scalars.class(sink_pin.as_dense() as u32);
                    match (src.scalar, dst.scalar) {
                        (Some(s), Some(d)) => {
                            match s.join(d) {
                                // The edge will carry a promotion adapter; nothing to propagate.
                                Some(joined) if joined == d => {}
                                Some(joined) if !dst.locked => {
                                    self.scalars.set_class(
                                        sink_pin.as_dense() as u32,
                                        ScalarClass {
                                            scalar: Some(joined),
                                            locked: dst.locked,
                                        },
                                    );
                                    progressed = true;
                                }
                                _ => {
                                    poisoned[index] = true;
                                    sink.error(
                                        DiagnosticCode::ScalarMismatch,
                                        self.graph[edge.sink.node].span,
                                        format!(
                                            "cannot implicitly convert {} to {} \
                                             (insert an explicit conversion)",
                                            s, d
                                        ),
                                    );
                                }
                            }
                        }
                        // A resolved destination resolves an unresolved source: this is how an
                        // unsuffixed literal takes its type from context.
                        (None, Some(d)) => {
                            self.scalars.set_class(
                                source.as_dense() as u32,
                                ScalarClass {
                                    scalar: Some(d),
                                    locked: false,
                                },
                            );
                            progressed = true;
                        }
                        (Some(s), None) => {
                            self.scalars.set_class(
                                sink_pin.as_dense() as u32,
                                ScalarClass {
                                    scalar: Some(s),
                                    locked: false,
                                },
                            );
                            progressed = true;
                        }
                        (None, None) => {}
                    }
                }
                if !self.resolve_bitand(sink) && !progressed {
                    break;
                }
            }
            if !self.apply_context_defaults() {
                break;
            }
        }
    }

    /// Mask semantics for `&`: alongside `(T, T)`, the operator accepts `(T, bool)` meaning
    /// "T or zero-of-T".  The choice has to wait until the operand scalars are known.
    fn resolve_bitand(&mut self, sink: &mut DiagnosticSink) -> bool {
        let mut progressed = false;
        let mut index = 0;
        while index < self.pending.len() {
            let node = match self.pending[index] {
                Pending::BitAnd(node) => node,
                _ => {
                    index += 1;
                    continue;
                }
            };
            let inputs: Vec<Handle<Pin>> = self.graph[node].inputs().iter().collect();
            let outputs: Vec<Handle<Pin>> = self.graph[node].outputs().iter().collect();
            let lhs = self.scalars.class(inputs[0].as_dense() as u32).scalar;
            let rhs = self.scalars.class(inputs[1].as_dense() as u32).scalar;
            let (lhs, rhs) = match (lhs, rhs) {
                (Some(l), Some(r)) => (l, r),
                _ => {
                    index += 1;
                    continue;
                }
            };
            match (lhs, rhs) {
                (ScalarType::Bool, ScalarType::Bool) => {
                    self.union_scalars(inputs[0], outputs[0], sink);
                }
                (other, ScalarType::Bool) | (ScalarType::Bool, other) if other.is_numeric() => {
                    let masked = if lhs == ScalarType::Bool {
                        inputs[1]
                    } else {
                        inputs[0]
                    };
                    self.union_scalars(masked, outputs[0], sink);
                }
                (l, r) if l.is_integral() && r.is_integral() => {
                    self.union_scalars(inputs[0], inputs[1], sink);
                    self.union_scalars(inputs[0], outputs[0], sink);
                }
                (l, r) => {
                    sink.error(
                        DiagnosticCode::ScalarMismatch,
                        self.graph[node].span,
                        format!("`&` cannot be applied to {} and {}", l, r),
                    );
                }
            }
            self.pending.swap_remove(index);
            progressed = true;
        }
        progressed
    }

    /// Context defaults for pins that remain unresolved after propagation: a conversion's input
    /// resolves to its target type, index-like pins to `i32`, transcendental pins to `f64`, and
    /// buffer capacities to `i64`.
    fn apply_context_defaults(&mut self) -> bool {
        let mut defaults: Vec<(Handle<Pin>, ScalarType)> = Vec::new();

        for node in self.graph.iter_nodes() {
            let inputs: Vec<Handle<Pin>> = self.graph[node].inputs().iter().collect();
            match &self.graph[node].kind {
                NodeKind::Convert { to } => defaults.push((inputs[0], *to)),
                NodeKind::Select { .. } => defaults.push((inputs[0], ScalarType::I32)),
                NodeKind::DelRead { .. } => defaults.push((inputs[0], ScalarType::I32)),
                NodeKind::Unary(UnaryKind::Sin)
                | NodeKind::Unary(UnaryKind::Cos)
                | NodeKind::Unary(UnaryKind::Tan) => defaults.push((inputs[0], ScalarType::F64)),
                NodeKind::Biquad(_) => {
                    defaults.push((inputs[0], ScalarType::F64));
                    defaults.push((inputs[1], ScalarType::F64));
                    defaults.push((inputs[2], ScalarType::F64));
                }
                _ => {}
            }
        }
        let capacity_roots: Vec<Handle<Node>> = self
            .graph
            .iter_buffers()
            .filter_map(|buffer| self.graph[buffer].capacity_node)
            .collect();
        for node in capacity_roots {
            if let Some(pin) = self.graph[node].outputs().iter().next() {
                defaults.push((pin, ScalarType::I64));
            }
        }

        let mut progressed = false;
        for (pin, scalar) in defaults {
            let index = pin.as_dense() as u32;
            if self.scalars.class(index).scalar.is_none() {
                self.scalars.set_class(
                    index,
                    ScalarClass {
                        scalar: Some(scalar),
                        locked: false,
                    },
                );
                progressed = true;
            }
        }
        progressed
    }

    //---------------------------------------------------------------------------------------------
    // Width-op checks and shape write-back

    fn check_width_ops(&mut self, sink: &mut DiagnosticSink) {
        for node in self.graph.iter_nodes() {
            let kind = match &self.graph[node].kind {
                NodeKind::Broadcast => NodeKind::Broadcast,
                NodeKind::Truncate => NodeKind::Truncate,
                _ => continue,
            };
            let input = self.graph[node].inputs().iter().next().unwrap();
            let output = self.graph[node].outputs().iter().next().unwrap();
            let input_width = self.widths.class(input.as_dense() as u32).width;
            let output_width = self.widths.class(output.as_dense() as u32).width;
            let span = self.graph[node].span;
            match (kind, input_width, output_width) {
                (NodeKind::Broadcast, Some(narrow), Some(wide)) if wide <= narrow => {
                    sink.error(
                        DiagnosticCode::BroadcastNotWider,
                        span,
                        format!("broadcast from {} to {} channels does not widen", narrow, wide),
                    );
                }
                (NodeKind::Truncate, Some(wide), Some(narrow)) if narrow >= wide => {
                    sink.error(
                        DiagnosticCode::TruncateNotNarrower,
                        span,
                        format!(
                            "truncate from {} to {} channels does not narrow",
                            wide, narrow
                        ),
                    );
                }
                _ => {}
            }
        }
    }

    /// Writes every pin's resolved shape back into the graph; anything unresolved is a shape
    /// error.
    fn write_shapes(&mut self, sink: &mut DiagnosticSink) {
        pass_debugging!("infer: writing {} pin shapes", self.graph.pin_count());
        for node in self.graph.iter_nodes() {
            let pins: Vec<Handle<Pin>> = self.graph[node]
                .inputs()
                .iter()
                .chain(self.graph[node].outputs().iter())
                .collect();
            for pin in pins {
                let width = self.widths.class(pin.as_dense() as u32).width;
                let scalar = self.scalars.class(pin.as_dense() as u32).scalar;
                match (scalar, width) {
                    (Some(scalar), Some(width)) => {
                        self.graph[pin].shape = Some(Shape::new(scalar, width));
                    }
                    _ => {
                        let span = self.graph[node].span;
                        sink.error(
                            DiagnosticCode::UnresolvedShape,
                            span,
                            "the shape of this value cannot be resolved from context",
                        );
                    }
                }
            }
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Adapters

/// Splices a `Convert` node into every edge whose endpoints resolved to different scalars.  By
/// this point mismatches that are not strict promotions have already been rejected.
fn insert_adapters(graph: &mut WaveGraph) {
    let edges: Vec<(usize, Edge)> = graph.iter_edges().enumerate().collect();
    let mut adapted = 0usize;
    for (index, edge) in edges {
        let source_pin = graph.input_or_output(edge.source, Direction::Output);
        let sink_pin = graph.input_or_output(edge.sink, Direction::Input);
        let source_shape = graph[source_pin].shape.unwrap();
        let sink_shape = graph[sink_pin].shape.unwrap();
        if source_shape.scalar == sink_shape.scalar {
            continue;
        }
        debug_assert!(source_shape.scalar.promotes_to(sink_shape.scalar));
        let stage = graph[edge.sink.node].stage.into_option();
        let span = graph[edge.sink.node].span;
        let adapter = graph.add_node(
            NodeKind::Convert {
                to: sink_shape.scalar,
            },
            stage,
            span,
        );
        graph.add_input_pin(adapter, None, Some(source_shape), true);
        graph.add_output_pin(adapter, None, Some(sink_shape));
        graph.retarget_edge(index, PinRef::new(adapter, 0));
        graph.add_edge(PinRef::new(adapter, 0), edge.sink);
        adapted += 1;
    }
    pass_debugging!("infer: inserted {} promotion adapters", adapted);
}

//-------------------------------------------------------------------------------------------------
// Fan-in

/// Replaces multi-edge fan-in with explicit junction nodes: `Sum` for numeric pins, `Or` for
/// bool pins.  Fan-in is commutative, so edge order does not matter.
fn materialize_fan_in(graph: &mut WaveGraph) {
    let mut sinks: FxHashMap<PinRef, Vec<usize>> = FxHashMap::default();
    for (index, edge) in graph.iter_edges().enumerate() {
        sinks.entry(edge.sink).or_default().push(index);
    }
    // Deterministic junction order keeps emitted node ids stable across runs.
    let mut sinks: Vec<(PinRef, Vec<usize>)> = sinks.into_iter().collect();
    sinks.sort_by_key(|(pin_ref, _)| *pin_ref);
    let mut junctions = 0usize;
    for (sink_ref, edge_indices) in sinks {
        if edge_indices.len() < 2 {
            continue;
        }
        let sink_pin = graph.input_or_output(sink_ref, Direction::Input);
        let shape = graph[sink_pin].shape.unwrap();
        let arity = edge_indices.len() as u32;
        let kind = if shape.scalar == ScalarType::Bool {
            NodeKind::Or { arity }
        } else {
            NodeKind::Sum { arity }
        };
        let stage = graph[sink_ref.node].stage.into_option();
        let span = graph[sink_ref.node].span;
        let junction = graph.add_node(kind, stage, span);
        for _ in 0..arity {
            graph.add_input_pin(junction, None, Some(shape), true);
        }
        graph.add_output_pin(junction, None, Some(shape));
        for (position, edge_index) in edge_indices.into_iter().enumerate() {
            graph.retarget_edge(edge_index, PinRef::new(junction, position as u32));
        }
        graph.add_edge(PinRef::new(junction, 0), sink_ref);
        junctions += 1;
    }
    pass_debugging!("infer: materialized {} fan-in junctions", junctions);
}

//-------------------------------------------------------------------------------------------------
// Rates

/// Bottom-up rate propagation: each output takes the max of the node's input rates unless the
/// kind pins it; each input takes the max of its incoming sources (constant when unconnected).
/// Monotone, so a plain fixpoint loop terminates.
fn infer_rates(graph: &mut WaveGraph) {
    // Property rates come from their declarations.
    let mut property_rates: Vec<(Handle<Node>, Rate)> = Vec::new();
    for node in graph.iter_nodes() {
        if let NodeKind::Property(index) = graph[node].kind {
            let rate = graph.externals.properties[index as usize].rate;
            property_rates.push((node, rate));
        }
    }
    for (node, rate) in property_rates {
        let pin = graph[node].outputs().get(0);
        if let Some(pin) = pin {
            graph[pin].rate = Some(rate);
        }
    }

    loop {
        let mut progressed = false;
        for node in graph.iter_nodes() {
            let inputs: Vec<Handle<Pin>> = graph[node].inputs().iter().collect();
            let outputs: Vec<Handle<Pin>> = graph[node].outputs().iter().collect();

            // Input rate: the max of the incoming sources.
            for (index, pin) in inputs.iter().enumerate() {
                if graph[*pin].rate.is_some() {
                    continue;
                }
                let sink_ref = PinRef::new(node, index as u32);
                let mut rate = Rate::Constant;
                let mut ready = true;
                for edge in graph.edges_into(sink_ref) {
                    let source_pin = graph.input_or_output(edge.source, Direction::Output);
                    match graph[source_pin].rate {
                        Some(source_rate) => rate = rate.max(source_rate),
                        None => ready = false,
                    }
                }
                if ready {
                    graph[*pin].rate = Some(rate);
                    progressed = true;
                }
            }

            // Output rate: pinned by the kind, or the max of the inputs.
            let pinned = graph[node].kind.rate_override();
            for pin in &outputs {
                if graph[*pin].rate.is_some() {
                    continue;
                }
                if let Some(rate) = pinned {
                    graph[*pin].rate = Some(rate);
                    progressed = true;
                    continue;
                }
                let mut rate = Rate::Constant;
                let mut ready = true;
                for input in &inputs {
                    match graph[*input].rate {
                        Some(input_rate) => rate = rate.max(input_rate),
                        None => ready = false,
                    }
                }
                if ready {
                    graph[*pin].rate = Some(rate);
                    progressed = true;
                }
            }
        }
        if !progressed {
            break;
        }
    }
}
