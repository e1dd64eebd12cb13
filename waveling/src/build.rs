// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! The graph builder: lowers expressions and routing statements into graph IR.
//!
//! Nodes are built eagerly as expressions are reduced; each operator and built-in maps to a node
//! kind with a fixed bundle shape.  `A -> B` connects per the operand-kind table of the routing
//! semantics (node/pin/bundle on either side) and evaluates to its destination operand, which is
//! what makes `a -> b -> c` chain.  `A <- B` was already swapped by the parser.
//!
//! Fan-in is represented plainly as multiple edges into one pin at this point; the inferencer
//! materializes sum/or junction nodes once scalar types are known.  After every stage is lowered,
//! any output pin nothing consumes gets an edge into a [`Discard`][] sink, so evaluation order
//! and "everything executes" semantics survive into the IR.
//!
//! [`Discard`]: ../graph/enum.NodeKind.html

use fxhash::FxHashSet;
use smallvec::SmallVec;

use crate::arena::Handle;
use crate::ast;
use crate::ast::ExprKind;
use crate::builtins;
use crate::builtins::Builtin;
use crate::diagnostics::DiagnosticCode;
use crate::diagnostics::DiagnosticSink;
use crate::graph::BinaryKind;
use crate::graph::BiquadMode;
use crate::graph::BufferDef;
use crate::graph::ConstValue;
use crate::graph::Node;
use crate::graph::NodeKind;
use crate::graph::PinRef;
use crate::graph::Stage;
use crate::graph::Symbol;
use crate::graph::UnaryKind;
use crate::graph::WaveGraph;
use crate::resolve::Binding;
use crate::resolve::ScopeStack;
use crate::span::Span;
use crate::types::ScalarType;
use crate::types::Shape;

/// Lowers every stage body into the graph.  Declaration collection must already have run.
pub fn build(
    graph: &mut WaveGraph,
    program: &ast::SourceProgram,
    scopes: &mut ScopeStack,
    sink: &mut DiagnosticSink,
) {
    for decl in &program.stages {
        let stage = match find_stage(graph, &decl.name.name) {
            Some(stage) => stage,
            None => continue, // declaration collection already diagnosed this
        };
        let mut builder = Builder {
            graph: &mut *graph,
            scopes: &mut *scopes,
            sink: &mut *sink,
            stage,
            assigned: FxHashSet::default(),
        };
        builder.lower_stage(decl);
    }
    wire_discards(graph);
}

fn find_stage(graph: &WaveGraph, name: &str) -> Option<Handle<Stage>> {
    graph
        .iter_stages()
        .find(|stage| graph[graph[*stage].name] == *name)
}

/// Adds a `Discard` sink edge for every live output pin with no consumers.  Buffer capacity
/// expressions are compile-time values, not signals, so their root nodes are exempt.
fn wire_discards(graph: &mut WaveGraph) {
    let capacity_roots: FxHashSet<Handle<Node>> = graph
        .iter_buffers()
        .filter_map(|buffer| graph[buffer].capacity_node)
        .collect();

    let mut dangling: Vec<PinRef> = Vec::new();
    for node in graph.iter_nodes() {
        if capacity_roots.contains(&node) {
            continue;
        }
        for index in 0..graph[node].outputs().len() {
            let source = PinRef::new(node, index);
            if graph.edges_out_of(source).next().is_none() {
                dangling.push(source);
            }
        }
    }

    for source in dangling {
        let stage = graph[source.node].stage.into_option();
        let span = graph[source.node].span;
        let discard = builtins::instantiate(graph, NodeKind::Discard, stage, span);
        graph.add_edge(source, PinRef::new(discard, 0));
    }
}

//-------------------------------------------------------------------------------------------------
// Lowered values

/// What an expression lowers to.  Routing and operator lowering coerce these into concrete pins;
/// anything that cannot be coerced in the position it is used is a diagnostic.
#[derive(Clone, Debug)]
enum Value {
    /// A node, usable on either side of an arrow (pin 0 of the relevant bundle).
    Node(Handle<Node>),
    /// `expr[i]` — the side decides whether `i` indexes inputs or outputs.
    Indexed {
        node: Handle<Node>,
        index: u32,
        index_span: Span,
    },
    /// A specific output pin.
    Output(PinRef),
    /// A specific input pin (destination position only).
    InputPin(PinRef),
    /// A cell's `end` name: destination only.
    CellEnd(Handle<Node>),
    /// A stage-output parameter inside its own stage: destination only.
    StageSink(Handle<Node>),
    /// A named pin whose side is not yet known: `node.frequency`.
    NamedPin {
        node: Handle<Node>,
        name: Handle<Symbol>,
        span: Span,
    },
    /// `node.inputs` / `node.outputs`, awaiting a pin name.
    InputsOf(Handle<Node>),
    OutputsOf(Handle<Node>),
    /// `stage.outputs`, awaiting an output name.
    StageOutputs(Handle<Stage>),
    Stage(Handle<Stage>),
    Buffer(Handle<BufferDef>),
    /// An unapplied built-in name.
    Builtin(Builtin),
    /// `biquad.lowpass` etc., awaiting a call.
    Biquad(BiquadMode),
    /// Output stacking: the component source pins, in channel order.
    StackVal(SmallVec<[PinRef; 2]>),
    /// A bundle literal; entries are routed individually.
    BundleVal(Vec<(Option<Handle<Symbol>>, PinRef, Span)>),
    /// An error already reported; suppresses cascading diagnostics.
    Poison,
}

//-------------------------------------------------------------------------------------------------
// The builder

struct Builder<'a> {
    graph: &'a mut WaveGraph,
    scopes: &'a mut ScopeStack,
    sink: &'a mut DiagnosticSink,
    stage: Handle<Stage>,
    /// Names assigned via `=` so far; a second `=` to the same name is rejected.
    assigned: FxHashSet<Handle<Symbol>>,
}

impl<'a> Builder<'a> {
    fn lower_stage(&mut self, decl: &ast::StageDecl) {
        self.scopes.enter_stage();
        self.assigned.clear();

        // Stage-output parameters are the stage scope's initial contents.
        let outputs: Vec<_> = self.graph[self.stage]
            .outputs()
            .iter()
            .map(|o| (o.name, o.node))
            .collect();
        for (name, node) in outputs {
            if !self.scopes.declare_in_stage(name, Binding::StageOutputSink(node)) {
                let span = self.graph[node].span;
                let name = self.graph[name].to_string();
                self.sink.error(
                    DiagnosticCode::RedeclaredName,
                    span,
                    format!("stage output `{}` is declared more than once", name),
                );
            }
        }

        for stmt in &decl.body {
            self.lower_stmt(stmt);
        }
    }

    fn lower_stmt(&mut self, stmt: &ast::Stmt) {
        match stmt {
            ast::Stmt::Let { name, value, span } => self.lower_let(name, value, *span),
            ast::Stmt::Assign { name, value, span } => self.lower_assign(name, value, *span),
            ast::Stmt::Cell {
                delay,
                start,
                end,
                shape,
                span,
            } => self.lower_cell(delay, start, end, shape, *span),
            ast::Stmt::Buffer { name, capacity, .. } => self.lower_buffer(name, capacity),
            ast::Stmt::Expr(expr) => {
                self.lower_expr(expr);
            }
        }
    }

    fn lower_let(&mut self, name: &ast::Ident, value: &ast::Expr, _span: Span) {
        let value = self.lower_expr(value);
        let node = match value {
            Value::Node(node) => node,
            Value::Poison => return,
            _ => {
                self.sink.error(
                    DiagnosticCode::NotAssignable,
                    name.span,
                    format!(
                        "the right-hand side of `let {}` does not evaluate to a node",
                        name.name
                    ),
                );
                return;
            }
        };
        let symbol = self.graph.add_symbol(&name.name);
        if !self.scopes.declare_in_stage(symbol, Binding::Node(node)) {
            self.sink.error(
                DiagnosticCode::RedeclaredName,
                name.span,
                format!("`{}` is already declared in this scope", name.name),
            );
        }
    }

    /// `x = expr;` — legal only for a routable declaration of the same scope (a stage-output
    /// parameter or a cell `end`), at most once per name.
    fn lower_assign(&mut self, name: &ast::Ident, value: &ast::Expr, span: Span) {
        let symbol = self.graph.add_symbol(&name.name);
        let sink_pin = match self.scopes.lookup(self.graph, symbol) {
            Some(Binding::StageOutputSink(node)) | Some(Binding::CellEnd(node)) => {
                PinRef::new(node, 0)
            }
            Some(_) | None => {
                self.sink.error(
                    DiagnosticCode::NotAssignable,
                    name.span,
                    format!(
                        "`{}` is not an assignable declaration of this scope",
                        name.name
                    ),
                );
                return;
            }
        };
        if !self.assigned.insert(symbol) {
            self.sink.error(
                DiagnosticCode::NotAssignable,
                name.span,
                format!("`{}` is assigned more than once", name.name),
            );
            return;
        }
        let value = self.lower_expr(value);
        self.route_into_pin(value, sink_pin, span);
    }

    fn lower_cell(
        &mut self,
        delay: &Option<ast::IntField>,
        start: &ast::Ident,
        end: &ast::Ident,
        shape: &ast::ShapeAnnotation,
        span: Span,
    ) {
        let delay_samples = match delay {
            Some(field) => {
                if field.value == 0 {
                    self.sink.error(
                        DiagnosticCode::BadCellDelay,
                        field.span,
                        "a cell's delay must be at least one sample",
                    );
                    1
                } else {
                    field.value
                }
            }
            None => 1,
        };
        let node = builtins::instantiate(
            self.graph,
            NodeKind::Cell {
                delay: delay_samples,
            },
            Some(self.stage),
            span,
        );
        let declared = Shape::new(shape.scalar, shape.width);
        let end_pin = self.graph.input_pin(PinRef::new(node, 0)).unwrap();
        self.graph[end_pin].shape = Some(declared);
        let start_pin = self.graph.output_pin(PinRef::new(node, 0)).unwrap();
        self.graph[start_pin].shape = Some(declared);

        for (ident, binding) in [
            (start, Binding::CellStart(node)),
            (end, Binding::CellEnd(node)),
        ] {
            let symbol = self.graph.add_symbol(&ident.name);
            if !self.scopes.declare_in_stage(symbol, binding) {
                self.sink.error(
                    DiagnosticCode::RedeclaredName,
                    ident.span,
                    format!("`{}` is already declared in this scope", ident.name),
                );
            }
        }
    }

    fn lower_buffer(&mut self, name: &ast::Ident, capacity: &ast::Expr) {
        // The buffer itself was hoisted into program scope by declaration collection; here we
        // only lower its capacity expression.
        let symbol = self.graph.add_symbol(&name.name);
        let buffer = match self.scopes.lookup(self.graph, symbol) {
            Some(Binding::Buffer(buffer)) => buffer,
            _ => return,
        };
        let value = self.lower_expr(capacity);
        if let Some(source) = self.as_source(value, capacity.span) {
            self.graph[buffer].capacity_node = Some(source.node);
        }
    }

    //---------------------------------------------------------------------------------------------
    // Expressions

    fn lower_expr(&mut self, expr: &ast::Expr) -> Value {
        match &expr.kind {
            ExprKind::Integer { value, suffix } => {
                let node = self.literal(ConstValue::int(*value, *suffix), expr.span);
                Value::Node(node)
            }
            ExprKind::Float { value, suffix } => {
                let node = self.literal(ConstValue::float(*value, *suffix), expr.span);
                Value::Node(node)
            }
            ExprKind::Bool(value) => {
                let node = self.literal(ConstValue::bool(*value), expr.span);
                Value::Node(node)
            }
            ExprKind::Name { module, name } => self.lower_name(module.as_ref(), name),
            ExprKind::Member { base, member } => self.lower_member(base, member),
            ExprKind::Index {
                base,
                index,
                index_span,
            } => self.lower_index(base, *index, *index_span),
            ExprKind::Unary { op, operand } => self.lower_unary(*op, operand, expr.span),
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs, expr.span),
            ExprKind::Call { callee, args } => self.lower_call(callee, args, expr.span),
            ExprKind::Bundle { entries } => self.lower_bundle(entries),
            ExprKind::Stack { items } => self.lower_stack(items),
            ExprKind::Route { source, dest } => self.lower_route(source, dest),
        }
    }

    fn literal(&mut self, value: ConstValue, span: Span) -> Handle<Node> {
        builtins::instantiate(
            self.graph,
            NodeKind::Literal(value),
            Some(self.stage),
            span,
        )
    }

    fn lower_name(&mut self, module: Option<&ast::Ident>, name: &ast::Ident) -> Value {
        if let Some(module) = module {
            // The only module namespace today is `biquad`.
            if module.name == "biquad" {
                return match builtins::biquad_member(&name.name) {
                    Some(mode) => Value::Biquad(mode),
                    None => {
                        self.sink.error(
                            DiagnosticCode::InvalidPath,
                            name.span,
                            format!("`biquad` has no member `{}`", name.name),
                        );
                        Value::Poison
                    }
                };
            }
            self.sink.error(
                DiagnosticCode::InvalidPath,
                module.span,
                format!("`{}` is not a module", module.name),
            );
            return Value::Poison;
        }

        let symbol = self.graph.add_symbol(&name.name);
        match self.scopes.lookup(self.graph, symbol) {
            Some(Binding::Node(node)) => Value::Node(node),
            Some(Binding::CellStart(node)) => Value::Output(PinRef::new(node, 0)),
            Some(Binding::CellEnd(node)) => Value::CellEnd(node),
            Some(Binding::StageOutputSink(node)) => Value::StageSink(node),
            Some(Binding::Stage(stage)) => Value::Stage(stage),
            Some(Binding::Buffer(buffer)) => Value::Buffer(buffer),
            Some(Binding::Builtin(builtin)) => self.lower_builtin_name(builtin, name.span),
            None => {
                self.sink.error(
                    DiagnosticCode::UndeclaredName,
                    name.span,
                    format!("`{}` is not declared", name.name),
                );
                Value::Poison
            }
        }
    }

    /// A built-in used as a bare name.  Math constants and conversions denote nodes by
    /// themselves; everything else must be called.
    fn lower_builtin_name(&mut self, builtin: Builtin, span: Span) -> Value {
        match builtin {
            Builtin::MathConst(value) => {
                let node = self.literal(ConstValue::float(value, Some(ScalarType::F64)), span);
                Value::Node(node)
            }
            Builtin::Convert(to) => {
                let node = builtins::instantiate(
                    self.graph,
                    NodeKind::Convert { to },
                    Some(self.stage),
                    span,
                );
                Value::Node(node)
            }
            other => Value::Builtin(other),
        }
    }

    fn lower_member(&mut self, base: &ast::Expr, member: &ast::Ident) -> Value {
        let base_value = self.lower_expr(base);
        let symbol = self.graph.add_symbol(&member.name);
        match base_value {
            Value::Stage(stage) => match member.name.as_str() {
                "outputs" => Value::StageOutputs(stage),
                _ => {
                    self.sink.error(
                        DiagnosticCode::InvalidPath,
                        member.span,
                        format!(
                            "a stage is selected with `.outputs`, not `.{}`",
                            member.name
                        ),
                    );
                    Value::Poison
                }
            },
            Value::StageOutputs(stage) => {
                match self.graph[stage].output_named(symbol) {
                    Some(def) => Value::Output(PinRef::new(def.node, 0)),
                    None => {
                        let stage_name = self.graph[stage].name;
                        self.sink.error(
                            DiagnosticCode::InvalidPath,
                            member.span,
                            format!(
                                "stage `{}` has no declared output `{}`",
                                &self.graph[stage_name], member.name
                            ),
                        );
                        Value::Poison
                    }
                }
            }
            Value::Builtin(Builtin::BiquadModule) => match builtins::biquad_member(&member.name) {
                Some(mode) => Value::Biquad(mode),
                None => {
                    self.sink.error(
                        DiagnosticCode::InvalidPath,
                        member.span,
                        format!("`biquad` has no member `{}`", member.name),
                    );
                    Value::Poison
                }
            },
            Value::Node(node) => match member.name.as_str() {
                "inputs" => Value::InputsOf(node),
                "outputs" => Value::OutputsOf(node),
                _ => Value::NamedPin {
                    node,
                    name: symbol,
                    span: member.span,
                },
            },
            Value::InputsOf(node) => match self.graph.input_index_named(node, symbol) {
                Some(index) => Value::InputPin(PinRef::new(node, index)),
                None => {
                    self.unknown_pin(node, &member.name, member.span);
                    Value::Poison
                }
            },
            Value::OutputsOf(node) => match self.graph.output_index_named(node, symbol) {
                Some(index) => Value::Output(PinRef::new(node, index)),
                None => {
                    self.unknown_pin(node, &member.name, member.span);
                    Value::Poison
                }
            },
            Value::Poison => Value::Poison,
            _ => {
                self.sink.error(
                    DiagnosticCode::InvalidPath,
                    member.span,
                    format!("`.{}` cannot be selected here", member.name),
                );
                Value::Poison
            }
        }
    }

    fn unknown_pin(&mut self, node: Handle<Node>, name: &str, span: Span) {
        let kind = self.graph[node].kind.name();
        self.sink.error(
            DiagnosticCode::UnknownNamedPin,
            span,
            format!("`{}` node has no pin named `{}`", kind, name),
        );
    }

    fn lower_index(&mut self, base: &ast::Expr, index: u32, index_span: Span) -> Value {
        match self.lower_expr(base) {
            Value::Node(node) => Value::Indexed {
                node,
                index,
                index_span,
            },
            Value::Poison => Value::Poison,
            _ => {
                self.sink.error(
                    DiagnosticCode::InvalidPath,
                    index_span,
                    "`[i]` selects a pin of a node expression",
                );
                Value::Poison
            }
        }
    }

    fn lower_unary(&mut self, op: ast::UnaryOp, operand: &ast::Expr, span: Span) -> Value {
        let operand_value = self.lower_expr(operand);
        let kind = match op {
            // Unary plus is the identity; no node is built for it.
            ast::UnaryOp::Plus => return operand_value,
            ast::UnaryOp::Negate => UnaryKind::Negate,
            ast::UnaryOp::Not => UnaryKind::Not,
            ast::UnaryOp::BitNot => UnaryKind::BitNot,
        };
        let source = match self.as_source(operand_value, operand.span) {
            Some(source) => source,
            None => return Value::Poison,
        };
        let node = builtins::instantiate(
            self.graph,
            NodeKind::Unary(kind),
            Some(self.stage),
            span,
        );
        self.graph.add_edge(source, PinRef::new(node, 0));
        Value::Node(node)
    }

    fn lower_binary(
        &mut self,
        op: ast::BinaryOp,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
        span: Span,
    ) -> Value {
        let kind = match op {
            ast::BinaryOp::Mul => BinaryKind::Mul,
            ast::BinaryOp::Div => BinaryKind::Div,
            ast::BinaryOp::Rem => BinaryKind::Rem,
            ast::BinaryOp::Add => BinaryKind::Add,
            ast::BinaryOp::Sub => BinaryKind::Sub,
            ast::BinaryOp::ShiftLeft => BinaryKind::ShiftLeft,
            ast::BinaryOp::ShiftRight => BinaryKind::ShiftRight,
            ast::BinaryOp::Less => BinaryKind::Less,
            ast::BinaryOp::LessEqual => BinaryKind::LessEqual,
            ast::BinaryOp::Greater => BinaryKind::Greater,
            ast::BinaryOp::GreaterEqual => BinaryKind::GreaterEqual,
            ast::BinaryOp::Equal => BinaryKind::Equal,
            ast::BinaryOp::NotEqual => BinaryKind::NotEqual,
            // No short-circuit in a signal graph: the logical forms lower to bitwise on bools.
            ast::BinaryOp::BitAnd | ast::BinaryOp::LogicalAnd => BinaryKind::BitAnd,
            ast::BinaryOp::BitXor => BinaryKind::BitXor,
            ast::BinaryOp::BitOr | ast::BinaryOp::LogicalOr => BinaryKind::BitOr,
        };
        let lhs_value = self.lower_expr(lhs);
        let lhs_source = self.as_source(lhs_value, lhs.span);
        let rhs_value = self.lower_expr(rhs);
        let rhs_source = self.as_source(rhs_value, rhs.span);
        let (lhs_source, rhs_source) = match (lhs_source, rhs_source) {
            (Some(l), Some(r)) => (l, r),
            _ => return Value::Poison,
        };
        let node = builtins::instantiate(
            self.graph,
            NodeKind::Binary(kind),
            Some(self.stage),
            span,
        );
        self.graph.add_edge(lhs_source, PinRef::new(node, 0));
        self.graph.add_edge(rhs_source, PinRef::new(node, 1));
        Value::Node(node)
    }

    fn lower_stack(&mut self, items: &[ast::Expr]) -> Value {
        let mut pins = SmallVec::new();
        let mut poisoned = false;
        for item in items {
            let value = self.lower_expr(item);
            match self.as_source(value, item.span) {
                Some(pin) => pins.push(pin),
                None => poisoned = true,
            }
        }
        if poisoned {
            Value::Poison
        } else {
            Value::StackVal(pins)
        }
    }

    fn lower_bundle(&mut self, entries: &[ast::BundleEntry]) -> Value {
        let mut lowered = Vec::with_capacity(entries.len());
        let mut poisoned = false;
        for entry in entries {
            let name = entry
                .name
                .as_ref()
                .map(|ident| self.graph.add_symbol(&ident.name));
            let value = self.lower_expr(&entry.value);
            match self.as_source(value, entry.value.span) {
                Some(pin) => lowered.push((name, pin, entry.value.span)),
                None => poisoned = true,
            }
        }
        if poisoned {
            Value::Poison
        } else {
            Value::BundleVal(lowered)
        }
    }

    fn lower_route(&mut self, source: &ast::Expr, dest: &ast::Expr) -> Value {
        let source_value = self.lower_expr(source);
        let dest_value = self.lower_expr(dest);
        self.route(source_value, dest_value.clone(), source.span, dest.span);
        // A routing expression evaluates to its destination operand; that is what chains.
        dest_value
    }

    //---------------------------------------------------------------------------------------------
    // Calls

    fn lower_call(&mut self, callee: &ast::Expr, args: &[ast::Expr], span: Span) -> Value {
        let callee_value = match &callee.kind {
            // `f32(x)` must not eagerly build the bare-name conversion node; the call form
            // carries its own argument.
            ExprKind::Name { module: None, name } => {
                let symbol = self.graph.add_symbol(&name.name);
                match self.scopes.lookup(self.graph, symbol) {
                    Some(Binding::Builtin(builtin)) => Value::Builtin(builtin),
                    _ => self.lower_expr(callee),
                }
            }
            _ => self.lower_expr(callee),
        };
        match callee_value {
            Value::Builtin(builtin) => self.lower_builtin_call(builtin, args, span),
            Value::Biquad(mode) => self.lower_biquad_call(mode, args, span),
            Value::Poison => Value::Poison,
            _ => {
                self.sink.error(
                    DiagnosticCode::InvalidPath,
                    span,
                    "only built-ins can be called",
                );
                Value::Poison
            }
        }
    }

    fn arity_error(&mut self, what: &str, wanted: &str, got: usize, span: Span) -> Value {
        self.sink.error(
            DiagnosticCode::WrongArgumentCount,
            span,
            format!("`{}` takes {}, but {} were given", what, wanted, got),
        );
        Value::Poison
    }

    /// Lowers args positionally into a freshly instantiated node.
    fn apply(&mut self, kind: NodeKind, args: &[ast::Expr], span: Span) -> Value {
        let mut sources = Vec::with_capacity(args.len());
        let mut poisoned = false;
        for arg in args {
            let value = self.lower_expr(arg);
            match self.as_source(value, arg.span) {
                Some(pin) => sources.push(pin),
                None => poisoned = true,
            }
        }
        if poisoned {
            return Value::Poison;
        }
        let node = builtins::instantiate(self.graph, kind, Some(self.stage), span);
        for (index, source) in sources.into_iter().enumerate() {
            self.graph.add_edge(source, PinRef::new(node, index as u32));
        }
        Value::Node(node)
    }

    fn lower_builtin_call(&mut self, builtin: Builtin, args: &[ast::Expr], span: Span) -> Value {
        match builtin {
            Builtin::Unary(kind) => {
                if args.len() != 1 {
                    return self.arity_error(kind.name(), "one argument", args.len(), span);
                }
                self.apply(NodeKind::Unary(kind), args, span)
            }
            Builtin::If => {
                if args.len() != 3 {
                    return self.arity_error("if", "three arguments", args.len(), span);
                }
                self.apply(NodeKind::If, args, span)
            }
            Builtin::Select => {
                if args.len() < 3 {
                    return self.arity_error(
                        "select",
                        "an index and at least two choices",
                        args.len(),
                        span,
                    );
                }
                let arity = (args.len() - 1) as u32;
                self.apply(NodeKind::Select { arity }, args, span)
            }
            Builtin::Broadcast => {
                if args.len() != 1 {
                    return self.arity_error("broadcast", "one argument", args.len(), span);
                }
                self.apply(NodeKind::Broadcast, args, span)
            }
            Builtin::Truncate => {
                if args.len() != 1 {
                    return self.arity_error("truncate", "one argument", args.len(), span);
                }
                self.apply(NodeKind::Truncate, args, span)
            }
            Builtin::Merge => {
                if args.is_empty() {
                    return self.arity_error("merge", "at least one argument", 0, span);
                }
                let arity = args.len() as u32;
                self.apply(NodeKind::Merge { arity }, args, span)
            }
            Builtin::Split => self.lower_split(args, span),
            Builtin::Slice => self.lower_slice(args, span),
            Builtin::Xoroshiro => self.lower_xoroshiro(args, span),
            Builtin::DelRead => self.lower_delread(args, span),
            Builtin::DelWrite => self.lower_delwrite(args, span),
            Builtin::Convert(to) => {
                if args.len() != 1 {
                    return self.arity_error(to.name(), "one argument", args.len(), span);
                }
                self.apply(NodeKind::Convert { to }, args, span)
            }
            Builtin::MathConst(_) => {
                self.sink.error(
                    DiagnosticCode::InvalidPath,
                    span,
                    "a math constant is not callable",
                );
                Value::Poison
            }
            Builtin::BiquadModule => {
                self.sink.error(
                    DiagnosticCode::InvalidPath,
                    span,
                    "`biquad` is a module; call one of its members",
                );
                Value::Poison
            }
        }
    }

    fn lower_biquad_call(&mut self, mode: BiquadMode, args: &[ast::Expr], span: Span) -> Value {
        if args.len() != 3 {
            return self.arity_error(
                mode.name(),
                "three arguments (input, frequency, q)",
                args.len(),
                span,
            );
        }
        self.apply(NodeKind::Biquad(mode), args, span)
    }

    /// A `split`/`slice`/`cell`-style argument that must be a nonnegative integer literal.
    fn const_index_arg(&mut self, arg: &ast::Expr, what: &str) -> Option<u32> {
        match &arg.kind {
            ExprKind::Integer { value, .. } if *value >= 0 && *value <= u32::MAX as i128 => {
                Some(*value as u32)
            }
            _ => {
                self.sink.error(
                    DiagnosticCode::ConstantRequired,
                    arg.span,
                    format!("{} must be a nonnegative integer literal", what),
                );
                None
            }
        }
    }

    fn lower_split(&mut self, args: &[ast::Expr], span: Span) -> Value {
        if args.len() < 3 {
            return self.arity_error(
                "split",
                "an input and at least two widths",
                args.len(),
                span,
            );
        }
        let mut widths = SmallVec::new();
        for arg in &args[1..] {
            match self.const_index_arg(arg, "a split width") {
                Some(width) if width > 0 => widths.push(width),
                Some(_) => {
                    self.sink.error(
                        DiagnosticCode::SliceOutOfRange,
                        arg.span,
                        "a split width must be at least one channel",
                    );
                    return Value::Poison;
                }
                None => return Value::Poison,
            }
        }
        self.apply(NodeKind::Split { widths }, &args[..1], span)
    }

    fn lower_slice(&mut self, args: &[ast::Expr], span: Span) -> Value {
        if args.len() != 2 && args.len() != 3 {
            return self.arity_error("slice", "two or three arguments", args.len(), span);
        }
        let start = match self.const_index_arg(&args[1], "a slice index") {
            Some(start) => start,
            None => return Value::Poison,
        };
        let end = if args.len() == 3 {
            match self.const_index_arg(&args[2], "a slice index") {
                Some(end) => Some(end),
                None => return Value::Poison,
            }
        } else {
            None
        };
        if let Some(end) = end {
            if end <= start {
                self.sink.error(
                    DiagnosticCode::SliceOutOfRange,
                    span,
                    format!("slice range [{}, {}) is empty or inverted", start, end),
                );
                return Value::Poison;
            }
        }
        self.apply(NodeKind::Slice { start, end }, &args[..1], span)
    }

    fn lower_xoroshiro(&mut self, args: &[ast::Expr], span: Span) -> Value {
        if args.len() > 1 {
            return self.arity_error("xoroshiro", "at most one seed argument", args.len(), span);
        }
        let seed = match args.first() {
            Some(arg) => match &arg.kind {
                ExprKind::Integer { value, .. } if *value >= 0 => Some(*value as u64),
                _ => {
                    self.sink.error(
                        DiagnosticCode::ConstantRequired,
                        arg.span,
                        "an RNG seed must be a nonnegative integer literal",
                    );
                    return Value::Poison;
                }
            },
            None => None,
        };
        let seed_slot = self.graph.allocate_seed_slot();
        let node = builtins::instantiate(
            self.graph,
            NodeKind::Xoroshiro { seed_slot, seed },
            Some(self.stage),
            span,
        );
        Value::Node(node)
    }

    /// The first argument of `delread`/`delwrite` names a buffer rather than carrying a signal.
    fn buffer_arg(&mut self, arg: &ast::Expr) -> Option<Handle<BufferDef>> {
        let value = self.lower_expr(arg);
        match value {
            Value::Buffer(buffer) => Some(buffer),
            Value::Poison => None,
            _ => {
                self.sink.error(
                    DiagnosticCode::UndeclaredName,
                    arg.span,
                    "expected the name of a declared buffer",
                );
                None
            }
        }
    }

    fn lower_delread(&mut self, args: &[ast::Expr], span: Span) -> Value {
        if args.len() != 2 {
            return self.arity_error("delread", "a buffer and a delay", args.len(), span);
        }
        let buffer = match self.buffer_arg(&args[0]) {
            Some(buffer) => buffer,
            None => return Value::Poison,
        };
        let delay_value = self.lower_expr(&args[1]);
        let delay = match self.as_source(delay_value, args[1].span) {
            Some(pin) => pin,
            None => return Value::Poison,
        };
        let node = builtins::instantiate(
            self.graph,
            NodeKind::DelRead { buffer },
            Some(self.stage),
            span,
        );
        self.graph.add_edge(delay, PinRef::new(node, 0));
        Value::Node(node)
    }

    fn lower_delwrite(&mut self, args: &[ast::Expr], span: Span) -> Value {
        if args.len() != 2 {
            return self.arity_error("delwrite", "a buffer and a value", args.len(), span);
        }
        let buffer = match self.buffer_arg(&args[0]) {
            Some(buffer) => buffer,
            None => return Value::Poison,
        };
        let value = self.lower_expr(&args[1]);
        let source = match self.as_source(value, args[1].span) {
            Some(pin) => pin,
            None => return Value::Poison,
        };
        let node = builtins::instantiate(
            self.graph,
            NodeKind::DelWrite { buffer },
            Some(self.stage),
            span,
        );
        self.graph.add_edge(source, PinRef::new(node, 0));
        Value::Node(node)
    }

    //---------------------------------------------------------------------------------------------
    // Routing

    /// Coerces a value into a single source (output) pin.
    fn as_source(&mut self, value: Value, span: Span) -> Option<PinRef> {
        match value {
            Value::Node(node) => {
                if self.graph[node].outputs().is_empty() {
                    self.sink.error(
                        DiagnosticCode::SourceRequired,
                        span,
                        format!("a `{}` node has no outputs", self.graph[node].kind.name()),
                    );
                    return None;
                }
                Some(PinRef::new(node, 0))
            }
            Value::Indexed {
                node,
                index,
                index_span,
            } => {
                if index >= self.graph[node].outputs().len() {
                    self.sink.error(
                        DiagnosticCode::UnknownNamedPin,
                        index_span,
                        format!(
                            "a `{}` node has no output {}",
                            self.graph[node].kind.name(),
                            index
                        ),
                    );
                    return None;
                }
                Some(PinRef::new(node, index))
            }
            Value::Output(pin) => Some(pin),
            Value::NamedPin { node, name, span } => {
                match self.graph.output_index_named(node, name) {
                    Some(index) => Some(PinRef::new(node, index)),
                    None => {
                        let name = &self.graph[name].to_string();
                        self.unknown_pin(node, name, span);
                        None
                    }
                }
            }
            Value::Builtin(builtin) => {
                let lowered = self.lower_builtin_name(builtin, span);
                match lowered {
                    Value::Node(_) => self.as_source(lowered, span),
                    _ => {
                        self.sink.error(
                            DiagnosticCode::SourceRequired,
                            span,
                            "this built-in must be called before it can be used as a source",
                        );
                        None
                    }
                }
            }
            Value::Poison => None,
            Value::CellEnd(_) => {
                self.sink.error(
                    DiagnosticCode::SourceRequired,
                    span,
                    "a cell's `end` can only be written; read its `start` instead",
                );
                None
            }
            Value::StageSink(_) => {
                self.sink.error(
                    DiagnosticCode::SourceRequired,
                    span,
                    "a stage output is written here and read via `stage.outputs.name`",
                );
                None
            }
            _ => {
                self.sink.error(
                    DiagnosticCode::SourceRequired,
                    span,
                    "this expression does not produce a signal",
                );
                None
            }
        }
    }

    /// Coerces a value into a single sink (input) pin.
    fn as_sink(&mut self, value: Value, span: Span) -> Option<PinRef> {
        match value {
            Value::Node(node)
            | Value::CellEnd(node)
            | Value::StageSink(node) => {
                if self.graph[node].inputs().is_empty() {
                    self.sink.error(
                        DiagnosticCode::SinkRequired,
                        span,
                        format!("a `{}` node has no inputs", self.graph[node].kind.name()),
                    );
                    return None;
                }
                Some(PinRef::new(node, 0))
            }
            Value::Indexed {
                node,
                index,
                index_span,
            } => {
                if index >= self.graph[node].inputs().len() {
                    self.sink.error(
                        DiagnosticCode::UnknownNamedPin,
                        index_span,
                        format!(
                            "a `{}` node has no input {}",
                            self.graph[node].kind.name(),
                            index
                        ),
                    );
                    return None;
                }
                Some(PinRef::new(node, index))
            }
            Value::InputPin(pin) => Some(pin),
            Value::NamedPin { node, name, span } => {
                match self.graph.input_index_named(node, name) {
                    Some(index) => Some(PinRef::new(node, index)),
                    None => {
                        let name = &self.graph[name].to_string();
                        self.unknown_pin(node, name, span);
                        None
                    }
                }
            }
            Value::Builtin(builtin) => {
                let lowered = self.lower_builtin_name(builtin, span);
                match lowered {
                    Value::Node(_) => self.as_sink(lowered, span),
                    _ => {
                        self.sink.error(
                            DiagnosticCode::SinkRequired,
                            span,
                            "this built-in must be called before it can be routed into",
                        );
                        None
                    }
                }
            }
            Value::Output(_) => {
                self.sink.error(
                    DiagnosticCode::SinkRequired,
                    span,
                    "an output pin cannot be a routing destination",
                );
                None
            }
            Value::Poison => None,
            _ => {
                self.sink.error(
                    DiagnosticCode::SinkRequired,
                    span,
                    "this expression cannot be a routing destination",
                );
                None
            }
        }
    }

    /// `A -> B`: the operand-kind table.
    fn route(&mut self, source: Value, dest: Value, source_span: Span, dest_span: Span) {
        match source {
            Value::BundleVal(entries) => self.route_bundle(entries, dest, dest_span),
            Value::StackVal(pins) => {
                // Stacked outputs occupy consecutive channel ranges of the destination; a merge
                // node is exactly that concatenation.
                let arity = pins.len() as u32;
                let merge = builtins::instantiate(
                    self.graph,
                    NodeKind::Merge { arity },
                    Some(self.stage),
                    source_span,
                );
                for (index, pin) in pins.into_iter().enumerate() {
                    self.graph.add_edge(pin, PinRef::new(merge, index as u32));
                }
                if let Some(sink_pin) = self.as_sink(dest, dest_span) {
                    self.graph.add_edge(PinRef::new(merge, 0), sink_pin);
                }
            }
            other => {
                let source_pin = self.as_source(other, source_span);
                let sink_pin = self.as_sink(dest, dest_span);
                if let (Some(source_pin), Some(sink_pin)) = (source_pin, sink_pin) {
                    self.graph.add_edge(source_pin, sink_pin);
                }
            }
        }
    }

    fn route_into_pin(&mut self, source: Value, sink_pin: PinRef, span: Span) {
        match source {
            Value::BundleVal(_) | Value::StackVal(_) => {
                self.route(source, Value::InputPin(sink_pin), span, span)
            }
            other => {
                if let Some(source_pin) = self.as_source(other, span) {
                    self.graph.add_edge(source_pin, sink_pin);
                }
            }
        }
    }

    /// Each bundle entry becomes an edge into the matching destination pin: by index for
    /// positional entries, by name for named ones.
    fn route_bundle(
        &mut self,
        entries: Vec<(Option<Handle<Symbol>>, PinRef, Span)>,
        dest: Value,
        dest_span: Span,
    ) {
        let dest_node = match dest {
            Value::Node(node) | Value::CellEnd(node) | Value::StageSink(node) => node,
            Value::Poison => return,
            _ => {
                self.sink.error(
                    DiagnosticCode::SinkRequired,
                    dest_span,
                    "a bundle literal can only be routed into a node",
                );
                return;
            }
        };
        let mut positional = 0u32;
        for (name, source_pin, span) in entries {
            let index = match name {
                Some(name) => match self.graph.input_index_named(dest_node, name) {
                    Some(index) => index,
                    None => {
                        let name = &self.graph[name].to_string();
                        self.unknown_pin(dest_node, name, span);
                        continue;
                    }
                },
                None => {
                    let index = positional;
                    positional += 1;
                    index
                }
            };
            if index >= self.graph[dest_node].inputs().len() {
                self.sink.error(
                    DiagnosticCode::UnknownNamedPin,
                    span,
                    format!(
                        "a `{}` node has no input {}",
                        self.graph[dest_node].kind.name(),
                        index
                    ),
                );
                continue;
            }
            self.graph.add_edge(source_pin, PinRef::new(dest_node, index));
        }
    }
}
