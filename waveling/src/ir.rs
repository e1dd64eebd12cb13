// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! The emitted intermediate representation — the contract toward backends.
//!
//! [`Program`][] and its parts are serde mirror types of the validated, typed, folded graph:
//! plain data with stable 0-based ids, no arenas, no handles.  [`Program::from_graph`][] renumbers
//! the live nodes of a [`WaveGraph`][] into this form; [`Program::load_into`][] rebuilds a graph
//! from it, which is what keeps the two representations honest in tests.
//!
//! The [`Kind`][] enum is closed and versioned: any change to it must bump [`VERSION`][], and
//! backends refuse programs from a different version.
//!
//! [`Kind`]: enum.Kind.html
//! [`Program`]: struct.Program.html
//! [`Program::from_graph`]: struct.Program.html#method.from_graph
//! [`Program::load_into`]: struct.Program.html#method.load_into
//! [`VERSION`]: constant.VERSION.html
//! [`WaveGraph`]: ../graph/struct.WaveGraph.html

use fxhash::FxHashMap;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::arena::Handle;
use crate::graph;
use crate::graph::ConstValue;
use crate::graph::PinRef;
use crate::graph::WaveGraph;
use crate::types::Rate;
use crate::types::ScalarType;

/// The IR format version.  Bumped whenever [`Kind`][] or the surrounding structure changes.
///
/// [`Kind`]: enum.Kind.html
pub const VERSION: u32 = 1;

//-------------------------------------------------------------------------------------------------
// Mirror types

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Program {
    pub version: u32,
    pub program_name: String,
    pub sr: u32,
    pub block_size: u32,
    pub externals: Externals,
    pub buffers: Vec<Buffer>,
    pub stages: Vec<Stage>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Externals {
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
    pub properties: Vec<Property>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Port {
    pub name: String,
    pub width: u32,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: ScalarType,
    pub rate: Rate,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Buffer {
    pub id: u32,
    pub name: String,
    pub scalar: ScalarType,
    pub width: u32,
    pub capacity: u32,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Stage {
    pub id: u32,
    pub name: String,
    pub outputs: Vec<StageOutput>,
    /// The ids of the nodes this stage owns.
    pub nodes: Vec<u32>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StageOutput {
    pub name: String,
    pub scalar: ScalarType,
    pub width: u32,
    /// The id of the stage-output node carrying this output.
    pub node: u32,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Node {
    pub id: u32,
    #[serde(flatten)]
    pub kind: Kind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<u32>,
    pub pins: Vec<Pin>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PinDirection {
    In,
    Out,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Pin {
    pub direction: PinDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub scalar: ScalarType,
    pub width: u32,
    pub rate: Rate,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Endpoint {
    pub node: u32,
    pub pin: u32,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Edge {
    pub source: Endpoint,
    pub sink: Endpoint,
}

/// One channel of a literal.  Integer lanes are stored at declared precision, so `i64` covers
/// them all.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LaneValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnaryOp {
    Negate,
    Not,
    BitNot,
    Sin,
    Cos,
    Tan,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    ShiftLeft,
    ShiftRight,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    BitAnd,
    BitXor,
    BitOr,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BiquadMode {
    Lowpass,
    Highpass,
    Bandpass,
}

/// The closed node-kind enum of the backend contract.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Kind {
    Literal { value: Vec<LaneValue> },
    ExternalInput { index: u32 },
    ExternalOutput { index: u32 },
    Property { index: u32 },
    Unary { op: UnaryOp },
    Binary { op: BinaryOp },
    Sum { arity: u32 },
    Or { arity: u32 },
    Convert { to: ScalarType },
    Broadcast,
    Truncate,
    Merge { arity: u32 },
    Split { widths: Vec<u32> },
    Slice { start: u32, end: u32 },
    If,
    Select { arity: u32 },
    Xoroshiro { seed_slot: u32, seed: Option<u64> },
    Cell { delay: u32 },
    DelWrite { buffer: u32 },
    DelRead { buffer: u32 },
    Biquad { mode: BiquadMode },
    StageOutput { stage: u32, index: u32 },
    Discard,
}

//-------------------------------------------------------------------------------------------------
// Errors

#[derive(Debug, Error, Eq, PartialEq)]
pub enum Error {
    #[error("unsupported IR version {0} (this library reads version {current})", current = VERSION)]
    UnsupportedVersion(u32),

    #[error("failed to locate node `{0}` in program")]
    NodeNotFound(u32),

    #[error("failed to locate stage `{0}` in program")]
    StageNotFound(u32),

    #[error("failed to locate buffer `{0}` in program")]
    BufferNotFound(u32),

    #[error("node `{0}` has an invalid pin layout")]
    InvalidPins(u32),
}

//-------------------------------------------------------------------------------------------------
// Emission

impl Program {
    /// Serializes a validated graph.  Dead nodes (folded subgraph interiors) are skipped; live
    /// nodes are renumbered densely in arena order, which keeps ids stable for a given source
    /// program.
    pub fn from_graph(graph: &WaveGraph) -> Program {
        let mut node_ids: FxHashMap<Handle<graph::Node>, u32> = FxHashMap::default();
        for node in graph.iter_live_nodes() {
            let id = node_ids.len() as u32;
            node_ids.insert(node, id);
        }

        let externals = Externals {
            inputs: graph
                .externals
                .inputs
                .iter()
                .map(|port| Port {
                    name: graph[port.name].to_string(),
                    width: port.width,
                })
                .collect(),
            outputs: graph
                .externals
                .outputs
                .iter()
                .map(|port| Port {
                    name: graph[port.name].to_string(),
                    width: port.width,
                })
                .collect(),
            properties: graph
                .externals
                .properties
                .iter()
                .map(|property| Property {
                    name: graph[property.name].to_string(),
                    declared_type: property.declared_type,
                    rate: property.rate,
                })
                .collect(),
        };

        let buffers = graph
            .iter_buffers()
            .map(|buffer| {
                let def = &graph[buffer];
                Buffer {
                    id: buffer.as_dense() as u32,
                    name: graph[def.name].to_string(),
                    scalar: def.shape.scalar,
                    width: def.shape.width,
                    capacity: def.capacity.unwrap_or(0),
                }
            })
            .collect();

        let stages = graph
            .iter_stages()
            .map(|stage| {
                let def = &graph[stage];
                Stage {
                    id: stage.as_dense() as u32,
                    name: graph[def.name].to_string(),
                    outputs: def
                        .outputs()
                        .iter()
                        .map(|output| StageOutput {
                            name: graph[output.name].to_string(),
                            scalar: output.shape.scalar,
                            width: output.shape.width,
                            node: node_ids[&output.node],
                        })
                        .collect(),
                    nodes: graph
                        .iter_live_nodes()
                        .filter(|node| graph[*node].stage.into_option() == Some(stage))
                        .map(|node| node_ids[&node])
                        .collect(),
                }
            })
            .collect();

        let nodes = graph
            .iter_live_nodes()
            .map(|node| {
                let data = &graph[node];
                let mut pins = Vec::new();
                for pin in data.inputs().iter() {
                    pins.push(serialize_pin(graph, pin, PinDirection::In));
                }
                for pin in data.outputs().iter() {
                    pins.push(serialize_pin(graph, pin, PinDirection::Out));
                }
                Node {
                    id: node_ids[&node],
                    kind: serialize_kind(&data.kind),
                    stage: data.stage.into_option().map(|s| s.as_dense() as u32),
                    pins,
                }
            })
            .collect();

        let edges = graph
            .iter_edges()
            .map(|edge| Edge {
                source: Endpoint {
                    node: node_ids[&edge.source.node],
                    pin: edge.source.pin,
                },
                sink: Endpoint {
                    node: node_ids[&edge.sink.node],
                    pin: edge.sink.pin,
                },
            })
            .collect();

        Program {
            version: VERSION,
            program_name: graph
                .program_name
                .map(|name| graph[name].to_string())
                .unwrap_or_default(),
            sr: graph.externals.sr,
            block_size: graph.externals.block_size,
            externals,
            buffers,
            stages,
            nodes,
            edges,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Program> {
        serde_json::from_str(json)
    }
}

fn serialize_pin(graph: &WaveGraph, pin: Handle<graph::Pin>, direction: PinDirection) -> Pin {
    let data = &graph[pin];
    let shape = data.shape.unwrap_or_else(|| {
        // Emission only happens on validated graphs; an unresolved pin cannot reach here.
        unreachable!("emitting a pin with an unresolved shape")
    });
    Pin {
        direction,
        name: data.name.map(|name| graph[name].to_string()),
        scalar: shape.scalar,
        width: shape.width,
        rate: data.rate.unwrap_or(Rate::Sample),
    }
}

fn serialize_lanes(value: &ConstValue) -> Vec<LaneValue> {
    value
        .lanes
        .iter()
        .map(|lane| match lane {
            graph::Lane::Int(v) => LaneValue::Int(*v as i64),
            graph::Lane::Float(v) => LaneValue::Float(*v),
            graph::Lane::Bool(v) => LaneValue::Bool(*v),
        })
        .collect()
}

fn serialize_kind(kind: &graph::NodeKind) -> Kind {
    use graph::NodeKind as G;
    match kind {
        G::Literal(value) => Kind::Literal {
            value: serialize_lanes(value),
        },
        G::ExternalInput(index) => Kind::ExternalInput { index: *index },
        G::ExternalOutput(index) => Kind::ExternalOutput { index: *index },
        G::Property(index) => Kind::Property { index: *index },
        G::Unary(op) => Kind::Unary {
            op: match op {
                graph::UnaryKind::Negate => UnaryOp::Negate,
                graph::UnaryKind::Not => UnaryOp::Not,
                graph::UnaryKind::BitNot => UnaryOp::BitNot,
                graph::UnaryKind::Sin => UnaryOp::Sin,
                graph::UnaryKind::Cos => UnaryOp::Cos,
                graph::UnaryKind::Tan => UnaryOp::Tan,
            },
        },
        G::Binary(op) => Kind::Binary {
            op: match op {
                graph::BinaryKind::Add => BinaryOp::Add,
                graph::BinaryKind::Sub => BinaryOp::Sub,
                graph::BinaryKind::Mul => BinaryOp::Mul,
                graph::BinaryKind::Div => BinaryOp::Div,
                graph::BinaryKind::Rem => BinaryOp::Rem,
                graph::BinaryKind::ShiftLeft => BinaryOp::ShiftLeft,
                graph::BinaryKind::ShiftRight => BinaryOp::ShiftRight,
                graph::BinaryKind::Less => BinaryOp::Less,
                graph::BinaryKind::LessEqual => BinaryOp::LessEqual,
                graph::BinaryKind::Greater => BinaryOp::Greater,
                graph::BinaryKind::GreaterEqual => BinaryOp::GreaterEqual,
                graph::BinaryKind::Equal => BinaryOp::Equal,
                graph::BinaryKind::NotEqual => BinaryOp::NotEqual,
                graph::BinaryKind::BitAnd => BinaryOp::BitAnd,
                graph::BinaryKind::BitXor => BinaryOp::BitXor,
                graph::BinaryKind::BitOr => BinaryOp::BitOr,
            },
        },
        G::Sum { arity } => Kind::Sum { arity: *arity },
        G::Or { arity } => Kind::Or { arity: *arity },
        G::Convert { to } => Kind::Convert { to: *to },
        G::Broadcast => Kind::Broadcast,
        G::Truncate => Kind::Truncate,
        G::Merge { arity } => Kind::Merge { arity: *arity },
        G::Split { widths } => Kind::Split {
            widths: widths.iter().copied().collect(),
        },
        G::Slice { start, end } => Kind::Slice {
            start: *start,
            end: end.unwrap_or(0),
        },
        G::If => Kind::If,
        G::Select { arity } => Kind::Select { arity: *arity },
        G::Xoroshiro { seed_slot, seed } => Kind::Xoroshiro {
            seed_slot: *seed_slot,
            seed: *seed,
        },
        G::Cell { delay } => Kind::Cell { delay: *delay },
        G::DelWrite { buffer } => Kind::DelWrite {
            buffer: buffer.as_dense() as u32,
        },
        G::DelRead { buffer } => Kind::DelRead {
            buffer: buffer.as_dense() as u32,
        },
        G::Biquad(mode) => Kind::Biquad {
            mode: match mode {
                graph::BiquadMode::Lowpass => BiquadMode::Lowpass,
                graph::BiquadMode::Highpass => BiquadMode::Highpass,
                graph::BiquadMode::Bandpass => BiquadMode::Bandpass,
            },
        },
        G::StageOutput { stage, index } => Kind::StageOutput {
            stage: stage.as_dense() as u32,
            index: *index,
        },
        G::Discard => Kind::Discard,
    }
}

//-------------------------------------------------------------------------------------------------
// Loading

impl Program {
    /// Rebuilds a graph from serialized form.  The inverse of [`from_graph`][] up to handle
    /// identity; round-tripping is what the serde tests check.
    ///
    /// [`from_graph`]: #method.from_graph
    pub fn load_into(&self, graph: &mut WaveGraph) -> Result<(), Error> {
        if self.version != VERSION {
            return Err(Error::UnsupportedVersion(self.version));
        }

        graph.program_name = Some(graph.add_symbol(&self.program_name));
        graph.externals.sr = self.sr;
        graph.externals.block_size = self.block_size;
        for port in &self.externals.inputs {
            let name = graph.add_symbol(&port.name);
            graph.externals.inputs.push(graph::ExternalPort {
                name,
                width: port.width,
            });
        }
        for port in &self.externals.outputs {
            let name = graph.add_symbol(&port.name);
            graph.externals.outputs.push(graph::ExternalPort {
                name,
                width: port.width,
            });
        }
        for property in &self.externals.properties {
            let name = graph.add_symbol(&property.name);
            graph.externals.properties.push(graph::PropertyPort {
                name,
                declared_type: property.declared_type,
                rate: property.rate,
            });
        }

        let mut buffer_handles = Vec::with_capacity(self.buffers.len());
        for buffer in &self.buffers {
            let name = graph.add_symbol(&buffer.name);
            let handle = graph.add_buffer(
                name,
                crate::types::Shape::new(buffer.scalar, buffer.width),
                Default::default(),
            );
            graph[handle].capacity = Some(buffer.capacity);
            buffer_handles.push(handle);
        }

        let mut stage_handles = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let name = graph.add_symbol(&stage.name);
            stage_handles.push(graph.add_stage(name, Default::default()));
        }

        let mut node_handles = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let stage = match node.stage {
                Some(id) => Some(
                    stage_handles
                        .get(id as usize)
                        .copied()
                        .ok_or(Error::StageNotFound(id))?,
                ),
                None => None,
            };
            let kind = self.load_kind(&node.kind, &stage_handles, &buffer_handles)?;
            let handle = graph.add_node(kind, stage, Default::default());
            for pin in &node.pins {
                let name = pin.name.as_ref().map(|name| graph.add_symbol(name));
                let shape = Some(crate::types::Shape::new(pin.scalar, pin.width));
                let pin_ref = match pin.direction {
                    PinDirection::In => graph.add_input_pin(handle, name, shape, true),
                    PinDirection::Out => graph.add_output_pin(handle, name, shape),
                };
                let pin_handle = graph.input_or_output(
                    pin_ref,
                    match pin.direction {
                        PinDirection::In => graph::Direction::Input,
                        PinDirection::Out => graph::Direction::Output,
                    },
                );
                graph[pin_handle].rate = Some(pin.rate);
            }
            node_handles.push(handle);
        }

        // Stage-output defs are reconstructed from the stage mirror.
        for (stage, handle) in self.stages.iter().zip(stage_handles.iter()) {
            for output in &stage.outputs {
                let name = graph.add_symbol(&output.name);
                let node = node_handles
                    .get(output.node as usize)
                    .copied()
                    .ok_or(Error::NodeNotFound(output.node))?;
                graph.push_stage_output(
                    *handle,
                    graph::StageOutputDef {
                        name,
                        shape: crate::types::Shape::new(output.scalar, output.width),
                        node,
                    },
                );
            }
        }

        for edge in &self.edges {
            let source_node = node_handles
                .get(edge.source.node as usize)
                .copied()
                .ok_or(Error::NodeNotFound(edge.source.node))?;
            let sink_node = node_handles
                .get(edge.sink.node as usize)
                .copied()
                .ok_or(Error::NodeNotFound(edge.sink.node))?;
            graph.add_edge(
                PinRef::new(source_node, edge.source.pin),
                PinRef::new(sink_node, edge.sink.pin),
            );
        }

        Ok(())
    }

    fn load_kind(
        &self,
        kind: &Kind,
        stages: &[Handle<graph::Stage>],
        buffers: &[Handle<graph::BufferDef>],
    ) -> Result<graph::NodeKind, Error> {
        use graph::NodeKind as G;
        let kind = match kind {
            Kind::Literal { value } => G::Literal(ConstValue {
                scalar: None,
                lanes: value
                    .iter()
                    .map(|lane| match lane {
                        LaneValue::Int(v) => graph::Lane::Int(*v as i128),
                        LaneValue::Float(v) => graph::Lane::Float(*v),
                        LaneValue::Bool(v) => graph::Lane::Bool(*v),
                    })
                    .collect(),
            }),
            Kind::ExternalInput { index } => G::ExternalInput(*index),
            Kind::ExternalOutput { index } => G::ExternalOutput(*index),
            Kind::Property { index } => G::Property(*index),
            Kind::Unary { op } => G::Unary(match op {
                UnaryOp::Negate => graph::UnaryKind::Negate,
                UnaryOp::Not => graph::UnaryKind::Not,
                UnaryOp::BitNot => graph::UnaryKind::BitNot,
                UnaryOp::Sin => graph::UnaryKind::Sin,
                UnaryOp::Cos => graph::UnaryKind::Cos,
                UnaryOp::Tan => graph::UnaryKind::Tan,
            }),
            Kind::Binary { op } => G::Binary(match op {
                BinaryOp::Add => graph::BinaryKind::Add,
                BinaryOp::Sub => graph::BinaryKind::Sub,
                BinaryOp::Mul => graph::BinaryKind::Mul,
                BinaryOp::Div => graph::BinaryKind::Div,
                BinaryOp::Rem => graph::BinaryKind::Rem,
                BinaryOp::ShiftLeft => graph::BinaryKind::ShiftLeft,
                BinaryOp::ShiftRight => graph::BinaryKind::ShiftRight,
                BinaryOp::Less => graph::BinaryKind::Less,
                BinaryOp::LessEqual => graph::BinaryKind::LessEqual,
                BinaryOp::Greater => graph::BinaryKind::Greater,
                BinaryOp::GreaterEqual => graph::BinaryKind::GreaterEqual,
                BinaryOp::Equal => graph::BinaryKind::Equal,
                BinaryOp::NotEqual => graph::BinaryKind::NotEqual,
                BinaryOp::BitAnd => graph::BinaryKind::BitAnd,
                BinaryOp::BitXor => graph::BinaryKind::BitXor,
                BinaryOp::BitOr => graph::BinaryKind::BitOr,
            }),
            Kind::Sum { arity } => G::Sum { arity: *arity },
            Kind::Or { arity } => G::Or { arity: *arity },
            Kind::Convert { to } => G::Convert { to: *to },
            Kind::Broadcast => G::Broadcast,
            Kind::Truncate => G::Truncate,
            Kind::Merge { arity } => G::Merge { arity: *arity },
            Kind::Split { widths } => G::Split {
                widths: widths.iter().copied().collect(),
            },
            Kind::Slice { start, end } => G::Slice {
                start: *start,
                end: Some(*end),
            },
            Kind::If => G::If,
            Kind::Select { arity } => G::Select { arity: *arity },
            Kind::Xoroshiro { seed_slot, seed } => G::Xoroshiro {
                seed_slot: *seed_slot,
                seed: *seed,
            },
            Kind::Cell { delay } => G::Cell { delay: *delay },
            Kind::DelWrite { buffer } => G::DelWrite {
                buffer: buffers
                    .get(*buffer as usize)
                    .copied()
                    .ok_or(Error::BufferNotFound(*buffer))?,
            },
            Kind::DelRead { buffer } => G::DelRead {
                buffer: buffers
                    .get(*buffer as usize)
                    .copied()
                    .ok_or(Error::BufferNotFound(*buffer))?,
            },
            Kind::Biquad { mode } => G::Biquad(match mode {
                BiquadMode::Lowpass => graph::BiquadMode::Lowpass,
                BiquadMode::Highpass => graph::BiquadMode::Highpass,
                BiquadMode::Bandpass => graph::BiquadMode::Bandpass,
            }),
            Kind::StageOutput { stage, index } => G::StageOutput {
                stage: stages
                    .get(*stage as usize)
                    .copied()
                    .ok_or(Error::StageNotFound(*stage))?,
                index: *index,
            },
            Kind::Discard => G::Discard,
        };
        Ok(kind)
    }
}
