// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Scalar types, value shapes, and rates.
//!
//! A value flowing along an edge has a _shape_ — a scalar type plus a channel count — and a
//! _rate_ describing how often it may change: once per program ([`Rate::Constant`][]), once per
//! block ([`Rate::Block`][]), or once per sample ([`Rate::Sample`][]).  Rates are totally ordered
//! (`C < B < S`); most node kinds produce the maximum of their input rates.
//!
//! [`Rate::Constant`]: enum.Rate.html
//! [`Rate::Block`]: enum.Rate.html
//! [`Rate::Sample`]: enum.Rate.html

use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;

//-------------------------------------------------------------------------------------------------
// Scalar types

/// The primitive scalar types.  Masks are `bool` semantically; their bit representation is a
/// backend concern.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    I32,
    I64,
    F32,
    F64,
    Bool,
}

impl ScalarType {
    pub fn is_integral(self) -> bool {
        matches!(self, ScalarType::I32 | ScalarType::I64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::F32 | ScalarType::F64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integral() || self.is_float()
    }

    /// Returns the join of two scalar types under the promotion lattice (`i32 ≤ i64`,
    /// `f32 ≤ f64`).  Integers do not promote to floats implicitly, and `bool` joins only with
    /// itself; those combinations return `None`.
    pub fn join(self, other: ScalarType) -> Option<ScalarType> {
        use ScalarType::*;
        match (self, other) {
            (a, b) if a == b => Some(a),
            (I32, I64) | (I64, I32) => Some(I64),
            (F32, F64) | (F64, F32) => Some(F64),
            _ => None,
        }
    }

    /// Returns whether a value of this type converts to `other` without an explicit conversion
    /// node, i.e. whether `other` is above it in the promotion lattice.
    pub fn promotes_to(self, other: ScalarType) -> bool {
        self.join(other) == Some(other)
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::I32 => "i32",
            ScalarType::I64 => "i64",
            ScalarType::F32 => "f32",
            ScalarType::F64 => "f64",
            ScalarType::Bool => "bool",
        }
    }

    pub fn from_name(name: &str) -> Option<ScalarType> {
        match name {
            "i32" => Some(ScalarType::I32),
            "i64" => Some(ScalarType::I64),
            "f32" => Some(ScalarType::F32),
            "f64" => Some(ScalarType::F64),
            "bool" => Some(ScalarType::Bool),
            _ => None,
        }
    }
}

impl Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

//-------------------------------------------------------------------------------------------------
// Shapes

/// The static signature of a pin: a scalar type and a channel count N ≥ 1.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Shape {
    pub scalar: ScalarType,
    pub width: u32,
}

impl Shape {
    pub fn new(scalar: ScalarType, width: u32) -> Shape {
        Shape { scalar, width }
    }

    /// A single-channel shape.
    pub fn scalar(scalar: ScalarType) -> Shape {
        Shape { scalar, width: 1 }
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.width == 1 {
            write!(f, "{}", self.scalar)
        } else {
            write!(f, "{}({})", self.scalar, self.width)
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Rates

/// How often a value may change.  The derived `Ord` gives `Constant < Block < Sample`, which is
/// the order rate arithmetic maximizes over.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rate {
    Constant,
    Block,
    Sample,
}

impl Rate {
    pub fn letter(self) -> char {
        match self {
            Rate::Constant => 'C',
            Rate::Block => 'B',
            Rate::Sample => 'S',
        }
    }
}

impl Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}
