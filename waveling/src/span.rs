// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, Waveling authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Defines positioning information for Waveling source code.
//!
//! Every token, syntax node, and diagnostic carries a [`Span`][]: a half-open byte range within
//! the UTF-8 source text.  Byte offsets are what the compiler passes around internally; the
//! [`PositionIndex`][] converts an offset into a 0-indexed line/column pair when a diagnostic is
//! rendered for a human.
//!
//! [`Span`]: struct.Span.html
//! [`PositionIndex`]: struct.PositionIndex.html

use std::fmt::Display;

/// A half-open range of bytes within a source file.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Span {
    /// UTF-8 byte offset of the first byte covered by this span.
    pub start: usize,
    /// UTF-8 byte offset one past the last byte covered by this span.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Span {
        Span { start, end }
    }

    /// A zero-length span at a particular offset.
    pub fn point(offset: usize) -> Span {
        Span {
            start: offset,
            end: offset,
        }
    }

    /// Returns the smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// A 0-indexed line/column position, produced from a byte offset by a [`PositionIndex`][].
///
/// [`PositionIndex`]: struct.PositionIndex.html
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Position {
    /// The 0-indexed line number containing the position.
    pub line: usize,
    /// The UTF-8 byte offset of the position within its containing line.
    pub column: usize,
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// Converts byte offsets into line/column positions for one source file.
///
/// The index records the byte offset at which each line starts.  Lines are separated by `\n`; a
/// `\r\n` sequence counts as a single separator, so CRLF sources produce the same positions as
/// their LF counterparts.
pub struct PositionIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl PositionIndex {
    pub fn new(source: &str) -> PositionIndex {
        let mut line_starts = vec![0];
        for (offset, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset + 1);
            }
        }
        PositionIndex {
            line_starts,
            len: source.len(),
        }
    }

    /// Returns the line/column position of a byte offset.  Offsets past the end of the source
    /// resolve to the end of the last line.
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line - 1,
        };
        Position {
            line,
            column: offset - self.line_starts[line],
        }
    }

    /// Returns the number of lines in the source.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}
