use std::ops::Range;

use crate::operation::Operation;

/// An ordered sequence of decoded operations, partitioned into three basic
/// blocks by two cut points: BB0 = `[0, bb1_start)`, BB1 = `[bb1_start,
/// bb2_start)`, BB2 = `[bb2_start, len)`.
///
/// The `loop`/`loop.pip` instruction itself is not stored as an operation;
/// its presence is recorded in `has_loop` and its target is implicit
/// (`bb1_start`).
#[derive(Debug, Clone)]
pub struct Program {
    pub operations: Vec<Operation>,
    pub bb1_start: usize,
    pub bb2_start: usize,
    pub has_loop: bool,
}

impl Program {
    pub fn bb0(&self) -> Range<usize> {
        0..self.bb1_start
    }

    pub fn bb1(&self) -> Range<usize> {
        self.bb1_start..self.bb2_start
    }

    pub fn bb2(&self) -> Range<usize> {
        self.bb2_start..self.operations.len()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
