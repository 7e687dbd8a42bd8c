//! Decode primitive interface.
//!
//! The worklist decoder never looks at opcode bytes itself. It asks a
//! [`DecodePrimitive`] for one [`InstructionCursor`] per executable region
//! and consumes only the classification each decoded instruction carries.

use std::fmt::Debug;
use std::hash::Hash;

/// Control-transfer classification of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowControlKind {
    /// Falls through to the next instruction.
    Sequential,
    UnconditionalBranch,
    ConditionalBranch,
    /// Direct or indirect call; execution resumes after it.
    Call,
    /// Jump through a register or memory operand.
    IndirectBranch,
    Return,
    Interrupt,
    /// Faulting or undefined instruction.
    Exception,
    /// Transactional-memory begin/abort/end.
    SpecialTransaction,
    /// Intentional trap such as `ud2`: not an error and not a feature use.
    Trap,
}

impl FlowControlKind {
    /// Flow kinds after which decoding may continue in the same region.
    pub fn falls_through(self) -> bool {
        matches!(
            self,
            FlowControlKind::Sequential
                | FlowControlKind::ConditionalBranch
                | FlowControlKind::Call
                | FlowControlKind::SpecialTransaction
                | FlowControlKind::Trap
        )
    }
}

/// One decoded instruction as seen by the traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction<F: 'static> {
    pub address: u64,
    pub length: usize,
    pub next_address: u64,
    pub flow: FlowControlKind,
    /// Near-branch target when it is encoded in the instruction.
    pub branch_target: Option<u64>,
    pub is_valid: bool,
    pub features: &'static [F],
}

/// A decoder positioned inside one region's bytes.
///
/// Decoding must never fail: malformed bytes come back with
/// `is_valid == false`.
pub trait InstructionCursor {
    type Feature: Copy + Eq + Hash + Debug + 'static;

    /// Move to `offset` within the region. Returns `false` if out of range.
    fn seek(&mut self, offset: usize) -> bool;

    /// Whether any bytes remain at the current position.
    fn has_remaining(&self) -> bool;

    /// Decode the instruction at the current position and advance past it.
    fn decode(&mut self) -> DecodedInstruction<Self::Feature>;
}

/// Factory for per-region instruction cursors.
pub trait DecodePrimitive {
    type Feature: Copy + Eq + Hash + Debug + 'static;
    type Cursor<'a>: InstructionCursor<Feature = Self::Feature>
    where
        Self: 'a;

    /// Bind a cursor to `bytes`, loaded at `base_address`.
    fn cursor<'a>(&'a self, bytes: &'a [u8], base_address: u64) -> Self::Cursor<'a>;
}
