//! x86 / x86-64 decode primitive built on `iced-x86`.

use iced_x86::{
    CpuidFeature, Decoder, DecoderOptions, FlowControl, Instruction, Mnemonic, OpKind,
};

use super::decode::{DecodePrimitive, DecodedInstruction, FlowControlKind, InstructionCursor};
use crate::error::{Result, SamplerError};

/// Decode primitive for 16, 32 or 64-bit x86 code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcedPrimitive {
    bitness: u32,
}

impl IcedPrimitive {
    pub fn new(bitness: u32) -> Result<Self> {
        match bitness {
            16 | 32 | 64 => Ok(Self { bitness }),
            other => Err(SamplerError::UnsupportedArchitecture(format!(
                "x86 decoder cannot run at bitness {}",
                other
            ))),
        }
    }

    pub fn bitness(&self) -> u32 {
        self.bitness
    }
}

impl DecodePrimitive for IcedPrimitive {
    type Feature = CpuidFeature;
    type Cursor<'a> = IcedCursor<'a>;

    fn cursor<'a>(&'a self, bytes: &'a [u8], base_address: u64) -> IcedCursor<'a> {
        IcedCursor {
            decoder: Decoder::with_ip(self.bitness, bytes, base_address, DecoderOptions::NONE),
            base_address,
            len: bytes.len(),
            instr: Instruction::default(),
        }
    }
}

pub struct IcedCursor<'a> {
    decoder: Decoder<'a>,
    base_address: u64,
    len: usize,
    instr: Instruction,
}

impl InstructionCursor for IcedCursor<'_> {
    type Feature = CpuidFeature;

    fn seek(&mut self, offset: usize) -> bool {
        if offset >= self.len || self.decoder.set_position(offset).is_err() {
            return false;
        }
        self.decoder
            .set_ip(self.base_address.wrapping_add(offset as u64));
        true
    }

    fn has_remaining(&self) -> bool {
        self.decoder.can_decode()
    }

    fn decode(&mut self) -> DecodedInstruction<CpuidFeature> {
        self.decoder.decode_out(&mut self.instr);
        let instr = &self.instr;
        let flow = classify(instr);
        let branch_target = match flow {
            FlowControlKind::UnconditionalBranch
            | FlowControlKind::ConditionalBranch
            | FlowControlKind::Call
            | FlowControlKind::SpecialTransaction => near_branch_target(instr),
            _ => None,
        };
        DecodedInstruction {
            address: instr.ip(),
            length: instr.len(),
            next_address: instr.next_ip(),
            flow,
            branch_target,
            is_valid: !instr.is_invalid(),
            features: instr.cpuid_features(),
        }
    }
}

fn classify(instr: &Instruction) -> FlowControlKind {
    match instr.mnemonic() {
        Mnemonic::Ud2 => return FlowControlKind::Trap,
        // iced only flags xbegin; xabort and xend decode as `Next`.
        Mnemonic::Xbegin | Mnemonic::Xabort | Mnemonic::Xend => {
            return FlowControlKind::SpecialTransaction
        }
        _ => {}
    }
    match instr.flow_control() {
        FlowControl::Next => FlowControlKind::Sequential,
        FlowControl::UnconditionalBranch => FlowControlKind::UnconditionalBranch,
        FlowControl::ConditionalBranch => FlowControlKind::ConditionalBranch,
        FlowControl::Call | FlowControl::IndirectCall => FlowControlKind::Call,
        FlowControl::IndirectBranch => FlowControlKind::IndirectBranch,
        FlowControl::Return => FlowControlKind::Return,
        FlowControl::Interrupt => FlowControlKind::Interrupt,
        FlowControl::XbeginXabortXend => FlowControlKind::SpecialTransaction,
        FlowControl::Exception => FlowControlKind::Exception,
    }
}

fn near_branch_target(instr: &Instruction) -> Option<u64> {
    match instr.op0_kind() {
        OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
            Some(instr.near_branch_target())
        }
        _ => None,
    }
}
