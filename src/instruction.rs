//! Decoded instruction representation.
//!
//! Every instruction is `opcode(1 byte) operand...`. Operand count and kind are
//! fixed per opcode; where a literal's width is "variable" (§4.5 step 2), it is
//! driven by the width of the register reference decoded immediately before it —
//! the decoder must not pre-size the instruction.

use crate::error::Fault;
use crate::flags::Width;
use crate::registers::SpecialReg;

/// A fully decoded instruction, ready for the executor.
#[derive(Debug, Clone)]
pub struct DecodedInst {
    /// Length of the encoded instruction in bytes, including the opcode.
    pub length: u32,
    pub opcode: Opcode,
    pub operands: [Operand; 3],
    pub operand_count: u8,
}

impl DecodedInst {
    pub fn operand(&self, i: usize) -> &Operand {
        debug_assert!(i < self.operand_count as usize);
        &self.operands[i]
    }
}

/// The Version 2.0.0 opcode table (§6, §9 — this is the canonical revision).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Halt = 0x00,
    Pause = 0x01,
    Timer = 0x02,
    Usermode = 0x03,
    Ireturn = 0x04,
    Load = 0x05,
    Store = 0x06,
    Copy = 0x07,
    Swap = 0x08,
    Push = 0x09,
    Pop = 0x0A,
    BlockCopy = 0x0B,
    BlockSet = 0x0C,
    BlockCmp = 0x0D,
    Add = 0x0E,
    AddCarry = 0x0F,
    Sub = 0x10,
    SubBorrow = 0x11,
    Mult = 0x12,
    Sdiv = 0x13,
    Udiv = 0x14,
    Srem = 0x15,
    Urem = 0x16,
    Not = 0x17,
    And = 0x18,
    Or = 0x19,
    Xor = 0x1A,
    Lshift = 0x1B,
    Urshift = 0x1C,
    Srshift = 0x1D,
    Lrot = 0x1E,
    Rrot = 0x1F,
    LrotCarry = 0x20,
    RrotCarry = 0x21,
    Compare = 0x22,
    Jump = 0x23,
    Jequal = 0x24,
    Jnotequal = 0x25,
    Jlessthan = 0x26,
    Jgreaterthan = 0x27,
    Jlessorequal = 0x28,
    Jgreaterorequal = 0x29,
    Joverflow = 0x2A,
    Jnooverflow = 0x2B,
    Jcarry = 0x2C,
    Jnocarry = 0x2D,
    Call = 0x2E,
    Return = 0x2F,
    Syscall = 0x30,
    Sconvert = 0x31,
    Uconvert = 0x32,
}

impl Opcode {
    /// Decode a raw opcode byte, or `None` for unmapped opcodes (§7: unmapped
    /// opcode is an illegal-operation fault).
    pub fn from_byte(b: u8) -> Option<Opcode> {
        use Opcode::*;
        Some(match b {
            0x00 => Halt,
            0x01 => Pause,
            0x02 => Timer,
            0x03 => Usermode,
            0x04 => Ireturn,
            0x05 => Load,
            0x06 => Store,
            0x07 => Copy,
            0x08 => Swap,
            0x09 => Push,
            0x0A => Pop,
            0x0B => BlockCopy,
            0x0C => BlockSet,
            0x0D => BlockCmp,
            0x0E => Add,
            0x0F => AddCarry,
            0x10 => Sub,
            0x11 => SubBorrow,
            0x12 => Mult,
            0x13 => Sdiv,
            0x14 => Udiv,
            0x15 => Srem,
            0x16 => Urem,
            0x17 => Not,
            0x18 => And,
            0x19 => Or,
            0x1A => Xor,
            0x1B => Lshift,
            0x1C => Urshift,
            0x1D => Srshift,
            0x1E => Lrot,
            0x1F => Rrot,
            0x20 => LrotCarry,
            0x21 => RrotCarry,
            0x22 => Compare,
            0x23 => Jump,
            0x24 => Jequal,
            0x25 => Jnotequal,
            0x26 => Jlessthan,
            0x27 => Jgreaterthan,
            0x28 => Jlessorequal,
            0x29 => Jgreaterorequal,
            0x2A => Joverflow,
            0x2B => Jnooverflow,
            0x2C => Jcarry,
            0x2D => Jnocarry,
            0x2E => Call,
            0x2F => Return,
            0x30 => Syscall,
            0x31 => Sconvert,
            0x32 => Uconvert,
            _ => return None,
        })
    }
}

/// A decoded register reference: which register, and (for integer registers) which
/// width. Encoded in one byte: bits [7:5] select the kind, bits [2:0] the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterRef {
    /// rN (32-bit).
    GprWord(u8),
    /// rNh (16-bit).
    GprHalf(u8),
    /// rNb (8-bit).
    GprByte(u8),
    /// fN (32-bit float).
    Fpr(u8),
    /// A privileged or non-privileged special register.
    Special(SpecialReg),
}

impl RegisterRef {
    /// Integer operand width, if this is an integer register reference.
    pub fn int_width(self) -> Option<Width> {
        match self {
            RegisterRef::GprWord(_) => Some(Width::Word),
            RegisterRef::GprHalf(_) => Some(Width::Half),
            RegisterRef::GprByte(_) => Some(Width::Byte),
            RegisterRef::Special(_) => Some(Width::Word),
            RegisterRef::Fpr(_) => None,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, RegisterRef::Fpr(_))
    }

    pub fn decode(byte: u8) -> Result<RegisterRef, Fault> {
        let kind = byte >> 5;
        let index = byte & 0x07;
        Ok(match kind {
            0 => RegisterRef::GprWord(index),
            1 => RegisterRef::GprHalf(index),
            2 => RegisterRef::GprByte(index),
            3 => RegisterRef::Fpr(index),
            4 => RegisterRef::Special(match index {
                0 => SpecialReg::Flags,
                1 => SpecialReg::Uspr,
                2 => SpecialReg::Kspr,
                3 => SpecialReg::Pdpr,
                4 => SpecialReg::Imr,
                5 => SpecialReg::Pfsr,
                _ => return Err(Fault::IllegalOperation),
            }),
            _ => return Err(Fault::IllegalOperation),
        })
    }
}

/// A single decoded operand.
#[derive(Debug, Clone, Copy)]
pub enum Operand {
    /// Unused operand slot.
    None,
    Register(RegisterRef),
    /// A literal integer value, at the width implied by the preceding register
    /// operand (or 32-bit for a literal address/word operand with no preceding
    /// register).
    ImmediateInt(u32),
    /// A literal float value (always 32-bit).
    ImmediateFloat(f32),
    /// A literal 32-bit address.
    Address(u32),
}
