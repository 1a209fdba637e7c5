//! Instruction decoder: fixed 1-byte opcode, then operands whose count and shape are
//! determined by the opcode, and whose literal widths (where variable) are driven by
//! the register reference decoded immediately before them (§4.5 step 2).
//!
//! Grounded on the teacher's `decoder.rs`'s structural role (fetch-through-the-
//! address-path, advance PC past every byte consumed) — the teacher's ModR/M/SIB/
//! REX/prefix machinery has no counterpart here, since this architecture's
//! instruction encoding has none of those.

use crate::error::Fault;
use crate::flags::Width;
use crate::instruction::{DecodedInst, Opcode, Operand, RegisterRef};

/// Supplies one byte at a time through the CPU's address path (MMU in user mode,
/// straight bus otherwise), advancing PC — implemented by `crate::cpu::Cpu`'s fetch
/// adapter so the decoder itself stays free of bus/MMU/mode concerns.
pub trait ByteFetcher {
    fn fetch_byte(&mut self) -> Result<u8, Fault>;
}

fn fetch_n(f: &mut dyn ByteFetcher, n: usize) -> Result<Vec<u8>, Fault> {
    (0..n).map(|_| f.fetch_byte()).collect()
}

fn decode_register(f: &mut dyn ByteFetcher) -> Result<RegisterRef, Fault> {
    RegisterRef::decode(f.fetch_byte()?)
}

/// A "value" operand: either a register (tag 0, 1 byte) or a literal whose width and
/// kind (int vs float) come from `anchor`, the register decoded just before it.
fn decode_value_for(f: &mut dyn ByteFetcher, anchor: RegisterRef) -> Result<Operand, Fault> {
    match f.fetch_byte()? {
        0 => Ok(Operand::Register(decode_register(f)?)),
        1 => {
            if anchor.is_float() {
                let bytes = fetch_n(f, 4)?;
                Ok(Operand::ImmediateFloat(f32::from_be_bytes(
                    bytes.try_into().unwrap(),
                )))
            } else {
                let width = anchor.int_width().unwrap();
                Ok(Operand::ImmediateInt(decode_literal_int(f, width)?))
            }
        }
        _ => Err(Fault::IllegalOperation),
    }
}

/// A "value" operand at a width fixed by the opcode rather than by a preceding
/// register (timer period, block length, fill byte, shift amount).
fn decode_value_fixed(f: &mut dyn ByteFetcher, width: Width) -> Result<Operand, Fault> {
    match f.fetch_byte()? {
        0 => Ok(Operand::Register(decode_register(f)?)),
        1 => Ok(Operand::ImmediateInt(decode_literal_int(f, width)?)),
        _ => Err(Fault::IllegalOperation),
    }
}

fn decode_literal_int(f: &mut dyn ByteFetcher, width: Width) -> Result<u32, Fault> {
    let bytes = fetch_n(f, width.bytes() as usize)?;
    let mut buf = [0u8; 4];
    buf[4 - bytes.len()..].copy_from_slice(&bytes);
    Ok(u32::from_be_bytes(buf))
}

/// An address operand: either register-indirect (tag 0, 1 byte holding a GPR index
/// whose full 32-bit value is the address) or a literal 4-byte address (tag 1).
fn decode_address(f: &mut dyn ByteFetcher) -> Result<Operand, Fault> {
    match f.fetch_byte()? {
        0 => {
            let idx = f.fetch_byte()? & 0x07;
            Ok(Operand::Register(RegisterRef::GprWord(idx)))
        }
        1 => {
            let bytes = fetch_n(f, 4)?;
            Ok(Operand::Address(u32::from_be_bytes(
                bytes.try_into().unwrap(),
            )))
        }
        _ => Err(Fault::IllegalOperation),
    }
}

struct Builder {
    operands: [Operand; 3],
    count: u8,
}

impl Builder {
    fn new() -> Self {
        Builder {
            operands: [Operand::None; 3],
            count: 0,
        }
    }

    fn push(&mut self, op: Operand) {
        self.operands[self.count as usize] = op;
        self.count += 1;
    }
}

/// Fetch and decode the next instruction. Counts bytes consumed (including the
/// opcode) into `length`; the caller is responsible for committing or discarding PC
/// advancement depending on whether the whole instruction (decode + execute)
/// succeeds (§7: a faulting instruction leaves PC at its own address, not advanced).
pub fn decode(f: &mut dyn ByteFetcher) -> Result<DecodedInst, Fault> {
    let mut length = 1u32;
    let mut count_byte = |n: u32| length += n;

    let opcode_byte = f.fetch_byte()?;
    let opcode = Opcode::from_byte(opcode_byte).ok_or(Fault::IllegalOperation)?;

    let mut b = Builder::new();
    use Opcode::*;
    match opcode {
        Halt | Pause | Usermode | Ireturn | Return | Syscall => {}

        Timer => {
            let op = decode_value_fixed(f, Width::Word)?;
            count_byte(operand_len(&op, Width::Word));
            b.push(op);
        }

        Load => {
            let dest = decode_register(f)?;
            count_byte(1);
            b.push(Operand::Register(dest));
            let addr = decode_address(f)?;
            count_byte(operand_len(&addr, Width::Word));
            b.push(addr);
        }

        Store => {
            let addr = decode_address(f)?;
            count_byte(operand_len(&addr, Width::Word));
            b.push(addr);
            let src = decode_register(f)?;
            count_byte(1);
            b.push(Operand::Register(src));
        }

        Copy | Add | AddCarry | Sub | SubBorrow | Mult | Sdiv | Udiv | Srem | Urem | And | Or
        | Xor => {
            let dest = decode_register(f)?;
            count_byte(1);
            b.push(Operand::Register(dest));
            let src = decode_value_for(f, dest)?;
            count_byte(operand_len(&src, dest.int_width().unwrap_or(Width::Word)));
            b.push(src);
        }

        Not => {
            let dest = decode_register(f)?;
            count_byte(1);
            b.push(Operand::Register(dest));
        }

        Lshift | Urshift | Srshift | Lrot | Rrot | LrotCarry | RrotCarry => {
            let dest = decode_register(f)?;
            count_byte(1);
            b.push(Operand::Register(dest));
            let amount = decode_value_fixed(f, Width::Byte)?;
            count_byte(operand_len(&amount, Width::Byte));
            b.push(amount);
        }

        Compare => {
            let op1 = decode_register(f)?;
            count_byte(1);
            b.push(Operand::Register(op1));
            let op2 = decode_value_for(f, op1)?;
            count_byte(operand_len(&op2, op1.int_width().unwrap_or(Width::Word)));
            b.push(op2);
        }

        Swap => {
            let reg = decode_register(f)?;
            count_byte(1);
            b.push(Operand::Register(reg));
            let addr = decode_address(f)?;
            count_byte(operand_len(&addr, Width::Word));
            b.push(addr);
        }

        Push | Pop => {
            let reg = decode_register(f)?;
            count_byte(1);
            b.push(Operand::Register(reg));
        }

        BlockCopy => {
            let dst = decode_address(f)?;
            count_byte(operand_len(&dst, Width::Word));
            b.push(dst);
            let src = decode_address(f)?;
            count_byte(operand_len(&src, Width::Word));
            b.push(src);
            let len = decode_value_fixed(f, Width::Word)?;
            count_byte(operand_len(&len, Width::Word));
            b.push(len);
        }

        BlockSet => {
            let dst = decode_address(f)?;
            count_byte(operand_len(&dst, Width::Word));
            b.push(dst);
            let fill = decode_value_fixed(f, Width::Byte)?;
            count_byte(operand_len(&fill, Width::Byte));
            b.push(fill);
            let len = decode_value_fixed(f, Width::Word)?;
            count_byte(operand_len(&len, Width::Word));
            b.push(len);
        }

        BlockCmp => {
            let src1 = decode_address(f)?;
            count_byte(operand_len(&src1, Width::Word));
            b.push(src1);
            let src2 = decode_address(f)?;
            count_byte(operand_len(&src2, Width::Word));
            b.push(src2);
            let len = decode_value_fixed(f, Width::Word)?;
            count_byte(operand_len(&len, Width::Word));
            b.push(len);
        }

        Jump | Jequal | Jnotequal | Jlessthan | Jgreaterthan | Jlessorequal | Jgreaterorequal
        | Joverflow | Jnooverflow | Jcarry | Jnocarry | Call => {
            let target = decode_address(f)?;
            count_byte(operand_len(&target, Width::Word));
            b.push(target);
        }

        Sconvert | Uconvert => {
            let dest = decode_register(f)?;
            count_byte(1);
            b.push(Operand::Register(dest));
            let src = decode_register(f)?;
            count_byte(1);
            b.push(Operand::Register(src));
        }
    }

    Ok(DecodedInst {
        length,
        opcode,
        operands: b.operands,
        operand_count: b.count,
    })
}

/// Bytes consumed by an already-decoded operand, for length bookkeeping. Does not
/// re-fetch; purely arithmetic on the tag-byte-plus-payload shape every decode
/// helper above follows.
fn operand_len(op: &Operand, width: Width) -> u32 {
    match op {
        Operand::Register(_) => 2,    // tag byte + register-ref byte
        Operand::ImmediateInt(_) => 1 + width.bytes(),
        Operand::ImmediateFloat(_) => 1 + 4,
        Operand::Address(_) => 1 + 4,
        Operand::None => 0,
    }
}
