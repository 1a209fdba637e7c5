//! Top-level instruction executor and dispatch.
//!
//! [`execute`] is the single entry point the CPU's fetch/decode/execute loop calls
//! for each decoded instruction (§4.6). By the time it runs, `cpu.pc` already points
//! past the whole instruction — the decoder's [`ByteFetcher`](crate::decoder::ByteFetcher)
//! advances it one byte at a time during fetch (§4.5 step 2) — so only control-flow
//! opcodes need to touch `cpu.pc` themselves; everything else is a straight-line
//! operation on registers and memory.
//!
//! Grounded on the teacher's `executor/mod.rs`: a privilege check followed by an
//! opcode dispatch table, plus shared operand read/write helpers used by every
//! sub-module.

pub mod arith;
pub mod control;
pub mod data;
pub mod logic;
pub mod stack;
pub mod string;
pub mod system;

use crate::bus::MemoryBus;
use crate::cpu::Cpu;
use crate::error::Fault;
use crate::flags::Width;
use crate::instruction::{DecodedInst, Opcode, Operand, RegisterRef};
use crate::registers::GprIndex;

/// Execute one decoded instruction against `cpu`'s register file and `bus`.
pub fn execute(cpu: &mut Cpu, inst: &DecodedInst, bus: &mut MemoryBus) -> Result<(), Fault> {
    cpu.check_opcode_privilege(inst.opcode)?;

    use Opcode::*;
    match inst.opcode {
        Halt => system::exec_halt(cpu),
        Pause => system::exec_pause(cpu),
        Timer => system::exec_timer(cpu, inst),
        Usermode => system::exec_usermode(cpu, bus),
        Ireturn => system::exec_ireturn(cpu, bus),
        Syscall => Err(Fault::Syscall),

        Load => data::exec_load(cpu, inst, bus),
        Store => data::exec_store(cpu, inst, bus),
        Copy => data::exec_copy(cpu, inst),
        Swap => data::exec_swap(cpu, inst, bus),
        Sconvert => data::exec_sconvert(cpu, inst),
        Uconvert => data::exec_uconvert(cpu, inst),

        Push => stack::exec_push(cpu, inst, bus),
        Pop => stack::exec_pop(cpu, inst, bus),

        BlockCopy => string::exec_block_copy(cpu, inst, bus),
        BlockSet => string::exec_block_set(cpu, inst, bus),
        BlockCmp => string::exec_block_cmp(cpu, inst, bus),

        Add => arith::exec_add(cpu, inst, false),
        AddCarry => arith::exec_add(cpu, inst, true),
        Sub => arith::exec_sub(cpu, inst, false),
        SubBorrow => arith::exec_sub(cpu, inst, true),
        Mult => arith::exec_mult(cpu, inst),
        Sdiv => arith::exec_sdiv(cpu, inst),
        Udiv => arith::exec_udiv(cpu, inst),
        Srem => arith::exec_srem(cpu, inst),
        Urem => arith::exec_urem(cpu, inst),

        Not => logic::exec_not(cpu, inst),
        And => logic::exec_and(cpu, inst),
        Or => logic::exec_or(cpu, inst),
        Xor => logic::exec_xor(cpu, inst),
        Lshift => logic::exec_lshift(cpu, inst),
        Urshift => logic::exec_urshift(cpu, inst),
        Srshift => logic::exec_srshift(cpu, inst),
        Lrot => logic::exec_lrot(cpu, inst),
        Rrot => logic::exec_rrot(cpu, inst),
        LrotCarry => logic::exec_lrot_carry(cpu, inst),
        RrotCarry => logic::exec_rrot_carry(cpu, inst),

        Compare => control::exec_compare(cpu, inst),
        Jump => control::exec_jump(cpu, inst),
        Jequal | Jnotequal | Jlessthan | Jgreaterthan | Jlessorequal | Jgreaterorequal
        | Joverflow | Jnooverflow | Jcarry | Jnocarry => control::exec_conditional_jump(cpu, inst),
        Call => control::exec_call(cpu, inst, bus),
        Return => control::exec_return(cpu, bus),
    }
}

// ── Shared register access (privilege-checked, width-aware) ──

/// Read an integer register at its own declared width. Checks privilege but not
/// type — callers that need a specific width (e.g. matching an anchor register)
/// verify that separately.
pub fn read_int(cpu: &Cpu, reg: RegisterRef) -> Result<u32, Fault> {
    cpu.check_register_access(reg)?;
    match reg {
        RegisterRef::GprWord(i) => Ok(cpu.regs.read_gpr(GprIndex(i), Width::Word)),
        RegisterRef::GprHalf(i) => Ok(cpu.regs.read_gpr(GprIndex(i), Width::Half)),
        RegisterRef::GprByte(i) => Ok(cpu.regs.read_gpr(GprIndex(i), Width::Byte)),
        RegisterRef::Special(s) => Ok(cpu.regs.read_special(s)),
        RegisterRef::Fpr(_) => Err(Fault::IllegalOperation),
    }
}

pub fn write_int(cpu: &mut Cpu, reg: RegisterRef, value: u32) -> Result<(), Fault> {
    cpu.check_register_access(reg)?;
    match reg {
        RegisterRef::GprWord(i) => cpu.regs.write_gpr(GprIndex(i), Width::Word, value),
        RegisterRef::GprHalf(i) => cpu.regs.write_gpr(GprIndex(i), Width::Half, value),
        RegisterRef::GprByte(i) => cpu.regs.write_gpr(GprIndex(i), Width::Byte, value),
        RegisterRef::Special(s) => cpu.regs.write_special(s, value),
        RegisterRef::Fpr(_) => return Err(Fault::IllegalOperation),
    }
    Ok(())
}

pub fn read_float(cpu: &Cpu, reg: RegisterRef) -> Result<f32, Fault> {
    match reg {
        RegisterRef::Fpr(i) => Ok(cpu.regs.read_fpr(crate::registers::FprIndex(i))),
        _ => Err(Fault::IllegalOperation),
    }
}

pub fn write_float(cpu: &mut Cpu, reg: RegisterRef, value: f32) -> Result<(), Fault> {
    match reg {
        RegisterRef::Fpr(i) => {
            cpu.regs.write_fpr(crate::registers::FprIndex(i), value);
            Ok(())
        }
        _ => Err(Fault::IllegalOperation),
    }
}

/// The full 32-bit value of a GPR, used for address computation regardless of the
/// instruction's declared operand width (rN is always a 32-bit address).
fn gpr_full(cpu: &Cpu, index: u8) -> u32 {
    cpu.regs.read_gpr_full(GprIndex(index))
}

/// Resolve an address operand (§4.5: register-indirect via a GPR's full value, or a
/// literal 4-byte address).
pub fn operand_address(cpu: &Cpu, op: &Operand) -> Result<u32, Fault> {
    match op {
        Operand::Register(RegisterRef::GprWord(i)) => Ok(gpr_full(cpu, *i)),
        Operand::Address(a) => Ok(*a),
        _ => Err(Fault::IllegalOperation),
    }
}

/// Resolve an integer "value" operand against `width`, the anchor register's width
/// (§4.6: "Operands must share type ... of matching width"). A register operand of
/// a different width, or of float kind, is illegal-op.
pub fn resolve_value_int(cpu: &Cpu, op: &Operand, width: Width) -> Result<u32, Fault> {
    match op {
        Operand::Register(reg) => {
            if reg.int_width() != Some(width) {
                return Err(Fault::IllegalOperation);
            }
            read_int(cpu, *reg)
        }
        Operand::ImmediateInt(v) => Ok(v & width.mask()),
        _ => Err(Fault::IllegalOperation),
    }
}

/// Resolve a float "value" operand (register must be an `Fpr`, or a float literal).
pub fn resolve_value_float(cpu: &Cpu, op: &Operand) -> Result<f32, Fault> {
    match op {
        Operand::Register(reg) => read_float(cpu, *reg),
        Operand::ImmediateFloat(v) => Ok(*v),
        _ => Err(Fault::IllegalOperation),
    }
}

/// Resolve a fixed-width integer "value" operand not anchored to a register (block
/// lengths, shift amounts, the TIMER period).
pub fn resolve_value_fixed(cpu: &Cpu, op: &Operand, width: Width) -> Result<u32, Fault> {
    match op {
        Operand::Register(reg) => {
            let w = reg.int_width().ok_or(Fault::IllegalOperation)?;
            Ok(read_int(cpu, *reg)? & w.mask())
        }
        Operand::ImmediateInt(v) => Ok(v & width.mask()),
        _ => Err(Fault::IllegalOperation),
    }
}
