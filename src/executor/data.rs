//! Data movement opcodes (§4.6 "Data movement"): LOAD/STORE/COPY/SWAP and the
//! integer↔float conversions SCONVERT/UCONVERT.

use crate::error::Fault;
use crate::flags::Width;
use crate::instruction::{DecodedInst, Operand, RegisterRef};
use crate::memory::AccessIntent;

use super::{operand_address, read_float, read_int, resolve_value_float, resolve_value_int, write_float, write_int};

fn reg_operand(op: &Operand) -> Result<RegisterRef, Fault> {
    match op {
        Operand::Register(reg) => Ok(*reg),
        _ => Err(Fault::IllegalOperation),
    }
}

/// LOAD: width implied by the destination register, big-endian.
pub fn exec_load(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst, bus: &mut crate::bus::MemoryBus) -> Result<(), Fault> {
    let dest = reg_operand(&inst.operands[0])?;
    let addr = operand_address(cpu, &inst.operands[1])?;
    if dest.is_float() {
        let bits = cpu.read_u32(addr, AccessIntent::Read, bus)?;
        write_float(cpu, dest, f32::from_bits(bits))?;
    } else {
        let width = dest.int_width().unwrap();
        let value = cpu.read_width(addr, width, AccessIntent::Read, bus)?;
        write_int(cpu, dest, value)?;
    }
    Ok(())
}

/// STORE: width implied by the source register.
pub fn exec_store(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst, bus: &mut crate::bus::MemoryBus) -> Result<(), Fault> {
    let addr = operand_address(cpu, &inst.operands[0])?;
    let src = reg_operand(&inst.operands[1])?;
    if src.is_float() {
        let value = read_float(cpu, src)?;
        cpu.write_u32(addr, value.to_bits(), bus)
    } else {
        let width = src.int_width().unwrap();
        let value = read_int(cpu, src)?;
        cpu.write_width(addr, width, value, bus)
    }
}

/// COPY: same-type registers only (§9: float↔int via COPY is superseded).
pub fn exec_copy(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst) -> Result<(), Fault> {
    let dest = reg_operand(&inst.operands[0])?;
    if dest.is_float() {
        let value = resolve_value_float(cpu, &inst.operands[1])?;
        write_float(cpu, dest, value)
    } else {
        let width = dest.int_width().unwrap();
        let value = resolve_value_int(cpu, &inst.operands[1], width)?;
        write_int(cpu, dest, value)
    }
}

/// SWAP: exchange a register and a memory word of the register's width, atomic
/// with respect to device observers (§4.6, §5).
pub fn exec_swap(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst, bus: &mut crate::bus::MemoryBus) -> Result<(), Fault> {
    let reg = reg_operand(&inst.operands[0])?;
    let addr = operand_address(cpu, &inst.operands[1])?;
    if reg.is_float() {
        let reg_val = read_float(cpu, reg)?;
        let mem_val = cpu.swap_width(addr, Width::Word, reg_val.to_bits(), bus)?;
        write_float(cpu, reg, f32::from_bits(mem_val))?;
    } else {
        let width = reg.int_width().unwrap();
        let reg_val = read_int(cpu, reg)?;
        let mem_val = cpu.swap_width(addr, width, reg_val, bus)?;
        write_int(cpu, reg, mem_val)?;
    }
    Ok(())
}

/// SCONVERT: signed integer register → float, or float → signed integer register.
pub fn exec_sconvert(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst) -> Result<(), Fault> {
    let dest = reg_operand(&inst.operands[0])?;
    let src = reg_operand(&inst.operands[1])?;
    match (dest.is_float(), src.is_float()) {
        (true, false) => {
            let width = src.int_width().ok_or(Fault::IllegalOperation)?;
            let raw = read_int(cpu, src)?;
            let signed = sign_extend(raw, width);
            write_float(cpu, dest, signed as f32)
        }
        (false, true) => {
            let width = dest.int_width().ok_or(Fault::IllegalOperation)?;
            let value = read_float(cpu, src)?;
            write_int(cpu, dest, (value as i32) as u32 & width.mask())
        }
        _ => Err(Fault::IllegalOperation),
    }
}

/// UCONVERT: unsigned integer register → float, or float → unsigned integer register.
pub fn exec_uconvert(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst) -> Result<(), Fault> {
    let dest = reg_operand(&inst.operands[0])?;
    let src = reg_operand(&inst.operands[1])?;
    match (dest.is_float(), src.is_float()) {
        (true, false) => {
            let raw = read_int(cpu, src)?;
            write_float(cpu, dest, raw as f32)
        }
        (false, true) => {
            let width = dest.int_width().ok_or(Fault::IllegalOperation)?;
            let value = read_float(cpu, src)?;
            write_int(cpu, dest, (value as u32) & width.mask())
        }
        _ => Err(Fault::IllegalOperation),
    }
}

fn sign_extend(value: u32, width: Width) -> i32 {
    let shift = 32 - width.bits();
    ((value << shift) as i32) >> shift
}
