//! Bitwise opcodes (§4.6 "Bitwise"): NOT/AND/OR/XOR, and the shift/rotate family.
//! Integer registers only — a float anchor register is illegal-op.

use crate::error::Fault;
use crate::flags::{self, Width};
use crate::instruction::{DecodedInst, Operand, RegisterRef};

use super::{read_int, resolve_value_fixed, resolve_value_int, write_int};

fn dest_reg(inst: &DecodedInst) -> Result<RegisterRef, Fault> {
    match inst.operands[0] {
        Operand::Register(reg) if !reg.is_float() => Ok(reg),
        _ => Err(Fault::IllegalOperation),
    }
}

pub fn exec_not(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst) -> Result<(), Fault> {
    let dest = dest_reg(inst)?;
    let width = dest.int_width().unwrap();
    let result = !read_int(cpu, dest)? & width.mask();
    write_int(cpu, dest, result)?;
    flags::update_flags(&mut cpu.regs.flags, flags::flags_logic(result, width));
    Ok(())
}

fn binary_logic(
    cpu: &mut crate::cpu::Cpu,
    inst: &DecodedInst,
    op: impl Fn(u32, u32) -> u32,
) -> Result<(), Fault> {
    let dest = dest_reg(inst)?;
    let width = dest.int_width().unwrap();
    let a = read_int(cpu, dest)?;
    let b = resolve_value_int(cpu, &inst.operands[1], width)?;
    let result = op(a, b) & width.mask();
    write_int(cpu, dest, result)?;
    flags::update_flags(&mut cpu.regs.flags, flags::flags_logic(result, width));
    Ok(())
}

pub fn exec_and(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst) -> Result<(), Fault> {
    binary_logic(cpu, inst, |a, b| a & b)
}

pub fn exec_or(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst) -> Result<(), Fault> {
    binary_logic(cpu, inst, |a, b| a | b)
}

pub fn exec_xor(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst) -> Result<(), Fault> {
    binary_logic(cpu, inst, |a, b| a ^ b)
}

/// Shift/rotate amount operand is fixed-width (one byte), independent of the dest
/// register's width.
fn shift_amount(cpu: &crate::cpu::Cpu, inst: &DecodedInst) -> Result<u32, Fault> {
    resolve_value_fixed(cpu, &inst.operands[1], Width::Byte)
}

pub fn exec_lshift(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst) -> Result<(), Fault> {
    let dest = dest_reg(inst)?;
    let width = dest.int_width().unwrap();
    let a = read_int(cpu, dest)?;
    let n = shift_amount(cpu, inst)?;
    let (result, carry) = if n == 0 {
        (a, false)
    } else if n >= width.bits() {
        (0, n == width.bits() && (a & 1) != 0)
    } else {
        (a << n, (a >> (width.bits() - n)) & 1 != 0)
    };
    let result = result & width.mask();
    write_int(cpu, dest, result)?;
    flags::update_flags(&mut cpu.regs.flags, flags::flags_shift(result, carry, width));
    Ok(())
}

pub fn exec_urshift(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst) -> Result<(), Fault> {
    let dest = dest_reg(inst)?;
    let width = dest.int_width().unwrap();
    let a = read_int(cpu, dest)? & width.mask();
    let n = shift_amount(cpu, inst)?;
    let (result, carry) = if n == 0 {
        (a, false)
    } else if n >= width.bits() {
        (0, n == width.bits() && (a >> (width.bits() - 1)) & 1 != 0)
    } else {
        (a >> n, (a >> (n - 1)) & 1 != 0)
    };
    write_int(cpu, dest, result)?;
    flags::update_flags(&mut cpu.regs.flags, flags::flags_shift(result, carry, width));
    Ok(())
}

pub fn exec_srshift(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst) -> Result<(), Fault> {
    let dest = dest_reg(inst)?;
    let width = dest.int_width().unwrap();
    let a = read_int(cpu, dest)? & width.mask();
    let sign = a & width.sign_bit() != 0;
    let n = shift_amount(cpu, inst)?;
    let shift = n.min(width.bits());
    // Sign-extend to i32, arithmetic-shift, then mask back to width.
    let extended = (((a << (32 - width.bits())) as i32) >> (32 - width.bits())) as i64;
    let carry = if shift == 0 {
        false
    } else if n >= width.bits() {
        sign
    } else {
        (a >> (shift - 1)) & 1 != 0
    };
    let shifted = if shift == width.bits() {
        if sign { width.mask() } else { 0 }
    } else {
        ((extended >> shift) as u32) & width.mask()
    };
    write_int(cpu, dest, shifted)?;
    flags::update_flags(&mut cpu.regs.flags, flags::flags_shift(shifted, carry, width));
    Ok(())
}

pub fn exec_lrot(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst) -> Result<(), Fault> {
    let dest = dest_reg(inst)?;
    let width = dest.int_width().unwrap();
    let a = read_int(cpu, dest)? & width.mask();
    let n = shift_amount(cpu, inst)? % width.bits();
    let result = if n == 0 { a } else { ((a << n) | (a >> (width.bits() - n))) & width.mask() };
    write_int(cpu, dest, result)?;
    flags::update_flags(&mut cpu.regs.flags, flags::flags_logic(result, width) | (cpu.regs.flags & flags::C));
    Ok(())
}

pub fn exec_rrot(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst) -> Result<(), Fault> {
    let dest = dest_reg(inst)?;
    let width = dest.int_width().unwrap();
    let a = read_int(cpu, dest)? & width.mask();
    let n = shift_amount(cpu, inst)? % width.bits();
    let result = if n == 0 { a } else { ((a >> n) | (a << (width.bits() - n))) & width.mask() };
    write_int(cpu, dest, result)?;
    flags::update_flags(&mut cpu.regs.flags, flags::flags_logic(result, width) | (cpu.regs.flags & flags::C));
    Ok(())
}

/// LROTCARRY treats C as an extra bit adjacent to the register's top end, giving a
/// (width+1)-bit rotation.
pub fn exec_lrot_carry(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst) -> Result<(), Fault> {
    let dest = dest_reg(inst)?;
    let width = dest.int_width().unwrap();
    let total_bits = width.bits() + 1;
    let a = read_int(cpu, dest)? & width.mask();
    let carry_in = if cpu.regs.flags & flags::C != 0 { 1u64 } else { 0 };
    let extended = ((a as u64) << 1) | carry_in;
    let n = (shift_amount(cpu, inst)? % total_bits) as u32;
    let mask = (1u64 << total_bits) - 1;
    let rotated = if n == 0 {
        extended
    } else {
        ((extended << n) | (extended >> (total_bits - n))) & mask
    };
    let new_carry = rotated & 1 != 0;
    let result = ((rotated >> 1) & width.mask() as u64) as u32;
    write_int(cpu, dest, result)?;
    let f = flags::flags_logic(result, width) | if new_carry { flags::C } else { 0 };
    flags::update_flags(&mut cpu.regs.flags, f);
    Ok(())
}

pub fn exec_rrot_carry(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst) -> Result<(), Fault> {
    let dest = dest_reg(inst)?;
    let width = dest.int_width().unwrap();
    let total_bits = width.bits() + 1;
    let a = read_int(cpu, dest)? & width.mask();
    let carry_in = if cpu.regs.flags & flags::C != 0 { 1u64 } else { 0 };
    let extended = (carry_in << width.bits()) | a as u64;
    let n = (shift_amount(cpu, inst)? % total_bits) as u32;
    let mask = (1u64 << total_bits) - 1;
    let rotated = if n == 0 {
        extended
    } else {
        ((extended >> n) | (extended << (total_bits - n))) & mask
    };
    let new_carry = rotated & (1 << width.bits()) != 0;
    let result = (rotated & width.mask() as u64) as u32;
    write_int(cpu, dest, result)?;
    let f = flags::flags_logic(result, width) | if new_carry { flags::C } else { 0 };
    flags::update_flags(&mut cpu.regs.flags, f);
    Ok(())
}
