//! Block (bulk memory) opcodes (§4.2, §4.6): BLOCKCOPY, BLOCKSET, BLOCKCMP.
//!
//! Each iterates byte-by-byte through the CPU's address path so permissions and
//! device side-effects apply per byte. None of these commit a partial effect that
//! survives a fault mid-way — a byte access failing mid-loop returns the fault
//! immediately, the caller resets PC to the instruction's own start (§7), and the
//! whole operation is retried from its first byte next time (§4.2, §9).

use crate::error::Fault;
use crate::flags::{self, Width};
use crate::instruction::DecodedInst;
use crate::memory::AccessIntent;

use super::{operand_address, resolve_value_fixed};

pub fn exec_block_copy(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst, bus: &mut crate::bus::MemoryBus) -> Result<(), Fault> {
    let dst = operand_address(cpu, &inst.operands[0])?;
    let src = operand_address(cpu, &inst.operands[1])?;
    let len = resolve_value_fixed(cpu, &inst.operands[2], Width::Word)?;
    for i in 0..len {
        let byte = cpu.read_u8(src.wrapping_add(i), AccessIntent::Read, bus)?;
        cpu.write_u8(dst.wrapping_add(i), byte, bus)?;
    }
    Ok(())
}

pub fn exec_block_set(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst, bus: &mut crate::bus::MemoryBus) -> Result<(), Fault> {
    let dst = operand_address(cpu, &inst.operands[0])?;
    let fill = resolve_value_fixed(cpu, &inst.operands[1], Width::Byte)? as u8;
    let len = resolve_value_fixed(cpu, &inst.operands[2], Width::Word)?;
    for i in 0..len {
        cpu.write_u8(dst.wrapping_add(i), fill, bus)?;
    }
    Ok(())
}

/// BLOCKCMP: Z set if all `len` bytes match; otherwise N reflects the sign of
/// `src1 - src2` at the first differing byte, unsigned comparison (§4.6).
pub fn exec_block_cmp(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst, bus: &mut crate::bus::MemoryBus) -> Result<(), Fault> {
    let src1 = operand_address(cpu, &inst.operands[0])?;
    let src2 = operand_address(cpu, &inst.operands[1])?;
    let len = resolve_value_fixed(cpu, &inst.operands[2], Width::Word)?;

    let mut diverged = None;
    for i in 0..len {
        let a = cpu.read_u8(src1.wrapping_add(i), AccessIntent::Read, bus)?;
        let b = cpu.read_u8(src2.wrapping_add(i), AccessIntent::Read, bus)?;
        if a != b {
            diverged = Some((a, b));
            break;
        }
    }

    let result_flags = match diverged {
        None => flags::Z,
        Some((a, b)) => {
            if a < b {
                flags::N
            } else {
                0
            }
        }
    };
    flags::update_flags(&mut cpu.regs.flags, result_flags);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::cpu::Cpu;
    use crate::devices::disk::{Disk, DiskId};
    use crate::devices::{display::Display, keyboard::Keyboard, rom::Rom};
    use crate::instruction::Opcode;
    use crate::instruction::Operand;
    use crate::interrupts::InterruptController;
    use crate::memory::{Sparse, RAM_SIZE};
    use std::sync::{Arc, Mutex};

    fn new_bus() -> MemoryBus {
        let ic = Arc::new(Mutex::new(InterruptController::new()));
        let rom = Rom::new([0u8; 512]);
        let display = Display::new();
        let keyboard = Arc::new(Mutex::new(Keyboard::new(ic.clone())));
        let disk_a = Arc::new(Mutex::new(Disk::new(DiskId::A, ic.clone())));
        let disk_b = Arc::new(Mutex::new(Disk::new(DiskId::B, ic.clone())));
        MemoryBus::new(rom, display, keyboard, disk_a, disk_b, Box::new(Sparse::new(RAM_SIZE)))
    }

    #[test]
    fn block_copy_moves_bytes_lowest_address_first() {
        let mut bus = new_bus();
        let mut cpu = Cpu::new();
        for (i, b) in [1u8, 2, 3, 4].iter().enumerate() {
            cpu.write_u8(0x5000 + i as u32, *b, &mut bus).unwrap();
        }
        let i = DecodedInst {
            length: 0,
            opcode: Opcode::BlockCopy,
            operands: [Operand::Address(0x6000), Operand::Address(0x5000), Operand::ImmediateInt(4)],
            operand_count: 3,
        };
        exec_block_copy(&mut cpu, &i, &mut bus).unwrap();
        for (i, b) in [1u8, 2, 3, 4].iter().enumerate() {
            assert_eq!(cpu.read_u8(0x6000 + i as u32, AccessIntent::Read, &mut bus).unwrap(), *b);
        }
    }

    #[test]
    fn block_cmp_sets_zero_when_all_bytes_equal() {
        let mut bus = new_bus();
        let mut cpu = Cpu::new();
        for i in 0..4u32 {
            cpu.write_u8(0x5000 + i, 0xAB, &mut bus).unwrap();
            cpu.write_u8(0x6000 + i, 0xAB, &mut bus).unwrap();
        }
        let i = DecodedInst {
            length: 0,
            opcode: Opcode::BlockCmp,
            operands: [Operand::Address(0x5000), Operand::Address(0x6000), Operand::ImmediateInt(4)],
            operand_count: 3,
        };
        exec_block_cmp(&mut cpu, &i, &mut bus).unwrap();
        assert_ne!(cpu.regs.flags & flags::Z, 0);
    }
}
