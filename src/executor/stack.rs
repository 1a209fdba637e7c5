//! PUSH/POP (§4.6): decrement-then-store / load-then-increment on the active stack
//! pointer (KSPR in kernel mode, USPR in user mode).

use crate::error::Fault;
use crate::instruction::{DecodedInst, Operand, RegisterRef};
use crate::memory::AccessIntent;

use super::{read_float, read_int, write_float, write_int};

fn reg_operand(op: &Operand) -> Result<RegisterRef, Fault> {
    match op {
        Operand::Register(reg) => Ok(*reg),
        _ => Err(Fault::IllegalOperation),
    }
}

pub fn exec_push(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst, bus: &mut crate::bus::MemoryBus) -> Result<(), Fault> {
    let reg = reg_operand(&inst.operands[0])?;
    let width = reg.int_width().unwrap_or(crate::flags::Width::Word);
    let sp = cpu.stack_pointer().wrapping_sub(width.bytes());
    if reg.is_float() {
        let value = read_float(cpu, reg)?;
        cpu.write_u32(sp, value.to_bits(), bus)?;
    } else {
        let value = read_int(cpu, reg)?;
        cpu.write_width(sp, width, value, bus)?;
    }
    cpu.set_stack_pointer(sp);
    Ok(())
}

pub fn exec_pop(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst, bus: &mut crate::bus::MemoryBus) -> Result<(), Fault> {
    let reg = reg_operand(&inst.operands[0])?;
    let width = reg.int_width().unwrap_or(crate::flags::Width::Word);
    let sp = cpu.stack_pointer();
    if reg.is_float() {
        let bits = cpu.read_u32(sp, AccessIntent::Read, bus)?;
        write_float(cpu, reg, f32::from_bits(bits))?;
    } else {
        let value = cpu.read_width(sp, width, AccessIntent::Read, bus)?;
        write_int(cpu, reg, value)?;
    }
    cpu.set_stack_pointer(sp.wrapping_add(width.bytes()));
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
    use crate::interrupts::InterruptController;
    use crate::memory::Dense;
    use std::sync::{Arc, Mutex};

    fn new_bus() -> MemoryBus {
        let ic = Arc::new(Mutex::new(InterruptController::new()));
        let rom = Rom::new([0u8; 512]);
        let display = Display::new();
        let keyboard = Arc::new(Mutex::new(Keyboard::new(ic.clone())));
        let disk_a = Arc::new(Mutex::new(Disk::new(DiskId::A, ic.clone())));
        let disk_b = Arc::new(Mutex::new(Disk::new(DiskId::B, ic.clone())));
        MemoryBus::new(rom, display, keyboard, disk_a, disk_b, Box::new(Dense::new(1 << 16)))
    }

    #[test]
    fn push_then_pop_round_trips_and_restores_stack_pointer() {
        let mut bus = new_bus();
        let mut cpu = Cpu::new();
        cpu.regs.kspr = 0x6000;
        write_int(&mut cpu, RegisterRef::GprWord(0), 0xDEAD_BEEF).unwrap();

        let push = DecodedInst {
            length: 0,
            opcode: Opcode::Push,
            operands: [Operand::Register(RegisterRef::GprWord(0)), Operand::None, Operand::None],
            operand_count: 1,
        };
        exec_push(&mut cpu, &push, &mut bus).unwrap();
        assert_eq!(cpu.regs.kspr, 0x5FFC);

        let pop = DecodedInst {
            length: 0,
            opcode: Opcode::Pop,
            operands: [Operand::Register(RegisterRef::GprWord(1)), Operand::None, Operand::None],
            operand_count: 1,
        };
        exec_pop(&mut cpu, &pop, &mut bus).unwrap();
        assert_eq!(cpu.regs.kspr, 0x6000);
        assert_eq!(read_int(&cpu, RegisterRef::GprWord(1)).unwrap(), 0xDEAD_BEEF);
    }
}
