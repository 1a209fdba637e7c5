//! Privileged system opcodes (§4.9): HALT, PAUSE, TIMER, USERMODE, IRETURN. The
//! dispatcher in `executor::execute` already rejected these in user mode before
//! reaching here (§4.6 "Privilege").

use crate::error::Fault;
use crate::flags::Width;
use crate::instruction::DecodedInst;

use super::resolve_value_fixed;

pub fn exec_halt(cpu: &mut crate::cpu::Cpu) -> Result<(), Fault> {
    cpu.halt();
    Ok(())
}

pub fn exec_pause(cpu: &mut crate::cpu::Cpu) -> Result<(), Fault> {
    cpu.pause();
    Ok(())
}

pub fn exec_timer(cpu: &mut crate::cpu::Cpu, inst: &DecodedInst) -> Result<(), Fault> {
    let period = resolve_value_fixed(cpu, &inst.operands[0], Width::Word)?;
    cpu.set_timer_period(period);
    Ok(())
}

pub fn exec_usermode(cpu: &mut crate::cpu::Cpu, bus: &mut crate::bus::MemoryBus) -> Result<(), Fault> {
    cpu.enter_usermode(bus)
}

pub fn exec_ireturn(cpu: &mut crate::cpu::Cpu, bus: &mut crate::bus::MemoryBus) -> Result<(), Fault> {
    cpu.interrupt_return(bus)
}
