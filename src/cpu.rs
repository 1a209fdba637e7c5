//! CPU emulation core — register file, fetch/decode/execute loop, interrupt entry
//! and return (§4.5, §4.7, §4.8).
//!
//! Grounded on the teacher's `cpu.rs`'s overall shape (a `Cpu` owning register state
//! plus a `run` loop that checks for pending work before each fetch, and a dedicated
//! `deliver_interrupt` for the atomic stack-push sequence) — reduced from the
//! teacher's three-mode x86 CPU (with its GDT/IDT descriptor machinery and
//! mode-recomputation-from-control-registers) to this architecture's two-mode
//! (kernel/user) CPU with a fixed interrupt vector table.

use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

use crate::bus::{MemoryBus, ROM_ENTRY};
use crate::decoder::{self, ByteFetcher};
use crate::devices::timer::Timer;
use crate::error::Fault;
use crate::flags::{self, Width};
use crate::instruction::{DecodedInst, Opcode, RegisterRef};
use crate::interrupts::InterruptController;
use crate::memory::AccessIntent;
use crate::registers::{GprIndex, RegisterFile};

/// Privilege mode. Determines whether the MMU is consulted (§4.3) and whether
/// privileged opcodes/registers are accessible (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Kernel,
    User,
}

/// Why [`Cpu::run`] returned control to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// HALT executed, or a double fault forced a halt.
    Halted,
    /// `request_stop` was called — used by the host to pump devices or shut down
    /// cleanly; not part of the guest-visible architecture.
    StopRequested,
}

/// The Simulatron CPU: register file, mode, program counter, and the small amount
/// of scheduling state the instruction cycle needs (§3 Interrupt state).
pub struct Cpu {
    pub regs: RegisterFile,
    pub mode: Mode,
    pub pc: u32,
    halted: bool,
    paused: bool,
    /// Whether the previously retired instruction was IRETURN — PAUSE's race-free
    /// contract (§4.9).
    last_was_ireturn: bool,
    stop_requested: bool,
    /// TIMER's target (§4.9). Not memory-mapped, so it lives on the CPU rather than
    /// on the bus's device table; absent until the host attaches one via
    /// `attach_timer`, which a standalone `Cpu` in a unit test need not do.
    timer: Option<Arc<Timer>>,
}

impl Cpu {
    /// Deterministic boot state (§3 Lifecycle): kernel mode, all registers zero,
    /// PC at the ROM entry point.
    pub fn new() -> Self {
        Cpu {
            regs: RegisterFile::new(),
            mode: Mode::Kernel,
            pc: ROM_ENTRY,
            halted: false,
            paused: false,
            last_was_ireturn: false,
            stop_requested: false,
            timer: None,
        }
    }

    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Attach the timer device TIMER arms. Done once at machine construction time.
    pub fn attach_timer(&mut self, timer: Arc<Timer>) {
        self.timer = Some(timer);
    }

    /// TIMER n: arm (or disarm, n=0) the periodic timer interrupt (§4.9). A no-op if
    /// no timer device is attached.
    pub fn set_timer_period(&mut self, n: u32) {
        if let Some(timer) = &self.timer {
            timer.set_period_ms(n);
        }
    }

    // ── Address path (§4.2, §4.3) ──

    /// Translate a CPU-issued address to a physical address. In kernel mode the MMU
    /// is bypassed entirely (§4.3: "Kernel-mode fetches, loads, and stores pass
    /// physical addresses straight to the bus"); in user mode a fault sets PFSR and
    /// is converted to the guest-visible `Fault::PageFault`.
    pub fn translate(
        &mut self,
        addr: u32,
        intent: AccessIntent,
        bus: &MemoryBus,
    ) -> Result<u32, Fault> {
        if self.mode == Mode::Kernel {
            return Ok(addr);
        }
        crate::memory::paging::Mmu::new()
            .translate(addr, intent, self.regs.pdpr, bus)
            .map_err(|code| {
                self.regs.pfsr = code as u32;
                Fault::PageFault(code)
            })
    }

    pub fn read_u8(&mut self, addr: u32, intent: AccessIntent, bus: &mut MemoryBus) -> Result<u8, Fault> {
        let phys = self.translate(addr, intent, bus)?;
        bus.read_byte(phys, intent)
    }

    pub fn write_u8(&mut self, addr: u32, value: u8, bus: &mut MemoryBus) -> Result<(), Fault> {
        let phys = self.translate(addr, AccessIntent::Write, bus)?;
        bus.write_byte(phys, value)
    }

    pub fn read_u16(&mut self, addr: u32, intent: AccessIntent, bus: &mut MemoryBus) -> Result<u16, Fault> {
        let hi = self.read_u8(addr, intent, bus)?;
        let lo = self.read_u8(addr.wrapping_add(1), intent, bus)?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    pub fn write_u16(&mut self, addr: u32, value: u16, bus: &mut MemoryBus) -> Result<(), Fault> {
        let bytes = value.to_be_bytes();
        self.write_u8(addr, bytes[0], bus)?;
        self.write_u8(addr.wrapping_add(1), bytes[1], bus)
    }

    pub fn read_u32(&mut self, addr: u32, intent: AccessIntent, bus: &mut MemoryBus) -> Result<u32, Fault> {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.read_u8(addr.wrapping_add(i as u32), intent, bus)?;
        }
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn write_u32(&mut self, addr: u32, value: u32, bus: &mut MemoryBus) -> Result<(), Fault> {
        for (i, b) in value.to_be_bytes().iter().enumerate() {
            self.write_u8(addr.wrapping_add(i as u32), *b, bus)?;
        }
        Ok(())
    }

    pub fn read_width(&mut self, addr: u32, width: Width, intent: AccessIntent, bus: &mut MemoryBus) -> Result<u32, Fault> {
        match width {
            Width::Byte => Ok(self.read_u8(addr, intent, bus)? as u32),
            Width::Half => Ok(self.read_u16(addr, intent, bus)? as u32),
            Width::Word => self.read_u32(addr, intent, bus),
        }
    }

    pub fn write_width(&mut self, addr: u32, width: Width, value: u32, bus: &mut MemoryBus) -> Result<(), Fault> {
        match width {
            Width::Byte => self.write_u8(addr, value as u8, bus),
            Width::Half => self.write_u16(addr, value as u16, bus),
            Width::Word => self.write_u32(addr, value, bus),
        }
    }

    /// Exchange a memory word of `width` for `value` in one bus operation (§4.6, §5:
    /// SWAP is atomic with respect to device observers). Each byte is still
    /// translated individually under both Read and Write intent first, so permission
    /// checks and page-fault reporting match every other width-aware access; only
    /// once every byte's translation succeeds does the actual exchange run, and it
    /// runs as a single [`MemoryBus::swap_range`] call rather than a read pass
    /// followed by a write pass.
    pub fn swap_width(&mut self, addr: u32, width: Width, value: u32, bus: &mut MemoryBus) -> Result<u32, Fault> {
        let n = width.bytes();
        let mut phys = [0u32; 4];
        for (i, slot) in phys.iter_mut().enumerate().take(n as usize) {
            let byte_addr = addr.wrapping_add(i as u32);
            self.translate(byte_addr, AccessIntent::Read, bus)?;
            *slot = self.translate(byte_addr, AccessIntent::Write, bus)?;
        }
        let phys = &phys[..n as usize];
        let contiguous = phys.windows(2).all(|w| w[1] == w[0].wrapping_add(1));

        let new_bytes = value.to_be_bytes();
        let new_bytes = &new_bytes[4 - n as usize..];
        let mut old_bytes = [0u8; 4];
        let old_bytes = &mut old_bytes[..n as usize];

        if contiguous {
            bus.swap_range(phys[0], new_bytes, old_bytes)?;
        } else {
            // Pathological page tables can map consecutive bytes of one word to
            // non-adjacent frames; fall back to per-byte exchange rather than
            // claiming a contiguity that isn't there.
            for (i, &p) in phys.iter().enumerate() {
                let mut one_old = [0u8; 1];
                bus.swap_range(p, &new_bytes[i..i + 1], &mut one_old)?;
                old_bytes[i] = one_old[0];
            }
        }
        Ok(u32::from_be_bytes({
            let mut full = [0u8; 4];
            full[4 - n as usize..].copy_from_slice(old_bytes);
            full
        }))
    }

    // ── Stack (§4.6: PUSH/POP/CALL/RETURN use the mode's own stack pointer) ──

    /// The active stack pointer: KSPR in kernel mode, USPR in user mode, regardless
    /// of the current page mapping (§4.6).
    pub fn stack_pointer(&self) -> u32 {
        match self.mode {
            Mode::Kernel => self.regs.kspr,
            Mode::User => self.regs.uspr,
        }
    }

    pub fn set_stack_pointer(&mut self, value: u32) {
        match self.mode {
            Mode::Kernel => self.regs.kspr = value,
            Mode::User => self.regs.uspr = value,
        }
    }

    // ── Privilege (§4.6) ──

    /// Whether the opcode is only executable in kernel mode.
    pub fn opcode_is_privileged(opcode: Opcode) -> bool {
        matches!(
            opcode,
            Opcode::Halt | Opcode::Pause | Opcode::Timer | Opcode::Usermode | Opcode::Ireturn
        )
    }

    /// Privilege and kind validation for a decoded register reference — raised as
    /// illegal-op for a privileged special register accessed in user mode, or an
    /// out-of-range GPR/FPR index (§4.6, §7).
    pub fn check_register_access(&self, reg: RegisterRef) -> Result<(), Fault> {
        if let RegisterRef::Special(special) = reg {
            if special.is_privileged() && self.mode == Mode::User {
                return Err(Fault::IllegalOperation);
            }
        }
        Ok(())
    }

    /// Raise `Fault::IllegalOperation` if the current opcode is privileged and the
    /// CPU is in user mode.
    pub fn check_opcode_privilege(&self, opcode: Opcode) -> Result<(), Fault> {
        if Self::opcode_is_privileged(opcode) && self.mode == Mode::User {
            Err(Fault::IllegalOperation)
        } else {
            Ok(())
        }
    }

    // ── Instruction cycle (§4.5) ──

    /// Run until halted or `request_stop` is called.
    pub fn run(&mut self, bus: &mut MemoryBus, interrupts: &Arc<Mutex<InterruptController>>) -> ExitReason {
        loop {
            if self.stop_requested {
                self.stop_requested = false;
                return ExitReason::StopRequested;
            }
            if self.halted {
                return ExitReason::Halted;
            }

            let servicable = interrupts.lock().unwrap().servicable(self.regs.imr);
            if let Some(n) = servicable {
                trace!(interrupt = n, "servicing interrupt");
                self.enter_interrupt(n, bus, interrupts);
                self.last_was_ireturn = false;
                continue;
            }

            if self.paused {
                // A spin-wait with a short sleep stands in for a condvar here — the
                // interrupt controller is shared across OS threads (§5) and this
                // loop only needs to notice a raise within a few milliseconds.
                std::thread::sleep(std::time::Duration::from_millis(1));
                continue;
            }

            self.step(bus, interrupts);
        }
    }

    /// Fetch, decode, and execute exactly one instruction, or service a fault at
    /// its own address (§7: "PC pointing at the faulting instruction, not the
    /// following one").
    fn step(&mut self, bus: &mut MemoryBus, interrupts: &Arc<Mutex<InterruptController>>) {
        let start_pc = self.pc;

        let decoded = {
            let mut fetcher = CpuFetcher { cpu: self, bus };
            decoder::decode(&mut fetcher)
        };

        let inst = match decoded {
            Ok(inst) => inst,
            Err(fault) => {
                self.pc = start_pc;
                self.service_fault(fault, bus, interrupts);
                return;
            }
        };

        let was_ireturn = inst.opcode == Opcode::Ireturn;
        match crate::executor::execute(self, &inst, bus) {
            Ok(()) => {
                self.last_was_ireturn = was_ireturn;
            }
            Err(fault) => {
                self.pc = start_pc;
                self.service_fault(fault, bus, interrupts);
            }
        }
    }

    /// Convert an execution-time fault into its interrupt number and deliver it
    /// immediately, at the instruction boundary where it occurred (§7).
    fn service_fault(&mut self, fault: Fault, bus: &mut MemoryBus, interrupts: &Arc<Mutex<InterruptController>>) {
        let n = fault.interrupt_number();
        interrupts.lock().unwrap().raise(n);
        debug!(?fault, interrupt = n, pc = self.pc, "fault at instruction boundary");
        self.enter_interrupt(n, bus, interrupts);
    }

    /// PAUSE: suspend the fetch loop, unless the previous retired instruction was
    /// IRETURN, in which case it returns immediately (§4.9's enable-then-wait race
    /// fix). Called by `executor::system`.
    pub fn pause(&mut self) {
        if !self.last_was_ireturn {
            self.paused = true;
        }
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    // ── Interrupt entry/return (§4.7, §4.8) ──

    /// Atomically push FLAGS, return address, and IMR to the kernel stack; mask all
    /// interrupts; clear `n` from pending; jump to its vector. A fault on any of
    /// these accesses is a double fault and halts the CPU unrecoverably.
    fn enter_interrupt(&mut self, n: u8, bus: &mut MemoryBus, interrupts: &Arc<Mutex<InterruptController>>) {
        let prior_mode = self.mode;
        self.mode = Mode::Kernel;

        let pushed_flags = (self.regs.flags & !flags::INTERRUPT_MODE)
            | if prior_mode == Mode::Kernel { flags::INTERRUPT_MODE } else { 0 };
        let return_addr = self.pc;
        let pushed_imr = self.regs.imr;

        let result: Result<(), Fault> = (|| {
            self.regs.kspr = self.regs.kspr.wrapping_sub(2);
            bus.write_u16(self.regs.kspr, pushed_flags)?;

            self.regs.kspr = self.regs.kspr.wrapping_sub(4);
            bus.write_u32(self.regs.kspr, return_addr)?;

            self.regs.kspr = self.regs.kspr.wrapping_sub(2);
            bus.write_u16(self.regs.kspr, pushed_imr)?;

            self.regs.imr = 0;
            interrupts.lock().unwrap().clear(n);

            let vector = bus.read_u32(n as u32 * 4, AccessIntent::Read)?;
            self.pc = vector;
            Ok(())
        })();

        if result.is_err() {
            warn!(interrupt = n, "double fault during interrupt entry, halting");
            self.halted = true;
        }
    }

    /// IRETURN: pop IMR, PC, FLAGS in reverse of entry order; restore mode from the
    /// popped FLAGS bit 15 (§4.8). Called by `executor::system`.
    pub fn interrupt_return(&mut self, bus: &mut MemoryBus) -> Result<(), Fault> {
        let imr = bus.read_u16(self.regs.kspr, AccessIntent::Read)?;
        self.regs.kspr = self.regs.kspr.wrapping_add(2);

        let pc = bus.read_u32(self.regs.kspr, AccessIntent::Read)?;
        self.regs.kspr = self.regs.kspr.wrapping_add(4);

        let popped_flags = bus.read_u16(self.regs.kspr, AccessIntent::Read)?;
        self.regs.kspr = self.regs.kspr.wrapping_add(2);

        self.regs.imr = imr;
        self.pc = pc;
        self.mode = if popped_flags & flags::INTERRUPT_MODE == 0 {
            Mode::User
        } else {
            Mode::Kernel
        };
        self.regs.flags = popped_flags & !flags::INTERRUPT_MODE;
        Ok(())
    }

    /// USERMODE: pop a virtual address off the kernel stack, clear FLAGS, switch to
    /// user mode, jump to that address (§4.9).
    pub fn enter_usermode(&mut self, bus: &mut MemoryBus) -> Result<(), Fault> {
        let target = bus.read_u32(self.regs.kspr, AccessIntent::Read)?;
        self.regs.kspr = self.regs.kspr.wrapping_add(4);
        self.regs.flags = 0;
        self.mode = Mode::User;
        self.pc = target;
        Ok(())
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapter letting [`decoder::decode`] fetch bytes through the CPU's address path
/// without coupling the decoder to `Cpu`/`MemoryBus` directly.
struct CpuFetcher<'a> {
    cpu: &'a mut Cpu,
    bus: &'a mut MemoryBus,
}

impl ByteFetcher for CpuFetcher<'_> {
    fn fetch_byte(&mut self) -> Result<u8, Fault> {
        let pc = self.cpu.pc;
        let byte = self.cpu.read_u8(pc, AccessIntent::Fetch, self.bus)?;
        self.cpu.pc = self.cpu.pc.wrapping_add(1);
        Ok(byte)
    }
}

/// Read an integer GPR at its full width regardless of the register reference's
/// declared width — used for address computation (rN is always 32-bit as an
/// address), matching `RegisterFile::read_gpr_full`.
pub fn gpr_index_of(reg: RegisterRef) -> Option<GprIndex> {
    match reg {
        RegisterRef::GprWord(i) | RegisterRef::GprHalf(i) | RegisterRef::GprByte(i) => {
            Some(GprIndex(i))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::disk::{Disk, DiskId};
    use crate::devices::{display::Display, keyboard::Keyboard, rom::Rom};
    use crate::memory::Dense;

    fn new_bus() -> (MemoryBus, Arc<Mutex<InterruptController>>) {
        let ic = Arc::new(Mutex::new(InterruptController::new()));
        let rom = Rom::new([0u8; 512]);
        let display = Display::new();
        let keyboard = Arc::new(Mutex::new(Keyboard::new(ic.clone())));
        let disk_a = Arc::new(Mutex::new(Disk::new(DiskId::A, ic.clone())));
        let disk_b = Arc::new(Mutex::new(Disk::new(DiskId::B, ic.clone())));
        let bus = MemoryBus::new(rom, display, keyboard, disk_a, disk_b, Box::new(Dense::new(1 << 16)));
        (bus, ic)
    }

    #[test]
    fn boot_state_is_kernel_mode_zeroed_at_rom_entry() {
        let cpu = Cpu::new();
        assert_eq!(cpu.mode, Mode::Kernel);
        assert_eq!(cpu.pc, ROM_ENTRY);
        assert_eq!(cpu.regs.flags, 0);
    }

    #[test]
    fn halt_sets_exit_reason() {
        let (mut bus, ic) = new_bus();
        let mut cpu = Cpu::new();
        cpu.halt();
        assert_eq!(cpu.run(&mut bus, &ic), ExitReason::Halted);
    }

    #[test]
    fn pause_after_ireturn_does_not_block() {
        let (_bus, _ic) = new_bus();
        let mut cpu = Cpu::new();
        cpu.last_was_ireturn = true;
        cpu.pause();
        assert!(!cpu.paused);
    }

    #[test]
    fn interrupt_entry_then_return_restores_prior_mode() {
        let (mut bus, ic) = new_bus();
        let mut cpu = Cpu::new();
        cpu.regs.kspr = 0x5000;
        cpu.regs.pdpr = 0;
        cpu.pc = 0x40;
        bus.write_u32(0 * 4, 0x9000).unwrap(); // vector[0]

        cpu.enter_interrupt(0, &mut bus, &ic);
        assert_eq!(cpu.mode, Mode::Kernel);
        assert_eq!(cpu.pc, 0x9000);

        cpu.interrupt_return(&mut bus).unwrap();
        assert_eq!(cpu.mode, Mode::Kernel); // booted in kernel mode, so bit 15 was 1
        assert_eq!(cpu.pc, 0x40);
        assert_eq!(cpu.regs.kspr, 0x5000);
    }
}
