//! Shared harness for the end-to-end scenario tests (§8): a bus wired up exactly the
//! way `Machine::new` wires one, minus the host-level file/config validation.

use std::sync::{Arc, Mutex};

use simulatron::bus::MemoryBus;
use simulatron::devices::disk::{Disk, DiskId};
use simulatron::devices::keyboard::Keyboard;
use simulatron::devices::{display::Display, rom::Rom};
use simulatron::interrupts::InterruptController;
use simulatron::memory::{Sparse, RAM_SIZE};

pub const RAM_BASE: u32 = 0x0000_4000;
pub const DISK_A_REGS_BASE: u32 = 0x0000_1FEC;
pub const DISK_A_BUFFER_BASE: u32 = 0x0000_2000;
pub const KEYBOARD_BASE: u32 = 0x0000_19B0;

pub struct Harness {
    pub bus: MemoryBus,
    pub interrupts: Arc<Mutex<InterruptController>>,
    pub keyboard: Arc<Mutex<Keyboard>>,
    pub disk_a: Arc<Mutex<Disk>>,
    pub disk_b: Arc<Mutex<Disk>>,
}

/// Build a bus with a 512-byte ROM image and the full declared RAM region
/// (sparse-backed — a real allocation that size wouldn't fit), all devices wired to
/// one shared interrupt controller.
pub fn harness(rom_image: [u8; 512]) -> Harness {
    let interrupts = Arc::new(Mutex::new(InterruptController::new()));
    let rom = Rom::new(rom_image);
    let display = Display::new();
    let keyboard = Arc::new(Mutex::new(Keyboard::new(interrupts.clone())));
    let disk_a = Arc::new(Mutex::new(Disk::new(DiskId::A, interrupts.clone())));
    let disk_b = Arc::new(Mutex::new(Disk::new(DiskId::B, interrupts.clone())));
    let bus = MemoryBus::new(
        rom,
        display,
        keyboard.clone(),
        disk_a.clone(),
        disk_b.clone(),
        Box::new(Sparse::new(RAM_SIZE)),
    );
    Harness {
        bus,
        interrupts,
        keyboard,
        disk_a,
        disk_b,
    }
}

/// A 512-byte ROM image with `bytes` placed starting at offset `0x40 - 0x40 = 0` of
/// the image (ROM's own base is 0x40 in the physical map; the image itself is
/// zero-indexed).
pub fn rom_with_program(bytes: &[u8]) -> [u8; 512] {
    let mut image = [0u8; 512];
    image[..bytes.len()].copy_from_slice(bytes);
    image
}
