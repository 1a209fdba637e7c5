//! Keyboard: a 1-byte key buffer and a 1-byte metadata register, both read-only
//! (§6: 0x19B0-0x19B1). Grounded on the teacher's `devices/ps2.rs` scancode-queue
//! idiom, reduced to the single most-recent key this architecture exposes (no
//! scancode sets, no make/break codes — the host front-end hands over already
//! structured key events, §6).

use std::sync::{Arc, Mutex};

use super::Device;
use crate::error::Fault;
use crate::interrupts::InterruptController;

pub const SIZE: u32 = 2;

/// Metadata bit for the Ctrl modifier.
pub const META_CTRL: u8 = 1 << 0;
/// Metadata bit for the Alt modifier.
pub const META_ALT: u8 = 1 << 1;

/// A structured key event as produced by the (out-of-scope) display/keyboard
/// front-end (§6).
#[derive(Debug, Clone, Copy)]
pub struct KeyEvent {
    pub key: u8,
    pub ctrl: bool,
    pub alt: bool,
}

#[derive(Debug)]
pub struct Keyboard {
    key: u8,
    metadata: u8,
    interrupts: Arc<Mutex<InterruptController>>,
}

impl Keyboard {
    pub fn new(interrupts: Arc<Mutex<InterruptController>>) -> Self {
        Keyboard {
            key: 0,
            metadata: 0,
            interrupts,
        }
    }

    /// Called by the host-side input thread when a key event arrives.
    pub fn push_event(&mut self, event: KeyEvent) {
        self.key = event.key;
        self.metadata = (if event.ctrl { META_CTRL } else { 0 }) | (if event.alt { META_ALT } else { 0 });
        self.interrupts
            .lock()
            .unwrap()
            .raise(Fault::Keyboard.interrupt_number());
    }
}

impl Device for Keyboard {
    fn len(&self) -> u32 {
        SIZE
    }

    fn read(&mut self, offset: u32) -> u8 {
        match offset {
            0 => self.key,
            1 => self.metadata,
            _ => unreachable!("offset out of device bounds"),
        }
    }

    fn write(&mut self, _offset: u32, _value: u8) {
        unreachable!("bus must reject writes to the keyboard region before dispatch")
    }
}

/// Shared handle exposing a `Keyboard` as a `Device`, mirroring the disk
/// registers/buffer split (`devices::disk::DiskRegisters`) — the host pushes key
/// events through the same `Arc<Mutex<Keyboard>>` the bus reads from.
#[derive(Debug, Clone)]
pub struct KeyboardHandle(pub Arc<Mutex<Keyboard>>);

impl Device for KeyboardHandle {
    fn len(&self) -> u32 {
        SIZE
    }

    fn read(&mut self, offset: u32) -> u8 {
        self.0.lock().unwrap().read(offset)
    }

    fn write(&mut self, offset: u32, value: u8) {
        self.0.lock().unwrap().write(offset, value)
    }
}
