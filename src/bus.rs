//! The memory bus: owns the region table and every device handle (§4.2).
//!
//! Grounded on the teacher's `memory/mmio.rs::MmioDispatch` (a `Vec` of regions with
//! fast-reject min/max bounds, linear scan, handler trait objects) generalized so a
//! single device can be addressed by more than one region at different directions —
//! needed because the disk register window mixes read-only and write-only bytes at
//! fixed offsets within what is otherwise one device (§6).

use crate::devices::disk::{Disk, DiskBuffer, DiskRegisters};
use crate::devices::display::Display;
use crate::devices::keyboard::{Keyboard, KeyboardHandle};
use crate::devices::rom::Rom;
use crate::devices::Device;
use crate::error::{Fault, PageFaultCode};
use crate::memory::paging::PhysicalRead;
use crate::memory::{AccessIntent, PhysicalStore, RAM_BASE};
use std::sync::{Arc, Mutex};

/// Direction a region permits (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
    Both,
    Neither,
}

impl Direction {
    fn permits(self, intent: AccessIntent) -> bool {
        match self {
            Direction::Both => true,
            Direction::Neither => false,
            Direction::Read => matches!(intent, AccessIntent::Read | AccessIntent::Fetch),
            Direction::Write => matches!(intent, AccessIntent::Write),
        }
    }
}

struct Region {
    base: u32,
    size: u32,
    direction: Direction,
    /// Offset passed to the handler is `addr - device_base`, which may differ from
    /// `base` when several regions with different directions address the same
    /// device at fixed sub-offsets (the disk register window).
    device_base: u32,
    handler: Box<dyn Device>,
}

impl Region {
    fn contains(&self, addr: u32) -> bool {
        addr >= self.base && addr < self.base + self.size
    }
}

const INTERRUPT_VECTOR_BASE: u32 = 0x0000_0000;
const INTERRUPT_VECTOR_SIZE: u32 = 0x20;
const RESERVED_LOW_BASE: u32 = 0x0000_0020;
const RESERVED_LOW_SIZE: u32 = 0x20;
const ROM_BASE: u32 = 0x0000_0040;
/// Boot PC (§8 scenario 1: "Boot with kernel mode; PC=0x40").
pub const ROM_ENTRY: u32 = ROM_BASE;
const DISPLAY_BASE: u32 = 0x0000_0240;
const KEYBOARD_BASE: u32 = 0x0000_19B0;
const RESERVED_MID_BASE: u32 = 0x0000_19B2;
const RESERVED_MID_SIZE: u32 = 0x0000_1FEC - RESERVED_MID_BASE;
const DISK_A_REGS_BASE: u32 = 0x0000_1FEC;
const DISK_B_REGS_BASE: u32 = 0x0000_1FF6;
const DISK_A_BUFFER_BASE: u32 = 0x0000_2000;
const DISK_B_BUFFER_BASE: u32 = 0x0000_3000;

/// A trivial read/write memory region with no device logic, used for the interrupt
/// vector (plain RAM-like storage at a fixed low address).
#[derive(Debug)]
struct RawBytes(Vec<u8>);

impl Device for RawBytes {
    fn len(&self) -> u32 {
        self.0.len() as u32
    }
    fn read(&mut self, offset: u32) -> u8 {
        self.0[offset as usize]
    }
    fn write(&mut self, offset: u32, value: u8) {
        self.0[offset as usize] = value;
    }
}

#[derive(Debug)]
struct NeitherDirection;

impl Device for NeitherDirection {
    fn len(&self) -> u32 {
        u32::MAX
    }
    fn read(&mut self, _offset: u32) -> u8 {
        unreachable!("bus must reject all access to Neither-direction regions")
    }
    fn write(&mut self, _offset: u32, _value: u8) {
        unreachable!("bus must reject all access to Neither-direction regions")
    }
}

pub struct MemoryBus {
    regions: Vec<Region>,
    ram: Box<dyn PhysicalStore>,
}

impl MemoryBus {
    pub fn new(
        rom: Rom,
        display: Display,
        keyboard: Arc<Mutex<Keyboard>>,
        disk_a: Arc<Mutex<Disk>>,
        disk_b: Arc<Mutex<Disk>>,
        ram: Box<dyn PhysicalStore>,
    ) -> Self {
        let mut regions = Vec::new();

        regions.push(Region {
            base: INTERRUPT_VECTOR_BASE,
            size: INTERRUPT_VECTOR_SIZE,
            direction: Direction::Both,
            device_base: INTERRUPT_VECTOR_BASE,
            handler: Box::new(RawBytes(vec![0u8; INTERRUPT_VECTOR_SIZE as usize])),
        });
        regions.push(Region {
            base: RESERVED_LOW_BASE,
            size: RESERVED_LOW_SIZE,
            direction: Direction::Neither,
            device_base: RESERVED_LOW_BASE,
            handler: Box::new(NeitherDirection),
        });
        regions.push(Region {
            base: ROM_BASE,
            size: crate::devices::rom::SIZE,
            direction: Direction::Read,
            device_base: ROM_BASE,
            handler: Box::new(rom),
        });
        regions.push(Region {
            base: DISPLAY_BASE,
            size: crate::devices::display::SIZE,
            direction: Direction::Write,
            device_base: DISPLAY_BASE,
            handler: Box::new(display),
        });
        regions.push(Region {
            base: KEYBOARD_BASE,
            size: crate::devices::keyboard::SIZE,
            direction: Direction::Read,
            device_base: KEYBOARD_BASE,
            handler: Box::new(KeyboardHandle(keyboard)),
        });
        regions.push(Region {
            base: RESERVED_MID_BASE,
            size: RESERVED_MID_SIZE,
            direction: Direction::Neither,
            device_base: RESERVED_MID_BASE,
            handler: Box::new(NeitherDirection),
        });

        push_disk_regions(&mut regions, DISK_A_REGS_BASE, disk_a.clone());
        push_disk_regions(&mut regions, DISK_B_REGS_BASE, disk_b.clone());

        regions.push(Region {
            base: DISK_A_BUFFER_BASE,
            size: crate::devices::disk::BLOCK_SIZE,
            direction: Direction::Both,
            device_base: DISK_A_BUFFER_BASE,
            handler: Box::new(DiskBuffer(disk_a)),
        });
        regions.push(Region {
            base: DISK_B_BUFFER_BASE,
            size: crate::devices::disk::BLOCK_SIZE,
            direction: Direction::Both,
            device_base: DISK_B_BUFFER_BASE,
            handler: Box::new(DiskBuffer(disk_b)),
        });

        MemoryBus { regions, ram }
    }

    fn find_region(&mut self, addr: u32) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| r.contains(addr))
    }

    /// Read one byte at a physical address, enforcing region direction (§4.2).
    pub fn read_byte(&mut self, addr: u32, intent: AccessIntent) -> Result<u8, Fault> {
        if addr >= RAM_BASE {
            let offset = addr - RAM_BASE;
            return if offset < self.ram.len() {
                Ok(self.ram.read_byte(offset))
            } else {
                Err(Fault::IllegalOperation)
            };
        }
        match self.find_region(addr) {
            Some(region) if region.direction.permits(intent) => {
                let offset = addr - region.device_base;
                Ok(region.handler.read(offset))
            }
            _ => Err(Fault::IllegalOperation),
        }
    }

    /// Write one byte at a physical address, enforcing region direction (§4.2).
    pub fn write_byte(&mut self, addr: u32, value: u8) -> Result<(), Fault> {
        if addr >= RAM_BASE {
            let offset = addr - RAM_BASE;
            return if offset < self.ram.len() {
                self.ram.write_byte(offset, value);
                Ok(())
            } else {
                Err(Fault::IllegalOperation)
            };
        }
        match self.find_region(addr) {
            Some(region) if region.direction.permits(AccessIntent::Write) => {
                let offset = addr - region.device_base;
                region.handler.write(offset, value);
                Ok(())
            }
            _ => Err(Fault::IllegalOperation),
        }
    }

    pub fn read_u16(&mut self, addr: u32, intent: AccessIntent) -> Result<u16, Fault> {
        let hi = self.read_byte(addr, intent)?;
        let lo = self.read_byte(addr.wrapping_add(1), intent)?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    pub fn write_u16(&mut self, addr: u32, value: u16) -> Result<(), Fault> {
        let bytes = value.to_be_bytes();
        self.write_byte(addr, bytes[0])?;
        self.write_byte(addr.wrapping_add(1), bytes[1])
    }

    pub fn read_u32(&mut self, addr: u32, intent: AccessIntent) -> Result<u32, Fault> {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.read_byte(addr.wrapping_add(i as u32), intent)?;
        }
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), Fault> {
        for (i, b) in value.to_be_bytes().iter().enumerate() {
            self.write_byte(addr.wrapping_add(i as u32), *b)?;
        }
        Ok(())
    }

    /// Exchange `new_bytes` into `[addr, addr + new_bytes.len())` in a single bus
    /// operation, writing the previous contents into `old_bytes` (§4.6, §5: SWAP is
    /// the one instruction the bus must treat as indivisible with respect to device
    /// observers, rather than the usual per-byte access pattern). The whole range
    /// must fall inside RAM or a single region permitting both directions — a range
    /// straddling two regions faults rather than exchanging bytes on either side of
    /// the boundary.
    pub fn swap_range(&mut self, addr: u32, new_bytes: &[u8], old_bytes: &mut [u8]) -> Result<(), Fault> {
        let len = new_bytes.len() as u32;
        if addr >= RAM_BASE {
            let offset = addr - RAM_BASE;
            return match offset.checked_add(len) {
                Some(end) if end <= self.ram.len() => {
                    self.ram.read_block(offset, old_bytes);
                    self.ram.write_block(offset, new_bytes);
                    Ok(())
                }
                _ => Err(Fault::IllegalOperation),
            };
        }
        match self.find_region(addr) {
            Some(region)
                if region.direction.permits(AccessIntent::Read)
                    && region.direction.permits(AccessIntent::Write)
                    && addr + len <= region.base + region.size =>
            {
                let offset = addr - region.device_base;
                region.handler.swap_block(offset, new_bytes, old_bytes);
                Ok(())
            }
            _ => Err(Fault::IllegalOperation),
        }
    }

    /// Convert an MMU page-fault code into the guest-visible fault, for callers that
    /// already ran translation.
    pub fn fault_from_code(code: PageFaultCode) -> Fault {
        Fault::PageFault(code)
    }
}

impl PhysicalRead for MemoryBus {
    /// Page table reads are not themselves subject to region-direction enforcement
    /// (§4.3) — only the V/P/R/W/E/C bits govern translation outcomes. Page tables
    /// live in RAM; a PDPR pointing elsewhere reads as zero (an invalid entry).
    fn read_phys_u32(&self, addr: u32) -> u32 {
        if addr >= RAM_BASE && addr + 4 <= RAM_BASE + self.ram.len() {
            self.ram.read_u32(addr - RAM_BASE)
        } else {
            0
        }
    }
}

fn push_disk_regions(regions: &mut Vec<Region>, base: u32, disk: Arc<Mutex<Disk>>) {
    // status (1, Read), blocks_available (4, Read), block_address (4, Write),
    // command (1, Write) — all sharing one `Disk` but exposed at different
    // directions, so each gets its own region entry at the same `device_base`.
    regions.push(Region {
        base,
        size: 1,
        direction: Direction::Read,
        device_base: base,
        handler: Box::new(DiskRegisters(disk.clone())),
    });
    regions.push(Region {
        base: base + 1,
        size: 4,
        direction: Direction::Read,
        device_base: base,
        handler: Box::new(DiskRegisters(disk.clone())),
    });
    regions.push(Region {
        base: base + 5,
        size: 4,
        direction: Direction::Write,
        device_base: base,
        handler: Box::new(DiskRegisters(disk.clone())),
    });
    regions.push(Region {
        base: base + 9,
        size: 1,
        direction: Direction::Write,
        device_base: base,
        handler: Box::new(DiskRegisters(disk)),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::disk::DiskId;
    use crate::interrupts::InterruptController;
    use crate::memory::Dense;

    fn new_bus() -> MemoryBus {
        let ic = Arc::new(Mutex::new(InterruptController::new()));
        let rom = Rom::new([0u8; 512]);
        let display = Display::new();
        let keyboard = Arc::new(Mutex::new(Keyboard::new(ic.clone())));
        let disk_a = Arc::new(Mutex::new(Disk::new(DiskId::A, ic.clone())));
        let disk_b = Arc::new(Mutex::new(Disk::new(DiskId::B, ic)));
        MemoryBus::new(rom, display, keyboard, disk_a, disk_b, Box::new(Dense::new(1 << 16)))
    }

    #[test]
    fn reserved_region_faults_both_directions() {
        let mut bus = new_bus();
        assert_eq!(
            bus.read_byte(0x20, AccessIntent::Read),
            Err(Fault::IllegalOperation)
        );
        assert_eq!(bus.write_byte(0x20, 0), Err(Fault::IllegalOperation));
    }

    #[test]
    fn rom_rejects_writes_but_allows_reads() {
        let mut bus = new_bus();
        assert!(bus.read_byte(0x40, AccessIntent::Fetch).is_ok());
        assert_eq!(bus.write_byte(0x40, 1), Err(Fault::IllegalOperation));
    }

    #[test]
    fn display_rejects_reads_but_allows_writes() {
        let mut bus = new_bus();
        assert!(bus.write_byte(DISPLAY_BASE, b'A').is_ok());
        assert_eq!(
            bus.read_byte(DISPLAY_BASE, AccessIntent::Read),
            Err(Fault::IllegalOperation)
        );
    }

    #[test]
    fn disk_register_window_enforces_per_byte_direction() {
        let mut bus = new_bus();
        // status byte (offset 0) is read-only.
        assert_eq!(
            bus.write_byte(DISK_A_REGS_BASE, 1),
            Err(Fault::IllegalOperation)
        );
        assert!(bus.read_byte(DISK_A_REGS_BASE, AccessIntent::Read).is_ok());
        // command byte (offset 9) is write-only.
        assert_eq!(
            bus.read_byte(DISK_A_REGS_BASE + 9, AccessIntent::Read),
            Err(Fault::IllegalOperation)
        );
    }

    #[test]
    fn ram_round_trips_big_endian() {
        let mut bus = new_bus();
        bus.write_u32(RAM_BASE, 0x0102_0304).unwrap();
        assert_eq!(bus.read_u32(RAM_BASE, AccessIntent::Read).unwrap(), 0x0102_0304);
        assert_eq!(bus.read_byte(RAM_BASE, AccessIntent::Read).unwrap(), 0x01);
    }
}
