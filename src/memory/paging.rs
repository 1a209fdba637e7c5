//! The MMU: a fixed two-level page walk (§3, §4.3).
//!
//! Grounded on the teacher's `memory/paging.rs::walk_page_tables`/`check_pte` — the
//! same bit-extraction-then-permission-check shape, reduced from the teacher's
//! up-to-4-level x86 walk (2-level/PAE/4-level) to this architecture's single fixed
//! two-level layout, and with the teacher's P/RW/US/NX bits replaced by V/P/R/W/E/C.

use bitflags::bitflags;

use crate::error::PageFaultCode;
use crate::memory::AccessIntent;

/// Directory entry valid bit. The directory entry has no other meaningful bits, so
/// unlike the table entry below it stays a plain constant.
const DIR_V: u32 = 1 << 0;

bitflags! {
    /// Page-table entry permission/state bits (§3). Tested together (valid,
    /// present, and one of read/write/execute on every translation), unlike the
    /// directory entry's single V bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u32 {
        const VALID = 1 << 0;
        const PRESENT = 1 << 1;
        const READ = 1 << 2;
        const WRITE = 1 << 3;
        const EXEC = 1 << 4;
        const COW = 1 << 5;
    }
}

/// Frame number occupies bits 12-31 of both directory and table entries.
const FRAME_MASK: u32 = 0xFFFF_F000;

/// Raw physical-memory access the MMU needs to walk page tables. Implemented by
/// `crate::bus::MemoryBus` as a permission-free accessor — page table reads are not
/// themselves subject to region-direction enforcement; only the V/P/R/W/E/C bits
/// govern translation outcomes (§4.3).
pub trait PhysicalRead {
    fn read_phys_u32(&self, addr: u32) -> u32;
}

/// Stateless two-level MMU. Holds no fields: PDPR lives in the register file and is
/// passed in by the caller on every translation, matching §4.3's "the MMU never sets
/// PFSR or emits interrupts directly; it returns the code and the CPU publishes it."
#[derive(Debug, Default)]
pub struct Mmu;

impl Mmu {
    pub fn new() -> Self {
        Mmu
    }

    /// Translate a 32-bit virtual address to a physical address, or return the
    /// page-fault code the CPU should publish to PFSR (§4.3).
    pub fn translate(
        &self,
        virtual_addr: u32,
        intent: AccessIntent,
        pdpr: u32,
        phys: &dyn PhysicalRead,
    ) -> Result<u32, PageFaultCode> {
        let dir = (virtual_addr >> 22) & 0x3FF;
        let tab = (virtual_addr >> 12) & 0x3FF;
        let off = virtual_addr & 0x0FFF;

        let dir_entry = phys.read_phys_u32(pdpr.wrapping_add(4 * dir));
        if dir_entry & DIR_V == 0 {
            return Err(PageFaultCode::InvalidPage);
        }
        let table_frame = dir_entry & FRAME_MASK;

        let raw_pte = phys.read_phys_u32(table_frame.wrapping_add(4 * tab));
        let pte = PteFlags::from_bits_truncate(raw_pte);
        if !pte.contains(PteFlags::VALID) {
            return Err(PageFaultCode::InvalidPage);
        }
        if !pte.contains(PteFlags::PRESENT) {
            return Err(PageFaultCode::NotPresent);
        }

        let required = match intent {
            AccessIntent::Fetch => PteFlags::EXEC,
            AccessIntent::Read => PteFlags::READ,
            AccessIntent::Write => PteFlags::WRITE,
        };
        if !pte.contains(required) {
            return Err(PageFaultCode::IllegalAccess);
        }

        // Copy-on-write takes precedence over success, but not over the checks above
        // (§4.3: "COW takes precedence over success, not over invalid/not-present").
        if intent == AccessIntent::Write && pte.contains(PteFlags::WRITE | PteFlags::COW) {
            return Err(PageFaultCode::CopyOnWrite);
        }

        let frame = raw_pte & FRAME_MASK;
        Ok(frame | off)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakePhys(RefCell<HashMap<u32, u32>>);

    impl FakePhys {
        fn new() -> Self {
            FakePhys(RefCell::new(HashMap::new()))
        }
        fn set(&self, addr: u32, value: u32) {
            self.0.borrow_mut().insert(addr, value);
        }
    }

    impl PhysicalRead for FakePhys {
        fn read_phys_u32(&self, addr: u32) -> u32 {
            *self.0.borrow().get(&addr).unwrap_or(&0)
        }
    }

    #[test]
    fn invalid_directory_entry_faults() {
        let phys = FakePhys::new();
        let mmu = Mmu::new();
        let err = mmu
            .translate(0, AccessIntent::Fetch, 0x1_0000, &phys)
            .unwrap_err();
        assert_eq!(err, PageFaultCode::InvalidPage);
    }

    #[test]
    fn successful_translation_assembles_frame_and_offset() {
        let phys = FakePhys::new();
        let pdpr = 0x1_0000;
        let table_frame = 0x2_0000;
        phys.set(pdpr, table_frame | DIR_V);
        let target_frame = 0x3000;
        phys.set(
            table_frame,
            target_frame | (PteFlags::VALID | PteFlags::PRESENT | PteFlags::READ | PteFlags::WRITE | PteFlags::EXEC).bits(),
        );

        let mmu = Mmu::new();
        let pa = mmu
            .translate(0x1234, AccessIntent::Read, pdpr, &phys)
            .unwrap();
        assert_eq!(pa, target_frame | 0x234);
    }

    #[test]
    fn write_to_cow_page_faults_with_code_3() {
        let phys = FakePhys::new();
        let pdpr = 0x1_0000;
        let table_frame = 0x2_0000;
        phys.set(pdpr, table_frame | DIR_V);
        phys.set(
            table_frame,
            0x3000
                | (PteFlags::VALID | PteFlags::PRESENT | PteFlags::READ | PteFlags::WRITE | PteFlags::EXEC | PteFlags::COW)
                    .bits(),
        );

        let mmu = Mmu::new();
        let err = mmu
            .translate(0x0000, AccessIntent::Write, pdpr, &phys)
            .unwrap_err();
        assert_eq!(err, PageFaultCode::CopyOnWrite);
    }

    #[test]
    fn missing_permission_bit_faults_illegal_access() {
        let phys = FakePhys::new();
        let pdpr = 0x1_0000;
        let table_frame = 0x2_0000;
        phys.set(pdpr, table_frame | DIR_V);
        phys.set(
            table_frame,
            0x3000 | (PteFlags::VALID | PteFlags::PRESENT | PteFlags::READ).bits(),
        );

        let mmu = Mmu::new();
        let err = mmu
            .translate(0, AccessIntent::Write, pdpr, &phys)
            .unwrap_err();
        assert_eq!(err, PageFaultCode::IllegalAccess);
    }

    #[test]
    fn not_present_page_faults() {
        let phys = FakePhys::new();
        let pdpr = 0x1_0000;
        let table_frame = 0x2_0000;
        phys.set(pdpr, table_frame | DIR_V);
        phys.set(table_frame, 0x3000 | PteFlags::VALID.bits());

        let mmu = Mmu::new();
        let err = mmu
            .translate(0, AccessIntent::Fetch, pdpr, &phys)
            .unwrap_err();
        assert_eq!(err, PageFaultCode::NotPresent);
    }
}
