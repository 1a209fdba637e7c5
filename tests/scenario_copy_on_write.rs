//! §8 scenario 3 — copy-on-write: a page table entry with V=1,P=1,W=1,C=1 faults a
//! user-mode write with `PageFaultCode::CopyOnWrite` and performs no physical write;
//! once the kernel clears C, the same write succeeds.

mod common;

use simulatron::cpu::{Cpu, Mode};
use simulatron::error::{Fault, PageFaultCode};
use simulatron::memory::AccessIntent;

const DIR_V: u32 = 1 << 0;
const PTE_V: u32 = 1 << 0;
const PTE_P: u32 = 1 << 1;
const PTE_R: u32 = 1 << 2;
const PTE_W: u32 = 1 << 3;
const PTE_E: u32 = 1 << 4;
const PTE_C: u32 = 1 << 5;

#[test]
fn cow_page_faults_then_succeeds_once_cleared() {
    let mut h = common::harness(common::rom_with_program(&[]));
    let mut cpu = Cpu::new();
    cpu.mode = Mode::Kernel;

    let pdpr = common::RAM_BASE;
    let table_frame = common::RAM_BASE + 0x1000;
    let target_frame = common::RAM_BASE + 0x2000;

    // Build the directory and table entries through the kernel-mode (identity) path.
    h.bus.write_u32(pdpr, table_frame | DIR_V).unwrap();
    h.bus
        .write_u32(
            table_frame,
            target_frame | PTE_V | PTE_P | PTE_R | PTE_W | PTE_E | PTE_C,
        )
        .unwrap();

    cpu.regs.pdpr = pdpr;
    cpu.mode = Mode::User;

    // Virtual address 0: dir index 0, table index 0, so the PTE above (written at
    // `table_frame` with no table-index offset) is the one consulted.
    let err = cpu.write_u8(0x0000, 0xAB, &mut h.bus).unwrap_err();
    assert_eq!(err, Fault::PageFault(PageFaultCode::CopyOnWrite));
    assert_eq!(cpu.regs.pfsr, PageFaultCode::CopyOnWrite as u32);

    // No physical write occurred.
    cpu.mode = Mode::Kernel;
    assert_eq!(
        cpu.read_u8(target_frame, AccessIntent::Read, &mut h.bus)
            .unwrap(),
        0
    );

    // The kernel clears C and retries; this time the write lands.
    h.bus
        .write_u32(table_frame, target_frame | PTE_V | PTE_P | PTE_R | PTE_W | PTE_E)
        .unwrap();
    cpu.mode = Mode::User;
    cpu.write_u8(0x0000, 0xAB, &mut h.bus).unwrap();

    cpu.mode = Mode::Kernel;
    assert_eq!(
        cpu.read_u8(target_frame, AccessIntent::Read, &mut h.bus)
            .unwrap(),
        0xAB
    );
}
