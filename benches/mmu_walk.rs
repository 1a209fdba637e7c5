//! Benchmarks the two-level MMU walk in isolation, independent of the fetch/decode
//! loop that normally drives it (§8 for-all: translation cost should stay flat
//! regardless of which page within a table is targeted).

use std::collections::HashMap;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use simulatron::memory::paging::{Mmu, PhysicalRead};
use simulatron::memory::AccessIntent;

struct FlatTable(HashMap<u32, u32>);

impl PhysicalRead for FlatTable {
    fn read_phys_u32(&self, addr: u32) -> u32 {
        *self.0.get(&addr).unwrap_or(&0)
    }
}

fn fully_mapped_table(pdpr: u32, table_frame: u32, target_base: u32) -> FlatTable {
    let mut entries = HashMap::new();
    entries.insert(pdpr, table_frame | 1);
    for tab in 0..1024u32 {
        let frame = target_base + (tab << 12);
        entries.insert(table_frame + 4 * tab, frame | 0b0001_1111);
    }
    FlatTable(entries)
}

fn bench_translate(c: &mut Criterion) {
    let pdpr = 0x1_0000;
    let table_frame = 0x2_0000;
    let phys = fully_mapped_table(pdpr, table_frame, 0x10_0000);
    let mmu = Mmu::new();

    let mut group = c.benchmark_group("mmu_translate");
    for tab in [0u32, 511, 1023] {
        group.bench_with_input(BenchmarkId::from_parameter(tab), &tab, |b, &tab| {
            let virtual_addr = (tab << 12) | 0x123;
            b.iter(|| mmu.translate(virtual_addr, AccessIntent::Read, pdpr, &phys).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_translate);
criterion_main!(benches);
