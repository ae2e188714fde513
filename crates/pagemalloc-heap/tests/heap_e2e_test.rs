//! End-to-end behavior of the heap through its public API.

use std::ptr::NonNull;

use pagemalloc_core::geometry::SlabGeometry;
use pagemalloc_core::{ALIGNMENT, LargeGeometry, SizeClass};
use pagemalloc_heap::{AllocError, MmapHeap, Owner};

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn gen_range(&mut self, low: usize, high_inclusive: usize) -> usize {
        assert!(low <= high_inclusive);
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

#[derive(Clone, Copy, Debug)]
struct AllocationRec {
    ptr: NonNull<u8>,
    size: usize,
    seed: u8,
}

fn fill(rec: &AllocationRec) {
    // SAFETY: `rec.ptr` is live with at least `rec.size` bytes.
    unsafe { std::slice::from_raw_parts_mut(rec.ptr.as_ptr(), rec.size) }.fill(rec.seed);
}

fn intact(rec: &AllocationRec) -> bool {
    // SAFETY: `rec.ptr` is live with at least `rec.size` bytes.
    unsafe { std::slice::from_raw_parts(rec.ptr.as_ptr(), rec.size) }
        .iter()
        .all(|&b| b == rec.seed)
}

fn class(block_size: usize) -> SizeClass {
    SizeClass::from_block_size(block_size).unwrap()
}

#[test]
fn every_pointer_is_sixteen_aligned() {
    let heap = MmapHeap::default();
    let mut live = Vec::new();
    for size in (1..=1100).chain([2048, 4095, 4096, 4097, 65536]) {
        let ptr = heap.allocate(size).unwrap().unwrap();
        assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0, "size {size}");
        live.push(ptr);
    }
    for ptr in live {
        unsafe { heap.deallocate(Some(ptr)) };
    }
    let stats = heap.stats();
    assert_eq!(stats.live_slabs, 0);
    assert_eq!(stats.live_large_regions, 0);
    assert_eq!(stats.live_large_bytes, 0);
}

#[test]
fn many_small_blocks_span_several_slabs() {
    let heap = MmapHeap::default();
    let capacity = SlabGeometry::new(heap.page_size(), class(64))
        .unwrap()
        .capacity;

    let ptrs: Vec<_> = (0..128)
        .map(|_| heap.allocate(16).unwrap().unwrap())
        .collect();
    let stats = heap.stats();
    assert!(stats.live_slabs_of(class(64)) >= 2);
    assert_eq!(stats.live_slabs_of(class(64)), 128_usize.div_ceil(capacity));
    assert_eq!(stats.live_slabs, stats.live_slabs_of(class(64)));

    let mut sorted: Vec<usize> = ptrs.iter().map(|p| p.as_ptr() as usize).collect();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), 128, "blocks must be distinct");

    for ptr in ptrs {
        assert_eq!(unsafe { heap.usable_size(ptr) }, 64);
        unsafe { heap.deallocate(Some(ptr)) };
    }
    let stats = heap.stats();
    assert_eq!(stats.live_slabs, 0);
    assert_eq!(stats.slab_maps, stats.slab_unmaps);
}

#[test]
fn hundred_blocks_are_writable_and_return_their_pages() {
    let heap = MmapHeap::default();
    for cycle in 0..3u8 {
        let recs: Vec<_> = (0..100u8)
            .map(|i| AllocationRec {
                ptr: heap.allocate(64).unwrap().unwrap(),
                size: 64,
                seed: i ^ cycle,
            })
            .collect();
        recs.iter().for_each(fill);
        assert!(recs.iter().all(intact));
        let live = heap.stats().live_slabs;
        assert!(live >= 1);
        for rec in recs {
            unsafe { heap.deallocate(Some(rec.ptr)) };
        }
        assert_eq!(heap.stats().live_slabs, 0, "cycle {cycle}");
    }
    let stats = heap.stats();
    assert_eq!(stats.slab_maps, stats.slab_unmaps);
}

#[test]
fn page_sized_request_takes_large_path() {
    let heap = MmapHeap::default();
    let ptr = heap.allocate(4096).unwrap().unwrap();
    let expected = LargeGeometry::for_request(4096, heap.page_size()).unwrap();

    match unsafe { heap.owner_of(ptr) } {
        Owner::LargeRegion(region) => {
            assert_eq!(region.mapped_len(), expected.mapped_len);
            assert_eq!(region.mapped_len() % heap.page_size(), 0);
            assert!(region.usable() >= 4096);
        }
        other => panic!("expected large region, got {other:?}"),
    }
    assert_eq!(heap.stats().live_slabs, 0);
    assert_eq!(heap.stats().live_large_bytes, expected.mapped_len);

    unsafe { heap.deallocate(Some(ptr)) };
    assert_eq!(heap.stats().live_large_regions, 0);
}

#[test]
fn class_boundaries_route_correctly() {
    let heap = MmapHeap::default();
    for (size, usable) in [(1, 64), (64, 64), (65, 128), (513, 1024), (1024, 1024)] {
        let ptr = heap.allocate(size).unwrap().unwrap();
        assert!(matches!(unsafe { heap.owner_of(ptr) }, Owner::SlabBlock { .. }));
        assert_eq!(unsafe { heap.usable_size(ptr) }, usable, "size {size}");
        unsafe { heap.deallocate(Some(ptr)) };
    }
    let ptr = heap.allocate(1025).unwrap().unwrap();
    assert!(matches!(unsafe { heap.owner_of(ptr) }, Owner::LargeRegion(_)));
    unsafe { heap.deallocate(Some(ptr)) };
}

#[test]
fn alloc_free_cycles_do_not_accumulate_slabs() {
    let heap = MmapHeap::default();
    for round in 0..1000 {
        let ptr = heap.allocate(64).unwrap().unwrap();
        unsafe { ptr.as_ptr().write(round as u8) };
        unsafe { heap.deallocate(Some(ptr)) };
        assert_eq!(heap.stats().live_slabs, 0);
    }
    let stats = heap.stats();
    assert_eq!(stats.slab_maps, 1000);
    assert_eq!(stats.slab_unmaps, 1000);
}

#[test]
fn held_block_keeps_slab_warm() {
    let heap = MmapHeap::default();
    let anchor = heap.allocate(64).unwrap().unwrap();
    for _ in 0..1000 {
        let ptr = heap.allocate(64).unwrap().unwrap();
        unsafe { heap.deallocate(Some(ptr)) };
    }
    assert_eq!(heap.stats().slab_maps, 1);
    unsafe { heap.deallocate(Some(anchor)) };
}

#[test]
fn resize_walks_from_slab_to_large_and_back() {
    let heap = MmapHeap::default();
    let rec = AllocationRec {
        ptr: heap.allocate(48).unwrap().unwrap(),
        size: 48,
        seed: 0x3C,
    };
    fill(&rec);

    let grown = unsafe { heap.resize_allocate(Some(rec.ptr), 900) }
        .unwrap()
        .unwrap();
    assert!(intact(&AllocationRec { ptr: grown, ..rec }));
    assert_eq!(unsafe { heap.usable_size(grown) }, 1024);

    let large = unsafe { heap.resize_allocate(Some(grown), 10_000) }
        .unwrap()
        .unwrap();
    assert!(intact(&AllocationRec { ptr: large, ..rec }));
    assert_eq!(heap.stats().live_slabs, 0);

    let shrunk = unsafe { heap.resize_allocate(Some(large), 100) }.unwrap();
    assert_eq!(shrunk, Some(large));

    assert_eq!(unsafe { heap.resize_allocate(shrunk, 0) }, Ok(None));
    assert_eq!(heap.stats().live_large_regions, 0);
}

#[test]
fn calloc_overflow_reports_operands() {
    let heap = MmapHeap::default();
    let err = heap.zero_allocate(usize::MAX / 2, 3).unwrap_err();
    assert_eq!(
        err,
        AllocError::Overflow {
            count: usize::MAX / 2,
            size: 3
        }
    );
    assert!(err.to_string().contains("overflow"));
}

#[test]
fn random_workload_preserves_contents() {
    let heap = MmapHeap::default();
    let mut rng = XorShift64::new(0x9E37_79B9_7F4A_7C15);
    let mut live: Vec<AllocationRec> = Vec::new();

    for step in 0..20_000 {
        match rng.gen_range(0, 9) {
            0..=4 => {
                let size = if rng.gen_range(0, 15) == 0 {
                    rng.gen_range(1025, 20_000)
                } else {
                    rng.gen_range(1, 1024)
                };
                let rec = AllocationRec {
                    ptr: heap.allocate(size).unwrap().unwrap(),
                    size,
                    seed: step as u8,
                };
                fill(&rec);
                live.push(rec);
            }
            5 | 6 if !live.is_empty() => {
                let index = rng.gen_range(0, live.len() - 1);
                let rec = live.swap_remove(index);
                assert!(intact(&rec), "corrupted block at step {step}");
                unsafe { heap.deallocate(Some(rec.ptr)) };
            }
            7 if !live.is_empty() => {
                let index = rng.gen_range(0, live.len() - 1);
                let rec = live[index];
                let new_size = rng.gen_range(1, 3000);
                let ptr = unsafe { heap.resize_allocate(Some(rec.ptr), new_size) }
                    .unwrap()
                    .unwrap();
                let kept = AllocationRec {
                    ptr,
                    size: rec.size.min(new_size),
                    seed: rec.seed,
                };
                assert!(intact(&kept), "resize lost data at step {step}");
                live[index] = AllocationRec {
                    size: new_size,
                    ..kept
                };
                fill(&live[index]);
            }
            _ => {
                let count = rng.gen_range(1, 32);
                let size = rng.gen_range(1, 64);
                let ptr = heap.zero_allocate(count, size).unwrap().unwrap();
                let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), count * size) };
                assert!(bytes.iter().all(|&b| b == 0));
                unsafe { heap.deallocate(Some(ptr)) };
            }
        }
    }

    for rec in live.drain(..) {
        assert!(intact(&rec));
        unsafe { heap.deallocate(Some(rec.ptr)) };
    }
    let stats = heap.stats();
    assert_eq!(stats.live_slabs, 0);
    assert_eq!(stats.live_large_regions, 0);
    assert_eq!(stats.slab_maps, stats.slab_unmaps);
    assert_eq!(stats.large_maps, stats.large_unmaps);
}
