#![no_main]
use std::ptr::NonNull;

use libfuzzer_sys::fuzz_target;
use pagemalloc_core::ALIGNMENT;
use pagemalloc_heap::MmapHeap;

struct Live {
    ptr: NonNull<u8>,
    len: usize,
    tag: u8,
}

fn stamp(live: &Live) {
    // SAFETY: `live.ptr` holds at least `live.len` bytes.
    unsafe { std::ptr::write_bytes(live.ptr.as_ptr(), live.tag, live.len) };
}

fn check(live: &Live) {
    // SAFETY: `live.ptr` holds at least `live.len` bytes.
    let bytes = unsafe { std::slice::from_raw_parts(live.ptr.as_ptr(), live.len) };
    assert!(bytes.iter().all(|&b| b == live.tag), "block contents changed");
}

fuzz_target!(|data: &[u8]| {
    // Each 4-byte chunk is one operation: opcode, two size bytes, slot selector.
    if data.len() < 4 {
        return;
    }

    let heap = MmapHeap::default();
    let mut allocations: Vec<Live> = Vec::new();

    for (step, chunk) in data.chunks_exact(4).enumerate() {
        let op = chunk[0] % 4;
        let size = u16::from_le_bytes([chunk[1], chunk[2]]) as usize % 20_000;
        let slot = chunk[3] as usize;
        let tag = step as u8;

        match op {
            0 => {
                if let Some(ptr) = heap.allocate(size).unwrap() {
                    assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
                    assert!(unsafe { heap.usable_size(ptr) } >= size);
                    let live = Live { ptr, len: size, tag };
                    stamp(&live);
                    allocations.push(live);
                }
            }
            1 => {
                if !allocations.is_empty() {
                    let live = allocations.swap_remove(slot % allocations.len());
                    check(&live);
                    unsafe { heap.deallocate(Some(live.ptr)) };
                }
            }
            2 => {
                if !allocations.is_empty() {
                    let index = slot % allocations.len();
                    let old = &allocations[index];
                    check(old);
                    let kept = old.len.min(size);
                    let old_tag = old.tag;
                    match unsafe { heap.resize_allocate(Some(old.ptr), size) }.unwrap() {
                        Some(ptr) => {
                            check(&Live { ptr, len: kept, tag: old_tag });
                            let live = Live { ptr, len: size, tag };
                            stamp(&live);
                            allocations[index] = live;
                        }
                        None => {
                            assert_eq!(size, 0);
                            allocations.swap_remove(index);
                        }
                    }
                }
            }
            _ => {
                let count = (slot % 16) + 1;
                let each = size / count;
                if let Some(ptr) = heap.zero_allocate(count, each).unwrap() {
                    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), count * each) };
                    assert!(bytes.iter().all(|&b| b == 0));
                    let live = Live { ptr, len: count * each, tag };
                    stamp(&live);
                    allocations.push(live);
                }
            }
        }
    }

    for live in allocations.drain(..) {
        check(&live);
        unsafe { heap.deallocate(Some(live.ptr)) };
    }
    let stats = heap.stats();
    assert_eq!(stats.live_slabs, 0);
    assert_eq!(stats.live_large_regions, 0);
});
