//! Shared-heap behavior under concurrent callers.

use std::ptr::NonNull;
use std::sync::Barrier;
use std::thread;

use pagemalloc_heap::{Heap, MmapHeap, MmapPages, PageSource};

const THREADS: usize = 8;
const ROUNDS: usize = 2_000;

fn churn<S: PageSource + Sync, R: lock_api::RawMutex + Sync>(heap: &Heap<S, R>, tid: usize) {
    let mut held: Vec<(NonNull<u8>, usize, u8)> = Vec::with_capacity(16);
    for round in 0..ROUNDS {
        let size = 1 + (tid * 131 + round * 17) % 1800;
        let seed = (tid * 31 + round) as u8;
        let ptr = heap.allocate(size).unwrap().unwrap();
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), seed, size) };
        held.push((ptr, size, seed));

        if held.len() == 16 {
            for (ptr, size, seed) in held.drain(..) {
                let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) };
                assert!(bytes.iter().all(|&b| b == seed), "thread {tid} saw foreign writes");
                unsafe { heap.deallocate(Some(ptr)) };
            }
        }
    }
    for (ptr, _, _) in held {
        unsafe { heap.deallocate(Some(ptr)) };
    }
}

#[test]
fn parallel_churn_keeps_blocks_private() {
    let heap = MmapHeap::default();
    let barrier = Barrier::new(THREADS);
    thread::scope(|scope| {
        for tid in 0..THREADS {
            let heap = &heap;
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                churn(heap, tid);
            });
        }
    });

    let stats = heap.stats();
    assert_eq!(stats.live_slabs, 0);
    assert_eq!(stats.live_large_regions, 0);
    assert_eq!(stats.slab_maps, stats.slab_unmaps);
    assert_eq!(stats.large_maps, stats.large_unmaps);
}

#[test]
fn spin_guarded_heap_survives_parallel_churn() {
    let heap: Heap<MmapPages, spin::mutex::SpinMutex<()>> = Heap::default();
    thread::scope(|scope| {
        for tid in 0..4 {
            let heap = &heap;
            scope.spawn(move || churn(heap, tid));
        }
    });
    assert_eq!(heap.stats().live_slabs, 0);
}

#[test]
fn blocks_freed_on_another_thread() {
    let heap = MmapHeap::default();
    let addrs: Vec<usize> = (0..500)
        .map(|i| heap.allocate(1 + i % 1024).unwrap().unwrap().as_ptr() as usize)
        .collect();

    thread::scope(|scope| {
        for chunk in addrs.chunks(125) {
            let heap = &heap;
            scope.spawn(move || {
                for &addr in chunk {
                    unsafe { heap.deallocate(NonNull::new(addr as *mut u8)) };
                }
            });
        }
    });
    assert_eq!(heap.stats().live_slabs, 0);
}

#[test]
fn concurrent_same_class_pointers_are_unique() {
    let heap = MmapHeap::default();
    let mut all: Vec<usize> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let heap = &heap;
                scope.spawn(move || {
                    (0..200)
                        .map(|_| heap.allocate(100).unwrap().unwrap().as_ptr() as usize)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect()
    });

    let total = all.len();
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), total, "two threads received the same block");

    for addr in all {
        unsafe { heap.deallocate(NonNull::new(addr as *mut u8)) };
    }
    assert_eq!(heap.stats().live_slabs, 0);
}
