//! Kernel heap allocator.
//!
//! A fixed-size static arena backed by `linked_list_allocator`, installed
//! as the global allocator so the rest of the kernel (arenas, `VecDeque`
//! bands, `BTreeMap` capability trees) can just use `alloc`. Wrapped in a
//! thin stats-tracking layer for the panic handler's diagnostic dump.

use core::alloc::{GlobalAlloc, Layout};
use core::sync::atomic::{AtomicBool, Ordering};
use linked_list_allocator::LockedHeap;
use spin::Mutex;

#[repr(align(64))]
struct CacheAlignedArray([u8; HEAP_SIZE]);

static ALLOCATOR: LockedHeap = LockedHeap::empty();

pub struct HeapStats {
    total_allocations: usize,
    total_deallocations: usize,
    current_allocated: usize,
    peak_allocated: usize,
    allocation_failures: usize,
}

impl HeapStats {
    pub fn total_allocations(&self) -> usize {
        self.total_allocations
    }
    pub fn total_deallocations(&self) -> usize {
        self.total_deallocations
    }
    pub fn current_allocated(&self) -> usize {
        self.current_allocated
    }
    pub fn peak_allocated(&self) -> usize {
        self.peak_allocated
    }
    pub fn allocation_failures(&self) -> usize {
        self.allocation_failures
    }
}

static HEAP_STATS: Mutex<HeapStats> = Mutex::new(HeapStats {
    total_allocations: 0,
    total_deallocations: 0,
    current_allocated: 0,
    peak_allocated: 0,
    allocation_failures: 0,
});

const HEAP_SIZE: usize = 8 * 1024 * 1024;

static HEAP_INIT_DONE: AtomicBool = AtomicBool::new(false);

/// Initialize the kernel heap. Idempotent via a lock-free
/// compare-exchange guard so a second call from a secondary CPU's boot
/// path is a no-op rather than a double-init.
pub fn init_heap() -> Result<(), &'static str> {
    if HEAP_INIT_DONE.load(Ordering::SeqCst) {
        return Ok(());
    }
    if HEAP_INIT_DONE
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        unsafe {
            static mut HEAP_MEMORY: CacheAlignedArray = CacheAlignedArray([0; HEAP_SIZE]);
            let heap_arr_ptr = core::ptr::addr_of_mut!(HEAP_MEMORY) as *mut CacheAlignedArray;
            let heap_start = core::ptr::addr_of_mut!((*heap_arr_ptr).0) as *mut u8;
            ALLOCATOR.lock().init(heap_start, HEAP_SIZE);
            crate::uart_print(b"[HEAP] initialized\n");
        }
    }
    Ok(())
}

pub struct StatsTrackingAllocator;

unsafe impl GlobalAlloc for StatsTrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = ALLOCATOR.alloc(layout);
        let mut stats = HEAP_STATS.lock();
        if !ptr.is_null() {
            stats.total_allocations += 1;
            stats.current_allocated += layout.size();
            if stats.current_allocated > stats.peak_allocated {
                stats.peak_allocated = stats.current_allocated;
            }
        } else {
            stats.allocation_failures += 1;
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let mut stats = HEAP_STATS.lock();
        stats.total_deallocations += 1;
        stats.current_allocated = stats.current_allocated.saturating_sub(layout.size());
        drop(stats);
        ALLOCATOR.dealloc(ptr, layout);
    }
}

#[global_allocator]
static GLOBAL_ALLOC: StatsTrackingAllocator = StatsTrackingAllocator;

#[alloc_error_handler]
fn alloc_error_handler(layout: Layout) -> ! {
    unsafe {
        crate::uart_print(b"[HEAP] allocation error: size=");
        print_number(layout.size());
        crate::uart_print(b" align=");
        print_number(layout.align());
        crate::uart_print(b"\n");
    }
    print_heap_stats();
    loop {}
}

pub fn print_heap_stats() {
    let stats = HEAP_STATS.lock();
    unsafe {
        crate::uart_print(b"[HEAP] allocs=");
        print_number(stats.total_allocations);
        crate::uart_print(b" deallocs=");
        print_number(stats.total_deallocations);
        crate::uart_print(b" current=");
        print_number(stats.current_allocated);
        crate::uart_print(b" peak=");
        print_number(stats.peak_allocated);
        crate::uart_print(b" failures=");
        print_number(stats.allocation_failures);
        crate::uart_print(b"\n");
    }
}

pub fn get_heap_stats() -> HeapStats {
    let stats = HEAP_STATS.lock();
    HeapStats {
        total_allocations: stats.total_allocations,
        total_deallocations: stats.total_deallocations,
        current_allocated: stats.current_allocated,
        peak_allocated: stats.peak_allocated,
        allocation_failures: stats.allocation_failures,
    }
}

unsafe fn print_number(mut num: usize) {
    if num == 0 {
        crate::uart_print(b"0");
        return;
    }
    let mut digits = [0u8; 20];
    let mut i = 0;
    while num > 0 {
        digits[i] = b'0' + (num % 10) as u8;
        num /= 10;
        i += 1;
    }
    while i > 0 {
        i -= 1;
        crate::uart_print(&[digits[i]]);
    }
}
