//! Software-simulated `Backend` for host-side unit tests.
//!
//! The scheduler, thread, IPC, signal and cross-CPU-work tests run on the
//! host under `cargo test`, not on real hardware, so they need a `Backend`
//! that fakes TLB/IPI/timer effects instead of emitting inline asm. This
//! mirrors the teacher's `test_utils.rs` approach of swapping a hardware
//! collaborator for an in-memory fake at test time.

use super::{AddressSpaceId, Backend};
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Records the calls a test made, so assertions can check *what* the
/// kernel told the hardware to do, not just the kernel's own state.
pub struct MockBackend;

static NOW_US: AtomicU64 = AtomicU64::new(0);
static CURRENT_CPU: AtomicUsize = AtomicUsize::new(0);
static TLB_FLUSHES: AtomicU64 = AtomicU64::new(0);
static ICACHE_INVALIDATIONS: AtomicU64 = AtomicU64::new(0);
static IPIS_SENT: AtomicU64 = AtomicU64::new(0);
static TIMERS_ARMED: AtomicU64 = AtomicU64::new(0);
static LAST_ARMED_US: AtomicU64 = AtomicU64::new(0);

impl Backend for MockBackend {
    fn flush_tlb_pid(&self, _asid: AddressSpaceId, _addr: u64, _size: u64) {
        TLB_FLUSHES.fetch_add(1, Ordering::SeqCst);
    }

    fn invalidate_icache(&self) {
        ICACHE_INVALIDATIONS.fetch_add(1, Ordering::SeqCst);
    }

    fn trigger_ipi(&self, _cpu: usize) {
        IPIS_SENT.fetch_add(1, Ordering::SeqCst);
    }

    fn wait_for_interrupt(&self) {}

    fn arm_timer(&self, us: u32) {
        TIMERS_ARMED.fetch_add(1, Ordering::SeqCst);
        LAST_ARMED_US.store(us as u64, Ordering::SeqCst);
    }

    fn now_us(&self) -> u64 {
        NOW_US.load(Ordering::SeqCst)
    }

    fn current_cpu(&self) -> usize {
        CURRENT_CPU.load(Ordering::SeqCst)
    }
}

/// Advance the fake wall clock; tests drive time explicitly rather than
/// relying on a real timer interrupt.
pub fn advance_time_us(delta: u64) {
    NOW_US.fetch_add(delta, Ordering::SeqCst);
}

pub fn set_current_cpu(cpu: usize) {
    CURRENT_CPU.store(cpu, Ordering::SeqCst);
}

pub fn tlb_flush_count() -> u64 {
    TLB_FLUSHES.load(Ordering::SeqCst)
}

pub fn ipi_count() -> u64 {
    IPIS_SENT.load(Ordering::SeqCst)
}

pub fn last_armed_timer_us() -> u64 {
    LAST_ARMED_US.load(Ordering::SeqCst)
}

pub fn reset() {
    NOW_US.store(0, Ordering::SeqCst);
    CURRENT_CPU.store(0, Ordering::SeqCst);
    TLB_FLUSHES.store(0, Ordering::SeqCst);
    ICACHE_INVALIDATIONS.store(0, Ordering::SeqCst);
    IPIS_SENT.store(0, Ordering::SeqCst);
    TIMERS_ARMED.store(0, Ordering::SeqCst);
    LAST_ARMED_US.store(0, Ordering::SeqCst);
}
