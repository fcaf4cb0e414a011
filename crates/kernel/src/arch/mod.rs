//! External-collaborator interface for architecture-specific operations.
//!
//! Per the re-architecture notes this core follows: inline assembly for
//! TLB/cache maintenance and IPI triggering is not kernel logic, it is a
//! narrow collaborator the kernel calls through. `Backend` is that
//! narrow interface; `current()` returns the build's backend (the real
//! hardware one for `target_arch = "aarch64"`/`"x86_64"`/`"riscv64"`, a
//! software-simulated one under `#[cfg(test)]` or the `test-utils`
//! feature, the latter so the `crates/testing` property-based suite can
//! drive a full [`crate::kernel::Kernel`] from outside this crate.

#[cfg(target_arch = "aarch64")]
pub mod aarch64;
#[cfg(target_arch = "x86_64")]
pub mod x86_64;
#[cfg(target_arch = "riscv64")]
pub mod riscv64;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

/// Opaque reference to a protection domain's address-space id, as seen
/// by the architecture layer (page-table root / ASID or equivalent).
pub type AddressSpaceId = u64;

/// The kernel's contract with the underlying hardware.
///
/// Every method here corresponds to one line in the Design Notes:
/// `arch::flush_tlb_pid(pd)`, `arch::invalidate_icache()`,
/// `arch::trigger_ipi(cpu)`, `arch::wait_for_interrupt()`, plus a
/// one-shot microsecond timer. None of these carry scheduling policy;
/// they are pure hardware operations the kernel core commands.
pub trait Backend: Sync {
    /// Invalidate TLB entries for the given address space across the
    /// range `[addr, addr + size)`. Must be globally visible (i.e. any
    /// other CPU sharing this address space has also invalidated) by
    /// the time it returns on architectures where that is a single
    /// instruction; on architectures where cross-CPU propagation needs
    /// an IPI, the cross-CPU work item in `kernel::cross_cpu` is what
    /// drives that — this method only does the local half.
    fn flush_tlb_pid(&self, asid: AddressSpaceId, addr: u64, size: u64);

    /// Invalidate the instruction cache for the current CPU.
    fn invalidate_icache(&self);

    /// Raise an inter-processor interrupt on the given CPU to notify it
    /// of pending cross-CPU work.
    fn trigger_ipi(&self, cpu: usize);

    /// Park the current CPU until the next interrupt (idle-share body).
    fn wait_for_interrupt(&self);

    /// Arm the current CPU's one-shot timer to fire after `us`
    /// microseconds, delivering a timer interrupt that routes to
    /// `kernel::cross_cpu::on_timer_interrupt`.
    fn arm_timer(&self, us: u32);

    /// Read a free-running microsecond counter (used only for
    /// diagnostics; the scheduler itself is driven by quanta, not wall
    /// clock).
    fn now_us(&self) -> u64;

    /// Identify the CPU this call executes on, `0..MAX_CPUS`.
    fn current_cpu(&self) -> usize;
}

#[cfg(all(target_arch = "aarch64", not(any(test, feature = "test-utils"))))]
pub fn current() -> &'static dyn Backend { &aarch64::Aarch64Backend }

#[cfg(all(target_arch = "x86_64", not(any(test, feature = "test-utils"))))]
pub fn current() -> &'static dyn Backend { &x86_64::X86_64Backend }

#[cfg(all(target_arch = "riscv64", not(any(test, feature = "test-utils"))))]
pub fn current() -> &'static dyn Backend { &riscv64::Riscv64Backend }

#[cfg(any(test, feature = "test-utils"))]
pub fn current() -> &'static dyn Backend { &mock::MockBackend }
