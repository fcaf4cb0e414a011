//! Fixed numeric parameters of the kernel core.
//!
//! These are compile-time constants rather than a config-file surface:
//! the kernel itself has no persisted state (spec: "Persisted state:
//! none") and no boot-time configuration language. Values here are the
//! ones a build picks once, the way the teacher picks `MAX_CPUS` in
//! `smp/mod.rs`.

/// Maximum number of CPUs this build supports. Per-CPU arrays (the
/// scheduler pool, work lists, online bitmap) are sized to this.
pub const MAX_CPUS: usize = 8;

/// Scheduling priority band count. Priorities are `0..NUM_PRIORITIES`,
/// highest numeric value is highest priority (matches
/// `Cpu_priority::MAX` in the original scheduler).
pub const NUM_PRIORITIES: usize = 4;

/// Highest valid priority value.
pub const PRIO_MAX: u8 = (NUM_PRIORITIES - 1) as u8;

/// Lowest valid priority value.
pub const PRIO_MIN: u8 = 0;

/// Capability-slot array size per UTCB message, i.e. the maximum number
/// of capabilities transferable in a single IPC or signal delivery.
pub const MAX_CAPS_PER_MSG: usize = 4;

/// Default round-robin fill slice, in microseconds, handed to a share
/// each time it reaches the head of the fill ring.
pub const DEFAULT_FILL_US: u32 = 100;

/// Default total round quota, in microseconds, for a freshly
/// constructed per-CPU scheduler.
pub const DEFAULT_ROUND_QUOTA_US: u32 = 1000;

/// Maximum PD-local capability-ids a single protection domain's
/// capability tree can hold concurrently.
pub const MAX_CAPS_PER_PD: usize = 1024;

/// Maximum threads a single protection domain may own.
pub const MAX_THREADS_PER_PD: usize = 64;

/// Maximum outstanding cross-CPU work items in flight at once.
pub const MAX_CROSS_CPU_WORK: usize = 32;
