//! Component I — CPU object: binds the scheduler (B) to the one-shot
//! timer and reports each scheduling decision back to the caller so it
//! can drive thread (E), IPC (F), signal (G) and cross-CPU (H) state
//! transitions. See spec.md's implicit contract in §2 and §4.H's timer
//! paragraph.
//!
//! Grounded on `cpu.h`'s `Cpu::exception()` (old job's `exception(id)`,
//! compute consumed quota from the timer delta, `_scheduler.update`,
//! select the new job, arm a one-shot timer for `head_quota()`, new
//! job's `proceed(id)`) and `Cpu_pool` (one timer + array of per-CPU
//! `Cpu` objects, `primary_cpu()`). Register-state save/restore
//! ("old job's exception", "new job's proceed") is an architecture
//! concern this core does not model (spec.md §1 Non-goals); this module
//! stops at "which share is now the head and what should the timer be
//! armed to", which is everything the scheduler-facing half of `Cpu`
//! actually owns.

use alloc::vec::Vec;

use crate::arch::Backend;
use crate::kernel::scheduler::{Owner, Scheduler, ShareId, TurnEffect};

/// One CPU's scheduler plus its one-shot timer bookkeeping.
pub struct Cpu {
    id: usize,
    scheduler: Scheduler,
    /// `now_us` at which the timer was last armed, so the next
    /// reschedule can compute how much of the armed slice was actually
    /// consumed.
    armed_at_us: u64,
}

impl Cpu {
    pub fn new(id: usize, round_quota_us: u32, fill_slice_us: u32) -> Self {
        Cpu {
            id,
            scheduler: Scheduler::new(id, round_quota_us, fill_slice_us),
            armed_at_us: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn head(&self) -> ShareId {
        self.scheduler.head()
    }

    pub fn head_owner(&self) -> Owner {
        self.scheduler.get(self.scheduler.head()).owner()
    }

    /// Arm the one-shot timer for the current head's slice and remember
    /// when, so the matching `on_timer`/`reschedule` can bill the right
    /// number of microseconds.
    pub fn arm(&mut self, backend: &dyn Backend) {
        self.armed_at_us = backend.now_us();
        backend.arm_timer(self.scheduler.head_quota());
    }

    /// The armed timer fired: the head's slice is exhausted. Bills the
    /// full armed duration, re-selects, rearms, and reports the turn
    /// effect so the caller can e.g. wake threads that became ready
    /// remotely in the meantime.
    pub fn on_timer(&mut self, backend: &dyn Backend) -> TurnEffect {
        let now = backend.now_us();
        let consumed = now.saturating_sub(self.armed_at_us) as u32;
        self.scheduler.head_consumed(consumed);
        self.scheduler.head_timeout();
        let effect = self.scheduler.end_turn();
        self.arm(backend);
        effect
    }

    /// The current head blocked voluntarily (IPC wait, signal wait,
    /// `stop`) before its slice expired. Bills actual elapsed time, then
    /// reselects and rearms exactly as `on_timer` does.
    pub fn reschedule(&mut self, backend: &dyn Backend) -> TurnEffect {
        let now = backend.now_us();
        let consumed = now.saturating_sub(self.armed_at_us) as u32;
        self.scheduler.head_consumed(consumed);
        self.scheduler.head_yields();
        let effect = self.scheduler.end_turn();
        self.arm(backend);
        effect
    }
}

/// One timer plus an array of per-CPU `Cpu` objects (`Cpu_pool`),
/// tracking which CPU booted first (`primary_cpu()`).
pub struct CpuPool {
    cpus: Vec<Cpu>,
    primary: usize,
}

impl CpuPool {
    pub fn new(num_cpus: usize, round_quota_us: u32, fill_slice_us: u32, primary: usize) -> Self {
        assert!(num_cpus > 0);
        assert!(primary < num_cpus);
        CpuPool {
            cpus: (0..num_cpus)
                .map(|id| Cpu::new(id, round_quota_us, fill_slice_us))
                .collect(),
            primary,
        }
    }

    pub fn primary_cpu(&self) -> usize {
        self.primary
    }

    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    pub fn cpu(&self, id: usize) -> &Cpu {
        &self.cpus[id]
    }

    pub fn cpu_mut(&mut self, id: usize) -> &mut Cpu {
        &mut self.cpus[id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::mock::MockBackend;
    use crate::kernel::thread::ThreadId;

    fn owner(n: u32) -> Owner {
        Owner::Thread(ThreadId::for_test(n))
    }

    #[test]
    fn timer_fire_advances_head_and_rearms() {
        crate::arch::mock::reset();
        let backend = MockBackend;
        let mut cpu = Cpu::new(0, 1000, 100);
        let a = cpu.scheduler_mut().alloc_share(owner(1), 2, 200);
        cpu.scheduler_mut().ready(a);
        cpu.arm(&backend);
        assert_eq!(cpu.head(), a);

        crate::arch::mock::advance_time_us(200);
        let effect = cpu.on_timer(&backend);
        assert_eq!(effect, TurnEffect::Timeout);
        // claim fully consumed with nothing else ready: falls back to idle.
        assert_eq!(cpu.head(), cpu.scheduler().idle());
    }

    #[test]
    fn voluntary_reschedule_bills_only_elapsed_time() {
        crate::arch::mock::reset();
        let backend = MockBackend;
        let mut cpu = Cpu::new(0, 1000, 100);
        let a = cpu.scheduler_mut().alloc_share(owner(1), 2, 200);
        cpu.scheduler_mut().ready(a);
        cpu.arm(&backend);

        crate::arch::mock::advance_time_us(50);
        cpu.reschedule(&backend);
        assert_eq!(cpu.scheduler().get(a).claim(), 150);
    }
}
