//! Component H (cross-CPU work half) — inter-processor work items that
//! must run on every CPU scheduling a given PD before the originating
//! syscall can return (TLB shoot-down, thread teardown). See spec.md
//! §4.H and §8 invariant 10 / scenario S5.
//!
//! Grounded on `thread.h`'s `Pd_update`/`Destroy` (`Inter_processor_work`
//! subclasses carrying a `caller` reference and a remaining-CPU count,
//! constructed by inserting into the target CPU's work list then parking
//! the caller in `AWAITS_RESTART`) and on `processor.cc`'s broadcast +
//! IPI-dedup pattern, generalized into the teacher's `smp/ipi.rs` idiom
//! of a per-CPU pending bitmap that collapses repeat IPIs to the same
//! target into one.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::arch::AddressSpaceId;
use crate::kernel::arena::{define_id, Arena};
use crate::kernel::pd::CpuSet;
use crate::kernel::thread::ThreadId;

define_id!(
    /// Arena handle for a queued [`CrossCpuWork`] item.
    CrossCpuWorkId
);

/// What a cross-CPU work item does once it runs on a target CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    /// `update_pd`: invalidate the TLB entries for `asid` on this CPU.
    FlushTlb { asid: AddressSpaceId },
    /// `delete_thread`/PD teardown crossing a CPU the thread was last
    /// scheduled on: the thread's residual state on that CPU must be
    /// retired before the destroying syscall returns.
    DestroyThread { thread: ThreadId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkState {
    Pending,
    Completed,
}

struct CrossCpuWork {
    kind: WorkKind,
    caller: ThreadId,
    remaining: CpuSet,
    state: WorkState,
}

/// Owns every in-flight cross-CPU work item plus the per-CPU queues and
/// IPI-pending dedup flags. A single global instance lives on
/// [`crate::kernel::Kernel`] — unlike the scheduler, cross-CPU work is
/// inherently not CPU-local.
pub struct CrossCpuSubsystem {
    items: Arena<CrossCpuWorkId, CrossCpuWork>,
    queues: Vec<VecDeque<CrossCpuWorkId>>,
    ipi_pending: Vec<bool>,
}

impl CrossCpuSubsystem {
    pub fn new(num_cpus: usize) -> Self {
        CrossCpuSubsystem {
            items: Arena::new(),
            queues: (0..num_cpus).map(|_| VecDeque::new()).collect(),
            ipi_pending: alloc::vec![false; num_cpus],
        }
    }

    /// Submit `kind` to run on every CPU in `targets`, parking `caller`
    /// until all of them have executed and acknowledged it. Returns the
    /// work item's id and the subset of `targets` that need a fresh IPI
    /// triggered (a CPU already holding a pending IPI is skipped — the
    /// same dedup the teacher's `smp/ipi.rs` performs).
    pub fn submit(&mut self, kind: WorkKind, caller: ThreadId, targets: CpuSet) -> (CrossCpuWorkId, Vec<usize>) {
        let id = self.items.insert(CrossCpuWork {
            kind,
            caller,
            remaining: targets,
            state: WorkState::Pending,
        });
        let mut needs_ipi = Vec::new();
        for cpu in targets.iter() {
            self.queues[cpu].push_back(id);
            if !self.ipi_pending[cpu] {
                self.ipi_pending[cpu] = true;
                needs_ipi.push(cpu);
            }
        }
        (id, needs_ipi)
    }

    /// Drain every item queued for `cpu` (called from that CPU's IPI
    /// handler) and clear its pending flag, so a subsequent `submit` can
    /// arm a fresh IPI.
    pub fn drain(&mut self, cpu: usize) -> Vec<(CrossCpuWorkId, WorkKind)> {
        self.ipi_pending[cpu] = false;
        let mut drained = Vec::new();
        while let Some(id) = self.queues[cpu].pop_front() {
            if let Some(item) = self.items.get(id) {
                drained.push((id, item.kind));
            }
        }
        drained
    }

    /// `cpu` finished executing work item `id`. Returns the original
    /// caller once every target CPU has acknowledged, so it can be
    /// restarted; returns `None` while other CPUs are still pending.
    pub fn complete(&mut self, id: CrossCpuWorkId, cpu: usize) -> Option<ThreadId> {
        let item = self.items.get_mut(id)?;
        item.remaining.remove(cpu);
        if item.remaining.iter().next().is_some() {
            return None;
        }
        item.state = WorkState::Completed;
        let caller = item.caller;
        self.items.remove(id);
        Some(caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(cpus: &[usize]) -> CpuSet {
        let mut set = CpuSet::empty();
        for &c in cpus {
            set.insert(c);
        }
        set
    }

    fn thread(n: u32) -> ThreadId {
        ThreadId::for_test(n)
    }

    /// Invariant 10 / S5: a TLB shoot-down to N CPUs wakes the caller
    /// only after all N have acknowledged, and repeat submissions to an
    /// already-pending CPU don't re-arm its IPI.
    #[test]
    fn tlb_shootdown_waits_for_all_targets() {
        let mut sys = CrossCpuSubsystem::new(4);
        let (id, needs_ipi) = sys.submit(WorkKind::FlushTlb { asid: 7 }, thread(1), targets(&[0, 2]));
        assert_eq!(needs_ipi, alloc::vec![0, 2]);

        let drained0 = sys.drain(0);
        assert_eq!(drained0.len(), 1);
        assert_eq!(sys.complete(id, 0), None);

        let drained2 = sys.drain(2);
        assert_eq!(drained2.len(), 1);
        assert_eq!(sys.complete(id, 2), Some(thread(1)));
    }

    #[test]
    fn ipi_dedup_across_repeat_submits() {
        let mut sys = CrossCpuSubsystem::new(4);
        let (_id1, needs_ipi1) = sys.submit(WorkKind::FlushTlb { asid: 1 }, thread(1), targets(&[1]));
        assert_eq!(needs_ipi1, alloc::vec![1]);

        // a second item targeting the same, still-undrained CPU must
        // not request a second IPI.
        let (_id2, needs_ipi2) = sys.submit(WorkKind::FlushTlb { asid: 2 }, thread(2), targets(&[1]));
        assert!(needs_ipi2.is_empty());

        let drained = sys.drain(1);
        assert_eq!(drained.len(), 2);

        // after draining, the dedup flag is clear again.
        let (_id3, needs_ipi3) = sys.submit(WorkKind::FlushTlb { asid: 3 }, thread(3), targets(&[1]));
        assert_eq!(needs_ipi3, alloc::vec![1]);
    }

    #[test]
    fn destroy_thread_on_single_cpu_completes_immediately() {
        let mut sys = CrossCpuSubsystem::new(2);
        let (id, needs_ipi) = sys.submit(
            WorkKind::DestroyThread { thread: thread(9) },
            thread(1),
            targets(&[0]),
        );
        assert_eq!(needs_ipi, alloc::vec![0]);
        sys.drain(0);
        assert_eq!(sys.complete(id, 0), Some(thread(1)));
    }
}
