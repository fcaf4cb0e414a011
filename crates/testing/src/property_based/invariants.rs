//! Invariant checks replayed against a real
//! `core_hw_kernel::kernel::scheduler::Scheduler` after every operation
//! in a [`super::generators::ScheduleOp`] sequence. Grounded on the
//! teacher's `property_based/invariants.rs`, which likewise expressed
//! each invariant as a standalone predicate function checked after
//! every generated step rather than only at the end of a run.

use core_hw_kernel::kernel::scheduler::Scheduler;
use core_hw_kernel::kernel::share::Owner;
use core_hw_kernel::kernel::thread::ThreadId;

use super::generators::ScheduleOp;

/// Replay `ops` against a scheduler seeded with `seeds` shares, asserting
/// every invariant after every applied operation. `Ready`/`Unready` ops
/// targeting a share already in that state are skipped rather than
/// applied, since `Scheduler::ready`/`unready` assert against exactly
/// that (spec.md §4.B: "ready"/"unready" are not idempotent at this
/// layer — `Kernel::ready_thread`/`unready_thread` are the idempotent
/// wrapper one level up, see crates/kernel DESIGN.md).
pub fn replay_and_check(seeds: &[(u8, u32)], ops: &[ScheduleOp]) {
    let mut sched = Scheduler::new(0, 1000, 100);
    let mut shares = Vec::with_capacity(seeds.len());
    let mut ready = vec![false; seeds.len()];
    for (i, &(priority, quota)) in seeds.iter().enumerate() {
        let owner = Owner::Thread(ThreadId::for_test(i as u32));
        let id = sched.alloc_share(owner, priority, quota);
        sched.insert(id);
        shares.push(id);
    }

    check_head_is_idle_or_ready(&sched);
    check_priority_dominance(&sched, &shares, &ready);

    for op in ops {
        match *op {
            ScheduleOp::Ready(i) => {
                if !ready[i] {
                    sched.ready(shares[i]);
                    ready[i] = true;
                }
            }
            ScheduleOp::Unready(i) => {
                if ready[i] && shares[i] != sched.idle() {
                    sched.unready(shares[i]);
                    ready[i] = false;
                }
            }
            ScheduleOp::Timeout(micros) => {
                sched.head_consumed(micros);
                sched.head_timeout();
            }
        }
        check_head_is_idle_or_ready(&sched);
        check_priority_dominance(&sched, &shares, &ready);
        check_head_quota_bounded_by_round(&sched);
    }
}

/// Invariant: the selected head is either the idle share or one of the
/// shares currently marked ready — the scheduler never hands the CPU to
/// a share that isn't competing.
fn check_head_is_idle_or_ready(sched: &Scheduler) {
    let head = sched.head();
    if head == sched.idle() {
        return;
    }
    assert!(
        sched.get(head).is_ready(),
        "scheduler selected a non-ready, non-idle share as head"
    );
}

/// Invariant (spec.md §8, invariant 2): while the head is drawing from
/// its claim, no other ready share with remaining claim outranks it in
/// priority.
fn check_priority_dominance(
    sched: &Scheduler,
    shares: &[core_hw_kernel::kernel::scheduler::ShareId],
    ready: &[bool],
) {
    if !sched.head_claims() {
        return;
    }
    let head = sched.head();
    let head_prio = sched.get(head).priority();
    for (i, &id) in shares.iter().enumerate() {
        if !ready[i] || id == head {
            continue;
        }
        let s = sched.get(id);
        if s.claim() > 0 {
            assert!(
                s.priority() <= head_prio,
                "share {} (priority {}) outranks claiming head (priority {}) while ready",
                i,
                s.priority(),
                head_prio
            );
        }
    }
}

/// The head's remaining slice never exceeds the round's total quota,
/// regardless of how many claim/fill hand-offs have happened.
fn check_head_quota_bounded_by_round(sched: &Scheduler) {
    assert!(sched.head_quota() <= 1000, "head quota exceeded the round's total");
}
