//! Scripted scheduler validation, driven against the real
//! `core_hw_kernel::kernel::scheduler::Scheduler` rather than a
//! simulated stand-in. Grounded on the teacher's
//! `scheduler_validation.rs`, which validated fairness/priority/
//! starvation/timeslice properties the same way — one scripted
//! scenario per property, collected into a results summary — but did
//! so against hand-rolled task structs instead of the kernel's own
//! types. Here each scenario drives the actual two-band claim/fill
//! scheduler from spec.md §4.B.

use core_hw_kernel::kernel::scheduler::Scheduler;
use core_hw_kernel::kernel::share::Owner;
use core_hw_kernel::kernel::thread::ThreadId;

fn owner(n: u32) -> Owner {
    Owner::Thread(ThreadId::for_test(n))
}

/// One scripted property check against a freshly built [`Scheduler`].
pub struct PropertyCheck {
    pub property_name: &'static str,
    pub passed: bool,
    pub evidence: String,
}

/// Summary of every scripted scheduler property checked by
/// [`validate_scheduler_properties`].
pub struct SchedulerValidationResults {
    pub checks: Vec<PropertyCheck>,
}

impl SchedulerValidationResults {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }
}

/// Run every scripted scenario and collect the results. Each scenario
/// is independent (fresh `Scheduler`), so a failure in one does not
/// mask another.
pub fn validate_scheduler_properties() -> SchedulerValidationResults {
    let checks = vec![
        check_priority_dominance(),
        check_claim_then_fill_order(),
        check_claim_remainder_preserved_across_unready(),
        check_equal_priority_no_preemption(),
        check_round_resets_claims_at_boundary(),
        check_fill_ring_round_robins(),
    ];
    SchedulerValidationResults { checks }
}

/// Invariant (spec.md §8, invariant 2): among ready claiming shares,
/// the highest-priority one is always selected head.
fn check_priority_dominance() -> PropertyCheck {
    let mut sched = Scheduler::new(0, 1000, 100);
    let low = sched.alloc_share(owner(1), 0, 170);
    let mid = sched.alloc_share(owner(2), 2, 230);
    let high = sched.alloc_share(owner(3), 3, 110);
    for s in [low, mid, high] {
        sched.insert(s);
        sched.ready(s);
    }
    let passed = sched.head() == high && sched.get(high).priority() == 3;
    PropertyCheck {
        property_name: "priority dominance",
        passed,
        evidence: format!("head priority = {}", sched.get(sched.head()).priority()),
    }
}

/// Invariant (spec.md §8, invariant 1): a share with remaining claim
/// always preempts the fill ring and idle.
fn check_claim_then_fill_order() -> PropertyCheck {
    let mut sched = Scheduler::new(0, 1000, 100);
    let filler = sched.alloc_share(owner(1), 1, 0);
    sched.ready(filler);
    let passed_before = sched.head() == filler;

    let claimer = sched.alloc_share(owner(2), 1, 100);
    sched.insert(claimer);
    sched.ready(claimer);
    let passed_after = sched.head() == claimer;

    PropertyCheck {
        property_name: "claim preempts fill",
        passed: passed_before && passed_after,
        evidence: format!(
            "head before claimer ready = filler:{}, after = claimer:{}",
            passed_before,
            passed_after
        ),
    }
}

/// Scenario S2-shaped: a share made unready mid-round keeps its claim
/// remainder and resumes with exactly that much, not a fresh quota.
fn check_claim_remainder_preserved_across_unready() -> PropertyCheck {
    let mut sched = Scheduler::new(0, 1000, 100);
    let a = sched.alloc_share(owner(1), 2, 230);
    sched.insert(a);
    sched.ready(a);
    sched.head_consumed(200);
    sched.unready(a);
    let claim_after_unready = sched.get(a).claim();
    sched.ready(a);
    let passed = claim_after_unready == 30 && sched.head_quota() == 30;
    PropertyCheck {
        property_name: "claim remainder preserved across unready",
        passed,
        evidence: format!("claim={} head_quota={}", claim_after_unready, sched.head_quota()),
    }
}

/// Invariant (spec.md §8, invariant 3): two claiming shares of equal
/// priority never preempt each other mid-round.
fn check_equal_priority_no_preemption() -> PropertyCheck {
    let mut sched = Scheduler::new(0, 1000, 100);
    let a = sched.alloc_share(owner(1), 1, 100);
    sched.insert(a);
    sched.ready(a);
    let b = sched.alloc_share(owner(2), 1, 100);
    sched.insert(b);
    sched.ready(b);
    let passed = sched.head() == a;
    PropertyCheck {
        property_name: "equal priority does not preempt",
        passed,
        evidence: format!("head unchanged = {}", passed),
    }
}

/// Invariant (spec.md §8, invariant 4): a share's claim is drawn down
/// by consumption within a round and reset back to its full quota
/// exactly at the round boundary.
fn check_round_resets_claims_at_boundary() -> PropertyCheck {
    let mut sched = Scheduler::new(0, 1000, 100);
    let a = sched.alloc_share(owner(1), 1, 1000);
    sched.insert(a);
    sched.ready(a);
    let claim_before = sched.get(a).claim();

    // Consume exactly the whole round's quota in one slice: this both
    // drives the share's own claim to 0 and closes out the round,
    // whose boundary resets every share's claim back to its quota.
    sched.head_consumed(1000);
    sched.head_timeout();

    let claim_after = sched.get(a).claim();
    let passed = claim_before == 1000 && claim_after == 1000;
    PropertyCheck {
        property_name: "round boundary resets claim to quota",
        passed,
        evidence: format!("claim_before={} claim_after={}", claim_before, claim_after),
    }
}

/// Invariant (spec.md §8, invariant 5): two fill-only shares with no
/// claim round-robin fairly once a claiming share is absent.
fn check_fill_ring_round_robins() -> PropertyCheck {
    let mut sched = Scheduler::new(0, 1000, 100);
    let a = sched.alloc_share(owner(1), 1, 0);
    let b = sched.alloc_share(owner(2), 1, 0);
    sched.ready(a);
    sched.ready(b);
    sched.head_consumed(100);
    sched.head_timeout();
    let first_switch = sched.head() == b;
    sched.head_consumed(100);
    sched.head_timeout();
    let second_switch = sched.head() == a;
    PropertyCheck {
        property_name: "fill ring round-robins",
        passed: first_switch && second_switch,
        evidence: format!("a->b={} b->a={}", first_switch, second_switch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_scripted_properties_hold() {
        let results = validate_scheduler_properties();
        for check in &results.checks {
            assert!(check.passed, "{}: {}", check.property_name, check.evidence);
        }
        assert_eq!(results.passed_count(), results.checks.len());
        assert!(results.all_passed());
    }
}
