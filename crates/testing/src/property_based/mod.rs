//! Property-based sweeps over the scheduler's public API, replayed
//! against the real `core_hw_kernel::kernel::scheduler::Scheduler`.
//! Grounded on the teacher's `property_based/mod.rs`, which wired its
//! own `generators`/`invariants` pair into a `proptest!` block the same
//! way: generate a random operation sequence, replay it, assert
//! invariants after each step.

pub mod generators;
pub mod invariants;

use proptest::prelude::*;

use generators::{schedule_op_sequence, share_seeds};
use invariants::replay_and_check;

const SHARE_COUNT: usize = 4;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn scheduler_invariants_hold_under_random_schedules(
        seeds in share_seeds(SHARE_COUNT),
        ops in schedule_op_sequence(SHARE_COUNT),
    ) {
        replay_and_check(&seeds, &ops);
    }
}

#[cfg(test)]
mod quickcheck_tests {
    use super::*;
    use quickcheck::{quickcheck, TestResult};

    /// A `quickcheck`-driven cousin of the `proptest` sweep above: a
    /// fixed seed of equal-priority, equal-quota shares and a raw
    /// `Vec<u8>` of interleaved ready/unready/timeout codes, decoded by
    /// hand rather than through a `Strategy`. Covers the same invariant
    /// surface with `quickcheck`'s shrinking behavior instead.
    fn decode(code: u8, share_count: usize) -> generators::ScheduleOp {
        match code % 3 {
            0 => generators::ScheduleOp::Ready((code as usize / 3) % share_count),
            1 => generators::ScheduleOp::Unready((code as usize / 3) % share_count),
            _ => generators::ScheduleOp::Timeout(1 + (code as u32 % 200)),
        }
    }

    fn prop_invariants_hold_for_decoded_ops(codes: Vec<u8>) -> TestResult {
        if codes.is_empty() || codes.len() > 64 {
            return TestResult::discard();
        }
        let seeds = vec![(1u8, 100u32); SHARE_COUNT];
        let ops: Vec<_> = codes.iter().map(|&c| decode(c, SHARE_COUNT)).collect();
        replay_and_check(&seeds, &ops);
        TestResult::passed()
    }

    #[test]
    fn scheduler_invariants_hold_for_decoded_byte_sequences() {
        quickcheck(prop_invariants_hold_for_decoded_ops as fn(Vec<u8>) -> TestResult);
    }
}
