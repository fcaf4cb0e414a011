//! `proptest` strategies for randomized scheduler operation sequences.
//! Grounded on the teacher's `property_based/generators.rs`, which
//! built `Strategy`s for its own domain's allocation/scheduling/IPC
//! sequences the same way: a small op enum plus a `prop_oneof!` over
//! its variants, then `prop::collection::vec` to build a sequence.

use proptest::prelude::*;
use proptest::prop_oneof;

use core_hw_kernel::config::{PRIO_MAX, PRIO_MIN};

/// One operation in a scripted sequence driving a freshly built
/// `Scheduler` with a fixed pool of shares `0..share_count`.
#[derive(Debug, Clone, Copy)]
pub enum ScheduleOp {
    /// Make share `index` ready, if it is not already.
    Ready(usize),
    /// Make share `index` unready, if it is currently ready.
    Unready(usize),
    /// Account `micros` of consumption against the current head, then
    /// let the round boundary and re-selection run.
    Timeout(u32),
}

pub fn priority() -> impl Strategy<Value = u8> {
    PRIO_MIN..=PRIO_MAX
}

/// A quota in `[0, 500]`; 0 means fill-only (no claim), matching
/// `Scheduler::alloc_share`'s contract.
pub fn quota() -> impl Strategy<Value = u32> {
    0u32..=500
}

/// `share_count` shares, each with an independent priority and quota,
/// used to seed a scheduler before replaying a [`ScheduleOp`] sequence
/// against it.
pub fn share_seeds(share_count: usize) -> impl Strategy<Value = Vec<(u8, u32)>> {
    prop::collection::vec((priority(), quota()), share_count)
}

pub fn schedule_op(share_count: usize) -> impl Strategy<Value = ScheduleOp> {
    let idx = 0..share_count;
    prop_oneof![
        idx.clone().prop_map(ScheduleOp::Ready),
        idx.prop_map(ScheduleOp::Unready),
        (1u32..=200).prop_map(ScheduleOp::Timeout),
    ]
}

pub fn schedule_op_sequence(share_count: usize) -> impl Strategy<Value = Vec<ScheduleOp>> {
    prop::collection::vec(schedule_op(share_count), 1..40)
}
