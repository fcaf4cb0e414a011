//! Component B — per-CPU two-band scheduler (claims + fills + idle).
//!
//! Ported algorithm-for-algorithm from `Cpu_scheduler` in
//! `examples/original_source/repos/base-hw/src/core/kernel/cpu_scheduler.cc`
//! (`_reset`/`_reset_claims`/`_next_round`, `_consumed`, `_set_head`,
//! `_next_fill`, `_head_claimed`/`_head_filled`, `_claim_for_head`,
//! `_turn_effect_share`/`_turn_effect_timeout`, `_fill_for_head`,
//! `_idle_for_head`, `_trim_consumption`, `_quota_introduction`/
//! `_quota_revokation`/`_quota_adaption`, `_head_flush_consumed`,
//! `_head_select`). The public contract in spec.md §4.B is authoritative;
//! this file resolves ordering details (e.g. `insert_behind_head` vs.
//! `insert_head` vs. `insert_tail`) the way the `.cc` file does.
//!
//! The original links shares into intrusive doubly-linked lists via raw
//! pointers (`Claim_list`, `Fill_list`, a ready-remote list). Per the
//! Design Notes this core replaces that with an arena (`shares: Vec<Slot>`)
//! indexed by generation-checked [`ShareId`] handles, and each band is a
//! plain `VecDeque<ShareId>` rather than an intrusive list — the same
//! FIFO/queue semantics the original's lists provide, without raw
//! pointers or prev/next fields threaded through `Share` itself.

use super::share::Share;
use crate::config::NUM_PRIORITIES;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

pub use super::share::{Owner, ShareId};

/// What changed as a result of the last scheduling event, reported back
/// to the CPU object (component I) so it knows whether to arm a new
/// timer and/or context-switch. Mirrors `Cpu_scheduler::Turn_effect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEffect {
    /// Nothing changed.
    None,
    /// The head's remaining slice changed but the head share did not.
    Timeout,
    /// The head share itself changed.
    Share,
}

struct Slot {
    generation: u32,
    share: Option<Share>,
}

/// Per-CPU two-band scheduler: claim bands (one ready, one unready list
/// per priority), a single round-robin fill ring, and an idle fallback.
pub struct Scheduler {
    shares: Vec<Slot>,
    free: Vec<u32>,

    idle: ShareId,

    /// Ready-claim lists, one per priority, highest-priority last index.
    rcl: Vec<VecDeque<ShareId>>,
    /// Unready-claim lists, one per priority.
    ucl: Vec<VecDeque<ShareId>>,
    /// Round-robin fill ring; front is the ring's current head.
    fills: VecDeque<ShareId>,
    /// Shares made ready on a remote CPU, pending `end_turn`.
    ready_remote_queue: VecDeque<ShareId>,

    /// Total quota of one scheduling round, in microseconds.
    quota: u32,
    /// Remaining quota of the current round.
    residual: u32,
    /// Fill slice handed to a share when it (re-)joins the fill ring.
    fill_slice: u32,

    head: ShareId,
    head_quota: u32,
    head_claims: bool,
    head_consumed: u32,
    turn_effect: TurnEffect,
}

impl Scheduler {
    /// Construct a scheduler with its idle share already in place as
    /// head, matching `Cpu_scheduler::Cpu_scheduler(idle, quota, fill)`.
    pub fn new(cpu: usize, round_quota_us: u32, fill_slice_us: u32) -> Self {
        let mut shares = Vec::with_capacity(4);
        shares.push(Slot {
            generation: 0,
            share: Some(Share::new(Owner::Idle { cpu }, crate::config::PRIO_MIN, 0)),
        });
        let idle = ShareId {
            index: 0,
            generation: 0,
        };
        let rcl = (0..NUM_PRIORITIES).map(|_| VecDeque::new()).collect();
        let ucl = (0..NUM_PRIORITIES).map(|_| VecDeque::new()).collect();
        Scheduler {
            shares,
            free: Vec::new(),
            idle,
            rcl,
            ucl,
            fills: VecDeque::new(),
            ready_remote_queue: VecDeque::new(),
            quota: round_quota_us,
            residual: round_quota_us,
            fill_slice: fill_slice_us,
            head: idle,
            head_quota: fill_slice_us,
            head_claims: false,
            head_consumed: 0,
            turn_effect: TurnEffect::Share,
        }
    }

    /// Allocate a new share for `owner` at `priority` with round `quota`
    /// (0 = fill-only, no claim). The share starts unready and absent
    /// from the scheduler; call [`Scheduler::insert`] to enter it.
    pub fn alloc_share(&mut self, owner: Owner, priority: u8, quota: u32) -> ShareId {
        let share = Share::new(owner, priority, quota);
        if let Some(index) = self.free.pop() {
            let slot = &mut self.shares[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.share = Some(share);
            ShareId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.shares.len() as u32;
            self.shares.push(Slot {
                generation: 0,
                share: Some(share),
            });
            ShareId {
                index,
                generation: 0,
            }
        }
    }

    /// Release a share's slot. Caller must have already `remove`d it
    /// from the scheduler's bands (or never inserted it).
    pub fn free_share(&mut self, id: ShareId) {
        if let Some(slot) = self.shares.get_mut(id.index as usize) {
            if slot.generation == id.generation {
                slot.share = None;
                self.free.push(id.index);
            }
        }
    }

    fn share(&self, id: ShareId) -> &Share {
        let slot = &self.shares[id.index as usize];
        assert_eq!(slot.generation, id.generation, "stale ShareId");
        slot.share.as_ref().expect("ShareId of freed share")
    }

    fn share_mut(&mut self, id: ShareId) -> &mut Share {
        let slot = &mut self.shares[id.index as usize];
        assert_eq!(slot.generation, id.generation, "stale ShareId");
        slot.share.as_mut().expect("ShareId of freed share")
    }

    pub fn get(&self, id: ShareId) -> &Share {
        self.share(id)
    }

    /// Re-point a share's owner, used once by `Kernel::new_thread` to
    /// replace the placeholder `Owner::Idle` an allocation is seeded
    /// with before its real `ThreadId` exists (the share must be
    /// allocated before the thread that owns it can be constructed,
    /// since the thread stores the `ShareId`).
    pub fn set_owner(&mut self, id: ShareId, owner: Owner) {
        self.share_mut(id).owner = owner;
    }

    pub fn idle(&self) -> ShareId {
        self.idle
    }

    pub fn head(&self) -> ShareId {
        self.head
    }

    pub fn head_quota(&self) -> u32 {
        self.head_quota
    }

    pub fn head_claims(&self) -> bool {
        self.head_claims
    }

    // ---- internal algorithm, ported from cpu_scheduler.cc ----

    fn reset(&mut self, id: ShareId) {
        let quota = self.share(id).quota;
        self.share_mut(id).claim = quota;
    }

    fn reset_claims(&mut self, p: usize) {
        let rcl: Vec<ShareId> = self.rcl[p].iter().copied().collect();
        let ucl: Vec<ShareId> = self.ucl[p].iter().copied().collect();
        for id in rcl {
            self.reset(id);
        }
        for id in ucl {
            self.reset(id);
        }
    }

    fn next_round(&mut self) {
        self.residual = self.quota;
        for p in 0..NUM_PRIORITIES {
            self.reset_claims(p);
        }
    }

    fn consumed(&mut self, q: u32) {
        if self.residual > q {
            self.residual -= q;
        } else {
            self.next_round();
        }
    }

    fn next_fill(&mut self) {
        let head = self.head;
        self.share_mut(head).fill = self.fill_slice;
        if let Some(front) = self.fills.pop_front() {
            self.fills.push_back(front);
        }
    }

    fn head_claimed(&mut self, r: u32) {
        let head = self.head;
        if self.share(head).quota == 0 {
            return;
        }
        let quota = self.share(head).quota;
        let claim = r.min(quota);
        self.share_mut(head).claim = claim;
        let ready = self.share(head).ready;
        if claim != 0 || !ready {
            return;
        }
        let p = self.share(head).priority as usize;
        if let Some(pos) = self.rcl[p].iter().position(|&s| s == head) {
            self.rcl[p].remove(pos);
            self.rcl[p].push_back(head);
        }
    }

    fn head_filled(&mut self, r: u32) {
        if self.fills.front().copied() != Some(self.head) {
            return;
        }
        if r != 0 {
            let head = self.head;
            self.share_mut(head).fill = r;
        } else {
            self.next_fill();
        }
    }

    fn claim_for_head(&mut self) -> bool {
        for p in (0..NUM_PRIORITIES).rev() {
            let Some(&s) = self.rcl[p].front() else {
                continue;
            };
            let claim = self.share(s).claim;
            if claim == 0 {
                continue;
            }
            if s != self.head {
                self.turn_effect_share(claim, true, s);
            } else {
                self.turn_effect_timeout(claim, true);
            }
            return true;
        }
        false
    }

    fn turn_effect_share(&mut self, q: u32, claims: bool, s: ShareId) {
        self.head_quota = q;
        self.head_claims = claims;
        self.head = s;
        self.turn_effect = TurnEffect::Share;
    }

    fn turn_effect_timeout(&mut self, q: u32, claims: bool) {
        self.head_quota = q;
        self.head_claims = claims;
        self.turn_effect = TurnEffect::Timeout;
    }

    fn fill_for_head(&mut self) -> bool {
        let Some(&s) = self.fills.front() else {
            return false;
        };
        let fill = self.share(s).fill;
        if s != self.head {
            self.turn_effect_share(fill, false, s);
        } else {
            self.turn_effect_timeout(fill, false);
        }
        true
    }

    fn idle_for_head(&mut self) {
        let idle = self.idle;
        if idle != self.head {
            self.turn_effect_share(self.fill_slice, false, idle);
        } else {
            self.turn_effect_timeout(self.fill_slice, false);
        }
    }

    /// Clamp `q` to `[0, min(head_quota, residual)]`, write the clamped
    /// value back through `q`, and return the unconsumed remainder of
    /// the head's slice (`_trim_consumption`).
    fn trim_consumption(&self, q: &mut u32) -> u32 {
        *q = (*q).min(self.head_quota).min(self.residual);
        self.head_quota - *q
    }

    fn quota_introduction(&mut self, id: ShareId) {
        let s = self.share(id);
        let p = s.priority as usize;
        if s.ready {
            self.rcl[p].push_back(id);
        } else {
            self.ucl[p].push_back(id);
        }
    }

    fn quota_revokation(&mut self, id: ShareId) {
        let s = self.share(id);
        let p = s.priority as usize;
        if s.ready {
            if let Some(pos) = self.rcl[p].iter().position(|&x| x == id) {
                self.rcl[p].remove(pos);
            }
        } else if let Some(pos) = self.ucl[p].iter().position(|&x| x == id) {
            self.ucl[p].remove(pos);
        }
    }

    fn quota_adaption(&mut self, id: ShareId, q: u32) {
        if q != 0 {
            let claim = self.share(id).claim;
            if claim > q {
                self.share_mut(id).claim = q;
            }
        } else {
            self.quota_revokation(id);
        }
    }

    fn head_select(&mut self) {
        if self.claim_for_head() {
            return;
        }
        if self.fill_for_head() {
            return;
        }
        self.idle_for_head();
    }

    fn head_flush_consumed(&mut self) {
        let mut q = self.head_consumed;
        let r = self.trim_consumption(&mut q);
        if self.head_claims {
            self.head_claimed(r);
        } else {
            self.head_filled(r);
        }
        self.consumed(q);
        self.head_consumed = 0;
    }

    // ---- public contract, see spec.md §4.B ----

    /// Account `q` microseconds against the current head's slice and
    /// the round residual. Accounting is deferred (`head_flush_consumed`)
    /// until the next event that needs to know the head's effective
    /// remaining time, matching the original's `head_consumed` /
    /// `_head_flush_consumed` split.
    pub fn head_consumed(&mut self, q: u32) {
        self.head_consumed = self.head_consumed.saturating_add(q);
    }

    /// Flush pending consumption, reduce the head's remaining
    /// claim/fill accordingly, then re-select head.
    pub fn head_timeout(&mut self) {
        self.head_flush_consumed();
        self.head_select();
    }

    /// As `head_timeout`, but always retires the head's claim/fill
    /// fully regardless of how much was actually consumed.
    pub fn head_yields(&mut self) {
        let mut q = self.head_consumed;
        self.trim_consumption(&mut q);
        if self.head_claims {
            self.head_claimed(0);
        } else {
            self.head_filled(0);
        }
        self.consumed(q);
        self.head_consumed = 0;
        self.head_select();
    }

    /// Request a cross-CPU wake: append to the ready-remote queue and
    /// report whether the remote CPU's current choice would actually be
    /// displaced (so the caller knows whether raising an IPI is worth
    /// it).
    pub fn ready_remote(&mut self, id: ShareId) -> bool {
        self.ready_remote_queue.push_back(id);

        let s1 = self.share(id);
        if s1.claim == 0 {
            return self.head == self.idle;
        }
        if !self.head_claims {
            return true;
        }
        let s2_prio = self.share(self.head).priority;
        if s1.priority < s2_prio {
            return false;
        }
        if s1.priority > s2_prio {
            return true;
        }
        false
    }

    /// Drain the ready-remote queue (each entry becomes a local
    /// `ready`), return the accumulated turn effect, and reset it.
    pub fn end_turn(&mut self) -> TurnEffect {
        let pending: Vec<ShareId> = self.ready_remote_queue.drain(..).collect();
        for id in pending {
            self.ready(id);
            self.share_mut(id).ready_remote = false;
        }
        let e = self.turn_effect;
        self.turn_effect = TurnEffect::None;
        e
    }

    /// Mark `id` runnable. May preempt the head.
    pub fn ready(&mut self, id: ShareId) {
        assert!(!self.share(id).ready && !self.share(id).ready_remote);
        assert_ne!(id, self.idle);
        self.share_mut(id).ready = true;

        self.share_mut(id).fill = self.fill_slice;
        self.fills.push_back(id);

        if self.share(id).quota != 0 {
            let p = self.share(id).priority as usize;
            if let Some(pos) = self.ucl[p].iter().position(|&x| x == id) {
                self.ucl[p].remove(pos);
            }
            if self.share(id).claim != 0 {
                let head_of_band_claims =
                    self.rcl[p].front().map(|&s| self.share(s).claim != 0).unwrap_or(false);
                if head_of_band_claims {
                    // insert_behind_head: position 1
                    self.rcl[p].insert(1, id);
                } else {
                    self.rcl[p].push_front(id);
                }
            } else {
                self.rcl[p].push_back(id);
            }
        }

        let s1_claim = self.share(id).claim;
        let s2 = self.head;
        if s1_claim == 0 {
            if s2 != self.idle {
                return;
            }
            self.head_flush_consumed();
            let fill = self.share(id).fill;
            self.turn_effect_share(fill, false, id);
            return;
        }

        if !self.head_claims {
            self.head_flush_consumed();
            self.turn_effect_share(s1_claim, true, id);
            return;
        }

        let s1_prio = self.share(id).priority;
        let s2_prio = self.share(s2).priority;
        if s1_prio < s2_prio {
            return;
        }
        if s1_prio > s2_prio {
            self.head_flush_consumed();
            self.turn_effect_share(s1_claim, true, id);
            return;
        }

        // Equal priority: the insertion rules above place `id` directly
        // behind a still-claiming head, so the head is never displaced
        // here — the original walks the claim list from the head to
        // confirm this; with queue-based bands the invariant already
        // holds by construction (see insertion branch above).
    }

    /// Mark `id` unready (inverse of `ready`). If it was head, force
    /// head re-selection.
    pub fn unready(&mut self, id: ShareId) {
        assert!(self.share(id).ready && !self.share(id).ready_remote);
        assert_ne!(id, self.idle);
        self.share_mut(id).ready = false;

        if let Some(pos) = self.fills.iter().position(|&x| x == id) {
            self.fills.remove(pos);
        }

        if self.share(id).quota != 0 {
            let p = self.share(id).priority as usize;
            if let Some(pos) = self.rcl[p].iter().position(|&x| x == id) {
                self.rcl[p].remove(pos);
            }
            self.ucl[p].push_back(id);
        }

        if id != self.head {
            return;
        }
        self.head_timeout();
    }

    /// Dequeue `s` from whichever list(s) hold it. Removing the current
    /// head is a programming error: the original's `PERR(...); while(1)`
    /// infinite loop is replaced here with an explicit halt, per the
    /// Open Question resolution recorded in DESIGN.md.
    pub fn remove(&mut self, id: ShareId) {
        assert_ne!(id, self.idle);
        if id == self.head {
            panic!("Cpu_scheduler::remove: removing the head is not supported");
        }
        if self.share(id).ready_remote {
            if let Some(pos) = self.ready_remote_queue.iter().position(|&x| x == id) {
                self.ready_remote_queue.remove(pos);
            }
        }
        if self.share(id).ready {
            if let Some(pos) = self.fills.iter().position(|&x| x == id) {
                self.fills.remove(pos);
            }
        }
        if self.share(id).quota == 0 {
            return;
        }
        let p = self.share(id).priority as usize;
        let ready = self.share(id).ready;
        let list = if ready { &mut self.rcl[p] } else { &mut self.ucl[p] };
        if let Some(pos) = list.iter().position(|&x| x == id) {
            list.remove(pos);
        }
    }

    /// Place `id` in the unready-claim band of its priority with claim
    /// reset to its quota. Requires quota > 0 and that it was not
    /// previously inserted.
    pub fn insert(&mut self, id: ShareId) {
        assert!(!self.share(id).ready, "Cpu_scheduler::insert: already ready");
        if self.share(id).quota == 0 {
            return;
        }
        let quota = self.share(id).quota;
        self.share_mut(id).claim = quota;
        let p = self.share(id).priority as usize;
        self.ucl[p].push_front(id);
    }

    /// Adjust `id`'s quota in place. Reducing below current claim
    /// truncates claim; zero removes from claim bands; increasing from
    /// zero re-inserts.
    pub fn quota(&mut self, id: ShareId, new_quota: u32) {
        assert_ne!(id, self.idle);
        if self.share(id).quota != 0 {
            self.quota_adaption(id, new_quota);
        } else if new_quota != 0 {
            self.quota_introduction(id);
        }
        self.share_mut(id).quota = new_quota;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::share::Owner;

    fn owner(n: u32) -> Owner {
        Owner::Thread(crate::kernel::thread::ThreadId::for_test(n))
    }

    /// S1 Idle round: no shares; for each of 9 head-timeout events with
    /// slice 100, head remains idle; residual decreases monotonically
    /// 1000 -> 100.
    #[test]
    fn s1_idle_round() {
        let mut sched = Scheduler::new(0, 1000, 100);
        assert_eq!(sched.head(), sched.idle());
        for _ in 0..9 {
            sched.head_consumed(100);
            sched.head_timeout();
            assert_eq!(sched.head(), sched.idle());
        }
    }

    /// S2 Single claim + filler: `A(prio=2, quota=230)` runs, is made
    /// unready after consuming part of its claim, and on becoming ready
    /// again is handed exactly the claim remainder.
    #[test]
    fn s2_single_claim_and_filler() {
        let mut sched = Scheduler::new(0, 1000, 100);
        let a = sched.alloc_share(owner(1), 2, 230);
        sched.insert(a);
        sched.ready(a);
        assert_eq!(sched.head(), a);
        assert_eq!(sched.head_quota(), 230);

        sched.head_consumed(200);
        sched.unready(a);
        assert_eq!(sched.head(), sched.idle());
        assert_eq!(sched.get(a).claim(), 30);

        sched.ready(a);
        assert_eq!(sched.head(), a);
        assert_eq!(sched.head_quota(), 30);
    }

    /// S3 Priority inversion guard.
    #[test]
    fn s3_priority_dominance() {
        let mut sched = Scheduler::new(0, 1000, 100);
        let a = sched.alloc_share(owner(1), 2, 230);
        let b = sched.alloc_share(owner(2), 0, 170);
        let c = sched.alloc_share(owner(3), 3, 110);
        sched.insert(a);
        sched.insert(b);
        sched.insert(c);
        sched.ready(a);
        sched.ready(b);
        sched.ready(c);
        assert_eq!(sched.head(), c);
        assert_eq!(sched.get(c).priority(), 3);
    }

    #[test]
    fn no_unnecessary_preemption_on_insert() {
        let mut sched = Scheduler::new(0, 1000, 100);
        let a = sched.alloc_share(owner(1), 1, 100);
        sched.insert(a);
        sched.ready(a);
        assert_eq!(sched.head(), a);

        let b = sched.alloc_share(owner(2), 1, 100);
        sched.insert(b);
        sched.ready(b);
        // same priority, head still claims => no preemption
        assert_eq!(sched.head(), a);
    }

    #[test]
    fn idle_is_default_head() {
        let sched = Scheduler::new(0, 500, 50);
        assert_eq!(sched.head(), sched.idle());
        assert_eq!(sched.head_quota(), 50);
    }

    #[test]
    fn fill_fairness_round_robin() {
        let mut sched = Scheduler::new(0, 1000, 100);
        let a = sched.alloc_share(owner(1), 1, 0);
        let b = sched.alloc_share(owner(2), 1, 0);
        sched.ready(a);
        assert_eq!(sched.head(), a);
        sched.ready(b);
        // no claim on either side, head stays unless head was idle
        assert_eq!(sched.head(), a);

        sched.head_consumed(100);
        sched.head_timeout();
        assert_eq!(sched.head(), b);

        sched.head_consumed(100);
        sched.head_timeout();
        assert_eq!(sched.head(), a);
    }

    #[test]
    fn remove_of_head_halts() {
        let mut sched = Scheduler::new(0, 1000, 100);
        let a = sched.alloc_share(owner(1), 1, 100);
        sched.insert(a);
        sched.ready(a);
        assert_eq!(sched.head(), a);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sched.remove(a);
        }));
        assert!(result.is_err());
    }
}
