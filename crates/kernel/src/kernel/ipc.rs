//! Component F — synchronous IPC node state machine. See spec.md §4.F
//! and the glossary's "Helping". Grounded on the `Ipc_node`-shaped
//! methods visible on `Kernel::Thread` in `thread.h`/`thread.cc`
//! (`_call_send_request_msg`, `_call_await_request_msg`,
//! `_call_send_reply_msg`, `ipc_copy_msg`, `ipc_node`'s role checks
//! before `_call`/`_mmu_exception` scheduling decisions).
//!
//! This module holds only the per-thread IPC state and its local
//! transitions. Matching a sender against a waiting callee, copying the
//! message (capability translation, [`crate::kernel::object`]) and
//! donating the sender's scheduling context to the callee ("helping")
//! all require looking up *other* threads by [`ThreadId`], so that
//! orchestration lives on `Kernel` in `mod.rs`, the one place that holds
//! the thread arena.

use alloc::collections::VecDeque;

use crate::kernel::thread::ThreadId;

/// A thread's role with respect to the single in-flight IPC operation it
/// may be part of at a time (spec.md glossary "IPC node").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Not part of any IPC exchange.
    Inactive,
    /// Blocked in `await_request_msg`, exposed to matching senders.
    AwaitsRequest,
    /// Sent a request that donates its scheduling context to the
    /// callee until a reply arrives ("helping" — spec.md glossary).
    SendHelping,
    /// Sent a request without donating its scheduling context.
    SendNonHelping,
    /// Request delivered; blocked until the callee replies.
    AwaitsReply,
    /// Received a request, has not yet replied; not blocked.
    PrepareReply,
}

/// Outcome of [`IpcNode::cancel_waiting`]: whether the node was actually
/// parked in a cancellable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Thread wasn't blocked on IPC; nothing to do.
    NotWaiting,
    /// Was blocked awaiting a request; now inactive.
    WasAwaitingRequest,
    /// Was blocked awaiting a reply; now inactive (the in-flight request
    /// is abandoned — the eventual late reply, if any, is dropped).
    WasAwaitingReply,
}

pub struct IpcNode {
    role: Role,
    /// Threads queued to be dequeued in FIFO order once this node enters
    /// `AwaitsRequest` (spec.md §4.F "the kernel queues callers that
    /// arrive before the callee is listening").
    waiting_callers: VecDeque<ThreadId>,
    /// Who this node is currently sending to / replying to.
    callee: Option<ThreadId>,
    /// Set by `enter_send(.., true)`, cleared by `enter_inactive`.
    /// Tracked separately from `role` because the donation outlives the
    /// momentary `SendHelping` role: spec.md §4.F's role table lists
    /// `SEND_HELPING` and `AWAITS_REPLY` as distinct states, but the
    /// donation itself ("waiting for reply, donating CPU share to
    /// callee") has to still hold once the node has moved on to
    /// `AwaitsReply` — that's the whole blocked period, not just the
    /// instant of the call. `Kernel::execution_owner` walks this flag
    /// plus `callee` to resolve a helping chain's `helping_sink()`.
    helping: bool,
}

impl IpcNode {
    pub fn new() -> Self {
        IpcNode {
            role: Role::Inactive,
            waiting_callers: VecDeque::new(),
            callee: None,
            helping: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn callee(&self) -> Option<ThreadId> {
        self.callee
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self.role, Role::AwaitsRequest | Role::SendHelping | Role::SendNonHelping | Role::AwaitsReply)
    }

    /// This node is blocked sending a request that donates its
    /// scheduling context to the callee, for the whole blocked period
    /// (`SendHelping` through `AwaitsReply`), not just the momentary
    /// `SendHelping` role.
    pub fn is_helping(&self) -> bool {
        self.helping && self.is_blocked()
    }

    pub fn enter_awaits_request(&mut self) {
        self.role = Role::AwaitsRequest;
        self.callee = None;
    }

    pub fn enter_send(&mut self, callee: ThreadId, helping: bool) {
        self.role = if helping { Role::SendHelping } else { Role::SendNonHelping };
        self.callee = Some(callee);
        self.helping = helping;
    }

    pub fn enter_awaits_reply(&mut self) {
        self.role = Role::AwaitsReply;
    }

    pub fn enter_prepare_reply(&mut self, caller: ThreadId) {
        self.role = Role::PrepareReply;
        self.callee = Some(caller);
    }

    pub fn enter_inactive(&mut self) {
        self.role = Role::Inactive;
        self.callee = None;
        self.helping = false;
    }

    /// Queue `caller` on this (callee) node; valid regardless of current
    /// role, since a request can arrive before the callee calls
    /// `await_request_msg`.
    pub fn enqueue_caller(&mut self, caller: ThreadId) {
        self.waiting_callers.push_back(caller);
    }

    pub fn dequeue_caller(&mut self) -> Option<ThreadId> {
        self.waiting_callers.pop_front()
    }

    pub fn has_waiting_callers(&self) -> bool {
        !self.waiting_callers.is_empty()
    }

    /// Cancel whatever blocking IPC operation this node is in the middle
    /// of (spec.md glossary "cancel_blocking"): returns it to `Inactive`
    /// and reports what state it left.
    pub fn cancel_waiting(&mut self) -> CancelOutcome {
        let outcome = match self.role {
            Role::AwaitsRequest => CancelOutcome::WasAwaitingRequest,
            Role::SendHelping | Role::SendNonHelping | Role::AwaitsReply => CancelOutcome::WasAwaitingReply,
            Role::Inactive | Role::PrepareReply => return CancelOutcome::NotWaiting,
        };
        self.enter_inactive();
        outcome
    }
}

impl Default for IpcNode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(n: u32) -> ThreadId {
        ThreadId::for_test(n)
    }

    #[test]
    fn request_reply_round_trip() {
        let mut caller = IpcNode::new();
        let mut callee = IpcNode::new();

        callee.enter_awaits_request();
        caller.enter_send(thread(2), true);
        assert!(caller.is_helping());

        callee.enter_prepare_reply(thread(1));
        caller.enter_awaits_reply();
        assert!(caller.is_blocked());

        callee.enter_inactive();
        caller.enter_inactive();
        assert!(!caller.is_blocked());
        assert_eq!(caller.role(), Role::Inactive);
    }

    #[test]
    fn late_caller_queues_until_await_request() {
        let mut callee = IpcNode::new();
        callee.enqueue_caller(thread(5));
        assert!(callee.has_waiting_callers());
        callee.enter_awaits_request();
        assert_eq!(callee.dequeue_caller(), Some(thread(5)));
        assert_eq!(callee.dequeue_caller(), None);
    }

    #[test]
    fn cancel_waiting_reports_prior_state() {
        let mut node = IpcNode::new();
        assert_eq!(node.cancel_waiting(), CancelOutcome::NotWaiting);

        node.enter_awaits_request();
        assert_eq!(node.cancel_waiting(), CancelOutcome::WasAwaitingRequest);
        assert_eq!(node.role(), Role::Inactive);

        node.enter_send(thread(9), false);
        node.enter_awaits_reply();
        assert_eq!(node.cancel_waiting(), CancelOutcome::WasAwaitingReply);
    }
}
