//! Component E — the schedulable, IPC-capable, signal-capable control
//! flow. See spec.md §4.E. Grounded on `Kernel::Thread`'s member list in
//! `thread.h` (the `Cpu_job`/`Ipc_node`/`Signal_handler`/
//! `Signal_context_killer` mixins, the `Timeout` embedding, `_fault`,
//! `_pager`) and the state transitions driven by `thread.cc`'s
//! `_call_*` handlers.
//!
//! A `Thread` owns its [`IpcNode`] inline (mirrors the original's mixin
//! inheritance) but never reaches across to another thread's state
//! itself — matching a sender to a waiting callee, donating scheduling
//! context, and removing a cancelled thread from a signal receiver's
//! queue all require the thread arena and are orchestrated by `Kernel`
//! in `mod.rs`.

use crate::kernel::ipc::IpcNode;
use crate::kernel::arena::define_id;
use crate::kernel::pd::PdId;
use crate::kernel::scheduler::ShareId;
use crate::kernel::signal::{SignalContextId, SignalReceiverId};

define_id!(
    /// Arena handle for a [`Thread`].
    ThreadId
);

/// A thread's gross scheduling/blocking state (spec.md §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Created, not yet started (`start` call pending).
    AwaitsStart,
    /// Runnable or running.
    Active,
    /// Blocked in `send_request_msg`/`await_request_msg`/
    /// `send_reply_msg`.
    AwaitsIpc,
    /// Stopped by `stop`, waiting for `restart`.
    AwaitsRestart,
    /// Blocked in `await_signal`.
    AwaitsSignal,
    /// Blocked in `kill_signal_context`, waiting for the outstanding
    /// delivery to be acknowledged.
    AwaitsSignalContextKill,
    /// Exited or destroyed; terminal.
    Dead,
}

/// The kind of MMU exception that produced a [`Fault`] (spec.md §6
/// "Fault record").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    Write,
    Exec,
    PageMissing,
    Unknown,
}

/// The last unresolved page fault recorded against this thread, handed
/// to its pager via the fault-reflection path (spec.md §4.E "exception
/// routing").
#[derive(Debug, Clone, Copy)]
pub struct Fault {
    pub ip: usize,
    pub addr: usize,
    pub fault_type: FaultType,
}

/// `set_timeout`'s arming record: the signal context to notify and the
/// absolute deadline (in `arch::Backend::now_us` units) at which one
/// signal is submitted to it. Independent of whatever `AWAITS_*` state
/// the thread happens to be in — spec.md §4.E: "a thread carries a
/// single timeout slot ... the caller re-arms explicitly", not tied to
/// a blocking IPC/signal wait.
#[derive(Debug, Clone, Copy)]
pub struct ThreadTimeout {
    pub context: SignalContextId,
    pub deadline_us: u64,
}

/// Opaque general-purpose register snapshot for `read_thread_state`/
/// `write_thread_state`. The original reads/writes the real trapframe
/// the architecture trap entry saved; register-state save/restore is an
/// architecture collaborator concern this core does not model (spec.md
/// §1 Non-goals), so this is a fixed-size word array rather than a
/// per-architecture trapframe type — debug-monitor callers marshal
/// whatever subset of it their architecture cares about.
pub const THREAD_STATE_WORDS: usize = 32;
pub type ThreadState = [u64; THREAD_STATE_WORDS];

pub struct Thread {
    pd: PdId,
    share: ShareId,
    /// Which per-CPU scheduler `share` lives in (each CPU owns its own
    /// `Scheduler` slab — see [`crate::kernel::cpu::Cpu`]).
    cpu: usize,
    state: State,
    ipc: IpcNode,
    is_core: bool,
    paused: bool,
    /// Destination for reflected exceptions (page faults), `None` for
    /// core threads which fault directly into `die`.
    pager: Option<ThreadId>,
    last_fault: Option<Fault>,
    /// Receiver this thread is currently registered as a handler of, so
    /// `cancel_blocking` can find the right queue to remove it from.
    awaiting_receiver: Option<SignalReceiverId>,
    /// Context this thread is blocked destroying, if any.
    awaiting_kill: Option<SignalContextId>,
    /// Single-shot flag armed by `cancel_next_await_signal`: the next
    /// `await_signal` returns immediately instead of blocking.
    cancel_next_await_signal: bool,
    /// Deadline (absolute `arch::Backend::now_us`) of an armed timeout
    /// on the current blocking operation, if any.
    timeout_us: Option<u64>,
    /// `set_timeout`'s independent one-shot alarm, see [`ThreadTimeout`].
    timeout: Option<ThreadTimeout>,
    /// Register snapshot for `read_thread_state`/`write_thread_state`.
    state_words: ThreadState,
}

impl Thread {
    /// `new_thread`: construct a thread bound to its PD and scheduler
    /// share, initially `AwaitsStart`.
    pub fn new(pd: PdId, share: ShareId, cpu: usize, is_core: bool) -> Self {
        Thread {
            pd,
            share,
            cpu,
            state: State::AwaitsStart,
            ipc: IpcNode::new(),
            is_core,
            paused: false,
            pager: None,
            last_fault: None,
            awaiting_receiver: None,
            awaiting_kill: None,
            cancel_next_await_signal: false,
            timeout_us: None,
            timeout: None,
            state_words: [0; THREAD_STATE_WORDS],
        }
    }

    pub fn pd(&self) -> PdId {
        self.pd
    }

    pub fn share(&self) -> ShareId {
        self.share
    }

    pub fn cpu(&self) -> usize {
        self.cpu
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_core(&self) -> bool {
        self.is_core
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn ipc(&self) -> &IpcNode {
        &self.ipc
    }

    pub fn ipc_mut(&mut self) -> &mut IpcNode {
        &mut self.ipc
    }

    pub fn pager(&self) -> Option<ThreadId> {
        self.pager
    }

    pub fn set_pager(&mut self, pager: Option<ThreadId>) {
        self.pager = pager;
    }

    pub fn last_fault(&self) -> Option<Fault> {
        self.last_fault
    }

    pub fn record_fault(&mut self, fault: Fault) {
        self.last_fault = Some(fault);
    }

    pub fn awaiting_receiver(&self) -> Option<SignalReceiverId> {
        self.awaiting_receiver
    }

    pub fn awaiting_kill(&self) -> Option<SignalContextId> {
        self.awaiting_kill
    }

    pub fn timeout_deadline(&self) -> Option<u64> {
        self.timeout_us
    }

    /// `set_timeout`'s currently-armed alarm, if any.
    pub fn timeout(&self) -> Option<ThreadTimeout> {
        self.timeout
    }

    /// `set_timeout(duration, context)`: arm (or replace) the one-shot
    /// alarm. Each thread carries at most one, per spec.md §3.
    pub fn set_timeout(&mut self, context: SignalContextId, deadline_us: u64) {
        self.timeout = Some(ThreadTimeout { context, deadline_us });
    }

    /// The alarm fired (or the caller re-armed/cancelled it explicitly).
    pub fn clear_timeout(&mut self) {
        self.timeout = None;
    }

    /// `read_thread_state`.
    pub fn state_words(&self) -> ThreadState {
        self.state_words
    }

    /// `write_thread_state`.
    pub fn set_state_words(&mut self, words: ThreadState) {
        self.state_words = words;
    }

    /// Move to a new gross state. `Dead` is terminal: once entered, a
    /// further transition is a kernel bug, not a recoverable condition
    /// (same halt-don't-silently-recover posture as the scheduler's
    /// head-removal invariant, spec.md §9).
    pub fn set_state(&mut self, state: State) {
        if self.state == State::Dead && state != State::Dead {
            panic!("Thread::set_state: thread is dead");
        }
        self.state = state;
    }

    /// `start`: the thread becomes runnable for the first time.
    pub fn start(&mut self) {
        debug_assert_eq!(self.state, State::AwaitsStart);
        self.set_state(State::Active);
    }

    /// `pause`: suspend scheduling without disturbing blocking state
    /// (debug-monitor stub).
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// `resume`: undo `pause`.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// `stop`: unconditionally move to `AwaitsRestart`. Any IPC or
    /// signal wait this thread was blocked in must already have been
    /// unwound by the caller (`Kernel::stop_thread`) before calling
    /// this, since only `Kernel` can reach the other side of those
    /// waits.
    pub fn enter_awaits_restart(&mut self) {
        self.set_state(State::AwaitsRestart);
        self.timeout_us = None;
    }

    /// `restart`: the counterpart to `stop`.
    pub fn restart(&mut self) {
        debug_assert_eq!(self.state, State::AwaitsRestart);
        self.set_state(State::Active);
    }

    pub fn enter_awaits_ipc(&mut self, timeout_us: Option<u64>) {
        self.set_state(State::AwaitsIpc);
        self.timeout_us = timeout_us;
    }

    pub fn enter_awaits_signal(&mut self, receiver: SignalReceiverId, timeout_us: Option<u64>) {
        self.set_state(State::AwaitsSignal);
        self.awaiting_receiver = Some(receiver);
        self.timeout_us = timeout_us;
    }

    pub fn enter_awaits_signal_context_kill(&mut self, ctx: SignalContextId) {
        self.set_state(State::AwaitsSignalContextKill);
        self.awaiting_kill = Some(ctx);
    }

    /// Common "unblocked, back to runnable" transition used by IPC
    /// delivery, signal delivery, timeout expiry and kill completion.
    pub fn wake(&mut self) {
        self.set_state(State::Active);
        self.awaiting_receiver = None;
        self.awaiting_kill = None;
        self.timeout_us = None;
    }

    pub fn mark_dead(&mut self) {
        self.state = State::Dead;
        self.timeout_us = None;
    }

    /// `cancel_next_await_signal`: arm the single-shot flag so the next
    /// `await_signal` this thread calls returns immediately.
    pub fn arm_cancel_next_await_signal(&mut self) {
        self.cancel_next_await_signal = true;
    }

    /// Consume the flag armed by `arm_cancel_next_await_signal`, if any.
    pub fn take_cancel_next_await_signal(&mut self) -> bool {
        core::mem::take(&mut self.cancel_next_await_signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::pd::PdId;
    use crate::kernel::scheduler::ShareId;

    fn thread() -> Thread {
        Thread::new(PdId::for_test(0), ShareId::for_test(0), 0, false)
    }

    #[test]
    fn start_then_stop_then_restart() {
        let mut t = thread();
        assert_eq!(t.state(), State::AwaitsStart);
        t.start();
        assert_eq!(t.state(), State::Active);
        t.enter_awaits_restart();
        assert_eq!(t.state(), State::AwaitsRestart);
        t.restart();
        assert_eq!(t.state(), State::Active);
    }

    #[test]
    fn dead_is_terminal() {
        let mut t = thread();
        t.start();
        t.mark_dead();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            t.set_state(State::Active);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn wake_clears_wait_bookkeeping() {
        let mut t = thread();
        t.start();
        t.enter_awaits_signal(SignalReceiverId::for_test(4), Some(1000));
        assert_eq!(t.awaiting_receiver(), Some(SignalReceiverId::for_test(4)));
        t.wake();
        assert_eq!(t.state(), State::Active);
        assert_eq!(t.awaiting_receiver(), None);
        assert_eq!(t.timeout_deadline(), None);
    }

    #[test]
    fn cancel_next_await_signal_is_single_shot() {
        let mut t = thread();
        t.arm_cancel_next_await_signal();
        assert!(t.take_cancel_next_await_signal());
        assert!(!t.take_cancel_next_await_signal());
    }

    /// `set_timeout`'s alarm is independent of the blocking-wait deadline
    /// (`timeout_us`): arming it does not require the thread to be
    /// blocked in IPC or a signal wait at all.
    #[test]
    fn set_timeout_is_independent_of_blocking_state() {
        let mut t = thread();
        t.start();
        assert!(t.timeout().is_none());
        t.set_timeout(SignalContextId::for_test(2), 5_000);
        let armed = t.timeout().unwrap();
        assert_eq!(armed.context, SignalContextId::for_test(2));
        assert_eq!(armed.deadline_us, 5_000);
        assert_eq!(t.state(), State::Active);
        t.clear_timeout();
        assert!(t.timeout().is_none());
    }

    #[test]
    fn thread_state_words_round_trip() {
        let mut t = thread();
        assert_eq!(t.state_words(), [0u64; THREAD_STATE_WORDS]);
        let mut words = [0u64; THREAD_STATE_WORDS];
        words[0] = 0xDEAD_BEEF;
        t.set_state_words(words);
        assert_eq!(t.state_words()[0], 0xDEAD_BEEF);
    }
}
