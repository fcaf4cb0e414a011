//! The kernel core: arenas for every object kind (components C–H) bound
//! together by [`Kernel`], the aggregate that orchestrates cross-object
//! operations no single component's data type can perform on its own
//! (matching a sender to a waiting callee, delivering a signal, running
//! cross-CPU work, routing a syscall to the right component).
//!
//! Submodules hold local state and its own-node transitions; this file
//! is where threads, PDs, signals, IRQs and CPUs actually talk to each
//! other, the same split `thread.cc`'s `_call_*` handlers embody by
//! reaching into whatever other object the call names.

pub mod arena;
#[cfg(not(any(test, feature = "test-utils")))]
pub mod boot;
pub mod cpu;
pub mod cross_cpu;
pub mod error;
pub mod ipc;
pub mod irq;
pub mod object;
pub mod pd;
pub mod scheduler;
pub mod share;
pub mod signal;
pub mod syscall;
pub mod thread;

use alloc::vec::Vec;

use crate::arch::Backend;
use crate::kernel::arena::Arena;
use crate::kernel::cpu::CpuPool;
use crate::kernel::cross_cpu::{CrossCpuSubsystem, WorkKind};
use crate::kernel::error::Outcome;
use crate::kernel::ipc::{CancelOutcome, Role};
use crate::kernel::irq::{IrqId, TriggerMode, UserIrq};
use crate::kernel::object::{CapId, CapabilityTree, ObjectRef, OutOfMemory};
use crate::kernel::pd::{CpuSet, Pd, PdId};
use crate::kernel::scheduler::Owner;
use crate::kernel::signal::{AckOutcome, KillOutcome, SignalContextId, SignalReceiverId, SignalSubsystem};
use crate::kernel::thread::{Thread, ThreadId};

/// Everything the core owns: one arena per object kind, the per-CPU
/// scheduler/timer pool, and the cross-cutting subsystems (signals,
/// cross-CPU work) that have no single CPU affinity of their own.
pub struct Kernel {
    threads: Arena<ThreadId, Thread>,
    pds: Arena<PdId, Pd>,
    irqs: Arena<IrqId, UserIrq>,
    signals: SignalSubsystem,
    cross_cpu: CrossCpuSubsystem,
    cpus: CpuPool,
    core_pd: PdId,
}

impl Kernel {
    pub fn new(num_cpus: usize, round_quota_us: u32, fill_slice_us: u32) -> Self {
        let mut pds = Arena::new();
        let core_pd = pds.insert(Pd::new(0, true));
        Kernel {
            threads: Arena::new(),
            pds,
            irqs: Arena::new(),
            signals: SignalSubsystem::new(),
            cross_cpu: CrossCpuSubsystem::new(num_cpus),
            cpus: CpuPool::new(num_cpus, round_quota_us, fill_slice_us, 0),
            core_pd,
        }
    }

    pub fn core_pd(&self) -> PdId {
        self.core_pd
    }

    pub fn cpus(&self) -> &CpuPool {
        &self.cpus
    }

    pub fn cpus_mut(&mut self) -> &mut CpuPool {
        &mut self.cpus
    }

    pub fn thread(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.get(id)
    }

    pub fn pd(&self, id: PdId) -> Option<&Pd> {
        self.pds.get(id)
    }

    // ---- PD / thread lifecycle ----

    /// `new_pd(memory, page-table)`.
    pub fn new_pd(&mut self, asid: u64, is_core: bool) -> PdId {
        self.pds.insert(Pd::new(asid, is_core))
    }

    /// `delete_pd`: a PD is destroyed only when no thread references it
    /// any more (spec.md §3 "Protection domain" lifecycle) — the core
    /// pd, which every core thread is created in, is never deletable.
    pub fn delete_pd(&mut self, pd: PdId) -> Outcome {
        if !self.pds.contains(pd) {
            return Outcome::InvalidArg;
        }
        if pd == self.core_pd {
            return Outcome::InvalidArg;
        }
        if self.threads.iter().any(|(_, t)| t.pd() == pd) {
            return Outcome::InvalidArg;
        }
        self.pds.remove(pd);
        Outcome::Ok
    }

    /// `new_thread`: allocate a scheduler share on `cpu` and bind a
    /// thread to it, `AwaitsStart`.
    pub fn new_thread(&mut self, pd: PdId, cpu: usize, priority: u8, quota: u32) -> ThreadId {
        let is_core = self.pds.get(pd).map(|p| p.cap_tree().is_core()).unwrap_or(false);
        let share = self
            .cpus
            .cpu_mut(cpu)
            .scheduler_mut()
            .alloc_share(Owner::Idle { cpu }, priority, quota);
        let id = self.threads.insert(Thread::new(pd, share, cpu, is_core));
        // The share was allocated with a placeholder owner since the
        // thread didn't exist yet; re-point it now that it does.
        self.cpus.cpu_mut(cpu).scheduler_mut().set_owner(share, Owner::Thread(id));
        if let Some(p) = self.pds.get_mut(pd) {
            p.note_scheduled_on(cpu);
        }
        id
    }

    /// `start_thread`.
    pub fn start_thread(&mut self, thread: ThreadId) -> Outcome {
        let Some(t) = self.threads.get_mut(thread) else {
            return Outcome::InvalidArg;
        };
        t.start();
        self.ready_thread(thread);
        Outcome::Ok
    }

    /// `pause_thread` / `resume_thread`.
    pub fn pause_thread(&mut self, thread: ThreadId) -> Outcome {
        match self.threads.get_mut(thread) {
            Some(t) => {
                t.pause();
                Outcome::Ok
            }
            None => Outcome::InvalidArg,
        }
    }

    pub fn resume_thread(&mut self, thread: ThreadId) -> Outcome {
        match self.threads.get_mut(thread) {
            Some(t) => {
                t.resume();
                Outcome::Ok
            }
            None => Outcome::InvalidArg,
        }
    }

    /// `stop_thread`: unwind whatever this thread is blocked in (IPC or
    /// signal wait), then park it in `AwaitsRestart`.
    pub fn stop_thread(&mut self, thread: ThreadId) -> Outcome {
        if !self.threads.contains(thread) {
            return Outcome::InvalidArg;
        }
        // `unready_thread` is idempotent (see its definition), so this
        // covers both an `Active` thread and one still ready only
        // because it was mid-helping-send (spec.md glossary "Helping")
        // when stopped.
        self.unwind_blocking(thread);
        self.unready_thread(thread);
        let t = self.threads.get_mut(thread).unwrap();
        t.enter_awaits_restart();
        Outcome::Ok
    }

    /// `restart_thread`.
    pub fn restart_thread(&mut self, thread: ThreadId) -> Outcome {
        match self.threads.get_mut(thread) {
            Some(t) => {
                t.restart();
                self.ready_thread(thread);
                Outcome::Ok
            }
            None => Outcome::InvalidArg,
        }
    }

    /// `cancel_thread_blocking`: like `stop_thread`'s unwind, but the
    /// thread goes straight back to `Active` reporting `Cancelled`
    /// rather than parking in `AwaitsRestart`.
    pub fn cancel_thread_blocking(&mut self, thread: ThreadId) -> Outcome {
        use crate::kernel::thread::State;
        let Some(t) = self.threads.get(thread) else {
            return Outcome::InvalidArg;
        };
        let was_blocked = matches!(
            t.state(),
            State::AwaitsIpc | State::AwaitsSignal | State::AwaitsSignalContextKill
        );
        if !was_blocked {
            return Outcome::Ok;
        }
        self.unwind_blocking(thread);
        self.threads.get_mut(thread).unwrap().wake();
        self.ready_thread(thread);
        Outcome::Ok
    }

    /// Unwind an in-progress IPC or signal wait without deciding what
    /// state the thread lands in afterwards — shared by `stop_thread`
    /// and `cancel_thread_blocking`.
    fn unwind_blocking(&mut self, thread: ThreadId) {
        let receiver = self.threads.get(thread).and_then(|t| t.awaiting_receiver());
        let cancel_outcome = self.threads.get_mut(thread).unwrap().ipc_mut().cancel_waiting();
        if cancel_outcome != CancelOutcome::NotWaiting {
            // own share's scheduling participation resumes with the
            // thread; nothing further to unwind on the IPC side since
            // this thread never installed itself on the other party.
        }
        if let Some(receiver) = receiver {
            self.signals.remove_handler(receiver, thread);
        }
    }

    /// Architecture exception routing's MMU-fault path (spec.md §4.E
    /// "Exception routing"): record the fault, unwind whatever `thread`
    /// was blocked in, park it in `AwaitsRestart`, then wake its pager
    /// if one is registered and currently blocked. The pager wake-up is
    /// a direct state transition rather than a signal submission — this
    /// crate models the `_pager` link itself (thread.rs) but not a
    /// separate signal context for the pager capability.
    pub fn reflect_fault(&mut self, thread: ThreadId, fault: crate::kernel::thread::Fault) -> Outcome {
        if !self.threads.contains(thread) {
            return Outcome::InvalidArg;
        }
        self.unwind_blocking(thread);
        self.unready_thread(thread);
        let pager = {
            let t = self.threads.get_mut(thread).unwrap();
            t.record_fault(fault);
            t.enter_awaits_restart();
            t.pager()
        };
        if let Some(pager) = pager {
            use crate::kernel::thread::State;
            let blocked = self
                .threads
                .get(pager)
                .is_some_and(|pt| matches!(pt.state(), State::AwaitsIpc | State::AwaitsSignal));
            if blocked {
                self.threads.get_mut(pager).unwrap().wake();
                self.ready_thread(pager);
            }
        }
        Outcome::Ok
    }

    /// `delete_thread`: retire `thread`'s share and cross-CPU state. A
    /// thread is destroyed only when it is not currently scheduled as
    /// the running head of any CPU (spec.md §3 "Thread lifecycle");
    /// otherwise the teardown is queued as cross-CPU work and `caller`
    /// parks in `AwaitsRestart` until `handle_ipi` drains it on that
    /// CPU, mirroring `update_pd`'s submit/IPI/park pattern.
    pub fn delete_thread(&mut self, thread: ThreadId, caller: ThreadId, backend: &dyn Backend) -> Outcome {
        let Some(t) = self.threads.get(thread) else {
            return Outcome::InvalidArg;
        };
        let cpu = t.cpu();
        if self.cpus.cpu(cpu).head_owner() != Owner::Thread(thread) {
            self.teardown_thread(thread);
            return Outcome::Ok;
        }
        let mut targets = CpuSet::empty();
        targets.insert(cpu);
        let (_id, needs_ipi) = self.cross_cpu.submit(WorkKind::DestroyThread { thread }, caller, targets);
        for cpu in needs_ipi {
            backend.trigger_ipi(cpu);
        }
        self.threads.get_mut(caller).unwrap().enter_awaits_restart();
        self.unready_thread(caller);
        Outcome::Ok
    }

    /// Shared teardown for a thread that is not (or no longer) the
    /// running head of any CPU: unschedule its share before freeing it,
    /// so the scheduler's `head`/bands never keep a dangling `ShareId`
    /// around (`Scheduler::free_share`'s own contract: "Caller must have
    /// already `remove`d it from the scheduler's bands"). Used directly
    /// by `delete_thread` for an off-CPU thread, and by `handle_ipi`'s
    /// `DestroyThread` arm once the cross-CPU work item has run.
    fn teardown_thread(&mut self, thread: ThreadId) {
        let Some(t) = self.threads.get(thread) else { return };
        let (cpu, share, pd) = (t.cpu(), t.share(), t.pd());
        self.unready_thread(thread);
        let scheduler = self.cpus.cpu_mut(cpu).scheduler_mut();
        scheduler.remove(share);
        scheduler.free_share(share);
        if let Some(p) = self.pds.get_mut(pd) {
            p.cap_tree_mut().invalidate_object(ObjectRef::Thread(thread));
            p.note_unscheduled_on(cpu);
        }
        self.threads.remove(thread);
    }

    /// Idempotent: a helping IPC send leaves the caller's share ready
    /// for the whole call (see `send_request_msg`), so several call
    /// sites (`stop_thread`, `cancel_thread_blocking`) that used to
    /// infer readiness from gross thread state now just call this
    /// unconditionally and rely on the scheduler's own ready flag.
    fn ready_thread(&mut self, thread: ThreadId) {
        let Some(t) = self.threads.get(thread) else { return };
        let (cpu, share) = (t.cpu(), t.share());
        let scheduler = self.cpus.cpu_mut(cpu).scheduler_mut();
        if !scheduler.get(share).is_ready() {
            scheduler.ready(share);
        }
    }

    fn unready_thread(&mut self, thread: ThreadId) {
        let Some(t) = self.threads.get(thread) else { return };
        let (cpu, share) = (t.cpu(), t.share());
        let scheduler = self.cpus.cpu_mut(cpu).scheduler_mut();
        if scheduler.get(share).is_ready() {
            scheduler.unready(share);
        }
    }

    /// `thread_quota`: adjust a thread's scheduling share in place
    /// (spec.md §4.B `quota(share, new_quota)`).
    pub fn thread_quota(&mut self, thread: ThreadId, new_quota: u32) -> Outcome {
        let Some(t) = self.threads.get(thread) else {
            return Outcome::InvalidArg;
        };
        let (cpu, share) = (t.cpu(), t.share());
        self.cpus.cpu_mut(cpu).scheduler_mut().quota(share, new_quota);
        Outcome::Ok
    }

    /// `yield_thread`: the calling thread's own CPU retires its current
    /// slice in full, same as the scheduler's `head_yields` (spec.md
    /// §4.B), rather than waiting for the timer to trim it.
    pub fn yield_thread(&mut self, thread: ThreadId) -> Outcome {
        let Some(t) = self.threads.get(thread) else {
            return Outcome::InvalidArg;
        };
        let cpu = t.cpu();
        self.cpus.cpu_mut(cpu).scheduler_mut().head_yields();
        Outcome::Ok
    }

    /// `get_thread_id`: the PD-local capid `thread` is known by inside
    /// `in_pd`'s capability tree, if any reference to it has ever been
    /// installed there.
    pub fn get_thread_id(&self, in_pd: PdId, thread: ThreadId) -> Option<CapId> {
        self.pds.get(in_pd)?.cap_tree().find_capid_for(ObjectRef::Thread(thread))
    }

    /// `read_thread_state` / `write_thread_state`: the debug-monitor
    /// register-snapshot accessors (spec.md §4.E). No access-control
    /// check here — callers (the restricted-to-core-threads syscall
    /// dispatch) are expected to have already rejected a non-core
    /// caller, per spec.md §4.E "Access control".
    pub fn read_thread_state(&self, thread: ThreadId) -> Option<crate::kernel::thread::ThreadState> {
        self.threads.get(thread).map(|t| t.state_words())
    }

    pub fn write_thread_state(&mut self, thread: ThreadId, words: crate::kernel::thread::ThreadState) -> Outcome {
        match self.threads.get_mut(thread) {
            Some(t) => {
                t.set_state_words(words);
                Outcome::Ok
            }
            None => Outcome::InvalidArg,
        }
    }

    /// `set_pager`.
    pub fn set_pager(&mut self, thread: ThreadId, pager: Option<ThreadId>) -> Outcome {
        match self.threads.get_mut(thread) {
            Some(t) => {
                t.set_pager(pager);
                Outcome::Ok
            }
            None => Outcome::InvalidArg,
        }
    }

    // ---- Timeouts ----

    /// `set_timeout`: arm a one-shot alarm independent of whatever the
    /// thread is otherwise doing; `duration_us` from now (spec.md §4.E
    /// "Timeouts").
    pub fn set_timeout(
        &mut self,
        thread: ThreadId,
        context: SignalContextId,
        duration_us: u32,
        backend: &dyn Backend,
    ) -> Outcome {
        let Some(t) = self.threads.get_mut(thread) else {
            return Outcome::InvalidArg;
        };
        let deadline = backend.now_us().saturating_add(duration_us as u64);
        t.set_timeout(context, deadline);
        Outcome::Ok
    }

    /// `timeout_max_us`: the largest duration a single `set_timeout` can
    /// represent.
    pub fn timeout_max_us(&self) -> u64 {
        u64::MAX
    }

    /// `time`: read the free-running microsecond counter.
    pub fn time(&self, backend: &dyn Backend) -> u64 {
        backend.now_us()
    }

    /// Fire every `set_timeout` alarm whose deadline has passed. Called
    /// alongside the per-CPU timer tick (`Cpu::on_timer`); unlike that
    /// tick, this isn't CPU-affine, since a thread's alarm context can
    /// live anywhere.
    pub fn check_timeouts(&mut self, backend: &dyn Backend) {
        let now = backend.now_us();
        let expired: Vec<(ThreadId, SignalContextId)> = self
            .threads
            .iter()
            .filter_map(|(id, t)| {
                t.timeout()
                    .filter(|armed| armed.deadline_us <= now)
                    .map(|armed| (id, armed.context))
            })
            .collect();
        for (id, ctx) in expired {
            if let Some(t) = self.threads.get_mut(id) {
                t.clear_timeout();
            }
            self.submit_signal(ctx, 1);
        }
    }

    // ---- IPC (component F) ----

    /// `send_request_msg`: capability translation between the two PDs'
    /// trees happens per-slot at the call site (spec.md §4.C); here we
    /// only drive the IPC node state machine and scheduling effects.
    ///
    /// Helping ("donate CPU share to callee", spec.md glossary): a
    /// helping send leaves the caller's share *ready*, exactly as
    /// `Cpu_job::_activate_own_share`/`helping_sink()` do in
    /// `thread.cc` — the share keeps competing in the scheduler's claim/
    /// fill bands under its own priority and quota, but the thread that
    /// actually gets to run when that share is chosen as head is
    /// resolved transitively through the send chain by
    /// [`Kernel::execution_owner`], not the blocked caller itself. A
    /// non-helping send unreadies the caller outright: it truly stops
    /// competing for CPU time while it waits.
    pub fn send_request_msg(&mut self, caller: ThreadId, dest: ThreadId, helping: bool) -> Outcome {
        if !self.threads.contains(caller) || !self.threads.contains(dest) {
            return Outcome::InvalidArg;
        }
        let dest_awaiting = self.threads.get(dest).unwrap().ipc().role() == Role::AwaitsRequest;
        if dest_awaiting {
            self.threads.get_mut(dest).unwrap().ipc_mut().enter_prepare_reply(caller);
            self.threads.get_mut(dest).unwrap().wake();
            self.ready_thread(dest);
        } else {
            self.threads.get_mut(dest).unwrap().ipc_mut().enqueue_caller(caller);
        }
        self.threads.get_mut(caller).unwrap().ipc_mut().enter_send(dest, helping);
        self.threads.get_mut(caller).unwrap().enter_awaits_ipc(None);
        self.threads.get_mut(caller).unwrap().ipc_mut().enter_awaits_reply();
        if !helping {
            self.unready_thread(caller);
        }
        Outcome::Ok
    }

    /// Resolve the thread whose code actually runs when `thread`'s share
    /// is chosen as head, by following the helping chain
    /// (`Role::SendHelping`'s `callee()` edge) to the thread currently
    /// doing the work, exactly as `Thread::helping_sink()` chases
    /// `Ipc_node::helping_sink()` in the original. A non-helping sender
    /// or a thread not sending at all resolves to itself. Guarded
    /// against a corrupt cycle by bounding the walk to the thread count.
    pub fn execution_owner(&self, thread: ThreadId) -> ThreadId {
        let mut current = thread;
        let mut steps = 0;
        let bound = self.threads.len();
        while let Some(t) = self.threads.get(current) {
            if !t.ipc().is_helping() {
                break;
            }
            let Some(next) = t.ipc().callee() else { break };
            current = next;
            steps += 1;
            if steps > bound {
                break;
            }
        }
        current
    }

    /// The thread that would actually run on `cpu` right now: the head
    /// share's owning thread, resolved through [`Kernel::execution_owner`]
    /// when that thread is mid-helping-send.
    pub fn execution_owner_on_cpu(&self, cpu: usize) -> Owner {
        match self.cpus.cpu(cpu).head_owner() {
            Owner::Thread(t) => Owner::Thread(self.execution_owner(t)),
            other => other,
        }
    }

    /// `await_request_msg`: block until a caller arrives, or accept one
    /// already queued.
    pub fn await_request_msg(&mut self, callee: ThreadId) -> Outcome {
        let Some(t) = self.threads.get_mut(callee) else {
            return Outcome::InvalidArg;
        };
        if let Some(caller) = t.ipc_mut().dequeue_caller() {
            t.ipc_mut().enter_prepare_reply(caller);
            Outcome::Ok
        } else {
            t.ipc_mut().enter_awaits_request();
            t.enter_awaits_ipc(None);
            self.unready_thread(callee);
            Outcome::Ok
        }
    }

    /// `send_reply_msg`: wake the original caller, return both nodes to
    /// `Inactive`. `ready_thread` is idempotent, so a helping caller
    /// (whose share was never unreadied — see `send_request_msg`) and a
    /// non-helping one (whose share was) both come out ready here
    /// without a special case.
    pub fn send_reply_msg(&mut self, callee: ThreadId) -> Outcome {
        let Some(caller) = self.threads.get(callee).and_then(|t| t.ipc().callee()) else {
            return Outcome::InvalidArg;
        };
        self.threads.get_mut(callee).unwrap().ipc_mut().enter_inactive();
        self.threads.get_mut(caller).unwrap().ipc_mut().enter_inactive();
        self.threads.get_mut(caller).unwrap().wake();
        self.ready_thread(caller);
        Outcome::Ok
    }

    // ---- Signals (component G) ----

    pub fn new_signal_receiver(&mut self) -> SignalReceiverId {
        self.signals.new_receiver()
    }

    pub fn new_signal_context(&mut self, receiver: SignalReceiverId, imprint: u32) -> Outcome {
        match self.signals.new_context(receiver, imprint) {
            Ok(_) => Outcome::Ok,
            Err(_) => Outcome::InvalidArg,
        }
    }

    /// `await_signal`: respects a single-shot `cancel_next_await_signal`
    /// armed earlier.
    pub fn await_signal(&mut self, thread: ThreadId, receiver: SignalReceiverId) -> Outcome {
        let Some(t) = self.threads.get_mut(thread) else {
            return Outcome::InvalidArg;
        };
        if t.take_cancel_next_await_signal() {
            return Outcome::Cancelled;
        }
        match self.signals.add_handler(receiver, thread) {
            Ok(Some(_delivery)) => Outcome::Ok,
            Ok(None) => {
                self.threads.get_mut(thread).unwrap().enter_awaits_signal(receiver, None);
                self.unready_thread(thread);
                Outcome::Ok
            }
            Err(_) => Outcome::InvalidArg,
        }
    }

    /// `pending_signal`: poll for a deliverable signal without blocking.
    /// Unlike `await_signal`, a receiver with nothing queued never
    /// registers `thread` as a handler — the caller is expected to retry
    /// later rather than be woken asynchronously.
    pub fn pending_signal(&mut self, thread: ThreadId, receiver: SignalReceiverId) -> Outcome {
        if !self.threads.contains(thread) {
            return Outcome::InvalidArg;
        }
        match self.signals.poll_pending(receiver) {
            Ok(Some(_delivery)) => Outcome::Ok,
            Ok(None) => Outcome::Retry,
            Err(_) => Outcome::InvalidArg,
        }
    }

    pub fn cancel_next_await_signal(&mut self, thread: ThreadId) -> Outcome {
        match self.threads.get_mut(thread) {
            Some(t) => {
                t.arm_cancel_next_await_signal();
                Outcome::Ok
            }
            None => Outcome::InvalidArg,
        }
    }

    pub fn submit_signal(&mut self, ctx: SignalContextId, n: u32) -> Outcome {
        match self.signals.submit(ctx, n) {
            Ok(Some((handler, _delivery))) => {
                self.threads.get_mut(handler).unwrap().wake();
                self.ready_thread(handler);
                Outcome::Ok
            }
            Ok(None) => Outcome::Ok,
            Err(_) => Outcome::InvalidArg,
        }
    }

    pub fn ack_signal(&mut self, ctx: SignalContextId) -> Outcome {
        match self.signals.ack(ctx) {
            Ok(AckOutcome::Delivered(handler, _)) => {
                self.threads.get_mut(handler).unwrap().wake();
                self.ready_thread(handler);
                Outcome::Ok
            }
            Ok(AckOutcome::KillReady(killer)) => {
                self.threads.get_mut(killer).unwrap().wake();
                self.ready_thread(killer);
                self.signals.destroy_context(ctx);
                Outcome::Ok
            }
            Ok(AckOutcome::None) => Outcome::Ok,
            Err(_) => Outcome::InvalidArg,
        }
    }

    /// `kill_signal_context`.
    pub fn kill_signal_context(&mut self, caller: ThreadId, ctx: SignalContextId) -> Outcome {
        match self.signals.kill(ctx, caller) {
            Ok(KillOutcome::Immediate) => {
                self.signals.destroy_context(ctx);
                Outcome::Ok
            }
            Ok(KillOutcome::Pending) => {
                self.threads.get_mut(caller).unwrap().enter_awaits_signal_context_kill(ctx);
                self.unready_thread(caller);
                Outcome::Ok
            }
            Ok(KillOutcome::AlreadyPending) => Outcome::Retry,
            Err(_) => Outcome::InvalidArg,
        }
    }

    // ---- User IRQs (component H) ----

    pub fn new_irq(&mut self, number: u32, mode: TriggerMode, context: SignalContextId) -> IrqId {
        self.irqs.insert(UserIrq::new(number, mode, context))
    }

    pub fn ack_irq(&mut self, irq: IrqId) -> Outcome {
        match self.irqs.get_mut(irq) {
            Some(i) => {
                i.enable();
                Outcome::Ok
            }
            None => Outcome::InvalidArg,
        }
    }

    /// `delete_irq`: releases the interrupt and its slot in the arena.
    /// The signal context it was wired to is untouched — it's owned by
    /// the receiver, not the IRQ (spec.md §4.E).
    pub fn delete_irq(&mut self, irq: IrqId) -> Outcome {
        match self.irqs.remove(irq) {
            Some(_) => Outcome::Ok,
            None => Outcome::InvalidArg,
        }
    }

    /// The interrupt controller observed `irq` fire: mask it and submit
    /// its signal context exactly once per fire, per spec.md §3's
    /// "stays masked while a delivery is pending" invariant.
    pub fn fire_irq(&mut self, irq: IrqId) -> Outcome {
        let ctx = match self.irqs.get_mut(irq) {
            Some(i) if i.is_enabled() => {
                i.mask_on_fire();
                i.context()
            }
            Some(_) => return Outcome::Ok,
            None => return Outcome::InvalidArg,
        };
        self.submit_signal(ctx, 1)
    }

    // ---- Capabilities (component C) ----

    pub fn new_obj(&mut self, pd: PdId, object: ObjectRef) -> Result<CapId, OutOfMemory> {
        self.pds.get_mut(pd).ok_or(OutOfMemory)?.cap_tree_mut().insert_new(object)
    }

    pub fn delete_obj(&mut self, pd: PdId, capid: CapId) -> Outcome {
        match self.pds.get_mut(pd) {
            Some(p) => {
                p.cap_tree_mut().remove(capid);
                Outcome::Ok
            }
            None => Outcome::InvalidArg,
        }
    }

    pub fn ack_cap(&mut self, pd: PdId, capid: CapId) -> Outcome {
        match self.pds.get_mut(pd) {
            Some(p) => {
                p.cap_tree_mut().clear_in_utcb(capid);
                Outcome::Ok
            }
            None => Outcome::InvalidArg,
        }
    }

    pub fn delete_cap(&mut self, pd: PdId, capid: CapId) -> Outcome {
        match self.pds.get_mut(pd) {
            Some(p) => {
                p.cap_tree_mut().delete_if_not_in_utcb(capid);
                Outcome::Ok
            }
            None => Outcome::InvalidArg,
        }
    }

    /// Translate one capability slot from `sender`'s PD to `receiver`'s
    /// PD, as performed for each slot during an IPC message copy
    /// (spec.md §4.C).
    pub fn translate_capability(
        &mut self,
        sender_pd: PdId,
        receiver_pd: PdId,
        sender_capid: CapId,
    ) -> crate::kernel::object::Translation {
        if sender_pd == receiver_pd {
            return crate::kernel::object::Translation::Invalid;
        }
        let Some(sender) = self.pds.get(sender_pd) else {
            return crate::kernel::object::Translation::Invalid;
        };
        let sender_tree: *const CapabilityTree = sender.cap_tree();
        let Some(receiver) = self.pds.get_mut(receiver_pd) else {
            return crate::kernel::object::Translation::Invalid;
        };
        // SAFETY: sender_pd != receiver_pd was just checked, so this
        // borrows two distinct arena slots; the raw pointer outlives
        // only this call and is never stored.
        let sender_tree = unsafe { &*sender_tree };
        crate::kernel::object::translate_capability(sender_tree, receiver.cap_tree_mut(), sender_capid)
    }

    /// `invalidate_tlb`: a local-only flush of one address range for
    /// `pd`, distinct from `update_pd`'s full cross-CPU shoot-down — no
    /// IPI, no blocking, just the calling CPU's own TLB (spec.md §4.E
    /// groups it with the object/capability plumbing calls rather than
    /// the PD ones for this reason).
    pub fn invalidate_tlb(&mut self, pd: PdId, addr: u64, size: u64, backend: &dyn Backend) -> Outcome {
        match self.pds.get(pd) {
            Some(p) => {
                backend.flush_tlb_pid(p.asid(), addr, size);
                Outcome::Ok
            }
            None => Outcome::InvalidArg,
        }
    }

    // ---- Debug ----

    /// `print_char`: one character straight to the platform UART,
    /// bypassing any thread/PD permission check (spec.md §4.E). The
    /// UART driver is hardware-only (see `lib.rs`'s module doc) and
    /// absent from the host test build, so this is a no-op there.
    #[cfg(not(any(test, feature = "test-utils")))]
    pub fn print_char(&self, c: u8) -> Outcome {
        unsafe {
            crate::uart::write_byte(c);
        }
        Outcome::Ok
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn print_char(&self, _c: u8) -> Outcome {
        Outcome::Ok
    }

    // ---- Protection domains / cross-CPU work (components D, H) ----

    /// `update_pd`: flush the TLB for `pd`'s address space on every CPU
    /// currently scheduling one of its threads before returning to
    /// `caller`.
    pub fn update_pd(&mut self, pd: PdId, caller: ThreadId, backend: &dyn Backend) -> Outcome {
        let Some(p) = self.pds.get(pd) else {
            return Outcome::InvalidArg;
        };
        let asid = p.asid();
        let mut targets = CpuSet::empty();
        for cpu in p.scheduled_on().iter() {
            targets.insert(cpu);
        }
        if targets.iter().next().is_none() {
            return Outcome::Ok;
        }
        let (_id, needs_ipi) = self.cross_cpu.submit(WorkKind::FlushTlb { asid }, caller, targets);
        for cpu in needs_ipi {
            backend.trigger_ipi(cpu);
        }
        self.threads.get_mut(caller).unwrap().enter_awaits_restart();
        self.unready_thread(caller);
        Outcome::Ok
    }

    /// The IPI handler on `cpu`: drain and execute every queued
    /// cross-CPU work item, waking callers whose work is now fully
    /// acknowledged.
    pub fn handle_ipi(&mut self, cpu: usize, backend: &dyn Backend) {
        let drained = self.cross_cpu.drain(cpu);
        let mut woken: Vec<ThreadId> = Vec::new();
        for (id, kind) in drained {
            match kind {
                WorkKind::FlushTlb { asid } => backend.flush_tlb_pid(asid, 0, u64::MAX),
                WorkKind::DestroyThread { thread } => self.teardown_thread(thread),
            }
            if let Some(caller) = self.cross_cpu.complete(id, cpu) {
                woken.push(caller);
            }
        }
        for caller in woken {
            if let Some(t) = self.threads.get_mut(caller) {
                t.restart();
            }
            self.ready_thread(caller);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::mock::MockBackend;

    /// After `restart_thread`, `t` is once again the running head of
    /// its CPU, so `delete_thread` must take the cross-CPU path: it
    /// queues the teardown as work on that CPU and parks `caller` rather
    /// than freeing the share out from under the scheduler's own head.
    #[test]
    fn new_pd_and_thread_lifecycle() {
        crate::arch::mock::reset();
        let backend = MockBackend;
        let mut k = Kernel::new(1, 1000, 100);
        let pd = k.new_pd(0x2000, false);
        let t = k.new_thread(pd, 0, 2, 200);
        assert_eq!(k.start_thread(t), Outcome::Ok);
        assert_eq!(k.cpus().cpu(0).head_owner(), crate::kernel::scheduler::Owner::Thread(t));
        assert_eq!(k.stop_thread(t), Outcome::Ok);
        assert_eq!(k.restart_thread(t), Outcome::Ok);

        let caller = k.new_thread(pd, 0, 2, 0);
        assert_eq!(k.start_thread(caller), Outcome::Ok);

        assert_eq!(k.delete_thread(t, caller, &backend), Outcome::Ok);
        assert_eq!(crate::arch::mock::ipi_count(), 1);
        assert_eq!(k.thread(caller).unwrap().state(), crate::kernel::thread::State::AwaitsRestart);

        k.handle_ipi(0, &backend);
        assert!(k.thread(t).is_none());
        assert_eq!(k.thread(caller).unwrap().state(), crate::kernel::thread::State::Active);
    }

    #[test]
    fn request_reply_round_trip_wakes_caller() {
        let mut k = Kernel::new(1, 1000, 100);
        let pd = k.new_pd(0x3000, false);
        let caller = k.new_thread(pd, 0, 2, 0);
        let callee = k.new_thread(pd, 0, 2, 0);
        k.start_thread(caller);
        k.start_thread(callee);

        assert_eq!(k.await_request_msg(callee), Outcome::Ok);
        assert_eq!(k.send_request_msg(caller, callee, true), Outcome::Ok);
        assert_eq!(
            k.thread(callee).unwrap().ipc().role(),
            crate::kernel::ipc::Role::PrepareReply
        );
        assert_eq!(k.send_reply_msg(callee), Outcome::Ok);
        assert_eq!(k.thread(caller).unwrap().state(), crate::kernel::thread::State::Active);
    }

    #[test]
    fn tlb_shootdown_via_update_pd_reaches_scheduled_cpus() {
        crate::arch::mock::reset();
        let backend = MockBackend;
        let mut k = Kernel::new(2, 1000, 100);
        let pd = k.new_pd(0x4000, false);
        let t0 = k.new_thread(pd, 0, 2, 100);
        let t1 = k.new_thread(pd, 1, 2, 100);
        k.start_thread(t0);
        k.start_thread(t1);

        let caller = k.new_thread(pd, 0, 2, 0);
        k.start_thread(caller);
        assert_eq!(k.update_pd(pd, caller, &backend), Outcome::Ok);
        assert_eq!(crate::arch::mock::ipi_count(), 2);

        k.handle_ipi(0, &backend);
        k.handle_ipi(1, &backend);
        assert_eq!(crate::arch::mock::tlb_flush_count(), 2);
        assert_eq!(k.thread(caller).unwrap().state(), crate::kernel::thread::State::Active);
    }

    /// spec.md §8 invariant 11 / scenario S4's three-hop generalization:
    /// T1 sends-with-help to T2 which sends-with-help to T3; only T3 has
    /// quota this round, so T3's own claim is the only thing competing
    /// in the claim bands and it ends up head, in place of T1.
    #[test]
    fn helping_transitivity_schedules_the_chains_end() {
        let mut k = Kernel::new(1, 1000, 100);
        let pd = k.new_pd(0x6000, false);
        let t1 = k.new_thread(pd, 0, 1, 0);
        let t2 = k.new_thread(pd, 0, 2, 0);
        let t3 = k.new_thread(pd, 0, 3, 100);
        k.start_thread(t1);
        k.start_thread(t2);
        k.start_thread(t3);

        assert_eq!(k.await_request_msg(t3), Outcome::Ok);
        assert_eq!(k.await_request_msg(t2), Outcome::Ok);
        assert_eq!(k.send_request_msg(t1, t2, true), Outcome::Ok);
        assert_eq!(k.send_request_msg(t2, t3, true), Outcome::Ok);

        assert_eq!(k.cpus().cpu(0).head_owner(), crate::kernel::scheduler::Owner::Thread(t3));
        assert_eq!(k.execution_owner(t1), t3);
        assert_eq!(k.execution_owner(t2), t3);
        assert_eq!(k.execution_owner(t3), t3);
    }

    /// A helping send's donation outlives the momentary `SendHelping`
    /// role: the client's higher-priority claim keeps winning the
    /// scheduler's claim pass while it's blocked in `AwaitsReply`, but
    /// the thread that actually executes resolves through the chain to
    /// the server doing the work. Covers the glossary's "Helping"
    /// definition directly (priority inheritance via donation, not just
    /// the zero-quota degenerate case in the test above).
    #[test]
    fn helping_donation_outlives_send_and_resolves_to_server() {
        let mut k = Kernel::new(1, 1000, 100);
        let pd = k.new_pd(0x6100, false);
        let client = k.new_thread(pd, 0, 3, 300);
        let server = k.new_thread(pd, 0, 1, 50);
        k.start_thread(client);
        k.start_thread(server);

        assert_eq!(k.await_request_msg(server), Outcome::Ok);
        assert_eq!(k.send_request_msg(client, server, true), Outcome::Ok);

        // Client's higher-priority claim still wins the raw scheduler
        // pick while it's blocked...
        assert_eq!(k.cpus().cpu(0).head_owner(), crate::kernel::scheduler::Owner::Thread(client));
        assert_eq!(k.thread(client).unwrap().state(), crate::kernel::thread::State::AwaitsIpc);
        // ...but the code that actually runs is the server's.
        assert_eq!(k.execution_owner_on_cpu(0), crate::kernel::scheduler::Owner::Thread(server));

        assert_eq!(k.send_reply_msg(server), Outcome::Ok);
        assert_eq!(k.thread(client).unwrap().state(), crate::kernel::thread::State::Active);
        assert_eq!(k.execution_owner_on_cpu(0), crate::kernel::scheduler::Owner::Thread(client));
    }

    #[test]
    fn delete_pd_requires_no_referencing_threads() {
        crate::arch::mock::reset();
        let backend = MockBackend;
        let mut k = Kernel::new(1, 1000, 100);
        let pd = k.new_pd(0x7000, false);
        let t = k.new_thread(pd, 0, 1, 0);
        let core_pd = k.core_pd();
        let caller = k.new_thread(core_pd, 0, 1, 0);
        assert_eq!(k.delete_pd(pd), Outcome::InvalidArg);
        // `t` was never started, so it's not any CPU's head: the
        // teardown runs immediately, without queuing cross-CPU work.
        assert_eq!(k.delete_thread(t, caller, &backend), Outcome::Ok);
        assert_eq!(crate::arch::mock::ipi_count(), 0);
        assert_eq!(k.delete_pd(pd), Outcome::Ok);
        assert!(!k.pds.contains(pd));
    }

    #[test]
    fn delete_pd_rejects_the_core_pd() {
        let mut k = Kernel::new(1, 1000, 100);
        assert_eq!(k.delete_pd(k.core_pd()), Outcome::InvalidArg);
    }

    #[test]
    fn set_pager_and_get_thread_id_round_trip() {
        let mut k = Kernel::new(1, 1000, 100);
        let pd = k.new_pd(0x7100, false);
        let pager = k.new_thread(pd, 0, 1, 0);
        let faulter = k.new_thread(pd, 0, 1, 0);
        assert_eq!(k.set_pager(faulter, Some(pager)), Outcome::Ok);
        assert_eq!(k.thread(faulter).unwrap().pager(), Some(pager));

        assert_eq!(k.get_thread_id(pd, faulter), None);
        let capid = k.new_obj(pd, ObjectRef::Thread(faulter)).unwrap();
        assert_eq!(k.get_thread_id(pd, faulter), Some(capid));
    }

    #[test]
    fn thread_quota_and_yield_reach_the_scheduler() {
        let mut k = Kernel::new(1, 1000, 100);
        let pd = k.new_pd(0x7200, false);
        let t = k.new_thread(pd, 0, 2, 200);
        k.start_thread(t);
        let share = k.thread(t).unwrap().share();

        assert_eq!(k.thread_quota(t, 50), Outcome::Ok);
        assert_eq!(k.cpus().cpu(0).scheduler().get(share).quota(), 50);

        assert_eq!(k.yield_thread(t), Outcome::Ok);
        // yielding fully retires the claim for this round.
        assert_eq!(k.cpus().cpu(0).scheduler().get(share).claim(), 0);
    }

    #[test]
    fn read_write_thread_state_round_trips() {
        let mut k = Kernel::new(1, 1000, 100);
        let pd = k.new_pd(0x7300, false);
        let t = k.new_thread(pd, 0, 1, 0);
        let mut words = k.read_thread_state(t).unwrap();
        assert_eq!(words, [0u64; crate::kernel::thread::THREAD_STATE_WORDS]);
        words[1] = 42;
        assert_eq!(k.write_thread_state(t, words), Outcome::Ok);
        assert_eq!(k.read_thread_state(t).unwrap()[1], 42);
    }

    #[test]
    fn pending_signal_polls_without_blocking() {
        let mut k = Kernel::new(1, 1000, 100);
        let pd = k.new_pd(0x7400, false);
        let t = k.new_thread(pd, 0, 1, 0);
        k.start_thread(t);
        let r = k.new_signal_receiver();
        let ctx = k.signals.new_context(r, 0x55).unwrap();

        assert_eq!(k.pending_signal(t, r), Outcome::Retry);
        assert_eq!(k.submit_signal(ctx, 1), Outcome::Ok);
        assert_eq!(k.pending_signal(t, r), Outcome::Ok);
        assert_eq!(k.pending_signal(t, r), Outcome::Retry);
    }

    #[test]
    fn set_timeout_fires_through_check_timeouts() {
        crate::arch::mock::reset();
        let backend = MockBackend;
        let mut k = Kernel::new(1, 1000, 100);
        let pd = k.new_pd(0x7500, false);
        let t = k.new_thread(pd, 0, 1, 0);
        k.start_thread(t);
        let r = k.new_signal_receiver();
        let ctx = k.signals.new_context(r, 0x99).unwrap();
        let handler = k.new_thread(pd, 0, 1, 0);
        k.start_thread(handler);
        assert_eq!(k.await_signal(handler, r), Outcome::Ok);

        assert_eq!(k.set_timeout(t, ctx, 10, &backend), Outcome::Ok);
        assert_eq!(k.timeout_max_us(), u64::MAX);
        // before the deadline, nothing fires.
        k.check_timeouts(&backend);
        assert_eq!(k.thread(t).unwrap().state(), crate::kernel::thread::State::Active);
        assert!(k.thread(handler).unwrap().state() != crate::kernel::thread::State::Active);

        crate::arch::mock::advance_time_us(10);
        k.check_timeouts(&backend);
        assert_eq!(k.thread(handler).unwrap().state(), crate::kernel::thread::State::Active);
        assert!(k.thread(t).unwrap().timeout().is_none());
    }

    #[test]
    fn invalidate_tlb_is_local_only_no_ipi() {
        crate::arch::mock::reset();
        let backend = MockBackend;
        let mut k = Kernel::new(2, 1000, 100);
        let pd = k.new_pd(0x7600, false);
        assert_eq!(k.invalidate_tlb(pd, 0, 4096, &backend), Outcome::Ok);
        assert_eq!(crate::arch::mock::tlb_flush_count(), 1);
        assert_eq!(crate::arch::mock::ipi_count(), 0);
    }

    #[test]
    fn irq_fire_submits_signal_and_masks_until_ack() {
        let mut k = Kernel::new(1, 1000, 100);
        let pd = k.new_pd(0x5000, false);
        let handler = k.new_thread(pd, 0, 2, 0);
        k.start_thread(handler);

        let receiver = k.new_signal_receiver();
        assert_eq!(k.await_signal(handler, receiver), Outcome::Ok);
        let ctx = k.signals.new_context(receiver, 0xCAFE).unwrap();
        let irq = k.new_irq(3, TriggerMode::EdgeRising, ctx);

        assert_eq!(k.fire_irq(irq), Outcome::Ok);
        assert!(!k.irqs.get(irq).unwrap().is_enabled());
        assert_eq!(k.thread(handler).unwrap().state(), crate::kernel::thread::State::Active);

        assert_eq!(k.ack_signal(ctx), Outcome::Ok);
        assert_eq!(k.ack_irq(irq), Outcome::Ok);
        assert!(k.irqs.get(irq).unwrap().is_enabled());
    }

    #[test]
    fn delete_irq_frees_the_slot_and_rejects_reuse() {
        let mut k = Kernel::new(1, 1000, 100);
        let receiver = k.new_signal_receiver();
        let ctx = k.signals.new_context(receiver, 0).unwrap();
        let irq = k.new_irq(5, TriggerMode::LevelHigh, ctx);

        assert_eq!(k.delete_irq(irq), Outcome::Ok);
        assert!(k.irqs.get(irq).is_none());
        assert_eq!(k.delete_irq(irq), Outcome::InvalidArg);
        // the context itself outlives the irq that used to fire it.
        assert_eq!(k.ack_signal(ctx), Outcome::Ok);
    }

    #[test]
    fn print_char_is_a_harmless_no_op_under_test() {
        let k = Kernel::new(1, 1000, 100);
        assert_eq!(k.print_char(b'x'), Outcome::Ok);
    }

    #[test]
    fn reflect_fault_parks_the_faulter_and_wakes_a_blocked_pager() {
        use crate::kernel::thread::{Fault, FaultType};

        let mut k = Kernel::new(1, 1000, 100);
        let pd = k.new_pd(0x6000, false);
        let pager = k.new_thread(pd, 0, 2, 0);
        let faulter = k.new_thread(pd, 0, 2, 0);
        k.start_thread(pager);
        k.start_thread(faulter);
        assert_eq!(k.set_pager(faulter, Some(pager)), Outcome::Ok);

        let receiver = k.new_signal_receiver();
        assert_eq!(k.await_signal(pager, receiver), Outcome::Ok);

        let fault = Fault { ip: 0x1000, addr: 0x2000, fault_type: FaultType::Write };
        assert_eq!(k.reflect_fault(faulter, fault), Outcome::Ok);

        assert_eq!(k.thread(faulter).unwrap().state(), crate::kernel::thread::State::AwaitsRestart);
        assert_eq!(k.thread(pager).unwrap().state(), crate::kernel::thread::State::Active);
    }
}
