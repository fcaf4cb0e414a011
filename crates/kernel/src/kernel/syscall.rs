//! External syscall surface: stable call-id encoding. See spec.md §6
//! "External interfaces".
//!
//! Discriminants follow the ordering of `thread.h`'s private `_call_*`
//! method list rather than the older `syscalls.h` numbering, which
//! predates several of the calls spec.md names (`thread_quota`,
//! `update_data_region`, `new_obj`/`delete_obj`, `ack_cap`/`delete_cap`).
//! The VM-session calls are carried for discriminant-ordering fidelity
//! with the source but are not implemented — VM is an external
//! collaborator out of this core's scope (spec.md §1 Non-goals). Each
//! architecture's trap entry decodes the raw call word into a `CallId`
//! and dispatches to the matching [`crate::kernel::Kernel`] method
//! directly (`NewThread` → `Kernel::new_thread`, `SendRequestMsg` →
//! `Kernel::send_request_msg`, ...); `NewVm`/`DeleteVm`/`RunVm`/`PauseVm`
//! dispatch to `Outcome::InvalidArg` since there is no VM-session method
//! to call. `Pager` is `_call_pager()`/`set_pager` — it sits next to the
//! VM-session group in `thread.h`'s own ordering (a VM needs a pager
//! thread registered too) but is implemented here: it names
//! `Kernel::set_pager`, a thread operation, not a VM one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CallId {
    NewThread = 0,
    NewCoreThread,
    ThreadQuota,
    GetThreadId,
    ReadThreadState,
    WriteThreadState,
    StartThread,
    StopThread,
    PauseThread,
    ResumeThread,
    CancelThreadBlocking,
    RestartThread,
    YieldThread,
    DeleteThread,
    AwaitRequestMsg,
    SendRequestMsg,
    SendReplyMsg,
    NewPd,
    UpdatePd,
    DeletePd,
    UpdateDataRegion,
    UpdateInstrRegion,
    PrintChar,
    AwaitSignal,
    PendingSignal,
    CancelNextAwaitSignal,
    SubmitSignal,
    AckSignal,
    KillSignalContext,
    NewVm,
    DeleteVm,
    RunVm,
    PauseVm,
    Pager,
    NewIrq,
    DeleteIrq,
    AckIrq,
    NewObj,
    DeleteObj,
    AckCap,
    DeleteCap,
    InvalidateTlb,
    SetTimeout,
    TimeoutMaxUs,
    Time,
}
