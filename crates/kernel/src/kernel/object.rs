//! Component C — kernel objects & capability tree.
//!
//! Grounded on `thread.h`'s `Kernel::Object`/`Core_object` pairing and
//! `thread.cc`'s `ipc_copy_msg`/`_ipc_init` (the capability-translation
//! algorithm run during IPC message copy). See spec.md §4.C.
//!
//! Every kernel object here is identified by an [`ObjectRef`] — a tagged
//! union over the object arenas (`ThreadId`, `PdId`, ...), replacing the
//! original's `Core_object`/`Object_identity` pointer pairing with the
//! arena-handle idiom used throughout this core (spec.md §9 Design
//! Notes). A PD's [`CapabilityTree`] maps PD-local [`CapId`]s to
//! [`CapabilityReference`]s, each naming the [`ObjectRef`] it refers to.

use crate::config::MAX_CAPS_PER_PD;
use alloc::collections::BTreeMap;

use crate::kernel::arena::ArenaId;
use crate::kernel::irq::IrqId;
use crate::kernel::pd::PdId;
use crate::kernel::signal::{SignalContextId, SignalReceiverId};
use crate::kernel::thread::ThreadId;

/// A PD-local capability id. `0` is reserved for "invalid".
pub type CapId = u32;

pub const CAP_ID_INVALID: CapId = 0;

/// Stable kernel-local identity of any object a capability can name.
/// Combines an object kind with that kind's arena handle, so two
/// references to "the same" kernel object compare equal regardless of
/// which PD observed them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObjectRef {
    Thread(ThreadId),
    Pd(PdId),
    SignalReceiver(SignalReceiverId),
    SignalContext(SignalContextId),
    Irq(IrqId),
}

/// One PD's view of an [`ObjectRef`]: its PD-local capid and whether it
/// is currently installed in that PD's UTCB (kept around so the sender
/// can't have its last reference freed out from under an in-flight
/// message — `ack_cap`/`delete_cap` honor this).
#[derive(Debug, Clone, Copy)]
pub struct CapabilityReference {
    object: ObjectRef,
    capid: CapId,
    in_utcb: bool,
}

impl CapabilityReference {
    pub fn object(&self) -> ObjectRef {
        self.object
    }

    pub fn capid(&self) -> CapId {
        self.capid
    }

    pub fn in_utcb(&self) -> bool {
        self.in_utcb
    }
}

/// Error raised when a PD's capability slab can't satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfMemory;

/// Per-PD capability table: PD-local capid -> object-identity reference,
/// plus the reverse index ("does this PD already reference object X,
/// and under what capid") the translation algorithm needs to make
/// repeated sends of the same capability idempotent (spec.md §8
/// invariant 7).
pub struct CapabilityTree {
    by_capid: BTreeMap<CapId, CapabilityReference>,
    by_object: BTreeMap<ObjectRef, CapId>,
    next_capid: CapId,
    /// Core's capability tree trusts identities directly: inserting a
    /// reference into it never counts against the slab budget (spec.md
    /// §4.C: "Copying into the core PD does not allocate a new
    /// reference").
    is_core: bool,
}

impl CapabilityTree {
    pub fn new(is_core: bool) -> Self {
        CapabilityTree {
            by_capid: BTreeMap::new(),
            by_object: BTreeMap::new(),
            next_capid: 1,
            is_core,
        }
    }

    pub fn is_core(&self) -> bool {
        self.is_core
    }

    pub fn len(&self) -> usize {
        self.by_capid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_capid.is_empty()
    }

    /// Exact-match lookup by PD-local capid.
    pub fn find(&self, capid: CapId) -> Option<ObjectRef> {
        if capid == CAP_ID_INVALID {
            return None;
        }
        self.by_capid.get(&capid).map(|r| r.object)
    }

    /// Does this PD already hold a reference to `object`, and under
    /// which capid? Used by capability translation to reuse an
    /// existing reference instead of constructing a second one.
    pub fn find_capid_for(&self, object: ObjectRef) -> Option<CapId> {
        self.by_object.get(&object).copied()
    }

    /// Check there is room for `n` more references without allocating
    /// any — the "pre-allocate receiver slots before the copy" step of
    /// IPC message transfer (spec.md §4.C), so a mid-copy failure never
    /// leaves a partially-translated message.
    pub fn reserve(&self, n: usize) -> Result<(), OutOfMemory> {
        if self.is_core {
            return Ok(());
        }
        if self.by_capid.len() + n > MAX_CAPS_PER_PD {
            return Err(OutOfMemory);
        }
        Ok(())
    }

    /// Construct a fresh reference to `object`, distinct from any
    /// existing one (caller has already checked `find_capid_for`).
    pub fn insert_new(&mut self, object: ObjectRef) -> Result<CapId, OutOfMemory> {
        self.reserve(1)?;
        let capid = self.next_capid;
        self.next_capid += 1;
        self.by_capid.insert(
            capid,
            CapabilityReference {
                object,
                capid,
                in_utcb: false,
            },
        );
        self.by_object.insert(object, capid);
        Ok(capid)
    }

    /// Construct (or reuse) the core PD's reference to `object` without
    /// drawing from `next_capid` — core trusts identities directly, so
    /// its capid is derived straight from the object's own arena
    /// identity rather than minted (spec.md §4.C: "Copying into the
    /// core PD does not allocate a new reference").
    pub fn insert_identity(&mut self, object: ObjectRef) -> CapId {
        if let Some(existing) = self.by_object.get(&object) {
            return *existing;
        }
        let capid = core_identity_capid(object);
        self.by_capid.insert(
            capid,
            CapabilityReference {
                object,
                capid,
                in_utcb: false,
            },
        );
        self.by_object.insert(object, capid);
        capid
    }

    /// Remove the reference under `capid`. Returns the identity it
    /// named, if any (removing the last reference to an identity from
    /// a PD deletes the reference, not necessarily the underlying
    /// object — per spec.md §3).
    pub fn remove(&mut self, capid: CapId) -> Option<ObjectRef> {
        let r = self.by_capid.remove(&capid)?;
        if self.by_object.get(&r.object) == Some(&capid) {
            self.by_object.remove(&r.object);
        }
        Some(r.object)
    }

    /// Delete the reference only if it's not currently installed in the
    /// owning thread's UTCB (`delete_cap` semantics: `if (oir->in_utcb())
    /// return;`).
    pub fn delete_if_not_in_utcb(&mut self, capid: CapId) {
        if let Some(r) = self.by_capid.get(&capid) {
            if r.in_utcb {
                return;
            }
        }
        self.remove(capid);
    }

    pub fn mark_in_utcb(&mut self, capid: CapId) {
        if let Some(r) = self.by_capid.get_mut(&capid) {
            r.in_utcb = true;
        }
    }

    /// `ack_cap`: the reference is no longer pinned by a UTCB slot.
    pub fn clear_in_utcb(&mut self, capid: CapId) {
        if let Some(r) = self.by_capid.get_mut(&capid) {
            r.in_utcb = false;
        }
    }

    /// Every reference currently invalidated by the destruction of
    /// `object` — used to drop a PD's references once the object dies.
    pub fn invalidate_object(&mut self, object: ObjectRef) {
        if let Some(capid) = self.by_object.remove(&object) {
            self.by_capid.remove(&capid);
        }
    }
}

/// Derive a capid straight from an object's own arena identity, tagging
/// the top 3 bits with its kind so distinct kinds never collide at the
/// same index. Used only for the core PD, which has no slab budget to
/// allocate against.
fn core_identity_capid(object: ObjectRef) -> CapId {
    let (kind, index): (u32, u32) = match object {
        ObjectRef::Thread(id) => (0, id.index()),
        ObjectRef::Pd(id) => (1, id.index()),
        ObjectRef::SignalReceiver(id) => (2, id.index()),
        ObjectRef::SignalContext(id) => (3, id.index()),
        ObjectRef::Irq(id) => (4, id.index()),
    };
    (kind << 29) | (index & 0x1FFF_FFFF)
}

/// Outcome of translating one capability slot during IPC / signal
/// message copy (spec.md §4.C, "IPC capability translation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    /// Sender slot was empty/invalid; receiver gets `cap_id_invalid()`.
    Invalid,
    /// Receiver already had a reference to the same identity; reused.
    Reused(CapId),
    /// A new reference was constructed in the receiver's PD.
    Created(CapId),
    /// The receiver's capability slab had no room.
    OutOfSlots,
}

/// Translate one capability slot from `sender_tree` into
/// `receiver_tree`. Mirrors `Thread::ipc_copy_msg`'s per-slot loop:
/// unknown sender capid -> `Invalid`; known identity already present in
/// the receiver -> `Reused`; otherwise construct a new reference unless
/// the receiver is core (core trusts identities directly and never
/// allocates here).
pub fn translate_capability(
    sender_tree: &CapabilityTree,
    receiver_tree: &mut CapabilityTree,
    sender_capid: CapId,
) -> Translation {
    let Some(object) = sender_tree.find(sender_capid) else {
        return Translation::Invalid;
    };
    if let Some(existing) = receiver_tree.find_capid_for(object) {
        return Translation::Reused(existing);
    }
    if receiver_tree.is_core() {
        return Translation::Created(receiver_tree.insert_identity(object));
    }
    match receiver_tree.insert_new(object) {
        Ok(capid) => Translation::Created(capid),
        Err(OutOfMemory) => Translation::OutOfSlots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::thread::ThreadId;

    fn thread_ref(n: u32) -> ObjectRef {
        ObjectRef::Thread(ThreadId::for_test(n))
    }

    #[test]
    fn translation_idempotent_on_repeat_send() {
        let mut sender = CapabilityTree::new(false);
        let mut receiver = CapabilityTree::new(false);
        let object = thread_ref(7);
        let sender_capid = sender.insert_new(object).unwrap();

        let first = translate_capability(&sender, &mut receiver, sender_capid);
        let Translation::Created(cap1) = first else {
            panic!("expected a freshly created reference, got {first:?}");
        };

        let second = translate_capability(&sender, &mut receiver, sender_capid);
        assert_eq!(second, Translation::Reused(cap1));
    }

    #[test]
    fn unknown_capid_is_invalid() {
        let sender = CapabilityTree::new(false);
        let mut receiver = CapabilityTree::new(false);
        let outcome = translate_capability(&sender, &mut receiver, 42);
        assert_eq!(outcome, Translation::Invalid);
    }

    #[test]
    fn out_of_slots_reported_distinctly() {
        let mut sender = CapabilityTree::new(false);
        let mut receiver = CapabilityTree::new(false);
        for i in 0..MAX_CAPS_PER_PD {
            receiver.insert_new(thread_ref(1000 + i as u32)).unwrap();
        }
        let object = thread_ref(7);
        let sender_capid = sender.insert_new(object).unwrap();
        let outcome = translate_capability(&sender, &mut receiver, sender_capid);
        assert_eq!(outcome, Translation::OutOfSlots);
    }

    #[test]
    fn core_tree_never_runs_out_of_room() {
        let mut receiver = CapabilityTree::new(true);
        for i in 0..(MAX_CAPS_PER_PD + 10) {
            receiver.insert_new(thread_ref(i as u32)).unwrap();
        }
    }

    #[test]
    fn translating_into_core_does_not_mint_a_new_capid() {
        let mut sender = CapabilityTree::new(false);
        let mut receiver = CapabilityTree::new(true);
        let object = thread_ref(7);
        let sender_capid = sender.insert_new(object).unwrap();

        let first = translate_capability(&sender, &mut receiver, sender_capid);
        let Translation::Created(capid) = first else {
            panic!("expected a core identity reference, got {first:?}");
        };
        // Deterministic from the object's own identity, not a counter:
        // re-deriving it on a fresh core tree yields the same value.
        let mut other_core = CapabilityTree::new(true);
        assert_eq!(other_core.insert_identity(object), capid);

        let second = translate_capability(&sender, &mut receiver, sender_capid);
        assert_eq!(second, Translation::Reused(capid));
    }
}
