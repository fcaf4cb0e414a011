//! Syscall-result error shape. See spec.md §7 "Error handling design".
//!
//! Distinct from [`crate::lib::error::Errno`], which is the POSIX-flavored
//! type used by the ambient host-side test-reporting stack; `Outcome` is
//! the kernel-internal result of a single `_call_*` handler, encoded to
//! the single machine word the original returns in `arg0`. Grounded on
//! teacher `lib/error.rs`'s `Errno::as_isize`/`from_negated_i32` pattern.

/// Result of a syscall that returns to its caller (everything except
/// the `fatal` kind, which never returns — see [`crate::kernel::Kernel::die`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    /// The call can't make progress right now but isn't wrong; retry it
    /// (e.g. `send_request_msg` against a destination with a full
    /// capability slab after translation already partially began).
    Retry,
    InvalidArg,
    OutOfMemory,
    /// The blocking operation this call was parked in was cancelled out
    /// from under it (`cancel_thread_blocking`/`stop`).
    Cancelled,
    /// The object this call targeted is gone.
    Dead,
}

impl Outcome {
    /// Encode to the machine word the original returns in `arg0`: `0`
    /// for `Ok`, small negative integers otherwise.
    pub fn to_raw(self) -> isize {
        match self {
            Outcome::Ok => 0,
            Outcome::Retry => -1,
            Outcome::InvalidArg => -2,
            Outcome::OutOfMemory => -3,
            Outcome::Cancelled => -4,
            Outcome::Dead => -5,
        }
    }
}
