#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_arch = "x86_64", feature(abi_x86_interrupt))]
#![cfg_attr(feature = "strict", deny(warnings))]
#![cfg_attr(feature = "strict", deny(unsafe_op_in_unsafe_fn))]

//! Hardware kernel core: CPU scheduling, capability-addressed kernel
//! objects, synchronous IPC, asynchronous signals and cross-CPU work.
//!
//! The bare-metal binary (`main.rs`) is the real entry point; this lib
//! target exists so `kernel::*` can be exercised by `cargo test` on the
//! host, and by `crates/testing`'s property-based suite under the
//! `test-utils` feature, where `std` backs the harness and `arch::mock`
//! stands in for the hardware collaborator. Everything under `kernel/`
//! is written against `core`/`alloc` only, so it is identical in both
//! builds; the hardware-facing ambient modules (`uart`, `heap`,
//! boot-time `log` prints, interrupt vectors) touch real I/O ports and
//! install a `#[global_allocator]`, so they are excluded from both the
//! host test build and any other out-of-tree consumer of this lib.

extern crate alloc;

pub mod config;
pub mod arch;
pub mod kernel;

#[cfg(not(any(test, feature = "test-utils")))]
#[allow(special_module_name)]
pub mod lib;
#[cfg(not(any(test, feature = "test-utils")))]
pub mod log;
#[cfg(not(any(test, feature = "test-utils")))]
pub mod uart;
#[cfg(not(any(test, feature = "test-utils")))]
pub mod heap;
#[cfg(not(any(test, feature = "test-utils")))]
pub mod interrupts;

pub mod time;
pub mod build_info;
