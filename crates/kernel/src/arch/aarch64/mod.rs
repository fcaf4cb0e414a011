// AArch64 architecture-specific code

pub mod trap;
pub mod timer;
pub mod gicv3;
pub mod psci;
pub mod smp;
pub mod serial;

pub use trap::*;

use super::{AddressSpaceId, Backend};
use core::arch::asm;

/// `Backend` binding over the GICv3/PSCI/timer glue above.
pub struct Aarch64Backend;

/// SGI number reserved for cross-CPU work notification, matching the
/// teacher's `smp::ipi::IpiType::Reschedule` convention.
const IPI_RESCHEDULE_SGI: u8 = 0;

impl Backend for Aarch64Backend {
    fn flush_tlb_pid(&self, asid: AddressSpaceId, _addr: u64, _size: u64) {
        // TLBI ASIDE1IS, inner-shareable: propagates to other cores
        // without a separate IPI for the TLB op itself. The cross-CPU
        // work item still exists so the caller can block until
        // participating CPUs have observed the new mapping (spec 4.D/4.H).
        unsafe {
            asm!("dsb ishst", "tlbi aside1is, {0}", "dsb ish", "isb", in(reg) asid);
        }
    }

    fn invalidate_icache(&self) {
        unsafe {
            asm!("ic iallu", "dsb ish", "isb");
        }
    }

    fn trigger_ipi(&self, cpu: usize) {
        smp::send_ipi(cpu, IPI_RESCHEDULE_SGI);
    }

    fn wait_for_interrupt(&self) {
        unsafe { asm!("wfi") };
    }

    fn arm_timer(&self, us: u32) {
        timer::set_timer_interrupt(us as u64);
    }

    fn now_us(&self) -> u64 {
        timer::get_time_us()
    }

    fn current_cpu(&self) -> usize {
        psci::current_cpu_id()
    }
}
