//! Architecture-independent boot handoff. Each `_start` in `main.rs`
//! finishes the privileged setup only it can do (stack, exception
//! vectors, early MMU/GIC/APIC bring-up) and then calls
//! [`kernel_main`], which constructs the [`Kernel`](super::Kernel),
//! arms every CPU's scheduler timer and parks the primary CPU in the
//! idle wait loop. Grounded on the teacher's `build_info::print_build_info`
//! boot banner and `cpu.h`'s `Cpu_pool` bring-up (`Cpu::arm` for every
//! CPU before any of them accept a timer interrupt).

use lazy_static::lazy_static;
use spin::Mutex;

use crate::config;
use crate::kernel::Kernel;

lazy_static! {
    /// The one kernel instance this boot image owns. A `Mutex` rather
    /// than a raw static because interrupt/trap handlers reach in from
    /// a different execution context than `kernel_main`'s own loop.
    pub static ref KERNEL: Mutex<Kernel> = Mutex::new(Kernel::new(
        config::MAX_CPUS,
        config::DEFAULT_ROUND_QUOTA_US,
        config::DEFAULT_FILL_US,
    ));
}

/// Architecture-independent kernel entry point. Never returns.
pub fn kernel_main() -> ! {
    crate::build_info::print_build_info();
    crate::log::info("boot", "kernel core initialized");

    {
        let mut kernel = KERNEL.lock();
        let backend = crate::arch::current();
        let num_cpus = kernel.cpus().len();
        for cpu in 0..num_cpus {
            kernel.cpus_mut().cpu_mut(cpu).arm(backend);
        }
    }

    let backend = crate::arch::current();
    let primary = KERNEL.lock().cpus().primary_cpu();
    crate::log::info_ctx("boot", "entering idle wait loop", &[("primary_cpu", primary as u64)]);
    loop {
        backend.wait_for_interrupt();
    }
}
