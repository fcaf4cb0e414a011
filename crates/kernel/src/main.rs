#![no_std]
#![no_main]
#![feature(alloc_error_handler)]
#![cfg_attr(target_arch = "x86_64", feature(abi_x86_interrupt))]
#![cfg_attr(feature = "strict", deny(warnings))]
#![cfg_attr(feature = "strict", deny(unsafe_op_in_unsafe_fn))]

//! Bare-metal entry point. Each architecture's `_start` does the minimum
//! privileged setup it alone can do (stack, exception vectors, MMU) before
//! handing off to `core_hw_kernel::kernel::boot::kernel_main`, which is
//! architecture-independent from that point on.

extern crate alloc;

#[allow(special_module_name)]
pub mod lib;
pub mod config;
pub mod arch;
pub mod log;
pub mod time;
pub mod uart;
pub mod heap;
pub mod interrupts;
pub mod build_info;
pub mod kernel;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    crate::lib::panic::panic_handler(info)
}

/// Crate-wide raw UART write used by early boot, panic and logging code
/// before any structured console abstraction is available.
#[inline(always)]
pub unsafe fn uart_print(msg: &[u8]) {
    uart::write_bytes(msg);
}

#[cfg(target_arch = "aarch64")]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    arch::aarch64::trap::init_exception_vectors();
    if let Err(e) = heap::init_heap() {
        crate::log::error("boot", e);
        loop {
            unsafe { core::arch::asm!("wfi") };
        }
    }
    unsafe {
        arch::aarch64::gicv3::init();
        arch::aarch64::smp::init();
    }
    kernel::boot::kernel_main()
}

#[cfg(target_arch = "x86_64")]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    unsafe {
        if arch::x86_64::boot::early_init().is_err() {
            arch::x86_64::serial::serial_write(b"[FATAL] early boot init failed\n");
            arch::x86_64::boot::halt_forever();
        }
    }
    if let Err(e) = heap::init_heap() {
        unsafe {
            arch::x86_64::serial::serial_write(b"[FATAL] heap init failed: ");
            arch::x86_64::serial::serial_write(e.as_bytes());
            arch::x86_64::serial::serial_write(b"\n");
        }
        arch::x86_64::halt_loop();
    }
    unsafe {
        arch::x86_64::apic::init();
    }
    kernel::boot::kernel_main()
}

#[cfg(target_arch = "riscv64")]
#[no_mangle]
pub extern "C" fn _start(hart_id: usize, _dtb_ptr: usize) -> ! {
    if arch::riscv64::init().is_err() {
        loop {
            unsafe { core::arch::asm!("wfi") };
        }
    }
    if heap::init_heap().is_err() {
        loop {
            unsafe { core::arch::asm!("wfi") };
        }
    }
    let _ = hart_id;
    kernel::boot::kernel_main()
}
