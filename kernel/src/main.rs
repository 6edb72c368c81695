#![no_std]
#![no_main]

use core::{arch::global_asm, ptr::addr_of};

use keel::{console_println, idle_loop, init::kernel_main, interrupts};

global_asm!(include_str!("boot/entry.s"));

extern "C" {
    static __bootstrap_end: u8;
    static __kernel_end: u8;
}

/// Called by the long-mode trampoline with the Multiboot2 information address.
#[no_mangle]
extern "C" fn kmain(multiboot_info: u64) -> ! {
    let reserved_end = unsafe {
        let bootstrap_end = addr_of!(__bootstrap_end) as u64;
        let kernel_end = addr_of!(__kernel_end) as u64;
        bootstrap_end.max(kernel_end)
    };
    kernel_main(multiboot_info, reserved_end)
}

#[panic_handler]
fn rust_panic(info: &core::panic::PanicInfo) -> ! {
    interrupts::disable();
    console_println!("Kernel panic: {}", info);
    idle_loop();
}
