//! Handler bodies reached from the entry stubs.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::{
    constants::idt::{KEYBOARD_VECTOR, TIMER_VECTOR},
    devices,
    interrupts::pic,
};

/// Timer interrupts since the PIT was programmed. Nothing schedules off it.
static TICKS: AtomicU64 = AtomicU64::new(0);

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Handles double fault exceptions by panicking with the faulting address.
#[no_mangle]
extern "C" fn double_fault_handler(error_code: u64, rip: u64) -> ! {
    panic!(
        "EXCEPTION: DOUBLE FAULT (error code: {:#x}) at {:#x}",
        error_code, rip
    );
}

/// Handles general protection faults by panicking with the selector error code.
#[no_mangle]
extern "C" fn general_protection_handler(error_code: u64, rip: u64) -> ! {
    panic!(
        "EXCEPTION: GENERAL PROTECTION FAULT (error code: {:#x}) at {:#x}",
        error_code, rip
    );
}

#[no_mangle]
extern "C" fn timer_interrupt_handler() {
    TICKS.fetch_add(1, Ordering::Relaxed);
    pic::end_of_interrupt(TIMER_VECTOR);
}

#[no_mangle]
extern "C" fn keyboard_interrupt_handler() {
    devices::read_scancode();
    pic::end_of_interrupt(KEYBOARD_VECTOR);
}
