//! Interrupt handling.
//!
//! - IDT construction and loading
//! - Assembly entry stubs and the handler bodies behind them
//! - `int 0x80` syscall dispatch
//! - Legacy PIC/PIT setup
//! - Functions to enable/disable interrupts

use x86_64::instructions::interrupts;

pub mod handlers;
pub mod idt;
pub mod pic;
pub mod stubs;
pub mod syscalls;
pub mod trap_frame;

pub use handlers::ticks;

/// Enables interrupts on the current CPU.
pub fn enable() {
    interrupts::enable();
}

/// Disables interrupts on the current CPU.
pub fn disable() {
    interrupts::disable();
}

/// Executes a closure with interrupts disabled.
///
/// # Returns
/// Returns the result of the closure
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    interrupts::without_interrupts(f)
}

/// Checks if interrupts are enabled on the current CPU.
pub fn are_enabled() -> bool {
    interrupts::are_enabled()
}
