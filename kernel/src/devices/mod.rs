//! Device management.
//!
//! - Console on COM1, shared by logging and syscalls
//! - Legacy PS/2 keyboard data port

pub mod console;

use spin::Once;
use x86_64::instructions::port::Port;

use crate::constants::ports::KEYBOARD_DATA_PORT;

/// Consumer of raw keyboard scancodes; translation happens outside the core.
pub type ScancodeHandler = fn(u8);

static SCANCODE_HANDLER: Once<ScancodeHandler> = Once::new();

/// Registers the keyboard consumer. Only the first registration takes effect.
pub fn set_keyboard_handler(handler: ScancodeHandler) {
    SCANCODE_HANDLER.call_once(|| handler);
}

/// Reads one scancode from the PS/2 controller and forwards it.
/// Called from the IRQ1 handler.
pub(crate) fn read_scancode() {
    let mut data: Port<u8> = Port::new(KEYBOARD_DATA_PORT);
    let scancode = unsafe { data.read() };
    if let Some(handler) = SCANCODE_HANDLER.get() {
        handler(scancode);
    }
}
