//! I/O port definitions.

/// Base I/O port address for the first serial port (COM1).
pub const SERIAL_PORT: u16 = 0x3F8;
/// QEMU/Bochs debug console; bytes written here land in `-debugcon` output.
pub const DEBUGCON_PORT: u16 = 0xE9;
pub const KEYBOARD_DATA_PORT: u16 = 0x60;
pub const PIT_CHANNEL0_PORT: u16 = 0x40;
pub const PIT_COMMAND_PORT: u16 = 0x43;
