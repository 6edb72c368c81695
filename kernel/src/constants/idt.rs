//! Interrupt Descriptor Table configuration.

pub const IDT_ENTRIES: usize = 256;
pub const GATE_DESCRIPTOR_SIZE: usize = 16;
/// Byte limit loaded into IDTR: size of the whole table minus one.
pub const IDT_LIMIT: u16 = (IDT_ENTRIES * GATE_DESCRIPTOR_SIZE - 1) as u16;

pub const DOUBLE_FAULT_VECTOR: u8 = 0x08;
pub const GENERAL_PROTECTION_VECTOR: u8 = 0x0D;
/// Vector number assigned to the timer interrupt (IRQ0 after remapping).
pub const TIMER_VECTOR: u8 = 0x20;
/// Vector number assigned to the PS/2 keyboard (IRQ1 after remapping).
pub const KEYBOARD_VECTOR: u8 = 0x21;
pub const SYSCALL_VECTOR: u8 = 0x80;

/// Present, DPL 0, 64-bit interrupt gate.
pub const KERNEL_GATE_FLAGS: u8 = 0x8E;
/// Present, DPL 3, 64-bit interrupt gate; reachable with `int` from ring 3.
pub const USER_GATE_FLAGS: u8 = 0xEE;

pub const PIC_1_OFFSET: u8 = 0x20;
pub const PIC_2_OFFSET: u8 = 0x28;
/// Unmask IRQ0 (timer) and IRQ1 (keyboard) only.
pub const PIC_1_MASK: u8 = 0xFC;
pub const PIC_2_MASK: u8 = 0xFF;

/// Timer interrupt frequency in Hertz.
pub const TIMER_FREQUENCY: u32 = 100;
/// Input clock of the 8253/8254 PIT.
pub const PIT_BASE_FREQUENCY: u32 = 1_193_182;
/// Channel 0, lobyte/hibyte access, rate generator.
pub const PIT_MODE_RATE_GENERATOR: u8 = 0x36;
