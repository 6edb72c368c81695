//! Interrupt Descriptor Table
//!
//! This module provides:
//! - The 16-byte long-mode gate descriptor and the 256-entry table
//! - Packing of the 10-byte IDTR image
//! - Building the kernel's table and loading it with `lidt`
//!
//! The table has two observable states: unbuilt, and built-and-loaded. The
//! switch between them is the single `lidt` instruction.

use core::{
    mem::{offset_of, size_of},
    sync::atomic::{AtomicBool, Ordering},
};

use spin::Mutex;
use x86_64::{
    instructions::{
        segmentation::{Segment, CS},
        tables::{lidt, sidt},
    },
    structures::DescriptorTablePointer,
    VirtAddr,
};

use crate::{
    constants::idt::{
        DOUBLE_FAULT_VECTOR, GATE_DESCRIPTOR_SIZE, GENERAL_PROTECTION_VECTOR, IDT_ENTRIES,
        IDT_LIMIT, KERNEL_GATE_FLAGS, KEYBOARD_VECTOR, SYSCALL_VECTOR, TIMER_VECTOR,
        USER_GATE_FLAGS,
    },
    interrupts::stubs::TrapStubs,
};

/// One long-mode interrupt gate, laid out exactly as the CPU reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct GateDescriptor {
    pub offset_low: u16,
    pub selector: u16,
    pub ist: u8,
    pub flags: u8,
    pub offset_mid: u16,
    pub offset_high: u32,
    pub zero: u32,
}

const _: () = assert!(size_of::<GateDescriptor>() == GATE_DESCRIPTOR_SIZE);
const _: () = assert!(offset_of!(GateDescriptor, selector) == 2);
const _: () = assert!(offset_of!(GateDescriptor, ist) == 4);
const _: () = assert!(offset_of!(GateDescriptor, flags) == 5);
const _: () = assert!(offset_of!(GateDescriptor, offset_mid) == 6);
const _: () = assert!(offset_of!(GateDescriptor, offset_high) == 8);
const _: () = assert!(offset_of!(GateDescriptor, zero) == 12);

impl GateDescriptor {
    /// A non-present gate.
    pub const MISSING: Self = Self {
        offset_low: 0,
        selector: 0,
        ist: 0,
        flags: 0,
        offset_mid: 0,
        offset_high: 0,
        zero: 0,
    };

    pub const fn new(handler: u64, selector: u16, flags: u8) -> Self {
        Self {
            offset_low: handler as u16,
            selector,
            ist: 0,
            flags,
            offset_mid: (handler >> 16) as u16,
            offset_high: (handler >> 32) as u32,
            zero: 0,
        }
    }

    pub fn handler_address(&self) -> u64 {
        self.offset_low as u64 | (self.offset_mid as u64) << 16 | (self.offset_high as u64) << 32
    }

    pub fn is_present(&self) -> bool {
        self.flags & 0x80 != 0
    }

    /// Descriptor privilege level: the lowest ring allowed to `int` into it.
    pub fn dpl(&self) -> u8 {
        (self.flags >> 5) & 0b11
    }

    pub fn to_bytes(&self) -> [u8; GATE_DESCRIPTOR_SIZE] {
        let mut out = [0u8; GATE_DESCRIPTOR_SIZE];
        out[0..2].copy_from_slice(&self.offset_low.to_le_bytes());
        out[2..4].copy_from_slice(&self.selector.to_le_bytes());
        out[4] = self.ist;
        out[5] = self.flags;
        out[6..8].copy_from_slice(&self.offset_mid.to_le_bytes());
        out[8..12].copy_from_slice(&self.offset_high.to_le_bytes());
        out[12..16].copy_from_slice(&self.zero.to_le_bytes());
        out
    }
}

/// The 10-byte operand of `lidt`: 16-bit limit, then 64-bit base, little endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRegister {
    pub limit: u16,
    pub base: u64,
}

impl TableRegister {
    pub const SIZE: usize = 10;

    pub fn pack(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..2].copy_from_slice(&self.limit.to_le_bytes());
        out[2..10].copy_from_slice(&self.base.to_le_bytes());
        out
    }

    pub fn unpack(bytes: &[u8; Self::SIZE]) -> Self {
        let mut base = [0u8; 8];
        base.copy_from_slice(&bytes[2..10]);
        Self {
            limit: u16::from_le_bytes([bytes[0], bytes[1]]),
            base: u64::from_le_bytes(base),
        }
    }
}

#[derive(Clone)]
#[repr(C, align(16))]
pub struct InterruptDescriptorTable {
    entries: [GateDescriptor; IDT_ENTRIES],
}

const _: () = assert!(size_of::<InterruptDescriptorTable>() == IDT_ENTRIES * GATE_DESCRIPTOR_SIZE);

impl Default for InterruptDescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptDescriptorTable {
    /// A table with every gate absent.
    pub const fn new() -> Self {
        Self {
            entries: [GateDescriptor::MISSING; IDT_ENTRIES],
        }
    }

    pub fn set_gate(&mut self, vector: u8, handler: u64, selector: u16, flags: u8) {
        self.entries[vector as usize] = GateDescriptor::new(handler, selector, flags);
    }

    pub fn gate(&self, vector: u8) -> &GateDescriptor {
        &self.entries[vector as usize]
    }

    /// Installs the kernel's vectors: both faults and both IRQs are kernel
    /// only, the syscall gate is callable from ring 3.
    pub fn install(&mut self, selector: u16, stubs: &TrapStubs) {
        self.set_gate(DOUBLE_FAULT_VECTOR, stubs.double_fault, selector, KERNEL_GATE_FLAGS);
        self.set_gate(
            GENERAL_PROTECTION_VECTOR,
            stubs.general_protection,
            selector,
            KERNEL_GATE_FLAGS,
        );
        self.set_gate(TIMER_VECTOR, stubs.timer, selector, KERNEL_GATE_FLAGS);
        self.set_gate(KEYBOARD_VECTOR, stubs.keyboard, selector, KERNEL_GATE_FLAGS);
        self.set_gate(SYSCALL_VECTOR, stubs.syscall, selector, USER_GATE_FLAGS);
    }

    /// IDTR image describing this table at its current address.
    pub fn table_register(&self) -> TableRegister {
        TableRegister {
            limit: IDT_LIMIT,
            base: self.entries.as_ptr() as u64,
        }
    }

    /// Makes this table the active IDT.
    ///
    /// # Safety
    /// The table must stay at this address, and every present gate must point
    /// at a valid entry stub, for as long as it is loaded.
    pub unsafe fn load(&'static self) {
        let register = self.table_register();
        lidt(&DescriptorTablePointer {
            limit: register.limit,
            base: VirtAddr::new(register.base),
        });
    }
}

/// The system's Interrupt Descriptor Table.
static IDT: Mutex<InterruptDescriptorTable> = Mutex::new(InterruptDescriptorTable::new());
static IDT_LOADED: AtomicBool = AtomicBool::new(false);

/// Builds the kernel IDT and loads it into the CPU.
///
/// The gate selector is whatever code segment is live right now.
pub fn build_and_load() {
    let selector = CS::get_reg().0;
    let stubs = TrapStubs::resolve();

    let mut idt = IDT.lock();
    idt.install(selector, &stubs);

    // The table lives in a static, so the address stays valid after the lock is released.
    let table: &'static InterruptDescriptorTable =
        unsafe { &*(&*idt as *const InterruptDescriptorTable) };
    unsafe { table.load() };

    let expected = table.table_register();
    let live = loaded_table_register();
    if live != expected {
        log::error!(
            "IDTR reads back {:#x}/{:#x}, expected {:#x}/{:#x}",
            live.base,
            live.limit,
            expected.base,
            expected.limit
        );
        return;
    }
    IDT_LOADED.store(true, Ordering::Release);

    log::info!(
        "IDT loaded at {:#x} (limit {:#x}, selector {:#x})",
        expected.base,
        expected.limit,
        selector
    );
}

/// True once [`build_and_load`] has seen its table in the live IDTR.
pub fn is_loaded() -> bool {
    IDT_LOADED.load(Ordering::Acquire)
}

/// Reads the live IDTR back from the CPU.
pub fn loaded_table_register() -> TableRegister {
    let pointer = sidt();
    TableRegister {
        limit: pointer.limit,
        base: pointer.base.as_u64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::boxed::Box;

    fn fake_stubs() -> TrapStubs {
        TrapStubs {
            double_fault: 0xFFFF_8000_0010_1000,
            general_protection: 0x0000_0000_0010_2040,
            timer: 0x0010_3000,
            keyboard: 0x0010_3100,
            syscall: 0x1234_5678_9ABC_DEF0,
        }
    }

    #[test]
    fn test_table_register_packing() {
        let register = TableRegister {
            limit: 0x0FFF,
            base: 0x0000_0000_0010_0000,
        };
        let bytes = register.pack();
        assert_eq!(
            bytes,
            [0xFF, 0x0F, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(TableRegister::unpack(&bytes), register);
    }

    #[test]
    fn test_gate_splits_handler_address() {
        let gate = GateDescriptor::new(0x1234_5678_9ABC_DEF0, 0x08, KERNEL_GATE_FLAGS);
        assert_eq!(gate.offset_low, 0xDEF0);
        assert_eq!(gate.offset_mid, 0x9ABC);
        assert_eq!(gate.offset_high, 0x1234_5678);
        assert_eq!(gate.handler_address(), 0x1234_5678_9ABC_DEF0);
        assert_eq!(
            gate.to_bytes(),
            [0xF0, 0xDE, 0x08, 0x00, 0x00, 0x8E, 0xBC, 0x9A, 0x78, 0x56, 0x34, 0x12, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_in_memory_layout_matches_bytes() {
        let gate = GateDescriptor::new(0xFFFF_8000_0020_3040, 0x28, USER_GATE_FLAGS);
        let raw: [u8; GATE_DESCRIPTOR_SIZE] = unsafe { core::mem::transmute(gate) };
        assert_eq!(raw, gate.to_bytes());
    }

    #[test]
    fn test_install_sets_expected_vectors() {
        let mut idt = Box::new(InterruptDescriptorTable::new());
        let stubs = fake_stubs();
        idt.install(0x08, &stubs);

        let kernel_gates = [
            (DOUBLE_FAULT_VECTOR, stubs.double_fault),
            (GENERAL_PROTECTION_VECTOR, stubs.general_protection),
            (TIMER_VECTOR, stubs.timer),
            (KEYBOARD_VECTOR, stubs.keyboard),
        ];
        for (vector, handler) in kernel_gates {
            let gate = idt.gate(vector);
            assert!(gate.is_present());
            assert_eq!(gate.dpl(), 0);
            assert_eq!(gate.selector, 0x08);
            assert_eq!(gate.handler_address(), handler);
        }

        let syscall = idt.gate(SYSCALL_VECTOR);
        assert_eq!(syscall.flags, USER_GATE_FLAGS);
        assert_eq!(syscall.dpl(), 3);
        assert_eq!(syscall.handler_address(), stubs.syscall);

        let installed = (0..=255u8).filter(|&v| idt.gate(v).is_present()).count();
        assert_eq!(installed, 5);
    }

    #[test]
    fn test_table_register_describes_table() {
        let idt = Box::new(InterruptDescriptorTable::new());
        let register = idt.table_register();
        assert_eq!(register.limit, 0x0FFF);
        assert_eq!(register.base, idt.gate(0) as *const GateDescriptor as u64);
        assert_eq!(register.base % 16, 0);
    }
}
