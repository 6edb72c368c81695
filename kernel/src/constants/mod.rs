//! System-wide constants and hardware-specific values.

pub mod boot;
pub mod idt;
pub mod memory;
pub mod ports;
pub mod scheduler;
pub mod syscalls;
