use core::mem::{offset_of, size_of};

/// Register image built by the trap entry stubs.
///
/// The stub pushes rax first and r15 last, so r15 sits at the lowest address;
/// rip, cs and rflags above it are the frame the CPU pushed on entry. Field
/// order is the stub's contract and must not change.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TrapFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rax: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
}

/// General purpose registers saved by the stub.
pub const SAVED_GPRS: usize = 15;

const _: () = assert!(size_of::<TrapFrame>() == (SAVED_GPRS + 3) * 8);
const _: () = assert!(offset_of!(TrapFrame, r15) == 0);
const _: () = assert!(offset_of!(TrapFrame, rax) == (SAVED_GPRS - 1) * 8);
const _: () = assert!(offset_of!(TrapFrame, rip) == SAVED_GPRS * 8);
const _: () = assert!(offset_of!(TrapFrame, rflags) == (SAVED_GPRS + 2) * 8);

impl core::fmt::Debug for TrapFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let mut ds = f.debug_struct("TrapFrame");

        ds.field("rax", &format_args!("{:#018x}", self.rax))
            .field("rbx", &format_args!("{:#018x}", self.rbx))
            .field("rcx", &format_args!("{:#018x}", self.rcx))
            .field("rdx", &format_args!("{:#018x}", self.rdx))
            .field("rsi", &format_args!("{:#018x}", self.rsi))
            .field("rdi", &format_args!("{:#018x}", self.rdi))
            .field("rbp", &format_args!("{:#018x}", self.rbp))
            .field("r8", &format_args!("{:#018x}", self.r8))
            .field("r9", &format_args!("{:#018x}", self.r9))
            .field("r10", &format_args!("{:#018x}", self.r10))
            .field("r11", &format_args!("{:#018x}", self.r11))
            .field("r12", &format_args!("{:#018x}", self.r12))
            .field("r13", &format_args!("{:#018x}", self.r13))
            .field("r14", &format_args!("{:#018x}", self.r14))
            .field("r15", &format_args!("{:#018x}", self.r15))
            .field("rip", &format_args!("{:#018x}", self.rip))
            .field("cs", &format_args!("{:#06x}", self.cs))
            .field("rflags", &format_args!("{:#018x}", self.rflags));

        ds.finish()
    }
}
