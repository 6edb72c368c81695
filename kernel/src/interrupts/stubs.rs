//! Low-level entry points installed in the IDT.
//!
//! The stubs save what the Rust side may clobber, call into the handler bodies
//! and return with `iretq`. The syscall stub saves every general purpose
//! register so the dispatcher sees a complete [`TrapFrame`](super::trap_frame::TrapFrame)
//! and can hand its result back through the saved rax.
//!
//! On entry the CPU aligns the stack to 16 bytes and pushes five words (six
//! with an error code); the push counts below keep the `call` aligned.

use core::arch::global_asm;

// #DF and #GP push an error code. Neither handler returns.
global_asm!(
    r#"
    .text
    .global isr_double_fault
isr_double_fault:
    mov rdi, [rsp]
    mov rsi, [rsp + 8]
    and rsp, -16
    call double_fault_handler
    ud2

    .global isr_general_protection
isr_general_protection:
    mov rdi, [rsp]
    mov rsi, [rsp + 8]
    and rsp, -16
    call general_protection_handler
    ud2
"#
);

// IRQ0/IRQ1: caller-saved registers only, the handlers are plain extern "C".
global_asm!(
    r#"
    .text
    .global isr_timer
isr_timer:
    push rax
    push rcx
    push rdx
    push rsi
    push rdi
    push r8
    push r9
    push r10
    push r11
    cld
    call timer_interrupt_handler
    pop r11
    pop r10
    pop r9
    pop r8
    pop rdi
    pop rsi
    pop rdx
    pop rcx
    pop rax
    iretq

    .global isr_keyboard
isr_keyboard:
    push rax
    push rcx
    push rdx
    push rsi
    push rdi
    push r8
    push r9
    push r10
    push r11
    cld
    call keyboard_interrupt_handler
    pop r11
    pop r10
    pop r9
    pop r8
    pop rdi
    pop rsi
    pop rdx
    pop rcx
    pop rax
    iretq
"#
);

// int 0x80: full trap frame, r15 ends up at the lowest address.
global_asm!(
    r#"
    .text
    .global isr_syscall
isr_syscall:
    push rax
    push rcx
    push rdx
    push rbx
    push rbp
    push rsi
    push rdi
    push r8
    push r9
    push r10
    push r11
    push r12
    push r13
    push r14
    push r15
    cld
    mov rdi, rsp
    call syscall_entry
    pop r15
    pop r14
    pop r13
    pop r12
    pop r11
    pop r10
    pop r9
    pop r8
    pop rdi
    pop rsi
    pop rbp
    pop rbx
    pop rdx
    pop rcx
    pop rax
    iretq
"#
);

extern "C" {
    fn isr_double_fault();
    fn isr_general_protection();
    fn isr_timer();
    fn isr_keyboard();
    fn isr_syscall();
}

/// Addresses of the handler entry points, one per installed vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapStubs {
    pub double_fault: u64,
    pub general_protection: u64,
    pub timer: u64,
    pub keyboard: u64,
    pub syscall: u64,
}

impl TrapStubs {
    /// The stubs defined above.
    pub fn resolve() -> Self {
        Self {
            double_fault: isr_double_fault as usize as u64,
            general_protection: isr_general_protection as usize as u64,
            timer: isr_timer as usize as u64,
            keyboard: isr_keyboard as usize as u64,
            syscall: isr_syscall as usize as u64,
        }
    }
}
