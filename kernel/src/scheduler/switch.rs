//! Stack-pointer swap between tasks.

use core::arch::{asm, global_asm};

// task_switch(save: *mut u64 [rdi], next: u64 [rsi])
//
// rbp and rbx cannot be declared clobbered by inline asm, so they travel on
// the stack together with r12 and r13. The push order here fixes the initial
// frame built by `Task::prepare_stack`.
global_asm!(
    r#"
    .text
    .global task_switch
task_switch:
    push rbp
    push rbx
    push r12
    push r13
    mov [rdi], rsp
    mov rsp, rsi
    pop r13
    pop r12
    pop rbx
    pop rbp
    ret
"#
);

extern "C" {
    fn task_switch(save: *mut u64, next: u64);
}

/// Suspends the current flow into `save` and resumes the one at `next`.
/// Returns when something switches back to `save`.
///
/// # Safety
/// `save` must stay valid until this flow is resumed, and `next` must be a
/// stack pointer produced by this routine or by `Task::prepare_stack`.
pub unsafe fn switch_to(save: *mut u64, next: u64) {
    asm!(
        "call {switch}",
        switch = sym task_switch,
        in("rdi") save,
        in("rsi") next,
        out("r14") _,
        out("r15") _,
        clobber_abi("C"),
    );
}
