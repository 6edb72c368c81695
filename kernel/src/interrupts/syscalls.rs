//! `int 0x80` system call dispatch.
//!
//! Register ABI: rax carries the call number, rbx/rcx/rdx the arguments.
//! The result replaces the saved rax, so the stub's `iretq` hands it back.

use core::{arch::asm, fmt};

use crate::{
    constants::syscalls::{STDOUT_FD, SYSCALL_FAILURE, SYS_WRITE},
    devices::console::{with_console, CharSink},
    interrupts::{idt, trap_frame::TrapFrame},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    BadFileDescriptor(u64),
    /// Buffer is null, or `buf + len` leaves the address space.
    BadBuffer { addr: u64, len: u64 },
    Unknown(u64),
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyscallError::BadFileDescriptor(fd) => write!(f, "bad file descriptor {}", fd),
            SyscallError::BadBuffer { addr, len } => {
                write!(f, "bad buffer {:#x} ({} bytes)", addr, len)
            }
            SyscallError::Unknown(number) => write!(f, "unknown syscall {}", number),
        }
    }
}

/// Runs the call described by `frame` against `sink` and stores the result
/// in `frame.rax`.
pub fn dispatch<S: CharSink + ?Sized>(frame: &mut TrapFrame, sink: &mut S) {
    let result = match frame.rax {
        SYS_WRITE => unsafe { sys_write(sink, frame.rbx, frame.rcx, frame.rdx) },
        number => {
            sink.put_str("unknown syscall\n");
            Err(SyscallError::Unknown(number))
        }
    };

    frame.rax = match result {
        Ok(value) => value,
        Err(e) => {
            log::warn!("syscall failed: {}", e);
            SYSCALL_FAILURE
        }
    };
}

/// Copies `len` bytes at `addr` to the sink, one character per byte.
///
/// A null buffer, a length above `isize::MAX` or a range that wraps the
/// address space is refused before anything is read.
///
/// # Safety
/// A buffer that passes those checks must be readable for `len` bytes.
unsafe fn sys_write<S: CharSink + ?Sized>(
    sink: &mut S,
    fd: u64,
    addr: u64,
    len: u64,
) -> Result<u64, SyscallError> {
    if fd != STDOUT_FD {
        return Err(SyscallError::BadFileDescriptor(fd));
    }
    if len == 0 {
        return Ok(0);
    }
    if addr == 0 || len > isize::MAX as u64 || addr.checked_add(len).is_none() {
        return Err(SyscallError::BadBuffer { addr, len });
    }

    let buf = addr as *const u8;
    for offset in 0..len as usize {
        sink.put_char(buf.add(offset).read() as char);
    }
    Ok(len)
}

/// Called by the syscall entry stub with the saved register frame.
#[no_mangle]
extern "C" fn syscall_entry(frame: &mut TrapFrame) {
    with_console(|console| dispatch(frame, console));
}

/// Issues `write(1, bytes)` through the syscall gate and returns the result.
///
/// Fails without trapping while no IDT is loaded.
pub fn trigger_write(bytes: &[u8]) -> u64 {
    if !idt::is_loaded() {
        return SYSCALL_FAILURE;
    }
    let mut result = SYS_WRITE;
    // rbx is reserved by LLVM, so the fd is swapped in around the trap.
    unsafe {
        asm!(
            "xchg {fd}, rbx",
            "int 0x80",
            "xchg {fd}, rbx",
            fd = inout(reg) STDOUT_FD => _,
            inout("rax") result,
            in("rcx") bytes.as_ptr(),
            in("rdx") bytes.len(),
        );
    }
    result
}
