// Syscall numbers
pub const SYS_WRITE: u64 = 1;

pub const STDOUT_FD: u64 = 1;

/// Returned in rax for any failed syscall (-1 as a signed value).
pub const SYSCALL_FAILURE: u64 = u64::MAX;
