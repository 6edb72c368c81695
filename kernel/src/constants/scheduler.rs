/// Task pool capacity, boot task included.
pub const MAX_TASKS: usize = 16;
pub const TASK_STACK_SIZE: usize = 4096;
pub const STACK_ALIGN: u64 = 16;
/// Registers pushed by `task_switch` on suspend and popped on resume.
pub const SAVED_REGISTER_SLOTS: usize = 4;
pub const BOOT_TASK_ID: u64 = 0;
