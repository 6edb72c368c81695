use core::fmt;

use crate::constants::scheduler::{SAVED_REGISTER_SLOTS, STACK_ALIGN, TASK_STACK_SIZE};

/// Entry point of a spawned task. Tasks never return.
pub type TaskEntry = extern "C" fn() -> !;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Runnable,
    Running,
    /// Not entered by anything yet; reserved for blocking operations.
    Waiting,
}

#[derive(Clone)]
#[repr(C, align(16))]
pub struct TaskStack(pub [u8; TASK_STACK_SIZE]);

impl TaskStack {
    pub const fn zeroed() -> Self {
        Self([0; TASK_STACK_SIZE])
    }

    /// Highest usable address, aligned down to the stack alignment.
    pub fn top(&self) -> u64 {
        let end = self.0.as_ptr() as u64 + TASK_STACK_SIZE as u64;
        end & !(STACK_ALIGN - 1)
    }
}

pub struct Task {
    pub(super) id: TaskId,
    pub(super) saved_sp: u64,
    pub(super) state: TaskState,
    pub(super) stack: TaskStack,
}

impl Task {
    pub(super) const UNUSED: Task = Task {
        id: TaskId(0),
        saved_sp: 0,
        state: TaskState::Waiting,
        stack: TaskStack::zeroed(),
    };

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn saved_stack_pointer(&self) -> u64 {
        self.saved_sp
    }

    /// Lays out the frame `task_switch` expects on first resume and returns
    /// the stack pointer to save.
    ///
    /// From the top down:
    ///
    /// | offset from top | contents |
    /// |---|---|
    /// | -8 | 0, the entry function's return address |
    /// | -16 | entry address, consumed by `ret` |
    /// | -24 .. -48 | rbp, rbx, r12, r13 slots, zeroed |
    ///
    /// The saved pointer is `top - 48`. The four slots must match the
    /// registers `task_switch` pops, and the pad word puts `rsp + 8` on a
    /// 16-byte boundary when the entry starts, as if it had been called.
    /// Change any of them together with `switch.rs`.
    pub(super) fn prepare_stack(&mut self, entry: TaskEntry) -> u64 {
        let top = self.stack.top();
        let base = self.stack.0.as_ptr() as u64;

        let mut sp = top;
        let mut push = |value: u64| {
            sp -= 8;
            let offset = (sp - base) as usize;
            self.stack.0[offset..offset + 8].copy_from_slice(&value.to_ne_bytes());
        };

        push(0);
        push(entry as usize as u64);
        for _ in 0..SAVED_REGISTER_SLOTS {
            push(0);
        }
        sp
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("saved_sp", &format_args!("{:#x}", self.saved_sp))
            .finish()
    }
}
