//! Cooperative round-robin scheduler.
//!
//! A fixed pool of tasks, one of which is always Running. Tasks give up the
//! CPU only by calling [`schedule`]; the timer does not preempt. Slots are
//! never reclaimed and ids are never reused.

use core::fmt;

use spin::Mutex;

use crate::{
    constants::scheduler::{BOOT_TASK_ID, MAX_TASKS},
    interrupts::without_interrupts,
};

pub mod switch;
pub mod task;

pub use task::{Task, TaskEntry, TaskId, TaskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    NotInitialized,
    PoolExhausted,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::NotInitialized => write!(f, "scheduler not initialized"),
            SpawnError::PoolExhausted => write!(f, "task pool exhausted ({} tasks)", MAX_TASKS),
        }
    }
}

/// A switch decided under the pool lock and carried out after releasing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchPlan {
    pub from: TaskId,
    pub to: TaskId,
    /// Saved stack pointer slot of the outgoing task.
    pub save: *mut u64,
    /// Saved stack pointer of the incoming task.
    pub next: u64,
}

pub struct Scheduler {
    tasks: [Task; MAX_TASKS],
    count: usize,
    current: Option<usize>,
    next_id: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: [Task::UNUSED; MAX_TASKS],
            count: 0,
            current: None,
            next_id: BOOT_TASK_ID + 1,
        }
    }

    /// Empties the pool and adopts the running flow as the boot task.
    /// Ids handed out before a re-init are not handed out again.
    pub fn init(&mut self) {
        let boot = &mut self.tasks[0];
        boot.id = TaskId(BOOT_TASK_ID);
        boot.state = TaskState::Running;
        boot.saved_sp = 0;

        self.count = 1;
        self.current = Some(0);
    }

    pub fn is_initialized(&self) -> bool {
        self.current.is_some()
    }

    pub fn spawn(&mut self, entry: TaskEntry) -> Result<TaskId, SpawnError> {
        if !self.is_initialized() {
            return Err(SpawnError::NotInitialized);
        }
        if self.count >= MAX_TASKS {
            return Err(SpawnError::PoolExhausted);
        }

        let id = TaskId(self.next_id);
        self.next_id += 1;

        let task = &mut self.tasks[self.count];
        task.id = id;
        task.state = TaskState::Runnable;
        task.saved_sp = task.prepare_stack(entry);
        self.count += 1;

        Ok(id)
    }

    /// Picks the next Runnable task after the current one, in pool order,
    /// and commits the state change. `None` means keep running.
    pub fn prepare_switch(&mut self) -> Option<SwitchPlan> {
        if self.count <= 1 {
            return None;
        }
        let current = self.current?;

        let next = (1..self.count)
            .map(|step| (current + step) % self.count)
            .find(|&index| self.tasks[index].state == TaskState::Runnable)?;
        if next == current {
            return None;
        }

        self.tasks[current].state = TaskState::Runnable;
        self.tasks[next].state = TaskState::Running;
        self.current = Some(next);

        let incoming = &self.tasks[next];
        let (to, next_sp) = (incoming.id, incoming.saved_sp);
        let outgoing = &mut self.tasks[current];
        Some(SwitchPlan {
            from: outgoing.id,
            to,
            save: &mut outgoing.saved_sp as *mut u64,
            next: next_sp,
        })
    }

    pub fn current_id(&self) -> Option<TaskId> {
        self.current.map(|index| self.tasks[index].id)
    }

    pub fn task_count(&self) -> usize {
        self.count
    }

    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.tasks().iter().find(|t| t.id == id).map(Task::state)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks[..self.count]
    }
}

// Saved stack pointers point into this static, so it must never move.
static SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new());

/// Starts the scheduler with the calling flow as task 0.
pub fn init() {
    without_interrupts(|| SCHEDULER.lock().init());
    log::info!("Scheduler ready: boot task {}, {} slots", BOOT_TASK_ID, MAX_TASKS);
}

pub fn spawn(entry: TaskEntry) -> Result<TaskId, SpawnError> {
    let result = without_interrupts(|| SCHEDULER.lock().spawn(entry));
    match result {
        Ok(id) => log::debug!("Spawned task {}", id),
        Err(e) => log::warn!("Spawn failed: {}", e),
    }
    result
}

/// Yields to the next Runnable task. Returns when this task is resumed, or
/// immediately if there is nobody else to run.
pub fn schedule() {
    let plan = without_interrupts(|| SCHEDULER.lock().prepare_switch());
    if let Some(plan) = plan {
        // The lock is released; the incoming task may take it straight away.
        unsafe { switch::switch_to(plan.save, plan.next) };
    }
}

/// Id of the running task, or -1 before [`init`].
pub fn current_task_id() -> i64 {
    without_interrupts(|| SCHEDULER.lock().current_id()).map_or(-1, |id| id.0 as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::scheduler::{SAVED_REGISTER_SLOTS, STACK_ALIGN};
    use core::{
        ptr::null_mut,
        sync::atomic::{AtomicPtr, AtomicU64, AtomicUsize, Ordering::SeqCst},
    };
    use std::{boxed::Box, vec::Vec};

    extern "C" fn idle_entry() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn started() -> Box<Scheduler> {
        let mut scheduler = Box::new(Scheduler::new());
        scheduler.init();
        scheduler
    }

    #[test]
    fn test_init_installs_boot_task() {
        let scheduler = started();
        assert_eq!(scheduler.task_count(), 1);
        assert_eq!(scheduler.current_id(), Some(TaskId(BOOT_TASK_ID)));
        assert_eq!(
            scheduler.task_state(TaskId(BOOT_TASK_ID)),
            Some(TaskState::Running)
        );
    }

    #[test]
    fn test_spawn_before_init() {
        let mut scheduler = Box::new(Scheduler::new());
        assert_eq!(scheduler.current_id(), None);
        assert_eq!(scheduler.spawn(idle_entry), Err(SpawnError::NotInitialized));
        assert_eq!(scheduler.task_count(), 0);
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut scheduler = started();
        let ids: Vec<_> = (0..3).map(|_| scheduler.spawn(idle_entry)).collect();
        assert_eq!(ids, [Ok(TaskId(1)), Ok(TaskId(2)), Ok(TaskId(3))]);
        assert_eq!(scheduler.task_state(TaskId(2)), Some(TaskState::Runnable));
    }

    #[test]
    fn test_pool_capacity() {
        let mut scheduler = started();
        for _ in 1..MAX_TASKS {
            assert!(scheduler.spawn(idle_entry).is_ok());
        }
        assert_eq!(scheduler.task_count(), MAX_TASKS);

        assert_eq!(scheduler.spawn(idle_entry), Err(SpawnError::PoolExhausted));
        assert_eq!(scheduler.task_count(), MAX_TASKS);
    }

    #[test]
    fn test_initial_stack_shape() {
        let mut scheduler = started();
        let id = scheduler.spawn(idle_entry).unwrap();
        let task = scheduler.tasks().iter().find(|t| t.id() == id).unwrap();

        let top = task.stack.top();
        let sp = task.saved_stack_pointer();
        assert_eq!(top % STACK_ALIGN, 0);
        assert_eq!(sp, top - 48);
        assert_eq!(sp % STACK_ALIGN, 0);

        let slots = unsafe { core::slice::from_raw_parts(sp as *const u64, 6) };
        assert!(slots[..SAVED_REGISTER_SLOTS].iter().all(|&slot| slot == 0));
        assert_eq!(slots[4], idle_entry as usize as u64);
        assert_eq!(slots[5], 0);

        // After four pops and `ret`, rsp sits where a call would have left it.
        let entry_rsp = sp + (SAVED_REGISTER_SLOTS as u64 + 1) * 8;
        assert_eq!((entry_rsp + 8) % STACK_ALIGN, 0);
    }

    #[test]
    fn test_single_task_never_switches() {
        let mut scheduler = started();
        assert_eq!(scheduler.prepare_switch(), None);
        assert_eq!(scheduler.current_id(), Some(TaskId(BOOT_TASK_ID)));

        let mut empty = Box::new(Scheduler::new());
        assert_eq!(empty.prepare_switch(), None);
    }

    #[test]
    fn test_round_robin_order() {
        for spawned in [1, 2, 5, MAX_TASKS - 1] {
            let mut scheduler = started();
            for _ in 0..spawned {
                scheduler.spawn(idle_entry).unwrap();
            }

            let total = spawned as u64 + 1;
            let mut expected = 1;
            for _ in 0..total * 2 {
                let plan = scheduler.prepare_switch().unwrap();
                assert_eq!(plan.to, TaskId(expected));
                assert_eq!(scheduler.current_id(), Some(TaskId(expected)));
                assert_eq!(scheduler.task_state(plan.to), Some(TaskState::Running));
                assert_eq!(scheduler.task_state(plan.from), Some(TaskState::Runnable));
                expected = (expected + 1) % total;
            }

            let running = scheduler
                .tasks()
                .iter()
                .filter(|t| t.state() == TaskState::Running)
                .count();
            assert_eq!(running, 1);
        }
    }

    #[test]
    fn test_plan_targets_saved_pointers() {
        let mut scheduler = started();
        let id = scheduler.spawn(idle_entry).unwrap();
        let initial_sp = scheduler.tasks()[1].saved_stack_pointer();

        let plan = scheduler.prepare_switch().unwrap();
        assert_eq!(plan.to, id);
        assert_eq!(plan.next, initial_sp);
        assert_eq!(plan.save, &mut scheduler.tasks[0].saved_sp as *mut u64);
    }

    #[test]
    fn test_waiting_tasks_are_skipped() {
        let mut scheduler = started();
        for _ in 0..3 {
            scheduler.spawn(idle_entry).unwrap();
        }
        scheduler.tasks[1].state = TaskState::Waiting;

        assert_eq!(scheduler.prepare_switch().map(|p| p.to), Some(TaskId(2)));

        scheduler.tasks[0].state = TaskState::Waiting;
        scheduler.tasks[3].state = TaskState::Waiting;
        assert_eq!(scheduler.prepare_switch(), None);
        assert_eq!(scheduler.current_id(), Some(TaskId(2)));
    }

    #[test]
    fn test_reinit_keeps_ids_unique() {
        let mut scheduler = started();
        scheduler.spawn(idle_entry).unwrap();
        scheduler.spawn(idle_entry).unwrap();

        scheduler.init();
        assert_eq!(scheduler.task_count(), 1);
        assert_eq!(scheduler.current_id(), Some(TaskId(BOOT_TASK_ID)));
        assert_eq!(scheduler.spawn(idle_entry), Ok(TaskId(3)));
    }

    // Shared with the tasks started by `test_switch_round_trip`.
    static LIVE_SCHEDULER: AtomicPtr<Scheduler> = AtomicPtr::new(null_mut());
    static RESUMES: AtomicUsize = AtomicUsize::new(0);
    static RESUME_ORDER: [AtomicU64; 16] = [const { AtomicU64::new(u64::MAX) }; 16];

    /// Same as `schedule`, against the scheduler in `LIVE_SCHEDULER`.
    fn yield_live() {
        let scheduler = LIVE_SCHEDULER.load(SeqCst);
        if let Some(plan) = unsafe { (*scheduler).prepare_switch() } {
            unsafe { switch::switch_to(plan.save, plan.next) };
        }
    }

    extern "C" fn recording_entry() -> ! {
        loop {
            let scheduler = LIVE_SCHEDULER.load(SeqCst);
            let id = unsafe { (*scheduler).current_id() }.map_or(u64::MAX, |id| id.0);
            let slot = RESUMES.fetch_add(1, SeqCst);
            if let Some(entry) = RESUME_ORDER.get(slot) {
                entry.store(id, SeqCst);
            }
            yield_live();
        }
    }

    #[test]
    fn test_switch_round_trip() {
        let scheduler = Box::into_raw(started());
        LIVE_SCHEDULER.store(scheduler, SeqCst);
        unsafe {
            (*scheduler).spawn(recording_entry).unwrap();
            (*scheduler).spawn(recording_entry).unwrap();
        }

        let marker = core::hint::black_box(0x5EED_u64);
        for round in 1..=5 {
            // boot -> 1 -> 2 -> boot
            yield_live();
            assert_eq!(
                unsafe { (*scheduler).current_id() },
                Some(TaskId(BOOT_TASK_ID))
            );
            assert_eq!(RESUMES.load(SeqCst), round * 2);
        }
        assert_eq!(marker, 0x5EED);

        let order: Vec<u64> = RESUME_ORDER[..10].iter().map(|e| e.load(SeqCst)).collect();
        assert_eq!(order, [1, 2, 1, 2, 1, 2, 1, 2, 1, 2]);

        // The two tasks are never resumed; their stacks go away with the pool.
        LIVE_SCHEDULER.store(null_mut(), SeqCst);
        drop(unsafe { Box::from_raw(scheduler) });
    }
}
