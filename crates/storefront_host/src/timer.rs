//! Timer scheduling contract plus logical-clock and polled wall-clock implementations.

use std::{cell::RefCell, fmt, rc::Rc};

use crate::time::{Clock, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Opaque handle identifying one scheduled task.
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Wraps a raw scheduler-assigned id.
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Event-loop timer service. Tasks run later on the same thread; nothing ever blocks.
pub trait Scheduler: Clock {
    /// Runs `task` once after `delay_ms` milliseconds.
    fn schedule(&self, delay_ms: u64, task: Box<dyn FnOnce()>) -> TimerHandle;

    /// Cancels a task that has not run yet. Cancelling a finished task is a no-op.
    fn cancel(&self, handle: TimerHandle);

    /// Runs tasks whose deadline has passed and returns how many ran.
    ///
    /// Only schedulers without an event loop of their own do anything here; the default runs
    /// nothing.
    fn run_due(&self) -> usize {
        0
    }
}

struct QueuedTask {
    id: u64,
    due_at_ms: u64,
    task: Box<dyn FnOnce()>,
}

#[derive(Default)]
struct TaskQueue {
    next_id: u64,
    tasks: Vec<QueuedTask>,
}

impl TaskQueue {
    fn push(&mut self, due_at_ms: u64, task: Box<dyn FnOnce()>) -> TimerHandle {
        self.next_id += 1;
        let id = self.next_id;
        self.tasks.push(QueuedTask {
            id,
            due_at_ms,
            task,
        });
        TimerHandle(id)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.tasks.retain(|task| task.id != handle.0);
    }

    fn take_next_due(&mut self, until_ms: u64) -> Option<QueuedTask> {
        let index = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.due_at_ms <= until_ms)
            .min_by_key(|(_, task)| (task.due_at_ms, task.id))
            .map(|(index, _)| index)?;
        Some(self.tasks.remove(index))
    }
}

#[derive(Default)]
struct ManualState {
    now_ms: u64,
    queue: TaskQueue,
}

impl ManualState {
    fn take_next_due(&mut self, until_ms: u64) -> Option<QueuedTask> {
        let task = self.queue.take_next_due(until_ms)?;
        self.now_ms = self.now_ms.max(task.due_at_ms);
        Some(task)
    }
}

/// Scheduler driven by a logical clock that only moves when [`ManualScheduler::advance`] is called.
///
/// Clones share one clock and one task queue, so several simulated contexts can run on the same
/// timeline.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    inner: Rc<RefCell<ManualState>>,
}

impl ManualScheduler {
    /// Creates a scheduler whose clock starts at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scheduler whose clock starts at `now_ms`.
    pub fn starting_at(now_ms: u64) -> Self {
        let scheduler = Self::default();
        scheduler.inner.borrow_mut().now_ms = now_ms;
        scheduler
    }

    /// Moves the clock forward by `ms`, running every task that falls due on the way.
    ///
    /// Tasks run in deadline order, ties in scheduling order. During a task the clock reads that
    /// task's deadline. Tasks scheduled by a running task also run if they fall due before the
    /// target time. Returns the number of tasks run.
    pub fn advance(&self, ms: u64) -> usize {
        let until_ms = self.inner.borrow().now_ms.saturating_add(ms);
        let mut ran = 0;
        loop {
            let next = self.inner.borrow_mut().take_next_due(until_ms);
            let Some(task) = next else {
                break;
            };
            (task.task)();
            ran += 1;
        }
        self.inner.borrow_mut().now_ms = until_ms;
        ran
    }

    /// Runs tasks that are already due without moving the clock.
    pub fn run_ready(&self) -> usize {
        self.advance(0)
    }

    /// Returns the number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.tasks.len()
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("ManualScheduler")
            .field("now_ms", &state.now_ms)
            .field("pending", &state.queue.tasks.len())
            .finish()
    }
}

impl Clock for ManualScheduler {
    fn now_ms(&self) -> u64 {
        self.inner.borrow().now_ms
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay_ms: u64, task: Box<dyn FnOnce()>) -> TimerHandle {
        let mut state = self.inner.borrow_mut();
        let due_at_ms = state.now_ms.saturating_add(delay_ms);
        state.queue.push(due_at_ms, task)
    }

    fn cancel(&self, handle: TimerHandle) {
        self.inner.borrow_mut().queue.cancel(handle);
    }
}

/// Scheduler on host wall-clock time for hosts that have no event loop to hand timers to.
///
/// Deadlines are measured with [`SystemClock`], so anything that compares timestamps (lock
/// expiry, code expiry) follows real time. Tasks only run when the owner polls
/// [`Scheduler::run_due`]. Clones share one queue.
#[derive(Clone, Default)]
pub struct PolledScheduler {
    clock: SystemClock,
    queue: Rc<RefCell<TaskQueue>>,
}

impl PolledScheduler {
    /// Creates a scheduler with an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.borrow().tasks.len()
    }
}

impl fmt::Debug for PolledScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolledScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

impl Clock for PolledScheduler {
    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

impl Scheduler for PolledScheduler {
    fn schedule(&self, delay_ms: u64, task: Box<dyn FnOnce()>) -> TimerHandle {
        let due_at_ms = self.clock.now_ms().saturating_add(delay_ms);
        self.queue.borrow_mut().push(due_at_ms, task)
    }

    fn cancel(&self, handle: TimerHandle) {
        self.queue.borrow_mut().cancel(handle);
    }

    /// Runs due tasks in deadline order. Tasks they schedule run too if already due.
    fn run_due(&self) -> usize {
        let until_ms = self.clock.now_ms();
        let mut ran = 0;
        loop {
            let next = self.queue.borrow_mut().take_next_due(until_ms);
            let Some(task) = next else {
                break;
            };
            (task.task)();
            ran += 1;
        }
        ran
    }
}
