//! Time sources and the single-threaded delayed-task queue that drives
//! handshakes and playback.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::lock_unpoisoned;

/// Monotonic millisecond clock.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Virtual clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(now_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.fetch_max(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Moves time forward by `delta_ms`, stopping at every intermediate due
    /// time so tasks run in order and observe the clock at their due time.
    pub fn run_for(&self, queue: &TaskQueue, delta_ms: u64) -> usize {
        let target = self.now_ms().saturating_add(delta_ms);
        let mut ran = queue.run_due();
        while let Some(due) = queue.next_due_ms() {
            if due > target {
                break;
            }
            self.set(due);
            ran += queue.run_due();
        }
        self.set(target);
        ran + queue.run_due()
    }

    /// Runs until the queue is empty or `limit_ms` of virtual time passed.
    pub fn run_until_idle(&self, queue: &TaskQueue, limit_ms: u64) -> usize {
        let deadline = self.now_ms().saturating_add(limit_ms);
        let mut ran = queue.run_due();
        while let Some(due) = queue.next_due_ms() {
            if due > deadline {
                break;
            }
            self.set(due);
            ran += queue.run_due();
        }
        ran
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

type Task = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct QueueState {
    next_id: u64,
    /// Keyed by (due time, id) so equal due times run in scheduling order.
    tasks: BTreeMap<(u64, TaskId), Task>,
}

/// Delayed tasks run by whoever pumps the queue. Tasks run without the queue
/// lock held and may schedule or cancel other tasks.
pub struct TaskQueue {
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("now_ms", &self.clock.now_ms())
            .field("pending", &self.pending())
            .finish()
    }
}

impl TaskQueue {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn schedule(&self, delay_ms: u64, task: impl FnOnce() + Send + 'static) -> TaskId {
        let due = self.clock.now_ms().saturating_add(delay_ms);
        let mut state = lock_unpoisoned(&self.state);
        state.next_id += 1;
        let id = TaskId(state.next_id);
        state.tasks.insert((due, id), Box::new(task));
        id
    }

    pub fn cancel(&self, id: TaskId) -> bool {
        let mut state = lock_unpoisoned(&self.state);
        let key = state.tasks.keys().find(|(_, task)| *task == id).copied();
        match key {
            Some(key) => state.tasks.remove(&key).is_some(),
            None => false,
        }
    }

    pub fn pending(&self) -> usize {
        lock_unpoisoned(&self.state).tasks.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    pub fn next_due_ms(&self) -> Option<u64> {
        lock_unpoisoned(&self.state)
            .tasks
            .keys()
            .next()
            .map(|(due, _)| *due)
    }

    /// Runs every task due at the current time, including tasks scheduled by
    /// those tasks with no delay.
    pub fn run_due(&self) -> usize {
        let mut ran = 0;
        loop {
            let now = self.clock.now_ms();
            let task = {
                let mut state = lock_unpoisoned(&self.state);
                match state.tasks.first_key_value() {
                    Some(((due, _), _)) if *due <= now => {
                        state.tasks.pop_first().map(|(_, task)| task)
                    }
                    _ => None,
                }
            };
            let Some(task) = task else {
                return ran;
            };
            task();
            ran += 1;
        }
    }

    /// Sleeps on the real thread until the next task is due, then runs due
    /// tasks. Returns false once nothing is pending.
    pub fn run_blocking_once(&self) -> bool {
        let Some(due) = self.next_due_ms() else {
            return false;
        };
        let now = self.clock.now_ms();
        if due > now {
            thread::sleep(Duration::from_millis(due - now));
        }
        self.run_due();
        true
    }
}
