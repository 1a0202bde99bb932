//! Task scheduler data
//!
//! A deadline-ordered queue of deferred callbacks shared by a fixed set of
//! worker threads.

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub type TaskFn = Box<dyn FnMut() + Send + 'static>;

pub struct ScheduledTask {
    pub deadline: Instant,
    /// Submission order; breaks ties between equal deadlines
    pub seq: u64,
    /// Repeating tasks are re-queued this long after their last deadline
    pub period: Option<Duration>,
    pub cancelled: Arc<AtomicBool>,
    pub task: TaskFn,
}

// Reversed so `BinaryHeap` pops the earliest deadline first
impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for ScheduledTask {}

/// Cancels a scheduled task. Dropping the handle does not cancel it.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub(crate) cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Default)]
pub struct TaskQueue {
    pub tasks: BinaryHeap<ScheduledTask>,
    pub next_seq: u64,
    pub running: bool,
}

/// State shared between the owner and the workers
#[derive(Default)]
pub struct SchedulerShared {
    pub queue: Mutex<TaskQueue>,
    pub wakeup: Condvar,
}

#[derive(Debug, Clone, Copy)]
pub struct TaskSchedulerConfig {
    /// Worker count; 0 means one per logical CPU
    pub thread_count: usize,
}

impl Default for TaskSchedulerConfig {
    fn default() -> Self {
        Self { thread_count: 0 }
    }
}

pub struct TaskScheduler {
    pub(crate) shared: Arc<SchedulerShared>,
    pub(crate) workers: Vec<JoinHandle<()>>,
    pub(crate) thread_count: usize,
}
