//! Task scheduler operations
//!
//! Workers sleep on the condition variable until the earliest deadline,
//! run the task with the queue unlocked, and re-queue repeating tasks.

use super::thread_pool_data::{
    ScheduledTask, SchedulerShared, TaskFn, TaskHandle, TaskQueue, TaskScheduler,
    TaskSchedulerConfig,
};
use crate::error::{EngineError, EngineResult};
use parking_lot::MutexGuard;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Create a stopped scheduler. Tasks may be queued before `start_scheduler`.
pub fn create_task_scheduler(config: TaskSchedulerConfig) -> TaskScheduler {
    let thread_count = if config.thread_count == 0 {
        num_cpus::get().max(1)
    } else {
        config.thread_count
    };
    TaskScheduler {
        shared: Arc::new(SchedulerShared::default()),
        workers: Vec::new(),
        thread_count,
    }
}

/// Spawn the worker threads. Starting a running scheduler does nothing.
pub fn start_scheduler(scheduler: &mut TaskScheduler) -> EngineResult<()> {
    {
        let mut queue = scheduler.shared.queue.lock();
        if queue.running {
            return Ok(());
        }
        queue.running = true;
    }

    for worker in 0..scheduler.thread_count {
        let shared = Arc::clone(&scheduler.shared);
        let handle = thread::Builder::new()
            .name(format!("task-worker-{}", worker))
            .spawn(move || worker_loop(shared, worker))
            .map_err(|e| {
                log::error!("[TaskScheduler::start] failed to spawn worker {}: {}", worker, e);
                EngineError::ThreadFailed {
                    name: format!("task-worker-{}", worker),
                    error: e.to_string(),
                }
            });
        match handle {
            Ok(handle) => scheduler.workers.push(handle),
            Err(e) => {
                stop_scheduler(scheduler);
                return Err(e);
            }
        }
    }

    log::info!(
        "[TaskScheduler::start] {} worker threads running",
        scheduler.thread_count
    );
    Ok(())
}

/// Stop the workers and drop every queued task. A task that is already
/// running finishes first.
pub fn stop_scheduler(scheduler: &mut TaskScheduler) {
    {
        let mut queue = scheduler.shared.queue.lock();
        queue.running = false;
        queue.tasks.clear();
    }
    scheduler.shared.wakeup.notify_all();

    let joined = scheduler.workers.len();
    for handle in scheduler.workers.drain(..) {
        if handle.join().is_err() {
            log::warn!("[TaskScheduler::stop] worker exited by panic");
        }
    }
    if joined > 0 {
        log::info!("[TaskScheduler::stop] joined {} workers", joined);
    }
}

pub fn is_scheduler_running(scheduler: &TaskScheduler) -> bool {
    scheduler.shared.queue.lock().running
}

pub fn pending_task_count(scheduler: &TaskScheduler) -> usize {
    scheduler.shared.queue.lock().tasks.len()
}

pub fn worker_count(scheduler: &TaskScheduler) -> usize {
    scheduler.thread_count
}

/// Run `task` once, no earlier than `delay` from now
pub fn schedule_after<F>(scheduler: &TaskScheduler, delay: Duration, task: F) -> TaskHandle
where
    F: FnMut() + Send + 'static,
{
    enqueue(scheduler, Instant::now() + delay, None, Box::new(task))
}

/// Run `task` every `period`, first one period from now, until cancelled
/// or the scheduler stops
pub fn schedule_repeating<F>(scheduler: &TaskScheduler, period: Duration, task: F) -> TaskHandle
where
    F: FnMut() + Send + 'static,
{
    enqueue(scheduler, Instant::now() + period, Some(period), Box::new(task))
}

fn enqueue(
    scheduler: &TaskScheduler,
    deadline: Instant,
    period: Option<Duration>,
    task: TaskFn,
) -> TaskHandle {
    let cancelled = Arc::new(AtomicBool::new(false));
    {
        let mut queue = scheduler.shared.queue.lock();
        let seq = next_seq(&mut queue);
        queue.tasks.push(ScheduledTask {
            deadline,
            seq,
            period,
            cancelled: Arc::clone(&cancelled),
            task,
        });
    }
    scheduler.shared.wakeup.notify_one();
    TaskHandle { cancelled }
}

fn next_seq(queue: &mut TaskQueue) -> u64 {
    let seq = queue.next_seq;
    queue.next_seq += 1;
    seq
}

fn worker_loop(shared: Arc<SchedulerShared>, worker: usize) {
    let mut queue = shared.queue.lock();

    while queue.running {
        let now = Instant::now();
        let deadline = match queue.tasks.peek() {
            Some(task) => task.deadline,
            None => {
                shared.wakeup.wait(&mut queue);
                continue;
            }
        };
        if deadline > now {
            shared.wakeup.wait_until(&mut queue, deadline);
            continue;
        }

        let Some(mut task) = queue.tasks.pop() else {
            continue;
        };
        if task.cancelled.load(Ordering::Acquire) {
            continue;
        }

        let outcome = MutexGuard::unlocked(&mut queue, || {
            panic::catch_unwind(AssertUnwindSafe(|| (task.task)()))
        });
        if outcome.is_err() {
            log::warn!("[TaskScheduler::worker] task panicked on worker {}", worker);
        }

        if let Some(period) = task.period {
            if queue.running && !task.cancelled.load(Ordering::Acquire) {
                // Skip missed periods rather than running back to back
                let now = Instant::now();
                task.deadline += period;
                while task.deadline <= now {
                    task.deadline += period;
                }
                task.seq = next_seq(&mut queue);
                queue.tasks.push(task);
                shared.wakeup.notify_one();
            }
        }
    }

    log::trace!("[TaskScheduler::worker] worker {} exiting", worker);
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            stop_scheduler(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    const WAIT: Duration = Duration::from_secs(5);

    fn running(threads: usize) -> TaskScheduler {
        let mut scheduler = create_task_scheduler(TaskSchedulerConfig {
            thread_count: threads,
        });
        start_scheduler(&mut scheduler).unwrap();
        scheduler
    }

    #[test]
    fn test_default_thread_count() {
        let scheduler = create_task_scheduler(TaskSchedulerConfig::default());
        assert_eq!(worker_count(&scheduler), num_cpus::get().max(1));
        assert!(!is_scheduler_running(&scheduler));
    }

    #[test]
    fn test_one_shot_runs_after_delay() {
        let scheduler = running(2);
        let (tx, rx) = unbounded();
        let start = Instant::now();
        schedule_after(&scheduler, Duration::from_millis(20), move || {
            let _ = tx.send(Instant::now());
        });
        let ran_at = rx.recv_timeout(WAIT).unwrap();
        assert!(ran_at - start >= Duration::from_millis(20));
    }

    #[test]
    fn test_earliest_deadline_runs_first() {
        let mut scheduler = create_task_scheduler(TaskSchedulerConfig { thread_count: 1 });
        let order = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = unbounded();

        for (label, delay) in [(2, 60), (1, 30), (0, 0)] {
            let order = Arc::clone(&order);
            let tx = tx.clone();
            schedule_after(&scheduler, Duration::from_millis(delay), move || {
                order.lock().push(label);
                let _ = tx.send(());
            });
        }
        assert_eq!(pending_task_count(&scheduler), 3);
        start_scheduler(&mut scheduler).unwrap();

        for _ in 0..3 {
            rx.recv_timeout(WAIT).unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_repeating_until_cancelled() {
        let scheduler = running(2);
        let count = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = unbounded();
        let counter = Arc::clone(&count);
        let handle = schedule_repeating(&scheduler, Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(());
        });

        for _ in 0..3 {
            rx.recv_timeout(WAIT).unwrap();
        }
        handle.cancel();
        assert!(handle.is_cancelled());
        // At most one run can be in flight when the cancel lands
        thread::sleep(Duration::from_millis(30));
        let settled = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), settled);
        assert!(settled >= 3);
    }

    #[test]
    fn test_cancelled_task_never_runs() {
        let scheduler = running(1);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let handle = schedule_after(&scheduler, Duration::from_millis(20), move || {
            flag.store(true, Ordering::SeqCst);
        });
        handle.cancel();
        thread::sleep(Duration::from_millis(60));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let scheduler = running(1);
        let (tx, rx) = unbounded();
        schedule_after(&scheduler, Duration::ZERO, || panic!("task failure"));
        schedule_after(&scheduler, Duration::from_millis(10), move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(WAIT).unwrap();
    }

    #[test]
    fn test_stop_drops_queued_tasks() {
        let mut scheduler = running(2);
        schedule_after(&scheduler, Duration::from_secs(60), || {});
        assert_eq!(pending_task_count(&scheduler), 1);

        stop_scheduler(&mut scheduler);
        assert!(!is_scheduler_running(&scheduler));
        assert_eq!(pending_task_count(&scheduler), 0);
        assert!(scheduler.workers.is_empty());
    }
}
