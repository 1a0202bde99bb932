//! Deferred task scheduler
//!
//! An explicit object owned by the engine rather than a process-wide pool.
//! Components that need delayed or periodic callbacks receive a reference.

pub mod thread_pool_data;
pub mod thread_pool_operations;

pub use thread_pool_data::{TaskHandle, TaskScheduler, TaskSchedulerConfig};
pub use thread_pool_operations::{
    create_task_scheduler, is_scheduler_running, pending_task_count, schedule_after,
    schedule_repeating, start_scheduler, stop_scheduler, worker_count,
};
