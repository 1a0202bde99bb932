//! Dedicated physics thread
//!
//! Ticks the world at its configured rate using sleep-until deadlines. The
//! quit flag is checked once per tick, so stopping always finishes the
//! current tick before the join returns.

use super::physics_world_data::{PhysicsWorld, TimestepMode};
use super::physics_world_operations::{step, tick_count};
use crate::error::{EngineError, EngineResult};
use crate::thread_pool::{schedule_repeating, TaskHandle, TaskScheduler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub struct PhysicsThread {
    quit: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    rate_log: Option<TaskHandle>,
}

/// Spawn the physics thread. With a scheduler, the measured tick rate is
/// logged every `log_interval`.
pub fn start_physics_thread(
    world: Arc<PhysicsWorld>,
    scheduler: Option<&TaskScheduler>,
    log_interval: Duration,
) -> EngineResult<PhysicsThread> {
    let quit = Arc::new(AtomicBool::new(false));

    let handle = {
        let world = Arc::clone(&world);
        let quit = Arc::clone(&quit);
        thread::Builder::new()
            .name("physics".to_string())
            .spawn(move || run(&world, &quit))
            .map_err(|e| {
                log::error!("[Physics::start] failed to spawn thread: {}", e);
                EngineError::ThreadFailed {
                    name: "physics".to_string(),
                    error: e.to_string(),
                }
            })?
    };

    let rate_log = scheduler.map(|scheduler| {
        let mut last = (tick_count(&world), Instant::now());
        schedule_repeating(scheduler, log_interval, move || {
            let now = (tick_count(&world), Instant::now());
            let elapsed = (now.1 - last.1).as_secs_f64();
            if elapsed > 0.0 {
                log::info!(
                    "[Physics::run] {:.1} ticks/s",
                    (now.0 - last.0) as f64 / elapsed
                );
            }
            last = now;
        })
    });

    log::info!("[Physics::start] physics thread running");
    Ok(PhysicsThread {
        quit,
        handle: Some(handle),
        rate_log,
    })
}

fn run(world: &PhysicsWorld, quit: &AtomicBool) {
    let period = Duration::from_secs_f64(world.config.fixed_dt());
    let mut deadline = Instant::now();
    let mut previous = deadline.checked_sub(period).unwrap_or(deadline);

    while !quit.load(Ordering::Acquire) {
        let now = Instant::now();
        let dt = match world.config.timestep_mode {
            TimestepMode::Fixed => world.config.fixed_dt(),
            TimestepMode::Adaptive { max_dt } => (now - previous).as_secs_f64().min(max_dt),
        };
        previous = now;

        if dt > 0.0 {
            step(world, dt);
        }

        deadline += period;
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        } else {
            // Behind schedule: start the next tick now instead of bursting
            deadline = now;
        }
    }
}

/// Signal the thread, wait for its current tick to finish and join it
pub fn stop_physics_thread(thread: &mut PhysicsThread) {
    if let Some(task) = thread.rate_log.take() {
        task.cancel();
    }
    thread.quit.store(true, Ordering::Release);
    if let Some(handle) = thread.handle.take() {
        if handle.join().is_err() {
            log::warn!("[Physics::stop] physics thread exited by panic");
        } else {
            log::info!("[Physics::stop] physics thread joined");
        }
    }
}

pub fn is_physics_running(thread: &PhysicsThread) -> bool {
    thread.handle.is_some()
}

impl Drop for PhysicsThread {
    fn drop(&mut self) {
        stop_physics_thread(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::material::Material;
    use crate::physics::matter::Matter;
    use crate::physics::physics_world_data::PhysicsConfig;
    use crate::physics::physics_world_operations::{
        body_snapshot, create_physics_world, is_asleep, register_body, unregister_body,
    };
    use crate::sdf::{create_shared_sdf_arena, insert_sdf, Shape};
    use crate::thread_pool::{create_task_scheduler, start_scheduler, TaskSchedulerConfig};
    use glam::{DQuat, DVec3};

    fn falling_world(config: PhysicsConfig) -> (Arc<PhysicsWorld>, u32) {
        let arena = create_shared_sdf_arena();
        let sphere = insert_sdf(&mut arena.write(), Shape::Sphere { radius: 1.0 }, [255; 4]).unwrap();
        let world = Arc::new(create_physics_world(config, arena).unwrap());
        let id = register_body(
            &world,
            Matter::new(sphere, Material::default(), DVec3::new(0.0, 50.0, 0.0), DQuat::IDENTITY),
        )
        .unwrap();
        (world, id)
    }

    #[test]
    fn test_thread_ticks_and_stops() {
        let (world, id) = falling_world(PhysicsConfig::default());
        let mut physics = start_physics_thread(Arc::clone(&world), None, Duration::from_secs(1)).unwrap();
        assert!(is_physics_running(&physics));

        thread::sleep(Duration::from_millis(100));
        stop_physics_thread(&mut physics);
        assert!(!is_physics_running(&physics));

        let ticks = tick_count(&world);
        assert!(ticks > 0);
        assert!(body_snapshot(&world, id).unwrap().position.y < 50.0);

        // No further ticks after the join
        thread::sleep(Duration::from_millis(30));
        assert_eq!(tick_count(&world), ticks);
    }

    #[test]
    fn test_registry_changes_while_ticking() {
        let config = PhysicsConfig {
            rate_hz: 1000.0,
            ..Default::default()
        };
        let (world, first) = falling_world(config);
        let sphere = body_snapshot(&world, first).unwrap().sdf;
        let mut physics = start_physics_thread(Arc::clone(&world), None, Duration::from_secs(1)).unwrap();

        let mut live = vec![first];
        let mut removed = Vec::new();
        for i in 0..200 {
            let position = DVec3::new(3.0 * i as f64, 50.0, 0.0);
            let id = register_body(
                &world,
                Matter::new(sphere, Material::default(), position, DQuat::IDENTITY),
            )
            .unwrap();
            live.push(id);
            if i % 2 == 0 {
                let gone = live.remove(0);
                assert!(unregister_body(&world, gone).is_some());
                removed.push(gone);
            }
            if i % 10 == 0 {
                thread::sleep(Duration::from_millis(1));
            }
            for &gone in &removed {
                assert!(body_snapshot(&world, gone).is_none());
            }
        }
        thread::sleep(Duration::from_millis(20));
        stop_physics_thread(&mut physics);
        assert!(tick_count(&world) > 0);

        for &gone in &removed {
            assert!(body_snapshot(&world, gone).is_none());
            assert!(!is_asleep(&world, gone));
        }
        let sets = world.bodies.lock();
        assert_eq!(sets.bodies.len(), live.len());
        assert_eq!(sets.awake.len() + sets.asleep.len(), live.len());
        for id in &live {
            let listed = sets.awake.iter().chain(&sets.asleep).filter(|&b| b == id).count();
            assert_eq!(listed, 1, "body {} listed {} times", id, listed);
        }
    }

    #[test]
    fn test_adaptive_mode_runs() {
        let (world, _) = falling_world(PhysicsConfig::adaptive());
        let mut scheduler = create_task_scheduler(TaskSchedulerConfig { thread_count: 1 });
        start_scheduler(&mut scheduler).unwrap();

        let mut physics =
            start_physics_thread(Arc::clone(&world), Some(&scheduler), Duration::from_millis(20))
                .unwrap();
        thread::sleep(Duration::from_millis(80));
        stop_physics_thread(&mut physics);
        assert!(tick_count(&world) > 0);
    }
}
