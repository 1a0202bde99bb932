//! Physics World Operations - registration and the per-tick pipeline
//!
//! A tick snapshots the awake and asleep bodies under the lock, runs the
//! narrow phase in parallel outside it, resolves contacts in discovery
//! order, integrates, and writes the results back.

use super::collision_data::{Collision, CollisionStats, ContactRegime};
use super::collision_operations::{correct, detect};
use super::matter::{BodyId, Matter};
use super::physics_world_data::{BodySets, PhysicsConfig, PhysicsWorld};
use crate::constants::physics::CONTACT_SKIN;
use crate::error::EngineResult;
use crate::sdf::SharedSdfArena;
use glam::{DQuat, DVec3};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub fn create_physics_world(
    config: PhysicsConfig,
    arena: SharedSdfArena,
) -> EngineResult<PhysicsWorld> {
    config.validate()?;
    log::info!(
        "[Physics::create] {} Hz, {:?}, gravity {}",
        config.rate_hz,
        config.timestep_mode,
        config.gravity
    );
    Ok(PhysicsWorld {
        config,
        arena,
        bodies: Mutex::new(BodySets::default()),
        tick_count: AtomicU64::new(0),
    })
}

/// Add a body and return its id. Fixed bodies start asleep.
pub fn register_body(world: &PhysicsWorld, mut body: Matter) -> EngineResult<BodyId> {
    body.material.validate()?;

    let mut sets = world.bodies.lock();
    let id = sets.next_id;
    sets.next_id = sets.next_id.wrapping_add(1);
    body.id = id;

    if body.fixed {
        sets.asleep.push(id);
    } else {
        sets.awake.push(id);
    }
    sets.bodies.insert(id, body);

    log::debug!("[Physics::register_body] body {} ({} total)", id, sets.bodies.len());
    Ok(id)
}

/// Remove a body. Returns its last state, or `None` if it was not registered.
pub fn unregister_body(world: &PhysicsWorld, id: BodyId) -> Option<Matter> {
    let mut sets = world.bodies.lock();
    let body = sets.bodies.remove(&id)?;
    sets.awake.retain(|&b| b != id);
    sets.asleep.retain(|&b| b != id);
    log::debug!("[Physics::unregister_body] body {}", id);
    Some(body)
}

/// Copy of a body's current state
pub fn body_snapshot(world: &PhysicsWorld, id: BodyId) -> Option<Matter> {
    world.bodies.lock().bodies.get(&id).cloned()
}

pub fn body_transform(world: &PhysicsWorld, id: BodyId) -> Option<(DVec3, DQuat)> {
    world
        .bodies
        .lock()
        .bodies
        .get(&id)
        .map(|m| (m.position, m.rotation))
}

pub fn is_asleep(world: &PhysicsWorld, id: BodyId) -> bool {
    world.bodies.lock().asleep.contains(&id)
}

/// (awake, asleep)
pub fn body_counts(world: &PhysicsWorld) -> (usize, usize) {
    let sets = world.bodies.lock();
    (sets.awake.len(), sets.asleep.len())
}

pub fn tick_count(world: &PhysicsWorld) -> u64 {
    world.tick_count.load(Ordering::Relaxed)
}

/// Two distinct elements of `bodies`, mutably
fn pair_mut(bodies: &mut [Matter], i: usize, j: usize) -> (&mut Matter, &mut Matter) {
    debug_assert_ne!(i, j);
    if i < j {
        let (head, tail) = bodies.split_at_mut(j);
        (&mut head[i], &mut tail[0])
    } else {
        let (head, tail) = bodies.split_at_mut(i);
        (&mut tail[0], &mut head[j])
    }
}

/// Advance the simulation by `dt` seconds
pub fn step(world: &PhysicsWorld, dt: f64) -> CollisionStats {
    let mut stats = CollisionStats::default();

    // Awake bodies first, then asleep ones
    let (mut bodies, awake_count) = {
        let sets = world.bodies.lock();
        let mut bodies: Vec<Matter> = Vec::with_capacity(sets.bodies.len());
        bodies.extend(sets.awake.iter().filter_map(|id| sets.bodies.get(id).cloned()));
        let awake_count = bodies.len();
        bodies.extend(sets.asleep.iter().filter_map(|id| sets.bodies.get(id).cloned()));
        (bodies, awake_count)
    };

    let arena = world.arena.read();

    // Sample mass properties of newly registered bodies up front
    bodies.par_iter().for_each(|m| {
        m.properties(&arena);
    });

    let gravity = DVec3::new(0.0, -world.config.gravity, 0.0);
    for body in bodies[..awake_count].iter_mut() {
        if body.position.y > world.config.floor_height {
            body.acceleration = gravity;
        } else {
            body.velocity = DVec3::ZERO;
            body.acceleration = DVec3::ZERO;
        }
        body.angular_acceleration = DVec3::ZERO;
    }

    // Every awake pair, and every asleep body against every awake one
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for i in 0..awake_count {
        for j in i + 1..awake_count {
            pairs.push((i, j));
        }
    }
    for i in awake_count..bodies.len() {
        for j in 0..awake_count {
            pairs.push((i, j));
        }
    }

    let narrow_start = Instant::now();
    let detected: Vec<(usize, usize, Collision)> = pairs
        .par_iter()
        .map(|&(i, j)| (i, j, detect(&arena, &bodies[i], &bodies[j])))
        .collect();
    stats.narrow_phase_time_us = narrow_start.elapsed().as_micros() as u64;
    stats.pairs_tested = pairs.len();

    let solver_start = Instant::now();
    let mut woken = vec![false; bodies.len()];
    for (i, j, collision) in detected {
        if collision.fx.is_finite() {
            stats.bounds_overlaps += 1;
        }
        if !collision.is_contact(CONTACT_SKIN) {
            continue;
        }
        if collision.hit {
            stats.hits += 1;
        } else {
            stats.anticipated += 1;
        }

        let (a, b) = pair_mut(&mut bodies, i, j);
        let regime = correct(&arena, &collision, a, b, dt);
        stats.record_regime(regime);

        if regime == ContactRegime::Colliding {
            for index in [i, j] {
                if index >= awake_count && !bodies[index].fixed {
                    woken[index] = true;
                }
            }
        }
    }

    let mut next_awake = Vec::new();
    let mut next_asleep = Vec::new();
    for (index, body) in bodies.iter_mut().enumerate() {
        if index < awake_count || woken[index] {
            if let Some(props) = body.properties(&arena).cloned() {
                body.integrate(&props, dt);
            }
            if body.is_inert() {
                next_asleep.push(body.id);
            } else {
                next_awake.push(body.id);
            }
        } else {
            next_asleep.push(body.id);
        }
    }
    stats.solver_time_us = solver_start.elapsed().as_micros() as u64;
    drop(arena);

    write_back(world, bodies, next_awake, next_asleep);

    let tick = world.tick_count.fetch_add(1, Ordering::Relaxed) + 1;
    log::trace!(
        "[Physics::step] tick {} pairs {} contacts {} colliding {} resting {}",
        tick,
        stats.pairs_tested,
        stats.hits + stats.anticipated,
        stats.colliding,
        stats.resting
    );
    stats
}

/// Store the tick's results. Bodies unregistered during the tick are
/// dropped; bodies registered during it keep their current set.
fn write_back(
    world: &PhysicsWorld,
    bodies: Vec<Matter>,
    next_awake: Vec<BodyId>,
    next_asleep: Vec<BodyId>,
) {
    let simulated: HashSet<BodyId> = bodies.iter().map(|m| m.id).collect();

    let mut sets = world.bodies.lock();
    let BodySets {
        awake,
        asleep,
        bodies: stored,
        ..
    } = &mut *sets;

    let unsimulated = |ids: &[BodyId]| -> Vec<BodyId> {
        ids.iter().copied().filter(|id| !simulated.contains(id)).collect()
    };
    let mut awake_ids = unsimulated(awake.as_slice());
    let mut asleep_ids = unsimulated(asleep.as_slice());

    for body in bodies {
        if let Some(slot) = stored.get_mut(&body.id) {
            *slot = body;
        }
    }
    awake_ids.extend(next_awake.into_iter().filter(|id| stored.contains_key(id)));
    asleep_ids.extend(next_asleep.into_iter().filter(|id| stored.contains_key(id)));

    *awake = awake_ids;
    *asleep = asleep_ids;
}
