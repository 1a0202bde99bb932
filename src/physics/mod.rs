//! Rigid body physics over signed distance fields
//!
//! Bodies carry an SDF handle and a material; contacts are found by
//! minimising the combined field of each pair and resolved with impulses.

pub mod aabb;
pub mod collision_data;
pub mod collision_operations;
pub mod material;
pub mod matter;
pub mod nelder_mead;
pub mod physics_thread;
pub mod physics_world_data;
pub mod physics_world_operations;

pub use aabb::AABB;
pub use collision_data::{Collision, CollisionStats, ContactRegime, LocalContact};
pub use collision_operations::{bodies_intersect, correct, detect};
pub use material::Material;
pub use matter::{BodyId, DerivedProperties, Matter};
pub use nelder_mead::{box_simplex, minimise, Minimum};
pub use physics_thread::{is_physics_running, start_physics_thread, stop_physics_thread, PhysicsThread};
pub use physics_world_data::{PhysicsConfig, PhysicsWorld, TimestepMode};
pub use physics_world_operations::{
    body_counts, body_snapshot, body_transform, create_physics_world, is_asleep, register_body,
    step, tick_count, unregister_body,
};
