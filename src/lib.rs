// SDF Engine - implicit-surface rigid body physics with a GPU-streamed octree
//
// Scene geometry is a set of signed distance fields. The physics thread moves
// rigid bodies bounded by those fields; the render path refines a sparse
// voxel octree on demand from GPU requests and uploads only the nodes that
// changed.
//
// Data lives in plain structs; behaviour lives in the *_operations modules.

// Constants module
pub mod constants;

pub mod error;
pub mod math;

// Geometry and rendering data
pub mod gpu;
pub mod octree;
pub mod sdf;
pub mod substance;

// Simulation
pub mod physics;
pub mod thread_pool;

pub use error::{EngineError, EngineResult, OptionExt};
pub use physics::{BodyId, Material, Matter, PhysicsConfig, TimestepMode, AABB};
pub use sdf::{Colour, SdfHandle, Shape};
pub use substance::{Substance, SubstanceId, SubstanceRecord};

use constants::gpu_limits::{
    DEFAULT_WORK_GROUP_COUNT, DEFAULT_WORK_GROUP_SIZE, MAX_BUFFER_BINDING_SIZE, MAX_REQUEST_SLOTS,
};
use constants::octree::{
    DEFAULT_BRICK_CAPACITY, DEFAULT_MIN_LEAF_SIZE, DEFAULT_NODE_CAPACITY, DEFAULT_RENDER_DISTANCE,
};
use constants::physics::{DEFAULT_FLOOR_HEIGHT, DEFAULT_RATE_HZ, GRAVITY, TICK_LOG_INTERVAL};
use glam::{DQuat, DVec3};
use gpu::{BufferAllocator, RequestChannel, RequestFrameStats};
use octree::{BuildMode, OctreeConfig, SparseOctreeData};
use physics::{CollisionStats, PhysicsThread, PhysicsWorld};
use sdf::SharedSdfArena;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thread_pool::{TaskScheduler, TaskSchedulerConfig};

/// Main engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Half edge of the universal cube the octree covers
    pub render_distance: f64,
    /// Raymarching dispatch grid; one request slot per work group
    pub work_group_count: [u32; 2],
    pub work_group_size: u32,
    pub min_leaf_size: f64,
    pub node_capacity: usize,
    pub brick_capacity: u32,
    pub octree_mode: BuildMode,
    pub physics_rate_hz: f64,
    pub timestep_mode: TimestepMode,
    pub gravity: f64,
    pub floor_height: f64,
    /// Task scheduler workers; 0 means one per logical CPU
    pub task_threads: usize,
    /// Seconds between physics tick-rate log lines
    pub tick_log_interval: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            render_distance: DEFAULT_RENDER_DISTANCE,
            work_group_count: DEFAULT_WORK_GROUP_COUNT,
            work_group_size: DEFAULT_WORK_GROUP_SIZE,
            min_leaf_size: DEFAULT_MIN_LEAF_SIZE,
            node_capacity: DEFAULT_NODE_CAPACITY,
            brick_capacity: DEFAULT_BRICK_CAPACITY,
            octree_mode: BuildMode::Lazy,
            physics_rate_hz: DEFAULT_RATE_HZ,
            timestep_mode: TimestepMode::Fixed,
            gravity: GRAVITY,
            floor_height: DEFAULT_FLOOR_HEIGHT,
            task_threads: 0,
            tick_log_interval: TICK_LOG_INTERVAL,
        }
    }
}

impl EngineConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.render_distance > 0.0 && self.render_distance.is_finite()) {
            return Err(EngineError::invalid_config(
                "render_distance",
                self.render_distance,
                "must be positive and finite",
            ));
        }

        let [gx, gy] = self.work_group_count;
        let slots = gx as u64 * gy as u64;
        if slots == 0 || slots > MAX_REQUEST_SLOTS as u64 {
            return Err(EngineError::invalid_config(
                "work_group_count",
                format!("{}x{}", gx, gy),
                format!("must give between 1 and {} request slots", MAX_REQUEST_SLOTS),
            ));
        }
        if self.work_group_size == 0 {
            return Err(EngineError::invalid_config(
                "work_group_size",
                self.work_group_size,
                "must be positive",
            ));
        }

        let octree = self.octree_config();
        octree::validate_octree_config(&octree)?;
        let octree_bytes = octree::octree_buffer_size(&octree);
        if octree_bytes > MAX_BUFFER_BINDING_SIZE {
            return Err(EngineError::invalid_config(
                "node_capacity",
                self.node_capacity,
                format!(
                    "octree buffer of {}MB exceeds the {}MB binding limit",
                    octree_bytes / (1024 * 1024),
                    MAX_BUFFER_BINDING_SIZE / (1024 * 1024)
                ),
            ));
        }

        self.physics_config().validate()?;
        if !(self.tick_log_interval > 0.0 && self.tick_log_interval.is_finite()) {
            return Err(EngineError::invalid_config(
                "tick_log_interval",
                self.tick_log_interval,
                "must be positive and finite",
            ));
        }

        log::info!(
            "[EngineConfig] Validation: render_distance={}, request_slots={}, node_capacity={}, octree_buffer={}KB",
            self.render_distance,
            slots,
            self.node_capacity,
            octree_bytes / 1024
        );
        Ok(())
    }

    pub fn request_slot_count(&self) -> usize {
        self.work_group_count[0] as usize * self.work_group_count[1] as usize
    }

    pub fn octree_config(&self) -> OctreeConfig {
        OctreeConfig {
            half_extent: self.render_distance,
            min_leaf_size: self.min_leaf_size,
            node_capacity: self.node_capacity,
            brick_capacity: self.brick_capacity,
            mode: self.octree_mode,
        }
    }

    pub fn physics_config(&self) -> PhysicsConfig {
        PhysicsConfig {
            rate_hz: self.physics_rate_hz,
            timestep_mode: self.timestep_mode,
            gravity: self.gravity,
            floor_height: self.floor_height,
        }
    }
}

/// Owns every subsystem. The render path calls `handle_requests` once per
/// frame; the physics thread runs independently once started.
pub struct Engine {
    config: EngineConfig,
    arena: SharedSdfArena,
    physics: Arc<PhysicsWorld>,
    physics_thread: Option<PhysicsThread>,
    octree: SparseOctreeData,
    requests: RequestChannel,
    substances: BTreeMap<SubstanceId, Substance>,
    next_substance: SubstanceId,
    tasks: TaskScheduler,
}

impl Engine {
    /// Validate `config`, allocate device buffers through `allocator` and
    /// start the task scheduler. Physics is not started.
    pub fn new(config: EngineConfig, allocator: &dyn BufferAllocator) -> EngineResult<Self> {
        config.validate()?;

        let arena = sdf::create_shared_sdf_arena();
        let mut octree = octree::create_sparse_octree(config.octree_config(), &arena.read(), Vec::new())?;
        let requests =
            gpu::create_request_channel(allocator, config.request_slot_count(), &mut octree)?;
        let physics = Arc::new(physics::create_physics_world(
            config.physics_config(),
            Arc::clone(&arena),
        )?);

        let mut tasks = thread_pool::create_task_scheduler(TaskSchedulerConfig {
            thread_count: config.task_threads,
        });
        thread_pool::start_scheduler(&mut tasks)?;

        log::info!("[Engine::new] engine ready");
        Ok(Self {
            config,
            arena,
            physics,
            physics_thread: None,
            octree,
            requests,
            substances: BTreeMap::new(),
            next_substance: 0,
            tasks,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn arena(&self) -> &SharedSdfArena {
        &self.arena
    }

    pub fn physics(&self) -> &Arc<PhysicsWorld> {
        &self.physics
    }

    pub fn octree(&self) -> &SparseOctreeData {
        &self.octree
    }

    pub fn request_channel(&self) -> &RequestChannel {
        &self.requests
    }

    pub fn task_scheduler(&self) -> &TaskScheduler {
        &self.tasks
    }

    pub fn create_sdf(&self, shape: Shape, colour: Colour) -> EngineResult<SdfHandle> {
        sdf::insert_sdf(&mut self.arena.write(), shape, colour)
    }

    /// Remove a shape. Bodies and substances using it stop colliding and
    /// drop out of the substance records.
    pub fn remove_sdf(&self, handle: SdfHandle) -> bool {
        sdf::remove_sdf(&mut self.arena.write(), handle)
    }

    /// Add a visible shape driven by a new rigid body. The octree is rebuilt
    /// to include it.
    pub fn add_substance(
        &mut self,
        sdf: SdfHandle,
        material: Material,
        position: DVec3,
        rotation: DQuat,
        fixed: bool,
    ) -> EngineResult<SubstanceId> {
        let arena = self.arena.read();
        sdf::require_shape(&arena, sdf)?;

        let body = if fixed {
            Matter::new_fixed(sdf, material, position, rotation)
        } else {
            Matter::new(sdf, material, position, rotation)
        };
        let body = physics::register_body(&self.physics, body)?;

        if !self.octree.sdfs.contains(&sdf) {
            self.octree.sdfs.push(sdf);
            octree::rebuild_octree(&mut self.octree, &arena);
        }

        let id = self.next_substance;
        self.next_substance = self.next_substance.wrapping_add(1);
        self.substances.insert(
            id,
            Substance {
                id,
                sdf,
                body,
                root: 0,
            },
        );

        log::debug!("[Engine::add_substance] substance {} with body {}", id, body);
        Ok(id)
    }

    /// Remove a substance and its body. Returns false if it did not exist.
    pub fn remove_substance(&mut self, id: SubstanceId) -> bool {
        let Some(substance) = self.substances.remove(&id) else {
            return false;
        };
        physics::unregister_body(&self.physics, substance.body);

        let still_used = self.substances.values().any(|s| s.sdf == substance.sdf);
        if !still_used {
            self.octree.sdfs.retain(|&h| h != substance.sdf);
            octree::rebuild_octree(&mut self.octree, &self.arena.read());
        }
        log::debug!("[Engine::remove_substance] substance {}", id);
        true
    }

    pub fn substance(&self, id: SubstanceId) -> Option<&Substance> {
        self.substances.get(&id)
    }

    /// Register a body that is simulated but not drawn
    pub fn register_body(&self, body: Matter) -> EngineResult<BodyId> {
        physics::register_body(&self.physics, body)
    }

    pub fn unregister_body(&self, id: BodyId) -> Option<Matter> {
        physics::unregister_body(&self.physics, id)
    }

    /// Service the GPU's refinement requests. Call exactly once per frame,
    /// after that frame's GPU work has completed.
    pub fn handle_requests(&mut self) -> EngineResult<RequestFrameStats> {
        let arena = self.arena.read();
        gpu::handle_requests(&mut self.requests, &mut self.octree, &arena)
    }

    /// One GPU record per substance whose shape is still alive, in id order
    pub fn substance_records(&self) -> Vec<SubstanceRecord> {
        let arena = self.arena.read();
        self.substances
            .values()
            .filter_map(|substance| {
                let body = physics::body_snapshot(&self.physics, substance.body)?;
                let props = body.properties(&arena)?;
                Some(substance::create_substance_record(
                    substance,
                    body.position,
                    body.rotation,
                    &props.local_bounds,
                ))
            })
            .collect()
    }

    /// Advance physics by `dt` on the calling thread. Meant for headless use
    /// while the physics thread is stopped.
    pub fn step_physics(&self, dt: f64) -> CollisionStats {
        physics::step(&self.physics, dt)
    }

    pub fn start_physics(&mut self) -> EngineResult<()> {
        if self.physics_thread.is_some() {
            return Ok(());
        }
        let thread = physics::start_physics_thread(
            Arc::clone(&self.physics),
            Some(&self.tasks),
            Duration::from_secs_f64(self.config.tick_log_interval),
        )?;
        self.physics_thread = Some(thread);
        Ok(())
    }

    /// Finish the current tick and join the physics thread
    pub fn stop_physics(&mut self) {
        if let Some(mut thread) = self.physics_thread.take() {
            physics::stop_physics_thread(&mut thread);
        }
    }

    pub fn is_physics_running(&self) -> bool {
        self.physics_thread
            .as_ref()
            .map_or(false, physics::is_physics_running)
    }

    /// Stop physics and the task scheduler. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.stop_physics();
        thread_pool::stop_scheduler(&mut self.tasks);
        log::info!("[Engine::shutdown] engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.physics_thread.is_some() || thread_pool::is_scheduler_running(&self.tasks) {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu::{HostAllocator, RequestRecord};

    fn headless() -> Engine {
        let config = EngineConfig {
            task_threads: 1,
            ..Default::default()
        };
        Engine::new(config, &HostAllocator).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
        assert_eq!(
            EngineConfig::default().request_slot_count(),
            (DEFAULT_WORK_GROUP_COUNT[0] * DEFAULT_WORK_GROUP_COUNT[1]) as usize
        );
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        let bad = [
            EngineConfig {
                render_distance: 0.0,
                ..Default::default()
            },
            EngineConfig {
                work_group_count: [0, 10],
                ..Default::default()
            },
            EngineConfig {
                node_capacity: 4,
                ..Default::default()
            },
            EngineConfig {
                node_capacity: 1 << 30,
                ..Default::default()
            },
            EngineConfig {
                physics_rate_hz: -1.0,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(
                config.validate(),
                Err(EngineError::InvalidConfig { .. })
            ));
            assert!(Engine::new(config, &HostAllocator).is_err());
        }
    }

    #[test]
    fn test_sphere_settles_and_records_follow() {
        let mut engine = headless();
        let material = Material::new(700.0, 0.3, 0.5, 0.3);
        let plane = engine
            .create_sdf(
                Shape::Plane {
                    normal: DVec3::Y,
                    offset: 0.0,
                },
                [80, 80, 80, 255],
            )
            .unwrap();
        let sphere = engine
            .create_sdf(Shape::Sphere { radius: 1.0 }, [200, 40, 40, 255])
            .unwrap();

        engine
            .add_substance(plane, material, DVec3::ZERO, DQuat::IDENTITY, true)
            .unwrap();
        let ball = engine
            .add_substance(sphere, material, DVec3::new(0.0, 3.0, 0.0), DQuat::IDENTITY, false)
            .unwrap();
        assert_eq!(engine.octree().sdfs.len(), 2);

        let body = engine.substance(ball).unwrap().body;
        for _ in 0..3000 {
            engine.step_physics(0.01);
            if physics::is_asleep(engine.physics(), body) {
                break;
            }
        }
        assert!(physics::is_asleep(engine.physics(), body));

        let records = engine.substance_records();
        assert_eq!(records.len(), 2);
        let ball_record = records.iter().find(|r| r.id == ball).unwrap();
        assert!((ball_record.centre[1] - 1.0).abs() < 0.05);
        assert!(ball_record.radius > 1.0);
        assert_eq!(ball_record.root, 0);
    }

    #[test]
    fn test_requests_expand_octree() {
        let mut engine = headless();
        let sphere = engine
            .create_sdf(Shape::Sphere { radius: 4.0 }, [255; 4])
            .unwrap();
        engine
            .add_substance(sphere, Material::default(), DVec3::ZERO, DQuat::IDENTITY, true)
            .unwrap();
        let before = engine.octree().nodes.len();

        // The raymarcher asks for a finer node near the surface
        let mut slots = vec![RequestRecord::EMPTY; engine.config().request_slot_count()];
        slots[3] = RequestRecord {
            position: [4.0, 0.0, 0.0],
            depth: 1,
        };
        engine
            .request_channel()
            .request_buffer()
            .copy(bytemuck::cast_slice(&slots), 0)
            .unwrap();

        let stats = engine.handle_requests().unwrap();
        assert_eq!(stats.non_empty, 1);
        assert_eq!(stats.expanded, 1);
        assert_eq!(engine.octree().nodes.len(), before + 8);
        assert!(stats.uploaded_nodes >= 9);

        // Slots were cleared, so the next frame has nothing to do
        let stats = engine.handle_requests().unwrap();
        assert_eq!(stats.non_empty, 0);
    }

    #[test]
    fn test_remove_substance() {
        let mut engine = headless();
        let sphere = engine
            .create_sdf(Shape::Sphere { radius: 1.0 }, [255; 4])
            .unwrap();
        let id = engine
            .add_substance(sphere, Material::default(), DVec3::ZERO, DQuat::IDENTITY, false)
            .unwrap();

        assert!(engine.remove_substance(id));
        assert!(!engine.remove_substance(id));
        assert!(engine.octree().sdfs.is_empty());
        assert!(engine.substance_records().is_empty());
        assert_eq!(physics::body_counts(engine.physics()), (0, 0));
    }

    #[test]
    fn test_add_substance_with_dead_sdf_fails() {
        let mut engine = headless();
        let sphere = engine
            .create_sdf(Shape::Sphere { radius: 1.0 }, [255; 4])
            .unwrap();
        assert!(engine.remove_sdf(sphere));
        let result =
            engine.add_substance(sphere, Material::default(), DVec3::ZERO, DQuat::IDENTITY, false);
        assert!(matches!(result, Err(EngineError::ResourceNotFound { .. })));
    }

    #[test]
    fn test_physics_thread_lifecycle() {
        let mut engine = headless();
        let sphere = engine
            .create_sdf(Shape::Sphere { radius: 1.0 }, [255; 4])
            .unwrap();
        engine
            .add_substance(sphere, Material::default(), DVec3::new(0.0, 10.0, 0.0), DQuat::IDENTITY, false)
            .unwrap();

        engine.start_physics().unwrap();
        assert!(engine.is_physics_running());
        std::thread::sleep(Duration::from_millis(50));
        engine.shutdown();
        assert!(!engine.is_physics_running());
        assert!(physics::tick_count(engine.physics()) > 0);
        engine.shutdown();
    }
}
