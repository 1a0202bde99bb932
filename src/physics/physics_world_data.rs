//! Physics World Data - body sets and scheduler configuration

use super::matter::{BodyId, Matter};
use crate::constants::physics::{DEFAULT_FLOOR_HEIGHT, DEFAULT_RATE_HZ, GRAVITY, MAX_ADAPTIVE_DT};
use crate::error::{EngineError, EngineResult};
use crate::sdf::SharedSdfArena;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimestepMode {
    /// Every tick advances by 1 / rate
    Fixed,
    /// Every tick advances by the measured wall time, clamped to `max_dt`
    Adaptive { max_dt: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsConfig {
    pub rate_hz: f64,
    pub timestep_mode: TimestepMode,
    /// Magnitude of gravity along -Y
    pub gravity: f64,
    /// Bodies below this height are treated as permanently settled
    pub floor_height: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            rate_hz: DEFAULT_RATE_HZ,
            timestep_mode: TimestepMode::Fixed,
            gravity: GRAVITY,
            floor_height: DEFAULT_FLOOR_HEIGHT,
        }
    }
}

impl PhysicsConfig {
    pub fn adaptive() -> Self {
        Self {
            timestep_mode: TimestepMode::Adaptive {
                max_dt: MAX_ADAPTIVE_DT,
            },
            ..Default::default()
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(self.rate_hz > 0.0 && self.rate_hz.is_finite()) {
            return Err(EngineError::invalid_config(
                "physics_rate_hz",
                self.rate_hz,
                "must be positive and finite",
            ));
        }
        if let TimestepMode::Adaptive { max_dt } = self.timestep_mode {
            if !(max_dt > 0.0) {
                return Err(EngineError::invalid_config(
                    "max_dt",
                    max_dt,
                    "must be positive",
                ));
            }
        }
        if !self.gravity.is_finite() || !self.floor_height.is_finite() {
            return Err(EngineError::invalid_config(
                "gravity/floor_height",
                format!("{}/{}", self.gravity, self.floor_height),
                "must be finite",
            ));
        }
        Ok(())
    }

    /// Timestep of one fixed tick
    pub fn fixed_dt(&self) -> f64 {
        1.0 / self.rate_hz
    }
}

/// Registered bodies, partitioned by whether they are simulated this tick
#[derive(Debug, Default)]
pub struct BodySets {
    pub awake: Vec<BodyId>,
    pub asleep: Vec<BodyId>,
    pub bodies: HashMap<BodyId, Matter>,
    pub next_id: BodyId,
}

pub struct PhysicsWorld {
    pub config: PhysicsConfig,
    pub arena: SharedSdfArena,
    /// Locked for snapshots, registration and write-back only; never across
    /// the narrow phase
    pub bodies: Mutex<BodySets>,
    pub tick_count: AtomicU64,
}
