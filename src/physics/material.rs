//! Physical material of a rigid body

use crate::error::{EngineError, EngineResult};
use crate::sdf::Colour;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// kg/m^3
    pub density: f64,
    /// Coefficient of restitution, 0 (plastic) to 1 (elastic)
    pub restitution: f64,
    pub static_friction: f64,
    pub dynamic_friction: f64,
    /// Cosmetic only
    pub colour: Colour,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            density: 1000.0,
            restitution: 0.5,
            static_friction: 0.6,
            dynamic_friction: 0.4,
            colour: [200, 200, 200, 255],
        }
    }
}

impl Material {
    pub fn new(density: f64, restitution: f64, static_friction: f64, dynamic_friction: f64) -> Self {
        Self {
            density,
            restitution,
            static_friction,
            dynamic_friction,
            ..Default::default()
        }
    }

    pub fn with_colour(mut self, colour: Colour) -> Self {
        self.colour = colour;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(self.density > 0.0) {
            return Err(EngineError::invalid_config(
                "density",
                self.density,
                "must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(EngineError::invalid_config(
                "restitution",
                self.restitution,
                "must be within [0, 1]",
            ));
        }
        if self.static_friction < 0.0 || self.dynamic_friction < 0.0 {
            return Err(EngineError::invalid_config(
                "friction",
                format!("{}/{}", self.static_friction, self.dynamic_friction),
                "coefficients must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Restitution of a contact between two materials
pub fn combined_restitution(a: &Material, b: &Material) -> f64 {
    a.restitution.max(b.restitution)
}

/// (static, dynamic) friction of a contact between two materials
pub fn combined_friction(a: &Material, b: &Material) -> (f64, f64) {
    (
        a.static_friction.max(b.static_friction),
        a.dynamic_friction.max(b.dynamic_friction),
    )
}
