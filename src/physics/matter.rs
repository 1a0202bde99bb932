//! Rigid bodies bounded by a signed distance field
//!
//! A body's shape lives in local space; `position` places the local origin
//! and `rotation` orients it. Mass properties are sampled from the shape the
//! first time they are needed and shared by every clone of the body.

use super::aabb::{aabb_transformed, AABB};
use super::material::Material;
use crate::constants::physics::{
    ANGULAR_DAMPING, LINEAR_DAMPING, MASS_SAMPLES_PER_AXIS, SLEEP_ACCELERATION,
    SLEEP_ANGULAR_SPEED, SLEEP_DURATION, SLEEP_LINEAR_SPEED,
};
use crate::constants::sdf::DEFAULT_BOUNDS_EXTENT;
use crate::math::outer;
use crate::sdf::{capture_bounds, phi, SdfArena, SdfHandle};
use glam::{DMat3, DQuat, DVec3};
use rayon::prelude::*;
use std::sync::{Arc, OnceLock};

pub type BodyId = u32;

/// Mass properties sampled from the shape
#[derive(Debug, Clone)]
pub struct DerivedProperties {
    /// Average density over the sampled interior
    pub density: f64,
    pub mass: f64,
    pub inverse_mass: f64,
    /// Local space
    pub centre_of_mass: DVec3,
    /// About the centre of mass, local axes
    pub inertia: DMat3,
    pub inverse_inertia: DMat3,
    /// Conservative local-space bounds of the shape
    pub local_bounds: AABB,
}

#[derive(Debug, Clone)]
pub struct Matter {
    pub id: BodyId,
    pub sdf: SdfHandle,
    pub material: Material,
    /// Fixed bodies have infinite mass and never move
    pub fixed: bool,

    pub position: DVec3,
    pub rotation: DQuat,
    pub velocity: DVec3,
    pub angular_velocity: DVec3,
    pub acceleration: DVec3,
    pub angular_acceleration: DVec3,

    /// Seconds spent continuously below the sleep thresholds
    pub inert_time: f64,

    derived: Arc<OnceLock<DerivedProperties>>,
}

impl Matter {
    pub fn new(sdf: SdfHandle, material: Material, position: DVec3, rotation: DQuat) -> Self {
        Self {
            id: 0,
            sdf,
            material,
            fixed: false,
            position,
            rotation: rotation.normalize(),
            velocity: DVec3::ZERO,
            angular_velocity: DVec3::ZERO,
            acceleration: DVec3::ZERO,
            angular_acceleration: DVec3::ZERO,
            inert_time: 0.0,
            derived: Arc::new(OnceLock::new()),
        }
    }

    /// An immovable body
    pub fn new_fixed(sdf: SdfHandle, material: Material, position: DVec3, rotation: DQuat) -> Self {
        Self {
            fixed: true,
            ..Self::new(sdf, material, position, rotation)
        }
    }

    /// Mass properties, sampled on first use. `None` if the shape has
    /// expired or has no interior inside the bounds search region.
    pub fn properties(&self, arena: &SdfArena) -> Option<&DerivedProperties> {
        if let Some(props) = self.derived.get() {
            return Some(props);
        }
        let props = compute_properties(arena, self.sdf, &self.material, self.fixed)?;
        // A concurrent clone may have won the race; either value is identical
        let _ = self.derived.set(props);
        self.derived.get()
    }

    /// Mass properties if they have already been sampled
    pub fn cached_properties(&self) -> Option<&DerivedProperties> {
        self.derived.get()
    }

    pub fn to_local(&self, x: DVec3) -> DVec3 {
        self.rotation.inverse() * (x - self.position)
    }

    pub fn to_world(&self, x: DVec3) -> DVec3 {
        self.rotation * x + self.position
    }

    pub fn world_centre_of_mass(&self, props: &DerivedProperties) -> DVec3 {
        self.to_world(props.centre_of_mass)
    }

    pub fn world_bounds(&self, props: &DerivedProperties) -> AABB {
        aabb_transformed(&props.local_bounds, self.rotation, self.position)
    }

    /// Inverse inertia tensor in world axes
    pub fn world_inverse_inertia(&self, props: &DerivedProperties) -> DMat3 {
        let r = DMat3::from_quat(self.rotation);
        r * props.inverse_inertia * r.transpose()
    }

    /// Velocity of the material point currently at world position `x`
    pub fn velocity_at(&self, props: &DerivedProperties, x: DVec3) -> DVec3 {
        self.velocity + self.angular_velocity.cross(x - self.world_centre_of_mass(props))
    }

    /// World-space distance to this body's surface
    pub fn phi(&self, arena: &SdfArena, x: DVec3) -> Option<f64> {
        phi(arena, self.sdf, self.to_local(x))
    }

    pub fn translate(&mut self, offset: DVec3) {
        if !self.fixed {
            self.position += offset;
        }
    }

    /// Apply `impulse` at world point `x`
    pub fn apply_impulse(&mut self, props: &DerivedProperties, impulse: DVec3, x: DVec3) {
        if self.fixed {
            return;
        }
        let r = x - self.world_centre_of_mass(props);
        self.velocity += impulse * props.inverse_mass;
        self.angular_velocity += self.world_inverse_inertia(props) * r.cross(impulse);
    }

    /// Semi-implicit Euler step with damping. Rotation is about the centre
    /// of mass.
    pub fn integrate(&mut self, props: &DerivedProperties, dt: f64) {
        if self.fixed {
            self.velocity = DVec3::ZERO;
            self.angular_velocity = DVec3::ZERO;
            return;
        }

        self.velocity += self.acceleration * dt;
        self.velocity *= (1.0 - LINEAR_DAMPING * dt).max(0.0);
        self.angular_velocity += self.angular_acceleration * dt;
        self.angular_velocity *= (1.0 - ANGULAR_DAMPING * dt).max(0.0);

        let centre = self.world_centre_of_mass(props) + self.velocity * dt;
        let spin = DQuat::from_scaled_axis(self.angular_velocity * dt);
        self.rotation = (spin * self.rotation).normalize();
        self.position = centre - self.rotation * props.centre_of_mass;

        let settled = self.velocity.length() < SLEEP_LINEAR_SPEED
            && self.angular_velocity.length() < SLEEP_ANGULAR_SPEED
            && self.acceleration.length() < SLEEP_ACCELERATION;
        self.inert_time = if settled { self.inert_time + dt } else { 0.0 };
    }

    /// Has the body stayed still long enough to sleep
    pub fn is_inert(&self) -> bool {
        self.fixed || self.inert_time >= SLEEP_DURATION
    }

    pub fn wake(&mut self) {
        self.inert_time = 0.0;
    }

    pub fn momentum(&self, props: &DerivedProperties) -> DVec3 {
        if self.fixed {
            DVec3::ZERO
        } else {
            self.velocity * props.mass
        }
    }
}

/// Running sums for mass property sampling
#[derive(Clone, Copy)]
struct MassSums {
    mass: f64,
    moment: DVec3,
    /// Inertia about the local origin
    inertia: DMat3,
}

impl MassSums {
    const ZERO: Self = Self {
        mass: 0.0,
        moment: DVec3::ZERO,
        inertia: DMat3::ZERO,
    };

    fn add(self, other: Self) -> Self {
        Self {
            mass: self.mass + other.mass,
            moment: self.moment + other.moment,
            inertia: self.inertia + other.inertia,
        }
    }
}

/// Point-mass inertia about the origin
fn point_inertia(x: DVec3, mass: f64) -> DMat3 {
    (DMat3::IDENTITY * x.length_squared() - outer(x, x)) * mass
}

/// Sample mass properties on a regular grid over the shape's local bounds
pub fn compute_properties(
    arena: &SdfArena,
    sdf: SdfHandle,
    material: &Material,
    fixed: bool,
) -> Option<DerivedProperties> {
    let bounds = capture_bounds(arena, sdf, DEFAULT_BOUNDS_EXTENT)?;
    let n = MASS_SAMPLES_PER_AXIS;
    let cell = (bounds.max - bounds.min) / n as f64;
    let cell_mass = material.density * cell.x * cell.y * cell.z;
    // Inertia of one solid cell about its own centre
    let cell_inertia = DMat3::from_diagonal(DVec3::new(
        cell.y * cell.y + cell.z * cell.z,
        cell.x * cell.x + cell.z * cell.z,
        cell.x * cell.x + cell.y * cell.y,
    )) * (cell_mass / 12.0);

    let sums = (0..n * n * n)
        .into_par_iter()
        .filter_map(|i| {
            let index = DVec3::new((i % n) as f64, ((i / n) % n) as f64, (i / (n * n)) as f64);
            let x = bounds.min + (index + 0.5) * cell;
            (phi(arena, sdf, x)? < 0.0).then(|| MassSums {
                mass: cell_mass,
                moment: x * cell_mass,
                inertia: point_inertia(x, cell_mass) + cell_inertia,
            })
        })
        .reduce(|| MassSums::ZERO, MassSums::add);

    if sums.mass <= 0.0 {
        log::warn!(
            "[Matter::compute_properties] shape {}:{} has no sampled interior",
            sdf.index,
            sdf.generation
        );
        return None;
    }

    let centre_of_mass = sums.moment / sums.mass;
    // Parallel axis theorem: shift from the origin to the centre of mass
    let inertia = sums.inertia - point_inertia(centre_of_mass, sums.mass);

    let (inverse_mass, inverse_inertia) = if fixed {
        (0.0, DMat3::ZERO)
    } else {
        assert!(
            inertia.determinant().abs() > f64::MIN_POSITIVE,
            "singular inertia tensor for shape {}:{}",
            sdf.index,
            sdf.generation
        );
        (1.0 / sums.mass, inertia.inverse())
    };

    let volume = sums.mass / material.density;
    log::trace!(
        "[Matter::compute_properties] mass {:.3} volume {:.3} com {}",
        sums.mass,
        volume,
        centre_of_mass
    );

    Some(DerivedProperties {
        density: sums.mass / volume,
        mass: sums.mass,
        inverse_mass,
        centre_of_mass,
        inertia,
        inverse_inertia,
        local_bounds: bounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::physics::GRAVITY;
    use crate::sdf::{create_sdf_arena, insert_sdf, remove_sdf, Shape};
    use std::f64::consts::PI;

    fn sphere_body(arena: &mut SdfArena, radius: f64, offset: DVec3) -> Matter {
        let sphere = insert_sdf(arena, Shape::Sphere { radius }, [255; 4]).unwrap();
        let shape = insert_sdf(
            arena,
            Shape::Transform {
                child: sphere,
                translation: offset,
                rotation: DQuat::IDENTITY,
            },
            [255; 4],
        )
        .unwrap();
        Matter::new(shape, Material::new(700.0, 0.3, 0.5, 0.3), DVec3::ZERO, DQuat::IDENTITY)
    }

    #[test]
    fn test_sphere_mass_properties() {
        let mut arena = create_sdf_arena();
        let body = sphere_body(&mut arena, 1.0, DVec3::new(0.5, 0.0, 0.0));
        let props = body.properties(&arena).unwrap();

        let expected_mass = 700.0 * 4.0 / 3.0 * PI;
        assert!((props.mass - expected_mass).abs() / expected_mass < 0.1);
        assert!((props.centre_of_mass - DVec3::new(0.5, 0.0, 0.0)).length() < 0.05);

        // Solid sphere: I = 2/5 m r^2 on every axis
        let expected_i = 0.4 * props.mass;
        for axis in 0..3 {
            let i = props.inertia.col(axis)[axis];
            assert!((i - expected_i).abs() / expected_i < 0.15);
        }
        assert!((props.density - 700.0).abs() < 1e-6);
    }

    #[test]
    fn test_properties_are_shared_between_clones() {
        let mut arena = create_sdf_arena();
        let body = sphere_body(&mut arena, 1.0, DVec3::ZERO);
        let clone = body.clone();
        assert!(body.cached_properties().is_none());
        clone.properties(&arena).unwrap();
        assert!(body.cached_properties().is_some());
    }

    #[test]
    fn test_expired_shape_has_no_properties() {
        let mut arena = create_sdf_arena();
        let body = sphere_body(&mut arena, 1.0, DVec3::ZERO);
        remove_sdf(&mut arena, body.sdf);
        assert!(body.properties(&arena).is_none());
    }

    #[test]
    fn test_free_fall_integration() {
        let mut arena = create_sdf_arena();
        let mut body = sphere_body(&mut arena, 1.0, DVec3::ZERO);
        let props = body.properties(&arena).unwrap().clone();

        body.acceleration = DVec3::new(0.0, -GRAVITY, 0.0);
        for _ in 0..100 {
            body.integrate(&props, 0.01);
        }
        // Damping makes the body fall slightly less than an undamped one
        assert!(body.position.y < -4.5 && body.position.y > -4.95);
        assert!(!body.is_inert());
    }

    #[test]
    fn test_rotation_about_centre_of_mass() {
        let mut arena = create_sdf_arena();
        let mut body = sphere_body(&mut arena, 1.0, DVec3::new(2.0, 0.0, 0.0));
        let props = body.properties(&arena).unwrap().clone();
        let centre = body.world_centre_of_mass(&props);

        body.angular_velocity = DVec3::new(0.0, 3.0, 0.0);
        body.integrate(&props, 0.1);
        assert!((body.world_centre_of_mass(&props) - centre).length() < 1e-9);
        assert!(body.rotation.angle_between(DQuat::IDENTITY) > 0.1);
    }

    #[test]
    fn test_inert_after_sustained_rest() {
        let mut arena = create_sdf_arena();
        let mut body = sphere_body(&mut arena, 1.0, DVec3::ZERO);
        let props = body.properties(&arena).unwrap().clone();

        for _ in 0..49 {
            body.integrate(&props, 0.01);
        }
        assert!(!body.is_inert());
        body.integrate(&props, 0.01);
        body.integrate(&props, 0.01);
        assert!(body.is_inert());

        body.wake();
        assert!(!body.is_inert());
    }

    #[test]
    fn test_fixed_body_ignores_impulses() {
        let mut arena = create_sdf_arena();
        let sphere = insert_sdf(&mut arena, Shape::Sphere { radius: 1.0 }, [255; 4]).unwrap();
        let mut body = Matter::new_fixed(sphere, Material::default(), DVec3::ZERO, DQuat::IDENTITY);
        let props = body.properties(&arena).unwrap().clone();

        assert_eq!(props.inverse_mass, 0.0);
        body.apply_impulse(&props, DVec3::X * 100.0, DVec3::Y);
        body.translate(DVec3::ONE);
        assert_eq!(body.velocity, DVec3::ZERO);
        assert_eq!(body.position, DVec3::ZERO);
        assert!(body.is_inert());
    }
}
