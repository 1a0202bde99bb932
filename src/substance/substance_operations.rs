//! Substance Operations - building GPU records from body state

use super::substance_data::{Substance, SubstanceRecord};
use crate::math::pack_quaternion;
use crate::physics::aabb::{aabb_center, aabb_half_extents};
use crate::physics::AABB;
use glam::{DQuat, DVec3};

/// Record for a substance whose body sits at `position` with `rotation`.
/// `local_bounds` are the bounds of its shape in body space.
pub fn create_substance_record(
    substance: &Substance,
    position: DVec3,
    rotation: DQuat,
    local_bounds: &AABB,
) -> SubstanceRecord {
    let centre = position + rotation * aabb_center(local_bounds);
    SubstanceRecord {
        centre: centre.as_vec3().to_array(),
        root: substance.root,
        radius: aabb_half_extents(local_bounds).length() as f32,
        rotation: pack_quaternion(rotation.inverse()),
        id: substance.id,
        _pad: 0,
    }
}
