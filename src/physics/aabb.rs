/// Data-Oriented Axis-Aligned Bounding Box System
///
/// Pure functions over box data - used for body bounds, the collision
/// search region and SDF bounds capture.
use glam::{DQuat, DVec3};

/// Axis-Aligned Bounding Box - pure data structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    pub min: DVec3,
    pub max: DVec3,
}

impl AABB {
    /// A box containing nothing; encapsulating any point makes it valid
    pub const EMPTY: Self = Self {
        min: DVec3::splat(f64::INFINITY),
        max: DVec3::splat(f64::NEG_INFINITY),
    };
}

/// Create new AABB from min/max points
pub fn create_aabb(min: DVec3, max: DVec3) -> AABB {
    AABB { min, max }
}

/// Create AABB from center point and half extents
pub fn aabb_from_center_half_extents(center: DVec3, half_extents: DVec3) -> AABB {
    AABB {
        min: center - half_extents,
        max: center + half_extents,
    }
}

/// Get center point of AABB
pub fn aabb_center(aabb: &AABB) -> DVec3 {
    (aabb.min + aabb.max) * 0.5
}

/// Get half extents of AABB
pub fn aabb_half_extents(aabb: &AABB) -> DVec3 {
    (aabb.max - aabb.min) * 0.5
}

/// A box is valid when min <= max on every axis
pub fn aabb_is_valid(aabb: &AABB) -> bool {
    aabb.min.cmple(aabb.max).all()
}

/// Test if two AABBs intersect
pub fn aabb_intersects(aabb1: &AABB, aabb2: &AABB) -> bool {
    aabb1.min.x <= aabb2.max.x
        && aabb1.max.x >= aabb2.min.x
        && aabb1.min.y <= aabb2.max.y
        && aabb1.max.y >= aabb2.min.y
        && aabb1.min.z <= aabb2.max.z
        && aabb1.max.z >= aabb2.min.z
}

/// Overlap region of two boxes, `None` when they are disjoint
pub fn aabb_intersection(aabb1: &AABB, aabb2: &AABB) -> Option<AABB> {
    let overlap = AABB {
        min: aabb1.min.max(aabb2.min),
        max: aabb1.max.min(aabb2.max),
    };
    aabb_is_valid(&overlap).then_some(overlap)
}

/// Smallest box containing both
pub fn aabb_union(aabb1: &AABB, aabb2: &AABB) -> AABB {
    AABB {
        min: aabb1.min.min(aabb2.min),
        max: aabb1.max.max(aabb2.max),
    }
}

/// Test if AABB contains a point
pub fn aabb_contains_point(aabb: &AABB, point: DVec3) -> bool {
    point.cmpge(aabb.min).all() && point.cmple(aabb.max).all()
}

/// Grow the box to contain a point
pub fn aabb_encapsulate_point(aabb: &mut AABB, point: DVec3) {
    aabb.min = aabb.min.min(point);
    aabb.max = aabb.max.max(point);
}

/// Grow the box to contain a sphere
pub fn aabb_encapsulate_sphere(aabb: &mut AABB, center: DVec3, radius: f64) {
    let r = DVec3::splat(radius.abs());
    aabb.min = aabb.min.min(center - r);
    aabb.max = aabb.max.max(center + r);
}

/// Vertex `i` (0..8); bit 0 selects max x, bit 1 max y, bit 2 max z
pub fn aabb_vertex(aabb: &AABB, i: u8) -> DVec3 {
    crate::math::box_vertex(aabb.min, aabb.max, i)
}

/// Create translated copy of AABB
pub fn aabb_translated(aabb: &AABB, offset: DVec3) -> AABB {
    AABB {
        min: aabb.min + offset,
        max: aabb.max + offset,
    }
}

/// Conservative world-space box of a local-space box under a rigid transform
pub fn aabb_transformed(aabb: &AABB, rotation: DQuat, translation: DVec3) -> AABB {
    let mut result = AABB::EMPTY;
    for i in 0..8 {
        aabb_encapsulate_point(&mut result, rotation * aabb_vertex(aabb, i) + translation);
    }
    result
}

/// Volume of the box (zero for invalid boxes)
pub fn aabb_volume(aabb: &AABB) -> f64 {
    if !aabb_is_valid(aabb) {
        return 0.0;
    }
    let size = aabb.max - aabb.min;
    size.x * size.y * size.z
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection_of_disjoint_boxes() {
        let a = create_aabb(DVec3::ZERO, DVec3::ONE);
        let b = create_aabb(DVec3::splat(2.0), DVec3::splat(3.0));
        assert!(!aabb_intersects(&a, &b));
        assert!(aabb_intersection(&a, &b).is_none());
    }

    #[test]
    fn test_intersection_overlap() {
        let a = create_aabb(DVec3::ZERO, DVec3::splat(2.0));
        let b = create_aabb(DVec3::ONE, DVec3::splat(3.0));
        let overlap = aabb_intersection(&a, &b).expect("boxes overlap");
        assert_eq!(overlap.min, DVec3::ONE);
        assert_eq!(overlap.max, DVec3::splat(2.0));
    }

    #[test]
    fn test_empty_box_encapsulation() {
        let mut b = AABB::EMPTY;
        assert!(!aabb_is_valid(&b));
        aabb_encapsulate_sphere(&mut b, DVec3::ZERO, 1.0);
        assert_eq!(b.min, DVec3::splat(-1.0));
        assert_eq!(b.max, DVec3::ONE);
    }

    #[test]
    fn test_transformed_box_contains_rotated_corners() {
        let b = create_aabb(DVec3::splat(-1.0), DVec3::ONE);
        let rotation = DQuat::from_rotation_z(std::f64::consts::FRAC_PI_4);
        let world = aabb_transformed(&b, rotation, DVec3::X * 5.0);
        for i in 0..8 {
            let p = rotation * aabb_vertex(&b, i) + DVec3::X * 5.0;
            assert!(aabb_contains_point(&world, p));
        }
    }
}
