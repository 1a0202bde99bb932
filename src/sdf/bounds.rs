//! Conservative bounds capture for implicit shapes
//!
//! The region is subdivided recursively. Cells far enough outside are
//! dropped, cells provably inside contribute their inscribed-distance sphere,
//! and ambiguous cells at the finest level are kept whole. Passes repeat
//! inside the previous result until the box stops shrinking. Later passes
//! search flat boxes, so a flat finest-level cell is split along its long
//! edges until it is roughly cubic before being kept.

use super::sdf_data::{SdfArena, SdfHandle};
use super::sdf_operations::phi;
use crate::constants::physics::EPSILON;
use crate::constants::sdf::{
    BOUNDS_ANISOTROPY, BOUNDS_DEPTH, BOUNDS_PASSES, BOUNDS_RESHAPE_SPLITS,
};
use crate::physics::aabb::{
    aabb_center, aabb_encapsulate_point, aabb_encapsulate_sphere, aabb_half_extents,
    aabb_intersection, aabb_is_valid, aabb_vertex, aabb_volume, create_aabb, AABB,
};
use glam::{BVec3, DVec3};

/// Local-space bounds of a live shape within the cube of half-edge `extent`
/// about the origin. `None` if the handle expired or the shape has no
/// interior inside the region.
pub fn capture_bounds(arena: &SdfArena, handle: SdfHandle, extent: f64) -> Option<AABB> {
    phi(arena, handle, DVec3::ZERO)?;
    let region = create_aabb(DVec3::splat(-extent), DVec3::splat(extent));
    capture_field_bounds(
        |x| phi(arena, handle, x).unwrap_or(f64::INFINITY),
        region,
    )
}

/// Bounds capture over an arbitrary 1-Lipschitz field
pub fn capture_field_bounds<F: Fn(DVec3) -> f64>(field: F, region: AABB) -> Option<AABB> {
    let mut current = single_pass(&field, &region)?;

    for pass in 1..BOUNDS_PASSES {
        let refined = match single_pass(&field, &current) {
            Some(r) => r,
            None => break,
        };
        let shrinking = aabb_volume(&refined) < aabb_volume(&current) * (1.0 - EPSILON);
        current = refined;
        if !shrinking {
            log::trace!("[bounds::capture] converged after {} passes", pass + 1);
            break;
        }
    }

    Some(current)
}

fn single_pass<F: Fn(DVec3) -> f64>(field: &F, region: &AABB) -> Option<AABB> {
    let mut bounds = AABB::EMPTY;
    capture_cell(field, region, BOUNDS_DEPTH, BOUNDS_RESHAPE_SPLITS, &mut bounds);
    if !aabb_is_valid(&bounds) {
        return None;
    }
    // Interior spheres may poke outside the search region
    aabb_intersection(&bounds, region)
}

fn capture_cell<F: Fn(DVec3) -> f64>(
    field: &F,
    cell: &AABB,
    depth: u32,
    reshapes: u32,
    bounds: &mut AABB,
) {
    let centre = aabb_center(cell);
    let half = aabb_half_extents(cell);
    let half_diagonal = half.length();
    let d = field(centre);

    if d >= half_diagonal {
        return;
    }
    if d <= -half_diagonal {
        aabb_encapsulate_sphere(bounds, centre, -d);
        return;
    }
    if depth == 0 {
        let long = half.cmpgt(DVec3::splat(half.min_element() * BOUNDS_ANISOTROPY));
        if reshapes > 0 && long.any() {
            split_long_edges(field, cell, long, reshapes - 1, bounds);
        } else {
            aabb_encapsulate_point(bounds, cell.min);
            aabb_encapsulate_point(bounds, cell.max);
        }
        return;
    }

    for octant in 0..8u8 {
        let corner = aabb_vertex(cell, octant);
        let child = create_aabb(centre.min(corner), centre.max(corner));
        capture_cell(field, &child, depth - 1, reshapes, bounds);
    }
}

/// Halve a cell along the axes in `long` only
fn split_long_edges<F: Fn(DVec3) -> f64>(
    field: &F,
    cell: &AABB,
    long: BVec3,
    reshapes: u32,
    bounds: &mut AABB,
) {
    let centre = aabb_center(cell);
    let mask = long.bitmask() as u8;
    for octant in (0..8u8).filter(|o| o & !mask == 0) {
        let corner = aabb_vertex(cell, octant);
        let child = create_aabb(
            DVec3::select(long, centre.min(corner), cell.min),
            DVec3::select(long, centre.max(corner), cell.max),
        );
        capture_cell(field, &child, 0, reshapes, bounds);
    }
}
