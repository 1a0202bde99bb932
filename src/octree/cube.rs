//! Axis-aligned cubes addressed by octant
//!
//! Octant bit convention: bit 0 = +x half, bit 1 = +y half, bit 2 = +z half.

use glam::DVec3;

/// Cube defined by its min corner and edge length
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cube {
    pub min: DVec3,
    pub size: f64,
}

/// Create a cube; `size` must be positive
pub fn create_cube(min: DVec3, size: f64) -> Cube {
    debug_assert!(size > 0.0, "cube size must be positive");
    Cube { min, size }
}

/// Cube of half-edge `half_extent` centred on the origin
pub fn universal_cube(half_extent: f64) -> Cube {
    create_cube(DVec3::splat(-half_extent), 2.0 * half_extent)
}

pub fn cube_centre(cube: &Cube) -> DVec3 {
    cube.min + DVec3::splat(cube.size * 0.5)
}

pub fn cube_max(cube: &Cube) -> DVec3 {
    cube.min + DVec3::splat(cube.size)
}

/// Radius of the circumscribed sphere
pub fn circumradius(cube: &Cube) -> f64 {
    (cube.size * 0.5).abs() * 3f64.sqrt()
}

/// Radius of the inscribed sphere
pub fn inradius(cube: &Cube) -> f64 {
    cube.size * 0.5
}

/// Child cube for `octant` (0..8)
pub fn refine(cube: &Cube, octant: u8) -> Cube {
    debug_assert!(octant < 8);
    let half = cube.size * 0.5;
    let offset = DVec3::new(
        if octant & 1 != 0 { half } else { 0.0 },
        if octant & 2 != 0 { half } else { 0.0 },
        if octant & 4 != 0 { half } else { 0.0 },
    );
    create_cube(cube.min + offset, half)
}

/// Octant of a point relative to the cube's centre. Points on a centre plane
/// belong to the upper half.
pub fn get_octant(cube: &Cube, x: DVec3) -> u8 {
    let centre = cube_centre(cube);
    let mut octant = 0;
    if x.x >= centre.x {
        octant |= 1;
    }
    if x.y >= centre.y {
        octant |= 2;
    }
    if x.z >= centre.z {
        octant |= 4;
    }
    octant
}

/// Closed containment test
pub fn cube_contains(cube: &Cube, x: DVec3) -> bool {
    x.cmpge(cube.min).all() && x.cmple(cube_max(cube)).all()
}
