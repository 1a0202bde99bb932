//! Small free functions over glam types
//!
//! glam covers the linear algebra itself; these are the handful of norms and
//! packings the engine needs that it does not provide.

use glam::{DMat3, DQuat, DVec3};

/// Max-norm of a vector
#[inline]
pub fn chebyshev_norm(v: DVec3) -> f64 {
    v.abs().max_element()
}

/// Frobenius norm of a 3x3 matrix
#[inline]
pub fn frobenius_norm(m: &DMat3) -> f64 {
    (m.x_axis.length_squared() + m.y_axis.length_squared() + m.z_axis.length_squared()).sqrt()
}

/// Outer product a * b^T
#[inline]
pub fn outer(a: DVec3, b: DVec3) -> DMat3 {
    DMat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Pack a unit quaternion into four signed-normalised bytes (x, y, z, w from
/// low to high).
pub fn pack_quaternion(q: DQuat) -> u32 {
    let q = q.normalize();
    [q.x, q.y, q.z, q.w]
        .iter()
        .enumerate()
        .fold(0u32, |packed, (i, &c)| {
            let byte = ((c.clamp(-1.0, 1.0) * 0.5 + 0.5) * 255.0).round() as u32;
            packed | (byte << (8 * i))
        })
}

/// Inverse of [`pack_quaternion`]. Lossy to about 1/127 per component.
pub fn unpack_quaternion(packed: u32) -> DQuat {
    let c = |i: u32| ((packed >> (8 * i)) & 0xFF) as f64 / 255.0 * 2.0 - 1.0;
    DQuat::from_xyzw(c(0), c(1), c(2), c(3)).normalize()
}

/// Pack a unit normal into three unsigned bytes (x, y, z from low to high)
pub fn pack_normal(n: DVec3) -> u32 {
    let n = (n.clamp(DVec3::splat(-1.0), DVec3::ONE) * 0.5 + 0.5) * 255.0;
    (n.x.round() as u32) | ((n.y.round() as u32) << 8) | ((n.z.round() as u32) << 16)
}

/// Integer vertex `i` (0..8) of the box spanned by `min`..`max`; bit 0 picks
/// x, bit 1 y, bit 2 z.
#[inline]
pub fn box_vertex(min: DVec3, max: DVec3, i: u8) -> DVec3 {
    DVec3::new(
        if i & 1 != 0 { max.x } else { min.x },
        if i & 2 != 0 { max.y } else { min.y },
        if i & 4 != 0 { max.z } else { min.z },
    )
}
