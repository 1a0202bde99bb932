//! SDF Operations - arena management and field evaluation
//!
//! Evaluation takes `&SdfArena` and walks combinators by handle. A handle
//! whose slot has been removed evaluates to `None`; callers treat that as
//! "this shape no longer exists" and drop it from consideration.

use super::sdf_data::{Colour, SdfArena, SdfHandle, SdfSlot, Shape, SharedSdfArena};
use crate::constants::sdf::NORMAL_STEP;
use crate::error::{EngineError, EngineResult, OptionExt};
use glam::{DMat3, DVec3};
use parking_lot::RwLock;
use std::sync::Arc;

/// Create an empty arena
pub fn create_sdf_arena() -> SdfArena {
    SdfArena::default()
}

/// Create an empty arena behind a shared lock
pub fn create_shared_sdf_arena() -> SharedSdfArena {
    Arc::new(RwLock::new(create_sdf_arena()))
}

/// Insert a shape, reusing a free slot when one exists.
///
/// Fails if a primitive has non-positive extents or a combinator names a
/// handle that is not alive.
pub fn insert_sdf(arena: &mut SdfArena, shape: Shape, colour: Colour) -> EngineResult<SdfHandle> {
    validate_shape(arena, &shape)?;

    let handle = match arena.free_slots.pop() {
        Some(index) => {
            let slot = &mut arena.slots[index as usize];
            slot.shape = Some(shape);
            slot.colour = colour;
            SdfHandle {
                index,
                generation: slot.generation,
            }
        }
        None => {
            let index = arena.slots.len() as u32;
            arena.slots.push(SdfSlot {
                shape: Some(shape),
                colour,
                generation: 0,
            });
            SdfHandle {
                index,
                generation: 0,
            }
        }
    };

    arena.live_count += 1;
    log::trace!(
        "[SdfArena::insert] slot {} generation {}",
        handle.index,
        handle.generation
    );
    Ok(handle)
}

/// Remove a shape. Returns false if the handle was already stale.
///
/// Shapes built on top of the removed one are left in place; they stop
/// evaluating (or, for unions, ignore the missing child).
pub fn remove_sdf(arena: &mut SdfArena, handle: SdfHandle) -> bool {
    if !is_alive(arena, handle) {
        return false;
    }
    let slot = &mut arena.slots[handle.index as usize];
    slot.shape = None;
    slot.generation = slot.generation.wrapping_add(1);
    arena.free_slots.push(handle.index);
    arena.live_count -= 1;
    true
}

/// Does the handle still name a live shape
pub fn is_alive(arena: &SdfArena, handle: SdfHandle) -> bool {
    arena
        .slots
        .get(handle.index as usize)
        .map_or(false, |slot| {
            slot.generation == handle.generation && slot.shape.is_some()
        })
}

/// Borrow the shape behind a live handle
pub fn get_shape(arena: &SdfArena, handle: SdfHandle) -> Option<&Shape> {
    let slot = arena.slots.get(handle.index as usize)?;
    if slot.generation != handle.generation {
        return None;
    }
    slot.shape.as_ref()
}

/// Like `get_shape`, but a stale handle is an error
pub fn require_shape(arena: &SdfArena, handle: SdfHandle) -> EngineResult<&Shape> {
    get_shape(arena, handle).ok_or_engine(|| EngineError::ResourceNotFound {
        resource_type: "sdf".to_string(),
        id: format!("{}:{}", handle.index, handle.generation),
    })
}

/// Display colour of a live handle
pub fn sdf_colour(arena: &SdfArena, handle: SdfHandle) -> Option<Colour> {
    get_shape(arena, handle)?;
    Some(arena.slots[handle.index as usize].colour)
}

fn validate_shape(arena: &SdfArena, shape: &Shape) -> EngineResult<()> {
    let require_alive = |h: &SdfHandle| require_shape(arena, *h).map(|_| ());

    match shape {
        Shape::Sphere { radius } if *radius <= 0.0 => {
            Err(EngineError::invalid_config("radius", radius, "must be positive"))
        }
        Shape::Cuboid { half_extents } if half_extents.min_element() <= 0.0 => Err(
            EngineError::invalid_config("half_extents", half_extents, "must be positive"),
        ),
        Shape::Plane { normal, .. } if (normal.length() - 1.0).abs() > 1e-6 => Err(
            EngineError::invalid_config("normal", normal, "must be unit length"),
        ),
        Shape::Union(children) | Shape::Intersection(children) => {
            if children.is_empty() {
                return Err(EngineError::invalid_config(
                    "children",
                    0,
                    "combinator needs at least one child",
                ));
            }
            children.iter().try_for_each(require_alive)
        }
        Shape::Subtraction { base, cut } => {
            require_alive(base)?;
            require_alive(cut)
        }
        Shape::Transform { child, .. } => require_alive(child),
        _ => Ok(()),
    }
}

/// Signed distance at `x`, or `None` if the handle (or a required child)
/// has expired
pub fn phi(arena: &SdfArena, handle: SdfHandle, x: DVec3) -> Option<f64> {
    match get_shape(arena, handle)? {
        Shape::Sphere { radius } => Some(x.length() - radius),
        Shape::Cuboid { half_extents } => {
            let q = x.abs() - *half_extents;
            Some(q.max(DVec3::ZERO).length() + q.max_element().min(0.0))
        }
        Shape::Plane { normal, offset } => Some(x.dot(*normal) - offset),
        Shape::Union(children) => union_phi(arena, children, x),
        Shape::Intersection(children) => children
            .iter()
            .try_fold(f64::NEG_INFINITY, |acc, &c| Some(acc.max(phi(arena, c, x)?))),
        Shape::Subtraction { base, cut } => {
            Some(phi(arena, *base, x)?.max(-phi(arena, *cut, x)?))
        }
        Shape::Transform {
            child,
            translation,
            rotation,
        } => phi(arena, *child, rotation.inverse() * (x - *translation)),
    }
}

/// Union of several handles; expired handles are skipped. `None` only when
/// every handle has expired.
pub fn union_phi(arena: &SdfArena, handles: &[SdfHandle], x: DVec3) -> Option<f64> {
    handles
        .iter()
        .filter_map(|&h| phi(arena, h, x))
        .reduce(f64::min)
}

/// Unit surface normal at `x` (zero where the gradient vanishes)
pub fn normal(arena: &SdfArena, handle: SdfHandle, x: DVec3) -> Option<DVec3> {
    phi(arena, handle, x)?;
    Some(field_normal(
        |p| phi(arena, handle, p).unwrap_or(f64::INFINITY),
        x,
    ))
}

/// Jacobian of the normal at `x` with finite-difference `step`
pub fn jacobian(arena: &SdfArena, handle: SdfHandle, x: DVec3, step: f64) -> Option<DMat3> {
    phi(arena, handle, x)?;
    Some(field_jacobian(
        |p| phi(arena, handle, p).unwrap_or(f64::INFINITY),
        x,
        step,
    ))
}

/// Central-difference gradient of any scalar field
pub fn field_gradient<F: Fn(DVec3) -> f64>(f: F, x: DVec3, step: f64) -> DVec3 {
    let dx = DVec3::X * step;
    let dy = DVec3::Y * step;
    let dz = DVec3::Z * step;
    DVec3::new(
        f(x + dx) - f(x - dx),
        f(x + dy) - f(x - dy),
        f(x + dz) - f(x - dz),
    ) / (2.0 * step)
}

/// Normalised gradient of a scalar field
pub fn field_normal<F: Fn(DVec3) -> f64>(f: F, x: DVec3) -> DVec3 {
    field_gradient(f, x, NORMAL_STEP).normalize_or_zero()
}

/// Central-difference Jacobian of the field's normal. Column `i` is the
/// derivative of the normal along axis `i`.
pub fn field_jacobian<F: Fn(DVec3) -> f64>(f: F, x: DVec3, step: f64) -> DMat3 {
    let column = |axis: DVec3| {
        let offset = axis * step;
        (field_normal(&f, x + offset) - field_normal(&f, x - offset)) / (2.0 * step)
    };
    DMat3::from_cols(column(DVec3::X), column(DVec3::Y), column(DVec3::Z))
}
