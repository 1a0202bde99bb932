//! SDF Data - shapes and the handle arena
//!
//! Shapes reference each other by `SdfHandle`. A handle stays valid until its
//! slot is removed; the slot's generation is bumped on removal so stale
//! handles simply stop resolving.

use glam::{DQuat, DVec3};
use parking_lot::RwLock;
use std::sync::Arc;

/// RGBA display colour, carried per slot and used to key brick payloads
pub type Colour = [u8; 4];

/// Stable reference into an `SdfArena`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SdfHandle {
    pub index: u32,
    pub generation: u32,
}

/// Closed set of shape kinds. Combinators hold child handles, never shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Sphere about the local origin
    Sphere { radius: f64 },
    /// Box about the local origin
    Cuboid { half_extents: DVec3 },
    /// Half-space `dot(x, normal) <= offset`; `normal` is unit length
    Plane { normal: DVec3, offset: f64 },
    /// Pointwise minimum of the children
    Union(Vec<SdfHandle>),
    /// Pointwise maximum of the children
    Intersection(Vec<SdfHandle>),
    /// `base` with `cut` removed
    Subtraction { base: SdfHandle, cut: SdfHandle },
    /// `child` moved by a rigid transform
    Transform {
        child: SdfHandle,
        translation: DVec3,
        rotation: DQuat,
    },
}

/// One arena slot. `shape == None` means the slot is free.
#[derive(Debug, Clone)]
pub struct SdfSlot {
    pub shape: Option<Shape>,
    pub colour: Colour,
    pub generation: u32,
}

/// Arena of shapes addressed by generation-checked handles
#[derive(Debug, Default)]
pub struct SdfArena {
    pub slots: Vec<SdfSlot>,
    pub free_slots: Vec<u32>,
    pub live_count: usize,
}

/// Arena shared between the physics thread and the render path
pub type SharedSdfArena = Arc<RwLock<SdfArena>>;
