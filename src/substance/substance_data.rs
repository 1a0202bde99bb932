//! Substance Data - scene objects and their GPU record

use crate::physics::BodyId;
use crate::sdf::SdfHandle;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

pub type SubstanceId = u32;

/// A visible shape driven by a rigid body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Substance {
    pub id: SubstanceId,
    pub sdf: SdfHandle,
    pub body: BodyId,
    /// Octree node the raymarcher starts from
    pub root: i32,
}

/// Per-substance record read by the raymarcher
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SubstanceRecord {
    /// World-space centre of the substance's bounds
    pub centre: [f32; 3],
    pub root: i32,
    /// Bounding sphere radius about `centre`
    pub radius: f32,
    /// World-to-local rotation, packed as four signed bytes
    pub rotation: u32,
    pub id: u32,
    pub _pad: u32,
}

const_assert_eq!(std::mem::size_of::<SubstanceRecord>(), 32);
