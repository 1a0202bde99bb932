//! Sparse Octree Data - node encoding and tree state
//!
//! Just data. All transformations happen in sparse_octree_operations.rs

use super::brick_pool::BrickPool;
use super::cube::Cube;
use super::pending_uploads::PendingUploads;
use crate::sdf::SdfHandle;
use bytemuck::{Pod, Zeroable};
use std::collections::HashMap;

/// Octree node as seen by the GPU.
///
/// 0 = unresolved, high bit set = leaf (payload in the low bits), anything
/// else = index of the first of 8 contiguous children.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct OctreeNode(pub u32);

/// Decoded form of an `OctreeNode`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Unresolved,
    Leaf(LeafPayload),
    Internal { child_base: u32 },
}

/// What a leaf holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafPayload {
    Empty,
    Filled,
    /// Surface cube the brick pool had no id for. Refinable, and retried on
    /// the next request that reaches it.
    Unbricked,
    Brick(u32),
}

/// How the tree is populated at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Root only; refinement happens on request
    Lazy,
    /// Paint everything down to the minimum leaf size up front
    Eager,
}

/// Octree configuration
#[derive(Debug, Clone)]
pub struct OctreeConfig {
    /// Half edge of the universal cube
    pub half_extent: f64,
    /// Cubes smaller than this are never subdivided
    pub min_leaf_size: f64,
    /// Maximum number of nodes the tree (and its device buffer) may hold
    pub node_capacity: usize,
    /// Maximum number of live brick payloads
    pub brick_capacity: u32,
    pub mode: BuildMode,
}

/// Result of `classify`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub intersects: bool,
    pub contains: bool,
}

/// Where a lookup stopped
#[derive(Debug, Clone, Copy)]
pub struct LookupResult {
    pub index: u32,
    pub node: OctreeNode,
    pub cube: Cube,
    pub depth: u32,
}

/// What `handle_request` did with one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Position outside the universal cube
    Dropped,
    /// Reached an unresolved node; nothing to refine yet
    Pending,
    /// The leaf is already at or below the requested depth
    AlreadyResolved,
    /// The leaf was converted into an internal node
    Expanded,
    /// An unbricked leaf received a brick
    Bricked,
    /// The leaf needs refining or a brick, but the node array or the brick
    /// pool is full
    AtCapacity,
    /// The leaf is empty, filled, flat or at the minimum size
    Final,
}

/// CPU-side octree state
pub struct SparseOctreeData {
    pub config: OctreeConfig,
    pub universal: Cube,

    /// Scene shapes the tree is built over
    pub sdfs: Vec<SdfHandle>,

    /// Flat node array; index 0 is the root
    pub nodes: Vec<OctreeNode>,

    /// Shapes known to intersect each surface leaf, keyed by node index
    pub leaf_candidates: HashMap<u32, Vec<SdfHandle>>,

    pub bricks: BrickPool,
    pub pending: PendingUploads,

    /// Set once the capacity warning has been logged
    pub capacity_warned: bool,
}

/// Octree statistics
#[derive(Debug, Clone)]
pub struct OctreeStats {
    pub total_nodes: usize,
    pub node_capacity: usize,
    pub surface_leaves: usize,
    pub live_bricks: usize,
    pub memory_usage_mb: f32,
}
