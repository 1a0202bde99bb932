//! Adaptive sparse voxel octree over the scene's signed distance fields
//!
//! The node array is a flat `Vec<u32>`-compatible buffer the GPU walks
//! directly. The tree only grows: leaves become internal nodes, never the
//! reverse.

pub mod brick_pool;
pub mod cube;
pub mod pending_uploads;
pub mod sparse_octree_data;
pub mod sparse_octree_operations;

pub use brick_pool::{BrickKey, BrickPool};
pub use cube::{create_cube, get_octant, refine, universal_cube, Cube};
pub use pending_uploads::PendingUploads;
pub use sparse_octree_data::{
    BuildMode, Classification, LeafPayload, LookupResult, NodeKind, OctreeConfig, OctreeNode,
    OctreeStats, RequestOutcome, SparseOctreeData,
};
pub use sparse_octree_operations::{
    classify, classify_field, create_sparse_octree, drain_pending_uploads, get_stats,
    handle_request, lookup, node_kind, octree_buffer_size, octree_nodes, rebuild_octree,
    validate_octree_config,
};
