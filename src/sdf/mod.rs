//! Signed distance fields
//!
//! Shapes live in an arena and are referred to by generation-checked handles,
//! so bodies and the octree can share them without owning them.

pub mod bounds;
pub mod sdf_data;
pub mod sdf_operations;

pub use bounds::{capture_bounds, capture_field_bounds};
pub use sdf_data::{Colour, SdfArena, SdfHandle, Shape, SharedSdfArena};
pub use sdf_operations::{
    create_sdf_arena, create_shared_sdf_arena, field_gradient, field_jacobian, field_normal,
    get_shape, insert_sdf, is_alive, jacobian, normal, phi, remove_sdf, require_shape, sdf_colour,
    union_phi,
};
