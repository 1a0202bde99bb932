//! Sparse Octree Operations - construction, lookup and refinement
//!
//! Construction, classification, lookup and lazy refinement over
//! `SparseOctreeData`. Nothing here touches the GPU; dirty node ranges are
//! queued in `data.pending` for the request channel to upload.

use super::brick_pool::{BrickKey, BrickPool};
use super::cube::{
    circumradius, cube_centre, cube_contains, get_octant, inradius, refine, universal_cube, Cube,
};
use super::sparse_octree_data::{
    BuildMode, Classification, LeafPayload, LookupResult, NodeKind, OctreeConfig, OctreeNode,
    OctreeStats, RequestOutcome, SparseOctreeData,
};
use super::pending_uploads::PendingUploads;
use crate::constants::octree::{
    EMPTY_PAYLOAD, FILLED_PAYLOAD, JACOBIAN_STEP_FRACTION, LEAF_FLAG, MAX_BRICK_ID, MAX_DEPTH,
    PAYLOAD_MASK, UNBRICKED_PAYLOAD, UNRESOLVED,
};
use crate::constants::physics::EPSILON;
use crate::error::{EngineError, EngineResult};
use crate::math::{chebyshev_norm, frobenius_norm, pack_normal};
use crate::sdf::{field_jacobian, field_normal, phi, sdf_colour, union_phi, SdfArena, SdfHandle};
use glam::DVec3;
use std::collections::HashMap;
use std::ops::Range;

// Node encoding

/// Leaf node carrying `payload`
pub fn make_leaf(payload: LeafPayload) -> OctreeNode {
    let bits = match payload {
        LeafPayload::Empty => EMPTY_PAYLOAD,
        LeafPayload::Filled => FILLED_PAYLOAD,
        LeafPayload::Unbricked => UNBRICKED_PAYLOAD,
        LeafPayload::Brick(id) => {
            debug_assert!(id >= 1 && id <= MAX_BRICK_ID);
            id
        }
    };
    OctreeNode(LEAF_FLAG | bits)
}

/// Internal node whose children start at `child_base`
pub fn make_internal(child_base: u32) -> OctreeNode {
    debug_assert!(child_base != UNRESOLVED && child_base & LEAF_FLAG == 0);
    OctreeNode(child_base)
}

/// Decode a node
pub fn node_kind(node: OctreeNode) -> NodeKind {
    if node.0 == UNRESOLVED {
        NodeKind::Unresolved
    } else if node.0 & LEAF_FLAG != 0 {
        let payload = match node.0 & PAYLOAD_MASK {
            EMPTY_PAYLOAD => LeafPayload::Empty,
            FILLED_PAYLOAD => LeafPayload::Filled,
            UNBRICKED_PAYLOAD => LeafPayload::Unbricked,
            id => LeafPayload::Brick(id),
        };
        NodeKind::Leaf(payload)
    } else {
        NodeKind::Internal {
            child_base: node.0,
        }
    }
}

pub fn validate_octree_config(config: &OctreeConfig) -> EngineResult<()> {
    if !(config.half_extent > 0.0) {
        return Err(EngineError::invalid_config(
            "half_extent",
            config.half_extent,
            "must be positive",
        ));
    }
    if !(config.min_leaf_size > 0.0) {
        return Err(EngineError::invalid_config(
            "min_leaf_size",
            config.min_leaf_size,
            "must be positive",
        ));
    }
    if config.node_capacity < 9 || config.node_capacity > PAYLOAD_MASK as usize {
        return Err(EngineError::invalid_config(
            "node_capacity",
            config.node_capacity,
            "must hold at least one expansion and fit in 31 bits",
        ));
    }
    if config.brick_capacity == 0 {
        return Err(EngineError::invalid_config(
            "brick_capacity",
            config.brick_capacity,
            "must be positive",
        ));
    }
    Ok(())
}

// Classification

/// Two-tier containment/intersection test of `cube` against a 1-Lipschitz
/// field. The gradient is only evaluated in the ambiguous band.
pub fn classify_field<F: Fn(DVec3) -> f64>(field: F, cube: &Cube) -> Classification {
    let centre = cube_centre(cube);
    let outer = circumradius(cube);
    let inner = inradius(cube);
    let p = field(centre);

    if p <= -outer {
        return Classification {
            intersects: false,
            contains: true,
        };
    }
    if p.abs() <= inner {
        return Classification {
            intersects: true,
            contains: false,
        };
    }
    if p >= outer {
        return Classification {
            intersects: false,
            contains: false,
        };
    }

    let d = chebyshev_norm(field_normal(&field, centre) * p);
    if p < 0.0 && d > inner {
        Classification {
            intersects: false,
            contains: true,
        }
    } else {
        Classification {
            intersects: d <= inner,
            contains: false,
        }
    }
}

/// Classify `cube` against one shape. `None` if the handle expired.
pub fn classify(arena: &SdfArena, cube: &Cube, handle: SdfHandle) -> Option<Classification> {
    phi(arena, handle, cube_centre(cube))?;
    Some(classify_field(
        |x| phi(arena, handle, x).unwrap_or(f64::INFINITY),
        cube,
    ))
}

/// Outcome of testing a cube against its candidate shapes
#[derive(Debug, Clone, PartialEq)]
pub enum CubeClass {
    Empty,
    Filled,
    Surface(Vec<SdfHandle>),
}

/// Test every candidate; containment by any one short-circuits
pub fn classify_candidates(arena: &SdfArena, cube: &Cube, candidates: &[SdfHandle]) -> CubeClass {
    let mut surviving = Vec::with_capacity(candidates.len());
    for &handle in candidates {
        match classify(arena, cube, handle) {
            Some(c) if c.contains => return CubeClass::Filled,
            Some(c) if c.intersects => surviving.push(handle),
            _ => {}
        }
    }
    if surviving.is_empty() {
        CubeClass::Empty
    } else {
        CubeClass::Surface(surviving)
    }
}

/// Whether a surface cube is worth splitting: its children would not be
/// below the minimum size and the combined surface is not locally flat.
pub fn should_subdivide(
    arena: &SdfArena,
    cube: &Cube,
    candidates: &[SdfHandle],
    min_leaf_size: f64,
) -> bool {
    if cube.size * 0.5 < min_leaf_size {
        return false;
    }
    let centre = cube_centre(cube);
    if union_phi(arena, candidates, centre).is_none() {
        return false;
    }
    let jacobian = field_jacobian(
        |x| union_phi(arena, candidates, x).unwrap_or(f64::INFINITY),
        centre,
        cube.size * JACOBIAN_STEP_FRACTION,
    );
    frobenius_norm(&jacobian) >= EPSILON
}

// Construction

/// Build an octree over `sdfs`. Lazy mode resolves only the root; eager mode
/// paints down to the minimum leaf size.
pub fn create_sparse_octree(
    config: OctreeConfig,
    arena: &SdfArena,
    sdfs: Vec<SdfHandle>,
) -> EngineResult<SparseOctreeData> {
    validate_octree_config(&config)?;

    let mut data = SparseOctreeData {
        universal: universal_cube(config.half_extent),
        bricks: BrickPool::new(config.brick_capacity),
        nodes: Vec::with_capacity(config.node_capacity),
        leaf_candidates: HashMap::new(),
        pending: PendingUploads::new(),
        capacity_warned: false,
        sdfs,
        config,
    };
    build_root(&mut data, arena);

    log::info!(
        "[Octree::create] {:?} build over {} shapes: {} nodes",
        data.config.mode,
        data.sdfs.len(),
        data.nodes.len()
    );
    Ok(data)
}

/// Throw the tree away and build it again over the current shape list
pub fn rebuild_octree(data: &mut SparseOctreeData, arena: &SdfArena) {
    data.nodes.clear();
    data.leaf_candidates.clear();
    data.bricks = BrickPool::new(data.config.brick_capacity);
    data.pending = PendingUploads::new();
    data.capacity_warned = false;
    build_root(data, arena);

    log::debug!(
        "[Octree::rebuild] {} shapes, {} nodes",
        data.sdfs.len(),
        data.nodes.len()
    );
}

fn build_root(data: &mut SparseOctreeData, arena: &SdfArena) {
    data.nodes.push(OctreeNode(UNRESOLVED));
    let root = data.universal;
    let candidates = data.sdfs.clone();

    match data.config.mode {
        BuildMode::Lazy => {
            let class = classify_candidates(arena, &root, &candidates);
            let node = make_leaf_node(data, arena, 0, &root, class);
            data.nodes[0] = node;
        }
        BuildMode::Eager => paint(data, arena, 0, &root, &candidates),
    }
    data.pending.push(0, data.nodes.len() as u32);
}

/// Turn a classified cube into a leaf, allocating a brick for surface cubes
fn make_leaf_node(
    data: &mut SparseOctreeData,
    arena: &SdfArena,
    index: u32,
    cube: &Cube,
    class: CubeClass,
) -> OctreeNode {
    match class {
        CubeClass::Empty => make_leaf(LeafPayload::Empty),
        CubeClass::Filled => make_leaf(LeafPayload::Filled),
        CubeClass::Surface(surviving) => {
            let key = brick_key(arena, cube, &surviving);
            data.leaf_candidates.insert(index, surviving);
            match data.bricks.allocate(key) {
                Ok(id) => make_leaf(LeafPayload::Brick(id)),
                Err(e) => {
                    log::warn!("[Octree::create_node] node {} left unbricked: {}", index, e);
                    make_leaf(LeafPayload::Unbricked)
                }
            }
        }
    }
}

/// Colour of the nearest surviving shape and the packed union normal at the
/// cube centre
fn brick_key(arena: &SdfArena, cube: &Cube, surviving: &[SdfHandle]) -> BrickKey {
    let centre = cube_centre(cube);
    let nearest = surviving
        .iter()
        .filter_map(|&h| phi(arena, h, centre).map(|d| (h, d)))
        .min_by(|a, b| a.1.total_cmp(&b.1));
    let colour = nearest
        .and_then(|(h, _)| sdf_colour(arena, h))
        .unwrap_or([0, 0, 0, 255]);
    let normal = field_normal(
        |x| union_phi(arena, surviving, x).unwrap_or(f64::INFINITY),
        centre,
    );
    BrickKey {
        colour,
        normal: pack_normal(normal),
    }
}

/// Reserve 8 contiguous unresolved slots, or `None` at capacity
fn allocate_children(data: &mut SparseOctreeData) -> Option<u32> {
    if data.nodes.len() + 8 > data.config.node_capacity {
        if !data.capacity_warned {
            log::warn!(
                "[Octree::allocate_children] node capacity {} reached, further expansion ignored",
                data.config.node_capacity
            );
            data.capacity_warned = true;
        }
        return None;
    }
    let base = data.nodes.len() as u32;
    data.nodes.resize(data.nodes.len() + 8, OctreeNode(UNRESOLVED));
    Some(base)
}

/// Eager construction: classify, then either stop at a leaf or recurse into
/// 8 freshly allocated children
fn paint(
    data: &mut SparseOctreeData,
    arena: &SdfArena,
    index: u32,
    cube: &Cube,
    candidates: &[SdfHandle],
) {
    let class = classify_candidates(arena, cube, candidates);

    if let CubeClass::Surface(surviving) = &class {
        if should_subdivide(arena, cube, surviving, data.config.min_leaf_size) {
            if let Some(base) = allocate_children(data) {
                data.nodes[index as usize] = make_internal(base);
                for octant in 0..8u8 {
                    paint(
                        data,
                        arena,
                        base + octant as u32,
                        &refine(cube, octant),
                        surviving,
                    );
                }
                return;
            }
        }
    }

    let node = make_leaf_node(data, arena, index, cube, class);
    data.nodes[index as usize] = node;
}

// Lookup and refinement

/// Descend from the root towards `x`, stopping at the first leaf or
/// unresolved node. Child indices past the end of the array read as
/// unresolved. `None` if `x` is outside the universal cube.
pub fn lookup(data: &SparseOctreeData, x: DVec3) -> Option<LookupResult> {
    if !cube_contains(&data.universal, x) {
        return None;
    }

    let mut index = 0u32;
    let mut cube = data.universal;
    let mut depth = 0u32;

    loop {
        let node = data
            .nodes
            .get(index as usize)
            .copied()
            .unwrap_or(OctreeNode(UNRESOLVED));

        match node_kind(node) {
            NodeKind::Internal { child_base } if depth < MAX_DEPTH => {
                let octant = get_octant(&cube, x);
                index = child_base + octant as u32;
                cube = refine(&cube, octant);
                depth += 1;
            }
            _ => {
                return Some(LookupResult {
                    index,
                    node,
                    cube,
                    depth,
                })
            }
        }
    }
}

/// Refine the leaf covering `x` one level if it is shallower than `depth`
/// and still worth splitting. Never shrinks the tree.
pub fn handle_request(
    data: &mut SparseOctreeData,
    arena: &SdfArena,
    x: DVec3,
    depth: u32,
) -> RequestOutcome {
    let Some(found) = lookup(data, x) else {
        log::trace!("[Octree::handle_request] {} outside universal cube", x);
        return RequestOutcome::Dropped;
    };

    let deep_enough = found.depth >= depth.min(MAX_DEPTH);
    let brick = match node_kind(found.node) {
        NodeKind::Unresolved => return RequestOutcome::Pending,
        NodeKind::Internal { .. } => return RequestOutcome::AlreadyResolved,
        NodeKind::Leaf(LeafPayload::Unbricked) if deep_enough => {
            return attach_brick(data, arena, &found)
        }
        NodeKind::Leaf(_) if deep_enough => return RequestOutcome::AlreadyResolved,
        NodeKind::Leaf(LeafPayload::Brick(id)) => Some(id),
        NodeKind::Leaf(LeafPayload::Unbricked) => None,
        NodeKind::Leaf(_) => return RequestOutcome::Final,
    };

    let candidates = data
        .leaf_candidates
        .get(&found.index)
        .cloned()
        .unwrap_or_default();
    if !should_subdivide(arena, &found.cube, &candidates, data.config.min_leaf_size) {
        return match brick {
            Some(_) => RequestOutcome::Final,
            None => attach_brick(data, arena, &found),
        };
    }

    let Some(base) = allocate_children(data) else {
        return RequestOutcome::AtCapacity;
    };

    if let Some(id) = brick {
        data.bricks.evict(id);
    }
    data.leaf_candidates.remove(&found.index);

    for octant in 0..8u8 {
        let child_index = base + octant as u32;
        let child_cube = refine(&found.cube, octant);
        let class = classify_candidates(arena, &child_cube, &candidates);
        let node = make_leaf_node(data, arena, child_index, &child_cube, class);
        data.nodes[child_index as usize] = node;
    }
    data.nodes[found.index as usize] = make_internal(base);

    data.pending.push(base, 8);
    data.pending.push(found.index, 1);

    log::trace!(
        "[Octree::handle_request] node {} at depth {} -> children {}..{}",
        found.index,
        found.depth,
        base,
        base + 8
    );
    RequestOutcome::Expanded
}

/// Retry the brick allocation of an unbricked leaf
fn attach_brick(
    data: &mut SparseOctreeData,
    arena: &SdfArena,
    found: &LookupResult,
) -> RequestOutcome {
    let candidates = data
        .leaf_candidates
        .get(&found.index)
        .cloned()
        .unwrap_or_default();
    let key = brick_key(arena, &found.cube, &candidates);
    match data.bricks.allocate(key) {
        Ok(id) => {
            data.nodes[found.index as usize] = make_leaf(LeafPayload::Brick(id));
            data.pending.push(found.index, 1);
            log::trace!("[Octree::handle_request] node {} bricked as {}", found.index, id);
            RequestOutcome::Bricked
        }
        Err(_) => RequestOutcome::AtCapacity,
    }
}

// Accessors

/// Node array as raw bytes-ready slice
pub fn octree_nodes(data: &SparseOctreeData) -> &[OctreeNode] {
    &data.nodes
}

/// Dirty node ranges since the last drain, merged
pub fn drain_pending_uploads(data: &mut SparseOctreeData) -> Vec<Range<u32>> {
    data.pending.drain_coalesced()
}

/// Byte size the device buffer must have to hold a full tree
pub fn octree_buffer_size(config: &OctreeConfig) -> u64 {
    (config.node_capacity * std::mem::size_of::<OctreeNode>()) as u64
}

pub fn get_stats(data: &SparseOctreeData) -> OctreeStats {
    OctreeStats {
        total_nodes: data.nodes.len(),
        node_capacity: data.config.node_capacity,
        surface_leaves: data.leaf_candidates.len(),
        live_bricks: data.bricks.len(),
        memory_usage_mb: (data.nodes.len() * std::mem::size_of::<OctreeNode>()) as f32
            / (1024.0 * 1024.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::cube::{create_cube, cube_max};
    use crate::sdf::{create_sdf_arena, insert_sdf, remove_sdf, Shape};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const RED: [u8; 4] = [255, 0, 0, 255];

    fn config(half_extent: f64, mode: BuildMode) -> OctreeConfig {
        OctreeConfig {
            half_extent,
            min_leaf_size: 0.5,
            node_capacity: 1 << 16,
            brick_capacity: 1 << 16,
            mode,
        }
    }

    fn sphere_scene(radius: f64) -> (SdfArena, SdfHandle) {
        let mut arena = create_sdf_arena();
        let sphere = insert_sdf(&mut arena, Shape::Sphere { radius }, RED).unwrap();
        (arena, sphere)
    }

    #[test]
    fn test_node_encoding() {
        assert_eq!(node_kind(OctreeNode(0)), NodeKind::Unresolved);
        assert_eq!(node_kind(make_internal(9)), NodeKind::Internal { child_base: 9 });
        assert_eq!(
            node_kind(make_leaf(LeafPayload::Empty)),
            NodeKind::Leaf(LeafPayload::Empty)
        );
        assert_eq!(
            node_kind(make_leaf(LeafPayload::Filled)),
            NodeKind::Leaf(LeafPayload::Filled)
        );
        assert_eq!(
            node_kind(make_leaf(LeafPayload::Brick(42))),
            NodeKind::Leaf(LeafPayload::Brick(42))
        );
        assert_eq!(
            node_kind(make_leaf(LeafPayload::Unbricked)),
            NodeKind::Leaf(LeafPayload::Unbricked)
        );
        assert_eq!(
            node_kind(make_leaf(LeafPayload::Brick(MAX_BRICK_ID))),
            NodeKind::Leaf(LeafPayload::Brick(MAX_BRICK_ID))
        );
        assert_eq!(make_leaf(LeafPayload::Brick(42)).0, LEAF_FLAG | 42);
    }

    #[test]
    fn test_classify_soundness() {
        let (arena, sphere) = sphere_scene(2.0);
        let mut rng = StdRng::seed_from_u64(7);
        let (mut outside, mut inside) = (0, 0);

        for _ in 0..2000 {
            let size = rng.gen_range(0.01..6.0);
            let centre = DVec3::new(
                rng.gen_range(-12.0..12.0),
                rng.gen_range(-12.0..12.0),
                rng.gen_range(-12.0..12.0),
            );
            let cube = create_cube(centre - DVec3::splat(size * 0.5), size);
            let r = circumradius(&cube);
            let distance = centre.length() - 2.0;
            let class = classify(&arena, &cube, sphere).unwrap();

            if distance > r {
                outside += 1;
                assert_eq!(
                    class,
                    Classification {
                        intersects: false,
                        contains: false
                    }
                );
            } else if distance < -r {
                inside += 1;
                assert_eq!(
                    class,
                    Classification {
                        intersects: false,
                        contains: true
                    }
                );
            }
        }

        // Interior cubes need small sizes near the origin, so sample them too
        for _ in 0..1000 {
            let size = rng.gen_range(0.01..1.0);
            let centre = DVec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            let cube = create_cube(centre - DVec3::splat(size * 0.5), size);
            let r = circumradius(&cube);
            if centre.length() - 2.0 < -r {
                inside += 1;
                assert!(classify(&arena, &cube, sphere).unwrap().contains);
            }
        }

        assert!(outside >= 1000);
        assert!(inside >= 100);
    }

    #[test]
    fn test_classify_surface_cube() {
        let (arena, sphere) = sphere_scene(2.0);
        let cube = create_cube(DVec3::new(1.5, -0.5, -0.5), 1.0);
        assert!(classify(&arena, &cube, sphere).unwrap().intersects);
    }

    #[test]
    fn test_lazy_root_is_surface_leaf() {
        let (arena, sphere) = sphere_scene(1.0);
        let octree = create_sparse_octree(config(8.0, BuildMode::Lazy), &arena, vec![sphere]).unwrap();

        assert_eq!(octree.nodes.len(), 1);
        assert!(matches!(
            node_kind(octree.nodes[0]),
            NodeKind::Leaf(LeafPayload::Brick(_))
        ));
        assert_eq!(get_stats(&octree).surface_leaves, 1);
    }

    #[test]
    fn test_request_outside_universal_cube_is_dropped() {
        let (arena, sphere) = sphere_scene(1.0);
        let mut octree =
            create_sparse_octree(config(8.0, BuildMode::Lazy), &arena, vec![sphere]).unwrap();
        let outcome = handle_request(&mut octree, &arena, DVec3::splat(100.0), 3);
        assert_eq!(outcome, RequestOutcome::Dropped);
        assert_eq!(octree.nodes.len(), 1);
    }

    #[test]
    fn test_request_idempotence() {
        let (arena, sphere) = sphere_scene(1.0);
        let mut octree =
            create_sparse_octree(config(8.0, BuildMode::Lazy), &arena, vec![sphere]).unwrap();
        let x = DVec3::new(1.0, 0.1, 0.1);

        assert_eq!(handle_request(&mut octree, &arena, x, 1), RequestOutcome::Expanded);
        let len = octree.nodes.len();
        assert_eq!(len, 9);

        assert_eq!(
            handle_request(&mut octree, &arena, x, 1),
            RequestOutcome::AlreadyResolved
        );
        assert_eq!(octree.nodes.len(), len);
    }

    #[test]
    fn test_monotonic_growth() {
        let (arena, sphere) = sphere_scene(3.0);
        let mut octree =
            create_sparse_octree(config(8.0, BuildMode::Lazy), &arena, vec![sphere]).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let mut internal: HashMap<u32, u32> = HashMap::new();
        let mut len = octree.nodes.len();

        for _ in 0..300 {
            let direction = DVec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            )
            .normalize_or_zero();
            let x = direction * rng.gen_range(2.5..3.5);
            let depth = lookup(&octree, x).map_or(0, |r| r.depth + 1);
            handle_request(&mut octree, &arena, x, depth);

            assert!(octree.nodes.len() >= len);
            len = octree.nodes.len();

            for (&index, &base) in &internal {
                assert_eq!(
                    node_kind(octree.nodes[index as usize]),
                    NodeKind::Internal { child_base: base }
                );
            }
            for (index, node) in octree.nodes.iter().enumerate() {
                if let NodeKind::Internal { child_base } = node_kind(*node) {
                    internal.insert(index as u32, child_base);
                }
            }
        }

        assert!(internal.len() > 1);
    }

    #[test]
    fn test_unresolved_nodes_are_tolerated() {
        let (arena, sphere) = sphere_scene(1.0);
        let mut octree =
            create_sparse_octree(config(8.0, BuildMode::Lazy), &arena, vec![sphere]).unwrap();

        // Root points at children that were never computed
        octree.nodes.resize(9, OctreeNode(UNRESOLVED));
        octree.nodes[0] = make_internal(1);
        assert_eq!(
            handle_request(&mut octree, &arena, DVec3::ONE, 4),
            RequestOutcome::Pending
        );

        // Root points past the end of the array
        octree.nodes[0] = make_internal(1000);
        assert_eq!(
            handle_request(&mut octree, &arena, DVec3::ONE, 4),
            RequestOutcome::Pending
        );
        assert_eq!(octree.nodes.len(), 9);
    }

    #[test]
    fn test_flat_surface_is_final() {
        let mut arena = create_sdf_arena();
        let plane = insert_sdf(
            &mut arena,
            Shape::Plane {
                normal: DVec3::Y,
                offset: 0.0,
            },
            RED,
        )
        .unwrap();
        let mut octree =
            create_sparse_octree(config(8.0, BuildMode::Eager), &arena, vec![plane]).unwrap();
        assert_eq!(octree.nodes.len(), 1);
        assert_eq!(
            handle_request(&mut octree, &arena, DVec3::new(0.5, 0.0, 0.5), 5),
            RequestOutcome::Final
        );
    }

    #[test]
    fn test_eager_paint() {
        let (arena, sphere) = sphere_scene(3.0);
        let mut cfg = config(8.0, BuildMode::Eager);
        cfg.min_leaf_size = 1.0;
        let octree = create_sparse_octree(cfg, &arena, vec![sphere]).unwrap();
        assert!(octree.nodes.len() > 1);

        for node in &octree.nodes {
            match node_kind(*node) {
                NodeKind::Unresolved => panic!("eager build left an unresolved node"),
                NodeKind::Internal { child_base } => {
                    assert!((child_base as usize) + 8 <= octree.nodes.len())
                }
                NodeKind::Leaf(_) => {}
            }
        }

        let inside = lookup(&octree, DVec3::splat(0.1)).unwrap();
        assert_eq!(
            node_kind(inside.node),
            NodeKind::Leaf(LeafPayload::Filled)
        );
        let corner = lookup(&octree, DVec3::splat(7.9)).unwrap();
        assert_eq!(node_kind(corner.node), NodeKind::Leaf(LeafPayload::Empty));

        let surface = lookup(&octree, DVec3::new(3.0, 0.01, 0.01)).unwrap();
        assert!(surface.cube.size >= 1.0);
        assert!(cube_contains(&surface.cube, DVec3::new(3.0, 0.01, 0.01)));
        assert!(cube_max(&surface.cube).x <= 8.0);
    }

    #[test]
    fn test_expired_sdf_is_dropped_during_refinement() {
        let mut arena = create_sdf_arena();
        let a = insert_sdf(&mut arena, Shape::Sphere { radius: 1.0 }, RED).unwrap();
        let b = insert_sdf(
            &mut arena,
            Shape::Cuboid {
                half_extents: DVec3::splat(5.0),
            },
            RED,
        )
        .unwrap();
        let mut octree =
            create_sparse_octree(config(8.0, BuildMode::Lazy), &arena, vec![a, b]).unwrap();

        remove_sdf(&mut arena, b);
        let outcome = handle_request(&mut octree, &arena, DVec3::new(1.0, 0.1, 0.1), 1);
        assert_eq!(outcome, RequestOutcome::Expanded);

        // Children were classified against the sphere alone
        for candidates in octree.leaf_candidates.values() {
            assert_eq!(candidates, &vec![a]);
        }
    }

    #[test]
    fn test_capacity_stops_expansion() {
        let (arena, sphere) = sphere_scene(3.0);
        let mut cfg = config(8.0, BuildMode::Lazy);
        cfg.node_capacity = 9;
        let mut octree = create_sparse_octree(cfg, &arena, vec![sphere]).unwrap();

        let x = DVec3::new(3.0, 0.1, 0.1);
        assert_eq!(handle_request(&mut octree, &arena, x, 1), RequestOutcome::Expanded);
        assert_eq!(handle_request(&mut octree, &arena, x, 2), RequestOutcome::AtCapacity);
        assert_eq!(octree.nodes.len(), 9);
        assert!(octree.capacity_warned);
    }

    #[test]
    fn test_unbricked_leaf_is_refined_and_retried() {
        let mut arena = create_sdf_arena();
        let ball = insert_sdf(&mut arena, Shape::Sphere { radius: 1.0 }, RED).unwrap();
        let mut place = |translation: DVec3| {
            insert_sdf(
                &mut arena,
                Shape::Transform {
                    child: ball,
                    translation,
                    rotation: glam::DQuat::IDENTITY,
                },
                RED,
            )
            .unwrap()
        };
        let low = place(DVec3::splat(-4.0));
        let high = place(DVec3::splat(4.0));

        let mut cfg = config(8.0, BuildMode::Lazy);
        cfg.brick_capacity = 1;
        let mut octree = create_sparse_octree(cfg, &arena, vec![low, high]).unwrap();
        assert_eq!(
            node_kind(octree.nodes[0]),
            NodeKind::Leaf(LeafPayload::Brick(1))
        );

        // Octant 0 takes the only brick, octant 7 goes without
        let near_high = DVec3::new(4.0, 4.5, 4.0);
        let near_low = DVec3::new(-4.0, -3.5, -4.0);
        assert_eq!(
            handle_request(&mut octree, &arena, near_high, 1),
            RequestOutcome::Expanded
        );
        assert_eq!(
            node_kind(lookup(&octree, near_low).unwrap().node),
            NodeKind::Leaf(LeafPayload::Brick(1))
        );
        assert_eq!(
            node_kind(lookup(&octree, near_high).unwrap().node),
            NodeKind::Leaf(LeafPayload::Unbricked)
        );
        assert_eq!(
            handle_request(&mut octree, &arena, near_high, 1),
            RequestOutcome::AtCapacity
        );

        // Still refinable
        let inner = DVec3::splat(5.0);
        assert_eq!(
            handle_request(&mut octree, &arena, inner, 2),
            RequestOutcome::Expanded
        );
        let found = lookup(&octree, inner).unwrap();
        assert_eq!(found.depth, 2);
        assert_eq!(
            node_kind(found.node),
            NodeKind::Leaf(LeafPayload::Unbricked)
        );

        // Once an id is free again the next request picks it up
        let holder = lookup(&octree, near_low).unwrap();
        octree.nodes[holder.index as usize] = make_leaf(LeafPayload::Empty);
        octree.bricks.evict(1);
        drain_pending_uploads(&mut octree);

        assert_eq!(
            handle_request(&mut octree, &arena, inner, 2),
            RequestOutcome::Bricked
        );
        assert_eq!(
            node_kind(octree.nodes[found.index as usize]),
            NodeKind::Leaf(LeafPayload::Brick(1))
        );
        assert_eq!(
            drain_pending_uploads(&mut octree),
            vec![found.index..found.index + 1]
        );
    }

    #[test]
    fn test_pending_uploads_track_expansion() {
        let (arena, sphere) = sphere_scene(1.0);
        let mut octree =
            create_sparse_octree(config(8.0, BuildMode::Lazy), &arena, vec![sphere]).unwrap();
        assert_eq!(drain_pending_uploads(&mut octree), vec![0..1]);

        handle_request(&mut octree, &arena, DVec3::new(1.0, 0.1, 0.1), 1);
        assert_eq!(drain_pending_uploads(&mut octree), vec![0..9]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (arena, sphere) = sphere_scene(1.0);
        let mut cfg = config(8.0, BuildMode::Lazy);
        cfg.min_leaf_size = 0.0;
        assert!(create_sparse_octree(cfg, &arena, vec![sphere]).is_err());
    }
}
