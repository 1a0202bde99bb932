//! Engine-wide numeric constants
//!
//! Every tuning value the physics, octree and request code depends on lives
//! here so that resting-contact behaviour stays consistent across modules.

/// Physics constants
pub mod physics {
    /// Shared numerical tolerance for the whole physics subsystem.
    ///
    /// Used for Nelder-Mead termination, contact regime classification and
    /// degenerate-vector checks. Do not introduce per-module epsilons.
    pub const EPSILON: f64 = 1e-3;

    /// Pairs whose minimised field value is at most this far above zero are
    /// treated as anticipated (touching) contacts.
    pub const CONTACT_SKIN: f64 = 10.0 * EPSILON;

    /// Finite-difference step for the normal Jacobian used to pick which
    /// body's contact normal to trust
    pub const CONTACT_JACOBIAN_STEP: f64 = 10.0 * EPSILON;

    /// Default simulation rate of the physics thread
    pub const DEFAULT_RATE_HZ: f64 = 100.0;

    /// Largest timestep the adaptive mode will integrate in one tick
    pub const MAX_ADAPTIVE_DT: f64 = 1.0 / 20.0;

    /// Standard gravity (m/s^2), applied along -Y
    pub const GRAVITY: f64 = 9.81;

    /// Bodies whose position is below this height are considered settled
    pub const DEFAULT_FLOOR_HEIGHT: f64 = -90.0;

    /// Fraction of linear velocity lost per second
    pub const LINEAR_DAMPING: f64 = 0.05;

    /// Fraction of angular velocity lost per second
    pub const ANGULAR_DAMPING: f64 = 0.5;

    /// Speed below which a body may be considered inert (m/s)
    pub const SLEEP_LINEAR_SPEED: f64 = 0.05;

    /// Angular speed below which a body may be considered inert (rad/s)
    pub const SLEEP_ANGULAR_SPEED: f64 = 0.05;

    /// Acceleration below which a body may be considered inert (m/s^2)
    pub const SLEEP_ACCELERATION: f64 = 0.05;

    /// How long a body must stay below the sleep thresholds (seconds)
    pub const SLEEP_DURATION: f64 = 0.5;

    /// Seconds between tick-rate log lines
    pub const TICK_LOG_INTERVAL: f64 = 5.0;

    /// Samples per axis when integrating mass properties over an SDF
    pub const MASS_SAMPLES_PER_AXIS: usize = 16;
}

/// Nelder-Mead simplex coefficients and limits
pub mod nelder_mead {
    pub const ALPHA: f64 = 1.0;
    pub const GAMMA: f64 = 2.0;
    pub const RHO: f64 = 0.5;
    pub const SIGMA: f64 = 0.5;

    /// Hard iteration cap
    pub const MAX_ITERATIONS: usize = 100;
}

/// Signed distance field evaluation
pub mod sdf {
    /// Central-difference step for normals
    pub const NORMAL_STEP: f64 = 1e-5;

    /// Subdivision depth of a single bounds capture pass
    pub const BOUNDS_DEPTH: u32 = 4;

    /// Maximum number of refining bounds capture passes
    pub const BOUNDS_PASSES: u32 = 6;

    /// Extra splits of a finest-level cell whose long edges exceed the short
    /// ones by more than `BOUNDS_ANISOTROPY`
    pub const BOUNDS_RESHAPE_SPLITS: u32 = 3;

    pub const BOUNDS_ANISOTROPY: f64 = 1.5;

    /// Half edge of the cube searched for bounds when none is given
    pub const DEFAULT_BOUNDS_EXTENT: f64 = 64.0;
}

/// Octree layout and refinement
pub mod octree {
    /// Top bit of a node marks a leaf
    pub const LEAF_FLAG: u32 = 1 << 31;

    /// Remaining bits carry the child base index or leaf payload
    pub const PAYLOAD_MASK: u32 = !LEAF_FLAG;

    /// Node value meaning "not yet computed"
    pub const UNRESOLVED: u32 = 0;

    /// Leaf payload for a cube containing no surface and no interior
    pub const EMPTY_PAYLOAD: u32 = 0;

    /// Leaf payload for a cube fully inside some SDF
    pub const FILLED_PAYLOAD: u32 = PAYLOAD_MASK;

    /// Leaf payload for a surface cube still waiting for a brick; drawn solid
    pub const UNBRICKED_PAYLOAD: u32 = PAYLOAD_MASK - 1;

    /// Largest payload a brick id may take
    pub const MAX_BRICK_ID: u32 = PAYLOAD_MASK - 2;

    /// Finite-difference step for the flatness Jacobian, as a fraction of
    /// the cube edge
    pub const JACOBIAN_STEP_FRACTION: f64 = 0.25;

    /// Default node capacity of the octree buffer
    pub const DEFAULT_NODE_CAPACITY: usize = 1 << 20;

    /// Default minimum leaf cube edge
    pub const DEFAULT_MIN_LEAF_SIZE: f64 = 0.125;

    /// Default half edge of the universal cube
    pub const DEFAULT_RENDER_DISTANCE: f64 = 64.0;

    /// Default number of live brick payloads
    pub const DEFAULT_BRICK_CAPACITY: u32 = 1 << 16;

    /// Deepest level a lookup will ever descend to
    pub const MAX_DEPTH: u32 = 24;
}

/// GPU request channel sizing
pub mod gpu_limits {
    /// Default dispatch grid for the raymarching compute pass
    pub const DEFAULT_WORK_GROUP_COUNT: [u32; 2] = [60, 34];

    /// Default invocations per work group
    pub const DEFAULT_WORK_GROUP_SIZE: u32 = 64;

    /// Hard upper bound on request slots
    pub const MAX_REQUEST_SLOTS: u32 = 1 << 16;

    /// Maximum storage buffer binding size (128MB is the WebGPU default)
    pub const MAX_BUFFER_BINDING_SIZE: u64 = 128 * 1024 * 1024;
}
