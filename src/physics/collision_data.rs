use super::matter::BodyId;
use glam::DVec3;

/// Result of testing one pair of bodies for the current tick.
///
/// Built fresh every tick and discarded once resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collision {
    pub body_a: BodyId,
    pub body_b: BodyId,

    /// Minimised combined field value is at or below zero
    pub hit: bool,

    /// Minimised value of max(phi_a, phi_b); +inf when the bounds are disjoint
    pub fx: f64,

    /// Point of deepest mutual penetration (or nearest approach), world space
    pub contact: DVec3,

    /// Contact point and outward surface normal in each body's local space.
    /// Filled in for hits and anticipated contacts only.
    pub local: Option<LocalContact>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalContact {
    pub point_a: DVec3,
    pub point_b: DVec3,
    pub normal_a: DVec3,
    pub normal_b: DVec3,
}

impl Collision {
    /// A record for a pair whose bounds do not overlap
    pub fn miss(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            hit: false,
            fx: f64::INFINITY,
            contact: DVec3::ZERO,
            local: None,
        }
    }

    /// Penetration depth: positive when overlapping, negative for a gap
    pub fn depth(&self) -> f64 {
        -self.fx
    }

    /// Close enough to be resolved this tick
    pub fn is_contact(&self, skin: f64) -> bool {
        self.hit || self.fx <= skin
    }
}

/// How `correct` treated a contact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactRegime {
    /// Approaching: impulse applied
    Colliding,
    /// Near-zero relative normal velocity: acceleration constrained
    Resting,
    /// Moving apart: nothing beyond positional correction
    Separating,
    /// Not yet touching and still closing fast; left for the next tick
    Closing,
    /// No usable normal or both bodies immovable
    Skipped,
}

/// Collision statistics for performance monitoring
#[derive(Debug, Default, Clone)]
pub struct CollisionStats {
    pub pairs_tested: usize,
    pub bounds_overlaps: usize,
    pub hits: usize,
    pub anticipated: usize,
    pub colliding: usize,
    pub resting: usize,
    pub narrow_phase_time_us: u64,
    pub solver_time_us: u64,
}

impl CollisionStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn total_time_us(&self) -> u64 {
        self.narrow_phase_time_us + self.solver_time_us
    }

    pub fn record_regime(&mut self, regime: ContactRegime) {
        match regime {
            ContactRegime::Colliding => self.colliding += 1,
            ContactRegime::Resting => self.resting += 1,
            ContactRegime::Separating | ContactRegime::Closing | ContactRegime::Skipped => {}
        }
    }
}
