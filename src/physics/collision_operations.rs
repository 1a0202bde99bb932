//! Collision Operations - narrow phase and contact resolution
//!
//! Detection minimises max(phi_a, phi_b) over the overlap of the two world
//! bounds. The minimum is negative exactly where the bodies share volume, and
//! its location is used as the contact point. Resolution picks one contact
//! normal, classifies the contact and applies impulses, positional correction
//! and friction.

use super::aabb::aabb_intersection;
use super::collision_data::{Collision, ContactRegime, LocalContact};
use super::material::{combined_friction, combined_restitution};
use super::matter::{DerivedProperties, Matter};
use super::nelder_mead::{box_simplex, minimise};
use crate::constants::physics::{CONTACT_JACOBIAN_STEP, CONTACT_SKIN, EPSILON};
use crate::math::frobenius_norm;
use crate::sdf::{jacobian, normal, SdfArena};
use glam::DVec3;

/// Combined field of a pair; an expired shape never contributes volume
fn pair_field(arena: &SdfArena, a: &Matter, b: &Matter, x: DVec3) -> f64 {
    let pa = a.phi(arena, x).unwrap_or(f64::INFINITY);
    let pb = b.phi(arena, x).unwrap_or(f64::INFINITY);
    pa.max(pb)
}

/// Test one pair of bodies.
///
/// Pairs whose world bounds are disjoint, or whose shapes have expired, are
/// reported as a miss without running the minimiser.
pub fn detect(arena: &SdfArena, a: &Matter, b: &Matter) -> Collision {
    let miss = Collision::miss(a.id, b.id);

    let (Some(props_a), Some(props_b)) = (a.properties(arena), b.properties(arena)) else {
        return miss;
    };
    let Some(region) = aabb_intersection(&a.world_bounds(props_a), &b.world_bounds(props_b))
    else {
        return miss;
    };

    let m = minimise(|x| pair_field(arena, a, b, x), box_simplex(&region), None);

    let local = if m.fx <= CONTACT_SKIN {
        let point_a = a.to_local(m.x);
        let point_b = b.to_local(m.x);
        Some(LocalContact {
            point_a,
            point_b,
            normal_a: normal(arena, a.sdf, point_a).unwrap_or(DVec3::ZERO),
            normal_b: normal(arena, b.sdf, point_b).unwrap_or(DVec3::ZERO),
        })
    } else {
        None
    };

    Collision {
        body_a: a.id,
        body_b: b.id,
        hit: m.fx <= 0.0,
        fx: m.fx,
        contact: m.x,
        local,
    }
}

/// Cheaper existence check: stops as soon as any shared interior point is
/// found instead of searching for the deepest one.
pub fn bodies_intersect(arena: &SdfArena, a: &Matter, b: &Matter) -> bool {
    let (Some(props_a), Some(props_b)) = (a.properties(arena), b.properties(arena)) else {
        return false;
    };
    let Some(region) = aabb_intersection(&a.world_bounds(props_a), &b.world_bounds(props_b))
    else {
        return false;
    };
    minimise(|x| pair_field(arena, a, b, x), box_simplex(&region), Some(0.0)).fx <= 0.0
}

/// World-space contact normal pointing from `a` towards `b`.
///
/// Trusts the body whose surface normal varies least around the contact and
/// falls back to the other one when that normal is degenerate.
fn contact_normal(arena: &SdfArena, a: &Matter, b: &Matter, local: &LocalContact) -> Option<DVec3> {
    let n_a = (a.rotation * local.normal_a).normalize_or_zero();
    let n_b = -(b.rotation * local.normal_b).normalize_or_zero();

    let variation = |body: &Matter, x: DVec3| {
        jacobian(arena, body.sdf, x, CONTACT_JACOBIAN_STEP).map(|j| frobenius_norm(&j))
    };
    let prefer_a = match (
        variation(a, local.point_a),
        variation(b, local.point_b),
    ) {
        (Some(ja), Some(jb)) => ja <= jb,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => return None,
    };

    let (first, second) = if prefer_a { (n_a, n_b) } else { (n_b, n_a) };
    if first != DVec3::ZERO {
        Some(first)
    } else if second != DVec3::ZERO {
        Some(second)
    } else {
        None
    }
}

/// Rotational contribution of a body to the effective mass along `n`
fn angular_term(body: &Matter, props: &DerivedProperties, n: DVec3, x: DVec3) -> f64 {
    let r = x - body.world_centre_of_mass(props);
    n.dot((body.world_inverse_inertia(props) * r.cross(n)).cross(r))
}

/// Resolve a detected contact in place.
///
/// `c` must come from `detect(arena, a, b)` this tick. Returns how the
/// contact was treated.
pub fn correct(
    arena: &SdfArena,
    c: &Collision,
    a: &mut Matter,
    b: &mut Matter,
    dt: f64,
) -> ContactRegime {
    let Some(local) = c.local else {
        return ContactRegime::Skipped;
    };
    let (Some(props_a), Some(props_b)) = (
        a.properties(arena).cloned(),
        b.properties(arena).cloned(),
    ) else {
        return ContactRegime::Skipped;
    };

    let inverse_mass_sum = props_a.inverse_mass + props_b.inverse_mass;
    if inverse_mass_sum <= 0.0 {
        return ContactRegime::Skipped;
    }
    let Some(n) = contact_normal(arena, a, b, &local) else {
        log::debug!(
            "[Collision::correct] no usable normal for pair {}/{}",
            a.id,
            b.id
        );
        return ContactRegime::Skipped;
    };

    let x = c.contact;
    let share_a = props_a.inverse_mass / inverse_mass_sum;
    let share_b = props_b.inverse_mass / inverse_mass_sum;

    let vr = a.velocity_at(&props_a, x) - b.velocity_at(&props_b, x);
    let vrn = vr.dot(n);
    let arn = (a.acceleration - b.acceleration).dot(n);
    // Approach speed one tick of the pressing acceleration can build up
    let resting_speed = EPSILON + 2.0 * arn.max(0.0) * dt;

    let regime = if vrn < -EPSILON {
        ContactRegime::Separating
    } else if vrn <= resting_speed {
        ContactRegime::Resting
    } else if c.hit {
        ContactRegime::Colliding
    } else {
        ContactRegime::Closing
    };

    // Only penetration is corrected; a gap is left to the velocities
    let depth = c.depth();
    if depth > 0.0 {
        a.translate(-n * depth * share_a);
        b.translate(n * depth * share_b);
    }

    match regime {
        ContactRegime::Colliding => {
            let e = combined_restitution(&a.material, &b.material);
            let denominator = inverse_mass_sum
                + angular_term(a, &props_a, n, x)
                + angular_term(b, &props_b, n, x);
            let jr = (1.0 + e) * vrn / denominator;

            a.apply_impulse(&props_a, -jr * n, x);
            b.apply_impulse(&props_b, jr * n, x);
            apply_friction(a, b, &props_a, &props_b, vr, vrn, n, jr, x);

            if !a.fixed {
                a.wake();
            }
            if !b.fixed {
                b.wake();
            }
        }
        ContactRegime::Resting => {
            // Closing speed that uses up at most the remaining gap this tick.
            // The minimised value never exceeds the gap; anything within
            // EPSILON of it counts as touching.
            let allowed = if dt > 0.0 {
                (-depth - EPSILON).max(0.0) / dt
            } else {
                0.0
            };

            let excess_velocity = (vrn - allowed).max(0.0);
            a.velocity -= n * excess_velocity * share_a;
            b.velocity += n * excess_velocity * share_b;

            let headroom = if dt > 0.0 {
                (allowed - vrn.max(0.0)).max(0.0) / dt
            } else {
                0.0
            };
            let excess_acceleration = (arn - headroom).max(0.0);
            a.acceleration -= n * excess_acceleration * share_a;
            b.acceleration += n * excess_acceleration * share_b;

            // Normal impulse the constraint stands in for, used as the
            // friction bound
            let jr = (excess_velocity + excess_acceleration * dt) / inverse_mass_sum;
            apply_friction(a, b, &props_a, &props_b, vr, vrn, n, jr, x);
        }
        ContactRegime::Separating | ContactRegime::Closing | ContactRegime::Skipped => {}
    }

    log::trace!(
        "[Collision::correct] pair {}/{} {:?} depth {:.4} vrn {:.4}",
        a.id,
        b.id,
        regime,
        depth,
        vrn
    );
    regime
}

/// Coulomb friction: stick if the impulse needed to stop sliding is within
/// the static cone, otherwise slide with the dynamic coefficient.
#[allow(clippy::too_many_arguments)]
fn apply_friction(
    a: &mut Matter,
    b: &mut Matter,
    props_a: &DerivedProperties,
    props_b: &DerivedProperties,
    vr: DVec3,
    vrn: f64,
    n: DVec3,
    jr: f64,
    x: DVec3,
) {
    let t = (vr - n * vrn).normalize_or_zero();
    if t == DVec3::ZERO {
        return;
    }

    let (mu_static, mu_dynamic) = combined_friction(&a.material, &b.material);
    let effective_mass = 1.0
        / (props_a.inverse_mass
            + props_b.inverse_mass
            + angular_term(a, props_a, t, x)
            + angular_term(b, props_b, t, x));
    let stopping = effective_mass * vr.dot(t);

    let k = if stopping <= mu_static * jr {
        stopping
    } else {
        mu_dynamic * jr
    };

    a.apply_impulse(props_a, -k * t, x);
    b.apply_impulse(props_b, k * t, x);
}
