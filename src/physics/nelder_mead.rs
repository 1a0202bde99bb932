//! Derivative-free minimisation over R^3
//!
//! Standard Nelder-Mead with reflection, expansion, contraction and shrink.
//! Stops when the simplex collapses below `EPSILON` on every axis, when the
//! best value drops below an optional threshold, or at the iteration cap.
//! Hitting the cap is not an error; the best vertex found is returned.

use super::aabb::{aabb_vertex, AABB};
use crate::constants::nelder_mead::{ALPHA, GAMMA, MAX_ITERATIONS, RHO, SIGMA};
use crate::constants::physics::EPSILON;
use glam::DVec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    pub x: DVec3,
    pub fx: f64,
    pub iterations: usize,
}

/// Four corners of `region` that span its volume (vertices 0, 3, 5 and 6)
pub fn box_simplex(region: &AABB) -> [DVec3; 4] {
    [
        aabb_vertex(region, 0),
        aabb_vertex(region, 3),
        aabb_vertex(region, 5),
        aabb_vertex(region, 6),
    ]
}

/// Minimise `f` starting from `simplex`. With `threshold`, stop as soon as a
/// vertex scores below it.
pub fn minimise<F: Fn(DVec3) -> f64>(f: F, simplex: [DVec3; 4], threshold: Option<f64>) -> Minimum {
    let mut vertices = simplex.map(|x| (x, f(x)));
    let mut iterations = 0;

    loop {
        vertices.sort_by(|a, b| a.1.total_cmp(&b.1));

        if threshold.map_or(false, |t| vertices[0].1 < t)
            || collapsed(&vertices)
            || iterations >= MAX_ITERATIONS
        {
            break;
        }
        iterations += 1;

        let (best, second_worst, worst) = (vertices[0].1, vertices[2].1, vertices[3]);
        let centroid = (vertices[0].0 + vertices[1].0 + vertices[2].0) / 3.0;

        let reflected = centroid + ALPHA * (centroid - worst.0);
        let f_reflected = f(reflected);

        if f_reflected < best {
            let expanded = centroid + GAMMA * (reflected - centroid);
            let f_expanded = f(expanded);
            vertices[3] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
            continue;
        }

        if f_reflected < second_worst {
            vertices[3] = (reflected, f_reflected);
            continue;
        }

        let contracted = if f_reflected < worst.1 {
            // Outside contraction
            let x = centroid + RHO * (reflected - centroid);
            let fx = f(x);
            (fx <= f_reflected).then_some((x, fx))
        } else {
            // Inside contraction
            let x = centroid + RHO * (worst.0 - centroid);
            let fx = f(x);
            (fx < worst.1).then_some((x, fx))
        };

        match contracted {
            Some(vertex) => vertices[3] = vertex,
            None => {
                let anchor = vertices[0].0;
                for vertex in vertices.iter_mut().skip(1) {
                    let x = anchor + SIGMA * (vertex.0 - anchor);
                    *vertex = (x, f(x));
                }
            }
        }
    }

    Minimum {
        x: vertices[0].0,
        fx: vertices[0].1,
        iterations,
    }
}

fn collapsed(vertices: &[(DVec3, f64); 4]) -> bool {
    let (min, max) = vertices.iter().fold(
        (DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)),
        |(lo, hi), (x, _)| (lo.min(*x), hi.max(*x)),
    );
    (max - min).cmplt(DVec3::splat(EPSILON)).all()
}
