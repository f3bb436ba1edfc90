//! Steihaug's truncated conjugate gradient method.
use nalgebra::{convert, DMatrix, DVector, RealField};
use num_traits::Float;
use tracing::trace;

use super::{boundary_intersection, Step, TrustRegionSubproblem};

/// Newton-CG solution of the trust-region subproblem.
///
/// Runs conjugate gradients on `$\mathbf{H}\vec{p} = -\vec{g}$` starting at
/// `$\vec{p} = \vec{0}$`. The iteration stops
///
/// - at the boundary, if a direction of non-positive curvature shows up or
///   the next iterate would leave the trust region,
/// - inside, once the residual drops below
///   `$\min(\frac{1}{2}, \sqrt{\|\vec{g}\|})\,\|\vec{g}\|$`,
/// - inside, after the maximal number of iterations (the dimension by default).
///
/// # Reference
///
/// > Steihaug T. (1983) The conjugate gradient method and trust regions in large
/// > scale optimization. SIAM Journal on Numerical Analysis 20(3), 626-637.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct NewtonCg {
    maximum_iterations: Option<usize>,
}

impl NewtonCg {
    pub fn new() -> Self {
        Self {
            maximum_iterations: None,
        }
    }

    /// Cap the number of conjugate gradient iterations.
    ///
    /// # Panics
    ///
    /// Panics if `$\mathtt{maximum\_iterations} = 0$`.
    pub fn with_maximum_iterations(self, maximum_iterations: usize) -> Self {
        assert!(maximum_iterations > 0, "maximum_iterations must be > 0");
        Self {
            maximum_iterations: Some(maximum_iterations),
        }
    }
}

impl<F: RealField + Float> TrustRegionSubproblem<F> for NewtonCg {
    fn solve(&self, gradient: &DVector<F>, hessian: &DMatrix<F>, delta: F) -> Step<F> {
        let n = gradient.nrows();
        let mut z = DVector::zeros(n);
        let gradient_norm = gradient.norm();
        if gradient_norm.is_zero() {
            return Step {
                step: z,
                hit_boundary: false,
            };
        }
        let half: F = convert(0.5);
        let tolerance = Float::min(half, Float::sqrt(gradient_norm)) * gradient_norm;

        let mut r = gradient.clone();
        let mut d = -gradient.clone();
        let mut r_squared = r.dot(&r);
        let to_boundary = |z: &DVector<F>, d: &DVector<F>| {
            let tau = boundary_intersection(z, d, delta);
            Step {
                step: z + d * tau,
                hit_boundary: true,
            }
        };

        for _ in 0..self.maximum_iterations.unwrap_or(n).max(1) {
            let hd = hessian * &d;
            let curvature = d.dot(&hd);
            if !(curvature > F::zero()) {
                trace!("negative curvature direction in Newton-CG");
                return to_boundary(&z, &d);
            }

            let alpha = r_squared / curvature;
            let next = &z + &d * alpha;
            if next.norm() >= delta {
                return to_boundary(&z, &d);
            }
            z = next;

            r += hd * alpha;
            let next_r_squared = r.dot(&r);
            if Float::sqrt(next_r_squared) < tolerance {
                break;
            }
            let beta = next_r_squared / r_squared;
            r_squared = next_r_squared;
            d = d * beta - &r;
        }

        Step {
            step: z,
            hit_boundary: false,
        }
    }
}
