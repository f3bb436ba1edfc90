//! Powell's dog-leg step.
use nalgebra::{DMatrix, DVector, RealField};
use num_traits::Float;
use tracing::trace;

use super::{boundary_intersection, Step, TrustRegionSubproblem};
use crate::utils::all_finite;

/// Dog-leg solution of the trust-region subproblem.
///
/// The step is taken along the piecewise linear path from the origin to the
/// Cauchy point
/// ```math
///   \vec{p}_\mathrm{C} = -\frac{\vec{g}^\top\vec{g}}{\vec{g}^\top\mathbf{H}\vec{g}}\,\vec{g}
/// ```
/// and on to the Gauss-Newton point `$\vec{p}_\mathrm{GN} = -\mathbf{H}^{-1}\vec{g}$`,
/// stopping where the path leaves the trust region:
///
/// 1. `$\|\vec{p}_\mathrm{GN}\|\leq\Delta$`: the Gauss-Newton step.
/// 2. `$\|\vec{p}_\mathrm{C}\|\geq\Delta$`: the Cauchy step shortened to length `$\Delta$`.
/// 3. otherwise `$\vec{p}_\mathrm{C} + \tau(\vec{p}_\mathrm{GN} - \vec{p}_\mathrm{C})$`
///    with `$\tau\in(0, 1]$` chosen so that the step has length `$\Delta$`.
///
/// If `$\mathbf{H}$` has no Cholesky factorization, only the Cauchy step is
/// used. If the curvature `$\vec{g}^\top\mathbf{H}\vec{g}$` is not positive,
/// the step goes along `$-\vec{g}$` to the boundary.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DogLeg;

impl<F: RealField + Float> TrustRegionSubproblem<F> for DogLeg {
    fn solve(&self, gradient: &DVector<F>, hessian: &DMatrix<F>, delta: F) -> Step<F> {
        let gradient_norm = gradient.norm();
        if gradient_norm.is_zero() {
            return Step {
                step: DVector::zeros(gradient.nrows()),
                hit_boundary: false,
            };
        }

        let gauss_newton = gauss_newton_step(gradient, hessian);
        if let Some(p) = &gauss_newton {
            if p.norm() <= delta {
                return Step {
                    step: p.clone(),
                    hit_boundary: false,
                };
            }
        }

        let curvature = gradient.dot(&(hessian * gradient));
        if !(curvature > F::zero()) {
            trace!("non-positive curvature along the gradient");
            return Step {
                step: gradient * (-delta / gradient_norm),
                hit_boundary: true,
            };
        }

        let cauchy = gradient * (-gradient.dot(gradient) / curvature);
        let cauchy_norm = cauchy.norm();
        if cauchy_norm >= delta {
            return Step {
                step: cauchy * (delta / cauchy_norm),
                hit_boundary: true,
            };
        }

        match gauss_newton {
            Some(p) => {
                let leg = p - &cauchy;
                let tau = Float::min(boundary_intersection(&cauchy, &leg, delta), F::one());
                Step {
                    step: cauchy + leg * tau,
                    hit_boundary: true,
                }
            }
            None => Step {
                step: cauchy,
                hit_boundary: false,
            },
        }
    }
}

/// Solve `$\mathbf{H}\vec{p} = -\vec{g}$`, or `None` if `$\mathbf{H}$` is not positive definite.
fn gauss_newton_step<F: RealField + Float>(
    gradient: &DVector<F>,
    hessian: &DMatrix<F>,
) -> Option<DVector<F>> {
    let step = match hessian.clone().cholesky() {
        Some(cholesky) => -cholesky.solve(gradient),
        None => {
            trace!("Gauss-Newton system is singular, using the Cauchy step");
            return None;
        }
    };
    if all_finite(&step) {
        Some(step)
    } else {
        None
    }
}
