use crate::LeastSquaresProblem;
use nalgebra::{convert, DMatrix, DVector, RealField};
use num_traits::Float;

/// Compute a [numerical approximation](https://en.wikipedia.org/wiki/Numerical_differentiation)
/// to the Jacobian with central differences.
///
/// This is the default [`LeastSquaresProblem::jacobian`](trait.LeastSquaresProblem.html#method.jacobian).
/// You can also use it to check an analytic Jacobian in your tests.
///
/// The step for column `$j$` is `$h_j = \sqrt[3]{\varepsilon}\max(|x_j|, 1)$`,
/// so the truncation and rounding errors are balanced. The achieved precision
/// is still well below the floating point precision: expect errors around
/// `$10^{-10}$` for `f64`.
///
/// Returns `None` if any residual evaluation fails or the residual
/// dimension changes between evaluations.
pub fn differentiate_numerically<F, P>(problem: &P, x: &DVector<F>) -> Option<DMatrix<F>>
where
    F: RealField + Float,
    P: LeastSquaresProblem<F> + ?Sized,
{
    let step = Float::cbrt(<F as Float>::epsilon());
    difference_quotients(problem, x, step, true)
}

/// Forward difference approximation of the Jacobian.
///
/// Needs one residual evaluation per parameter less than
/// [`differentiate_numerically`](fn.differentiate_numerically.html) but is
/// only first order accurate.
pub fn forward_difference<F, P>(problem: &P, x: &DVector<F>) -> Option<DMatrix<F>>
where
    F: RealField + Float,
    P: LeastSquaresProblem<F> + ?Sized,
{
    let step = Float::sqrt(<F as Float>::epsilon());
    difference_quotients(problem, x, step, false)
}

fn difference_quotients<F, P>(
    problem: &P,
    x: &DVector<F>,
    step: F,
    central: bool,
) -> Option<DMatrix<F>>
where
    F: RealField + Float,
    P: LeastSquaresProblem<F> + ?Sized,
{
    let n = x.nrows();
    let center = if central {
        None
    } else {
        Some(problem.residuals(x)?)
    };
    let mut jacobian: Option<DMatrix<F>> = None;
    let mut probe = x.clone();
    for j in 0..n {
        let h = step * Float::max(Float::abs(x[j]), F::one());
        probe[j] = x[j] + h;
        let upper = problem.residuals(&probe)?;
        let (lower, width) = match &center {
            Some(center) => (center.clone(), probe[j] - x[j]),
            None => {
                let forward = probe[j];
                probe[j] = x[j] - h;
                (problem.residuals(&probe)?, forward - probe[j])
            }
        };
        probe[j] = x[j];

        let jac = jacobian.get_or_insert_with(|| DMatrix::zeros(upper.nrows(), n));
        if upper.nrows() != jac.nrows() || lower.nrows() != jac.nrows() {
            return None;
        }
        jac.set_column(j, &((upper - lower) / width));
    }
    match jacobian {
        Some(jacobian) => Some(jacobian),
        None => Some(DMatrix::zeros(problem.residuals(x)?.nrows(), 0)),
    }
}

/// Maximum absolute entry. `NaN` entries make the result `NaN`.
pub(crate) fn infinity_norm<F: RealField + Float>(v: &DVector<F>) -> F {
    v.iter().fold(F::zero(), |acc, &e| {
        let abs = Float::abs(e);
        if Float::is_nan(abs) || abs > acc {
            abs
        } else {
            acc
        }
    })
}

pub(crate) fn all_finite<F: RealField + Float>(v: &DVector<F>) -> bool {
    v.iter().all(|e| Float::is_finite(*e))
}

/// `$\frac{1}{2}\sum_i w_i r_i^2$`
pub(crate) fn half_weighted_norm_squared<F: RealField + Float>(
    residuals: &DVector<F>,
    weights: Option<&DVector<F>>,
) -> F {
    let half: F = convert(0.5);
    let sum = match weights {
        Some(weights) => residuals
            .iter()
            .zip(weights.iter())
            .fold(F::zero(), |acc, (&r, &w)| acc + w * r * r),
        None => residuals.norm_squared(),
    };
    sum * half
}
