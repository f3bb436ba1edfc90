//! Iterative solution of symmetric positive definite linear systems.
use nalgebra::{DMatrix, DVector, RealField};
use num_traits::Float;
use tracing::{debug, warn};

use crate::stop_criteria::{IterationStatus, SolverIterator};
use crate::Error;

/// Solve `$\mathbf{A}\vec{x} = \vec{b}$` with conjugate gradients, starting at `x0`.
///
/// `a` must be symmetric positive definite. Before every iteration the
/// `iterator` is asked for a verdict with the current iterate, `b` as the
/// source and `$\vec{b} - \mathbf{A}\vec{x}$` as the residual, and the solve
/// stops at the first terminal status. The iterator should therefore contain
/// an [`IterationCountStopCriterion`](struct.IterationCountStopCriterion.html),
/// otherwise a system the other criteria never accept runs forever.
///
/// If a search direction of non-positive curvature shows up, `a` is not
/// positive definite and the solve stops with
/// [`IterationStatus::Diverged`](enum.IterationStatus.html#variant.Diverged).
///
/// ```
/// # use nalgebra::{DMatrix, DVector};
/// use trust_region::{conjugate_gradient, IterationCountStopCriterion, IterationStatus,
///     ResidualStopCriterion, SolverIterator};
///
/// let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
/// let b = DVector::from_vec(vec![1.0, 2.0]);
/// let mut iterator = SolverIterator::new([
///     ResidualStopCriterion::new(1e-10, 0).into(),
///     IterationCountStopCriterion::new(10).into(),
/// ])?;
/// let (x, status) = conjugate_gradient(&a, &b, DVector::zeros(2), &mut iterator)?;
/// assert_eq!(status, IterationStatus::Converged);
/// assert!((&a * x - b).norm() < 1e-9);
/// # Ok::<(), trust_region::Error>(())
/// ```
///
/// # Errors
///
/// Fails if the dimensions of `a`, `b` and `x0` do not agree, or with the
/// errors of [`SolverIterator::determine_status`](struct.SolverIterator.html#method.determine_status).
pub fn conjugate_gradient<F: RealField + Float>(
    a: &DMatrix<F>,
    b: &DVector<F>,
    x0: DVector<F>,
    iterator: &mut SolverIterator<F>,
) -> Result<(DVector<F>, IterationStatus), Error> {
    let n = b.nrows();
    let shape_error = |what, actual| Error::DimensionMismatch {
        what,
        expected: n,
        actual,
    };
    if a.nrows() != n {
        return Err(shape_error("matrix rows", a.nrows()));
    }
    if a.ncols() != n {
        return Err(shape_error("matrix columns", a.ncols()));
    }
    if x0.nrows() != n {
        return Err(shape_error("initial guess", x0.nrows()));
    }

    let mut x = x0;
    let mut r = b - a * &x;
    let mut d = r.clone();
    let mut r_squared = r.dot(&r);
    let mut iteration = 0;
    loop {
        let status = iterator.determine_status(iteration, &x, b, &r)?;
        if status.is_terminal() {
            debug!(iteration, ?status, "conjugate gradient finished");
            return Ok((x, status));
        }
        iteration += 1;
        if r_squared.is_zero() {
            // exact solution; the criteria decide when to report it
            continue;
        }

        let ad = a * &d;
        let curvature = d.dot(&ad);
        if !(curvature > F::zero()) {
            warn!(iteration, "matrix is not positive definite");
            return Ok((x, IterationStatus::Diverged));
        }
        let alpha = r_squared / curvature;
        x.axpy(alpha, &d, F::one());
        r.axpy(-alpha, &ad, F::one());

        let next_r_squared = r.dot(&r);
        let beta = next_r_squared / r_squared;
        r_squared = next_r_squared;
        d = &r + d * beta;
    }
}
