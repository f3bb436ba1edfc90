use nalgebra::{DMatrix, DVector, RealField};
use num_traits::Float;

use crate::utils::differentiate_numerically;

/// A least squares minimization problem.
///
/// This is what [`ObjectiveModel`](struct.ObjectiveModel.html) needs
/// to compute the residuals and the Jacobian. See the [module documentation](index.html)
/// for a usage example.
///
/// Both methods receive the full, external parameter vector, including
/// parameters which are held fixed during the minimization.
pub trait LeastSquaresProblem<F>
where
    F: RealField + Float,
{
    /// Compute the residual vector `$\vec{r}(\vec{x})$`.
    ///
    /// Returning `None` marks the point as invalid. The minimizer treats
    /// this the same as a residual containing `NaN`.
    fn residuals(&self, x: &DVector<F>) -> Option<DVector<F>>;

    /// Compute the Jacobian `$\mathbf{J} = \partial\vec{r}/\partial\vec{x}$`.
    ///
    /// The default implementation approximates it with central differences.
    fn jacobian(&self, x: &DVector<F>) -> Option<DMatrix<F>> {
        differentiate_numerically(self, x)
    }
}

impl<F, P> LeastSquaresProblem<F> for &P
where
    F: RealField + Float,
    P: LeastSquaresProblem<F> + ?Sized,
{
    fn residuals(&self, x: &DVector<F>) -> Option<DVector<F>> {
        (**self).residuals(x)
    }

    fn jacobian(&self, x: &DVector<F>) -> Option<DMatrix<F>> {
        (**self).jacobian(x)
    }
}
