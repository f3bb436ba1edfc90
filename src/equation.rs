use nalgebra::{DMatrix, DVector, RealField};
use num_traits::Float;

use crate::utils::differentiate_numerically;
use crate::{Error, LeastSquaresProblem, MinimizationReport, ObjectiveModel, TrustRegionMinimizer};

/// A convenience trait to fit the coefficients of a scalar model `$y = f(\vec{w}, x)$` to data.
///
/// For example:
///
/// ```
/// # use approx::assert_relative_eq;
/// use trust_region::Equation;
///
/// struct Problem;
///
/// impl Equation<2, f64> for Problem {
///     fn equation(&self, ws: &[f64; 2], x: f64) -> f64 {
///         // This is our equation; we want to find the coefficients `ws`.
///         ws[0] * 2.0 * x + ws[1] * 0.5 * x.powi(2)
///     }
///
///     fn derivatives(&self, _ws: &[f64; 2], x: f64) -> Option<[f64; 2]> {
///         // The partial derivatives, one for each coefficient.
///         Some([2.0 * x, 0.5 * x.powi(2)])
///     }
/// }
///
/// // Let's pick some coefficients...
/// let ws = [1.33, 0.66];
///
/// // ...and generate some data...
/// let xs = [1.0, 10.0, 100.0];
/// let ys = xs.map(|x| Problem.equation(&ws, x));
///
/// // Now we can minimize the residuals to calculate the coefficients from the data.
/// let ([w0, w1], report) = Problem.least_squares_fit(&xs, &ys, [1.5, 1.0])?;
/// assert!(report.is_success());
///
/// // They're the same as what we've picked!
/// assert_relative_eq!(w0, 1.33, epsilon = 1e-6);
/// assert_relative_eq!(w1, 0.66, epsilon = 1e-6);
/// # Ok::<(), trust_region::Error>(())
/// ```
pub trait Equation<const N_PARAMS: usize, T> {
    /// The equation for which we want to find the coefficients `ws`.
    fn equation(&self, ws: &[T; N_PARAMS], x: T) -> T;

    /// The partial derivatives of the equation with respect to `ws`.
    ///
    /// The default returns `None`, in which case the Jacobian is computed
    /// with [`differentiate_numerically`](fn.differentiate_numerically.html).
    fn derivatives(&self, _ws: &[T; N_PARAMS], _x: T) -> Option<[T; N_PARAMS]> {
        None
    }

    /// Transforms this equation into a [`LeastSquaresProblem`] with the
    /// residuals `$r_i(\vec{w}) = f(\vec{w}, x_i) - y_i$`.
    ///
    /// # Panics
    ///
    /// Panics if `xs` and `ys` are not of the same length.
    fn as_least_squares_problem<'a>(
        &'a self,
        xs: &'a [T],
        ys: &'a [T],
    ) -> impl LeastSquaresProblem<T> + 'a
    where
        T: RealField + Float,
        Self: 'a,
    {
        struct Samples<'a, const N_PARAMS: usize, T, E: ?Sized> {
            itself: &'a E,
            xs: &'a [T],
            ys: &'a [T],
        }

        impl<'a, const N_PARAMS: usize, T, E> Samples<'a, N_PARAMS, T, E>
        where
            T: RealField + Float,
            E: ?Sized + Equation<N_PARAMS, T>,
        {
            fn coefficients(p: &DVector<T>) -> Option<[T; N_PARAMS]> {
                if p.nrows() != N_PARAMS {
                    return None;
                }
                Some(core::array::from_fn(|i| p[i]))
            }
        }

        impl<'a, const N_PARAMS: usize, T, E> LeastSquaresProblem<T> for Samples<'a, N_PARAMS, T, E>
        where
            T: RealField + Float,
            E: ?Sized + Equation<N_PARAMS, T>,
        {
            fn residuals(&self, p: &DVector<T>) -> Option<DVector<T>> {
                let ws = Self::coefficients(p)?;
                Some(DVector::from_iterator(
                    self.xs.len(),
                    self.xs
                        .iter()
                        .zip(self.ys.iter())
                        .map(|(&x, &y)| self.itself.equation(&ws, x) - y),
                ))
            }

            fn jacobian(&self, p: &DVector<T>) -> Option<DMatrix<T>> {
                let ws = Self::coefficients(p)?;
                let mut jacobian = DMatrix::zeros(self.xs.len(), N_PARAMS);
                for (i, &x) in self.xs.iter().enumerate() {
                    match self.itself.derivatives(&ws, x) {
                        Some(derivatives) => {
                            for (n, d) in derivatives.into_iter().enumerate() {
                                jacobian[(i, n)] = d;
                            }
                        }
                        None => return differentiate_numerically(self, p),
                    }
                }
                Some(jacobian)
            }
        }

        assert_eq!(xs.len(), ys.len(), "xs and ys must have the same length");
        Samples::<N_PARAMS, T, Self> {
            itself: self,
            xs,
            ys,
        }
    }

    /// Fit the coefficients with the default dog-leg
    /// [`TrustRegionMinimizer`](struct.TrustRegionMinimizer.html).
    ///
    /// Equivalent to the following code:
    ///
    /// ```
    /// # use nalgebra::DVector;
    /// # use trust_region::{Equation, ObjectiveModel, TrustRegionMinimizer};
    /// # struct Problem;
    /// # impl Equation<2, f64> for Problem {
    /// #     fn equation(&self, ws: &[f64; 2], x: f64) -> f64 { ws[0] + ws[1] * x }
    /// # }
    /// # let xs = [0.0, 1.0, 2.0];
    /// # let ys = [1.0, 3.0, 5.0];
    /// # let initial_guess = [0.0, 0.0];
    /// let mut model = ObjectiveModel::new(Problem.as_least_squares_problem(&xs, &ys));
    /// model.set_parameters(DVector::from_column_slice(&initial_guess), None)?;
    /// let report = TrustRegionMinimizer::dog_leg().minimize(&model)?;
    /// let result: [f64; 2] = core::array::from_fn(|i| report.minimizing_point[i]);
    /// # Ok::<(), trust_region::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Fails if the initial guess is not finite.
    ///
    /// # Panics
    ///
    /// Panics if `xs` and `ys` are not of the same length.
    fn least_squares_fit(
        &self,
        xs: &[T],
        ys: &[T],
        initial_guess: [T; N_PARAMS],
    ) -> Result<([T; N_PARAMS], MinimizationReport<T>), Error>
    where
        T: RealField + Float,
    {
        let mut model = ObjectiveModel::new(self.as_least_squares_problem(xs, ys));
        model.set_parameters(DVector::from_column_slice(&initial_guess), None)?;
        let report = TrustRegionMinimizer::dog_leg().minimize(&model)?;
        let ws = core::array::from_fn(|i| report.minimizing_point[i]);
        Ok((ws, report))
    }
}
