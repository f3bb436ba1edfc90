//! The objective model: residuals, bounds, scales, weights and fixed parameters.
//!
//! The minimizers work on an _internal_ parameter vector which contains only
//! the free parameters and is unconstrained. Bounded parameters are mapped
//! onto their interval by smooth monotone transforms, and scales are applied
//! on top. The user problem only ever sees the full _external_ vector.
use nalgebra::{convert, DMatrix, DVector, RealField};
use num_traits::Float;
use tracing::warn;

use crate::utils::{differentiate_numerically, forward_difference, half_weighted_norm_squared};
use crate::{Error, LeastSquaresProblem};

/// Which finite differences to use instead of [`LeastSquaresProblem::jacobian`](trait.LeastSquaresProblem.html#method.jacobian).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NumericalJacobian {
    /// One-sided differences, one extra residual evaluation per parameter.
    Forward,
    /// Central differences, two residual evaluations per parameter.
    Central,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Bound<F> {
    Unbounded,
    Lower(F),
    Upper(F),
    Both(F, F),
}

/// Bijection between one internal and one external parameter.
#[derive(Copy, Clone, Debug, PartialEq)]
struct ParameterTransform<F> {
    /// Position in the external vector.
    index: usize,
    bound: Bound<F>,
    scale: F,
}

impl<F: RealField + Float> ParameterTransform<F> {
    fn to_external(&self, internal: F) -> F {
        let t = internal * self.scale;
        let one = F::one();
        match self.bound {
            Bound::Unbounded => t,
            Bound::Lower(l) => l - one + Float::sqrt(t * t + one),
            Bound::Upper(u) => u + one - Float::sqrt(t * t + one),
            Bound::Both(l, u) => {
                let half: F = convert(0.5);
                l + (u - l) * half * (Float::sin(t) + one)
            }
        }
    }

    fn to_internal(&self, external: F) -> F {
        let one = F::one();
        let t = match self.bound {
            Bound::Unbounded => external,
            Bound::Lower(l) => Float::sqrt(Float::powi(external - l + one, 2) - one),
            Bound::Upper(u) => Float::sqrt(Float::powi(u - external + one, 2) - one),
            Bound::Both(l, u) => {
                let two: F = convert(2.0);
                let s = two * (external - l) / (u - l) - one;
                Float::asin(Float::max(-one, Float::min(one, s)))
            }
        };
        t / self.scale
    }

    /// `$\mathrm{d}\,\mathrm{ext} / \mathrm{d}\,\mathrm{int}$`
    fn derivative(&self, internal: F) -> F {
        let t = internal * self.scale;
        let one = F::one();
        let d = match self.bound {
            Bound::Unbounded => one,
            Bound::Lower(_) => t / Float::sqrt(t * t + one),
            Bound::Upper(_) => -t / Float::sqrt(t * t + one),
            Bound::Both(l, u) => {
                let half: F = convert(0.5);
                (u - l) * half * Float::cos(t)
            }
        };
        d * self.scale
    }
}

/// State established by [`ObjectiveModel::set_parameters`](struct.ObjectiveModel.html#method.set_parameters).
#[derive(Clone, Debug)]
struct Projection<F: RealField> {
    /// External initial guess; fixed entries are read from here.
    guess: DVector<F>,
    free: Vec<usize>,
    transforms: Vec<ParameterTransform<F>>,
}

/// Residuals and objective value at one point.
#[derive(Clone, Debug)]
pub struct Evaluation<F: RealField> {
    /// Internal (free, unconstrained) point.
    pub point: DVector<F>,
    /// External parameters handed to the problem.
    pub parameters: DVector<F>,
    /// `None` if the problem failed to compute them.
    pub residuals: Option<DVector<F>>,
    /// `$\frac{1}{2}\sum_i w_i r_i^2$`, `NaN` for invalid residuals.
    pub value: F,
}

impl<F: RealField + Float> Evaluation<F> {
    /// Whether the objective value is a finite number.
    pub fn is_valid(&self) -> bool {
        Float::is_finite(self.value)
    }

    /// The weighted residual sum of squares, `$\sum_i w_i r_i^2$`.
    pub fn rss(&self) -> F {
        self.value * convert(2.0)
    }
}

/// An [`Evaluation`](struct.Evaluation.html) together with the derivatives at the same point.
#[derive(Clone, Debug)]
pub struct Linearization<F: RealField> {
    pub evaluation: Evaluation<F>,
    /// Jacobian with respect to all external parameters.
    pub external_jacobian: DMatrix<F>,
    /// Jacobian with respect to the internal parameters.
    pub jacobian: DMatrix<F>,
    /// `$\mathbf{J}^\top\mathbf{W}\vec{r}$` in internal space.
    pub gradient: DVector<F>,
    /// Gauss-Newton approximation `$\mathbf{J}^\top\mathbf{W}\mathbf{J}$` in internal space.
    pub hessian: DMatrix<F>,
}

impl<F: RealField + Float> Linearization<F> {
    pub fn value(&self) -> F {
        self.evaluation.value
    }

    pub fn point(&self) -> &DVector<F> {
        &self.evaluation.point
    }
}

/// Objective `$\frac{1}{2}\sum_i w_i r_i(\vec{x})^2$` of a [`LeastSquaresProblem`](trait.LeastSquaresProblem.html).
///
/// Bounds, scales and weights are configured with the `with_*` methods and
/// validated by [`set_parameters`](#method.set_parameters), which must be
/// called before evaluating.
///
/// Bound entries which are not finite leave that side of the parameter
/// unbounded. A parameter with equal lower and upper bound is held fixed.
#[derive(Clone, Debug)]
pub struct ObjectiveModel<F: RealField, P> {
    problem: P,
    lower: Option<DVector<F>>,
    upper: Option<DVector<F>>,
    scales: Option<DVector<F>>,
    weights: Option<DVector<F>>,
    numerical_jacobian: Option<NumericalJacobian>,
    projection: Option<Projection<F>>,
}

impl<F, P> ObjectiveModel<F, P>
where
    F: RealField + Float,
    P: LeastSquaresProblem<F>,
{
    pub fn new(problem: P) -> Self {
        Self {
            problem,
            lower: None,
            upper: None,
            scales: None,
            weights: None,
            numerical_jacobian: None,
            projection: None,
        }
    }

    /// Set element-wise lower bounds for the external parameters.
    pub fn with_lower_bounds(self, lower: DVector<F>) -> Self {
        Self {
            lower: Some(lower),
            projection: None,
            ..self
        }
    }

    /// Set element-wise upper bounds for the external parameters.
    pub fn with_upper_bounds(self, upper: DVector<F>) -> Self {
        Self {
            upper: Some(upper),
            projection: None,
            ..self
        }
    }

    pub fn with_bounds(self, lower: DVector<F>, upper: DVector<F>) -> Self {
        self.with_lower_bounds(lower).with_upper_bounds(upper)
    }

    /// Set the typical magnitude of each parameter.
    ///
    /// The internal parameter is divided by its scale, which improves the
    /// conditioning when parameters differ by orders of magnitude.
    pub fn with_scales(self, scales: DVector<F>) -> Self {
        Self {
            scales: Some(scales),
            projection: None,
            ..self
        }
    }

    /// Set the weight `$w_i$` of every residual.
    ///
    /// A weight vector whose length differs from the residual vector makes
    /// every evaluation invalid. Like the other builders this discards the
    /// initial guess; call [`set_parameters`](#method.set_parameters) afterwards.
    pub fn with_weights(self, weights: DVector<F>) -> Self {
        Self {
            weights: Some(weights),
            projection: None,
            ..self
        }
    }

    /// Ignore [`LeastSquaresProblem::jacobian`](trait.LeastSquaresProblem.html#method.jacobian)
    /// and use finite differences.
    pub fn with_numerical_jacobian(self, kind: NumericalJacobian) -> Self {
        Self {
            numerical_jacobian: Some(kind),
            ..self
        }
    }

    pub fn problem(&self) -> &P {
        &self.problem
    }

    pub fn into_problem(self) -> P {
        self.problem
    }

    /// Establish the starting point and which parameters stay constant.
    ///
    /// `is_fixed[i] == true` keeps parameter `$i$` at `initial_guess[i]`;
    /// it is removed from the internal vector but still passed to the problem.
    ///
    /// # Errors
    ///
    /// Fails if a bound, scale or mask has a different length than the guess,
    /// if `lower > upper` or the guess lies outside its bounds, if a scale is
    /// not positive and finite, if a weight is negative, or if no parameter
    /// is left free.
    pub fn set_parameters(
        &mut self,
        initial_guess: DVector<F>,
        is_fixed: Option<&[bool]>,
    ) -> Result<(), Error> {
        let n = initial_guess.nrows();
        check_len("lower bounds", self.lower.as_ref().map(|v| v.nrows()), n)?;
        check_len("upper bounds", self.upper.as_ref().map(|v| v.nrows()), n)?;
        check_len("scales", self.scales.as_ref().map(|v| v.nrows()), n)?;
        check_len("fixed mask", is_fixed.map(|m| m.len()), n)?;
        if let Some(weights) = &self.weights {
            if let Some(index) = weights.iter().position(|w| !(Float::is_finite(*w) && *w >= F::zero())) {
                return Err(Error::InvalidWeights { index });
            }
        }

        let mut free = Vec::with_capacity(n);
        let mut transforms = Vec::with_capacity(n);
        for (index, &x) in initial_guess.iter().enumerate() {
            let lower = self.lower.as_ref().map(|v| v[index]);
            let upper = self.upper.as_ref().map(|v| v[index]);
            let invalid = |reason| Error::InvalidBounds { index, reason };
            if lower.map_or(false, Float::is_nan) || upper.map_or(false, Float::is_nan) {
                return Err(invalid("bound is NaN"));
            }
            if let (Some(l), Some(u)) = (lower, upper) {
                if l > u {
                    return Err(invalid("lower bound exceeds upper bound"));
                }
            }
            if !Float::is_finite(x) {
                return Err(invalid("initial guess is not finite"));
            }
            if lower.map_or(false, |l| x < l) || upper.map_or(false, |u| x > u) {
                return Err(invalid("initial guess lies outside the bounds"));
            }

            let scale = self.scales.as_ref().map_or(F::one(), |s| s[index]);
            if !(Float::is_finite(scale) && scale > F::zero()) {
                return Err(Error::InvalidScales { index });
            }

            let lower = lower.filter(|l| Float::is_finite(*l));
            let upper = upper.filter(|u| Float::is_finite(*u));
            let bound = match (lower, upper) {
                (Some(l), Some(u)) if l == u => continue,
                (Some(l), Some(u)) => Bound::Both(l, u),
                (Some(l), None) => Bound::Lower(l),
                (None, Some(u)) => Bound::Upper(u),
                (None, None) => Bound::Unbounded,
            };
            if is_fixed.map_or(false, |m| m[index]) {
                continue;
            }
            free.push(index);
            transforms.push(ParameterTransform {
                index,
                bound,
                scale,
            });
        }
        if free.is_empty() {
            return Err(Error::NoFreeParameters);
        }

        self.projection = Some(Projection {
            guess: initial_guess,
            free,
            transforms,
        });
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.projection.is_some()
    }

    fn projection(&self) -> &Projection<F> {
        match &self.projection {
            Some(projection) => projection,
            None => panic!("set_parameters must be called before evaluating the objective"),
        }
    }

    /// Indices of the external parameters which are free.
    ///
    /// # Panics
    ///
    /// Panics if [`set_parameters`](#method.set_parameters) was not called.
    pub fn free_parameters(&self) -> &[usize] {
        &self.projection().free
    }

    /// The number of external parameters.
    ///
    /// # Panics
    ///
    /// Panics if [`set_parameters`](#method.set_parameters) was not called.
    pub fn number_of_parameters(&self) -> usize {
        self.projection().guess.nrows()
    }

    /// The internal point corresponding to the initial guess.
    ///
    /// # Panics
    ///
    /// Panics if [`set_parameters`](#method.set_parameters) was not called.
    pub fn initial_point(&self) -> DVector<F> {
        self.to_internal(&self.projection().guess)
    }

    /// Map an external parameter vector onto the internal space.
    ///
    /// # Panics
    ///
    /// Panics if [`set_parameters`](#method.set_parameters) was not called.
    pub fn to_internal(&self, external: &DVector<F>) -> DVector<F> {
        let projection = self.projection();
        DVector::from_iterator(
            projection.transforms.len(),
            projection
                .transforms
                .iter()
                .map(|t| t.to_internal(external[t.index])),
        )
    }

    /// Map an internal point to the full external parameter vector.
    ///
    /// # Panics
    ///
    /// Panics if [`set_parameters`](#method.set_parameters) was not called.
    pub fn to_external(&self, internal: &DVector<F>) -> DVector<F> {
        let projection = self.projection();
        let mut external = projection.guess.clone();
        for (t, &p) in projection.transforms.iter().zip(internal.iter()) {
            external[t.index] = t.to_external(p);
        }
        external
    }

    /// Evaluate the residuals and the objective value at an internal point.
    ///
    /// # Panics
    ///
    /// Panics if [`set_parameters`](#method.set_parameters) was not called.
    pub fn evaluate_at(&self, point: &DVector<F>) -> Evaluation<F> {
        let parameters = self.to_external(point);
        let residuals = self.problem.residuals(&parameters);
        let value = match (&residuals, &self.weights) {
            (None, _) => Float::nan(),
            (Some(r), Some(w)) if r.nrows() != w.nrows() => {
                warn!(
                    residuals = r.nrows(),
                    weights = w.nrows(),
                    "weight vector does not match the residuals"
                );
                Float::nan()
            }
            (Some(r), weights) => half_weighted_norm_squared(r, weights.as_ref()),
        };
        Evaluation {
            point: point.clone(),
            parameters,
            residuals,
            value: if Float::is_finite(value) {
                value
            } else {
                Float::nan()
            },
        }
    }

    fn external_jacobian(&self, parameters: &DVector<F>) -> Option<DMatrix<F>> {
        match self.numerical_jacobian {
            None => self.problem.jacobian(parameters),
            Some(NumericalJacobian::Central) => differentiate_numerically(&self.problem, parameters),
            Some(NumericalJacobian::Forward) => forward_difference(&self.problem, parameters),
        }
    }

    /// Compute the Jacobian, gradient and Gauss-Newton Hessian at an evaluated point.
    ///
    /// Fixed parameters contribute no column. If the residuals or the
    /// Jacobian are unavailable, the derivatives are filled with `NaN`.
    ///
    /// # Panics
    ///
    /// Panics if [`set_parameters`](#method.set_parameters) was not called.
    pub fn linearize(&self, evaluation: Evaluation<F>) -> Linearization<F> {
        let projection = self.projection();
        let n = projection.transforms.len();
        let m = evaluation.residuals.as_ref().map_or(0, |r| r.nrows());
        let external_jacobian = evaluation
            .residuals
            .as_ref()
            .and_then(|_| self.external_jacobian(&evaluation.parameters))
            .filter(|j| j.nrows() == m && j.ncols() == projection.guess.nrows());

        let (residuals, external_jacobian) = match (evaluation.residuals.clone(), external_jacobian) {
            (Some(r), Some(j)) if evaluation.is_valid() => (r, j),
            _ => {
                let nan: F = Float::nan();
                return Linearization {
                    external_jacobian: DMatrix::from_element(m, projection.guess.nrows(), nan),
                    jacobian: DMatrix::from_element(m, n, nan),
                    gradient: DVector::from_element(n, nan),
                    hessian: DMatrix::from_element(n, n, nan),
                    evaluation,
                };
            }
        };

        let mut jacobian = DMatrix::zeros(m, n);
        for (k, t) in projection.transforms.iter().enumerate() {
            let chain = t.derivative(evaluation.point[k]);
            jacobian.set_column(k, &(external_jacobian.column(t.index) * chain));
        }

        let (weighted_residuals, weighted_jacobian) = match &self.weights {
            Some(w) => {
                let mut wj = jacobian.clone();
                for (mut row, &wi) in wj.row_iter_mut().zip(w.iter()) {
                    row *= wi;
                }
                (residuals.component_mul(w), wj)
            }
            None => (residuals, jacobian.clone()),
        };
        let gradient = jacobian.tr_mul(&weighted_residuals);
        let hessian = jacobian.tr_mul(&weighted_jacobian);

        Linearization {
            evaluation,
            external_jacobian,
            jacobian,
            gradient,
            hessian,
        }
    }

    /// Parameter covariance `$(\mathbf{J}^\top\mathbf{W}\mathbf{J})^{+}\,\mathrm{RSS}/(m - n)$`.
    ///
    /// Computed in external coordinates for the free parameters; rows and
    /// columns of fixed parameters are zero. `None` if there are no degrees
    /// of freedom left or the pseudo-inverse fails.
    pub fn covariance(&self, linearization: &Linearization<F>) -> Option<DMatrix<F>> {
        let projection = self.projection();
        let m = linearization.external_jacobian.nrows();
        let n_free = projection.free.len();
        if m <= n_free || !linearization.evaluation.is_valid() {
            return None;
        }
        let jacobian = linearization
            .external_jacobian
            .select_columns(projection.free.iter());
        let mut wj = jacobian.clone();
        if let Some(w) = &self.weights {
            for (mut row, &wi) in wj.row_iter_mut().zip(w.iter()) {
                row *= wi;
            }
        }
        let information = jacobian.tr_mul(&wj);
        let inverse = information
            .pseudo_inverse(<F as Float>::epsilon())
            .ok()?;
        let dof: F = convert((m - n_free) as f64);
        let free_covariance = inverse * (linearization.evaluation.rss() / dof);

        let n = projection.guess.nrows();
        let mut covariance = DMatrix::zeros(n, n);
        for (a, &i) in projection.free.iter().enumerate() {
            for (b, &j) in projection.free.iter().enumerate() {
                covariance[(i, j)] = free_covariance[(a, b)];
            }
        }
        if covariance.iter().all(|c| Float::is_finite(*c)) {
            Some(covariance)
        } else {
            None
        }
    }
}

fn check_len(what: &'static str, actual: Option<usize>, expected: usize) -> Result<(), Error> {
    match actual {
        Some(actual) if actual != expected => Err(Error::DimensionMismatch {
            what,
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}
