//! Trust-region minimization of nonlinear least squares objectives.
//!
//! In every iteration the objective is replaced by the quadratic model
//! ```math
//!   m(\vec{p}) = f(\vec{x}) + \vec{g}^\top\vec{p} + \frac{1}{2}\vec{p}^\top\mathbf{H}\vec{p},
//! ```
//! with gradient `$\vec{g} = \mathbf{J}^\top\mathbf{W}\vec{r}$` and the Gauss-Newton
//! Hessian `$\mathbf{H} = \mathbf{J}^\top\mathbf{W}\mathbf{J}$`. A
//! [`TrustRegionSubproblem`](trait.TrustRegionSubproblem.html) computes a step
//! with `$\|\vec{p}\|\leq\Delta$`, and the ratio
//! ```math
//!   \rho = \frac{f(\vec{x}) - f(\vec{x} + \vec{p})}{m(\vec{0}) - m(\vec{p})}
//! ```
//! of actual to predicted reduction decides whether the step is taken and
//! how the radius `$\Delta$` changes.
use core::ops::ControlFlow;

use nalgebra::{convert, DMatrix, DVector, RealField};
use num_traits::Float;
use tracing::{debug, trace};

use crate::objective::{Evaluation, Linearization, ObjectiveModel};
use crate::utils::{all_finite, infinity_norm};
use crate::{Error, LeastSquaresProblem};

mod dog_leg;
mod newton_cg;

#[cfg(test)]
mod test_minimize;

pub use dog_leg::DogLeg;
pub use newton_cg::NewtonCg;

/// Largest trust-region radius the minimizer will use.
pub const MAXIMUM_RADIUS: f64 = 1000.0;

/// A step proposed by a [`TrustRegionSubproblem`](trait.TrustRegionSubproblem.html).
#[derive(Clone, Debug, PartialEq)]
pub struct Step<F: RealField> {
    pub step: DVector<F>,
    /// Whether the step was truncated at the trust-region boundary.
    pub hit_boundary: bool,
}

/// Approximate minimization of the quadratic model inside the trust region.
///
/// Implementations must be stateless: everything they need is passed in, and
/// the returned step must satisfy `$\|\vec{p}\|\leq\Delta$` up to rounding.
pub trait TrustRegionSubproblem<F: RealField + Float> {
    fn solve(&self, gradient: &DVector<F>, hessian: &DMatrix<F>, delta: F) -> Step<F>;
}

/// Find `$\tau\geq 0$` with `$\|\vec{z} + \tau\vec{d}\| = \Delta$`.
///
/// Requires `$\|\vec{z}\|\leq\Delta$`. The root is computed without
/// cancellation in either sign of `$\vec{z}^\top\vec{d}$`.
pub(crate) fn boundary_intersection<F: RealField + Float>(
    z: &DVector<F>,
    d: &DVector<F>,
    delta: F,
) -> F {
    let a = d.dot(d);
    if a.is_zero() {
        return F::zero();
    }
    let b = z.dot(d);
    let c = z.dot(z) - delta * delta;
    let root = Float::sqrt(Float::max(b * b - a * c, F::zero()));
    let tau = if b <= F::zero() {
        (root - b) / a
    } else {
        -c / (b + root)
    };
    Float::max(tau, F::zero())
}

/// The reason a minimization stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExitCondition {
    /// No terminal condition has been reached yet.
    None,
    /// The objective value dropped to the function tolerance.
    Converged,
    /// The gradient's largest entry dropped to the gradient tolerance.
    RelativeGradient,
    /// The step became negligible relative to the current point.
    RelativePoints,
    /// The trust region shrank below the radius tolerance.
    LackOfProgress,
    /// `NaN` or `$\pm\infty$` appeared in the value or the derivatives.
    InvalidValues,
    /// The iteration budget was exhausted.
    ExceedIterations,
    /// The observer asked to stop.
    ManuallyStopped,
    /// Both weak Wolfe conditions hold. Only reported by the line search.
    WeakWolfeCriteria,
}

/// What happened in one iteration of the minimizer.
#[derive(Clone, Debug, PartialEq)]
pub struct IterationRecord<F> {
    pub iteration: usize,
    /// Objective value at the current point after the iteration.
    pub value: F,
    /// Objective value at the trial point.
    pub trial_value: F,
    /// Ratio of actual to predicted reduction.
    pub ratio: F,
    /// Radius after the update.
    pub radius: F,
    pub step_norm: F,
    pub hit_boundary: bool,
    pub accepted: bool,
}

/// Information about the minimization.
///
/// Use this to inspect the minimization process. Most importantly
/// you may want to check the [`exit_condition`](#structfield.exit_condition).
#[derive(Clone, Debug)]
pub struct MinimizationReport<F: RealField> {
    pub exit_condition: ExitCondition,
    pub iterations: usize,
    /// Number of residual evaluations, not counting finite differences.
    pub number_of_evaluations: usize,
    /// Contains the value of `$f(\vec{x}) = \frac{1}{2}\sum_i w_i r_i^2$`,
    /// half the weighted residual sum of squares.
    pub objective_function: F,
    /// The best external parameters found.
    pub minimizing_point: DVector<F>,
    pub internal_point: DVector<F>,
    pub residuals: Option<DVector<F>>,
    /// Gradient in internal space at the final point.
    pub gradient: DVector<F>,
    /// Gauss-Newton Hessian in internal space at the final point.
    pub hessian: DMatrix<F>,
    /// Trust-region radius when the minimization stopped.
    pub radius: F,
    pub covariance: Option<DMatrix<F>>,
    pub standard_errors: Option<DVector<F>>,
    pub correlation: Option<DMatrix<F>>,
}

impl<F: RealField + Float> MinimizationReport<F> {
    /// The weighted residual sum of squares `$\sum_i w_i r_i^2$` at the minimizing point.
    pub fn residual_sum_of_squares(&self) -> F {
        self.objective_function * convert(2.0)
    }

    /// Whether the minimizer stopped at a point it considers a solution.
    pub fn is_success(&self) -> bool {
        matches!(
            self.exit_condition,
            ExitCondition::Converged
                | ExitCondition::RelativeGradient
                | ExitCondition::RelativePoints
        )
    }
}

/// Keeps the objective and the evaluation count together.
struct Run<'a, F, P>
where
    F: RealField + Float,
    P: LeastSquaresProblem<F>,
{
    model: &'a ObjectiveModel<F, P>,
    evaluations: usize,
}

impl<'a, F, P> Run<'a, F, P>
where
    F: RealField + Float,
    P: LeastSquaresProblem<F>,
{
    fn evaluate(&mut self, point: &DVector<F>) -> Evaluation<F> {
        self.evaluations += 1;
        self.model.evaluate_at(point)
    }

    fn finish(
        self,
        linearization: Linearization<F>,
        exit_condition: ExitCondition,
        iterations: usize,
        radius: F,
    ) -> MinimizationReport<F> {
        debug!(?exit_condition, iterations, value = ?linearization.value(), "trust-region minimization finished");
        let covariance = self.model.covariance(&linearization);
        let standard_errors = covariance
            .as_ref()
            .map(|c| c.diagonal().map(|v| Float::sqrt(Float::max(v, F::zero()))));
        let correlation = match (&covariance, &standard_errors) {
            (Some(c), Some(s)) => Some(DMatrix::from_fn(c.nrows(), c.ncols(), |i, j| {
                let scale = s[i] * s[j];
                if scale.is_zero() {
                    F::zero()
                } else {
                    c[(i, j)] / scale
                }
            })),
            _ => None,
        };
        let Linearization {
            evaluation,
            gradient,
            hessian,
            ..
        } = linearization;
        MinimizationReport {
            exit_condition,
            iterations,
            number_of_evaluations: self.evaluations,
            objective_function: evaluation.value,
            minimizing_point: evaluation.parameters,
            internal_point: evaluation.point,
            residuals: evaluation.residuals,
            gradient,
            hessian,
            radius,
            covariance,
            standard_errors,
            correlation,
        }
    }
}

/// Trust-region minimizer for nonlinear least squares.
///
/// The subproblem strategy is chosen at construction, see
/// [`dog_leg`](#method.dog_leg) and [`newton_cg`](#method.newton_cg).
///
/// The minimization stops with
///
/// - [`Converged`](enum.ExitCondition.html#variant.Converged) if
///   `$\sum_i w_i r_i^2\leq\mathtt{function\_tolerance}$`,
/// - [`RelativeGradient`](enum.ExitCondition.html#variant.RelativeGradient) if
///   `$\|\vec{g}\|_\infty\leq\mathtt{gradient\_tolerance}$`,
/// - [`RelativePoints`](enum.ExitCondition.html#variant.RelativePoints) if
///   `$\|\vec{p}\|\leq\mathtt{step\_tolerance}\,(\mathtt{step\_tolerance} + \|\vec{x}\|)$`,
/// - [`LackOfProgress`](enum.ExitCondition.html#variant.LackOfProgress) if a shrunk radius
///   satisfies `$\Delta\leq\mathtt{radius\_tolerance}\,(\mathtt{radius\_tolerance} + \vec{x}^\top\vec{x})$`.
///
/// All conditions are evaluated in the internal parameter space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrustRegionMinimizer<F, S> {
    subproblem: S,
    gradient_tolerance: F,
    step_tolerance: F,
    function_tolerance: F,
    radius_tolerance: F,
    maximum_iterations: Option<usize>,
}

impl<F: RealField + Float> TrustRegionMinimizer<F, DogLeg> {
    /// Minimizer using the [`DogLeg`](struct.DogLeg.html) subproblem.
    pub fn dog_leg() -> Self {
        Self::new(DogLeg)
    }
}

impl<F: RealField + Float> TrustRegionMinimizer<F, NewtonCg> {
    /// Minimizer using the [`NewtonCg`](struct.NewtonCg.html) subproblem.
    pub fn newton_cg() -> Self {
        Self::new(NewtonCg::new())
    }
}

impl<F, S> TrustRegionMinimizer<F, S>
where
    F: RealField + Float,
    S: TrustRegionSubproblem<F>,
{
    pub fn new(subproblem: S) -> Self {
        let tol: F = convert(1e-8);
        Self {
            subproblem,
            gradient_tolerance: tol,
            step_tolerance: tol,
            function_tolerance: tol,
            radius_tolerance: tol,
            maximum_iterations: None,
        }
    }

    /// # Panics
    ///
    /// Panics if `$\mathtt{gradient\_tolerance} < 0$`.
    pub fn with_gradient_tolerance(self, gradient_tolerance: F) -> Self {
        assert!(
            !gradient_tolerance.is_negative(),
            "gradient_tolerance must be >= 0"
        );
        Self {
            gradient_tolerance,
            ..self
        }
    }

    /// # Panics
    ///
    /// Panics if `$\mathtt{step\_tolerance} < 0$`.
    pub fn with_step_tolerance(self, step_tolerance: F) -> Self {
        assert!(!step_tolerance.is_negative(), "step_tolerance must be >= 0");
        Self {
            step_tolerance,
            ..self
        }
    }

    /// # Panics
    ///
    /// Panics if `$\mathtt{function\_tolerance} < 0$`.
    pub fn with_function_tolerance(self, function_tolerance: F) -> Self {
        assert!(
            !function_tolerance.is_negative(),
            "function_tolerance must be >= 0"
        );
        Self {
            function_tolerance,
            ..self
        }
    }

    /// # Panics
    ///
    /// Panics if `$\mathtt{radius\_tolerance} < 0$`.
    pub fn with_radius_tolerance(self, radius_tolerance: F) -> Self {
        assert!(
            !radius_tolerance.is_negative(),
            "radius_tolerance must be >= 0"
        );
        Self {
            radius_tolerance,
            ..self
        }
    }

    /// Set the maximal number of iterations.
    ///
    /// Defaults to `$200(n + 1)$` for `$n$` parameters.
    ///
    /// # Panics
    ///
    /// Panics if `$\mathtt{maximum\_iterations} = 0$`.
    pub fn with_maximum_iterations(self, maximum_iterations: usize) -> Self {
        assert!(maximum_iterations > 0, "maximum_iterations must be > 0");
        Self {
            maximum_iterations: Some(maximum_iterations),
            ..self
        }
    }

    pub fn subproblem(&self) -> &S {
        &self.subproblem
    }

    /// Minimize the objective, starting from the point given to
    /// [`ObjectiveModel::set_parameters`](struct.ObjectiveModel.html#method.set_parameters).
    ///
    /// # Errors
    ///
    /// Only fails with [`Error::ParametersNotSet`](enum.Error.html#variant.ParametersNotSet).
    /// Numerical trouble is reported in the
    /// [`exit_condition`](struct.MinimizationReport.html#structfield.exit_condition).
    pub fn minimize<P>(&self, model: &ObjectiveModel<F, P>) -> Result<MinimizationReport<F>, Error>
    where
        P: LeastSquaresProblem<F>,
    {
        self.minimize_with(model, |_| ControlFlow::Continue(()))
    }

    /// Like [`minimize`](#method.minimize), but calls `observer` after every iteration.
    ///
    /// Returning `ControlFlow::Break` stops the minimization with
    /// [`ManuallyStopped`](enum.ExitCondition.html#variant.ManuallyStopped).
    pub fn minimize_with<P, O>(
        &self,
        model: &ObjectiveModel<F, P>,
        mut observer: O,
    ) -> Result<MinimizationReport<F>, Error>
    where
        P: LeastSquaresProblem<F>,
        O: FnMut(&IterationRecord<F>) -> ControlFlow<()>,
    {
        if !model.is_initialized() {
            return Err(Error::ParametersNotSet);
        }
        let max_delta: F = convert(MAXIMUM_RADIUS);
        let half: F = convert(0.5);
        let quarter: F = convert(0.25);
        let three_quarters: F = convert(0.75);
        let eta = F::zero();

        let maximum_iterations = self
            .maximum_iterations
            .unwrap_or(200 * (model.number_of_parameters() + 1));
        debug!(
            parameters = model.number_of_parameters(),
            free = model.free_parameters().len(),
            maximum_iterations,
            "starting trust-region minimization"
        );

        let mut run = Run {
            model,
            evaluations: 0,
        };

        // Evaluate at the start point
        let evaluation = run.evaluate(&model.initial_point());
        let valid = evaluation.is_valid();
        let mut lin = model.linearize(evaluation);
        if !valid {
            return Ok(run.finish(lin, ExitCondition::InvalidValues, 0, F::one()));
        }
        if lin.evaluation.rss() <= self.function_tolerance {
            return Ok(run.finish(lin, ExitCondition::Converged, 0, F::one()));
        }
        if !all_finite(&lin.gradient) || !lin.hessian.iter().all(|h| Float::is_finite(*h)) {
            return Ok(run.finish(lin, ExitCondition::InvalidValues, 0, F::one()));
        }
        if infinity_norm(&lin.gradient) <= self.gradient_tolerance {
            return Ok(run.finish(lin, ExitCondition::RelativeGradient, 0, F::one()));
        }

        // Initialize the radius from the Cauchy step length
        let g = &lin.gradient;
        let mut delta = g.dot(g) / (&lin.hessian * g).dot(g);
        delta = Float::max(F::one(), Float::min(delta, max_delta));

        let mut exit_condition = ExitCondition::None;
        let mut iterations = 0;
        while iterations < maximum_iterations && exit_condition == ExitCondition::None {
            iterations += 1;

            let Step { step, hit_boundary } =
                self.subproblem.solve(&lin.gradient, &lin.hessian, delta);

            // m(0) - m(p) = -g'p - p'Hp / 2
            let predicted_reduction =
                -lin.gradient.dot(&step) - half * step.dot(&(&lin.hessian * &step));

            let step_norm = step.norm();
            if step_norm <= self.step_tolerance * (self.step_tolerance + lin.point().norm()) {
                exit_condition = ExitCondition::RelativePoints;
                break;
            }

            let trial = run.evaluate(&(lin.point() + &step));
            if !trial.is_valid() {
                exit_condition = ExitCondition::InvalidValues;
                break;
            }

            let ratio = if predicted_reduction.is_zero() {
                F::zero()
            } else {
                (lin.value() - trial.value) / predicted_reduction
            };

            if ratio > three_quarters && hit_boundary {
                delta = Float::min(delta + delta, max_delta);
            } else if ratio < quarter {
                delta *= quarter;
                let point_norm_squared = lin.point().norm_squared();
                if delta <= self.radius_tolerance * (self.radius_tolerance + point_norm_squared) {
                    exit_condition = ExitCondition::LackOfProgress;
                }
            }

            let trial_value = trial.value;
            let accepted = exit_condition == ExitCondition::None
                && ratio > eta
                && trial_value <= lin.value();
            if accepted {
                lin = model.linearize(trial);
                if lin.evaluation.rss() <= self.function_tolerance {
                    exit_condition = ExitCondition::Converged;
                } else if !all_finite(&lin.gradient) {
                    exit_condition = ExitCondition::InvalidValues;
                } else if infinity_norm(&lin.gradient) <= self.gradient_tolerance {
                    exit_condition = ExitCondition::RelativeGradient;
                }
            }

            let record = IterationRecord {
                iteration: iterations,
                value: lin.value(),
                trial_value,
                ratio,
                radius: delta,
                step_norm,
                hit_boundary,
                accepted,
            };
            trace!(
                iteration = iterations,
                value = ?record.value,
                ratio = ?ratio,
                radius = ?delta,
                accepted,
                "trust-region iteration"
            );
            if observer(&record).is_break() && exit_condition == ExitCondition::None {
                exit_condition = ExitCondition::ManuallyStopped;
            }
        }

        if exit_condition == ExitCondition::None {
            exit_condition = ExitCondition::ExceedIterations;
        }
        Ok(run.finish(lin, exit_condition, iterations, delta))
    }
}

impl<F: RealField + Float> Default for TrustRegionMinimizer<F, DogLeg> {
    fn default() -> Self {
        Self::dog_leg()
    }
}
