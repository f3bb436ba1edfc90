//! Line search along a descent direction.
use nalgebra::{convert, DVector, RealField};
use num_traits::{Float, ToPrimitive};
use tracing::trace;

use crate::error::LineSearchError;
use crate::objective::ObjectiveModel;
use crate::trust_region::ExitCondition;
use crate::utils::all_finite;
use crate::LeastSquaresProblem;

/// A differentiable objective for the line search.
pub trait ObjectiveFunction<F: RealField> {
    /// Value and gradient at `point`.
    fn value_and_gradient(&self, point: &DVector<F>) -> (F, DVector<F>);
}

impl<F, C> ObjectiveFunction<F> for C
where
    F: RealField,
    C: Fn(&DVector<F>) -> (F, DVector<F>),
{
    fn value_and_gradient(&self, point: &DVector<F>) -> (F, DVector<F>) {
        self(point)
    }
}

/// Searches in the internal parameter space of the model.
impl<F, P> ObjectiveFunction<F> for ObjectiveModel<F, P>
where
    F: RealField + Float,
    P: LeastSquaresProblem<F>,
{
    fn value_and_gradient(&self, point: &DVector<F>) -> (F, DVector<F>) {
        let linearization = self.linearize(self.evaluate_at(point));
        (linearization.value(), linearization.gradient)
    }
}

/// The point found by the line search.
#[derive(Clone, Debug, PartialEq)]
pub struct LineSearchResult<F: RealField> {
    pub point: DVector<F>,
    pub value: F,
    pub gradient: DVector<F>,
    /// Step length `$\alpha$` with `$\vec{x} = \vec{x}_0 + \alpha\vec{d}$`.
    pub step: F,
    /// Number of objective evaluations, not counting the start point.
    pub iterations: usize,
    /// [`WeakWolfeCriteria`](enum.ExitCondition.html#variant.WeakWolfeCriteria)
    /// or [`LackOfProgress`](enum.ExitCondition.html#variant.LackOfProgress).
    pub exit_condition: ExitCondition,
}

/// Line search for a step length satisfying the weak Wolfe conditions
/// ```math
/// \begin{aligned}
///   \phi(\alpha) &\leq \phi(0) + c_1\alpha\phi'(0), \\
///   \phi'(\alpha) &\geq c_2\phi'(0),
/// \end{aligned}
/// ```
/// where `$\phi(\alpha) = f(\vec{x}_0 + \alpha\vec{d})$`.
///
/// A step violating the first condition becomes an upper bound and the
/// search bisects. A step violating the second condition becomes a lower
/// bound, and the step is doubled as long as there is no upper bound.
/// The search gives up with
/// [`LackOfProgress`](enum.ExitCondition.html#variant.LackOfProgress) once
/// the bracket is narrower than `parameter_tolerance` relative to its upper
/// end, and returns the point at the lower end.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WeakWolfeLineSearch<F> {
    c1: F,
    c2: F,
    parameter_tolerance: F,
    maximum_iterations: usize,
}

/// One evaluated trial step.
struct Trial<F: RealField> {
    step: F,
    point: DVector<F>,
    value: F,
    gradient: DVector<F>,
}

impl<F: RealField + Float> WeakWolfeLineSearch<F> {
    /// # Panics
    ///
    /// Panics unless `$0 < c_1 < c_2 < 1$`, `$\mathtt{parameter\_tolerance}\geq 0$`
    /// and `$\mathtt{maximum\_iterations} > 0$`.
    pub fn new(c1: F, c2: F, parameter_tolerance: F, maximum_iterations: usize) -> Self {
        assert!(
            F::zero() < c1 && c1 < c2 && c2 < F::one(),
            "constants must satisfy 0 < c1 < c2 < 1"
        );
        assert!(
            !(parameter_tolerance < F::zero()),
            "parameter_tolerance must be >= 0"
        );
        assert!(maximum_iterations > 0, "maximum_iterations must be > 0");
        Self {
            c1,
            c2,
            parameter_tolerance,
            maximum_iterations,
        }
    }

    /// Search for a conforming step along `direction`, starting the search at
    /// `initial_step`.
    ///
    /// # Errors
    ///
    /// - [`NotDescentDirection`](enum.LineSearchError.html#variant.NotDescentDirection)
    ///   if `$\phi'(0)\geq 0$`.
    /// - [`NonFiniteValue`](enum.LineSearchError.html#variant.NonFiniteValue) or
    ///   [`NonFiniteGradient`](enum.LineSearchError.html#variant.NonFiniteGradient)
    ///   as soon as an evaluation is not finite, including the start point.
    /// - [`UnboundedDirection`](enum.LineSearchError.html#variant.UnboundedDirection)
    ///   if the iterations are used up without ever violating the sufficient
    ///   decrease condition, else
    ///   [`MaximumIterations`](enum.LineSearchError.html#variant.MaximumIterations).
    ///
    /// # Panics
    ///
    /// Panics if `initial_step` is not positive.
    pub fn find_conforming_step<O>(
        &self,
        objective: &O,
        start: &DVector<F>,
        direction: &DVector<F>,
        initial_step: F,
    ) -> Result<LineSearchResult<F>, LineSearchError>
    where
        O: ObjectiveFunction<F> + ?Sized,
    {
        self.find_conforming_step_with_upper_bound(
            objective,
            start,
            direction,
            initial_step,
            Float::infinity(),
        )
    }

    /// Like [`find_conforming_step`](#method.find_conforming_step), but never
    /// tries steps at or beyond `upper_bound`.
    ///
    /// # Panics
    ///
    /// Panics unless `$0 < \mathtt{initial\_step}$` and, for a finite
    /// `upper_bound`, `$\mathtt{initial\_step} < \mathtt{upper\_bound}$`.
    pub fn find_conforming_step_with_upper_bound<O>(
        &self,
        objective: &O,
        start: &DVector<F>,
        direction: &DVector<F>,
        initial_step: F,
        upper_bound: F,
    ) -> Result<LineSearchResult<F>, LineSearchError>
    where
        O: ObjectiveFunction<F> + ?Sized,
    {
        assert!(initial_step > F::zero(), "initial_step must be > 0");
        assert!(
            initial_step < upper_bound,
            "initial_step must be below upper_bound"
        );
        let half: F = convert(0.5);
        let two: F = convert(2.0);

        let origin = evaluate(objective, start, direction, F::zero())?;
        let initial_slope = origin.gradient.dot(direction);
        if !(initial_slope < F::zero()) {
            return Err(LineSearchError::NotDescentDirection);
        }

        let initial_value = origin.value;
        let mut lower = origin;
        let mut upper_bound = upper_bound;
        let mut step = initial_step;
        for iteration in 1..=self.maximum_iterations {
            let trial = evaluate(objective, start, direction, step)?;
            let slope = trial.gradient.dot(direction);
            trace!(iteration, step = ?step, value = ?trial.value, "line search trial");

            if trial.value > initial_value + self.c1 * step * initial_slope {
                upper_bound = step;
                step = half * (lower.step + upper_bound);
            } else if slope < self.c2 * initial_slope {
                lower = trial;
                step = if Float::is_infinite(upper_bound) {
                    two * lower.step
                } else {
                    half * (lower.step + upper_bound)
                };
            } else {
                return Ok(finish(trial, iteration, ExitCondition::WeakWolfeCriteria));
            }

            if Float::is_finite(upper_bound)
                && (upper_bound - lower.step) / upper_bound < self.parameter_tolerance
            {
                trace!(iteration, "line search bracket collapsed");
                return Ok(finish(lower, iteration, ExitCondition::LackOfProgress));
            }
        }

        Err(if Float::is_infinite(upper_bound) {
            LineSearchError::UnboundedDirection(self.maximum_iterations)
        } else {
            LineSearchError::MaximumIterations(self.maximum_iterations)
        })
    }
}

impl<F: RealField + Float> Default for WeakWolfeLineSearch<F> {
    /// `$c_1 = 10^{-4}$`, `$c_2 = 0.9$`, tolerance `$10^{-8}$`, 100 iterations.
    fn default() -> Self {
        Self::new(convert(1e-4), convert(0.9), convert(1e-8), 100)
    }
}

fn evaluate<F, O>(
    objective: &O,
    start: &DVector<F>,
    direction: &DVector<F>,
    step: F,
) -> Result<Trial<F>, LineSearchError>
where
    F: RealField + Float,
    O: ObjectiveFunction<F> + ?Sized,
{
    let point = start + direction * step;
    let (value, gradient) = objective.value_and_gradient(&point);
    if !Float::is_finite(value) {
        return Err(LineSearchError::NonFiniteValue(
            ToPrimitive::to_f64(&value).unwrap_or(f64::NAN),
        ));
    }
    if !all_finite(&gradient) {
        return Err(LineSearchError::NonFiniteGradient);
    }
    Ok(Trial {
        step,
        point,
        value,
        gradient,
    })
}

fn finish<F: RealField>(trial: Trial<F>, iterations: usize, exit_condition: ExitCondition) -> LineSearchResult<F> {
    LineSearchResult {
        point: trial.point,
        value: trial.value,
        gradient: trial.gradient,
        step: trial.step,
        iterations,
        exit_condition,
    }
}
