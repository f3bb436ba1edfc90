use nalgebra::{convert, DVector, RealField};
use num_traits::Float;

use super::IterationStatus;
use crate::utils::infinity_norm;

/// Stops once the residual is small relative to the right-hand side.
///
/// The solution has converged when
/// ```math
///   \|\vec{r}\|_\infty \leq \mathtt{maximum}\,\|\vec{b}\|_\infty
/// ```
/// has held for `minimum_iterations_below_maximum` iterations in a row.
/// Iterations are counted by their number, so an iterator that is asked
/// only now and then still sees the elapsed iterations. A `NaN` norm means
/// the solver diverged.
#[derive(Clone, Debug)]
pub struct ResidualStopCriterion<F> {
    maximum: F,
    minimum_iterations_below_maximum: usize,
    first_iteration_below: Option<usize>,
    last_iteration: Option<usize>,
    status: IterationStatus,
}

impl<F: RealField + Float> ResidualStopCriterion<F> {
    /// # Panics
    ///
    /// Panics if `$\mathtt{maximum} < 0$` or `maximum` is `NaN`.
    pub fn new(maximum: F, minimum_iterations_below_maximum: usize) -> Self {
        assert!(maximum >= F::zero(), "maximum must be >= 0");
        Self {
            maximum,
            minimum_iterations_below_maximum,
            first_iteration_below: None,
            last_iteration: None,
            status: IterationStatus::Indeterminate,
        }
    }

    pub fn maximum(&self) -> F {
        self.maximum
    }

    pub fn minimum_iterations_below_maximum(&self) -> usize {
        self.minimum_iterations_below_maximum
    }

    pub(super) fn determine_status(
        &mut self,
        iteration: usize,
        source: &DVector<F>,
        residual: &DVector<F>,
    ) -> IterationStatus {
        // a smaller or repeated iteration number starts a new solve
        if self.last_iteration.map_or(false, |last| iteration <= last) {
            self.first_iteration_below = None;
        }
        self.last_iteration = Some(iteration);

        let residual_norm = infinity_norm(residual);
        let source_norm = infinity_norm(source);
        self.status = if Float::is_nan(residual_norm) || Float::is_nan(source_norm) {
            self.first_iteration_below = None;
            IterationStatus::Diverged
        } else if residual_norm <= self.maximum * source_norm {
            let first = *self.first_iteration_below.get_or_insert(iteration);
            if iteration - first >= self.minimum_iterations_below_maximum {
                IterationStatus::Converged
            } else {
                IterationStatus::Continue
            }
        } else {
            self.first_iteration_below = None;
            IterationStatus::Continue
        };
        self.status
    }

    pub fn status(&self) -> IterationStatus {
        self.status
    }

    pub fn reset(&mut self) {
        self.first_iteration_below = None;
        self.last_iteration = None;
        self.status = IterationStatus::Indeterminate;
    }
}

impl<F: RealField + Float> Default for ResidualStopCriterion<F> {
    fn default() -> Self {
        Self::new(convert(1e-12), 0)
    }
}
