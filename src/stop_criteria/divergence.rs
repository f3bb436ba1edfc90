use std::collections::VecDeque;

use nalgebra::{convert, DVector, RealField};
use num_traits::Float;

use super::IterationStatus;

/// Detects a residual norm that keeps growing.
///
/// The last `minimum_number_of_iterations + 1` residual norms are kept. The
/// solver has diverged once every one of them exceeds its predecessor by at
/// least the factor `$1 + \mathtt{maximum\_relative\_increase}$`, or as soon
/// as the norm is `NaN`.
#[derive(Clone, Debug)]
pub struct DivergenceStopCriterion<F> {
    maximum_relative_increase: F,
    minimum_number_of_iterations: usize,
    history: VecDeque<F>,
    last_iteration: Option<usize>,
    status: IterationStatus,
}

impl<F: RealField + Float> DivergenceStopCriterion<F> {
    /// # Panics
    ///
    /// Panics if `$\mathtt{maximum\_relative\_increase} \leq 0$` or
    /// `$\mathtt{minimum\_number\_of\_iterations} = 0$`.
    pub fn new(maximum_relative_increase: F, minimum_number_of_iterations: usize) -> Self {
        assert!(
            maximum_relative_increase > F::zero(),
            "maximum_relative_increase must be > 0"
        );
        assert!(
            minimum_number_of_iterations > 0,
            "minimum_number_of_iterations must be > 0"
        );
        Self {
            maximum_relative_increase,
            minimum_number_of_iterations,
            history: VecDeque::with_capacity(minimum_number_of_iterations + 1),
            last_iteration: None,
            status: IterationStatus::Indeterminate,
        }
    }

    pub fn maximum_relative_increase(&self) -> F {
        self.maximum_relative_increase
    }

    pub fn minimum_number_of_iterations(&self) -> usize {
        self.minimum_number_of_iterations
    }

    pub(super) fn determine_status(&mut self, iteration: usize, residual: &DVector<F>) -> IterationStatus {
        if self.last_iteration.map_or(false, |last| iteration <= last) {
            self.history.clear();
        }
        self.last_iteration = Some(iteration);

        let norm = residual.norm();
        if Float::is_nan(norm) {
            self.status = IterationStatus::Diverged;
            return self.status;
        }
        if self.history.len() > self.minimum_number_of_iterations {
            self.history.pop_front();
        }
        self.history.push_back(norm);

        let full = self.history.len() > self.minimum_number_of_iterations;
        let growing = self.history.iter().zip(self.history.iter().skip(1)).all(|(&a, &b)| {
            // an increase from zero counts as unbounded
            (b - a) >= self.maximum_relative_increase * a && b > a
        });
        self.status = if full && growing {
            IterationStatus::Diverged
        } else {
            IterationStatus::Continue
        };
        self.status
    }

    pub fn status(&self) -> IterationStatus {
        self.status
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last_iteration = None;
        self.status = IterationStatus::Indeterminate;
    }
}

impl<F: RealField + Float> Default for DivergenceStopCriterion<F> {
    fn default() -> Self {
        Self::new(convert(0.08), 10)
    }
}
