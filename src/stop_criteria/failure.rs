use nalgebra::{DVector, RealField};
use num_traits::Float;

use super::IterationStatus;
use crate::utils::all_finite;

/// Flags a solve as failed as soon as `NaN` or `$\pm\infty$` shows up in the
/// iterate or in the residual norm.
#[derive(Clone, Debug, Default)]
pub struct FailureStopCriterion {
    status: IterationStatus,
}

impl FailureStopCriterion {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn determine_status<F: RealField + Float>(
        &mut self,
        _iteration: usize,
        solution: &DVector<F>,
        residual: &DVector<F>,
    ) -> IterationStatus {
        self.status = if Float::is_finite(residual.norm()) && all_finite(solution) {
            IterationStatus::Continue
        } else {
            IterationStatus::Failure
        };
        self.status
    }

    pub fn status(&self) -> IterationStatus {
        self.status
    }

    pub fn reset(&mut self) {
        self.status = IterationStatus::Indeterminate;
    }
}
