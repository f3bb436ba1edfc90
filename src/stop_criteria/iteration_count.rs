use super::IterationStatus;

/// Stops the solver after a fixed number of iterations.
#[derive(Clone, Debug)]
pub struct IterationCountStopCriterion {
    maximum_number_of_iterations: usize,
    status: IterationStatus,
}

impl IterationCountStopCriterion {
    /// # Panics
    ///
    /// Panics if `$\mathtt{maximum\_number\_of\_iterations} = 0$`.
    pub fn new(maximum_number_of_iterations: usize) -> Self {
        assert!(
            maximum_number_of_iterations > 0,
            "maximum_number_of_iterations must be > 0"
        );
        Self {
            maximum_number_of_iterations,
            status: IterationStatus::Indeterminate,
        }
    }

    pub fn maximum_number_of_iterations(&self) -> usize {
        self.maximum_number_of_iterations
    }

    pub(super) fn determine_status(&mut self, iteration: usize) -> IterationStatus {
        self.status = if iteration >= self.maximum_number_of_iterations {
            IterationStatus::StoppedWithoutConvergence
        } else {
            IterationStatus::Continue
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

impl Default for IterationCountStopCriterion {
    fn default() -> Self {
        Self::new(1000)
    }
}
