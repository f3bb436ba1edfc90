//! Stop criteria for iterative solvers.
//!
//! A [`SolverIterator`](struct.SolverIterator.html) holds at most one
//! criterion of every [`CriterionKind`](enum.CriterionKind.html) and asks
//! them, in insertion order, whether the solver should go on. The first
//! verdict other than [`Continue`](enum.IterationStatus.html#variant.Continue)
//! ends the iteration.
//!
//! Criteria remember state between calls (for example how long the residual
//! has been small). Call [`reset`](struct.SolverIterator.html#method.reset)
//! before reusing an iterator for an independent solve.
use nalgebra::{DVector, RealField};
use num_traits::Float;
use tracing::debug;

use crate::Error;

mod divergence;
mod failure;
mod iteration_count;
mod residual;

pub use divergence::DivergenceStopCriterion;
pub use failure::FailureStopCriterion;
pub use iteration_count::IterationCountStopCriterion;
pub use residual::ResidualStopCriterion;

#[cfg(test)]
mod test_iterator;

/// The verdict of a stop criterion.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum IterationStatus {
    /// Nothing has been evaluated yet.
    #[default]
    Indeterminate,
    /// The solver should go on.
    Continue,
    Converged,
    Diverged,
    /// The iterate or the residual contains `NaN` or `$\pm\infty$`.
    Failure,
    /// The iteration budget is used up.
    StoppedWithoutConvergence,
    /// [`SolverIterator::cancel`](struct.SolverIterator.html#method.cancel) was called.
    Cancelled,
}

impl IterationStatus {
    /// Whether the solver has to stop.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Indeterminate | Self::Continue)
    }
}

/// Identifies the variant of a [`StopCriterion`](enum.StopCriterion.html).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CriterionKind {
    Residual,
    IterationCount,
    Divergence,
    Failure,
}

/// One of the available stop criteria.
#[derive(Clone, Debug)]
pub enum StopCriterion<F: RealField> {
    Residual(ResidualStopCriterion<F>),
    IterationCount(IterationCountStopCriterion),
    Divergence(DivergenceStopCriterion<F>),
    Failure(FailureStopCriterion),
}

impl<F: RealField + Float> StopCriterion<F> {
    pub fn kind(&self) -> CriterionKind {
        match self {
            Self::Residual(_) => CriterionKind::Residual,
            Self::IterationCount(_) => CriterionKind::IterationCount,
            Self::Divergence(_) => CriterionKind::Divergence,
            Self::Failure(_) => CriterionKind::Failure,
        }
    }

    /// Evaluate the criterion for the state of the solver after `iteration` steps.
    ///
    /// `source` is the right-hand side of the system being solved and
    /// `residual` the current residual vector.
    pub fn determine_status(
        &mut self,
        iteration: usize,
        solution: &DVector<F>,
        source: &DVector<F>,
        residual: &DVector<F>,
    ) -> IterationStatus {
        match self {
            Self::Residual(c) => c.determine_status(iteration, source, residual),
            Self::IterationCount(c) => c.determine_status(iteration),
            Self::Divergence(c) => c.determine_status(iteration, residual),
            Self::Failure(c) => c.determine_status(iteration, solution, residual),
        }
    }

    /// The verdict of the last call to [`determine_status`](#method.determine_status).
    pub fn status(&self) -> IterationStatus {
        match self {
            Self::Residual(c) => c.status(),
            Self::IterationCount(c) => c.status(),
            Self::Divergence(c) => c.status(),
            Self::Failure(c) => c.status(),
        }
    }

    /// Forget everything seen so far.
    pub fn reset(&mut self) {
        match self {
            Self::Residual(c) => c.reset(),
            Self::IterationCount(c) => c.reset(),
            Self::Divergence(c) => c.reset(),
            Self::Failure(c) => c.reset(),
        }
    }
}

impl<F: RealField> From<ResidualStopCriterion<F>> for StopCriterion<F> {
    fn from(criterion: ResidualStopCriterion<F>) -> Self {
        Self::Residual(criterion)
    }
}

impl<F: RealField> From<IterationCountStopCriterion> for StopCriterion<F> {
    fn from(criterion: IterationCountStopCriterion) -> Self {
        Self::IterationCount(criterion)
    }
}

impl<F: RealField> From<DivergenceStopCriterion<F>> for StopCriterion<F> {
    fn from(criterion: DivergenceStopCriterion<F>) -> Self {
        Self::Divergence(criterion)
    }
}

impl<F: RealField> From<FailureStopCriterion> for StopCriterion<F> {
    fn from(criterion: FailureStopCriterion) -> Self {
        Self::Failure(criterion)
    }
}

/// Aggregates stop criteria for an iterative solver.
///
/// ```
/// # use nalgebra::DVector;
/// use trust_region::{IterationCountStopCriterion, IterationStatus, ResidualStopCriterion, SolverIterator};
///
/// let mut iterator = SolverIterator::new([
///     ResidualStopCriterion::new(1e-6, 0).into(),
///     IterationCountStopCriterion::new(100).into(),
/// ])?;
/// let x = DVector::from_element(2, 1.0);
/// let b = DVector::from_element(2, 1.0);
/// let status = iterator.determine_status(0, &x, &b, &DVector::zeros(2))?;
/// assert_eq!(status, IterationStatus::Converged);
/// # Ok::<(), trust_region::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct SolverIterator<F: RealField> {
    criteria: Vec<StopCriterion<F>>,
    status: IterationStatus,
}

impl<F: RealField + Float> SolverIterator<F> {
    /// # Errors
    ///
    /// Fails with [`Error::DuplicateStopCriterion`](enum.Error.html#variant.DuplicateStopCriterion)
    /// if two criteria have the same kind.
    pub fn new<I>(criteria: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = StopCriterion<F>>,
    {
        let mut iterator = Self {
            criteria: Vec::new(),
            status: IterationStatus::Indeterminate,
        };
        for criterion in criteria {
            iterator.add(criterion)?;
        }
        Ok(iterator)
    }

    /// Add a criterion.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DuplicateStopCriterion`](enum.Error.html#variant.DuplicateStopCriterion)
    /// if a criterion of the same kind is already present. The iterator is
    /// left unchanged in that case.
    pub fn add(&mut self, criterion: impl Into<StopCriterion<F>>) -> Result<(), Error> {
        let criterion = criterion.into();
        let kind = criterion.kind();
        if self.criteria.iter().any(|c| c.kind() == kind) {
            return Err(Error::DuplicateStopCriterion(kind));
        }
        self.criteria.push(criterion);
        Ok(())
    }

    pub fn criteria(&self) -> &[StopCriterion<F>] {
        &self.criteria
    }

    /// Ask every criterion about the current state of the solver.
    ///
    /// Returns the first verdict other than `Continue`, or `Continue`. Once
    /// the iterator has been cancelled it keeps returning `Cancelled`
    /// without consulting the criteria.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NoStopCriteria`](enum.Error.html#variant.NoStopCriteria)
    /// if no criterion was added.
    pub fn determine_status(
        &mut self,
        iteration: usize,
        solution: &DVector<F>,
        source: &DVector<F>,
        residual: &DVector<F>,
    ) -> Result<IterationStatus, Error> {
        if self.criteria.is_empty() {
            return Err(Error::NoStopCriteria);
        }
        if self.status == IterationStatus::Cancelled {
            return Ok(self.status);
        }
        let mut status = IterationStatus::Continue;
        for criterion in &mut self.criteria {
            let verdict = criterion.determine_status(iteration, solution, source, residual);
            if verdict != IterationStatus::Continue {
                debug!(iteration, kind = ?criterion.kind(), status = ?verdict, "stop criterion fired");
                status = verdict;
                break;
            }
        }
        self.status = status;
        Ok(status)
    }

    pub fn status(&self) -> IterationStatus {
        self.status
    }

    /// Make every further [`determine_status`](#method.determine_status) return `Cancelled`.
    pub fn cancel(&mut self) {
        self.status = IterationStatus::Cancelled;
    }

    /// Reset all criteria and the status, undoing a cancellation.
    pub fn reset(&mut self) {
        self.status = IterationStatus::Indeterminate;
        for criterion in &mut self.criteria {
            criterion.reset();
        }
    }
}
