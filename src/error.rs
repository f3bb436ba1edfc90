//! Errors returned for invalid configuration.
//!
//! Numerical outcomes of a minimization (non-convergence, `NaN`) are not
//! errors; they are reported through
//! [`ExitCondition`](../enum.ExitCondition.html).
use thiserror::Error;

use crate::stop_criteria::CriterionKind;

/// Invalid input or misuse of the API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A vector argument has the wrong number of entries.
    #[error("{what} has {actual} entries, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Lower and upper bounds are inconsistent, or the initial guess lies outside.
    #[error("invalid bounds for parameter {index}: {reason}")]
    InvalidBounds { index: usize, reason: &'static str },
    /// A parameter scale is not strictly positive and finite.
    #[error("scale of parameter {index} must be positive and finite")]
    InvalidScales { index: usize },
    /// A weight is negative or not finite.
    #[error("weight of residual {index} must be non-negative and finite")]
    InvalidWeights { index: usize },
    /// Every parameter has been marked as fixed.
    #[error("all parameters are fixed, nothing to minimize")]
    NoFreeParameters,
    /// `minimize` was called before `set_parameters`.
    #[error("the initial guess has not been set")]
    ParametersNotSet,
    /// A stop criterion of this kind is already part of the iterator.
    #[error("a {0:?} stop criterion was already added")]
    DuplicateStopCriterion(CriterionKind),
    /// The iterator holds no stop criteria to evaluate.
    #[error("no stop criteria have been added")]
    NoStopCriteria,
}

/// Failures of the [`WeakWolfeLineSearch`](../struct.WeakWolfeLineSearch.html).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LineSearchError {
    /// The iteration budget ran out while the step was still being expanded.
    ///
    /// This usually means the objective is unbounded along the direction, or
    /// that the gradient does not match the function.
    #[error(
        "maximum iterations ({0}) reached while expanding the step; \
         the function may be unbounded from below along the search direction"
    )]
    UnboundedDirection(usize),
    /// The iteration budget ran out with a finite bracket.
    #[error("maximum iterations ({0}) reached")]
    MaximumIterations(usize),
    /// The objective returned `NaN` or `$\pm\infty$`.
    #[error("non-finite value returned by objective function: {0}")]
    NonFiniteValue(f64),
    /// The gradient contained `NaN` or `$\pm\infty$`.
    #[error("non-finite gradient returned by objective function")]
    NonFiniteGradient,
    /// The search direction is not a descent direction at the start point.
    #[error("search direction is not a descent direction")]
    NotDescentDirection,
}
