//! Trust-region minimization of weighted nonlinear least squares problems
//! using [nalgebra](https://nalgebra.org).
//!
//! The crate solves
//! ```math
//! \min_{\vec{x}\in\R^n}f(\vec{x})\quad\text{where}\quad\begin{cases}\begin{aligned}
//!   \ f\!:\R^n &\to \R \\
//!  \vec{x} &\mapsto \frac{1}{2}\sum_{i=1}^m w_i\bigl(r_i(\vec{x})\bigr)^2,
//! \end{aligned}\end{cases}
//! ```
//! for differentiable _residual functions_ `$r_i\!:\R^n\to\R$` and weights `$w_i\geq 0$`,
//! optionally with box constraints `$l_j\leq x_j\leq u_j$` and some parameters
//! held fixed.
//!
//! # Inputs
//!
//! You must provide an implementation of [`LeastSquaresProblem`](trait.LeastSquaresProblem.html):
//!
//! - the residual vector `$\vec{x} \mapsto (r_1(\vec{x}), \ldots, r_m(\vec{x}))^\top\in\R^m$`
//! - and, optionally, its Jacobian `$\mathbf{J} \in \R^{m\times n}$`, defined as
//!   ```math
//!   \mathbf{J} \coloneqq
//!   \begin{pmatrix}
//!   \frac{\partial r_1}{\partial x_1} & \cdots & \frac{\partial r_1}{\partial x_n} \\
//!   \vdots & \ddots & \vdots \\
//!   \frac{\partial r_m}{\partial x_1} & \cdots & \frac{\partial r_m}{\partial x_n}
//!   \end{pmatrix}.
//!   ```
//!   Without it the Jacobian is approximated by
//!   [`differentiate_numerically`](fn.differentiate_numerically.html).
//!
//! The problem is wrapped in an [`ObjectiveModel`](struct.ObjectiveModel.html)
//! which holds bounds, scales, weights and the initial guess. Finally a
//! [`TrustRegionMinimizer`](struct.TrustRegionMinimizer.html) with either the
//! [`DogLeg`](struct.DogLeg.html) or the [`NewtonCg`](struct.NewtonCg.html)
//! subproblem runs the minimization.
//!
//! # Usage Example
//!
//! We use `$f(x, y) \coloneqq \frac{1}{2}[(x^2 + y - 11)^2 + (x + y^2 - 7)^2]$` as a [test function](https://en.wikipedia.org/wiki/Himmelblau%27s_function)
//! for this example.
//! In this case we have `$n = 2$` and `$m = 2$` with
//!
//! ```math
//!   r_1(\vec{x}) \coloneqq x_1^2 + x_2 - 11\quad\text{and}\quad
//!   r_2(\vec{x}) \coloneqq x_1 + x_2^2 - 7.
//! ```
//!
//! ```
//! # use nalgebra::*;
//! use trust_region::{ExitCondition, LeastSquaresProblem, ObjectiveModel, TrustRegionMinimizer};
//!
//! struct Himmelblau;
//!
//! // We must implement a trait for every problem we want to solve
//! impl LeastSquaresProblem<f64> for Himmelblau {
//!     fn residuals(&self, p: &DVector<f64>) -> Option<DVector<f64>> {
//!         Some(DVector::from_vec(vec![
//!             p[0] * p[0] + p[1] - 11.0,
//!             p[0] + p[1] * p[1] - 7.0,
//!         ]))
//!     }
//!
//!     fn jacobian(&self, p: &DVector<f64>) -> Option<DMatrix<f64>> {
//!         Some(DMatrix::from_row_slice(2, 2, &[
//!             2.0 * p[0], 1.0,
//!             1.0, 2.0 * p[1],
//!         ]))
//!     }
//! }
//!
//! let mut model = ObjectiveModel::new(Himmelblau);
//! model.set_parameters(DVector::from_vec(vec![1.0, 1.0]), None)?;
//! let report = TrustRegionMinimizer::dog_leg().minimize(&model)?;
//! assert_eq!(report.exit_condition, ExitCondition::Converged);
//! assert!(report.objective_function < 1e-8);
//! # Ok::<(), trust_region::Error>(())
//! ```
//!
//! # Bounds and fixed parameters
//!
//! The minimizers work in an unconstrained _internal_ space which only
//! contains the free parameters. Bounded parameters are mapped onto their
//! interval by smooth transforms, see [`ObjectiveModel`](struct.ObjectiveModel.html).
//! The problem always receives the full _external_ parameter vector.
//!
//! # Other building blocks
//!
//! - [`WeakWolfeLineSearch`](struct.WeakWolfeLineSearch.html) finds step lengths
//!   satisfying the weak Wolfe conditions along a descent direction.
//! - [`SolverIterator`](struct.SolverIterator.html) combines stop criteria
//!   for iterative solvers, as used by [`conjugate_gradient`](fn.conjugate_gradient.html).
//! - [`Equation`](trait.Equation.html) fits the coefficients of a scalar model to data.

mod equation;
mod error;
mod iterative;
mod line_search;
mod objective;
mod problem;
mod stop_criteria;
mod trust_region;
mod utils;

pub use equation::Equation;
pub use error::{Error, LineSearchError};
pub use iterative::conjugate_gradient;
pub use line_search::{LineSearchResult, ObjectiveFunction, WeakWolfeLineSearch};
pub use objective::{Evaluation, Linearization, NumericalJacobian, ObjectiveModel};
pub use problem::LeastSquaresProblem;
pub use stop_criteria::{
    CriterionKind, DivergenceStopCriterion, FailureStopCriterion, IterationCountStopCriterion,
    IterationStatus, ResidualStopCriterion, SolverIterator, StopCriterion,
};
pub use trust_region::{
    DogLeg, ExitCondition, IterationRecord, MinimizationReport, NewtonCg, Step,
    TrustRegionMinimizer, TrustRegionSubproblem, MAXIMUM_RADIUS,
};

pub use utils::{differentiate_numerically, forward_difference};
