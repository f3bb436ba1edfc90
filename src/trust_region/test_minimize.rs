use core::cell::Cell;
use core::ops::ControlFlow;

use approx::assert_relative_eq;
use nalgebra::{DMatrix, DVector};

use super::{DogLeg, ExitCondition, NewtonCg, TrustRegionMinimizer, TrustRegionSubproblem, MAXIMUM_RADIUS};
use crate::{Error, LeastSquaresProblem, ObjectiveModel};

fn vector(v: &[f64]) -> DVector<f64> {
    DVector::from_column_slice(v)
}

/// `$r(x) = x - 3$`, so the objective is `$\frac{1}{2}(x - 3)^2$`.
struct Shift {
    evaluations: Cell<usize>,
}

impl Shift {
    fn new() -> Self {
        Self {
            evaluations: Cell::new(0),
        }
    }
}

impl LeastSquaresProblem<f64> for Shift {
    fn residuals(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        self.evaluations.set(self.evaluations.get() + 1);
        Some(vector(&[x[0] - 3.]))
    }

    fn jacobian(&self, _x: &DVector<f64>) -> Option<DMatrix<f64>> {
        Some(DMatrix::from_element(1, 1, 1.))
    }
}

struct Rosenbrock;

impl LeastSquaresProblem<f64> for Rosenbrock {
    fn residuals(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        Some(vector(&[10. * (x[1] - x[0] * x[0]), 1. - x[0]]))
    }

    fn jacobian(&self, x: &DVector<f64>) -> Option<DMatrix<f64>> {
        #[rustfmt::skip]
        let j = DMatrix::from_row_slice(2, 2, &[
            -20. * x[0], 10.,
            -1.,          0.,
        ]);
        Some(j)
    }
}

fn model<P: LeastSquaresProblem<f64>>(problem: P, guess: &[f64]) -> ObjectiveModel<f64, P> {
    let mut model = ObjectiveModel::new(problem);
    model.set_parameters(vector(guess), None).unwrap();
    model
}

fn both() -> (
    TrustRegionMinimizer<f64, DogLeg>,
    TrustRegionMinimizer<f64, NewtonCg>,
) {
    (
        TrustRegionMinimizer::dog_leg(),
        TrustRegionMinimizer::newton_cg(),
    )
}

#[test]
fn shifted_square_converges_quickly() {
    let (dog_leg, newton_cg) = both();
    let model = model(Shift::new(), &[0.]);
    for report in [
        dog_leg.minimize(&model).unwrap(),
        newton_cg.minimize(&model).unwrap(),
    ] {
        assert_eq!(report.exit_condition, ExitCondition::Converged);
        assert!(report.iterations < 20);
        assert_relative_eq!(report.minimizing_point[0], 3., epsilon = 1e-8);
        assert!(report.objective_function <= 1e-8);
        // start, radius-limited step of length 1, then the full Gauss-Newton step
        assert_eq!(report.iterations, 2);
        assert_eq!(report.number_of_evaluations, 3);
    }
    assert_eq!(model.problem().evaluations.get(), 6);
}

#[test]
fn rosenbrock() {
    let (dog_leg, newton_cg) = both();
    let model = model(Rosenbrock, &[-1.2, 1.]);
    for report in [
        dog_leg.minimize(&model).unwrap(),
        newton_cg.minimize(&model).unwrap(),
    ] {
        assert!(report.is_success(), "{:?}", report.exit_condition);
        assert_relative_eq!(report.minimizing_point, vector(&[1., 1.]), epsilon = 1e-3);
    }
}

#[test]
fn linear_residuals_reach_the_exact_minimizer() {
    struct Linear;
    impl LeastSquaresProblem<f64> for Linear {
        fn residuals(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
            Some(self.jacobian(x)? * x - vector(&[1., -2., 0.5]))
        }

        fn jacobian(&self, _x: &DVector<f64>) -> Option<DMatrix<f64>> {
            #[rustfmt::skip]
            let a = DMatrix::from_row_slice(3, 3, &[
                2., 1., 0.,
                1., 3., 1.,
                0., 1., 4.,
            ]);
            Some(a)
        }
    }
    let a = Linear.jacobian(&vector(&[0., 0., 0.])).unwrap();
    let expected = a.lu().solve(&vector(&[1., -2., 0.5])).unwrap();

    let (dog_leg, newton_cg) = both();
    let model = model(Linear, &[0.1, 0.1, 0.1]);
    for report in [
        dog_leg.minimize(&model).unwrap(),
        newton_cg.minimize(&model).unwrap(),
    ] {
        assert_eq!(report.exit_condition, ExitCondition::Converged);
        assert_relative_eq!(report.minimizing_point, expected, epsilon = 1e-4);
    }
}

#[test]
fn accepted_steps_never_increase_the_objective() {
    fn check<S: TrustRegionSubproblem<f64>>(minimizer: TrustRegionMinimizer<f64, S>) {
        let model = model(Rosenbrock, &[-1.2, 1.]);
        let mut last = model.evaluate_at(&model.initial_point()).value;
        let mut records = 0;
        minimizer
            .minimize_with(&model, |record| {
                records += 1;
                assert!(record.radius > 0.);
                assert!(record.radius <= MAXIMUM_RADIUS);
                if record.accepted {
                    assert!(record.value <= last);
                    assert_eq!(record.value, record.trial_value);
                } else {
                    assert_eq!(record.value, last);
                }
                last = record.value;
                ControlFlow::Continue(())
            })
            .unwrap();
        assert!(records > 0);
    }
    check(TrustRegionMinimizer::dog_leg());
    check(TrustRegionMinimizer::newton_cg());
}

#[test]
fn observer_can_stop_the_minimization() {
    let model = model(Rosenbrock, &[-1.2, 1.]);
    let report = TrustRegionMinimizer::dog_leg()
        .minimize_with(&model, |record| {
            if record.iteration == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
    assert_eq!(report.exit_condition, ExitCondition::ManuallyStopped);
    assert_eq!(report.iterations, 3);
}

#[test]
fn iteration_budget() {
    let model = model(Rosenbrock, &[-1.2, 1.]);
    let report = TrustRegionMinimizer::dog_leg()
        .with_maximum_iterations(2)
        .minimize(&model)
        .unwrap();
    assert_eq!(report.exit_condition, ExitCondition::ExceedIterations);
    assert_eq!(report.iterations, 2);
    assert!(!report.is_success());
}

#[test]
fn nan_residuals_stop_within_one_iteration() {
    /// Defined only for `$x \leq 0.5$`.
    struct Partial;
    impl LeastSquaresProblem<f64> for Partial {
        fn residuals(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
            Some(vector(&[if x[0] <= 0.5 { x[0] - 5. } else { f64::NAN }]))
        }

        fn jacobian(&self, _x: &DVector<f64>) -> Option<DMatrix<f64>> {
            Some(DMatrix::from_element(1, 1, 1.))
        }
    }
    let (dog_leg, newton_cg) = both();
    let model = model(Partial, &[0.]);
    for report in [
        dog_leg.minimize(&model).unwrap(),
        newton_cg.minimize(&model).unwrap(),
    ] {
        assert_eq!(report.exit_condition, ExitCondition::InvalidValues);
        assert_eq!(report.iterations, 1);
        // the last valid point is reported
        assert_eq!(report.minimizing_point[0], 0.);
        assert_eq!(report.objective_function, 12.5);
    }

    let model = self::model(Partial, &[1.]);
    let report = dog_leg.minimize(&model).unwrap();
    assert_eq!(report.exit_condition, ExitCondition::InvalidValues);
    assert_eq!(report.iterations, 0);
}

#[test]
fn missing_jacobian_is_invalid() {
    struct NoJacobian;
    impl LeastSquaresProblem<f64> for NoJacobian {
        fn residuals(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
            Some(x.clone())
        }

        fn jacobian(&self, _x: &DVector<f64>) -> Option<DMatrix<f64>> {
            None
        }
    }
    let report = TrustRegionMinimizer::dog_leg()
        .minimize(&model(NoJacobian, &[1., 2.]))
        .unwrap();
    assert_eq!(report.exit_condition, ExitCondition::InvalidValues);
    assert_eq!(report.iterations, 0);
}

#[test]
fn fixed_parameters_keep_their_value() {
    /// `$r(\vec{x}) = (x_1 - 1, x_2 - 2, x_1 x_2 - 5)$`
    struct Coupled;
    impl LeastSquaresProblem<f64> for Coupled {
        fn residuals(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
            Some(vector(&[x[0] - 1., x[1] - 2., x[0] * x[1] - 5.]))
        }
    }
    let mut model = ObjectiveModel::new(Coupled);
    model
        .set_parameters(vector(&[0.3, 4.]), Some(&[false, true]))
        .unwrap();
    let (dog_leg, newton_cg) = both();
    for report in [
        dog_leg.minimize(&model).unwrap(),
        newton_cg.minimize(&model).unwrap(),
    ] {
        assert!(report.is_success(), "{:?}", report.exit_condition);
        assert_eq!(report.minimizing_point[1], 4.);
        assert_relative_eq!(report.minimizing_point[0], 21. / 17., epsilon = 1e-6);
        assert_eq!(report.gradient.nrows(), 1);
        let covariance = report.covariance.unwrap();
        assert_eq!(covariance[(1, 1)], 0.);
        assert_eq!(covariance[(0, 1)], 0.);
    }
}

#[test]
fn bounds_are_respected() {
    let mut upper = ObjectiveModel::new(Shift::new()).with_upper_bounds(vector(&[2.]));
    upper.set_parameters(vector(&[0.]), None).unwrap();
    let mut both_sides =
        ObjectiveModel::new(Shift::new()).with_bounds(vector(&[-1.]), vector(&[2.]));
    both_sides.set_parameters(vector(&[0.]), None).unwrap();

    for model in [&upper, &both_sides] {
        let report = TrustRegionMinimizer::dog_leg().minimize(model).unwrap();
        // the transform flattens at the bound, so the region may collapse first
        assert!(
            report.is_success() || report.exit_condition == ExitCondition::LackOfProgress,
            "{:?}",
            report.exit_condition
        );
        let x = report.minimizing_point[0];
        assert!(x <= 2.);
        assert!(x > 2. - 1e-4);
    }
}

#[test]
fn unset_parameters_are_an_error() {
    let model = ObjectiveModel::new(Rosenbrock);
    assert_eq!(
        TrustRegionMinimizer::dog_leg().minimize(&model).unwrap_err(),
        Error::ParametersNotSet
    );
}

#[test]
fn covariance_of_a_straight_line_fit() {
    struct Line {
        xs: Vec<f64>,
        ys: Vec<f64>,
    }
    impl LeastSquaresProblem<f64> for Line {
        fn residuals(&self, p: &DVector<f64>) -> Option<DVector<f64>> {
            Some(DVector::from_iterator(
                self.xs.len(),
                self.xs
                    .iter()
                    .zip(&self.ys)
                    .map(|(x, y)| p[0] + p[1] * x - y),
            ))
        }
    }
    let xs = vec![0., 1., 2., 3., 4., 5.];
    let ys = vec![0.1, 1.9, 4.2, 5.8, 8.1, 9.9];
    let design = DMatrix::from_fn(6, 2, |i, j| if j == 0 { 1. } else { xs[i] });
    let model = model(Line { xs, ys: ys.clone() }, &[0., 0.]);
    let report = TrustRegionMinimizer::dog_leg().minimize(&model).unwrap();
    assert!(report.is_success(), "{:?}", report.exit_condition);

    let normal = design.tr_mul(&design);
    let expected = normal.clone().lu().solve(&design.tr_mul(&vector(&ys))).unwrap();
    assert_relative_eq!(report.minimizing_point, expected, epsilon = 1e-6);

    let residuals = &design * &expected - vector(&ys);
    let variance = residuals.norm_squared() / 4.;
    let expected_covariance = normal.try_inverse().unwrap() * variance;
    let covariance = report.covariance.unwrap();
    assert_relative_eq!(covariance, expected_covariance, max_relative = 1e-5);
    let errors = report.standard_errors.unwrap();
    assert_relative_eq!(errors[1], expected_covariance[(1, 1)].sqrt(), max_relative = 1e-5);
    let correlation = report.correlation.unwrap();
    assert_relative_eq!(correlation[(0, 0)], 1., epsilon = 1e-12);
    assert!(correlation[(0, 1)] < 0.);
}

#[test]
#[should_panic(expected = "gradient_tolerance must be >= 0")]
fn negative_tolerance_panics() {
    TrustRegionMinimizer::<f64, DogLeg>::dog_leg().with_gradient_tolerance(-1.);
}

/// `$r(x) = a x - b$`.
struct Line {
    a: f64,
    b: f64,
}

impl LeastSquaresProblem<f64> for Line {
    fn residuals(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        Some(vector(&[self.a * x[0] - self.b]))
    }

    fn jacobian(&self, _x: &DVector<f64>) -> Option<DMatrix<f64>> {
        Some(DMatrix::from_element(1, 1, self.a))
    }
}

#[test]
fn function_tolerance_applies_to_the_residual_sum_of_squares() {
    // RSS 1.5e-8 at the start, half of it is below the tolerance
    let offset = (1.5e-8f64).sqrt();
    let minimizer = TrustRegionMinimizer::dog_leg().with_gradient_tolerance(0.);
    let report = minimizer
        .minimize(&model(Line { a: 1., b: -offset }, &[0.]))
        .unwrap();
    assert_eq!(report.exit_condition, ExitCondition::Converged);
    assert!(report.iterations > 0);
    assert!(report.residual_sum_of_squares() <= 1e-8);

    let offset = (0.5e-8f64).sqrt();
    let report = minimizer
        .minimize(&model(Line { a: 1., b: -offset }, &[0.]))
        .unwrap();
    assert_eq!(report.exit_condition, ExitCondition::Converged);
    assert_eq!(report.iterations, 0);
    assert_relative_eq!(report.residual_sum_of_squares(), 0.5e-8);
    assert_relative_eq!(report.objective_function, 0.25e-8);
}

/// Radii after every iteration, checking that good boundary steps double
/// the radius up to the cap.
fn radii<S: TrustRegionSubproblem<f64>>(
    minimizer: TrustRegionMinimizer<f64, S>,
    problem: Line,
    initial_radius: f64,
) -> (Vec<f64>, ExitCondition) {
    let model = model(problem, &[0.]);
    let mut seen: Vec<f64> = vec![];
    let report = minimizer
        .minimize_with(&model, |record| {
            assert!(record.step_norm <= MAXIMUM_RADIUS * (1. + 1e-12));
            if record.hit_boundary && record.ratio > 0.75 {
                let previous = seen.last().copied().unwrap_or(initial_radius);
                assert_eq!(record.radius, f64::min(2. * previous, MAXIMUM_RADIUS));
            }
            seen.push(record.radius);
            ControlFlow::Continue(())
        })
        .unwrap();
    (seen, report.exit_condition)
}

#[test]
fn radius_doubles_on_good_boundary_steps() {
    // the Cauchy length 1/a^2 is clamped to 1, the minimizer lies at x = 50
    for (radii, exit_condition) in [
        radii(TrustRegionMinimizer::dog_leg(), Line { a: 2., b: 100. }, 1.),
        radii(TrustRegionMinimizer::newton_cg(), Line { a: 2., b: 100. }, 1.),
    ] {
        assert_eq!(exit_condition, ExitCondition::Converged);
        assert_eq!(radii, vec![2., 4., 8., 16., 32., 32.]);
    }
}

#[test]
fn radius_saturates_at_the_maximum() {
    // the Cauchy length 1/a^2 = 1e4 is clamped, the minimizer lies at x = 9550
    for (radii, exit_condition) in [
        radii(TrustRegionMinimizer::dog_leg(), Line { a: 0.01, b: 95.5 }, MAXIMUM_RADIUS),
        radii(TrustRegionMinimizer::newton_cg(), Line { a: 0.01, b: 95.5 }, MAXIMUM_RADIUS),
    ] {
        assert_eq!(exit_condition, ExitCondition::Converged);
        assert_eq!(radii.len(), 10);
        assert!(radii.iter().all(|&radius| radius == MAXIMUM_RADIUS));
    }
}
