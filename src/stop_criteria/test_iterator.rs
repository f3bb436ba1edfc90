use nalgebra::DVector;

use super::*;

fn ones(n: usize) -> DVector<f64> {
    DVector::from_element(n, 1.)
}

#[test]
fn duplicate_kinds_are_rejected() {
    let mut iterator = SolverIterator::new([
        IterationCountStopCriterion::new(10).into(),
        ResidualStopCriterion::new(1e-6, 0).into(),
    ])
    .unwrap();
    assert_eq!(
        iterator.add(IterationCountStopCriterion::new(20)),
        Err(Error::DuplicateStopCriterion(CriterionKind::IterationCount))
    );
    assert_eq!(iterator.criteria().len(), 2);
    assert!(iterator.add(FailureStopCriterion::new()).is_ok());
    assert!(iterator.add(DivergenceStopCriterion::default()).is_ok());
    assert_eq!(
        iterator.add(DivergenceStopCriterion::new(0.1, 3)),
        Err(Error::DuplicateStopCriterion(CriterionKind::Divergence))
    );

    let duplicate = SolverIterator::<f64>::new([
        FailureStopCriterion::new().into(),
        FailureStopCriterion::new().into(),
    ]);
    assert_eq!(
        duplicate.unwrap_err(),
        Error::DuplicateStopCriterion(CriterionKind::Failure)
    );
}

#[test]
fn empty_iterator_is_an_error() {
    let mut iterator = SolverIterator::<f64>::new([]).unwrap();
    assert_eq!(
        iterator.determine_status(0, &ones(2), &ones(2), &ones(2)),
        Err(Error::NoStopCriteria)
    );
}

#[test]
fn first_terminal_verdict_wins() {
    let mut iterator = SolverIterator::new([
        FailureStopCriterion::new().into(),
        IterationCountStopCriterion::new(3).into(),
        ResidualStopCriterion::new(1e-6, 0).into(),
    ])
    .unwrap();
    assert_eq!(iterator.status(), IterationStatus::Indeterminate);

    let large = ones(2);
    let status = iterator.determine_status(0, &ones(2), &ones(2), &large).unwrap();
    assert_eq!(status, IterationStatus::Continue);

    // converged and out of iterations at once: the earlier criterion reports
    let small = DVector::zeros(2);
    let status = iterator.determine_status(3, &ones(2), &ones(2), &small).unwrap();
    assert_eq!(status, IterationStatus::StoppedWithoutConvergence);
    assert_eq!(iterator.status(), status);

    let mut nan = ones(2);
    nan[0] = f64::NAN;
    let status = iterator.determine_status(4, &nan, &ones(2), &small).unwrap();
    assert_eq!(status, IterationStatus::Failure);
}

#[test]
fn cancel_and_reset() {
    let mut iterator =
        SolverIterator::new([IterationCountStopCriterion::new(100).into()]).unwrap();
    assert_eq!(
        iterator.determine_status(0, &ones(1), &ones(1), &ones(1)),
        Ok(IterationStatus::Continue)
    );
    iterator.cancel();
    assert_eq!(iterator.status(), IterationStatus::Cancelled);
    assert_eq!(
        iterator.determine_status(1, &ones(1), &ones(1), &ones(1)),
        Ok(IterationStatus::Cancelled)
    );

    iterator.reset();
    assert_eq!(iterator.status(), IterationStatus::Indeterminate);
    assert_eq!(iterator.criteria()[0].status(), IterationStatus::Indeterminate);
    assert_eq!(
        iterator.determine_status(1, &ones(1), &ones(1), &ones(1)),
        Ok(IterationStatus::Continue)
    );
}

#[test]
fn clones_do_not_share_state() {
    let source = DVector::from_vec(vec![1., 1., 2.001]);
    let residual = DVector::from_vec(vec![0.001, 0.001, 0.002]);
    let mut iterator =
        SolverIterator::new([ResidualStopCriterion::new(1e-3, 10).into()]).unwrap();
    iterator.determine_status(5, &ones(3), &source, &residual).unwrap();
    let mut copy = iterator.clone();
    assert_eq!(
        copy.determine_status(16, &ones(3), &source, &residual),
        Ok(IterationStatus::Converged)
    );
    assert_eq!(iterator.status(), IterationStatus::Continue);
    assert_eq!(iterator.criteria()[0].kind(), CriterionKind::Residual);
}

#[test]
fn terminal_statuses() {
    assert!(!IterationStatus::Indeterminate.is_terminal());
    assert!(!IterationStatus::Continue.is_terminal());
    for status in [
        IterationStatus::Converged,
        IterationStatus::Diverged,
        IterationStatus::Failure,
        IterationStatus::StoppedWithoutConvergence,
        IterationStatus::Cancelled,
    ] {
        assert!(status.is_terminal());
    }
}
