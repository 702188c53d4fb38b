//! Cross-backend agreement and factorization caching.

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use switchyard_solver::{
    AutoSolver, BackendKind, CachedSolver, DEFAULT_PIVOT_THRESHOLD, DenseLu, Error, LinearSolver,
    Refresh, SOLUTION_TOLERANCE, SolverConfig, SparseLu, relative_difference,
};

/// MNA matrix of a resistor ladder driven by an ideal voltage source.
///
/// Unknowns 0..n are node voltages, unknown n is the source current. The
/// source row has a zero diagonal, so pivoting is required.
fn driven_ladder(n: usize, g: f64) -> CscMatrix<f64> {
    let mut coo = CooMatrix::new(n + 1, n + 1);
    for i in 0..n {
        // series conductance to the next node, shunt conductance to ground
        coo.push(i, i, g + 0.1);
        if i + 1 < n {
            coo.push(i, i, g);
            coo.push(i + 1, i + 1, g);
            coo.push(i, i + 1, -g);
            coo.push(i + 1, i, -g);
        }
    }
    coo.push(0, n, 1.0);
    coo.push(n, 0, 1.0);
    CscMatrix::from(&coo)
}

fn rhs(n: usize) -> DVector<f64> {
    let mut b = DVector::zeros(n + 1);
    b[n] = 10.0;
    b[n / 2] = 0.25;
    b
}

#[test]
fn test_dense_and_sparse_agree() {
    for n in [3, 20, 150] {
        let a = driven_ladder(n, 2.0);
        let b = rhs(n);

        let mut dense = DenseLu::new();
        dense.factorize(&a).unwrap();
        let x_dense = dense.solve(&b).unwrap();

        let mut sparse = SparseLu::new();
        sparse.factorize(&a).unwrap();
        let x_sparse = sparse.solve(&b).unwrap();

        let diff = relative_difference(&x_sparse, &x_dense);
        assert!(
            diff < SOLUTION_TOLERANCE,
            "n = {n}: sparse and dense differ by {diff:e}"
        );
        assert!((x_dense[0] - 10.0).abs() < 1e-9, "source node voltage");
    }
}

#[test]
fn test_auto_matches_fixed_backends() {
    let a = driven_ladder(40, 1.0);
    let b = rhs(40);

    let mut auto = AutoSolver::new(10, DEFAULT_PIVOT_THRESHOLD);
    auto.factorize(&a).unwrap();
    assert_eq!(auto.kind(), BackendKind::Sparse);

    let mut dense = DenseLu::new();
    dense.factorize(&a).unwrap();

    let diff = relative_difference(&auto.solve(&b).unwrap(), &dense.solve(&b).unwrap());
    assert!(diff < SOLUTION_TOLERANCE);
}

#[test]
fn test_factorize_is_idempotent() {
    for kind in [BackendKind::Dense, BackendKind::Sparse] {
        let mut backend = SolverConfig::new(kind).build().unwrap();
        let a = driven_ladder(12, 3.0);
        let b = rhs(12);

        backend.factorize(&a).unwrap();
        let first = backend.solve(&b).unwrap();
        backend.factorize(&a).unwrap();
        let second = backend.solve(&b).unwrap();
        assert_eq!(first, second, "{kind}");
    }
}

#[test]
fn test_solve_without_factors() {
    for kind in [BackendKind::Dense, BackendKind::Sparse, BackendKind::Auto] {
        let mut backend = SolverConfig::new(kind).build().unwrap();
        assert!(
            matches!(backend.solve(&DVector::zeros(3)), Err(Error::NotFactorized)),
            "{kind}"
        );
    }
}

#[test]
fn test_floating_subnetwork_is_singular() {
    // Node 1 is connected to node 2 only; neither reaches ground.
    let mut coo = CooMatrix::new(3, 3);
    coo.push(0, 0, 1.0);
    coo.push(1, 1, 1.0);
    coo.push(2, 2, 1.0);
    coo.push(1, 2, -1.0);
    coo.push(2, 1, -1.0);
    let a = CscMatrix::from(&coo);

    for kind in [BackendKind::Dense, BackendKind::Sparse] {
        let mut backend = SolverConfig::new(kind).build().unwrap();
        assert!(
            matches!(backend.factorize(&a), Err(Error::SingularMatrix)),
            "{kind}"
        );
    }
}

#[test]
fn test_cached_solver_tracks_parameter_changes() {
    let mut solver = CachedSolver::new(Box::new(SparseLu::new()));
    let b = rhs(30);

    let a = driven_ladder(30, 1.0);
    for _ in 0..5 {
        solver.prepare(&a).unwrap();
        solver.solve(&b).unwrap();
    }

    // Same structure, new conductance: numeric refactorization only.
    let a2 = driven_ladder(30, 2.0);
    assert_eq!(solver.prepare(&a2).unwrap(), Refresh::Refactorized);
    let x = solver.solve(&b).unwrap();

    let mut reference = DenseLu::new();
    reference.factorize(&a2).unwrap();
    assert!(relative_difference(&x, &reference.solve(&b).unwrap()) < SOLUTION_TOLERANCE);

    let stats = solver.stats();
    assert_eq!(stats.factorizations, 1);
    assert_eq!(stats.refactorizations, 1);
    assert_eq!(stats.reuses, 4);
    assert_eq!(stats.solves, 6);
}
