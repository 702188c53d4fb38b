//! Dense LU backend.

use nalgebra::linalg::LU;
use nalgebra::{DMatrix, DVector, Dyn};
use nalgebra_sparse::CscMatrix;

use crate::backend::{BackendKind, LinearSolver, check_rhs, check_square};
use crate::error::{Error, Result};

/// Solve a dense linear system Ax = b using LU decomposition.
pub fn solve_dense(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    if a.nrows() != a.ncols() {
        return Err(Error::NotSquare {
            rows: a.nrows(),
            cols: a.ncols(),
        });
    }
    check_rhs(a.nrows(), b)?;

    let lu = a.clone().lu();
    if !well_conditioned(&lu) {
        return Err(Error::SingularMatrix);
    }
    lu.solve(b).ok_or(Error::SingularMatrix)
}

/// Reject factors whose smallest pivot vanishes relative to the largest.
fn well_conditioned(lu: &LU<f64, Dyn, Dyn>) -> bool {
    let u = lu.u();
    let diag = u.diagonal();
    let max = diag.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let min = diag.iter().fold(f64::INFINITY, |m, v| m.min(v.abs()));
    diag.is_empty() || (max > 0.0 && min > max * f64::EPSILON)
}

/// Dense LU with partial pivoting (nalgebra).
///
/// Densifies the system matrix on every factorization. Pivoting depends on
/// the values, so the backend is value-sensitive.
#[derive(Debug, Default)]
pub struct DenseLu {
    lu: Option<LU<f64, Dyn, Dyn>>,
    size: usize,
}

impl DenseLu {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinearSolver for DenseLu {
    fn kind(&self) -> BackendKind {
        BackendKind::Dense
    }

    fn factorize(&mut self, matrix: &CscMatrix<f64>) -> Result<()> {
        self.lu = None;
        let size = check_square(matrix)?;
        let lu = DMatrix::from(matrix).lu();
        if !well_conditioned(&lu) {
            return Err(Error::SingularMatrix);
        }
        self.lu = Some(lu);
        self.size = size;
        Ok(())
    }

    fn solve(&mut self, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        let lu = self.lu.as_ref().ok_or(Error::NotFactorized)?;
        check_rhs(self.size, rhs)?;
        lu.solve(rhs).ok_or(Error::SingularMatrix)
    }

    fn is_factorized(&self) -> bool {
        self.lu.is_some()
    }

    fn invalidate(&mut self) {
        self.lu = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    fn csc(n: usize, entries: &[(usize, usize, f64)]) -> CscMatrix<f64> {
        let mut coo = CooMatrix::new(n, n);
        for &(r, c, v) in entries {
            coo.push(r, c, v);
        }
        CscMatrix::from(&coo)
    }

    #[test]
    fn test_solve_dense_2x2() {
        // 2x + y = 5
        // x + 3y = 10
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 3.0]);
        let b = DVector::from_vec(vec![5.0, 10.0]);

        let x = solve_dense(&a, &b).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-10);
        assert!((x[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_solve_before_factorize() {
        let mut lu = DenseLu::new();
        let err = lu.solve(&DVector::zeros(2)).unwrap_err();
        assert!(matches!(err, Error::NotFactorized));
    }

    #[test]
    fn test_singular_matrix() {
        let a = csc(2, &[(0, 0, 1.0), (0, 1, 2.0), (1, 0, 2.0), (1, 1, 4.0)]);
        let mut lu = DenseLu::new();
        assert!(matches!(lu.factorize(&a), Err(Error::SingularMatrix)));
        assert!(!lu.is_factorized());
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = csc(2, &[(0, 0, 1.0), (1, 1, 1.0)]);
        let mut lu = DenseLu::new();
        lu.factorize(&a).unwrap();
        let err = lu.solve(&DVector::zeros(3)).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_invalidate_drops_factors() {
        let a = csc(1, &[(0, 0, 4.0)]);
        let mut lu = DenseLu::new();
        lu.factorize(&a).unwrap();
        let x = lu.solve(&DVector::from_vec(vec![2.0])).unwrap();
        assert!((x[0] - 0.5).abs() < 1e-15);

        lu.invalidate();
        assert!(matches!(
            lu.solve(&DVector::from_vec(vec![2.0])),
            Err(Error::NotFactorized)
        ));
    }
}
