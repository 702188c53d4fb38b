//! Factorization caching across time steps.
//!
//! The system matrix of a switched network only changes at events. Between
//! events, the previous factors are reused and every step costs one solve.

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use serde::Serialize;

use crate::backend::{BackendKind, LinearSolver};
use crate::error::{Error, Result};

/// What [`CachedSolver::prepare`] did with the matrix it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Full symbolic and numeric factorization.
    Factorized,
    /// Numeric refactorization on the existing structure.
    Refactorized,
    /// Stored factors were still valid.
    Reused,
}

/// Counters of factorization work done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SolverStats {
    pub factorizations: usize,
    pub refactorizations: usize,
    pub solves: usize,
    pub reuses: usize,
}

/// A backend plus the matrix its factors belong to.
///
/// The owner calls [`invalidate_topology`](Self::invalidate_topology) after
/// a structural change; [`prepare`](Self::prepare) then compares the new
/// matrix with the cached one and does the least work that keeps the
/// factors valid.
#[derive(Debug)]
pub struct CachedSolver {
    backend: Box<dyn LinearSolver>,
    matrix: Option<CscMatrix<f64>>,
    topology_dirty: bool,
    stats: SolverStats,
}

impl CachedSolver {
    pub fn new(backend: Box<dyn LinearSolver>) -> Self {
        Self {
            backend,
            matrix: None,
            topology_dirty: true,
            stats: SolverStats::default(),
        }
    }

    /// Backend currently doing the work.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn stats(&self) -> SolverStats {
        self.stats
    }

    /// Force a full factorization on the next [`prepare`](Self::prepare).
    pub fn invalidate_topology(&mut self) {
        self.topology_dirty = true;
    }

    /// Bring the factors in line with `matrix`.
    ///
    /// On failure the cache is cleared so a later `solve` reports
    /// [`Error::NotFactorized`] instead of using stale factors.
    pub fn prepare(&mut self, matrix: &CscMatrix<f64>) -> Result<Refresh> {
        let refresh = match &self.matrix {
            _ if self.topology_dirty || !self.backend.is_factorized() => Refresh::Factorized,
            None => Refresh::Factorized,
            Some(cached) if !same_pattern(cached, matrix) => {
                log::warn!(
                    "system matrix structure changed without a topology event; refactoring from scratch"
                );
                Refresh::Factorized
            }
            Some(cached) if !same_values(cached, matrix) => Refresh::Refactorized,
            Some(_) => Refresh::Reused,
        };

        let outcome = match refresh {
            Refresh::Factorized => self.backend.factorize(matrix),
            Refresh::Refactorized => self.backend.refactorize(matrix),
            Refresh::Reused => Ok(()),
        };
        if let Err(e) = outcome {
            self.matrix = None;
            self.backend.invalidate();
            return Err(e);
        }

        match refresh {
            Refresh::Factorized => {
                self.stats.factorizations += 1;
                log::debug!(
                    "factorized {}x{} system ({} nonzeros) with {}",
                    matrix.nrows(),
                    matrix.ncols(),
                    matrix.nnz(),
                    self.backend.kind()
                );
            }
            Refresh::Refactorized => self.stats.refactorizations += 1,
            Refresh::Reused => self.stats.reuses += 1,
        }
        if refresh != Refresh::Reused {
            self.matrix = Some(matrix.clone());
        }
        self.topology_dirty = false;
        Ok(refresh)
    }

    /// Solve against the current factors.
    pub fn solve(&mut self, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        if self.matrix.is_none() {
            return Err(Error::NotFactorized);
        }
        let x = self.backend.solve(rhs)?;
        self.stats.solves += 1;
        Ok(x)
    }

    /// [`prepare`](Self::prepare) followed by [`solve`](Self::solve).
    pub fn solve_system(
        &mut self,
        matrix: &CscMatrix<f64>,
        rhs: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        self.prepare(matrix)?;
        self.solve(rhs)
    }
}

fn same_pattern(a: &CscMatrix<f64>, b: &CscMatrix<f64>) -> bool {
    a.nrows() == b.nrows()
        && a.ncols() == b.ncols()
        && a.col_offsets() == b.col_offsets()
        && a.row_indices() == b.row_indices()
}

fn same_values(a: &CscMatrix<f64>, b: &CscMatrix<f64>) -> bool {
    a.values() == b.values()
}
