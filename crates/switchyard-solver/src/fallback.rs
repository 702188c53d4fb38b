//! Explicitly configured backend fallback.

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;

use crate::backend::{BackendKind, LinearSolver};
use crate::error::Result;

/// Runs `primary`, switching to `secondary` when a full factorization on
/// the primary fails.
///
/// Each full factorization tries the primary again, so a transient GPU
/// failure does not pin the run to the secondary. If both fail, the
/// secondary's error is returned.
#[derive(Debug)]
pub struct FallbackSolver {
    primary: Box<dyn LinearSolver>,
    secondary: Box<dyn LinearSolver>,
    using_secondary: bool,
}

impl FallbackSolver {
    pub fn new(primary: Box<dyn LinearSolver>, secondary: Box<dyn LinearSolver>) -> Self {
        Self {
            primary,
            secondary,
            using_secondary: false,
        }
    }

    /// Whether the secondary backend holds the current factors.
    pub fn is_falling_back(&self) -> bool {
        self.using_secondary
    }

    fn active(&mut self) -> &mut dyn LinearSolver {
        if self.using_secondary {
            self.secondary.as_mut()
        } else {
            self.primary.as_mut()
        }
    }
}

impl LinearSolver for FallbackSolver {
    fn kind(&self) -> BackendKind {
        if self.using_secondary {
            self.secondary.kind()
        } else {
            self.primary.kind()
        }
    }

    fn factorize(&mut self, matrix: &CscMatrix<f64>) -> Result<()> {
        self.secondary.invalidate();
        match self.primary.factorize(matrix) {
            Ok(()) => {
                self.using_secondary = false;
                Ok(())
            }
            Err(e) => {
                log::warn!(
                    "{} failed to factorize ({e}); falling back to {}",
                    self.primary.kind(),
                    self.secondary.kind()
                );
                self.using_secondary = true;
                self.secondary.factorize(matrix)
            }
        }
    }

    fn refactorize(&mut self, matrix: &CscMatrix<f64>) -> Result<()> {
        self.active().refactorize(matrix)
    }

    fn solve(&mut self, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        self.active().solve(rhs)
    }

    fn is_factorized(&self) -> bool {
        if self.using_secondary {
            self.secondary.is_factorized()
        } else {
            self.primary.is_factorized()
        }
    }

    fn invalidate(&mut self) {
        self.primary.invalidate();
        self.secondary.invalidate();
    }

    fn value_sensitive(&self) -> bool {
        if self.using_secondary {
            self.secondary.value_sensitive()
        } else {
            self.primary.value_sensitive()
        }
    }
}
