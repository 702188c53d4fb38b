//! Solver configuration and backend construction.
//!
//! [`SolverConfig`] selects a backend by name and size threshold.
//! CPU backends are built here; GPU backends live in their own crate and
//! are supplied by the caller through [`SolverConfig::build_with`].

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use serde::{Deserialize, Serialize};

use crate::backend::{BackendKind, LinearSolver};
use crate::dense::DenseLu;
use crate::error::{Error, Result};
use crate::fallback::FallbackSolver;
use crate::sparse::{DEFAULT_PIVOT_THRESHOLD, SparseLu};

/// System size at or above which [`BackendKind::Auto`] picks sparse LU.
pub const SPARSE_THRESHOLD: usize = 100;

/// Relative tolerance within which solutions from different backends
/// are considered to agree.
pub const SOLUTION_TOLERANCE: f64 = 1e-9;

/// Largest componentwise difference between `a` and `b`, relative to the
/// largest magnitude in `b` (absolute when `b` is all zeros).
pub fn relative_difference(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    let scale = b.amax().max(1.0);
    (a - b).amax() / scale
}

/// Linear solver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Backend used for the system matrix.
    pub backend: BackendKind,
    /// Backend to switch to if the primary cannot be built or fails to
    /// factorize. No fallback happens unless this is set.
    pub fallback: Option<BackendKind>,
    /// Size threshold for [`BackendKind::Auto`].
    pub sparse_threshold: usize,
    /// Diagonal preference of the sparse LU pivot search.
    pub pivot_threshold: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            fallback: None,
            sparse_threshold: SPARSE_THRESHOLD,
            pivot_threshold: DEFAULT_PIVOT_THRESHOLD,
        }
    }
}

impl SolverConfig {
    /// Configuration for a fixed backend.
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    pub fn with_fallback(mut self, fallback: BackendKind) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_sparse_threshold(mut self, threshold: usize) -> Self {
        self.sparse_threshold = threshold;
        self
    }

    pub fn with_pivot_threshold(mut self, threshold: f64) -> Self {
        self.pivot_threshold = threshold;
        self
    }

    /// Backend that would factorize a system of `size` unknowns.
    pub fn resolve(&self, size: usize) -> BackendKind {
        match self.backend {
            BackendKind::Auto if size >= self.sparse_threshold => BackendKind::Sparse,
            BackendKind::Auto => BackendKind::Dense,
            kind => kind,
        }
    }

    /// Human-readable description of the backend choice for a size.
    pub fn describe(&self, size: usize) -> String {
        let chosen = self.resolve(size);
        match self.fallback {
            Some(fallback) => format!("{} (fallback: {})", chosen, fallback),
            None => chosen.to_string(),
        }
    }

    /// Build the configured backend using only CPU implementations.
    ///
    /// GPU kinds yield [`Error::BackendUnavailable`] unless a CPU fallback
    /// is configured.
    pub fn build(&self) -> Result<Box<dyn LinearSolver>> {
        self.build_with(|kind| {
            Err(Error::BackendUnavailable(format!(
                "{kind} is not compiled into this build"
            )))
        })
    }

    /// Build the configured backend, calling `gpu` for GPU kinds.
    pub fn build_with<F>(&self, gpu: F) -> Result<Box<dyn LinearSolver>>
    where
        F: Fn(BackendKind) -> Result<Box<dyn LinearSolver>>,
    {
        let build_one = |kind: BackendKind| -> Result<Box<dyn LinearSolver>> {
            match kind {
                BackendKind::Dense => Ok(Box::new(DenseLu::new())),
                BackendKind::Sparse => {
                    Ok(Box::new(SparseLu::with_pivot_threshold(self.pivot_threshold)))
                }
                BackendKind::Auto => Ok(Box::new(AutoSolver::new(
                    self.sparse_threshold,
                    self.pivot_threshold,
                ))),
                gpu_kind => gpu(gpu_kind),
            }
        };

        let primary = build_one(self.backend);
        let Some(fallback) = self.fallback else {
            return primary;
        };
        match primary {
            Ok(primary) => Ok(Box::new(FallbackSolver::new(primary, build_one(fallback)?))),
            Err(e) => {
                log::warn!("{} unavailable ({e}); using fallback {}", self.backend, fallback);
                build_one(fallback)
            }
        }
    }
}

/// Dense LU for small systems, sparse LU for large ones.
///
/// The choice is made at every full factorization, so a topology change
/// that grows the system past the threshold switches implementations.
#[derive(Debug)]
pub struct AutoSolver {
    sparse_threshold: usize,
    dense: DenseLu,
    sparse: SparseLu,
    active: Option<BackendKind>,
}

impl AutoSolver {
    pub fn new(sparse_threshold: usize, pivot_threshold: f64) -> Self {
        Self {
            sparse_threshold,
            dense: DenseLu::new(),
            sparse: SparseLu::with_pivot_threshold(pivot_threshold),
            active: None,
        }
    }

    fn active_mut(&mut self) -> Option<&mut dyn LinearSolver> {
        match self.active {
            Some(BackendKind::Dense) => Some(&mut self.dense),
            Some(_) => Some(&mut self.sparse),
            None => None,
        }
    }
}

impl LinearSolver for AutoSolver {
    fn kind(&self) -> BackendKind {
        self.active.unwrap_or(BackendKind::Auto)
    }

    fn factorize(&mut self, matrix: &CscMatrix<f64>) -> Result<()> {
        self.invalidate();
        let kind = if matrix.nrows() >= self.sparse_threshold {
            BackendKind::Sparse
        } else {
            BackendKind::Dense
        };
        if self.active != Some(kind) {
            log::info!("auto solver selected {} for {} unknowns", kind, matrix.nrows());
        }
        self.active = Some(kind);
        match kind {
            BackendKind::Dense => self.dense.factorize(matrix),
            _ => self.sparse.factorize(matrix),
        }
    }

    fn refactorize(&mut self, matrix: &CscMatrix<f64>) -> Result<()> {
        match self.active_mut() {
            Some(backend) => backend.refactorize(matrix),
            None => self.factorize(matrix),
        }
    }

    fn solve(&mut self, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        self.active_mut()
            .ok_or(Error::NotFactorized)?
            .solve(rhs)
    }

    fn is_factorized(&self) -> bool {
        match self.active {
            Some(BackendKind::Dense) => self.dense.is_factorized(),
            Some(_) => self.sparse.is_factorized(),
            None => false,
        }
    }

    fn invalidate(&mut self) {
        self.dense.invalidate();
        self.sparse.invalidate();
    }

    fn value_sensitive(&self) -> bool {
        self.active != Some(BackendKind::Sparse)
    }
}
