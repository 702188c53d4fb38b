//! Sparse LU backend.
//!
//! Right-looking LU on a row-wise copy of the CSC input. Columns are
//! eliminated in natural order and rows are pivoted with a threshold test
//! that keeps the diagonal whenever it is within `pivot_threshold` of the
//! column maximum, which keeps fill low for MNA matrices.
//!
//! The pivot sequence found by [`SparseLu::factorize`] is stored and reused
//! by [`SparseLu::refactorize`], which then only repeats the numeric work.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;

use crate::backend::{BackendKind, LinearSolver, check_rhs, check_square};
use crate::error::{Error, Result};

/// Default threshold for preferring the diagonal pivot.
pub const DEFAULT_PIVOT_THRESHOLD: f64 = 0.1;

/// A reused pivot smaller than this fraction of its column maximum forces
/// a fresh pivot search.
const REUSE_THRESHOLD: f64 = 1e-3;

/// Elimination stopped at `step` because no usable pivot was left.
#[derive(Debug, Clone, Copy)]
struct Breakdown {
    step: usize,
}

#[derive(Debug, Clone, Default)]
struct Factors {
    /// Row used as pivot at each step.
    pivots: Vec<usize>,
    /// Multipliers `(row, l)` applied at each step.
    lower: Vec<Vec<(usize, f64)>>,
    /// Pivot row entries `(col, u)` at each step, diagonal first.
    upper: Vec<Vec<(usize, f64)>>,
}

/// Sparse LU with threshold partial pivoting.
#[derive(Debug)]
pub struct SparseLu {
    pivot_threshold: f64,
    factors: Option<Factors>,
    size: usize,
}

impl Default for SparseLu {
    fn default() -> Self {
        Self::new()
    }
}

impl SparseLu {
    pub fn new() -> Self {
        Self::with_pivot_threshold(DEFAULT_PIVOT_THRESHOLD)
    }

    /// Use a custom diagonal preference in `(0, 1]`. 1.0 is plain partial
    /// pivoting.
    pub fn with_pivot_threshold(pivot_threshold: f64) -> Self {
        Self {
            pivot_threshold: pivot_threshold.clamp(f64::EPSILON, 1.0),
            factors: None,
            size: 0,
        }
    }

    /// Number of stored factor entries (L multipliers plus U entries).
    pub fn factor_nnz(&self) -> usize {
        self.factors.as_ref().map_or(0, |f| {
            f.lower.iter().map(Vec::len).sum::<usize>() + f.upper.iter().map(Vec::len).sum::<usize>()
        })
    }

    fn eliminate(
        &self,
        matrix: &CscMatrix<f64>,
        forced: Option<&[usize]>,
    ) -> std::result::Result<Factors, Breakdown> {
        let n = matrix.nrows();
        let mut rows: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n];
        let mut col_rows: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        let mut scale = 0.0_f64;

        for (col, lane) in matrix.col_iter().enumerate() {
            for (&row, &value) in lane.row_indices().iter().zip(lane.values()) {
                *rows[row].entry(col).or_insert(0.0) += value;
                col_rows[col].insert(row);
                scale = scale.max(value.abs());
            }
        }
        let tiny = scale * f64::EPSILON;

        let mut active = vec![true; n];
        let mut factors = Factors {
            pivots: Vec::with_capacity(n),
            lower: Vec::with_capacity(n),
            upper: Vec::with_capacity(n),
        };

        for k in 0..n {
            let magnitude = |r: usize| rows[r].get(&k).map_or(0.0, |v| v.abs());
            let col_max = col_rows[k]
                .iter()
                .filter(|&&r| active[r])
                .map(|&r| magnitude(r))
                .fold(0.0_f64, f64::max);
            if col_max <= tiny {
                return Err(Breakdown { step: k });
            }

            let pivot = match forced {
                Some(order) => {
                    let p = order[k];
                    if !active[p] || magnitude(p) < REUSE_THRESHOLD * col_max {
                        return Err(Breakdown { step: k });
                    }
                    p
                }
                None => {
                    if active[k] && magnitude(k) >= self.pivot_threshold * col_max {
                        k
                    } else {
                        let mut best = None;
                        let mut best_value = 0.0;
                        for &r in col_rows[k].iter().filter(|&&r| active[r]) {
                            if magnitude(r) > best_value {
                                best_value = magnitude(r);
                                best = Some(r);
                            }
                        }
                        best.ok_or(Breakdown { step: k })?
                    }
                }
            };
            active[pivot] = false;

            let pivot_row: Vec<(usize, f64)> = rows[pivot]
                .range(k..)
                .map(|(&c, &v)| (c, v))
                .collect();
            let diag = pivot_row[0].1;

            let targets: Vec<usize> = col_rows[k]
                .iter()
                .copied()
                .filter(|&r| active[r])
                .collect();
            let mut lower = Vec::with_capacity(targets.len());
            for r in targets {
                let l = rows[r].remove(&k).unwrap_or(0.0) / diag;
                // Zero multipliers are kept so the factor structure depends
                // on the pattern only.
                lower.push((r, l));
                for &(j, u) in &pivot_row[1..] {
                    let entry = rows[r].entry(j).or_insert_with(|| {
                        col_rows[j].insert(r);
                        0.0
                    });
                    *entry -= l * u;
                }
            }

            factors.pivots.push(pivot);
            factors.lower.push(lower);
            factors.upper.push(pivot_row);
        }

        Ok(factors)
    }
}

impl LinearSolver for SparseLu {
    fn kind(&self) -> BackendKind {
        BackendKind::Sparse
    }

    fn factorize(&mut self, matrix: &CscMatrix<f64>) -> Result<()> {
        self.factors = None;
        let size = check_square(matrix)?;
        let factors = self.eliminate(matrix, None).map_err(|b| {
            log::debug!("sparse LU breakdown at step {} of {}", b.step, size);
            Error::SingularMatrix
        })?;
        self.factors = Some(factors);
        self.size = size;
        Ok(())
    }

    fn refactorize(&mut self, matrix: &CscMatrix<f64>) -> Result<()> {
        let size = check_square(matrix)?;
        let reused = match &self.factors {
            Some(factors) if size == self.size => self.eliminate(matrix, Some(&factors.pivots)),
            _ => return self.factorize(matrix),
        };
        match reused {
            Ok(factors) => {
                self.factors = Some(factors);
                Ok(())
            }
            Err(b) => {
                log::debug!(
                    "reused pivot degenerated at step {}; searching pivots again",
                    b.step
                );
                self.factorize(matrix)
            }
        }
    }

    fn solve(&mut self, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        let factors = self.factors.as_ref().ok_or(Error::NotFactorized)?;
        check_rhs(self.size, rhs)?;

        let mut b = rhs.clone();
        for (k, lower) in factors.lower.iter().enumerate() {
            let bp = b[factors.pivots[k]];
            for &(r, l) in lower {
                b[r] -= l * bp;
            }
        }

        let mut x = DVector::zeros(self.size);
        for k in (0..self.size).rev() {
            let row = &factors.upper[k];
            let mut sum = b[factors.pivots[k]];
            for &(j, u) in &row[1..] {
                sum -= u * x[j];
            }
            x[k] = sum / row[0].1;
        }
        Ok(x)
    }

    fn is_factorized(&self) -> bool {
        self.factors.is_some()
    }

    fn invalidate(&mut self) {
        self.factors = None;
    }

    fn value_sensitive(&self) -> bool {
        false
    }
}
