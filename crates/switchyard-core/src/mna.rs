//! Modified Nodal Analysis (MNA) stamping and assembly.
//!
//! Stamping is partitioned: each component writes into its own
//! [`StampBuffer`], and [`MnaSystem::assemble`] reduces all buffers in
//! component order. Shared entries (two components on the same node) are
//! summed during the reduction, so no buffer is ever written concurrently.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_complex::Complex64;

use crate::domain::Domain;
use crate::error::{Error, Result};

/// Matrix and right-hand-side contributions of a single component.
///
/// Indices are unknown indices from the [`UnknownMap`](crate::UnknownMap).
/// In the DP domain every complex entry is expanded into its real 2x2 block,
/// always emitting all four positions so the sparsity pattern does not
/// depend on whether an imaginary part happens to be zero.
#[derive(Debug, Clone)]
pub struct StampBuffer {
    domain: Domain,
    /// Number of complex unknowns (offset of the imaginary rows in DP).
    unknowns: usize,
    triplets: Vec<(usize, usize, f64)>,
    rhs: Vec<(usize, f64)>,
}

impl StampBuffer {
    pub fn new(domain: Domain, unknowns: usize) -> Self {
        Self {
            domain,
            unknowns,
            triplets: Vec::new(),
            rhs: Vec::new(),
        }
    }

    /// Empty the buffer, keeping its allocation.
    pub fn clear(&mut self) {
        self.triplets.clear();
        self.rhs.clear();
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Real matrix entries `(row, col, value)`.
    pub fn triplets(&self) -> &[(usize, usize, f64)] {
        &self.triplets
    }

    /// Real right-hand-side entries `(row, value)`.
    pub fn rhs_entries(&self) -> &[(usize, f64)] {
        &self.rhs
    }

    /// Add `value` at unknown position `(row, col)`.
    pub fn add_matrix(&mut self, row: usize, col: usize, value: Complex64) {
        match self.domain {
            Domain::Emt => self.triplets.push((row, col, value.re)),
            Domain::Dp => {
                let m = self.unknowns;
                self.triplets.push((row, col, value.re));
                self.triplets.push((row + m, col + m, value.re));
                self.triplets.push((row, col + m, -value.im));
                self.triplets.push((row + m, col, value.im));
            }
        }
    }

    /// Add `value` to the right-hand side at unknown `row`.
    pub fn add_rhs(&mut self, row: usize, value: Complex64) {
        self.rhs.push((row, value.re));
        if self.domain == Domain::Dp {
            self.rhs.push((row + self.unknowns, value.im));
        }
    }

    /// Stamp an admittance between two nodes.
    ///
    /// For an admittance Y between nodes i and j:
    /// - A[i,i] += Y
    /// - A[j,j] += Y
    /// - A[i,j] -= Y
    /// - A[j,i] -= Y
    ///
    /// `None` stands for ground, which has no row.
    pub fn stamp_admittance(&mut self, node_i: Option<usize>, node_j: Option<usize>, y: Complex64) {
        if let Some(i) = node_i {
            self.add_matrix(i, i, y);
        }
        if let Some(j) = node_j {
            self.add_matrix(j, j, y);
        }
        if let (Some(i), Some(j)) = (node_i, node_j) {
            self.add_matrix(i, j, -y);
            self.add_matrix(j, i, -y);
        }
    }

    /// Real-valued shorthand for [`stamp_admittance`](Self::stamp_admittance).
    pub fn stamp_conductance(&mut self, node_i: Option<usize>, node_j: Option<usize>, g: f64) {
        self.stamp_admittance(node_i, node_j, Complex64::new(g, 0.0));
    }

    /// Stamp a current source driving `current` from node i to node j
    /// through the source (positive current enters node j).
    pub fn stamp_current_source(
        &mut self,
        node_i: Option<usize>,
        node_j: Option<usize>,
        current: Complex64,
    ) {
        if let Some(i) = node_i {
            self.add_rhs(i, -current);
        }
        if let Some(j) = node_j {
            self.add_rhs(j, current);
        }
    }

    /// Stamp an ideal voltage source whose current is unknown `branch`.
    pub fn stamp_voltage_source(
        &mut self,
        node_pos: Option<usize>,
        node_neg: Option<usize>,
        branch: usize,
        voltage: Complex64,
    ) {
        let one = Complex64::new(1.0, 0.0);
        if let Some(i) = node_pos {
            self.add_matrix(i, branch, one);
            self.add_matrix(branch, i, one);
        }
        if let Some(j) = node_neg {
            self.add_matrix(j, branch, -one);
            self.add_matrix(branch, j, -one);
        }
        self.add_rhs(branch, voltage);
    }
}

/// Assembled real system `A x = b` for one step.
#[derive(Debug, Clone)]
pub struct MnaSystem {
    /// Coefficient matrix with duplicate stamps summed.
    pub matrix: CscMatrix<f64>,
    /// Right-hand side.
    pub rhs: DVector<f64>,
}

impl MnaSystem {
    /// Reduce component buffers, in the order given, into a system of
    /// dimension `size`.
    pub fn assemble<'b, I>(size: usize, buffers: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'b StampBuffer>,
    {
        let mut coo = CooMatrix::new(size, size);
        let mut rhs = DVector::zeros(size);

        for buffer in buffers {
            for &(row, col, value) in buffer.triplets() {
                if row >= size || col >= size {
                    return Err(Error::StampOutOfRange {
                        index: row.max(col),
                        size,
                    });
                }
                coo.push(row, col, value);
            }
            for &(row, value) in buffer.rhs_entries() {
                if row >= size {
                    return Err(Error::StampOutOfRange { index: row, size });
                }
                rhs[row] += value;
            }
        }

        Ok(Self {
            matrix: CscMatrix::from(&coo),
            rhs,
        })
    }

    /// Dimension of the system.
    pub fn size(&self) -> usize {
        self.rhs.len()
    }

    /// Dense copy of the coefficient matrix.
    pub fn to_dense(&self) -> DMatrix<f64> {
        DMatrix::from(&self.matrix)
    }
}
