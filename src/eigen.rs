// src/eigen.rs

use crate::config::EigenSolverConfig;
use crate::covariance::CovarianceMatrix;
use crate::data::{binary_scale, check_finite};
use crate::error::{PcaError, PcaResult};
use log::{debug, trace};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// One eigenvalue with its unit-norm eigenvector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EigenPair {
    pub eigenvalue: f64,
    /// Length n_features, unit norm.
    pub eigenvector: Array1<f64>,
}

/// All eigenpairs of a symmetric matrix, in the order the solver produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EigenDecomposition {
    pairs: Vec<EigenPair>,
    /// Number of full sweeps the solver needed.
    sweeps: usize,
}

impl EigenDecomposition {
    pub fn new(pairs: Vec<EigenPair>, sweeps: usize) -> Self {
        Self { pairs, sweeps }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[EigenPair] {
        &self.pairs
    }

    pub fn sweeps(&self) -> usize {
        self.sweeps
    }

    pub fn eigenvalues(&self) -> Array1<f64> {
        self.pairs.iter().map(|p| p.eigenvalue).collect()
    }

    /// Eigenvectors as columns; column i belongs to `pairs()[i]`.
    pub fn eigenvectors(&self) -> Array2<f64> {
        let n = self.pairs.first().map_or(0, |p| p.eigenvector.len());
        let mut vectors = Array2::zeros((n, self.pairs.len()));
        for (mut column, pair) in vectors.axis_iter_mut(Axis(1)).zip(&self.pairs) {
            column.assign(&pair.eigenvector);
        }
        vectors
    }

    /// Sum of all eigenvalues. Equals the trace of the decomposed matrix.
    pub fn total_variance(&self) -> f64 {
        self.pairs.iter().map(|p| p.eigenvalue).sum()
    }

    pub fn into_pairs(self) -> Vec<EigenPair> {
        self.pairs
    }
}

/// Symmetric eigendecomposition seam.
///
/// Implementations return exactly `n_features` pairs with real eigenvalues and
/// mutually orthogonal unit-norm eigenvectors.
pub trait SymmetricEigenSolver {
    fn decompose(&self, matrix: &CovarianceMatrix) -> PcaResult<EigenDecomposition>;
}

/// Cyclic Jacobi eigenvalue algorithm.
///
/// Each sweep applies one plane rotation per upper-triangle entry `(p, q)`, chosen to
/// zero that entry. The solver stops once the off-diagonal Frobenius norm is at most
/// `tolerance` times the Frobenius norm of the input, or fails after the sweep cap.
#[derive(Debug, Clone, Default)]
pub struct JacobiEigenSolver {
    config: EigenSolverConfig,
}

impl JacobiEigenSolver {
    pub fn new(config: EigenSolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EigenSolverConfig {
        &self.config
    }
}

impl SymmetricEigenSolver for JacobiEigenSolver {
    fn decompose(&self, matrix: &CovarianceMatrix) -> PcaResult<EigenDecomposition> {
        self.config.validate()?;

        check_finite(matrix.view())?;

        let n = matrix.n_features();
        // Rotations run on the matrix divided by an exact power of two, so the norms
        // below cannot overflow or underflow.
        let max_abs = matrix.view().iter().fold(0.0f64, |acc, &x| acc.max(x.abs()));
        let scale = binary_scale(max_abs);
        let mut a = matrix.view().mapv(|x| x / scale);
        let mut v = Array2::<f64>::eye(n);

        let max_sweeps = self.config.sweep_limit(n);
        let norm = frobenius_norm(&a);
        // A zero matrix is already diagonal.
        let relative_off = |a: &Array2<f64>| {
            if norm > 0.0 {
                off_diagonal_norm(a) / norm
            } else {
                0.0
            }
        };

        let mut off = relative_off(&a);
        let mut sweeps = 0usize;
        // Written so that a NaN norm keeps the loop going into the error below instead
        // of passing as converged.
        while !(off <= self.config.tolerance) {
            if sweeps == max_sweeps || !off.is_finite() {
                return Err(PcaError::Convergence {
                    sweeps,
                    off_diagonal: off,
                    tolerance: self.config.tolerance,
                });
            }
            for p in 0..n.saturating_sub(1) {
                for q in (p + 1)..n {
                    rotate(&mut a, &mut v, p, q);
                }
            }
            sweeps += 1;
            off = relative_off(&a);
            trace!("Jacobi sweep {}: relative off-diagonal norm {:e}", sweeps, off);
        }

        let pairs = (0..n)
            .map(|i| {
                let eigenvalue = a[[i, i]] * scale;
                if !eigenvalue.is_finite() {
                    return Err(PcaError::NumericOverflow {
                        column: i,
                        statistic: "eigenvalue",
                    });
                }
                Ok(EigenPair {
                    eigenvalue,
                    eigenvector: canonical_sign(&normalized(v.column(i))),
                })
            })
            .collect::<PcaResult<Vec<EigenPair>>>()?;

        debug!(
            "Jacobi eigensolver converged on {}x{} matrix after {} sweeps (relative off-diagonal norm {:e}).",
            n, n, sweeps, off
        );
        Ok(EigenDecomposition::new(pairs, sweeps))
    }
}

/// Applies the rotation in plane `(p, q)` that annihilates `a[[p, q]]`:
/// `a <- Jᵀ a J`, `v <- v J`.
fn rotate(a: &mut Array2<f64>, v: &mut Array2<f64>, p: usize, q: usize) {
    let apq = a[[p, q]];
    if apq == 0.0 {
        return;
    }
    let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
    // Smaller root of t^2 + 2 theta t - 1 = 0 keeps the rotation angle below pi/4.
    let t = theta.signum() / (theta.abs() + theta.hypot(1.0));
    let c = 1.0 / t.hypot(1.0);
    let s = t * c;

    let n = a.nrows();
    for k in 0..n {
        let (akp, akq) = (a[[k, p]], a[[k, q]]);
        a[[k, p]] = c * akp - s * akq;
        a[[k, q]] = s * akp + c * akq;
    }
    for k in 0..n {
        let (apk, aqk) = (a[[p, k]], a[[q, k]]);
        a[[p, k]] = c * apk - s * aqk;
        a[[q, k]] = s * apk + c * aqk;
    }
    a[[p, q]] = 0.0;
    a[[q, p]] = 0.0;

    for k in 0..n {
        let (vkp, vkq) = (v[[k, p]], v[[k, q]]);
        v[[k, p]] = c * vkp - s * vkq;
        v[[k, q]] = s * vkp + c * vkq;
    }
}

fn frobenius_norm(a: &Array2<f64>) -> f64 {
    a.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn off_diagonal_norm(a: &Array2<f64>) -> f64 {
    a.indexed_iter()
        .filter(|((i, j), _)| i != j)
        .map(|(_, x)| x * x)
        .sum::<f64>()
        .sqrt()
}

fn normalized(vector: ArrayView1<'_, f64>) -> Array1<f64> {
    let norm = vector.dot(&vector).sqrt();
    if norm > 0.0 {
        vector.mapv(|x| x / norm)
    } else {
        vector.to_owned()
    }
}

/// Flips the vector so that its largest-magnitude component is positive.
/// The first index wins among components of equal magnitude.
pub fn canonical_sign(vector: &Array1<f64>) -> Array1<f64> {
    let pivot = vector
        .iter()
        .enumerate()
        .fold((0usize, 0.0f64), |(best_idx, best_abs), (idx, &x)| {
            if x.abs() > best_abs {
                (idx, x.abs())
            } else {
                (best_idx, best_abs)
            }
        })
        .0;
    match vector.get(pivot) {
        Some(&x) if x < 0.0 => vector.mapv(|x| -x),
        _ => vector.clone(),
    }
}
