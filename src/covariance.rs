// src/covariance.rs

use crate::config::Ddof;
use crate::error::{PcaError, PcaResult};
use crate::standardize::StandardizedMatrix;
use float_cmp::approx_eq;
use log::debug;
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Absolute tolerance used when accepting an externally supplied matrix as symmetric.
pub const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Symmetric covariance matrix of the standardized features, shape (n_features, n_features).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovarianceMatrix {
    data: Array2<f64>,
}

impl CovarianceMatrix {
    /// Accepts a precomputed matrix.
    ///
    /// The matrix must be square, finite, symmetric within `SYMMETRY_TOLERANCE` and
    /// have a non-negative diagonal. It is then made exactly symmetric by averaging it
    /// with its transpose.
    pub fn try_from_array(data: Array2<f64>) -> PcaResult<Self> {
        let (rows, cols) = data.dim();
        if rows != cols {
            return Err(PcaError::NotSquare { rows, cols });
        }
        if rows == 0 {
            return Err(PcaError::NoFeatures);
        }
        crate::data::check_finite(data.view())?;
        for i in 0..rows {
            if data[[i, i]] < 0.0 {
                return Err(PcaError::NegativeVariance {
                    index: i,
                    value: data[[i, i]],
                });
            }
            for j in (i + 1)..cols {
                let (upper, lower) = (data[[i, j]], data[[j, i]]);
                if !approx_eq!(f64, upper, lower, epsilon = SYMMETRY_TOLERANCE, ulps = 4) {
                    return Err(PcaError::NotSymmetric {
                        row: i,
                        column: j,
                        upper,
                        lower,
                    });
                }
            }
        }
        // Halve before adding so entries near f64::MAX stay finite.
        let symmetric = data.mapv(|x| x * 0.5) + data.t().mapv(|x| x * 0.5);
        Ok(Self { data: symmetric })
    }

    pub fn n_features(&self) -> usize {
        self.data.nrows()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Sum of the diagonal, i.e. the total variance.
    pub fn trace(&self) -> f64 {
        self.data.diag().sum()
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.data
    }
}

/// Computes `cov(x, y) = sum(x * y) / divisor` over the standardized columns.
///
/// Standardized columns have zero mean, so each entry is a column dot product.
#[derive(Debug, Clone, Copy)]
pub struct CovarianceEstimator {
    ddof: Ddof,
}

impl CovarianceEstimator {
    pub fn new(ddof: Ddof) -> Self {
        Self { ddof }
    }

    pub fn estimate(&self, standardized: &StandardizedMatrix) -> CovarianceMatrix {
        let z = standardized.view();
        let n_features = z.ncols();
        let divisor = self.ddof.divisor(z.nrows());

        // Row i of the upper triangle: entries (i, i..n_features).
        let upper_rows: Vec<Vec<f64>> = (0..n_features)
            .into_par_iter()
            .map(|i| {
                let zi = z.column(i);
                (i..n_features)
                    .map(|j| zi.dot(&z.column(j)) / divisor)
                    .collect()
            })
            .collect();

        let mut data = Array2::<f64>::zeros((n_features, n_features));
        for (i, row) in upper_rows.iter().enumerate() {
            for (offset, &value) in row.iter().enumerate() {
                let j = i + offset;
                data[[i, j]] = value;
                data[[j, i]] = value;
            }
        }

        debug!(
            "Estimated {}x{} covariance matrix ({:?} divisor), trace {:.6}.",
            n_features,
            n_features,
            self.ddof,
            data.diag().sum()
        );
        CovarianceMatrix { data }
    }
}
