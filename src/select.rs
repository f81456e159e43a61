// src/select.rs

use crate::eigen::EigenDecomposition;
use crate::error::{PcaError, PcaResult};
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Top-k eigenvectors as columns, ordered by descending eigenvalue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionMatrix {
    /// Shape: (n_features, k_components)
    components: Array2<f64>,
    /// Shape: (k_components)
    eigenvalues: Array1<f64>,
    /// Sum of all n_features eigenvalues, not only the selected ones.
    total_variance: f64,
}

impl ProjectionMatrix {
    pub fn n_features(&self) -> usize {
        self.components.nrows()
    }

    pub fn n_components(&self) -> usize {
        self.components.ncols()
    }

    pub fn components(&self) -> ArrayView2<'_, f64> {
        self.components.view()
    }

    /// Eigenvalues of the selected components, i.e. the variance each one explains.
    pub fn eigenvalues(&self) -> ArrayView1<'_, f64> {
        self.eigenvalues.view()
    }

    pub fn total_variance(&self) -> f64 {
        self.total_variance
    }

    /// Fraction of the total variance explained by each selected component.
    pub fn explained_variance_ratio(&self) -> Array1<f64> {
        explained_variance_ratio(self.eigenvalues.view(), self.total_variance)
    }

    pub(crate) fn into_parts(self) -> (Array2<f64>, Array1<f64>, f64) {
        (self.components, self.eigenvalues, self.total_variance)
    }
}

pub(crate) fn explained_variance_ratio(eigenvalues: ArrayView1<'_, f64>, total: f64) -> Array1<f64> {
    if total > 0.0 {
        eigenvalues.mapv(|v| v.max(0.0) / total)
    } else {
        warn!("Total variance is {} (non-positive); explained variance ratios are reported as zero.", total);
        Array1::zeros(eigenvalues.len())
    }
}

/// Ranks eigenpairs by eigenvalue and keeps the leading ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentSelector;

impl ComponentSelector {
    pub fn new() -> Self {
        ComponentSelector
    }

    /// Indices of the eigenpairs by descending eigenvalue. The sort is stable, so
    /// equal eigenvalues keep their solver order.
    pub fn ranking(&self, decomposition: &EigenDecomposition) -> Vec<usize> {
        let pairs = decomposition.pairs();
        let mut order: Vec<usize> = (0..pairs.len()).collect();
        order.sort_by(|&a, &b| pairs[b].eigenvalue.total_cmp(&pairs[a].eigenvalue));
        order
    }

    /// Builds the projection matrix from the `k` leading eigenvectors.
    ///
    /// # Errors
    /// `PcaError::InvalidComponentCount` unless `1 <= k <= n_features`.
    pub fn select(&self, decomposition: &EigenDecomposition, k: usize) -> PcaResult<ProjectionMatrix> {
        let max = decomposition.len();
        if k < 1 || k > max {
            return Err(PcaError::InvalidComponentCount { requested: k, max });
        }

        let pairs = decomposition.pairs();
        let order = self.ranking(decomposition);
        let n_features = pairs[0].eigenvector.len();

        let mut components = Array2::<f64>::zeros((n_features, k));
        for (mut column, &idx) in components.axis_iter_mut(Axis(1)).zip(&order) {
            let eigenvector = &pairs[idx].eigenvector;
            if eigenvector.len() != n_features {
                return Err(PcaError::DimensionMismatch {
                    context: "eigenvector length",
                    expected: n_features,
                    found: eigenvector.len(),
                });
            }
            column.assign(eigenvector);
        }
        let eigenvalues: Array1<f64> = order[..k].iter().map(|&idx| pairs[idx].eigenvalue).collect();

        debug!("Selected {} of {} components, leading eigenvalue {:.6}.", k, max, eigenvalues[0]);
        Ok(ProjectionMatrix {
            components,
            eigenvalues,
            total_variance: decomposition.total_variance(),
        })
    }

    /// Keeps the smallest number of leading components whose cumulative explained
    /// variance ratio reaches `fraction`.
    ///
    /// # Errors
    /// `PcaError::InvalidConfig` unless `0 < fraction <= 1`.
    pub fn select_by_explained_variance(
        &self,
        decomposition: &EigenDecomposition,
        fraction: f64,
    ) -> PcaResult<ProjectionMatrix> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(PcaError::InvalidConfig(format!(
                "explained variance fraction must be in (0, 1], got {}",
                fraction
            )));
        }
        let pairs = decomposition.pairs();
        let ranked: Array1<f64> = self
            .ranking(decomposition)
            .into_iter()
            .map(|idx| pairs[idx].eigenvalue)
            .collect();
        let ratios = explained_variance_ratio(ranked.view(), decomposition.total_variance());

        let mut cumulative = 0.0;
        let mut k = ratios.len();
        for (idx, ratio) in ratios.iter().enumerate() {
            cumulative += ratio;
            // Rounding can leave the full sum a hair below 1.0.
            if cumulative >= fraction - 1e-12 {
                k = idx + 1;
                break;
            }
        }
        self.select(decomposition, k.max(1))
    }
}
