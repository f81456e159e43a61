// src/project.rs

use crate::error::{PcaError, PcaResult};
use crate::select::ProjectionMatrix;
use crate::standardize::StandardizedMatrix;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Scores of every sample on the selected components, shape (n_samples, k_components).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedMatrix {
    data: Array2<f64>,
}

impl TransformedMatrix {
    pub(crate) fn from_scores(data: Array2<f64>) -> Self {
        Self { data }
    }

    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_components(&self) -> usize {
        self.data.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.data
    }
}

impl From<TransformedMatrix> for Array2<f64> {
    fn from(value: TransformedMatrix) -> Self {
        value.data
    }
}

/// Maps standardized samples onto a component basis and back.
#[derive(Debug, Clone, Copy, Default)]
pub struct Projector;

impl Projector {
    pub fn new() -> Self {
        Projector
    }

    /// `Z · W`: (n_samples, n_features) x (n_features, k) -> (n_samples, k).
    pub fn project(
        &self,
        standardized: &StandardizedMatrix,
        projection: &ProjectionMatrix,
    ) -> PcaResult<TransformedMatrix> {
        self.project_view(standardized.view(), projection)
    }

    pub(crate) fn project_view(
        &self,
        standardized: ArrayView2<'_, f64>,
        projection: &ProjectionMatrix,
    ) -> PcaResult<TransformedMatrix> {
        if standardized.ncols() != projection.n_features() {
            return Err(PcaError::DimensionMismatch {
                context: "projection input features",
                expected: projection.n_features(),
                found: standardized.ncols(),
            });
        }
        Ok(TransformedMatrix {
            data: standardized.dot(&projection.components()),
        })
    }

    /// `T · Wᵀ`: maps scores back into standardized feature space.
    ///
    /// With all components selected this recovers the standardized matrix up to
    /// rounding; with fewer it is the best rank-k approximation.
    pub fn reconstruct(
        &self,
        transformed: &TransformedMatrix,
        projection: &ProjectionMatrix,
    ) -> PcaResult<Array2<f64>> {
        if transformed.n_components() != projection.n_components() {
            return Err(PcaError::DimensionMismatch {
                context: "reconstruction components",
                expected: projection.n_components(),
                found: transformed.n_components(),
            });
        }
        Ok(transformed.view().dot(&projection.components().t()))
    }
}
