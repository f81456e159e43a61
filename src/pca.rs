// Principal component analysis (PCA)

use crate::config::PcaConfig;
use crate::covariance::{CovarianceEstimator, CovarianceMatrix};
use crate::data::{check_finite, DataMatrix};
use crate::eigen::{EigenDecomposition, JacobiEigenSolver, SymmetricEigenSolver};
use crate::error::{PcaError, PcaResult};
use crate::project::{Projector, TransformedMatrix};
use crate::select::{explained_variance_ratio, ComponentSelector, ProjectionMatrix};
use crate::standardize::{StandardizedMatrix, Standardizer};
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Instant;

const EIGENVALUE_ROUNDING: f64 = 1e-9;

/// Everything a single engine run produces.
#[derive(Debug, Clone)]
pub struct PcaOutput {
    /// Shape: (n_samples, k_components)
    pub transformed: TransformedMatrix,
    /// Full decomposition before sorting and truncation.
    pub decomposition: EigenDecomposition,
    pub projection: ProjectionMatrix,
}

/// Runs standardization, covariance estimation, eigendecomposition, component
/// selection and projection in that order.
///
/// The engine holds only its configuration, so one instance can serve any number of
/// independent calls, including concurrently from several threads.
///
/// # Examples
///
/// ```
/// use stepwise_pca::{DataMatrix, PcaEngine};
///
/// let data = DataMatrix::from_rows(&[
///     [1.0, 2.0, 3.0, 4.0],
///     [5.0, 5.0, 6.0, 7.0],
///     [1.0, 4.0, 2.0, 3.0],
///     [5.0, 3.0, 2.0, 1.0],
///     [8.0, 1.0, 2.0, 2.0],
/// ])
/// .unwrap();
///
/// let transformed = PcaEngine::default().compute(&data, 2).unwrap();
/// assert_eq!(transformed.view().dim(), (5, 2));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PcaEngine {
    config: PcaConfig,
}

impl PcaEngine {
    pub fn new(config: PcaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PcaConfig {
        &self.config
    }

    /// Projects `data` onto its `k` leading principal components.
    ///
    /// # Errors
    /// The first failure of any stage: `DegenerateColumn`, `Convergence`,
    /// `InvalidComponentCount` or `DimensionMismatch`, or `InvalidConfig` for a bad
    /// configuration.
    pub fn compute(&self, data: &DataMatrix, k: usize) -> PcaResult<TransformedMatrix> {
        Ok(self.compute_with_decomposition(data, k)?.transformed)
    }

    /// Like [`compute`](Self::compute), also returning the eigendecomposition and the
    /// projection matrix.
    pub fn compute_with_decomposition(&self, data: &DataMatrix, k: usize) -> PcaResult<PcaOutput> {
        let run = self.run(data, k)?;
        Ok(PcaOutput {
            transformed: run.transformed,
            decomposition: run.decomposition,
            projection: run.projection,
        })
    }

    /// Stops after the eigensolver and returns every eigenpair in solver order.
    pub fn decompose(&self, data: &DataMatrix) -> PcaResult<EigenDecomposition> {
        self.config.validate()?;
        let standardized = self.standardize(data)?;
        let covariance = self.covariance(&standardized);
        self.eigen_decompose(&covariance)
    }

    /// Fits a reusable model that can transform further samples.
    pub fn fit(&self, data: &DataMatrix, k: usize) -> PcaResult<PcaModel> {
        let run = self.run(data, k)?;
        let means = run.standardized.means();
        let scales = run.standardized.std_devs();
        let (rotation, eigenvalues, total_variance) = run.projection.into_parts();
        Ok(PcaModel {
            rotation,
            mean: means,
            scale: scales,
            explained_variance: eigenvalues,
            total_variance,
            config: self.config.clone(),
        })
    }

    fn run(&self, data: &DataMatrix, k: usize) -> PcaResult<PcaRun> {
        self.config.validate()?;

        info!(
            "Starting PCA. Samples={}, Features={}, Components={}",
            data.n_samples(),
            data.n_features(),
            k
        );
        let overall_start_time = Instant::now();

        let stage_start_time = Instant::now();
        let standardized = self.standardize(data)?;
        info!("Standardized features in {:?}", stage_start_time.elapsed());

        let stage_start_time = Instant::now();
        let covariance = self.covariance(&standardized);
        info!("Estimated covariance matrix in {:?}", stage_start_time.elapsed());

        let stage_start_time = Instant::now();
        let decomposition = self.eigen_decompose(&covariance)?;
        info!(
            "Computed eigendecomposition in {:?} ({} sweeps)",
            stage_start_time.elapsed(),
            decomposition.sweeps()
        );

        let projection = ComponentSelector::new().select(&decomposition, k)?;
        debug!(
            "Explained variance ratio of selected components: {:?}",
            projection.explained_variance_ratio().to_vec()
        );

        let transformed = Projector::new().project(&standardized, &projection)?;
        if transformed.n_samples() != data.n_samples() {
            return Err(PcaError::DimensionMismatch {
                context: "transformed samples",
                expected: data.n_samples(),
                found: transformed.n_samples(),
            });
        }

        info!("PCA finished in {:?}", overall_start_time.elapsed());
        Ok(PcaRun {
            standardized,
            decomposition,
            projection,
            transformed,
        })
    }

    fn standardize(&self, data: &DataMatrix) -> PcaResult<StandardizedMatrix> {
        Standardizer::new(self.config.standardization_ddof).standardize(data)
    }

    fn covariance(&self, standardized: &StandardizedMatrix) -> CovarianceMatrix {
        CovarianceEstimator::new(self.config.covariance_ddof).estimate(standardized)
    }

    fn eigen_decompose(&self, covariance: &CovarianceMatrix) -> PcaResult<EigenDecomposition> {
        let decomposition = JacobiEigenSolver::new(self.config.solver.clone()).decompose(covariance)?;
        if decomposition.len() != covariance.n_features() {
            return Err(PcaError::DimensionMismatch {
                context: "eigenpair count",
                expected: covariance.n_features(),
                found: decomposition.len(),
            });
        }
        Ok(decomposition)
    }
}

struct PcaRun {
    standardized: StandardizedMatrix,
    decomposition: EigenDecomposition,
    projection: ProjectionMatrix,
    transformed: TransformedMatrix,
}

/// A fitted PCA model.
///
/// Holds the per-feature mean and scale of the training data and the rotation matrix,
/// so further samples can be mapped into (and back out of) component space. Models can
/// be saved to and loaded from files.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PcaModel {
    /// The rotation matrix (principal components).
    /// Shape: (n_features, k_components)
    rotation: Array2<f64>,
    /// Mean vector of the training data.
    /// Shape: (n_features)
    mean: Array1<f64>,
    /// Standard deviations of the training data; always positive.
    /// Shape: (n_features)
    scale: Array1<f64>,
    /// Eigenvalue of each kept component.
    /// Shape: (k_components)
    explained_variance: Array1<f64>,
    /// Sum of all eigenvalues, including the discarded components.
    total_variance: f64,
    config: PcaConfig,
}

impl PcaModel {
    /// Builds a model from precomputed parts, e.g. components fitted elsewhere.
    ///
    /// * `rotation` - shape (n_features, k_components)
    /// * `mean`, `scale` - shape (n_features); every scale must be positive.
    /// * `explained_variance` - shape (k_components)
    ///
    /// # Errors
    /// `InvalidModel` when the parts are inconsistent, `InvalidConfig` for a bad config.
    pub fn with_model(
        rotation: Array2<f64>,
        mean: Array1<f64>,
        scale: Array1<f64>,
        explained_variance: Array1<f64>,
        total_variance: f64,
        config: PcaConfig,
    ) -> PcaResult<Self> {
        let model = Self {
            rotation,
            mean,
            scale,
            explained_variance,
            total_variance,
            config,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn n_components(&self) -> usize {
        self.rotation.ncols()
    }

    pub fn rotation(&self) -> &Array2<f64> {
        &self.rotation
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    pub fn explained_variance_ratio(&self) -> Array1<f64> {
        explained_variance_ratio(self.explained_variance.view(), self.total_variance)
    }

    pub fn total_variance(&self) -> f64 {
        self.total_variance
    }

    pub fn config(&self) -> &PcaConfig {
        &self.config
    }

    /// Standardizes `x` with the fitted statistics and projects it onto the components.
    ///
    /// * `x` - shape (m_samples, n_features); zero samples are allowed.
    ///
    /// # Errors
    /// `DimensionMismatch` if the feature count differs from the model's,
    /// `NonFiniteValue` for NaN or infinite input.
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> PcaResult<TransformedMatrix> {
        if x.ncols() != self.n_features() {
            return Err(PcaError::DimensionMismatch {
                context: "transform input features",
                expected: self.n_features(),
                found: x.ncols(),
            });
        }
        check_finite(x)?;

        let mut standardized = x.to_owned();
        standardized -= &self.mean;
        standardized /= &self.scale;

        Ok(TransformedMatrix::from_scores(standardized.dot(&self.rotation)))
    }

    /// Maps component scores back to the original feature space.
    ///
    /// Exact (up to rounding) when the model keeps every component.
    pub fn inverse_transform(&self, scores: &TransformedMatrix) -> PcaResult<Array2<f64>> {
        if scores.n_components() != self.n_components() {
            return Err(PcaError::DimensionMismatch {
                context: "inverse transform components",
                expected: self.n_components(),
                found: scores.n_components(),
            });
        }
        let mut restored = scores.view().dot(&self.rotation.t());
        restored *= &self.scale;
        restored += &self.mean;
        Ok(restored)
    }

    /// Saves the model to a file using bincode.
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> PcaResult<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
        debug!("Saved PCA model to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads a model previously written by [`save_model`](Self::save_model).
    ///
    /// # Errors
    /// I/O and decoding failures, or `InvalidModel` when the decoded model has
    /// inconsistent dimensions, non-positive scales or invalid eigenvalues.
    pub fn load_model<P: AsRef<Path>>(path: P) -> PcaResult<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let model: PcaModel =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
        model.validate()?;
        debug!("Loaded PCA model from {:?}", path.as_ref());
        Ok(model)
    }

    fn validate(&self) -> PcaResult<()> {
        let n_features = self.mean.len();
        if n_features == 0 {
            return Err(PcaError::InvalidModel("model has no features".to_string()));
        }
        if self.scale.len() != n_features || self.rotation.nrows() != n_features {
            return Err(PcaError::InvalidModel(format!(
                "inconsistent feature dimensions: rotation_features={}, mean_features={}, scale_features={}",
                self.rotation.nrows(),
                n_features,
                self.scale.len()
            )));
        }
        if self.explained_variance.len() != self.rotation.ncols() || self.rotation.ncols() == 0 {
            return Err(PcaError::InvalidModel(format!(
                "explained_variance length ({}) does not match component count ({})",
                self.explained_variance.len(),
                self.rotation.ncols()
            )));
        }
        if self.scale.iter().any(|&s| !s.is_finite() || s <= 0.0) {
            return Err(PcaError::InvalidModel(
                "scale vector contains non-finite or non-positive values".to_string(),
            ));
        }
        if self.mean.iter().chain(self.rotation.iter()).any(|v| !v.is_finite()) {
            return Err(PcaError::InvalidModel(
                "mean or rotation contains non-finite values".to_string(),
            ));
        }
        if self.explained_variance.iter().any(|v| !v.is_finite()) || !self.total_variance.is_finite() {
            return Err(PcaError::InvalidModel(
                "explained variance contains non-finite values".to_string(),
            ));
        }
        // Rounding can push the eigenvalue of a rank-deficient direction just below zero.
        let floor = -EIGENVALUE_ROUNDING * self.total_variance.abs().max(1.0);
        if let Some(&v) = self.explained_variance.iter().find(|&&v| v < floor) {
            return Err(PcaError::InvalidModel(format!(
                "explained variance contains a negative eigenvalue ({})",
                v
            )));
        }
        self.config.validate()
    }
}
