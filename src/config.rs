// src/config.rs

use crate::error::{PcaError, PcaResult};
use serde::{Deserialize, Serialize};

/// Default convergence tolerance of the eigensolver, relative to the matrix norm.
pub const DEFAULT_EIGEN_TOLERANCE: f64 = 1e-10;

/// Sweep cap per feature when `EigenSolverConfig::max_sweeps` is `None`.
pub const DEFAULT_SWEEPS_PER_FEATURE: usize = 100;

/// Divisor convention ("delta degrees of freedom") for variance-like sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ddof {
    /// Divide by `n`.
    Population,
    /// Divide by `n - 1`.
    Sample,
}

impl Ddof {
    /// The divisor applied to a sum over `n_samples` values.
    ///
    /// The sample divisor saturates at zero for an empty input. The pipeline only
    /// calls this with `n_samples >= 2`, where it is positive.
    pub fn divisor(self, n_samples: usize) -> f64 {
        match self {
            Ddof::Population => n_samples as f64,
            Ddof::Sample => n_samples.saturating_sub(1) as f64,
        }
    }
}

/// Parameters of the symmetric eigensolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EigenSolverConfig {
    /// Convergence threshold on the off-diagonal Frobenius norm, relative to the
    /// Frobenius norm of the input matrix. Must be positive: rotations rarely drive
    /// the off-diagonal mass to exactly zero.
    pub tolerance: f64,
    /// Maximum number of full Jacobi sweeps. `None` means `100 * n_features`.
    pub max_sweeps: Option<usize>,
}

impl Default for EigenSolverConfig {
    fn default() -> Self {
        EigenSolverConfig {
            tolerance: DEFAULT_EIGEN_TOLERANCE,
            max_sweeps: None,
        }
    }
}

impl EigenSolverConfig {
    /// Resolves the sweep cap for an `n_features` x `n_features` matrix.
    pub fn sweep_limit(&self, n_features: usize) -> usize {
        self.max_sweeps
            .unwrap_or(DEFAULT_SWEEPS_PER_FEATURE * n_features)
    }

    pub fn validate(&self) -> PcaResult<()> {
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(PcaError::InvalidConfig(format!(
                "eigensolver tolerance must be finite and positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Configuration of a PCA run.
///
/// The default reproduces the hand-worked convention: features are scaled by their
/// sample standard deviation (`n - 1`), while the covariance of the standardized
/// columns is averaged over `n`. Use [`PcaConfig::population`] or
/// [`PcaConfig::sample`] for a single convention throughout, in which case the
/// covariance matrix is exactly the correlation matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaConfig {
    /// Divisor used for the per-feature standard deviation.
    pub standardization_ddof: Ddof,
    /// Divisor used for the covariance of the standardized features.
    pub covariance_ddof: Ddof,
    pub solver: EigenSolverConfig,
}

impl Default for PcaConfig {
    fn default() -> Self {
        PcaConfig {
            standardization_ddof: Ddof::Sample,
            covariance_ddof: Ddof::Population,
            solver: EigenSolverConfig::default(),
        }
    }
}

impl PcaConfig {
    /// Divide by `n` in both standardization and covariance.
    pub fn population() -> Self {
        PcaConfig {
            standardization_ddof: Ddof::Population,
            covariance_ddof: Ddof::Population,
            ..PcaConfig::default()
        }
    }

    /// Divide by `n - 1` in both standardization and covariance.
    pub fn sample() -> Self {
        PcaConfig {
            standardization_ddof: Ddof::Sample,
            covariance_ddof: Ddof::Sample,
            ..PcaConfig::default()
        }
    }

    pub fn with_solver(mut self, solver: EigenSolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn validate(&self) -> PcaResult<()> {
        self.solver.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_follows_worked_example_convention() {
        let config = PcaConfig::default();
        assert_eq!(config.standardization_ddof, Ddof::Sample);
        assert_eq!(config.covariance_ddof, Ddof::Population);
        assert_eq!(config.solver.tolerance, 1e-10);
        assert_eq!(config.solver.sweep_limit(4), 400);
    }

    #[test]
    fn divisors() {
        assert_eq!(Ddof::Population.divisor(5), 5.0);
        assert_eq!(Ddof::Sample.divisor(5), 4.0);
        assert_eq!(Ddof::Sample.divisor(1), 0.0);
        assert_eq!(Ddof::Sample.divisor(0), 0.0);
        assert_eq!(Ddof::Population.divisor(0), 0.0);
    }

    #[test]
    fn explicit_sweep_cap_wins() {
        let solver = EigenSolverConfig {
            max_sweeps: Some(3),
            ..EigenSolverConfig::default()
        };
        assert_eq!(solver.sweep_limit(50), 3);
    }

    #[test]
    fn rejects_bad_tolerance() {
        for tolerance in [0.0, -0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = PcaConfig::default().with_solver(EigenSolverConfig {
                tolerance,
                max_sweeps: None,
            });
            assert!(matches!(config.validate(), Err(PcaError::InvalidConfig(_))));
        }
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let config: PcaConfig =
            serde_json::from_str(r#"{"covariance_ddof":"Sample"}"#).unwrap();
        assert_eq!(config.covariance_ddof, Ddof::Sample);
        assert_eq!(config.standardization_ddof, Ddof::Sample);
        assert_eq!(config.solver, EigenSolverConfig::default());

        let json = serde_json::to_string(&PcaConfig::population()).unwrap();
        let back: PcaConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PcaConfig::population());
    }
}
