// Principal component analysis (PCA)

#![doc = include_str!("../README.md")]

pub mod config;
pub mod covariance;
pub mod data;
pub mod eigen;
pub mod error;
pub mod pca;
pub mod project;
pub mod select;
pub mod standardize;

pub use config::{Ddof, EigenSolverConfig, PcaConfig};
pub use covariance::{CovarianceEstimator, CovarianceMatrix};
pub use data::DataMatrix;
pub use eigen::{EigenDecomposition, EigenPair, JacobiEigenSolver, SymmetricEigenSolver};
pub use error::{PcaError, PcaResult};
pub use pca::{PcaEngine, PcaModel, PcaOutput};
pub use project::{Projector, TransformedMatrix};
pub use select::{ComponentSelector, ProjectionMatrix};
pub use standardize::{FeatureStats, StandardizedMatrix, Standardizer};

#[cfg(test)]
mod pca_tests;
