// src/error.rs

use thiserror::Error;

/// Errors produced anywhere in the PCA pipeline.
///
/// Every variant is terminal for the call that produced it: there are no partial
/// results and retrying with the same input yields the same error.
#[derive(Debug, Error)]
pub enum PcaError {
    #[error("input must have at least {min} samples, got {found}")]
    InsufficientSamples { min: usize, found: usize },

    #[error("input must have at least one feature")]
    NoFeatures,

    #[error("row {row} has {found} values, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("non-finite value {value} at row {row}, column {column}")]
    NonFiniteValue { row: usize, column: usize, value: f64 },

    /// A feature has zero variance, so standardization would divide by zero.
    #[error("column {column} has zero variance (constant value {value}); standardization is undefined")]
    DegenerateColumn { column: usize, value: f64 },

    /// The eigensolver hit its sweep cap before the off-diagonal mass fell below tolerance.
    #[error(
        "eigensolver did not converge after {sweeps} sweeps (relative off-diagonal norm {off_diagonal:e}, tolerance {tolerance:e})"
    )]
    Convergence {
        sweeps: usize,
        off_diagonal: f64,
        tolerance: f64,
    },

    /// A statistic of finite input is too large to represent as an f64.
    #[error("{statistic} of column {column} overflows the f64 range")]
    NumericOverflow { column: usize, statistic: &'static str },

    #[error("requested {requested} components, but only 1..={max} are available")]
    InvalidComponentCount { requested: usize, max: usize },

    #[error("dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("matrix is not symmetric at ({row}, {column}): {upper} vs {lower}")]
    NotSymmetric {
        row: usize,
        column: usize,
        upper: f64,
        lower: f64,
    },

    #[error("covariance diagonal entry {index} is negative ({value})")]
    NegativeVariance { index: usize, value: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("model file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize PCA model: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to deserialize PCA model: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("invalid PCA model: {0}")]
    InvalidModel(String),
}

pub type PcaResult<T> = Result<T, PcaError>;
