// src/data.rs

use crate::error::{PcaError, PcaResult};
use ndarray::{Array2, ArrayView2};

/// Minimum number of samples for a standard deviation to be defined.
pub const MIN_SAMPLES: usize = 2;

/// Raw input data, shape (n_samples, n_features).
///
/// Construction validates that there are at least two samples, at least one
/// feature, equal-length rows and only finite values.
#[derive(Debug, Clone, PartialEq)]
pub struct DataMatrix {
    data: Array2<f64>,
}

impl DataMatrix {
    /// Builds a matrix from samples given row by row.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> PcaResult<Self> {
        let n_features = rows.first().map_or(0, |row| row.as_ref().len());
        let mut values = Vec::with_capacity(rows.len() * n_features);
        for (row_idx, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != n_features {
                return Err(PcaError::RaggedRow {
                    row: row_idx,
                    expected: n_features,
                    found: row.len(),
                });
            }
            values.extend_from_slice(row);
        }
        let found = values.len();
        let data = Array2::from_shape_vec((rows.len(), n_features), values).map_err(|_| {
            PcaError::DimensionMismatch {
                context: "row-major input buffer",
                expected: rows.len() * n_features,
                found,
            }
        })?;
        Self::from_array(data)
    }

    /// Builds a matrix from features given column by column, e.g.
    /// `feature_1: [1, 5, 1, 5, 8]`.
    pub fn from_columns<C: AsRef<[f64]>>(columns: &[C]) -> PcaResult<Self> {
        let n_samples = columns.first().map_or(0, |col| col.as_ref().len());
        for col in columns {
            let found = col.as_ref().len();
            if found != n_samples {
                return Err(PcaError::DimensionMismatch {
                    context: "feature column length",
                    expected: n_samples,
                    found,
                });
            }
        }
        let data = Array2::from_shape_fn((n_samples, columns.len()), |(i, j)| {
            columns[j].as_ref()[i]
        });
        Self::from_array(data)
    }

    pub fn from_array(data: Array2<f64>) -> PcaResult<Self> {
        let (n_samples, n_features) = data.dim();
        if n_samples < MIN_SAMPLES {
            return Err(PcaError::InsufficientSamples {
                min: MIN_SAMPLES,
                found: n_samples,
            });
        }
        if n_features == 0 {
            return Err(PcaError::NoFeatures);
        }
        check_finite(data.view())?;
        Ok(Self { data })
    }

    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.data
    }
}

impl TryFrom<Array2<f64>> for DataMatrix {
    type Error = PcaError;

    fn try_from(data: Array2<f64>) -> PcaResult<Self> {
        DataMatrix::from_array(data)
    }
}

/// Rejects NaN and infinities, reporting the first offending cell in row-major order.
pub(crate) fn check_finite(data: ArrayView2<'_, f64>) -> PcaResult<()> {
    match data.indexed_iter().find(|(_, value)| !value.is_finite()) {
        Some(((row, column), &value)) => Err(PcaError::NonFiniteValue { row, column, value }),
        None => Ok(()),
    }
}

const EXPONENT_MASK: u64 = 0x7ff0_0000_0000_0000;

/// A power of two near `max_abs`. Dividing by it brings the values close to 1 without
/// rounding, so sums and squares neither overflow nor underflow.
pub(crate) fn binary_scale(max_abs: f64) -> f64 {
    if max_abs == 0.0 || !max_abs.is_finite() {
        return 1.0;
    }
    let scale = f64::from_bits(max_abs.to_bits() & EXPONENT_MASK);
    // Subnormal magnitudes have no exponent bits.
    if scale == 0.0 {
        f64::MIN_POSITIVE
    } else {
        scale
    }
}
