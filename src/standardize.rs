// src/standardize.rs

use crate::config::Ddof;
use crate::data::{binary_scale, DataMatrix};
use crate::error::{PcaError, PcaResult};
use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A column counts as constant when its standard deviation is at most this fraction
/// of its largest absolute value. Rounding in the mean leaves residuals of that order
/// on columns that are constant in exact arithmetic.
pub const DEGENERATE_RELATIVE_STD: f64 = 1e-12;

/// Mean and standard deviation of one feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub mean: f64,
    pub std_dev: f64,
}

/// Data after per-feature centering and scaling, shape (n_samples, n_features).
#[derive(Debug, Clone, PartialEq)]
pub struct StandardizedMatrix {
    data: Array2<f64>,
    stats: Vec<FeatureStats>,
}

impl StandardizedMatrix {
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Per-feature statistics used for the rescaling, in column order.
    pub fn stats(&self) -> &[FeatureStats] {
        &self.stats
    }

    pub fn means(&self) -> Array1<f64> {
        self.stats.iter().map(|s| s.mean).collect()
    }

    pub fn std_devs(&self) -> Array1<f64> {
        self.stats.iter().map(|s| s.std_dev).collect()
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.data
    }
}

/// Centers every feature on its mean and scales it to unit standard deviation.
#[derive(Debug, Clone, Copy)]
pub struct Standardizer {
    ddof: Ddof,
}

impl Standardizer {
    pub fn new(ddof: Ddof) -> Self {
        Self { ddof }
    }

    /// Computes per-column statistics and rescales the data.
    ///
    /// # Errors
    /// `PcaError::DegenerateColumn` for the lowest-indexed column whose standard
    /// deviation is zero, `PcaError::NumericOverflow` when a column's mean or standard
    /// deviation exceeds the f64 range.
    pub fn standardize(&self, data: &DataMatrix) -> PcaResult<StandardizedMatrix> {
        let scalings = self.column_scalings(data.view())?;

        let mut standardized = Array2::<f64>::zeros(data.view().dim());
        standardized
            .axis_iter_mut(Axis(1))
            .into_par_iter()
            .zip(data.view().axis_iter(Axis(1)).into_par_iter())
            .zip(scalings.par_iter())
            .for_each(|((mut out, column), scaling)| {
                out.zip_mut_with(&column, |z, &x| *z = scaling.standardize(x));
            });

        debug!(
            "Standardized {} samples x {} features ({:?} divisor).",
            standardized.nrows(),
            standardized.ncols(),
            self.ddof
        );
        Ok(StandardizedMatrix {
            data: standardized,
            stats: scalings.iter().map(|scaling| scaling.stats).collect(),
        })
    }

    fn column_scalings(&self, data: ArrayView2<'_, f64>) -> PcaResult<Vec<ColumnScaling>> {
        let n_samples = data.nrows();
        let divisor = self.ddof.divisor(n_samples);

        // Columns are independent; the checks below run in column order so the
        // reported column does not depend on scheduling.
        let raw: Vec<ColumnScaling> = (0..data.ncols())
            .into_par_iter()
            .map(|j| ColumnScaling::from_column(data.column(j), divisor))
            .collect();

        raw.into_iter()
            .enumerate()
            .map(|(column, scaling)| {
                if scaling.scaled_std_dev <= DEGENERATE_RELATIVE_STD * scaling.scaled_max_abs {
                    return Err(PcaError::DegenerateColumn {
                        column,
                        value: scaling.stats.mean,
                    });
                }
                if !scaling.stats.mean.is_finite() {
                    return Err(PcaError::NumericOverflow {
                        column,
                        statistic: "mean",
                    });
                }
                if !scaling.stats.std_dev.is_finite() {
                    return Err(PcaError::NumericOverflow {
                        column,
                        statistic: "standard deviation",
                    });
                }
                Ok(scaling)
            })
            .collect()
    }
}

/// Statistics of one column, computed on the column divided by `binary_scale`.
#[derive(Debug, Clone, Copy)]
struct ColumnScaling {
    stats: FeatureStats,
    scale: f64,
    scaled_mean: f64,
    scaled_std_dev: f64,
    scaled_max_abs: f64,
}

impl ColumnScaling {
    fn from_column(column: ArrayView1<'_, f64>, divisor: f64) -> Self {
        let max_abs = column.iter().fold(0.0f64, |acc, &x| acc.max(x.abs()));
        let scale = binary_scale(max_abs);
        let n_samples = column.len() as f64;

        let scaled_mean = column.iter().map(|&x| x / scale).sum::<f64>() / n_samples;
        let sum_sq = column
            .iter()
            .map(|&x| (x / scale - scaled_mean).powi(2))
            .sum::<f64>();
        let scaled_std_dev = (sum_sq / divisor).sqrt();

        ColumnScaling {
            stats: FeatureStats {
                mean: scaled_mean * scale,
                std_dev: scaled_std_dev * scale,
            },
            scale,
            scaled_mean,
            scaled_std_dev,
            scaled_max_abs: max_abs / scale,
        }
    }

    /// `(x - mean) / std_dev`, evaluated in the scaled domain.
    fn standardize(&self, x: f64) -> f64 {
        (x / self.scale - self.scaled_mean) / self.scaled_std_dev
    }
}
