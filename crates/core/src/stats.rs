//! Column statistics and z-score standardization.
//!
//! Two deviation conventions are in use: customer scoring standardizes with
//! the sample deviation (n - 1), the profitability classifier's scaler with
//! the population deviation (n). A zero or undefined deviation is never
//! turned into NaN: it surfaces as [`NormalizeError::ZeroVariance`] and the
//! `_or_zero` helpers map it to an all-zero column.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deviation {
    /// Divides by `n - 1`.
    Sample,
    /// Divides by `n`.
    Population,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("cannot standardize an empty column")]
    Empty,
    #[error("column has zero or undefined standard deviation ({count} values)")]
    ZeroVariance { count: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub mean: f64,
    pub std_dev: f64,
    pub count: usize,
}

impl ColumnStats {
    pub fn compute(values: &[f64], deviation: Deviation) -> Result<Self, NormalizeError> {
        let mean = mean(values).ok_or(NormalizeError::Empty)?;
        let count = values.len();
        let denominator = match deviation {
            Deviation::Sample => count.saturating_sub(1),
            Deviation::Population => count,
        };
        let std_dev = if denominator == 0 {
            0.0
        } else {
            let squared: f64 = values.iter().map(|value| (value - mean).powi(2)).sum();
            (squared / denominator as f64).sqrt()
        };

        Ok(Self { mean, std_dev, count })
    }

    pub fn is_degenerate(&self) -> bool {
        !self.std_dev.is_finite() || self.std_dev <= f64::EPSILON
    }

    pub fn z_score(&self, value: f64) -> Result<f64, NormalizeError> {
        if self.is_degenerate() {
            return Err(NormalizeError::ZeroVariance { count: self.count });
        }
        Ok((value - self.mean) / self.std_dev)
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Standardizes a column, failing on a degenerate deviation.
pub fn z_scores(values: &[f64], deviation: Deviation) -> Result<Vec<f64>, NormalizeError> {
    let stats = ColumnStats::compute(values, deviation)?;
    values.iter().map(|value| stats.z_score(*value)).collect()
}

/// Standardizes a column, mapping a degenerate deviation to zeros.
pub fn z_scores_or_zero(
    values: &[f64],
    deviation: Deviation,
    column: &str,
) -> Result<Vec<f64>, NormalizeError> {
    match z_scores(values, deviation) {
        Err(NormalizeError::ZeroVariance { count }) => {
            warn!(
                event_name = "stats.zscore.zero_variance",
                column,
                count,
                "column has no spread, standardized values set to zero"
            );
            Ok(vec![0.0; values.len()])
        }
        other => other,
    }
}

/// Column-wise standardizer fit on one matrix and applied to others.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    columns: Vec<ColumnStats>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>], deviation: Deviation) -> Result<Self, NormalizeError> {
        let width = rows.first().map(Vec::len).ok_or(NormalizeError::Empty)?;
        let columns = (0..width)
            .map(|index| {
                let column: Vec<f64> = rows.iter().map(|row| row[index]).collect();
                ColumnStats::compute(&column, deviation)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[ColumnStats] {
        &self.columns
    }

    /// Degenerate columns transform to zero.
    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.columns.iter())
            .map(|(value, stats)| stats.z_score(*value).unwrap_or(0.0))
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }
}
