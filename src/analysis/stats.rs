//! Descriptive statistics over duration samples.
//!
//! Percentiles use linear interpolation between closest ranks: for `n`
//! sorted samples the rank of percentile `p` is `p / 100 * (n - 1)` and the
//! result interpolates between the two neighbouring samples. Standard
//! deviation is the population form (divides by `n`).

use crate::error::{AnalysisError, AnalysisResult};
use serde::Serialize;

/// Percentiles reported by [`summarize`].
pub const DEFAULT_PERCENTILES: [f64; 6] = [50.0, 80.0, 90.0, 95.0, 99.0, 99.9];

/// One percentile and its value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value: f64,
}

/// Summary statistics of a non-empty sample set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Vec<PercentileValue>,
}

/// Summarize `samples` with the default percentile set.
pub fn summarize(samples: &[f64]) -> AnalysisResult<Summary> {
    summarize_with(samples, &DEFAULT_PERCENTILES)
}

/// Summarize `samples`, reporting the given percentiles.
pub fn summarize_with(samples: &[f64], percentiles: &[f64]) -> AnalysisResult<Summary> {
    if samples.is_empty() {
        return Err(AnalysisError::NoData);
    }

    let sorted = sorted(samples);
    let mean = mean(&sorted)?;
    let std = std_dev(&sorted)?;

    Ok(Summary {
        count: sorted.len(),
        mean,
        median: percentile_sorted(&sorted, 50.0)?,
        std,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        percentiles: percentiles
            .iter()
            .map(|&p| {
                percentile_sorted(&sorted, p).map(|value| PercentileValue {
                    percentile: p,
                    value,
                })
            })
            .collect::<AnalysisResult<_>>()?,
    })
}

/// Arithmetic mean.
pub fn mean(samples: &[f64]) -> AnalysisResult<f64> {
    if samples.is_empty() {
        return Err(AnalysisError::NoData);
    }
    Ok(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(samples: &[f64]) -> AnalysisResult<f64> {
    let mean = mean(samples)?;
    let variance =
        samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / samples.len() as f64;
    Ok(variance.sqrt())
}

/// Percentile of ascending samples by linear interpolation.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> AnalysisResult<f64> {
    if sorted.is_empty() {
        return Err(AnalysisError::NoData);
    }

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    Ok(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Empirical CDF: ascending samples paired with `i / n` for `i = 1..=n`.
pub fn cdf_points(samples: &[f64]) -> Vec<(f64, f64)> {
    let sorted = sorted(samples);
    let n = sorted.len() as f64;
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, x)| (x, (i + 1) as f64 / n))
        .collect()
}

/// Indices of values farther than `sigmas` standard deviations from the mean.
///
/// A plain mean/std heuristic: a single extreme value inflates the std it
/// is measured against, so small samples rarely flag anything.
pub fn outlier_indices(values: &[f64], sigmas: f64) -> AnalysisResult<Vec<usize>> {
    let mean = mean(values)?;
    let std = std_dev(values)?;
    Ok(values
        .iter()
        .enumerate()
        .filter(|(_, v)| (*v - mean).abs() > sigmas * std)
        .map(|(i, _)| i)
        .collect())
}

fn sorted(samples: &[f64]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}
