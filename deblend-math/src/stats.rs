//! Summary statistics over floating point samples.
//!
//! The helpers mirror the conventions used when comparing measured and
//! simulated fluxes: population standard deviation (ddof = 0) and an RMS
//! that folds bias and scatter together as `sqrt(mean² + std²)`.

use num_traits::Float;
use thiserror::Error;

/// Error types for statistics helpers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("No data provided (empty slice)")]
    NoData,
    #[error("NaN value encountered at index {0}")]
    NaNEncountered(usize),
}

fn check<T: Float>(data: &[T]) -> Result<(), StatsError> {
    if data.is_empty() {
        return Err(StatsError::NoData);
    }
    match data.iter().position(|v| v.is_nan()) {
        Some(index) => Err(StatsError::NaNEncountered(index)),
        None => Ok(()),
    }
}

/// Median of the samples; the mean of the two central values for even counts.
pub fn median<T: Float>(data: &[T]) -> Result<T, StatsError> {
    check(data)?;

    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        let two = T::one() + T::one();
        Ok((sorted[mid - 1] + sorted[mid]) / two)
    } else {
        Ok(sorted[mid])
    }
}

/// Arithmetic mean
pub fn mean<T: Float>(data: &[T]) -> Result<T, StatsError> {
    check(data)?;
    let sum = data.iter().fold(T::zero(), |acc, &v| acc + v);
    Ok(sum / count_as(data))
}

/// Mean of absolute values
pub fn mean_abs<T: Float>(data: &[T]) -> Result<T, StatsError> {
    check(data)?;
    let sum = data.iter().fold(T::zero(), |acc, &v| acc + v.abs());
    Ok(sum / count_as(data))
}

/// Population standard deviation
pub fn std_dev<T: Float>(data: &[T]) -> Result<T, StatsError> {
    let mean = mean(data)?;
    let sum_sq = data
        .iter()
        .fold(T::zero(), |acc, &v| acc + (v - mean) * (v - mean));
    Ok((sum_sq / count_as(data)).sqrt())
}

/// Root of squared bias plus variance: `sqrt(mean² + std²)`
pub fn rms<T: Float>(data: &[T]) -> Result<T, StatsError> {
    let mean = mean(data)?;
    let std = std_dev(data)?;
    Ok((mean * mean + std * std).sqrt())
}

fn count_as<T: Float>(data: &[T]) -> T {
    T::from(data.len()).unwrap_or_else(T::nan)
}
