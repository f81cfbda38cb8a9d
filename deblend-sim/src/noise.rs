//! Background noise estimates for a set of exposures.

use deblend_math::stats::median;

use crate::exposure::Exposure;

/// Median background noise of one exposure.
///
/// Square root of the median variance over pixels whose mask has none of
/// `ignore_bits` set. Non-finite variances are skipped. NaN when no pixel
/// survives.
pub fn exposure_noise(exposure: &Exposure, ignore_bits: u32) -> f64 {
    let usable: Vec<f64> = exposure
        .variance()
        .iter()
        .zip(exposure.mask().iter())
        .filter(|(var, &mask)| mask & ignore_bits == 0 && var.is_finite())
        .map(|(&var, _)| var)
        .collect();

    median(&usable).map(f64::sqrt).unwrap_or(f64::NAN)
}

/// Noise estimate for every exposure, indexed like `exposures`
pub fn estimate_noise(exposures: &[Exposure], ignore_bits: u32) -> Vec<f64> {
    exposures
        .iter()
        .map(|exposure| exposure_noise(exposure, ignore_bits))
        .collect()
}
