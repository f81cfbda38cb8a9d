//! Per-peak flux measurements from three sources: the baseline deblender,
//! NMF templates and plain footprint sums for isolated sources.
//!
//! Each calculator returns a new [`PeakTable`]; the input table is never
//! modified.

use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::RunContext;
use crate::exposure::{Exposure, ExposureError};
use crate::filters::Filters;
use crate::footprint::DetectedSource;
use crate::matcher::MatchTable;
use crate::peak_table::{FluxTable, PeakTable, TableError};
use crate::plots;

#[derive(Error, Debug)]
pub enum FluxError {
    #[error("Expected one exposure per filter ({expected}), found {found}")]
    ExposureCount { expected: usize, found: usize },
    #[error("Exposure {index} is in filter '{found}', expected '{expected}'")]
    ExposureFilter {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("Match table has {matches} rows but the peak table has {peaks}")]
    LengthMismatch { peaks: usize, matches: usize },
    #[error("Deblender failed on parent {parent}: {source}")]
    Deblender {
        parent: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Peak {peak_idx} of parent {parent} has {found} flux portions, expected {expected}")]
    PortionCount {
        parent: u64,
        peak_idx: usize,
        expected: usize,
        found: usize,
    },
    #[error("No template for peak {peak_idx} of parent {parent} in filter {filter_idx}")]
    MissingTemplate {
        parent: u64,
        peak_idx: usize,
        filter_idx: usize,
    },
    #[error("Exposure error: {0}")]
    Exposure(#[from] ExposureError),
    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

/// Flux portions assigned to one peak, one image per filter
#[derive(Debug, Clone)]
pub struct DeblendedPeak {
    pub flux_portions: Vec<Array2<f64>>,
}

/// Output of a deblender run on one parent, peaks in footprint order
#[derive(Debug, Clone, Default)]
pub struct DeblenderResult {
    pub peaks: Vec<DeblendedPeak>,
}

/// The baseline multi-band deblender
pub trait Deblender {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Split the footprint of `source` between its peaks.
    ///
    /// `psf_fwhm[k]` is the PSF FWHM of `exposures[k]`.
    fn deblend(
        &self,
        source: &DetectedSource,
        exposures: &[Exposure],
        psf_fwhm: &[f64],
        filters: &Filters,
    ) -> Result<DeblenderResult, Self::Error>;
}

/// Templates of an NMF-deblended parent
pub trait TemplateSource {
    /// Template of peak `peak_idx` in filter `filter_idx`
    fn template(&self, filter_idx: usize, peak_idx: usize) -> Option<ArrayView2<'_, f64>>;
}

fn check_exposures(exposures: &[Exposure], filters: &Filters) -> Result<(), FluxError> {
    if exposures.len() != filters.len() {
        return Err(FluxError::ExposureCount {
            expected: filters.len(),
            found: exposures.len(),
        });
    }
    for (index, (exposure, filter)) in exposures.iter().zip(filters.iter()).enumerate() {
        if exposure.filter() != filter {
            return Err(FluxError::ExposureFilter {
                index,
                expected: filter.to_string(),
                found: exposure.filter().to_string(),
            });
        }
    }
    Ok(())
}

/// Run the deblender on every source with more than one peak.
///
/// Results are keyed by parent id.
///
/// # Errors
/// * `FluxError::ExposureCount` / `FluxError::ExposureFilter` - if the
///   exposures do not line up with `filters`
/// * `FluxError::Deblender` - if the deblender fails on a parent
pub fn deblend_blends<D: Deblender>(
    deblender: &D,
    detections: &[DetectedSource],
    exposures: &[Exposure],
    filters: &Filters,
    ctx: &RunContext,
) -> Result<BTreeMap<u64, DeblenderResult>, FluxError> {
    check_exposures(exposures, filters)?;
    let psf_fwhm: Vec<f64> = exposures.iter().map(|e| e.psf().fwhm()).collect();

    let mut results = BTreeMap::new();
    for (n, source) in detections
        .iter()
        .filter(|s| s.footprint.peak_count() > 1)
        .enumerate()
    {
        log::debug!(target: ctx.target(), "Deblending blend {n}");
        let result = deblender
            .deblend(source, exposures, &psf_fwhm, filters)
            .map_err(|e| FluxError::Deblender {
                parent: source.id,
                source: Box::new(e),
            })?;
        results.insert(source.id, result);
    }
    Ok(results)
}

/// Set each deblended peak's flux to the sum of its flux portions.
///
/// Rows are located by parent id and peak index; rows of parents without a
/// result keep their current flux.
///
/// # Errors
/// * `FluxError::PortionCount` - if a peak does not have one portion per filter
pub fn apply_deblender_fluxes(
    peaks: &PeakTable,
    results: &BTreeMap<u64, DeblenderResult>,
) -> Result<PeakTable, FluxError> {
    let nfilters = peaks.filters().len();
    let mut flux = peaks.fluxes().to_owned();

    for (&parent, result) in results {
        for (peak_idx, peak) in result.peaks.iter().enumerate() {
            if peak.flux_portions.len() != nfilters {
                return Err(FluxError::PortionCount {
                    parent,
                    peak_idx,
                    expected: nfilters,
                    found: peak.flux_portions.len(),
                });
            }
            let Some(row) = peaks.find(parent, peak_idx) else {
                continue;
            };
            for (fidx, portion) in peak.flux_portions.iter().enumerate() {
                flux[[row, fidx]] = portion.sum();
            }
        }
    }

    Ok(peaks.with_fluxes(flux)?)
}

/// Set each peak of an NMF-deblended parent to the sum of its templates.
///
/// # Errors
/// * `FluxError::MissingTemplate` - if a deblended parent lacks a template
pub fn nmf_fluxes<T: TemplateSource>(
    peaks: &PeakTable,
    parents: &BTreeMap<u64, T>,
) -> Result<PeakTable, FluxError> {
    let mut flux = peaks.fluxes().to_owned();

    for (row, peak) in peaks.rows().iter().enumerate() {
        let Some(parent) = parents.get(&peak.parent) else {
            continue;
        };
        for filter_idx in 0..peaks.filters().len() {
            let template = parent.template(filter_idx, peak.peak_idx).ok_or(
                FluxError::MissingTemplate {
                    parent: peak.parent,
                    peak_idx: peak.peak_idx,
                    filter_idx,
                },
            )?;
            flux[[row, filter_idx]] = template.sum();
        }
    }

    Ok(peaks.with_fluxes(flux)?)
}

/// Window of acceptable measured to simulated flux ratios
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    /// Sources at or below this simulated flux are never outliers
    pub flux_threshold: f64,
    pub min_ratio: f64,
    pub max_ratio: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            flux_threshold: 100.0,
            min_ratio: 0.5,
            max_ratio: 1.0 / 0.6,
        }
    }
}

/// Whether a measured flux is too far from the simulated one to trust
pub fn is_flux_outlier(flux: f64, sim_flux: f64, config: &OutlierConfig) -> bool {
    let ratio = flux / sim_flux;
    sim_flux > config.flux_threshold && !(config.min_ratio..=config.max_ratio).contains(&ratio)
}

/// An isolated source whose measured flux disagrees with the simulation
#[derive(Debug, Clone, PartialEq)]
pub struct FluxOutlier {
    /// Row in the peak table
    pub row: usize,
    pub parent: u64,
    pub filter: String,
    pub sim_flux: f64,
    pub flux: f64,
    /// Measured flux as a truncated percentage of the simulated flux
    pub percent: i64,
}

/// Output of [`isolated_fluxes`]
#[derive(Debug, Clone)]
pub struct IsolatedFluxes {
    pub table: PeakTable,
    pub outliers: Vec<FluxOutlier>,
}

/// Sum exposure pixels inside the footprint of every matched, isolated peak.
///
/// Blended and unmatched rows keep their current flux.
///
/// # Errors
/// * `FluxError::LengthMismatch` - if `matches` is not aligned with `peaks`
/// * `FluxError::ExposureCount` / `FluxError::ExposureFilter` - if the
///   exposures do not line up with the peak table filters
/// * `FluxError::Exposure` - if a footprint extends beyond an exposure
pub fn isolated_fluxes(
    peaks: &PeakTable,
    matches: &MatchTable,
    exposures: &[Exposure],
    config: &OutlierConfig,
    ctx: &RunContext,
) -> Result<IsolatedFluxes, FluxError> {
    if matches.len() != peaks.len() {
        return Err(FluxError::LengthMismatch {
            peaks: peaks.len(),
            matches: matches.len(),
        });
    }
    check_exposures(exposures, peaks.filters())?;

    let mut flux = peaks.fluxes().to_owned();
    let mut outliers = Vec::new();

    for (n, (peak, m)) in peaks.rows().iter().zip(matches.rows()).enumerate() {
        if peak.blended || !m.matched {
            continue;
        }
        let footprint = &peak.footprint;

        for (fidx, exposure) in exposures.iter().enumerate() {
            let cutout = exposure.cutout(footprint.bbox())?;
            let measured = footprint.masked_sum(cutout);
            flux[[n, fidx]] = measured;

            let sim_flux = matches.fluxes()[[n, fidx]];
            if !is_flux_outlier(measured, sim_flux, config) {
                continue;
            }

            let filter = exposure.filter();
            log::info!(
                target: ctx.target(),
                "n: {n}, Filter: {filter}, simFlux: {sim_flux}, flux: {measured}"
            );
            let percent = (measured / sim_flux * 100.0) as i64;
            ctx.render(&format!("flux_outlier_{n}_{filter}"), (500, 500), |area| {
                plots::draw_masked_cutout(
                    area,
                    &format!("Flux Difference: {percent}%"),
                    cutout,
                    footprint.mask(),
                )
            });
            outliers.push(FluxOutlier {
                row: n,
                parent: peak.parent,
                filter: filter.to_string(),
                sim_flux,
                flux: measured,
                percent,
            });
        }
    }

    Ok(IsolatedFluxes {
        table: peaks.with_fluxes(flux)?,
        outliers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{match_to_reference, MatchConfig};
    use crate::test_util::{detections, flat_exposure, sim_table};
    use approx::assert_relative_eq;
    use std::cell::RefCell;

    /// Gives peak `p` a flux portion filled with `p + 1` and records the
    /// parents and PSF widths it was called with
    #[derive(Default)]
    struct StubDeblender {
        calls: RefCell<Vec<(u64, Vec<f64>)>>,
    }

    impl Deblender for StubDeblender {
        type Error = std::io::Error;

        fn deblend(
            &self,
            source: &DetectedSource,
            _exposures: &[Exposure],
            psf_fwhm: &[f64],
            filters: &Filters,
        ) -> Result<DeblenderResult, Self::Error> {
            self.calls
                .borrow_mut()
                .push((source.id, psf_fwhm.to_vec()));
            let shape = source.footprint.bbox().shape();
            let peaks = (0..source.footprint.peak_count())
                .map(|p| DeblendedPeak {
                    flux_portions: (0..filters.len())
                        .map(|f| Array2::from_elem(shape, (p + 1) as f64 * (f + 1) as f64))
                        .collect(),
                })
                .collect();
            Ok(DeblenderResult { peaks })
        }
    }

    struct FailingDeblender;

    impl Deblender for FailingDeblender {
        type Error = std::io::Error;

        fn deblend(
            &self,
            _source: &DetectedSource,
            _exposures: &[Exposure],
            _psf_fwhm: &[f64],
            _filters: &Filters,
        ) -> Result<DeblenderResult, Self::Error> {
            Err(std::io::Error::other("diverged"))
        }
    }

    /// One template per (filter, peak) filled with a constant
    struct StubTemplates {
        templates: BTreeMap<(usize, usize), Array2<f64>>,
    }

    impl TemplateSource for StubTemplates {
        fn template(&self, filter_idx: usize, peak_idx: usize) -> Option<ArrayView2<'_, f64>> {
            self.templates.get(&(filter_idx, peak_idx)).map(|t| t.view())
        }
    }

    fn filters() -> Filters {
        Filters::new(["g", "r"])
    }

    fn exposures(value: f64) -> Vec<Exposure> {
        vec![
            flat_exposure("g", 30, 30, value),
            flat_exposure("r", 30, 30, value),
        ]
    }

    #[test]
    fn test_outlier_window() {
        let config = OutlierConfig::default();
        assert!(is_flux_outlier(90.0, 200.0, &config));
        assert!(!is_flux_outlier(150.0, 200.0, &config));
        assert!(is_flux_outlier(340.0, 200.0, &config));
        // Faint sources are never outliers
        assert!(!is_flux_outlier(10.0, 100.0, &config));
        assert!(!is_flux_outlier(10.0, 50.0, &config));
    }

    #[test]
    fn test_only_blends_are_deblended() {
        let deblender = StubDeblender::default();
        let ctx = RunContext::headless();
        let results =
            deblend_blends(&deblender, &detections(), &exposures(1.0), &filters(), &ctx).unwrap();

        assert_eq!(results.keys().copied().collect::<Vec<_>>(), vec![11]);
        let calls = deblender.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 11);
        for fwhm in &calls[0].1 {
            assert_relative_eq!(*fwhm, 1.5 * 2.35);
        }
    }

    #[test]
    fn test_deblender_fluxes_sum_portions() {
        let ctx = RunContext::headless();
        let peaks = PeakTable::build(&detections(), &filters());
        let results = deblend_blends(
            &StubDeblender::default(),
            &detections(),
            &exposures(1.0),
            &filters(),
            &ctx,
        )
        .unwrap();

        let table = apply_deblender_fluxes(&peaks, &results).unwrap();
        // Blend 11 has a 10x10 box
        assert_relative_eq!(table.fluxes()[[0, 0]], 100.0);
        assert_relative_eq!(table.fluxes()[[1, 0]], 200.0);
        assert_relative_eq!(table.fluxes()[[2, 1]], 600.0);
        assert!(table.fluxes()[[3, 0]].is_nan());
        // Input untouched
        assert!(peaks.fluxes().iter().all(|f| f.is_nan()));
    }

    #[test]
    fn test_deblender_failure_names_parent() {
        let ctx = RunContext::headless();
        let err = deblend_blends(
            &FailingDeblender,
            &detections(),
            &exposures(1.0),
            &filters(),
            &ctx,
        )
        .unwrap_err();
        assert!(matches!(err, FluxError::Deblender { parent: 11, .. }));
    }

    #[test]
    fn test_nmf_template_sums() {
        let peaks = PeakTable::build(&detections(), &filters());
        let mut templates = BTreeMap::new();
        for f in 0..2 {
            for p in 0..3 {
                templates.insert((f, p), Array2::from_elem((2, 2), (10 * f + p) as f64));
            }
        }
        let parents = BTreeMap::from([(11u64, StubTemplates { templates })]);

        let table = nmf_fluxes(&peaks, &parents).unwrap();
        assert_relative_eq!(table.fluxes()[[2, 0]], 8.0);
        assert_relative_eq!(table.fluxes()[[1, 1]], 44.0);
        assert!(table.fluxes()[[3, 1]].is_nan());
    }

    #[test]
    fn test_nmf_missing_template() {
        let peaks = PeakTable::build(&detections(), &filters());
        let templates = BTreeMap::from([((0, 0), Array2::zeros((1, 1)))]);
        let parents = BTreeMap::from([(11u64, StubTemplates { templates })]);
        assert!(matches!(
            nmf_fluxes(&peaks, &parents),
            Err(FluxError::MissingTemplate {
                parent: 11,
                peak_idx: 0,
                filter_idx: 1
            })
        ));
    }

    fn matched_isolated(sim_flux: f64) -> (PeakTable, MatchTable) {
        let filters = filters();
        let peaks = PeakTable::build(&detections(), &filters);
        let sims = sim_table(
            &filters,
            &[(2.0, 2.0, &[1.0, 1.0]), (22.0, 21.0, &[sim_flux, sim_flux])],
        );
        let config = MatchConfig {
            display: false,
            ..MatchConfig::default()
        };
        let matches =
            match_to_reference(&peaks, &sims, &config, None, None, &RunContext::headless())
                .unwrap()
                .table;
        (peaks, matches)
    }

    #[test]
    fn test_isolated_footprint_sums() {
        let (peaks, matches) = matched_isolated(52.0);
        let result = isolated_fluxes(
            &peaks,
            &matches,
            &exposures(2.0),
            &OutlierConfig::default(),
            &RunContext::headless(),
        )
        .unwrap();

        // 5x5 footprint of the isolated source
        assert_relative_eq!(result.table.fluxes()[[3, 0]], 50.0);
        assert_relative_eq!(result.table.fluxes()[[3, 1]], 50.0);
        // Blended rows are left alone even when matched
        assert!(result.table.fluxes()[[0, 0]].is_nan());
        assert!(result.outliers.is_empty());
    }

    #[test]
    fn test_isolated_outliers_reported() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (peaks, matches) = matched_isolated(200.0);
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::with_plot_dir(dir.path());
        let result = isolated_fluxes(
            &peaks,
            &matches,
            &exposures(1.0),
            &OutlierConfig::default(),
            &ctx,
        )
        .unwrap();

        assert_eq!(result.outliers.len(), 2);
        let outlier = &result.outliers[0];
        assert_eq!(outlier.row, 3);
        assert_eq!(outlier.parent, 42);
        assert_eq!(outlier.filter, "g");
        assert_eq!(outlier.percent, 12);
    }

    #[test]
    fn test_isolated_needs_one_exposure_per_filter() {
        let (peaks, matches) = matched_isolated(52.0);
        let err = isolated_fluxes(
            &peaks,
            &matches,
            &exposures(1.0)[..1],
            &OutlierConfig::default(),
            &RunContext::headless(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            FluxError::ExposureCount {
                expected: 2,
                found: 1
            }
        ));
    }
}
