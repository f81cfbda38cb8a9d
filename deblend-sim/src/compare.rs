//! Global comparison of measured fluxes and SEDs against the simulation.
//!
//! Tables from every exposure set are tagged with their set number and
//! stacked before any statistic is computed, so the numbers cover the
//! whole run.

use deblend_math::stats;
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::RunContext;
use crate::filters::Filters;
use crate::matcher::{MatchRow, MatchTable};
use crate::peak_table::{FluxTable, PeakRow, PeakTable, TableError};
use crate::plots::{self, Series, ERROR_BIN_EDGES, ISOLATED_COLOR, LSST_COLOR, NMF_COLOR};
use crate::sed::{calculate_seds, Seds};

#[derive(Error, Debug)]
pub enum CompareError {
    #[error("No exposure sets to compare")]
    Empty,
    #[error("Tables have no filters")]
    NoFilters,
    #[error("Got {peaks} peak tables, {matches} match tables and {nmf} NMF tables")]
    SetCount {
        peaks: usize,
        matches: usize,
        nmf: usize,
    },
    #[error("Exposure set {set} uses filters {found:?}, expected {expected:?}")]
    FilterMismatch {
        set: usize,
        expected: Filters,
        found: Filters,
    },
    #[error("Exposure set {set} lengths differ: {peaks} peaks, {matches} matches, {nmf} NMF")]
    LengthMismatch {
        set: usize,
        peaks: usize,
        matches: usize,
        nmf: usize,
    },
    #[error("Failed to stack flux columns: {0}")]
    Stack(#[from] ndarray::ShapeError),
    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

/// Comparison parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Flux below which sources are left out of the error statistics
    pub min_flux: f64,
    /// Filter whose simulated flux decides which SEDs count as good;
    /// the last filter is used when unset or unknown
    pub sed_reference_filter: Option<String>,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            min_flux: 50.0,
            sed_reference_filter: Some("i".to_string()),
        }
    }
}

/// Peak, match and NMF tables of all exposure sets, stacked row-wise
#[derive(Debug, Clone)]
pub struct StackedTables {
    pub peaks: PeakTable,
    pub matches: MatchTable,
    pub nmf: PeakTable,
}

/// Detection and match counts over the stacked tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSummary {
    pub total_detected: usize,
    pub total_matched: usize,
    pub matched_isolated: usize,
    pub matched_blended: usize,
    pub duplicates: usize,
}

impl MatchSummary {
    pub fn from_tables(peaks: &PeakTable, matches: &MatchTable) -> Self {
        let pairs = || peaks.rows().iter().zip(matches.rows());
        Self {
            total_detected: peaks.len(),
            total_matched: matches.matched_count(),
            matched_isolated: pairs().filter(|(p, m)| m.matched && !p.blended).count(),
            matched_blended: pairs().filter(|(p, m)| m.matched && p.blended).count(),
            duplicates: matches.duplicate_count(),
        }
    }

    fn log(&self, ctx: &RunContext) {
        let target = ctx.target();
        log::info!(target: target, "Total Detected Sources: {}", self.total_detected);
        log::info!(target: target, "Total Matches: {}", self.total_matched);
        log::info!(target: target, "Matched Isolated sources: {}", self.matched_isolated);
        log::info!(target: target, "Matched Blended sources: {}", self.matched_blended);
        log::info!(target: target, "Total Duplicates: {}", self.duplicates);
    }
}

/// SED errors of both deblenders over the matched rows
#[derive(Debug, Clone)]
pub struct SedComparison {
    pub lsst: Seds,
    pub nmf: Seds,
    pub sim: Seds,
    /// Index of the filter deciding `good_flux`
    pub reference_filter: usize,
    /// Stacked rows with a matched source
    pub matched_rows: Vec<usize>,
    /// Reference-filter simulated flux of each matched row
    pub sim_flux: Vec<f64>,
    /// Reference-filter simulated flux exceeds the minimum flux
    pub good_flux: Vec<bool>,
    pub lsst_error: Vec<f64>,
    pub nmf_error: Vec<f64>,
    /// Fractions of good-flux rows per [`ERROR_BIN_EDGES`] bin
    pub lsst_histogram: Vec<f64>,
    pub nmf_histogram: Vec<f64>,
}

/// Mean absolute and RMS error of one category of rows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryStats {
    pub count: usize,
    /// Mean of `|error|`, NaN without data
    pub mean_abs: f64,
    /// `sqrt(mean² + std²)`, NaN without data
    pub rms: f64,
}

impl CategoryStats {
    pub fn from_errors(errors: &[f64]) -> Self {
        Self {
            count: errors.len(),
            mean_abs: stats::mean_abs(errors).unwrap_or(f64::NAN),
            rms: stats::rms(errors).unwrap_or(f64::NAN),
        }
    }
}

/// Fractional flux errors in one filter
#[derive(Debug, Clone)]
pub struct FilterComparison {
    pub filter: String,
    /// `(meas - sim) / sim` of every stacked row
    pub lsst_error: Vec<f64>,
    pub nmf_error: Vec<f64>,
    /// Matched blended rows at or above the minimum flux
    pub blended_rows: Vec<usize>,
    /// Matched isolated rows at or above the minimum flux
    pub isolated_rows: Vec<usize>,
    pub isolated: CategoryStats,
    pub blended: CategoryStats,
    pub nmf_blended: CategoryStats,
    /// Error fractions per bin for LSST blended, NMF blended and isolated rows
    pub histograms: [Vec<f64>; 3],
}

/// Everything computed by [`compare_meas_to_sim`]
#[derive(Debug, Clone)]
pub struct Comparison {
    pub stacked: StackedTables,
    pub summary: MatchSummary,
    pub sed: SedComparison,
    pub filters: Vec<FilterComparison>,
}

/// Tag the tables of set `n` with image `n + 1` and stack each kind.
///
/// # Errors
/// * `CompareError::Empty` / `CompareError::SetCount` - if the three lists
///   are empty or of different lengths
/// * `CompareError::NoFilters` - if the tables carry no flux columns
/// * `CompareError::FilterMismatch` / `CompareError::LengthMismatch` - if
///   the tables of one set do not line up
pub fn stack_tables(
    peak_tables: &[PeakTable],
    match_tables: &[MatchTable],
    nmf_tables: &[PeakTable],
) -> Result<StackedTables, CompareError> {
    if peak_tables.len() != match_tables.len() || peak_tables.len() != nmf_tables.len() {
        return Err(CompareError::SetCount {
            peaks: peak_tables.len(),
            matches: match_tables.len(),
            nmf: nmf_tables.len(),
        });
    }
    let first = peak_tables.first().ok_or(CompareError::Empty)?;
    let filters = first.filters().clone();
    if filters.is_empty() {
        return Err(CompareError::NoFilters);
    }

    let sets = peak_tables.iter().zip(match_tables).zip(nmf_tables);
    for (set, ((peaks, matches), nmf)) in sets.clone().enumerate() {
        for found in [peaks.filters(), matches.filters(), nmf.filters()] {
            if *found != filters {
                return Err(CompareError::FilterMismatch {
                    set,
                    expected: filters.clone(),
                    found: found.clone(),
                });
            }
        }
        if matches.len() != peaks.len() || nmf.len() != peaks.len() {
            return Err(CompareError::LengthMismatch {
                set,
                peaks: peaks.len(),
                matches: matches.len(),
                nmf: nmf.len(),
            });
        }
    }

    let mut peak_rows: Vec<PeakRow> = Vec::new();
    let mut match_rows: Vec<MatchRow> = Vec::new();
    let mut nmf_rows: Vec<PeakRow> = Vec::new();
    let mut peak_flux = Vec::new();
    let mut match_flux = Vec::new();
    let mut nmf_flux = Vec::new();

    for (n, ((peaks, matches), nmf)) in sets.enumerate() {
        let (_, rows, flux) = peaks.tagged(n + 1).into_parts();
        peak_rows.extend(rows);
        peak_flux.push(flux);

        let (_, rows, flux) = matches.tagged(n + 1).into_parts();
        match_rows.extend(rows);
        match_flux.push(flux);

        let (_, rows, flux) = nmf.tagged(n + 1).into_parts();
        nmf_rows.extend(rows);
        nmf_flux.push(flux);
    }

    Ok(StackedTables {
        peaks: PeakTable::from_parts(filters.clone(), peak_rows, stack_flux(&peak_flux)?)?,
        matches: MatchTable::from_parts(filters.clone(), match_rows, stack_flux(&match_flux)?),
        nmf: PeakTable::from_parts(filters, nmf_rows, stack_flux(&nmf_flux)?)?,
    })
}

fn stack_flux(parts: &[Array2<f64>]) -> Result<Array2<f64>, CompareError> {
    let views: Vec<ArrayView2<f64>> = parts.iter().map(|a| a.view()).collect();
    Ok(concatenate(Axis(0), &views)?)
}

/// Per-row SED error `sqrt(Σ((sed_alg - sed_sim) / sed_sim)² / n_filters)`
pub fn sed_errors(alg: &Seds, sim: &Seds, rows: &[usize]) -> Vec<f64> {
    let nfilters = sim.seds.ncols() as f64;
    rows.iter()
        .map(|&r| {
            let sum_sq: f64 = alg
                .seds
                .row(r)
                .iter()
                .zip(sim.seds.row(r).iter())
                .map(|(a, s)| ((a - s) / s).powi(2))
                .sum();
            (sum_sq / nfilters).sqrt()
        })
        .collect()
}

/// `(meas - sim) / sim` for every row of one filter column
fn fractional_errors(measured: &[f64], simulated: &[f64]) -> Vec<f64> {
    measured
        .iter()
        .zip(simulated)
        .map(|(m, s)| (m - s) / s)
        .collect()
}

fn percent_histogram(errors: &[f64]) -> Vec<f64> {
    let percent: Vec<f64> = errors.iter().map(|e| e.abs() * 100.0).collect();
    plots::binned_fractions(&percent, &ERROR_BIN_EDGES)
}

fn pick<T: Copy>(values: &[T], rows: &[usize]) -> Vec<T> {
    rows.iter().map(|&r| values[r]).collect()
}

fn reference_filter(filters: &Filters, config: &CompareConfig, ctx: &RunContext) -> usize {
    let last = filters.len().saturating_sub(1);
    match &config.sed_reference_filter {
        Some(name) => filters.index_of(name).unwrap_or_else(|| {
            log::warn!(
                target: ctx.target(),
                "SED reference filter '{name}' not in {filters:?}, using '{}'",
                filters.name(last)
            );
            last
        }),
        None => last,
    }
}

fn compare_seds(
    stacked: &StackedTables,
    config: &CompareConfig,
    ctx: &RunContext,
) -> SedComparison {
    let lsst = calculate_seds(&stacked.peaks);
    let nmf = calculate_seds(&stacked.nmf);
    let sim = calculate_seds(&stacked.matches);

    let reference_filter = reference_filter(stacked.peaks.filters(), config, ctx);
    let matched_rows: Vec<usize> = stacked
        .matches
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, m)| m.matched)
        .map(|(r, _)| r)
        .collect();
    let sim_flux: Vec<f64> = matched_rows
        .iter()
        .map(|&r| stacked.matches.fluxes()[[r, reference_filter]])
        .collect();
    let good_flux: Vec<bool> = sim_flux.iter().map(|&f| f > config.min_flux).collect();

    let lsst_error = sed_errors(&lsst, &sim, &matched_rows);
    let nmf_error = sed_errors(&nmf, &sim, &matched_rows);

    let good = |errors: &[f64]| -> Vec<f64> {
        errors
            .iter()
            .zip(&good_flux)
            .filter(|(_, &g)| g)
            .map(|(&e, _)| e)
            .collect()
    };
    let lsst_histogram = percent_histogram(&good(&lsst_error));
    let nmf_histogram = percent_histogram(&good(&nmf_error));

    SedComparison {
        lsst,
        nmf,
        sim,
        reference_filter,
        matched_rows,
        sim_flux,
        good_flux,
        lsst_error,
        nmf_error,
        lsst_histogram,
        nmf_histogram,
    }
}

fn plot_sed_comparison(sed: &SedComparison, ctx: &RunContext) {
    if !ctx.plots_enabled() {
        return;
    }

    ctx.render("sed_error_histogram", (800, 400), |area| {
        plots::draw_error_histogram(
            area,
            "SED",
            &ERROR_BIN_EDGES,
            &[
                ("LSST", LSST_COLOR, sed.lsst_histogram.clone()),
                ("NMF", NMF_COLOR, sed.nmf_histogram.clone()),
            ],
        )
    });

    let split = |errors: &[f64], good: bool| -> Vec<(f64, f64)> {
        sed.sim_flux
            .iter()
            .zip(errors)
            .zip(&sed.good_flux)
            .filter(|(_, &g)| g == good)
            .map(|((&f, &e), _)| (f, e))
            .collect()
    };

    ctx.render("sed_error_scatter_faceted", (800, 300), |area| {
        plots::draw_faceted_scatter(
            area,
            "Simulated Flux",
            &[
                (
                    "LSST",
                    vec![
                        Series::new("LSST", LSST_COLOR, split(&sed.lsst_error, true)),
                        Series::new("Bad LSST", plots::BAD_COLOR, split(&sed.lsst_error, false)),
                    ],
                ),
                (
                    "NMF",
                    vec![
                        Series::new("NMF", NMF_COLOR, split(&sed.nmf_error, true)),
                        Series::new("Bad NMF", plots::BAD_COLOR, split(&sed.nmf_error, false)),
                    ],
                ),
            ],
        )
    });

    ctx.render("sed_error_scatter", (800, 500), |area| {
        plots::draw_error_scatter(
            area,
            "SED",
            "Simulated Flux",
            &[
                Series::new("LSST", LSST_COLOR, split(&sed.lsst_error, true)),
                Series::new("NMF", NMF_COLOR, split(&sed.nmf_error, true)),
            ],
        )
    });
}

fn compare_filter(
    stacked: &StackedTables,
    fidx: usize,
    config: &CompareConfig,
    ctx: &RunContext,
) -> FilterComparison {
    let filter = stacked.peaks.filters().name(fidx).to_string();
    let measured = stacked.peaks.fluxes().column(fidx).to_vec();
    let nmf_measured = stacked.nmf.fluxes().column(fidx).to_vec();
    let simulated = stacked.matches.fluxes().column(fidx).to_vec();

    let lsst_error = fractional_errors(&measured, &simulated);
    let nmf_error = fractional_errors(&nmf_measured, &simulated);

    let selected = |blended: bool| -> Vec<usize> {
        stacked
            .peaks
            .rows()
            .iter()
            .zip(stacked.matches.rows())
            .enumerate()
            .filter(|(r, (p, m))| {
                m.matched && p.blended == blended && measured[*r] >= config.min_flux
            })
            .map(|(r, _)| r)
            .collect()
    };
    let blended_rows = selected(true);
    let isolated_rows = selected(false);

    let lsst_blended = pick(&lsst_error, &blended_rows);
    let nmf_blended = pick(&nmf_error, &blended_rows);
    let lsst_isolated = pick(&lsst_error, &isolated_rows);

    let isolated = CategoryStats::from_errors(&lsst_isolated);
    let blended = CategoryStats::from_errors(&lsst_blended);
    let target = ctx.target();
    log::info!(target: target, "Filter {filter} Isolated Mean: {}", isolated.mean_abs);
    log::info!(target: target, "Filter {filter} Isolated RMS: {}", isolated.rms);
    log::info!(target: target, "Filter {filter} Blended Mean: {}", blended.mean_abs);
    log::info!(target: target, "Filter {filter} Blended RMS: {}", blended.rms);

    let histograms = [
        percent_histogram(&lsst_blended),
        percent_histogram(&nmf_blended),
        percent_histogram(&lsst_isolated),
    ];

    if ctx.plots_enabled() {
        let points = |errors: &[f64], rows: &[usize]| -> Vec<(f64, f64)> {
            rows.iter().map(|&r| (simulated[r], errors[r])).collect()
        };
        ctx.render(&format!("flux_error_{filter}"), (800, 400), |area| {
            plots::draw_error_scatter(
                area,
                &format!("Filter {filter}"),
                "Simulated Flux (counts)",
                &[
                    Series::new("LSST", LSST_COLOR, points(&lsst_error, &blended_rows)),
                    Series::new("NMF", NMF_COLOR, points(&nmf_error, &blended_rows)),
                    Series::new("Isolated", ISOLATED_COLOR, points(&lsst_error, &isolated_rows)),
                ],
            )
        });
        ctx.render(&format!("flux_error_histogram_{filter}"), (800, 400), |area| {
            plots::draw_error_histogram(
                area,
                &format!("Filter {filter} Flux"),
                &ERROR_BIN_EDGES,
                &[
                    ("LSST", LSST_COLOR, histograms[0].clone()),
                    ("NMF", NMF_COLOR, histograms[1].clone()),
                    ("Isolated", ISOLATED_COLOR, histograms[2].clone()),
                ],
            )
        });
    }

    FilterComparison {
        filter,
        lsst_error,
        nmf_error,
        blended_rows,
        isolated_rows,
        isolated,
        blended,
        nmf_blended: CategoryStats::from_errors(&nmf_blended),
        histograms,
    }
}

/// Compare deblended fluxes and SEDs with the simulated sources.
///
/// `peak_tables[n]`, `match_tables[n]` and `nmf_tables[n]` belong to
/// exposure set `n` and must be row-aligned.
///
/// # Errors
/// See [`stack_tables`].
pub fn compare_meas_to_sim(
    peak_tables: &[PeakTable],
    match_tables: &[MatchTable],
    nmf_tables: &[PeakTable],
    config: &CompareConfig,
    ctx: &RunContext,
) -> Result<Comparison, CompareError> {
    let stacked = stack_tables(peak_tables, match_tables, nmf_tables)?;

    let summary = MatchSummary::from_tables(&stacked.peaks, &stacked.matches);
    summary.log(ctx);

    let sed = compare_seds(&stacked, config, ctx);
    plot_sed_comparison(&sed, ctx);

    let filters = (0..stacked.peaks.filters().len())
        .map(|fidx| compare_filter(&stacked, fidx, config, ctx))
        .collect();

    Ok(Comparison {
        stacked,
        summary,
        sed,
        filters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{match_to_reference, MatchConfig};
    use crate::test_util::{detections, sim_table};
    use approx::assert_relative_eq;
    use ndarray::array;

    /// Blend 11 (peaks 0-2) and isolated 42 (peak 3); peak 2 is unmatched
    fn exposure_set() -> (PeakTable, MatchTable, PeakTable) {
        let filters = Filters::new(["g", "i"]);
        let peaks = PeakTable::build(&detections(), &filters);
        let sims = sim_table(
            &filters,
            &[
                (2.0, 2.0, &[100.0, 300.0]),
                (7.0, 6.0, &[200.0, 200.0]),
                (22.0, 21.0, &[80.0, 120.0]),
            ],
        );
        let config = MatchConfig {
            display: false,
            ..MatchConfig::default()
        };
        let ctx = RunContext::headless();
        let matches = match_to_reference(&peaks, &sims, &config, None, None, &ctx).unwrap().table;

        let nan = f64::NAN;
        let lsst = peaks
            .with_fluxes(array![[110.0, 330.0], [100.0, 300.0], [nan, nan], [80.0, 120.0]])
            .unwrap();
        let nmf = peaks
            .with_fluxes(array![[100.0, 300.0], [200.0, 200.0], [nan, nan], [88.0, 108.0]])
            .unwrap();
        (lsst, matches, nmf)
    }

    fn compare(sets: usize) -> Comparison {
        let (lsst, matches, nmf) = exposure_set();
        compare_meas_to_sim(
            &vec![lsst; sets],
            &vec![matches; sets],
            &vec![nmf; sets],
            &CompareConfig::default(),
            &RunContext::headless(),
        )
        .unwrap()
    }

    #[test]
    fn test_stacking_tags_exposure_sets() {
        let comparison = compare(2);
        let images: Vec<Option<usize>> = comparison
            .stacked
            .peaks
            .rows()
            .iter()
            .map(|r| r.image)
            .collect();
        assert_eq!(images.len(), 8);
        assert!(images[..4].iter().all(|&i| i == Some(1)));
        assert!(images[4..].iter().all(|&i| i == Some(2)));
        assert!(comparison
            .stacked
            .matches
            .rows()
            .iter()
            .zip(comparison.stacked.nmf.rows())
            .all(|(m, n)| m.image == n.image && m.image.is_some()));
        assert_eq!(comparison.stacked.peaks.fluxes().dim(), (8, 2));
    }

    #[test]
    fn test_summary_counts() {
        let _ = env_logger::builder().is_test(true).try_init();
        let summary = compare(2).summary;
        assert_eq!(
            summary,
            MatchSummary {
                total_detected: 8,
                total_matched: 6,
                matched_isolated: 2,
                matched_blended: 4,
                duplicates: 0,
            }
        );
    }

    #[test]
    fn test_sed_errors() {
        let sed = compare(1).sed;
        assert_eq!(sed.reference_filter, 1);
        assert_eq!(sed.matched_rows, vec![0, 1, 3]);
        assert_eq!(sed.good_flux, vec![true, true, true]);

        assert_relative_eq!(sed.lsst_error[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(sed.lsst_error[1], 0.5, epsilon = 1e-12);
        assert_relative_eq!(sed.lsst_error[2], 0.0, epsilon = 1e-12);
        assert_relative_eq!(sed.nmf_error[0], 0.0, epsilon = 1e-12);
        assert!(sed.nmf_error[2] > 0.1);

        // 0%, 50% and 0%: two rows in the first bin, one clipped into the last
        assert_relative_eq!(sed.lsst_histogram[0], 2.0 / 3.0);
        assert_relative_eq!(sed.lsst_histogram[4], 1.0 / 3.0);
    }

    #[test]
    fn test_filter_statistics() {
        let comparison = compare(1);
        let g = &comparison.filters[0];
        assert_eq!(g.filter, "g");
        assert_eq!(g.blended_rows, vec![0, 1]);
        assert_eq!(g.isolated_rows, vec![3]);

        assert_relative_eq!(g.blended.mean_abs, 0.3, epsilon = 1e-12);
        assert_relative_eq!(g.blended.rms, 0.13f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(g.isolated.mean_abs, 0.0);
        assert_relative_eq!(g.nmf_blended.mean_abs, 0.0);
        assert!(g.lsst_error[2].is_nan());
    }

    #[test]
    fn test_low_flux_rows_are_excluded() {
        let (lsst, matches, nmf) = exposure_set();
        let mut flux = lsst.fluxes().to_owned();
        flux[[3, 0]] = 40.0;
        let lsst = lsst.with_fluxes(flux).unwrap();

        let comparison = compare_meas_to_sim(
            &[lsst],
            &[matches],
            &[nmf],
            &CompareConfig::default(),
            &RunContext::headless(),
        )
        .unwrap();
        let g = &comparison.filters[0];
        assert!(g.isolated_rows.is_empty());
        assert_eq!(g.isolated.count, 0);
        assert!(g.isolated.mean_abs.is_nan());
        // The i band is unaffected
        assert_eq!(comparison.filters[1].isolated_rows, vec![3]);
    }

    #[test]
    fn test_unknown_reference_filter_falls_back_to_last() {
        let (lsst, matches, nmf) = exposure_set();
        let config = CompareConfig {
            sed_reference_filter: Some("z".to_string()),
            ..CompareConfig::default()
        };
        let comparison =
            compare_meas_to_sim(&[lsst], &[matches], &[nmf], &config, &RunContext::headless())
                .unwrap();
        assert_eq!(comparison.sed.reference_filter, 1);
    }

    #[test]
    fn test_input_errors() {
        let (lsst, matches, nmf) = exposure_set();
        assert!(matches!(
            stack_tables(&[], &[], &[]),
            Err(CompareError::Empty)
        ));
        assert!(matches!(
            stack_tables(&[lsst.clone()], &[], &[nmf.clone()]),
            Err(CompareError::SetCount { .. })
        ));

        let other = PeakTable::build(&detections(), &Filters::new(["r", "i"]));
        assert!(matches!(
            stack_tables(&[lsst.clone()], &[matches.clone()], &[other]),
            Err(CompareError::FilterMismatch { set: 0, .. })
        ));

        let short = PeakTable::build(&detections()[..1], lsst.filters());
        assert!(matches!(
            stack_tables(&[lsst], &[matches], &[short]),
            Err(CompareError::LengthMismatch { set: 0, nmf: 3, .. })
        ));
    }

    #[test]
    fn test_plots_do_not_change_numbers() {
        let (lsst, matches, nmf) = exposure_set();
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::with_plot_dir(dir.path().join("plots"));
        let plotted = compare_meas_to_sim(
            &[lsst],
            &[matches],
            &[nmf],
            &CompareConfig::default(),
            &ctx,
        )
        .unwrap();
        let headless = compare(1);
        assert_eq!(plotted.summary, headless.summary);
        assert_eq!(plotted.sed.lsst_histogram, headless.sed.lsst_histogram);
        assert_eq!(plotted.filters[1].histograms, headless.filters[1].histograms);
    }
}
