//! Spatial matching of detected peaks to simulated sources.
//!
//! Every peak is paired with its nearest simulated source. The pair counts
//! as a match when the two lie closer than the configured separation, and
//! every peak claiming an already-claimed source is flagged as a duplicate.

use std::collections::HashMap;

use deblend_math::{KdTree, KdTreeError, Neighbor};
use itertools::Itertools;
use nalgebra::Vector2;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::SimTable;
use crate::context::RunContext;
use crate::exposure::Exposure;
use crate::filters::Filters;
use crate::peak_table::{FluxTable, PeakTable};
use crate::plots::{self, CutoutMarkers};

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Simulated catalog has no positioned sources to match against")]
    EmptyReference,
    #[error("Peak table filters {peaks:?} differ from catalog filters {sims:?}")]
    FilterMismatch { peaks: Filters, sims: Filters },
    #[error("Nearest neighbour query failed: {0}")]
    KdTree(#[from] KdTreeError),
}

/// Matching parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Maximum peak to source distance in pixels (exclusive)
    pub max_separation: f64,
    /// Size of a dedicated query pool; `None` uses the global rayon pool
    pub workers: Option<usize>,
    /// Plot the fluxes of undetected sources
    pub display: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_separation: 3.0,
            workers: None,
            display: true,
        }
    }
}

/// Attributes of the simulated source matched to a peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimMatch {
    /// Row of the source in the simulated table
    pub index: usize,
    pub id: Option<i64>,
    pub x: f64,
    pub y: f64,
}

/// Match information for one peak
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRow {
    /// Matched source, `None` when no source lies within the separation
    pub sim: Option<SimMatch>,
    pub matched: bool,
    /// Distance to the nearest source, kept for unmatched rows too
    pub distance: f64,
    /// Another matched peak claims the same source
    pub duplicate: bool,
    /// Exposure-set tag (1-based), assigned when tables are stacked
    pub image: Option<usize>,
}

/// One row per peak, aligned with the [`PeakTable`] it was built from.
///
/// Flux columns hold the simulated fluxes of the matched source and NaN on
/// unmatched rows.
#[derive(Debug, Clone)]
pub struct MatchTable {
    filters: Filters,
    rows: Vec<MatchRow>,
    flux: Array2<f64>,
}

impl MatchTable {
    pub(crate) fn from_parts(filters: Filters, rows: Vec<MatchRow>, flux: Array2<f64>) -> Self {
        Self {
            filters,
            rows,
            flux,
        }
    }

    pub(crate) fn into_parts(self) -> (Filters, Vec<MatchRow>, Array2<f64>) {
        (self.filters, self.rows, self.flux)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[MatchRow] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> &MatchRow {
        &self.rows[idx]
    }

    pub fn matched_count(&self) -> usize {
        self.rows.iter().filter(|r| r.matched).count()
    }

    pub fn duplicate_count(&self) -> usize {
        self.rows.iter().filter(|r| r.duplicate).count()
    }

    /// Copy of the table with every row tagged as exposure set `image`
    pub fn tagged(&self, image: usize) -> Self {
        let mut tagged = self.clone();
        for row in &mut tagged.rows {
            row.image = Some(image);
        }
        tagged
    }
}

impl FluxTable for MatchTable {
    fn filters(&self) -> &Filters {
        &self.filters
    }

    fn fluxes(&self) -> ArrayView2<'_, f64> {
        self.flux.view()
    }
}

/// Output of [`match_to_reference`]
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub table: MatchTable,
    /// Nearest simulated index of every peak, matched or not
    pub nearest: Vec<usize>,
    /// Simulated sources that are nobody's nearest neighbour
    pub undetected: Vec<usize>,
}

/// Match every peak to its nearest simulated source.
///
/// `avg_noise` adds the per-filter background to the undetected-source
/// plot; `calexp` enables cutouts of every parent holding an unmatched peak.
///
/// # Errors
/// * `MatchError::EmptyReference` - if `sims` has no source with a finite position
/// * `MatchError::FilterMismatch` - if the two tables use different filters
/// * `MatchError::KdTree` - if the query pool cannot be created
pub fn match_to_reference(
    peaks: &PeakTable,
    sims: &SimTable,
    config: &MatchConfig,
    avg_noise: Option<&[f64]>,
    calexp: Option<&Exposure>,
    ctx: &RunContext,
) -> Result<MatchResult, MatchError> {
    if peaks.filters() != sims.filters() {
        return Err(MatchError::FilterMismatch {
            peaks: peaks.filters().clone(),
            sims: sims.filters().clone(),
        });
    }

    let tree = KdTree::build(&sims.positions()).ok_or(MatchError::EmptyReference)?;
    let neighbors = tree.nearest_batch(&peaks.positions(), config.workers)?;
    let matched: Vec<bool> = neighbors
        .iter()
        .map(|n| n.distance() < config.max_separation)
        .collect();

    let claims: HashMap<usize, usize> = neighbors
        .iter()
        .zip(&matched)
        .filter(|(_, &m)| m)
        .map(|(n, _)| n.index)
        .counts();

    let table = build_table(sims, &neighbors, &matched, &claims);
    let nearest: Vec<usize> = neighbors.iter().map(|n| n.index).collect();

    let mut claimed = vec![false; sims.len()];
    for &idx in &nearest {
        claimed[idx] = true;
    }
    let undetected: Vec<usize> = (0..sims.len()).filter(|&idx| !claimed[idx]).collect();
    log::info!(target: ctx.target(), "Sources not detected: {}", undetected.len());
    log::debug!(
        target: ctx.target(),
        "Matched {} of {} peaks, {} duplicates",
        table.matched_count(),
        table.len(),
        table.duplicate_count()
    );

    if config.display {
        plot_undetected(sims, &undetected, avg_noise, ctx);
    }
    if let Some(calexp) = calexp {
        plot_unmatched_parents(peaks, &table, sims, &tree, calexp, ctx);
    }

    Ok(MatchResult {
        table,
        nearest,
        undetected,
    })
}

fn build_table(
    sims: &SimTable,
    neighbors: &[Neighbor],
    matched: &[bool],
    claims: &HashMap<usize, usize>,
) -> MatchTable {
    let mut flux = Array2::from_elem((neighbors.len(), sims.filters().len()), f64::NAN);
    let rows = neighbors
        .iter()
        .zip(matched)
        .enumerate()
        .map(|(row, (neighbor, &is_match))| {
            let sim = is_match.then(|| {
                flux.row_mut(row).assign(&sims.fluxes().row(neighbor.index));
                let source = sims.source(neighbor.index);
                SimMatch {
                    index: neighbor.index,
                    id: source.id,
                    x: source.x,
                    y: source.y,
                }
            });
            MatchRow {
                sim,
                matched: is_match,
                distance: neighbor.distance(),
                duplicate: is_match && claims.get(&neighbor.index).copied().unwrap_or(0) > 1,
                image: None,
            }
        })
        .collect();

    MatchTable::from_parts(sims.filters().clone(), rows, flux)
}

fn plot_undetected(
    sims: &SimTable,
    undetected: &[usize],
    avg_noise: Option<&[f64]>,
    ctx: &RunContext,
) {
    if undetected.is_empty() || !ctx.plots_enabled() {
        return;
    }
    let fluxes: Vec<Vec<f64>> = undetected
        .iter()
        .map(|&idx| sims.fluxes().row(idx).to_vec())
        .collect();
    ctx.render("undetected_sources", (900, 500), |area| {
        plots::draw_undetected_fluxes(area, sims.filters(), &fluxes, avg_noise)
    });
}

fn plot_unmatched_parents(
    peaks: &PeakTable,
    table: &MatchTable,
    sims: &SimTable,
    tree: &KdTree,
    calexp: &Exposure,
    ctx: &RunContext,
) {
    if !ctx.plots_enabled() {
        return;
    }

    let parents: Vec<u64> = peaks
        .rows()
        .iter()
        .zip(table.rows())
        .filter(|(_, m)| !m.matched)
        .map(|(p, _)| p.parent)
        .sorted()
        .dedup()
        .collect();

    for parent in parents {
        let Some(first) = peaks.rows().iter().find(|r| r.parent == parent) else {
            continue;
        };
        let bbox = *first.footprint.bbox();
        let cutout = match calexp.cutout(&bbox) {
            Ok(cutout) => cutout,
            Err(e) => {
                log::warn!(target: ctx.target(), "No cutout for parent {parent}: {e}");
                continue;
            }
        };

        let origin = (bbox.min_x as f64, bbox.min_y as f64);
        let relative = |x: f64, y: f64| (x - origin.0, y - origin.1);

        let mut markers = CutoutMarkers::default();
        for (peak, m) in peaks.rows().iter().zip(table.rows()) {
            let (x, y) = (peak.x as f64, peak.y as f64);
            if !bbox.contains_position(x, y) {
                continue;
            }
            if m.matched {
                markers.matched.push(relative(x, y));
            } else {
                markers.unmatched.push(relative(x, y));
            }
        }

        let (cx, cy) = bbox.center();
        let reach = (bbox.width() as f64).hypot(bbox.height() as f64);
        markers.sims = tree
            .within_radius(&Vector2::new(cx, cy), reach)
            .into_iter()
            .map(|n| sims.source(n.index))
            .filter(|s| bbox.contains_position(s.x, s.y))
            .map(|s| relative(s.x, s.y))
            .collect();

        ctx.render(&format!("unmatched_parent_{parent}"), (600, 600), |area| {
            plots::draw_parent_cutout(area, &format!("Parent {parent}"), cutout, &markers)
        });
    }
}
