//! One row per detected peak, flattened from the merged detection catalog.

use std::sync::Arc;

use nalgebra::Vector2;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use thiserror::Error;

use crate::filters::Filters;
use crate::footprint::{DetectedSource, Footprint, Peak};

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Unknown filter '{0}'")]
    UnknownFilter(String),
    #[error("Flux matrix has shape {found:?}, expected {expected:?}")]
    FluxShape {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// Any table with one flux column per filter
pub trait FluxTable {
    fn filters(&self) -> &Filters;

    /// `(rows × filters)` flux matrix
    fn fluxes(&self) -> ArrayView2<'_, f64>;

    /// All values of `flux_<filter>`
    fn flux_column(&self, filter: &str) -> Result<ArrayView1<'_, f64>, TableError> {
        let idx = self
            .filters()
            .index_of(filter)
            .ok_or_else(|| TableError::UnknownFilter(filter.to_string()))?;
        Ok(self.fluxes().index_axis_move(Axis(1), idx))
    }
}

/// A single detected peak
#[derive(Debug, Clone)]
pub struct PeakRow {
    /// Id of the parent detection
    pub parent: u64,
    /// Position of the peak in the parent's peak list
    pub peak_idx: usize,
    pub x: usize,
    pub y: usize,
    /// Parent footprint has two or more peaks
    pub blended: bool,
    pub peak: Peak,
    pub footprint: Arc<Footprint>,
    /// Exposure-set tag (1-based), assigned when tables are stacked
    pub image: Option<usize>,
}

impl PeakRow {
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x as f64, self.y as f64)
    }
}

/// Peak rows plus their per-filter fluxes
#[derive(Debug, Clone)]
pub struct PeakTable {
    filters: Filters,
    rows: Vec<PeakRow>,
    flux: Array2<f64>,
}

impl PeakTable {
    /// Flatten detections into one row per footprint peak.
    ///
    /// Rows follow catalog order, then peak order within each footprint.
    /// Every flux starts out NaN.
    pub fn build(detections: &[DetectedSource], filters: &Filters) -> Self {
        let mut rows = Vec::new();
        for source in detections {
            let blended = source.footprint.is_blended();
            for (peak_idx, peak) in source.footprint.peaks().iter().enumerate() {
                rows.push(PeakRow {
                    parent: source.id,
                    peak_idx,
                    x: peak.ix,
                    y: peak.iy,
                    blended,
                    peak: *peak,
                    footprint: Arc::clone(&source.footprint),
                    image: None,
                });
            }
        }

        let flux = Array2::from_elem((rows.len(), filters.len()), f64::NAN);
        Self {
            filters: filters.clone(),
            rows,
            flux,
        }
    }

    /// Assemble a table from rows and a matching flux matrix
    ///
    /// # Errors
    /// * `TableError::FluxShape` - if `flux` is not `(rows × filters)`
    pub fn from_parts(
        filters: Filters,
        rows: Vec<PeakRow>,
        flux: Array2<f64>,
    ) -> Result<Self, TableError> {
        let expected = (rows.len(), filters.len());
        if flux.dim() != expected {
            return Err(TableError::FluxShape {
                expected,
                found: flux.dim(),
            });
        }
        Ok(Self {
            filters,
            rows,
            flux,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[PeakRow] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> &PeakRow {
        &self.rows[idx]
    }

    /// Row holding peak `peak_idx` of `parent`
    pub fn find(&self, parent: u64, peak_idx: usize) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| r.parent == parent && r.peak_idx == peak_idx)
    }

    pub fn positions(&self) -> Vec<Vector2<f64>> {
        self.rows.iter().map(PeakRow::position).collect()
    }

    /// Copy of the table with every flux reset to NaN
    pub fn with_empty_fluxes(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            rows: self.rows.clone(),
            flux: Array2::from_elem(self.flux.dim(), f64::NAN),
        }
    }

    /// Copy of the table with the fluxes replaced
    ///
    /// # Errors
    /// * `TableError::FluxShape` - if `flux` is not `(rows × filters)`
    pub fn with_fluxes(&self, flux: Array2<f64>) -> Result<Self, TableError> {
        Self::from_parts(self.filters.clone(), self.rows.clone(), flux)
    }

    /// Copy of the table with every row tagged as exposure set `image`
    pub fn tagged(&self, image: usize) -> Self {
        let mut tagged = self.clone();
        for row in &mut tagged.rows {
            row.image = Some(image);
        }
        tagged
    }

    pub(crate) fn into_parts(self) -> (Filters, Vec<PeakRow>, Array2<f64>) {
        (self.filters, self.rows, self.flux)
    }
}

impl FluxTable for PeakTable {
    fn filters(&self) -> &Filters {
        &self.filters
    }

    fn fluxes(&self) -> ArrayView2<'_, f64> {
        self.flux.view()
    }
}
