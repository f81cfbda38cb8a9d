//! Fixtures shared by the unit tests.

use ndarray::Array2;

use crate::catalog::{SimSource, SimTable};
use crate::exposure::{Exposure, GaussianPsf};
use crate::filters::Filters;
use crate::footprint::{BBox, DetectedSource, Footprint, Peak};

/// A rectangular footprint holding the given peaks
pub fn source_with_peaks(id: u64, bbox: BBox, peaks: &[(usize, usize)]) -> DetectedSource {
    let peaks = peaks
        .iter()
        .map(|&(x, y)| Peak::new(x, y, 1.0))
        .collect();
    DetectedSource::new(id, Footprint::rectangle(bbox, peaks).unwrap())
}

/// A three-peak blend (id 11) followed by an isolated source (id 42)
pub fn detections() -> Vec<DetectedSource> {
    vec![
        source_with_peaks(
            11,
            BBox::from_coords(0, 0, 9, 9).unwrap(),
            &[(2, 2), (7, 6), (4, 8)],
        ),
        source_with_peaks(42, BBox::from_coords(20, 20, 24, 24).unwrap(), &[(22, 21)]),
    ]
}

/// Simulated table from `(x, y, fluxes)` rows without ids
pub fn sim_table(filters: &Filters, rows: &[(f64, f64, &[f64])]) -> SimTable {
    let sources = rows
        .iter()
        .map(|&(x, y, _)| SimSource { id: None, x, y })
        .collect();
    let flux = Array2::from_shape_fn((rows.len(), filters.len()), |(r, f)| rows[r].2[f]);
    SimTable::new(filters.clone(), sources, flux).unwrap()
}

/// Exposure with a constant image, unit variance and a clean mask
pub fn flat_exposure(filter: &str, height: usize, width: usize, value: f64) -> Exposure {
    Exposure::new(
        filter,
        Array2::from_elem((height, width), value),
        Array2::from_elem((height, width), 1.0),
        Array2::zeros((height, width)),
        GaussianPsf::new(1.5),
    )
    .unwrap()
}
