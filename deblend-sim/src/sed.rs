//! Spectral energy distributions from per-filter fluxes.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::peak_table::FluxTable;

/// Normalised SED per row and the normalisation that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Seds {
    /// `(rows × filters)`, each row summing to one
    pub seds: Array2<f64>,
    /// Total flux of each row
    pub normalization: Array1<f64>,
}

impl Seds {
    /// Normalise each row of a flux matrix by its sum.
    ///
    /// Rows with a zero or NaN total come out NaN.
    pub fn from_fluxes(fluxes: ArrayView2<f64>) -> Self {
        let normalization = fluxes.sum_axis(Axis(1));
        let mut seds = fluxes.to_owned();
        for (mut row, &norm) in seds.axis_iter_mut(Axis(0)).zip(normalization.iter()) {
            if norm == 0.0 {
                row.fill(f64::NAN);
            } else {
                row.mapv_inplace(|f| f / norm);
            }
        }
        Self {
            seds,
            normalization,
        }
    }

    pub fn len(&self) -> usize {
        self.normalization.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normalization.is_empty()
    }
}

/// SEDs of every row of a flux table
pub fn calculate_seds<T: FluxTable + ?Sized>(table: &T) -> Seds {
    Seds::from_fluxes(table.fluxes())
}
