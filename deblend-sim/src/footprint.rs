//! Detection footprints and the peaks they contain.
//!
//! These types describe the output of the external detection stage. A
//! footprint is the set of pixels belonging to one detected source, stored
//! as a boolean mask over its bounding box; a footprint with more than one
//! peak is a blend.

use std::sync::Arc;

use ndarray::{Array2, ArrayView2};
use thiserror::Error;

/// Errors raised while assembling a footprint
#[derive(Error, Debug)]
pub enum FootprintError {
    #[error("Footprint mask shape {mask:?} does not match bounding box shape {bbox:?}")]
    MaskShape {
        mask: (usize, usize),
        bbox: (usize, usize),
    },
    #[error("Peak at ({x}, {y}) lies outside the footprint bounding box")]
    PeakOutside { x: usize, y: usize },
    #[error("Invalid bounding box: {0}")]
    InvalidBox(String),
}

/// Axis-aligned pixel box with inclusive bounds.
///
/// `x` indexes image columns and `y` image rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BBox {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl BBox {
    /// Create a box from inclusive corner coordinates
    ///
    /// # Errors
    /// * `FootprintError::InvalidBox` - if a max coordinate is below its min
    pub fn from_coords(
        min_x: usize,
        min_y: usize,
        max_x: usize,
        max_y: usize,
    ) -> Result<Self, FootprintError> {
        if max_x < min_x || max_y < min_y {
            return Err(FootprintError::InvalidBox(format!(
                "({min_x}, {min_y}) - ({max_x}, {max_y})"
            )));
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// Create a box from its lower corner and size
    pub fn from_origin(min_x: usize, min_y: usize, width: usize, height: usize) -> Self {
        Self {
            min_x,
            min_y,
            max_x: min_x + width.max(1) - 1,
            max_y: min_y + height.max(1) - 1,
        }
    }

    pub fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> usize {
        self.max_y - self.min_y + 1
    }

    /// Shape as ndarray `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    pub fn contains_point(&self, x: usize, y: usize) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Whether a floating point position falls inside the closed box
    pub fn contains_position(&self, x: f64, y: f64) -> bool {
        x >= self.min_x as f64
            && x <= self.max_x as f64
            && y >= self.min_y as f64
            && y <= self.max_y as f64
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) as f64 / 2.0,
            (self.min_y + self.max_y) as f64 / 2.0,
        )
    }
}

/// A local intensity maximum inside a footprint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Integer column of the peak pixel
    pub ix: usize,
    /// Integer row of the peak pixel
    pub iy: usize,
    /// Pixel value at the peak in the detection image
    pub value: f64,
}

impl Peak {
    pub fn new(ix: usize, iy: usize, value: f64) -> Self {
        Self { ix, iy, value }
    }
}

/// Pixels and peaks belonging to one detected source
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    bbox: BBox,
    /// `true` for pixels inside the footprint, indexed relative to `bbox`
    mask: Array2<bool>,
    peaks: Vec<Peak>,
}

impl Footprint {
    /// Build a footprint from a bounding box, a mask over that box and its peaks.
    ///
    /// # Errors
    /// * `FootprintError::MaskShape` - if the mask shape differs from the box
    /// * `FootprintError::PeakOutside` - if a peak is not inside the box
    pub fn new(bbox: BBox, mask: Array2<bool>, peaks: Vec<Peak>) -> Result<Self, FootprintError> {
        if mask.dim() != bbox.shape() {
            return Err(FootprintError::MaskShape {
                mask: mask.dim(),
                bbox: bbox.shape(),
            });
        }
        if let Some(peak) = peaks.iter().find(|p| !bbox.contains_point(p.ix, p.iy)) {
            return Err(FootprintError::PeakOutside {
                x: peak.ix,
                y: peak.iy,
            });
        }
        Ok(Self { bbox, mask, peaks })
    }

    /// Footprint covering its whole bounding box
    pub fn rectangle(bbox: BBox, peaks: Vec<Peak>) -> Result<Self, FootprintError> {
        Self::new(bbox, Array2::from_elem(bbox.shape(), true), peaks)
    }

    pub fn bbox(&self) -> &BBox {
        &self.bbox
    }

    pub fn mask(&self) -> ArrayView2<'_, bool> {
        self.mask.view()
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn peak_count(&self) -> usize {
        self.peaks.len()
    }

    /// A footprint with two or more peaks is a blend
    pub fn is_blended(&self) -> bool {
        self.peaks.len() >= 2
    }

    /// Number of pixels inside the footprint
    pub fn area(&self) -> usize {
        self.mask.iter().filter(|&&inside| inside).count()
    }

    /// Whether image pixel `(x, y)` belongs to the footprint
    pub fn contains(&self, x: usize, y: usize) -> bool {
        self.bbox.contains_point(x, y) && self.mask[[y - self.bbox.min_y, x - self.bbox.min_x]]
    }

    /// Sum the pixels of a bbox-shaped cutout that lie inside the footprint
    pub fn masked_sum(&self, cutout: ArrayView2<f64>) -> f64 {
        cutout
            .iter()
            .zip(self.mask.iter())
            .filter(|(_, &inside)| inside)
            .map(|(&v, _)| v)
            .sum()
    }
}

/// One row of the merged detection catalog
#[derive(Debug, Clone)]
pub struct DetectedSource {
    pub id: u64,
    pub footprint: Arc<Footprint>,
}

impl DetectedSource {
    pub fn new(id: u64, footprint: Footprint) -> Self {
        Self {
            id,
            footprint: Arc::new(footprint),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_bbox_dimensions() {
        let bbox = BBox::from_coords(10, 20, 14, 22).unwrap();
        assert_eq!(bbox.width(), 5);
        assert_eq!(bbox.height(), 3);
        assert_eq!(bbox.shape(), (3, 5));
        assert!(bbox.contains_point(14, 22));
        assert!(!bbox.contains_point(15, 22));
        assert_eq!(bbox.center(), (12.0, 21.0));
        assert!(BBox::from_coords(5, 5, 4, 5).is_err());
        assert_eq!(BBox::from_origin(10, 20, 5, 3), bbox);
    }

    #[test]
    fn test_footprint_mask_validation() {
        let bbox = BBox::from_coords(0, 0, 2, 1).unwrap();
        let bad_mask = Array2::from_elem((3, 2), true);
        assert!(matches!(
            Footprint::new(bbox, bad_mask, vec![]),
            Err(FootprintError::MaskShape { .. })
        ));

        let outside = vec![Peak::new(5, 0, 1.0)];
        assert!(matches!(
            Footprint::rectangle(bbox, outside),
            Err(FootprintError::PeakOutside { x: 5, y: 0 })
        ));
    }

    #[test]
    fn test_masked_sum_and_contains() {
        let bbox = BBox::from_coords(4, 6, 6, 7).unwrap();
        let mask = array![[true, false, true], [false, true, false]];
        let footprint = Footprint::new(bbox, mask, vec![Peak::new(5, 7, 3.0)]).unwrap();

        assert_eq!(footprint.area(), 3);
        assert!(footprint.contains(4, 6));
        assert!(!footprint.contains(5, 6));
        assert!(!footprint.contains(0, 0));

        let cutout = array![[1.0, 10.0, 2.0], [20.0, 3.0, 30.0]];
        assert_eq!(footprint.masked_sum(cutout.view()), 6.0);
        assert!(!footprint.is_blended());
    }
}
