//! Calibrated exposures supplied by the caller.
//!
//! An exposure carries the science image, its per-pixel variance, a bit
//! mask plane and the PSF model for one filter. Arrays are indexed
//! `[row, col]`, i.e. `[y, x]`.

use ndarray::{s, Array2, ArrayView2};
use thiserror::Error;

use crate::footprint::BBox;

/// Conversion from Gaussian sigma (determinant radius) to FWHM
pub const FWHM_PER_SIGMA: f64 = 2.35;

/// Mask plane bits
pub mod mask_bits {
    pub const BAD: u32 = 1 << 0;
    pub const SAT: u32 = 1 << 1;
    pub const INTRP: u32 = 1 << 2;
    pub const CR: u32 = 1 << 3;
    pub const EDGE: u32 = 1 << 4;
    pub const DETECTED: u32 = 1 << 5;
    pub const NO_DATA: u32 = 1 << 8;

    /// Pixels excluded from background statistics by default
    pub const DEFAULT_IGNORE: u32 = BAD | SAT | INTRP | CR | EDGE | NO_DATA;
}

#[derive(Error, Debug)]
pub enum ExposureError {
    #[error("{plane} plane shape {found:?} does not match image shape {expected:?}")]
    PlaneShape {
        plane: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("Box {bbox:?} extends beyond the {width}x{height} exposure")]
    OutOfBounds {
        bbox: BBox,
        width: usize,
        height: usize,
    },
}

/// Circular Gaussian PSF model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianPsf {
    /// Gaussian sigma in pixels
    pub sigma: f64,
}

impl GaussianPsf {
    pub fn new(sigma: f64) -> Self {
        Self { sigma }
    }

    /// Determinant radius of the second-moment shape; equals sigma for a round Gaussian
    pub fn determinant_radius(&self) -> f64 {
        self.sigma
    }

    pub fn fwhm(&self) -> f64 {
        self.determinant_radius() * FWHM_PER_SIGMA
    }
}

/// One calibrated exposure in a single filter
#[derive(Debug, Clone)]
pub struct Exposure {
    filter: String,
    image: Array2<f64>,
    variance: Array2<f64>,
    mask: Array2<u32>,
    psf: GaussianPsf,
}

impl Exposure {
    /// Assemble an exposure, checking that all planes share one shape.
    ///
    /// # Errors
    /// * `ExposureError::PlaneShape` - if variance or mask differ from the image shape
    pub fn new(
        filter: impl Into<String>,
        image: Array2<f64>,
        variance: Array2<f64>,
        mask: Array2<u32>,
        psf: GaussianPsf,
    ) -> Result<Self, ExposureError> {
        let expected = image.dim();
        if variance.dim() != expected {
            return Err(ExposureError::PlaneShape {
                plane: "variance",
                expected,
                found: variance.dim(),
            });
        }
        if mask.dim() != expected {
            return Err(ExposureError::PlaneShape {
                plane: "mask",
                expected,
                found: mask.dim(),
            });
        }
        Ok(Self {
            filter: filter.into(),
            image,
            variance,
            mask,
            psf,
        })
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn image(&self) -> ArrayView2<'_, f64> {
        self.image.view()
    }

    pub fn variance(&self) -> ArrayView2<'_, f64> {
        self.variance.view()
    }

    pub fn mask(&self) -> ArrayView2<'_, u32> {
        self.mask.view()
    }

    pub fn psf(&self) -> &GaussianPsf {
        &self.psf
    }

    pub fn width(&self) -> usize {
        self.image.ncols()
    }

    pub fn height(&self) -> usize {
        self.image.nrows()
    }

    /// View of the image pixels inside `bbox`
    ///
    /// # Errors
    /// * `ExposureError::OutOfBounds` - if the box is not fully inside the image
    pub fn cutout(&self, bbox: &BBox) -> Result<ArrayView2<'_, f64>, ExposureError> {
        if bbox.max_x >= self.width() || bbox.max_y >= self.height() {
            return Err(ExposureError::OutOfBounds {
                bbox: *bbox,
                width: self.width(),
                height: self.height(),
            });
        }
        Ok(self
            .image
            .slice(s![bbox.min_y..=bbox.max_y, bbox.min_x..=bbox.max_x]))
    }
}
