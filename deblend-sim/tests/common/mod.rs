//! Synthetic scenes for the integration tests

use std::path::Path;

use deblend_sim::flux::DeblendedPeak;
use deblend_sim::{
    BBox, Deblender, DeblenderResult, DetectedSource, Exposure, Filters, Footprint, GaussianPsf,
    Peak, TemplateSource,
};
use fitsio::tables::{ColumnDataType, ColumnDescription};
use fitsio::FitsFile;
use ndarray::{Array2, ArrayView2};

pub const SIGMA: f64 = 1.5;
pub const VARIANCE: f64 = 4.0;

/// A simulated star: position and one flux per filter
#[derive(Debug, Clone)]
pub struct Star {
    pub id: i32,
    pub x: f64,
    pub y: f64,
    pub flux: Vec<f64>,
}

pub fn gaussian(x: f64, y: f64, cx: f64, cy: f64) -> f64 {
    let r2 = (x - cx).powi(2) + (y - cy).powi(2);
    (-r2 / (2.0 * SIGMA * SIGMA)).exp() / (2.0 * std::f64::consts::PI * SIGMA * SIGMA)
}

/// Noise-free exposures of `stars`, one per filter
pub fn render_exposures(filters: &Filters, stars: &[Star], size: usize) -> Vec<Exposure> {
    filters
        .iter()
        .enumerate()
        .map(|(fidx, filter)| {
            let image = Array2::from_shape_fn((size, size), |(y, x)| {
                stars
                    .iter()
                    .map(|s| s.flux[fidx] * gaussian(x as f64, y as f64, s.x, s.y))
                    .sum::<f64>()
            });
            Exposure::new(
                filter,
                image,
                Array2::from_elem((size, size), VARIANCE),
                Array2::zeros((size, size)),
                GaussianPsf::new(SIGMA),
            )
            .unwrap()
        })
        .collect()
}

pub fn detection(id: u64, bbox: BBox, peaks: &[(usize, usize)]) -> DetectedSource {
    let peaks = peaks
        .iter()
        .map(|&(x, y)| Peak::new(x, y, 1.0))
        .collect();
    DetectedSource::new(id, Footprint::rectangle(bbox, peaks).unwrap())
}

/// Write `stars` as a FITS binary table with `id`, `x`, `y` and `flux_<f>` columns
pub fn write_sim_catalog(path: &Path, filters: &Filters, stars: &[Star]) {
    let mut fptr = FitsFile::create(path).open().unwrap();

    let mut columns = vec![ColumnDescription::new("id")
        .with_type(ColumnDataType::Int)
        .create()
        .unwrap()];
    let mut names = vec!["x".to_string(), "y".to_string()];
    names.extend(filters.iter().map(Filters::flux_column));
    for name in &names {
        columns.push(
            ColumnDescription::new(name)
                .with_type(ColumnDataType::Double)
                .create()
                .unwrap(),
        );
    }

    let hdu = fptr.create_table("SIMS".to_string(), &columns).unwrap();
    let ids: Vec<i32> = stars.iter().map(|s| s.id).collect();
    hdu.write_col(&mut fptr, "id", &ids).unwrap();
    let xs: Vec<f64> = stars.iter().map(|s| s.x).collect();
    hdu.write_col(&mut fptr, "x", &xs).unwrap();
    let ys: Vec<f64> = stars.iter().map(|s| s.y).collect();
    hdu.write_col(&mut fptr, "y", &ys).unwrap();
    for (fidx, filter) in filters.iter().enumerate() {
        let flux: Vec<f64> = stars.iter().map(|s| s.flux[fidx]).collect();
        hdu.write_col(&mut fptr, Filters::flux_column(filter), &flux)
            .unwrap();
    }
}

/// Splits each footprint pixel between the peaks in proportion to a PSF
/// centred on each peak, scaled by the image value at the peak
pub struct PsfSplitDeblender;

impl Deblender for PsfSplitDeblender {
    type Error = std::io::Error;

    fn deblend(
        &self,
        source: &DetectedSource,
        exposures: &[Exposure],
        _psf_fwhm: &[f64],
        _filters: &Filters,
    ) -> Result<DeblenderResult, Self::Error> {
        let footprint = &source.footprint;
        let bbox = *footprint.bbox();
        let mut peaks: Vec<DeblendedPeak> = footprint
            .peaks()
            .iter()
            .map(|_| DeblendedPeak {
                flux_portions: Vec::with_capacity(exposures.len()),
            })
            .collect();

        for exposure in exposures {
            let cutout = exposure
                .cutout(&bbox)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            let portions = split(cutout, &bbox, footprint.peaks(), exposure.image());
            for (peak, portion) in peaks.iter_mut().zip(portions) {
                peak.flux_portions.push(portion);
            }
        }
        Ok(DeblenderResult { peaks })
    }
}

fn split(
    cutout: ArrayView2<f64>,
    bbox: &BBox,
    peaks: &[Peak],
    image: ArrayView2<f64>,
) -> Vec<Array2<f64>> {
    let amplitude: Vec<f64> = peaks.iter().map(|p| image[[p.iy, p.ix]]).collect();
    let weight = |k: usize, row: usize, col: usize| {
        let x = (bbox.min_x + col) as f64;
        let y = (bbox.min_y + row) as f64;
        amplitude[k] * gaussian(x, y, peaks[k].ix as f64, peaks[k].iy as f64)
    };

    (0..peaks.len())
        .map(|k| {
            Array2::from_shape_fn(cutout.dim(), |(row, col)| {
                let total: f64 = (0..peaks.len()).map(|j| weight(j, row, col)).sum();
                if total > 0.0 {
                    cutout[[row, col]] * weight(k, row, col) / total
                } else {
                    0.0
                }
            })
        })
        .collect()
}

/// NMF templates taken straight from a deblender result
pub struct StoredTemplates(pub DeblenderResult);

impl TemplateSource for StoredTemplates {
    fn template(&self, filter_idx: usize, peak_idx: usize) -> Option<ArrayView2<'_, f64>> {
        self.0
            .peaks
            .get(peak_idx)
            .and_then(|p| p.flux_portions.get(filter_idx))
            .map(|t| t.view())
    }
}
