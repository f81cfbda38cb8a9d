//! Diagnostic plot drawing.
//!
//! Every function draws into a drawing area handed out by
//! [`RunContext::render`](crate::context::RunContext::render) and only
//! reads its inputs.

use std::ops::Range;

use ndarray::ArrayView2;
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::context::PlotResult;
use crate::filters::Filters;

pub const LSST_COLOR: RGBColor = RGBColor(0x4c, 0x72, 0xb0);
pub const NMF_COLOR: RGBColor = RGBColor(0xc4, 0x4e, 0x52);
pub const ISOLATED_COLOR: RGBColor = RGBColor(0x55, 0xa8, 0x68);
pub const BAD_COLOR: RGBColor = RGBColor(0x81, 0x72, 0xb2);

/// Histogram edges (percent) used by the error histograms
pub const ERROR_BIN_EDGES: [f64; 6] = [0.0, 5.0, 10.0, 15.0, 20.0, 25.0];

/// Number of samples drawn by [`zscale`]
const ZSCALE_SAMPLES: usize = 1000;
const ZSCALE_CONTRAST: f64 = 0.25;

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// A named set of points drawn in one color
pub struct Series<'a> {
    pub label: &'a str,
    pub color: RGBColor,
    pub points: Vec<(f64, f64)>,
}

impl<'a> Series<'a> {
    pub fn new(label: &'a str, color: RGBColor, points: Vec<(f64, f64)>) -> Self {
        let points = points
            .into_iter()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect();
        Self {
            label,
            color,
            points,
        }
    }
}

/// Display limits for an astronomical image.
///
/// Sorts a regular sample of the finite pixels, fits a line to the sorted
/// values and widens the median by the slope over the contrast. The limits
/// are clamped to the sample range.
pub fn zscale(image: ArrayView2<f64>) -> Option<(f64, f64)> {
    let finite: Vec<f64> = image.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }

    let stride = (finite.len() / ZSCALE_SAMPLES).max(1);
    let mut samples: Vec<f64> = finite.iter().step_by(stride).copied().collect();
    samples.sort_by(|a, b| a.total_cmp(b));

    let n = samples.len();
    let (min, max) = (samples[0], samples[n - 1]);
    if n < 2 {
        return Some((min, max));
    }

    let center = (n - 1) as f64 / 2.0;
    let median = if n % 2 == 1 {
        samples[n / 2]
    } else {
        (samples[n / 2 - 1] + samples[n / 2]) / 2.0
    };

    // Least squares slope of value against sample rank
    let mean_v = samples.iter().sum::<f64>() / n as f64;
    let (num, den) = samples
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, &v)| {
            let di = i as f64 - center;
            (num + di * (v - mean_v), den + di * di)
        });
    let slope = num / den / ZSCALE_CONTRAST;

    let z1 = (median - center * slope).max(min);
    let z2 = (median + center * slope).min(max);
    Some((z1, z2))
}

/// Fraction of values falling in each bin of `edges`.
///
/// Values are clipped to the outer edges, so the last bin collects
/// everything beyond it. Non-finite values are skipped.
pub fn binned_fractions(values: &[f64], edges: &[f64]) -> Vec<f64> {
    let bins = edges.len().saturating_sub(1);
    let mut counts = vec![0usize; bins];
    if bins == 0 {
        return Vec::new();
    }

    let lo = edges[0];
    let hi = edges[bins];
    let mut total = 0usize;
    for &v in values.iter().filter(|v| v.is_finite()) {
        let v = v.clamp(lo, hi);
        let bin = edges[1..bins]
            .iter()
            .position(|&edge| v < edge)
            .unwrap_or(bins - 1);
        counts[bin] += 1;
        total += 1;
    }

    counts
        .into_iter()
        .map(|c| {
            if total == 0 {
                0.0
            } else {
                c as f64 / total as f64
            }
        })
        .collect()
}

/// Padded axis range covering `values`
fn axis_range<I: IntoIterator<Item = f64>>(values: I) -> Range<f64> {
    let (min, max) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !min.is_finite() {
        return 0.0..1.0;
    }
    let pad = ((max - min) * 0.05).max(1.0e-9);
    (min - pad)..(max + pad)
}

fn gray(t: f64) -> RGBColor {
    let v = (t.clamp(0.0, 1.0) * 255.0) as u8;
    RGBColor(v, v, v)
}

/// Fill the chart with image pixels, one unit square per pixel
fn draw_pixels<DB: DrawingBackend>(
    chart: &mut ChartContext<DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    image: ArrayView2<f64>,
    keep: impl Fn(usize, usize) -> bool,
    limits: (f64, f64),
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let (vmin, vmax) = limits;
    let span = (vmax - vmin).max(1.0e-12);
    let (rows, cols) = image.dim();

    let pixels = (0..rows)
        .flat_map(|y| (0..cols).map(move |x| (x, y)))
        .filter(|&(x, y)| keep(x, y))
        .map(|(x, y)| {
            let value = image[[y, x]];
            let t = if value.is_finite() {
                (value - vmin) / span
            } else {
                0.0
            };
            let (x, y) = (x as f64, y as f64);
            Rectangle::new([(x, y), (x + 1.0, y + 1.0)], gray(t).filled())
        });
    chart.draw_series(pixels)?;
    Ok(())
}

/// Total flux per filter of every undetected source, with the optional
/// background noise curve
pub fn draw_undetected_fluxes(
    area: &Area,
    filters: &Filters,
    fluxes: &[Vec<f64>],
    noise: Option<&[f64]>,
) -> PlotResult {
    let n = filters.len();
    let x_range = -0.25..(n.max(1) as f64 - 0.75);
    let y_range = axis_range(
        fluxes
            .iter()
            .flatten()
            .copied()
            .chain(noise.into_iter().flatten().copied()),
    );

    let mut chart = ChartBuilder::on(area)
        .caption("Undetected Sources", ("sans-serif", 25))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    let names: Vec<String> = filters.iter().map(str::to_string).collect();
    chart
        .configure_mesh()
        .x_desc("Filter")
        .y_desc("Total Flux")
        .x_labels(n.max(1))
        .x_label_formatter(&|x| {
            let idx = x.round();
            if (x - idx).abs() < 1.0e-6 && idx >= 0.0 {
                names.get(idx as usize).cloned().unwrap_or_default()
            } else {
                String::new()
            }
        })
        .draw()?;

    for (i, source) in fluxes.iter().enumerate() {
        let points: Vec<(f64, f64)> = source
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_finite())
            .map(|(fidx, &f)| (fidx as f64, f))
            .collect();
        chart.draw_series(
            points
                .iter()
                .map(|&p| Circle::new(p, 3, LSST_COLOR.filled())),
        )?;
        let line = chart.draw_series(LineSeries::new(points, &LSST_COLOR))?;
        if i == 0 {
            line.label("Not Detected")
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], LSST_COLOR));
        }
    }

    if let Some(noise) = noise {
        let points: Vec<(f64, f64)> = noise
            .iter()
            .enumerate()
            .map(|(fidx, &v)| (fidx as f64, v))
            .collect();
        chart.draw_series(points.iter().map(|&p| Circle::new(p, 3, NMF_COLOR.filled())))?;
        chart
            .draw_series(LineSeries::new(points, &NMF_COLOR))?
            .label("Background")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], NMF_COLOR));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}

/// Marker positions inside a parent cutout, relative to its lower corner
#[derive(Debug, Default, Clone)]
pub struct CutoutMarkers {
    pub matched: Vec<(f64, f64)>,
    pub unmatched: Vec<(f64, f64)>,
    pub sims: Vec<(f64, f64)>,
}

/// Parent cutout with matched (green ×), unmatched (red ×) and
/// simulated (cyan ○) markers
pub fn draw_parent_cutout(
    area: &Area,
    title: &str,
    cutout: ArrayView2<f64>,
    markers: &CutoutMarkers,
) -> PlotResult {
    let (rows, cols) = cutout.dim();
    let limits = match zscale(cutout) {
        Some((vmin, vmax)) => (vmin, 10.0 * vmax),
        None => (0.0, 1.0),
    };

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(30)
        .build_cartesian_2d(0.0..cols as f64, 0.0..rows as f64)?;
    chart.configure_mesh().disable_mesh().draw()?;

    draw_pixels(&mut chart, cutout, |_, _| true, limits)?;

    // Markers sit at pixel centers
    let center = |&(x, y): &(f64, f64)| (x + 0.5, y + 0.5);
    chart.draw_series(
        markers
            .matched
            .iter()
            .map(|p| Cross::new(center(p), 5, GREEN.stroke_width(2))),
    )?;
    chart.draw_series(
        markers
            .sims
            .iter()
            .map(|p| Circle::new(center(p), 10, CYAN.stroke_width(2))),
    )?;
    chart.draw_series(
        markers
            .unmatched
            .iter()
            .map(|p| Cross::new(center(p), 5, RED.stroke_width(2))),
    )?;
    Ok(())
}

/// Footprint cutout with pixels outside the footprint left blank
pub fn draw_masked_cutout(
    area: &Area,
    title: &str,
    cutout: ArrayView2<f64>,
    footprint_mask: ArrayView2<bool>,
) -> PlotResult {
    let (rows, cols) = cutout.dim();
    let inside: Vec<f64> = cutout
        .iter()
        .zip(footprint_mask.iter())
        .filter(|(_, &m)| m)
        .map(|(&v, _)| v)
        .filter(|v| v.is_finite())
        .collect();
    let range = axis_range(inside);

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(30)
        .build_cartesian_2d(0.0..cols as f64, 0.0..rows as f64)?;
    chart.configure_mesh().disable_mesh().draw()?;

    draw_pixels(
        &mut chart,
        cutout,
        |x, y| footprint_mask[[y, x]],
        (range.start, range.end),
    )?;
    Ok(())
}

/// Grouped histogram of error fractions, one bar group per bin
pub fn draw_error_histogram(
    area: &Area,
    title: &str,
    edges: &[f64],
    series: &[(&str, RGBColor, Vec<f64>)],
) -> PlotResult {
    let bins = edges.len().saturating_sub(1);
    if bins == 0 {
        return Err("histogram needs at least two edges".into());
    }
    let lo = edges[0];
    let hi = edges[bins];
    let y_max = series
        .iter()
        .flat_map(|(_, _, fractions)| fractions.iter().copied())
        .fold(0.0f64, f64::max)
        .max(0.1)
        * 1.1;

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 25))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(lo..hi, 0.0..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Error (%)")
        .y_desc("Fraction of Sources")
        .x_labels(bins + 1)
        .x_label_formatter(&|x| {
            if *x >= hi {
                format!("{x:.0}+")
            } else {
                format!("{x:.0}")
            }
        })
        .y_label_formatter(&|y| format!("{y:.2}"))
        .draw()?;

    let groups = series.len().max(1) as f64;
    for (s, (label, color, fractions)) in series.iter().enumerate() {
        let color = *color;
        let bars = fractions.iter().enumerate().take(bins).map(move |(b, &frac)| {
            let width = (edges[b + 1] - edges[b]) / (groups + 1.0);
            let x0 = edges[b] + width * (0.5 + s as f64);
            Rectangle::new([(x0, 0.0), (x0 + width, frac)], color.filled())
        });
        chart
            .draw_series(bars)?
            .label(*label)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}

/// Scatter plot of (simulated flux, fractional error) point sets
pub fn draw_error_scatter(
    area: &Area,
    title: &str,
    x_desc: &str,
    series: &[Series],
) -> PlotResult {
    let x_range = axis_range(series.iter().flat_map(|s| s.points.iter().map(|p| p.0)));
    let y_range = axis_range(series.iter().flat_map(|s| s.points.iter().map(|p| p.1)));

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 25))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc("Fractional Error")
        .y_label_formatter(&|y| format!("{y:.2}"))
        .draw()?;

    for s in series {
        let color = s.color;
        chart
            .draw_series(
                s.points
                    .iter()
                    .map(move |&p| Circle::new(p, 2, color.mix(0.6).filled())),
            )?
            .label(s.label)
            .legend(move |(x, y)| Circle::new((x + 5, y), 3, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}

/// Side-by-side scatter panels sharing one x description
pub fn draw_faceted_scatter(
    area: &Area,
    x_desc: &str,
    panels: &[(&str, Vec<Series>)],
) -> PlotResult {
    let cells = area.split_evenly((1, panels.len().max(1)));
    for (cell, (title, series)) in cells.iter().zip(panels) {
        draw_error_scatter(cell, title, x_desc, series)?;
    }
    Ok(())
}
