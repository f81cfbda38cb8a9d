//! Deblender validation against simulated source catalogs
//!
//! This crate loads simulated ("ground truth") catalogs, matches detected
//! peaks to simulated sources, measures per-peak fluxes from the deblender
//! outputs and compares fluxes and SEDs with the simulation. Detection,
//! deblending and PSF modelling are external and enter through the types in
//! [`footprint`], [`exposure`] and the [`flux::Deblender`] and
//! [`flux::TemplateSource`] traits.

pub mod catalog;
pub mod compare;
pub mod config;
pub mod context;
pub mod exposure;
pub mod filters;
pub mod flux;
pub mod footprint;
pub mod matcher;
pub mod noise;
pub mod peak_table;
pub mod plots;
pub mod sed;

#[cfg(test)]
mod test_util;

// Re-exports for easier access
pub use catalog::{load_sim_catalog, CatalogError, CatalogTable, RawCatalog, SimSource, SimTable};
pub use compare::{compare_meas_to_sim, CompareConfig, CompareError, Comparison, MatchSummary};
pub use config::{AnalysisConfig, ConfigError};
pub use context::{PlotOutput, RunContext};
pub use exposure::{Exposure, ExposureError, GaussianPsf};
pub use filters::Filters;
pub use flux::{
    apply_deblender_fluxes, deblend_blends, is_flux_outlier, isolated_fluxes, nmf_fluxes,
    Deblender, DeblenderResult, FluxError, OutlierConfig, TemplateSource,
};
pub use footprint::{BBox, DetectedSource, Footprint, FootprintError, Peak};
pub use matcher::{
    match_to_reference, MatchConfig, MatchError, MatchResult, MatchRow, MatchTable, SimMatch,
};
pub use noise::estimate_noise;
pub use peak_table::{FluxTable, PeakRow, PeakTable, TableError};
pub use sed::{calculate_seds, Seds};
