//! Numeric building blocks for deblender validation.
//!
//! - [`kdtree`]: nearest-neighbour matching of detected peaks to reference sources
//! - [`stats`]: median, mean, scatter and RMS helpers

pub mod kdtree;
pub mod stats;

pub use kdtree::{KdTree, KdTreeError, Neighbor};
pub use stats::StatsError;
