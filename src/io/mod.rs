//! Collaborator seams: tile fetch and raster persistence.
//!
//! The engine itself never touches the network or the filesystem; the
//! orchestration layer supplies implementations of these traits and drives
//! the chunked reduction loop with the tiles they return.

use crate::types::{GeoTransform, Grid, MosaicResult, Platform, RasterTile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A (platform, product, time range, extent, band list) request that the
/// upstream data-access layer resolves into one raster tile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileQuery {
    pub platform: Platform,
    pub product: String,
    pub time_range: (DateTime<Utc>, DateTime<Utc>),
    /// (lower, upper) latitude range; None loads the full product extent
    pub latitude: Option<(f64, f64)>,
    /// (lower, upper) longitude range; None loads the full product extent
    pub longitude: Option<(f64, f64)>,
    pub bands: Vec<String>,
}

/// Upstream data-access layer returning raster tiles for a query
pub trait TileSource {
    fn load_tile(&self, query: &TileQuery) -> MosaicResult<RasterTile>;

    /// Acquisition timestamps available for the query, ascending
    fn list_acquisitions(&self, query: &TileQuery) -> MosaicResult<Vec<DateTime<Utc>>>;
}

/// Raster persistence accepting finished single-frame products
pub trait RasterSink {
    fn save_bands(
        &mut self,
        name: &str,
        bands: &HashMap<String, Grid>,
        geo_transform: &GeoTransform,
        spatial_ref: &str,
    ) -> MosaicResult<()>;
}
