use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Single-frame raster grid (row x column)
pub type Grid = Array2<f32>;

/// Time-stacked raster grid (time x row x column)
pub type GridStack = Array3<f32>;

/// Boolean pixel mask for one frame
pub type MaskGrid = Array2<bool>;

/// Boolean pixel mask over a time stack
pub type MaskStack = Array3<bool>;

/// Categorical QA codes over a time stack
pub type QaStack = Array3<u8>;

/// Per-pixel classification labels (water = 1, non-water = 0, nodata sentinel otherwise)
pub type LabelGrid = Array2<i16>;

/// Conventional nodata sentinel for surface-reflectance products
pub const NO_DATA: f32 = -9999.0;

/// Satellite platforms whose products this engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Landsat5,
    Landsat7,
    Landsat8,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Landsat5 => write!(f, "LANDSAT_5"),
            Platform::Landsat7 => write!(f, "LANDSAT_7"),
            Platform::Landsat8 => write!(f, "LANDSAT_8"),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = MosaicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LANDSAT_5" => Ok(Platform::Landsat5),
            "LANDSAT_7" => Ok(Platform::Landsat7),
            "LANDSAT_8" => Ok(Platform::Landsat8),
            _ => Err(MosaicError::UnsupportedPlatform(s.to_string())),
        }
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// Geospatial transformation parameters, GDAL ordering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

/// One geographic chunk of a multi-band time series.
///
/// Every band shares a single (time, row, column) shape with the QA stack;
/// acquisition times are ascending. Both invariants are checked at
/// construction so the reduction kernels can index freely.
#[derive(Debug, Clone)]
pub struct RasterTile {
    bands: HashMap<String, GridStack>,
    qa: QaStack,
    times: Vec<DateTime<Utc>>,
    latitudes: Array1<f64>,
    longitudes: Array1<f64>,
}

impl RasterTile {
    pub fn new(
        bands: HashMap<String, GridStack>,
        qa: QaStack,
        times: Vec<DateTime<Utc>>,
        latitudes: Array1<f64>,
        longitudes: Array1<f64>,
    ) -> MosaicResult<Self> {
        let shape = qa.dim();
        for (name, stack) in &bands {
            if stack.dim() != shape {
                return Err(MosaicError::ShapeMismatch(format!(
                    "band '{}' has shape {:?}, QA stack has {:?}",
                    name,
                    stack.dim(),
                    shape
                )));
            }
        }
        if times.len() != shape.0 {
            return Err(MosaicError::ShapeMismatch(format!(
                "{} acquisition times for {} time slices",
                times.len(),
                shape.0
            )));
        }
        if times.windows(2).any(|w| w[0] > w[1]) {
            return Err(MosaicError::InvalidInput(
                "acquisition times must be ascending".to_string(),
            ));
        }
        if latitudes.len() != shape.1 || longitudes.len() != shape.2 {
            return Err(MosaicError::ShapeMismatch(format!(
                "coordinate vectors ({}, {}) do not match grid shape ({}, {})",
                latitudes.len(),
                longitudes.len(),
                shape.1,
                shape.2
            )));
        }
        Ok(Self {
            bands,
            qa,
            times,
            latitudes,
            longitudes,
        })
    }

    pub fn bands(&self) -> &HashMap<String, GridStack> {
        &self.bands
    }

    pub fn band(&self, name: &str) -> MosaicResult<&GridStack> {
        self.bands
            .get(name)
            .ok_or_else(|| MosaicError::MissingBand(name.to_string()))
    }

    /// Band names in deterministic (sorted) order
    pub fn band_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn qa(&self) -> &QaStack {
        &self.qa
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    pub fn latitudes(&self) -> &Array1<f64> {
        &self.latitudes
    }

    pub fn longitudes(&self) -> &Array1<f64> {
        &self.longitudes
    }

    /// Number of time slices in the stack
    pub fn time_len(&self) -> usize {
        self.qa.dim().0
    }

    /// (row, column) shape shared by all frames
    pub fn grid_shape(&self) -> (usize, usize) {
        let (_, rows, cols) = self.qa.dim();
        (rows, cols)
    }
}

/// Error types for mosaic and classification operations
#[derive(Debug, thiserror::Error)]
pub enum MosaicError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Missing band: {0}")]
    MissingBand(String),

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for mosaic operations
pub type MosaicResult<T> = Result<T, MosaicError>;
