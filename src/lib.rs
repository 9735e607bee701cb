//! mosaicker: incremental satellite mosaic compositing and water classification
//!
//! This library reduces time-ordered stacks of multi-band Landsat tiles to
//! single-frame composites and water products, chunk by chunk, so a full
//! time series never has to sit in memory at once. The orchestration layer
//! (task queue, persistence, tile fetch) lives outside; this crate is the
//! pure per-pixel reduction engine plus thin Python bindings for it.

use numpy::{IntoPyArray, PyArray2, PyArray3, PyReadonlyArray2, PyReadonlyArray3};
use pyo3::prelude::*;

pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, GeoTransform, Grid, GridStack, LabelGrid, MaskGrid, MaskStack, MosaicError,
    MosaicResult, Platform, QaStack, RasterTile, NO_DATA,
};

pub use crate::core::{
    classify_water_from_qa, composite, derive_clean_mask, derive_clean_mask_slice,
    derive_water_mask, mask_tsm, merge_aggregate, split_task, tsm, wofs_classify,
    AggregateAccumulator, CompositeAccumulator, MosaicStrategy, PartitionParams, Precision,
    QaCode, TaskPartition,
};

pub use io::{RasterSink, TileQuery, TileSource};

fn to_py_err(e: MosaicError) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e))
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(py_derive_clean_mask, m)?)?;
    m.add_function(wrap_pyfunction!(py_wofs_classify, m)?)?;
    m.add_function(wrap_pyfunction!(py_merge_aggregate, m)?)?;
    m.add_function(wrap_pyfunction!(py_split_task, m)?)?;
    m.add("NO_DATA", NO_DATA)?;
    Ok(())
}

/// Clean mask over a QA stack: true where the code is not cloud shadow,
/// snow, cloud, or fill.
#[pyfunction]
#[pyo3(name = "derive_clean_mask")]
fn py_derive_clean_mask<'py>(
    py: Python<'py>,
    qa: PyReadonlyArray3<'py, u8>,
) -> &'py PyArray3<bool> {
    core::derive_clean_mask(&qa.as_array().to_owned()).into_pyarray(py)
}

/// WOFS water classification of one time slice. `bands` stacks band 1-5
/// and band 7 along the first axis.
#[pyfunction]
#[pyo3(
    name = "wofs_classify",
    signature = (bands, clean_mask, no_data = -9999.0, platform = "LANDSAT_7", enforce_float64 = false)
)]
fn py_wofs_classify<'py>(
    py: Python<'py>,
    bands: PyReadonlyArray3<'py, f32>,
    clean_mask: PyReadonlyArray2<'py, bool>,
    no_data: f32,
    platform: &str,
    enforce_float64: bool,
) -> PyResult<&'py PyArray2<i16>> {
    let platform: Platform = platform.parse().map_err(to_py_err)?;
    let labels = core::wofs_classify(
        &bands.as_array().to_owned(),
        &clean_mask.as_array().to_owned(),
        no_data,
        platform,
        Precision::for_input(enforce_float64),
    )
    .map_err(to_py_err)?;
    Ok(labels.into_pyarray(py))
}

/// Fold one chunk into the running time-series aggregate. Returns
/// (total_data, total_clean, normalized) grids.
#[pyfunction]
#[pyo3(
    name = "merge_aggregate",
    signature = (data, no_data = -9999.0, prior_total_data = None, prior_total_clean = None)
)]
fn py_merge_aggregate<'py>(
    py: Python<'py>,
    data: PyReadonlyArray3<'py, f32>,
    no_data: f32,
    prior_total_data: Option<PyReadonlyArray2<'py, f64>>,
    prior_total_clean: Option<PyReadonlyArray2<'py, f64>>,
) -> PyResult<(&'py PyArray2<f64>, &'py PyArray2<f64>, &'py PyArray2<f64>)> {
    let prior = match (prior_total_data, prior_total_clean) {
        (Some(sum), Some(count)) => Some(AggregateAccumulator {
            total_data: sum.as_array().to_owned(),
            total_clean: count.as_array().to_owned(),
        }),
        (None, None) => None,
        _ => {
            return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(
                "prior_total_data and prior_total_clean must be given together",
            ))
        }
    };
    let acc = core::merge_aggregate(prior, &data.as_array().to_owned(), no_data)
        .map_err(to_py_err)?;
    let normalized = acc.normalized().into_pyarray(py);
    Ok((
        acc.total_data.into_pyarray(py),
        acc.total_clean.into_pyarray(py),
        normalized,
    ))
}

/// Split an extent and acquisition list (epoch seconds) into sub-tasks.
#[pyfunction]
#[pyo3(
    name = "split_task",
    signature = (
        acquisitions,
        latitude = None,
        longitude = None,
        geo_chunk_size = None,
        time_chunks = None,
        reverse_time = false,
        resolution = core::DEFAULT_RESOLUTION
    )
)]
#[allow(clippy::too_many_arguments)]
fn py_split_task(
    acquisitions: Vec<i64>,
    latitude: Option<(f64, f64)>,
    longitude: Option<(f64, f64)>,
    geo_chunk_size: Option<f64>,
    time_chunks: Option<usize>,
    reverse_time: bool,
    resolution: f64,
) -> PyResult<(
    Vec<Option<(f64, f64)>>,
    Vec<Option<(f64, f64)>>,
    Vec<Vec<i64>>,
)> {
    use chrono::TimeZone;

    let times = acquisitions
        .iter()
        .map(|&secs| {
            chrono::Utc.timestamp_opt(secs, 0).single().ok_or_else(|| {
                PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                    "invalid epoch timestamp {}",
                    secs
                ))
            })
        })
        .collect::<PyResult<Vec<_>>>()?;

    let params = PartitionParams {
        resolution,
        latitude,
        longitude,
        geo_chunk_size,
        time_chunks,
        reverse_time,
    };
    let part = core::split_task(&params, &times).map_err(to_py_err)?;
    let time_ranges = part
        .time_ranges
        .into_iter()
        .map(|group| group.into_iter().map(|t| t.timestamp()).collect())
        .collect();
    Ok((part.lat_ranges, part.lon_ranges, time_ranges))
}
