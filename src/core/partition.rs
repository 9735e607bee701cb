use crate::types::{MosaicError, MosaicResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Landsat 7 pixel size in degrees, the default boundary trim unit
pub const DEFAULT_RESOLUTION: f64 = 0.000269;

/// How a (extent, acquisition list) request is cut into sub-tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionParams {
    /// One pixel in degrees; internal strip boundaries are trimmed by this
    pub resolution: f64,
    /// (lower, upper) latitude range; None means unrestricted
    pub latitude: Option<(f64, f64)>,
    /// (lower, upper) longitude range; None means unrestricted
    pub longitude: Option<(f64, f64)>,
    /// Maximum square-degree area per geographic chunk
    pub geo_chunk_size: Option<f64>,
    /// Target number of acquisition groups
    pub time_chunks: Option<usize>,
    /// Flip the acquisition list (oldest-first <-> newest-first) before grouping
    pub reverse_time: bool,
}

impl Default for PartitionParams {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            latitude: None,
            longitude: None,
            geo_chunk_size: None,
            time_chunks: None,
            reverse_time: false,
        }
    }
}

/// Parallel lists of geographic sub-ranges plus grouped acquisitions.
///
/// `lat_ranges` and `lon_ranges` always have equal length; a `None` entry
/// means the corresponding axis is unrestricted. Every geographic chunk is
/// paired with every entry of `time_ranges` by the caller.
#[derive(Debug, Clone)]
pub struct TaskPartition {
    pub lat_ranges: Vec<Option<(f64, f64)>>,
    pub lon_ranges: Vec<Option<(f64, f64)>>,
    pub time_ranges: Vec<Vec<DateTime<Utc>>>,
}

/// Split a request into geographic strips and acquisition groups.
///
/// Oversized extents are cut along latitude only, into ceil(area / max)
/// equal-height strips that inherit the full longitude range. The upper
/// bound of every strip but the last is pulled in by one resolution unit
/// so adjacent strips never double-cover a boundary row. Requests without
/// a lat/lon extent collapse to a single unrestricted chunk.
pub fn split_task(
    params: &PartitionParams,
    acquisitions: &[DateTime<Utc>],
) -> MosaicResult<TaskPartition> {
    let mut lat_ranges = Vec::new();
    let mut lon_ranges = Vec::new();

    match (params.latitude, params.longitude) {
        (Some(lat), Some(lon)) => {
            if lat.1 < lat.0 || lon.1 < lon.0 {
                return Err(MosaicError::InvalidInput(format!(
                    "inverted extent: lat {:?}, lon {:?}",
                    lat, lon
                )));
            }
            let square_area = (lon.1 - lon.0) * (lat.1 - lat.0);
            log::debug!("square area of request: {}", square_area);

            match params.geo_chunk_size {
                Some(size) if size <= 0.0 => {
                    return Err(MosaicError::InvalidInput(
                        "geo_chunk_size must be positive".to_string(),
                    ));
                }
                Some(size) if square_area > size => {
                    let chunks = (square_area / size).ceil() as usize;
                    let strip_height = (lat.1 - lat.0) / chunks as f64;
                    for i in 0..chunks {
                        let lower = lat.0 + i as f64 * strip_height;
                        let mut upper = lat.0 + (i + 1) as f64 * strip_height;
                        if i != chunks - 1 {
                            upper -= params.resolution;
                        }
                        lat_ranges.push(Some((lower, upper)));
                        lon_ranges.push(Some(lon));
                    }
                }
                _ => {
                    lat_ranges.push(Some(lat));
                    lon_ranges.push(Some(lon));
                }
            }
        }
        // No extent given: one chunk over the unrestricted extent
        _ => {
            lat_ranges.push(None);
            lon_ranges.push(None);
        }
    }

    let mut ordered = acquisitions.to_vec();
    if params.reverse_time {
        ordered.reverse();
    }
    let time_ranges = match params.time_chunks {
        Some(0) => {
            return Err(MosaicError::InvalidInput(
                "time_chunks must be positive".to_string(),
            ));
        }
        Some(chunks) if !ordered.is_empty() => {
            let group_size = (ordered.len() + chunks - 1) / chunks;
            ordered.chunks(group_size).map(<[_]>::to_vec).collect()
        }
        _ => vec![ordered],
    };

    log::debug!(
        "split into {} geographic and {} time chunks",
        lat_ranges.len(),
        time_ranges.len()
    );
    Ok(TaskPartition {
        lat_ranges,
        lon_ranges,
        time_ranges,
    })
}
