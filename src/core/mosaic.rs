use crate::types::{Grid, MaskStack, MosaicError, MosaicResult, RasterTile};
use ndarray::{s, Array2, Zip};
use rayon::prelude::*;
use std::collections::HashMap;

/// Available compositing strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MosaicStrategy {
    /// Most recent clean observation wins
    MostRecent,
    /// Per-pixel median over all clean observations (single pass only)
    Median,
    /// Observation with the highest NDVI wins
    MaxNdvi,
    /// Observation with the lowest NDVI wins
    MinNdvi,
}

impl MosaicStrategy {
    /// Whether the strategy supports chunk-by-chunk accumulator merging.
    ///
    /// A true streaming median would need every clean value per pixel, so
    /// the median strategy is single-pass only.
    pub fn supports_incremental(self) -> bool {
        !matches!(self, MosaicStrategy::Median)
    }
}

impl std::str::FromStr for MosaicStrategy {
    type Err = MosaicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "most_recent" => Ok(MosaicStrategy::MostRecent),
            "median" => Ok(MosaicStrategy::Median),
            "max_ndvi" => Ok(MosaicStrategy::MaxNdvi),
            "min_ndvi" => Ok(MosaicStrategy::MinNdvi),
            other => Err(MosaicError::InvalidInput(format!(
                "unknown mosaic strategy '{}'",
                other
            ))),
        }
    }
}

/// NDVI sentinel given to masked pixels so they never win the comparison
const NDVI_MASKED_MAX: f32 = -1.0e9;
const NDVI_MASKED_MIN: f32 = 1.0e9;

/// Running result of a composite reduction.
///
/// Holds one (row, column) grid per band, with cells still at the nodata
/// sentinel counting as empty. The NDVI strategies additionally carry the
/// winning score per pixel as merge tie-break state. The accumulator is
/// owned by the caller driving the incremental loop; the engine never
/// retains it between calls.
#[derive(Debug, Clone)]
pub struct CompositeAccumulator {
    bands: HashMap<String, Grid>,
    ndvi: Option<Grid>,
    no_data: f32,
}

impl CompositeAccumulator {
    pub fn bands(&self) -> &HashMap<String, Grid> {
        &self.bands
    }

    pub fn band(&self, name: &str) -> MosaicResult<&Grid> {
        self.bands
            .get(name)
            .ok_or_else(|| MosaicError::MissingBand(name.to_string()))
    }

    /// Winning NDVI scores (NDVI strategies only)
    pub fn ndvi(&self) -> Option<&Grid> {
        self.ndvi.as_ref()
    }

    pub fn no_data(&self) -> f32 {
        self.no_data
    }

    pub fn into_bands(self) -> HashMap<String, Grid> {
        self.bands
    }

    fn empty(tile: &RasterTile, no_data: f32, ndvi_sentinel: Option<f32>) -> Self {
        let shape = tile.grid_shape();
        let bands = tile
            .bands()
            .keys()
            .map(|name| (name.clone(), Grid::from_elem(shape, no_data)))
            .collect();
        Self {
            bands,
            ndvi: ndvi_sentinel.map(|v| Grid::from_elem(shape, v)),
            no_data,
        }
    }

    fn check_compatible(&self, tile: &RasterTile) -> MosaicResult<()> {
        let shape = tile.grid_shape();
        for name in tile.bands().keys() {
            let grid = self.band(name)?;
            if grid.dim() != shape {
                return Err(MosaicError::ShapeMismatch(format!(
                    "accumulator band '{}' has shape {:?}, tile grids are {:?}",
                    name,
                    grid.dim(),
                    shape
                )));
            }
        }
        Ok(())
    }
}

/// Reduce one tile chunk to a composite, folding into `prior` when given.
///
/// For the incremental strategies the prior accumulator carries the result
/// of all chunks processed so far. The most-recent strategy requires chunks
/// to be supplied newest-first: only cells still at the sentinel are ever
/// written, so presenting an older chunk first silently claims pixels the
/// newer chunk should own.
pub fn composite(
    tile: &RasterTile,
    clean_mask: &MaskStack,
    no_data: f32,
    strategy: MosaicStrategy,
    prior: Option<CompositeAccumulator>,
) -> MosaicResult<CompositeAccumulator> {
    if clean_mask.dim() != tile.qa().dim() {
        return Err(MosaicError::ShapeMismatch(format!(
            "clean mask has shape {:?}, tile stacks have {:?}",
            clean_mask.dim(),
            tile.qa().dim()
        )));
    }
    if prior.is_some() && !strategy.supports_incremental() {
        return Err(MosaicError::UnsupportedConfiguration(
            "median composite cannot be merged incrementally; \
             process the full time series in one pass"
                .to_string(),
        ));
    }
    if let Some(acc) = &prior {
        acc.check_compatible(tile)?;
    }

    log::debug!(
        "compositing {} slices x {} bands with {:?}",
        tile.time_len(),
        tile.bands().len(),
        strategy
    );

    match strategy {
        MosaicStrategy::MostRecent => most_recent_composite(tile, clean_mask, no_data, prior),
        MosaicStrategy::Median => median_composite(tile, clean_mask, no_data),
        MosaicStrategy::MaxNdvi => ndvi_composite(tile, clean_mask, no_data, prior, true),
        MosaicStrategy::MinNdvi => ndvi_composite(tile, clean_mask, no_data, prior, false),
    }
}

/// Latest-to-earliest scan; the first clean value locks a pixel for good.
fn most_recent_composite(
    tile: &RasterTile,
    clean_mask: &MaskStack,
    no_data: f32,
    prior: Option<CompositeAccumulator>,
) -> MosaicResult<CompositeAccumulator> {
    let mut acc = prior.unwrap_or_else(|| CompositeAccumulator::empty(tile, no_data, None));

    for t in (0..tile.time_len()).rev() {
        let mask = clean_mask.slice(s![t, .., ..]);
        for (name, stack) in tile.bands() {
            let slice = stack.slice(s![t, .., ..]);
            let out = acc
                .bands
                .get_mut(name)
                .ok_or_else(|| MosaicError::MissingBand(name.clone()))?;
            Zip::from(out)
                .and(&slice)
                .and(&mask)
                .for_each(|cell, &value, &clean| {
                    if *cell == no_data && clean && value != no_data {
                        *cell = value;
                    }
                });
        }
    }
    Ok(acc)
}

/// Per-pixel, per-band median over clean observations; bands in parallel.
fn median_composite(
    tile: &RasterTile,
    clean_mask: &MaskStack,
    no_data: f32,
) -> MosaicResult<CompositeAccumulator> {
    let (rows, cols) = tile.grid_shape();
    let entries: Vec<(&String, &crate::types::GridStack)> = tile.bands().iter().collect();

    let bands: HashMap<String, Grid> = entries
        .into_par_iter()
        .map(|(name, stack)| {
            let mut out = Grid::from_elem((rows, cols), no_data);
            let mut values: Vec<f32> = Vec::with_capacity(tile.time_len());
            for i in 0..rows {
                for j in 0..cols {
                    values.clear();
                    for t in 0..tile.time_len() {
                        let v = stack[[t, i, j]];
                        if clean_mask[[t, i, j]] && v != no_data {
                            values.push(v);
                        }
                    }
                    if !values.is_empty() {
                        out[[i, j]] = median_of(&mut values);
                    }
                }
            }
            (name.clone(), out)
        })
        .collect();

    Ok(CompositeAccumulator {
        bands,
        ndvi: None,
        no_data,
    })
}

fn median_of(values: &mut [f32]) -> f32 {
    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Select the slice that extremizes NDVI per pixel.
///
/// Replacement is on strict improvement only, so equal scores keep the
/// earlier observation within a chunk and the earlier-processed chunk
/// across merges.
fn ndvi_composite(
    tile: &RasterTile,
    clean_mask: &MaskStack,
    no_data: f32,
    prior: Option<CompositeAccumulator>,
    maximize: bool,
) -> MosaicResult<CompositeAccumulator> {
    let nir = tile.band("nir")?;
    let red = tile.band("red")?;
    let sentinel = if maximize {
        NDVI_MASKED_MAX
    } else {
        NDVI_MASKED_MIN
    };

    let mut acc = match prior {
        Some(acc) => {
            if acc.ndvi.is_none() {
                return Err(MosaicError::InvalidInput(
                    "prior accumulator carries no NDVI scores".to_string(),
                ));
            }
            acc
        }
        None => CompositeAccumulator::empty(tile, no_data, Some(sentinel)),
    };

    let (rows, cols) = tile.grid_shape();
    for t in 0..tile.time_len() {
        let mask = clean_mask.slice(s![t, .., ..]);
        let nir_t = nir.slice(s![t, .., ..]);
        let red_t = red.slice(s![t, .., ..]);

        let mut score = Array2::<f32>::from_elem((rows, cols), sentinel);
        Zip::from(&mut score)
            .and(&nir_t)
            .and(&red_t)
            .and(&mask)
            .for_each(|s, &n, &r, &clean| {
                if clean && n != no_data && r != no_data {
                    let denom = n + r;
                    *s = if denom == 0.0 { 0.0 } else { (n - r) / denom };
                }
            });

        // Strict inequality: ties keep what the accumulator already holds
        let best = acc.ndvi.as_mut().ok_or_else(|| {
            MosaicError::InvalidInput("NDVI accumulator state missing".to_string())
        })?;
        let improved = if maximize {
            Zip::from(&score).and(&*best).map_collect(|&s, &b| s > b)
        } else {
            Zip::from(&score).and(&*best).map_collect(|&s, &b| s < b)
        };

        for (name, stack) in tile.bands() {
            let slice = stack.slice(s![t, .., ..]);
            let out = acc
                .bands
                .get_mut(name)
                .ok_or_else(|| MosaicError::MissingBand(name.clone()))?;
            Zip::from(out)
                .and(&slice)
                .and(&improved)
                .for_each(|cell, &value, &win| {
                    if win {
                        *cell = value;
                    }
                });
        }
        let best = acc.ndvi.as_mut().ok_or_else(|| {
            MosaicError::InvalidInput("NDVI accumulator state missing".to_string())
        })?;
        Zip::from(best)
            .and(&score)
            .and(&improved)
            .for_each(|b, &s, &win| {
                if win {
                    *b = s;
                }
            });
    }
    Ok(acc)
}
