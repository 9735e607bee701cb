use crate::core::timeseries::AggregateAccumulator;
use crate::types::{GridStack, MaskStack, MosaicError, MosaicResult, RasterTile};
use ndarray::{s, Array2, Zip};

/// Water frequency a pixel must exceed before TSM is trusted there
const WATER_FREQUENCY_THRESHOLD: f64 = 0.8;

/// TSM index: mean of red and green reflectance, scaled to the 0-1
/// reflectance range of Landsat 7 surface products.
fn tsmi(red: f64, green: f64) -> f64 {
    (red + green) * 0.0001 / 2.0
}

/// Per-slice total-suspended-matter estimate, `3983 * tsmi^1.6246`.
///
/// Unclean pixels get `no_data`; TSM products conventionally use 0 here
/// rather than -9999 since the estimate feeds a time-series average.
pub fn tsm(tile: &RasterTile, clean_mask: &MaskStack, no_data: f32) -> MosaicResult<GridStack> {
    if clean_mask.dim() != tile.qa().dim() {
        return Err(MosaicError::ShapeMismatch(format!(
            "clean mask has shape {:?}, tile stacks have {:?}",
            clean_mask.dim(),
            tile.qa().dim()
        )));
    }
    let red = tile.band("red")?;
    let green = tile.band("green")?;

    log::debug!("computing TSM for {} slices", tile.time_len());

    let mut out = GridStack::from_elem(tile.qa().dim(), no_data);
    Zip::from(&mut out)
        .and(red)
        .and(green)
        .and(clean_mask)
        .for_each(|cell, &r, &g, &clean| {
            if clean {
                *cell = (3983.0 * tsmi(r as f64, g as f64).powf(1.6246)) as f32;
            }
        });
    Ok(out)
}

/// Restrict a TSM aggregate to pixels that are reliably open water.
///
/// A pixel qualifies when its own WOFS water frequency and that of all
/// eight neighbours exceed 0.8 (the 3x3 convolution over the
/// disqualification grid; borders are zero-padded and so only depend on
/// their in-grid neighbours). Disqualified pixels have their clean count
/// zeroed, which drives the normalized ratio to 0 as well; the raw
/// accumulated sum is left in place.
pub fn mask_tsm(
    aggregate: &AggregateAccumulator,
    wofs: &AggregateAccumulator,
) -> MosaicResult<AggregateAccumulator> {
    let shape = aggregate.total_clean.dim();
    if wofs.total_clean.dim() != shape {
        return Err(MosaicError::ShapeMismatch(format!(
            "TSM aggregate is {:?}, WOFS aggregate is {:?}",
            shape,
            wofs.total_clean.dim()
        )));
    }

    let frequency = wofs.normalized();
    let disqualified = frequency.mapv(|f| f <= WATER_FREQUENCY_THRESHOLD);
    let spread = spread_3x3(&disqualified);

    let mut out = aggregate.clone();
    Zip::from(&mut out.total_clean)
        .and(&spread)
        .for_each(|count, &bad| {
            if bad {
                *count = 0.0;
            }
        });
    Ok(out)
}

/// Dilate a boolean grid by one pixel in every direction (3x3 box)
fn spread_3x3(mask: &Array2<bool>) -> Array2<bool> {
    let (rows, cols) = mask.dim();
    let mut out = Array2::from_elem((rows, cols), false);
    for i in 0..rows {
        for j in 0..cols {
            if !mask[[i, j]] {
                continue;
            }
            let i0 = i.saturating_sub(1);
            let j0 = j.saturating_sub(1);
            let i1 = (i + 1).min(rows - 1);
            let j1 = (j + 1).min(cols - 1);
            out.slice_mut(s![i0..=i1, j0..=j1]).fill(true);
        }
    }
    out
}
