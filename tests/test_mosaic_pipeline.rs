//! Chunked reduction pipeline: partition -> fetch -> clean mask -> composite
//! merge, against an in-memory data cube.

use chrono::{DateTime, TimeZone, Utc};
use mosaicker::{
    composite, derive_clean_mask, merge_aggregate, split_task, CompositeAccumulator,
    GeoTransform, Grid, MosaicResult, MosaicStrategy, PartitionParams, Platform, QaStack,
    RasterSink, RasterTile, TileQuery, TileSource, NO_DATA,
};
use ndarray::{Array1, Array3, Axis};
use std::collections::HashMap;

/// Whole-series cube that answers tile queries by time-slicing itself
struct InMemoryCube {
    tile: RasterTile,
}

impl TileSource for InMemoryCube {
    fn load_tile(&self, query: &TileQuery) -> MosaicResult<RasterTile> {
        let indices: Vec<usize> = self
            .tile
            .times()
            .iter()
            .enumerate()
            .filter(|(_, t)| **t >= query.time_range.0 && **t <= query.time_range.1)
            .map(|(i, _)| i)
            .collect();

        let bands = query
            .bands
            .iter()
            .map(|name| {
                self.tile
                    .band(name)
                    .map(|stack| (name.clone(), stack.select(Axis(0), &indices)))
            })
            .collect::<MosaicResult<HashMap<_, _>>>()?;
        let times = indices.iter().map(|&i| self.tile.times()[i]).collect();
        RasterTile::new(
            bands,
            self.tile.qa().select(Axis(0), &indices),
            times,
            self.tile.latitudes().clone(),
            self.tile.longitudes().clone(),
        )
    }

    fn list_acquisitions(&self, _query: &TileQuery) -> MosaicResult<Vec<DateTime<Utc>>> {
        Ok(self.tile.times().to_vec())
    }
}

/// Sink that just remembers what was saved
#[derive(Default)]
struct MemorySink {
    saved: HashMap<String, HashMap<String, Grid>>,
}

impl RasterSink for MemorySink {
    fn save_bands(
        &mut self,
        name: &str,
        bands: &HashMap<String, Grid>,
        _geo_transform: &GeoTransform,
        _spatial_ref: &str,
    ) -> MosaicResult<()> {
        self.saved.insert(name.to_string(), bands.clone());
        Ok(())
    }
}

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 1, d, 0, 0, 0).unwrap()
}

/// Six slices of a 2x2 tile with a scattering of cloud, shadow, snow and
/// fill codes; band values encode (slice, pixel) so selections are easy to
/// trace back.
fn test_cube() -> InMemoryCube {
    let t = 6;
    let mut red = Array3::<f32>::zeros((t, 2, 2));
    let mut nir = Array3::<f32>::zeros((t, 2, 2));
    for ti in 0..t {
        for i in 0..2 {
            for j in 0..2 {
                red[[ti, i, j]] = (100 * (ti + 1) + 10 * i + j) as f32;
                // NDVI rises then falls across the series
                nir[[ti, i, j]] = red[[ti, i, j]] * (1.0 + (ti as f32 - 2.5).abs());
            }
        }
    }
    let mut qa = QaStack::zeros((t, 2, 2));
    qa[[5, 0, 0]] = 4; // cloud in the latest slice
    qa[[5, 1, 1]] = 255;
    qa[[4, 0, 0]] = 2;
    qa[[3, 0, 1]] = 3;
    qa[[0, 1, 0]] = 4;

    let bands = [("red".to_string(), red), ("nir".to_string(), nir)]
        .into_iter()
        .collect();
    let tile = RasterTile::new(
        bands,
        qa,
        (1..=t as u32).map(day).collect(),
        Array1::linspace(0.0, 0.001, 2),
        Array1::linspace(36.0, 36.001, 2),
    )
    .unwrap();
    InMemoryCube { tile }
}

fn query(range: (DateTime<Utc>, DateTime<Utc>)) -> TileQuery {
    TileQuery {
        platform: Platform::Landsat7,
        product: "ls7_ledaps".to_string(),
        time_range: range,
        latitude: Some((0.0, 0.001)),
        longitude: Some((36.0, 36.001)),
        bands: vec!["red".to_string(), "nir".to_string()],
    }
}

/// Fold the cube chunk by chunk with the given strategy. `newest_first`
/// controls the order chunks are merged in.
fn fold_chunks(
    cube: &InMemoryCube,
    strategy: MosaicStrategy,
    time_chunks: usize,
    newest_first: bool,
) -> CompositeAccumulator {
    let params = PartitionParams {
        time_chunks: Some(time_chunks),
        ..Default::default()
    };
    let acquisitions = cube.tile.times().to_vec();
    let part = split_task(&params, &acquisitions).unwrap();

    let mut groups: Vec<&Vec<DateTime<Utc>>> = part.time_ranges.iter().collect();
    if newest_first {
        groups.reverse();
    }

    let mut acc: Option<CompositeAccumulator> = None;
    for group in groups {
        let chunk = cube
            .load_tile(&query((group[0], *group.last().unwrap())))
            .unwrap();
        let mask = derive_clean_mask(chunk.qa());
        acc = Some(composite(&chunk, &mask, NO_DATA, strategy, acc).unwrap());
    }
    acc.unwrap()
}

#[test]
fn test_most_recent_merge_order_law() {
    let _ = env_logger::builder().is_test(true).try_init();
    let cube = test_cube();

    let mask = derive_clean_mask(cube.tile.qa());
    let unchunked =
        composite(&cube.tile, &mask, NO_DATA, MosaicStrategy::MostRecent, None).unwrap();
    let chunked = fold_chunks(&cube, MosaicStrategy::MostRecent, 3, true);

    for name in ["red", "nir"] {
        assert_eq!(
            unchunked.band(name).unwrap(),
            chunked.band(name).unwrap(),
            "band {} differs between chunked and unchunked",
            name
        );
    }
    // Latest slice is cloudy at (0, 0); slice 4 is shadow, slice 3 wins
    assert_eq!(chunked.band("red").unwrap()[[0, 0]], 400.0);
}

#[test]
fn test_ndvi_merge_order_law() {
    let cube = test_cube();
    let mask = derive_clean_mask(cube.tile.qa());

    for strategy in [MosaicStrategy::MaxNdvi, MosaicStrategy::MinNdvi] {
        let unchunked = composite(&cube.tile, &mask, NO_DATA, strategy, None).unwrap();
        let chunked = fold_chunks(&cube, strategy, 3, false);
        for name in ["red", "nir"] {
            assert_eq!(
                unchunked.band(name).unwrap(),
                chunked.band(name).unwrap(),
                "{:?} band {} differs between chunked and unchunked",
                strategy,
                name
            );
        }
    }
}

#[test]
fn test_aggregate_chunk_order_free() {
    let cube = test_cube();
    let early = cube.load_tile(&query((day(1), day(3)))).unwrap();
    let late = cube.load_tile(&query((day(4), day(6)))).unwrap();

    let a = merge_aggregate(
        Some(merge_aggregate(None, early.band("red").unwrap(), NO_DATA).unwrap()),
        late.band("red").unwrap(),
        NO_DATA,
    )
    .unwrap();
    let b = merge_aggregate(
        Some(merge_aggregate(None, late.band("red").unwrap(), NO_DATA).unwrap()),
        early.band("red").unwrap(),
        NO_DATA,
    )
    .unwrap();

    assert_eq!(a.total_data, b.total_data);
    assert_eq!(a.total_clean, b.total_clean);
    assert_eq!(a.normalized(), b.normalized());
}

#[test]
fn test_restartable_with_partial_accumulator() {
    // Re-merging the same chunk sequence onto a cloned partial accumulator
    // reproduces the full result (cancellation model: the caller just
    // stops issuing merges and can resume later).
    let cube = test_cube();
    let full = fold_chunks(&cube, MosaicStrategy::MostRecent, 6, true);

    let late = cube.load_tile(&query((day(4), day(6)))).unwrap();
    let partial = composite(
        &late,
        &derive_clean_mask(late.qa()),
        NO_DATA,
        MosaicStrategy::MostRecent,
        None,
    )
    .unwrap();

    let early = cube.load_tile(&query((day(1), day(3)))).unwrap();
    let resumed = composite(
        &early,
        &derive_clean_mask(early.qa()),
        NO_DATA,
        MosaicStrategy::MostRecent,
        Some(partial.clone()),
    )
    .unwrap();
    let resumed_again = composite(
        &early,
        &derive_clean_mask(early.qa()),
        NO_DATA,
        MosaicStrategy::MostRecent,
        Some(partial),
    )
    .unwrap();

    for name in ["red", "nir"] {
        assert_eq!(resumed.band(name).unwrap(), full.band(name).unwrap());
        assert_eq!(
            resumed.band(name).unwrap(),
            resumed_again.band(name).unwrap()
        );
    }
}

#[test]
fn test_save_composite_through_sink() {
    let cube = test_cube();
    let acc = fold_chunks(&cube, MosaicStrategy::MostRecent, 2, true);

    let geo = GeoTransform {
        top_left_x: 36.0,
        pixel_width: 0.000269493,
        rotation_x: 0.0,
        top_left_y: 0.001,
        rotation_y: 0.0,
        pixel_height: -0.000269493,
    };
    let mut sink = MemorySink::default();
    sink.save_bands("mosaic", acc.bands(), &geo, "EPSG:4326")
        .unwrap();

    let saved = &sink.saved["mosaic"];
    assert_eq!(saved.len(), 2);
    assert_eq!(saved["red"], *acc.band("red").unwrap());
}
