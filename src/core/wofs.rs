use crate::core::clean_mask::{derive_clean_mask_slice, derive_water_mask};
use crate::types::{LabelGrid, MaskGrid, MosaicError, MosaicResult, Platform};
use ndarray::{s, Array2, Array3, Zip};

/// Floating-point width used for the band-ratio computations.
///
/// Mixed precision shifts threshold comparisons at boundary pixels, so all
/// six bands are evaluated at one width. Single precision is the default
/// unless the caller knows the inputs started life as doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    #[default]
    Single,
    Double,
}

impl Precision {
    pub fn for_input(input_is_double: bool) -> Self {
        if input_is_double {
            Precision::Double
        } else {
            Precision::Single
        }
    }
}

/// Per-pixel quantities the tree tests against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feature {
    Band1,
    Band3,
    Band7,
    Ndi52,
    Ndi43,
    Ndi72,
}

#[derive(Debug, Clone, Copy)]
enum Branch {
    Leaf(i16),
    Node(usize),
}

/// One decision node: pixels with feature <= threshold take the left
/// branch, the rest take the right branch.
#[derive(Debug, Clone, Copy)]
struct TreeNode {
    feature: Feature,
    threshold: f64,
    left: Branch,
    right: Branch,
}

/// The fitted WOFS regression tree (Geoscience Australia training data).
///
/// This is a previously-fit statistical model, not a tunable algorithm:
/// node order and threshold values must not change, or classification
/// flips at boundary pixels. Water = 1, non-water = 0.
const WOFS_TREE: [TreeNode; 22] = [
    // 0: root split on ndi_52
    TreeNode { feature: Feature::Ndi52, threshold: -0.01, left: Branch::Node(1), right: Branch::Node(10) },
    // Left subtree
    TreeNode { feature: Feature::Band1, threshold: 2083.5, left: Branch::Node(2), right: Branch::Leaf(0) },
    TreeNode { feature: Feature::Band7, threshold: 323.5, left: Branch::Node(3), right: Branch::Node(4) },
    TreeNode { feature: Feature::Ndi43, threshold: 0.61, left: Branch::Leaf(1), right: Branch::Leaf(0) },
    TreeNode { feature: Feature::Band1, threshold: 1400.5, left: Branch::Node(6), right: Branch::Node(5) },
    TreeNode { feature: Feature::Ndi43, threshold: -0.01, left: Branch::Leaf(1), right: Branch::Leaf(0) },
    TreeNode { feature: Feature::Ndi72, threshold: -0.23, left: Branch::Node(8), right: Branch::Node(7) },
    TreeNode { feature: Feature::Band1, threshold: 379.0, left: Branch::Leaf(1), right: Branch::Leaf(0) },
    TreeNode { feature: Feature::Ndi43, threshold: 0.22, left: Branch::Leaf(1), right: Branch::Node(9) },
    TreeNode { feature: Feature::Band1, threshold: 473.0, left: Branch::Leaf(1), right: Branch::Leaf(0) },
    // Right subtree
    TreeNode { feature: Feature::Ndi52, threshold: 0.23, left: Branch::Node(11), right: Branch::Node(17) },
    TreeNode { feature: Feature::Band1, threshold: 334.5, left: Branch::Node(12), right: Branch::Leaf(0) },
    TreeNode { feature: Feature::Ndi43, threshold: 0.54, left: Branch::Node(13), right: Branch::Leaf(0) },
    TreeNode { feature: Feature::Ndi52, threshold: 0.12, left: Branch::Leaf(1), right: Branch::Node(14) },
    TreeNode { feature: Feature::Band3, threshold: 364.5, left: Branch::Node(15), right: Branch::Node(16) },
    TreeNode { feature: Feature::Band1, threshold: 129.5, left: Branch::Leaf(1), right: Branch::Leaf(0) },
    TreeNode { feature: Feature::Band1, threshold: 300.5, left: Branch::Leaf(1), right: Branch::Leaf(0) },
    TreeNode { feature: Feature::Ndi52, threshold: 0.34, left: Branch::Node(18), right: Branch::Leaf(0) },
    TreeNode { feature: Feature::Band1, threshold: 249.5, left: Branch::Node(19), right: Branch::Leaf(0) },
    TreeNode { feature: Feature::Ndi43, threshold: 0.45, left: Branch::Node(20), right: Branch::Leaf(0) },
    TreeNode { feature: Feature::Band3, threshold: 364.5, left: Branch::Node(21), right: Branch::Leaf(0) },
    TreeNode { feature: Feature::Band1, threshold: 129.5, left: Branch::Leaf(1), right: Branch::Leaf(0) },
];

/// Classify one time slice as water / non-water with the WOFS tree.
///
/// `bands` stacks the six reflectance bands in order band1..band5, band7
/// (blue, green, red, nir, swir1, swir2 for Landsat 7). Pixels outside the
/// clean mask come back as the nodata sentinel. Only Landsat 7 products
/// are accepted; the tree was fit against that sensor.
pub fn wofs_classify(
    bands: &Array3<f32>,
    clean_mask: &MaskGrid,
    no_data: f32,
    platform: Platform,
    precision: Precision,
) -> MosaicResult<LabelGrid> {
    if platform != Platform::Landsat7 {
        return Err(MosaicError::UnsupportedPlatform(format!(
            "WOFS classifier is only available for LANDSAT_7, got {}",
            platform
        )));
    }
    let (n_bands, rows, cols) = bands.dim();
    if n_bands != 6 {
        return Err(MosaicError::ShapeMismatch(format!(
            "WOFS needs 6 bands (1-5, 7), got {}",
            n_bands
        )));
    }
    if clean_mask.dim() != (rows, cols) {
        return Err(MosaicError::ShapeMismatch(format!(
            "clean mask is {:?}, bands are {:?}",
            clean_mask.dim(),
            (rows, cols)
        )));
    }

    log::debug!(
        "classifying {}x{} slice with WOFS tree at {:?} precision",
        rows,
        cols,
        precision
    );

    let features = compute_features(bands, precision);
    let mut labels = run_tree(&features, (rows, cols), no_data as i16);

    // Keep labels only where the pixel is usable
    Zip::from(&mut labels)
        .and(clean_mask)
        .for_each(|label, &clean| {
            if !clean {
                *label = no_data as i16;
            }
        });
    Ok(labels)
}

/// Water labels straight from the QA band (code 1 = water), clean-masked
/// the same way as the tree output.
pub fn classify_water_from_qa(qa: &Array2<u8>, no_data: f32) -> LabelGrid {
    let clean = derive_clean_mask_slice(qa);
    let water = derive_water_mask(qa);
    Zip::from(&clean)
        .and(&water)
        .map_collect(|&c, &w| {
            if !c {
                no_data as i16
            } else if w {
                1
            } else {
                0
            }
        })
}

/// Band values and normalized ratio indices, widened to f64 after being
/// computed at the selected precision. ndi(a, b) = (a - b) / (a + b), with
/// a zero denominator mapped to 0 instead of NaN.
fn compute_features(bands: &Array3<f32>, precision: Precision) -> [Array2<f64>; 6] {
    let b1 = bands.slice(s![0, .., ..]);
    let b2 = bands.slice(s![1, .., ..]);
    let b3 = bands.slice(s![2, .., ..]);
    let b4 = bands.slice(s![3, .., ..]);
    let b5 = bands.slice(s![4, .., ..]);
    let b7 = bands.slice(s![5, .., ..]);

    let ndi = |a: f32, b: f32| -> f64 {
        match precision {
            Precision::Single => {
                let denom = a + b;
                if denom == 0.0 {
                    0.0
                } else {
                    ((a - b) / denom) as f64
                }
            }
            Precision::Double => {
                let (a, b) = (a as f64, b as f64);
                let denom = a + b;
                if denom == 0.0 {
                    0.0
                } else {
                    (a - b) / denom
                }
            }
        }
    };

    let ndi_52 = Zip::from(&b5).and(&b2).map_collect(|&a, &b| ndi(a, b));
    let ndi_43 = Zip::from(&b4).and(&b3).map_collect(|&a, &b| ndi(a, b));
    let ndi_72 = Zip::from(&b7).and(&b2).map_collect(|&a, &b| ndi(a, b));

    [
        b1.mapv(f64::from),
        b3.mapv(f64::from),
        b7.mapv(f64::from),
        ndi_52,
        ndi_43,
        ndi_72,
    ]
}

fn feature_grid<'a>(features: &'a [Array2<f64>; 6], feature: Feature) -> &'a Array2<f64> {
    match feature {
        Feature::Band1 => &features[0],
        Feature::Band3 => &features[1],
        Feature::Band7 => &features[2],
        Feature::Ndi52 => &features[3],
        Feature::Ndi43 => &features[4],
        Feature::Ndi72 => &features[5],
    }
}

/// Index-based traversal of the node table. Each node narrows the working
/// selection mask; labels are written only at leaves. Left branches are
/// taken before right ones, matching the enumeration order of the fitted
/// model.
fn run_tree(features: &[Array2<f64>; 6], shape: (usize, usize), no_data: i16) -> LabelGrid {
    let mut labels = LabelGrid::from_elem(shape, no_data);
    let mut work: Vec<(usize, Array2<bool>)> =
        vec![(0, Array2::from_elem(shape, true))];

    while let Some((index, selection)) = work.pop() {
        let node = WOFS_TREE[index];
        let grid = feature_grid(features, node.feature);
        let cond = grid.mapv(|v| v <= node.threshold);

        let left = Zip::from(&selection)
            .and(&cond)
            .map_collect(|&sel, &c| sel && c);
        let right = Zip::from(&selection)
            .and(&cond)
            .map_collect(|&sel, &c| sel && !c);

        for (branch, sel) in [(node.right, right), (node.left, left)] {
            match branch {
                Branch::Leaf(label) => {
                    Zip::from(&mut labels).and(&sel).for_each(|l, &s| {
                        if s {
                            *l = label;
                        }
                    });
                }
                Branch::Node(child) => work.push((child, sel)),
            }
        }
    }
    labels
}
