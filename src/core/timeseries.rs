use crate::types::{GridStack, MosaicError, MosaicResult};
use ndarray::{s, Array2, Zip};

/// Running per-pixel statistics over a time series.
///
/// `total_data` is the cumulative sum of valid values, `total_clean` the
/// count of valid observations; the normalized ratio is derived on demand.
/// Sum and count merge by elementwise addition, which is commutative and
/// associative, so unlike the composite strategies chunk order is free.
#[derive(Debug, Clone)]
pub struct AggregateAccumulator {
    pub total_data: Array2<f64>,
    pub total_clean: Array2<f64>,
}

impl AggregateAccumulator {
    /// Elementwise sum / count, with empty pixels (count 0) mapped to 0
    /// rather than NaN.
    pub fn normalized(&self) -> Array2<f64> {
        Zip::from(&self.total_data)
            .and(&self.total_clean)
            .map_collect(|&sum, &count| if count == 0.0 { 0.0 } else { sum / count })
    }
}

/// Fold one chunk's valid-sum and clean-count grids into the accumulator.
pub fn merge_aggregate(
    prior: Option<AggregateAccumulator>,
    data: &GridStack,
    no_data: f32,
) -> MosaicResult<AggregateAccumulator> {
    let (t, rows, cols) = data.dim();
    log::debug!("aggregating {} slices over a {}x{} grid", t, rows, cols);

    let mut sum = Array2::<f64>::zeros((rows, cols));
    let mut count = Array2::<f64>::zeros((rows, cols));
    for ti in 0..t {
        let slice = data.slice(s![ti, .., ..]);
        Zip::from(&mut sum)
            .and(&mut count)
            .and(&slice)
            .for_each(|s, c, &v| {
                if v != no_data {
                    *s += v as f64;
                    *c += 1.0;
                }
            });
    }

    match prior {
        None => Ok(AggregateAccumulator {
            total_data: sum,
            total_clean: count,
        }),
        Some(mut acc) => {
            if acc.total_data.dim() != (rows, cols) {
                return Err(MosaicError::ShapeMismatch(format!(
                    "accumulator grids are {:?}, chunk grids are {:?}",
                    acc.total_data.dim(),
                    (rows, cols)
                )));
            }
            acc.total_data += &sum;
            acc.total_clean += &count;
            Ok(acc)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NO_DATA;
    use approx::assert_abs_diff_eq;
    use ndarray::Array3;

    fn chunk(values: &[f32]) -> GridStack {
        Array3::from_shape_vec((values.len(), 1, 1), values.to_vec()).unwrap()
    }

    #[test]
    fn test_sum_count_and_ratio() {
        let data = chunk(&[1.0, NO_DATA, 1.0, 0.0]);
        let acc = merge_aggregate(None, &data, NO_DATA).unwrap();

        assert_abs_diff_eq!(acc.total_data[[0, 0]], 2.0);
        assert_abs_diff_eq!(acc.total_clean[[0, 0]], 3.0);
        assert_abs_diff_eq!(acc.normalized()[[0, 0]], 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_count_maps_to_zero() {
        let data = chunk(&[NO_DATA, NO_DATA]);
        let acc = merge_aggregate(None, &data, NO_DATA).unwrap();

        assert_eq!(acc.total_clean[[0, 0]], 0.0);
        assert_eq!(acc.normalized()[[0, 0]], 0.0);
        assert!(acc.normalized()[[0, 0]].is_finite());
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = chunk(&[1.0, 1.0, NO_DATA]);
        let b = chunk(&[0.0, 1.0]);

        let ab = merge_aggregate(
            Some(merge_aggregate(None, &a, NO_DATA).unwrap()),
            &b,
            NO_DATA,
        )
        .unwrap();
        let ba = merge_aggregate(
            Some(merge_aggregate(None, &b, NO_DATA).unwrap()),
            &a,
            NO_DATA,
        )
        .unwrap();

        assert_eq!(ab.total_data, ba.total_data);
        assert_eq!(ab.total_clean, ba.total_clean);
        assert_eq!(ab.normalized(), ba.normalized());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let a = chunk(&[1.0]);
        let acc = merge_aggregate(None, &a, NO_DATA).unwrap();
        let wide = Array3::<f32>::zeros((1, 2, 2));

        let err = merge_aggregate(Some(acc), &wide, NO_DATA);
        assert!(matches!(err, Err(MosaicError::ShapeMismatch(_))));
    }
}
