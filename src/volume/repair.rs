//! Read-time repair of non-finite samples

use crate::types::Image;

/// Replace NaN and ±Inf samples by linear interpolation between their
/// nearest valid neighbours, in the row-major flattening of the image.
///
/// The flattened image is padded with one zero sample at each end, so that
/// invalid samples at the very start or end still have two neighbours. NaNs
/// are filled first, from non-NaN neighbours; then everything still
/// non-finite (infinities, and NaNs created by interpolating towards them) is
/// filled from finite neighbours. Purely position-based: the same input
/// always gives the same output, and fully finite input is returned as is.
pub fn remove_outliers(mut image: Image) -> Image {
    if image.iter().all(|v| v.is_finite()) { return image }

    let mut flat = Vec::with_capacity(image.len() + 2);
    flat.push(0.0);
    flat.extend(image.iter().copied());
    flat.push(0.0);

    interpolate(&mut flat, |v| v.is_nan());
    interpolate(&mut flat, |v| !v.is_finite());

    for (dst, &src) in image.iter_mut().zip(&flat[1..]) {
        *dst = src;
    }
    image
}

/// Overwrite every run of `invalid` samples with values on the straight line
/// joining the valid samples either side of it. A run touching only one valid
/// sample copies that sample.
fn interpolate(values: &mut [f32], invalid: impl Fn(f32) -> bool) {
    let n = values.len();
    let mut left: Option<usize> = None;
    let mut i = 0;
    while i < n {
        if !invalid(values[i]) {
            left = Some(i);
            i += 1;
            continue;
        }
        let end = (i..n).find(|&j| !invalid(values[j])).unwrap_or(n);
        let right = (end < n).then_some(end);
        for j in i..end {
            values[j] = match (left, right) {
                (Some(l), Some(r)) => lerp((l, values[l]), (r, values[r]), j),
                (Some(l), None   ) => values[l],
                (None   , Some(r)) => values[r],
                (None   , None   ) => values[j],
            };
        }
        i = end;
    }
}

fn lerp((x0, y0): (usize, f32), (x1, y1): (usize, f32), x: usize) -> f32 {
    let (y0, y1) = (y0 as f64, y1 as f64);
    let t = (x - x0) as f64 / (x1 - x0) as f64;
    (y0 + (y1 - y0) * t) as f32
}

#[cfg(test)]
mod test_remove_outliers {
    use super::*;
    use ndarray::{array, Array2};
    use float_eq::assert_float_eq;
    use proptest::prelude::*;

    fn row(values: &[f32]) -> Image {
        Array2::from_shape_vec((1, values.len()), values.to_vec()).unwrap()
    }

    #[test]
    fn interior_nan_takes_midpoint() {
        assert_eq!(remove_outliers(row(&[1.0, f32::NAN, 3.0])), row(&[1.0, 2.0, 3.0]));
    }

    #[test]
    fn run_of_nans_is_spread_linearly() {
        assert_eq!(remove_outliers(row(&[0.0, f32::NAN, f32::NAN, f32::NAN, 8.0])),
                   row(&[0.0, 2.0, 4.0, 6.0, 8.0]));
    }

    #[test]
    fn edges_interpolate_towards_zero_padding() {
        assert_eq!(remove_outliers(row(&[f32::NAN, 4.0])), row(&[2.0, 4.0]));
        assert_eq!(remove_outliers(row(&[2.0, f32::INFINITY])), row(&[2.0, 1.0]));
        assert_eq!(remove_outliers(row(&[f32::NEG_INFINITY])), row(&[0.0]));
    }

    #[test]
    fn nan_next_to_infinity_still_becomes_finite() {
        let repaired = remove_outliers(row(&[1.0, f32::NAN, f32::INFINITY, 5.0]));
        assert_float_eq!(repaired[[0, 1]], 1.0 + 4.0 / 3.0, abs <= 1e-6);
        assert_float_eq!(repaired[[0, 2]], 1.0 + 8.0 / 3.0, abs <= 1e-6);
    }

    #[test]
    fn flattening_runs_across_rows() {
        let repaired = remove_outliers(array![[1.0, 2.0], [f32::NAN, 4.0]]);
        assert_eq!(repaired, array![[1.0, 2.0], [3.0, 4.0]]);
    }

    #[test]
    fn all_invalid_becomes_zero() {
        let repaired = remove_outliers(Array2::from_elem((2, 2), f32::NAN));
        assert_eq!(repaired, Array2::zeros((2, 2)));
    }

    // Values in a broad finite range, with a healthy dose of NaN and ±Inf
    fn sample() -> impl Strategy<Value = f32> {
        prop_oneof![
            6 => -1e6_f32..1e6,
            1 => Just(f32::NAN),
            1 => Just(f32::INFINITY),
            1 => Just(f32::NEG_INFINITY),
        ]
    }

    proptest! {
        #[test]
        fn repaired_images_are_finite(
            (rows, cols, data) in (1..8_usize, 1..8_usize)
                .prop_flat_map(|(r, c)| (Just(r), Just(c), proptest::collection::vec(sample(), r * c)))
        ) {
            let image = Array2::from_shape_vec((rows, cols), data).unwrap();
            let repaired = remove_outliers(image.clone());
            prop_assert!(repaired.iter().all(|v| v.is_finite()));
            prop_assert_eq!(repaired.dim(), image.dim());
            // Valid samples never move
            for (before, after) in image.iter().zip(repaired.iter()) {
                if before.is_finite() { prop_assert_eq!(before, after) }
            }
            // Deterministic
            prop_assert_eq!(remove_outliers(image), repaired);
        }

        #[test]
        fn finite_images_are_untouched(
            data in proptest::collection::vec(-1e6_f32..1e6, 12)
        ) {
            let image = Array2::from_shape_vec((3, 4), data).unwrap();
            prop_assert_eq!(remove_outliers(image.clone()), image);
        }
    }
}
