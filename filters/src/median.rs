use ndarray::{Array2, ArrayView2, Axis};
use ndarray::parallel::prelude::*;

/// Map a possibly out-of-range index into `0..n` by mirroring about the
/// edges, with the edge sample repeated: `d c b a | a b c d | d c b a`
pub fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let i = i.rem_euclid(period);
    (if i < n { i } else { period - 1 - i }) as usize
}

/// Median of `values`, which get reordered in the process.
///
/// Even lengths give the mean of the two central values; empty input gives
/// NaN.
pub fn median(values: &mut [f32]) -> f32 {
    let n = values.len();
    if n == 0 { return f32::NAN }
    let mid = n / 2;
    let (lower, &mut upper, _) = values.select_nth_unstable_by(mid, f32::total_cmp);
    if n % 2 == 1 { upper }
    else {
        let below = lower.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        (below + upper) / 2.0
    }
}

/// `size` × `size` median filter, with reflected borders.
///
/// Rows are filtered in parallel.
pub fn median_filter(image: ArrayView2<f32>, size: usize) -> Array2<f32> {
    assert!(size % 2 == 1, "Median filter size must be odd, got {size}");
    let (rows, cols) = image.dim();
    let mut out = Array2::zeros((rows, cols));
    if rows == 0 || cols == 0 { return out }
    let half = (size / 2) as isize;

    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(r, mut row)| {
            let mut window = Vec::with_capacity(size * size);
            for (c, out) in row.iter_mut().enumerate() {
                window.clear();
                for dr in -half..=half {
                    let rr = reflect(r as isize + dr, rows);
                    for dc in -half..=half {
                        window.push(image[[rr, reflect(c as isize + dc, cols)]]);
                    }
                }
                *out = median(&mut window);
            }
        });
    out
}


#[cfg(test)]
mod test_median {
    use super::*;
    use ndarray::{array, Array2};
    use float_eq::assert_float_eq;
    use proptest::prelude::*;

    #[test]
    fn odd_and_even_lengths() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&mut [7.0]), 7.0);
        assert!(median(&mut []).is_nan());
    }

    #[test]
    fn isolated_hole_takes_neighbourhood_value() {
        let mut image = Array2::from_elem((5, 5), 8.0_f32);
        image[[2, 2]] = 0.0;
        let filtered = median_filter(image.view(), 3);
        assert_float_eq!(filtered[[2, 2]], 8.0, ulps <= 0);
        assert!(filtered.iter().all(|&v| v == 8.0));
    }

    #[test]
    fn size_one_is_identity() {
        let image = array![[1.0_f32, 5.0, 2.0], [9.0, 3.0, 4.0]];
        assert_eq!(median_filter(image.view(), 1), image);
    }

    #[test]
    fn border_uses_reflection() {
        // Corner (0,0) of this image sees, after reflection,
        // [1,1,2, 1,1,2, 4,4,5] whose median is 2
        let image = array![[1.0_f32, 2.0, 3.0],
                           [4.0,     5.0, 6.0],
                           [7.0,     8.0, 9.0]];
        let filtered = median_filter(image.view(), 3);
        assert_eq!(filtered[[0, 0]], 2.0);
        assert_eq!(filtered[[1, 1]], 5.0);
        assert_eq!(filtered[[2, 2]], 8.0);
    }

    #[test]
    #[should_panic]
    fn even_size_rejected() {
        median_filter(Array2::<f32>::zeros((3, 3)).view(), 2);
    }

    proptest! {
        #[test]
        fn filtered_values_stay_within_input_range(
            data in proptest::collection::vec(-1000.0_f32..1000.0, 1..64),
            size in prop_oneof![Just(3_usize), Just(5), Just(7)],
        ) {
            let cols = 4.min(data.len());
            let rows = data.len() / cols;
            let image = Array2::from_shape_vec((rows, cols), data[..rows * cols].to_vec()).unwrap();
            let lo = image.iter().copied().fold(f32::INFINITY, f32::min);
            let hi = image.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            for &v in median_filter(image.view(), size).iter() {
                prop_assert!(lo <= v && v <= hi);
            }
        }
    }
}
