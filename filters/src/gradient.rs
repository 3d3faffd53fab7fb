use ndarray::{Array2, ArrayView2, Axis};

/// Gradient along rows (axis 0) and along columns (axis 1), unit spacing.
///
/// Central differences in the interior, one-sided differences at the edges.
/// An axis of length 1 has zero gradient.
pub fn gradient(image: ArrayView2<f32>) -> (Array2<f32>, Array2<f32>) {
    (gradient_along(image, Axis(0)), gradient_along(image, Axis(1)))
}

/// Sum over all pixels of the gradient magnitude: the total variation-like
/// roughness of `image`.
pub fn gradient_magnitude_sum(image: ArrayView2<f32>) -> f32 {
    let (gy, gx) = gradient(image);
    gy.iter().zip(gx.iter())
        .map(|(y, x)| (y * y + x * x).sqrt())
        .sum()
}

fn gradient_along(image: ArrayView2<f32>, axis: Axis) -> Array2<f32> {
    let n = image.len_of(axis);
    let mut out = Array2::zeros(image.dim());
    if n < 2 { return out }
    let lane = |i| image.index_axis(axis, i);
    for (i, mut target) in out.axis_iter_mut(axis).enumerate() {
        let diff = match i {
            0                => &lane(1) - &lane(0),
            i if i == n - 1  => &lane(n - 1) - &lane(n - 2),
            i                => (&lane(i + 1) - &lane(i - 1)) / 2.0,
        };
        target.assign(&diff);
    }
    out
}
