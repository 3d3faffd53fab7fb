use ndarray::{Array2, Array3};

/// A single 2-D slice: a projection, a sinogram or a reference image
pub type Image = Array2<f32>;

/// Images stacked along the first axis
pub type Stack = Array3<f32>;

pub type Index1 = usize;

/// Guard added to every denominator; values below it count as degenerate
pub const EPS: f32 = f32::EPSILON;
