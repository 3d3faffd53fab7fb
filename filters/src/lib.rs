//! Small 2-D image kernels shared by the preprocessing stages.

mod median;
mod gradient;

pub use median::{median, median_filter, reflect};
pub use gradient::{gradient, gradient_magnitude_sum};
