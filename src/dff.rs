//! Dynamic flat fielding of single sinograms
//!
//! The effective flat field of each sinogram is the mean flat plus the
//! combination of eigen modes that leaves the corrected sinogram smoothest.

use ndarray::{s, Array1, ArrayView1, ArrayView2, Zip};
use serde::Deserialize;

use filters::{gradient_magnitude_sum, median, median_filter};

use crate::eff::EigenFlatFields;
use crate::error::{AccessError, Result};
use crate::optimize::Minimizer;
use crate::types::{Image, Index1, EPS};

/// Widths of the detector column windows, at the left and right edges of the
/// sinogram, known to see only air
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AirWindows {
    #[serde(default)] pub left: usize,
    #[serde(default)] pub right: usize,
}

impl AirWindows {
    pub fn none() -> Self { Self::default() }
    pub fn is_empty(&self) -> bool { self.left == 0 && self.right == 0 }
}

// ----- Afterglow ----------------------------------------------------------------------------------

/// Replace sub-`EPS` samples by the median of their neighbourhood, trying
/// 3×3, 5×5 and 7×7 neighbourhoods in turn. Whatever is still degenerate
/// after that gets the mean of all samples above `EPS`, or, if there are
/// none, the mean of the image as it was on entry.
pub fn repair_afterglow(image: &mut Image) {
    let degenerate = |image: &Image| image.iter().any(|&v| v < EPS);
    if !degenerate(image) { return }
    let entry_mean = image.mean().unwrap_or(0.0);

    let mut size = 3;
    while size <= 7 && degenerate(image) {
        let filtered = median_filter(image.view(), size);
        Zip::from(&mut *image).and(&filtered).for_each(|v, &f| if *v < EPS { *v = f });
        size += 2;
    }
    if degenerate(image) {
        let (sum, count) = image.iter()
            .filter(|&&v| v > EPS)
            .fold((0.0_f64, 0_usize), |(sum, count), &v| (sum + v as f64, count + 1));
        let replacement = if count > 0 { (sum / count as f64) as f32 } else { entry_mean };
        log::debug!("Afterglow: {} degenerate samples set to {replacement}",
                    image.iter().filter(|&&v| v < EPS).count());
        image.mapv_inplace(|v| if v < EPS { replacement } else { v });
    }
}

// ----- Normalization ------------------------------------------------------------------------------

/// Divide each row by the median of its air columns. No-op for empty windows.
pub fn air_normalize(image: &mut Image, air: AirWindows) {
    if air.is_empty() { return }
    let cols = image.ncols();
    let (left, right) = (air.left.min(cols), air.right.min(cols));
    let mut window = Vec::with_capacity(left + right);
    for mut row in image.rows_mut() {
        window.clear();
        window.extend(row.slice(s![..left]).iter());
        window.extend(row.slice(s![cols - right..]).iter());
        let norm = median(&mut window) + EPS;
        row.mapv_inplace(|v| v / norm);
    }
}

/// Scale `image` so that its mean becomes `target`
pub fn renormalize(image: &mut Image, target: f32) {
    let current = image.mean().unwrap_or(0.0);
    if current > 0.0 && current.is_finite() && current != target {
        *image *= target / current;
    }
}

/// Subtract `dark_row` from every row of `sino`
pub fn dark_correct(sino: ArrayView2<f32>, dark_row: ArrayView1<f32>) -> Image {
    &sino - &dark_row
}

// ----- Weights ------------------------------------------------------------------------------------

/// Weights of the filtered eigen modes that minimize the total gradient
/// magnitude of the flat-fielded sinogram, estimated on a `downsample`-fold
/// decimation of the dark-corrected `sino`. Empty when there are no modes.
pub fn estimate_weights(
    sino: ArrayView2<f32>,
    idx: Index1,
    eff: &EigenFlatFields,
    downsample: usize,
    minimizer: &dyn Minimizer,
) -> Vec<f32> {
    let k = eff.n_components();
    if k == 0 { return vec![] }
    let ds = downsample.max(1) as isize;
    let sino = sino.slice(s![..;ds, ..;ds]);
    let mean_row = eff.mean_flat().row(idx).slice(s![..;ds]).to_owned();
    let modes: Vec<Array1<f32>> = (1..=k)
        .map(|j| eff.filtered_mode(j).row(idx).slice(s![..;ds]).to_owned())
        .collect();

    let roughness = |x: &[f64]| {
        let mut flat_row = mean_row.clone();
        for (&w, mode) in x.iter().zip(&modes) {
            flat_row.scaled_add(w as f32, mode);
        }
        let scale = flat_row.mean().unwrap_or(0.0);
        let corrected = &sino / &(flat_row + EPS) * scale;
        gradient_magnitude_sum(corrected.view()) as f64
    };
    let minimum = minimizer.minimize(&roughness, &vec![0.0; k]);
    minimum.x.iter().map(|&w| w as f32).collect()
}

// ----- Correction ---------------------------------------------------------------------------------

/// Dynamic flat fielding of the raw sinogram `sino` at slice `idx`.
///
/// `dark` is the full dark reference image; its row `idx` is subtracted from
/// every projection. The result is renormalized to the mean of the
/// conventional correction by the mean flat alone, then air-normalized.
/// With no eigen modes the result is exactly the conventional correction.
pub fn dynamic_flat_fielding(
    sino: ArrayView2<f32>,
    idx: Index1,
    eff: &EigenFlatFields,
    dark: ArrayView2<f32>,
    downsample: usize,
    air: AirWindows,
    minimizer: &dyn Minimizer,
) -> Result<Image> {
    let (rows, cols) = eff.image_shape();
    if idx >= rows {
        return Err(AccessError::IndexOutOfRange { what: "sinogram", index: idx, len: rows })
    }
    let (n_proj, width) = sino.dim();
    if width != cols {
        return Err(AccessError::ShapeMismatch { expected: [n_proj, cols], found: [n_proj, width] })
    }
    if dark.dim() != (rows, cols) {
        let (r, c) = dark.dim();
        return Err(AccessError::ShapeMismatch { expected: [rows, cols], found: [r, c] })
    }

    let sino = dark_correct(sino, dark.row(idx));
    let weights = estimate_weights(sino.view(), idx, eff, downsample, minimizer);

    let mean_flat = eff.mean_flat();
    let mean_row = mean_flat.row(idx);
    let mut ff_eff_row = Array1::<f32>::zeros(cols);
    for (j, &w) in weights.iter().enumerate() {
        ff_eff_row.scaled_add(w, &eff.filtered_mode(j + 1).row(idx));
    }

    let mut conventional = &sino / &(&mean_row + EPS);
    repair_afterglow(&mut conventional);
    let target = conventional.mean().unwrap_or(0.0);

    let mut corrected = &sino / &(&mean_row + &ff_eff_row + EPS);
    repair_afterglow(&mut corrected);
    renormalize(&mut corrected, target);
    air_normalize(&mut corrected, air);
    Ok(corrected)
}
