//! Conventional flat fielding of sinograms from a `CorrectionPlan`

use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::dff::{air_normalize, repair_afterglow, AirWindows};
use crate::error::{AccessError, Result};
use crate::plan::{CorrectionPlan, Pair};
use crate::types::{Image, Index1, EPS};

/// Flat and dark rows for one detector row
struct Rows {
    flat: Array1<f32>,
    dark: Array1<f32>,
}

impl Rows {
    fn of(pair: Pair, idx: Index1, width: usize) -> Result<Self> {
        let (flat, dark) = pair;
        let (rows, cols) = flat.dim();
        if idx >= rows {
            return Err(AccessError::IndexOutOfRange { what: "sinogram", index: idx, len: rows })
        }
        if cols != width {
            return Err(AccessError::ShapeMismatch { expected: [rows, width], found: [rows, cols] })
        }
        let dark = match dark {
            Some(dark) if dark.dim() != flat.dim() => {
                let (r, c) = dark.dim();
                return Err(AccessError::ShapeMismatch { expected: [rows, cols], found: [r, c] })
            }
            Some(dark) => dark.row(idx).to_owned(),
            None       => Array1::zeros(cols),
        };
        Ok(Self { flat: flat.row(idx).to_owned(), dark })
    }

    fn correct(&self, sino: ArrayView1<f32>) -> Array1<f32> {
        (&sino - &self.dark) / (&self.flat - &self.dark + EPS)
    }

    /// Linear blend: `self` at `w = 0`, `other` at `w = 1`
    fn blend(&self, other: &Self, w: f32) -> Self {
        Self {
            flat: &self.flat * (1.0 - w) + &other.flat * w,
            dark: &self.dark * (1.0 - w) + &other.dark * w,
        }
    }
}

/// `(sino - dark) / (flat - dark)` for the detector row `idx`, followed by
/// afterglow repair and air normalization.
///
/// With both reference pairs available, flat and dark are interpolated
/// linearly between them over the projections of the sinogram. When the plan
/// forbids flat fielding, `sino` is returned unchanged.
pub fn flat_fielding(sino: ArrayView2<f32>, idx: Index1, plan: &CorrectionPlan, air: AirWindows) -> Result<Image> {
    let width = sino.ncols();
    let leading  = plan.leading_pair ().map(|pair| Rows::of(pair, idx, width)).transpose()?;
    let trailing = plan.trailing_pair().map(|pair| Rows::of(pair, idx, width)).transpose()?;

    let mut corrected = match (leading, trailing) {
        (None, None) => {
            log::debug!("No flat fielding for sinogram {idx}");
            return Ok(sino.to_owned())
        }
        (Some(only), None) | (None, Some(only)) => {
            let mut out = Image::zeros(sino.dim());
            for (mut out_row, sino_row) in out.rows_mut().into_iter().zip(sino.rows()) {
                out_row.assign(&only.correct(sino_row));
            }
            out
        }
        (Some(before), Some(after)) => {
            let n = sino.nrows();
            let mut out = Image::zeros(sino.dim());
            for (p, (mut out_row, sino_row)) in out.rows_mut().into_iter().zip(sino.rows()).enumerate() {
                let w = if n > 1 { p as f32 / (n - 1) as f32 } else { 0.0 };
                out_row.assign(&before.blend(&after, w).correct(sino_row));
            }
            out
        }
    };
    repair_afterglow(&mut corrected);
    air_normalize(&mut corrected, air);
    Ok(corrected)
}

#[cfg(test)]
mod test_flat_fielding {
    use super::*;
    use float_eq::assert_float_eq;
    use ndarray::Array2;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    fn filled(rows: usize, cols: usize, value: f32) -> Image { Array2::from_elem((rows, cols), value) }

    #[test]
    fn skipped_plan_leaves_sinogram_alone() -> Result<()> {
        let sino = Array2::from_shape_fn((4, 3), |(p, c)| (p * 3 + c) as f32);
        let out = flat_fielding(sino.view(), 0, &CorrectionPlan::skipped(), AirWindows::none())?;
        assert_eq!(out, sino);
        Ok(())
    }

    #[test]
    fn leading_pair_only() -> Result<()> {
        let plan = CorrectionPlan {
            flat_before: Some(filled(2, 3, 100.0)),
            dark_before: Some(filled(2, 3, 10.0)),
            skip_flat_after: true,
            ..CorrectionPlan::default()
        };
        let out = flat_fielding(filled(5, 3, 55.0).view(), 1, &plan, AirWindows::none())?;
        assert_eq!(out, filled(5, 3, 0.5));
        Ok(())
    }

    #[test]
    fn missing_dark_means_no_subtraction() -> Result<()> {
        let plan = CorrectionPlan { flat_before: Some(filled(2, 3, 80.0)), ..CorrectionPlan::default() };
        let out = flat_fielding(filled(2, 3, 20.0).view(), 0, &plan, AirWindows::none())?;
        assert_eq!(out, filled(2, 3, 0.25));
        Ok(())
    }

    #[test]
    fn both_pairs_interpolate_over_projections() -> Result<()> {
        let plan = CorrectionPlan {
            flat_before: Some(filled(1, 2, 100.0)),
            dark_before: Some(filled(1, 2,   0.0)),
            flat_after : Some(filled(1, 2, 200.0)),
            dark_after : Some(filled(1, 2,   0.0)),
            ..CorrectionPlan::default()
        };
        let sino = filled(3, 2, 150.0);
        let out = flat_fielding(sino.view(), 0, &plan, AirWindows::none())?;
        assert_float_eq!(out[[0, 0]], 1.5, rmax <= 1e-6);
        assert_float_eq!(out[[1, 0]], 1.0, rmax <= 1e-6);
        assert_float_eq!(out[[2, 1]], 0.75, rmax <= 1e-6);
        Ok(())
    }

    #[test]
    fn trailing_pair_ignored_when_flagged() -> Result<()> {
        let plan = CorrectionPlan {
            flat_before: Some(filled(1, 2, 100.0)),
            flat_after : Some(filled(1, 2, 200.0)),
            skip_flat_after: true,
            ..CorrectionPlan::default()
        };
        let out = flat_fielding(filled(3, 2, 50.0).view(), 0, &plan, AirWindows::none())?;
        assert_eq!(out, filled(3, 2, 0.5));
        Ok(())
    }

    #[test]
    fn dead_pixels_are_repaired() -> Result<()> {
        let plan = CorrectionPlan { flat_before: Some(filled(1, 5, 100.0)), ..CorrectionPlan::default() };
        let mut sino = filled(5, 5, 40.0);
        sino[[2, 2]] = 0.0;
        let out = flat_fielding(sino.view(), 0, &plan, AirWindows::none())?;
        assert_eq!(out, filled(5, 5, 0.4));
        Ok(())
    }

    #[test]
    fn slice_outside_references() {
        let plan = CorrectionPlan { flat_before: Some(filled(2, 3, 100.0)), ..CorrectionPlan::default() };
        assert!(matches!(flat_fielding(filled(4, 3, 1.0).view(), 2, &plan, AirWindows::none()),
                         Err(AccessError::IndexOutOfRange { .. })));
        assert!(matches!(flat_fielding(filled(4, 2, 1.0).view(), 0, &plan, AirWindows::none()),
                         Err(AccessError::ShapeMismatch { .. })));
    }
}
