//! Eigen flat fields: the mean flat plus its statistically significant
//! principal variation modes.
//!
//! The number of modes is chosen by parallel analysis: real covariance
//! eigenvalues are compared, rank by rank, with those of structureless
//! synthetic data having the same per-pixel variance. Only those exceeding
//! the synthetic mean by two synthetic standard deviations count.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use ordered_float::OrderedFloat;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;

use crate::error::{AccessError, Result};
use crate::types::{Image, Stack};
use crate::volume::{Storage, Volume};

/// `eff[0]` is the mean flat, `eff[1..=K]` the modes by decreasing
/// eigenvalue. `filt_eff[k]` is the 3×3 median of `eff[k]` for `k ≥ 1`;
/// `filt_eff[0]` is zero.
#[derive(Clone, Debug, PartialEq)]
pub struct EigenFlatFields {
    eff: Stack,
    filt_eff: Stack,
}

impl EigenFlatFields {

    /// No dynamic component: just the conventional flat
    pub fn conventional(mean_flat: Image) -> Self {
        let (rows, cols) = mean_flat.dim();
        let eff = mean_flat.insert_axis(Axis(0));
        Self { eff, filt_eff: Stack::zeros((1, rows, cols)) }
    }

    /// Mean flat plus already computed modes, in decreasing order of
    /// significance. The filtered copies are derived here.
    pub fn from_modes(mean_flat: Image, modes: &[Image]) -> Self {
        let (rows, cols) = mean_flat.dim();
        let mut eff      = Stack::zeros((modes.len() + 1, rows, cols));
        let mut filt_eff = Stack::zeros((modes.len() + 1, rows, cols));
        eff.index_axis_mut(Axis(0), 0).assign(&mean_flat);
        for (k, mode) in modes.iter().enumerate() {
            eff     .index_axis_mut(Axis(0), k + 1).assign(mode);
            filt_eff.index_axis_mut(Axis(0), k + 1).assign(&filters::median_filter(mode.view(), 3));
        }
        Self { eff, filt_eff }
    }

    /// `K`
    pub fn n_components(&self) -> usize { self.eff.len_of(Axis(0)) - 1 }

    pub fn mean_flat(&self) -> ArrayView2<f32> { self.eff.index_axis(Axis(0), 0) }

    /// Unfiltered mode `k` (`0` is the mean flat)
    pub fn mode(&self, k: usize) -> ArrayView2<f32> { self.eff.index_axis(Axis(0), k) }

    /// Filtered mode `k`, `1 ≤ k ≤ K`
    pub fn filtered_mode(&self, k: usize) -> ArrayView2<f32> { self.filt_eff.index_axis(Axis(0), k) }

    pub fn image_shape(&self) -> (usize, usize) {
        let (_, rows, cols) = self.eff.dim();
        (rows, cols)
    }
}

/// Build the eigen flat fields from every projection of `flats`, each
/// dark-subtracted by `dark`.
///
/// `repetitions` synthetic data sets are drawn for parallel analysis, each
/// from its own generator seeded from `rng`, so results are reproducible
/// regardless of thread scheduling.
pub fn prepare<S, R>(flats: &Volume<S>, dark: ArrayView2<f32>, repetitions: usize, rng: &mut R) -> Result<EigenFlatFields>
where
    S: Storage,
    R: Rng,
{
    let n = flats.n_projections();
    let (rows, cols) = (flats.n_sinograms(), flats.detector_width());
    if dark.dim() != (rows, cols) {
        let (dr, dc) = dark.dim();
        return Err(AccessError::ShapeMismatch { expected: [rows, cols], found: [dr, dc] })
    }
    if n == 0 {
        return Ok(EigenFlatFields::conventional(Image::zeros((rows, cols))))
    }

    // One dark-subtracted flat per column
    let m = rows * cols;
    let mut data = Array2::<f32>::zeros((m, n));
    for j in 0..n {
        let flat = flats.read_projection(j)? - &dark;
        data.column_mut(j).assign(&Array1::from_iter(flat.iter().copied()));
    }
    let mean = data.mean_axis(Axis(1)).unwrap_or_else(|| Array1::zeros(m));
    data -= &mean.view().insert_axis(Axis(1));
    let mean_flat = mean.into_shape((rows, cols)).map_err(|_| AccessError::ShapeMismatch {
        expected: [rows, cols], found: [m, 1]
    })?;

    let components = parallel_analysis(data.view(), repetitions, rng);
    let k = components.significant;
    log::info!("{k} eigen flat field(s) selected from {n} flat(s)");

    let modes = (0..k)
        .map(|i| {
            let v = components.eigenvectors.column(n - 1 - i);
            let v = Array1::from_iter(v.iter().copied());
            data.dot(&v).into_shape((rows, cols)).map_err(|_| AccessError::ShapeMismatch {
                expected: [rows, cols], found: [m, 1]
            })
        })
        .collect::<Result<Vec<Image>>>()?;
    Ok(EigenFlatFields::from_modes(mean_flat, &modes))
}

// ----- Parallel analysis ----------------------------------------------------------------------------

/// Eigen decomposition of the observation covariance, ascending
pub struct Components {
    pub eigenvalues: Vec<f32>,
    /// Column `i` belongs to `eigenvalues[i]`
    pub eigenvectors: DMatrix<f32>,
    /// How many of the largest eigenvalues stand out from noise
    pub significant: usize,
}

/// `data` holds one observation per column, one pixel per row.
pub fn parallel_analysis<R: Rng>(data: ArrayView2<f32>, repetitions: usize, rng: &mut R) -> Components {
    let (m, n) = data.dim();
    let (eigenvalues, eigenvectors) = sorted_eigen(covariance(data));
    let none = |eigenvalues, eigenvectors| Components { eigenvalues, eigenvectors, significant: 0 };
    if n < 2 || m < 2 || repetitions < 2 { return none(eigenvalues, eigenvectors) }

    let pixel_std = data.std_axis(Axis(1), 1.0);
    if !pixel_std.iter().all(|s| s.is_finite()) { return none(eigenvalues, eigenvectors) }

    let seeds: Vec<u64> = (0..repetitions).map(|_| rng.gen()).collect();
    let synthetic: Vec<Vec<f32>> = seeds
        .into_par_iter()
        .map(|seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut covariance = Covariance::new(n);
            for start in (0..m).step_by(BLOCK_ROWS) {
                let rows = BLOCK_ROWS.min(m - start);
                let block = Array2::from_shape_fn((rows, n), |(i, _)| pixel_std[start + i] * rng.sample::<f32, _>(StandardNormal));
                covariance.add(block.view());
            }
            sorted_eigen(covariance.finish()).0
        })
        .collect();

    let significant = (0..n)
        .filter(|&rank| {
            let null = Array1::from_iter(synthetic.iter().map(|values| values[rank]));
            let threshold = null.mean().unwrap_or(f32::NAN) + 2.0 * null.std_axis(Axis(0), 1.0).into_scalar();
            eigenvalues[rank] > threshold
        })
        .count();
    Components { eigenvalues, eigenvectors, significant }
}

/// Covariance between the columns of `data`, each centred on its own mean
fn covariance(data: ArrayView2<f32>) -> DMatrix<f32> {
    let mut covariance = Covariance::new(data.ncols());
    for block in data.axis_chunks_iter(Axis(0), BLOCK_ROWS) { covariance.add(block) }
    covariance.finish()
}

/// Rows of a matrix held at once while accumulating its covariance
const BLOCK_ROWS: usize = 4096;

/// Column covariance of a matrix delivered in blocks of rows, from the
/// running Gram matrix and column sums
struct Covariance {
    gram: Array2<f64>,
    sums: Array1<f64>,
    rows: usize,
}

impl Covariance {
    fn new(n: usize) -> Self {
        Self { gram: Array2::zeros((n, n)), sums: Array1::zeros(n), rows: 0 }
    }

    fn add(&mut self, block: ArrayView2<f32>) {
        let block = block.mapv(f64::from);
        self.gram += &block.t().dot(&block);
        self.sums += &block.sum_axis(Axis(0));
        self.rows += block.nrows();
    }

    fn finish(self) -> DMatrix<f32> {
        let Self { gram, sums, rows } = self;
        let m = rows.max(1) as f64;
        let scale = (rows.max(2) - 1) as f64;
        let n = sums.len();
        DMatrix::from_fn(n, n, |i, j| ((gram[[i, j]] - sums[i] * sums[j] / m) / scale) as f32)
    }
}

fn sorted_eigen(matrix: DMatrix<f32>) -> (Vec<f32>, DMatrix<f32>) {
    let n = matrix.nrows();
    let eigen = matrix.symmetric_eigen();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| OrderedFloat(eigen.eigenvalues[i]));
    let values = order.iter().map(|&i| eigen.eigenvalues[i]).collect();
    let vectors = DMatrix::from_fn(n, n, |r, c| eigen.eigenvectors[(r, order[c])]);
    (values, vectors)
}
