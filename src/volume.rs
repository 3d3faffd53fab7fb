//! Slice-level access to 3-D acquisition volumes
//!
//! A volume stores projections × sinograms × detector columns, with the first
//! two physical axes in either order. `Volume` hides which order is in use and
//! always hands out complete 2-D slices, repaired of non-finite samples.

use ndarray::{Array3, ArrayView2, Axis};
use serde::Deserialize;

use crate::error::{AccessError, Result};
use crate::types::{Image, Index1};

pub mod repair;
pub mod hdf5;

/// Which physical axis holds projections and which holds sinograms
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AxisOrder {
    /// `[projection, sinogram, column]`
    ProjectionMajor,
    /// `[sinogram, projection, column]`
    #[default]
    SinogramMajor,
}

impl AxisOrder {

    pub fn projection_axis(self) -> Axis {
        match self {
            AxisOrder::ProjectionMajor => Axis(0),
            AxisOrder::SinogramMajor   => Axis(1),
        }
    }

    pub fn sinogram_axis(self) -> Axis {
        match self {
            AxisOrder::ProjectionMajor => Axis(1),
            AxisOrder::SinogramMajor   => Axis(0),
        }
    }

    /// Physical shape of a volume with the given logical extents
    pub fn shape(self, det_size: usize, n_sinograms: usize, n_projections: usize) -> [usize; 3] {
        match self {
            AxisOrder::ProjectionMajor => [n_projections, n_sinograms, det_size],
            AxisOrder::SinogramMajor   => [n_sinograms, n_projections, det_size],
        }
    }

    /// Chunk shape for newly created on-disk volumes: one detector row
    pub fn chunks(self, det_size: usize) -> [usize; 3] { [1, 1, det_size] }
}

/// Raw plane-level storage of a 3-D volume. Knows nothing about projections
/// or sinograms, and does no repair.
pub trait Storage {
    fn shape(&self) -> [usize; 3];

    /// The complete plane at `index` along `axis` (0 or 1). The two remaining
    /// axes keep their relative order. `index` has already been checked.
    fn read_plane(&self, axis: Axis, index: Index1) -> Result<Image>;

    fn write_plane(&mut self, axis: Axis, index: Index1, image: ArrayView2<f32>) -> Result<()>;
}

impl Storage for Array3<f32> {
    fn shape(&self) -> [usize; 3] {
        let (a, b, c) = self.dim();
        [a, b, c]
    }

    fn read_plane(&self, axis: Axis, index: Index1) -> Result<Image> {
        Ok(self.index_axis(axis, index).to_owned())
    }

    fn write_plane(&mut self, axis: Axis, index: Index1, image: ArrayView2<f32>) -> Result<()> {
        self.index_axis_mut(axis, index).assign(&image);
        Ok(())
    }
}

/// Projection/sinogram view of some `Storage`
#[derive(Clone, Debug)]
pub struct Volume<S> {
    storage: S,
    order: AxisOrder,
}

impl<S: Storage> Volume<S> {

    pub fn new(storage: S, order: AxisOrder) -> Self { Self { storage, order } }

    pub fn order(&self) -> AxisOrder { self.order }
    pub fn storage(&self) -> &S { &self.storage }
    pub fn into_storage(self) -> S { self.storage }

    pub fn n_projections (&self) -> usize { self.storage.shape()[self.order.projection_axis().index()] }
    pub fn n_sinograms   (&self) -> usize { self.storage.shape()[self.order.  sinogram_axis().index()] }
    pub fn detector_width(&self) -> usize { self.storage.shape()[2] }

    /// Projection `index`: `n_sinograms` rows × `detector_width` columns
    pub fn read_projection(&self, index: Index1) -> Result<Image> {
        self.read("projection", self.order.projection_axis(), index)
    }

    /// Sinogram `index`: `n_projections` rows × `detector_width` columns
    pub fn read_sinogram(&self, index: Index1) -> Result<Image> {
        self.read("sinogram", self.order.sinogram_axis(), index)
    }

    pub fn write_projection(&mut self, index: Index1, image: ArrayView2<f32>) -> Result<()> {
        self.write("projection", self.order.projection_axis(), index, image)
    }

    pub fn write_sinogram(&mut self, index: Index1, image: ArrayView2<f32>) -> Result<()> {
        self.write("sinogram", self.order.sinogram_axis(), index, image)
    }

    fn read(&self, what: &'static str, axis: Axis, index: Index1) -> Result<Image> {
        self.check_index(what, axis, index)?;
        let plane = self.storage.read_plane(axis, index)?;
        Ok(repair::remove_outliers(plane))
    }

    fn write(&mut self, what: &'static str, axis: Axis, index: Index1, image: ArrayView2<f32>) -> Result<()> {
        self.check_index(what, axis, index)?;
        let expected = self.plane_shape(axis);
        let (r, c) = image.dim();
        if [r, c] != expected {
            return Err(AccessError::ShapeMismatch { expected, found: [r, c] })
        }
        self.storage.write_plane(axis, index, image)
    }

    fn check_index(&self, what: &'static str, axis: Axis, index: Index1) -> Result<()> {
        let len = self.storage.shape()[axis.index()];
        if index < len { Ok(()) }
        else           { Err(AccessError::IndexOutOfRange { what, index, len }) }
    }

    fn plane_shape(&self, axis: Axis) -> [usize; 2] {
        let [a, b, c] = self.storage.shape();
        if axis.index() == 0 { [b, c] } else { [a, c] }
    }
}

impl Volume<Array3<f32>> {

    /// In-memory volume filled with zeros
    pub fn zeros(order: AxisOrder, det_size: usize, n_sinograms: usize, n_projections: usize) -> Self {
        let [a, b, c] = order.shape(det_size, n_sinograms, n_projections);
        Self::new(Array3::zeros((a, b, c)), order)
    }

    /// Stack `projections`, all of the same shape, into an in-memory volume
    pub fn from_projections(order: AxisOrder, projections: &[Image]) -> Result<Self> {
        let (rows, cols) = projections.first().map_or((0, 0), |p| p.dim());
        let mut volume = Self::zeros(order, cols, rows, projections.len());
        for (i, projection) in projections.iter().enumerate() {
            volume.write_projection(i, projection.view())?;
        }
        Ok(volume)
    }
}

#[cfg(test)]
mod test_volume {
    use super::*;
    use rstest::rstest;
    use ndarray::{array, Array2};
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    // Volume whose sample values encode their logical position:
    // projection * 100 + sinogram * 10 + column
    fn labelled(order: AxisOrder) -> Volume<Array3<f32>> {
        let (n_proj, n_sino, det) = (4, 3, 2);
        let projections: Vec<Image> = (0..n_proj)
            .map(|p| Array2::from_shape_fn((n_sino, det), |(s, c)| (p * 100 + s * 10 + c) as f32))
            .collect();
        Volume::from_projections(order, &projections).unwrap()
    }

    #[rstest(/**/ order,                     shape,
             case(AxisOrder::ProjectionMajor, [4, 3, 2]),
             case(AxisOrder::SinogramMajor  , [3, 4, 2]),
    )]
    fn logical_extents_independent_of_order(order: AxisOrder, shape: [usize; 3]) {
        let volume = labelled(order);
        assert_eq!(volume.storage().shape(), shape);
        assert_eq!(volume.n_projections(), 4);
        assert_eq!(volume.n_sinograms(), 3);
        assert_eq!(volume.detector_width(), 2);
    }

    #[rstest(order, case(AxisOrder::ProjectionMajor), case(AxisOrder::SinogramMajor))]
    fn projections_and_sinograms_cross_consistently(order: AxisOrder) {
        let volume = labelled(order);
        let projection = volume.read_projection(2).unwrap();
        let sinogram   = volume.read_sinogram(1).unwrap();
        assert_eq!(projection.dim(), (3, 2));
        assert_eq!(sinogram  .dim(), (4, 2));
        assert_eq!(projection.row(1), array![210.0, 211.0]);
        assert_eq!(sinogram  .row(2), array![210.0, 211.0]);
        assert_eq!(sinogram.column(0), array![10.0, 110.0, 210.0, 310.0]);
    }

    #[rstest(order, case(AxisOrder::ProjectionMajor), case(AxisOrder::SinogramMajor))]
    fn out_of_range_index_is_an_access_error(order: AxisOrder) {
        let volume = labelled(order);
        match volume.read_sinogram(3) {
            Err(AccessError::IndexOutOfRange { what, index, len }) => {
                assert_eq!((what, index, len), ("sinogram", 3, 3));
            }
            other => panic!("expected IndexOutOfRange, got {other:?}"),
        }
        assert!(volume.read_projection(4).is_err());
        assert!(volume.read_projection(3).is_ok());
    }

    #[test]
    fn write_then_read_sinogram() {
        let mut volume = Volume::zeros(AxisOrder::ProjectionMajor, 3, 2, 2);
        let sinogram = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        volume.write_sinogram(1, sinogram.view()).unwrap();
        assert_eq!(volume.read_sinogram(1).unwrap(), sinogram);
        assert_eq!(volume.read_sinogram(0).unwrap(), Array2::zeros((2, 3)));
        assert_eq!(volume.read_projection(1).unwrap().row(1), array![4.0, 5.0, 6.0]);
    }

    #[test]
    fn write_rejects_wrong_shape() {
        let mut volume = Volume::zeros(AxisOrder::SinogramMajor, 3, 2, 5);
        let wrong = Array2::zeros((2, 3));
        assert!(matches!(
            volume.write_sinogram(0, wrong.view()),
            Err(AccessError::ShapeMismatch { expected: [5, 3], found: [2, 3] })
        ));
    }

    #[test]
    fn reads_repair_but_writes_do_not() {
        let mut volume = Volume::zeros(AxisOrder::SinogramMajor, 3, 1, 1);
        let broken = array![[2.0, f32::NAN, 4.0]];
        volume.write_sinogram(0, broken.view()).unwrap();
        assert!(volume.storage()[[0, 0, 1]].is_nan());
        assert_eq!(volume.read_sinogram(0).unwrap(), array![[2.0, 3.0, 4.0]]);
        // Storage untouched by the read, and the repair repeats exactly
        assert!(volume.storage()[[0, 0, 1]].is_nan());
        assert_eq!(volume.read_sinogram(0).unwrap(), volume.read_sinogram(0).unwrap());
    }
}
