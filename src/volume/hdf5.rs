//! Volumes stored as 3-D HDF5 datasets

use ndarray::{s, ArrayView2, Axis};

use super::{AxisOrder, Storage, Volume};
use crate::error::{AccessError, Result};
use crate::types::{Image, Index1};

/// A 3-D `f32` HDF5 dataset
#[derive(Clone, Debug)]
pub struct Hdf5Storage {
    dataset: ::hdf5::Dataset,
    shape: [usize; 3],
}

impl Hdf5Storage {
    pub fn new(dataset: ::hdf5::Dataset) -> Result<Self> {
        let shape = dataset.shape();
        match shape[..] {
            [a, b, c] => Ok(Self { shape: [a, b, c], dataset }),
            ref other => Err(AccessError::NotAVolume(other.to_vec())),
        }
    }

    pub fn dataset(&self) -> &::hdf5::Dataset { &self.dataset }
}

impl Storage for Hdf5Storage {
    fn shape(&self) -> [usize; 3] { self.shape }

    fn read_plane(&self, axis: Axis, index: Index1) -> Result<Image> {
        let plane = match axis.index() {
            0 => self.dataset.read_slice_2d::<f32, _>(s![index, .., ..])?,
            _ => self.dataset.read_slice_2d::<f32, _>(s![.., index, ..])?,
        };
        Ok(plane)
    }

    fn write_plane(&mut self, axis: Axis, index: Index1, image: ArrayView2<f32>) -> Result<()> {
        // HDF5 wants contiguous memory
        let image = image.as_standard_layout();
        match axis.index() {
            0 => self.dataset.write_slice(&image, s![index, .., ..])?,
            _ => self.dataset.write_slice(&image, s![.., index, ..])?,
        };
        Ok(())
    }
}

/// Open the 3-D dataset at `path` inside `group` (or file)
pub fn open_volume(group: &::hdf5::Group, path: &str, order: AxisOrder) -> Result<Volume<Hdf5Storage>> {
    if !group.link_exists(path) {
        return Err(AccessError::MissingGroup(path.into()))
    }
    Ok(Volume::new(Hdf5Storage::new(group.dataset(path)?)?, order))
}

/// Create a zero-filled `f32` volume at `path`, shaped and chunked for `order`
pub fn create_volume(
    group: &::hdf5::Group,
    path: &str,
    order: AxisOrder,
    det_size: usize,
    n_sinograms: usize,
    n_projections: usize,
) -> Result<Volume<Hdf5Storage>> {
    let [a, b, c] = order.shape(det_size, n_sinograms, n_projections);
    let [ca, cb, cc] = order.chunks(det_size);
    let dataset = group
        .new_dataset::<f32>()
        .chunk((ca, cb, cc))
        .shape((a, b, c))
        .create(path)?;
    Ok(Volume::new(Hdf5Storage::new(dataset)?, order))
}
