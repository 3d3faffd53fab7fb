//! On-disk formats that are not HDF5

pub mod raw;
