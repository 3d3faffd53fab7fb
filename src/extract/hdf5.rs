//! Acquisitions stored in HDF5 files

use std::path::Path;

use ::hdf5::types::VarLenUnicode;

use super::provenance::{parse_timestamp, ProvenanceEntry, ProvenanceTable};
use super::{Acquisition, PROVENANCE};
use crate::error::Result;
use crate::volume::hdf5::{open_volume, Hdf5Storage};
use crate::volume::{AxisOrder, Volume};

/// Row of the `provenance/detector_output` table
#[derive(::hdf5::H5Type, Clone, PartialEq, Debug)]
#[repr(C)]
pub struct DetectorOutput {
    pub filename: VarLenUnicode,
    pub timestamp: VarLenUnicode,
}

pub struct Hdf5Acquisition {
    file: ::hdf5::File,
    order: AxisOrder,
}

impl Hdf5Acquisition {
    pub fn open(path: &Path, order: AxisOrder) -> Result<Self> {
        Ok(Self { file: ::hdf5::File::open(path)?, order })
    }

    /// String attribute of the provenance table, or `default` when absent
    fn tag(dataset: &::hdf5::Dataset, name: &str, default: &str) -> Result<String> {
        if !dataset.attr_names()?.iter().any(|n| n == name) {
            log::debug!("Provenance attribute `{name}` absent, using `{default}`");
            return Ok(default.into())
        }
        Ok(dataset.attr(name)?.read_scalar::<VarLenUnicode>()?.as_str().to_string())
    }
}

impl Acquisition for Hdf5Acquisition {
    type Storage = Hdf5Storage;

    fn contains(&self, path: &str) -> bool { self.file.link_exists(path) }

    fn volume(&self, path: &str) -> Result<Volume<Hdf5Storage>> { open_volume(&self.file, path, self.order) }

    fn provenance(&self) -> Result<Option<ProvenanceTable>> {
        if !self.file.link_exists(PROVENANCE) { return Ok(None) }
        let dataset = self.file.dataset(PROVENANCE)?;
        let entries = dataset.read_raw::<DetectorOutput>()?
            .iter()
            .map(|row| Ok(ProvenanceEntry {
                filename: row.filename.as_str().to_string(),
                timestamp: parse_timestamp(row.timestamp.as_str())?,
            }))
            .collect::<Result<Vec<_>>>()?;
        let first_index = if dataset.attr_names()?.iter().any(|n| n == "first_index") {
            dataset.attr("first_index")?.read_scalar::<i64>()?
        } else { 0 };
        Ok(Some(ProvenanceTable {
            entries,
            tomo_prefix: Self::tag(&dataset, "tomo_prefix", "tomo")?,
            flat_prefix: Self::tag(&dataset, "flat_prefix", "flat")?,
            dark_prefix: Self::tag(&dataset, "dark_prefix", "dark")?,
            first_index,
        }))
    }
}
