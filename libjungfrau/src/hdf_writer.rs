//! Writing of processed pedestal files.

use hdf5::types::VarLenUnicode;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::error::HDF5WriterError;
use super::pedestal::PedestalData;

const PIXEL_MASK_NAME: &str = "pixel_mask";
// the pedestal means and their RMS keep their historical dataset names,
// the rest of the file ecosystem reads them
const PEDESTAL_NAME: &str = "gains";
const PEDESTAL_RMS_NAME: &str = "gainsRMS";

/// Writes the result of a pedestal analysis:
///
/// ```text
/// pedestal_20240101_1200.res.h5 - source, frames_analyzed, version
/// |---- pixel_mask(dset, i32)
/// |---- gains(dset, f64, 4 x rows x columns)
/// |---- gainsRMS(dset, f64, 4 x rows x columns)
/// ```
#[derive(Debug)]
pub struct PedestalWriter {
    file: hdf5::File,
    path: PathBuf,
}

impl PedestalWriter {
    pub fn new(path: &Path) -> Result<Self, HDF5WriterError> {
        Ok(Self {
            file: hdf5::File::create(path)?,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, data: &PedestalData) -> Result<(), HDF5WriterError> {
        self.file
            .new_dataset_builder()
            .with_data(&data.pixel_mask.mapv(|flags| flags as i32))
            .create(PIXEL_MASK_NAME)?;
        self.file
            .new_dataset_builder()
            .with_data(&data.pedestal)
            .create(PEDESTAL_NAME)?;
        self.file
            .new_dataset_builder()
            .with_data(&data.rms)
            .create(PEDESTAL_RMS_NAME)?;
        Ok(())
    }

    pub fn write_provenance(
        &self,
        source: &Path,
        frames_analyzed: usize,
    ) -> Result<(), HDF5WriterError> {
        let version = format!("{}:{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

        self.file
            .new_attr::<VarLenUnicode>()
            .create("source")?
            .write_scalar(&VarLenUnicode::from_str(&source.to_string_lossy()).unwrap())?;
        self.file
            .new_attr::<u64>()
            .create("frames_analyzed")?
            .write_scalar(&(frames_analyzed as u64))?;
        self.file
            .new_attr::<VarLenUnicode>()
            .create("version")?
            .write_scalar(&VarLenUnicode::from_str(&version).unwrap())?;

        Ok(())
    }
}
