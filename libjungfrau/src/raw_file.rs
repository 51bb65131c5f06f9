//! Read access to raw acquisition files.
//!
//! A raw run file carries the detector name and per-frame bookkeeping next
//! to the image data:
//!
//! ```text
//! run_file.h5
//! |---- general
//! |    |---- detector_name(dset)
//! |    |---- n_bad_modules(dset)
//! |---- data/<detector_name>
//! |    |---- data(dset, u16, frames x rows x columns)
//! |    |---- daq_rec(dset, i64, frames x modules)
//! |    |---- is_good_frame(dset, frames)
//! |    |---- module_map(dset, frames x modules, optional)
//! ```
//!
//! Files are typically far larger than memory, so frames are read one
//! slice at a time.

use ndarray::{s, Array2};
use std::path::{Path, PathBuf};

use super::detector::Detector;
use super::error::RawFileError;

#[derive(Debug)]
pub struct RawRunFile {
    #[allow(dead_code)]
    file: hdf5::File,
    path: PathBuf,
    detector: Detector,
    n_bad_modules: usize,
    data: hdf5::Dataset,
    daq_rec: Option<hdf5::Dataset>,
    is_good_frame: Option<hdf5::Dataset>,
    module_map: Option<Array2<i64>>,
    n_frames: usize,
    frame_shape: (usize, usize),
}

impl RawRunFile {
    pub fn open(path: &Path) -> Result<Self, RawFileError> {
        if !path.exists() {
            return Err(RawFileError::BadFilePath(path.to_path_buf()));
        }

        let file = hdf5::File::open(path)?;

        let detector_name = file
            .dataset("general/detector_name")?
            .read_scalar::<hdf5::types::VarLenUnicode>()?
            .as_str()
            .to_string();
        let detector = Detector::new(&detector_name)?;

        let n_bad_modules = match file.dataset("general/n_bad_modules") {
            Ok(dataset) => dataset.read_scalar::<i64>()? as usize,
            Err(_) => 0,
        };

        let data = file.dataset(&format!("data/{detector_name}/data"))?;
        let shape = data.shape();
        if shape.len() != 3 {
            return Err(RawFileError::BadDataRank(shape.len()));
        }

        let daq_rec = file.dataset(&format!("data/{detector_name}/daq_rec")).ok();
        let is_good_frame = file
            .dataset(&format!("data/{detector_name}/is_good_frame"))
            .ok();
        let module_map = match file.dataset(&format!("data/{detector_name}/module_map")) {
            Ok(dataset) => Some(dataset.read_2d::<i64>()?),
            Err(_) => None,
        };

        Ok(Self {
            file,
            path: path.to_path_buf(),
            detector,
            n_bad_modules,
            data,
            daq_rec,
            is_good_frame,
            module_map,
            n_frames: shape[0],
            frame_shape: (shape[1], shape[2]),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    pub fn n_bad_modules(&self) -> usize {
        self.n_bad_modules
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    pub fn frame_shape(&self) -> (usize, usize) {
        self.frame_shape
    }

    pub fn frame(&self, index: usize) -> Result<Array2<u16>, RawFileError> {
        self.check_index(index)?;
        Ok(self.data.read_slice_2d::<u16, _>(s![index, .., ..])?)
    }

    /// DAQ records of one frame, one entry per module.
    pub fn daq_records(&self, index: usize) -> Result<Vec<i64>, RawFileError> {
        self.check_index(index)?;
        let dataset = self
            .daq_rec
            .as_ref()
            .ok_or_else(|| RawFileError::MissingDataset("daq_rec".to_string()))?;
        Ok(dataset.read_slice_1d::<i64, _>(s![index, ..])?.to_vec())
    }

    /// Whether a frame passed the online consistency checks. Legacy files
    /// without the dataset report every frame as good.
    pub fn is_good_frame(&self, index: usize) -> Result<bool, RawFileError> {
        self.check_index(index)?;
        match &self.is_good_frame {
            Some(dataset) => {
                let flags = dataset.read_slice_1d::<i64, _>(s![index..index + 1])?;
                Ok(flags[0] != 0)
            }
            None => Ok(true),
        }
    }

    /// Module map of one frame, if the file stores per-frame maps.
    pub fn module_map_for(&self, index: usize) -> Option<Vec<i64>> {
        self.module_map
            .as_ref()
            .filter(|map| index < map.nrows())
            .map(|map| map.row(index).to_vec())
    }

    fn check_index(&self, index: usize) -> Result<(), RawFileError> {
        if index >= self.n_frames {
            return Err(RawFileError::FrameOutOfRange(index, self.n_frames));
        }
        Ok(())
    }
}
