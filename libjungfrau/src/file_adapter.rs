//! User-facing read access to corrected data.
//!
//! The adapter opens a raw run file together with its gain and pedestal
//! files (explicit paths, or auto-located through the beamline
//! conventions) and serves calibrated frames by index, with the module map
//! synchronized per frame.

use ndarray::{s, Array2, Array3, Axis, Ix3};
use std::ops::Range;
use std::path::{Path, PathBuf};

use super::beamline::{locate_gain_file, locate_pedestal_file};
use super::calibration::Calibration;
use super::error::AdapterError;
use super::handler::FrameHandler;
use super::raw_file::RawRunFile;

/// Options controlling how a [`FileAdapter`] serves data.
#[derive(Debug, Clone, Default)]
pub struct AdapterOptions {
    /// Gain file path; auto-located below `/sf` when absent.
    pub gain_file: Option<PathBuf>,
    /// Pedestal file path; auto-located below `/sf` when absent.
    pub pedestal_file: Option<PathBuf>,
    /// Use HG0 instead of G0 calibration for the first gain stage.
    pub highgain: bool,
    /// Skip the chip-gap pixels during assembly.
    pub no_gap_pixels: bool,
}

#[derive(Debug)]
pub struct FileAdapter {
    raw_file: RawRunFile,
    handler: FrameHandler,
    gain_file: PathBuf,
    pedestal_file: PathBuf,
    /// Apply detector geometry when serving frames.
    pub geometry: bool,
}

impl FileAdapter {
    pub fn open(path: &Path, options: AdapterOptions) -> Result<Self, AdapterError> {
        let raw_file = RawRunFile::open(path)?;
        let detector_name = raw_file.detector().name().to_string();

        let gain_file = match options.gain_file {
            Some(file) => file,
            None => locate_gain_file(path, &detector_name)?,
        };
        let pedestal_file = match options.pedestal_file {
            Some(file) => file,
            None => locate_pedestal_file(path, &detector_name)?,
        };

        let gain = hdf5::File::open(&gain_file)?
            .dataset("gains")?
            .read_dyn::<f32>()?
            .into_dimensionality::<Ix3>()?;

        let pedestal_h5 = hdf5::File::open(&pedestal_file)?;
        // processed pedestal files keep the means under the historical
        // "gains" dataset name
        let pedestal = pedestal_h5
            .dataset("gains")?
            .read_dyn::<f32>()?
            .into_dimensionality::<Ix3>()?;
        let pixel_mask = pedestal_h5
            .dataset("pixel_mask")?
            .read_2d::<i32>()?
            .mapv(|flags| flags != 0);

        let calibration = Calibration::new(gain, pedestal, Some(pixel_mask), options.highgain)?;

        let mut handler = FrameHandler::new(raw_file.detector().clone());
        handler.set_calibration(calibration)?;
        handler.gap_pixels = !options.no_gap_pixels;

        Ok(Self {
            raw_file,
            handler,
            gain_file,
            pedestal_file,
            geometry: true,
        })
    }

    pub fn detector_name(&self) -> &str {
        self.raw_file.detector().name()
    }

    pub fn gain_file(&self) -> &Path {
        &self.gain_file
    }

    pub fn pedestal_file(&self) -> &Path {
        &self.pedestal_file
    }

    pub fn n_frames(&self) -> usize {
        self.raw_file.n_frames()
    }

    /// Shape of the frames this adapter serves.
    pub fn frame_shape(&self) -> (usize, usize) {
        self.handler.processed_shape(self.geometry)
    }

    /// One corrected frame.
    pub fn frame(&mut self, index: usize) -> Result<Array2<f32>, AdapterError> {
        self.sync_module_map(index)?;
        let raw = self.raw_file.frame(index)?;
        let stack = raw.view().insert_axis(Axis(0));
        let processed = self.handler.process(stack, self.geometry)?;
        Ok(processed.index_axis(Axis(0), 0).to_owned())
    }

    /// A contiguous range of corrected frames.
    pub fn frames(&mut self, range: Range<usize>) -> Result<Array3<f32>, AdapterError> {
        let (rows, cols) = self.frame_shape();
        let mut res = Array3::<f32>::zeros((range.len(), rows, cols));
        for (slot, index) in range.enumerate() {
            let frame = self.frame(index)?;
            res.slice_mut(s![slot, .., ..]).assign(&frame);
        }
        Ok(res)
    }

    /// One raw frame, assembled but not converted.
    pub fn raw_frame(&mut self, index: usize) -> Result<Array2<u16>, AdapterError> {
        self.sync_module_map(index)?;
        let raw = self.raw_file.frame(index)?;
        let stack = raw.view().insert_axis(Axis(0));
        let arranged = self
            .handler
            .arrange(stack, self.geometry)
            .map_err(super::error::HandlerError::from)?;
        Ok(arranged.index_axis(Axis(0), 0).to_owned())
    }

    fn sync_module_map(&mut self, index: usize) -> Result<(), AdapterError> {
        if let Some(slots) = self.raw_file.module_map_for(index) {
            if self.handler.module_map().as_slice() != slots.as_slice() {
                self.handler.set_module_map(Some(slots))?;
            }
        }
        Ok(())
    }
}
