//! # jungfrau_tools
//!
//! jungfrau_tools is the calibration and acquisition toolkit for the PSI
//! Jungfrau detectors, written in Rust. It converts raw detector readout
//! (14-bit ADC counts plus a 2-bit gain stage per pixel) into calibrated
//! images, derives pedestal corrections and pixel masks from calibration
//! runs, and drives data acquisition through the beamline integration
//! service.
//!
//! ## Installation
//!
//! ### HDF5
//!
//! Before building, HDF5 must be installed. Typically this will be
//! installed using a package manager (homebrew, apt, etc), and the Rust
//! libraries will auto detect the location of the HDF5 install. If a
//! custom install location is used, write the following snippet into the
//! file `.cargo/config.toml` in the repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! ### Building & Install
//!
//! To build and install the command line tools use
//! `cargo install --path ./jungfrau_cli` from the top level repository.
//! This installs five binaries: `jungfrau_create_pedestals`,
//! `jungfrau_run_pedestals`, `jungfrau_run`, `jungfrau_print_pixelmask`
//! and `jungfrau_convert_gainmaps`. At the beamlines, the bundled
//! `scripts/create_jungfrauclient_env.sh <alvra|bernina>` installs them
//! to the beamline configuration area.
//!
//! ## Workflow
//!
//! A pedestal calibration is a two step process. First record a pedestal
//! run with the beam shutter closed:
//!
//! ```text
//! jungfrau_run_pedestals --api http://sf-daq-1:10000 --directory /sf/bernina/data/p16582/raw
//! ```
//!
//! The detector is stepped through its three gain stages while the writer
//! stores the raw frames. Then derive the corrections:
//!
//! ```text
//! jungfrau_create_pedestals --filename pedestal_20171212_1512.h5 --directory res/
//! ```
//!
//! which produces `pedestal_20171212_1512.res.h5` holding the per-pixel,
//! per-gain pedestal values, their RMS and the pixel mask. Corrected
//! images can then be served through [`file_adapter::FileAdapter`], or
//! converted directly:
//!
//! ```no_run
//! use libjungfrau::calibration::Calibration;
//! use libjungfrau::detector::ModuleMap;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let (gain, pedestal) = (ndarray::Array3::<f32>::ones((4, 512, 1024)), ndarray::Array3::<f32>::zeros((4, 512, 1024)));
//! # let raw = ndarray::Array3::<u16>::zeros((10, 512, 1024));
//! let calibration = Calibration::new(gain, pedestal, None, false)?;
//! let corrected = calibration.convert_stack(raw.view(), &ModuleMap::identity(1))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Data formats
//!
//! Raw run files are HDF5 with the image data under
//! `data/<detector_name>/data` and per-frame bookkeeping (`daq_rec`,
//! `is_good_frame`, `module_map`) next to it; the detector name is stored
//! under `general/detector_name`. Gain maps live in a `gains` dataset of
//! shape `(4, rows, columns)` covering the G0, G1, G2 and HG0 stages.
//! Processed pedestal files carry `pixel_mask`, `gains` (pedestal means,
//! the historical dataset name) and `gainsRMS`.
//!
//! ### Pixel mask bits
//!
//! | bit | meaning                                          |
//! |-----|--------------------------------------------------|
//! | 0   | gain bits disagreed with the G0 setting          |
//! | 1   | gain bits disagreed with the G1 setting          |
//! | 3   | gain bits disagreed with the G2 setting          |
//! | 4   | gain bits disagreed with the HG0 setting         |
//! | 5   | flagged by an externally supplied mask           |
//! | 6-9 | zero RMS (dead) in plane G0, G1, G2, HG0         |
//!
//! ## Logging
//!
//! The library logs through the `log` facade; the command line tools
//! install a terminal logger plus a log file next to their output. Log
//! files contain the detailed status of a run and are worth keeping.

pub mod beamline;
pub mod calibration;
pub mod client;
pub mod config;
pub mod constants;
pub mod detector;
pub mod error;
pub mod file_adapter;
pub mod gain_maps;
pub mod geometry;
pub mod handler;
pub mod hdf_writer;
pub mod pedestal;
pub mod process;
pub mod raw_file;
pub mod worker_status;
