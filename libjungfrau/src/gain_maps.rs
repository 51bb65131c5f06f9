//! Conversion of vendor gain calibration files to HDF5 gain maps.
//!
//! The detector group ships per-module calibration as raw little-endian
//! f64 files holding the four gain planes (G0, G1, G2, HG0) of 512x1024
//! pixels back to back. The converter stacks the modules of a detector
//! into a single `gains.h5`.

use byteorder::{LittleEndian, ReadBytesExt};
use ndarray::{s, Array3};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::constants::*;
use super::detector::Detector;
use super::error::GainMapError;

/// Size of a valid per-module vendor gain file.
pub const MODULE_GAIN_FILE_BYTES: u64 =
    (NUM_CALIBRATION_PLANES * MODULE_SIZE * std::mem::size_of::<f64>()) as u64;

/// Read the four gain planes of one module.
pub fn read_module_gain_maps(path: &Path) -> Result<Array3<f64>, GainMapError> {
    if !path.exists() {
        return Err(GainMapError::BadFilePath(path.to_path_buf()));
    }

    let size = path.metadata()?.len();
    if size != MODULE_GAIN_FILE_BYTES {
        return Err(GainMapError::BadFileSize {
            path: path.to_path_buf(),
            expected: MODULE_GAIN_FILE_BYTES,
            found: size,
        });
    }

    let mut reader = BufReader::new(File::open(path)?);
    let mut values = vec![0f64; NUM_CALIBRATION_PLANES * MODULE_SIZE];
    reader.read_f64_into::<LittleEndian>(&mut values)?;

    Ok(Array3::from_shape_vec(
        (NUM_CALIBRATION_PLANES, MODULE_SIZE_Y, MODULE_SIZE_X),
        values,
    )?)
}

/// Stack per-module gain files into a detector gain map file.
///
/// The module files must be given in module order; the result holds a
/// `gains` dataset of shape `(4, modules * 512, 1024)`.
pub fn convert_gain_maps(
    module_files: &[PathBuf],
    detector: &Detector,
    output: &Path,
) -> Result<(), GainMapError> {
    if module_files.len() != detector.n_modules() {
        return Err(GainMapError::BadModuleCount(
            detector.n_modules(),
            module_files.len(),
        ));
    }

    let (rows, cols) = detector.full_shape();
    let mut gains = Array3::<f64>::zeros((NUM_CALIBRATION_PLANES, rows, cols));

    for (index, path) in module_files.iter().enumerate() {
        let module = read_module_gain_maps(path)?;
        log::info!(
            "Read gain maps for module {index} from {} ({})",
            path.display(),
            human_bytes::human_bytes(MODULE_GAIN_FILE_BYTES as f64)
        );
        gains
            .slice_mut(s![
                ..,
                index * MODULE_SIZE_Y..(index + 1) * MODULE_SIZE_Y,
                ..
            ])
            .assign(&module);
    }

    let file = hdf5::File::create(output)?;
    file.new_dataset_builder()
        .with_data(&gains)
        .create("gains")?;

    log::info!(
        "Gain maps for {} written to {}",
        detector.name(),
        output.display()
    );
    Ok(())
}
