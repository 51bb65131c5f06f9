use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

#[derive(Debug, Clone, Error)]
pub enum DetectorError {
    #[error("Invalid detector name {0}; expected the form JF<id>T<nmod>V<version>")]
    BadName(String),
    #[error("No module layout is known for detector {0}")]
    UnknownLayout(String),
    #[error("Expected module map length {0}, provided value has length {1}")]
    BadModuleMapLength(usize, usize),
    #[error("Valid module map values are integers between -1 and {1}, found {0}")]
    BadModuleMapValue(i64, i64),
}

#[derive(Debug, Clone, Error)]
pub enum GeometryError {
    #[error("No module layout is known for detector {0}")]
    UnknownLayout(String),
    #[error("Expected image stack shape {expected:?}, provided stack has shape {found:?}")]
    BadStackShape {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

#[derive(Debug, Clone, Error)]
pub enum CalibrationError {
    #[error("Gain should have shape (4, rows, columns), provided gain has shape {0:?}")]
    BadGainShape(Vec<usize>),
    #[error("Shape mismatch: provided gain has shape {0:?}, while pedestal has shape {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),
    #[error("Expected pixel mask shape {expected:?}, provided pixel mask has shape {found:?}")]
    BadMaskShape {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("Expected image shape {expected:?}, provided image has shape {found:?}")]
    BadImageShape {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("Gain and/or pedestal values are not set")]
    MissingCalibration,
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Handler failed due to calibration error: {0}")]
    Calibration(#[from] CalibrationError),
    #[error("Handler failed due to geometry error: {0}")]
    Geometry(#[from] GeometryError),
    #[error("Handler failed due to detector error: {0}")]
    Detector(#[from] DetectorError),
}

#[derive(Debug, Clone, Error)]
pub enum PedestalError {
    #[error("Jungfrau modules are (512x1024) pixels, data frames have shape {0:?}")]
    BadFrameShape((usize, usize)),
    #[error("Expected frame shape {expected:?}, provided frame has shape {found:?}")]
    FrameShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("A pedestal frame carried no DAQ records")]
    MissingDaqRecord,
    #[error("Expected additional pixel mask shape {expected:?}, provided mask has shape {found:?}")]
    BadMaskShape {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

#[derive(Debug, Error)]
pub enum RawFileError {
    #[error("Could not open raw run file because {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Raw run file failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Raw run file failed due to detector error: {0}")]
    DetectorError(#[from] DetectorError),
    #[error("Expected a 3D data dataset, found {0} dimensions")]
    BadDataRank(usize),
    #[error("Raw run file has no {0} dataset")]
    MissingDataset(String),
    #[error("Frame index {0} is out of range; the file holds {1} frames")]
    FrameOutOfRange(usize, usize),
    #[error("Raw run file failed due to shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
}

#[derive(Debug, Clone, Error)]
pub enum BeamlineError {
    #[error("Unknown beamline {0}; valid beamlines are alvra and bernina")]
    UnknownBeamline(String),
    #[error("{0:?} is not below /sf; the file needs to be specified explicitly")]
    NotSwissfelPath(PathBuf),
    #[error("No gain file in default location: {0:?}")]
    NoGainFile(PathBuf),
    #[error("No pedestal file in default location: {0:?}")]
    NoPedestalFile(PathBuf),
    #[error("Beamline lookup failed due to IO error: {0}")]
    IOError(String),
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("File adapter failed due to raw file error: {0}")]
    RawFile(#[from] RawFileError),
    #[error("File adapter failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("File adapter failed due to calibration error: {0}")]
    Calibration(#[from] CalibrationError),
    #[error("File adapter failed due to handler error: {0}")]
    Handler(#[from] HandlerError),
    #[error("File adapter failed due to beamline error: {0}")]
    Beamline(#[from] BeamlineError),
    #[error("File adapter failed due to detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("File adapter failed due to shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
}

#[derive(Debug, Error)]
pub enum GainMapError {
    #[error("Could not open gain map file because {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Gain map file {path:?} holds {found} bytes; expected {expected}")]
    BadFileSize {
        path: PathBuf,
        expected: u64,
        found: u64,
    },
    #[error("Expected {0} module gain files for this detector, {1} were provided")]
    BadModuleCount(usize, usize),
    #[error("Gain map conversion failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Gain map conversion failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Gain map conversion failed due to shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
}

#[derive(Debug, Error)]
pub enum HDF5WriterError {
    #[error("Pedestal writer failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Pedestal writer failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Detector client failed due to HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Integration service rejected the request: {0}")]
    Service(String),
    #[error("Integration service returned an unexpected response: {0}")]
    BadResponse(String),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to raw file error: {0}")]
    RawFile(#[from] RawFileError),
    #[error("Processor failed due to pedestal error: {0}")]
    Pedestal(#[from] PedestalError),
    #[error("Processor failed due to writer error: {0}")]
    Writer(#[from] HDF5WriterError),
    #[error("Processor failed due to gain map error: {0}")]
    GainMap(#[from] GainMapError),
    #[error("Processor failed due to client error: {0}")]
    Client(#[from] ClientError),
    #[error("Processor failed due to config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Processor failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Processor failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Processor failed due to send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
}
