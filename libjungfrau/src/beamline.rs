//! SwissFEL beamline path conventions.
//!
//! Gain maps and processed pedestals live at fixed locations below
//! `/sf/<beamline>`; given a data file path, both can be located without
//! further input. Files stored anywhere else have to be specified
//! explicitly.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use super::error::BeamlineError;

/// The beamlines operating a Jungfrau detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beamline {
    Alvra,
    Bernina,
}

impl FromStr for Beamline {
    type Err = BeamlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alvra" => Ok(Self::Alvra),
            "bernina" => Ok(Self::Bernina),
            _ => Err(BeamlineError::UnknownBeamline(s.to_string())),
        }
    }
}

impl fmt::Display for Beamline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alvra => write!(f, "alvra"),
            Self::Bernina => write!(f, "bernina"),
        }
    }
}

impl Beamline {
    /// Derive the beamline from a path of the form `/sf/<beamline>/...`.
    pub fn from_data_path(path: &Path) -> Result<Self, BeamlineError> {
        let mut components = path.components();
        if components.next() != Some(Component::RootDir) {
            return Err(BeamlineError::NotSwissfelPath(path.to_path_buf()));
        }
        if components.next() != Some(Component::Normal("sf".as_ref())) {
            return Err(BeamlineError::NotSwissfelPath(path.to_path_buf()));
        }
        match components.next() {
            Some(Component::Normal(name)) => name
                .to_str()
                .ok_or_else(|| BeamlineError::NotSwissfelPath(path.to_path_buf()))?
                .parse(),
            _ => Err(BeamlineError::NotSwissfelPath(path.to_path_buf())),
        }
    }

    /// Default gain map location for a detector at this beamline.
    pub fn gain_map_file(&self, detector_name: &str) -> PathBuf {
        PathBuf::from("/sf")
            .join(self.to_string())
            .join("config/jungfrau/gainMaps")
            .join(detector_name)
            .join("gains.h5")
    }
}

/// Locate the gain file for a data file below `/sf`.
pub fn locate_gain_file(data_file: &Path, detector_name: &str) -> Result<PathBuf, BeamlineError> {
    let beamline = Beamline::from_data_path(data_file)?;
    let gain_file = beamline.gain_map_file(detector_name);

    if !gain_file.is_file() {
        return Err(BeamlineError::NoGainFile(
            gain_file.parent().unwrap_or(&gain_file).to_path_buf(),
        ));
    }

    log::info!("Auto-located gain file: {}", gain_file.display());
    Ok(gain_file)
}

/// Locate the processed pedestal file for a data file below `/sf`.
///
/// Among `<pgroup>/res/JF_pedestals/` entries whose name carries the
/// detector name, the one written closest in time to the data file wins.
pub fn locate_pedestal_file(
    data_file: &Path,
    detector_name: &str,
) -> Result<PathBuf, BeamlineError> {
    Beamline::from_data_path(data_file)?;

    // /sf/<beamline>/data/<pgroup>/res/JF_pedestals
    let mut pedestal_dir = PathBuf::new();
    for component in data_file.components().take(5) {
        pedestal_dir.push(component);
    }
    pedestal_dir.push("res");
    pedestal_dir.push("JF_pedestals");

    let data_mtime = modified_time(data_file)?;

    let mut closest: Option<(PathBuf, i64)> = None;
    let entries = std::fs::read_dir(&pedestal_dir)
        .map_err(|e| BeamlineError::IOError(e.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|e| BeamlineError::IOError(e.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches_detector = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.contains(detector_name))
            .unwrap_or(false);
        if !matches_detector {
            continue;
        }

        let mtime_diff = data_mtime - modified_time(&path)?;
        if closest
            .as_ref()
            .map(|(_, best)| mtime_diff.abs() < best.abs())
            .unwrap_or(true)
        {
            closest = Some((path, mtime_diff));
        }
    }

    let (pedestal_file, mtime_diff) =
        closest.ok_or(BeamlineError::NoPedestalFile(pedestal_dir))?;

    log::info!("Auto-located pedestal file: {}", pedestal_file.display());
    log::info!("    mtime difference: {}", format_time_delta(mtime_diff));

    Ok(pedestal_file)
}

fn modified_time(path: &Path) -> Result<i64, BeamlineError> {
    let modified = std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|e| BeamlineError::IOError(e.to_string()))?;

    match modified.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => Ok(duration.as_secs() as i64),
        Err(e) => Ok(-(e.duration().as_secs() as i64)),
    }
}

fn format_time_delta(seconds: i64) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let seconds = seconds.abs();
    format!(
        "{sign}{}:{:02}:{:02}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beamline_parsing() {
        assert_eq!("alvra".parse::<Beamline>().unwrap(), Beamline::Alvra);
        assert_eq!("bernina".parse::<Beamline>().unwrap(), Beamline::Bernina);
        assert!(matches!(
            "maloja".parse::<Beamline>(),
            Err(BeamlineError::UnknownBeamline(_))
        ));
    }

    #[test]
    fn test_beamline_from_data_path() {
        let path = Path::new("/sf/bernina/data/p16582/raw/run_23.h5");
        assert_eq!(Beamline::from_data_path(path).unwrap(), Beamline::Bernina);

        assert!(Beamline::from_data_path(Path::new("/gpfs/data/run_23.h5")).is_err());
        assert!(Beamline::from_data_path(Path::new("run_23.h5")).is_err());
    }

    #[test]
    fn test_gain_map_file_location() {
        let gain_file = Beamline::Alvra.gain_map_file("JF06T32V01");
        assert_eq!(
            gain_file,
            PathBuf::from("/sf/alvra/config/jungfrau/gainMaps/JF06T32V01/gains.h5")
        );
    }

    #[test]
    fn test_format_time_delta() {
        assert_eq!(format_time_delta(0), "0:00:00");
        assert_eq!(format_time_delta(3723), "1:02:03");
        assert_eq!(format_time_delta(-61), "-0:01:01");
    }
}
