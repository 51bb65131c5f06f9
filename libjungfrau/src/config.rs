//! Acquisition settings and integration service payloads.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ConfigError;

/// Structure representing a data acquisition run. Settings are
/// serializable and deserializable to YAML using serde and serde_yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    pub api_address: String,
    pub directory: PathBuf,
    pub filename: String,
    pub uid: u32,
    pub period: f64,
    pub exptime: f64,
    pub n_frames: usize,
    pub save: bool,
    pub gain_file: Option<PathBuf>,
    pub pedestal_file: Option<PathBuf>,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            api_address: String::from("http://sf-daq-1:10000"),
            directory: PathBuf::from("."),
            filename: String::from(""),
            uid: 0,
            period: 0.01,
            exptime: 0.000010,
            n_frames: 10000,
            save: true,
            gain_file: None,
            pedestal_file: None,
        }
    }
}

impl AcquisitionSettings {
    /// Read the settings from a YAML file
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// The full output file path
    pub fn output_file(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    pub fn wants_corrections_preview(&self) -> bool {
        self.gain_file.is_some() || self.pedestal_file.is_some()
    }
}

/// Writer service settings, forwarded verbatim by the integration service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    pub output_file: String,
    pub process_uid: u32,
    pub process_gid: u32,
    pub dataset_name: String,
    pub disable_processing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_messages: Option<usize>,
}

impl WriterConfig {
    /// Writer settings for the standard Jungfrau dataset layout.
    pub fn new(output_file: String, uid: u32) -> Self {
        Self {
            output_file,
            process_uid: uid,
            process_gid: uid,
            dataset_name: String::from("jungfrau/data"),
            disable_processing: false,
            n_messages: None,
        }
    }
}

/// Detector hardware settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub exptime: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<f64>,
    pub frames: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycles: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<String>,
}

impl DetectorConfig {
    /// Free-running acquisition: one cycle of `frames` frames.
    pub fn free_running(exptime: f64, period: f64, frames: usize) -> Self {
        Self {
            exptime,
            period: Some(period),
            frames,
            cycles: None,
            timing: None,
        }
    }

    /// Triggered acquisition: one frame per trigger, `cycles` triggers.
    pub fn triggered(exptime: f64, cycles: usize) -> Self {
        Self {
            exptime,
            period: None,
            frames: 1,
            cycles: Some(cycles),
            timing: Some(String::from("trigger")),
        }
    }
}

/// Backend service settings, including the optional live-corrected
/// preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub n_frames: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain_corrections_filename: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain_corrections_dataset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pede_corrections_filename: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pede_corrections_dataset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activate_corrections_preview: Option<bool>,
}

impl BackendConfig {
    pub fn new(n_frames: usize) -> Self {
        Self {
            n_frames,
            gain_corrections_filename: None,
            gain_corrections_dataset: None,
            pede_corrections_filename: None,
            pede_corrections_dataset: None,
            activate_corrections_preview: None,
        }
    }

    /// Wire calibration files into the online viewer. Both datasets carry
    /// the historical name "gains".
    pub fn with_corrections_preview(
        mut self,
        gain_file: Option<&Path>,
        pedestal_file: Option<&Path>,
    ) -> Self {
        self.gain_corrections_filename = gain_file.map(Path::to_path_buf);
        self.gain_corrections_dataset = Some(String::from("gains"));
        self.pede_corrections_filename = pedestal_file.map(Path::to_path_buf);
        self.pede_corrections_dataset = Some(String::from("gains"));
        self.activate_corrections_preview = Some(true);
        self
    }
}

/// Beam-synchronous data settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BsreadConfig {
    pub output_file: String,
    pub process_uid: u32,
    pub process_gid: u32,
    pub channels: Vec<String>,
}

impl BsreadConfig {
    /// No beam-synchronous channels are recorded.
    pub fn disabled(uid: u32) -> Self {
        Self {
            output_file: String::from("/dev/null"),
            process_uid: uid,
            process_gid: uid,
            channels: Vec::new(),
        }
    }
}

/// The full configuration accepted by the integration service.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrationConfig {
    #[serde(rename = "writer_config")]
    pub writer: WriterConfig,
    #[serde(rename = "backend_config")]
    pub backend: BackendConfig,
    #[serde(rename = "detector_config")]
    pub detector: DetectorConfig,
    #[serde(rename = "bsread_config", skip_serializing_if = "Option::is_none")]
    pub bsread: Option<BsreadConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_yaml_round_trip() {
        let settings = AcquisitionSettings::default();
        let yaml_str = serde_yaml::to_string(&settings).unwrap();
        let restored: AcquisitionSettings = serde_yaml::from_str(&yaml_str).unwrap();

        assert_eq!(restored.api_address, settings.api_address);
        assert_eq!(restored.n_frames, settings.n_frames);
        assert_eq!(restored.gain_file, None);
    }

    #[test]
    fn test_integration_config_payload_keys() {
        let config = IntegrationConfig {
            writer: WriterConfig::new(String::from("/tmp/run.h5"), 16582),
            backend: BackendConfig::new(100),
            detector: DetectorConfig::triggered(0.000010, 100),
            bsread: Some(BsreadConfig::disabled(16582)),
        };

        let payload = serde_json::to_value(&config).unwrap();
        assert!(payload.get("writer_config").is_some());
        assert!(payload.get("backend_config").is_some());
        assert!(payload.get("detector_config").is_some());
        assert!(payload.get("bsread_config").is_some());

        let detector = payload.get("detector_config").unwrap();
        assert_eq!(detector.get("frames").unwrap(), 1);
        assert_eq!(detector.get("cycles").unwrap(), 100);
        assert_eq!(detector.get("timing").unwrap(), "trigger");
        assert!(detector.get("period").is_none());

        // preview fields only appear once requested
        let backend = payload.get("backend_config").unwrap();
        assert!(backend.get("activate_corrections_preview").is_none());
    }

    #[test]
    fn test_corrections_preview() {
        let backend = BackendConfig::new(100).with_corrections_preview(
            Some(Path::new("gains.h5")),
            Some(Path::new("pedestal.res.h5")),
        );
        let payload = serde_json::to_value(&backend).unwrap();
        assert_eq!(payload.get("activate_corrections_preview").unwrap(), true);
        assert_eq!(payload.get("gain_corrections_dataset").unwrap(), "gains");
        assert_eq!(payload.get("pede_corrections_dataset").unwrap(), "gains");
    }
}
