//! Orchestration of the calibration and acquisition workflows.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Duration;

use super::client::DetectorClient;
use super::config::{
    AcquisitionSettings, BackendConfig, BsreadConfig, DetectorConfig, IntegrationConfig,
    WriterConfig,
};
use super::error::ProcessorError;
use super::pedestal::{PedestalBuilder, PedestalSettings};
use super::hdf_writer::PedestalWriter;
use super::raw_file::RawRunFile;
use super::worker_status::{ProcessPhase, WorkerStatus};

/// Pipeline status reported while the integration service is taking data.
const STATUS_RUNNING: &str = "IntegrationStatus.RUNNING";

/// Settings of a pedestal analysis run.
#[derive(Debug, Clone)]
pub struct PedestalProcessSettings {
    /// Raw pedestal run file.
    pub filename: PathBuf,
    /// Directory receiving the `.res.h5` result.
    pub directory: PathBuf,
    /// Analyze only the first this many frames.
    pub number_frames: usize,
    /// Additional pixel mask merged into the result.
    pub additional_mask: Option<PathBuf>,
    pub pedestal: PedestalSettings,
}

/// The create-pedestals pipeline: stream the raw run through a
/// [`PedestalBuilder`] and write the `.res.h5` next to the given
/// directory. Returns the output path.
pub fn build_pedestals(
    settings: &PedestalProcessSettings,
    tx: &Sender<WorkerStatus>,
) -> Result<PathBuf, ProcessorError> {
    let raw_file = RawRunFile::open(&settings.filename)?;
    let detector_name = raw_file.detector().name().to_string();

    let analyze_frames = raw_file.n_frames().min(settings.number_frames);
    log::info!(
        "{} : in pedestal file {} there are {} frames",
        detector_name,
        settings.filename.display(),
        raw_file.n_frames()
    );
    log::debug!(
        "{} : data has shape {:?}, {} bad modules",
        detector_name,
        raw_file.frame_shape(),
        raw_file.n_bad_modules()
    );

    let mut builder = PedestalBuilder::new(
        raw_file.frame_shape(),
        raw_file.n_bad_modules(),
        settings.pedestal.clone(),
    )?;

    if let Some(schedule) = &settings.pedestal.schedule {
        if !schedule.is_empty() {
            log::info!(
                "Treat this run as taken with {} frames in gain0, then {} frames in gain1 and {} frames in gain2",
                schedule.frames_g0,
                schedule.frames_g1,
                schedule.frames_g2
            );
        }
    }

    tx.send(WorkerStatus::new(0.0, ProcessPhase::Analysis))?;
    let progress_step = (analyze_frames / 100).max(1);
    let mut good_frames = 0usize;

    for index in 0..analyze_frames {
        if !raw_file.is_good_frame(index)? {
            continue;
        }
        good_frames += 1;

        let frame = raw_file.frame(index)?;
        let records = raw_file.daq_records(index)?;
        builder.append_frame(index, frame.view(), &records)?;

        if index % progress_step == 0 {
            tx.send(WorkerStatus::new(
                index as f32 / analyze_frames as f32,
                ProcessPhase::Analysis,
            ))?;
        }
    }

    if let Some(mask_path) = &settings.additional_mask {
        merge_additional_mask(&mut builder, mask_path);
    }

    log::info!(
        "{} : {} frames analyzed, {} good frames, {} frames without settings mismatch. Gain frames distribution (0,1,2,3,HG0): {:?}",
        detector_name,
        analyze_frames,
        good_frames,
        builder.slot_counts().iter().sum::<usize>(),
        builder.slot_counts()
    );

    let data = builder.finalize();

    tx.send(WorkerStatus::new(1.0, ProcessPhase::Writing))?;

    let stem = settings
        .filename
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy();
    let output = settings.directory.join(format!("{stem}.res.h5"));
    log::info!(
        "{} : output file with pedestal corrections in: {}",
        detector_name,
        output.display()
    );

    let writer = PedestalWriter::new(&output)?;
    writer.write(&data)?;
    writer.write_provenance(&settings.filename, analyze_frames)?;

    let total_pixels = data.pixel_mask.len();
    let good_pixels = data.good_pixels();
    log::info!(
        "{} : number of good pixels: {} from {} in total ({} bad pixels)",
        detector_name,
        good_pixels,
        total_pixels,
        total_pixels - good_pixels
    );

    Ok(output)
}

/// Merge an externally supplied pixel mask file. Problems are logged and
/// skipped, the analysis result stays usable without the extra mask.
fn merge_additional_mask(builder: &mut PedestalBuilder, mask_path: &Path) {
    if !mask_path.is_file() {
        log::error!(
            "Specified additional pixel mask file not found or not reachable: {}",
            mask_path.display()
        );
        return;
    }

    let mask = (|| {
        let file = hdf5::File::open(mask_path)?;
        file.dataset("pixel_mask")?.read_2d::<i32>()
    })();
    match mask {
        Ok(mask) => {
            if let Err(e) = builder.merge_external_mask(mask.view()) {
                log::error!("{e}");
            }
        }
        Err(e) => log::error!(
            "Could not read additional pixel mask from {}: {e}",
            mask_path.display()
        ),
    }
}

/// Clear the detector gain-forcing bits (register 0x5d, bits 0, 12, 13).
/// The detector needs a moment between the writes.
pub fn reset_gain_bits(client: &DetectorClient) -> Result<(), ProcessorError> {
    for bit in ["0x5d 0", "0x5d 12", "0x5d 13"] {
        std::thread::sleep(Duration::from_secs(1));
        client.set_detector_value("clearbit", bit)?;
    }
    std::thread::sleep(Duration::from_secs(1));
    Ok(())
}

/// Settings of a pedestal acquisition run.
#[derive(Debug, Clone)]
pub struct PedestalRunSettings {
    pub output_file: String,
    pub uid: u32,
    pub period: f64,
    pub exptime: f64,
    pub n_frames: usize,
    pub trigger: bool,
}

/// Record a pedestal run: a third of the frames in each gain stage,
/// stepping the detector through G0, G1 and G2 with the gain-forcing bits.
pub fn run_pedestal_acquisition(
    client: &DetectorClient,
    settings: &PedestalRunSettings,
) -> Result<(), ProcessorError> {
    let status = client.get_status()?;
    log::info!("Integration service is reachable, status: {status}");

    log::info!("Resetting gain bits");
    reset_gain_bits(client)?;

    let writer = WriterConfig::new(settings.output_file.clone(), settings.uid);
    log::info!("Writer configuration: {writer:?}");
    let detector = if settings.trigger {
        DetectorConfig::triggered(settings.exptime, settings.n_frames)
    } else {
        DetectorConfig::free_running(settings.exptime, settings.period, settings.n_frames)
    };
    let config = IntegrationConfig {
        writer,
        backend: BackendConfig::new(settings.n_frames),
        detector,
        bsread: None,
    };

    client.reset()?;
    client.set_config(&config)?;
    log::info!("Configuration in place: {}", client.get_config()?);

    let dwell = Duration::from_secs_f64(settings.n_frames as f64 * settings.period / 3.0);

    client.start()?;
    log::info!("Taking data at G0");
    std::thread::sleep(dwell);

    client.set_detector_value("setbit", "0x5d 12")?;
    log::info!("Taking data at G1");
    std::thread::sleep(dwell);

    client.set_detector_value("setbit", "0x5d 13")?;
    log::info!("Taking data at G2");
    std::thread::sleep(dwell);

    client.stop()?;
    client.reset()?;
    reset_gain_bits(client)?;
    log::info!("Done");

    Ok(())
}

/// Record a data run and wait for it to finish.
pub fn run_acquisition(
    client: &DetectorClient,
    settings: &AcquisitionSettings,
) -> Result<(), ProcessorError> {
    let status = client.get_status()?;
    log::info!("Integration service is reachable, status: {status}");

    let mut writer = WriterConfig::new(
        settings.output_file().to_string_lossy().to_string(),
        settings.uid,
    );
    writer.n_messages = Some(settings.n_frames);
    writer.disable_processing = !settings.save;
    log::info!("Writer configuration: {writer:?}");

    let mut backend = BackendConfig::new(settings.n_frames);
    if settings.wants_corrections_preview() {
        backend = backend.with_corrections_preview(
            settings.gain_file.as_deref(),
            settings.pedestal_file.as_deref(),
        );
        log::info!("Corrections in online viewer activated");
    }

    let config = IntegrationConfig {
        writer,
        backend,
        detector: DetectorConfig::triggered(settings.exptime, settings.n_frames),
        bsread: Some(BsreadConfig::disabled(settings.uid)),
    };

    client.reset()?;
    client.set_config(&config)?;
    log::info!("Configuration in place: {}", client.get_config()?);

    log::info!("Starting acquisition");
    client.start()?;

    let final_status = client.wait_while(STATUS_RUNNING, Duration::from_secs(1))?;
    log::info!("Acquisition finished with status {final_status}");

    log::info!("Stopping acquisition");
    client.reset()?;
    log::info!("Done");

    Ok(())
}
