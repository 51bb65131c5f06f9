//! End-to-end pedestal analysis: synthetic raw run file in, processed
//! pedestal file out, corrected frames through the file adapter.

use ndarray::{arr0, Array1, Array2, Array3};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc::channel;

use libjungfrau::file_adapter::{AdapterOptions, FileAdapter};
use libjungfrau::pedestal::PedestalSettings;
use libjungfrau::process::{build_pedestals, PedestalProcessSettings};

const DETECTOR_NAME: &str = "JF03T01V01";
const ROWS: usize = 512;
const COLS: usize = 1024;

/// Two frames per stage (G0, G1, G2, HG0), ADC alternating +-2 around
/// 100 * (slot index + 1) so every plane gets mean 100*(n+1) and RMS 2.
fn frame_plan() -> Vec<(u16, i64, u16)> {
    // (gain code, daq record, mean adc)
    vec![
        (0, 0, 100),
        (0, 0, 100),
        (1, 1 << 12, 200),
        (1, 1 << 12, 200),
        (3, 3 << 12, 300),
        (3, 3 << 12, 300),
        (0, 1, 400), // high G0
        (0, 1, 400),
    ]
}

fn write_raw_run_file(path: &Path) {
    let plan = frame_plan();
    let n_frames = plan.len();

    let mut data = Array3::<u16>::zeros((n_frames, ROWS, COLS));
    let mut daq_rec = Array2::<i64>::zeros((n_frames, 1));
    for (index, (code, record, mean_adc)) in plan.into_iter().enumerate() {
        let adc = if index % 2 == 0 {
            mean_adc - 2
        } else {
            mean_adc + 2
        };
        data.slice_mut(ndarray::s![index, .., ..])
            .fill((code << 14) | adc);
        daq_rec[(index, 0)] = record;
    }

    let file = hdf5::File::create(path).unwrap();

    let general = file.create_group("general").unwrap();
    general
        .new_dataset_builder()
        .with_data(&arr0(
            hdf5::types::VarLenUnicode::from_str(DETECTOR_NAME).unwrap(),
        ))
        .create("detector_name")
        .unwrap();
    general
        .new_dataset_builder()
        .with_data(&arr0(0i64))
        .create("n_bad_modules")
        .unwrap();

    let detector_group = file
        .create_group("data")
        .unwrap()
        .create_group(DETECTOR_NAME)
        .unwrap();
    detector_group
        .new_dataset_builder()
        .with_data(&data)
        .create("data")
        .unwrap();
    detector_group
        .new_dataset_builder()
        .with_data(&daq_rec)
        .create("daq_rec")
        .unwrap();
    detector_group
        .new_dataset_builder()
        .with_data(&Array1::<i64>::ones(n_frames))
        .create("is_good_frame")
        .unwrap();
}

fn write_gain_file(path: &Path) {
    let gains = Array3::<f32>::from_elem((4, ROWS, COLS), 10.0);
    let file = hdf5::File::create(path).unwrap();
    file.new_dataset_builder()
        .with_data(&gains)
        .create("gains")
        .unwrap();
}

fn run_pedestal_analysis(dir: &Path) -> PathBuf {
    let raw_path = dir.join("pedestal_20240101_1200.h5");
    write_raw_run_file(&raw_path);

    let settings = PedestalProcessSettings {
        filename: raw_path,
        directory: dir.to_path_buf(),
        number_frames: usize::MAX,
        additional_mask: None,
        pedestal: PedestalSettings::default(),
    };

    let (tx, rx) = channel();
    let output = build_pedestals(&settings, &tx).unwrap();
    drop(rx);

    assert_eq!(output, dir.join("pedestal_20240101_1200.res.h5"));
    output
}

#[test]
fn pedestal_file_holds_means_rms_and_mask() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_pedestal_analysis(dir.path());

    let file = hdf5::File::open(&output).unwrap();

    let pedestal = file.dataset("gains").unwrap().read_dyn::<f64>().unwrap();
    assert_eq!(pedestal.shape(), &[4, ROWS, COLS]);
    for plane in 0..4 {
        let expected = 100.0 * (plane + 1) as f64;
        let value = pedestal[[plane, 17, 1000]];
        assert!(
            (value - expected).abs() < 1e-9,
            "plane {plane}: {value} != {expected}"
        );
    }

    let rms = file.dataset("gainsRMS").unwrap().read_dyn::<f64>().unwrap();
    for plane in 0..4 {
        assert!((rms[[plane, 17, 1000]] - 2.0).abs() < 1e-9);
    }

    // every plane saw two distinct values, so no pixel is masked
    let mask = file.dataset("pixel_mask").unwrap().read_2d::<i32>().unwrap();
    assert_eq!(mask.dim(), (ROWS, COLS));
    assert!(mask.iter().all(|&flags| flags == 0));

    let frames_analyzed = file
        .attr("frames_analyzed")
        .unwrap()
        .read_scalar::<u64>()
        .unwrap();
    assert_eq!(frames_analyzed, 8);
}

#[test]
fn file_adapter_serves_corrected_frames() {
    let dir = tempfile::tempdir().unwrap();
    let pedestal_file = run_pedestal_analysis(dir.path());

    let gain_file = dir.path().join("gains.h5");
    write_gain_file(&gain_file);

    let raw_path = dir.path().join("pedestal_20240101_1200.h5");
    let mut adapter = FileAdapter::open(
        &raw_path,
        AdapterOptions {
            gain_file: Some(gain_file.clone()),
            pedestal_file: Some(pedestal_file.clone()),
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(adapter.detector_name(), DETECTOR_NAME);
    assert_eq!(adapter.gain_file(), gain_file.as_path());
    assert_eq!(adapter.pedestal_file(), pedestal_file.as_path());
    assert_eq!(adapter.n_frames(), 8);
    assert_eq!(adapter.frame_shape(), (514, 1030));

    // frame 0: G0, ADC 98, pedestal 100, gain 10
    let frame = adapter.frame(0).unwrap();
    assert_eq!(frame.dim(), (514, 1030));
    assert!((frame[(0, 0)] + 0.2).abs() < 1e-4);
    // chip gap
    assert_eq!(frame[(256, 0)], 0.0);

    // frame 3: G1, ADC 202, pedestal 200, gain 10
    let frame = adapter.frame(3).unwrap();
    assert!((frame[(0, 0)] - 0.2).abs() < 1e-4);

    let stack = adapter.frames(0..3).unwrap();
    assert_eq!(stack.shape(), &[3, 514, 1030]);

    // raw access keeps the encoded values
    let raw = adapter.raw_frame(1).unwrap();
    assert_eq!(raw[(0, 0)], 102);
}
