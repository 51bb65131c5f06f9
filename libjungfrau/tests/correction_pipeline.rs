//! End-to-end conversion checks on synthetic data, without any files.

use ndarray::{Array2, Array3, Axis};

use libjungfrau::calibration::Calibration;
use libjungfrau::detector::Detector;
use libjungfrau::handler::FrameHandler;

const ROWS: usize = 512;
const COLS: usize = 1024;

fn raw_value(code: u16, adc: u16) -> u16 {
    (code << 14) | adc
}

fn single_module_handler() -> FrameHandler {
    let detector = Detector::new("JF03T01V01").unwrap();
    let mut handler = FrameHandler::new(detector);

    // stage n: gain 10*(n+1), pedestal 100*(n+1)
    let mut gain = Array3::<f32>::zeros((4, ROWS, COLS));
    let mut pedestal = Array3::<f32>::zeros((4, ROWS, COLS));
    for plane in 0..4 {
        gain.index_axis_mut(Axis(0), plane)
            .fill((plane + 1) as f32 * 10.0);
        pedestal
            .index_axis_mut(Axis(0), plane)
            .fill((plane + 1) as f32 * 100.0);
    }

    let mut mask = Array2::<bool>::from_elem((ROWS, COLS), false);
    mask[(100, 100)] = true;

    let calibration = Calibration::new(gain, pedestal, Some(mask), false).unwrap();
    handler.set_calibration(calibration).unwrap();
    handler
}

#[test]
fn converts_and_assembles_a_stack() {
    let handler = single_module_handler();

    let mut stack = Array3::<u16>::from_elem((3, ROWS, COLS), raw_value(0, 1100));
    // one pixel per extra stage
    stack[(0, 0, 1)] = raw_value(1, 1200);
    stack[(0, 0, 2)] = raw_value(3, 1500);

    let res = handler.process(stack.view(), true).unwrap();
    assert_eq!(res.shape(), &[3, 514, 1030]);

    // G0: (1100 - 100) / 10
    assert_eq!(res[(0, 0, 0)], 100.0);
    // G1: (1200 - 200) / 20
    assert_eq!(res[(0, 0, 1)], 50.0);
    // G2: (1500 - 300) / 30
    assert_eq!(res[(0, 0, 2)], 40.0);

    // masked pixel is forced to zero; position shifts by the chip gaps
    assert_eq!(res[(0, 100, 100)], 0.0);

    // chip gap rows and columns stay empty
    assert_eq!(res[(0, 256, 0)], 0.0);
    assert_eq!(res[(0, 0, 256)], 0.0);

    // every frame of the stack is converted
    assert_eq!(res[(2, 0, 0)], 100.0);
}

#[test]
fn raw_arrangement_keeps_counts() {
    let handler = single_module_handler();

    let stack = Array3::<u16>::from_elem((1, ROWS, COLS), raw_value(0, 1234));
    let arranged = handler.arrange(stack.view(), true).unwrap();

    assert_eq!(arranged.shape(), &[1, 514, 1030]);
    assert_eq!(arranged[(0, 0, 0)], raw_value(0, 1234));
    assert_eq!(arranged[(0, 256, 0)], 0);
}

#[test]
fn processed_shape_matches_output() {
    let mut handler = single_module_handler();

    assert_eq!(handler.processed_shape(true), (514, 1030));
    assert_eq!(handler.processed_shape(false), (514, 1030));

    handler.gap_pixels = false;
    assert_eq!(handler.processed_shape(true), (512, 1024));
    assert_eq!(handler.processed_shape(false), (512, 1024));

    let stack = Array3::<u16>::zeros((1, ROWS, COLS));
    let res = handler.process(stack.view(), true).unwrap();
    assert_eq!(res.shape(), &[1, 512, 1024]);
}
