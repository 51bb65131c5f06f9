//! Gain/pedestal conversion of raw detector frames.
//!
//! A raw pixel is 16 bits: the two most significant bits select the gain
//! stage (codes 0, 1 and 3 are produced by the detector; the undefined
//! code 2 is treated as stage 2), the low 14 bits are ADC counts. The
//! converted value is `(adc - pedestal[stage]) / gain[stage]` in keV.

use ndarray::{s, Array2, Array3, ArrayView2, ArrayViewMut2, ArrayView3, Axis};

use super::constants::*;
use super::detector::ModuleMap;
use super::error::CalibrationError;

/// Stage order used to prime the conversion cache: the first stage is G0
/// normally and HG0 in high-gain mode.
const STAGE_ORDER: [usize; NUM_GAIN_STAGES] = [0, 1, 2];
const STAGE_ORDER_HIGHGAIN: [usize; NUM_GAIN_STAGES] = [3, 1, 2];

/// Per-pixel calibration constants plus the flattened conversion cache.
///
/// Gain and pedestal are stored as `(4, rows, columns)` planes (G0, G1, G2,
/// HG0). For conversion the three active stages are kept interleaved per
/// pixel as `[1/g, p]` pairs, so the hot loop touches a single contiguous
/// cache line per pixel.
#[derive(Debug, Clone)]
pub struct Calibration {
    gain: Array3<f32>,
    pedestal: Array3<f32>,
    pixel_mask: Option<Array2<bool>>,
    highgain: bool,
    shape: (usize, usize),
    gp: Vec<f32>,
}

impl Calibration {
    pub fn new(
        gain: Array3<f32>,
        pedestal: Array3<f32>,
        pixel_mask: Option<Array2<bool>>,
        highgain: bool,
    ) -> Result<Self, CalibrationError> {
        if gain.shape()[0] != NUM_CALIBRATION_PLANES {
            return Err(CalibrationError::BadGainShape(gain.shape().to_vec()));
        }

        if gain.shape() != pedestal.shape() {
            return Err(CalibrationError::ShapeMismatch(
                gain.shape().to_vec(),
                pedestal.shape().to_vec(),
            ));
        }

        let shape = (gain.shape()[1], gain.shape()[2]);

        if let Some(mask) = &pixel_mask {
            if mask.dim() != shape {
                return Err(CalibrationError::BadMaskShape {
                    expected: shape,
                    found: mask.dim(),
                });
            }
        }

        let mut calibration = Self {
            gain,
            pedestal,
            pixel_mask,
            highgain,
            shape,
            gp: vec![0.0; shape.0 * shape.1 * 2 * NUM_GAIN_STAGES],
        };
        calibration.rebuild_cache();

        Ok(calibration)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn gain(&self) -> &Array3<f32> {
        &self.gain
    }

    pub fn pedestal(&self) -> &Array3<f32> {
        &self.pedestal
    }

    pub fn pixel_mask(&self) -> Option<&Array2<bool>> {
        self.pixel_mask.as_ref()
    }

    pub fn highgain(&self) -> bool {
        self.highgain
    }

    /// Switch between G0 and HG0 for the first stage. Only the first
    /// interleaved stage needs repriming.
    pub fn set_highgain(&mut self, value: bool) {
        if self.highgain == value {
            return;
        }
        self.highgain = value;

        let plane = self.stage_order()[0];
        let (rows, cols) = self.shape;
        let gain = self.gain.index_axis(Axis(0), plane);
        let pedestal = self.pedestal.index_axis(Axis(0), plane);
        for y in 0..rows {
            for x in 0..cols {
                let base = (y * cols + x) * 2 * NUM_GAIN_STAGES;
                self.gp[base] = 1.0 / gain[(y, x)];
                self.gp[base + 1] = pedestal[(y, x)];
            }
        }
    }

    fn stage_order(&self) -> [usize; NUM_GAIN_STAGES] {
        if self.highgain {
            STAGE_ORDER_HIGHGAIN
        } else {
            STAGE_ORDER
        }
    }

    fn rebuild_cache(&mut self) {
        let (rows, cols) = self.shape;
        for (stage, &plane) in self.stage_order().iter().enumerate() {
            let gain = self.gain.index_axis(Axis(0), plane);
            let pedestal = self.pedestal.index_axis(Axis(0), plane);
            for y in 0..rows {
                for x in 0..cols {
                    let base = (y * cols + x) * 2 * NUM_GAIN_STAGES + 2 * stage;
                    self.gp[base] = 1.0 / gain[(y, x)];
                    self.gp[base + 1] = pedestal[(y, x)];
                }
            }
        }
    }

    /// Convert a full-detector raw frame.
    pub fn convert_frame(&self, raw: ArrayView2<'_, u16>) -> Result<Array2<f32>, CalibrationError> {
        if raw.dim() != self.shape {
            return Err(CalibrationError::BadImageShape {
                expected: self.shape,
                found: raw.dim(),
            });
        }

        let mut res = Array2::<f32>::zeros(raw.dim());
        match &self.pixel_mask {
            None => convert_block(&raw, &self.gp, &mut res.view_mut()),
            Some(mask) => convert_block_masked(&raw, &self.gp, &mask.view(), &mut res.view_mut()),
        }

        Ok(res)
    }

    /// Convert a raw stack module by module through the module map, so
    /// calibration constants line up with their physical module and absent
    /// modules are skipped.
    pub fn convert_stack(
        &self,
        stack: ArrayView3<'_, u16>,
        module_map: &ModuleMap,
    ) -> Result<Array3<f32>, CalibrationError> {
        let expected = (module_map.n_active() * MODULE_SIZE_Y, self.shape.1);
        let found = (stack.shape()[1], stack.shape()[2]);
        if found != expected {
            return Err(CalibrationError::BadImageShape { expected, found });
        }

        let cols = self.shape.1;
        let module_gp = MODULE_SIZE_Y * cols * 2 * NUM_GAIN_STAGES;
        let mut res = Array3::<f32>::zeros(stack.raw_dim());

        for (index, slot) in module_map.iter() {
            let Some(slot) = slot else { continue };
            let rows = slot * MODULE_SIZE_Y..(slot + 1) * MODULE_SIZE_Y;
            let gp = &self.gp[index * module_gp..(index + 1) * module_gp];
            let mask = self
                .pixel_mask
                .as_ref()
                .map(|m| m.slice(s![index * MODULE_SIZE_Y..(index + 1) * MODULE_SIZE_Y, ..]));

            for i in 0..stack.shape()[0] {
                let raw = stack.slice(s![i, rows.clone(), ..]);
                let mut out = res.slice_mut(s![i, rows.clone(), ..]);
                match &mask {
                    None => convert_block(&raw, gp, &mut out),
                    Some(mask) => convert_block_masked(&raw, gp, mask, &mut out),
                }
            }
        }

        Ok(res)
    }
}

#[inline]
fn stage_of(code: u16) -> usize {
    // the detector emits codes 0, 1 and 3; both 2 and 3 select stage 2
    if code >= 2 {
        2
    } else {
        code as usize
    }
}

fn convert_block(raw: &ArrayView2<'_, u16>, gp: &[f32], res: &mut ArrayViewMut2<'_, f32>) {
    let cols = raw.shape()[1];
    for (y, row) in raw.outer_iter().enumerate() {
        for (x, &value) in row.iter().enumerate() {
            let stage = stage_of(value >> GAIN_BIT_SHIFT);
            let adc = (value & ADC_MASK) as f32;
            let base = (y * cols + x) * 2 * NUM_GAIN_STAGES + 2 * stage;
            res[(y, x)] = (adc - gp[base + 1]) * gp[base];
        }
    }
}

fn convert_block_masked(
    raw: &ArrayView2<'_, u16>,
    gp: &[f32],
    mask: &ArrayView2<'_, bool>,
    res: &mut ArrayViewMut2<'_, f32>,
) {
    let cols = raw.shape()[1];
    for (y, row) in raw.outer_iter().enumerate() {
        for (x, &value) in row.iter().enumerate() {
            if mask[(y, x)] {
                res[(y, x)] = 0.0;
                continue;
            }
            let stage = stage_of(value >> GAIN_BIT_SHIFT);
            let adc = (value & ADC_MASK) as f32;
            let base = (y * cols + x) * 2 * NUM_GAIN_STAGES + 2 * stage;
            res[(y, x)] = (adc - gp[base + 1]) * gp[base];
        }
    }
}

/// Split raw values into the gain codes and the ADC counts.
pub fn gain_and_data(raw: ArrayView2<'_, u16>) -> (Array2<u8>, Array2<u16>) {
    let codes = raw.mapv(|v| (v >> GAIN_BIT_SHIFT) as u8);
    let data = raw.mapv(|v| v & ADC_MASK);
    (codes, data)
}

/// Raw value reported by saturated pixels for the given high-gain setting.
pub fn saturation_value(highgain: bool) -> u16 {
    if highgain {
        SATURATED_VALUE_HIGHGAIN
    } else {
        SATURATED_VALUE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn test_calibration(mask: Option<Array2<bool>>, highgain: bool) -> Calibration {
        let mut gain = Array3::<f32>::zeros((4, 2, 3));
        let mut pedestal = Array3::<f32>::zeros((4, 2, 3));
        for plane in 0..4 {
            gain.index_axis_mut(Axis(0), plane)
                .fill((plane + 1) as f32 * 10.0);
            pedestal
                .index_axis_mut(Axis(0), plane)
                .fill((plane + 1) as f32 * 100.0);
        }
        Calibration::new(gain, pedestal, mask, highgain).unwrap()
    }

    fn raw_value(code: u16, adc: u16) -> u16 {
        (code << 14) | adc
    }

    #[test]
    fn test_shape_validation() {
        let gain = Array3::<f32>::ones((3, 2, 3));
        let pedestal = Array3::<f32>::ones((3, 2, 3));
        assert!(matches!(
            Calibration::new(gain, pedestal, None, false),
            Err(CalibrationError::BadGainShape(_))
        ));

        let gain = Array3::<f32>::ones((4, 2, 3));
        let pedestal = Array3::<f32>::ones((4, 2, 4));
        assert!(matches!(
            Calibration::new(gain, pedestal, None, false),
            Err(CalibrationError::ShapeMismatch(_, _))
        ));

        let gain = Array3::<f32>::ones((4, 2, 3));
        let pedestal = Array3::<f32>::ones((4, 2, 3));
        let mask = Array2::<bool>::from_elem((3, 3), false);
        assert!(matches!(
            Calibration::new(gain, pedestal, Some(mask), false),
            Err(CalibrationError::BadMaskShape { .. })
        ));
    }

    #[test]
    fn test_conversion_per_stage() {
        let calibration = test_calibration(None, false);
        let raw = ndarray::arr2(&[
            [raw_value(0, 1100), raw_value(1, 1200), raw_value(3, 1300)],
            [raw_value(2, 1300), raw_value(0, 100), raw_value(0, 0)],
        ]);

        let res = calibration.convert_frame(raw.view()).unwrap();
        // stage 0: (1100 - 100) / 10
        assert_eq!(res[(0, 0)], 100.0);
        // stage 1: (1200 - 200) / 20
        assert_eq!(res[(0, 1)], 50.0);
        // code 3 selects stage 2: (1300 - 300) / 30
        assert!((res[(0, 2)] - 1000.0 / 30.0).abs() < 1e-4);
        // the undefined code 2 also selects stage 2
        assert!((res[(1, 0)] - 1000.0 / 30.0).abs() < 1e-4);
        assert_eq!(res[(1, 1)], 0.0);
        assert_eq!(res[(1, 2)], -10.0);
    }

    #[test]
    fn test_conversion_masked() {
        let mut mask = Array2::<bool>::from_elem((2, 3), false);
        mask[(0, 0)] = true;
        let calibration = test_calibration(Some(mask), false);

        let raw = Array2::<u16>::from_elem((2, 3), raw_value(0, 1100));
        let res = calibration.convert_frame(raw.view()).unwrap();
        assert_eq!(res[(0, 0)], 0.0);
        assert_eq!(res[(0, 1)], 100.0);
    }

    #[test]
    fn test_highgain_uses_last_plane() {
        let mut calibration = test_calibration(None, true);
        let raw = Array2::<u16>::from_elem((2, 3), raw_value(0, 1200));

        let res = calibration.convert_frame(raw.view()).unwrap();
        // HG0: (1200 - 400) / 40
        assert_eq!(res[(0, 0)], 20.0);

        calibration.set_highgain(false);
        let res = calibration.convert_frame(raw.view()).unwrap();
        assert_eq!(res[(0, 0)], 110.0);

        // stages 1 and 2 are untouched by the switch
        let raw = Array2::<u16>::from_elem((2, 3), raw_value(1, 1200));
        let res = calibration.convert_frame(raw.view()).unwrap();
        assert_eq!(res[(0, 0)], 50.0);
    }

    #[test]
    fn test_frame_shape_is_checked() {
        let calibration = test_calibration(None, false);
        let raw = Array2::<u16>::zeros((3, 3));
        assert!(matches!(
            calibration.convert_frame(raw.view()),
            Err(CalibrationError::BadImageShape { .. })
        ));
    }

    #[test]
    fn test_gain_and_data() {
        let raw = ndarray::arr2(&[[raw_value(3, 17), raw_value(0, 16383)]]);
        let (codes, data) = gain_and_data(raw.view());
        assert_eq!(codes[(0, 0)], 3);
        assert_eq!(data[(0, 0)], 17);
        assert_eq!(codes[(0, 1)], 0);
        assert_eq!(data[(0, 1)], 16383);
    }

    #[test]
    fn test_saturation_value() {
        assert_eq!(saturation_value(false), 49152);
        assert_eq!(saturation_value(true), 16383);
    }
}
