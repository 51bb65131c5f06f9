//! Frame processing pipeline: conversion, module mapping, assembly.

use ndarray::{s, Array2, Array3, ArrayView3, Axis};

use super::calibration::{saturation_value, Calibration};
use super::constants::*;
use super::detector::{Detector, ModuleMap};
use super::error::{CalibrationError, GeometryError, HandlerError};
use super::geometry::{add_gap_pixels, assemble_stack};

/// Applies calibration and geometry to raw frame stacks of one detector.
///
/// The handler owns the current module map, so files where modules drop in
/// and out between frames keep their calibration constants aligned.
#[derive(Debug)]
pub struct FrameHandler {
    detector: Detector,
    calibration: Option<Calibration>,
    module_map: ModuleMap,
    /// Insert the dead chip-gap pixels during assembly.
    pub gap_pixels: bool,
}

impl FrameHandler {
    pub fn new(detector: Detector) -> Self {
        let module_map = ModuleMap::identity(detector.n_modules());
        Self {
            detector,
            calibration: None,
            module_map,
            gap_pixels: true,
        }
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Attach calibration constants; their shape must cover the full
    /// detector.
    pub fn set_calibration(&mut self, calibration: Calibration) -> Result<(), CalibrationError> {
        let expected = self.detector.full_shape();
        if calibration.shape() != expected {
            return Err(CalibrationError::BadImageShape {
                expected,
                found: calibration.shape(),
            });
        }
        self.calibration = Some(calibration);
        Ok(())
    }

    pub fn module_map(&self) -> &ModuleMap {
        &self.module_map
    }

    /// Update the module map; `None` restores the all-modules-present map
    /// used for legacy data.
    pub fn set_module_map(&mut self, slots: Option<Vec<i64>>) -> Result<(), HandlerError> {
        self.module_map = match slots {
            Some(slots) => ModuleMap::new(slots, &self.detector)?,
            None => ModuleMap::identity(self.detector.n_modules()),
        };
        Ok(())
    }

    /// Shape of raw frames under the current module map.
    pub fn raw_shape(&self) -> (usize, usize) {
        self.detector.raw_shape(self.module_map.n_active())
    }

    /// Shape of processed frames for the given geometry setting.
    pub fn processed_shape(&self, geometry: bool) -> (usize, usize) {
        if geometry {
            self.detector.assembled_shape(self.gap_pixels)
        } else if self.gap_pixels && !self.detector.is_stripsel() {
            self.detector.shape_with_gaps(self.module_map.n_active())
        } else {
            self.raw_shape()
        }
    }

    pub fn can_convert(&self) -> bool {
        self.calibration.is_some()
    }

    /// Convert a raw stack to keV without geometry.
    pub fn convert_stack(
        &self,
        stack: ArrayView3<'_, u16>,
    ) -> Result<Array3<f32>, CalibrationError> {
        let calibration = self
            .calibration
            .as_ref()
            .ok_or(CalibrationError::MissingCalibration)?;
        calibration.convert_stack(stack, &self.module_map)
    }

    /// Full pipeline: conversion plus assembly or gap insertion.
    pub fn process(
        &self,
        stack: ArrayView3<'_, u16>,
        geometry: bool,
    ) -> Result<Array3<f32>, HandlerError> {
        let converted = self.convert_stack(stack)?;
        Ok(self.arrange(converted.view(), geometry)?)
    }

    /// Assembly or gap insertion without conversion, keeping the element
    /// type.
    pub fn arrange<T: Copy + Default>(
        &self,
        stack: ArrayView3<'_, T>,
        geometry: bool,
    ) -> Result<Array3<T>, GeometryError> {
        if geometry {
            assemble_stack(&self.detector, stack, &self.module_map, self.gap_pixels)
        } else if self.gap_pixels && !self.detector.is_stripsel() {
            add_gap_pixels(&self.detector, stack, &self.module_map)
        } else {
            Ok(stack.to_owned())
        }
    }

    /// Per-pixel gain codes of a raw stack, arranged like processed data.
    pub fn gain_codes(
        &self,
        stack: ArrayView3<'_, u16>,
        geometry: bool,
    ) -> Result<Array3<u8>, GeometryError> {
        let codes = stack.mapv(|v| (v >> GAIN_BIT_SHIFT) as u8);
        self.arrange(codes.view(), geometry)
    }

    /// Per-pixel saturation flags of a raw stack, arranged like processed
    /// data.
    pub fn saturated_pixels(
        &self,
        stack: ArrayView3<'_, u16>,
        geometry: bool,
    ) -> Result<Array3<bool>, GeometryError> {
        let value = self.saturation_value();
        let saturated = stack.mapv(|v| v == value);
        self.arrange(saturated.view(), geometry)
    }

    pub fn saturation_value(&self) -> u16 {
        let highgain = self
            .calibration
            .as_ref()
            .map(|c| c.highgain())
            .unwrap_or(false);
        saturation_value(highgain)
    }

    /// The calibration pixel mask arranged like processed data. Chip gaps
    /// and absent modules count as masked.
    pub fn arranged_pixel_mask(&self, geometry: bool) -> Option<Array2<bool>> {
        let mask = self.calibration.as_ref()?.pixel_mask()?;

        // assemble "good" flags so that the default-filled gaps come out
        // masked after inversion
        let (raw_y, raw_x) = self.raw_shape();
        let mut good = Array3::<bool>::from_elem((1, raw_y, raw_x), false);
        for (index, slot) in self.module_map.iter() {
            let Some(slot) = slot else { continue };
            let module = mask.slice(s![index * MODULE_SIZE_Y..(index + 1) * MODULE_SIZE_Y, ..]);
            good.slice_mut(s![0, slot * MODULE_SIZE_Y..(slot + 1) * MODULE_SIZE_Y, ..])
                .assign(&module.mapv(|masked| !masked));
        }

        let arranged = self.arrange(good.view(), geometry).ok()?;
        Some(arranged.index_axis(Axis(0), 0).mapv(|good| !good))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    fn handler_with_calibration() -> FrameHandler {
        let detector = Detector::new("JF03T01V01").unwrap();
        let mut handler = FrameHandler::new(detector);

        let gain = Array3::<f32>::from_elem((4, 512, 1024), 10.0);
        let pedestal = Array3::<f32>::from_elem((4, 512, 1024), 100.0);
        let mut mask = Array2::<bool>::from_elem((512, 1024), false);
        mask[(0, 5)] = true;
        let calibration = Calibration::new(gain, pedestal, Some(mask), false).unwrap();
        handler.set_calibration(calibration).unwrap();
        handler
    }

    #[test]
    fn test_process_with_geometry() {
        let handler = handler_with_calibration();
        let stack = Array3::<u16>::from_elem((2, 512, 1024), 1100);

        let res = handler.process(stack.view(), true).unwrap();
        assert_eq!(res.shape(), &[2, 514, 1030]);
        assert_eq!(res[(0, 0, 0)], 100.0);
        // masked pixel and chip gap stay zero
        assert_eq!(res[(0, 0, 5)], 0.0);
        assert_eq!(res[(0, 256, 0)], 0.0);
    }

    #[test]
    fn test_process_without_geometry_keeps_gaps_flag() {
        let mut handler = handler_with_calibration();
        let stack = Array3::<u16>::from_elem((1, 512, 1024), 1100);

        let res = handler.process(stack.view(), false).unwrap();
        assert_eq!(res.shape(), &[1, 514, 1030]);

        handler.gap_pixels = false;
        let res = handler.process(stack.view(), false).unwrap();
        assert_eq!(res.shape(), &[1, 512, 1024]);
    }

    #[test]
    fn test_conversion_requires_calibration() {
        let detector = Detector::new("JF03T01V01").unwrap();
        let handler = FrameHandler::new(detector);
        let stack = Array3::<u16>::zeros((1, 512, 1024));

        assert!(!handler.can_convert());
        assert!(matches!(
            handler.convert_stack(stack.view()),
            Err(CalibrationError::MissingCalibration)
        ));
    }

    #[test]
    fn test_gain_codes_and_saturation() {
        let handler = handler_with_calibration();
        let mut stack = Array3::<u16>::zeros((1, 512, 1024));
        stack[(0, 0, 0)] = 3 << 14;
        stack[(0, 0, 1)] = SATURATED_VALUE;

        let codes = handler.gain_codes(stack.view(), false).unwrap();
        assert_eq!(codes[(0, 0, 0)], 3);
        assert_eq!(codes[(0, 0, 1)], 3); // saturated value has gain bits 0b11

        let saturated = handler.saturated_pixels(stack.view(), false).unwrap();
        assert!(!saturated[(0, 0, 0)]);
        assert!(saturated[(0, 0, 1)]);
    }

    #[test]
    fn test_arranged_pixel_mask() {
        let handler = handler_with_calibration();

        let mask = handler.arranged_pixel_mask(true).unwrap();
        assert_eq!(mask.dim(), (514, 1030));
        assert!(mask[(0, 5)]);
        assert!(!mask[(0, 0)]);
        // chip gap rows are masked
        assert!(mask[(256, 0)]);
    }

    #[test]
    fn test_module_map_validation() {
        let detector = Detector::new("JF03T01V01").unwrap();
        let mut handler = FrameHandler::new(detector);

        assert!(handler.set_module_map(Some(vec![0])).is_ok());
        assert!(handler.set_module_map(Some(vec![0, 1])).is_err());
        assert!(handler.set_module_map(None).is_ok());
        assert_eq!(handler.module_map().n_active(), 1);
    }
}
