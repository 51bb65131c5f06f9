//! Streaming pedestal statistics over a calibration run.
//!
//! A pedestal run records thousands of signal-free frames while the
//! detector steps through its gain stages. The builder ingests frames one
//! at a time, keeps per-pixel sum and sum-of-squares accumulators per gain
//! slot with an exponential moving window, and grows a pixel mask of
//! defective pixels along the way.
//!
//! Accumulator slots are indexed by `gain code + 4 * highg0`: 0, 1 and 3
//! for the regular stages, 4 for high-G0 frames. Slot 2 catches frames
//! beyond a forced schedule and is dropped at finalization.

use ndarray::{Array2, Array3, ArrayView2};

use super::constants::*;
use super::error::PedestalError;

/// Forced gain schedule for runs recorded without per-frame gain settings:
/// the first `frames_g0` frames are taken as G0, then G1, G2 and HG0.
#[derive(Debug, Clone, Copy, Default)]
pub struct GainSchedule {
    pub frames_g0: usize,
    pub frames_g1: usize,
    pub frames_g2: usize,
    pub frames_hg0: usize,
}

impl GainSchedule {
    pub fn is_empty(&self) -> bool {
        self.frames_g0 + self.frames_g1 + self.frames_g2 + self.frames_hg0 == 0
    }

    /// Expected `(gain code, highg0)` for a frame index. Frames beyond the
    /// schedule report the undefined code 2 and end up rejected.
    pub fn expected(&self, frame_index: usize) -> (u8, bool) {
        if frame_index < self.frames_g0 {
            (0, false)
        } else if frame_index < self.frames_g0 + self.frames_g1 {
            (1, false)
        } else if frame_index < self.frames_g0 + self.frames_g1 + self.frames_g2 {
            (3, false)
        } else if frame_index
            < self.frames_g0 + self.frames_g1 + self.frames_g2 + self.frames_hg0
        {
            (0, true)
        } else {
            (2, false)
        }
    }
}

#[derive(Debug, Clone)]
pub struct PedestalSettings {
    /// Moving-window length: pedestals average over the last this many
    /// frames of a slot, de-weighting earlier ones.
    pub frames_average: usize,
    /// Verify that every module DAQ record agrees with the frame gain
    /// setting.
    pub gain_check: bool,
    /// Optional forced schedule overriding the DAQ gain settings.
    pub schedule: Option<GainSchedule>,
    /// Pixel whose gain transitions are traced in the log.
    pub test_pixel: (usize, usize),
}

impl Default for PedestalSettings {
    fn default() -> Self {
        Self {
            frames_average: 1000,
            gain_check: true,
            schedule: None,
            test_pixel: (0, 0),
        }
    }
}

/// Per-slot frame counts and acceptance statistics of a finished analysis.
#[derive(Debug, Clone, Default)]
pub struct PedestalStats {
    pub frames_seen: usize,
    pub frames_accepted: usize,
    pub slot_counts: [usize; NUM_PEDESTAL_SLOTS],
}

/// Result of a pedestal analysis: per-plane pedestal means and RMS values
/// (planes G0, G1, G2, HG0) plus the pixel mask.
#[derive(Debug, Clone)]
pub struct PedestalData {
    pub pedestal: Array3<f64>,
    pub rms: Array3<f64>,
    pub pixel_mask: Array2<u32>,
    pub stats: PedestalStats,
}

impl PedestalData {
    pub fn good_pixels(&self) -> usize {
        self.pixel_mask.iter().filter(|&&m| m == 0).count()
    }
}

#[derive(Debug)]
pub struct PedestalBuilder {
    shape: (usize, usize),
    n_modules: usize,
    n_bad_modules: usize,
    settings: PedestalSettings,
    sum: Vec<Array2<f64>>,
    sum_sq: Vec<Array2<f64>>,
    counts: [usize; NUM_PEDESTAL_SLOTS],
    pixel_mask: Array2<u32>,
    frames_seen: usize,
    frames_accepted: usize,
    test_pixel_gain: Option<(u8, bool)>,
    test_pixel_wrong: bool,
}

impl PedestalBuilder {
    /// Create a builder for frames of the given shape. The shape must hold
    /// a whole number of (512x1024) modules.
    pub fn new(
        shape: (usize, usize),
        n_bad_modules: usize,
        mut settings: PedestalSettings,
    ) -> Result<Self, PedestalError> {
        let n_modules = (shape.0 * shape.1) / MODULE_SIZE;
        if n_modules == 0 || n_modules * MODULE_SIZE != shape.0 * shape.1 {
            return Err(PedestalError::BadFrameShape(shape));
        }

        if settings.test_pixel.0 >= shape.0 || settings.test_pixel.1 >= shape.1 {
            settings.test_pixel = (0, 0);
        }

        Ok(Self {
            shape,
            n_modules,
            n_bad_modules,
            settings,
            sum: (0..NUM_PEDESTAL_SLOTS)
                .map(|_| Array2::zeros(shape))
                .collect(),
            sum_sq: (0..NUM_PEDESTAL_SLOTS)
                .map(|_| Array2::zeros(shape))
                .collect(),
            counts: [0; NUM_PEDESTAL_SLOTS],
            pixel_mask: Array2::zeros(shape),
            frames_seen: 0,
            frames_accepted: 0,
            test_pixel_gain: None,
            test_pixel_wrong: false,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn n_modules(&self) -> usize {
        self.n_modules
    }

    pub fn slot_counts(&self) -> &[usize; NUM_PEDESTAL_SLOTS] {
        &self.counts
    }

    /// Ingest one frame. Returns whether it was accepted into the
    /// accumulators.
    pub fn append_frame(
        &mut self,
        frame_index: usize,
        raw: ArrayView2<'_, u16>,
        daq_records: &[i64],
    ) -> Result<bool, PedestalError> {
        if raw.dim() != self.shape {
            return Err(PedestalError::FrameShapeMismatch {
                expected: self.shape,
                found: raw.dim(),
            });
        }
        let first_record = *daq_records.first().ok_or(PedestalError::MissingDaqRecord)?;

        self.frames_seen += 1;

        let (code, highg0) = match &self.settings.schedule {
            Some(schedule) if !schedule.is_empty() => schedule.expected(frame_index),
            _ => (
                ((first_record >> DAQ_REC_GAIN_SHIFT) & DAQ_REC_GAIN_MASK) as u8,
                (first_record & DAQ_REC_HIGHG0_BIT) == 1,
            ),
        };

        if self.settings.gain_check {
            let mismatch = daq_records.iter().any(|&rec| {
                ((rec >> DAQ_REC_GAIN_SHIFT) & DAQ_REC_GAIN_MASK) as u8 != code
                    || ((rec & DAQ_REC_HIGHG0_BIT) == 1) != highg0
            });
            if mismatch {
                log::debug!(
                    "Frame {frame_index}: mismatch between module records and gain setting {code} (highG0: {highg0})"
                );
                return Ok(false);
            }
        }

        if highg0 && code != 0 {
            log::info!(
                "Detector is in the high G0 mode, but the gain setting is strange: {code}"
            );
            return Ok(false);
        }

        // most of the modules have to sit in the expected gain
        let in_expected_gain = raw
            .iter()
            .filter(|&&v| (v >> GAIN_BIT_SHIFT) as u8 == code)
            .count();
        let required =
            (self.n_modules as f64 - 0.5 - self.n_bad_modules as f64) * MODULE_SIZE as f64;
        if (in_expected_gain as f64) < required {
            log::debug!(
                "Too many bad pixels, skip frame {frame_index}, gain setting {code} (highG0: {highg0}): {in_expected_gain} pixels in expected gain"
            );
            return Ok(false);
        }

        self.trace_test_pixel(frame_index, &raw, code, highg0);

        let slot = code as usize + 4 * highg0 as usize;
        self.counts[slot] += 1;

        // de-weight earlier frames once the window is full
        if self.counts[slot] > self.settings.frames_average {
            let window = self.settings.frames_average as f64;
            self.sum[slot].mapv_inplace(|v| v - v / window);
            self.sum_sq[slot].mapv_inplace(|v| v - v / window);
        }

        let mask_bit = 1u32 << slot;
        let sum = &mut self.sum[slot];
        let sum_sq = &mut self.sum_sq[slot];
        for ((y, x), &value) in raw.indexed_iter() {
            if (value >> GAIN_BIT_SHIFT) as u8 != code {
                self.pixel_mask[(y, x)] |= mask_bit;
            }
            let adc = (value & ADC_MASK) as f64;
            sum[(y, x)] += adc;
            sum_sq[(y, x)] += adc * adc;
        }

        self.frames_accepted += 1;
        Ok(true)
    }

    /// Merge an externally supplied pixel mask (bit 5).
    pub fn merge_external_mask(&mut self, mask: ArrayView2<'_, i32>) -> Result<(), PedestalError> {
        if mask.dim() != self.shape {
            return Err(PedestalError::BadMaskShape {
                expected: self.shape,
                found: mask.dim(),
            });
        }

        for ((y, x), &flag) in mask.indexed_iter() {
            if flag == 1 {
                self.pixel_mask[(y, x)] |= 1 << MASK_BIT_EXTERNAL;
            }
        }

        Ok(())
    }

    /// Compute the pedestal planes. Slots (0, 1, 3, 4) map to output planes
    /// (0, 1, 2, 3); pixels with zero RMS in a plane are masked as dead.
    pub fn finalize(mut self) -> PedestalData {
        let (rows, cols) = self.shape;
        let mut pedestal = Array3::<f64>::zeros((NUM_CALIBRATION_PLANES, rows, cols));
        let mut rms = Array3::<f64>::zeros((NUM_CALIBRATION_PLANES, rows, cols));

        for slot in [0usize, 1, 3, 4] {
            let plane = if slot < 3 { slot } else { slot - 1 };
            let n = self
                .counts[slot]
                .min(self.settings.frames_average)
                .max(1) as f64;
            let dead_bit = 1u32 << (MASK_BIT_ZERO_RMS + plane as u32);

            for y in 0..rows {
                for x in 0..cols {
                    let mean = self.sum[slot][(y, x)] / n;
                    let mean_sq = self.sum_sq[slot][(y, x)] / n;
                    let deviation = (mean_sq - mean * mean).sqrt();

                    pedestal[(plane, y, x)] = mean;
                    rms[(plane, y, x)] = deviation;
                    if deviation == 0.0 {
                        self.pixel_mask[(y, x)] |= dead_bit;
                    }
                }
            }
        }

        PedestalData {
            pedestal,
            rms,
            pixel_mask: self.pixel_mask,
            stats: PedestalStats {
                frames_seen: self.frames_seen,
                frames_accepted: self.frames_accepted,
                slot_counts: self.counts,
            },
        }
    }

    fn trace_test_pixel(
        &mut self,
        frame_index: usize,
        raw: &ArrayView2<'_, u16>,
        code: u8,
        highg0: bool,
    ) {
        let (ty, tx) = self.settings.test_pixel;
        let pixel_code = (raw[(ty, tx)] >> GAIN_BIT_SHIFT) as u8;

        if pixel_code != code {
            if !self.test_pixel_wrong {
                log::info!(
                    "Gain wrong for pixel ({tx}x{ty}): should be {code}, but {pixel_code}. Frame {frame_index}."
                );
                self.test_pixel_wrong = true;
            }
        } else {
            if self.test_pixel_gain.is_some() && self.test_pixel_wrong {
                log::info!(
                    "Gain was wrong for pixel ({tx}x{ty}) in previous frames, but is now correct: {pixel_code}. Frame {frame_index}."
                );
            }
            self.test_pixel_wrong = false;
        }

        if self.test_pixel_gain != Some((pixel_code, highg0)) {
            log::info!(
                "Gain changed for pixel ({tx}x{ty}): {:?} -> {pixel_code} (highG0: {highg0}), frame {frame_index}, match: {}",
                self.test_pixel_gain.map(|(g, _)| g),
                pixel_code == code
            );
            self.test_pixel_gain = Some((pixel_code, highg0));
        }
    }
}
