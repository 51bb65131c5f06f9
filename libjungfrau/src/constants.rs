//! Jungfrau sensor layout and readout constants.

/// Chip size in pixels, both directions.
pub const CHIP_SIZE_X: usize = 256;
pub const CHIP_SIZE_Y: usize = 256;

/// Chips per module: 2 rows of 4.
pub const CHIP_NUM_X: usize = 4;
pub const CHIP_NUM_Y: usize = 2;

pub const MODULE_SIZE_X: usize = CHIP_NUM_X * CHIP_SIZE_X;
pub const MODULE_SIZE_Y: usize = CHIP_NUM_Y * CHIP_SIZE_Y;
pub const MODULE_SIZE: usize = MODULE_SIZE_X * MODULE_SIZE_Y;

/// Dead area between neighboring chips, in pixels.
pub const CHIP_GAP_X: usize = 2;
pub const CHIP_GAP_Y: usize = 2;

// 256 is not divisible by 3, so rows are rounded up to 86.
// 18 extra columns come from 6 gap pixels per chip boundary.
pub const STRIPSEL_MODULE_SIZE_X: usize = 1024 * 3 + 18;
pub const STRIPSEL_MODULE_SIZE_Y: usize = 86;

/// Gain stages applied during conversion (G0/HG0, G1, G2).
pub const NUM_GAIN_STAGES: usize = 3;

/// Planes in a calibration file: G0, G1, G2 and HG0.
pub const NUM_CALIBRATION_PLANES: usize = 4;

/// Accumulator slots in a pedestal analysis: gain codes 0, 1, 3 and the
/// high-G0 variant at slot 4. Slot 2 collects frames outside a forced
/// schedule and is never written out.
pub const NUM_PEDESTAL_SLOTS: usize = 5;

/// The low 14 bits of a raw pixel are ADC counts.
pub const ADC_MASK: u16 = 0b0011_1111_1111_1111;

/// The two most significant bits of a raw pixel encode the gain stage.
pub const GAIN_BIT_SHIFT: usize = 14;

/// Raw value reported by a saturated pixel in high-G0 mode.
pub const SATURATED_VALUE_HIGHGAIN: u16 = 0b0011_1111_1111_1111;

/// Raw value reported by a saturated pixel otherwise.
pub const SATURATED_VALUE: u16 = 0b1100_0000_0000_0000;

/// Gain bits of the module DAQ record.
pub const DAQ_REC_GAIN_SHIFT: i64 = 12;
pub const DAQ_REC_GAIN_MASK: i64 = 0b11;
/// High-G0 flag of the module DAQ record.
pub const DAQ_REC_HIGHG0_BIT: i64 = 0b1;

/// Pixel mask bit for pixels flagged by an externally supplied mask.
pub const MASK_BIT_EXTERNAL: u32 = 5;
/// First pixel mask bit for pixels with zero RMS in a pedestal plane.
pub const MASK_BIT_ZERO_RMS: u32 = 6;
