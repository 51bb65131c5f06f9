//! Module origin tables and image assembly.
//!
//! Raw Jungfrau data holds the active modules stacked in rows. Assembly
//! places each module at its physical origin on the detector plane,
//! optionally inserting the 2-pixel dead gaps between the 8 chips of a
//! module, and handles the interleaved readout of stripsel sensors.

use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3};

use super::constants::*;
use super::detector::{Detector, ModuleMap};
use super::error::GeometryError;

/// Per-module origins (y-list, x-list) on the assembled detector plane.
pub fn module_origins(detector_name: &str) -> Option<(&'static [usize], &'static [usize])> {
    match detector_name {
        "JF03T01V01" | "JF05T01V01" => Some((&SINGLE_MODULE, &SINGLE_MODULE)),
        "JF06T32V01" => Some((&JF06T32V01_Y, &JF06T32V01_X)),
        "JF07T32V01" => Some((&JF07T32V01_Y, &JF07T32V01_X)),
        _ => None,
    }
}

static SINGLE_MODULE: [usize; 1] = [0];

#[rustfmt::skip]
static JF06T32V01_Y: [usize; 32] = [
    68, 0, 618, 618,
    550, 550, 1168, 1168,
    1100, 1100, 1718, 1718,
    1650, 1650, 2268, 2268,
    2200, 2200, 2818, 2818,
    2750, 2750, 3368, 3368,
    3300, 3300, 3918, 3918,
    3850, 3850, 4468, 4400,
];

#[rustfmt::skip]
static JF06T32V01_X: [usize; 32] = [
    972, 2011, 0, 1039,
    2078, 3117, 0, 1039,
    2078, 3117, 0, 1039,
    2078, 3117, 66, 1106,
    2145, 3184, 66, 1106,
    2145, 3184, 66, 1106,
    2145, 3184, 66, 1106,
    2145, 3184, 1106, 2145,
];

#[rustfmt::skip]
static JF07T32V01_Y: [usize; 32] = [
    0, 0, 68, 68,
    550, 550, 618, 618,
    1100, 1100, 1168, 1168,
    1650, 1650, 1718, 1718,
    2200, 2200, 2268, 2268,
    2750, 2750, 2818, 2818,
    3300, 3300, 3368, 3368,
    3850, 3850, 3918, 3918,
];

#[rustfmt::skip]
static JF07T32V01_X: [usize; 32] = [
    68, 1107, 2146, 3185,
    68, 1107, 2146, 3185,
    68, 1107, 2146, 3185,
    68, 1107, 2146, 3185,
    0, 1039, 2078, 3117,
    0, 1039, 2078, 3117,
    0, 1039, 2078, 3117,
    0, 1039, 2078, 3117,
];

/// Rotate an image counterclockwise by 90 degrees.
pub fn rot90<T: Copy + Default>(image: ArrayView2<'_, T>) -> Array2<T> {
    let (rows, cols) = image.dim();
    let mut out = Array2::<T>::default((cols, rows));
    for ((y, x), &value) in image.indexed_iter() {
        out[(cols - 1 - x, y)] = value;
    }
    out
}

/// Place the modules of a raw image stack at their physical origins.
///
/// Modules missing from the module map leave zeros (`T::default()`) on the
/// canvas, as do the chip gaps when `gap_pixels` is enabled.
pub fn assemble_stack<T: Copy + Default>(
    detector: &Detector,
    stack: ArrayView3<'_, T>,
    module_map: &ModuleMap,
    gap_pixels: bool,
) -> Result<Array3<T>, GeometryError> {
    check_stack_shape(detector, &stack, module_map)?;

    if detector.is_stripsel() {
        return assemble_stripsel_stack(detector, stack, module_map);
    }

    let (origins_y, origins_x) = module_origins(detector.name())
        .ok_or_else(|| GeometryError::UnknownLayout(detector.name().to_string()))?;

    let n_frames = stack.shape()[0];
    let (out_y, out_x) = unrotated_assembled_shape(detector, gap_pixels);
    let mut res = Array3::<T>::default((n_frames, out_y, out_x));

    for (index, slot) in module_map.iter() {
        let Some(slot) = slot else { continue };
        let oy = origins_y[index];
        let ox = origins_x[index];
        let module = stack.slice(s![
            ..,
            slot * MODULE_SIZE_Y..(slot + 1) * MODULE_SIZE_Y,
            ..
        ]);

        if gap_pixels {
            copy_module_chips(&mut res, &module, oy, ox);
        } else {
            res.slice_mut(s![.., oy..oy + MODULE_SIZE_Y, ox..ox + MODULE_SIZE_X])
                .assign(&module);
        }
    }

    if detector.is_rotated() {
        let mut rotated = Array3::<T>::default((n_frames, out_x, out_y));
        for (i, frame) in res.outer_iter().enumerate() {
            rotated.slice_mut(s![i, .., ..]).assign(&rot90(frame));
        }
        res = rotated;
    }

    Ok(res)
}

/// Insert chip gap pixels while keeping the modules in raw order.
pub fn add_gap_pixels<T: Copy + Default>(
    detector: &Detector,
    stack: ArrayView3<'_, T>,
    module_map: &ModuleMap,
) -> Result<Array3<T>, GeometryError> {
    check_stack_shape(detector, &stack, module_map)?;

    let n_frames = stack.shape()[0];
    let (out_y, out_x) = detector.shape_with_gaps(module_map.n_active());
    let mut res = Array3::<T>::default((n_frames, out_y, out_x));

    for (_, slot) in module_map.iter() {
        let Some(slot) = slot else { continue };
        let oy = slot * (MODULE_SIZE_Y + CHIP_GAP_Y);
        let module = stack.slice(s![
            ..,
            slot * MODULE_SIZE_Y..(slot + 1) * MODULE_SIZE_Y,
            ..
        ]);
        copy_module_chips(&mut res, &module, oy, 0);
    }

    Ok(res)
}

/// Copy one module chip by chip, offsetting each chip by the gap size.
fn copy_module_chips<T: Copy + Default>(
    res: &mut Array3<T>,
    module: &ArrayView3<'_, T>,
    oy: usize,
    ox: usize,
) {
    for j in 0..CHIP_NUM_Y {
        for k in 0..CHIP_NUM_X {
            // reading positions
            let ry = j * CHIP_SIZE_Y;
            let rx = k * CHIP_SIZE_X;

            // writing positions
            let wy = oy + ry + j * CHIP_GAP_Y;
            let wx = ox + rx + k * CHIP_GAP_X;

            res.slice_mut(s![.., wy..wy + CHIP_SIZE_Y, wx..wx + CHIP_SIZE_X])
                .assign(&module.slice(s![.., ry..ry + CHIP_SIZE_Y, rx..rx + CHIP_SIZE_X]));
        }
    }
}

fn assemble_stripsel_stack<T: Copy + Default>(
    detector: &Detector,
    stack: ArrayView3<'_, T>,
    module_map: &ModuleMap,
) -> Result<Array3<T>, GeometryError> {
    let (origins_y, origins_x) = module_origins(detector.name())
        .ok_or_else(|| GeometryError::UnknownLayout(detector.name().to_string()))?;

    let n_frames = stack.shape()[0];
    let (out_y, out_x) = detector.assembled_shape(true);
    let mut res = Array3::<T>::default((n_frames, out_y, out_x));

    for (index, slot) in module_map.iter() {
        let Some(slot) = slot else { continue };
        let oy = origins_y[index];
        let ox = origins_x[index];
        let module = stack.slice(s![
            ..,
            slot * MODULE_SIZE_Y..(slot + 1) * MODULE_SIZE_Y,
            ..
        ]);

        for (i, frame) in module.outer_iter().enumerate() {
            let reshaped = reshape_stripsel(frame);
            res.slice_mut(s![
                i,
                oy..oy + STRIPSEL_MODULE_SIZE_Y,
                ox..ox + STRIPSEL_MODULE_SIZE_X
            ])
            .assign(&reshaped);
        }
    }

    Ok(res)
}

/// Remap a raw stripsel module onto its physical strip layout.
///
/// Every third raw row lands on the same output row with a chip period of
/// 774 columns; the 6 gap columns at each chip boundary are filled from the
/// double-area edge pixels, mirrored on the right side.
pub fn reshape_stripsel<T: Copy + Default>(module: ArrayView2<'_, T>) -> Array2<T> {
    let mut res = Array2::<T>::default((STRIPSEL_MODULE_SIZE_Y, STRIPSEL_MODULE_SIZE_X));

    // normal pixels first, the gap ones are overwritten below
    for yin in 0..256 {
        for xin in 0..1024 {
            let ichip = xin / 256;
            let xout = ichip * 774 + (xin % 256) * 3 + yin % 3;
            let yout = yin / 3;
            res[(yout, xout)] = module[(yin, xin)];
        }
    }

    for igap in 0..3 {
        for yin in 0..256 {
            let yout = (yin / 6) * 2;

            // left side of the gap
            let xin = igap * 64 + 63;
            let xout = igap * 774 + 765 + yin % 6;
            res[(yout, xout)] = module[(yin, xin)];
            res[(yout + 1, xout)] = module[(yin, xin)];

            // right side is mirrored
            let xin = igap * 64 + 64;
            let xout = igap * 774 + 765 + 11 - yin % 6;
            res[(yout, xout)] = module[(yin, xin)];
            res[(yout + 1, xout)] = module[(yin, xin)];
        }
    }

    res
}

fn unrotated_assembled_shape(detector: &Detector, gap_pixels: bool) -> (usize, usize) {
    let shape = detector.assembled_shape(gap_pixels);
    if detector.is_rotated() {
        (shape.1, shape.0)
    } else {
        shape
    }
}

fn check_stack_shape<T>(
    detector: &Detector,
    stack: &ArrayView3<'_, T>,
    module_map: &ModuleMap,
) -> Result<(), GeometryError> {
    let expected = detector.raw_shape(module_map.n_active());
    let found = (stack.shape()[1], stack.shape()[2]);
    if found != expected {
        return Err(GeometryError::BadStackShape { expected, found });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_rot90() {
        let image = ndarray::arr2(&[[1, 2, 3], [4, 5, 6]]);
        let rotated = rot90(image.view());
        assert_eq!(rotated, ndarray::arr2(&[[3, 6], [2, 5], [1, 4]]));
    }

    #[test]
    fn test_assemble_single_module_with_gaps() {
        let detector = Detector::new("JF03T01V01").unwrap();
        let map = ModuleMap::identity(1);
        let mut stack = Array3::<f32>::zeros((1, 512, 1024));
        stack[(0, 0, 0)] = 1.0;
        stack[(0, 256, 256)] = 2.0; // chip (1, 1)
        stack[(0, 511, 1023)] = 3.0; // chip (1, 3)

        let res = assemble_stack(&detector, stack.view(), &map, true).unwrap();
        assert_eq!(res.shape(), &[1, 514, 1030]);
        assert_eq!(res[(0, 0, 0)], 1.0);
        // one chip gap in each direction
        assert_eq!(res[(0, 256 + 2, 256 + 2)], 2.0);
        // last chip: one row gap, three column gaps
        assert_eq!(res[(0, 511 + 2, 1023 + 6)], 3.0);
    }

    #[test]
    fn test_assemble_skips_missing_modules() {
        let detector = Detector::new("JF03T01V01").unwrap();
        let map = ModuleMap::new(vec![-1], &detector).unwrap();
        let stack = Array3::<f32>::zeros((1, 0, 1024));

        let res = assemble_stack(&detector, stack.view(), &map, true).unwrap();
        assert_eq!(res.shape(), &[1, 514, 1030]);
        assert!(res.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_add_gap_pixels_shape() {
        let detector = Detector::new("JF03T01V01").unwrap();
        let map = ModuleMap::identity(1);
        let stack = Array3::<u16>::from_elem((2, 512, 1024), 7);

        let res = add_gap_pixels(&detector, stack.view(), &map).unwrap();
        assert_eq!(res.shape(), &[2, 514, 1030]);
        assert_eq!(res[(0, 0, 0)], 7);
        // gap rows stay empty
        assert_eq!(res[(0, 256, 0)], 0);
        assert_eq!(res[(0, 256, 255)], 0);
    }

    #[test]
    fn test_stack_shape_is_checked() {
        let detector = Detector::new("JF03T01V01").unwrap();
        let map = ModuleMap::identity(1);
        let stack = Array3::<u16>::zeros((1, 100, 1024));

        assert!(matches!(
            assemble_stack(&detector, stack.view(), &map, true),
            Err(GeometryError::BadStackShape { .. })
        ));
    }

    #[test]
    fn test_reshape_stripsel_mapping() {
        let mut module = Array2::<u16>::zeros((512, 1024));
        module[(0, 0)] = 11;
        module[(1, 0)] = 12;
        module[(3, 0)] = 13;
        module[(0, 256)] = 14; // second chip
        module[(0, 63)] = 15; // left edge of the first gap

        let res = reshape_stripsel(module.slice(ndarray::s![..256, ..]));
        assert_eq!(res.dim(), (86, 3090));
        assert_eq!(res[(0, 0)], 11);
        assert_eq!(res[(0, 1)], 12);
        assert_eq!(res[(1, 0)], 13);
        assert_eq!(res[(0, 774)], 14);
        // doubled-area edge pixel fills two gap rows
        assert_eq!(res[(0, 765)], 15);
        assert_eq!(res[(1, 765)], 15);
    }
}
