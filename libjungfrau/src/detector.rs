use std::fmt;
use std::str::FromStr;

use super::constants::*;
use super::error::DetectorError;
use super::geometry::module_origins;

/// Identity and layout of a Jungfrau detector, parsed from a name of the
/// form `JF<id>T<nmod>V<version>` (e.g. `JF07T32V01`).
///
/// Construction fails for garbled names and for detectors without a known
/// module layout, so downstream code never has to handle an unknown
/// geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detector {
    name: String,
    id: u8,
    n_modules: usize,
    version: u8,
}

impl Detector {
    pub fn new(name: &str) -> Result<Self, DetectorError> {
        let (id, n_modules, version) =
            parse_name(name).ok_or_else(|| DetectorError::BadName(name.to_string()))?;

        if module_origins(name).is_none() {
            return Err(DetectorError::UnknownLayout(name.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            id,
            n_modules,
            version,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn n_modules(&self) -> usize {
        self.n_modules
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Stripsel sensors use an interleaved strip readout and have their own
    /// assembled geometry.
    pub fn is_stripsel(&self) -> bool {
        matches!(self.id, 5 | 11)
    }

    /// The Alvra detector is mounted rotated by 90 degrees.
    pub fn is_rotated(&self) -> bool {
        self.id == 6
    }

    /// Shape of raw data holding `n_active` modules stacked in rows.
    pub fn raw_shape(&self, n_active: usize) -> (usize, usize) {
        (n_active * MODULE_SIZE_Y, MODULE_SIZE_X)
    }

    /// Raw shape with all modules present.
    pub fn full_shape(&self) -> (usize, usize) {
        self.raw_shape(self.n_modules)
    }

    /// Raw-ordered shape with chip gap pixels inserted.
    pub fn shape_with_gaps(&self, n_active: usize) -> (usize, usize) {
        let (shape_y, shape_x) = self.raw_shape(n_active);
        (
            shape_y + (CHIP_NUM_Y - 1) * CHIP_GAP_Y * n_active,
            shape_x + (CHIP_NUM_X - 1) * CHIP_GAP_X,
        )
    }

    /// Shape of the assembled image, with modules at their physical origins.
    pub fn assembled_shape(&self, gap_pixels: bool) -> (usize, usize) {
        // Detector::new guarantees the layout exists.
        let (origins_y, origins_x) = module_origins(&self.name).unwrap();
        let max_y = origins_y.iter().copied().max().unwrap_or(0);
        let max_x = origins_x.iter().copied().max().unwrap_or(0);

        let (shape_y, shape_x) = if self.is_stripsel() {
            (
                max_y + STRIPSEL_MODULE_SIZE_Y,
                max_x + STRIPSEL_MODULE_SIZE_X,
            )
        } else if gap_pixels {
            (
                max_y + MODULE_SIZE_Y + (CHIP_NUM_Y - 1) * CHIP_GAP_Y,
                max_x + MODULE_SIZE_X + (CHIP_NUM_X - 1) * CHIP_GAP_X,
            )
        } else {
            (max_y + MODULE_SIZE_Y, max_x + MODULE_SIZE_X)
        };

        if self.is_rotated() {
            (shape_x, shape_y)
        } else {
            (shape_y, shape_x)
        }
    }
}

impl FromStr for Detector {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Detector::new(s)
    }
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

fn parse_name(name: &str) -> Option<(u8, usize, u8)> {
    let rest = name.strip_prefix("JF")?;
    let t_pos = rest.find('T')?;
    let v_pos = rest.find('V')?;
    if v_pos <= t_pos {
        return None;
    }

    let id = rest[..t_pos].parse().ok()?;
    let n_modules: usize = rest[t_pos + 1..v_pos].parse().ok()?;
    let version = rest[v_pos + 1..].parse().ok()?;
    if n_modules == 0 {
        return None;
    }

    Some((id, n_modules, version))
}

/// Which raw-data slot each detector module occupies.
///
/// One entry per module; `-1` marks a module that was excluded from the
/// acquisition, any other value is its row slot in the raw data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMap {
    slots: Vec<i64>,
}

impl ModuleMap {
    /// All modules present, in order. Legacy data without a stored module
    /// map is emulated this way.
    pub fn identity(n_modules: usize) -> Self {
        Self {
            slots: (0..n_modules as i64).collect(),
        }
    }

    pub fn new(slots: Vec<i64>, detector: &Detector) -> Result<Self, DetectorError> {
        if slots.len() != detector.n_modules() {
            return Err(DetectorError::BadModuleMapLength(
                detector.n_modules(),
                slots.len(),
            ));
        }

        let limit = detector.n_modules() as i64;
        for &slot in &slots {
            if !(-1..limit).contains(&slot) {
                return Err(DetectorError::BadModuleMapValue(slot, limit - 1));
            }
        }

        Ok(Self { slots })
    }

    pub fn n_active(&self) -> usize {
        self.slots.iter().filter(|&&s| s != -1).count()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.slots
    }

    /// Iterate over `(module index, raw slot)` pairs; absent modules yield
    /// `None` slots.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<usize>)> + '_ {
        self.slots.iter().enumerate().map(|(index, &slot)| {
            if slot == -1 {
                (index, None)
            } else {
                (index, Some(slot as usize))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_names() {
        let det = Detector::new("JF07T32V01").unwrap();
        assert_eq!(det.id(), 7);
        assert_eq!(det.n_modules(), 32);
        assert_eq!(det.version(), 1);
        assert!(!det.is_stripsel());
        assert!(!det.is_rotated());

        let det = Detector::new("JF06T32V01").unwrap();
        assert!(det.is_rotated());

        let det = Detector::new("JF05T01V01").unwrap();
        assert!(det.is_stripsel());
    }

    #[test]
    fn test_parse_invalid_names() {
        assert!(Detector::new("EIGER1M").is_err());
        assert!(Detector::new("JF07V01T32").is_err());
        assert!(Detector::new("JFxxT32V01").is_err());
        assert!(Detector::new("JF07T0V01").is_err());
        // well-formed, but no layout table entry
        assert!(matches!(
            Detector::new("JF99T01V01"),
            Err(DetectorError::UnknownLayout(_))
        ));
    }

    #[test]
    fn test_shapes() {
        let det = Detector::new("JF03T01V01").unwrap();
        assert_eq!(det.full_shape(), (512, 1024));
        assert_eq!(det.shape_with_gaps(1), (514, 1030));
        assert_eq!(det.assembled_shape(true), (514, 1030));
        assert_eq!(det.assembled_shape(false), (512, 1024));

        let det = Detector::new("JF07T32V01").unwrap();
        assert_eq!(det.full_shape(), (32 * 512, 1024));
        assert_eq!(det.assembled_shape(true), (3918 + 512 + 2, 3185 + 1024 + 6));

        // rotated detector reports transposed assembled shape
        let det = Detector::new("JF06T32V01").unwrap();
        assert_eq!(det.assembled_shape(true), (3184 + 1024 + 6, 4468 + 512 + 2));
    }

    #[test]
    fn test_module_map() {
        let det = Detector::new("JF07T32V01").unwrap();

        let map = ModuleMap::identity(det.n_modules());
        assert_eq!(map.n_active(), 32);
        assert_eq!(map.iter().next(), Some((0, Some(0))));

        let mut slots: Vec<i64> = (0..32).collect();
        slots[3] = -1;
        let map = ModuleMap::new(slots, &det).unwrap();
        assert_eq!(map.n_active(), 31);
        assert_eq!(map.iter().nth(3), Some((3, None)));

        assert!(ModuleMap::new(vec![0; 4], &det).is_err());
        assert!(ModuleMap::new(vec![77; 32], &det).is_err());
    }
}
