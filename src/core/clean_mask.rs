use crate::types::{MaskGrid, MaskStack, QaStack};
use ndarray::Array2;

/// Categorical QA codes attached to every Landsat surface-reflectance pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QaCode {
    Clear,
    Water,
    CloudShadow,
    Snow,
    Cloud,
    Fill,
    /// Code outside the documented set; treated as unusable
    Unknown(u8),
}

impl QaCode {
    pub fn from_raw(code: u8) -> Self {
        match code {
            0 => QaCode::Clear,
            1 => QaCode::Water,
            2 => QaCode::CloudShadow,
            3 => QaCode::Snow,
            4 => QaCode::Cloud,
            255 => QaCode::Fill,
            other => QaCode::Unknown(other),
        }
    }

    /// True for pixels usable in composites: clear land or open water
    pub fn is_clean(self) -> bool {
        matches!(self, QaCode::Clear | QaCode::Water)
    }

    pub fn is_water(self) -> bool {
        self == QaCode::Water
    }
}

/// Derive the clean mask for a full QA stack.
///
/// A pixel is clean when its code marks clear land or water, i.e. it is
/// none of cloud shadow, snow, cloud, or fill.
pub fn derive_clean_mask(qa: &QaStack) -> MaskStack {
    qa.mapv(|code| QaCode::from_raw(code).is_clean())
}

/// Clean mask for a single QA time slice
pub fn derive_clean_mask_slice(qa: &Array2<u8>) -> MaskGrid {
    qa.mapv(|code| QaCode::from_raw(code).is_clean())
}

/// Water mask for a single QA time slice (code 1 only)
pub fn derive_water_mask(qa: &Array2<u8>) -> MaskGrid {
    qa.mapv(|code| QaCode::from_raw(code).is_water())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array3};

    #[test]
    fn test_boundary_codes() {
        // All documented codes plus one undocumented value
        let qa = arr2(&[[0u8, 1, 2], [3, 4, 255], [0, 17, 1]]);
        let mask = derive_clean_mask_slice(&qa);

        assert!(mask[[0, 0]]); // clear
        assert!(mask[[0, 1]]); // water
        assert!(!mask[[0, 2]]); // cloud shadow
        assert!(!mask[[1, 0]]); // snow
        assert!(!mask[[1, 1]]); // cloud
        assert!(!mask[[1, 2]]); // fill
        assert!(mask[[2, 0]]);
        assert!(!mask[[2, 1]]); // undocumented code is unusable
        assert!(mask[[2, 2]]);
    }

    #[test]
    fn test_stack_shape_preserved() {
        let qa = Array3::<u8>::zeros((3, 4, 5));
        let mask = derive_clean_mask(&qa);
        assert_eq!(mask.dim(), (3, 4, 5));
        assert!(mask.iter().all(|&m| m));
    }

    #[test]
    fn test_water_mask() {
        let qa = arr2(&[[0u8, 1], [255, 1]]);
        let water = derive_water_mask(&qa);
        assert!(!water[[0, 0]]);
        assert!(water[[0, 1]]);
        assert!(!water[[1, 0]]);
        assert!(water[[1, 1]]);
    }
}
