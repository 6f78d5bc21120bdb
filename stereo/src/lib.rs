//! Dense stereo correspondence.
//!
//! Matchers consume a rectified luminance pair and produce a [`DisparityMap`]
//! aligned to the left image. Matcher parameters are data ([`MatcherConfig`]),
//! selected through [`QualityTier`], so backends can be swapped behind the
//! [`StereoMatcher`] trait without touching the reconstruction contract.

use image::GrayImage;

pub mod block_matching;
pub mod reconstruct;
pub mod sgm;
pub mod speckle;

pub use block_matching::BlockMatcher;
pub use reconstruct::disparity_to_point_cloud;
pub use sgm::SgmMatcher;
pub use speckle::filter_speckles;

pub use rigscan_core::{Error, Result};

/// Marker for pixels where matching failed or was rejected.
pub const INVALID_DISPARITY: f32 = -1.0;

/// Dense per-pixel disparities aligned to the rectified left image.
///
/// `subpixel_scale` records the fixed-point factor of the raw matcher output;
/// [`DisparityMap::normalized`] divides it out before reprojection.
#[derive(Debug, Clone)]
pub struct DisparityMap {
    pub data: Vec<f32>,
    pub width: u32,
    pub height: u32,
    pub min_disparity: i32,
    pub max_disparity: i32,
    pub subpixel_scale: f32,
}

impl DisparityMap {
    pub fn new(width: u32, height: u32, min_disparity: i32, max_disparity: i32) -> Self {
        Self {
            data: vec![INVALID_DISPARITY; (width * height) as usize],
            width,
            height,
            min_disparity,
            max_disparity,
            subpixel_scale: 1.0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data
            .get((y * self.width + x) as usize)
            .copied()
            .unwrap_or(INVALID_DISPARITY)
    }

    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        if let Some(cell) = self.data.get_mut((y * self.width + x) as usize) {
            *cell = value;
        }
    }

    /// Divide out the fixed-point sub-pixel factor, yielding float disparities
    /// in pixels. Invalid pixels stay negative.
    pub fn normalized(mut self) -> Self {
        if self.subpixel_scale != 1.0 {
            let scale = self.subpixel_scale;
            for v in &mut self.data {
                *v /= scale;
            }
            self.subpixel_scale = 1.0;
        }
        self
    }

    /// Min-max normalized grayscale rendering for diagnostics.
    pub fn to_image(&self) -> GrayImage {
        let valid: Vec<f32> = self.data.iter().copied().filter(|v| *v >= 0.0).collect();
        let min_val = valid.iter().copied().fold(f32::INFINITY, f32::min);
        let max_val = valid.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range = max_val - min_val;

        let mut img = GrayImage::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let d = self.get(x, y);
                let value = if d >= 0.0 && range > 0.0 {
                    (((d - min_val) / range) * 255.0) as u8
                } else {
                    0
                };
                img.put_pixel(x, y, image::Luma([value]));
            }
        }
        img
    }
}

/// Dense correspondence backend.
pub trait StereoMatcher {
    fn compute(&self, left: &GrayImage, right: &GrayImage) -> Result<DisparityMap>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherBackend {
    /// Windowed block matching: fastest, sparsest.
    Block,
    /// Semi-global matching with smoothness penalties: denser, slower.
    SemiGlobal,
}

/// Named matcher parameters.
///
/// Field effects:
/// - `block_size`: odd matching-window edge; larger windows smooth over
///   texture but blur depth edges.
/// - `min_disparity`/`num_disparities`: horizontal search range.
/// - `p1`/`p2`: semi-global smoothness penalties for 1-step and larger
///   disparity jumps (ignored by the block backend).
/// - `uniqueness_ratio`: percent margin by which the best cost must beat the
///   runner-up, else the pixel is rejected.
/// - `max_lr_diff`: left-right consistency tolerance in disparity steps;
///   negative disables the check.
/// - `speckle_window`/`speckle_range`: connected blobs up to this size whose
///   internal disparity varies within the range are erased as speckle noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatcherConfig {
    pub backend: MatcherBackend,
    pub block_size: usize,
    pub min_disparity: i32,
    pub num_disparities: i32,
    pub p1: u32,
    pub p2: u32,
    pub uniqueness_ratio: f32,
    pub max_lr_diff: i32,
    pub speckle_window: usize,
    pub speckle_range: f32,
}

impl MatcherConfig {
    pub fn max_disparity(&self) -> i32 {
        self.min_disparity + self.num_disparities - 1
    }

    /// Instantiate the configured backend.
    pub fn build(&self) -> Box<dyn StereoMatcher> {
        match self.backend {
            MatcherBackend::Block => Box::new(BlockMatcher::from_config(self)),
            MatcherBackend::SemiGlobal => Box::new(SgmMatcher::from_config(self)),
        }
    }
}

/// Speed/density trade-off presets for dense reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    /// Block matching over a wide window; quick previews.
    Fast,
    /// Semi-global matching with moderate range and penalties.
    Balanced,
    /// Semi-global matching with extended range, small window, and strict
    /// consistency; densest output.
    Quality,
}

impl QualityTier {
    pub fn matcher_config(self) -> MatcherConfig {
        match self {
            QualityTier::Fast => MatcherConfig {
                backend: MatcherBackend::Block,
                block_size: 21,
                min_disparity: 0,
                num_disparities: 64,
                p1: 0,
                p2: 0,
                uniqueness_ratio: 15.0,
                max_lr_diff: -1,
                speckle_window: 100,
                speckle_range: 32.0,
            },
            QualityTier::Balanced => MatcherConfig {
                backend: MatcherBackend::SemiGlobal,
                block_size: 5,
                min_disparity: 0,
                num_disparities: 128,
                p1: 600,
                p2: 2400,
                uniqueness_ratio: 1.0,
                max_lr_diff: 10,
                speckle_window: 100,
                speckle_range: 2.0,
            },
            QualityTier::Quality => MatcherConfig {
                backend: MatcherBackend::SemiGlobal,
                block_size: 3,
                min_disparity: 0,
                num_disparities: 160,
                p1: 864,
                p2: 3456,
                uniqueness_ratio: 5.0,
                max_lr_diff: 5,
                speckle_window: 50,
                speckle_range: 1.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disparity_map_set_get_and_vis() {
        let mut disp = DisparityMap::new(10, 10, 0, 64);
        disp.set(5, 5, 32.0);
        assert_eq!(disp.get(5, 5), 32.0);
        assert_eq!(disp.get(0, 0), INVALID_DISPARITY);

        let img = disp.to_image();
        assert_eq!(img.dimensions(), (10, 10));
    }

    #[test]
    fn normalized_divides_fixed_point_scale() {
        let mut disp = DisparityMap::new(4, 1, 0, 16);
        disp.subpixel_scale = 16.0;
        disp.set(0, 0, 80.0);
        disp.set(1, 0, -16.0);

        let norm = disp.normalized();
        assert_eq!(norm.subpixel_scale, 1.0);
        assert_eq!(norm.get(0, 0), 5.0);
        assert!(norm.get(1, 0) < 0.0);
    }

    #[test]
    fn tiers_map_to_documented_configs() {
        let fast = QualityTier::Fast.matcher_config();
        assert_eq!(fast.backend, MatcherBackend::Block);
        assert_eq!(fast.block_size, 21);
        assert_eq!(fast.num_disparities, 64);

        let balanced = QualityTier::Balanced.matcher_config();
        assert_eq!(balanced.backend, MatcherBackend::SemiGlobal);
        assert_eq!((balanced.p1, balanced.p2), (600, 2400));

        let quality = QualityTier::Quality.matcher_config();
        assert_eq!(quality.num_disparities, 160);
        assert_eq!(quality.max_disparity(), 159);
        assert!(quality.speckle_window < balanced.speckle_window);
    }
}
