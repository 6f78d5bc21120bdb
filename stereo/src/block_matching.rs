//! Windowed block matching over rectified pairs.

use crate::{
    filter_speckles, DisparityMap, Error, MatcherConfig, Result, StereoMatcher, INVALID_DISPARITY,
};
use image::GrayImage;
use rayon::prelude::*;
use wide::f32x8;

/// Sum-of-absolute-differences block matcher with a uniqueness test and
/// speckle suppression. The fast tier's backend.
pub struct BlockMatcher {
    pub block_size: usize,
    pub min_disparity: i32,
    pub max_disparity: i32,
    pub uniqueness_ratio: f32,
    pub speckle_window: usize,
    pub speckle_range: f32,
}

impl BlockMatcher {
    pub fn from_config(config: &MatcherConfig) -> Self {
        Self {
            block_size: config.block_size | 1,
            min_disparity: config.min_disparity,
            max_disparity: config.max_disparity(),
            uniqueness_ratio: config.uniqueness_ratio,
            speckle_window: config.speckle_window,
            speckle_range: config.speckle_range,
        }
    }
}

impl StereoMatcher for BlockMatcher {
    fn compute(&self, left: &GrayImage, right: &GrayImage) -> Result<DisparityMap> {
        if left.dimensions() != right.dimensions() {
            return Err(Error::DatasetMismatch(
                "left and right images differ in size".to_string(),
            ));
        }

        let width = left.width() as i32;
        let height = left.height() as i32;
        let row_len = left.width() as usize;
        let half = (self.block_size / 2) as i32;
        let left_data = left.as_raw();
        let right_data = right.as_raw();
        let num_disparities = (self.max_disparity - self.min_disparity + 1) as usize;

        let mut disparity = DisparityMap::new(
            left.width(),
            left.height(),
            self.min_disparity,
            self.max_disparity,
        );

        disparity
            .data
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as i32;
                if y < half || y >= height - half {
                    return;
                }
                let mut costs = vec![f32::INFINITY; num_disparities];
                for x in half..width - half {
                    row[x as usize] =
                        self.match_pixel(left_data, right_data, row_len, x, y, half, &mut costs);
                }
            });

        filter_speckles(&mut disparity, self.speckle_window, self.speckle_range);
        Ok(disparity)
    }
}

impl BlockMatcher {
    fn match_pixel(
        &self,
        left_data: &[u8],
        right_data: &[u8],
        width: usize,
        x: i32,
        y: i32,
        half: i32,
        costs: &mut [f32],
    ) -> f32 {
        // Clamp the search so every right-image access stays in bounds.
        let d_lo = (x + half - (width as i32 - 1)).max(self.min_disparity);
        let d_hi = (x - half).min(self.max_disparity);
        if d_lo > d_hi {
            return INVALID_DISPARITY;
        }

        costs.fill(f32::INFINITY);
        let mut best_d = d_lo;
        let mut best_cost = f32::INFINITY;
        for d in d_lo..=d_hi {
            let cost = sad_cost(left_data, right_data, width, x, y, d, half);
            costs[(d - self.min_disparity) as usize] = cost;
            if cost < best_cost {
                best_cost = cost;
                best_d = d;
            }
        }

        // Uniqueness: the winner must beat every non-neighboring candidate by
        // the configured margin.
        if self.uniqueness_ratio > 0.0 {
            let margin = 1.0 + self.uniqueness_ratio / 100.0;
            for d in d_lo..=d_hi {
                if (d - best_d).abs() <= 1 {
                    continue;
                }
                if best_cost * margin > costs[(d - self.min_disparity) as usize] {
                    return INVALID_DISPARITY;
                }
            }
        }

        // Parabolic interpolation between the winner and its neighbors.
        let idx = (best_d - self.min_disparity) as usize;
        if best_d > d_lo && best_d < d_hi {
            let c_prev = costs[idx - 1];
            let c_next = costs[idx + 1];
            let denom = c_prev + c_next - 2.0 * best_cost;
            if denom > 1e-6 {
                let offset = 0.5 * (c_prev - c_next) / denom;
                return best_d as f32 + offset.clamp(-0.5, 0.5);
            }
        }
        best_d as f32
    }
}

fn sad_cost(
    left_data: &[u8],
    right_data: &[u8],
    width: usize,
    x: i32,
    y: i32,
    disparity: i32,
    half: i32,
) -> f32 {
    let mut total = f32x8::ZERO;
    let mut tail = 0.0f32;
    let mut count = 0usize;

    for dy in -half..=half {
        let row = (y + dy) as usize * width;
        let mut dx = -half;
        while dx + 7 <= half {
            let l = row + (x + dx) as usize;
            let r = row + (x + dx - disparity) as usize;
            let l_vals = f32x8::from([
                left_data[l] as f32,
                left_data[l + 1] as f32,
                left_data[l + 2] as f32,
                left_data[l + 3] as f32,
                left_data[l + 4] as f32,
                left_data[l + 5] as f32,
                left_data[l + 6] as f32,
                left_data[l + 7] as f32,
            ]);
            let r_vals = f32x8::from([
                right_data[r] as f32,
                right_data[r + 1] as f32,
                right_data[r + 2] as f32,
                right_data[r + 3] as f32,
                right_data[r + 4] as f32,
                right_data[r + 5] as f32,
                right_data[r + 6] as f32,
                right_data[r + 7] as f32,
            ]);
            total += (l_vals - r_vals).abs();
            dx += 8;
            count += 8;
        }
        while dx <= half {
            let l = row + (x + dx) as usize;
            let r = row + (x + dx - disparity) as usize;
            tail += (left_data[l] as f32 - right_data[r] as f32).abs();
            dx += 1;
            count += 1;
        }
    }

    (total.reduce_add() + tail) / count as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QualityTier;
    use image::Luma;

    fn shifted_pair(shift: u32) -> (GrayImage, GrayImage) {
        let (width, height) = (96u32, 64u32);
        let mut left = GrayImage::new(width, height);
        let mut right = GrayImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let tex = ((x * 37 + (x / 7) * 91) % 251) as u8;
                left.put_pixel(x, y, Luma([tex]));
                // Scene content appears `shift` pixels to the left in the
                // right view, giving a positive disparity.
                let sx = x + shift;
                let tex_r = ((sx * 37 + (sx / 7) * 91) % 251) as u8;
                right.put_pixel(x, y, Luma([tex_r]));
            }
        }
        (left, right)
    }

    #[test]
    fn recovers_constant_shift() {
        let (left, right) = shifted_pair(6);
        let matcher = BlockMatcher {
            block_size: 9,
            min_disparity: 0,
            max_disparity: 16,
            uniqueness_ratio: 0.0,
            speckle_window: 0,
            speckle_range: 0.0,
        };
        let disp = matcher.compute(&left, &right).unwrap();

        let mut hits = 0usize;
        let mut valid = 0usize;
        for y in 10..54 {
            for x in 30..90 {
                let d = disp.get(x, y);
                if d >= 0.0 {
                    valid += 1;
                    if (d - 6.0).abs() <= 1.0 {
                        hits += 1;
                    }
                }
            }
        }
        assert!(valid > 0);
        assert!(hits as f64 / valid as f64 > 0.8);
    }

    #[test]
    fn identical_images_give_near_zero_disparity() {
        let (left, _) = shifted_pair(0);
        let matcher = BlockMatcher::from_config(&QualityTier::Fast.matcher_config());
        let disp = matcher.compute(&left, &left.clone()).unwrap();

        for &d in &disp.data {
            assert!(d <= 1.0, "disparity {d} should be ~0 or invalid");
        }
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let left = GrayImage::new(10, 10);
        let right = GrayImage::new(12, 10);
        let matcher = BlockMatcher::from_config(&QualityTier::Fast.matcher_config());
        assert!(matcher.compute(&left, &right).is_err());
    }
}
