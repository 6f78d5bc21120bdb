//! Semi-global matching: windowed SAD costs aggregated along eight scanline
//! directions with P1/P2 smoothness penalties, winner-take-all selection,
//! left-right consistency, and parabolic sub-pixel interpolation.
//!
//! Output disparities are fixed-point, scaled by [`DISPARITY_SCALE`]; callers
//! normalize before reprojection.

use crate::{
    filter_speckles, DisparityMap, Error, MatcherConfig, Result, StereoMatcher,
};
use image::GrayImage;
use rayon::prelude::*;

/// Fixed-point factor of raw SGM output.
pub const DISPARITY_SCALE: f32 = 16.0;

const AGGREGATION_PATHS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (-1, 1),
    (1, -1),
    (-1, -1),
];

pub struct SgmMatcher {
    pub block_size: usize,
    pub min_disparity: i32,
    pub max_disparity: i32,
    pub p1: u32,
    pub p2: u32,
    pub uniqueness_ratio: f32,
    pub max_lr_diff: i32,
    pub speckle_window: usize,
    pub speckle_range: f32,
}

impl SgmMatcher {
    pub fn from_config(config: &MatcherConfig) -> Self {
        Self {
            block_size: config.block_size | 1,
            min_disparity: config.min_disparity,
            max_disparity: config.max_disparity(),
            p1: config.p1,
            p2: config.p2,
            uniqueness_ratio: config.uniqueness_ratio,
            max_lr_diff: config.max_lr_diff,
            speckle_window: config.speckle_window,
            speckle_range: config.speckle_range,
        }
    }
}

impl StereoMatcher for SgmMatcher {
    fn compute(&self, left: &GrayImage, right: &GrayImage) -> Result<DisparityMap> {
        if left.dimensions() != right.dimensions() {
            return Err(Error::DatasetMismatch(
                "left and right images differ in size".to_string(),
            ));
        }

        let width = left.width() as usize;
        let height = left.height() as usize;
        let num_disparities = (self.max_disparity - self.min_disparity + 1) as usize;

        let cost_volume = self.matching_costs(left, right);
        let aggregated = self.aggregate(&cost_volume, width, height, num_disparities);

        let mut disparity = DisparityMap::new(
            left.width(),
            left.height(),
            self.min_disparity,
            self.max_disparity,
        );
        disparity.subpixel_scale = DISPARITY_SCALE;
        let invalid = -DISPARITY_SCALE;

        // Right-view winner-take-all over the same volume for the
        // left-right consistency check.
        let right_wta: Option<Vec<i32>> = (self.max_lr_diff >= 0).then(|| {
            let mut out = vec![-1i32; width * height];
            out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
                for (xr, cell) in row.iter_mut().enumerate() {
                    let mut best_cost = u32::MAX;
                    for d_idx in 0..num_disparities {
                        let d = self.min_disparity + d_idx as i32;
                        let xl = xr as i32 + d;
                        if xl < 0 || xl >= width as i32 {
                            continue;
                        }
                        let cost = aggregated[(y * width + xl as usize) * num_disparities + d_idx];
                        if cost < best_cost {
                            best_cost = cost;
                            *cell = d;
                        }
                    }
                }
            });
            out
        });

        disparity
            .data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    *out = invalid;
                    let base = (y * width + x) * num_disparities;
                    let costs = &aggregated[base..base + num_disparities];

                    let mut best_idx = 0usize;
                    let mut best_cost = u32::MAX;
                    for (i, &c) in costs.iter().enumerate() {
                        if c < best_cost {
                            best_cost = c;
                            best_idx = i;
                        }
                    }
                    let d = self.min_disparity + best_idx as i32;
                    if d > x as i32 {
                        // Matching window would leave the right image.
                        continue;
                    }

                    if self.uniqueness_ratio > 0.0 {
                        let margin = 1.0 + self.uniqueness_ratio / 100.0;
                        let ambiguous = costs.iter().enumerate().any(|(i, &c)| {
                            (i as i32 - best_idx as i32).abs() > 1
                                && (best_cost as f32) * margin > c as f32
                        });
                        if ambiguous {
                            continue;
                        }
                    }

                    if let Some(right_wta) = &right_wta {
                        let xr = x as i32 - d;
                        if xr >= 0 {
                            let dr = right_wta[y * width + xr as usize];
                            if dr < 0 || (dr - d).abs() > self.max_lr_diff {
                                continue;
                            }
                        }
                    }

                    let mut value = d as f32;
                    if best_idx > 0 && best_idx + 1 < num_disparities {
                        let c_prev = costs[best_idx - 1] as f32;
                        let c_next = costs[best_idx + 1] as f32;
                        let denom = c_prev + c_next - 2.0 * best_cost as f32;
                        if denom > 1e-6 {
                            value += (0.5 * (c_prev - c_next) / denom).clamp(-0.5, 0.5);
                        }
                    }
                    *out = value * DISPARITY_SCALE;
                }
            });

        filter_speckles(&mut disparity, self.speckle_window, self.speckle_range);
        Ok(disparity)
    }
}

impl SgmMatcher {
    /// Windowed SAD matching cost for every pixel/disparity cell.
    fn matching_costs(&self, left: &GrayImage, right: &GrayImage) -> Vec<u32> {
        let width = left.width() as usize;
        let height = left.height() as usize;
        let num_disparities = (self.max_disparity - self.min_disparity + 1) as usize;
        let half = (self.block_size / 2) as i32;
        let left_data = left.as_raw();
        let right_data = right.as_raw();

        let mut costs = vec![0u32; width * height * num_disparities];
        costs
            .par_chunks_mut(width * num_disparities)
            .enumerate()
            .for_each(|(y, row_costs)| {
                let y = y as i32;
                for x in 0..width as i32 {
                    for d_idx in 0..num_disparities {
                        let d = self.min_disparity + d_idx as i32;
                        let mut cost = 0u32;
                        let mut samples = 0u32;
                        for dy in -half..=half {
                            let yy = y + dy;
                            if yy < 0 || yy >= height as i32 {
                                continue;
                            }
                            for dx in -half..=half {
                                let lx = x + dx;
                                let rx = lx - d;
                                if lx < 0 || lx >= width as i32 || rx < 0 || rx >= width as i32 {
                                    continue;
                                }
                                let l = left_data[yy as usize * width + lx as usize] as i32;
                                let r = right_data[yy as usize * width + rx as usize] as i32;
                                cost += l.abs_diff(r);
                                samples += 1;
                            }
                        }
                        row_costs[x as usize * num_disparities + d_idx] = if samples > 0 {
                            cost * (self.block_size * self.block_size) as u32 / samples
                        } else {
                            u32::MAX / 4
                        };
                    }
                }
            });
        costs
    }

    fn aggregate(
        &self,
        cost_volume: &[u32],
        width: usize,
        height: usize,
        num_disparities: usize,
    ) -> Vec<u32> {
        let mut aggregated = vec![0u32; cost_volume.len()];
        // Scratch reused across directions to avoid allocation churn.
        let mut path_costs = vec![0u32; cost_volume.len()];

        for &(dx, dy) in &AGGREGATION_PATHS {
            self.aggregate_direction(
                cost_volume,
                &mut aggregated,
                &mut path_costs,
                width,
                height,
                num_disparities,
                dx,
                dy,
            );
        }
        aggregated
    }

    #[allow(clippy::too_many_arguments)]
    fn aggregate_direction(
        &self,
        cost_volume: &[u32],
        aggregated: &mut [u32],
        path_costs: &mut [u32],
        width: usize,
        height: usize,
        num_disparities: usize,
        dx: i32,
        dy: i32,
    ) {
        let xs: Vec<i32> = if dx >= 0 {
            (0..width as i32).collect()
        } else {
            (0..width as i32).rev().collect()
        };
        let ys: Vec<i32> = if dy >= 0 {
            (0..height as i32).collect()
        } else {
            (0..height as i32).rev().collect()
        };

        for &y in &ys {
            for &x in &xs {
                let idx_base = (y as usize * width + x as usize) * num_disparities;
                let px = x - dx;
                let py = y - dy;

                if px >= 0 && px < width as i32 && py >= 0 && py < height as i32 {
                    let prev_base = (py as usize * width + px as usize) * num_disparities;
                    let mut prev_min = u32::MAX;
                    for pd in 0..num_disparities {
                        prev_min = prev_min.min(path_costs[prev_base + pd]);
                    }
                    let jump = prev_min.saturating_add(self.p2);

                    for d in 0..num_disparities {
                        let data_cost = cost_volume[idx_base + d];
                        let stay = path_costs[prev_base + d];
                        let step_down = if d > 0 {
                            path_costs[prev_base + d - 1].saturating_add(self.p1)
                        } else {
                            u32::MAX
                        };
                        let step_up = if d + 1 < num_disparities {
                            path_costs[prev_base + d + 1].saturating_add(self.p1)
                        } else {
                            u32::MAX
                        };
                        let best_prev = stay.min(step_down).min(step_up).min(jump);
                        let aggregated_cost =
                            data_cost.saturating_add(best_prev.saturating_sub(prev_min));
                        path_costs[idx_base + d] = aggregated_cost;
                        aggregated[idx_base + d] =
                            aggregated[idx_base + d].saturating_add(aggregated_cost);
                    }
                } else {
                    for d in 0..num_disparities {
                        let data_cost = cost_volume[idx_base + d];
                        path_costs[idx_base + d] = data_cost;
                        aggregated[idx_base + d] = aggregated[idx_base + d].saturating_add(data_cost);
                    }
                }
            }
        }
    }
}
