//! Speckle suppression: erase small connected disparity blobs.

use crate::{DisparityMap, INVALID_DISPARITY};

/// Invalidate connected components smaller than `max_size` whose members stay
/// within `range` of their 4-neighbors. Mirrors the post-filter the classic
/// matchers apply so isolated mismatches do not survive into reprojection.
pub fn filter_speckles(disparity: &mut DisparityMap, max_size: usize, range: f32) {
    if max_size == 0 || disparity.data.is_empty() {
        return;
    }
    let width = disparity.width as usize;
    let height = disparity.height as usize;
    let invalid_value = INVALID_DISPARITY * disparity.subpixel_scale;
    let scaled_range = range * disparity.subpixel_scale;

    let mut label = vec![0u32; width * height];
    let mut next_label = 1u32;
    let mut stack = Vec::new();
    let mut component = Vec::new();

    for start in 0..width * height {
        if label[start] != 0 || disparity.data[start] < 0.0 {
            continue;
        }

        component.clear();
        stack.push(start);
        label[start] = next_label;
        while let Some(idx) = stack.pop() {
            component.push(idx);
            let x = idx % width;
            let y = idx / width;
            let d = disparity.data[idx];

            let mut visit = |nx: usize, ny: usize| {
                let nidx = ny * width + nx;
                if label[nidx] == 0
                    && disparity.data[nidx] >= 0.0
                    && (disparity.data[nidx] - d).abs() <= scaled_range
                {
                    label[nidx] = next_label;
                    stack.push(nidx);
                }
            };
            if x > 0 {
                visit(x - 1, y);
            }
            if x + 1 < width {
                visit(x + 1, y);
            }
            if y > 0 {
                visit(x, y - 1);
            }
            if y + 1 < height {
                visit(x, y + 1);
            }
        }

        if component.len() <= max_size {
            for &idx in &component {
                disparity.data[idx] = invalid_value;
            }
        }
        next_label += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_islands_are_erased_large_regions_survive() {
        let mut disp = DisparityMap::new(16, 16, 0, 32);
        // Large coherent region.
        for y in 0..16 {
            for x in 0..10 {
                disp.set(x, y, 8.0);
            }
        }
        // Tiny island far from the region's disparity.
        disp.set(13, 4, 30.0);
        disp.set(14, 4, 30.0);

        filter_speckles(&mut disp, 10, 1.0);
        assert_eq!(disp.get(5, 5), 8.0);
        assert!(disp.get(13, 4) < 0.0);
        assert!(disp.get(14, 4) < 0.0);
    }

    #[test]
    fn zero_window_disables_filter() {
        let mut disp = DisparityMap::new(4, 4, 0, 16);
        disp.set(1, 1, 5.0);
        filter_speckles(&mut disp, 0, 1.0);
        assert_eq!(disp.get(1, 1), 5.0);
    }
}
