use crate::{BorderMode, Interpolation};
use image::{GrayImage, RgbImage};
use rayon::prelude::*;

/// Remap a grayscale image through per-pixel source coordinate maps.
///
/// `map_x`/`map_y` give, for every destination pixel, the source location to
/// sample; both must hold `width * height` entries.
pub fn remap(
    src: &GrayImage,
    map_x: &[f32],
    map_y: &[f32],
    width: u32,
    height: u32,
    interpolation: Interpolation,
    border: BorderMode,
) -> GrayImage {
    assert_eq!(map_x.len(), (width * height) as usize);
    assert_eq!(map_y.len(), (width * height) as usize);

    let mut dst = GrayImage::new(width, height);
    dst.par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let idx = y * width as usize + x;
                *out = sample_gray(src, map_x[idx], map_y[idx], interpolation, border);
            }
        });
    dst
}

/// RGB variant of [`remap`], used when rectifying the color frames that feed
/// point-cloud coloring.
pub fn remap_rgb(
    src: &RgbImage,
    map_x: &[f32],
    map_y: &[f32],
    width: u32,
    height: u32,
    interpolation: Interpolation,
    border: BorderMode,
) -> RgbImage {
    assert_eq!(map_x.len(), (width * height) as usize);
    assert_eq!(map_y.len(), (width * height) as usize);

    let mut dst = RgbImage::new(width, height);
    dst.par_chunks_mut(width as usize * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let idx = y * width as usize + x;
                let px = sample_rgb(src, map_x[idx], map_y[idx], interpolation, border);
                row[x * 3] = px[0];
                row[x * 3 + 1] = px[1];
                row[x * 3 + 2] = px[2];
            }
        });
    dst
}

fn sample_gray(
    img: &GrayImage,
    x: f32,
    y: f32,
    interpolation: Interpolation,
    border: BorderMode,
) -> u8 {
    match interpolation {
        Interpolation::Nearest => {
            fetch_gray(img, x.round() as isize, y.round() as isize, border)
        }
        Interpolation::Linear => {
            let x0 = x.floor() as isize;
            let y0 = y.floor() as isize;
            let dx = x - x0 as f32;
            let dy = y - y0 as f32;
            let v00 = fetch_gray(img, x0, y0, border) as f32;
            let v10 = fetch_gray(img, x0 + 1, y0, border) as f32;
            let v01 = fetch_gray(img, x0, y0 + 1, border) as f32;
            let v11 = fetch_gray(img, x0 + 1, y0 + 1, border) as f32;
            let v0 = v00 * (1.0 - dx) + v10 * dx;
            let v1 = v01 * (1.0 - dx) + v11 * dx;
            (v0 * (1.0 - dy) + v1 * dy).clamp(0.0, 255.0) as u8
        }
    }
}

fn sample_rgb(
    img: &RgbImage,
    x: f32,
    y: f32,
    interpolation: Interpolation,
    border: BorderMode,
) -> [u8; 3] {
    match interpolation {
        Interpolation::Nearest => {
            fetch_rgb(img, x.round() as isize, y.round() as isize, border)
        }
        Interpolation::Linear => {
            let x0 = x.floor() as isize;
            let y0 = y.floor() as isize;
            let dx = x - x0 as f32;
            let dy = y - y0 as f32;
            let p00 = fetch_rgb(img, x0, y0, border);
            let p10 = fetch_rgb(img, x0 + 1, y0, border);
            let p01 = fetch_rgb(img, x0, y0 + 1, border);
            let p11 = fetch_rgb(img, x0 + 1, y0 + 1, border);
            let mut out = [0u8; 3];
            for (c, v) in out.iter_mut().enumerate() {
                let v0 = p00[c] as f32 * (1.0 - dx) + p10[c] as f32 * dx;
                let v1 = p01[c] as f32 * (1.0 - dx) + p11[c] as f32 * dx;
                *v = (v0 * (1.0 - dy) + v1 * dy).clamp(0.0, 255.0) as u8;
            }
            out
        }
    }
}

fn fetch_gray(img: &GrayImage, x: isize, y: isize, border: BorderMode) -> u8 {
    match map_coord(x, img.width(), border).zip(map_coord(y, img.height(), border)) {
        Some((ix, iy)) => img.get_pixel(ix, iy)[0],
        None => match border {
            BorderMode::Constant(v) => v,
            BorderMode::Replicate => 0,
        },
    }
}

fn fetch_rgb(img: &RgbImage, x: isize, y: isize, border: BorderMode) -> [u8; 3] {
    match map_coord(x, img.width(), border).zip(map_coord(y, img.height(), border)) {
        Some((ix, iy)) => img.get_pixel(ix, iy).0,
        None => match border {
            BorderMode::Constant(v) => [v, v, v],
            BorderMode::Replicate => [0, 0, 0],
        },
    }
}

fn map_coord(coord: isize, len: u32, border: BorderMode) -> Option<u32> {
    let n = len as isize;
    if n <= 0 {
        return None;
    }
    match border {
        BorderMode::Constant(_) => {
            if coord < 0 || coord >= n {
                None
            } else {
                Some(coord as u32)
            }
        }
        BorderMode::Replicate => Some(coord.clamp(0, n - 1) as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn identity_remap_copies_image() {
        let mut src = GrayImage::new(6, 4);
        for y in 0..4 {
            for x in 0..6 {
                src.put_pixel(x, y, Luma([((x * 13 + y * 29) % 256) as u8]));
            }
        }
        let mut map_x = vec![0.0f32; 24];
        let mut map_y = vec![0.0f32; 24];
        for y in 0..4usize {
            for x in 0..6usize {
                map_x[y * 6 + x] = x as f32;
                map_y[y * 6 + x] = y as f32;
            }
        }

        let out = remap(
            &src,
            &map_x,
            &map_y,
            6,
            4,
            Interpolation::Linear,
            BorderMode::Constant(0),
        );
        assert_eq!(out.as_raw(), src.as_raw());
    }

    #[test]
    fn out_of_bounds_samples_take_border_value() {
        let src = GrayImage::from_pixel(2, 2, Luma([77]));
        let map_x = vec![-5.0f32; 4];
        let map_y = vec![-5.0f32; 4];
        let out = remap(
            &src,
            &map_x,
            &map_y,
            2,
            2,
            Interpolation::Nearest,
            BorderMode::Constant(9),
        );
        assert!(out.pixels().all(|p| p[0] == 9));
    }
}
