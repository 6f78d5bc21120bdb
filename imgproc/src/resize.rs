use crate::Interpolation;
use image::{GrayImage, RgbImage};
use rayon::prelude::*;

/// Bilinear resize of a grayscale image.
pub fn resize(src: &GrayImage, width: u32, height: u32, interpolation: Interpolation) -> GrayImage {
    if width == 0 || height == 0 || src.width() == 0 || src.height() == 0 {
        return GrayImage::new(width, height);
    }

    let sx = src.width() as f32 / width as f32;
    let sy = src.height() as f32 / height as f32;
    let mut dst = GrayImage::new(width, height);

    dst.par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let fx = (x as f32 + 0.5) * sx - 0.5;
                let fy = (y as f32 + 0.5) * sy - 0.5;
                *out = match interpolation {
                    Interpolation::Nearest => {
                        let xi = fx.round().clamp(0.0, (src.width() - 1) as f32) as u32;
                        let yi = fy.round().clamp(0.0, (src.height() - 1) as f32) as u32;
                        src.get_pixel(xi, yi)[0]
                    }
                    Interpolation::Linear => sample_gray(src, fx, fy),
                };
            }
        });

    dst
}

/// Bilinear resize of an RGB image.
pub fn resize_rgb(src: &RgbImage, width: u32, height: u32) -> RgbImage {
    if width == 0 || height == 0 || src.width() == 0 || src.height() == 0 {
        return RgbImage::new(width, height);
    }

    let sx = src.width() as f32 / width as f32;
    let sy = src.height() as f32 / height as f32;
    let mut dst = RgbImage::new(width, height);

    dst.par_chunks_mut(width as usize * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let fx = (x as f32 + 0.5) * sx - 0.5;
                let fy = (y as f32 + 0.5) * sy - 0.5;
                let px = sample_rgb(src, fx, fy);
                row[x * 3] = px[0];
                row[x * 3 + 1] = px[1];
                row[x * 3 + 2] = px[2];
            }
        });

    dst
}

/// Uniform scale helper used ahead of corner detection.
pub fn scaled_dimensions(width: u32, height: u32, factor: f64) -> (u32, u32) {
    let w = ((width as f64 * factor).round() as u32).max(1);
    let h = ((height as f64 * factor).round() as u32).max(1);
    (w, h)
}

fn sample_gray(img: &GrayImage, x: f32, y: f32) -> u8 {
    let (x0, y0, x1, y1, dx, dy) = bilinear_coords(img.width(), img.height(), x, y);
    let v00 = img.get_pixel(x0, y0)[0] as f32;
    let v10 = img.get_pixel(x1, y0)[0] as f32;
    let v01 = img.get_pixel(x0, y1)[0] as f32;
    let v11 = img.get_pixel(x1, y1)[0] as f32;
    let v0 = v00 * (1.0 - dx) + v10 * dx;
    let v1 = v01 * (1.0 - dx) + v11 * dx;
    (v0 * (1.0 - dy) + v1 * dy).clamp(0.0, 255.0) as u8
}

fn sample_rgb(img: &RgbImage, x: f32, y: f32) -> [u8; 3] {
    let (x0, y0, x1, y1, dx, dy) = bilinear_coords(img.width(), img.height(), x, y);
    let mut out = [0u8; 3];
    for (c, v) in out.iter_mut().enumerate() {
        let v00 = img.get_pixel(x0, y0)[c] as f32;
        let v10 = img.get_pixel(x1, y0)[c] as f32;
        let v01 = img.get_pixel(x0, y1)[c] as f32;
        let v11 = img.get_pixel(x1, y1)[c] as f32;
        let v0 = v00 * (1.0 - dx) + v10 * dx;
        let v1 = v01 * (1.0 - dx) + v11 * dx;
        *v = (v0 * (1.0 - dy) + v1 * dy).clamp(0.0, 255.0) as u8;
    }
    out
}

fn bilinear_coords(width: u32, height: u32, x: f32, y: f32) -> (u32, u32, u32, u32, f32, f32) {
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    (x0, y0, x1, y1, x - x0 as f32, y - y0 as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn resize_halves_dimensions() {
        let mut src = GrayImage::new(8, 6);
        for y in 0..6 {
            for x in 0..8 {
                src.put_pixel(x, y, Luma([(x * 30) as u8]));
            }
        }
        let out = resize(&src, 4, 3, Interpolation::Linear);
        assert_eq!(out.dimensions(), (4, 3));
    }

    #[test]
    fn identity_resize_preserves_pixels() {
        let mut src = GrayImage::new(5, 4);
        for y in 0..4 {
            for x in 0..5 {
                src.put_pixel(x, y, Luma([((x * 7 + y * 11) % 256) as u8]));
            }
        }
        let out = resize(&src, 5, 4, Interpolation::Linear);
        assert_eq!(out.as_raw(), src.as_raw());
    }

    #[test]
    fn scaled_dimensions_round_and_clamp() {
        assert_eq!(scaled_dimensions(3264, 2448, 0.5), (1632, 1224));
        assert_eq!(scaled_dimensions(3, 3, 0.1), (1, 1));
        assert_eq!(scaled_dimensions(100, 50, 1.0), (100, 50));
    }
}
