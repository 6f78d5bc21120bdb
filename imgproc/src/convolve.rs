use image::GrayImage;
use rayon::prelude::*;

/// Normalized 1D Gaussian taps for a separable blur.
pub fn gaussian_kernel_1d(sigma: f32, size: usize) -> Vec<f32> {
    let size = if size % 2 == 0 { size + 1 } else { size.max(1) };
    let half = (size / 2) as i32;
    let denom = 2.0 * sigma * sigma;

    let mut taps: Vec<f32> = (-half..=half)
        .map(|i| (-(i * i) as f32 / denom).exp())
        .collect();
    let sum: f32 = taps.iter().sum();
    for t in &mut taps {
        *t /= sum;
    }
    taps
}

/// Separable Gaussian blur with replicated edges, used to quiet sensor noise
/// ahead of corner detection.
pub fn gaussian_blur(src: &GrayImage, sigma: f32, size: usize) -> GrayImage {
    if sigma <= 0.0 || src.width() == 0 || src.height() == 0 {
        return src.clone();
    }
    let taps = gaussian_kernel_1d(sigma, size);
    let half = (taps.len() / 2) as i32;
    let width = src.width() as usize;
    let height = src.height() as usize;
    let data = src.as_raw();

    // Horizontal pass into an f32 buffer, vertical pass back to u8.
    let mut horizontal = vec![0.0f32; width * height];
    horizontal
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            let src_row = &data[y * width..(y + 1) * width];
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for (k, tap) in taps.iter().enumerate() {
                    let sx = (x as i32 + k as i32 - half).clamp(0, width as i32 - 1) as usize;
                    acc += src_row[sx] as f32 * tap;
                }
                *out = acc;
            }
        });

    let mut dst = GrayImage::new(src.width(), src.height());
    dst.par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for (k, tap) in taps.iter().enumerate() {
                    let sy = (y as i32 + k as i32 - half).clamp(0, height as i32 - 1) as usize;
                    acc += horizontal[sy * width + x] * tap;
                }
                *out = acc.round().clamp(0.0, 255.0) as u8;
            }
        });

    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let taps = gaussian_kernel_1d(1.0, 5);
        assert_eq!(taps.len(), 5);
        let sum: f32 = taps.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!((taps[0] - taps[4]).abs() < 1e-6);
        assert!(taps[2] > taps[1]);
    }

    #[test]
    fn blur_preserves_constant_image() {
        let src = GrayImage::from_pixel(9, 7, Luma([140]));
        let out = gaussian_blur(&src, 1.0, 5);
        assert!(out.pixels().all(|p| p[0] == 140));
    }

    #[test]
    fn blur_softens_an_edge() {
        let mut src = GrayImage::new(10, 3);
        for y in 0..3 {
            for x in 5..10 {
                src.put_pixel(x, y, Luma([255]));
            }
        }
        let out = gaussian_blur(&src, 1.0, 5);
        let edge = out.get_pixel(5, 1)[0];
        assert!(edge > 0 && edge < 255);
    }
}
