use image::{GrayImage, RgbImage};
use rayon::prelude::*;

/// BT.601 luminance conversion, fixed-point weights.
pub fn convert_rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = rgb.dimensions();
    let rgb_data = rgb.as_raw();
    let mut gray_data = vec![0u8; (w * h) as usize];

    gray_data
        .par_iter_mut()
        .zip(rgb_data.par_chunks_exact(3))
        .for_each(|(g, px)| {
            let weighted =
                299 * px[0] as u32 + 587 * px[1] as u32 + 114 * px[2] as u32;
            *g = ((weighted + 500) / 1000) as u8;
        });

    GrayImage::from_raw(w, h, gray_data).expect("buffer sized from dimensions")
}

pub fn convert_gray_to_rgb(gray: &GrayImage) -> RgbImage {
    let (w, h) = gray.dimensions();
    let gray_data = gray.as_raw();
    let mut rgb_data = vec![0u8; (w * h) as usize * 3];

    rgb_data
        .par_chunks_mut(3)
        .zip(gray_data.par_iter())
        .for_each(|(px, &g)| {
            px[0] = g;
            px[1] = g;
            px[2] = g;
        });

    RgbImage::from_raw(w, h, rgb_data).expect("buffer sized from dimensions")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn gray_conversion_weighs_channels() {
        let mut rgb = RgbImage::new(3, 1);
        rgb.put_pixel(0, 0, Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, Rgb([0, 255, 0]));
        rgb.put_pixel(2, 0, Rgb([0, 0, 255]));

        let gray = convert_rgb_to_gray(&rgb);
        assert_eq!(gray.get_pixel(0, 0)[0], 76);
        assert_eq!(gray.get_pixel(1, 0)[0], 150);
        assert_eq!(gray.get_pixel(2, 0)[0], 29);
    }

    #[test]
    fn gray_to_rgb_replicates_channel() {
        let mut gray = GrayImage::new(2, 2);
        gray.put_pixel(1, 1, Luma([200]));
        let rgb = convert_gray_to_rgb(&gray);
        assert_eq!(rgb.get_pixel(1, 1), &Rgb([200, 200, 200]));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }
}
