//! Disparity-to-point-cloud reprojection through the Q matrix.

use crate::{DisparityMap, Error, Result};
use image::RgbImage;
use nalgebra::{Matrix4, Point3, Vector4};
use rigscan_core::PointCloud;

/// Reproject every positive-disparity pixel into 3D, colored from the
/// rectified left image.
///
/// `(x, y, d, 1)` is transformed homogeneously by `q` and perspective-divided.
/// Pixels with non-positive or missing disparity are silently excluded; that
/// exclusion is the primary sparsity mechanism, ahead of any distance filter.
/// A cloud with zero surviving points is a hard failure.
pub fn disparity_to_point_cloud(
    disparity: &DisparityMap,
    colors: &RgbImage,
    q: &Matrix4<f64>,
) -> Result<PointCloud> {
    if disparity.is_empty() {
        return Err(Error::NoValidObservations(
            "disparity map is empty".to_string(),
        ));
    }
    if colors.dimensions() != (disparity.width, disparity.height) {
        return Err(Error::DatasetMismatch(format!(
            "color image is {:?}, disparity map is {:?}",
            colors.dimensions(),
            (disparity.width, disparity.height)
        )));
    }
    if disparity.subpixel_scale != 1.0 {
        return Err(Error::InvalidParameters(
            "disparity map must be normalized before reprojection".to_string(),
        ));
    }

    let mut cloud = PointCloud::with_capacity(disparity.len() / 4);
    for y in 0..disparity.height {
        for x in 0..disparity.width {
            let d = disparity.get(x, y);
            if d <= 0.0 {
                continue;
            }
            let h = q * Vector4::new(x as f64, y as f64, d as f64, 1.0);
            let w = h[3];
            let point = Point3::new((h[0] / w) as f32, (h[1] / w) as f32, (h[2] / w) as f32);
            cloud.push(point, colors.get_pixel(x, y).0);
        }
    }

    if cloud.is_empty() {
        return Err(Error::NoValidObservations(
            "no pixels with positive disparity".to_string(),
        ));
    }
    log::debug!(
        "reprojected {} of {} pixels into the cloud",
        cloud.len(),
        disparity.len()
    );
    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::INVALID_DISPARITY;
    use image::Rgb;

    fn identity_q(f: f64, cx: f64, cy: f64, baseline: f64) -> Matrix4<f64> {
        let mut q = Matrix4::zeros();
        q[(0, 0)] = 1.0;
        q[(0, 3)] = -cx;
        q[(1, 1)] = 1.0;
        q[(1, 3)] = -cy;
        q[(2, 3)] = f;
        q[(3, 2)] = 1.0 / baseline;
        q
    }

    #[test]
    fn reprojects_depth_from_disparity() {
        let f = 500.0;
        let baseline = 0.1;
        let q = identity_q(f, 32.0, 24.0, baseline);

        let mut disp = DisparityMap::new(64, 48, 0, 64);
        disp.set(32, 24, 25.0);
        let mut colors = RgbImage::new(64, 48);
        colors.put_pixel(32, 24, Rgb([10, 20, 30]));

        let cloud = disparity_to_point_cloud(&disp, &colors, &q).unwrap();
        assert_eq!(cloud.len(), 1);
        let p = cloud.points[0];
        // Z = f / (d / baseline) = f * baseline / d = 2.0
        assert!((p.z - 2.0).abs() < 1e-5);
        assert!(p.x.abs() < 1e-5);
        assert!(p.y.abs() < 1e-5);
        assert_eq!(cloud.colors[0], [10, 20, 30]);
    }

    #[test]
    fn zero_disparity_everywhere_is_reported_not_a_panic() {
        let mut disp = DisparityMap::new(16, 16, 0, 16);
        for v in &mut disp.data {
            *v = 0.0;
        }
        disp.set(3, 3, INVALID_DISPARITY);
        let colors = RgbImage::new(16, 16);
        let q = identity_q(500.0, 8.0, 8.0, 0.1);

        let err = disparity_to_point_cloud(&disp, &colors, &q).unwrap_err();
        assert!(matches!(err, Error::NoValidObservations(_)));
    }

    #[test]
    fn unnormalized_map_is_rejected() {
        let mut disp = DisparityMap::new(8, 8, 0, 16);
        disp.subpixel_scale = 16.0;
        let colors = RgbImage::new(8, 8);
        let q = identity_q(500.0, 4.0, 4.0, 0.1);
        assert!(disparity_to_point_cloud(&disp, &colors, &q).is_err());
    }
}
