//! Dense reconstruction stage: scene stereo pair plus calibration artifacts
//! in, filtered colored point cloud out.

use crate::{Error, OutputSink, Result};
use image::RgbImage;
use rigscan_calib3d::init_undistort_rectify_map;
use rigscan_core::{CameraModel, PointCloud, RectificationSet, StereoRig};
use rigscan_imgproc::{convert_rgb_to_gray, remap_rgb, BorderMode, Interpolation};
use rigscan_io::{save_point_cloud, CloudFormat};
use rigscan_stereo::{disparity_to_point_cloud, QualityTier};
use std::path::{Path, PathBuf};

/// What a reconstruction run produced.
#[derive(Debug, Clone)]
pub struct ReconstructionSummary {
    pub generated_points: usize,
    pub retained_points: usize,
    pub output_file: PathBuf,
}

pub struct DenseReconstructor {
    pub tier: QualityTier,
    pub format: CloudFormat,
    /// Strict coordinate-magnitude cutoff for the cloud filter.
    pub max_distance: f32,
}

impl DenseReconstructor {
    pub fn new(tier: QualityTier, format: CloudFormat, max_distance: f32) -> Self {
        Self {
            tier,
            format,
            max_distance,
        }
    }

    /// Run the full dense pipeline. Every step gates the next; any failure is
    /// returned before the output file is created, so no partial cloud is
    /// ever left behind.
    pub fn run(
        &self,
        left_image_path: &Path,
        right_image_path: &Path,
        rig_file: &Path,
        rectify_file: &Path,
        sink: &OutputSink,
    ) -> Result<ReconstructionSummary> {
        let rig = StereoRig::load(rig_file)?;
        let rectification = RectificationSet::load(rectify_file)?;

        let left = open_scene_image(left_image_path)?;
        let right = open_scene_image(right_image_path)?;
        if left.dimensions() != right.dimensions() {
            return Err(Error::DatasetMismatch(format!(
                "scene images differ in size: {:?} vs {:?}",
                left.dimensions(),
                right.dimensions()
            )));
        }
        let image_size = left.dimensions();
        log::info!("loaded scene pair {}x{}", image_size.0, image_size.1);

        let rectified_left =
            rectify_frame(&left, &rig.left, &rectification, true, image_size)?;
        let rectified_right =
            rectify_frame(&right, &rig.right, &rectification, false, image_size)?;
        rectified_left.save(sink.file("rectified_left.png"))?;
        rectified_right.save(sink.file("rectified_right.png"))?;

        let config = self.tier.matcher_config();
        let matcher = config.build();
        let disparity = matcher
            .compute(
                &convert_rgb_to_gray(&rectified_left),
                &convert_rgb_to_gray(&rectified_right),
            )?
            .normalized();
        if disparity.is_empty() {
            return Err(Error::NoValidObservations(
                "matcher produced an empty disparity map".to_string(),
            ));
        }
        disparity.to_image().save(sink.file("disparity_map.png"))?;
        log::info!("disparity computed over {} disparities", config.num_disparities);

        let mut cloud: PointCloud =
            disparity_to_point_cloud(&disparity, &rectified_left, &rectification.q)?;
        let generated = cloud.len();

        let retained = cloud.filter_by_distance(self.max_distance);
        if retained == 0 {
            return Err(Error::NoValidObservations(
                "every reconstructed point was filtered out".to_string(),
            ));
        }
        log::info!("point cloud: {generated} generated, {retained} retained");

        let output_file = sink.file(&format!("reconstruction.{}", self.format.extension()));
        save_point_cloud(&output_file, &cloud, self.format)?;

        Ok(ReconstructionSummary {
            generated_points: generated,
            retained_points: retained,
            output_file,
        })
    }
}

fn open_scene_image(path: &Path) -> Result<RgbImage> {
    if !path.is_file() {
        return Err(Error::InputMissing(path.display().to_string()));
    }
    Ok(image::open(path)?.to_rgb8())
}

/// Warp one frame into the rectified frame through its undistort/rectify map.
fn rectify_frame(
    frame: &RgbImage,
    camera: &CameraModel,
    rectification: &RectificationSet,
    is_left: bool,
    image_size: (u32, u32),
) -> Result<RgbImage> {
    let (rotation, projection) = if is_left {
        (&rectification.r1, &rectification.p1)
    } else {
        (&rectification.r2, &rectification.p2)
    };
    let new_camera = RectificationSet::new_camera(projection, image_size);
    let (map_x, map_y) = init_undistort_rectify_map(
        image_size,
        &camera.intrinsics,
        &camera.distortion,
        rotation,
        &new_camera,
    )?;
    Ok(remap_rgb(
        frame,
        &map_x,
        &map_y,
        image_size.0,
        image_size.1,
        Interpolation::Linear,
        BorderMode::Constant(0),
    ))
}
