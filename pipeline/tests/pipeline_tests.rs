use image::{GrayImage, Luma, Rgb, RgbImage};
use nalgebra::{Matrix3, Point2, Vector3};
use rigscan_calib3d::{stereo_rectify, TermCriteria};
use rigscan_core::{
    skew_symmetric, BoardGeometry, CameraIntrinsics, CameraModel, CornerDataset,
    CornerObservation, Distortion, Error, StereoRig,
};
use rigscan_io::{load_point_cloud, CloudFormat};
use rigscan_pipeline::{
    CornerExtractor, DenseReconstructor, MonoCalibrator, MonoOptions, OutputSink, StereoCalibrator,
};
use rigscan_stereo::QualityTier;
use std::path::Path;

fn checkerboard_rgb(board: &BoardGeometry, square: u32, margin_x: u32, margin_y: u32) -> RgbImage {
    let squares_x = board.cols as u32 + 1;
    let squares_y = board.rows as u32 + 1;
    let width = margin_x * 2 + squares_x * square;
    let height = margin_y * 2 + squares_y * square;
    let mut img = GrayImage::from_pixel(width, height, Luma([180]));
    for sy in 0..squares_y {
        for sx in 0..squares_x {
            let val = if (sx + sy) % 2 == 0 { 30u8 } else { 220u8 };
            for y in (margin_y + sy * square)..(margin_y + (sy + 1) * square) {
                for x in (margin_x + sx * square)..(margin_x + (sx + 1) * square) {
                    img.put_pixel(x, y, Luma([val]));
                }
            }
        }
    }
    let mut rgb = RgbImage::new(width, height);
    for (x, y, p) in img.enumerate_pixels() {
        rgb.put_pixel(x, y, Rgb([p[0], p[0], p[0]]));
    }
    rgb
}

fn textured_scene(width: u32, height: u32, shift: u32) -> (RgbImage, RgbImage) {
    let mut left = RgbImage::new(width, height);
    let mut right = RgbImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let tex = ((x * 37 + (x / 7) * 91 + y * 3) % 251) as u8;
            left.put_pixel(x, y, Rgb([tex, tex, tex]));
            // Content sits `shift` pixels further left in the right view.
            let sx = x + shift;
            let tex_r = ((sx * 37 + (sx / 7) * 91 + y * 3) % 251) as u8;
            right.put_pixel(x, y, Rgb([tex_r, tex_r, tex_r]));
        }
    }
    (left, right)
}

fn write_rig_and_rectification(
    dir: &Path,
    image_size: (u32, u32),
) -> (std::path::PathBuf, std::path::PathBuf) {
    let intrinsics = CameraIntrinsics::ideal(image_size.0, image_size.1);
    let camera = CameraModel::new(intrinsics, Distortion::none(), 0.1, "test".to_string());
    let rotation = Matrix3::identity();
    let translation = Vector3::new(-0.1, 0.0, 0.0);
    let essential = skew_symmetric(&translation) * rotation;
    let rig = StereoRig {
        left: camera.clone(),
        right: camera.clone(),
        rotation,
        translation,
        essential,
        fundamental: essential,
        rms_reprojection_error: 0.1,
        calibration_time: "test".to_string(),
    };
    let rectification =
        stereo_rectify(&camera, &camera, &rotation, &translation, image_size).unwrap();

    let rig_file = dir.join("stereo_calibration.json");
    let rect_file = dir.join("stereo_rectify.json");
    rig.save(&rig_file).unwrap();
    rectification.save(&rect_file).unwrap();
    (rig_file, rect_file)
}

#[test]
fn empty_input_folder_fails_without_corner_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");
    std::fs::create_dir_all(&input).unwrap();
    let sink = OutputSink::new(dir.path().join("out")).unwrap();

    let board = BoardGeometry::new(7, 6, 0.04).unwrap();
    let extractor = CornerExtractor::new(board, 1.0).unwrap();
    let err = extractor.run(&input, &sink).unwrap_err();
    assert!(matches!(err, Error::NoValidObservations(_)));
    assert!(!sink.root().join("corner_data/corners.json").exists());
}

#[test]
fn missing_input_folder_is_input_missing() {
    let dir = tempfile::tempdir().unwrap();
    let sink = OutputSink::new(dir.path().join("out")).unwrap();
    let board = BoardGeometry::new(7, 6, 0.04).unwrap();
    let extractor = CornerExtractor::new(board, 1.0).unwrap();
    let err = extractor.run(&dir.path().join("nope"), &sink).unwrap_err();
    assert!(matches!(err, Error::InputMissing(_)));
}

#[test]
fn single_pair_extraction_then_degenerate_mono_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let board = BoardGeometry::new(9, 6, 0.0082).unwrap();
    let img = checkerboard_rgb(&board, 20, 40, 30);
    let image_size = img.dimensions();

    for side in ["left", "right"] {
        let input = dir.path().join(format!("{side}_in"));
        std::fs::create_dir_all(&input).unwrap();
        img.save(input.join("board_0.png")).unwrap();

        let sink = OutputSink::new(dir.path().join(format!("{side}_out"))).unwrap();
        let extractor = CornerExtractor::new(board, 1.0).unwrap();
        let (dataset, report) = extractor.run(&input, &sink).unwrap();

        assert_eq!(report.total_images, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.observations[0].points.len(), 54);
        assert_eq!(dataset.observations[0].source_image, "board_0.png");
        assert!(sink.root().join("corner_images/board_0.png").exists());

        // A single observation still yields a camera model; quality is
        // signalled through the stored RMS, not an error.
        let calibrator = MonoCalibrator::new(
            TermCriteria::new(10, 1e-8),
            MonoOptions {
                render_residuals: true,
                save_undistorted: false,
            },
        );
        let model = calibrator
            .run(
                &sink.root().join("corner_data/corners.json"),
                &input,
                image_size,
                &sink,
            )
            .unwrap();
        assert!(model.rms_reprojection_error.is_finite());
        assert!(sink.root().join("camera_calibration.json").exists());
        assert!(sink.root().join("residual_images/residual_0.png").exists());
    }
}

#[test]
fn stereo_calibration_count_mismatch_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let board = BoardGeometry::new(3, 3, 0.02).unwrap();

    let grid: Vec<Point2<f64>> = (0..9)
        .map(|i| Point2::new(100.0 + (i % 3) as f64 * 20.0, 80.0 + (i / 3) as f64 * 20.0))
        .collect();

    let mut left = CornerDataset::new(board, 1.0);
    left.push(CornerObservation::new("l0.png", grid.clone())).unwrap();
    left.push(CornerObservation::new("l1.png", grid.clone())).unwrap();
    let mut right = CornerDataset::new(board, 1.0);
    right.push(CornerObservation::new("r0.png", grid)).unwrap();

    let left_file = dir.path().join("left_corners.json");
    let right_file = dir.path().join("right_corners.json");
    left.save(&left_file).unwrap();
    right.save(&right_file).unwrap();

    let sink = OutputSink::new(dir.path().join("out")).unwrap();
    let calibrator = StereoCalibrator::new(TermCriteria::stereo_calibration());
    let err = calibrator
        .run(&left_file, &right_file, None, None, (640, 480), &sink)
        .unwrap_err();
    assert!(matches!(err, Error::DatasetMismatch(_)));
    assert!(!sink.root().join("stereo_calibration.json").exists());
    assert!(!sink.root().join("stereo_rectify.json").exists());
}

#[test]
fn dense_reconstruction_of_shifted_scene_produces_a_cloud() {
    let dir = tempfile::tempdir().unwrap();
    let image_size = (96u32, 64u32);
    let (left, right) = textured_scene(image_size.0, image_size.1, 6);
    let left_path = dir.path().join("scene_left.png");
    let right_path = dir.path().join("scene_right.png");
    left.save(&left_path).unwrap();
    right.save(&right_path).unwrap();

    let (rig_file, rect_file) = write_rig_and_rectification(dir.path(), image_size);
    let sink = OutputSink::new(dir.path().join("out")).unwrap();

    let reconstructor = DenseReconstructor::new(QualityTier::Fast, CloudFormat::Ply, 100.0);
    let summary = reconstructor
        .run(&left_path, &right_path, &rig_file, &rect_file, &sink)
        .unwrap();

    assert!(summary.generated_points > 0);
    assert!(summary.retained_points > 0);
    assert!(summary.retained_points <= summary.generated_points);
    assert!(sink.root().join("rectified_left.png").exists());
    assert!(sink.root().join("rectified_right.png").exists());
    assert!(sink.root().join("disparity_map.png").exists());

    let cloud = load_point_cloud(&summary.output_file).unwrap();
    assert_eq!(cloud.len(), summary.retained_points);
    // Depth for a 6 px disparity under f=96, baseline 0.1 is ~1.6.
    let mean_z =
        cloud.points.iter().map(|p| p.z as f64).sum::<f64>() / cloud.len() as f64;
    assert!(mean_z > 0.5 && mean_z < 5.0, "mean depth {mean_z}");
}

#[test]
fn dense_reconstruction_of_identical_pair_reports_empty_not_panic() {
    let dir = tempfile::tempdir().unwrap();
    let image_size = (96u32, 64u32);
    let (left, _) = textured_scene(image_size.0, image_size.1, 0);
    let left_path = dir.path().join("scene_left.png");
    let right_path = dir.path().join("scene_right.png");
    left.save(&left_path).unwrap();
    left.save(&right_path).unwrap();

    let (rig_file, rect_file) = write_rig_and_rectification(dir.path(), image_size);
    let sink = OutputSink::new(dir.path().join("out")).unwrap();

    let reconstructor = DenseReconstructor::new(QualityTier::Fast, CloudFormat::Ply, 100.0);
    let err = reconstructor
        .run(&left_path, &right_path, &rig_file, &rect_file, &sink)
        .unwrap_err();
    assert!(matches!(err, Error::NoValidObservations(_)));
    assert!(!sink.root().join("reconstruction.ply").exists());
}

#[test]
fn dense_reconstruction_with_missing_calibration_fails_first() {
    let dir = tempfile::tempdir().unwrap();
    let sink = OutputSink::new(dir.path().join("out")).unwrap();
    let reconstructor = DenseReconstructor::new(QualityTier::Fast, CloudFormat::Xyz, 10.0);
    let err = reconstructor
        .run(
            &dir.path().join("l.png"),
            &dir.path().join("r.png"),
            &dir.path().join("rig.json"),
            &dir.path().join("rect.json"),
            &sink,
        )
        .unwrap_err();
    assert!(matches!(err, Error::InputMissing(_)));
}
