use nalgebra::{Matrix3, Matrix3x4, Matrix4, Vector3};
use rigscan_core::{
    CameraIntrinsics, CameraModel, Distortion, RectificationSet, Roi, StereoRig,
};

fn sample_camera() -> CameraModel {
    CameraModel::new(
        CameraIntrinsics::new(812.4, 806.9, 1631.2, 1224.8, 3264, 2448),
        Distortion::new(0.091, -0.184, 0.0011, -0.0007, 0.063),
        0.4182,
        "2026-08-07 10:15:00".to_string(),
    )
}

#[test]
fn camera_model_roundtrip_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("camera_calibration.json");

    let model = sample_camera();
    model.save(&path).unwrap();
    let loaded = CameraModel::load(&path).unwrap();

    assert_eq!(loaded.intrinsics, model.intrinsics);
    assert_eq!(loaded.distortion, model.distortion);
    assert_eq!(loaded.rms_reprojection_error, model.rms_reprojection_error);
    assert_eq!(loaded.calibration_time, model.calibration_time);
}

#[test]
fn camera_model_load_accepts_extended_distortion_vector() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("camera.json");
    let record = serde_json::json!({
        "camera_matrix": [[800.0, 0.0, 320.0], [0.0, 790.0, 240.0], [0.0, 0.0, 1.0]],
        "distortion_coefficients": [0.1, -0.05, 0.001, -0.002, 0.01, 0.0, 0.0, 0.0],
        "image_width": 640,
        "image_height": 480,
        "reprojection_error": 0.7,
        "calibration_time": "2026-08-07 09:00:00",
    });
    std::fs::write(&path, serde_json::to_string(&record).unwrap()).unwrap();

    let model = CameraModel::load(&path).unwrap();
    assert_eq!(model.distortion, Distortion::new(0.1, -0.05, 0.001, -0.002, 0.01));
    assert_eq!(model.image_size(), (640, 480));
}

#[test]
fn stereo_rig_roundtrip_preserves_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stereo_calibration.json");

    let rotation = nalgebra::Rotation3::from_euler_angles(0.01, -0.015, 0.005).into_inner();
    let translation = Vector3::new(-0.1203, 0.0021, -0.0014);
    let essential = rigscan_core::skew_symmetric(&translation) * rotation;
    let rig = StereoRig {
        left: sample_camera(),
        right: sample_camera(),
        rotation,
        translation,
        essential,
        fundamental: essential * 1.5e-6,
        rms_reprojection_error: 0.6314,
        calibration_time: "2026-08-07 10:16:00".to_string(),
    };
    rig.save(&path).unwrap();

    let loaded = StereoRig::load(&path).unwrap();
    assert!((loaded.rotation - rig.rotation).norm() < 1e-15);
    assert!((loaded.translation - rig.translation).norm() < 1e-15);
    assert!((loaded.essential - rig.essential).norm() < 1e-15);
    assert!((loaded.fundamental - rig.fundamental).norm() < 1e-15);
    assert_eq!(loaded.left.intrinsics, rig.left.intrinsics);
    assert_eq!(loaded.right.distortion, rig.right.distortion);
    assert_eq!(loaded.rms_reprojection_error, rig.rms_reprojection_error);
    assert!((loaded.baseline() - rig.baseline()).abs() < 1e-12);
}

#[test]
fn rectification_set_roundtrip_preserves_rois() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stereo_rectify.json");

    let mut q = Matrix4::zeros();
    q[(0, 0)] = 1.0;
    q[(0, 3)] = -1631.2;
    q[(1, 1)] = 1.0;
    q[(1, 3)] = -1224.8;
    q[(2, 3)] = 809.6;
    q[(3, 2)] = 1.0 / 0.1203;

    let set = RectificationSet {
        r1: Matrix3::identity(),
        r2: nalgebra::Rotation3::from_euler_angles(0.0, 0.0, 0.002).into_inner(),
        p1: Matrix3x4::new(
            809.6, 0.0, 1631.2, 0.0, //
            0.0, 809.6, 1224.8, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        ),
        p2: Matrix3x4::new(
            809.6, 0.0, 1631.2, -97.4, //
            0.0, 809.6, 1224.8, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        ),
        q,
        left_roi: Roi::new(12, 8, 3230, 2420),
        right_roi: Roi::new(20, 8, 3220, 2420),
    };
    set.save(&path).unwrap();

    let loaded = RectificationSet::load(&path).unwrap();
    assert_eq!(loaded, set);

    // Field names follow the conventional upper-case matrix keys.
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"R1\""));
    assert!(text.contains("\"Q\""));
    assert!(text.contains("\"left_roi_width\""));
}

#[test]
fn missing_files_surface_as_input_missing() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        CameraModel::load(&dir.path().join("nope.json")),
        Err(rigscan_core::Error::InputMissing(_))
    ));
    assert!(matches!(
        StereoRig::load(&dir.path().join("nope.json")),
        Err(rigscan_core::Error::InputMissing(_))
    ));
}
