//! Output destination shared by the pipeline stages.
//!
//! All directory creation lives here so the calibration and reconstruction
//! logic stays free of path-convention side effects. Subfolder names follow
//! the layout downstream consumers expect.

use crate::Result;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct OutputSink {
    root: PathBuf,
}

impl OutputSink {
    /// Open (and create if needed) an output root.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a file directly under the root.
    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Path of a file inside a named subdirectory, creating the directory.
    pub fn file_in(&self, dir: &str, name: &str) -> Result<PathBuf> {
        let dir = self.root.join(dir);
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(name))
    }

    pub fn corner_data_file(&self) -> Result<PathBuf> {
        self.file_in("corner_data", "corners.json")
    }

    pub fn corner_image_file(&self, name: &str) -> Result<PathBuf> {
        self.file_in("corner_images", name)
    }

    pub fn residual_image_file(&self, index: usize) -> Result<PathBuf> {
        self.file_in("residual_images", &format!("residual_{index}.png"))
    }

    pub fn undistorted_image_file(&self, name: &str) -> Result<PathBuf> {
        self.file_in("undistorted", name)
    }

    pub fn camera_calibration_file(&self) -> PathBuf {
        self.file("camera_calibration.json")
    }

    pub fn stereo_calibration_file(&self) -> PathBuf {
        self.file("stereo_calibration.json")
    }

    pub fn stereo_rectify_file(&self) -> PathBuf {
        self.file("stereo_rectify.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_root_and_subdirectories_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let sink = OutputSink::new(dir.path().join("out")).unwrap();
        assert!(sink.root().is_dir());

        let corner_file = sink.corner_data_file().unwrap();
        assert!(corner_file.parent().unwrap().is_dir());
        assert!(corner_file.ends_with("corner_data/corners.json"));

        let residual = sink.residual_image_file(3).unwrap();
        assert!(residual.ends_with("residual_images/residual_3.png"));

        // Plain file paths do not touch the filesystem.
        let calib = sink.camera_calibration_file();
        assert!(!calib.exists());
    }
}
