//! Point-cloud file I/O.
//!
//! Three interchange formats, selectable by the caller:
//! - ASCII PLY with per-vertex RGB colors
//! - XYZ, coordinates only
//! - OBJ, vertex statements only

pub mod obj;
pub mod ply;
pub mod xyz;

pub use obj::{read_obj, write_obj};
pub use ply::{read_ply, write_ply};
pub use xyz::{read_xyz, write_xyz};

pub use rigscan_core::{Error, Result};

use rigscan_core::PointCloud;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Color attached to points loaded from colorless formats or vertex lines.
pub const DEFAULT_COLOR: [u8; 3] = [255, 255, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudFormat {
    Ply,
    Xyz,
    Obj,
}

impl CloudFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            CloudFormat::Ply => "ply",
            CloudFormat::Xyz => "xyz",
            CloudFormat::Obj => "obj",
        }
    }

    /// Infer the format from a file path's extension, case-insensitive.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "ply" => Ok(CloudFormat::Ply),
            "xyz" => Ok(CloudFormat::Xyz),
            "obj" => Ok(CloudFormat::Obj),
            other => Err(Error::UnsupportedFormat(format!(
                "unrecognized point cloud extension '{other}'"
            ))),
        }
    }
}

/// Write a cloud in the requested format.
pub fn save_point_cloud(path: &Path, cloud: &PointCloud, format: CloudFormat) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    match format {
        CloudFormat::Ply => write_ply(&mut writer, cloud),
        CloudFormat::Xyz => write_xyz(&mut writer, cloud),
        CloudFormat::Obj => write_obj(&mut writer, cloud),
    }
}

/// Load a cloud, inferring the format from the file extension.
pub fn load_point_cloud(path: &Path) -> Result<PointCloud> {
    let format = CloudFormat::from_path(path)?;
    if !path.exists() {
        return Err(Error::InputMissing(path.display().to_string()));
    }
    let reader = BufReader::new(File::open(path)?);
    let cloud = match format {
        CloudFormat::Ply => read_ply(reader)?,
        CloudFormat::Xyz => read_xyz(reader)?,
        CloudFormat::Obj => read_obj(reader)?,
    };
    log::info!("loaded {} points from {}", cloud.len(), path.display());
    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(
            CloudFormat::from_path(Path::new("scan.PLY")).unwrap(),
            CloudFormat::Ply
        );
        assert_eq!(
            CloudFormat::from_path(Path::new("a/b/points.xyz")).unwrap(),
            CloudFormat::Xyz
        );
        assert!(matches!(
            CloudFormat::from_path(Path::new("mesh.stl")),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(CloudFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn save_and_load_dispatch_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.xyz");

        let mut cloud = PointCloud::new();
        cloud.push(Point3::new(1.5, -2.25, 3.0), [1, 2, 3]);
        save_point_cloud(&path, &cloud, CloudFormat::Xyz).unwrap();

        let loaded = load_point_cloud(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.points[0], cloud.points[0]);
        assert_eq!(loaded.colors[0], DEFAULT_COLOR);
    }
}
