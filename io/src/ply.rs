//! ASCII PLY with optional per-vertex uchar RGB colors.

use crate::{Error, Result, DEFAULT_COLOR};
use nalgebra::Point3;
use rigscan_core::PointCloud;
use std::io::{BufRead, Write};

/// Read an ASCII PLY point cloud. Vertex rows carrying fewer than six values
/// load position-only with the default color.
pub fn read_ply<R: BufRead>(reader: R) -> Result<PointCloud> {
    let mut lines = reader.lines();

    let mut vertex_count = 0usize;
    let mut format = String::new();
    let mut header_done = false;
    for line in lines.by_ref() {
        let line = line?;
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("format ") {
            format = rest
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
        } else if let Some(rest) = line.strip_prefix("element vertex ") {
            vertex_count = rest
                .trim()
                .parse()
                .map_err(|_| Error::Parse(format!("bad vertex count '{rest}'")))?;
        } else if line == "end_header" {
            header_done = true;
            break;
        }
    }

    if !header_done {
        return Err(Error::Parse("PLY header missing end_header".to_string()));
    }
    if format != "ascii" {
        return Err(Error::UnsupportedFormat(format!(
            "PLY format '{format}' not supported, only ascii"
        )));
    }

    let mut cloud = PointCloud::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        let line = lines
            .next()
            .ok_or_else(|| Error::Parse("PLY data ended before vertex count".to_string()))??;
        let values: Vec<f32> = line
            .split_whitespace()
            .map(|s| {
                s.parse::<f32>()
                    .map_err(|_| Error::Parse(format!("bad PLY value '{s}'")))
            })
            .collect::<Result<_>>()?;
        if values.len() < 3 {
            return Err(Error::Parse(format!("short PLY vertex row '{line}'")));
        }

        let color = if values.len() >= 6 {
            [values[3] as u8, values[4] as u8, values[5] as u8]
        } else {
            DEFAULT_COLOR
        };
        cloud.push(Point3::new(values[0], values[1], values[2]), color);
    }

    Ok(cloud)
}

/// Write an ASCII PLY point cloud with uchar RGB colors.
pub fn write_ply<W: Write>(writer: &mut W, cloud: &PointCloud) -> Result<()> {
    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {}", cloud.len())?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;
    writeln!(writer, "property uchar red")?;
    writeln!(writer, "property uchar green")?;
    writeln!(writer, "property uchar blue")?;
    writeln!(writer, "end_header")?;

    for (point, color) in cloud.points.iter().zip(cloud.colors.iter()) {
        writeln!(
            writer,
            "{} {} {} {} {} {}",
            point.x, point.y, point.z, color[0], color[1], color[2]
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_three_colored_vertices() {
        let text = "ply\nformat ascii 1.0\nelement vertex 3\n\
                    property float x\nproperty float y\nproperty float z\n\
                    property uchar red\nproperty uchar green\nproperty uchar blue\n\
                    end_header\n\
                    0 0 0 255 0 0\n\
                    1 0 0 0 255 0\n\
                    0 1 0 0 0 255\n";
        let cloud = read_ply(Cursor::new(text)).unwrap();
        assert_eq!(cloud.len(), 3);
        assert_eq!(cloud.colors[0], [255, 0, 0]);
        assert_eq!(cloud.colors[1], [0, 255, 0]);
        assert_eq!(cloud.colors[2], [0, 0, 255]);
        assert_eq!(cloud.points[1], Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn colorless_rows_default_to_white() {
        let text = "ply\nformat ascii 1.0\nelement vertex 1\n\
                    property float x\nproperty float y\nproperty float z\n\
                    end_header\n\
                    0.5 1.5 -2\n";
        let cloud = read_ply(Cursor::new(text)).unwrap();
        assert_eq!(cloud.colors[0], DEFAULT_COLOR);
    }

    #[test]
    fn binary_format_is_unsupported() {
        let text = "ply\nformat binary_little_endian 1.0\nelement vertex 0\nend_header\n";
        assert!(matches!(
            read_ply(Cursor::new(text)),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn roundtrip_preserves_points_and_colors() {
        let mut cloud = PointCloud::new();
        cloud.push(Point3::new(0.125, -4.5, 2.0), [9, 90, 200]);
        cloud.push(Point3::new(1.0, 2.0, 3.0), [0, 0, 0]);

        let mut buf = Vec::new();
        write_ply(&mut buf, &cloud).unwrap();
        let back = read_ply(Cursor::new(buf)).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.points, cloud.points);
        assert_eq!(back.colors, cloud.colors);
    }
}
