//! XYZ: one `x y z` row per point.

use crate::{Error, Result, DEFAULT_COLOR};
use nalgebra::Point3;
use rigscan_core::PointCloud;
use std::io::{BufRead, Write};

pub fn read_xyz<R: BufRead>(reader: R) -> Result<PointCloud> {
    let mut cloud = PointCloud::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let mut next = || -> Result<f32> {
            parts
                .next()
                .ok_or_else(|| Error::Parse(format!("short XYZ row '{line}'")))?
                .parse()
                .map_err(|_| Error::Parse(format!("bad XYZ value in '{line}'")))
        };
        let (x, y, z) = (next()?, next()?, next()?);
        cloud.push(Point3::new(x, y, z), DEFAULT_COLOR);
    }
    Ok(cloud)
}

pub fn write_xyz<W: Write>(writer: &mut W, cloud: &PointCloud) -> Result<()> {
    for point in &cloud.points {
        writeln!(writer, "{} {} {}", point.x, point.y, point.z)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip_preserves_count_and_coordinates() {
        let mut cloud = PointCloud::new();
        cloud.push(Point3::new(0.001953125, -7.25, 1e6), [1, 2, 3]);
        cloud.push(Point3::new(-0.5, 0.5, 0.0), [4, 5, 6]);

        let mut buf = Vec::new();
        write_xyz(&mut buf, &cloud).unwrap();
        let back = read_xyz(Cursor::new(buf)).unwrap();

        assert_eq!(back.len(), cloud.len());
        assert_eq!(back.points, cloud.points);
        assert!(back.colors.iter().all(|c| *c == DEFAULT_COLOR));
    }

    #[test]
    fn rejects_malformed_rows() {
        assert!(read_xyz(Cursor::new("1.0 2.0\n")).is_err());
        assert!(read_xyz(Cursor::new("a b c\n")).is_err());
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let cloud = read_xyz(Cursor::new("# header\n\n1 2 3\n")).unwrap();
        assert_eq!(cloud.len(), 1);
    }
}
