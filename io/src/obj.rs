//! OBJ, vertex statements only: `v x y z` rows.

use crate::{Error, Result, DEFAULT_COLOR};
use nalgebra::Point3;
use rigscan_core::PointCloud;
use std::io::{BufRead, Write};

pub fn read_obj<R: BufRead>(reader: R) -> Result<PointCloud> {
    let mut cloud = PointCloud::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.starts_with("v ") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            return Err(Error::Parse(format!("short OBJ vertex '{line}'")));
        }
        let parse = |s: &str| -> Result<f32> {
            s.parse()
                .map_err(|_| Error::Parse(format!("bad OBJ value '{s}'")))
        };
        cloud.push(
            Point3::new(parse(parts[1])?, parse(parts[2])?, parse(parts[3])?),
            DEFAULT_COLOR,
        );
    }
    Ok(cloud)
}

pub fn write_obj<W: Write>(writer: &mut W, cloud: &PointCloud) -> Result<()> {
    for point in &cloud.points {
        writeln!(writer, "v {} {} {}", point.x, point.y, point.z)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_only_vertex_statements() {
        let text = "# comment\nv 1 2 3\nvn 0 0 1\nf 1 2 3\nv -1 -2 -3\n";
        let cloud = read_obj(Cursor::new(text)).unwrap();
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.points[1], Point3::new(-1.0, -2.0, -3.0));
    }

    #[test]
    fn roundtrip_preserves_vertices() {
        let mut cloud = PointCloud::new();
        cloud.push(Point3::new(3.5, 0.25, -8.0), [7, 8, 9]);

        let mut buf = Vec::new();
        write_obj(&mut buf, &cloud).unwrap();
        let back = read_obj(Cursor::new(buf)).unwrap();
        assert_eq!(back.points, cloud.points);
    }
}
