use nalgebra::Point3;

/// Prefix length retained by the permissive fallback filter when the strict
/// distance filter would reject every point.
pub const FALLBACK_PREFIX_CAP: usize = 100_000;

/// Unordered 3D positions with per-point RGB colors, the reconstruction's
/// terminal artifact. Positions and colors are parallel and always equal in
/// length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<Point3<f32>>,
    pub colors: Vec<[u8; 3]>,
}

/// Summary statistics for a cloud: bounding box, centroid, and distances from
/// the centroid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloudStatistics {
    pub count: usize,
    pub min: Point3<f32>,
    pub max: Point3<f32>,
    pub centroid: Point3<f32>,
    pub mean_distance: f32,
    pub max_distance: f32,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            colors: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, point: Point3<f32>, color: [u8; 3]) {
        self.points.push(point);
        self.colors.push(color);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Filter the cloud in place against a maximum coordinate magnitude.
    ///
    /// The strict pass keeps points whose coordinates are all finite and all
    /// within `max_distance` of the origin per axis. If that would eliminate
    /// every point (typical when the reconstruction's unscaled units are far
    /// below the threshold's assumption), the cloud instead falls back to a
    /// finite-coordinates-only filter over at most [`FALLBACK_PREFIX_CAP`]
    /// points rather than coming back empty. Idempotent for a fixed
    /// threshold. Returns the retained count.
    pub fn filter_by_distance(&mut self, max_distance: f32) -> usize {
        let strict = |p: &Point3<f32>| {
            p.x.is_finite()
                && p.y.is_finite()
                && p.z.is_finite()
                && p.x.abs() <= max_distance
                && p.y.abs() <= max_distance
                && p.z.abs() <= max_distance
        };

        if self.points.iter().any(strict) {
            self.retain(strict);
        } else {
            log::warn!(
                "strict filter at {max_distance} would drop all {} points; \
                 keeping finite points from the first {FALLBACK_PREFIX_CAP}",
                self.points.len()
            );
            self.truncate(FALLBACK_PREFIX_CAP);
            self.retain(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite());
        }
        self.len()
    }

    fn retain(&mut self, predicate: impl Fn(&Point3<f32>) -> bool) {
        let mut keep = self.points.iter().map(&predicate);
        self.colors.retain(|_| keep.next().unwrap_or(false));
        self.points.retain(predicate);
    }

    fn truncate(&mut self, len: usize) {
        self.points.truncate(len);
        self.colors.truncate(len);
    }

    pub fn bounding_box(&self) -> Option<(Point3<f32>, Point3<f32>)> {
        let first = *self.points.first()?;
        let mut min = first;
        let mut max = first;
        for p in &self.points {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        Some((min, max))
    }

    pub fn statistics(&self) -> Option<CloudStatistics> {
        let (min, max) = self.bounding_box()?;
        let n = self.points.len() as f32;
        let mut sum: Point3<f32> = Point3::origin();
        for p in &self.points {
            sum.x += p.x;
            sum.y += p.y;
            sum.z += p.z;
        }
        let centroid = Point3::new(sum.x / n, sum.y / n, sum.z / n);

        let mut total = 0.0f32;
        let mut farthest = 0.0f32;
        for p in &self.points {
            let d = (p - centroid).norm();
            total += d;
            farthest = farthest.max(d);
        }
        Some(CloudStatistics {
            count: self.points.len(),
            min,
            max,
            centroid,
            mean_distance: total / n,
            max_distance: farthest,
        })
    }

    /// Presentation-only transform: uniformly rescale a copy of the cloud so
    /// its largest bounding-box extent equals `target_extent`. Never invoked
    /// implicitly by reconstruction.
    pub fn rescaled_to_extent(&self, target_extent: f32) -> PointCloud {
        let Some((min, max)) = self.bounding_box() else {
            return self.clone();
        };
        let extent = (max.x - min.x).max(max.y - min.y).max(max.z - min.z);
        if extent <= 0.0 || !extent.is_finite() {
            return self.clone();
        }
        let scale = target_extent / extent;
        PointCloud {
            points: self
                .points
                .iter()
                .map(|p| Point3::new(p.x * scale, p.y * scale, p.z * scale))
                .collect(),
            colors: self.colors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud_from(points: &[[f32; 3]]) -> PointCloud {
        let mut cloud = PointCloud::new();
        for (i, p) in points.iter().enumerate() {
            cloud.push(Point3::new(p[0], p[1], p[2]), [i as u8, 0, 0]);
        }
        cloud
    }

    #[test]
    fn strict_filter_drops_far_and_nonfinite_points() {
        let mut cloud = cloud_from(&[
            [1.0, 2.0, 3.0],
            [50.0, 0.0, 0.0],
            [f32::NAN, 0.0, 0.0],
            [0.0, 0.0, f32::INFINITY],
            [-2.0, 1.0, 9.0],
        ]);
        let kept = cloud.filter_by_distance(10.0);
        assert_eq!(kept, 2);
        assert_eq!(cloud.colors, vec![[0, 0, 0], [4, 0, 0]]);
    }

    #[test]
    fn filter_is_idempotent() {
        let mut cloud = cloud_from(&[[1.0, 2.0, 3.0], [11.0, 0.0, 0.0], [3.0, -2.0, 5.0]]);
        cloud.filter_by_distance(10.0);
        let once = cloud.clone();
        cloud.filter_by_distance(10.0);
        assert_eq!(cloud, once);
    }

    #[test]
    fn fallback_keeps_finite_points_when_strict_would_empty() {
        // Every point exceeds the threshold, so the strict pass would reject
        // them all; the fallback keeps the finite ones.
        let mut cloud = cloud_from(&[
            [100.0, 0.0, 0.0],
            [0.0, f32::NAN, 0.0],
            [0.0, 200.0, 300.0],
        ]);
        let kept = cloud.filter_by_distance(10.0);
        assert_eq!(kept, 2);
        assert_eq!(cloud.colors.len(), 2);
    }

    #[test]
    fn statistics_report_bounds_and_centroid() {
        let cloud = cloud_from(&[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [1.0, 3.0, 0.0]]);
        let stats = cloud.statistics().unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(stats.max, Point3::new(2.0, 3.0, 0.0));
        assert!((stats.centroid.x - 1.0).abs() < 1e-6);
        assert!((stats.centroid.y - 1.0).abs() < 1e-6);
        assert!(stats.max_distance >= stats.mean_distance);
    }

    #[test]
    fn rescale_is_explicit_and_preserves_colors() {
        let cloud = cloud_from(&[[0.0, 0.0, 0.0], [0.0, 0.0, 0.004]]);
        let scaled = cloud.rescaled_to_extent(2.0);
        assert_eq!(scaled.colors, cloud.colors);
        let (_, max) = scaled.bounding_box().unwrap();
        assert!((max.z - 2.0).abs() < 1e-4);
        // Original untouched.
        assert!((cloud.points[1].z - 0.004).abs() < 1e-9);
    }

    #[test]
    fn empty_cloud_has_no_statistics() {
        assert!(PointCloud::new().statistics().is_none());
        assert!(PointCloud::new().bounding_box().is_none());
    }
}
