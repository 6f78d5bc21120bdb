use nalgebra::{Matrix3, Matrix4, Point2, Point3, Vector3};

/// Pinhole camera intrinsics with the pixel dimensions they were estimated at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, width: u32, height: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
        }
    }

    /// Nominal intrinsics for an uncalibrated camera: focal length equal to
    /// the image width, principal point at the image center.
    pub fn ideal(width: u32, height: u32) -> Self {
        Self {
            fx: width as f64,
            fy: width as f64,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
            width,
            height,
        }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    pub fn inverse_matrix(&self) -> Matrix3<f64> {
        self.matrix().try_inverse().unwrap_or_else(Matrix3::identity)
    }

    pub fn project(&self, point: &Point3<f64>) -> Point2<f64> {
        let x = point.x / point.z;
        let y = point.y / point.z;
        Point2::new(x * self.fx + self.cx, y * self.fy + self.cy)
    }

    pub fn unproject(&self, pixel: Point2<f64>, depth: f64) -> Point3<f64> {
        let x = (pixel.x - self.cx) / self.fx;
        let y = (pixel.y - self.cy) / self.fy;
        Point3::new(x * depth, y * depth, depth)
    }
}

/// Brown-Conrady lens distortion: radial k1..k3, tangential p1/p2.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub fn new(k1: f64, k2: f64, p1: f64, p2: f64, k3: f64) -> Self {
        Self { k1, k2, p1, p2, k3 }
    }

    pub fn none() -> Self {
        Self {
            k1: 0.0,
            k2: 0.0,
            p1: 0.0,
            p2: 0.0,
            k3: 0.0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.k1 == 0.0 && self.k2 == 0.0 && self.p1 == 0.0 && self.p2 == 0.0 && self.k3 == 0.0
    }

    /// Distort a point in normalized camera coordinates.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2 + self.k3 * r2 * r2 * r2;
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        (x * radial + dx, y * radial + dy)
    }

    /// Invert the distortion model by fixed-point iteration.
    pub fn remove(&self, x: f64, y: f64) -> (f64, f64) {
        let mut xu = x;
        let mut yu = y;
        for _ in 0..10 {
            let (xd, yd) = self.apply(xu, yu);
            xu += x - xd;
            yu += y - yd;
        }
        (xu, yu)
    }

    /// Coefficient vector in the conventional (k1, k2, p1, p2, k3) order.
    pub fn coefficients(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    /// Build from a coefficient slice of up to eight values; entries past the
    /// first five (rational-model terms) are ignored.
    pub fn from_coefficients(coeffs: &[f64]) -> Self {
        let get = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        Self {
            k1: get(0),
            k2: get(1),
            p1: get(2),
            p2: get(3),
            k3: get(4),
        }
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self::none()
    }
}

/// Rigid transform mapping world coordinates into a camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn rotation_matrix(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    pub fn matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * point.coords + self.translation)
    }

    pub fn inverse(&self) -> Self {
        let r_inv = self.rotation.transpose();
        Self {
            rotation: r_inv,
            translation: -r_inv * self.translation,
        }
    }

    /// Relative pose mapping this camera's frame into `other`'s frame.
    pub fn relative_to(&self, other: &Pose) -> Pose {
        let r = other.rotation * self.rotation.transpose();
        let t = other.translation - r * self.translation;
        Pose::new(r, t)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }
}

pub fn skew_symmetric(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v[2], v[1], v[2], 0.0, -v[0], -v[1], v[0], 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intrinsics_project_unproject_roundtrip() {
        let k = CameraIntrinsics::new(520.0, 515.0, 320.0, 240.0, 640, 480);
        let p = Point3::new(0.3, -0.2, 2.5);
        let pix = k.project(&p);
        let back = k.unproject(pix, p.z);
        assert!((back.coords - p.coords).norm() < 1e-12);
    }

    #[test]
    fn distortion_remove_inverts_apply() {
        let d = Distortion::new(0.12, -0.05, 0.001, -0.0007, 0.01);
        let (xd, yd) = d.apply(0.21, -0.14);
        let (xu, yu) = d.remove(xd, yd);
        assert!((xu - 0.21).abs() < 1e-8);
        assert!((yu + 0.14).abs() < 1e-8);
    }

    #[test]
    fn pose_inverse_composes_to_identity() {
        let r = nalgebra::Rotation3::from_euler_angles(0.1, -0.2, 0.05).into_inner();
        let pose = Pose::new(r, Vector3::new(0.3, -0.1, 0.7));
        let inv = pose.inverse();
        let p = Point3::new(0.5, 0.25, 1.5);
        let back = inv.transform_point(&pose.transform_point(&p));
        assert!((back.coords - p.coords).norm() < 1e-12);
    }

    #[test]
    fn relative_pose_maps_between_frames() {
        let left = Pose::new(
            nalgebra::Rotation3::from_euler_angles(0.05, 0.02, -0.04).into_inner(),
            Vector3::new(0.1, 0.0, 0.4),
        );
        let right = Pose::new(
            nalgebra::Rotation3::from_euler_angles(-0.03, 0.06, 0.01).into_inner(),
            Vector3::new(-0.1, 0.05, 0.5),
        );
        let rel = left.relative_to(&right);
        let p = Point3::new(0.2, -0.3, 2.0);
        let via_world = right.transform_point(&left.inverse().transform_point(&p));
        let via_rel = rel.transform_point(&p);
        assert!((via_world.coords - via_rel.coords).norm() < 1e-10);
    }
}
