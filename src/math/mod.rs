pub mod intersect_2d;
pub mod polygon_2d;
pub mod spline;

/// 2D point type. Planar work maps world `(x, z)` onto `(x, y)`.
pub type Point2 = nalgebra::Point2<f64>;

/// 3D point type: `x`, `y` = height, `z`.
pub type Point3 = nalgebra::Point3<f64>;

/// 2D vector type.
pub type Vector2 = nalgebra::Vector2<f64>;

/// 3D vector type.
pub type Vector3 = nalgebra::Vector3<f64>;

/// Global geometric tolerance for floating-point comparisons.
pub const TOLERANCE: f64 = 1e-10;

/// Projects a world point onto the ground (XZ) plane.
#[must_use]
pub fn ground(p: &Point3) -> Point2 {
    Point2::new(p.x, p.z)
}

/// Twice the signed area of `(a, b, c)`; positive when counter-clockwise.
#[must_use]
pub fn orient_2d(a: &Point2, b: &Point2, c: &Point2) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Returns the left-pointing normal of a direction vector.
#[must_use]
pub fn left_normal(dir: &Vector2) -> Vector2 {
    Vector2::new(-dir.y, dir.x)
}

/// Signed angle in `(-π, π]` turning `from` onto `to`; positive turns left.
#[must_use]
pub fn signed_angle(from: &Vector2, to: &Vector2) -> f64 {
    let cross = from.x * to.y - from.y * to.x;
    cross.atan2(from.dot(to))
}

/// Rotates a vector counter-clockwise by `angle` radians.
#[must_use]
pub fn rotate(v: &Vector2, angle: f64) -> Vector2 {
    let (s, c) = angle.sin_cos();
    Vector2::new(v.x * c - v.y * s, v.x * s + v.y * c)
}

/// Normalizes a vector, returning `None` when it is shorter than [`TOLERANCE`].
#[must_use]
pub fn unit(v: &Vector2) -> Option<Vector2> {
    let len = v.norm();
    (len > TOLERANCE).then(|| v / len)
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn orientation_sign() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(1.0, 0.0);
        assert!(orient_2d(&a, &b, &Point2::new(0.0, 1.0)) > 0.0);
        assert!(orient_2d(&a, &b, &Point2::new(0.0, -1.0)) < 0.0);
        assert_abs_diff_eq!(orient_2d(&a, &b, &Point2::new(2.0, 0.0)), 0.0);
    }

    #[test]
    fn signed_angle_left_is_positive() {
        let east = Vector2::new(1.0, 0.0);
        let north = Vector2::new(0.0, 1.0);
        assert_abs_diff_eq!(signed_angle(&east, &north), FRAC_PI_2, epsilon = 1e-12);
        assert_abs_diff_eq!(signed_angle(&north, &east), -FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn rotate_quarter_turn_matches_left_normal() {
        let v = Vector2::new(3.0, 4.0);
        let r = rotate(&v, FRAC_PI_2);
        let n = left_normal(&v);
        assert_abs_diff_eq!(r.x, n.x, epsilon = 1e-12);
        assert_abs_diff_eq!(r.y, n.y, epsilon = 1e-12);
    }

    #[test]
    fn unit_rejects_zero() {
        assert!(unit(&Vector2::zeros()).is_none());
        let u = unit(&Vector2::new(0.0, 2.0)).unwrap_or_else(Vector2::zeros);
        assert_abs_diff_eq!(u.y, 1.0);
    }

    #[test]
    fn ground_drops_height() {
        let p = ground(&Point3::new(1.0, 9.0, 2.0));
        assert_abs_diff_eq!(p.x, 1.0);
        assert_abs_diff_eq!(p.y, 2.0);
    }
}
