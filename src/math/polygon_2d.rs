use super::{orient_2d, Point2, TOLERANCE};

/// Computes the signed area of a polygon (shoelace formula).
///
/// Positive for counter-clockwise, negative for clockwise.
#[must_use]
pub fn signed_area_2d(points: &[Point2]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        sum += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    sum * 0.5
}

/// Unsigned area of a triangle.
#[must_use]
pub fn triangle_area_2d(a: &Point2, b: &Point2, c: &Point2) -> f64 {
    orient_2d(a, b, c).abs() * 0.5
}

/// Centroid of a triangle.
#[must_use]
pub fn triangle_centroid_2d(a: &Point2, b: &Point2, c: &Point2) -> Point2 {
    Point2::new((a.x + b.x + c.x) / 3.0, (a.y + b.y + c.y) / 3.0)
}

/// Returns `true` if `p` lies inside or on the boundary of the counter-clockwise
/// triangle `(a, b, c)`. `eps` is a distance tolerance.
#[must_use]
pub fn point_in_triangle_2d(p: &Point2, a: &Point2, b: &Point2, c: &Point2, eps: f64) -> bool {
    edge_side(a, b, p) >= -eps && edge_side(b, c, p) >= -eps && edge_side(c, a, p) >= -eps
}

/// Returns `true` if `p` lies strictly inside the counter-clockwise triangle
/// `(a, b, c)`, at least `eps` away from every edge.
#[must_use]
pub fn point_strictly_in_triangle_2d(
    p: &Point2,
    a: &Point2,
    b: &Point2,
    c: &Point2,
    eps: f64,
) -> bool {
    edge_side(a, b, p) > eps && edge_side(b, c, p) > eps && edge_side(c, a, p) > eps
}

/// Signed distance of `p` from the directed line `a → b`; positive on the left.
#[must_use]
pub fn edge_side(a: &Point2, b: &Point2, p: &Point2) -> f64 {
    let len = (b - a).norm();
    if len < TOLERANCE {
        return (p - a).norm();
    }
    orient_2d(a, b, p) / len
}

/// Even-odd point-in-polygon test.
#[must_use]
pub fn point_in_polygon_2d(p: &Point2, polygon: &[Point2]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (&polygon[i], &polygon[j]);
        if (pi.y > p.y) != (pj.y > p.y) {
            let x = pj.x + (p.y - pj.y) * (pi.x - pj.x) / (pi.y - pj.y);
            if p.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
