use super::{Point3, TOLERANCE};

/// Four-point Catmull-Rom segment with chord-length knot spacing.
///
/// Interpolates between `points[1]` and `points[2]`; the outer points only shape
/// the tangents. Evaluated with the Barry-Goldman pyramid so uneven chords do not
/// overshoot.
#[derive(Debug, Clone)]
pub struct ChordSpline {
    points: [Point3; 4],
    knots: [f64; 4],
}

impl ChordSpline {
    /// Builds the segment from previous, start, end and next control points.
    #[must_use]
    pub fn new(prev: Point3, start: Point3, end: Point3, next: Point3) -> Self {
        let points = [prev, start, end, next];
        let mut knots = [0.0; 4];
        for i in 1..4 {
            // Coincident control points would make a knot interval vanish.
            let chord = (points[i] - points[i - 1]).norm().max(TOLERANCE);
            knots[i] = knots[i - 1] + chord;
        }
        Self { points, knots }
    }

    /// Evaluates the segment at `s ∈ [0, 1]` (0 = start, 1 = end).
    #[must_use]
    pub fn evaluate(&self, s: f64) -> Point3 {
        let [p0, p1, p2, p3] = &self.points;
        let [t0, t1, t2, t3] = self.knots;
        let t = t1 + s.clamp(0.0, 1.0) * (t2 - t1);

        let a1 = lerp(p0, p1, (t - t0) / (t1 - t0));
        let a2 = lerp(p1, p2, (t - t1) / (t2 - t1));
        let a3 = lerp(p2, p3, (t - t2) / (t3 - t2));
        let b1 = lerp(&a1, &a2, (t - t0) / (t2 - t0));
        let b2 = lerp(&a2, &a3, (t - t1) / (t3 - t1));
        lerp(&b1, &b2, (t - t1) / (t2 - t1))
    }
}

fn lerp(a: &Point3, b: &Point3, w: f64) -> Point3 {
    Point3::from(a.coords * (1.0 - w) + b.coords * w)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn interpolates_endpoints() {
        let s = ChordSpline::new(
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(3.0, 2.0, 1.0),
            Point3::new(5.0, 0.0, 4.0),
        );
        let a = s.evaluate(0.0);
        let b = s.evaluate(1.0);
        assert_abs_diff_eq!(a.y, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b.x, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn collinear_evenly_spaced_points_stay_linear() {
        let s = ChordSpline::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.5, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            Point3::new(3.0, 1.5, 0.0),
        );
        let mid = s.evaluate(0.5);
        assert_abs_diff_eq!(mid.x, 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(mid.y, 0.75, epsilon = 1e-12);
    }

    #[test]
    fn coincident_controls_do_not_produce_nan() {
        let p = Point3::new(1.0, 2.0, 3.0);
        let s = ChordSpline::new(p, p, Point3::new(2.0, 2.0, 3.0), Point3::new(2.0, 2.0, 3.0));
        let q = s.evaluate(0.3);
        assert!(q.x.is_finite() && q.y.is_finite() && q.z.is_finite());
    }
}
