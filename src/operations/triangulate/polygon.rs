use crate::error::{DegeneracyKind, Result, TriangulationError};
use crate::math::intersect_2d::segment_segment_intersect_2d;
use crate::math::polygon_2d::{edge_side, point_in_triangle_2d, signed_area_2d};
use crate::math::{Point2, TOLERANCE};
use crate::topology::{PointId, TopologyStore};

/// Relative tolerance for coincidence and ear containment tests.
const REL_EPS: f64 = 1e-9;

/// Triangulates a simple polygon loop by ear clipping.
///
/// The loop may be given in either orientation; it is normalised to
/// counter-clockwise (in XZ) before clipping, and the output triangles are
/// counter-clockwise. A repeated closing point is ignored.
///
/// Invalid loops produce no triangles: the caller gets a
/// `TriangulationError::Degenerate` carrying the reason, and is expected to
/// skip the polygon.
#[derive(Debug)]
pub struct TriangulatePolygon {
    ring: Vec<PointId>,
}

impl TriangulatePolygon {
    /// Creates a new polygon triangulation.
    #[must_use]
    pub fn new(ring: Vec<PointId>) -> Self {
        Self { ring }
    }

    /// Computes the filling triangles.
    ///
    /// # Errors
    ///
    /// - `TriangulationError::Degenerate(TooFewPoints)` for fewer than three points
    /// - `TriangulationError::Degenerate(DuplicatePoint)` for coincident vertices
    /// - `TriangulationError::Degenerate(SelfIntersecting)` when non-adjacent edges cross
    /// - `TriangulationError::Degenerate(Collinear)` for a zero-area loop
    /// - `TriangulationError::Degenerate(NoEar)` if clipping gets stuck
    pub fn compute(&self, store: &TopologyStore) -> Result<Vec<[PointId; 3]>> {
        let mut ring = self.ring.clone();
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 3 {
            return Err(degenerate(DegeneracyKind::TooFewPoints));
        }

        let mut pts = Vec::with_capacity(ring.len());
        for &id in &ring {
            pts.push(store.planar(id)?);
        }
        let eps = REL_EPS * scale(&pts);

        if has_coincident(&pts, eps) {
            return Err(degenerate(DegeneracyKind::DuplicatePoint));
        }
        if has_crossing(&pts) {
            return Err(degenerate(DegeneracyKind::SelfIntersecting));
        }
        let area = signed_area_2d(&pts);
        if area.abs() <= eps * eps {
            return Err(degenerate(DegeneracyKind::Collinear));
        }
        if area < 0.0 {
            ring.reverse();
            pts.reverse();
        }

        clip_ears(&ring, &pts, eps)
    }
}

fn degenerate(kind: DegeneracyKind) -> crate::error::TerrameshError {
    TriangulationError::Degenerate(kind).into()
}

fn scale(pts: &[Point2]) -> f64 {
    let mut min = pts[0];
    let mut max = pts[0];
    for p in pts {
        min = min.inf(p);
        max = max.sup(p);
    }
    (max - min).amax().max(TOLERANCE)
}

fn has_coincident(pts: &[Point2], eps: f64) -> bool {
    pts.iter()
        .enumerate()
        .any(|(i, a)| pts[i + 1..].iter().any(|b| (b - a).norm() <= eps))
}

/// Closed crossing test over every pair of non-adjacent edges.
fn has_crossing(pts: &[Point2]) -> bool {
    let n = pts.len();
    for i in 0..n {
        let (a0, a1) = (&pts[i], &pts[(i + 1) % n]);
        for j in (i + 2)..n {
            if (j + 1) % n == i {
                continue;
            }
            let (b0, b1) = (&pts[j], &pts[(j + 1) % n]);
            if segment_segment_intersect_2d(a0, a1, b0, b1).is_some() {
                return true;
            }
        }
    }
    false
}

fn clip_ears(ring: &[PointId], pts: &[Point2], eps: f64) -> Result<Vec<[PointId; 3]>> {
    let mut live: Vec<usize> = (0..ring.len()).collect();
    let mut out = Vec::with_capacity(ring.len() - 2);

    while live.len() > 3 {
        let ear = find_ear(&live, pts, eps, false).or_else(|| find_ear(&live, pts, eps, true));
        let Some(k) = ear else {
            return Err(degenerate(DegeneracyKind::NoEar));
        };
        let n = live.len();
        let (p, c, q) = (live[(k + n - 1) % n], live[k], live[(k + 1) % n]);
        out.push([ring[p], ring[c], ring[q]]);
        live.remove(k);
    }
    let (a, b, c) = (live[0], live[1], live[2]);
    if edge_side(&pts[a], &pts[b], &pts[c]) > eps {
        out.push([ring[a], ring[b], ring[c]]);
    }
    Ok(out)
}

/// Finds a strictly convex vertex whose triangle contains no other live vertex.
///
/// In relaxed mode vertices lying exactly on the ear boundary are tolerated,
/// which unsticks loops with collinear runs.
fn find_ear(live: &[usize], pts: &[Point2], eps: f64, relaxed: bool) -> Option<usize> {
    let n = live.len();
    (0..n).find(|&k| {
        let (p, c, q) = (live[(k + n - 1) % n], live[k], live[(k + 1) % n]);
        let (a, b, d) = (&pts[p], &pts[c], &pts[q]);
        if edge_side(a, b, d) <= eps {
            return false;
        }
        live.iter()
            .filter(|&&v| v != p && v != c && v != q)
            .all(|&v| {
                let x = &pts[v];
                if relaxed {
                    !point_in_triangle_2d(x, a, b, d, -eps)
                } else {
                    !point_in_triangle_2d(x, a, b, d, eps)
                }
            })
    })
}
