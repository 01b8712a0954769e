use std::cmp::Ordering;

use crate::error::{Degeneracy, DegeneracyKind, Result};
use crate::math::intersect_2d::distance_to_line_2d;
use crate::math::{Point2, Point3};
use crate::topology::{PointId, Segment, TopologyStore};

/// Finds every proper crossing between centreline segments with a sweep line.
///
/// # Algorithm
///
/// Endpoints are sorted top to bottom by (Z, X). A segment joins the active
/// set at its upper endpoint and leaves it at its lower one; on leaving it is
/// tested against every segment still active, so each pair is examined once.
/// Pairs sharing an endpoint are skipped. Lines are intersected with Cramer's
/// rule; near-zero determinants (parallel lines) are skipped.
///
/// A crossing is accepted when both parameters lie within `[0, 1]`, widened by
/// the tolerance, and at least one of them is clear of its segment's ends. A
/// crossing that lands on an endpoint of the other segment reuses that
/// endpoint, so a road ending on another road becomes a shared node. Each
/// crossing is recorded on both segments, sorted by `t`.
#[derive(Debug)]
pub struct IntersectSegments {
    tolerance: f64,
}

impl Default for IntersectSegments {
    fn default() -> Self {
        Self { tolerance: 1e-6 }
    }
}

#[derive(Debug, Clone, Copy)]
struct Event {
    pos: Point2,
    segment: usize,
    start: bool,
}

impl IntersectSegments {
    /// Creates a sweep with the default parametric tolerance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sweep with a custom parametric tolerance.
    #[must_use]
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Records all crossings on `segments`, adding one point per crossing.
    ///
    /// Returns the skipped units of work (zero-length or overlapping segments).
    ///
    /// # Errors
    ///
    /// Returns an error if a segment references a point missing from the store.
    pub fn execute(
        &self,
        store: &mut TopologyStore,
        segments: &mut [Segment],
    ) -> Result<Vec<Degeneracy>> {
        let mut anomalies = Vec::new();
        let mut events = Vec::with_capacity(segments.len() * 2);
        for (i, seg) in segments.iter().enumerate() {
            let a = store.planar(seg.ends[0])?;
            let b = store.planar(seg.ends[1])?;
            if (b - a).norm() <= self.tolerance {
                anomalies.push(Degeneracy::new(
                    DegeneracyKind::ZeroLength,
                    format!("segment {i} ({}-{})", seg.ends[0], seg.ends[1]),
                ));
                continue;
            }
            let (upper, lower) = if sweep_order(&a, &b) == Ordering::Less {
                (a, b)
            } else {
                (b, a)
            };
            events.push(Event {
                pos: upper,
                segment: i,
                start: true,
            });
            events.push(Event {
                pos: lower,
                segment: i,
                start: false,
            });
        }
        events.sort_by(|x, y| sweep_order(&x.pos, &y.pos).then(y.start.cmp(&x.start)));

        let mut created: Vec<PointId> = Vec::new();
        let mut active: Vec<usize> = Vec::new();
        let mut crossings = 0usize;
        for ev in events {
            if ev.start {
                active.push(ev.segment);
                continue;
            }
            active.retain(|&s| s != ev.segment);
            for &other in &active {
                match self.cross(store, segments, ev.segment, other, &mut created)? {
                    Crossing::Found => crossings += 1,
                    Crossing::Overlap => anomalies.push(Degeneracy::new(
                        DegeneracyKind::Parallel,
                        format!("segments {} and {other} overlap", ev.segment),
                    )),
                    Crossing::None => {}
                }
            }
        }

        tracing::debug!(
            segments = segments.len(),
            crossings,
            "segment intersection sweep done"
        );
        Ok(anomalies)
    }

    fn cross(
        &self,
        store: &mut TopologyStore,
        segments: &mut [Segment],
        i: usize,
        j: usize,
        created: &mut Vec<PointId>,
    ) -> Result<Crossing> {
        let [a0, a1] = segments[i].ends;
        let [b0, b1] = segments[j].ends;
        if a0 == b0 || a0 == b1 || a1 == b0 || a1 == b1 {
            return Ok(Crossing::None);
        }
        let (pa0, pa1) = (store.planar(a0)?, store.planar(a1)?);
        let (pb0, pb1) = (store.planar(b0)?, store.planar(b1)?);
        let da = pa1 - pa0;
        let db = pb1 - pb0;

        let det = da.x * db.y - da.y * db.x;
        if det.abs() <= 1e-12 * da.norm() * db.norm() {
            let len = da.norm();
            let touching = distance_to_line_2d(&pb0, &pa0, &pa1) <= self.tolerance * len
                && ranges_overlap(&pa0, &pa1, &pb0, &pb1);
            return Ok(if touching {
                Crossing::Overlap
            } else {
                Crossing::None
            });
        }
        let w = pb0 - pa0;
        let t = (w.x * db.y - w.y * db.x) / det;
        let u = (w.x * da.y - w.y * da.x) / det;

        let tol = self.tolerance;
        if t < -tol || t > 1.0 + tol || u < -tol || u > 1.0 + tol {
            return Ok(Crossing::None);
        }
        let t_at_end = t < tol || t > 1.0 - tol;
        let u_at_end = u < tol || u > 1.0 - tol;
        if t_at_end && u_at_end {
            return Ok(Crossing::None);
        }

        // A crossing at one segment's end reuses that end.
        let point = if t_at_end {
            if t < 0.5 { a0 } else { a1 }
        } else if u_at_end {
            if u < 0.5 { b0 } else { b1 }
        } else {
            let pos = pa0 + da * t;
            let near = created.iter().copied().find(|&p| {
                store
                    .planar(p)
                    .is_ok_and(|q| (q - pos).norm() <= tol * da.norm().min(db.norm()))
            });
            if let Some(p) = near {
                p
            } else {
                let ya = lerp_height(store, a0, a1, t)?;
                let p = store.add_point(Point3::new(pos.x, ya, pos.y));
                created.push(p);
                p
            }
        };

        if !t_at_end {
            segments[i].record(t, point);
        }
        if !u_at_end {
            segments[j].record(u, point);
        }
        tracing::trace!(i, j, t, u, %point, "segments cross");
        Ok(Crossing::Found)
    }
}

enum Crossing {
    Found,
    Overlap,
    None,
}

/// Sweep order: higher Z first, then higher X.
fn sweep_order(a: &Point2, b: &Point2) -> Ordering {
    b.y.total_cmp(&a.y).then(b.x.total_cmp(&a.x))
}

fn ranges_overlap(a0: &Point2, a1: &Point2, b0: &Point2, b1: &Point2) -> bool {
    let d = a1 - a0;
    let len_sq = d.norm_squared();
    let s0 = (b0 - a0).dot(&d) / len_sq;
    let s1 = (b1 - a0).dot(&d) / len_sq;
    s0.max(s1) > 0.0 && s0.min(s1) < 1.0
}

fn lerp_height(store: &TopologyStore, a: PointId, b: PointId, t: f64) -> Result<f64> {
    let ya = store.point(a)?.y;
    let yb = store.point(b)?.y;
    Ok(ya + (yb - ya) * t)
}

/// Splits every segment at its recorded crossings into two-point pieces.
#[must_use]
pub fn split_segments(segments: &[Segment]) -> Vec<Segment> {
    segments.iter().flat_map(Segment::split).collect()
}
