use super::PointId;

/// A crossing recorded on a line: parametric position `t` and the point created for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    pub t: f64,
    pub point: PointId,
}

/// Inserts `hit` into a list kept sorted by `t`.
pub fn insert_sorted(list: &mut Vec<Intersection>, hit: Intersection) {
    let at = list.partition_point(|h| h.t < hit.t);
    list.insert(at, hit);
}

/// A user-drawn centreline segment.
///
/// Intersections discovered by the sweep are recorded in place, sorted by `t`.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub ends: [PointId; 2],
    pub intersections: Vec<Intersection>,
}

impl Segment {
    /// Creates a segment with no recorded intersections.
    #[must_use]
    pub fn new(start: PointId, end: PointId) -> Self {
        Self {
            ends: [start, end],
            intersections: Vec::new(),
        }
    }

    /// Records a crossing, keeping the list sorted.
    pub fn record(&mut self, t: f64, point: PointId) {
        insert_sorted(&mut self.intersections, Intersection { t, point });
    }

    /// Splits the segment at every recorded intersection into two-point pieces.
    #[must_use]
    pub fn split(&self) -> Vec<Segment> {
        let mut chain = Vec::with_capacity(self.intersections.len() + 2);
        chain.push(self.ends[0]);
        chain.extend(self.intersections.iter().map(|h| h.point));
        chain.push(self.ends[1]);
        chain.dedup();
        chain
            .windows(2)
            .map(|w| Segment::new(w[0], w[1]))
            .collect()
    }
}
