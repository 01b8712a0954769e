use std::collections::{BTreeMap, HashSet};

use super::offsets::resolve;
use super::{
    departure, direction, Endpoint, Link, RoadNetwork, RoadParams, Rotation, RoundingState,
    Skeleton,
};
use crate::error::{Degeneracy, DegeneracyKind, Result};
use crate::math::intersect_2d::distance_to_segment_2d;
use crate::math::{left_normal, signed_angle, Point2, Vector2};
use crate::terrain::HeightSampler;
use crate::topology::{PointId, Segment, TopologyStore};

/// Converts split centreline segments into the initial road graph.
///
/// # Algorithm
///
/// 1. Group segment ends by shared point.
/// 2. At each node rank every pair of arms by absolute turn angle. A two-arm
///    node links its pair when the turn is within `max_link_angle`; a node with
///    three or more arms links only its most parallel pair.
/// 3. Arms left unlinked at a shared node become capped dead ends, retracted
///    along their centreline until their shoulder cap clears every other arm's
///    corridor.
/// 4. Resolve borders and shoulders. Linked ends that turn are marked for
///    rounding.
#[derive(Debug)]
pub struct BuildRoadNetwork {
    segments: Vec<Segment>,
    params: RoadParams,
}

struct Arm {
    link: Link,
    dir: Vector2,
    len: f64,
}

impl BuildRoadNetwork {
    /// Creates a new builder over already split two-point segments.
    #[must_use]
    pub fn new(segments: Vec<Segment>, params: RoadParams) -> Self {
        Self { segments, params }
    }

    /// Builds the graph, appending offset points to the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid or a segment references a
    /// point missing from the store.
    pub fn execute<S>(&self, store: &mut TopologyStore, sampler: &S) -> Result<RoadNetwork>
    where
        S: HeightSampler + ?Sized,
    {
        self.params.validate()?;
        let mut anomalies = Vec::new();

        let mut skeleton: Vec<Skeleton> = Vec::with_capacity(self.segments.len());
        let mut seen = HashSet::new();
        for (k, seg) in self.segments.iter().enumerate() {
            let [a, b] = seg.ends;
            let len = (store.planar(b)? - store.planar(a)?).norm();
            if a == b || len <= self.params.half_width * 1e-6 {
                anomalies.push(Degeneracy::new(
                    DegeneracyKind::ZeroLength,
                    format!("centreline {k} ({a}-{b})"),
                ));
                continue;
            }
            if !seen.insert((a.min(b), a.max(b))) {
                anomalies.push(Degeneracy::new(
                    DegeneracyKind::Parallel,
                    format!("centreline {k} ({a}-{b}) repeats an earlier one"),
                ));
                continue;
            }
            skeleton.push(Skeleton::new(a, b));
        }

        let mut nodes: BTreeMap<PointId, Vec<Arm>> = BTreeMap::new();
        for (i, s) in skeleton.iter().enumerate() {
            let dir = direction(store, s.ends)?;
            let len = (store.planar(s.ends[1])? - store.planar(s.ends[0])?).norm();
            for end in Endpoint::ALL {
                nodes.entry(s.ends[end.index()]).or_default().push(Arm {
                    link: Link { segment: i, end },
                    dir: departure(&dir, end),
                    len,
                });
            }
        }

        let mut retractions = Vec::new();
        for (&node, arms) in &nodes {
            if arms.len() < 2 {
                continue;
            }
            let linked = self.link_node(node, arms, &mut skeleton, &mut anomalies);
            let center = store.planar(node)?;
            for (k, arm) in arms.iter().enumerate() {
                if linked.contains(&k) {
                    continue;
                }
                let others: Vec<&Arm> = arms
                    .iter()
                    .enumerate()
                    .filter(|&(m, _)| m != k)
                    .map(|(_, a)| a)
                    .collect();
                let r = match self.retraction(&center, arm, &others) {
                    Some(r) => r,
                    None => {
                        anomalies.push(Degeneracy::new(
                            DegeneracyKind::NoNeighbour,
                            format!(
                                "capped arm {:?} of segment {} at node {node} still overlaps \
                                 another corridor",
                                arm.link.end, arm.link.segment
                            ),
                        ));
                        0.45 * arm.len
                    }
                };
                if r > 0.0 {
                    retractions.push((arm.link, center + arm.dir * r, r));
                }
            }
        }
        for (link, pos, r) in retractions {
            let id = store.add_point(sampler.sample(pos.x, pos.y));
            tracing::debug!(segment = link.segment, end = ?link.end, r, "retracted capped arm");
            skeleton[link.segment].ends[link.end.index()] = id;
        }

        let mut net = resolve(store, sampler, &self.params, &skeleton)?;
        for seg in &mut net.segments {
            for end in Endpoint::ALL {
                let turns = seg.rotation[end.index()] != Rotation::Straight;
                if turns && seg.neighbour(end).is_some() {
                    seg.rounding[end.index()] = RoundingState::NeedsRounding;
                }
            }
        }
        anomalies.append(&mut net.anomalies);
        net.anomalies = anomalies;

        tracing::debug!(segments = net.segments.len(), nodes = nodes.len(), "built road network");
        Ok(net)
    }

    /// Links the best pair(s) at a node and returns the indices of linked arms.
    fn link_node(
        &self,
        node: PointId,
        arms: &[Arm],
        skeleton: &mut [Skeleton],
        anomalies: &mut Vec<Degeneracy>,
    ) -> Vec<usize> {
        let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
        for x in 0..arms.len() {
            for y in (x + 1)..arms.len() {
                let (ax, ay) = (&arms[x], &arms[y]);
                if ax.link.segment == ay.link.segment {
                    continue;
                }
                // Arrive along x (against its departure), leave along y.
                let theta = signed_angle(&-ax.dir, &ay.dir).abs();
                if theta <= self.params.max_link_angle {
                    pairs.push((theta, x, y));
                }
            }
        }
        pairs.sort_by(|p, q| p.0.total_cmp(&q.0).then(p.1.cmp(&q.1)).then(p.2.cmp(&q.2)));

        let Some(&(theta, x, y)) = pairs.first() else {
            anomalies.push(Degeneracy::new(
                DegeneracyKind::NoNeighbour,
                format!("no arm pair at node {node} is within the link angle"),
            ));
            return Vec::new();
        };
        let (lx, ly) = (arms[x].link, arms[y].link);
        skeleton[lx.segment].links[lx.end.index()] = Some(ly);
        skeleton[ly.segment].links[ly.end.index()] = Some(lx);
        tracing::debug!(%node, arms = arms.len(), turn = theta.to_degrees(), "linked arms");
        vec![x, y]
    }

    /// Distance to pull a capped arm back from its node so its shoulder cap
    /// stays clear of every other arm's corridor.
    ///
    /// Returns `None` when the arm is too short to clear within `0.45 * len`.
    fn retraction(&self, center: &Point2, arm: &Arm, others: &[&Arm]) -> Option<f64> {
        let ow = self.params.outer_width();
        let sw = self.params.shoulder_width;
        let step = 0.25 * self.params.half_width;
        let max_r = 0.45 * arm.len;
        let normal = left_normal(&arm.dir);

        let clear = |r: f64| {
            let q = center + arm.dir * (r - sw);
            let probes = [q + normal * ow, q, q - normal * ow];
            probes.iter().all(|p| {
                others.iter().all(|o| {
                    let far = center + o.dir * o.len;
                    distance_to_segment_2d(p, center, &far) >= ow - 1e-9
                })
            })
        };

        let mut r = 0.0;
        while !clear(r) {
            r += step;
            if r >= max_r {
                return if clear(max_r) { Some(max_r) } else { None };
            }
        }
        Some(r)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::operations::road::fixtures::{flat, point, polyline};
    use crate::operations::road::Side;

    #[test]
    fn straight_polyline_links_without_rounding() {
        let mut store = TopologyStore::new();
        let segs = polyline(&mut store, &[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]);
        let net = BuildRoadNetwork::new(segs, RoadParams::default())
            .execute(&mut store, &flat)
            .unwrap();
        assert_eq!(net.segments.len(), 2);
        let (a, b) = (&net.segments[0], &net.segments[1]);
        assert_eq!(
            a.neighbour(Endpoint::End),
            Some(Link {
                segment: 1,
                end: Endpoint::Start
            })
        );
        assert_eq!(a.rotation[1], Rotation::Straight);
        assert_eq!(a.rounding, [RoundingState::Unrounded; 2]);
        assert_eq!(a.border(Side::Left, Endpoint::End), b.border(Side::Left, Endpoint::Start));
        assert!(net.anomalies.is_empty());
    }

    #[test]
    fn corner_is_marked_for_rounding() {
        let mut store = TopologyStore::new();
        let segs = polyline(&mut store, &[(0.0, 0.0), (30.0, 0.0), (30.0, 30.0)]);
        let net = BuildRoadNetwork::new(segs, RoadParams::default())
            .execute(&mut store, &flat)
            .unwrap();
        assert_eq!(net.segments[0].rounding[1], RoundingState::NeedsRounding);
        assert_eq!(net.segments[1].rounding[0], RoundingState::NeedsRounding);
        assert_eq!(net.segments[0].rounding[0], RoundingState::Unrounded);
    }

    #[test]
    fn t_junction_links_the_through_road_and_retracts_the_stem() {
        let mut store = TopologyStore::new();
        let c = point(&mut store, 0.0, 0.0);
        let w = point(&mut store, -20.0, 0.0);
        let e = point(&mut store, 20.0, 0.0);
        let n = point(&mut store, 0.0, 20.0);
        let segs = vec![Segment::new(w, c), Segment::new(c, e), Segment::new(c, n)];
        let params = RoadParams::default();
        let net = BuildRoadNetwork::new(segs, params)
            .execute(&mut store, &flat)
            .unwrap();

        let (west, east, stem) = (&net.segments[0], &net.segments[1], &net.segments[2]);
        assert_eq!(west.neighbour(Endpoint::End).map(|l| l.segment), Some(1));
        assert_eq!(east.neighbour(Endpoint::Start).map(|l| l.segment), Some(0));
        assert_eq!(stem.neighbour(Endpoint::Start), None);

        let start = store.planar(stem.ends[0]).unwrap();
        assert_abs_diff_eq!(start.x, 0.0);
        assert_abs_diff_eq!(start.y, 6.0, epsilon = 1e-12);
        for side in Side::ALL {
            let s = store.planar(stem.shoulder(side, Endpoint::Start)).unwrap();
            assert!(s.y >= params.outer_width() - 1e-9);
        }
    }

    #[test]
    fn stem_too_short_to_clear_is_reported() {
        let mut store = TopologyStore::new();
        let c = point(&mut store, 0.0, 0.0);
        let w = point(&mut store, -20.0, 0.0);
        let e = point(&mut store, 20.0, 0.0);
        let n = point(&mut store, 0.0, 4.0);
        let segs = vec![Segment::new(w, c), Segment::new(c, e), Segment::new(c, n)];
        let net = BuildRoadNetwork::new(segs, RoadParams::default())
            .execute(&mut store, &flat)
            .unwrap();
        assert_eq!(net.segments[2].neighbour(Endpoint::Start), None);
        let overlaps: Vec<_> = net
            .anomalies
            .iter()
            .filter(|d| d.kind == DegeneracyKind::NoNeighbour)
            .collect();
        assert_eq!(overlaps.len(), 1);
        assert!(overlaps[0].context.contains("segment 2"));
    }

    #[test]
    fn hairpin_is_left_unlinked() {
        let mut store = TopologyStore::new();
        let segs = polyline(&mut store, &[(0.0, 0.0), (30.0, 0.0), (0.0, 5.0)]);
        let net = BuildRoadNetwork::new(segs, RoadParams::default())
            .execute(&mut store, &flat)
            .unwrap();
        assert!(net.segments.iter().all(|s| s.neighbour(Endpoint::End).is_none()
            && s.neighbour(Endpoint::Start).is_none()));
        assert!(net
            .anomalies
            .iter()
            .any(|d| d.kind == DegeneracyKind::NoNeighbour));
    }

    #[test]
    fn degenerate_centrelines_are_skipped() {
        let mut store = TopologyStore::new();
        let a = point(&mut store, 0.0, 0.0);
        let b = point(&mut store, 10.0, 0.0);
        let segs = vec![Segment::new(a, a), Segment::new(a, b), Segment::new(b, a)];
        let net = BuildRoadNetwork::new(segs, RoadParams::default())
            .execute(&mut store, &flat)
            .unwrap();
        assert_eq!(net.segments.len(), 1);
        assert_eq!(net.anomalies.len(), 2);
    }
}
