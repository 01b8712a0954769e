use std::collections::{BTreeMap, HashMap, HashSet};

use super::offsets::{resolve, turn_angle};
use super::{
    departure, Endpoint, Link, RoadNetwork, RoadParams, RoadSegment, RoundingState, Skeleton,
};
use crate::error::{Degeneracy, DegeneracyKind, Result};
use crate::math::intersect_2d::line_line_intersect_2d;
use crate::math::spline::ChordSpline;
use crate::math::{left_normal, rotate, Point2, Point3, TOLERANCE};
use crate::terrain::HeightSampler;
use crate::topology::{PointId, TopologyStore};

/// Replaces sharp linked joints with bounded-curvature arcs and subdivides
/// straight runs.
///
/// # Algorithm
///
/// For every linked end marked for rounding, both arms are trimmed back from
/// the node by `min(corner_radius * tan(|θ|/2), len/2)`. The local origin is
/// the intersection of the two lateral axes through the trim points. In plan
/// view the corner is a circular arc around that origin, sampled in
/// `ceil(|θ| / max_turn_angle)` equal angular steps, so consecutive tangents
/// never differ by more than `max_turn_angle`. The chord-length spline through
/// the far end of the first arm, both trim points and the far end of the second
/// arm only supplies the sample heights.
///
/// A corner whose arms are too short for a radius wider than the shoulder line
/// is left as a mitred joint and recorded as `MitreOverflow`.
///
/// What is left of every segment is split into pieces no longer than
/// `max_road_len`. The output is a fresh segment vector with re-resolved
/// offsets; ends on generated nodes are marked rounded.
#[derive(Debug)]
pub struct RoundJunctions {
    params: RoadParams,
}

struct Corner {
    owner: Link,
    partner: Link,
    trim: [Point2; 2],
    arc: Vec<Point3>,
}

impl RoundJunctions {
    /// Creates a new rounding pass.
    #[must_use]
    pub fn new(params: RoadParams) -> Self {
        Self { params }
    }

    /// Rounds the junctions of `segments`, appending new points to the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid or a segment references a
    /// point missing from the store.
    pub fn execute<S>(
        &self,
        store: &mut TopologyStore,
        sampler: &S,
        segments: &[RoadSegment],
    ) -> Result<RoadNetwork>
    where
        S: HeightSampler + ?Sized,
    {
        self.params.validate()?;
        let mut anomalies = Vec::new();

        let corners = self.corners(store, sampler, segments, &mut anomalies)?;
        let mut corner_at: HashMap<Link, (usize, usize)> = HashMap::new();
        for (k, c) in corners.iter().enumerate() {
            corner_at.insert(c.owner, (k, 0));
            corner_at.insert(c.partner, (k, 1));
        }

        // Trim points: where each segment's straight part now ends.
        let mut generated: HashSet<PointId> = HashSet::new();
        let mut cut: Vec<[PointId; 2]> = Vec::with_capacity(segments.len());
        for (i, seg) in segments.iter().enumerate() {
            let mut ids = seg.ends;
            let mut pos = [store.planar(seg.ends[0])?, store.planar(seg.ends[1])?];
            for end in Endpoint::ALL {
                if let Some(&(k, slot)) = corner_at.get(&Link { segment: i, end }) {
                    pos[end.index()] = corners[k].trim[slot];
                }
            }
            let trimmed =
                Endpoint::ALL.map(|e| corner_at.contains_key(&Link { segment: i, end: e }));
            if trimmed[0] && trimmed[1] && (pos[1] - pos[0]).norm() <= TOLERANCE.sqrt() {
                let id = store.add_point(sampler.sample(pos[0].x, pos[0].y));
                generated.insert(id);
                ids = [id, id];
            } else {
                for end in Endpoint::ALL {
                    if trimmed[end.index()] {
                        let p = pos[end.index()];
                        let id = store.add_point(sampler.sample(p.x, p.y));
                        generated.insert(id);
                        ids[end.index()] = id;
                    }
                }
            }
            cut.push(ids);
        }

        let mut skeleton: Vec<Skeleton> = Vec::new();
        let mut terminal: Vec<[Option<Link>; 2]> = vec![[None; 2]; segments.len()];
        for (i, &[a, b]) in cut.iter().enumerate() {
            if a == b {
                continue;
            }
            let pa = store.planar(a)?;
            let pb = store.planar(b)?;
            let len = (pb - pa).norm();
            let pieces = pieces_for(len, self.params.max_road_len);
            let first = skeleton.len();
            let mut prev = a;
            for k in 1..=pieces {
                let next = if k == pieces {
                    b
                } else {
                    #[allow(clippy::cast_precision_loss)]
                    let p = pa + (pb - pa) * (k as f64 / pieces as f64);
                    let id = store.add_point(sampler.sample(p.x, p.y));
                    generated.insert(id);
                    id
                };
                skeleton.push(Skeleton::new(prev, next));
                prev = next;
            }
            terminal[i] = [
                Some(Link {
                    segment: first,
                    end: Endpoint::Start,
                }),
                Some(Link {
                    segment: skeleton.len() - 1,
                    end: Endpoint::End,
                }),
            ];
        }

        for c in &corners {
            let start = cut[c.owner.segment][c.owner.end.index()];
            let end = cut[c.partner.segment][c.partner.end.index()];
            let mut prev = start;
            for p in &c.arc {
                let id = store.add_point(*p);
                generated.insert(id);
                skeleton.push(Skeleton::new(prev, id));
                prev = id;
            }
            skeleton.push(Skeleton::new(prev, end));
        }

        // Generated nodes join exactly two pieces.
        let mut arms: BTreeMap<PointId, Vec<Link>> = BTreeMap::new();
        for (i, s) in skeleton.iter().enumerate() {
            for end in Endpoint::ALL {
                arms.entry(s.ends[end.index()])
                    .or_default()
                    .push(Link { segment: i, end });
            }
        }
        for (node, list) in &arms {
            if !generated.contains(node) {
                continue;
            }
            if let [x, y] = list.as_slice() {
                skeleton[x.segment].links[x.end.index()] = Some(*y);
                skeleton[y.segment].links[y.end.index()] = Some(*x);
                skeleton[x.segment].rounding[x.end.index()] = RoundingState::Rounded;
                skeleton[y.segment].rounding[y.end.index()] = RoundingState::Rounded;
            }
        }

        // Links that were not rounded carry over to the outermost pieces.
        for (i, seg) in segments.iter().enumerate() {
            for end in Endpoint::ALL {
                let here = Link { segment: i, end };
                let Some(there) = seg.neighbour(end) else {
                    continue;
                };
                if corner_at.contains_key(&here) || here > there {
                    continue;
                }
                let far = terminal[there.segment][there.end.index()];
                if let (Some(x), Some(y)) = (terminal[i][end.index()], far) {
                    skeleton[x.segment].links[x.end.index()] = Some(y);
                    skeleton[y.segment].links[y.end.index()] = Some(x);
                }
            }
        }

        let mut net = resolve(store, sampler, &self.params, &skeleton)?;
        anomalies.append(&mut net.anomalies);
        net.anomalies = anomalies;
        tracing::debug!(
            corners = corners.len(),
            segments = net.segments.len(),
            "rounded junctions"
        );
        Ok(net)
    }

    /// Computes every corner once, from the end that sorts first.
    fn corners<S>(
        &self,
        store: &TopologyStore,
        sampler: &S,
        segments: &[RoadSegment],
        anomalies: &mut Vec<Degeneracy>,
    ) -> Result<Vec<Corner>>
    where
        S: HeightSampler + ?Sized,
    {
        let mut dirs = Vec::with_capacity(segments.len());
        for seg in segments {
            dirs.push(seg.direction(store)?);
        }

        let mut corners = Vec::new();
        for (i, seg) in segments.iter().enumerate() {
            for e in Endpoint::ALL {
                let owner = Link { segment: i, end: e };
                let Some(partner) = seg.neighbour(e) else {
                    continue;
                };
                let (j, f) = (partner.segment, partner.end);
                if owner > partner
                    || seg.rounding[e.index()] != RoundingState::NeedsRounding
                    || segments[j].rounding[f.index()] != RoundingState::NeedsRounding
                {
                    continue;
                }

                let theta = turn_angle(&dirs[i], e, &dirs[j], f);
                let half_turn = (0.5 * theta.abs()).tan();
                let trim = (self.params.corner_radius * half_turn)
                    .min(seg.half_length)
                    .min(segments[j].half_length);
                // Below the shoulder radius the inner offsets fold over the origin.
                if trim <= self.params.outer_width() * half_turn {
                    anomalies.push(Degeneracy::new(
                        DegeneracyKind::MitreOverflow,
                        format!(
                            "corner at segment {i} {e:?} needs radius > {}, arms allow {}",
                            self.params.outer_width(),
                            trim / half_turn
                        ),
                    ));
                    continue;
                }
                let node = store.planar(seg.ends[e.index()])?;
                let dep_i = departure(&dirs[i], e);
                let dep_j = departure(&dirs[j], f);
                let a = node + dep_i * trim;
                let b = node + dep_j * trim;

                let (lat_i, lat_j) = (left_normal(&dep_i), left_normal(&dep_j));
                let Some((s, _)) = line_line_intersect_2d(&a, &lat_i, &b, &lat_j) else {
                    anomalies.push(Degeneracy::new(
                        DegeneracyKind::Parallel,
                        format!("corner at segment {i} {e:?} has parallel lateral axes"),
                    ));
                    continue;
                };
                let origin = a + lat_i * s;

                let steps = steps_for(theta.abs(), self.params.max_turn_angle);
                let spline = ChordSpline::new(
                    *store.point(seg.ends[e.other().index()])?,
                    sampler.sample(a.x, a.y),
                    sampler.sample(b.x, b.y),
                    *store.point(segments[j].ends[f.other().index()])?,
                );
                let arc = (1..steps)
                    .map(|k| {
                        #[allow(clippy::cast_precision_loss)]
                        let w = k as f64 / steps as f64;
                        let q = origin + rotate(&(a - origin), theta * w);
                        Point3::new(q.x, spline.evaluate(w).y, q.y)
                    })
                    .collect();

                tracing::debug!(
                    segment = i,
                    end = ?e,
                    turn = theta.to_degrees(),
                    trim,
                    steps,
                    "rounding corner"
                );
                corners.push(Corner {
                    owner,
                    partner,
                    trim: [a, b],
                    arc,
                });
            }
        }
        Ok(corners)
    }
}

/// Number of arc pieces so that each turns by at most `max_turn`.
fn steps_for(turn: f64, max_turn: f64) -> usize {
    at_least_one((turn / max_turn - 1e-9).ceil())
}

/// Number of pieces so that none is longer than `max_len`.
fn pieces_for(len: f64, max_len: f64) -> usize {
    at_least_one((len / max_len - 1e-9).ceil())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn at_least_one(n: f64) -> usize {
    n.max(1.0) as usize
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::operations::road::fixtures::{flat, polyline};
    use crate::operations::road::{BuildRoadNetwork, Side};

    fn build_and_round(
        store: &mut TopologyStore,
        pts: &[(f64, f64)],
        params: RoadParams,
    ) -> RoadNetwork {
        let segs = polyline(store, pts);
        let net = BuildRoadNetwork::new(segs, params)
            .execute(store, &flat)
            .unwrap();
        RoundJunctions::new(params)
            .execute(store, &flat, &net.segments)
            .unwrap()
    }

    fn assert_smooth(store: &TopologyStore, net: &RoadNetwork, max_turn: f64) {
        for (i, seg) in net.segments.iter().enumerate() {
            let di = seg.direction(store).unwrap();
            for end in Endpoint::ALL {
                if let Some(l) = seg.neighbour(end) {
                    let dj = net.segments[l.segment].direction(store).unwrap();
                    let turn = turn_angle(&di, end, &dj, l.end).abs();
                    assert!(turn <= max_turn + 1e-9, "segment {i}: turn {turn}");
                }
            }
        }
    }

    #[test]
    fn right_angle_rounds_into_bounded_steps() {
        let mut store = TopologyStore::new();
        let params = RoadParams {
            max_road_len: 100.0,
            ..RoadParams::default()
        };
        let net = build_and_round(&mut store, &[(0.0, 0.0), (40.0, 0.0), (40.0, 40.0)], params);
        let steps = steps_for(std::f64::consts::FRAC_PI_2, params.max_turn_angle);
        assert_eq!(steps, 6);
        assert_eq!(net.segments.len(), steps + 2);
        assert_smooth(&store, &net, params.max_turn_angle);

        // Arc points sit on the corner circle around (30, 10).
        for seg in &net.segments[2..] {
            for id in seg.ends {
                let p = store.planar(id).unwrap();
                assert_abs_diff_eq!((p - Point2::new(30.0, 10.0)).norm(), 10.0, epsilon = 1e-9);
            }
        }
        let rounded = net
            .segments
            .iter()
            .flat_map(|s| s.rounding)
            .filter(|r| *r == RoundingState::Rounded)
            .count();
        assert_eq!(rounded, 2 * (steps + 1));
    }

    #[test]
    fn straight_road_is_subdivided_without_losing_length() {
        let mut store = TopologyStore::new();
        let params = RoadParams::default();
        let net = build_and_round(&mut store, &[(10.0, 50.0), (90.0, 50.0)], params);
        assert_eq!(net.segments.len(), 10);
        for side in Side::ALL {
            let total: f64 = net
                .segments
                .iter()
                .map(|s| {
                    let a = store.planar(s.border(side, Endpoint::Start)).unwrap();
                    let b = store.planar(s.border(side, Endpoint::End)).unwrap();
                    (b - a).norm()
                })
                .sum();
            assert_abs_diff_eq!(total, 80.0, epsilon = 1e-9);
        }
        assert!(net.segments.iter().all(|s| s.length() <= params.max_road_len + 1e-9));
        assert_smooth(&store, &net, 1e-9);
    }

    #[test]
    fn short_arms_clamp_the_trim_and_share_the_midpoint() {
        let mut store = TopologyStore::new();
        let params = RoadParams {
            corner_radius: 100.0,
            max_road_len: 100.0,
            ..RoadParams::default()
        };
        // Zig-zag: the middle segment is trimmed from both ends.
        let net = build_and_round(
            &mut store,
            &[(0.0, 0.0), (20.0, 0.0), (20.0, 20.0), (40.0, 20.0)],
            params,
        );
        assert_smooth(&store, &net, params.max_turn_angle);
        assert!(net.anomalies.is_empty());
    }

    #[test]
    fn short_arms_keep_a_mitred_joint() {
        let mut store = TopologyStore::new();
        let params = RoadParams::default();
        let net = build_and_round(&mut store, &[(0.0, 0.0), (6.0, 0.0), (6.0, 6.0)], params);
        assert_eq!(net.segments.len(), 2);
        assert_eq!(
            net.segments[0].neighbour(Endpoint::End),
            Some(Link {
                segment: 1,
                end: Endpoint::Start
            })
        );
        assert!(net
            .anomalies
            .iter()
            .any(|d| d.kind == DegeneracyKind::MitreOverflow));
        let inner = store
            .planar(net.segments[0].border(Side::Left, Endpoint::End))
            .unwrap();
        assert_abs_diff_eq!(inner.x, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(inner.y, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn piece_counts() {
        assert_eq!(pieces_for(16.0, 8.0), 2);
        assert_eq!(pieces_for(16.5, 8.0), 3);
        assert_eq!(pieces_for(0.1, 8.0), 1);
        assert_eq!(steps_for(0.1, 0.5), 1);
    }
}
