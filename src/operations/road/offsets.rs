use super::{
    departure, direction, Endpoint, Link, RoadNetwork, RoadParams, RoadSegment, Rotation, Side,
    Skeleton,
};
use crate::error::{Degeneracy, DegeneracyKind, Result};
use crate::math::intersect_2d::line_line_intersect_2d;
use crate::math::{left_normal, signed_angle, Point2, Vector2, TOLERANCE};
use crate::terrain::HeightSampler;
use crate::topology::{PointId, TopologyStore};

/// Classifies the turn from `arrive` onto `leave`.
pub(crate) fn classify(theta: f64, straight_tolerance: f64) -> Rotation {
    if theta.abs() <= straight_tolerance {
        Rotation::Straight
    } else if theta > 0.0 {
        Rotation::TurnsLeft
    } else {
        Rotation::TurnsRight
    }
}

/// Signed turn travelling along `i` into the node at `e`, then out along `j` from `f`.
pub(crate) fn turn_angle(dir_i: &Vector2, e: Endpoint, dir_j: &Vector2, f: Endpoint) -> f64 {
    let arrive = -departure(dir_i, e);
    let leave = departure(dir_j, f);
    signed_angle(&arrive, &leave)
}

/// The side of `j` that continues `side` of `i` across a link `(i, e) - (j, f)`.
///
/// When the two segments run the same way through the node the sides match;
/// when they meet head to head (or tail to tail) they swap.
pub(crate) fn continuing_side(side: Side, e: Endpoint, f: Endpoint) -> Side {
    if e == f {
        side.opposite()
    } else {
        side
    }
}

/// Resolves border and shoulder points for every segment of a skeleton.
///
/// Linked ends take the intersection of both segments' offset lines, created
/// once and written to both sides of the link. Free ends take a perpendicular
/// offset, with the shoulder corner pushed out along the road by the shoulder
/// width. Every new point is placed on the height field.
pub(crate) fn resolve<S>(
    store: &mut TopologyStore,
    sampler: &S,
    params: &RoadParams,
    skeleton: &[Skeleton],
) -> Result<RoadNetwork>
where
    S: HeightSampler + ?Sized,
{
    let n = skeleton.len();
    let mut dirs = Vec::with_capacity(n);
    let mut lengths = Vec::with_capacity(n);
    for s in skeleton {
        dirs.push(direction(store, s.ends)?);
        lengths.push((store.planar(s.ends[1])? - store.planar(s.ends[0])?).norm());
    }

    let mut anomalies = Vec::new();
    let mut borders: Vec<[[Option<PointId>; 2]; 2]> = vec![[[None; 2]; 2]; n];
    let mut shoulders: Vec<[[Option<PointId>; 2]; 2]> = vec![[[None; 2]; 2]; n];
    let mut links: Vec<[Option<Link>; 2]> = vec![[None; 2]; n];
    let mut rotation = vec![[Rotation::Straight; 2]; n];
    let hw = params.half_width;
    let ow = params.outer_width();

    for i in 0..n {
        for e in Endpoint::ALL {
            let node = skeleton[i].ends[e.index()];
            let p = store.planar(node)?;
            let link = skeleton[i].links[e.index()].filter(|l| {
                let back = skeleton
                    .get(l.segment)
                    .and_then(|s| s.links[l.end.index()]);
                let symmetric = back == Some(Link { segment: i, end: e });
                if !symmetric {
                    anomalies.push(Degeneracy::new(
                        DegeneracyKind::NoNeighbour,
                        format!("segment {i} {e:?} has a one-sided link"),
                    ));
                }
                symmetric
            });
            links[i][e.index()] = link;

            let Some(Link { segment: j, end: f }) = link else {
                let normal = left_normal(&dirs[i]);
                let outward = -departure(&dirs[i], e);
                for side in Side::ALL {
                    let s = side.sign();
                    let b = add(store, sampler, p + normal * (s * hw));
                    borders[i][side.index()][e.index()] = Some(b);
                    let sh = if params.shoulder_width > TOLERANCE {
                        add(
                            store,
                            sampler,
                            p + normal * (s * ow) + outward * params.shoulder_width,
                        )
                    } else {
                        b
                    };
                    shoulders[i][side.index()][e.index()] = Some(sh);
                }
                continue;
            };

            rotation[i][e.index()] = classify(
                turn_angle(&dirs[i], e, &dirs[j], f),
                params.straight_tolerance,
            );

            for side in Side::ALL {
                if borders[i][side.index()][e.index()].is_some() {
                    continue;
                }
                let other = continuing_side(side, e, f);
                let (b, overflow) =
                    joint_point(&p, &dirs[i], side, &dirs[j], other, hw, params.mitre_limit);
                if overflow {
                    anomalies.push(Degeneracy::new(
                        DegeneracyKind::MitreOverflow,
                        format!("segment {i} {e:?} {side:?} joined to segment {j}"),
                    ));
                }
                let b = add(store, sampler, b);
                let sh = if params.shoulder_width > TOLERANCE {
                    let (s, _) =
                        joint_point(&p, &dirs[i], side, &dirs[j], other, ow, params.mitre_limit);
                    add(store, sampler, s)
                } else {
                    b
                };
                borders[i][side.index()][e.index()] = Some(b);
                borders[j][other.index()][f.index()] = Some(b);
                shoulders[i][side.index()][e.index()] = Some(sh);
                shoulders[j][other.index()][f.index()] = Some(sh);
            }
        }
    }

    let mut segments = Vec::with_capacity(n);
    for i in 0..n {
        let (Some(b), Some(s)) = (flatten(borders[i]), flatten(shoulders[i])) else {
            // Only reachable through a one-sided link that was dropped above.
            continue;
        };
        let link = links[i];
        segments.push(RoadSegment {
            ends: skeleton[i].ends,
            borders: b,
            shoulders: s,
            neighbours: [link, link],
            rotation: rotation[i],
            half_length: 0.5 * lengths[i],
            rounding: skeleton[i].rounding,
            hits: Default::default(),
            tex: [0.0; 2],
        });
    }
    Ok(RoadNetwork {
        segments,
        anomalies,
    })
}

/// Intersection of `side` of road `i` with side `other` of road `j` at node `p`.
///
/// Returns the point and whether the mitre limit forced a perpendicular fallback.
fn joint_point(
    p: &Point2,
    dir_i: &Vector2,
    side: Side,
    dir_j: &Vector2,
    other: Side,
    width: f64,
    mitre_limit: f64,
) -> (Point2, bool) {
    let perpendicular = p + left_normal(dir_i) * (side.sign() * width);
    let q = p + left_normal(dir_j) * (other.sign() * width);
    match line_line_intersect_2d(&perpendicular, dir_i, &q, dir_j) {
        Some((t, _)) => {
            let x = perpendicular + dir_i * t;
            if (x - p).norm() > mitre_limit * width {
                (perpendicular, true)
            } else {
                (x, false)
            }
        }
        None => (perpendicular, false),
    }
}

fn add<S: HeightSampler + ?Sized>(store: &mut TopologyStore, sampler: &S, p: Point2) -> PointId {
    store.add_point(sampler.sample(p.x, p.y))
}

fn flatten(ids: [[Option<PointId>; 2]; 2]) -> Option<[[PointId; 2]; 2]> {
    Some([
        [ids[0][0]?, ids[0][1]?],
        [ids[1][0]?, ids[1][1]?],
    ])
}
