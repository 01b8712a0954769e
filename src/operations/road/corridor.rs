use std::collections::{HashMap, HashSet, VecDeque};

use super::{CorridorSide, Endpoint, RoadSegment, Side};
use crate::error::{Degeneracy, DegeneracyKind, OperationError, Result};
use crate::math::intersect_2d::{line_line_intersect_2d, project_param_2d};
use crate::math::polygon_2d::{edge_side, point_in_polygon_2d, triangle_centroid_2d};
use crate::math::{Point2, Point3};
use crate::operations::triangulate::TriangulatePolygon;
use crate::topology::segment::insert_sorted;
use crate::topology::{Intersection, Location, PointId, TopologyStore, TriangleId};

/// Parameters controlling the corridor cut.
#[derive(Debug, Clone, Copy)]
pub struct CutParams {
    /// Distance under which points are considered coincident or collinear.
    pub snap_tolerance: f64,
    /// Total number of mesh-walk steps allowed across all constraint edges.
    pub max_steps: usize,
}

impl Default for CutParams {
    fn default() -> Self {
        Self {
            snap_tolerance: 1e-6,
            max_steps: 100_000,
        }
    }
}

impl CutParams {
    /// Checks the parameters for nonsensical values.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::InvalidInput` if the tolerance is not positive or
    /// the step limit is zero.
    pub fn validate(&self) -> Result<()> {
        if self.snap_tolerance.is_nan() || self.snap_tolerance <= 0.0 {
            return Err(
                OperationError::InvalidInput("snap_tolerance must be positive".into()).into(),
            );
        }
        if self.max_steps == 0 {
            return Err(OperationError::InvalidInput("max_steps must be positive".into()).into());
        }
        Ok(())
    }
}

/// A road-surface triangle and the segment it paves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoadTriangle {
    pub vertices: [PointId; 3],
    pub segment: usize,
}

/// Result of a corridor cut.
#[derive(Debug, Clone, Default)]
pub struct CutOutput {
    pub road: Vec<RoadTriangle>,
    pub anomalies: Vec<Degeneracy>,
}

/// One constraint line of a segment's corridor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Work {
    Border(CorridorSide),
    Shoulder(Side),
    ShoulderCap(Endpoint),
}

enum Step {
    Vertex(PointId),
    Cross { x: PointId, y: PointId, u: f64 },
}

/// Carves the road corridors into the terrain triangulation.
///
/// # Algorithm
///
/// 1. Walk the road graph with an explicit queue, following each segment's
///    links to its neighbours. For every segment insert its border lines, end
///    caps and shoulder lines as constraint edges: the end points are inserted
///    into the mesh, then the walk from one end to the other splits every
///    terrain edge it crosses. Road and terrain therefore share exact edges.
/// 2. Trace each carriageway boundary back through the mesh, recording the
///    terrain crossings per side as `(t, point)`.
/// 3. Delete terrain triangles inside each carriageway (six-point hexagon test
///    on the centroid) and fill the carriageway polygon with the polygon
///    triangulator. The shoulder band stays terrain.
///
/// A segment whose boundary cannot be recovered is left uncut and recorded.
#[derive(Debug, Default)]
pub struct CutCorridors {
    params: CutParams,
}

impl CutCorridors {
    /// Creates a new corridor cut.
    #[must_use]
    pub fn new(params: CutParams) -> Self {
        Self { params }
    }

    /// Cuts every corridor into the terrain in `store`.
    ///
    /// Snapped border points are rewritten in `segments`, and each segment's
    /// `hits` lists are filled in.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid or the store is
    /// inconsistent with the segments.
    pub fn execute(
        &self,
        store: &mut TopologyStore,
        segments: &mut [RoadSegment],
    ) -> Result<CutOutput> {
        self.params.validate()?;
        let mut anomalies = Vec::new();
        let mut remap: HashMap<PointId, PointId> = HashMap::new();
        let mut budget = self.params.max_steps;
        let mut failed: HashSet<usize> = HashSet::new();
        let mut exhausted = false;

        let mut queue = VecDeque::new();
        let mut queued = vec![false; segments.len()];
        let mut visited: HashSet<(usize, Work)> = HashSet::new();
        'seeds: for seed in 0..segments.len() {
            if queued[seed] {
                continue;
            }
            queued[seed] = true;
            queue.push_back(seed);
            while let Some(i) = queue.pop_front() {
                for work in work_items(&segments[i]) {
                    if !visited.insert((i, work)) {
                        continue;
                    }
                    let [a, b] = line_of(&segments[i], work);
                    match self.insert_constraint(store, a, b, &mut remap, &mut budget)? {
                        None => {}
                        Some(DegeneracyKind::StepLimit) => {
                            anomalies.push(Degeneracy::new(
                                DegeneracyKind::StepLimit,
                                format!("step limit reached at segment {i}"),
                            ));
                            exhausted = true;
                            break 'seeds;
                        }
                        Some(kind) => {
                            failed.insert(i);
                            anomalies.push(Degeneracy::new(
                                kind,
                                format!("segment {i} {work:?}"),
                            ));
                        }
                    }
                }
                for end in Endpoint::ALL {
                    if let Some(link) = segments[i].neighbour(end) {
                        if !queued[link.segment] {
                            queued[link.segment] = true;
                            queue.push_back(link.segment);
                        }
                    }
                }
            }
        }

        for seg in segments.iter_mut() {
            for line in seg.borders.iter_mut().chain(seg.shoulders.iter_mut()) {
                for id in line.iter_mut() {
                    *id = follow(&remap, *id);
                }
            }
        }

        let mut road = Vec::new();
        for (i, seg) in segments.iter_mut().enumerate() {
            if exhausted || failed.contains(&i) {
                continue;
            }
            let mut chains: [Vec<(f64, PointId)>; 4] = Default::default();
            let mut traced = true;
            for side in CorridorSide::ALL {
                let [a, b] = seg.corridor_line(side);
                match self.trace(store, a, b)? {
                    Some(chain) => chains[side.index()] = chain,
                    None => traced = false,
                }
            }
            if !traced {
                anomalies.push(Degeneracy::new(
                    DegeneracyKind::EdgeNotRecovered,
                    format!("segment {i} boundary is not a mesh path"),
                ));
                continue;
            }
            for side in CorridorSide::ALL {
                let hits = &mut seg.hits[side.index()];
                hits.clear();
                let chain = &chains[side.index()];
                for &(t, point) in chain.iter().skip(1).take(chain.len().saturating_sub(2)) {
                    insert_sorted(hits, Intersection { t, point });
                }
            }

            let ring = carriageway_ring(&chains);
            let fill = match TriangulatePolygon::new(ring).compute(store) {
                Ok(fill) => fill,
                Err(err) => {
                    let kind = err.degeneracy().unwrap_or(DegeneracyKind::NoEar);
                    anomalies.push(Degeneracy::new(kind, format!("carriageway of segment {i}")));
                    continue;
                }
            };

            let hexagon = seg.carriageway(store)?;
            let inside: Vec<TriangleId> = store
                .triangles()
                .filter_map(|(id, data)| {
                    let c = store.corners(data.vertices).ok()?;
                    let g = triangle_centroid_2d(&c[0], &c[1], &c[2]);
                    point_in_polygon_2d(&g, &hexagon).then_some(id)
                })
                .collect();
            for id in inside {
                store.remove_triangle(id)?;
            }
            road.extend(fill.into_iter().map(|vertices| RoadTriangle {
                vertices,
                segment: i,
            }));
        }

        tracing::debug!(
            road_triangles = road.len(),
            terrain_triangles = store.triangle_count(),
            steps = self.params.max_steps - budget,
            "cut road corridors"
        );
        Ok(CutOutput { road, anomalies })
    }

    /// Makes `a`-`b` a chain of mesh edges. Returns the reason on failure.
    fn insert_constraint(
        &self,
        store: &mut TopologyStore,
        a: PointId,
        b: PointId,
        remap: &mut HashMap<PointId, PointId>,
        budget: &mut usize,
    ) -> Result<Option<DegeneracyKind>> {
        let (Some(a), Some(b)) = (
            self.insert_vertex(store, a, remap)?,
            self.insert_vertex(store, b, remap)?,
        ) else {
            return Ok(Some(DegeneracyKind::OutsideTerrain));
        };
        self.recover(store, a, b, budget)
    }

    /// Inserts a free point into the mesh, or resolves it to the vertex it snaps to.
    fn insert_vertex(
        &self,
        store: &mut TopologyStore,
        p: PointId,
        remap: &mut HashMap<PointId, PointId>,
    ) -> Result<Option<PointId>> {
        let p = follow(remap, p);
        if !store.triangles_around(p).is_empty() {
            return Ok(Some(p));
        }
        let q = store.planar(p)?;
        match store.locate(&q, self.params.snap_tolerance) {
            None => Ok(None),
            Some(Location::Vertex(v)) => {
                if v != p {
                    remap.insert(p, v);
                }
                Ok(Some(v))
            }
            Some(Location::Edge(x, y)) => {
                store.split_edge(x, y, p)?;
                Ok(Some(p))
            }
            Some(Location::Face(t)) => {
                store.split_triangle(t, p)?;
                Ok(Some(p))
            }
        }
    }

    /// Walks from `a` towards `b`, splitting every crossed edge.
    fn recover(
        &self,
        store: &mut TopologyStore,
        a: PointId,
        b: PointId,
        budget: &mut usize,
    ) -> Result<Option<DegeneracyKind>> {
        let pb = store.planar(b)?;
        let mut c = a;
        while c != b {
            if store.has_edge(c, b) {
                return Ok(None);
            }
            if *budget == 0 {
                return Ok(Some(DegeneracyKind::StepLimit));
            }
            *budget -= 1;

            let pc = store.planar(c)?;
            let Some(step) = self.next_step(store, c, &pc, &pb)? else {
                return Ok(Some(DegeneracyKind::EdgeNotRecovered));
            };
            c = match step {
                Step::Vertex(v) => v,
                Step::Cross { x, y, u } => {
                    let (px, py) = (*store.point(x)?, *store.point(y)?);
                    let id = store.add_point(Point3::from(px.coords + (py - px) * u));
                    store.split_edge(x, y, id)?;
                    id
                }
            };
        }
        Ok(None)
    }

    /// Finds the next vertex on the way from `c` to `pb`, or the edge to cross.
    fn next_step(
        &self,
        store: &TopologyStore,
        c: PointId,
        pc: &Point2,
        pb: &Point2,
    ) -> Result<Option<Step>> {
        let snap = self.params.snap_tolerance;
        let dir = pb - pc;
        let len = dir.norm();
        if len <= snap {
            return Ok(None);
        }
        for &t in store.triangles_around(c) {
            let Some([_, x, y]) = store.triangle(t)?.rotated_to(c) else {
                continue;
            };
            let (px, py) = (store.planar(x)?, store.planar(y)?);
            for (v, pv) in [(x, &px), (y, &py)] {
                if edge_side(pc, pb, pv).abs() <= snap && (pv - pc).dot(&dir) > 0.0 {
                    return Ok((project_param_2d(pv, pc, pb) <= 1.0 + snap / len)
                        .then_some(Step::Vertex(v)));
                }
            }
            let sx = edge_side(pc, pb, &px);
            let sy = edge_side(pc, pb, &py);
            if sx < -snap && sy > snap {
                if edge_side(&px, &py, pb) >= -snap {
                    // The target should have been a corner of this triangle.
                    return Ok(None);
                }
                let Some((u, _)) = line_line_intersect_2d(&px, &(py - px), pc, &dir) else {
                    return Ok(None);
                };
                return Ok(Some(Step::Cross {
                    x,
                    y,
                    u: u.clamp(0.0, 1.0),
                }));
            }
        }
        Ok(None)
    }

    /// Follows mesh edges collinear with `a`-`b`, returning `(t, point)` per vertex.
    fn trace(
        &self,
        store: &TopologyStore,
        a: PointId,
        b: PointId,
    ) -> Result<Option<Vec<(f64, PointId)>>> {
        let snap = self.params.snap_tolerance;
        let (pa, pb) = (store.planar(a)?, store.planar(b)?);
        let len = (pb - pa).norm();
        let mut chain = vec![(0.0, a)];
        if a == b {
            return Ok(Some(chain));
        }
        let eps_t = snap / len.max(snap);
        let (mut c, mut tc) = (a, 0.0);
        while c != b {
            let mut best: Option<(f64, PointId)> = None;
            for v in store.neighbours_of(c) {
                let pv = store.planar(v)?;
                if edge_side(&pa, &pb, &pv).abs() > snap {
                    continue;
                }
                let t = project_param_2d(&pv, &pa, &pb);
                if t <= tc + eps_t || t > 1.0 + eps_t {
                    continue;
                }
                if best.map_or(true, |(bt, _)| t < bt) {
                    best = Some((t, v));
                }
            }
            let Some((t, v)) = best else {
                return Ok(None);
            };
            chain.push((if v == b { 1.0 } else { t }, v));
            c = v;
            tc = t;
        }
        Ok(Some(chain))
    }
}

fn follow(remap: &HashMap<PointId, PointId>, mut p: PointId) -> PointId {
    while let Some(&q) = remap.get(&p) {
        p = q;
    }
    p
}

fn work_items(seg: &RoadSegment) -> Vec<Work> {
    let mut items: Vec<Work> = CorridorSide::ALL.iter().map(|&s| Work::Border(s)).collect();
    if seg.shoulders != seg.borders {
        items.extend(Side::ALL.iter().map(|&s| Work::Shoulder(s)));
        for end in Endpoint::ALL {
            if seg.neighbour(end).is_none() {
                items.push(Work::ShoulderCap(end));
            }
        }
    }
    items
}

fn line_of(seg: &RoadSegment, work: Work) -> [PointId; 2] {
    match work {
        Work::Border(side) => seg.corridor_line(side),
        Work::Shoulder(side) => seg.shoulders[side.index()],
        Work::ShoulderCap(end) => [
            seg.shoulder(Side::Right, end),
            seg.shoulder(Side::Left, end),
        ],
    }
}

/// Counter-clockwise carriageway boundary: right border, end cap, left border
/// backwards, start cap backwards.
fn carriageway_ring(chains: &[Vec<(f64, PointId)>; 4]) -> Vec<PointId> {
    let ids = |side: CorridorSide| chains[side.index()].iter().map(|&(_, p)| p);
    let mut ring: Vec<PointId> = ids(CorridorSide::Right).collect();
    ring.extend(ids(CorridorSide::End).skip(1));
    ring.extend(ids(CorridorSide::Left).rev().skip(1));
    ring.extend(ids(CorridorSide::Start).rev().skip(1));
    ring.pop();
    ring
}
