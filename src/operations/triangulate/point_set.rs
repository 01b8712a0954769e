use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::error::{DegeneracyKind, Result, TriangulationError};
use crate::math::intersect_2d::{circumcenter_2d, project_param_2d};
use crate::math::polygon_2d::edge_side;
use crate::math::{left_normal, unit, Point2, TOLERANCE};
use crate::topology::{PointId, TopologyStore, TriangleId};

/// Relative tolerance used for duplicate, collinearity and co-circularity tests.
const REL_EPS: f64 = 1e-9;

/// Triangulates an unordered point set with the empty-circumcircle criterion.
///
/// # Algorithm
///
/// 1. Sort by X then Z and reject duplicates.
/// 2. Build the convex hull with a monotone chain; hull edges (including any
///    collinear points lying on them) seed the active edge list.
/// 3. Pop the most recent active edge. Among points on its open side, take the
///    one whose circumcircle centre lies closest along the edge normal. Points
///    on the same circle are fanned in angular order.
/// 4. Toggle the new edges in the active edge list: an edge seen a second time
///    has both sides covered and is dropped.
///
/// Output triangles are counter-clockwise in XZ.
#[derive(Debug)]
pub struct TriangulatePoints {
    points: Vec<PointId>,
}

impl TriangulatePoints {
    /// Creates a new triangulation over the given points.
    #[must_use]
    pub fn new(points: Vec<PointId>) -> Self {
        Self { points }
    }

    /// Computes the triangles without touching the store.
    ///
    /// # Errors
    ///
    /// - `TriangulationError::Degenerate` for fewer than three points, coincident
    ///   points, or an all-collinear set
    /// - `TriangulationError::Failed` if the frontier does not close
    pub fn compute(&self, store: &TopologyStore) -> Result<Vec<[PointId; 3]>> {
        if self.points.len() < 3 {
            return Err(TriangulationError::Degenerate(DegeneracyKind::TooFewPoints).into());
        }

        let mut sites = Vec::with_capacity(self.points.len());
        for &id in &self.points {
            sites.push(Site {
                id,
                pos: store.planar(id)?,
            });
        }
        sites.sort_by(|a, b| cmp_xy(&a.pos, &b.pos));

        let scale = extent(&sites);
        let eps = REL_EPS * scale;
        check_duplicates(&sites, eps)?;

        let boundary = hull_with_collinear(&sites, eps)?;
        let triangles = Frontier::new(&sites, eps, scale).run(&boundary)?;

        tracing::debug!(
            points = sites.len(),
            triangles = triangles.len(),
            "triangulated point set"
        );
        Ok(triangles)
    }

    /// Computes the triangulation and adds every triangle to the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the triangulation fails or a triangle cannot be stored.
    pub fn execute(&self, store: &mut TopologyStore) -> Result<Vec<TriangleId>> {
        let triangles = self.compute(store)?;
        let mut ids = Vec::with_capacity(triangles.len());
        for tri in triangles {
            ids.push(store.add_triangle(tri)?);
        }
        Ok(ids)
    }
}

#[derive(Debug, Clone, Copy)]
struct Site {
    id: PointId,
    pos: Point2,
}

fn cmp_xy(a: &Point2, b: &Point2) -> Ordering {
    a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y))
}

fn extent(sites: &[Site]) -> f64 {
    let (mut min, mut max) = (sites[0].pos, sites[0].pos);
    for s in sites {
        min = min.inf(&s.pos);
        max = max.sup(&s.pos);
    }
    (max - min).amax().max(TOLERANCE)
}

/// Sites are sorted by X, so coincident pairs sit inside a narrow X window.
fn check_duplicates(sites: &[Site], eps: f64) -> Result<()> {
    for (i, a) in sites.iter().enumerate() {
        for b in &sites[i + 1..] {
            if b.pos.x - a.pos.x > eps {
                break;
            }
            if (b.pos - a.pos).norm() <= eps {
                return Err(TriangulationError::Degenerate(DegeneracyKind::DuplicatePoint).into());
            }
        }
    }
    Ok(())
}

/// Counter-clockwise hull as site indices, with points lying on hull edges
/// spliced in so every boundary edge is a real triangle edge.
fn hull_with_collinear(sites: &[Site], eps: f64) -> Result<Vec<usize>> {
    let mut lower: Vec<usize> = Vec::new();
    for i in 0..sites.len() {
        while lower.len() >= 2
            && edge_side(
                &sites[lower[lower.len() - 2]].pos,
                &sites[lower[lower.len() - 1]].pos,
                &sites[i].pos,
            ) <= eps
        {
            lower.pop();
        }
        lower.push(i);
    }
    let mut upper: Vec<usize> = Vec::new();
    for i in (0..sites.len()).rev() {
        while upper.len() >= 2
            && edge_side(
                &sites[upper[upper.len() - 2]].pos,
                &sites[upper[upper.len() - 1]].pos,
                &sites[i].pos,
            ) <= eps
        {
            upper.pop();
        }
        upper.push(i);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    let hull = lower;
    if hull.len() < 3 {
        return Err(TriangulationError::Degenerate(DegeneracyKind::Collinear).into());
    }

    let on_hull: HashSet<usize> = hull.iter().copied().collect();
    let mut boundary = Vec::with_capacity(hull.len());
    for k in 0..hull.len() {
        let a = hull[k];
        let b = hull[(k + 1) % hull.len()];
        boundary.push(a);
        let (pa, pb) = (&sites[a].pos, &sites[b].pos);
        let mut between: Vec<(f64, usize)> = (0..sites.len())
            .filter(|i| !on_hull.contains(i))
            .filter_map(|i| {
                let p = &sites[i].pos;
                let t = project_param_2d(p, pa, pb);
                (edge_side(pa, pb, p).abs() <= eps && t > 0.0 && t < 1.0).then_some((t, i))
            })
            .collect();
        between.sort_by(|x, y| x.0.total_cmp(&y.0));
        boundary.extend(between.into_iter().map(|(_, i)| i));
    }
    Ok(boundary)
}

/// The active edge list: the frontier between covered and open regions.
///
/// Keyed by the unordered endpoint pair; the value is the direction whose left
/// side is still open. A LIFO stack gives "most recent first" order and is
/// cleaned lazily.
struct Frontier<'a> {
    sites: &'a [Site],
    eps: f64,
    scale: f64,
    active: BTreeMap<(usize, usize), (usize, usize)>,
    stack: Vec<(usize, usize)>,
    out: Vec<[PointId; 3]>,
}

impl<'a> Frontier<'a> {
    fn new(sites: &'a [Site], eps: f64, scale: f64) -> Self {
        Self {
            sites,
            eps,
            scale,
            active: BTreeMap::new(),
            stack: Vec::new(),
            out: Vec::new(),
        }
    }

    fn run(mut self, boundary: &[usize]) -> Result<Vec<[PointId; 3]>> {
        for k in 0..boundary.len() {
            let edge = (boundary[k], boundary[(k + 1) % boundary.len()]);
            self.active.insert(key(edge), edge);
            self.stack.push(edge);
        }

        let limit = 16 * self.sites.len() + 64;
        let mut steps = 0;
        while let Some(edge) = self.stack.pop() {
            if self.active.get(&key(edge)) != Some(&edge) {
                continue;
            }
            steps += 1;
            if steps > limit {
                return Err(
                    TriangulationError::Failed("active edge list did not drain".into()).into(),
                );
            }
            self.active.remove(&key(edge));
            self.close(edge)?;
        }

        if !self.active.is_empty() {
            return Err(TriangulationError::Failed(format!(
                "{} frontier edges left open",
                self.active.len()
            ))
            .into());
        }
        Ok(self.out)
    }

    /// Emits the triangle(s) on the open side of `(a, b)`.
    fn close(&mut self, (a, b): (usize, usize)) -> Result<()> {
        let pa = self.sites[a].pos;
        let pb = self.sites[b].pos;
        let Some(dir) = unit(&(pb - pa)) else {
            return Err(TriangulationError::Failed("zero-length frontier edge".into()).into());
        };
        let normal = left_normal(&dir);
        let mid = Point2::from((pa.coords + pb.coords) * 0.5);

        let mut best: Option<(f64, usize, Point2)> = None;
        for (i, s) in self.sites.iter().enumerate() {
            if i == a || i == b || edge_side(&pa, &pb, &s.pos) <= self.eps {
                continue;
            }
            let Some(center) = circumcenter_2d(&pa, &pb, &s.pos) else {
                continue;
            };
            let offset = (center - mid).dot(&normal);
            if best.map_or(true, |(o, _, _)| offset < o) {
                best = Some((offset, i, center));
            }
        }
        let Some((_, apex, center)) = best else {
            return Err(TriangulationError::Failed(
                "frontier edge has no point on its open side".into(),
            )
            .into());
        };

        // Every other point on the same circle joins the fan.
        let radius = (pa - center).norm();
        let tol = REL_EPS * radius.max(self.scale);
        let start = pb - center;
        let mut ring: Vec<(f64, usize)> = self
            .sites
            .iter()
            .enumerate()
            .filter(|&(i, s)| {
                i != a
                    && i != b
                    && edge_side(&pa, &pb, &s.pos) > self.eps
                    && ((s.pos - center).norm() - radius).abs() <= tol
            })
            .map(|(i, s)| {
                let v = s.pos - center;
                let ang = (start.x * v.y - start.y * v.x).atan2(start.dot(&v));
                (ang.rem_euclid(std::f64::consts::TAU), i)
            })
            .collect();
        if ring.is_empty() {
            ring.push((0.0, apex));
        }
        ring.sort_by(|x, y| x.0.total_cmp(&y.0));

        let mut prev = b;
        for (k, &(_, q)) in ring.iter().enumerate() {
            self.emit([a, prev, q], k == 0);
            prev = q;
        }
        Ok(())
    }

    fn emit(&mut self, [a, b, c]: [usize; 3], base_consumed: bool) {
        self.out
            .push([self.sites[a].id, self.sites[b].id, self.sites[c].id]);
        if !base_consumed {
            self.toggle((a, b));
        }
        self.toggle((b, c));
        self.toggle((c, a));
    }

    /// `(x, y)` is an edge of a new triangle, which lies on its left.
    fn toggle(&mut self, (x, y): (usize, usize)) {
        let k = key((x, y));
        if self.active.remove(&k).is_none() {
            self.active.insert(k, (y, x));
            self.stack.push((y, x));
        }
    }
}

fn key((a, b): (usize, usize)) -> (usize, usize) {
    (a.min(b), a.max(b))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use spade::{DelaunayTriangulation, Triangulation};

    use super::*;
    use crate::math::polygon_2d::{
        point_strictly_in_triangle_2d, triangle_area_2d, triangle_centroid_2d,
    };
    use crate::math::{orient_2d, Point3};

    fn add_all(store: &mut TopologyStore, pts: &[(f64, f64)]) -> Vec<PointId> {
        pts.iter()
            .map(|&(x, z)| store.add_point(Point3::new(x, 0.0, z)))
            .collect()
    }

    fn assert_valid(store: &TopologyStore, ids: &[PointId], tris: &[[PointId; 3]]) {
        let used: HashSet<PointId> = tris.iter().flatten().copied().collect();
        for id in ids {
            assert!(used.contains(id), "point {id} unused");
        }
        let corners: Vec<[Point2; 3]> = tris.iter().map(|t| store.corners(*t).unwrap()).collect();
        for c in &corners {
            assert!(orient_2d(&c[0], &c[1], &c[2]) > 0.0, "not ccw / collinear");
        }
        for (i, ci) in corners.iter().enumerate() {
            let g = triangle_centroid_2d(&ci[0], &ci[1], &ci[2]);
            for (j, cj) in corners.iter().enumerate() {
                if i != j {
                    assert!(!point_strictly_in_triangle_2d(&g, &cj[0], &cj[1], &cj[2], 1e-9));
                }
            }
        }
    }

    #[test]
    fn unit_square_gives_two_triangles_of_total_area_one() {
        let mut store = TopologyStore::new();
        let ids = add_all(&mut store, &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        let tris = TriangulatePoints::new(ids.clone()).compute(&store).unwrap();
        assert_eq!(tris.len(), 2);
        let area: f64 = tris
            .iter()
            .map(|t| {
                let c = store.corners(*t).unwrap();
                triangle_area_2d(&c[0], &c[1], &c[2])
            })
            .sum();
        assert_abs_diff_eq!(area, 1.0, epsilon = 1e-12);
        assert_valid(&store, &ids, &tris);
    }

    #[test]
    fn regular_grid_uses_every_point_without_overlap() {
        let mut store = TopologyStore::new();
        let pts: Vec<(f64, f64)> = (0..6)
            .flat_map(|i| (0..5).map(move |j| (f64::from(i), f64::from(j))))
            .collect();
        let ids = add_all(&mut store, &pts);
        let tris = TriangulatePoints::new(ids.clone()).compute(&store).unwrap();
        // 5 x 4 cells, two triangles each.
        assert_eq!(tris.len(), 40);
        assert_valid(&store, &ids, &tris);
    }

    #[test]
    fn collinear_hull_points_are_kept_on_the_boundary() {
        let mut store = TopologyStore::new();
        let ids = add_all(
            &mut store,
            &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0), (1.5, 2.0)],
        );
        let tris = TriangulatePoints::new(ids.clone()).compute(&store).unwrap();
        assert_eq!(tris.len(), 3);
        assert_valid(&store, &ids, &tris);
    }

    #[test]
    fn matches_independent_delaunay_on_random_points() {
        let mut rng = StdRng::seed_from_u64(7);
        let pts: Vec<(f64, f64)> = (0..120)
            .map(|_| (rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)))
            .collect();
        let mut store = TopologyStore::new();
        let ids = add_all(&mut store, &pts);
        let tris = TriangulatePoints::new(ids.clone()).compute(&store).unwrap();
        assert_valid(&store, &ids, &tris);

        let mut oracle = DelaunayTriangulation::<spade::Point2<f64>>::new();
        for &(x, z) in &pts {
            oracle.insert(spade::Point2::new(x, z)).unwrap();
        }
        let expected: HashSet<[usize; 3]> = oracle
            .inner_faces()
            .map(|f| {
                let mut v = f.vertices().map(|h| h.fix().index());
                v.sort_unstable();
                v
            })
            .collect();
        let actual: HashSet<[usize; 3]> = tris
            .iter()
            .map(|t| {
                let mut v = t.map(PointId::index);
                v.sort_unstable();
                v
            })
            .collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn degenerate_inputs_are_typed() {
        let mut store = TopologyStore::new();
        let two = add_all(&mut store, &[(0.0, 0.0), (1.0, 0.0)]);
        let err = TriangulatePoints::new(two).compute(&store).unwrap_err();
        assert_eq!(err.degeneracy(), Some(DegeneracyKind::TooFewPoints));

        let line = add_all(&mut store, &[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        let err = TriangulatePoints::new(line).compute(&store).unwrap_err();
        assert_eq!(err.degeneracy(), Some(DegeneracyKind::Collinear));

        let dup = add_all(&mut store, &[(0.0, 0.0), (1.0, 0.0), (0.0, 0.0), (0.0, 1.0)]);
        let err = TriangulatePoints::new(dup).compute(&store).unwrap_err();
        assert_eq!(err.degeneracy(), Some(DegeneracyKind::DuplicatePoint));
    }

    #[test]
    fn execute_stores_a_consistent_mesh() {
        let mut store = TopologyStore::new();
        let ids = add_all(
            &mut store,
            &[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (1.3, 2.1)],
        );
        let created = TriangulatePoints::new(ids.clone()).execute(&mut store).unwrap();
        assert_eq!(created.len(), 4);
        assert_eq!(store.neighbours_of(ids[4]).len(), 4);
    }
}
