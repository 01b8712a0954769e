pub mod point;
pub mod segment;
pub mod triangle;

pub use point::PointId;
pub use segment::{Intersection, Segment};
pub use triangle::{TriangleData, TriangleId};

use std::collections::HashMap;

use crate::error::TopologyError;
use crate::math::polygon_2d::edge_side;
use crate::math::{ground, orient_2d, Point2, Point3};
use slotmap::SlotMap;

/// Where a planar query point falls in the triangulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// On (within the snap tolerance of) an existing point.
    Vertex(PointId),
    /// On the interior of the directed edge `(a, b)`.
    Edge(PointId, PointId),
    /// Strictly inside a triangle.
    Face(TriangleId),
}

/// Central arena that owns all points and terrain triangles.
///
/// Points are append-only and addressed by [`PointId`]; triangles live in a
/// slot map so the corridor cutter can remove them without invalidating other
/// ids. Every directed edge maps to the triangle on its left.
#[derive(Debug, Default)]
pub struct TopologyStore {
    points: Vec<Point3>,
    triangles: SlotMap<TriangleId, TriangleData>,
    edges: HashMap<(PointId, PointId), TriangleId>,
    incident: HashMap<PointId, Vec<TriangleId>>,
}

impl TopologyStore {
    /// Creates a new, empty topology store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Point operations ---

    /// Appends a point and returns its ID.
    pub fn add_point(&mut self, point: Point3) -> PointId {
        self.points.push(point);
        PointId(self.points.len() - 1)
    }

    /// Returns the position of a point, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the point is not in the store.
    pub fn point(&self, id: PointId) -> Result<&Point3, TopologyError> {
        self.points
            .get(id.0)
            .ok_or(TopologyError::PointNotFound(id))
    }

    /// Returns the ground-plane (XZ) position of a point.
    ///
    /// # Errors
    ///
    /// Returns an error if the point is not in the store.
    pub fn planar(&self, id: PointId) -> Result<Point2, TopologyError> {
        self.point(id).map(ground)
    }

    /// Overwrites the height of a point.
    ///
    /// # Errors
    ///
    /// Returns an error if the point is not in the store.
    pub fn set_height(&mut self, id: PointId, y: f64) -> Result<(), TopologyError> {
        let p = self
            .points
            .get_mut(id.0)
            .ok_or(TopologyError::PointNotFound(id))?;
        p.y = y;
        Ok(())
    }

    /// Number of points in the arena.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    // --- Triangle operations ---

    /// Inserts a triangle and returns its ID.
    ///
    /// Clockwise input is reordered so the stored winding is counter-clockwise
    /// in XZ.
    ///
    /// # Errors
    ///
    /// Returns an error if a corner is missing, corners repeat, or one of the
    /// directed edges already has a triangle on its left.
    pub fn add_triangle(&mut self, vertices: [PointId; 3]) -> Result<TriangleId, TopologyError> {
        let [a, b, c] = vertices;
        if a == b || b == c || c == a {
            return Err(TopologyError::InvalidTopology(format!(
                "triangle with repeated corner {a} {b} {c}"
            )));
        }
        let (pa, pb, pc) = (self.planar(a)?, self.planar(b)?, self.planar(c)?);
        let data = if orient_2d(&pa, &pb, &pc) < 0.0 {
            TriangleData::new([a, c, b])
        } else {
            TriangleData::new(vertices)
        };

        for edge in data.edges() {
            if self.edges.contains_key(&edge) {
                return Err(TopologyError::InvalidTopology(format!(
                    "edge {}-{} already used",
                    edge.0, edge.1
                )));
            }
        }

        let id = self.triangles.insert(data);
        for edge in data.edges() {
            self.edges.insert(edge, id);
        }
        for v in data.vertices {
            self.incident.entry(v).or_default().push(id);
        }
        Ok(id)
    }

    /// Removes a triangle, returning its data.
    ///
    /// # Errors
    ///
    /// Returns an error if the triangle is not in the store.
    pub fn remove_triangle(&mut self, id: TriangleId) -> Result<TriangleData, TopologyError> {
        let data = self
            .triangles
            .remove(id)
            .ok_or_else(|| TopologyError::EntityNotFound("triangle".into()))?;
        for edge in data.edges() {
            self.edges.remove(&edge);
        }
        for v in data.vertices {
            if let Some(list) = self.incident.get_mut(&v) {
                list.retain(|&t| t != id);
            }
        }
        Ok(data)
    }

    /// Returns a reference to the triangle data, or an error if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the triangle is not in the store.
    pub fn triangle(&self, id: TriangleId) -> Result<&TriangleData, TopologyError> {
        self.triangles
            .get(id)
            .ok_or_else(|| TopologyError::EntityNotFound("triangle".into()))
    }

    /// Resolves three corners to their planar positions.
    ///
    /// # Errors
    ///
    /// Returns an error if a corner is not in the store.
    pub fn corners(&self, vertices: [PointId; 3]) -> Result<[Point2; 3], TopologyError> {
        Ok([
            self.planar(vertices[0])?,
            self.planar(vertices[1])?,
            self.planar(vertices[2])?,
        ])
    }

    /// Iterates over every live triangle.
    pub fn triangles(&self) -> impl Iterator<Item = (TriangleId, &TriangleData)> {
        self.triangles.iter()
    }

    /// Number of live triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// The triangle lying to the left of the directed edge `a -> b`.
    #[must_use]
    pub fn triangle_left_of(&self, a: PointId, b: PointId) -> Option<TriangleId> {
        self.edges.get(&(a, b)).copied()
    }

    /// Returns `true` if `a`-`b` is an edge of some triangle, in either direction.
    #[must_use]
    pub fn has_edge(&self, a: PointId, b: PointId) -> bool {
        self.edges.contains_key(&(a, b)) || self.edges.contains_key(&(b, a))
    }

    /// The triangles that have `p` as a corner.
    #[must_use]
    pub fn triangles_around(&self, p: PointId) -> &[TriangleId] {
        self.incident.get(&p).map_or(&[], Vec::as_slice)
    }

    /// The distinct points joined to `p` by a triangle edge, sorted.
    #[must_use]
    pub fn neighbours_of(&self, p: PointId) -> Vec<PointId> {
        let mut out: Vec<PointId> = self
            .triangles_around(p)
            .iter()
            .filter_map(|&t| self.triangles.get(t))
            .flat_map(|data| data.vertices)
            .filter(|&v| v != p)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Finds where the planar point `q` lies.
    ///
    /// Points within `snap` of a corner resolve to that corner, points within
    /// `snap` of an edge resolve to the edge. Returns `None` outside the mesh.
    #[must_use]
    pub fn locate(&self, q: &Point2, snap: f64) -> Option<Location> {
        for (id, data) in &self.triangles {
            let Ok(corners) = self.corners(data.vertices) else {
                continue;
            };
            let sides = [
                edge_side(&corners[0], &corners[1], q),
                edge_side(&corners[1], &corners[2], q),
                edge_side(&corners[2], &corners[0], q),
            ];
            if sides.iter().any(|&s| s < -snap) {
                continue;
            }
            for (v, pos) in data.vertices.iter().zip(&corners) {
                if (pos - q).norm() <= snap {
                    return Some(Location::Vertex(*v));
                }
            }
            for ((x, y), side) in data.edges().into_iter().zip(sides) {
                if side <= snap {
                    return Some(Location::Edge(x, y));
                }
            }
            return Some(Location::Face(id));
        }
        None
    }

    /// Inserts `p` on the edge `a`-`b`, splitting the triangles on both sides.
    ///
    /// # Errors
    ///
    /// Returns an error if no triangle uses the edge.
    pub fn split_edge(
        &mut self,
        a: PointId,
        b: PointId,
        p: PointId,
    ) -> Result<Vec<TriangleId>, TopologyError> {
        let mut created = Vec::with_capacity(4);
        let mut found = false;
        for (x, y) in [(a, b), (b, a)] {
            let Some(t) = self.triangle_left_of(x, y) else {
                continue;
            };
            found = true;
            let data = self.remove_triangle(t)?;
            let w = data
                .opposite(x, y)
                .ok_or_else(|| TopologyError::InvalidTopology("triangle without apex".into()))?;
            created.push(self.add_triangle([x, p, w])?);
            created.push(self.add_triangle([p, y, w])?);
        }
        if found {
            Ok(created)
        } else {
            Err(TopologyError::InvalidTopology(format!(
                "no triangle on edge {a}-{b}"
            )))
        }
    }

    /// Inserts `p` inside triangle `t`, replacing it with three triangles.
    ///
    /// # Errors
    ///
    /// Returns an error if the triangle is not in the store.
    pub fn split_triangle(
        &mut self,
        t: TriangleId,
        p: PointId,
    ) -> Result<[TriangleId; 3], TopologyError> {
        let [a, b, c] = self.remove_triangle(t)?.vertices;
        Ok([
            self.add_triangle([a, b, p])?,
            self.add_triangle([b, c, p])?,
            self.add_triangle([c, a, p])?,
        ])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn square(store: &mut TopologyStore) -> [PointId; 4] {
        let a = store.add_point(Point3::new(0.0, 0.0, 0.0));
        let b = store.add_point(Point3::new(1.0, 0.0, 0.0));
        let c = store.add_point(Point3::new(1.0, 0.0, 1.0));
        let d = store.add_point(Point3::new(0.0, 0.0, 1.0));
        store.add_triangle([a, b, c]).unwrap();
        store.add_triangle([a, c, d]).unwrap();
        [a, b, c, d]
    }

    #[test]
    fn add_and_query_points() {
        let mut store = TopologyStore::new();
        let id = store.add_point(Point3::new(1.0, 2.0, 3.0));
        assert_eq!(store.point(id).unwrap().y, 2.0);
        store.set_height(id, 5.0).unwrap();
        assert_eq!(store.point(id).unwrap().y, 5.0);
        assert!(store.point(PointId(7)).is_err());
    }

    #[test]
    fn clockwise_triangle_is_reordered() {
        let mut store = TopologyStore::new();
        let a = store.add_point(Point3::new(0.0, 0.0, 0.0));
        let b = store.add_point(Point3::new(0.0, 0.0, 1.0));
        let c = store.add_point(Point3::new(1.0, 0.0, 0.0));
        let t = store.add_triangle([a, b, c]).unwrap();
        assert_eq!(store.triangle(t).unwrap().vertices, [a, c, b]);
        assert_eq!(store.triangle_left_of(a, c), Some(t));
    }

    #[test]
    fn duplicate_directed_edge_is_rejected() {
        let mut store = TopologyStore::new();
        let [a, b, c, _] = square(&mut store);
        let e = store.add_point(Point3::new(0.5, 0.0, 0.2));
        assert!(store.add_triangle([a, b, e]).is_err());
        assert!(store.has_edge(c, a));
    }

    #[test]
    fn adjacency_queries() {
        let mut store = TopologyStore::new();
        let [a, b, c, d] = square(&mut store);
        assert_eq!(store.triangles_around(a).len(), 2);
        assert_eq!(store.neighbours_of(a), vec![b, c, d]);
        assert_eq!(store.neighbours_of(b), vec![a, c]);
    }

    #[test]
    fn locate_resolves_vertex_edge_face() {
        let mut store = TopologyStore::new();
        let [a, _, c, _] = square(&mut store);
        assert_eq!(
            store.locate(&Point2::new(0.0, 1e-9), 1e-6),
            Some(Location::Vertex(a))
        );
        match store.locate(&Point2::new(0.5, 0.5), 1e-6) {
            Some(Location::Edge(x, y)) => assert!((x, y) == (a, c) || (x, y) == (c, a)),
            other => panic!("expected diagonal, got {other:?}"),
        }
        assert!(matches!(
            store.locate(&Point2::new(0.8, 0.1), 1e-6),
            Some(Location::Face(_))
        ));
        assert_eq!(store.locate(&Point2::new(2.0, 0.5), 1e-6), None);
    }

    #[test]
    fn split_shared_edge_creates_four_triangles() {
        let mut store = TopologyStore::new();
        let [a, _, c, _] = square(&mut store);
        let m = store.add_point(Point3::new(0.5, 0.0, 0.5));
        let created = store.split_edge(a, c, m).unwrap();
        assert_eq!(created.len(), 4);
        assert_eq!(store.triangle_count(), 4);
        assert!(!store.has_edge(a, c));
        assert!(store.has_edge(a, m) && store.has_edge(m, c));
        assert_eq!(store.neighbours_of(m).len(), 4);
    }

    #[test]
    fn split_triangle_fans_from_new_point() {
        let mut store = TopologyStore::new();
        let [a, b, c, _] = square(&mut store);
        let t = store.triangle_left_of(a, b).unwrap();
        let p = store.add_point(Point3::new(0.7, 0.0, 0.3));
        store.split_triangle(t, p).unwrap();
        assert_eq!(store.triangle_count(), 4);
        for v in [a, b, c] {
            assert!(store.has_edge(v, p));
        }
    }
}
