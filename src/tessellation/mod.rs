//! Render-ready triangle meshes built from the arena.

mod export_road;
mod export_terrain;

pub use export_road::ExportRoad;
pub use export_terrain::ExportTerrain;

use crate::error::{OperationError, Result};
use crate::math::{Point2, Point3, Vector3};

/// An indexed triangle mesh. Triangles wind counter-clockwise seen from +Y.
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    /// Vertex positions.
    pub vertices: Vec<Point3>,
    /// Vertex normals.
    pub normals: Vec<Vector3>,
    /// UV coordinates.
    pub uvs: Vec<Point2>,
    /// Per-vertex material blend weight.
    pub blend: Vec<f64>,
    /// Triangle indices (each triple defines a triangle).
    pub indices: Vec<[u32; 3]>,
}

impl TriangleMesh {
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Appends a vertex with a placeholder normal and returns its index.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::Failed` once the mesh outgrows `u32` indices.
    pub fn push_vertex(&mut self, position: Point3, uv: Point2, blend: f64) -> Result<u32> {
        let index = u32::try_from(self.vertices.len())
            .map_err(|_| OperationError::Failed("mesh exceeds u32 indices".into()))?;
        self.vertices.push(position);
        self.normals.push(Vector3::y());
        self.uvs.push(uv);
        self.blend.push(blend);
        Ok(index)
    }

    /// Appends a triangle that is counter-clockwise in the ground plane.
    ///
    /// Ground-plane orientation maps `z` to the second axis, which faces `-Y`,
    /// so the winding is reversed.
    pub fn push_ground_triangle(&mut self, [a, b, c]: [u32; 3]) {
        self.indices.push([a, c, b]);
    }

    /// Geometric normal of triangle `k`, scaled by twice its area.
    #[must_use]
    pub fn face_normal(&self, k: usize) -> Vector3 {
        let [a, b, c] = self.indices[k].map(|i| self.vertices[i as usize]);
        (b - a).cross(&(c - a))
    }

    /// Replaces every vertex normal with the area-weighted mean of its faces.
    pub fn compute_normals(&mut self) {
        let mut sums = vec![Vector3::zeros(); self.vertices.len()];
        for k in 0..self.indices.len() {
            let n = self.face_normal(k);
            for i in self.indices[k] {
                sums[i as usize] += n;
            }
        }
        self.normals = sums
            .into_iter()
            .map(|n| n.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::y))
            .collect();
    }

    /// Total surface area.
    #[must_use]
    pub fn area(&self) -> f64 {
        (0..self.indices.len())
            .map(|k| 0.5 * self.face_normal(k).norm())
            .sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn ground_triangles_face_up() {
        let mut mesh = TriangleMesh::default();
        let uv = Point2::origin();
        let a = mesh.push_vertex(Point3::new(0.0, 0.0, 0.0), uv, 0.0).unwrap();
        let b = mesh.push_vertex(Point3::new(1.0, 0.0, 0.0), uv, 0.0).unwrap();
        let c = mesh.push_vertex(Point3::new(0.0, 0.0, 1.0), uv, 0.0).unwrap();
        mesh.push_ground_triangle([a, b, c]);
        mesh.compute_normals();
        assert!(mesh.face_normal(0).y > 0.0);
        assert_abs_diff_eq!(mesh.normals[0], Vector3::y());
        assert_abs_diff_eq!(mesh.area(), 0.5);
        assert_eq!(mesh.triangle_count(), 1);
    }
}
