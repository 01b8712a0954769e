use std::collections::HashMap;

use super::TriangleMesh;
use crate::error::{Result, TopologyError};
use crate::math::intersect_2d::project_param_2d;
use crate::math::polygon_2d::edge_side;
use crate::math::{ground, Point2};
use crate::operations::road::{RoadParams, RoadSegment, RoadTriangle};
use crate::topology::{PointId, TopologyStore};

/// Exports the road-surface triangles as a render mesh.
///
/// Vertices are not shared between segments so each keeps its own texture
/// coordinates. `u` runs across the carriageway from the right border (0) to
/// the left border (1); `v` interpolates the segment's propagated texture
/// coordinate along its centreline.
#[derive(Debug)]
pub struct ExportRoad {
    params: RoadParams,
}

impl ExportRoad {
    /// Creates a new road export.
    #[must_use]
    pub fn new(params: RoadParams) -> Self {
        Self { params }
    }

    /// Builds the mesh for the cut road triangles.
    ///
    /// # Errors
    ///
    /// Returns an error if a triangle refers to a missing segment or point, or
    /// the mesh outgrows `u32` indices.
    pub fn execute(
        &self,
        store: &TopologyStore,
        road: &[RoadTriangle],
        segments: &[RoadSegment],
    ) -> Result<TriangleMesh> {
        let hw = self.params.half_width;
        let mut mesh = TriangleMesh::default();
        let mut index: HashMap<(usize, PointId), u32> = HashMap::new();

        for tri in road {
            let seg = segments.get(tri.segment).ok_or_else(|| {
                TopologyError::EntityNotFound(format!("road segment {}", tri.segment))
            })?;
            let (start, end) = (store.planar(seg.ends[0])?, store.planar(seg.ends[1])?);

            let mut face = [0u32; 3];
            for (slot, &p) in face.iter_mut().zip(&tri.vertices) {
                if let Some(&i) = index.get(&(tri.segment, p)) {
                    *slot = i;
                    continue;
                }
                let pos = *store.point(p)?;
                let q = ground(&pos);
                let u = ((edge_side(&start, &end, &q) + hw) / (2.0 * hw)).clamp(0.0, 1.0);
                let t = project_param_2d(&q, &start, &end).clamp(0.0, 1.0);
                let v = seg.tex[0] + (seg.tex[1] - seg.tex[0]) * t;
                let i = mesh.push_vertex(pos, Point2::new(u, v), 1.0)?;
                index.insert((tri.segment, p), i);
                *slot = i;
            }
            mesh.push_ground_triangle(face);
        }
        mesh.compute_normals();

        tracing::debug!(
            vertices = mesh.vertex_count(),
            triangles = mesh.triangle_count(),
            "exported road mesh"
        );
        Ok(mesh)
    }
}
