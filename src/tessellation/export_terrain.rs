use std::collections::HashMap;

use super::TriangleMesh;
use crate::error::{OperationError, Result};
use crate::math::intersect_2d::distance_to_line_2d;
use crate::math::polygon_2d::point_in_polygon_2d;
use crate::math::{ground, Point2};
use crate::operations::road::{RoadParams, RoadSegment};
use crate::topology::{PointId, TopologyStore};

/// Corridor hexagon plus the centreline it was offset from.
struct Corridor {
    hexagon: [Point2; 6],
    start: Point2,
    end: Point2,
}

/// Exports the live terrain triangles as a render mesh.
///
/// UVs are world `x, z` divided by the terrain extent. The blend weight fades
/// from 1 on the road border to 0 on the shoulder line, so the shader can mix
/// the ground and verge materials.
#[derive(Debug)]
pub struct ExportTerrain {
    extent: f64,
    params: RoadParams,
}

impl ExportTerrain {
    /// Creates a new terrain export.
    #[must_use]
    pub fn new(extent: f64, params: RoadParams) -> Self {
        Self { extent, params }
    }

    /// Builds the mesh from every triangle remaining in `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the extent is not positive, a segment refers to a
    /// missing point, or the mesh outgrows `u32` indices.
    pub fn execute(&self, store: &TopologyStore, segments: &[RoadSegment]) -> Result<TriangleMesh> {
        if self.extent.is_nan() || self.extent <= 0.0 {
            return Err(
                OperationError::InvalidInput("terrain extent must be positive".into()).into(),
            );
        }
        let corridors = segments
            .iter()
            .map(|s| {
                Ok(Corridor {
                    hexagon: s.corridor(store)?,
                    start: store.planar(s.ends[0])?,
                    end: store.planar(s.ends[1])?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut mesh = TriangleMesh::default();
        let mut index: HashMap<PointId, u32> = HashMap::new();
        for (_, tri) in store.triangles() {
            let mut face = [0u32; 3];
            for (slot, &p) in face.iter_mut().zip(&tri.vertices) {
                *slot = match index.get(&p) {
                    Some(&i) => i,
                    None => {
                        let pos = *store.point(p)?;
                        let q = ground(&pos);
                        let uv = Point2::new(q.x / self.extent, q.y / self.extent);
                        let i = mesh.push_vertex(pos, uv, self.shoulder_weight(&q, &corridors))?;
                        index.insert(p, i);
                        i
                    }
                };
            }
            mesh.push_ground_triangle(face);
        }
        mesh.compute_normals();

        tracing::debug!(
            vertices = mesh.vertex_count(),
            triangles = mesh.triangle_count(),
            "exported terrain mesh"
        );
        Ok(mesh)
    }

    /// Strongest road influence on a ground point across all corridors.
    fn shoulder_weight(&self, q: &Point2, corridors: &[Corridor]) -> f64 {
        let hw = self.params.half_width;
        let sw = self.params.shoulder_width;
        corridors
            .iter()
            .filter(|c| point_in_polygon_2d(q, &c.hexagon))
            .map(|c| {
                let d = distance_to_line_2d(q, &c.start, &c.end);
                if sw > 0.0 {
                    ((hw + sw - d) / sw).clamp(0.0, 1.0)
                } else if d <= hw {
                    1.0
                } else {
                    0.0
                }
            })
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::math::Point3;
    use crate::operations::road::BuildRoadNetwork;
    use crate::topology::Segment;

    fn flat(_: f64, _: f64) -> f64 {
        0.0
    }

    fn square(store: &mut TopologyStore, size: f64) {
        let ids = [(0.0, 0.0), (size, 0.0), (size, size), (0.0, size)]
            .map(|(x, z)| store.add_point(Point3::new(x, 0.5 * x, z)));
        store.add_triangle([ids[0], ids[1], ids[2]]).unwrap();
        store.add_triangle([ids[0], ids[2], ids[3]]).unwrap();
    }

    #[test]
    fn exports_compact_upward_mesh() {
        let mut store = TopologyStore::new();
        store.add_point(Point3::new(99.0, 0.0, 99.0));
        square(&mut store, 10.0);
        let mesh = ExportTerrain::new(10.0, RoadParams::default())
            .execute(&store, &[])
            .unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        for k in 0..mesh.triangle_count() {
            assert!(mesh.face_normal(k).y > 0.0);
        }
        let n = mesh.normals[0];
        assert_abs_diff_eq!(n.x, -0.5 / 1.25f64.sqrt(), epsilon = 1e-12);
        for (v, uv) in mesh.vertices.iter().zip(&mesh.uvs) {
            assert_abs_diff_eq!(uv.x, v.x / 10.0);
            assert_abs_diff_eq!(uv.y, v.z / 10.0);
        }
        assert!(mesh.blend.iter().all(|b| b.abs() < 1e-12));
    }

    #[test]
    fn blend_fades_across_the_shoulder() {
        let mut store = TopologyStore::new();
        let a = store.add_point(Point3::new(0.0, 0.0, 5.0));
        let b = store.add_point(Point3::new(10.0, 0.0, 5.0));
        let params = RoadParams {
            max_road_len: 100.0,
            ..RoadParams::default()
        };
        let net = BuildRoadNetwork::new(vec![Segment::new(a, b)], params)
            .execute(&mut store, &flat)
            .unwrap();
        let corridors: Vec<Corridor> = net
            .segments
            .iter()
            .map(|s| Corridor {
                hexagon: s.corridor(&store).unwrap(),
                start: store.planar(s.ends[0]).unwrap(),
                end: store.planar(s.ends[1]).unwrap(),
            })
            .collect();
        let export = ExportTerrain::new(10.0, params);
        let weight = |x: f64, z: f64| export.shoulder_weight(&Point2::new(x, z), &corridors);
        assert_abs_diff_eq!(weight(5.0, 5.0), 1.0);
        assert_abs_diff_eq!(weight(5.0, 8.0), 1.0);
        assert_abs_diff_eq!(weight(5.0, 8.75), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(weight(5.0, 1.25), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(weight(5.0, 12.0), 0.0);
        assert_abs_diff_eq!(weight(-3.0, 5.0), 0.0);
    }

    #[test]
    fn rejects_zero_extent() {
        let store = TopologyStore::new();
        assert!(ExportTerrain::new(0.0, RoadParams::default())
            .execute(&store, &[])
            .is_err());
    }
}
