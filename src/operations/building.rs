use std::collections::HashMap;

use rand::Rng;

use crate::error::{Degeneracy, DegeneracyKind, OperationError, Result};
use crate::math::polygon_2d::signed_area_2d;
use crate::math::{Point2, Point3, Vector3};
use crate::operations::triangulate::TriangulatePolygon;
use crate::terrain::HeightSampler;
use crate::tessellation::TriangleMesh;
use crate::topology::{PointId, TopologyStore};

/// Parameters of extruded buildings.
#[derive(Debug, Clone, Copy)]
pub struct BuildingParams {
    /// Height of one storey.
    pub floor_height: f64,
    pub min_floors: u32,
    pub max_floors: u32,
}

impl Default for BuildingParams {
    fn default() -> Self {
        Self {
            floor_height: 3.0,
            min_floors: 1,
            max_floors: 5,
        }
    }
}

impl BuildingParams {
    /// Checks the parameters for nonsensical values.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::InvalidInput` if the floor height is not
    /// positive or the floor range is empty.
    pub fn validate(&self) -> Result<()> {
        if self.floor_height.is_nan() || self.floor_height <= 0.0 {
            return Err(OperationError::InvalidInput("floor_height must be positive".into()).into());
        }
        if self.min_floors == 0 || self.min_floors > self.max_floors {
            return Err(OperationError::InvalidInput(format!(
                "floor range {}..={} is empty or starts at zero",
                self.min_floors, self.max_floors
            ))
            .into());
        }
        Ok(())
    }
}

/// Extrudes closed footprint loops into prism-shaped buildings.
///
/// # Algorithm
///
/// For each footprint:
/// 1. Triangulate the roof with the polygon triangulator. A footprint it
///    rejects is skipped and recorded.
/// 2. Sit the building on the lowest ground height sampled at its corners.
/// 3. Draw a storey count from `[min_floors, max_floors]`.
/// 4. Emit one outward-facing wall quad per footprint edge and the roof at
///    `base + floors * floor_height`, facing up.
#[derive(Debug)]
pub struct ExtrudeFootprints {
    footprints: Vec<Vec<PointId>>,
    params: BuildingParams,
}

impl ExtrudeFootprints {
    /// Creates a new extrusion over footprint loops in the ground plane.
    #[must_use]
    pub fn new(footprints: Vec<Vec<PointId>>, params: BuildingParams) -> Self {
        Self { footprints, params }
    }

    /// Builds one mesh holding every building, plus the skipped footprints.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid, a footprint refers to a
    /// missing point, or the mesh outgrows `u32` indices.
    pub fn execute<S, R>(
        &self,
        store: &TopologyStore,
        sampler: &S,
        rng: &mut R,
    ) -> Result<(TriangleMesh, Vec<Degeneracy>)>
    where
        S: HeightSampler + ?Sized,
        R: Rng + ?Sized,
    {
        self.params.validate()?;
        let mut mesh = TriangleMesh::default();
        let mut anomalies = Vec::new();

        for (k, footprint) in self.footprints.iter().enumerate() {
            let roof = match TriangulatePolygon::new(footprint.clone()).compute(store) {
                Ok(roof) => roof,
                Err(err) => match err.degeneracy() {
                    Some(kind) => {
                        anomalies.push(Degeneracy::new(kind, format!("footprint {k}")));
                        continue;
                    }
                    None => return Err(err),
                },
            };

            let mut ring = footprint.clone();
            if ring.len() > 1 && ring.first() == ring.last() {
                ring.pop();
            }
            let mut plan = ring
                .iter()
                .map(|&p| store.planar(p))
                .collect::<std::result::Result<Vec<Point2>, _>>()?;
            if signed_area_2d(&plan) < 0.0 {
                ring.reverse();
                plan.reverse();
            }

            let base = plan
                .iter()
                .map(|q| sampler.height(q.x, q.y))
                .fold(f64::INFINITY, f64::min);
            if !base.is_finite() {
                anomalies.push(Degeneracy::new(
                    DegeneracyKind::TooFewPoints,
                    format!("footprint {k} has no ground height"),
                ));
                continue;
            }
            let floors = rng.gen_range(self.params.min_floors..=self.params.max_floors);
            let top = base + f64::from(floors) * self.params.floor_height;

            self.walls(&mut mesh, &plan, base, top)?;

            let mut roof_index = HashMap::new();
            for (&p, q) in ring.iter().zip(&plan) {
                let i = mesh.push_vertex(Point3::new(q.x, top, q.y), *q, 0.0)?;
                roof_index.insert(p, i);
            }
            for tri in roof {
                let face = tri.map(|p| roof_index.get(&p).copied());
                if let [Some(a), Some(b), Some(c)] = face {
                    mesh.push_ground_triangle([a, b, c]);
                }
            }
            tracing::debug!(footprint = k, floors, base, top, "extruded building");
        }
        Ok((mesh, anomalies))
    }

    /// One quad per edge of the counter-clockwise `plan`, with flat outward normals.
    fn walls(&self, mesh: &mut TriangleMesh, plan: &[Point2], base: f64, top: f64) -> Result<()> {
        let storey = self.params.floor_height;
        let v_top = (top - base) / storey;
        let mut run = 0.0;
        for (i, p) in plan.iter().enumerate() {
            let q = &plan[(i + 1) % plan.len()];
            let d = q - p;
            let len = d.norm();
            let outward = Vector3::new(d.y, 0.0, -d.x)
                .try_normalize(f64::EPSILON)
                .unwrap_or_else(Vector3::zeros);
            let (u0, u1) = (run / storey, (run + len) / storey);
            run += len;

            let corners = [
                (Point3::new(p.x, base, p.y), Point2::new(u0, 0.0)),
                (Point3::new(q.x, base, q.y), Point2::new(u1, 0.0)),
                (Point3::new(q.x, top, q.y), Point2::new(u1, v_top)),
                (Point3::new(p.x, top, p.y), Point2::new(u0, v_top)),
            ];
            let mut ids = [0u32; 4];
            for (slot, (pos, uv)) in ids.iter_mut().zip(corners) {
                *slot = mesh.push_vertex(pos, uv, 0.0)?;
                mesh.normals[*slot as usize] = outward;
            }
            let [pb, qb, qt, pt] = ids;
            mesh.indices.push([pb, qt, qb]);
            mesh.indices.push([pb, pt, qt]);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn ring(store: &mut TopologyStore, pts: &[(f64, f64)]) -> Vec<PointId> {
        pts.iter()
            .map(|&(x, z)| store.add_point(Point3::new(x, 0.0, z)))
            .collect()
    }

    fn fixed(floors: u32) -> BuildingParams {
        BuildingParams {
            floor_height: 3.0,
            min_floors: floors,
            max_floors: floors,
        }
    }

    #[test]
    fn box_building_faces_outwards() {
        let mut store = TopologyStore::new();
        // Clockwise on purpose.
        let fp = ring(&mut store, &[(0.0, 0.0), (0.0, 4.0), (6.0, 4.0), (6.0, 0.0)]);
        let mut rng = StdRng::seed_from_u64(3);
        let sampler = |x: f64, _: f64| 2.0 + 0.5 * x;
        let (mesh, anomalies) = ExtrudeFootprints::new(vec![fp], fixed(3))
            .execute(&store, &sampler, &mut rng)
            .unwrap();
        assert!(anomalies.is_empty());
        assert_eq!(mesh.triangle_count(), 4 * 2 + 2);

        let centre = Point3::new(3.0, 0.0, 2.0);
        for k in 0..8 {
            let [a, b, c] = mesh.indices[k].map(|i| mesh.vertices[i as usize]);
            let mid = Point3::from((a.coords + b.coords + c.coords) / 3.0);
            let n = mesh.face_normal(k);
            let out = Vector3::new(mid.x - centre.x, 0.0, mid.z - centre.z);
            assert!(n.dot(&out) > 0.0, "wall {k} faces inwards");
            let vertex_normal = mesh.normals[mesh.indices[k][0] as usize];
            assert_abs_diff_eq!(vertex_normal.dot(&n.normalize()), 1.0, epsilon = 1e-12);
        }
        for k in 8..10 {
            assert!(mesh.face_normal(k).y > 0.0);
        }
        let top = mesh.vertices.iter().map(|v| v.y).fold(f64::MIN, f64::max);
        let bottom = mesh.vertices.iter().map(|v| v.y).fold(f64::MAX, f64::min);
        assert_abs_diff_eq!(bottom, 2.0);
        assert_abs_diff_eq!(top, 11.0);
        assert_abs_diff_eq!(mesh.area(), 24.0 + 20.0 * 9.0, epsilon = 1e-9);
    }

    #[test]
    fn floors_stay_in_range() {
        let mut store = TopologyStore::new();
        let params = BuildingParams::default();
        let footprints: Vec<Vec<PointId>> = (0..20)
            .map(|i| {
                let x = f64::from(i) * 10.0;
                ring(&mut store, &[(x, 0.0), (x + 5.0, 0.0), (x + 5.0, 5.0), (x, 5.0)])
            })
            .collect();
        let mut rng = StdRng::seed_from_u64(11);
        let (mesh, _) = ExtrudeFootprints::new(footprints, params)
            .execute(&store, &|_: f64, _: f64| 0.0, &mut rng)
            .unwrap();
        for v in &mesh.vertices {
            let floors = v.y / params.floor_height;
            assert!(floors <= f64::from(params.max_floors) + 1e-9);
            assert!((floors - floors.round()).abs() < 1e-9);
        }
    }

    #[test]
    fn bad_footprints_are_skipped() {
        let mut store = TopologyStore::new();
        let line = ring(&mut store, &[(0.0, 0.0), (1.0, 0.0)]);
        let bow = ring(&mut store, &[(0.0, 0.0), (2.0, 2.0), (2.0, 0.0), (0.0, 2.0)]);
        let good = ring(&mut store, &[(5.0, 0.0), (8.0, 0.0), (8.0, 3.0)]);
        let mut rng = StdRng::seed_from_u64(0);
        let (mesh, anomalies) = ExtrudeFootprints::new(vec![line, bow, good], fixed(1))
            .execute(&store, &|_: f64, _: f64| 0.0, &mut rng)
            .unwrap();
        assert_eq!(anomalies.len(), 2);
        assert_eq!(anomalies[0].kind, DegeneracyKind::TooFewPoints);
        assert_eq!(anomalies[1].kind, DegeneracyKind::SelfIntersecting);
        assert_eq!(mesh.triangle_count(), 3 * 2 + 1);
    }

    #[test]
    fn rejects_empty_floor_range() {
        let params = BuildingParams {
            min_floors: 4,
            max_floors: 2,
            ..BuildingParams::default()
        };
        assert!(params.validate().is_err());
    }
}
