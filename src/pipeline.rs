//! Batch orchestration of the terrain and road stages.

use rand::Rng;

use crate::error::{Degeneracy, OperationError, Result};
use crate::operations::road::{
    BuildRoadNetwork, CutCorridors, CutParams, PropagateTexCoords, RoadParams, RoadSegment,
    RoundJunctions,
};
use crate::operations::triangulate::TriangulatePoints;
use crate::operations::{split_segments, BuildingParams, ExtrudeFootprints, IntersectSegments};
use crate::terrain::{HeightSampler, ScatterTerrainPoints, TerrainParams};
use crate::tessellation::{ExportRoad, ExportTerrain, TriangleMesh};
use crate::topology::{PointId, Segment, TopologyStore};

/// Every tunable of a scene build.
#[derive(Debug, Clone, Copy)]
pub struct PipelineParams {
    pub terrain: TerrainParams,
    pub road: RoadParams,
    pub cut: CutParams,
    pub building: BuildingParams,
    /// Parametric tolerance of the centreline intersection sweep.
    pub intersect_tolerance: f64,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            terrain: TerrainParams::default(),
            road: RoadParams::default(),
            cut: CutParams::default(),
            building: BuildingParams::default(),
            intersect_tolerance: 1e-6,
        }
    }
}

impl PipelineParams {
    /// Validates every stage's parameters.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::InvalidInput` for the first bad value.
    pub fn validate(&self) -> Result<()> {
        self.terrain.validate()?;
        self.road.validate()?;
        self.cut.validate()?;
        self.building.validate()?;
        let tol = self.intersect_tolerance;
        if tol.is_nan() || tol <= 0.0 || tol >= 0.5 {
            return Err(OperationError::InvalidInput(
                "intersect_tolerance must be in (0, 0.5)".into(),
            )
            .into());
        }
        Ok(())
    }
}

/// Points, centrelines and footprints already placed in the store.
#[derive(Debug, Clone, Default)]
pub struct SceneInput {
    /// Ground points to triangulate. When empty, a jittered lattice is scattered.
    pub terrain: Vec<PointId>,
    /// User-drawn road centrelines.
    pub segments: Vec<Segment>,
    /// Closed building footprint loops.
    pub footprints: Vec<Vec<PointId>>,
}

/// Render meshes plus the road graph and everything that was skipped.
#[derive(Debug, Clone, Default)]
pub struct SceneOutput {
    pub terrain: TriangleMesh,
    pub road: TriangleMesh,
    pub buildings: TriangleMesh,
    pub segments: Vec<RoadSegment>,
    pub anomalies: Vec<Degeneracy>,
}

/// Builds a complete scene: terrain, carved roads and buildings.
///
/// # Algorithm
///
/// 1. Triangulate the terrain points (scattering them first if none are given).
/// 2. Intersect the centrelines and split them at every crossing.
/// 3. Build the road graph, then round its turning junctions.
/// 4. Cut the corridors into the terrain and re-fill the carriageways.
/// 5. Propagate texture coordinates along the road.
/// 6. Extrude building footprints.
/// 7. Export the terrain and road meshes.
///
/// Only invalid parameters and a failed terrain triangulation abort the build.
/// Every other stage skips the units it cannot handle and reports them in
/// [`SceneOutput::anomalies`].
#[derive(Debug)]
pub struct BuildScene {
    input: SceneInput,
    params: PipelineParams,
}

impl BuildScene {
    /// Creates a new scene build.
    #[must_use]
    pub fn new(input: SceneInput, params: PipelineParams) -> Self {
        Self { input, params }
    }

    /// Runs every stage against `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid, the terrain cannot be
    /// triangulated, or the input refers to points missing from the store.
    pub fn execute<S, R>(
        &self,
        store: &mut TopologyStore,
        sampler: &S,
        rng: &mut R,
    ) -> Result<SceneOutput>
    where
        S: HeightSampler + ?Sized,
        R: Rng + ?Sized,
    {
        self.params.validate()?;
        let p = &self.params;
        let mut anomalies = Vec::new();

        {
            let _span = tracing::info_span!("terrain").entered();
            let ids = if self.input.terrain.is_empty() {
                ScatterTerrainPoints::new(p.terrain).execute(store, sampler, rng)?
            } else {
                self.input.terrain.clone()
            };
            let triangles = TriangulatePoints::new(ids).execute(store)?;
            tracing::info!(triangles = triangles.len(), "triangulated terrain");
        }

        let pieces = {
            let _span = tracing::info_span!("intersect").entered();
            let mut segments = self.input.segments.clone();
            anomalies.extend(
                IntersectSegments::with_tolerance(p.intersect_tolerance)
                    .execute(store, &mut segments)?,
            );
            let pieces = split_segments(&segments);
            tracing::info!(input = segments.len(), pieces = pieces.len(), "split centrelines");
            pieces
        };

        let mut segments = {
            let _span = tracing::info_span!("road").entered();
            let mut net = BuildRoadNetwork::new(pieces, p.road).execute(store, sampler)?;
            anomalies.append(&mut net.anomalies);
            let mut rounded = RoundJunctions::new(p.road).execute(store, sampler, &net.segments)?;
            anomalies.append(&mut rounded.anomalies);
            tracing::info!(segments = rounded.segments.len(), "built road network");
            rounded.segments
        };

        let road_triangles = {
            let _span = tracing::info_span!("cut").entered();
            let mut cut = CutCorridors::new(p.cut).execute(store, &mut segments)?;
            anomalies.append(&mut cut.anomalies);
            PropagateTexCoords::new(p.road.texture_width).execute(&mut segments)?;
            tracing::info!(road_triangles = cut.road.len(), "cut corridors");
            cut.road
        };

        let buildings = {
            let _span = tracing::info_span!("buildings").entered();
            let (mesh, mut skipped) =
                ExtrudeFootprints::new(self.input.footprints.clone(), p.building)
                    .execute(store, sampler, rng)?;
            anomalies.append(&mut skipped);
            tracing::info!(triangles = mesh.triangle_count(), "extruded buildings");
            mesh
        };

        let _span = tracing::info_span!("export").entered();
        let terrain = ExportTerrain::new(p.terrain.extent, p.road).execute(store, &segments)?;
        let road = ExportRoad::new(p.road).execute(store, &road_triangles, &segments)?;
        tracing::info!(
            terrain = terrain.triangle_count(),
            road = road.triangle_count(),
            anomalies = anomalies.len(),
            "scene built"
        );

        Ok(SceneOutput {
            terrain,
            road,
            buildings,
            segments,
            anomalies,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::math::Point3;

    #[test]
    fn invalid_params_abort() {
        let params = PipelineParams {
            intersect_tolerance: 0.0,
            ..PipelineParams::default()
        };
        let mut store = TopologyStore::new();
        let mut rng = StdRng::seed_from_u64(0);
        let result = BuildScene::new(SceneInput::default(), params).execute(
            &mut store,
            &|_: f64, _: f64| 0.0,
            &mut rng,
        );
        assert!(result.is_err());
    }

    #[test]
    fn collinear_terrain_aborts() {
        let mut store = TopologyStore::new();
        let terrain = (0..5)
            .map(|i| store.add_point(Point3::new(f64::from(i), 0.0, 0.0)))
            .collect();
        let input = SceneInput {
            terrain,
            ..SceneInput::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let result = BuildScene::new(input, PipelineParams::default()).execute(
            &mut store,
            &|_: f64, _: f64| 0.0,
            &mut rng,
        );
        assert!(result.is_err());
    }

    #[test]
    fn empty_scene_is_just_terrain() {
        let mut store = TopologyStore::new();
        let mut rng = StdRng::seed_from_u64(5);
        let params = PipelineParams {
            terrain: TerrainParams {
                extent: 32.0,
                resolution: 5,
                jitter: 0.2,
            },
            ..PipelineParams::default()
        };
        let out = BuildScene::new(SceneInput::default(), params)
            .execute(&mut store, &|x: f64, z: f64| 0.05 * (x + z), &mut rng)
            .unwrap();
        assert_eq!(out.terrain.triangle_count(), 2 * 4 * 4);
        assert!(out.road.is_empty());
        assert!(out.buildings.is_empty());
        assert!(out.anomalies.is_empty());
    }
}
