use rand::Rng;

use crate::error::{OperationError, Result};
use crate::math::Point3;
use crate::topology::{PointId, TopologyStore};

/// Height field consumed by the pipeline: `H(x, z) -> y`.
pub trait HeightSampler {
    /// Returns the ground height at `(x, z)`.
    fn height(&self, x: f64, z: f64) -> f64;

    /// Returns the ground point at `(x, z)`.
    fn sample(&self, x: f64, z: f64) -> Point3 {
        Point3::new(x, self.height(x, z), z)
    }
}

impl<F> HeightSampler for F
where
    F: Fn(f64, f64) -> f64,
{
    fn height(&self, x: f64, z: f64) -> f64 {
        self(x, z)
    }
}

/// Parameters of the scattered terrain point cloud.
#[derive(Debug, Clone, Copy)]
pub struct TerrainParams {
    /// Side length of the square terrain, starting at the origin.
    pub extent: f64,
    /// Points per side of the lattice.
    pub resolution: usize,
    /// Maximum interior displacement, as a fraction of one cell.
    pub jitter: f64,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            extent: 128.0,
            resolution: 17,
            jitter: 0.3,
        }
    }
}

impl TerrainParams {
    /// Checks the parameters for nonsensical values.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::InvalidInput` if the extent is not positive, the
    /// lattice has fewer than two points per side, or the jitter is outside `[0, 0.5)`.
    pub fn validate(&self) -> Result<()> {
        if self.extent.is_nan() || self.extent <= 0.0 {
            return Err(
                OperationError::InvalidInput("terrain extent must be positive".into()).into(),
            );
        }
        if self.resolution < 2 {
            return Err(OperationError::InvalidInput(
                "terrain resolution must be at least 2".into(),
            )
            .into());
        }
        if !(0.0..0.5).contains(&self.jitter) {
            return Err(
                OperationError::InvalidInput("terrain jitter must be in [0, 0.5)".into()).into(),
            );
        }
        Ok(())
    }

    /// Width of one lattice cell.
    #[must_use]
    pub fn cell(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let cells = (self.resolution - 1) as f64;
        self.extent / cells
    }
}

/// Fills the square terrain extent with a jittered lattice of ground points.
///
/// Boundary points stay on the square so the convex hull is the full extent.
#[derive(Debug)]
pub struct ScatterTerrainPoints {
    params: TerrainParams,
}

impl ScatterTerrainPoints {
    /// Creates a new scatter operation.
    #[must_use]
    pub fn new(params: TerrainParams) -> Self {
        Self { params }
    }

    /// Appends the points to the store and returns their IDs.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid.
    pub fn execute<S, R>(
        &self,
        store: &mut TopologyStore,
        sampler: &S,
        rng: &mut R,
    ) -> Result<Vec<PointId>>
    where
        S: HeightSampler + ?Sized,
        R: Rng + ?Sized,
    {
        self.params.validate()?;
        let n = self.params.resolution;
        let cell = self.params.cell();
        let amp = self.params.jitter * cell;

        let mut ids = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                #[allow(clippy::cast_precision_loss)]
                let (mut x, mut z) = (i as f64 * cell, j as f64 * cell);
                let interior = i > 0 && j > 0 && i + 1 < n && j + 1 < n;
                if interior && amp > 0.0 {
                    x += rng.gen_range(-amp..amp);
                    z += rng.gen_range(-amp..amp);
                }
                ids.push(store.add_point(sampler.sample(x, z)));
            }
        }
        tracing::debug!(points = ids.len(), cell, "scattered terrain points");
        Ok(ids)
    }
}
