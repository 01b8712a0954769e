use thiserror::Error;

use crate::topology::PointId;

/// Top-level error type for the terramesh pipeline.
#[derive(Debug, Error)]
pub enum TerrameshError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Triangulation(#[from] TriangulationError),
}

impl TerrameshError {
    /// Returns the degeneracy behind this error, if it is a local geometric failure.
    #[must_use]
    pub fn degeneracy(&self) -> Option<DegeneracyKind> {
        match self {
            Self::Geometry(GeometryError::Degenerate(kind))
            | Self::Triangulation(TriangulationError::Degenerate(kind)) => Some(*kind),
            _ => None,
        }
    }
}

impl From<DegeneracyKind> for TerrameshError {
    fn from(kind: DegeneracyKind) -> Self {
        GeometryError::Degenerate(kind).into()
    }
}

/// Errors related to geometric computations.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("degenerate geometry: {0}")]
    Degenerate(DegeneracyKind),
}

/// Errors related to the point/triangle arena.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("point {0:?} not found")]
    PointNotFound(PointId),

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("invalid topology: {0}")]
    InvalidTopology(String),
}

/// Errors related to pipeline operations.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("operation failed: {0}")]
    Failed(String),
}

/// Errors related to triangulation.
#[derive(Debug, Error)]
pub enum TriangulationError {
    #[error("degenerate input: {0}")]
    Degenerate(DegeneracyKind),

    #[error("triangulation failed: {0}")]
    Failed(String),
}

/// The reason a unit of work (one polygon, one intersection, one junction) was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum DegeneracyKind {
    #[error("fewer than three points")]
    TooFewPoints,
    #[error("coincident points")]
    DuplicatePoint,
    #[error("all points are collinear")]
    Collinear,
    #[error("polygon edges cross")]
    SelfIntersecting,
    #[error("no clippable ear")]
    NoEar,
    #[error("near-parallel lines")]
    Parallel,
    #[error("zero-length segment")]
    ZeroLength,
    #[error("no valid neighbour")]
    NoNeighbour,
    #[error("mitre exceeds limit")]
    MitreOverflow,
    #[error("point outside the terrain")]
    OutsideTerrain,
    #[error("constraint edge not recovered")]
    EdgeNotRecovered,
    #[error("step limit exceeded")]
    StepLimit,
}

/// Coarse classification of a [`DegeneracyKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DegeneracyClass {
    /// Duplicate, collinear or self-crossing input.
    DegenerateInput,
    /// A near-zero determinant or a numerical walk that could not complete.
    NumericalDegeneracy,
    /// A road endpoint without a usable neighbour.
    GraphInconsistency,
}

impl DegeneracyKind {
    /// Maps the kind onto its coarse class.
    #[must_use]
    pub fn class(self) -> DegeneracyClass {
        match self {
            Self::TooFewPoints
            | Self::DuplicatePoint
            | Self::Collinear
            | Self::SelfIntersecting
            | Self::ZeroLength
            | Self::OutsideTerrain => DegeneracyClass::DegenerateInput,
            Self::NoEar
            | Self::Parallel
            | Self::EdgeNotRecovered
            | Self::StepLimit => DegeneracyClass::NumericalDegeneracy,
            Self::NoNeighbour | Self::MitreOverflow => DegeneracyClass::GraphInconsistency,
        }
    }
}

/// One skipped unit of work, kept so degraded output stays observable.
#[derive(Debug, Clone, PartialEq)]
pub struct Degeneracy {
    pub kind: DegeneracyKind,
    pub context: String,
}

impl Degeneracy {
    /// Records a degeneracy and emits it as a warning.
    pub fn new(kind: DegeneracyKind, context: impl Into<String>) -> Self {
        let context = context.into();
        tracing::warn!(%kind, %context, "skipped degenerate unit of work");
        Self { kind, context }
    }
}

/// Convenience type alias for results using [`TerrameshError`].
pub type Result<T> = std::result::Result<T, TerrameshError>;
