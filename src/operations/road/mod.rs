//! Road network construction: centreline graph, offset corridors, rounded
//! junctions, terrain carving and texture coordinates.

mod builder;
mod corridor;
mod offsets;
mod rounding;
mod texcoord;

pub use builder::BuildRoadNetwork;
pub use corridor::{CutCorridors, CutOutput, CutParams, RoadTriangle};
pub use rounding::RoundJunctions;
pub use texcoord::PropagateTexCoords;

use crate::error::{Degeneracy, DegeneracyKind, GeometryError, OperationError, Result};
use crate::math::{unit, Point2, Vector2};
use crate::topology::{Intersection, PointId, TopologyStore};

/// Side of a road relative to its direction of travel (start to end).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }

    /// `+1` on the left, `-1` on the right.
    #[must_use]
    pub fn sign(self) -> f64 {
        match self {
            Self::Left => 1.0,
            Self::Right => -1.0,
        }
    }

    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// One end of a road segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    Start,
    End,
}

impl Endpoint {
    pub const ALL: [Endpoint; 2] = [Endpoint::Start, Endpoint::End];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Start => 0,
            Self::End => 1,
        }
    }

    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Start => Self::End,
            Self::End => Self::Start,
        }
    }
}

/// Turn classification at a linked endpoint, travelling into the junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    TurnsLeft,
    Straight,
    TurnsRight,
}

/// Progress of junction rounding at one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingState {
    Unrounded,
    NeedsRounding,
    Rounded,
}

/// The four boundary lines of a carriageway, each with its terrain crossings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorridorSide {
    Left,
    Right,
    /// Cap across the start, right border to left border.
    Start,
    /// Cap across the end, right border to left border.
    End,
}

impl CorridorSide {
    pub const ALL: [CorridorSide; 4] = [
        CorridorSide::Left,
        CorridorSide::Right,
        CorridorSide::Start,
        CorridorSide::End,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
            Self::Start => 2,
            Self::End => 3,
        }
    }
}

/// A reference to one end of another road segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Link {
    pub segment: usize,
    pub end: Endpoint,
}

/// Parameters controlling road construction.
#[derive(Debug, Clone, Copy)]
pub struct RoadParams {
    /// Distance from the centreline to the border (curb).
    pub half_width: f64,
    /// Width of the shoulder band outside the border.
    pub shoulder_width: f64,
    /// Largest tangent change between consecutive rounded segments (radians).
    pub max_turn_angle: f64,
    /// Longest road segment after subdivision.
    pub max_road_len: f64,
    /// Radius of a rounded junction before clamping to the arm lengths.
    pub corner_radius: f64,
    /// Sharpest turn that still links two arms (radians).
    pub max_link_angle: f64,
    /// Turns below this are classified as straight (radians).
    pub straight_tolerance: f64,
    /// Longest mitre, in multiples of the offset width.
    pub mitre_limit: f64,
    /// Road length covered by one texture repeat.
    pub texture_width: f64,
}

impl Default for RoadParams {
    fn default() -> Self {
        Self {
            half_width: 3.0,
            shoulder_width: 1.5,
            max_turn_angle: 15f64.to_radians(),
            max_road_len: 8.0,
            corner_radius: 10.0,
            max_link_angle: 100f64.to_radians(),
            straight_tolerance: 0.5f64.to_radians(),
            mitre_limit: 4.0,
            texture_width: 6.0,
        }
    }
}

impl RoadParams {
    /// Checks the parameters for nonsensical values.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::InvalidInput` naming the first bad parameter.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("half_width", self.half_width),
            ("max_turn_angle", self.max_turn_angle),
            ("max_road_len", self.max_road_len),
            ("corner_radius", self.corner_radius),
            ("mitre_limit", self.mitre_limit),
            ("texture_width", self.texture_width),
        ];
        for (name, value) in positive {
            if value.is_nan() || value <= 0.0 {
                return Err(OperationError::InvalidInput(format!("{name} must be positive")).into());
            }
        }
        if self.shoulder_width.is_nan() || self.shoulder_width < 0.0 {
            return Err(
                OperationError::InvalidInput("shoulder_width must not be negative".into()).into(),
            );
        }
        if !(0.0..std::f64::consts::PI).contains(&self.max_link_angle) {
            return Err(
                OperationError::InvalidInput("max_link_angle must be in [0, pi)".into()).into(),
            );
        }
        if self.mitre_limit < 1.0 {
            return Err(
                OperationError::InvalidInput("mitre_limit must be at least 1".into()).into(),
            );
        }
        Ok(())
    }

    /// Distance from the centreline to the shoulder line.
    #[must_use]
    pub fn outer_width(&self) -> f64 {
        self.half_width + self.shoulder_width
    }
}

/// The connectivity of a road graph before offsets are resolved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Skeleton {
    pub ends: [PointId; 2],
    pub links: [Option<Link>; 2],
    pub rounding: [RoundingState; 2],
}

impl Skeleton {
    pub fn new(start: PointId, end: PointId) -> Self {
        Self {
            ends: [start, end],
            links: [None, None],
            rounding: [RoundingState::Unrounded; 2],
        }
    }
}

/// A road segment with resolved borders, shoulders and neighbours.
///
/// Per-side arrays are indexed `[side.index()][end.index()]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadSegment {
    pub ends: [PointId; 2],
    /// Inner curb points.
    pub borders: [[PointId; 2]; 2],
    /// Outer corridor points.
    pub shoulders: [[PointId; 2]; 2],
    pub neighbours: [[Option<Link>; 2]; 2],
    pub rotation: [Rotation; 2],
    pub half_length: f64,
    pub rounding: [RoundingState; 2],
    /// Terrain crossings per [`CorridorSide`], sorted by `t`.
    pub hits: [Vec<Intersection>; 4],
    /// Texture coordinate at each end.
    pub tex: [f64; 2],
}

impl RoadSegment {
    #[must_use]
    pub fn border(&self, side: Side, end: Endpoint) -> PointId {
        self.borders[side.index()][end.index()]
    }

    #[must_use]
    pub fn shoulder(&self, side: Side, end: Endpoint) -> PointId {
        self.shoulders[side.index()][end.index()]
    }

    /// The neighbour at an end; both sides of a linked end share it.
    #[must_use]
    pub fn neighbour(&self, end: Endpoint) -> Option<Link> {
        self.neighbours[0][end.index()].or(self.neighbours[1][end.index()])
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        2.0 * self.half_length
    }

    /// Start and end of the line bounding the carriageway on `side`.
    #[must_use]
    pub fn corridor_line(&self, side: CorridorSide) -> [PointId; 2] {
        match side {
            CorridorSide::Left => self.borders[0],
            CorridorSide::Right => self.borders[1],
            CorridorSide::Start => [
                self.border(Side::Right, Endpoint::Start),
                self.border(Side::Left, Endpoint::Start),
            ],
            CorridorSide::End => [
                self.border(Side::Right, Endpoint::End),
                self.border(Side::Left, Endpoint::End),
            ],
        }
    }

    /// Ground positions of the carriageway hexagon
    /// `[bR0, bR1, P1, bL1, bL0, P0]`, counter-clockwise.
    ///
    /// # Errors
    ///
    /// Returns an error if a point is missing from the store.
    pub fn carriageway(&self, store: &TopologyStore) -> Result<[Point2; 6]> {
        self.hexagon(store, &self.borders)
    }

    /// Ground positions of the corridor hexagon bounded by the shoulder lines.
    ///
    /// # Errors
    ///
    /// Returns an error if a point is missing from the store.
    pub fn corridor(&self, store: &TopologyStore) -> Result<[Point2; 6]> {
        self.hexagon(store, &self.shoulders)
    }

    fn hexagon(&self, store: &TopologyStore, lines: &[[PointId; 2]; 2]) -> Result<[Point2; 6]> {
        let [left, right] = lines;
        Ok([
            store.planar(right[0])?,
            store.planar(right[1])?,
            store.planar(self.ends[1])?,
            store.planar(left[1])?,
            store.planar(left[0])?,
            store.planar(self.ends[0])?,
        ])
    }

    /// Unit direction from start to end in the ground plane.
    ///
    /// # Errors
    ///
    /// Returns an error if a point is missing or the segment has zero length.
    pub fn direction(&self, store: &TopologyStore) -> Result<Vector2> {
        direction(store, self.ends)
    }
}

/// Unit ground-plane direction of `ends[0] -> ends[1]`.
pub(crate) fn direction(store: &TopologyStore, ends: [PointId; 2]) -> Result<Vector2> {
    let a = store.planar(ends[0])?;
    let b = store.planar(ends[1])?;
    unit(&(b - a)).ok_or_else(|| GeometryError::Degenerate(DegeneracyKind::ZeroLength).into())
}

/// Direction leaving the node at `end` along the segment.
pub(crate) fn departure(dir: &Vector2, end: Endpoint) -> Vector2 {
    match end {
        Endpoint::Start => *dir,
        Endpoint::End => -dir,
    }
}

/// Output of a road-graph stage.
#[derive(Debug, Clone, Default)]
pub struct RoadNetwork {
    pub segments: Vec<RoadSegment>,
    pub anomalies: Vec<Degeneracy>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::math::Point3;
    use crate::topology::{PointId, Segment, TopologyStore};

    /// Flat ground at height zero.
    pub fn flat(_: f64, _: f64) -> f64 {
        0.0
    }

    pub fn point(store: &mut TopologyStore, x: f64, z: f64) -> PointId {
        store.add_point(Point3::new(x, 0.0, z))
    }

    /// A polyline of centreline segments through the given ground points.
    pub fn polyline(store: &mut TopologyStore, pts: &[(f64, f64)]) -> Vec<Segment> {
        let ids: Vec<PointId> = pts.iter().map(|&(x, z)| point(store, x, z)).collect();
        ids.windows(2).map(|w| Segment::new(w[0], w[1])).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_valid() {
        assert!(RoadParams::default().validate().is_ok());
        let bad = RoadParams {
            half_width: 0.0,
            ..RoadParams::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn sides_and_ends_flip() {
        assert_eq!(Side::Left.opposite(), Side::Right);
        assert_eq!(Endpoint::End.other(), Endpoint::Start);
        assert_eq!(CorridorSide::End.index(), 3);
    }
}
