pub mod building;
pub mod intersect_segments;
pub mod road;
pub mod triangulate;

pub use building::{BuildingParams, ExtrudeFootprints};
pub use intersect_segments::{split_segments, IntersectSegments};
