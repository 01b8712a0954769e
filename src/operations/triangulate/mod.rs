mod point_set;
mod polygon;

pub use point_set::TriangulatePoints;
pub use polygon::TriangulatePolygon;
