use super::PointId;

slotmap::new_key_type! {
    /// Unique identifier for a terrain triangle in the topology store.
    pub struct TriangleId;
}

/// Data associated with a triangle: three point indices, counter-clockwise in XZ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriangleData {
    pub vertices: [PointId; 3],
}

impl TriangleData {
    /// Creates a new triangle from three point indices.
    #[must_use]
    pub fn new(vertices: [PointId; 3]) -> Self {
        Self { vertices }
    }

    /// The three directed edges in winding order.
    #[must_use]
    pub fn edges(&self) -> [(PointId, PointId); 3] {
        let [a, b, c] = self.vertices;
        [(a, b), (b, c), (c, a)]
    }

    /// The corner that is not on edge `(a, b)`.
    #[must_use]
    pub fn opposite(&self, a: PointId, b: PointId) -> Option<PointId> {
        self.vertices.iter().copied().find(|&v| v != a && v != b)
    }

    /// The corners rotated so that `p` comes first, preserving winding.
    #[must_use]
    pub fn rotated_to(&self, p: PointId) -> Option<[PointId; 3]> {
        let [a, b, c] = self.vertices;
        if p == a {
            Some([a, b, c])
        } else if p == b {
            Some([b, c, a])
        } else if p == c {
            Some([c, a, b])
        } else {
            None
        }
    }
}
