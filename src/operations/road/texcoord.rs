use super::{Endpoint, RoadSegment};
use crate::error::{OperationError, Result};

/// Assigns continuous texture coordinates along connected road segments.
///
/// # Algorithm
///
/// 1. Seed the first unvisited segment of each connected component with
///    `[0, length / texture_width]`.
/// 2. Depth-first over links with an explicit stack. A neighbour reached at
///    its end `f` copies the coordinate of the shared end, and its other end
///    advances by its own length, forwards when entered at the start and
///    backwards when entered at the end.
///
/// The first assignment of a segment wins, so loops keep a seam where they
/// close.
#[derive(Debug)]
pub struct PropagateTexCoords {
    texture_width: f64,
}

impl PropagateTexCoords {
    /// Creates a propagation with one texture repeat per `texture_width`.
    #[must_use]
    pub fn new(texture_width: f64) -> Self {
        Self { texture_width }
    }

    /// Writes `tex` on every segment.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::InvalidInput` if the texture width is not
    /// positive or a link points past the end of `segments`.
    pub fn execute(&self, segments: &mut [RoadSegment]) -> Result<()> {
        if self.texture_width.is_nan() || self.texture_width <= 0.0 {
            return Err(
                OperationError::InvalidInput("texture_width must be positive".into()).into(),
            );
        }
        let w = self.texture_width;
        let mut visited = vec![false; segments.len()];
        let mut components = 0usize;

        for seed in 0..segments.len() {
            if visited[seed] {
                continue;
            }
            components += 1;
            visited[seed] = true;
            segments[seed].tex = [0.0, segments[seed].length() / w];

            let mut stack = vec![seed];
            while let Some(i) = stack.pop() {
                for e in Endpoint::ALL {
                    let Some(link) = segments[i].neighbour(e) else {
                        continue;
                    };
                    let j = link.segment;
                    if j >= segments.len() {
                        return Err(OperationError::InvalidInput(format!(
                            "segment {i} links to missing segment {j}"
                        ))
                        .into());
                    }
                    if visited[j] {
                        continue;
                    }
                    visited[j] = true;
                    let shared = segments[i].tex[e.index()];
                    let span = segments[j].length() / w;
                    let f = link.end;
                    let mut tex = [0.0; 2];
                    tex[f.index()] = shared;
                    tex[f.other().index()] = match f {
                        Endpoint::Start => shared + span,
                        Endpoint::End => shared - span,
                    };
                    segments[j].tex = tex;
                    stack.push(j);
                }
            }
        }
        tracing::debug!(segments = segments.len(), components, "propagated texture coordinates");
        Ok(())
    }
}
