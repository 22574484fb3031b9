use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::DetectionId;
use crate::rect::NormalizedRect;

/// Dimensionality of appearance embeddings produced by the embedder.
pub const EMBEDDING_DIM: usize = 128;

/// Confidence floor applied by the face processor to raw detector output.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// An immutable per-frame observation from the detector, optionally enriched
/// with an appearance embedding once the association pipeline requests one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Unique within the frame that produced it.
    pub id: DetectionId,
    /// Axis-aligned bounding box in normalized image coordinates.
    pub rect: NormalizedRect,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    /// 128-D appearance embedding, populated lazily by the embedder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Detection {
    pub fn new(id: DetectionId, rect: NormalizedRect, confidence: f32) -> Self {
        Self {
            id,
            rect,
            confidence,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }

    /// Widen the rect by `factor` on x to compensate for detector bias:
    /// `x -= factor*w; width += 2*factor*w` (extends both edges, so a
    /// `factor` of 0.2 grows width to `1.4*w`).
    pub fn widen_x(&mut self, factor: f64) {
        let extra = self.rect.width * factor;
        self.rect.x -= extra;
        self.rect.width += 2.0 * extra;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widen_x_grows_width_and_shifts_origin() {
        let mut d = Detection::new(
            DetectionId(0),
            NormalizedRect::new(0.4, 0.4, 0.2, 0.2),
            0.9,
        );
        d.widen_x(0.2);
        assert!((d.rect.width - 0.28).abs() < 1e-9);
        assert!((d.rect.x - 0.36).abs() < 1e-9);
    }
}
