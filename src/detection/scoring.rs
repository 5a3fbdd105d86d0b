use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detection::geometry::GeometryStats;
use crate::models::{DetectionCandidate, RawDetection};

/// Knobs of the wall-likelihood heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Confidence multiplier applied when the page shows line structure.
    pub line_boost: f32,
    /// Open interval of width/height ratios considered wall-like.
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    /// A side longer than this (pixels) is large enough on its own.
    pub min_extent_px: f64,
    /// Adjusted confidence above this admits regardless of shape.
    pub confidence_override: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            line_boost: 1.2,
            min_aspect_ratio: 0.5,
            max_aspect_ratio: 20.0,
            min_extent_px: 100.0,
            confidence_override: 0.3,
        }
    }
}

/// Fuses raw detector output with page geometry into reviewable candidates.
///
/// The admission rule is an OR of shape and score so that borderline
/// detections reach a reviewer instead of being dropped.
#[derive(Debug, Clone, Default)]
pub struct HybridScorer {
    config: ScoringConfig,
}

impl HybridScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn adjusted_confidence(&self, confidence: f32, geometry: &GeometryStats) -> f32 {
        let boosted = if geometry.line_detected {
            confidence * self.config.line_boost
        } else {
            confidence
        };
        boosted.min(1.0)
    }

    pub fn is_wall_like(&self, detection: &RawDetection) -> bool {
        let aspect = detection.bbox.aspect_ratio();
        (self.config.min_aspect_ratio < aspect && aspect < self.config.max_aspect_ratio)
            || detection.bbox.width() > self.config.min_extent_px
            || detection.bbox.height() > self.config.min_extent_px
    }

    /// Score one detection; `None` when it is not admitted.
    pub fn score_one(&self, detection: &RawDetection, geometry: &GeometryStats) -> Option<DetectionCandidate> {
        let confidence = self.adjusted_confidence(detection.confidence, geometry);
        let admitted = self.is_wall_like(detection) || confidence > self.config.confidence_override;
        if !admitted {
            debug!(?detection.bbox, confidence, "detection rejected");
            return None;
        }
        Some(DetectionCandidate {
            bbox: detection.bbox,
            confidence,
            raw_confidence: detection.confidence,
            class_id: detection.class_id,
            aspect_ratio: detection.bbox.aspect_ratio(),
            auto_detected: true,
            geometry: geometry.clone(),
        })
    }

    pub fn score(&self, detections: &[RawDetection], geometry: &GeometryStats) -> Vec<DetectionCandidate> {
        detections
            .iter()
            .filter_map(|d| self.score_one(d, geometry))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PixelBox;

    fn detection(w: f64, h: f64, confidence: f32) -> RawDetection {
        RawDetection {
            bbox: PixelBox {
                x1: 10.0,
                y1: 10.0,
                x2: 10.0 + w,
                y2: 10.0 + h,
            },
            confidence,
            class_id: 0,
        }
    }

    fn lines(detected: bool) -> GeometryStats {
        GeometryStats {
            total_lines: detected as usize,
            horizontal_lines: detected as usize,
            line_detected: detected,
            avg_line_length: if detected { 120.0 } else { 0.0 },
            ..Default::default()
        }
    }

    #[test]
    fn boost_only_with_lines_and_clamped() {
        let scorer = HybridScorer::default();
        assert!((scorer.adjusted_confidence(0.5, &lines(true)) - 0.6).abs() < 1e-6);
        assert_eq!(scorer.adjusted_confidence(0.5, &lines(false)), 0.5);
        assert_eq!(scorer.adjusted_confidence(0.95, &lines(true)), 1.0);
    }

    #[test]
    fn elongated_low_confidence_is_admitted_by_shape() {
        // 0.25 * 1.2 = 0.3 does not exceed the override; the 3:1 shape admits it.
        let scorer = HybridScorer::default();
        let candidate = scorer.score_one(&detection(60.0, 20.0, 0.25), &lines(true)).unwrap();
        assert!(candidate.confidence <= 0.3 + 1e-6);
        assert!((candidate.aspect_ratio - 3.0).abs() < 1e-9);
        assert!(candidate.auto_detected);
        assert!(candidate.geometry.line_detected);
    }

    #[test]
    fn small_flat_low_confidence_is_rejected() {
        // 20x50 => aspect 0.4, below the band, no side over 100 px.
        let scorer = HybridScorer::default();
        assert!(scorer.score_one(&detection(20.0, 50.0, 0.1), &lines(false)).is_none());
    }

    #[test]
    fn square_falls_inside_the_elongation_band() {
        let scorer = HybridScorer::default();
        assert!(scorer.is_wall_like(&detection(50.0, 50.0, 0.1)));
    }

    #[test]
    fn large_boxes_admitted_regardless_of_ratio() {
        let scorer = HybridScorer::default();
        // aspect 0.1 but 150 px tall
        assert!(scorer.score_one(&detection(15.0, 150.0, 0.05), &lines(false)).is_some());
    }

    #[test]
    fn confidence_override_admits_odd_shapes() {
        let scorer = HybridScorer::default();
        // aspect 0.25, small, but confident
        assert!(scorer.score_one(&detection(10.0, 40.0, 0.35), &lines(false)).is_some());
        assert!(scorer.score_one(&detection(10.0, 40.0, 0.26), &lines(true)).is_some());
        assert!(scorer.score_one(&detection(10.0, 40.0, 0.26), &lines(false)).is_none());
    }

    #[test]
    fn zero_height_box_has_zero_aspect() {
        let scorer = HybridScorer::default();
        let flat = detection(40.0, 0.0, 0.1);
        assert_eq!(flat.bbox.aspect_ratio(), 0.0);
        assert!(scorer.score_one(&flat, &lines(false)).is_none());
    }

    #[test]
    fn scores_a_batch() {
        let scorer = HybridScorer::default();
        let kept = scorer.score(
            &[detection(300.0, 12.0, 0.4), detection(20.0, 50.0, 0.1)],
            &lines(true),
        );
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.48).abs() < 1e-6);
    }
}
