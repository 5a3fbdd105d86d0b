pub mod contours;
pub mod geometry;
pub mod lines;
pub mod ocr;
pub mod preprocessing;
pub mod scoring;

use std::path::Path;

use anyhow::Context;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PlanmarkConfig;
use crate::corpus::raw::{RawAnnotationFile, RawObject};
use crate::models::{DetectionCandidate, ObjectKind, PageKey, PolygonAnnotation, RawDetection};
use geometry::{GeometryAnalyzer, GeometryStats};
use scoring::HybridScorer;

pub const DETECTION_METHOD: &str = "detector+geometry hybrid";

/// External object detector: image in, boxes with confidences out.
pub trait ObjectDetector {
    fn detect(&self, image: &DynamicImage, confidence_threshold: f32) -> anyhow::Result<Vec<RawDetection>>;

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}

/// Replays detector output exported to JSON by an external model run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrecomputedDetections {
    pub detections: Vec<RawDetection>,
}

impl PrecomputedDetections {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read detections {:?}", path))?;
        serde_json::from_str(&text).with_context(|| format!("Invalid detections file {:?}", path))
    }
}

impl ObjectDetector for PrecomputedDetections {
    fn detect(&self, _image: &DynamicImage, confidence_threshold: f32) -> anyhow::Result<Vec<RawDetection>> {
        Ok(self
            .detections
            .iter()
            .filter(|d| d.confidence >= confidence_threshold)
            .copied()
            .collect())
    }

    fn name(&self) -> &str {
        "precomputed detections"
    }
}

/// Result of running the hybrid detector on one page.
#[derive(Debug, Clone)]
pub struct PageDetection {
    pub raw_count: usize,
    pub geometry: GeometryStats,
    pub candidates: Vec<DetectionCandidate>,
}

/// Detector output fused with line geometry.
pub struct HybridDetector {
    detector: Box<dyn ObjectDetector>,
    analyzer: GeometryAnalyzer,
    scorer: HybridScorer,
    detector_threshold: f32,
}

impl HybridDetector {
    pub fn new(detector: Box<dyn ObjectDetector>, analyzer: GeometryAnalyzer, scorer: HybridScorer) -> Self {
        Self {
            detector,
            analyzer,
            scorer,
            detector_threshold: 0.2,
        }
    }

    pub fn from_config(detector: Box<dyn ObjectDetector>, config: &PlanmarkConfig) -> Self {
        Self {
            detector,
            analyzer: GeometryAnalyzer::with_params(config.lines.clone()),
            scorer: HybridScorer::new(config.scoring.clone()),
            detector_threshold: config.detector_threshold,
        }
    }

    pub fn detect_page(&self, image: &DynamicImage) -> anyhow::Result<PageDetection> {
        let raw = self
            .detector
            .detect(image, self.detector_threshold)
            .with_context(|| format!("{} failed", self.detector.name()))?;
        let geometry = self.analyzer.analyze(image);
        let candidates = self.scorer.score(&raw, &geometry);

        info!(
            detector = self.detector.name(),
            raw = raw.len(),
            admitted = candidates.len(),
            horizontal = geometry.horizontal_lines,
            vertical = geometry.vertical_lines,
            "hybrid detection finished"
        );
        for candidate in &candidates {
            debug!(bbox = ?candidate.bbox, confidence = candidate.confidence, "candidate");
        }
        Ok(PageDetection {
            raw_count: raw.len(),
            geometry,
            candidates,
        })
    }
}

/// Turn admitted candidates into a raw annotation record for review and
/// later ingestion. Each candidate becomes a 4-corner rectangle of `kind`.
pub fn candidates_to_record(
    key: &PageKey,
    kind: &ObjectKind,
    detection: &PageDetection,
) -> RawAnnotationFile {
    let objects = detection
        .candidates
        .iter()
        .map(|candidate| {
            let polygon = PolygonAnnotation::from_rect(kind.clone(), &candidate.bbox);
            RawObject {
                confidence: Some(candidate.confidence),
                ..RawObject::from(&polygon)
            }
        })
        .collect();

    RawAnnotationFile {
        project_id: Some(key.project_id.clone()),
        page_num: Some(key.page_num as i64),
        objects: Some(objects),
        auto_detected: Some(true),
        detection_method: Some(DETECTION_METHOD.to_string()),
        geometry: Some(detection.geometry.clone()),
    }
}

/// File name under which a page's candidate record is stored.
pub fn candidate_file_name(key: &PageKey) -> String {
    format!("auto_detected_{}.json", key.stem())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PixelBox;
    use image::{GrayImage, Luma};
    use std::path::PathBuf;

    fn page() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(400, 300, Luma([255])))
    }

    fn raw(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f32) -> RawDetection {
        RawDetection {
            bbox: PixelBox { x1, y1, x2, y2 },
            confidence,
            class_id: 0,
        }
    }

    #[test]
    fn detector_threshold_is_applied_before_scoring() {
        let detector = PrecomputedDetections {
            detections: vec![raw(0.0, 0.0, 200.0, 20.0, 0.15), raw(0.0, 50.0, 200.0, 70.0, 0.5)],
        };
        let hybrid = HybridDetector::new(Box::new(detector), GeometryAnalyzer::default(), HybridScorer::default());
        let result = hybrid.detect_page(&page()).unwrap();
        assert_eq!(result.raw_count, 1);
        assert_eq!(result.candidates.len(), 1);
        assert!(!result.geometry.line_detected);
    }

    #[test]
    fn record_round_trips_through_validation() {
        let detection = PageDetection {
            raw_count: 1,
            geometry: GeometryStats::default(),
            candidates: HybridScorer::default().score(&[raw(10.0, 20.0, 210.0, 70.0, 0.6)], &GeometryStats::default()),
        };
        let key = PageKey::new("p1", 4);
        let record = candidates_to_record(&key, &ObjectKind::Wall, &detection);
        assert_eq!(record.auto_detected, Some(true));

        let validated = record.validate(&PathBuf::from("auto.json")).unwrap();
        assert_eq!(validated.key, key);
        assert!(validated.auto_detected);
        assert_eq!(validated.objects.len(), 1);
        assert_eq!(validated.objects[0].points.len(), 4);
        assert_eq!(validated.objects[0].kind, ObjectKind::Wall);
    }

    #[test]
    fn candidate_file_name_uses_page_stem() {
        assert_eq!(candidate_file_name(&PageKey::new("p1", 2)), "auto_detected_p1_p2.json");
    }
}
