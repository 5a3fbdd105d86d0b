use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::detection::lines::{HoughSegmentExtractor, LineExtractor, LineParams, LineSegment};
use crate::detection::preprocessing;

/// Orientation tolerance, in degrees, for horizontal and vertical lines.
const AXIS_TOLERANCE_DEG: f32 = 10.0;

/// Aggregate line statistics of one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometryStats {
    pub total_lines: usize,
    pub horizontal_lines: usize,
    pub vertical_lines: usize,
    pub diagonal_lines: usize,
    pub avg_line_length: f64,
    pub line_detected: bool,
}

impl GeometryStats {
    pub fn from_segments(segments: &[LineSegment]) -> Self {
        let mut stats = GeometryStats {
            total_lines: segments.len(),
            ..Default::default()
        };
        if segments.is_empty() {
            return stats;
        }

        let mut total_length = 0.0f64;
        for segment in segments {
            total_length += segment.length() as f64;
            let angle = segment.angle_degrees();
            if angle < AXIS_TOLERANCE_DEG || angle > 180.0 - AXIS_TOLERANCE_DEG {
                stats.horizontal_lines += 1;
            } else if (angle - 90.0).abs() < AXIS_TOLERANCE_DEG {
                stats.vertical_lines += 1;
            } else {
                stats.diagonal_lines += 1;
            }
        }
        stats.avg_line_length = total_length / segments.len() as f64;
        stats.line_detected = true;
        stats
    }
}

/// Turns a page raster into [`GeometryStats`] using a pluggable line extractor.
///
/// Analysis never fails: empty images and unreadable files produce the
/// zero-valued stats so that downstream scoring keeps running.
#[derive(Clone)]
pub struct GeometryAnalyzer {
    extractor: Arc<dyn LineExtractor>,
    params: LineParams,
}

impl GeometryAnalyzer {
    pub fn new(extractor: Arc<dyn LineExtractor>, params: LineParams) -> Self {
        Self { extractor, params }
    }

    pub fn with_params(params: LineParams) -> Self {
        Self::new(Arc::new(HoughSegmentExtractor), params)
    }

    pub fn analyze(&self, image: &DynamicImage) -> GeometryStats {
        let Some(edges) = preprocessing::edge_map(
            image,
            self.params.edge_low_threshold,
            self.params.edge_high_threshold,
        ) else {
            debug!("empty image, returning zero geometry");
            return GeometryStats::default();
        };
        let segments = self.extractor.extract_lines(&edges, &self.params);
        let stats = GeometryStats::from_segments(&segments);
        debug!(
            total = stats.total_lines,
            horizontal = stats.horizontal_lines,
            vertical = stats.vertical_lines,
            diagonal = stats.diagonal_lines,
            "geometry analyzed"
        );
        stats
    }

    /// Decode and analyze; decoding errors degrade to zero-valued stats.
    pub fn analyze_path(&self, path: &Path) -> GeometryStats {
        match image::open(path) {
            Ok(image) => self.analyze(&image),
            Err(e) => {
                warn!(?path, error = %e, "could not decode image for geometry analysis");
                GeometryStats::default()
            }
        }
    }
}

impl Default for GeometryAnalyzer {
    fn default() -> Self {
        Self::with_params(LineParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    struct FixedLines(Vec<LineSegment>);

    impl LineExtractor for FixedLines {
        fn extract_lines(&self, _edges: &GrayImage, _params: &LineParams) -> Vec<LineSegment> {
            self.0.clone()
        }
    }

    #[test]
    fn classifies_orientations() {
        let stats = GeometryStats::from_segments(&[
            LineSegment::new(0.0, 0.0, 100.0, 5.0),
            LineSegment::new(100.0, 0.0, 0.0, 3.0),
            LineSegment::new(0.0, 0.0, 4.0, 120.0),
            LineSegment::new(0.0, 0.0, 100.0, 100.0),
        ]);
        assert_eq!(stats.total_lines, 4);
        assert_eq!(stats.horizontal_lines, 2);
        assert_eq!(stats.vertical_lines, 1);
        assert_eq!(stats.diagonal_lines, 1);
        assert!(stats.line_detected);
        assert!(stats.avg_line_length > 100.0);
    }

    #[test]
    fn no_segments_means_zero_stats() {
        assert_eq!(GeometryStats::from_segments(&[]), GeometryStats::default());
    }

    #[test]
    fn uses_injected_extractor() {
        let analyzer = GeometryAnalyzer::new(
            Arc::new(FixedLines(vec![LineSegment::new(0.0, 0.0, 0.0, 150.0)])),
            LineParams::default(),
        );
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(20, 20, Luma([255])));
        let stats = analyzer.analyze(&image);
        assert_eq!(stats.vertical_lines, 1);
        assert_eq!(stats.avg_line_length, 150.0);
    }

    #[test]
    fn empty_image_is_zero_not_error() {
        let stats = GeometryAnalyzer::default().analyze(&DynamicImage::new_luma8(0, 0));
        assert!(!stats.line_detected);
        assert_eq!(stats.total_lines, 0);
    }

    #[test]
    fn undecodable_file_is_zero_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert_eq!(GeometryAnalyzer::default().analyze_path(&path), GeometryStats::default());
    }

    #[test]
    fn detects_lines_on_a_drawn_plan() {
        let mut img = GrayImage::from_pixel(400, 400, Luma([255]));
        for x in 50..350 {
            for y in 100..104 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        let stats = GeometryAnalyzer::default().analyze(&DynamicImage::ImageLuma8(img));
        assert!(stats.line_detected);
        assert!(stats.horizontal_lines >= 1);
    }

    #[test]
    fn blank_page_has_no_lines() {
        let img = GrayImage::from_pixel(300, 300, Luma([255]));
        let stats = GeometryAnalyzer::default().analyze(&DynamicImage::ImageLuma8(img));
        assert!(!stats.line_detected);
    }
}
