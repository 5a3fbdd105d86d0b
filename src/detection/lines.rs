use image::GrayImage;
use imageproc::hough::{LineDetectionOptions, PolarLine, detect_lines};
use serde::{Deserialize, Serialize};

/// Finite line segment in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl LineSegment {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn length(&self) -> f32 {
        (self.x2 - self.x1).hypot(self.y2 - self.y1)
    }

    /// Absolute angle against the horizontal axis, in degrees within `[0, 180]`.
    pub fn angle_degrees(&self) -> f32 {
        (self.y2 - self.y1).atan2(self.x2 - self.x1).to_degrees().abs()
    }
}

/// Thresholds for edge detection and segment extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineParams {
    pub edge_low_threshold: f32,
    pub edge_high_threshold: f32,
    /// Minimum accumulator votes for a candidate line.
    pub vote_threshold: u32,
    pub suppression_radius: u32,
    pub min_line_length: f32,
    /// Largest run of missing edge pixels bridged within one segment.
    pub max_line_gap: f32,
}

impl Default for LineParams {
    fn default() -> Self {
        Self {
            edge_low_threshold: 50.0,
            edge_high_threshold: 150.0,
            vote_threshold: 50,
            suppression_radius: 8,
            min_line_length: 100.0,
            max_line_gap: 10.0,
        }
    }
}

/// Line-segment extraction over a binary edge image.
pub trait LineExtractor: Send + Sync {
    fn extract_lines(&self, edges: &GrayImage, params: &LineParams) -> Vec<LineSegment>;
}

/// Hough-transform extractor: finds infinite lines by voting, then walks
/// each line across the edge map and keeps the runs of edge pixels that are
/// long enough, bridging gaps up to `max_line_gap`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoughSegmentExtractor;

impl LineExtractor for HoughSegmentExtractor {
    fn extract_lines(&self, edges: &GrayImage, params: &LineParams) -> Vec<LineSegment> {
        if edges.width() == 0 || edges.height() == 0 {
            return Vec::new();
        }
        let options = LineDetectionOptions {
            vote_threshold: params.vote_threshold,
            suppression_radius: params.suppression_radius,
        };
        detect_lines(edges, options)
            .iter()
            .flat_map(|line| trace_segments(edges, line, params))
            .collect()
    }
}

fn trace_segments(edges: &GrayImage, line: &PolarLine, params: &LineParams) -> Vec<LineSegment> {
    // Normal form: x*cos(theta) + y*sin(theta) = r
    let (sin, cos) = (line.angle_in_degrees as f32).to_radians().sin_cos();
    let (foot_x, foot_y) = (line.r * cos, line.r * sin);
    let (dir_x, dir_y) = (-sin, cos);
    let reach = (edges.width() as f32).hypot(edges.height() as f32);

    let point_at = |t: f32| (foot_x + t * dir_x, foot_y + t * dir_y);
    let mut segments = Vec::new();
    let mut emit = |start: f32, end: f32| {
        if end - start >= params.min_line_length {
            let (x1, y1) = point_at(start);
            let (x2, y2) = point_at(end);
            segments.push(LineSegment::new(x1, y1, x2, y2));
        }
    };

    let mut run: Option<(f32, f32)> = None;
    let mut t = -reach;
    while t <= reach {
        let (x, y) = point_at(t);
        let hit = is_edge_near(edges, x, y, cos, sin);
        run = match (hit, run) {
            (true, None) => Some((t, t)),
            (true, Some((start, _))) => Some((start, t)),
            (false, Some((start, last))) if t - last > params.max_line_gap => {
                emit(start, last);
                None
            }
            (false, current) => current,
        };
        t += 1.0;
    }
    if let Some((start, last)) = run {
        emit(start, last);
    }
    segments
}

/// Edge test tolerant to one pixel of rasterization drift across the line.
fn is_edge_near(edges: &GrayImage, x: f32, y: f32, normal_x: f32, normal_y: f32) -> bool {
    [-1.0f32, 0.0, 1.0].iter().any(|k| {
        let sx = (x + k * normal_x).round();
        let sy = (y + k * normal_y).round();
        sx >= 0.0
            && sy >= 0.0
            && (sx as u32) < edges.width()
            && (sy as u32) < edges.height()
            && edges.get_pixel(sx as u32, sy as u32)[0] > 0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn segment_angle_and_length() {
        let s = LineSegment::new(0.0, 0.0, 30.0, 40.0);
        assert_eq!(s.length(), 50.0);
        assert!((LineSegment::new(10.0, 5.0, 0.0, 5.0).angle_degrees() - 180.0).abs() < 1e-4);
        assert!((LineSegment::new(0.0, 0.0, 0.0, 10.0).angle_degrees() - 90.0).abs() < 1e-4);
    }

    #[test]
    fn finds_a_drawn_horizontal_run() {
        let mut edges = GrayImage::new(300, 120);
        for x in 40..260 {
            edges.put_pixel(x, 60, Luma([255]));
        }
        let segments = HoughSegmentExtractor.extract_lines(&edges, &LineParams::default());
        assert!(!segments.is_empty());
        let longest = segments
            .iter()
            .max_by(|a, b| a.length().total_cmp(&b.length()))
            .unwrap();
        assert!(longest.length() >= 200.0, "got {:?}", longest);
        let angle = longest.angle_degrees();
        assert!(angle < 10.0 || angle > 170.0, "angle {}", angle);
    }

    #[test]
    fn short_runs_are_dropped() {
        let mut edges = GrayImage::new(200, 200);
        for x in 10..70 {
            edges.put_pixel(x, 20, Luma([255]));
        }
        let params = LineParams {
            vote_threshold: 30,
            ..LineParams::default()
        };
        assert!(HoughSegmentExtractor.extract_lines(&edges, &params).is_empty());
    }

    #[test]
    fn empty_edge_map_has_no_lines() {
        let edges = GrayImage::new(0, 0);
        assert!(HoughSegmentExtractor.extract_lines(&edges, &LineParams::default()).is_empty());
    }
}
