use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::detection::geometry::GeometryStats;

/// Pixel-space point on a page, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Architectural element kind as drawn by an annotator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    Wall,
    Window,
    Door,
    Other(String),
}

impl ObjectKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "wall" => ObjectKind::Wall,
            "window" => ObjectKind::Window,
            "door" => ObjectKind::Door,
            other => ObjectKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ObjectKind::Wall => "wall",
            ObjectKind::Window => "window",
            ObjectKind::Door => "door",
            ObjectKind::Other(name) => name,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolygonAnnotation {
    pub kind: ObjectKind,
    pub points: Vec<Point>,
}

impl PolygonAnnotation {
    /// Four-corner rectangle (clockwise from top-left) covering `bbox`.
    pub fn from_rect(kind: ObjectKind, bbox: &PixelBox) -> Self {
        Self {
            kind,
            points: vec![
                Point::new(bbox.x1, bbox.y1),
                Point::new(bbox.x2, bbox.y1),
                Point::new(bbox.x2, bbox.y2),
                Point::new(bbox.x1, bbox.y2),
            ],
        }
    }
}

/// Identifies one backing page image: `(project_id, page_num)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageKey {
    pub project_id: String,
    pub page_num: u32,
}

impl PageKey {
    pub fn new(project_id: impl Into<String>, page_num: u32) -> Self {
        Self {
            project_id: project_id.into(),
            page_num,
        }
    }

    /// Deterministic file stem used for corpus images and label files.
    pub fn stem(&self) -> String {
        format!("{}_p{}", self.project_id, self.page_num)
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} page {}", self.project_id, self.page_num)
    }
}

/// Detector-native box: center and extent as fractions of the image size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub class_id: u32,
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
}

/// Axis-aligned pixel rectangle given by its corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl PixelBox {
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// Width over height, 0 when the box has no height.
    pub fn aspect_ratio(&self) -> f64 {
        let h = self.height();
        if h > 0.0 { self.width() / h } else { 0.0 }
    }

    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }
}

/// The resolved image behind a page key, with the dimensions every box of
/// that page is normalized against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Train,
    Val,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Train => "train",
            Partition::Val => "val",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Partition {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Partition::Train),
            "val" => Ok(Partition::Val),
            other => anyhow::bail!("Unknown partition: {}", other),
        }
    }
}

/// Provenance of boxes merged into a corpus example.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub origin: PathBuf,
    pub boxes: usize,
    pub auto_detected: bool,
}

/// One page image paired with every normalized box drawn on it.
#[derive(Debug, Clone)]
pub struct CorpusExample {
    pub key: PageKey,
    pub image: ImageRef,
    pub boxes: Vec<NormalizedBox>,
    pub sources: Vec<SourceRecord>,
    pub partition: Option<Partition>,
}

impl CorpusExample {
    pub fn new(key: PageKey, image: ImageRef) -> Self {
        Self {
            key,
            image,
            boxes: Vec::new(),
            sources: Vec::new(),
            partition: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

/// One raw output of the external object detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: PixelBox,
    pub confidence: f32,
    pub class_id: u32,
}

/// A detection admitted for human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionCandidate {
    pub bbox: PixelBox,
    /// Confidence after the geometry adjustment, clamped to 1.0.
    pub confidence: f32,
    pub raw_confidence: f32,
    pub class_id: u32,
    pub aspect_ratio: f64,
    pub auto_detected: bool,
    pub geometry: GeometryStats,
}

/// Connected edge region with its bounding rectangle.
#[derive(Debug, Clone)]
pub struct Contour {
    pub label: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub pixel_count: u32,
}

impl Contour {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn area(&self) -> u32 {
        self.pixel_count
    }

    pub fn perimeter(&self) -> f32 {
        // Approximate perimeter from bounding box
        2.0 * (self.width() as f32 + self.height() as f32)
    }

    /// Share of the bounding-box perimeter covered by edge pixels, capped at 1.
    pub fn edge_coverage(&self) -> f32 {
        let perimeter = self.perimeter();
        if perimeter == 0.0 {
            return 0.0;
        }
        (self.pixel_count as f32 / perimeter).min(1.0)
    }

    pub fn to_pixel_box(&self) -> PixelBox {
        PixelBox {
            x1: self.min_x as f64,
            y1: self.min_y as f64,
            x2: (self.max_x + 1) as f64,
            y2: (self.max_y + 1) as f64,
        }
    }
}
