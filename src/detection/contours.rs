use image::{DynamicImage, GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};
use std::collections::HashMap;

use crate::detection::{ObjectDetector, preprocessing};
use crate::models::{Contour, RawDetection};

/// Find contours in binary edge image using connected components
pub fn find_contours(edges: &GrayImage, min_pixels: u32) -> Vec<Contour> {
    // Label connected components (white pixels = edges)
    let labeled = connected_components(edges, Connectivity::Eight, Luma([0]));

    let mut regions: HashMap<u32, (u32, u32, u32, u32, u32)> = HashMap::new();

    for (x, y, label) in labeled.enumerate_pixels() {
        let label_val = label[0];
        if label_val == 0 {
            continue; // Skip background
        }

        regions
            .entry(label_val)
            .and_modify(|(min_x, min_y, max_x, max_y, count)| {
                *min_x = (*min_x).min(x);
                *min_y = (*min_y).min(y);
                *max_x = (*max_x).max(x);
                *max_y = (*max_y).max(y);
                *count += 1;
            })
            .or_insert((x, y, x, y, 1));
    }

    let mut contours: Vec<Contour> = regions
        .into_iter()
        .map(|(label, (min_x, min_y, max_x, max_y, count))| Contour {
            label,
            min_x,
            min_y,
            max_x,
            max_y,
            pixel_count: count,
        })
        .filter(|c| c.pixel_count >= min_pixels)
        .collect();
    contours.sort_by_key(|c| c.label);
    contours
}

/// Offline stand-in for a learned detector: proposes one box per connected
/// edge region, scored by how much of the box outline is edge pixels.
#[derive(Debug, Clone)]
pub struct ContourProposalDetector {
    pub low_threshold: f32,
    pub high_threshold: f32,
    pub min_pixels: u32,
    /// Regions whose box is smaller than this on both sides are dropped.
    pub min_side: u32,
    pub class_id: u32,
}

impl Default for ContourProposalDetector {
    fn default() -> Self {
        Self {
            low_threshold: 50.0,
            high_threshold: 150.0,
            min_pixels: 20,
            min_side: 8,
            class_id: 0,
        }
    }
}

impl ObjectDetector for ContourProposalDetector {
    fn detect(&self, image: &DynamicImage, confidence_threshold: f32) -> anyhow::Result<Vec<RawDetection>> {
        let Some(edges) = preprocessing::edge_map(image, self.low_threshold, self.high_threshold) else {
            return Ok(Vec::new());
        };
        Ok(find_contours(&edges, self.min_pixels)
            .into_iter()
            .filter(|c| c.width() >= self.min_side || c.height() >= self.min_side)
            .map(|c| RawDetection {
                bbox: c.to_pixel_box(),
                confidence: c.edge_coverage(),
                class_id: self.class_id,
            })
            .filter(|d| d.confidence >= confidence_threshold)
            .collect())
    }

    fn name(&self) -> &str {
        "contour proposals"
    }
}
