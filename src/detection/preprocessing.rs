use image::{DynamicImage, GrayImage};
use imageproc::edges::canny;

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Detect edges using the Canny edge detector. Canny smooths the input
/// itself, so no separate blur pass is needed.
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

/// Grayscale + Canny in one call; `None` for images without pixels.
pub fn edge_map(img: &DynamicImage, low_threshold: f32, high_threshold: f32) -> Option<GrayImage> {
    if img.width() == 0 || img.height() == 0 {
        return None;
    }
    Some(detect_edges(&to_grayscale(img), low_threshold, high_threshold))
}
