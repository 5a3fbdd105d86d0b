use crate::models::{NormalizedBox, PixelBox, Point};

/// Convert a polygon into a detector-native normalized box.
///
/// Returns `None` when the polygon has fewer than two points or the image
/// has no area; callers skip such annotations. Points outside the frame are
/// passed through unclamped, so values may leave `[0, 1]`.
pub fn to_normalized_box(
    class_id: u32,
    points: &[Point],
    image_width: u32,
    image_height: u32,
) -> Option<NormalizedBox> {
    if image_width == 0 || image_height == 0 {
        return None;
    }
    let rect = bounding_rect(points)?;

    let (w, h) = (image_width as f64, image_height as f64);
    let center = rect.center();
    Some(NormalizedBox {
        class_id,
        x_center: center.x / w,
        y_center: center.y / h,
        width: rect.width() / w,
        height: rect.height() / h,
    })
}

/// Axis-aligned rectangle spanning all points; needs at least two.
pub fn bounding_rect(points: &[Point]) -> Option<PixelBox> {
    if points.len() < 2 {
        return None;
    }
    let mut rect = PixelBox {
        x1: f64::INFINITY,
        y1: f64::INFINITY,
        x2: f64::NEG_INFINITY,
        y2: f64::NEG_INFINITY,
    };
    for p in points {
        rect.x1 = rect.x1.min(p.x);
        rect.y1 = rect.y1.min(p.y);
        rect.x2 = rect.x2.max(p.x);
        rect.y2 = rect.y2.max(p.y);
    }
    Some(rect)
}

impl NormalizedBox {
    /// Pixel rectangle this box was derived from, given the same dimensions.
    pub fn to_pixel_rect(&self, image_width: u32, image_height: u32) -> PixelBox {
        let (w, h) = (image_width as f64, image_height as f64);
        let cx = self.x_center * w;
        let cy = self.y_center * h;
        let half_w = self.width * w / 2.0;
        let half_h = self.height * h / 2.0;
        PixelBox {
            x1: cx - half_w,
            y1: cy - half_h,
            x2: cx + half_w,
            y2: cy + half_h,
        }
    }

    /// One label-file line: `<class_id> <xc> <yc> <w> <h>` at 6 decimals.
    pub fn to_label_line(&self) -> String {
        format!(
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, self.x_center, self.y_center, self.width, self.height
        )
    }

    pub fn is_within_frame(&self) -> bool {
        [self.x_center, self.y_center, self.width, self.height]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rect_points(x: f64, y: f64, w: f64, h: f64) -> Vec<Point> {
        vec![
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
        ]
    }

    #[test]
    fn normalizes_rectangle() {
        let b = to_normalized_box(0, &rect_points(100.0, 200.0, 200.0, 50.0), 1000, 800).unwrap();
        assert_relative_eq!(b.x_center, 0.2, epsilon = 1e-12);
        assert_relative_eq!(b.y_center, 0.28125, epsilon = 1e-12);
        assert_relative_eq!(b.width, 0.2, epsilon = 1e-12);
        assert_relative_eq!(b.height, 0.0625, epsilon = 1e-12);
    }

    #[test]
    fn round_trips_to_original_rectangle() {
        let polygons = [
            vec![Point::new(3.5, 7.25), Point::new(640.0, 11.0), Point::new(10.0, 479.9)],
            rect_points(0.0, 0.0, 1024.0, 768.0),
            vec![Point::new(512.0, 12.0), Point::new(12.0, 512.0)],
        ];
        for points in polygons {
            let expected = bounding_rect(&points).unwrap();
            let b = to_normalized_box(0, &points, 1024, 768).unwrap();
            let back = b.to_pixel_rect(1024, 768);
            assert_relative_eq!(back.x1, expected.x1, epsilon = 1e-9);
            assert_relative_eq!(back.y1, expected.y1, epsilon = 1e-9);
            assert_relative_eq!(back.x2, expected.x2, epsilon = 1e-9);
            assert_relative_eq!(back.y2, expected.y2, epsilon = 1e-9);
            assert!(b.is_within_frame());
        }
    }

    #[test]
    fn too_few_points_yields_none() {
        assert!(to_normalized_box(0, &[], 100, 100).is_none());
        assert!(to_normalized_box(0, &[Point::new(5.0, 5.0)], 100, 100).is_none());
    }

    #[test]
    fn zero_sized_image_yields_none() {
        let points = rect_points(0.0, 0.0, 10.0, 10.0);
        assert!(to_normalized_box(0, &points, 0, 100).is_none());
        assert!(to_normalized_box(0, &points, 100, 0).is_none());
    }

    #[test]
    fn out_of_frame_points_pass_through() {
        let points = vec![Point::new(-50.0, 10.0), Point::new(250.0, 30.0)];
        let b = to_normalized_box(0, &points, 100, 100).unwrap();
        assert_relative_eq!(b.width, 3.0, epsilon = 1e-12);
        assert!(b.x_center > 0.0);
        assert!(!b.is_within_frame());
    }

    #[test]
    fn label_line_uses_six_decimals() {
        let b = NormalizedBox {
            class_id: 0,
            x_center: 0.2,
            y_center: 0.28125,
            width: 0.2,
            height: 0.0625,
        };
        assert_eq!(b.to_label_line(), "0 0.200000 0.281250 0.200000 0.062500");
    }
}
