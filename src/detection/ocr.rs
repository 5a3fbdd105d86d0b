use std::collections::BTreeSet;
use std::ops::Range;
use std::path::Path;
use std::sync::LazyLock;

use image::{DynamicImage, Luma};
use imageproc::contrast::{equalize_histogram, otsu_level};
use imageproc::map::map_colors;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use regex::Regex;
use rten::Model;
use serde::{Deserialize, Serialize};

/// Text recognition over a whole page.
pub trait PageTextReader {
    fn read_text(&self, image: &DynamicImage) -> anyhow::Result<String>;
}

/// [`PageTextReader`] backed by the `ocrs` engine.
pub struct OcrsPageReader {
    engine: OcrEngine,
}

impl OcrsPageReader {
    /// Load models from the standard cache location (`~/.cache/ocrs`).
    pub fn from_cache_dir() -> anyhow::Result<Self> {
        let home_dir = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"))?;
        let cache_dir = Path::new(&home_dir).join(".cache/ocrs");
        Self::from_models(
            &cache_dir.join("text-detection.rten"),
            &cache_dir.join("text-recognition.rten"),
        )
    }

    pub fn from_models(detection_model_path: &Path, recognition_model_path: &Path) -> anyhow::Result<Self> {
        if !detection_model_path.exists() || !recognition_model_path.exists() {
            anyhow::bail!(
                "OCR models not found. Expected locations:\n  - {}\n  - {}",
                detection_model_path.display(),
                recognition_model_path.display()
            );
        }

        let detection_model = Model::load_file(detection_model_path)?;
        let recognition_model = Model::load_file(recognition_model_path)?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })?;

        Ok(Self { engine })
    }
}

impl PageTextReader for OcrsPageReader {
    fn read_text(&self, image: &DynamicImage) -> anyhow::Result<String> {
        let prepared = binarize_for_ocr(image).to_rgb8();
        let source = ImageSource::from_bytes(prepared.as_raw(), prepared.dimensions())
            .map_err(|e| anyhow::anyhow!("Failed to build OCR input: {}", e))?;
        let input = self.engine.prepare_input(source)?;
        let text = self.engine.get_text(&input)?;
        Ok(text.trim().to_string())
    }
}

/// Equalize contrast, then threshold at Otsu's level. Scanned drawings have
/// uneven paper tone that otherwise bleeds into recognition.
pub fn binarize_for_ocr(image: &DynamicImage) -> DynamicImage {
    let equalized = equalize_histogram(&image.to_luma8());
    let level = otsu_level(&equalized);
    let binary = map_colors(&equalized, |p| if p[0] > level { Luma([255u8]) } else { Luma([0u8]) });
    DynamicImage::ImageLuma8(binary)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementKind {
    Linear,
    Rectangular,
    Radial,
}

/// A dimension annotation found in page text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub kind: MeasurementKind,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_value: Option<f64>,
    pub unit: String,
    pub text: String,
}

impl Measurement {
    /// Primary value in millimetres.
    pub fn value_mm(&self) -> f64 {
        match self.unit.as_str() {
            "m" | "м" => self.value * 1000.0,
            _ => self.value,
        }
    }
}

/// Data-quality signals extracted from one page's text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageTextReport {
    pub text_length: usize,
    pub text_preview: String,
    pub measurements: Vec<Measurement>,
    pub keywords: Vec<String>,
    pub has_architectural_data: bool,
}

const PREVIEW_CHARS: usize = 200;
const NUMBER: &str = r"(\d+(?:[.,]\d+)?)";
const UNIT: &str = r"(мм|mm|м|m)";

static RECTANGULAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i){NUMBER}\s*[xх×]\s*{NUMBER}\s*{UNIT}")).expect("valid regex"));
static RADIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)(?:R|Ø)\s*{NUMBER}\s*{UNIT}")).expect("valid regex"));
static LINEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i){NUMBER}\s*{UNIT}")).expect("valid regex"));

/// Category name and the lowercase stems that indicate it.
const KEYWORDS: &[(&str, &[&str])] = &[
    ("wall", &["стен", "wall"]),
    ("window", &["окн", "window"]),
    ("door", &["двер", "door"]),
    ("room", &["комнат", "room"]),
    ("kitchen", &["кухн", "kitchen"]),
    ("bathroom", &["ванн", "bathroom"]),
];

pub fn analyze_text(text: &str) -> PageTextReport {
    let measurements = extract_measurements(text);
    let keywords = find_keywords(text);
    let char_count = text.chars().count();
    let text_preview = if char_count > PREVIEW_CHARS {
        format!("{}...", text.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    };
    PageTextReport {
        text_length: char_count,
        text_preview,
        has_architectural_data: !measurements.is_empty() || !keywords.is_empty(),
        measurements,
        keywords,
    }
}

pub fn read_page(reader: &dyn PageTextReader, image: &DynamicImage) -> anyhow::Result<PageTextReport> {
    Ok(analyze_text(&reader.read_text(image)?))
}

/// Rectangular, then radial, then linear matches; a later pattern never
/// re-reports text already claimed by an earlier one.
pub fn extract_measurements(text: &str) -> Vec<Measurement> {
    let mut claimed: Vec<Range<usize>> = Vec::new();
    let mut found: Vec<(usize, Measurement)> = Vec::new();

    for (kind, pattern) in [
        (MeasurementKind::Rectangular, &*RECTANGULAR),
        (MeasurementKind::Radial, &*RADIAL),
        (MeasurementKind::Linear, &*LINEAR),
    ] {
        for caps in pattern.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if claimed.iter().any(|r| r.start < whole.end() && whole.start() < r.end) {
                continue;
            }
            let numbers: Vec<f64> = (1..caps.len())
                .filter_map(|i| caps.get(i))
                .filter_map(|m| m.as_str().replace(',', ".").parse().ok())
                .collect();
            let Some(&value) = numbers.first() else { continue };
            let unit = caps
                .get(caps.len() - 1)
                .map(|m| m.as_str().to_lowercase())
                .unwrap_or_default();
            claimed.push(whole.range());
            found.push((
                whole.start(),
                Measurement {
                    kind,
                    value,
                    second_value: (kind == MeasurementKind::Rectangular).then(|| numbers.get(1).copied()).flatten(),
                    unit,
                    text: whole.as_str().to_string(),
                },
            ));
        }
    }

    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, m)| m).collect()
}

pub fn find_keywords(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    KEYWORDS
        .iter()
        .filter(|(_, stems)| stems.iter().any(|stem| lower.contains(stem)))
        .map(|(category, _)| category.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
