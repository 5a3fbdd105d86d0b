use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::detection::lines::LineParams;
use crate::detection::scoring::ScoringConfig;
use crate::models::ObjectKind;

/// Settings shared by the corpus builder and the hybrid detector.
///
/// Every field has a default, so a config file only needs to name what it
/// changes. Command-line flags are applied on top by the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanmarkConfig {
    /// Class names in class-id order.
    pub classes: Vec<String>,
    pub val_fraction: f64,
    /// Fixed seed for the validation sample; `None` draws from entropy.
    pub seed: Option<u64>,
    pub image_extensions: Vec<String>,
    /// Skip raw files whose content was already ingested in the batch.
    pub track_sources: bool,
    /// Threshold handed to the external detector before hybrid scoring.
    pub detector_threshold: f32,
    pub scoring: ScoringConfig,
    pub lines: LineParams,
    pub min_training_boxes: usize,
}

impl Default for PlanmarkConfig {
    fn default() -> Self {
        Self {
            classes: vec!["wall".to_string()],
            val_fraction: 0.2,
            seed: None,
            image_extensions: vec!["jpg".to_string(), "png".to_string(), "jpeg".to_string()],
            track_sources: true,
            detector_threshold: 0.2,
            scoring: ScoringConfig::default(),
            lines: LineParams::default(),
            min_training_boxes: 10,
        }
    }
}

impl PlanmarkConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.classes.is_empty() {
            anyhow::bail!("At least one class must be configured");
        }
        if !(0.0..1.0).contains(&self.val_fraction) {
            anyhow::bail!("val_fraction must be in [0, 1), got {}", self.val_fraction);
        }
        if self.image_extensions.is_empty() {
            anyhow::bail!("At least one image extension must be configured");
        }
        Ok(())
    }

    /// Class id for an object kind, if the kind is part of the corpus.
    pub fn class_id(&self, kind: &ObjectKind) -> Option<u32> {
        self.classes
            .iter()
            .position(|name| name.eq_ignore_ascii_case(kind.as_str()))
            .map(|idx| idx as u32)
    }

    pub fn class_name(&self, class_id: u32) -> Option<&str> {
        self.classes.get(class_id as usize).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_maps_only_walls() {
        let config = PlanmarkConfig::default();
        assert_eq!(config.class_id(&ObjectKind::Wall), Some(0));
        assert_eq!(config.class_id(&ObjectKind::Door), None);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: PlanmarkConfig =
            serde_json::from_str(r#"{"classes": ["wall", "window", "door"], "seed": 7}"#).unwrap();
        assert_eq!(config.class_id(&ObjectKind::Door), Some(2));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.val_fraction, 0.2);
        assert!(config.track_sources);
    }
}
