use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::detection::ocr::PageTextReport;
use crate::models::{CorpusExample, Partition};

/// Read-only counts over a corpus, used for monitoring and as a gate before
/// an external retraining job is started.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CorpusStatistics {
    pub total_examples: usize,
    pub total_boxes: usize,
    pub boxes_by_class: BTreeMap<String, usize>,
    pub distinct_projects: usize,
    pub examples_by_project: BTreeMap<String, usize>,
    pub train: usize,
    pub val: usize,
    pub unassigned: usize,
    /// Examples whose page resolved but which carry no boxes.
    pub empty_examples: usize,
    pub auto_detected_sources: usize,
    pub manual_sources: usize,
    pub ocr: OcrSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OcrSummary {
    pub pages: usize,
    pub measurements: usize,
    pub pages_with_architectural_data: usize,
}

/// Compute statistics; `class_names` maps class ids to names, unknown ids
/// are reported as `class_<id>`.
pub fn statistics<'a, I>(examples: I, class_names: &[String]) -> CorpusStatistics
where
    I: IntoIterator<Item = &'a CorpusExample>,
{
    let mut stats = CorpusStatistics::default();
    let mut projects = BTreeSet::new();

    for example in examples {
        stats.total_examples += 1;
        stats.total_boxes += example.boxes.len();
        projects.insert(example.key.project_id.clone());
        *stats
            .examples_by_project
            .entry(example.key.project_id.clone())
            .or_default() += 1;

        for b in &example.boxes {
            let name = class_names
                .get(b.class_id as usize)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", b.class_id));
            *stats.boxes_by_class.entry(name).or_default() += 1;
        }

        match example.partition {
            Some(Partition::Train) => stats.train += 1,
            Some(Partition::Val) => stats.val += 1,
            None => stats.unassigned += 1,
        }
        if example.is_empty() {
            stats.empty_examples += 1;
        }
        for source in &example.sources {
            if source.auto_detected {
                stats.auto_detected_sources += 1;
            } else {
                stats.manual_sources += 1;
            }
        }
    }

    stats.distinct_projects = projects.len();
    stats
}

impl CorpusStatistics {
    pub fn with_ocr(mut self, reports: &[PageTextReport]) -> Self {
        self.ocr = OcrSummary {
            pages: reports.len(),
            measurements: reports.iter().map(|r| r.measurements.len()).sum(),
            pages_with_architectural_data: reports.iter().filter(|r| r.has_architectural_data).count(),
        };
        self
    }

    pub fn boxes_for(&self, class_name: &str) -> usize {
        self.boxes_by_class.get(class_name).copied().unwrap_or(0)
    }

    pub fn readiness(&self, gate: &ReadinessGate) -> Readiness {
        let have = self.boxes_for(&gate.class_name);
        if have >= gate.min_boxes.saturating_mul(2) && have > 0 {
            Readiness::Good { have }
        } else if have >= gate.min_boxes {
            Readiness::Adequate { have }
        } else {
            Readiness::Insufficient {
                have,
                need: gate.min_boxes,
            }
        }
    }
}

/// "Retrain only if `class_name` has at least `min_boxes` boxes."
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    pub class_name: String,
    pub min_boxes: usize,
}

impl ReadinessGate {
    pub fn new(class_name: impl Into<String>, min_boxes: usize) -> Self {
        Self {
            class_name: class_name.into(),
            min_boxes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Readiness {
    Insufficient { have: usize, need: usize },
    Adequate { have: usize },
    Good { have: usize },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        !matches!(self, Readiness::Insufficient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImageRef, NormalizedBox, PageKey, SourceRecord};
    use std::path::PathBuf;

    fn example(project: &str, page: u32, boxes: &[u32], partition: Option<Partition>) -> CorpusExample {
        let mut e = CorpusExample::new(
            PageKey::new(project, page),
            ImageRef {
                path: PathBuf::from("x.jpg"),
                width: 10,
                height: 10,
            },
        );
        e.boxes = boxes
            .iter()
            .map(|&class_id| NormalizedBox {
                class_id,
                x_center: 0.5,
                y_center: 0.5,
                width: 0.1,
                height: 0.1,
            })
            .collect();
        e.sources.push(SourceRecord {
            origin: PathBuf::from("m.json"),
            boxes: boxes.len(),
            auto_detected: page == 99,
        });
        e.partition = partition;
        e
    }

    #[test]
    fn counts_classes_projects_and_partitions() {
        let classes = vec!["wall".to_string(), "window".to_string()];
        let corpus = vec![
            example("a", 1, &[0, 0, 1], Some(Partition::Train)),
            example("a", 2, &[], Some(Partition::Val)),
            example("b", 99, &[0, 7], None),
        ];
        let stats = statistics(&corpus, &classes);
        assert_eq!(stats.total_examples, 3);
        assert_eq!(stats.total_boxes, 5);
        assert_eq!(stats.boxes_for("wall"), 3);
        assert_eq!(stats.boxes_for("window"), 1);
        assert_eq!(stats.boxes_for("class_7"), 1);
        assert_eq!(stats.distinct_projects, 2);
        assert_eq!(stats.examples_by_project["a"], 2);
        assert_eq!((stats.train, stats.val, stats.unassigned), (1, 1, 1));
        assert_eq!(stats.empty_examples, 1);
        assert_eq!((stats.manual_sources, stats.auto_detected_sources), (2, 1));
    }

    #[test]
    fn readiness_levels() {
        let classes = vec!["wall".to_string()];
        let gate = ReadinessGate::new("wall", 10);

        let few: Vec<_> = (1..=3).map(|p| example("a", p, &[0, 0, 0], None)).collect();
        assert_eq!(
            statistics(&few, &classes).readiness(&gate),
            Readiness::Insufficient { have: 9, need: 10 }
        );

        let some: Vec<_> = (1..=5).map(|p| example("a", p, &[0, 0], None)).collect();
        assert_eq!(statistics(&some, &classes).readiness(&gate), Readiness::Adequate { have: 10 });

        let many: Vec<_> = (1..=10).map(|p| example("a", p, &[0, 0], None)).collect();
        assert!(statistics(&many, &classes).readiness(&gate).is_ready());
        assert_eq!(statistics(&many, &classes).readiness(&gate), Readiness::Good { have: 20 });
    }
}
