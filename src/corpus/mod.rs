pub mod aggregator;
pub mod normalize;
pub mod partition;
pub mod raw;
pub mod resolver;
pub mod stats;
pub mod writer;

pub use aggregator::{AggregationContext, CancelToken, FinalizedBatch, IngestOutcome, IngestSummary};
pub use normalize::to_normalized_box;
pub use partition::{PartitionOutcome, Partitioner};
pub use raw::{RawAnnotationFile, RawObject, RawPoint, ValidatedAnnotation};
pub use resolver::PageImageResolver;
pub use stats::{CorpusStatistics, Readiness, ReadinessGate, statistics};
pub use writer::{CorpusWriter, WriteReport};

use std::path::{Path, PathBuf};

/// All `*.json` raw annotation files under `dir`, recursively, in path order.
pub fn find_markup_files<P: AsRef<Path>>(dir: P) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_json(dir.as_ref(), &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_json(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("json") {
            out.push(path);
        }
    }
    Ok(())
}
