pub mod config;
pub mod core;
pub mod corpus;
pub mod detection;
pub mod error;
pub mod models;

pub use config::PlanmarkConfig;
pub use corpus::{AggregationContext, CancelToken, CorpusWriter, FinalizedBatch, Partitioner};
pub use detection::{HybridDetector, ObjectDetector};
pub use error::{IngestError, IngestResult};
pub use models::{CorpusExample, DetectionCandidate, NormalizedBox, PageKey, Partition, RawDetection};
