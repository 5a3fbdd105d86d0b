mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from planmark for tests
pub use planmark::corpus::{AggregationContext, CancelToken, FinalizedBatch, IngestOutcome, Partitioner};
pub use planmark::models::{PageKey, Partition};
pub use planmark::{IngestError, PlanmarkConfig};
