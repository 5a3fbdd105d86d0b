use std::collections::HashMap;

use crate::models::{PageKey, Partition};

pub trait PartitionRepository {
    fn load_partitions(&self) -> impl Future<Output = anyhow::Result<HashMap<PageKey, Partition>>>;
    /// Upsert the given assignments; keys not listed keep their stored value.
    fn save_partitions(&self, assignments: &[(PageKey, Partition)]) -> impl Future<Output = anyhow::Result<()>>;
}
