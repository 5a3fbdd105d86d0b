use std::collections::HashMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::config::PlanmarkConfig;
use crate::corpus::aggregator::FinalizedBatch;
use crate::models::{CorpusExample, PageKey, Partition};

/// Train/validation assignment policy.
///
/// * fewer than 2 examples: everything is `train`
/// * exactly 2: the first (input order) is `val`, the second `train`
/// * more: `floor(n * val_fraction)` (at least 1) sampled at random are `val`
///
/// Running it again overwrites earlier assignments.
#[derive(Debug, Clone)]
pub struct Partitioner {
    val_fraction: f64,
    seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionOutcome {
    pub train: usize,
    pub val: usize,
    /// Assignments were restored from a persisted plan instead of sampled.
    pub restored: bool,
}

impl Partitioner {
    pub fn new(val_fraction: f64, seed: Option<u64>) -> Self {
        Self { val_fraction, seed }
    }

    pub fn from_config(config: &PlanmarkConfig) -> Self {
        Self::new(config.val_fraction, config.seed)
    }

    pub fn validation_count(&self, n: usize) -> usize {
        match n {
            0 | 1 => 0,
            2 => 1,
            _ => (((n as f64) * self.val_fraction + 1e-9).floor() as usize).clamp(1, n - 1),
        }
    }

    pub fn partition(&self, examples: &mut [CorpusExample]) -> PartitionOutcome {
        let n = examples.len();
        let val_count = self.validation_count(n);

        for example in examples.iter_mut() {
            example.partition = Some(Partition::Train);
        }

        match n {
            0 | 1 => {}
            2 => examples[0].partition = Some(Partition::Val),
            _ => {
                let mut rng = match self.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                for idx in rand::seq::index::sample(&mut rng, n, val_count) {
                    examples[idx].partition = Some(Partition::Val);
                }
            }
        }

        for example in examples.iter() {
            debug!(key = %example.key, partition = ?example.partition, "assigned partition");
        }
        info!(train = n - val_count, val = val_count, "partitioned corpus");
        PartitionOutcome {
            train: n - val_count,
            val: val_count,
            restored: false,
        }
    }

    pub fn partition_batch(&self, batch: &mut FinalizedBatch) -> PartitionOutcome {
        self.partition(batch.examples_mut())
    }

    /// Reuse `persisted` when it covers every example of the batch and still
    /// leaves a validation example for two or more pages. Otherwise partition
    /// the batch afresh.
    pub fn restore_or_partition(
        &self,
        batch: &mut FinalizedBatch,
        persisted: &HashMap<PageKey, Partition>,
    ) -> PartitionOutcome {
        let examples = batch.examples();
        let covered = !examples.is_empty() && examples.iter().all(|e| persisted.contains_key(&e.key));
        let has_val = examples.iter().any(|e| persisted.get(&e.key) == Some(&Partition::Val));
        if !covered || (examples.len() >= 2 && !has_val) {
            if covered {
                info!(examples = examples.len(), "persisted partitions have no validation page, repartitioning");
            }
            return self.partition_batch(batch);
        }

        let mut outcome = PartitionOutcome {
            restored: true,
            ..Default::default()
        };
        for example in batch.examples_mut() {
            let partition = persisted[&example.key];
            example.partition = Some(partition);
            match partition {
                Partition::Train => outcome.train += 1,
                Partition::Val => outcome.val += 1,
            }
        }
        info!(train = outcome.train, val = outcome.val, "restored persisted partitions");
        outcome
    }
}

impl Default for Partitioner {
    fn default() -> Self {
        Self::new(0.2, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageRef;
    use std::path::PathBuf;

    fn examples(n: usize) -> Vec<CorpusExample> {
        (1..=n as u32)
            .map(|page| {
                CorpusExample::new(
                    PageKey::new("p", page),
                    ImageRef {
                        path: PathBuf::from(format!("page_{page}.jpg")),
                        width: 100,
                        height: 100,
                    },
                )
            })
            .collect()
    }

    fn count(examples: &[CorpusExample], partition: Partition) -> usize {
        examples.iter().filter(|e| e.partition == Some(partition)).count()
    }

    #[test]
    fn single_example_is_train() {
        let mut ex = examples(1);
        let outcome = Partitioner::default().partition(&mut ex);
        assert_eq!(outcome.val, 0);
        assert_eq!(ex[0].partition, Some(Partition::Train));
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let outcome = Partitioner::default().partition(&mut []);
        assert_eq!(outcome, PartitionOutcome::default());
    }

    #[test]
    fn two_examples_first_is_val() {
        for _ in 0..20 {
            let mut ex = examples(2);
            Partitioner::default().partition(&mut ex);
            assert_eq!(ex[0].partition, Some(Partition::Val));
            assert_eq!(ex[1].partition, Some(Partition::Train));
        }
    }

    #[test]
    fn ten_examples_split_eight_two() {
        let mut ex = examples(10);
        let outcome = Partitioner::default().partition(&mut ex);
        assert_eq!((outcome.train, outcome.val), (8, 2));
        assert_eq!(count(&ex, Partition::Val), 2);
        assert_eq!(count(&ex, Partition::Train), 8);
    }

    #[test]
    fn small_sets_get_at_least_one_val() {
        let mut ex = examples(3);
        Partitioner::default().partition(&mut ex);
        assert_eq!(count(&ex, Partition::Val), 1);
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let partitioner = Partitioner::new(0.2, Some(42));
        let mut a = examples(25);
        let mut b = examples(25);
        partitioner.partition(&mut a);
        partitioner.partition(&mut b);
        let pick = |ex: &[CorpusExample]| -> Vec<u32> {
            ex.iter()
                .filter(|e| e.partition == Some(Partition::Val))
                .map(|e| e.key.page_num)
                .collect()
        };
        assert_eq!(pick(&a), pick(&b));
        assert_eq!(pick(&a).len(), 5);
    }

    #[test]
    fn repartition_overwrites() {
        let mut ex = examples(2);
        ex[1].partition = Some(Partition::Val);
        Partitioner::default().partition(&mut ex);
        assert_eq!(ex[1].partition, Some(Partition::Train));
    }
}
