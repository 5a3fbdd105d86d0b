use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PlanmarkConfig;
use crate::corpus::normalize::to_normalized_box;
use crate::corpus::raw::{RawAnnotationFile, ValidatedAnnotation};
use crate::corpus::resolver::PageImageResolver;
use crate::error::{IngestError, IngestResult};
use crate::models::{CorpusExample, ImageRef, NormalizedBox, PageKey, SourceRecord};

/// Namespace for content fingerprints of raw annotation files.
const SOURCE_NAMESPACE: Uuid = Uuid::from_u128(0x6d1f_03a4_5b7e_4c21_9a0e_2f4c_8d13_b7e5);

/// Shared flag the caller flips to stop a running batch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Batch health counters reported after ingestion.
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub files_seen: usize,
    pub files_ingested: usize,
    /// Files skipped because identical content was already ingested.
    pub duplicates: usize,
    /// Objects dropped as malformed (missing type/points, fewer than two points).
    pub objects_skipped: usize,
    /// Well-formed objects whose kind is not a configured class.
    pub objects_ignored: usize,
    pub boxes_added: usize,
    pub errors: Vec<IngestError>,
    pub cancelled: bool,
}

impl IngestSummary {
    pub fn success_count(&self) -> usize {
        self.files_ingested
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Ingested { key: PageKey, boxes: usize },
    Duplicate { fingerprint: Uuid },
}

/// Per-batch aggregation state: the page key → corpus example map.
///
/// Created for one ingestion run and consumed by [`AggregationContext::finalize`].
/// All ingestion methods take `&self`; mutations of one example are
/// serialized by that example's lock, so files for different pages can be
/// ingested from several threads at once.
pub struct AggregationContext {
    id: Uuid,
    config: PlanmarkConfig,
    resolver: PageImageResolver,
    examples: RwLock<HashMap<PageKey, Arc<Mutex<CorpusExample>>>>,
    fingerprints: Mutex<HashSet<Uuid>>,
    summary: Mutex<IngestSummary>,
}

impl AggregationContext {
    pub fn new<P: AsRef<Path>>(images_root: P, config: PlanmarkConfig) -> Self {
        let resolver = PageImageResolver::new(images_root, &config.image_extensions);
        Self {
            id: Uuid::new_v4(),
            config,
            resolver,
            examples: RwLock::new(HashMap::new()),
            fingerprints: Mutex::new(HashSet::new()),
            summary: Mutex::new(IngestSummary::default()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn resolver(&self) -> &PageImageResolver {
        &self.resolver
    }

    /// Ingest every file in order. Stops early, without touching the
    /// remaining files, once `cancel` is set.
    pub fn ingest_all<P: AsRef<Path>>(&self, paths: &[P], cancel: &CancelToken) {
        for (idx, path) in paths.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("batch cancelled, {} files left unread", paths.len() - idx);
                lock(&self.summary).cancelled = true;
                return;
            }
            let _ = self.ingest_file(path.as_ref(), cancel);
        }
    }

    /// Ingest one raw annotation file. Failures are also recorded in the
    /// batch summary.
    pub fn ingest_file(&self, path: &Path, cancel: &CancelToken) -> IngestResult<IngestOutcome> {
        let result = std::fs::read(path)
            .map_err(|e| IngestError::Unreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
            .and_then(|bytes| {
                let raw = RawAnnotationFile::parse(&bytes, path)?;
                self.ingest_tracked(&bytes, raw, path, cancel)
            });
        self.record(result)
    }

    /// Ingest an in-memory record, e.g. admitted detection candidates.
    /// `origin` stands in for the file path in provenance and fallbacks.
    pub fn ingest_record(
        &self,
        record: &RawAnnotationFile,
        origin: &Path,
        cancel: &CancelToken,
    ) -> IngestResult<IngestOutcome> {
        let result = serde_json::to_vec(record)
            .map_err(|e| IngestError::Malformed {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })
            .and_then(|bytes| self.ingest_tracked(&bytes, record.clone(), origin, cancel));
        self.record(result)
    }

    fn ingest_tracked(
        &self,
        content: &[u8],
        raw: RawAnnotationFile,
        origin: &Path,
        cancel: &CancelToken,
    ) -> IngestResult<IngestOutcome> {
        let validated = raw.validate(origin)?;
        let tracking = self.config.track_sources;
        let fingerprint = source_fingerprint(&validated.key, content);
        // Reserve the fingerprint before committing so two threads holding
        // identical content for one page cannot both merge it.
        if tracking && !lock(&self.fingerprints).insert(fingerprint) {
            debug!(?origin, %fingerprint, "skipping already ingested content");
            return Ok(IngestOutcome::Duplicate { fingerprint });
        }

        let result = self.commit(validated, origin, cancel);
        if result.is_err() && tracking {
            lock(&self.fingerprints).remove(&fingerprint);
        }
        result
    }

    fn commit(
        &self,
        validated: ValidatedAnnotation,
        origin: &Path,
        cancel: &CancelToken,
    ) -> IngestResult<IngestOutcome> {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled(origin.to_path_buf()));
        }

        let image = self.resolver.resolve(&validated.key)?;
        let (boxes, ignored) = self.normalize_objects(&validated, &image);

        // Everything fallible is done; nothing below may leave a half-merged example.
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled(origin.to_path_buf()));
        }

        let entry = self.example_entry(&validated.key, &image);
        let mut example = lock(&entry);
        example.boxes.extend_from_slice(&boxes);
        example.sources.push(SourceRecord {
            origin: origin.to_path_buf(),
            boxes: boxes.len(),
            auto_detected: validated.auto_detected,
        });
        drop(example);

        let mut summary = lock(&self.summary);
        summary.objects_skipped += validated.skipped_objects;
        summary.objects_ignored += ignored;
        summary.boxes_added += boxes.len();
        drop(summary);

        debug!(
            key = %validated.key,
            ?origin,
            boxes = boxes.len(),
            skipped = validated.skipped_objects,
            "merged annotation file"
        );
        Ok(IngestOutcome::Ingested {
            key: validated.key,
            boxes: boxes.len(),
        })
    }

    fn normalize_objects(&self, validated: &ValidatedAnnotation, image: &ImageRef) -> (Vec<NormalizedBox>, usize) {
        let mut ignored = 0;
        let boxes = validated
            .objects
            .iter()
            .filter_map(|object| {
                let Some(class_id) = self.config.class_id(&object.kind) else {
                    ignored += 1;
                    return None;
                };
                to_normalized_box(class_id, &object.points, image.width, image.height)
            })
            .collect();
        (boxes, ignored)
    }

    fn example_entry(&self, key: &PageKey, image: &ImageRef) -> Arc<Mutex<CorpusExample>> {
        if let Some(entry) = read(&self.examples).get(key) {
            return entry.clone();
        }
        write(&self.examples)
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(CorpusExample::new(key.clone(), image.clone()))))
            .clone()
    }

    fn record(&self, result: IngestResult<IngestOutcome>) -> IngestResult<IngestOutcome> {
        let mut summary = lock(&self.summary);
        summary.files_seen += 1;
        match &result {
            Ok(IngestOutcome::Ingested { .. }) => summary.files_ingested += 1,
            Ok(IngestOutcome::Duplicate { .. }) => summary.duplicates += 1,
            Err(e) => {
                warn!(error = %e, "rejected annotation file");
                if matches!(e, IngestError::Cancelled(_)) {
                    summary.cancelled = true;
                }
                summary.errors.push(e.clone());
            }
        }
        result
    }

    /// Snapshot of the current corpus, ordered by page key.
    pub fn corpus(&self) -> BTreeMap<PageKey, CorpusExample> {
        read(&self.examples)
            .iter()
            .map(|(key, entry)| (key.clone(), lock(entry).clone()))
            .collect()
    }

    pub fn summary(&self) -> IngestSummary {
        lock(&self.summary).clone()
    }

    /// Close the ingest phase. The returned batch is the only input the
    /// partitioner and writer accept.
    pub fn finalize(self) -> FinalizedBatch {
        let summary = self.summary.into_inner().unwrap_or_else(|p| p.into_inner());
        let map = self.examples.into_inner().unwrap_or_else(|p| p.into_inner());
        let mut examples: Vec<CorpusExample> = map
            .into_values()
            .map(|entry| match Arc::try_unwrap(entry) {
                Ok(mutex) => mutex.into_inner().unwrap_or_else(|p| p.into_inner()),
                Err(shared) => lock(&shared).clone(),
            })
            .collect();
        examples.sort_by(|a, b| a.key.cmp(&b.key));

        info!(
            batch = %self.id,
            examples = examples.len(),
            files = summary.files_ingested,
            errors = summary.error_count(),
            duplicates = summary.duplicates,
            "ingestion finalized"
        );
        FinalizedBatch {
            id: self.id,
            examples,
            summary,
        }
    }
}

/// Quiesced output of one ingestion run, ordered by page key.
#[derive(Debug, Clone)]
pub struct FinalizedBatch {
    id: Uuid,
    examples: Vec<CorpusExample>,
    summary: IngestSummary,
}

impl FinalizedBatch {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn examples(&self) -> &[CorpusExample] {
        &self.examples
    }

    pub fn examples_mut(&mut self) -> &mut [CorpusExample] {
        &mut self.examples
    }

    pub fn summary(&self) -> &IngestSummary {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Drop examples without boxes; returns how many were dropped.
    pub fn retain_trainable(&mut self) -> usize {
        let before = self.examples.len();
        self.examples.retain(|e| !e.is_empty());
        before - self.examples.len()
    }

    pub fn origins(&self) -> Vec<PathBuf> {
        self.examples
            .iter()
            .flat_map(|e| e.sources.iter().map(|s| s.origin.clone()))
            .collect()
    }
}

/// Content fingerprint scoped to the page the content resolves to. Identical
/// bytes keyed to different pages (folder fallback) stay distinct sources.
fn source_fingerprint(key: &PageKey, content: &[u8]) -> Uuid {
    let mut name = Vec::with_capacity(key.project_id.len() + 6 + content.len());
    name.extend_from_slice(key.project_id.as_bytes());
    name.push(0);
    name.extend_from_slice(&key.page_num.to_le_bytes());
    name.push(0);
    name.extend_from_slice(content);
    Uuid::new_v5(&SOURCE_NAMESPACE, &name)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
