use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use image::ImageFormat;
use tracing::{debug, info, warn};

use crate::models::{CorpusExample, PageKey, Partition};

const IMAGES_DIR: &str = "images";
const LABELS_DIR: &str = "labels";
const MANIFEST_FILE: &str = "dataset.yaml";

/// Materializes a partitioned batch as an on-disk detection corpus:
///
/// ```text
/// <root>/images/{train,val}/<project>_p<page>.jpg
/// <root>/labels/{train,val}/<project>_p<page>.txt
/// <root>/dataset.yaml
/// ```
pub struct CorpusWriter {
    root: PathBuf,
    class_names: Vec<String>,
}

#[derive(Debug, Default)]
pub struct WriteReport {
    pub written: usize,
    pub boxes: usize,
    pub skipped_unassigned: usize,
    pub failed: Vec<(PageKey, String)>,
}

impl CorpusWriter {
    /// Prepare `root` for writing. The directory must be empty or absent
    /// unless `overwrite` is set, in which case its contents are removed.
    pub fn create<P: AsRef<Path>>(root: P, class_names: &[String], overwrite: bool) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        if root.exists() {
            let entries = fs::read_dir(&root)
                .with_context(|| format!("Failed to read output directory {:?}", root))?;
            if entries.count() > 0 {
                if !overwrite {
                    anyhow::bail!("Output directory is not empty: {}", root.display());
                }
                fs::remove_dir_all(&root)
                    .with_context(|| format!("Failed to clear output directory {:?}", root))?;
                info!(?root, "cleared previous corpus");
            }
        }

        for top in [IMAGES_DIR, LABELS_DIR] {
            for partition in [Partition::Train, Partition::Val] {
                let dir = root.join(top).join(partition.as_str());
                fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;
            }
        }

        Ok(Self {
            root,
            class_names: class_names.to_vec(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image_path(&self, key: &PageKey, partition: Partition) -> PathBuf {
        self.root
            .join(IMAGES_DIR)
            .join(partition.as_str())
            .join(format!("{}.jpg", key.stem()))
    }

    pub fn label_path(&self, key: &PageKey, partition: Partition) -> PathBuf {
        self.root
            .join(LABELS_DIR)
            .join(partition.as_str())
            .join(format!("{}.txt", key.stem()))
    }

    /// Write every assigned example plus the manifest. A failing example is
    /// reported and does not stop the rest.
    pub fn write_all(&self, examples: &[CorpusExample]) -> anyhow::Result<WriteReport> {
        let mut report = WriteReport::default();
        for example in examples {
            let Some(partition) = example.partition else {
                warn!(key = %example.key, "skipping example without partition");
                report.skipped_unassigned += 1;
                continue;
            };
            match self.write_example(example, partition) {
                Ok(()) => {
                    report.written += 1;
                    report.boxes += example.boxes.len();
                }
                Err(e) => {
                    warn!(key = %example.key, error = %e, "failed to write corpus example");
                    report.failed.push((example.key.clone(), format!("{:#}", e)));
                }
            }
        }
        self.write_manifest()?;
        info!(written = report.written, failed = report.failed.len(), root = ?self.root, "corpus written");
        Ok(report)
    }

    pub fn write_example(&self, example: &CorpusExample, partition: Partition) -> anyhow::Result<()> {
        let image_dest = self.image_path(&example.key, partition);
        self.copy_image(&example.image.path, &image_dest)?;

        let label_dest = self.label_path(&example.key, partition);
        let lines: Vec<String> = example.boxes.iter().map(|b| b.to_label_line()).collect();
        fs::write(&label_dest, lines.join("\n"))
            .with_context(|| format!("Failed to write labels {:?}", label_dest))?;

        debug!(key = %example.key, %partition, boxes = example.boxes.len(), "wrote corpus example");
        Ok(())
    }

    fn copy_image(&self, source: &Path, dest: &Path) -> anyhow::Result<()> {
        let is_jpeg = matches!(ImageFormat::from_path(source), Ok(ImageFormat::Jpeg));
        if is_jpeg {
            fs::copy(source, dest)
                .with_context(|| format!("Failed to copy image from {:?} to {:?}", source, dest))?;
            return Ok(());
        }
        let img = image::open(source).with_context(|| format!("Failed to open image {:?}", source))?;
        img.to_rgb8()
            .save_with_format(dest, ImageFormat::Jpeg)
            .with_context(|| format!("Failed to re-encode {:?} as JPEG", source))?;
        Ok(())
    }

    pub fn manifest(&self) -> String {
        let mut yaml = format!(
            "# Detection dataset configuration\npath: {}\ntrain: {}/{}\nval: {}/{}\n\nnames:\n",
            self.root.display(),
            IMAGES_DIR,
            Partition::Train,
            IMAGES_DIR,
            Partition::Val,
        );
        for (class_id, name) in self.class_names.iter().enumerate() {
            yaml.push_str(&format!("  {}: {}\n", class_id, name));
        }
        yaml
    }

    fn write_manifest(&self) -> anyhow::Result<()> {
        let path = self.root.join(MANIFEST_FILE);
        fs::write(&path, self.manifest()).with_context(|| format!("Failed to write manifest {:?}", path))
    }
}
