use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::IngestError;
use crate::models::{ImageRef, PageKey};

/// Finds the backing image of a page key under `<images_root>/<project_id>/`.
///
/// Lookup order: `page_<NNN>.<ext>` and `page_<N>.<ext>` for each configured
/// extension, then the `page_num`-th image of the folder in filename order.
/// Results, failures included, are memoized per key so a page is scanned and
/// looked up at most once per resolver.
pub struct PageImageResolver {
    images_root: PathBuf,
    extensions: Vec<String>,
    memo: Mutex<HashMap<PageKey, Result<ImageRef, IngestError>>>,
}

impl PageImageResolver {
    pub fn new<P: AsRef<Path>>(images_root: P, extensions: &[String]) -> Self {
        Self {
            images_root: images_root.as_ref().to_path_buf(),
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn images_root(&self) -> &Path {
        &self.images_root
    }

    pub fn resolve(&self, key: &PageKey) -> Result<ImageRef, IngestError> {
        if let Some(cached) = self.lock_memo().get(key) {
            debug!(%key, "image resolution memo hit");
            return cached.clone();
        }

        // Resolve outside the lock; two racing callers at worst look up twice
        // and store identical results.
        let resolved = self.resolve_uncached(key);
        if let Err(e) = &resolved {
            warn!(%key, error = %e, "image resolution failed");
        }
        self.lock_memo()
            .entry(key.clone())
            .or_insert(resolved)
            .clone()
    }

    /// Number of page keys resolved so far (successfully or not).
    pub fn memoized(&self) -> usize {
        self.lock_memo().len()
    }

    fn lock_memo(&self) -> std::sync::MutexGuard<'_, HashMap<PageKey, Result<ImageRef, IngestError>>> {
        self.memo.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn resolve_uncached(&self, key: &PageKey) -> Result<ImageRef, IngestError> {
        let project_dir = self.images_root.join(&key.project_id);
        let path = self
            .find_by_pattern(&project_dir, key.page_num)
            .or_else(|| self.find_by_position(&project_dir, key.page_num))
            .ok_or_else(|| IngestError::ImageNotFound {
                key: key.clone(),
                dir: project_dir.clone(),
            })?;

        let (width, height) =
            image::image_dimensions(&path).map_err(|e| IngestError::ImageUnreadable {
                path: path.clone(),
                message: e.to_string(),
            })?;
        if width == 0 || height == 0 {
            return Err(IngestError::DegenerateImage { path });
        }

        debug!(%key, ?path, width, height, "resolved page image");
        Ok(ImageRef { path, width, height })
    }

    fn find_by_pattern(&self, dir: &Path, page_num: u32) -> Option<PathBuf> {
        self.extensions
            .iter()
            .flat_map(|ext| {
                [
                    format!("page_{:03}.{}", page_num, ext),
                    format!("page_{}.{}", page_num, ext),
                ]
            })
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    fn find_by_position(&self, dir: &Path, page_num: u32) -> Option<PathBuf> {
        let mut images = self.list_images(dir);
        images.sort();
        let path = images.into_iter().nth(page_num.checked_sub(1)? as usize)?;
        debug!(?path, page_num, "resolved page image by position");
        Some(path)
    }

    fn list_images(&self, dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && self.has_image_extension(path))
            .collect()
    }

    pub fn has_image_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }
}
