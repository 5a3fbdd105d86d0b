use std::path::PathBuf;

use thiserror::Error;

use crate::models::PageKey;

pub type IngestResult<T> = Result<T, IngestError>;

/// Reasons a whole raw annotation file is rejected during ingestion.
///
/// None of these abort a batch; they are collected into the batch summary.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    #[error("failed to read {path:?}: {message}")]
    Unreadable { path: PathBuf, message: String },

    #[error("malformed annotation record {path:?}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("no project id in {0:?} and no containing folder to fall back on")]
    MissingProject(PathBuf),

    #[error("project id {project_id:?} in {path:?} is not a plain folder name")]
    UnsafeProjectId { path: PathBuf, project_id: String },

    #[error("invalid page number {page_num} in {path:?}")]
    InvalidPageNumber { path: PathBuf, page_num: i64 },

    #[error("no image found for {key} under {dir:?}")]
    ImageNotFound { key: PageKey, dir: PathBuf },

    #[error("failed to read image {path:?}: {message}")]
    ImageUnreadable { path: PathBuf, message: String },

    #[error("image {path:?} has zero width or height")]
    DegenerateImage { path: PathBuf },

    #[error("ingestion cancelled before {0:?} was committed")]
    Cancelled(PathBuf),
}

impl IngestError {
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            IngestError::ImageNotFound { .. }
                | IngestError::ImageUnreadable { .. }
                | IngestError::DegenerateImage { .. }
        )
    }
}
