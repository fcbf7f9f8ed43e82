//! Attachment stager
//!
//! Holds files chosen by the user before submission and enforces the
//! count/type/size policy at staging time, so rejections surface before any
//! network call. Staged files are never mutated; a submission takes the whole
//! batch at once.

use std::path::{Path, PathBuf};

use crate::config::AttachmentConfig;
use crate::error::{Error, Result, StageError};
use crate::types::AttachmentId;

/// MIME type of `.docx` files
pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// MIME types the backend accepts as attachments
pub const ACCEPTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/heic",
    "image/heif",
    "text/plain",
    DOCX_MIME,
];

const MIB: u64 = 1024 * 1024;

/// Count/size limits applied by [`AttachmentStager::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentPolicy {
    pub max_files: usize,
    pub max_file_size: u64,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_files: 5,
            max_file_size: 20 * MIB,
        }
    }
}

impl From<&AttachmentConfig> for AttachmentPolicy {
    fn from(config: &AttachmentConfig) -> Self {
        Self {
            max_files: config.max_files,
            max_file_size: config.max_file_size_mb.saturating_mul(MIB),
        }
    }
}

/// A file selected by the user but not yet uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAttachment {
    pub id: AttachmentId,
    /// Location of the raw bytes, read at upload time
    pub path: PathBuf,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

impl StagedAttachment {
    /// Describe a file on disk, inferring its MIME type from the extension.
    ///
    /// Files with an unknown extension get `application/octet-stream` and are
    /// rejected by the stager's type check.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            id: AttachmentId::generate(),
            path: path.to_path_buf(),
            name,
            mime_type: mime_for_path(path).to_string(),
            size: metadata.len(),
        })
    }
}

/// Map a file extension to one of the accepted MIME types.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "txt" => "text/plain",
        "docx" => DOCX_MIME,
        _ => "application/octet-stream",
    }
}

/// Ordered set of staged attachments
#[derive(Debug, Default)]
pub struct AttachmentStager {
    policy: AttachmentPolicy,
    staged: Vec<StagedAttachment>,
}

impl AttachmentStager {
    pub fn new(policy: AttachmentPolicy) -> Self {
        Self {
            policy,
            staged: Vec::new(),
        }
    }

    /// Stage a file. Checks run in order: count, type, size.
    pub fn add(&mut self, file: StagedAttachment) -> std::result::Result<AttachmentId, StageError> {
        if self.staged.len() >= self.policy.max_files {
            return Err(StageError::TooMany {
                max: self.policy.max_files,
            });
        }
        if !ACCEPTED_MIME_TYPES.contains(&file.mime_type.as_str()) {
            return Err(StageError::UnsupportedType {
                mime: file.mime_type,
            });
        }
        if file.size > self.policy.max_file_size {
            return Err(StageError::TooLarge {
                size: file.size,
                limit: self.policy.max_file_size,
            });
        }

        let id = file.id.clone();
        tracing::debug!(attachment = %id, name = %file.name, size = file.size, "Staged attachment");
        self.staged.push(file);
        Ok(id)
    }

    /// Remove one staged file; unknown ids are ignored
    pub fn remove(&mut self, id: &AttachmentId) {
        self.staged.retain(|f| &f.id != id);
    }

    pub fn clear(&mut self) {
        self.staged.clear();
    }

    /// Hand the whole batch over to a submission
    pub fn take_all(&mut self) -> Vec<StagedAttachment> {
        std::mem::take(&mut self.staged)
    }

    pub fn staged(&self) -> &[StagedAttachment] {
        &self.staged
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.staged.len() >= self.policy.max_files
    }

    pub fn policy(&self) -> AttachmentPolicy {
        self.policy
    }
}
