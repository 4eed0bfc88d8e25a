//! Typed upload slots for the three genomic inputs of an analysis.
//!
//! Files are validated on the way in (extension and size), summarized with a
//! human readable size and a record estimate, and kept at most once per
//! [`GenomicKind`]. Every change publishes the full current collection on a
//! `watch` channel.

use std::{path::Path, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::{
    domain::{GenomicKind, Notice},
    protocol::{UploadProgress, UploadSummary, REQUIRED_UPLOADS},
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
pub const ACCEPTED_EXTENSION: &str = ".parquet";
const DATA_URL_PREFIX: &str = "data:application/octet-stream;base64,";
const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("'{filename}' is not a .parquet file")]
    InvalidFileType { filename: String },
    #[error("'{filename}' is {size_bytes} bytes, above the {limit_bytes} byte limit")]
    FileTooLarge {
        filename: String,
        size_bytes: u64,
        limit_bytes: u64,
    },
    #[error("no uploaded file at index {index} ({len} uploaded)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    /// The notification shown to the user for this rejection.
    pub fn notice(&self) -> Notice {
        match self {
            UploadError::InvalidFileType { .. } => {
                Notice::destructive("Invalid file type", "Please upload .parquet files only")
            }
            UploadError::FileTooLarge { .. } => {
                Notice::destructive("File too large", "Please upload files smaller than 100MB")
            }
            UploadError::IndexOutOfRange { .. } => Notice::destructive(
                "File not found",
                "The selected genomic data file is no longer uploaded",
            ),
            UploadError::Read { .. } => {
                Notice::destructive("Upload failed", "The selected file could not be read")
            }
        }
    }
}

pub fn validate(filename: &str, size_bytes: u64, policy: &UploadPolicy) -> Result<(), UploadError> {
    if !filename.to_ascii_lowercase().ends_with(ACCEPTED_EXTENSION) {
        return Err(UploadError::InvalidFileType {
            filename: filename.to_string(),
        });
    }
    if size_bytes > policy.max_bytes {
        return Err(UploadError::FileTooLarge {
            filename: filename.to_string(),
            size_bytes,
            limit_bytes: policy.max_bytes,
        });
    }
    Ok(())
}

/// Formats a byte count as `0 Bytes`, `1.5 KB`, `100 MB`, ...
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", SIZE_UNITS[unit])
}

/// Rough record count: one record per KiB of file.
pub fn estimate_records(bytes: u64) -> u64 {
    bytes / 1024
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    kind: GenomicKind,
    filename: String,
    bytes: Arc<[u8]>,
    size: String,
    records: u64,
}

impl UploadedFile {
    pub fn new(
        kind: GenomicKind,
        filename: impl Into<String>,
        bytes: Vec<u8>,
        policy: &UploadPolicy,
    ) -> Result<Self, UploadError> {
        let filename = filename.into();
        let size_bytes = bytes.len() as u64;
        validate(&filename, size_bytes, policy)?;

        Ok(Self {
            kind,
            size: format_file_size(size_bytes),
            records: estimate_records(size_bytes),
            filename,
            bytes: bytes.into(),
        })
    }

    /// Reads an upload from disk, checking the size from metadata before
    /// pulling the contents into memory.
    pub async fn read(
        kind: GenomicKind,
        path: impl AsRef<Path>,
        policy: &UploadPolicy,
    ) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let read_error = |source| UploadError::Read {
            path: path.display().to_string(),
            source,
        };
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let metadata = tokio::fs::metadata(path).await.map_err(read_error)?;
        validate(&filename, metadata.len(), policy)?;

        let bytes = tokio::fs::read(path).await.map_err(read_error)?;
        debug!(%kind, path = %path.display(), size_bytes = bytes.len(), "read upload from disk");
        Self::new(kind, filename, bytes, policy)
    }

    pub fn kind(&self) -> GenomicKind {
        self.kind
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn size(&self) -> &str {
        &self.size
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Encodes the contents as a `data:` URL. Built per call, never cached.
    pub fn data_url(&self) -> String {
        format!("{DATA_URL_PREFIX}{}", STANDARD.encode(&self.bytes))
    }

    pub fn summary(&self, index: usize) -> UploadSummary {
        UploadSummary {
            index,
            kind: self.kind,
            filename: self.filename.clone(),
            size: self.size.clone(),
            records: self.records,
            size_bytes: self.size_bytes(),
        }
    }
}

pub fn uploaded_notice(kind: GenomicKind) -> Notice {
    Notice::info(
        "Genomic data uploaded",
        format!(
            "{} file has been uploaded successfully",
            kind.as_str().to_ascii_uppercase()
        ),
    )
}

pub fn removed_notice() -> Notice {
    Notice::info(
        "File removed",
        "Genomic data file has been removed from the analysis",
    )
}

/// At most one [`UploadedFile`] per kind, in upload order.
pub struct UploadSet {
    files: Vec<UploadedFile>,
    changes: watch::Sender<Vec<UploadSummary>>,
}

impl Default for UploadSet {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadSet {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(Vec::new());
        Self {
            files: Vec::with_capacity(REQUIRED_UPLOADS),
            changes,
        }
    }

    /// Receives the full collection after every change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<UploadSummary>> {
        self.changes.subscribe()
    }

    /// Inserts `file`, replacing the entry of the same kind in place.
    /// Returns the replaced file, if any.
    pub fn upsert(&mut self, file: UploadedFile) -> Option<UploadedFile> {
        let kind = file.kind();
        let replaced = match self.files.iter().position(|f| f.kind() == kind) {
            Some(index) => Some(std::mem::replace(&mut self.files[index], file)),
            None => {
                self.files.push(file);
                None
            }
        };

        info!(
            %kind,
            replaced = replaced.is_some(),
            uploaded = self.files.len(),
            "genomic upload stored"
        );
        self.publish();
        replaced
    }

    pub fn remove(&mut self, index: usize) -> Result<UploadedFile, UploadError> {
        if index >= self.files.len() {
            warn!(index, len = self.files.len(), "rejected removal of missing upload");
            return Err(UploadError::IndexOutOfRange {
                index,
                len: self.files.len(),
            });
        }

        let removed = self.files.remove(index);
        info!(kind = %removed.kind(), uploaded = self.files.len(), "genomic upload removed");
        self.publish();
        Ok(removed)
    }

    pub fn clear(&mut self) {
        if self.files.is_empty() {
            return;
        }
        self.files.clear();
        self.publish();
    }

    pub fn get(&self, kind: GenomicKind) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.kind() == kind)
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.files.len() == REQUIRED_UPLOADS
    }

    pub fn progress(&self) -> UploadProgress {
        UploadProgress::from_count(self.files.len())
    }

    pub fn summaries(&self) -> Vec<UploadSummary> {
        self.files
            .iter()
            .enumerate()
            .map(|(index, file)| file.summary(index))
            .collect()
    }

    fn publish(&self) {
        self.changes.send_replace(self.summaries());
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
