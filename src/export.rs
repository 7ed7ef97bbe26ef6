//! Writing stream content to disk.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;

use crate::aggregator::{Entry, StreamKey};
use crate::error::{Result, StreamvizError};

/// Content of one stream at the moment of export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    /// Stream identity.
    pub key: StreamKey,
    /// Full retained content.
    pub content: String,
}

impl ExportRequest {
    /// Snapshots an entry.
    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            key: entry.key().clone(),
            content: entry.content().snapshot(),
        }
    }
}

/// Destination for exported streams. Implementations choose the location.
pub trait Exporter {
    /// Writes the content and returns where it went.
    fn export(&self, request: &ExportRequest) -> Result<PathBuf>;
}

/// Writes each export to a timestamped text file in one directory.
#[derive(Debug, Clone)]
pub struct FileExporter {
    dir: PathBuf,
}

impl FileExporter {
    /// Creates an exporter writing into `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `streamviz_export_<safe_id>_<index>_<YYYYmmdd_HHMMSS>.txt`
    pub fn file_name(key: &StreamKey, at: DateTime<Local>) -> String {
        format!(
            "streamviz_export_{}_{}_{}.txt",
            safe_id(&key.item_id),
            key.output_index,
            at.format("%Y%m%d_%H%M%S")
        )
    }

    fn write(path: &Path, content: &str) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        file.flush()
    }
}

impl Exporter for FileExporter {
    fn export(&self, request: &ExportRequest) -> Result<PathBuf> {
        let path = self.dir.join(Self::file_name(&request.key, Local::now()));
        Self::write(&path, &request.content).map_err(|source| StreamvizError::ExportFailed {
            path: path.clone(),
            source,
        })?;
        info!(stream = %request.key, path = %path.display(), bytes = request.content.len(), "exported stream");
        Ok(path)
    }
}

/// Replaces every character outside `[A-Za-z0-9_.-]` with `_`.
pub fn safe_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
