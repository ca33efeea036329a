//! Importer reading batches from JSON files on disk.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{ImporterError, MediaImporter};
use crate::media::{MediaItem, MediaType};
use crate::registry::Import;

/// Reads `<root>/<source>/<media-type>.json`, a JSON array of items.
///
/// The source directory is the source identifier with every character other
/// than ASCII alphanumerics, `-`, `_` and `.` replaced by `_`, so
/// `upnp://nas` maps to `upnp___nas`. A missing file is an empty batch.
pub struct JsonBatchImporter {
    root: PathBuf,
}

impl JsonBatchImporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the batch for one source and media type.
    pub fn batch_path(&self, source_id: &str, media_type: MediaType) -> PathBuf {
        self.root
            .join(source_dir_name(source_id))
            .join(format!("{}.json", media_type.as_str()))
    }
}

fn source_dir_name(source_id: &str) -> String {
    source_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl MediaImporter for JsonBatchImporter {
    fn name(&self) -> &str {
        "json-batch"
    }

    async fn retrieve(
        &self,
        import: &Import,
        media_type: MediaType,
    ) -> Result<Vec<MediaItem>, ImporterError> {
        let path = self.batch_path(&import.source.identifier, media_type);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No batch file, treating as empty");
                return Ok(Vec::new());
            }
            Err(source) => return Err(ImporterError::Io { path, source }),
        };

        let items: Vec<MediaItem> = serde_json::from_slice(&bytes)
            .map_err(|source| ImporterError::Malformed {
                path: path.clone(),
                source,
            })?;

        if let Some(item) = items.iter().find(|item| item.media_type() != media_type) {
            return Err(ImporterError::UnexpectedMediaType {
                expected: media_type,
                found: item.media_type(),
            });
        }

        debug!(
            path = %path.display(),
            media_type = %media_type,
            items = items.len(),
            "Read batch"
        );
        Ok(items)
    }
}
