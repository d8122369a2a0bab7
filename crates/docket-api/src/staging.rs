//! Staging writer: streams one multipart field into the staging directory.
//!
//! Staged names are `<YYYYMMDDHHMMSS>-<upload id><ext>`, unique per upload. A file that
//! fails midway is removed before the error is returned.

use std::path::{Path, PathBuf};

use axum::extract::multipart::{Field, MultipartError};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use docket_core::{AppError, UploadId};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

const MAX_EXTENSION_LEN: usize = 16;

/// Upper bound on a non-file multipart field (`name`, `formData`, `userName`, `userId`).
pub const MAX_TEXT_FIELD_BYTES: usize = 256 * 1024;

/// A fully written file in the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub file_name: String,
    /// File name the client sent, empty when it sent none.
    pub original_name: String,
    pub size: u64,
}

impl StagedFile {
    /// Best-effort removal, for uploads rejected after staging.
    pub async fn discard(&self) {
        remove_partial(&self.path).await;
    }
}

/// `<YYYYMMDDHHMMSS>-<id><ext>`, keeping the original extension when it looks sane.
pub fn staged_file_name(now: DateTime<Utc>, id: &UploadId, original_name: &str) -> String {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();
    format!("{}-{}{}", now.format("%Y%m%d%H%M%S"), id, extension)
}

/// Streams `field` to a new file under `dir`, failing once more than `max_bytes` arrive.
pub async fn stage_field(
    mut field: Field<'_>,
    dir: &Path,
    id: &UploadId,
    max_bytes: u64,
) -> Result<StagedFile, AppError> {
    let original_name = field.file_name().unwrap_or_default().to_string();
    let file_name = staged_file_name(Utc::now(), id, &original_name);
    let path = dir.join(&file_name);

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create staging directory: {}", e)))?;
    let mut file = File::create(&path)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create staged file: {}", e)))?;

    let mut size: u64 = 0;
    let written = loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break Ok(()),
            Err(e) => break Err(multipart_error(e)),
        };
        size += chunk.len() as u64;
        if size > max_bytes {
            break Err(AppError::PayloadTooLarge("file too large".to_string()));
        }
        if let Err(e) = file.write_all(&chunk).await {
            break Err(AppError::Storage(format!("Failed to write staged file: {}", e)));
        }
    };

    let finished = match written {
        Ok(()) => finish(&mut file).await,
        Err(e) => Err(e),
    };
    drop(file);

    if let Err(e) = finished {
        remove_partial(&path).await;
        return Err(e);
    }

    tracing::debug!(path = %path.display(), bytes = size, "Upload staged");
    Ok(StagedFile {
        path,
        file_name,
        original_name,
        size,
    })
}

/// Reads a non-file field as UTF-8 text, failing once more than `max_bytes` arrive.
pub async fn read_text_field(mut field: Field<'_>, max_bytes: usize) -> Result<String, AppError> {
    let name = field.name().unwrap_or_default().to_string();
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if buf.len() + chunk.len() > max_bytes {
            return Err(AppError::InvalidInput(format!(
                "Field '{}' exceeds {} bytes",
                name, max_bytes
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf)
        .map_err(|_| AppError::InvalidInput(format!("Field '{}' is not valid UTF-8", name)))
}

async fn finish(file: &mut File) -> Result<(), AppError> {
    file.flush()
        .await
        .map_err(|e| AppError::Storage(format!("Failed to flush staged file: {}", e)))?;
    file.sync_all()
        .await
        .map_err(|e| AppError::Storage(format!("Failed to sync staged file: {}", e)))
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged file");
        }
    }
}

/// Maps a multipart read failure; hitting the body limit means the file is too large.
pub fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("file too large".to_string())
    } else {
        AppError::InvalidInput(format!("Failed to read multipart body: {}", e.body_text()))
    }
}
