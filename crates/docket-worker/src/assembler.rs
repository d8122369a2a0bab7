//! Chunk assembler: rebuilds uploads on disk from their chunk stream.
//!
//! Bytes are appended in arrival order; ordering comes from the per-upload partition, not
//! from seeking. `chunk_index` only decides three things: index 0 on a fresh assembler
//! truncates the destination, an index below the next expected one is a redelivered
//! duplicate and is dropped, and a fresh assembler whose first chunk is past 0 resumes
//! appending to what is already on disk.
//!
//! A write error or an index gap on a live assembler means the destination is missing
//! bytes. The assembler is then marked failed: later chunks are dropped, the terminal
//! chunk does not trigger completion, and the entry waits for the janitor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use docket_broker::Delivery;
use docket_core::models::ChunkMessage;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use crate::consumer::MessageHandler;
use crate::coordinator::{AssemblySummary, CompletionCoordinator, CompletionReport};
use crate::error::PipelineError;
use crate::registry::{Assembler, AssemblerRegistry};

#[derive(Debug)]
pub enum ChunkOutcome {
    Written { chunk_index: u64 },
    Duplicate { chunk_index: u64 },
    /// The upload already completed; the chunk was ignored.
    AlreadyComplete,
    /// The upload lost bytes earlier; the chunk was dropped.
    Failed { chunk_index: u64 },
    Completed(CompletionReport),
}

pub struct ChunkAssembler {
    registry: AssemblerRegistry,
    default_dir: PathBuf,
    coordinator: Arc<CompletionCoordinator>,
}

impl ChunkAssembler {
    pub fn new(
        registry: AssemblerRegistry,
        default_dir: impl Into<PathBuf>,
        coordinator: Arc<CompletionCoordinator>,
    ) -> Self {
        Self {
            registry,
            default_dir: default_dir.into(),
            coordinator,
        }
    }

    pub fn registry(&self) -> &AssemblerRegistry {
        &self.registry
    }

    /// The chunk's own path, or `<default_dir>/<name>_<uuid>` when it has none.
    pub fn destination_for(&self, chunk: &ChunkMessage) -> PathBuf {
        if chunk.filepath.trim().is_empty() {
            self.default_dir
                .join(format!("{}_{}", chunk.name, chunk.uuid))
        } else {
            PathBuf::from(&chunk.filepath)
        }
    }

    #[tracing::instrument(
        skip_all,
        fields(
            upload_id = %chunk.uuid,
            chunk_index = chunk.chunk_index,
            is_last_chunk = chunk.is_last_chunk
        )
    )]
    pub async fn handle_chunk(&self, chunk: ChunkMessage) -> Result<ChunkOutcome, PipelineError> {
        let entry = self.registry.get_or_insert_with(chunk.uuid, || {
            Assembler::new(chunk.name.clone(), self.destination_for(&chunk))
        });
        let mut assembler = entry.lock().await;

        if assembler.complete {
            tracing::debug!("Chunk for completed upload ignored");
            return Ok(ChunkOutcome::AlreadyComplete);
        }
        if assembler.failed {
            tracing::debug!("Chunk for failed upload dropped");
            return Ok(ChunkOutcome::Failed {
                chunk_index: chunk.chunk_index,
            });
        }

        if assembler.chunks_received > 0 {
            if chunk.chunk_index < assembler.next_index {
                tracing::warn!(
                    next_index = assembler.next_index,
                    "Duplicate chunk dropped"
                );
                return Ok(ChunkOutcome::Duplicate {
                    chunk_index: chunk.chunk_index,
                });
            }
            if chunk.chunk_index > assembler.next_index {
                tracing::error!(
                    next_index = assembler.next_index,
                    "Chunk index gap, upload marked failed"
                );
                mark_failed(&mut assembler);
                return Ok(ChunkOutcome::Failed {
                    chunk_index: chunk.chunk_index,
                });
            }
        } else if chunk.chunk_index > 0 {
            tracing::info!("Resuming upload on existing destination");
        }

        if let Err(e) = write_chunk(&mut assembler, &chunk).await {
            mark_failed(&mut assembler);
            return Err(e);
        }

        assembler.chunks_received += 1;
        assembler.next_index = chunk.chunk_index + 1;
        assembler.bytes_written += chunk.chunk_data.len() as u64;
        assembler.last_update = Instant::now();

        if !chunk.is_last_chunk {
            return Ok(ChunkOutcome::Written {
                chunk_index: chunk.chunk_index,
            });
        }

        if let Some(mut file) = assembler.file.take() {
            let destination = assembler.destination.clone();
            let synced = match file.flush().await {
                Ok(()) => file.sync_all().await,
                Err(e) => Err(e),
            };
            if let Err(e) = synced {
                mark_failed(&mut assembler);
                return Err(PipelineError::io(&destination, e));
            }
        }
        assembler.complete = true;

        let summary = AssemblySummary {
            upload_id: chunk.uuid,
            name: assembler.name.clone(),
            destination: assembler.destination.clone(),
            chunks: assembler.chunks_received,
            bytes: assembler.bytes_written,
        };
        drop(assembler);

        tracing::info!(
            destination = %summary.destination.display(),
            chunks = summary.chunks,
            bytes = summary.bytes,
            "Upload reassembled"
        );

        let report = self.coordinator.complete(&summary, &chunk).await;
        Ok(ChunkOutcome::Completed(report))
    }
}

fn mark_failed(assembler: &mut Assembler) {
    assembler.failed = true;
    assembler.file = None;
}

async fn write_chunk(assembler: &mut Assembler, chunk: &ChunkMessage) -> Result<(), PipelineError> {
    let destination = assembler.destination.clone();

    if assembler.file.is_none() {
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::io(parent, e))?;
        }

        let fresh = assembler.chunks_received == 0 && chunk.chunk_index == 0;
        let file = open_destination(&destination, fresh)
            .await
            .map_err(|e| PipelineError::io(&destination, e))?;
        assembler.file = Some(file);
    }

    if let Some(file) = assembler.file.as_mut() {
        file.write_all(&chunk.chunk_data)
            .await
            .map_err(|e| PipelineError::io(&destination, e))?;
    }
    Ok(())
}

async fn open_destination(path: &Path, truncate: bool) -> std::io::Result<tokio::fs::File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    options.open(path).await
}

#[async_trait]
impl MessageHandler for ChunkAssembler {
    async fn handle(&self, delivery: &Delivery) -> Result<(), PipelineError> {
        let chunk =
            ChunkMessage::from_slice(&delivery.payload).map_err(|source| PipelineError::Decode {
                kind: "chunk",
                source,
            })?;
        self.handle_chunk(chunk).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_core::models::FormData;
    use docket_core::UploadId;
    use docket_db::InMemoryFormStore;
    use tempfile::tempdir;

    fn chunk(id: UploadId, path: &Path, index: u64, data: &[u8], last: bool) -> ChunkMessage {
        ChunkMessage {
            name: "sample".to_string(),
            uuid: id,
            is_last_chunk: last,
            filepath: path.to_string_lossy().into_owned(),
            chunk_data: data.to_vec(),
            chunk_index: index,
            form_data: FormData::default(),
            user_name: String::new(),
            user_id: String::new(),
        }
    }

    fn assembler(default_dir: &Path) -> ChunkAssembler {
        ChunkAssembler::new(
            AssemblerRegistry::new(),
            default_dir,
            Arc::new(CompletionCoordinator::new()),
        )
    }

    #[tokio::test]
    async fn appends_chunks_and_completes_once() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("nested/deeper/out.bin");
        let ca = assembler(dir.path());
        let id = UploadId::new();

        ca.handle_chunk(chunk(id, &dest, 0, b"hello ", false)).await.unwrap();
        let outcome = ca.handle_chunk(chunk(id, &dest, 1, b"world", true)).await.unwrap();
        assert!(matches!(outcome, ChunkOutcome::Completed(_)));
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");

        let again = ca.handle_chunk(chunk(id, &dest, 1, b"world", true)).await.unwrap();
        assert!(matches!(again, ChunkOutcome::AlreadyComplete));
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn redelivered_chunk_is_not_appended_twice() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let ca = assembler(dir.path());
        let id = UploadId::new();

        ca.handle_chunk(chunk(id, &dest, 0, b"aa", false)).await.unwrap();
        ca.handle_chunk(chunk(id, &dest, 1, b"bb", false)).await.unwrap();
        let dup = ca.handle_chunk(chunk(id, &dest, 1, b"bb", false)).await.unwrap();
        assert!(matches!(dup, ChunkOutcome::Duplicate { chunk_index: 1 }));
        ca.handle_chunk(chunk(id, &dest, 2, b"cc", true)).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"aabbcc");
    }

    #[tokio::test]
    async fn first_chunk_truncates_stale_bytes() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        std::fs::write(&dest, b"leftover from an abandoned attempt").unwrap();
        let ca = assembler(dir.path());

        ca.handle_chunk(chunk(UploadId::new(), &dest, 0, b"fresh", true))
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn empty_filepath_uses_default_dir() {
        let dir = tempdir().unwrap();
        let ca = assembler(dir.path());
        let id = UploadId::new();
        let mut msg = chunk(id, Path::new(""), 0, b"x", true);
        msg.filepath = String::new();

        ca.handle_chunk(msg).await.unwrap();
        let expected = dir.path().join(format!("sample_{}", id));
        assert_eq!(std::fs::read(expected).unwrap(), b"x");
    }

    fn assembler_with_forms(default_dir: &Path, forms: &InMemoryFormStore) -> ChunkAssembler {
        ChunkAssembler::new(
            AssemblerRegistry::new(),
            default_dir,
            Arc::new(CompletionCoordinator::new().with_form_store(Arc::new(forms.clone()))),
        )
    }

    fn with_form(mut msg: ChunkMessage) -> ChunkMessage {
        msg.form_data = serde_json::from_value(serde_json::json!({"type": 1})).unwrap();
        msg
    }

    #[tokio::test]
    async fn write_failure_fails_the_upload_for_good() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"a file, not a directory").unwrap();
        let dest = blocker.join("out.bin");
        let forms = InMemoryFormStore::new();
        let ca = assembler_with_forms(dir.path(), &forms);
        let id = UploadId::new();

        let err = ca
            .handle_chunk(with_form(chunk(id, &dest, 0, b"first", false)))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));

        // The path becomes writable again, but chunk 0 is gone for good.
        std::fs::remove_file(&blocker).unwrap();
        let outcome = ca
            .handle_chunk(with_form(chunk(id, &dest, 1, b"last", true)))
            .await
            .unwrap();
        assert!(matches!(outcome, ChunkOutcome::Failed { chunk_index: 1 }));
        assert!(!dest.exists());
        assert!(forms.is_empty());

        let entry = ca.registry().get(&id).expect("assembler kept");
        let state = entry.lock().await;
        assert!(state.failed);
        assert!(!state.complete);
    }

    #[tokio::test]
    async fn index_gap_fails_the_upload() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let forms = InMemoryFormStore::new();
        let ca = assembler_with_forms(dir.path(), &forms);
        let id = UploadId::new();

        ca.handle_chunk(with_form(chunk(id, &dest, 0, b"aa", false)))
            .await
            .unwrap();
        let gap = ca
            .handle_chunk(with_form(chunk(id, &dest, 2, b"cc", true)))
            .await
            .unwrap();
        assert!(matches!(gap, ChunkOutcome::Failed { chunk_index: 2 }));

        // The missing chunk arriving late does not revive the upload.
        let late = ca
            .handle_chunk(with_form(chunk(id, &dest, 1, b"bb", false)))
            .await
            .unwrap();
        assert!(matches!(late, ChunkOutcome::Failed { chunk_index: 1 }));

        assert_eq!(std::fs::read(&dest).unwrap(), b"aa");
        assert!(forms.is_empty());
        assert!(!ca.registry().get(&id).unwrap().lock().await.complete);
    }
}
