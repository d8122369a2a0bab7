//! Path producer: turns a staged file into an ordered run of chunk messages.
//!
//! Every chunk is `CHUNK_SIZE` bytes except possibly the last. The file is read one chunk
//! ahead so the terminal flag can be set on the chunk that actually ends the file, and an
//! empty file still yields a single empty terminal chunk. All chunks are keyed by the
//! upload id, which keeps them on one partition and therefore in order.
//!
//! Chunks always name a file under the destination directory, never the staged file
//! itself, so reassembly cannot truncate the source it is still being read from.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use docket_broker::{Broker, Delivery};
use docket_core::models::{ChunkMessage, PathMessage};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::consumer::MessageHandler;
use crate::error::PipelineError;

/// Chunk payload size. Consumers must not rely on it.
pub const CHUNK_SIZE: usize = 512 * 1024;

/// Summary of one staged file's chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceReport {
    pub chunks: u64,
    pub bytes: u64,
    /// Bytes left unread because the declared size was reached first.
    pub unread_bytes: u64,
    pub destination: String,
}

pub struct PathProducer {
    broker: Arc<dyn Broker>,
    chunk_topic: String,
    destination_dir: PathBuf,
    chunk_size: usize,
    cancel: CancellationToken,
}

impl PathProducer {
    /// Chunks are addressed to `<destination_dir>/<staged file name>`.
    pub fn new(
        broker: Arc<dyn Broker>,
        chunk_topic: impl Into<String>,
        destination_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            broker,
            chunk_topic: chunk_topic.into(),
            destination_dir: destination_dir.into(),
            chunk_size: CHUNK_SIZE,
            cancel: CancellationToken::new(),
        }
    }

    /// Stops a run between chunk publishes once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Destination path the assembler should write for `message`. Fails when the staged
    /// path has no file name or already lives at the destination.
    pub fn destination_for(&self, message: &PathMessage) -> Result<String, PipelineError> {
        let staged = Path::new(&message.filepath);
        let destination = staged
            .file_name()
            .map(|file_name| self.destination_dir.join(file_name))
            .filter(|destination| destination.as_path() != staged)
            .ok_or_else(|| PipelineError::Destination {
                staged: staged.to_path_buf(),
            })?;
        Ok(destination.to_string_lossy().into_owned())
    }

    /// Reads the staged file and publishes its chunks.
    ///
    /// A read error aborts without a terminal chunk; the receiving assembler is then left
    /// for the janitor. Cancellation between chunks returns [`PipelineError::Cancelled`]
    /// so the path message is not committed and the run starts over after restart.
    #[tracing::instrument(skip(self, message), fields(upload_id = %message.uuid, filepath = %message.filepath))]
    pub async fn produce(&self, message: &PathMessage) -> Result<ProduceReport, PipelineError> {
        let staged = Path::new(&message.filepath);
        let destination = self.destination_for(message)?;
        let mut file = File::open(staged)
            .await
            .map_err(|e| PipelineError::io(staged, e))?;
        let actual_size = file
            .metadata()
            .await
            .map_err(|e| PipelineError::io(staged, e))?
            .len();
        let declared_size = u64::try_from(message.filesize).ok().filter(|size| *size > 0);
        if declared_size.is_some_and(|declared| declared != actual_size) {
            tracing::warn!(
                declared = message.filesize,
                actual = actual_size,
                "Staged file size differs from declared size"
            );
        }

        let key = message.uuid.message_key();

        let mut current = vec![0u8; self.chunk_size];
        let mut current_len = fill(&mut file, &mut current)
            .await
            .map_err(|e| PipelineError::io(staged, e))?;
        let mut next = vec![0u8; self.chunk_size];
        let mut index: u64 = 0;
        let mut sent: u64 = 0;

        loop {
            let cumulative = sent + current_len as u64;
            let declared_reached = declared_size.is_some_and(|declared| cumulative >= declared);
            let next_len = if declared_reached || current_len == 0 {
                0
            } else {
                fill(&mut file, &mut next)
                    .await
                    .map_err(|e| PipelineError::io(staged, e))?
            };
            let is_last = declared_reached || next_len == 0;

            let chunk = ChunkMessage {
                name: message.name.clone(),
                uuid: message.uuid,
                is_last_chunk: is_last,
                filepath: destination.clone(),
                chunk_data: current[..current_len].to_vec(),
                chunk_index: index,
                form_data: message.form_data.clone(),
                user_name: message.user_name.clone(),
                user_id: message.user_id.clone(),
            };
            let payload = chunk.to_bytes().map_err(|source| PipelineError::Encode {
                kind: "chunk",
                source,
            })?;
            if self.cancel.is_cancelled() {
                tracing::info!(chunk_index = index, "Chunking interrupted by shutdown");
                return Err(PipelineError::Cancelled);
            }
            self.broker
                .publish(&self.chunk_topic, &key, &payload)
                .await?;

            tracing::debug!(
                chunk_index = index,
                bytes = current_len,
                is_last_chunk = is_last,
                "Chunk published"
            );

            sent = cumulative;
            if is_last {
                break;
            }
            std::mem::swap(&mut current, &mut next);
            current_len = next_len;
            index += 1;
        }

        let unread_bytes = actual_size.saturating_sub(sent);
        if unread_bytes > 0 {
            tracing::warn!(
                unread_bytes,
                declared = message.filesize,
                "Declared size reached before end of file, remaining bytes not sent"
            );
        }

        tracing::info!(chunks = index + 1, bytes = sent, destination = %destination, "Staged file chunked");

        Ok(ProduceReport {
            chunks: index + 1,
            bytes: sent,
            unread_bytes,
            destination,
        })
    }
}

/// Reads until `buf` is full or the file ends. Returns the number of bytes read.
async fn fill(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[async_trait]
impl MessageHandler for PathProducer {
    async fn handle(&self, delivery: &Delivery) -> Result<(), PipelineError> {
        let message =
            PathMessage::from_slice(&delivery.payload).map_err(|source| PipelineError::Decode {
                kind: "path",
                source,
            })?;
        self.produce(&message).await.map(|_| ())
    }
}
