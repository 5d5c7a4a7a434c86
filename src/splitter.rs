//! Stream splitter
//!
//! Consumes a byte stream and writes it to a sequence of fixed-size
//! temporary files, emitting a [`SplitterEvent`] per chunk through a
//! bounded channel so the coordinator can track in-flight chunk files for
//! cleanup on error.

use bytes::Bytes;
use futures::Stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Channel capacity between the splitter and its consumer.
const EVENT_CHANNEL_CAPACITY: usize = 8;

/// An opaque input byte stream, as handed to the coordinator by the
/// surrounding tus HTTP layer.
pub type InputStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// One lifecycle event of a chunk file produced by the splitter.
#[derive(Debug, Clone)]
pub enum SplitterEvent {
    /// A new chunk file has been opened at `path` and is receiving bytes.
    ChunkStarted { path: PathBuf },
    /// The chunk file at `path` is closed and holds exactly `size` bytes.
    /// `size` is less than the configured chunk size only for the final
    /// chunk of the stream; it is never zero.
    ChunkFinished { path: PathBuf, size: u64 },
}

/// Errors produced while splitting an input stream into chunk files.
#[derive(Debug, thiserror::Error)]
pub enum SplitterError {
    #[error("temp file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("input stream error: {0}")]
    Stream(String),
}

/// Splits an opaque byte stream into `chunk_size`-sized temporary files
/// under `temp_dir`, pushing [`SplitterEvent`]s to `sender` as each chunk
/// starts and finishes.
///
/// On a stream read error, the path of the currently-open temp file is
/// returned in the error so the caller can delete it; no `ChunkFinished`
/// event is emitted for a partial file.
pub async fn split_stream(
    mut input: InputStream,
    chunk_size: u64,
    temp_dir: &Path,
    sender: mpsc::Sender<SplitterEvent>,
) -> Result<u64, (SplitterError, Option<PathBuf>)> {
    use futures::StreamExt;

    let mut total_bytes: u64 = 0;
    let mut current: Option<(PathBuf, File, u64)> = None;

    loop {
        let next = input.next().await;
        let chunk = match next {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                let path = current.map(|(p, _, _)| p);
                return Err((SplitterError::Stream(e.to_string()), path));
            }
            None => break,
        };

        let mut remaining = chunk;
        while !remaining.is_empty() {
            if current.is_none() {
                let path = temp_dir.join(format!("chunk-{}.tmp", uuid::Uuid::new_v4()));
                let file = File::create(&path)
                    .await
                    .map_err(|e| (SplitterError::Io(e), None))?;
                let _ = sender
                    .send(SplitterEvent::ChunkStarted { path: path.clone() })
                    .await;
                current = Some((path, file, 0));
            }

            let (path, file, written) = current.as_mut().unwrap();
            let space_left = chunk_size - *written;
            let take = space_left.min(remaining.len() as u64) as usize;
            let head = remaining.split_to(take);

            file.write_all(&head)
                .await
                .map_err(|e| (SplitterError::Io(e), Some(path.clone())))?;
            *written += head.len() as u64;
            total_bytes += head.len() as u64;

            if *written == chunk_size {
                let (path, mut file, size) = current.take().unwrap();
                file.flush()
                    .await
                    .map_err(|e| (SplitterError::Io(e), Some(path.clone())))?;
                let _ = sender
                    .send(SplitterEvent::ChunkFinished {
                        path: path.clone(),
                        size,
                    })
                    .await;
            }
        }
    }

    if let Some((path, mut file, size)) = current.take() {
        if size > 0 {
            file.flush()
                .await
                .map_err(|e| (SplitterError::Io(e), Some(path.clone())))?;
            let _ = sender
                .send(SplitterEvent::ChunkFinished { path, size })
                .await;
        } else {
            let _ = tokio::fs::remove_file(&path).await;
        }
    }

    Ok(total_bytes)
}

/// Default channel capacity exposed for callers constructing their own
/// `mpsc::channel`.
pub fn default_channel_capacity() -> usize {
    EVENT_CHANNEL_CAPACITY
}
