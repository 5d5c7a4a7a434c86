//! Upload coordinator
//!
//! Orchestrates `create`/`write`/`read`/`getUpload`/`declareUploadLength`/
//! `remove` against the S3 multipart-upload state machine, driving chunk
//! splitting, the incomplete-part carry, and concurrent part uploads.

use crate::carry;
use crate::error::{UploadError, UploadResult};
use crate::metadata::{MetadataStore, Upload, TUS_VERSION};
use crate::part_size::{calc_optimal_part_size, MIN_PART_SIZE};
use crate::s3::{S3Client, S3ClientError, S3CompletedPart, S3Part};
use crate::splitter::{self, InputStream, SplitterEvent};
use bytes::Bytes;
use futures::{stream, Stream};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// tus extensions this store supports.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "creation",
    "creation-with-upload",
    "creation-defer-length",
    "termination",
];

/// The public store interface consumed by the surrounding tus HTTP layer.
#[async_trait::async_trait]
pub trait UploadStore: Send + Sync {
    async fn create(&self, upload: Upload) -> UploadResult<Upload>;
    async fn write(&self, body: InputStream, id: &str, offset: u64) -> UploadResult<u64>;
    async fn read(
        &self,
        id: &str,
    ) -> UploadResult<Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>>;
    async fn get_upload(&self, id: &str) -> UploadResult<Upload>;
    async fn declare_upload_length(&self, id: &str, length: u64) -> UploadResult<()>;
    async fn remove(&self, id: &str) -> UploadResult<()>;
    fn extensions(&self) -> &'static [&'static str];
}

/// Constructor options for [`Coordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Preferred S3 part size; must be between 5 MiB and 500 MiB.
    pub part_size: u64,
    /// Directory for the splitter's temporary chunk files.
    pub temp_dir: PathBuf,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            part_size: crate::part_size::DEFAULT_PREFERRED_PART_SIZE,
            temp_dir: std::env::temp_dir(),
        }
    }
}

/// Drives the S3 multipart state machine for every upload id in a single
/// bucket.
pub struct Coordinator {
    client: S3Client,
    metadata: MetadataStore,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(client: S3Client, config: CoordinatorConfig) -> Self {
        Self {
            client,
            metadata: MetadataStore::new(),
            config,
        }
    }

    /// Page through `ListParts`, returning the contiguous `1..k` prefix on
    /// the top-level call (no marker supplied). Some providers return the
    /// "0" sentinel indefinitely; `next_part_number_marker == 0` is
    /// treated as terminal by the S3 client layer already.
    async fn retrieve_parts(
        &self,
        id: &str,
        upload_id: &str,
        marker: Option<u32>,
    ) -> Result<Vec<S3Part>, S3ClientError> {
        let mut all_parts = Vec::new();
        let mut next_marker = marker;

        loop {
            let page = self.client.list_parts(id, upload_id, next_marker).await?;
            all_parts.extend(page.parts);
            match page.next_part_number_marker {
                Some(m) => next_marker = Some(m),
                None => break,
            }
        }

        if marker.is_some() {
            return Ok(all_parts);
        }

        all_parts.sort_by_key(|p| p.part_number);
        let mut prefix = Vec::with_capacity(all_parts.len());
        for (i, part) in all_parts.into_iter().enumerate() {
            if part.part_number == (i as u32) + 1 {
                prefix.push(part);
            } else {
                break;
            }
        }
        Ok(prefix)
    }

    async fn finish_multipart_upload(
        &self,
        id: &str,
        upload_id: &str,
        parts: &[S3Part],
    ) -> Result<(), S3ClientError> {
        let completed = parts
            .iter()
            .map(|p| S3CompletedPart {
                part_number: p.part_number,
                etag: p.etag.clone(),
            })
            .collect();
        self.client
            .complete_multipart_upload(id, upload_id, completed)
            .await?;
        Ok(())
    }
}

/// Outcome of uploading one chunk: the bytes it contributed to the
/// upload's offset (excluding any carried-over bytes already accounted
/// for in a prior PATCH).
struct ChunkOutcome {
    bytes_contributed: u64,
}

#[async_trait::async_trait]
impl UploadStore for Coordinator {
    #[tracing::instrument(name = "coordinator.create", skip(self, upload), fields(upload.id = %upload.id), err)]
    async fn create(&self, upload: Upload) -> UploadResult<Upload> {
        let content_type = upload.content_type().map(str::to_string);
        let user_metadata = vec![("tus-version".to_string(), TUS_VERSION.to_string())];

        let response = self
            .client
            .create_multipart_upload(&upload.id, content_type.as_deref(), &user_metadata)
            .await
            .map_err(UploadError::from)?;

        self.metadata
            .save(&self.client, &upload, &response.upload_id)
            .await
            .map_err(UploadError::from)?;

        tracing::info!(upload_id = %response.upload_id, "multipart upload created");
        Ok(upload)
    }

    #[tracing::instrument(name = "coordinator.write", skip(self, body), fields(upload.id = %id, offset, new_offset = tracing::field::Empty), err)]
    async fn write(&self, body: InputStream, id: &str, offset: u64) -> UploadResult<u64> {
        let cached = self.metadata.get(&self.client, id).await?;
        let size = cached
            .upload
            .size
            .ok_or_else(|| UploadError::StreamError("upload length not yet declared".into()))?;

        if offset >= size {
            return Ok(offset);
        }

        let existing_parts = self
            .retrieve_parts(id, &cached.upload_id, None)
            .await
            .map_err(UploadError::from)?;
        let mut part_number = existing_parts.len() as u32;

        let part_size = calc_optimal_part_size(size, self.config.part_size);
        let (tx, mut rx) = mpsc::channel(splitter::default_channel_capacity());
        let temp_dir = self.config.temp_dir.clone();

        let splitter_handle = tokio::spawn(async move {
            splitter::split_stream(body, part_size, &temp_dir, tx).await
        });

        let client = Arc::new(self.client.clone());
        let id_owned = id.to_string();
        let upload_id = cached.upload_id.clone();

        let mut join_set: JoinSet<Result<ChunkOutcome, UploadError>> = JoinSet::new();
        let mut chunk_number: u32 = 0;
        let mut offset_tracker = offset;
        let mut in_flight_path: Option<PathBuf> = None;

        while let Some(event) = rx.recv().await {
            match event {
                SplitterEvent::ChunkStarted { path } => {
                    in_flight_path = Some(path);
                }
                SplitterEvent::ChunkFinished { path, size: chunk_size } => {
                    in_flight_path = None;
                    part_number += 1;
                    let this_part_number = part_number;
                    let is_first_chunk = chunk_number == 0;
                    chunk_number += 1;
                    offset_tracker += chunk_size;
                    let is_final_part = offset_tracker == size;

                    let client = Arc::clone(&client);
                    let id_owned = id_owned.clone();
                    let upload_id = upload_id.clone();

                    join_set.spawn(async move {
                        upload_chunk(
                            &client,
                            &id_owned,
                            &upload_id,
                            this_part_number,
                            path,
                            chunk_size,
                            is_first_chunk,
                            is_final_part,
                        )
                        .await
                    });
                }
            }
        }

        match splitter_handle.await {
            Ok(Ok(_)) => {}
            Ok(Err((err, path))) => {
                if let Some(path) = path {
                    let _ = tokio::fs::remove_file(&path).await;
                }
                return Err(UploadError::StreamError(err.to_string()));
            }
            Err(join_err) => {
                return Err(UploadError::StreamError(join_err.to_string()));
            }
        }

        let mut bytes_uploaded: u64 = 0;
        let mut first_error: Option<UploadError> = None;
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(Ok(outcome)) => bytes_uploaded += outcome.bytes_contributed,
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        first_error = Some(UploadError::StreamError(join_err.to_string()));
                    }
                }
            }
        }

        if let Some(path) = in_flight_path {
            let _ = tokio::fs::remove_file(&path).await;
        }

        if let Some(err) = first_error {
            crate::metrics::record_upload_failure();
            crate::metrics::record_error("stream");
            return Err(err);
        }

        let new_offset = offset + bytes_uploaded;
        tracing::Span::current().record("new_offset", new_offset);

        if new_offset == size {
            let parts = self
                .retrieve_parts(id, &cached.upload_id, None)
                .await
                .map_err(UploadError::from)?;
            self.finish_multipart_upload(id, &cached.upload_id, &parts)
                .await
                .map_err(UploadError::from)?;
            self.metadata.clear(id);
            crate::metrics::record_multipart_upload_success(parts.len());
            tracing::info!(upload_id = %cached.upload_id, "multipart upload completed");
        }

        crate::metrics::record_upload_success(bytes_uploaded);
        Ok(new_offset)
    }

    #[tracing::instrument(name = "coordinator.read", skip(self), fields(upload.id = %id), err)]
    async fn read(
        &self,
        id: &str,
    ) -> UploadResult<Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>> {
        let response = self.client.get_object(id).await.map_err(UploadError::from)?;
        Ok(Box::pin(stream::once(async move { Ok(response.body) })))
    }

    #[tracing::instrument(name = "coordinator.get_upload", skip(self), fields(upload.id = %id), err)]
    async fn get_upload(&self, id: &str) -> UploadResult<Upload> {
        let cached = self.metadata.get(&self.client, id).await?;

        match self.retrieve_parts(id, &cached.upload_id, None).await {
            Ok(parts) => {
                let parts_sum: u64 = parts.iter().map(|p| p.size).sum();
                let incomplete = carry::get_incomplete_part(&self.client, id)
                    .await
                    .map_err(UploadError::from)?;
                let incomplete_size = incomplete.map(|b| b.len() as u64).unwrap_or(0);

                let mut upload = cached.upload;
                upload.offset = parts_sum + incomplete_size;
                Ok(upload)
            }
            Err(S3ClientError::NotFound(_)) => {
                let mut upload = cached.upload;
                if let Some(size) = upload.size {
                    upload.offset = size;
                }
                Ok(upload)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(name = "coordinator.declare_upload_length", skip(self), fields(upload.id = %id, length), err)]
    async fn declare_upload_length(&self, id: &str, length: u64) -> UploadResult<()> {
        let cached = self.metadata.get(&self.client, id).await?;
        let mut upload = cached.upload;
        upload.size = Some(length);

        self.metadata
            .save(&self.client, &upload, &cached.upload_id)
            .await
            .map_err(UploadError::from)?;

        Ok(())
    }

    #[tracing::instrument(name = "coordinator.remove", skip(self), fields(upload.id = %id), err)]
    async fn remove(&self, id: &str) -> UploadResult<()> {
        let cached = self.metadata.get(&self.client, id).await?;

        match self
            .client
            .abort_multipart_upload(id, &cached.upload_id)
            .await
        {
            Ok(()) => {}
            Err(S3ClientError::NotFound(_)) => {
                crate::metrics::record_error("not_found");
                return Err(UploadError::FileNotFound(id.to_string()));
            }
            Err(e) => {
                crate::metrics::record_error("storage");
                return Err(e.into());
            }
        }

        let keys = vec![
            id.to_string(),
            format!("{}.info", id),
            format!("{}.part", id),
        ];
        self.client
            .delete_objects(&keys)
            .await
            .map_err(UploadError::from)?;

        self.metadata.clear(id);
        crate::metrics::record_multipart_upload_failure();
        Ok(())
    }

    fn extensions(&self) -> &'static [&'static str] {
        SUPPORTED_EXTENSIONS
    }
}

#[allow(clippy::too_many_arguments)]
async fn upload_chunk(
    client: &S3Client,
    id: &str,
    upload_id: &str,
    part_number: u32,
    path: PathBuf,
    chunk_size: u64,
    is_first_chunk: bool,
    is_final_part: bool,
) -> Result<ChunkOutcome, UploadError> {
    let mut incomplete_size = 0u64;

    if is_first_chunk {
        if let Some(carry_bytes) = carry::get_incomplete_part(client, id)
            .await
            .map_err(UploadError::from)?
        {
            incomplete_size = carry_bytes.len() as u64;
            carry::prepend_incomplete_part(&path, &carry_bytes)
                .await
                .map_err(|e| UploadError::StreamError(e.to_string()))?;
            carry::delete_incomplete_part(client, id)
                .await
                .map_err(UploadError::from)?;
        }
    }

    let result = upload_chunk_inner(
        client,
        id,
        upload_id,
        part_number,
        &path,
        chunk_size + incomplete_size,
        is_final_part,
    )
    .await;

    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::warn!(path = %path.display(), error = %e, "failed to clean up chunk file");
    }

    result.map(|_| ChunkOutcome {
        bytes_contributed: chunk_size,
    })
}

async fn upload_chunk_inner(
    client: &S3Client,
    id: &str,
    upload_id: &str,
    part_number: u32,
    path: &std::path::Path,
    total_size: u64,
    is_final_part: bool,
) -> Result<(), UploadError> {
    let body = tokio::fs::read(path).await?;
    let body = Bytes::from(body);

    if total_size >= MIN_PART_SIZE || is_final_part {
        client
            .upload_part(id, upload_id, part_number, body)
            .await
            .map_err(UploadError::from)?;
    } else {
        let carried_bytes = body.len() as u64;
        carry::upload_incomplete_part(client, id, body)
            .await
            .map_err(UploadError::from)?;
        crate::metrics::record_carry_bytes(carried_bytes);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_extensions_match_creation_extensions() {
        assert_eq!(
            SUPPORTED_EXTENSIONS,
            &[
                "creation",
                "creation-with-upload",
                "creation-defer-length",
                "termination",
            ]
        );
    }

    #[test]
    fn coordinator_config_defaults_to_preferred_part_size() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.part_size, crate::part_size::DEFAULT_PREFERRED_PART_SIZE);
    }
}
