//! Incomplete-part carry
//!
//! The trailing bytes of a PATCH that are smaller than the minimum S3
//! part size can't be uploaded as a part on their own. They are persisted
//! as a sibling `id.part` object and prepended to the next PATCH's first
//! chunk.

use crate::s3::{S3Client, S3ClientError};
use bytes::Bytes;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn carry_key(id: &str) -> String {
    format!("{}.part", id)
}

/// Persist the trailing sub-minimum bytes of a PATCH under `id.part`.
pub async fn upload_incomplete_part(
    client: &S3Client,
    id: &str,
    body: Bytes,
) -> Result<(), S3ClientError> {
    client.put_object(&carry_key(id), body, None, &[]).await?;
    Ok(())
}

/// Fetch the carry object for `id`, or `None` if absent. Any not-found
/// error is swallowed; all other errors propagate.
pub async fn get_incomplete_part(
    client: &S3Client,
    id: &str,
) -> Result<Option<Bytes>, S3ClientError> {
    match client.get_object(&carry_key(id)).await {
        Ok(resp) => Ok(Some(resp.body)),
        Err(S3ClientError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Prepend `carry` to the file at `chunk_path`, streaming through a
/// sibling temp file and atomically renaming over the original so a
/// crash leaves either the old or the new chunk intact. Returns the
/// number of carry bytes prepended.
///
/// On failure the sibling temp file is removed on a best-effort basis.
pub async fn prepend_incomplete_part(
    chunk_path: &Path,
    carry: &Bytes,
) -> std::io::Result<u64> {
    let sibling = chunk_path.with_extension("prepend.tmp");

    let result: std::io::Result<u64> = async {
        let mut sibling_file = tokio::fs::File::create(&sibling).await?;
        sibling_file.write_all(carry).await?;

        let mut original = tokio::fs::File::open(chunk_path).await?;
        let mut buf = Vec::new();
        original.read_to_end(&mut buf).await?;
        sibling_file.write_all(&buf).await?;
        sibling_file.flush().await?;
        drop(sibling_file);

        tokio::fs::rename(&sibling, chunk_path).await?;
        Ok(carry.len() as u64)
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&sibling).await;
    }

    result
}

/// Delete the carry object for `id`, if any.
pub async fn delete_incomplete_part(client: &S3Client, id: &str) -> Result<(), S3ClientError> {
    match client.delete_object(&carry_key(id)).await {
        Ok(()) => Ok(()),
        Err(S3ClientError::NotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}
