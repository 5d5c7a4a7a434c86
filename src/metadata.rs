//! Metadata cache and info object
//!
//! The logical [`Upload`] record lives as the JSON body of an `id.info` S3
//! object; the bound multipart `UploadId` and a protocol version string
//! ride along as that object's user metadata, since S3 user-metadata is
//! ASCII-only and would be lossy for arbitrary tus metadata values.

use crate::s3::{S3Client, S3ClientError};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Protocol version string recorded on every info object.
pub const TUS_VERSION: &str = "1.0.0";

/// The logical upload record, serialized as the info object's body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Upload {
    pub id: String,
    /// Total byte length; `None` iff creation used defer-length and the
    /// length has not yet been declared.
    pub size: Option<u64>,
    /// Bytes durably accepted so far.
    pub offset: u64,
    /// User-supplied tus metadata. A `contentType` key, if present, is
    /// propagated to the final S3 object.
    pub metadata: HashMap<String, String>,
}

impl Upload {
    pub fn new(id: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            id: id.into(),
            size,
            offset: 0,
            metadata: HashMap::new(),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.metadata.get("contentType").map(String::as_str)
    }
}

/// The cached tuple resolved by [`MetadataStore::get`].
#[derive(Debug, Clone)]
pub struct CachedUpload {
    pub upload: Upload,
    pub upload_id: String,
    pub tus_version: String,
}

fn info_key(id: &str) -> String {
    format!("{}.info", id)
}

/// Metadata cache backed by a `DashMap`, with S3 `id.info` objects as the
/// durable source of truth. Cache hits are advisory; the info object is
/// authoritative.
pub struct MetadataStore {
    cache: DashMap<String, CachedUpload>,
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Write the info object for `upload`, binding it to `upload_id`, and
    /// populate the cache.
    pub async fn save(
        &self,
        client: &S3Client,
        upload: &Upload,
        upload_id: &str,
    ) -> Result<(), S3ClientError> {
        let body = serde_json::to_vec(upload).map_err(|e| {
            S3ClientError::RequestError(format!("failed to serialize upload record: {e}"))
        })?;

        let user_metadata = vec![
            ("upload-id".to_string(), upload_id.to_string()),
            ("tus-version".to_string(), TUS_VERSION.to_string()),
        ];

        client
            .put_object(
                &info_key(&upload.id),
                bytes::Bytes::from(body),
                Some("application/json"),
                &user_metadata,
            )
            .await?;

        self.cache.insert(
            upload.id.clone(),
            CachedUpload {
                upload: upload.clone(),
                upload_id: upload_id.to_string(),
                tus_version: TUS_VERSION.to_string(),
            },
        );

        Ok(())
    }

    /// Return the cached tuple for `id`, fetching and caching the info
    /// object on a miss. A missing info object surfaces as
    /// [`S3ClientError::NotFound`].
    pub async fn get(
        &self,
        client: &S3Client,
        id: &str,
    ) -> Result<CachedUpload, S3ClientError> {
        if let Some(cached) = self.cache.get(id) {
            return Ok(cached.clone());
        }

        let response = client.get_object(&info_key(id)).await?;
        let upload: Upload = serde_json::from_slice(&response.body).map_err(|e| {
            S3ClientError::ResponseError(format!("failed to parse info object body: {e}"))
        })?;

        let upload_id = response
            .metadata
            .get("upload-id")
            .cloned()
            .ok_or_else(|| {
                S3ClientError::ResponseError("info object missing upload-id metadata".to_string())
            })?;
        let tus_version = response
            .metadata
            .get("tus-version")
            .cloned()
            .unwrap_or_else(|| TUS_VERSION.to_string());

        let cached = CachedUpload {
            upload,
            upload_id,
            tus_version,
        };
        self.cache.insert(id.to_string(), cached.clone());

        Ok(cached)
    }

    /// Drop the cache entry for `id`. Never touches S3.
    pub fn clear(&self, id: &str) {
        self.cache.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_content_type_lookup() {
        let mut upload = Upload::new("abc", Some(100));
        assert_eq!(upload.content_type(), None);
        upload
            .metadata
            .insert("contentType".to_string(), "text/plain".to_string());
        assert_eq!(upload.content_type(), Some("text/plain"));
    }

    #[test]
    fn clear_removes_cache_entry_only() {
        let store = MetadataStore::new();
        store.cache.insert(
            "abc".to_string(),
            CachedUpload {
                upload: Upload::new("abc", Some(10)),
                upload_id: "mpu-1".to_string(),
                tus_version: TUS_VERSION.to_string(),
            },
        );
        assert!(store.cache.contains_key("abc"));
        store.clear("abc");
        assert!(!store.cache.contains_key("abc"));
    }

    #[test]
    fn upload_roundtrips_through_json() {
        let mut upload = Upload::new("xyz", None);
        upload.offset = 42;
        upload
            .metadata
            .insert("filename".to_string(), "report.pdf".to_string());

        let json = serde_json::to_string(&upload).unwrap();
        let decoded: Upload = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, upload);
    }
}
