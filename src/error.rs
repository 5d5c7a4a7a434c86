//! Error taxonomy for the upload store
//!
//! Mirrors the three-kind split the tus HTTP layer expects: a missing info
//! object, an unrecoverable S3-side failure, and a local stream/filesystem
//! failure. The S3 HTTP client has its own lower-level `S3ClientError`
//! (see [`crate::s3::S3ClientError`]) which is folded into `StorageError`
//! at the coordinator boundary.

use thiserror::Error;

/// Errors surfaced by [`crate::UploadStore`] operations.
#[derive(Error, Debug)]
pub enum UploadError {
    /// The info object for an upload id is missing: either it never
    /// existed, or the upload has already been removed.
    #[error("upload not found: {0}")]
    FileNotFound(String),

    /// A non-recoverable S3 error. The provider's error code, if known,
    /// is preserved in the message.
    #[error("storage error: {0}")]
    StorageError(String),

    /// The input stream or local filesystem failed during `write`.
    #[error("stream error: {0}")]
    StreamError(String),
}

impl From<crate::s3::S3ClientError> for UploadError {
    fn from(err: crate::s3::S3ClientError) -> Self {
        match err {
            crate::s3::S3ClientError::NotFound(msg) => UploadError::FileNotFound(msg),
            other => UploadError::StorageError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        UploadError::StreamError(err.to_string())
    }
}

/// Result alias used throughout the store.
pub type UploadResult<T> = Result<T, UploadError>;
