//! S3-backed resumable upload store
//!
//! Persists arbitrarily large tus resumable uploads to an S3-compatible
//! object store by mapping tus's create/PATCH/HEAD/DELETE semantics onto
//! S3 Multipart Upload operations. Authentication, access control, and
//! the tus HTTP framing itself are the caller's responsibility; this
//! crate exposes only the [`coordinator::UploadStore`] trait.
//!
//! # Example
//!
//! ```no_run
//! use tus_s3_store::{Coordinator, CoordinatorConfig, Upload, UploadStore};
//! use tus_s3_store::s3::{S3Client, S3ClientConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = S3Client::new(S3ClientConfig {
//!     bucket: "uploads".into(),
//!     region: "us-east-1".into(),
//!     endpoint: None,
//!     access_key: None,
//!     secret_key: None,
//!     retry: None,
//!     timeout: None,
//! })?;
//!
//! let store = Coordinator::new(client, CoordinatorConfig::default());
//! let upload = Upload::new("my-upload-id", Some(1024));
//! store.create(upload).await?;
//! # Ok(())
//! # }
//! ```

pub mod carry;
pub mod coordinator;
pub mod error;
pub mod metadata;
pub mod metrics;
pub mod part_size;
pub mod s3;
pub mod splitter;

pub use coordinator::{Coordinator, CoordinatorConfig, UploadStore};
pub use error::{UploadError, UploadResult};
pub use metadata::Upload;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
