//! S3 HTTP client
//!
//! A hand-rolled SigV4-signed HTTP client against an S3-compatible endpoint.
//! It is the only thing in this crate that speaks to the object store; the
//! upload [`crate::coordinator`] never issues HTTP requests directly.
//!
//! # Example
//!
//! ```no_run
//! use tus_s3_store::s3::{S3Client, S3ClientConfig};
//! use bytes::Bytes;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = S3ClientConfig {
//!     bucket: "my-bucket".to_string(),
//!     region: "us-east-1".to_string(),
//!     endpoint: Some("http://localhost:9000".to_string()), // MinIO
//!     access_key: Some("minioadmin".to_string()),
//!     secret_key: Some("minioadmin".to_string()),
//!     retry: None,
//!     timeout: None,
//! };
//!
//! let client = S3Client::new(config)?;
//! let body = Bytes::from("Hello, World!");
//! let response = client.put_object("hello.txt", body, Some("text/plain"), &[]).await?;
//! println!("ETag: {}", response.etag);
//! # Ok(())
//! # }
//! ```
//!
//! # Implementation notes
//!
//! - Single-tag XML responses (`UploadId`, `ETag`) are read with a small
//!   string-matching helper, same as this client's original put/complete
//!   handlers. Multi-element responses (`ListParts`, `DeleteObjects`) are
//!   parsed with `quick-xml` instead, since string matching does not scale
//!   to repeated sibling elements.
//! - User metadata is carried as `x-amz-meta-*` request headers and is
//!   read back from response headers on `GetObject`/`HeadObject`.

pub mod credentials;

pub use credentials::{
    Credentials, CredentialsError, CredentialsProvider, CredentialsProviderTrait,
    EnvironmentCredentials, StaticCredentials,
};

use aws_sigv4::http_request::{
    sign, SignableBody, SignableRequest, SigningParams, SigningSettings,
};
use aws_sigv4::sign::v4;
use bytes::Bytes;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::SystemTime;
use thiserror::Error;

const USER_METADATA_PREFIX: &str = "x-amz-meta-";

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request error: {0}")]
    RequestError(String),

    #[error("Response error: {0}")]
    ResponseError(String),

    #[error("Signing error: {0}")]
    SigningError(String),

    /// Normalized "not found" across providers: a 404 status, or an XML
    /// `<Code>` of `NoSuchKey` / `NoSuchUpload` / `NotFound` (matched
    /// case-insensitively, since providers disagree on casing).
    #[error("not found: {0}")]
    NotFound(String),
}

/// Retry configuration for S3 operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Timeout configuration for S3 operations
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }
}

/// S3 Client configuration
#[derive(Debug, Clone)]
pub struct S3ClientConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub retry: Option<RetryConfig>,
    pub timeout: Option<TimeoutConfig>,
}

/// S3 Client
#[derive(Clone)]
pub struct S3Client {
    config: S3ClientConfig,
    http_client: reqwest::Client,
    retry_config: RetryConfig,
}

/// One page of a `ListParts` response.
#[derive(Debug, Clone)]
pub struct S3ListPartsPage {
    pub parts: Vec<S3Part>,
    /// `None` once the provider signals no further pages (a missing
    /// `NextPartNumberMarker`, or the "0" sentinel some providers send
    /// indefinitely).
    pub next_part_number_marker: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct S3Part {
    pub part_number: u32,
    pub etag: String,
    pub size: u64,
}

impl S3Client {
    /// Create a new S3 client
    pub fn new(config: S3ClientConfig) -> Result<Self, S3ClientError> {
        let timeout_config = config.timeout.clone().unwrap_or_default();
        let retry_config = config.retry.clone().unwrap_or_default();

        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_millis(
                timeout_config.connect_timeout_ms,
            ))
            .timeout(std::time::Duration::from_millis(
                timeout_config.request_timeout_ms,
            ))
            .build()
            .map_err(|e| S3ClientError::ConfigError(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
            retry_config,
        })
    }

    fn is_retryable_error(status: reqwest::StatusCode) -> bool {
        status.is_server_error()
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
    }

    fn calculate_backoff(&self, attempt: u32) -> std::time::Duration {
        let delay_ms = (self.retry_config.initial_backoff_ms as f64
            * self.retry_config.backoff_multiplier.powi(attempt as i32))
        .min(self.retry_config.max_backoff_ms as f64) as u64;

        std::time::Duration::from_millis(delay_ms)
    }

    fn compute_content_hash(body: &[u8]) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(body);
        hex::encode(hasher.finalize())
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    pub fn region(&self) -> &str {
        &self.config.region
    }

    pub fn endpoint(&self) -> String {
        self.config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.config.region))
    }

    fn get_host(&self) -> String {
        let endpoint = self.endpoint();
        if let Some(stripped) = endpoint.strip_prefix("https://") {
            stripped.split('/').next().unwrap_or(&endpoint).to_string()
        } else if let Some(stripped) = endpoint.strip_prefix("http://") {
            stripped.split('/').next().unwrap_or(&endpoint).to_string()
        } else {
            endpoint
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint(), self.config.bucket, key)
    }

    /// Extract a single tag's text content via string matching. Good
    /// enough for responses with one occurrence of the tag (`UploadId`,
    /// top-level `ETag`); `ListParts`/`DeleteObjects` use `quick-xml`
    /// instead since they repeat sibling elements.
    fn extract_xml_tag(xml: &str, tag: &str) -> Option<String> {
        let start_tag = format!("<{}>", tag);
        let end_tag = format!("</{}>", tag);

        let start_pos = xml.find(&start_tag)? + start_tag.len();
        let end_pos = xml[start_pos..].find(&end_tag)? + start_pos;

        Some(xml[start_pos..end_pos].to_string())
    }

    /// Classify a non-2xx response into a typed error, normalizing
    /// provider "not found" codes regardless of casing.
    fn classify_error(status: reqwest::StatusCode, body: &str) -> S3ClientError {
        if status == reqwest::StatusCode::NOT_FOUND {
            return S3ClientError::NotFound(format!("HTTP 404: {}", body));
        }

        if let Some(code) = Self::extract_xml_tag(body, "Code") {
            if Self::is_not_found_code(&code) {
                return S3ClientError::NotFound(format!("{}: {}", code, body));
            }
        }

        S3ClientError::ResponseError(format!("HTTP {}: {}", status.as_u16(), body))
    }

    /// `NoSuchUpload`, `NoSuchKey`, and plain `NotFound` are synonyms for
    /// "the thing we asked about doesn't exist", matched case-insensitively
    /// because providers disagree on casing (§9 open question).
    fn is_not_found_code(code: &str) -> bool {
        matches!(
            code.to_ascii_lowercase().as_str(),
            "nosuchupload" | "nosuchkey" | "notfound" | "nosuchbucket"
        )
    }

    fn sign_request(
        &self,
        method: &str,
        uri: &str,
        headers: &[(String, String)],
        body: &[u8],
    ) -> Result<Vec<(String, String)>, S3ClientError> {
        let access_key = self
            .config
            .access_key
            .as_ref()
            .ok_or_else(|| S3ClientError::SigningError("Missing access key".into()))?;
        let secret_key = self
            .config
            .secret_key
            .as_ref()
            .ok_or_else(|| S3ClientError::SigningError("Missing secret key".into()))?;

        let credentials = aws_credential_types::Credentials::new(
            access_key,
            secret_key,
            None,
            None,
            "tus-s3-store",
        );

        let identity = aws_smithy_runtime_api::client::identity::Identity::new(credentials, None);

        let settings = SigningSettings::default();

        let signing_params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.config.region)
            .name("s3")
            .time(SystemTime::now())
            .settings(settings)
            .build()
            .map_err(|e| S3ClientError::SigningError(e.to_string()))?;

        let signing_params = SigningParams::V4(signing_params);

        let signable_body = SignableBody::Bytes(body);
        let signable_request = SignableRequest::new(
            method,
            uri,
            headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            signable_body,
        )
        .map_err(|e| S3ClientError::SigningError(e.to_string()))?;

        let (signing_instructions, _signature) = sign(signable_request, &signing_params)
            .map_err(|e| S3ClientError::SigningError(e.to_string()))?
            .into_parts();

        let mut signed_headers = Vec::new();
        for (name, value) in signing_instructions.headers() {
            signed_headers.push((name.to_string(), value.to_string()));
        }

        Ok(signed_headers)
    }

    pub fn has_credentials(&self) -> bool {
        self.config.access_key.is_some() && self.config.secret_key.is_some()
    }

    /// Run `build_request` through the retry-with-backoff loop shared by
    /// all operations, returning the first successful response or the
    /// last error encountered.
    async fn send_with_retry(
        &self,
        mut build_request: impl FnMut() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, S3ClientError> {
        let mut last_error = None;
        for attempt in 0..=self.retry_config.max_retries {
            if attempt > 0 {
                let backoff = self.calculate_backoff(attempt - 1);
                tracing::debug!(
                    attempt = attempt,
                    backoff_ms = backoff.as_millis(),
                    "Retrying S3 request after backoff"
                );
                tokio::time::sleep(backoff).await;
            }

            let request = build_request();
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    if Self::is_retryable_error(status) && attempt < self.retry_config.max_retries
                    {
                        let error_body = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        tracing::warn!(
                            status = status.as_u16(),
                            attempt = attempt + 1,
                            error = %error_body,
                            "Retryable S3 error, will retry"
                        );
                        last_error = Some(Self::classify_error(status, &error_body));
                        continue;
                    }

                    let error_body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(Self::classify_error(status, &error_body));
                }
                Err(e) => {
                    if attempt < self.retry_config.max_retries {
                        tracing::warn!(attempt = attempt + 1, error = %e, "Network error, will retry");
                        last_error = Some(S3ClientError::RequestError(e.to_string()));
                        continue;
                    }
                    return Err(S3ClientError::RequestError(e.to_string()));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| S3ClientError::RequestError("All retries exhausted".to_string())))
    }

    fn metadata_headers(user_metadata: &[(String, String)]) -> Vec<(String, String)> {
        user_metadata
            .iter()
            .map(|(k, v)| {
                (
                    format!("{}{}", USER_METADATA_PREFIX, k.to_ascii_lowercase()),
                    v.clone(),
                )
            })
            .collect()
    }

    /// Upload an object to S3 (PutObject), with optional user metadata
    /// carried as `x-amz-meta-*` headers.
    #[tracing::instrument(
        name = "s3.put_object",
        skip(self, body, user_metadata),
        fields(
            s3.bucket = %self.config.bucket,
            s3.key = %key,
            http.method = "PUT",
            upload.bytes = body.len(),
            s3.etag = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
        user_metadata: &[(String, String)],
    ) -> Result<S3PutObjectResponse, S3ClientError> {
        let url = self.object_url(key);
        let content_hash = Self::compute_content_hash(&body);
        let meta_headers = Self::metadata_headers(user_metadata);

        let mut headers = vec![
            ("host".to_string(), self.get_host()),
            ("x-amz-content-sha256".to_string(), content_hash.clone()),
        ];
        if let Some(ct) = content_type {
            headers.push(("content-type".to_string(), ct.to_string()));
        }
        headers.extend(meta_headers.iter().cloned());

        let signed_headers = if self.has_credentials() {
            self.sign_request("PUT", &url, &headers, &body)?
        } else {
            vec![]
        };

        let response = self
            .send_with_retry(|| {
                let mut request = self.http_client.put(&url).body(body.clone());
                if let Some(ct) = content_type {
                    request = request.header("Content-Type", ct);
                }
                request = request.header("x-amz-content-sha256", &content_hash);
                for (name, value) in &meta_headers {
                    request = request.header(name, value);
                }
                for (name, value) in &signed_headers {
                    request = request.header(name, value);
                }
                request
            })
            .await?;

        let status = response.status();
        let etag = response
            .headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| S3ClientError::ResponseError("Missing ETag header".to_string()))?
            .to_string();

        let span = tracing::Span::current();
        span.record("s3.etag", etag.as_str());
        span.record("http.status_code", status.as_u16());

        tracing::info!(etag = %etag, status = status.as_u16(), "PutObject completed");

        Ok(S3PutObjectResponse { etag })
    }

    /// Fetch an object's body and its `x-amz-meta-*` user metadata.
    #[tracing::instrument(
        name = "s3.get_object",
        skip(self),
        fields(
            s3.bucket = %self.config.bucket,
            s3.key = %key,
            http.method = "GET",
            upload.bytes = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn get_object(&self, key: &str) -> Result<S3GetObjectResponse, S3ClientError> {
        let url = self.object_url(key);

        let signed_headers = if self.has_credentials() {
            let headers = vec![
                ("host".to_string(), self.get_host()),
                (
                    "x-amz-content-sha256".to_string(),
                    Self::compute_content_hash(b""),
                ),
            ];
            self.sign_request("GET", &url, &headers, b"")?
        } else {
            vec![]
        };

        let response = self
            .send_with_retry(|| {
                let mut request = self.http_client.get(&url);
                for (name, value) in &signed_headers {
                    request = request.header(name, value);
                }
                request
            })
            .await?;

        let status = response.status();
        let metadata = Self::extract_user_metadata(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| S3ClientError::ResponseError(e.to_string()))?;

        let span = tracing::Span::current();
        span.record("upload.bytes", body.len());
        span.record("http.status_code", status.as_u16());

        Ok(S3GetObjectResponse { body, metadata })
    }

    /// HEAD an object: returns size and user metadata without a body.
    #[tracing::instrument(
        name = "s3.head_object",
        skip(self),
        fields(
            s3.bucket = %self.config.bucket,
            s3.key = %key,
            http.method = "HEAD",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn head_object(&self, key: &str) -> Result<S3HeadObjectResponse, S3ClientError> {
        let url = self.object_url(key);

        let signed_headers = if self.has_credentials() {
            let headers = vec![
                ("host".to_string(), self.get_host()),
                (
                    "x-amz-content-sha256".to_string(),
                    Self::compute_content_hash(b""),
                ),
            ];
            self.sign_request("HEAD", &url, &headers, b"")?
        } else {
            vec![]
        };

        let response = self
            .send_with_retry(|| {
                let mut request = self.http_client.head(&url);
                for (name, value) in &signed_headers {
                    request = request.header(name, value);
                }
                request
            })
            .await?;

        let status = response.status();
        let metadata = Self::extract_user_metadata(response.headers());
        let content_length = response
            .headers()
            .get("Content-Length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        tracing::Span::current().record("http.status_code", status.as_u16());

        Ok(S3HeadObjectResponse {
            content_length,
            metadata,
        })
    }

    fn extract_user_metadata(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
        headers
            .iter()
            .filter_map(|(name, value)| {
                let name = name.as_str();
                name.strip_prefix(USER_METADATA_PREFIX)
                    .and_then(|k| value.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            })
            .collect()
    }

    /// Delete a single object.
    #[tracing::instrument(
        name = "s3.delete_object",
        skip(self),
        fields(
            s3.bucket = %self.config.bucket,
            s3.key = %key,
            http.method = "DELETE",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn delete_object(&self, key: &str) -> Result<(), S3ClientError> {
        let url = self.object_url(key);

        let signed_headers = if self.has_credentials() {
            let headers = vec![
                ("host".to_string(), self.get_host()),
                (
                    "x-amz-content-sha256".to_string(),
                    Self::compute_content_hash(b""),
                ),
            ];
            self.sign_request("DELETE", &url, &headers, b"")?
        } else {
            vec![]
        };

        let response = self
            .send_with_retry(|| {
                let mut request = self.http_client.delete(&url);
                for (name, value) in &signed_headers {
                    request = request.header(name, value);
                }
                request
            })
            .await?;

        tracing::Span::current().record("http.status_code", response.status().as_u16());
        Ok(())
    }

    /// Delete up to 1000 objects in a single `DeleteObjects` request.
    #[tracing::instrument(
        name = "s3.delete_objects",
        skip(self, keys),
        fields(
            s3.bucket = %self.config.bucket,
            keys_count = keys.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn delete_objects(&self, keys: &[String]) -> Result<(), S3ClientError> {
        if keys.is_empty() {
            return Ok(());
        }

        let url = format!("{}/{}?delete", self.endpoint(), self.config.bucket);

        let mut xml_objects = String::new();
        for key in keys {
            xml_objects.push_str(&format!("<Object><Key>{}</Key></Object>", xml_escape(key)));
        }
        let xml_body = format!("<Delete><Quiet>true</Quiet>{}</Delete>", xml_objects);
        let body_bytes = xml_body.into_bytes();
        let content_hash = Self::compute_content_hash(&body_bytes);

        let headers = vec![
            ("host".to_string(), self.get_host()),
            ("x-amz-content-sha256".to_string(), content_hash.clone()),
            ("content-type".to_string(), "application/xml".to_string()),
        ];

        let signed_headers = if self.has_credentials() {
            self.sign_request("POST", &url, &headers, &body_bytes)?
        } else {
            vec![]
        };

        let response = self
            .send_with_retry(|| {
                let mut request = self
                    .http_client
                    .post(&url)
                    .header("Content-Type", "application/xml")
                    .header("x-amz-content-sha256", &content_hash)
                    .body(body_bytes.clone());
                for (name, value) in &signed_headers {
                    request = request.header(name, value);
                }
                request
            })
            .await?;

        tracing::Span::current().record("http.status_code", response.status().as_u16());
        Ok(())
    }

    /// Create a multipart upload, optionally attaching user metadata and a
    /// content type (propagated to the final object on completion).
    #[tracing::instrument(
        name = "s3.create_multipart_upload",
        skip(self, user_metadata),
        fields(
            s3.bucket = %self.config.bucket,
            s3.key = %key,
            http.method = "POST",
            s3.upload_id = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: Option<&str>,
        user_metadata: &[(String, String)],
    ) -> Result<S3CreateMultipartUploadResponse, S3ClientError> {
        let url = format!("{}?uploads", self.object_url(key));
        let meta_headers = Self::metadata_headers(user_metadata);

        let response = self
            .send_with_retry(|| {
                let mut request = self.http_client.post(&url);
                if let Some(ct) = content_type {
                    request = request.header("Content-Type", ct);
                }
                for (name, value) in &meta_headers {
                    request = request.header(name, value);
                }
                request
            })
            .await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| S3ClientError::ResponseError(e.to_string()))?;

        let upload_id = Self::extract_xml_tag(&body, "UploadId").ok_or_else(|| {
            S3ClientError::ResponseError("Missing UploadId in response".to_string())
        })?;

        let span = tracing::Span::current();
        span.record("s3.upload_id", upload_id.as_str());
        span.record("http.status_code", status.as_u16());

        tracing::info!(upload_id = %upload_id, "CreateMultipartUpload completed");

        Ok(S3CreateMultipartUploadResponse { upload_id })
    }

    /// Upload a part in a multipart upload
    #[tracing::instrument(
        name = "s3.upload_part",
        skip(self, body),
        fields(
            s3.bucket = %self.config.bucket,
            s3.key = %key,
            s3.upload_id = %upload_id,
            s3.part_number = part_number,
            http.method = "PUT",
            upload.bytes = body.len(),
            s3.etag = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<S3UploadPartResponse, S3ClientError> {
        let url = format!(
            "{}?partNumber={}&uploadId={}",
            self.object_url(key),
            part_number,
            upload_id
        );

        let response = self
            .send_with_retry(|| self.http_client.put(&url).body(body.clone()))
            .await?;

        let status = response.status();
        let etag = response
            .headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| S3ClientError::ResponseError("Missing ETag header".to_string()))?
            .to_string();

        let span = tracing::Span::current();
        span.record("s3.etag", etag.as_str());
        span.record("http.status_code", status.as_u16());

        tracing::info!(etag = %etag, part_number = part_number, "UploadPart completed");

        Ok(S3UploadPartResponse { etag })
    }

    /// List the parts uploaded so far for a multipart upload, one page at
    /// a time. Callers drive pagination via `retrieveParts` in the
    /// coordinator; this method issues exactly one `ListParts` request.
    #[tracing::instrument(
        name = "s3.list_parts",
        skip(self),
        fields(
            s3.bucket = %self.config.bucket,
            s3.key = %key,
            s3.upload_id = %upload_id,
            http.method = "GET",
            part_number_marker = marker,
            parts_returned = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn list_parts(
        &self,
        key: &str,
        upload_id: &str,
        marker: Option<u32>,
    ) -> Result<S3ListPartsPage, S3ClientError> {
        let url = match marker {
            Some(m) => format!(
                "{}?uploadId={}&part-number-marker={}",
                self.object_url(key),
                upload_id,
                m
            ),
            None => format!("{}?uploadId={}", self.object_url(key), upload_id),
        };

        let response = self.send_with_retry(|| self.http_client.get(&url)).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| S3ClientError::ResponseError(e.to_string()))?;

        let parsed: ListPartsResultXml = quick_xml::de::from_str(&body).map_err(|e| {
            S3ClientError::ResponseError(format!("Failed to parse ListParts response: {}", e))
        })?;

        let next_part_number_marker = parsed
            .next_part_number_marker
            .as_deref()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|&n| n != 0);

        let parts = parsed
            .part
            .into_iter()
            .map(|p| S3Part {
                part_number: p.part_number,
                etag: p.e_tag,
                size: p.size,
            })
            .collect::<Vec<_>>();

        tracing::Span::current().record("parts_returned", parts.len());
        tracing::Span::current().record("http.status_code", status.as_u16());

        Ok(S3ListPartsPage {
            parts,
            next_part_number_marker,
        })
    }

    /// Complete a multipart upload
    #[tracing::instrument(
        name = "s3.complete_multipart_upload",
        skip(self, parts),
        fields(
            s3.bucket = %self.config.bucket,
            s3.key = %key,
            s3.upload_id = %upload_id,
            http.method = "POST",
            parts_count = parts.len(),
            s3.etag = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<S3CompletedPart>,
    ) -> Result<S3CompleteMultipartUploadResponse, S3ClientError> {
        let url = format!("{}?uploadId={}", self.object_url(key), upload_id);

        let mut xml_parts = String::new();
        for part in &parts {
            xml_parts.push_str(&format!(
                "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
                part.part_number, part.etag
            ));
        }
        let xml_body = format!("<CompleteMultipartUpload>{}</CompleteMultipartUpload>", xml_parts);

        let response = self
            .send_with_retry(|| {
                self.http_client
                    .post(&url)
                    .body(xml_body.clone())
                    .header("Content-Type", "application/xml")
            })
            .await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| S3ClientError::ResponseError(e.to_string()))?;

        let etag = Self::extract_xml_tag(&body, "ETag")
            .ok_or_else(|| S3ClientError::ResponseError("Missing ETag in response".to_string()))?;

        let span = tracing::Span::current();
        span.record("s3.etag", etag.as_str());
        span.record("http.status_code", status.as_u16());

        tracing::info!(etag = %etag, parts = parts.len(), "CompleteMultipartUpload completed");

        Ok(S3CompleteMultipartUploadResponse { etag })
    }

    /// Abort a multipart upload
    #[tracing::instrument(
        name = "s3.abort_multipart_upload",
        skip(self),
        fields(
            s3.bucket = %self.config.bucket,
            s3.key = %key,
            s3.upload_id = %upload_id,
            http.method = "DELETE",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn abort_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
    ) -> Result<(), S3ClientError> {
        let url = format!("{}?uploadId={}", self.object_url(key), upload_id);

        let response = self.send_with_retry(|| self.http_client.delete(&url)).await?;

        tracing::Span::current().record("http.status_code", response.status().as_u16());
        tracing::info!(upload_id = %upload_id, "AbortMultipartUpload completed");

        Ok(())
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListPartsResultXml {
    #[serde(default)]
    next_part_number_marker: Option<String>,
    #[serde(rename = "Part", default)]
    part: Vec<PartXml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PartXml {
    part_number: u32,
    #[serde(rename = "ETag")]
    e_tag: String,
    size: u64,
}

/// S3 PutObject response
#[derive(Debug, Clone)]
pub struct S3PutObjectResponse {
    pub etag: String,
}

/// S3 GetObject response: body plus user metadata headers.
#[derive(Debug, Clone)]
pub struct S3GetObjectResponse {
    pub body: Bytes,
    pub metadata: HashMap<String, String>,
}

/// S3 HeadObject response
#[derive(Debug, Clone)]
pub struct S3HeadObjectResponse {
    pub content_length: u64,
    pub metadata: HashMap<String, String>,
}

/// S3 CreateMultipartUpload response
#[derive(Debug, Clone)]
pub struct S3CreateMultipartUploadResponse {
    pub upload_id: String,
}

/// S3 UploadPart response
#[derive(Debug, Clone)]
pub struct S3UploadPartResponse {
    pub etag: String,
}

/// S3 CompleteMultipartUpload response
#[derive(Debug, Clone)]
pub struct S3CompleteMultipartUploadResponse {
    pub etag: String,
}

/// S3 completed part
#[derive(Debug, Clone)]
pub struct S3CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> S3ClientConfig {
        S3ClientConfig {
            bucket: "test-bucket".into(),
            region: "us-east-1".into(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            retry: None,
            timeout: None,
        }
    }

    #[test]
    fn test_s3_client_creation() {
        let client = S3Client::new(test_config()).unwrap();
        assert_eq!(client.bucket(), "test-bucket");
        assert_eq!(client.region(), "us-east-1");
    }

    #[test]
    fn test_default_endpoint() {
        let mut config = test_config();
        config.region = "us-west-2".into();
        let client = S3Client::new(config).unwrap();
        assert_eq!(client.endpoint(), "https://s3.us-west-2.amazonaws.com");
    }

    #[test]
    fn test_custom_endpoint() {
        let mut config = test_config();
        config.endpoint = Some("http://localhost:9000".into());
        let client = S3Client::new(config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9000");
    }

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff_ms, 100);
        assert_eq!(config.max_backoff_ms, 10_000);
        assert!((config.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_is_retryable_error() {
        use reqwest::StatusCode;
        assert!(S3Client::is_retryable_error(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(S3Client::is_retryable_error(StatusCode::TOO_MANY_REQUESTS));
        assert!(S3Client::is_retryable_error(StatusCode::REQUEST_TIMEOUT));
        assert!(!S3Client::is_retryable_error(StatusCode::BAD_REQUEST));
        assert!(!S3Client::is_retryable_error(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_content_hash_computation() {
        let hash = S3Client::compute_content_hash(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_calculate_backoff() {
        let mut config = test_config();
        config.retry = Some(RetryConfig {
            max_retries: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
        });
        let client = S3Client::new(config).unwrap();

        assert_eq!(client.calculate_backoff(0), std::time::Duration::from_millis(100));
        assert_eq!(client.calculate_backoff(1), std::time::Duration::from_millis(200));
        assert_eq!(client.calculate_backoff(10), std::time::Duration::from_millis(10_000));
    }

    #[test]
    fn test_is_not_found_code_case_insensitive() {
        assert!(S3Client::is_not_found_code("NoSuchUpload"));
        assert!(S3Client::is_not_found_code("nosuchupload"));
        assert!(S3Client::is_not_found_code("NOSUCHKEY"));
        assert!(S3Client::is_not_found_code("NotFound"));
        assert!(!S3Client::is_not_found_code("AccessDenied"));
    }

    #[test]
    fn test_classify_error_not_found_by_status() {
        let err = S3Client::classify_error(reqwest::StatusCode::NOT_FOUND, "");
        assert!(matches!(err, S3ClientError::NotFound(_)));
    }

    #[test]
    fn test_classify_error_not_found_by_code() {
        let body = "<Error><Code>NoSuchUpload</Code></Error>";
        let err = S3Client::classify_error(reqwest::StatusCode::BAD_REQUEST, body);
        assert!(matches!(err, S3ClientError::NotFound(_)));
    }

    #[test]
    fn test_classify_error_other() {
        let body = "<Error><Code>AccessDenied</Code></Error>";
        let err = S3Client::classify_error(reqwest::StatusCode::FORBIDDEN, body);
        assert!(matches!(err, S3ClientError::ResponseError(_)));
    }

    #[test]
    fn test_parse_list_parts_xml() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <ListPartsResult>
                <Part><PartNumber>1</PartNumber><ETag>"etag1"</ETag><Size>5242880</Size></Part>
                <Part><PartNumber>2</PartNumber><ETag>"etag2"</ETag><Size>1048576</Size></Part>
                <NextPartNumberMarker>2</NextPartNumberMarker>
            </ListPartsResult>"#;

        let parsed: ListPartsResultXml = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(parsed.part.len(), 2);
        assert_eq!(parsed.part[0].part_number, 1);
        assert_eq!(parsed.part[1].size, 1048576);
        assert_eq!(parsed.next_part_number_marker.as_deref(), Some("2"));
    }

    #[test]
    fn test_metadata_headers_lowercased() {
        let headers = S3Client::metadata_headers(&[("Upload-Id".to_string(), "abc".to_string())]);
        assert_eq!(headers[0].0, "x-amz-meta-upload-id");
        assert_eq!(headers[0].1, "abc");
    }
}
