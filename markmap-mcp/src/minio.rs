//! MinIO / S3-compatible client (secondary store).
//!
//! Path-style requests signed with AWS Signature V4. The payload hash is
//! always computed and sent; uploads return a preview URL built from
//! `preview_url_base` when configured.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Method, StatusCode};
use thiserror::Error;
use tracing::{debug, error, info};

use markmap_core::contract::{ObjectStore, StoreError, StoredObject};

use crate::oss::HTML_CONTENT_TYPE;
use crate::sign;

pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Error)]
pub enum MinioError {
    #[error("invalid MinIO endpoint {0:?}")]
    InvalidEndpoint(String),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("MinIO request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("MinIO returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Clone)]
pub struct MinioConfig {
    pub access_key: String,
    pub secret_key: String,
    /// Endpoint with scheme, e.g. `http://10.0.0.5:9000`.
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub preview_url_base: Option<String>,
}

impl std::fmt::Debug for MinioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinioConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("preview_url_base", &self.preview_url_base)
            .finish()
    }
}

/// Headers to attach to one signed request.
#[derive(Debug)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub payload_hash: String,
    pub authorization: String,
}

pub struct MinioStore {
    config: MinioConfig,
    http: reqwest::Client,
}

impl MinioStore {
    pub fn new(config: MinioConfig) -> Self {
        info!(
            endpoint = %config.endpoint,
            bucket = %config.bucket,
            preview_url_base = ?config.preview_url_base,
            "Initialised MinIO store"
        );
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &MinioConfig {
        &self.config
    }

    fn canonical_uri(&self, key: &str) -> String {
        format!("/{}/{}", self.config.bucket, sign::encode_key(key))
    }

    fn host(&self) -> Result<String, MinioError> {
        let url = reqwest::Url::parse(&self.config.endpoint)
            .map_err(|_| MinioError::InvalidEndpoint(self.config.endpoint.clone()))?;
        let host = url
            .host_str()
            .ok_or_else(|| MinioError::InvalidEndpoint(self.config.endpoint.clone()))?;
        // `port()` is None for the scheme's default port, matching the Host header reqwest sends.
        Ok(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    /// Address the preview link points at.
    pub fn preview_url(&self, key: &str) -> String {
        let base = match &self.config.preview_url_base {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!(
                "{}/{}",
                self.config.endpoint.trim_end_matches('/'),
                self.config.bucket
            ),
        };
        format!("{base}/{}", sign::encode_key(key))
    }

    /// Sign a request for `key` as of `now`.
    pub fn sign(
        &self,
        method: &str,
        key: &str,
        content_type: Option<&str>,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<SignedHeaders, MinioError> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let payload_hash = sign::sha256_hex(payload);
        let host = self.host()?;

        let mut canonical_headers = String::new();
        let mut signed_headers = Vec::new();
        if let Some(content_type) = content_type {
            canonical_headers.push_str(&format!("content-type:{content_type}\n"));
            signed_headers.push("content-type");
        }
        canonical_headers.push_str(&format!(
            "host:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n"
        ));
        signed_headers.extend(["host", "x-amz-content-sha256", "x-amz-date"]);
        let signed_headers = signed_headers.join(";");

        let canonical_request = format!(
            "{method}\n{}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
            self.canonical_uri(key)
        );
        let scope = format!("{date_stamp}/{}/s3/aws4_request", self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            sign::sha256_hex(canonical_request.as_bytes())
        );
        debug!(%canonical_request, "Signing MinIO request");

        let k_date = sign::hmac_sha256(
            format!("AWS4{}", self.config.secret_key).as_bytes(),
            &date_stamp,
        );
        let k_region = sign::hmac_sha256(&k_date, &self.config.region);
        let k_service = sign::hmac_sha256(&k_region, "s3");
        let k_signing = sign::hmac_sha256(&k_service, "aws4_request");
        let signature = sign::hex(&sign::hmac_sha256(&k_signing, &string_to_sign));

        Ok(SignedHeaders {
            authorization: format!(
                "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
                self.config.access_key
            ),
            amz_date,
            payload_hash,
        })
    }

    async fn send(
        &self,
        method: Method,
        key: &str,
        content_type: Option<&str>,
        payload: Vec<u8>,
    ) -> Result<reqwest::Response, MinioError> {
        let signed = self.sign(method.as_str(), key, content_type, &payload, Utc::now())?;
        let url = format!(
            "{}{}",
            self.config.endpoint.trim_end_matches('/'),
            self.canonical_uri(key)
        );
        let mut request = self
            .http
            .request(method, url)
            .header("x-amz-date", signed.amz_date)
            .header("x-amz-content-sha256", signed.payload_hash)
            .header(header::AUTHORIZATION, signed.authorization);
        if let Some(content_type) = content_type {
            request = request.header(header::CONTENT_TYPE, content_type);
        }
        if !payload.is_empty() {
            request = request.body(payload);
        }
        Ok(request.send().await?)
    }

    pub async fn put_object(&self, local_path: &Path, key: &str) -> Result<StoredObject, MinioError> {
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|source| MinioError::Read {
                path: local_path.to_path_buf(),
                source,
            })?;
        info!(key, bytes = body.len(), "Uploading file to MinIO");

        let response = self
            .send(Method::PUT, key, Some(HTML_CONTENT_TYPE), body)
            .await?;
        check_status(response).await?;

        let url = self.preview_url(key);
        info!(key, %url, "MinIO upload succeeded");
        Ok(StoredObject {
            url,
            name: key.to_string(),
        })
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, MinioError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(status = status.as_u16(), %body, "MinIO request rejected");
    Err(MinioError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ObjectStore for MinioStore {
    async fn put(&self, local_path: &Path, remote_name: &str) -> Result<StoredObject, StoreError> {
        self.put_object(local_path, remote_name).await.map_err(|e| {
            error!(error = %e, key = remote_name, "MinIO upload failed");
            Box::new(e) as StoreError
        })
    }

    async fn delete(&self, remote_name: &str) -> Result<(), StoreError> {
        let response = self
            .send(Method::DELETE, remote_name, None, Vec::new())
            .await?;
        check_status(response).await?;
        info!(key = remote_name, "Deleted MinIO object");
        Ok(())
    }

    async fn exists(&self, remote_name: &str) -> Result<bool, StoreError> {
        let response = self.send(Method::HEAD, remote_name, None, Vec::new()).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response).await?;
        Ok(true)
    }
}
