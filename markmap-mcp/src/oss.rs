//! # Aliyun OSS client (primary store)
//!
//! Implements [`ObjectStore`] against the OSS REST API with V1 header
//! signatures. Uploaded documents are returned as query-signed GET URLs so
//! that private buckets still yield a shareable link.
//!
//! Requests go to `https://<bucket>.<endpoint-host>/<key>`; set
//! [`OssConfig::path_style`] to address `<endpoint>/<bucket>/<key>` instead
//! (used against local emulators).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Method, StatusCode};
use thiserror::Error;
use tracing::{error, info};

use markmap_core::contract::{ObjectStore, StoreError, StoredObject};

use crate::sign;

/// Lifetime of the signed URLs handed back by [`OssStore::put`] (about five years).
pub const DEFAULT_SIGNED_URL_EXPIRY_SECS: u64 = 157_680_000;
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Debug, Error)]
pub enum OssError {
    #[error("invalid OSS endpoint {0:?}")]
    InvalidEndpoint(String),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("OSS request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("OSS returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Clone)]
pub struct OssConfig {
    pub access_key_id: String,
    pub access_key_secret: String,
    /// Endpoint with scheme, e.g. `https://oss-cn-beijing.aliyuncs.com`.
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub signed_url_expiry_secs: u64,
    pub path_style: bool,
}

impl std::fmt::Debug for OssConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OssConfig")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("signed_url_expiry_secs", &self.signed_url_expiry_secs)
            .field("path_style", &self.path_style)
            .finish()
    }
}

pub struct OssStore {
    config: OssConfig,
    http: reqwest::Client,
}

impl OssStore {
    pub fn new(config: OssConfig) -> Self {
        info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = %config.endpoint,
            "Initialised OSS store"
        );
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &OssConfig {
        &self.config
    }

    /// Unsigned address of an object.
    pub fn object_url(&self, key: &str) -> Result<String, OssError> {
        let base = reqwest::Url::parse(&self.config.endpoint)
            .map_err(|_| OssError::InvalidEndpoint(self.config.endpoint.clone()))?;
        let host = base
            .host_str()
            .ok_or_else(|| OssError::InvalidEndpoint(self.config.endpoint.clone()))?;
        let authority = match base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let key = sign::encode_key(key);
        Ok(if self.config.path_style {
            format!("{}://{authority}/{}/{key}", base.scheme(), self.config.bucket)
        } else {
            format!("{}://{}.{authority}/{key}", base.scheme(), self.config.bucket)
        })
    }

    fn signature(&self, verb: &str, content_type: &str, date: &str, key: &str) -> String {
        let string_to_sign = format!(
            "{verb}\n\n{content_type}\n{date}\n/{}/{key}",
            self.config.bucket
        );
        sign::base64(&sign::hmac_sha1(
            self.config.access_key_secret.as_bytes(),
            &string_to_sign,
        ))
    }

    /// `Authorization` header value for a request sent at `date` (RFC 1123, GMT).
    pub fn authorization(&self, verb: &str, content_type: &str, date: &str, key: &str) -> String {
        format!(
            "OSS {}:{}",
            self.config.access_key_id,
            self.signature(verb, content_type, date, key)
        )
    }

    /// GET URL carrying its own signature, valid until `expires` (unix seconds).
    pub fn signed_url(&self, key: &str, expires: i64) -> Result<String, OssError> {
        let signature = self.signature("GET", "", &expires.to_string(), key);
        Ok(format!(
            "{}?OSSAccessKeyId={}&Expires={expires}&Signature={}",
            self.object_url(key)?,
            urlencoding::encode(&self.config.access_key_id),
            urlencoding::encode(&signature)
        ))
    }

    async fn send(
        &self,
        method: Method,
        key: &str,
        content_type: &str,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, OssError> {
        let date = http_date(Utc::now());
        let authorization = self.authorization(method.as_str(), content_type, &date, key);
        let mut request = self
            .http
            .request(method, self.object_url(key)?)
            .header(header::DATE, date)
            .header(header::AUTHORIZATION, authorization);
        if !content_type.is_empty() {
            request = request.header(header::CONTENT_TYPE, content_type);
        }
        if let Some(body) = body {
            request = request.body(body);
        }
        Ok(request.send().await?)
    }

    pub async fn put_object(&self, local_path: &Path, key: &str) -> Result<StoredObject, OssError> {
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|source| OssError::Read {
                path: local_path.to_path_buf(),
                source,
            })?;
        info!(key, bytes = body.len(), "Uploading file to OSS");

        let response = self
            .send(Method::PUT, key, HTML_CONTENT_TYPE, Some(body))
            .await?;
        check_status(response).await?;

        let expires = Utc::now().timestamp() + self.config.signed_url_expiry_secs as i64;
        let url = self.signed_url(key, expires)?;
        info!(key, "OSS upload succeeded, signed URL generated");
        Ok(StoredObject {
            url,
            name: key.to_string(),
        })
    }
}

/// RFC 1123 date as OSS expects in the `Date` header.
pub fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, OssError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(status = status.as_u16(), %body, "OSS request rejected");
    Err(OssError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ObjectStore for OssStore {
    async fn put(&self, local_path: &Path, remote_name: &str) -> Result<StoredObject, StoreError> {
        self.put_object(local_path, remote_name).await.map_err(|e| {
            error!(error = %e, key = remote_name, "OSS upload failed");
            Box::new(e) as StoreError
        })
    }

    async fn delete(&self, remote_name: &str) -> Result<(), StoreError> {
        let response = self.send(Method::DELETE, remote_name, "", None).await?;
        check_status(response).await?;
        info!(key = remote_name, "Deleted OSS object");
        Ok(())
    }

    async fn exists(&self, remote_name: &str) -> Result<bool, StoreError> {
        let response = self.send(Method::HEAD, remote_name, "", None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store(path_style: bool) -> OssStore {
        OssStore::new(OssConfig {
            access_key_id: "id".to_string(),
            access_key_secret: "secret".to_string(),
            endpoint: "https://oss-cn-beijing.aliyuncs.com".to_string(),
            bucket: "demo-bucket".to_string(),
            region: "oss-cn-beijing".to_string(),
            signed_url_expiry_secs: DEFAULT_SIGNED_URL_EXPIRY_SECS,
            path_style,
        })
    }

    #[test]
    fn formats_http_date() {
        let at = Utc.with_ymd_and_hms(2026, 10, 17, 8, 0, 0).unwrap();
        assert_eq!(http_date(at), "Sat, 17 Oct 2026 08:00:00 GMT");
    }

    #[test]
    fn signs_put_requests() {
        let auth = store(false).authorization(
            "PUT",
            HTML_CONTENT_TYPE,
            "Sat, 17 Oct 2026 08:00:00 GMT",
            "markmap/a.html",
        );
        assert_eq!(auth, "OSS id:rh6/D+PP4lUxWIVK5MARsd/ykYA=");
    }

    #[test]
    fn builds_virtual_host_signed_url() {
        let url = store(false)
            .signed_url("markmap/a.html", 1_950_000_000)
            .unwrap();
        assert_eq!(
            url,
            "https://demo-bucket.oss-cn-beijing.aliyuncs.com/markmap/a.html\
             ?OSSAccessKeyId=id&Expires=1950000000&Signature=5V%2B1Ad49WwSc%2Fsg%2FGxSHCUfDcbg%3D"
        );
    }

    #[test]
    fn path_style_keeps_bucket_in_path() {
        assert_eq!(
            store(true).object_url("markmap/a.html").unwrap(),
            "https://oss-cn-beijing.aliyuncs.com/demo-bucket/markmap/a.html"
        );
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", store(false).config());
        assert!(!rendered.contains("\"secret\""));
        assert!(rendered.contains("<redacted>"));
    }
}
