#![allow(unused)]

//! # contract: seams between the publish pipeline and the outside world
//!
//! This module defines the traits the pipeline and the tool layer talk to,
//! plus the plain data types they exchange:
//!
//! - [`ObjectStore`]: upload a rendered document to an object-storage backend
//!   and hand back a durable (public or signed) URL.
//! - [`Expander`]: turn a short text into structured Markdown with a remote model.
//! - [`Fetcher`]: download Markdown text from a URL.
//! - [`Viewer`]: open a local file with the host's default viewer.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`; the mocks are exported behind the
//!   default `test-export-mocks` feature so the server crate can use them too.
//!
//! ## Adding New Backends
//! - Implement the trait in the server crate, next to the other clients.
//! - Convert upstream failures into the boxed error types below; callers only
//!   ever log or display them.

use std::path::Path;

use async_trait::async_trait;

use mockall::{automock, predicate::*};

/// Error type for object store operations (boxed, backend specific).
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for the text expansion call.
pub type ExpandError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for Markdown downloads.
pub type FetchError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for opening a file locally.
pub type ViewerError = Box<dyn std::error::Error + Send + Sync>;

/// Represents an object after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoredObject {
    /// Long-lived or signed access URL for the object.
    pub url: String,
    /// Object key inside the bucket.
    pub name: String,
}

/// Capability reference to one object-storage backend.
///
/// Implementations hold no per-request state and are shared read-only
/// between concurrent tool calls.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `local_path` under `remote_name`.
    ///
    /// A single failed attempt is reported as-is; there is no retry.
    async fn put(&self, local_path: &Path, remote_name: &str) -> Result<StoredObject, StoreError>;

    /// Delete an object by key.
    async fn delete(&self, remote_name: &str) -> Result<(), StoreError>;

    /// Check whether an object exists.
    async fn exists(&self, remote_name: &str) -> Result<bool, StoreError>;
}

/// Remote generative model that expands free text into Markdown.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Expander: Send + Sync {
    async fn expand(&self, text: &str) -> Result<String, ExpandError>;
}

/// Downloads Markdown source text.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

/// Opens a local document for the user.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Viewer: Send + Sync {
    async fn open(&self, path: &Path) -> Result<(), ViewerError>;
}
