//! High-level pipeline: orchestrates render → write → upload → cleanup → open.
//!
//! [`publish`] takes one [`PublishRequest`] and:
//!   - Renders the Markdown into a self-contained mind-map document
//!   - Writes it to the requested path, or to a fresh file in the scratch directory
//!   - Uploads it to the primary store and, best-effort, to the secondary store
//!   - Deletes or keeps the local copy according to the cleanup rule
//!   - Opens the local copy when asked to, nothing was published and the copy still exists
//!
//! # Error Handling
//! Only three things fail a call: a forced upload with no store configured,
//! a failed local write, and a failed primary upload under forced upload.
//! Everything else (secondary upload, cleanup, opening) is logged and swallowed.
//!
//! # Navigation
//! - Main entrypoint: [`publish`]
//! - Supporting types: [`PublishRequest`], [`PublishResult`], [`PublishError`].

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::contract::{ObjectStore, StoreError, StoredObject, Viewer};
use crate::render;

/// Key prefix for uploaded documents.
pub const REMOTE_PREFIX: &str = "markmap";

/// One publish invocation. Constructed per call and consumed once.
#[derive(Default)]
pub struct PublishRequest<'a> {
    /// Markdown to render; embedded verbatim in the document.
    pub content: &'a str,
    /// Explicit output file. When absent a unique scratch file is used.
    pub output_path: Option<PathBuf>,
    pub open_locally: bool,
    /// Make a successful primary upload a precondition of success.
    pub force_remote_upload: bool,
    pub primary_store: Option<&'a dyn ObjectStore>,
    pub secondary_store: Option<&'a dyn ObjectStore>,
}

impl std::fmt::Debug for PublishRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishRequest")
            .field("content_len", &self.content.len())
            .field("output_path", &self.output_path)
            .field("open_locally", &self.open_locally)
            .field("force_remote_upload", &self.force_remote_upload)
            .field("primary_store", &self.primary_store.is_some())
            .field("secondary_store", &self.secondary_store.is_some())
            .finish()
    }
}

/// Outcome of a successful [`publish`] call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PublishResult {
    /// Primary URL when the primary upload succeeded, else the filesystem
    /// path. The file may already have been removed by cleanup.
    pub local_path: String,
    pub rendered_content: String,
    pub primary_url: Option<String>,
    pub secondary_url: Option<String>,
    pub uploaded_to_primary: bool,
    pub uploaded_to_secondary: bool,
}

#[derive(Debug, Error)]
pub enum PublishError {
    /// A capability the caller demanded is not configured.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Forced upload to the primary store failed.
    #[error("upload to primary store failed: {0}")]
    Upload(String),
}

/// Run the publish pipeline for one request.
///
/// `scratch_dir` receives the document when no output path is given;
/// `viewer` is used for the local open step.
pub async fn publish(
    request: PublishRequest<'_>,
    scratch_dir: &Path,
    viewer: &dyn Viewer,
) -> Result<PublishResult, PublishError> {
    let PublishRequest {
        content,
        output_path,
        open_locally,
        force_remote_upload,
        primary_store,
        secondary_store,
    } = request;

    if force_remote_upload && primary_store.is_none() && secondary_store.is_none() {
        error!("[PUBLISH][ERROR] Forced upload requested but no object store is configured");
        return Err(PublishError::Configuration(
            "forced upload requires at least one configured object store".to_string(),
        ));
    }

    let explicit_output = output_path.is_some();
    let path = match output_path {
        Some(path) => path,
        None => {
            tokio::fs::create_dir_all(scratch_dir)
                .await
                .map_err(|source| PublishError::Write {
                    path: scratch_dir.to_path_buf(),
                    source,
                })?;
            scratch_dir.join(format!("markmap-{}.html", Uuid::new_v4()))
        }
    };
    info!(path = %path.display(), explicit_output, "[PUBLISH] Starting mind map generation");

    let html = render::embed_assets(&render::render_document(content), content);

    if let Err(source) = tokio::fs::write(&path, html.as_bytes()).await {
        error!(error = ?source, path = %path.display(), "[PUBLISH][ERROR] Failed to write document");
        return Err(PublishError::Write { path, source });
    }
    info!(path = %path.display(), bytes = html.len(), "[PUBLISH] Document written");

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("markmap-{}.html", Uuid::new_v4()));
    let remote_name = format!("{REMOTE_PREFIX}/{file_name}");

    let (primary, secondary) = upload_all(&path, &remote_name, primary_store, secondary_store).await;

    let should_cleanup = force_remote_upload || (!open_locally && !explicit_output);

    let primary_url = match primary {
        Some(Ok(object)) => {
            info!(url = %object.url, "[PUBLISH][UPLOAD] Primary upload succeeded");
            Some(object.url)
        }
        Some(Err(e)) if force_remote_upload => {
            error!(error = %e, "[PUBLISH][ERROR][UPLOAD] Primary upload failed under forced upload");
            if should_cleanup {
                remove_local(&path).await;
            }
            return Err(PublishError::Upload(e.to_string()));
        }
        Some(Err(e)) => {
            warn!(error = %e, path = %path.display(), "[PUBLISH][UPLOAD] Primary upload failed, keeping local document");
            None
        }
        None => None,
    };

    let secondary_url = match secondary {
        Some(Ok(object)) => {
            info!(url = %object.url, "[PUBLISH][UPLOAD] Secondary upload succeeded");
            Some(object.url)
        }
        Some(Err(e)) => {
            warn!(error = %e, "[PUBLISH][UPLOAD] Secondary upload failed");
            None
        }
        None => None,
    };

    let removed = should_cleanup && remove_local(&path).await;

    let uploaded_to_primary = primary_url.is_some();
    if open_locally && !uploaded_to_primary {
        if removed {
            warn!(path = %path.display(), "[PUBLISH] Local document was removed, not opening it");
        } else {
            match viewer.open(&path).await {
                Ok(()) => info!(path = %path.display(), "[PUBLISH] Opened document locally"),
                Err(e) => warn!(error = %e, path = %path.display(), "[PUBLISH] Failed to open document locally"),
            }
        }
    }

    Ok(PublishResult {
        local_path: primary_url
            .clone()
            .unwrap_or_else(|| path.display().to_string()),
        rendered_content: html,
        uploaded_to_secondary: secondary_url.is_some(),
        uploaded_to_primary,
        primary_url,
        secondary_url,
    })
}

type UploadOutcome = Option<Result<StoredObject, StoreError>>;

/// Upload to the configured stores. The secondary store is only used next to
/// a primary one; when both run they run concurrently.
async fn upload_all(
    path: &Path,
    remote_name: &str,
    primary: Option<&dyn ObjectStore>,
    secondary: Option<&dyn ObjectStore>,
) -> (UploadOutcome, UploadOutcome) {
    match (primary, secondary) {
        (Some(primary), Some(secondary)) => {
            debug!(remote_name, "[PUBLISH][UPLOAD] Uploading to primary and secondary stores");
            let (p, s) = futures::join!(
                primary.put(path, remote_name),
                secondary.put(path, remote_name)
            );
            (Some(p), Some(s))
        }
        (Some(primary), None) => {
            debug!(remote_name, "[PUBLISH][UPLOAD] Uploading to primary store");
            (Some(primary.put(path, remote_name).await), None)
        }
        (None, Some(_)) => {
            debug!("[PUBLISH][UPLOAD] Secondary store configured without a primary, skipping upload");
            (None, None)
        }
        (None, None) => (None, None),
    }
}

/// Returns whether the file is gone.
async fn remove_local(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!(path = %path.display(), "[PUBLISH] Removed local document");
            true
        }
        Err(e) => {
            warn!(error = ?e, path = %path.display(), "[PUBLISH] Failed to remove local document");
            false
        }
    }
}
