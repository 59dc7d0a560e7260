use std::path::Path;

use async_trait::async_trait;
use markmap_core::contract::{Viewer, ViewerError};
use tracing::info;

/// Opens documents in the host's default browser.
///
/// `webbrowser::open` can block until a text-mode browser exits, so it runs on
/// the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemViewer;

#[async_trait]
impl Viewer for SystemViewer {
    async fn open(&self, path: &Path) -> Result<(), ViewerError> {
        let target = path.to_string_lossy().into_owned();
        info!(path = %target, "Opening document in default browser");
        tokio::task::spawn_blocking(move || webbrowser::open(&target)).await??;
        Ok(())
    }
}
