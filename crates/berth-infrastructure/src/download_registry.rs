//! Registry of downloaded model assets.

use async_trait::async_trait;
use std::sync::Arc;

use berth_core::download::{Download, DownloadService, DownloadStatus};
use berth_core::error::{BerthError, Result};

use crate::storage::StateFile;

/// Download collaborator backed by the `downloads` collection.
pub struct StateDownloadRegistry {
    downloads: Arc<StateFile<Vec<Download>>>,
}

impl StateDownloadRegistry {
    pub fn new(downloads: Arc<StateFile<Vec<Download>>>) -> Self {
        Self { downloads }
    }

    /// Inserts or replaces the record for `download.url`.
    pub fn register_download(&self, download: Download) -> Result<()> {
        if download.url.is_empty() {
            return Err(BerthError::validation("download url must not be empty"));
        }

        tracing::debug!(url = %download.url, status = ?download.status, "[DownloadRegistry] Registering");
        self.downloads.update(|downloads| {
            match downloads.iter_mut().find(|d| d.url == download.url) {
                Some(existing) => *existing = download,
                None => downloads.push(download),
            }
        });
        Ok(())
    }

    pub fn list_downloads(&self) -> Vec<Download> {
        self.downloads.snapshot()
    }
}

#[async_trait]
impl DownloadService for StateDownloadRegistry {
    /// Only completed downloads count as locally available.
    async fn get_download(&self, url: &str) -> Result<Option<Download>> {
        Ok(self.downloads.read(|downloads| {
            downloads
                .iter()
                .find(|d| d.url == url && d.status == DownloadStatus::Completed)
                .cloned()
        }))
    }
}
