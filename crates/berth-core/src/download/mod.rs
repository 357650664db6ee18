//! Download collaborator contract.
//!
//! Model assets (weight files) are fetched by a separate download service;
//! the orchestrator only asks where a finished download lives on disk.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadStatus {
    InProgress,
    Paused,
    Completed,
    Errored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Download {
    pub url: String,
    pub file_path: String,
    pub status: DownloadStatus,
    #[serde(default)]
    pub downloaded_bytes: u64,
    #[serde(default)]
    pub total_bytes: u64,
}

#[async_trait]
pub trait DownloadService: Send + Sync {
    /// Returns the finished download for `url`, or `None` when the asset is
    /// not available locally.
    async fn get_download(&self, url: &str) -> Result<Option<Download>>;
}
