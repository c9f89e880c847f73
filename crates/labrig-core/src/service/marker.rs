//! Readiness marker: a side-channel file the backend writes its startup status to.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Terminal startup status read from a marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerStatus {
    Ready,
    Failed(String),
    /// Present but not a recognised terminal token; polling continues.
    Pending(String),
}

impl MarkerStatus {
    /// Classify the marker contents.
    pub fn parse(contents: &str) -> Self {
        let token = contents.trim();
        match token.to_ascii_lowercase().as_str() {
            "ready" | "started" | "ok" => MarkerStatus::Ready,
            "failed" | "error" => MarkerStatus::Failed(token.to_string()),
            _ => MarkerStatus::Pending(token.to_string()),
        }
    }
}

/// Read-once access to the marker.
#[async_trait]
pub trait ReadinessMarker: Send + Sync {
    /// Read and delete the marker. `None` when it does not exist yet.
    async fn consume(&self) -> std::io::Result<Option<MarkerStatus>>;

    /// Remove a leftover marker without reading it.
    async fn clear(&self) -> std::io::Result<()>;
}

/// Marker backed by a file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileReadinessMarker {
    path: PathBuf,
}

impl FileReadinessMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ReadinessMarker for FileReadinessMarker {
    async fn consume(&self) -> std::io::Result<Option<MarkerStatus>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        // A half-written marker is left in place for the next poll.
        if contents.trim().is_empty() {
            return Ok(None);
        }
        self.clear().await?;
        Ok(Some(MarkerStatus::parse(&contents)))
    }

    async fn clear(&self) -> std::io::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
