//! Operator status overrides backed by marker files

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::types::*;

/// Read-only view of operator overrides
#[async_trait]
pub trait StatusOverride: Send + Sync {
    async fn exists(&self, kind: StatusKind, name: &str) -> bool;

    /// An up marker wins over a down marker.
    async fn override_status(&self, name: &str) -> OverrideStatus {
        if self.exists(StatusKind::Up, name).await {
            OverrideStatus::ForcedUp
        } else if self.exists(StatusKind::Down, name).await {
            OverrideStatus::ForcedDown
        } else {
            OverrideStatus::None
        }
    }
}

/// Marker file at `<root>/<kind>/<name>` holding the operator's reason
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(root: impl AsRef<Path>, kind: StatusKind, name: &str) -> Self {
        Self {
            path: root.as_ref().join(kind.as_str()).join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn create(&self, reason: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, format!("{}\n", reason)).await?;
        Ok(())
    }

    pub async fn content(&self) -> Result<String> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        Ok(raw.trim_end().to_string())
    }

    pub async fn delete(&self) -> Result<()> {
        tokio::fs::remove_file(&self.path).await?;
        Ok(())
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

/// [`StatusOverride`] reading marker files under a root directory
#[derive(Debug, Clone)]
pub struct FileStatusOverride {
    root: PathBuf,
}

impl FileStatusOverride {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn file(&self, kind: StatusKind, name: &str) -> StatusFile {
        StatusFile::new(&self.root, kind, name)
    }
}

#[async_trait]
impl StatusOverride for FileStatusOverride {
    async fn exists(&self, kind: StatusKind, name: &str) -> bool {
        self.file(kind, name).exists().await
    }
}
