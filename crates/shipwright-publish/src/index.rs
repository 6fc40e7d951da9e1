//! Package index implementations.

use async_trait::async_trait;
use shipwright_core::ports::PackageIndex;
use shipwright_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Filesystem-backed package index.
///
/// The destination directory is append-only: files land under their own
/// name via a staged copy + rename, and a name that already exists is
/// never rewritten. Safe under concurrent publish attempts by distinct
/// runs because identical identities are defined to collide safely.
pub struct DirIndex {
    root: PathBuf,
}

impl DirIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl PackageIndex for DirIndex {
    async fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.root.join(name).exists())
    }

    async fn store(&self, path: &Path) -> Result<()> {
        let name = path
            .file_name()
            .ok_or_else(|| Error::Internal(format!("Not a file: {}", path.display())))?
            .to_string_lossy()
            .to_string();

        tokio::fs::create_dir_all(&self.root).await?;

        let staging = self.root.join(format!(".tmp-{}", name));
        tokio::fs::copy(path, &staging).await?;
        tokio::fs::rename(&staging, self.root.join(&name)).await?;
        Ok(())
    }
}
