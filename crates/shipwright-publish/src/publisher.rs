//! Artifact merge and skip-existing publication.

use shipwright_artifacts::ArtifactStore;
use shipwright_core::events::Event;
use shipwright_core::ports::{EventSink, PackageIndex};
use shipwright_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    Uploaded,
    AlreadyPresent,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub name: String,
    pub status: PublishStatus,
    pub error: Option<String>,
}

/// Per-artifact results of one publish invocation.
#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    pub outcomes: Vec<PublishOutcome>,
}

impl PublishReport {
    pub fn uploaded(&self) -> usize {
        self.count(PublishStatus::Uploaded)
    }

    pub fn skipped(&self) -> usize {
        self.count(PublishStatus::AlreadyPresent)
    }

    pub fn failed(&self) -> usize {
        self.count(PublishStatus::Failed)
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, status: PublishStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

/// Merges committed slots and pushes each file to the package index.
///
/// Publication is best-effort: every artifact is attempted, failures are
/// aggregated, and an artifact already present at the destination is a
/// no-op success.
pub struct Publisher {
    index: Arc<dyn PackageIndex>,
}

impl Publisher {
    pub fn new(index: Arc<dyn PackageIndex>) -> Self {
        Self { index }
    }

    /// Flatten every slot matching `patterns` into `staging`, then
    /// publish each file it contains.
    pub async fn publish(
        &self,
        store: Arc<ArtifactStore>,
        patterns: Vec<String>,
        staging: PathBuf,
        sink: &dyn EventSink,
    ) -> Result<PublishReport> {
        let run_id = store.run_id();

        let merge_dir = staging.clone();
        let merged = tokio::task::spawn_blocking(move || store.merge(&patterns, &merge_dir))
            .await
            .map_err(|e| Error::Internal(format!("Merge task failed: {}", e)))??;

        info!(bundles = merged.len(), "Merged artifact slots");

        let mut files = collect_files(&staging)?;
        files.sort();

        let mut report = PublishReport::default();
        for path in files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let outcome = match self.index.contains(&name).await {
                Ok(true) => {
                    sink.emit(Event::PublishSkipped {
                        run_id,
                        name: name.clone(),
                    });
                    PublishOutcome {
                        name,
                        status: PublishStatus::AlreadyPresent,
                        error: None,
                    }
                }
                Ok(false) => match self.index.store(&path).await {
                    Ok(()) => {
                        sink.emit(Event::ArtifactPublished {
                            run_id,
                            name: name.clone(),
                        });
                        PublishOutcome {
                            name,
                            status: PublishStatus::Uploaded,
                            error: None,
                        }
                    }
                    Err(e) => {
                        error!(artifact = %name, error = %e, "Publish failed");
                        PublishOutcome {
                            name,
                            status: PublishStatus::Failed,
                            error: Some(e.to_string()),
                        }
                    }
                },
                Err(e) => {
                    error!(artifact = %name, error = %e, "Index lookup failed");
                    PublishOutcome {
                        name,
                        status: PublishStatus::Failed,
                        error: Some(e.to_string()),
                    }
                }
            };

            report.outcomes.push(outcome);
        }

        Ok(report)
    }
}

fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            files.extend(collect_files(&path)?);
        } else {
            files.push(path);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::DirIndex;
    use async_trait::async_trait;
    use shipwright_core::ids::RunId;
    use shipwright_core::ports::NullSink;
    use std::path::PathBuf;

    fn seeded_store(names: &[&str]) -> (tempfile::TempDir, Arc<ArtifactStore>) {
        let base = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(base.path(), RunId::new()).unwrap();
        for name in names {
            let ws = tempfile::tempdir().unwrap();
            let dist = ws.path().join("dist");
            std::fs::create_dir_all(&dist).unwrap();
            std::fs::write(dist.join(format!("{}.whl", name)), name.as_bytes()).unwrap();
            store
                .put(
                    &format!("wheel-{}", name),
                    &format!("build-{}", name),
                    &[PathBuf::from("dist")],
                    ws.path(),
                )
                .unwrap();
        }
        (base, Arc::new(store))
    }

    #[tokio::test]
    async fn test_publish_uploads_all() {
        let (_base, store) = seeded_store(&["x86_64", "aarch64"]);
        let dest = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();

        let publisher = Publisher::new(Arc::new(DirIndex::new(dest.path())));
        let report = publisher
            .publish(
                store,
                vec!["wheel-*".to_string()],
                staging.path().to_path_buf(),
                &NullSink,
            )
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.uploaded(), 2);
        assert!(dest.path().join("x86_64.whl").exists());
        assert!(dest.path().join("aarch64.whl").exists());
    }

    #[tokio::test]
    async fn test_publish_twice_is_idempotent() {
        let (_base, store) = seeded_store(&["x86_64"]);
        let dest = tempfile::tempdir().unwrap();

        let publisher = Publisher::new(Arc::new(DirIndex::new(dest.path())));

        let staging1 = tempfile::tempdir().unwrap();
        let first = publisher
            .publish(
                store.clone(),
                vec!["wheel-*".to_string()],
                staging1.path().to_path_buf(),
                &NullSink,
            )
            .await
            .unwrap();
        assert_eq!(first.uploaded(), 1);
        assert_eq!(first.skipped(), 0);

        let staging2 = tempfile::tempdir().unwrap();
        let second = publisher
            .publish(
                store,
                vec!["wheel-*".to_string()],
                staging2.path().to_path_buf(),
                &NullSink,
            )
            .await
            .unwrap();
        assert!(second.is_success());
        assert_eq!(second.uploaded(), 0);
        assert_eq!(second.skipped(), 1);
    }

    struct RejectingIndex {
        reject: String,
        inner: DirIndex,
    }

    #[async_trait]
    impl shipwright_core::ports::PackageIndex for RejectingIndex {
        async fn contains(&self, name: &str) -> shipwright_core::Result<bool> {
            self.inner.contains(name).await
        }

        async fn store(&self, path: &Path) -> shipwright_core::Result<()> {
            let name = path.file_name().unwrap().to_string_lossy();
            if name == self.reject.as_str() {
                return Err(shipwright_core::Error::Internal(
                    "index rejected upload".to_string(),
                ));
            }
            self.inner.store(path).await
        }
    }

    #[tokio::test]
    async fn test_publish_is_best_effort() {
        let (_base, store) = seeded_store(&["x86_64", "aarch64"]);
        let dest = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();

        let publisher = Publisher::new(Arc::new(RejectingIndex {
            reject: "aarch64.whl".to_string(),
            inner: DirIndex::new(dest.path()),
        }));

        let report = publisher
            .publish(
                store,
                vec!["wheel-*".to_string()],
                staging.path().to_path_buf(),
                &NullSink,
            )
            .await
            .unwrap();

        // The rejected artifact does not block its siblings.
        assert_eq!(report.uploaded(), 1);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_success());
        assert!(dest.path().join("x86_64.whl").exists());
    }
}
