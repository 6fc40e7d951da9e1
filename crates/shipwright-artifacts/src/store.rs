//! Per-run artifact store.
//!
//! Storage layout: `<root>/<slot>/<producer>.tar.zst` plus a metadata
//! json next to each archive. A (slot, producer) pair is written at most
//! once per run; commits are staged to a temp file and renamed so a
//! half-written bundle is never visible.

use crate::archiver;
use crate::digest::file_digest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shipwright_core::ids::{ArtifactId, RunId};
use shipwright_core::patterns::glob_match;
use shipwright_core::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// A committed, immutable output bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub id: ArtifactId,
    pub run_id: RunId,
    pub slot: String,
    pub producer: String,
    pub digest: String,
    pub size_bytes: u64,
    pub archive: PathBuf,
    pub committed_at: DateTime<Utc>,
}

/// Write-once-per-producer artifact channel for a single run.
pub struct ArtifactStore {
    run_id: RunId,
    root: PathBuf,
    written: Mutex<HashSet<(String, String)>>,
}

impl ArtifactStore {
    /// Open (creating if needed) the store directory for a run.
    pub fn open(base: &Path, run_id: RunId) -> Result<Self> {
        let root = base.join(run_id.to_string());
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            run_id,
            root,
            written: Mutex::new(HashSet::new()),
        })
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Commit a bundle into a slot.
    ///
    /// Fails with [`Error::DuplicateWrite`] if this (slot, producer) pair
    /// was already committed in this run.
    pub fn put(
        &self,
        slot: &str,
        producer: &str,
        paths: &[PathBuf],
        base_dir: &Path,
    ) -> Result<ArtifactEntry> {
        let key = (slot.to_string(), producer.to_string());
        let slot_dir = self.root.join(sanitize(slot));
        let archive_path = slot_dir.join(format!("{}.tar.zst", sanitize(producer)));

        {
            let mut written = self.written.lock().unwrap();
            if written.contains(&key) || archive_path.exists() {
                return Err(Error::DuplicateWrite {
                    slot: slot.to_string(),
                    producer: producer.to_string(),
                });
            }
            written.insert(key.clone());
        }

        let commit = || -> Result<ArtifactEntry> {
            std::fs::create_dir_all(&slot_dir)?;

            let staging = slot_dir.join(format!(".tmp-{}.tar.zst", sanitize(producer)));
            let file = std::fs::File::create(&staging)?;
            let writer = std::io::BufWriter::new(file);
            archiver::create_archive(writer, paths, base_dir)?;

            let digest = file_digest(&staging)?;
            let size_bytes = std::fs::metadata(&staging)?.len();

            // Commit point: the bundle becomes visible atomically.
            std::fs::rename(&staging, &archive_path)?;

            let entry = ArtifactEntry {
                id: ArtifactId::new(),
                run_id: self.run_id,
                slot: slot.to_string(),
                producer: producer.to_string(),
                digest,
                size_bytes,
                archive: archive_path.clone(),
                committed_at: Utc::now(),
            };

            let meta_path = slot_dir.join(format!("{}.json", sanitize(producer)));
            std::fs::write(&meta_path, serde_json::to_vec_pretty(&entry)?)?;

            info!(slot, producer, size_bytes, "Artifact committed");
            Ok(entry)
        };

        commit().inspect_err(|_| {
            // Release the reservation so diagnostics see the real error,
            // not a spurious duplicate.
            self.written.lock().unwrap().remove(&key);
        })
    }

    /// All committed entries whose slot key matches the pattern
    /// (exact key or glob).
    pub fn get(&self, pattern: &str) -> Result<Vec<ArtifactEntry>> {
        let mut entries = Vec::new();

        for slot_dir in std::fs::read_dir(&self.root)? {
            let slot_dir = slot_dir?;
            if !slot_dir.file_type()?.is_dir() {
                continue;
            }
            for file in std::fs::read_dir(slot_dir.path())? {
                let file = file?;
                let name = file.file_name().to_string_lossy().to_string();
                if !name.ends_with(".json") {
                    continue;
                }
                let entry: ArtifactEntry =
                    serde_json::from_slice(&std::fs::read(file.path())?)?;
                if glob_match(pattern, &entry.slot) {
                    entries.push(entry);
                }
            }
        }

        entries.sort_by(|a, b| (&a.slot, &a.producer).cmp(&(&b.slot, &b.producer)));
        debug!(pattern, count = entries.len(), "Artifact lookup");
        Ok(entries)
    }

    /// Flatten every bundle matching the patterns into one directory.
    ///
    /// A pattern matching no committed slot is an error: the dependency
    /// gate already guaranteed the producers ran.
    pub fn merge(&self, patterns: &[String], dest: &Path) -> Result<Vec<ArtifactEntry>> {
        std::fs::create_dir_all(dest)?;

        let mut merged: Vec<ArtifactEntry> = Vec::new();
        for pattern in patterns {
            let entries = self.get(pattern)?;
            if entries.is_empty() {
                return Err(Error::SlotNotFound(pattern.clone()));
            }
            for entry in entries {
                if merged.iter().any(|e| e.id == entry.id) {
                    continue;
                }
                let file = std::fs::File::open(&entry.archive)?;
                archiver::extract_archive(std::io::BufReader::new(file), dest)?;
                merged.push(entry);
            }
        }

        Ok(merged)
    }

    /// Delete everything this run committed.
    pub fn purge(&self) -> Result<()> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}

fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}
