//! Tar + zstd bundle packing and unpacking.

use shipwright_core::{Error, Result};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Pack paths (files or directories, relative to `base_dir`) into a
/// zstd-compressed tar stream.
pub fn create_archive<W: Write>(writer: W, paths: &[PathBuf], base_dir: &Path) -> Result<()> {
    let mut encoder = zstd::stream::write::Encoder::new(writer, 3)
        .map_err(|e| Error::Internal(format!("Zstd init failed: {}", e)))?;
    {
        let mut builder = tar::Builder::new(&mut encoder);
        for p in paths {
            let abs_path = if p.is_absolute() {
                p.clone()
            } else {
                base_dir.join(p)
            };
            if abs_path.exists() {
                let name = if p.is_absolute() {
                    p.strip_prefix(base_dir).unwrap_or(p)
                } else {
                    p.as_path()
                };

                if abs_path.is_dir() {
                    builder
                        .append_dir_all(name, &abs_path)
                        .map_err(|e| Error::Internal(format!("Failed to pack dir: {}", e)))?;
                } else {
                    builder
                        .append_path_with_name(&abs_path, name)
                        .map_err(|e| Error::Internal(format!("Failed to pack file: {}", e)))?;
                }
            }
        }
        builder
            .finish()
            .map_err(|e| Error::Internal(format!("Failed to finish tar: {}", e)))?;
    }
    encoder
        .finish()
        .map_err(|e| Error::Internal(format!("Zstd finish failed: {}", e)))?;
    Ok(())
}

/// Unpack an archive produced by [`create_archive`] into `dest`.
pub fn extract_archive<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let decoder = zstd::stream::read::Decoder::new(reader)
        .map_err(|e| Error::Internal(format!("Failed to create decoder: {}", e)))?;
    let mut archive = tar::Archive::new(decoder);
    archive
        .unpack(dest)
        .map_err(|e| Error::Internal(format!("Failed to unpack archive: {}", e)))?;
    Ok(())
}
