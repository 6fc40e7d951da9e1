//! Content digests for committed bundles.

use sha2::{Digest, Sha256};
use shipwright_core::Result;
use std::io::Read;
use std::path::Path;

/// Hex sha256 of a file's contents.
pub fn file_digest(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut file = std::fs::File::open(path)?;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
