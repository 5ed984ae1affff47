use crate::types::Result;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

// Most filesystems cap a name at 255 bytes; long paging cursors go past that.
const MAX_FILENAME_LEN: usize = 200;
const PREFIX: &str = "fb_cached_";

/// Permanent on-disk store of raw response bodies, one file per request signature.
///
/// Entries are never expired. Reads and writes are not locked, so a cache
/// directory must not be shared by concurrent runs.
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, signature: &str) -> PathBuf {
        self.dir.join(entry_name(signature))
    }

    pub async fn get(&self, signature: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.entry_path(signature)).await {
            Ok(body) => {
                debug!("Cache hit: {}", signature);
                Ok(Some(body))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn put(&self, signature: &str, body: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.entry_path(signature), body).await?;
        debug!("Cached {} ({} bytes)", signature, body.len());
        Ok(())
    }

    pub async fn contains(&self, signature: &str) -> bool {
        tokio::fs::try_exists(self.entry_path(signature))
            .await
            .unwrap_or(false)
    }
}

/// Short signatures are used as is; long ones are replaced by their SHA-256.
fn entry_name(signature: &str) -> String {
    if signature.len() <= MAX_FILENAME_LEN {
        signature.to_string()
    } else {
        format!("{}{}", PREFIX, hex::encode(Sha256::digest(signature.as_bytes())))
    }
}
