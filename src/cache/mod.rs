use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Disk cache for downloaded tiles, keyed by the URL they came from
#[derive(Debug, Clone)]
pub struct Cache {
    cache_dir: PathBuf,
}

impl Cache {
    /// Create a new cache with the given directory
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();

        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)
                .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
        }

        Ok(Self { cache_dir })
    }

    /// Get a cached file path for the given URL
    /// Returns None if the file is not in the cache
    pub fn get_cached_file(&self, url: &str) -> Option<PathBuf> {
        let file_path = self.get_cache_path(url);
        if file_path.exists() {
            Some(file_path)
        } else {
            None
        }
    }

    /// Read the cached bytes for a URL, if present
    pub fn read(&self, url: &str) -> Result<Option<Vec<u8>>> {
        match self.get_cached_file(url) {
            Some(path) => {
                let data = fs::read(&path)
                    .with_context(|| format!("Failed to read cache file {}", path.display()))?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Save data to the cache
    pub fn save_to_cache(&self, url: &str, data: &[u8]) -> Result<PathBuf> {
        let file_path = self.get_cache_path(url);

        // Tiles are fetched concurrently. Each write goes to its own temp file
        // in the cache directory and is renamed over the final path.
        let mut file = NamedTempFile::new_in(&self.cache_dir)
            .context("Failed to create cache file")?;
        file.write_all(data)
            .context("Failed to write data to cache file")?;
        file.persist(&file_path)
            .context("Failed to move cache file into place")?;

        Ok(file_path)
    }

    /// Get the cache path for a URL
    fn get_cache_path(&self, url: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        let extension = url.rsplit('/').next()
            .and_then(|s| s.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .unwrap_or("");

        let file_name = if extension.is_empty() {
            hash
        } else {
            format!("{}.{}", hash, extension)
        };

        self.cache_dir.join(file_name)
    }

    /// Clear the cache
    pub fn clear(&self) -> Result<()> {
        if self.cache_dir.exists() {
            fs::remove_dir_all(&self.cache_dir)
                .context("Failed to remove cache directory")?;
            fs::create_dir_all(&self.cache_dir)
                .context("Failed to recreate cache directory")?;
        }

        Ok(())
    }
}
