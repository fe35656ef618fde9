//! # Disk Cache Policy

use anyhow::bail;
use burn::config::Config;
use burn::data::network::downloader;
use std::fs::{File, remove_file};
use std::io::Write;
use std::path::PathBuf;

/// Cache Policy.
#[derive(Config, Debug)]
pub struct DiskCacheConfig {
    /// Key for the root cache directory.
    #[config(default = "\"srgan\".to_string()")]
    pub root_cache_key: String,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskCacheConfig {
    /// Fetch the base cache directory.
    ///
    /// Does not create the directory.
    pub fn base_cache_dir(&self) -> anyhow::Result<PathBuf> {
        match dirs::home_dir() {
            Some(home) => Ok(home.join(".cache").join(&self.root_cache_key)),
            None => bail!("Unable to determine the home directory"),
        }
    }

    /// Map a resource key to a cache path.
    ///
    /// Does not ensure that the path (or any of the parents) exist.
    pub fn resource_to_path(
        &self,
        resource_key: &[String],
    ) -> anyhow::Result<PathBuf> {
        let path = self.base_cache_dir()?;
        Ok(resource_key.iter().fold(path, |acc, s| acc.join(s)))
    }

    /// Map a resource key to a cache path and ensure the parent directory
    /// exists.
    pub fn ensure_resource_parent_dir(
        &self,
        resource_key: &[String],
    ) -> anyhow::Result<PathBuf> {
        let path = self.resource_to_path(resource_key)?;
        if !path.exists() {
            std::fs::create_dir_all(path.parent().unwrap())?;
        }
        Ok(path)
    }

    /// Fetch a resource to the cache.
    ///
    /// # Returns
    ///
    /// The disk location of the cached resource.
    pub fn fetch_resource(
        &self,
        url: &str,
        resource: &[String],
    ) -> anyhow::Result<PathBuf> {
        let cache_file_path = self.ensure_resource_parent_dir(resource)?;
        try_cache_download_to_path(url, cache_file_path)
    }
}

/// Download a URL resource to a given path.
///
/// If the path already exists, does nothing.
///
/// # Returns
///
/// The cache path.
pub fn try_cache_download_to_path(
    url: &str,
    cache_file_path: PathBuf,
) -> anyhow::Result<PathBuf> {
    if !cache_file_path.exists() {
        let file_name = cache_file_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string();

        tracing::info!("downloading [{url}] to [{}]", cache_file_path.display());
        let bytes = downloader::download_file_as_bytes(url, &file_name);

        let mut output_file = File::create(&cache_file_path)?;
        let bytes_written = output_file.write(&bytes)?;

        if bytes_written != bytes.len() {
            remove_file(cache_file_path)?;
            bail!("Failed to write the whole weights file.");
        }
    }

    Ok(cache_file_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_to_path() {
        let config = DiskCacheConfig::new();

        let base = config.base_cache_dir().unwrap();
        assert!(base.ends_with(".cache/srgan"));

        let path = config
            .resource_to_path(&["weights".to_string(), "model.pth".to_string()])
            .unwrap();
        assert_eq!(path, base.join("weights").join("model.pth"));
    }
}
