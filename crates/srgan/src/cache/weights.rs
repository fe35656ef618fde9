//! # Weight Artifact Descriptors

use crate::cache::disk::DiskCacheConfig;
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

const X25: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_SDLC);

/// Returns a local path to a model weights file.
///
/// If the file is not cached, it is downloaded from the given URL.
pub fn fetch_model_weights<S: AsRef<str>>(url: S) -> anyhow::Result<PathBuf> {
    let cache_key = url_to_cache_key(Some("model"), url.as_ref());
    let resource = weights_resource_key(&cache_key);

    let disk_cache = DiskCacheConfig::default();
    disk_cache.fetch_resource(url.as_ref(), &resource)
}

/// Build a cache key (bare cache file name) from a name and URL.
pub fn url_to_cache_key(
    name: Option<&str>,
    url: &str,
) -> String {
    let hash = X25.checksum(url.as_bytes()).to_string();
    let base_name = url.rsplit_once('/').unwrap().1;
    match name {
        Some(n) => format!("{}-{}-{}", n, hash, base_name),
        None => format!("{}-{}", hash, base_name),
    }
}

/// Get the cache resource key for a weights file.
///
/// # Arguments
///
/// - `cache_key`: the cache key (the bare cache file name).
pub fn weights_resource_key(cache_key: &str) -> Vec<String> {
    vec!["weights".to_string(), cache_key.to_string()]
}

/// Static [`WeightsDescriptor`] provider.
#[derive(Debug)]
pub struct StaticWeightsDescriptor<'a> {
    /// Name of the artifact.
    pub name: &'a str,

    /// Description of the artifact.
    pub description: &'a str,

    /// License.
    pub license: Option<&'a str>,

    /// Source URL.
    pub origin: Option<&'a str>,

    /// URL to download the weights from.
    pub url: &'a str,
}

impl<'a> StaticWeightsDescriptor<'a> {
    /// Convert to a [`WeightsDescriptor`].
    pub fn to_descriptor(&self) -> WeightsDescriptor {
        WeightsDescriptor {
            name: self.name.to_string(),
            description: self.description.to_string(),
            license: self.license.map(|s| s.to_string()),
            origin: self.origin.map(|s| s.to_string()),
            url: self.url.to_string(),
        }
    }
}

impl From<&StaticWeightsDescriptor<'_>> for WeightsDescriptor {
    fn from(descriptor: &StaticWeightsDescriptor) -> Self {
        descriptor.to_descriptor()
    }
}

/// A descriptor for a pretrained weights artifact.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WeightsDescriptor {
    /// Name of the artifact.
    pub name: String,

    /// Description of the artifact.
    pub description: String,

    /// License.
    pub license: Option<String>,

    /// Source URL.
    pub origin: Option<String>,

    /// URL to download the weights from.
    pub url: String,
}

impl WeightsDescriptor {
    /// Cache Key.
    ///
    /// The key is ``{name}-{url crc hash}-{url basename}``.
    pub fn cache_key(&self) -> String {
        url_to_cache_key(Some(&self.name), &self.url)
    }

    /// Read-through cache the artifact.
    ///
    /// # Returns
    ///
    /// The disk location of the cached weights.
    pub fn fetch(&self) -> anyhow::Result<PathBuf> {
        self.fetch_to_disk_cache(&DiskCacheConfig::default())
    }

    /// Read-through cache the artifact in the given cache.
    ///
    /// # Returns
    ///
    /// The disk location of the cached weights.
    pub fn fetch_to_disk_cache(
        &self,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<PathBuf> {
        let cache_key = &self.cache_key();
        let resource = weights_resource_key(cache_key);

        disk_cache.fetch_resource(&self.url, &resource)
    }
}

/// Static [`WeightsCatalog`] builder.
#[derive(Debug)]
pub struct StaticWeightsCatalog<'a> {
    /// List of static descriptors.
    pub items: &'a [&'a StaticWeightsDescriptor<'a>],
}

impl<'a> StaticWeightsCatalog<'a> {
    /// Convert to a [`WeightsCatalog`].
    pub fn to_catalog(&self) -> WeightsCatalog {
        WeightsCatalog {
            items: self
                .items
                .iter()
                .map(|d| {
                    let desc = d.to_descriptor();
                    (desc.name.clone(), desc)
                })
                .collect(),
        }
    }
}

impl<'a> From<&StaticWeightsCatalog<'a>> for WeightsCatalog {
    fn from(catalog: &StaticWeightsCatalog) -> Self {
        catalog.to_catalog()
    }
}

/// Catalog of [`WeightsDescriptor`]s.
#[derive(Debug, Clone)]
pub struct WeightsCatalog {
    /// Map of descriptors.
    pub items: BTreeMap<String, WeightsDescriptor>,
}

impl WeightsCatalog {
    /// Lookup a descriptor by name.
    pub fn lookup_by_name(
        &self,
        name: &str,
    ) -> Option<WeightsDescriptor> {
        self.items.get(name).cloned()
    }

    /// Lookup a descriptor by name, failing on unknown names.
    pub fn try_lookup_by_name(
        &self,
        name: &str,
    ) -> anyhow::Result<WeightsDescriptor> {
        match self.lookup_by_name(name) {
            Some(d) => Ok(d),
            None => bail!("Descriptor not found: {}", name),
        }
    }
}
