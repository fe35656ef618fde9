//! # Training-Options View
//!
//! A thin accessor over the nested options mapping the training harness
//! passes to the network factory. Every required key's absence fails with
//! an error naming the missing key; no other validation happens here.

use anyhow::{Result, anyhow, bail};
use serde_json::{Map, Value};

/// Borrowed view of a nested options mapping.
#[derive(Debug, Clone, Copy)]
pub struct NetOptions<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> NetOptions<'a> {
    /// View a [`Value`] as an options mapping.
    pub fn from_value(value: &'a Value) -> Result<Self> {
        match value.as_object() {
            Some(map) => Ok(Self { map }),
            None => bail!("network options must be a mapping"),
        }
    }

    fn require(
        &self,
        key: &str,
    ) -> Result<&'a Value> {
        self.map
            .get(key)
            .ok_or_else(|| anyhow!("missing required network option [{key}]"))
    }

    /// A nested options section.
    pub fn section(
        &self,
        key: &str,
    ) -> Result<NetOptions<'a>> {
        let value = self.require(key)?;
        value
            .as_object()
            .map(|map| NetOptions { map })
            .ok_or_else(|| anyhow!("network option [{key}] must be a mapping"))
    }

    /// A required string option.
    pub fn require_str(
        &self,
        key: &str,
    ) -> Result<&'a str> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| anyhow!("network option [{key}] must be a string"))
    }

    /// A required unsigned integer option.
    pub fn require_usize(
        &self,
        key: &str,
    ) -> Result<usize> {
        self.require(key)?
            .as_u64()
            .map(|v| v as usize)
            .ok_or_else(|| anyhow!("network option [{key}] must be an unsigned integer"))
    }

    /// A required float option.
    pub fn require_f64(
        &self,
        key: &str,
    ) -> Result<f64> {
        self.require(key)?
            .as_f64()
            .ok_or_else(|| anyhow!("network option [{key}] must be a number"))
    }

    /// An optional unsigned integer option.
    pub fn opt_usize(
        &self,
        key: &str,
    ) -> Result<Option<usize>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.require_usize(key).map(Some),
        }
    }

    /// An optional string option.
    pub fn opt_str(
        &self,
        key: &str,
    ) -> Result<Option<&'a str>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.require_str(key).map(Some),
        }
    }

    /// An unsigned integer option with a default.
    pub fn usize_or(
        &self,
        key: &str,
        default: usize,
    ) -> Result<usize> {
        Ok(self.opt_usize(key)?.unwrap_or(default))
    }

    /// A boolean option with a default.
    pub fn bool_or(
        &self,
        key: &str,
        default: bool,
    ) -> Result<bool> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| anyhow!("network option [{key}] must be a boolean")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_key_names_the_key() {
        let value = json!({ "nf": 64 });
        let opts = NetOptions::from_value(&value).unwrap();

        let err = opts.require_usize("in_nc").unwrap_err();
        assert!(err.to_string().contains("in_nc"));
    }

    #[test]
    fn test_accessors() {
        let value = json!({
            "which_model_D": "discriminator_unet",
            "in_nc": 3,
            "nf": 64,
            "weight": 0.5,
            "extra_conv": true,
            "in_nc_ref": null,
            "network_D": { "nf": 32 },
        });
        let opts = NetOptions::from_value(&value).unwrap();

        assert_eq!(
            opts.require_str("which_model_D").unwrap(),
            "discriminator_unet"
        );
        assert_eq!(opts.require_usize("in_nc").unwrap(), 3);
        assert_eq!(opts.require_f64("weight").unwrap(), 0.5);
        assert_eq!(opts.bool_or("extra_conv", false).unwrap(), true);
        assert_eq!(opts.bool_or("disable_passthrough", true).unwrap(), true);
        assert_eq!(opts.opt_usize("in_nc_ref").unwrap(), None);
        assert_eq!(opts.usize_or("scale", 4).unwrap(), 4);
        assert_eq!(opts.section("network_D").unwrap().require_usize("nf").unwrap(), 32);
    }

    #[test]
    fn test_type_errors() {
        let value = json!({ "nf": "sixty-four" });
        let opts = NetOptions::from_value(&value).unwrap();

        let err = opts.require_usize("nf").unwrap_err();
        assert!(err.to_string().contains("nf"));
    }
}
